// SPDX-License-Identifier: MPL-2.0

//! Channels to the privileged helper.

use std::sync::Arc;

use readalias_kmod::{AccessArgs, BoundaryHandle, Command, Platform};

/// A connection that carries requests to an access boundary.
///
/// A channel returns the raw status code of every request. The status is
/// interpreted by [`PhysMem`](crate::PhysMem).
pub trait Channel {
    /// Issues one request and returns its status code.
    fn ioctl(&self, cmd: Command, args: &mut AccessArgs<'_>) -> i32;
}

impl<P: Platform> Channel for BoundaryHandle<'_, P> {
    fn ioctl(&self, cmd: Command, args: &mut AccessArgs<'_>) -> i32 {
        BoundaryHandle::ioctl(self, cmd, args)
    }
}

impl<C: Channel + ?Sized> Channel for &C {
    fn ioctl(&self, cmd: Command, args: &mut AccessArgs<'_>) -> i32 {
        (**self).ioctl(cmd, args)
    }
}

impl<C: Channel + ?Sized> Channel for Arc<C> {
    fn ioctl(&self, cmd: Command, args: &mut AccessArgs<'_>) -> i32 {
        (**self).ioctl(cmd, args)
    }
}
