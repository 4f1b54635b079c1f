// SPDX-License-Identifier: MPL-2.0

//! Physical memory access over a channel.
//!
//! The helper only accepts requests that stay within one page. [`PhysMem`]
//! splits arbitrary ranges into such requests and folds the per-page status
//! codes into a single result, counting the pages that could not be accessed
//! in the [`PageStats`](crate::PageStats) of the caller's configuration.

use log::{debug, trace, warn};
use readalias_kmod::{AccessArgs, Command, ENODEV, FlushMethod, Paddr, PageStatus, UserBuf};

use crate::{
    AccessFailure, Error, Result, channel::Channel, chunk::PageChunks, config::CopyConfig,
};

/// Physical memory, as seen through a channel to the helper.
pub struct PhysMem<C> {
    channel: Option<C>,
}

impl<C: Channel> PhysMem<C> {
    /// Opens physical memory over `channel`.
    pub fn open(channel: C) -> Self {
        debug!("physical memory opened");
        Self {
            channel: Some(channel),
        }
    }

    /// Closes the channel.
    ///
    /// Every later operation fails with [`Error::BoundaryUnavailable`].
    pub fn close(&mut self) {
        if self.channel.take().is_some() {
            debug!("physical memory closed");
        }
    }

    /// Returns whether the channel is open.
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Copies `src` to the physical address `dst`.
    ///
    /// The range may span any number of pages. Pages that cannot be accessed
    /// are handled as configured in `config`. If the operation stops early,
    /// the pages copied so far stay written.
    pub fn memcpy_to_pa(&self, dst: Paddr, src: &[u8], config: &mut CopyConfig) -> Result<()> {
        self.channel()?;
        for chunk in PageChunks::new(dst, src.len()) {
            let mut args = AccessArgs {
                buffer: UserBuf::Src(&src[chunk.range]),
                pa: chunk.pa,
                flush: config.flush_method as u32,
                access_reserved: config.access_reserved,
            };
            let status = self.request(Command::WriteToPhysical, &mut args)?;
            account(chunk.pa, status, config)?;
        }
        Ok(())
    }

    /// Copies from the physical address `src` into `dst`.
    ///
    /// The parts of `dst` that belong to pages that could not be accessed are
    /// left untouched.
    pub fn memcpy_from_pa(
        &self,
        dst: &mut [u8],
        src: Paddr,
        config: &mut CopyConfig,
    ) -> Result<()> {
        self.channel()?;
        for chunk in PageChunks::new(src, dst.len()) {
            let mut args = AccessArgs {
                buffer: UserBuf::Dst(&mut dst[chunk.range]),
                pa: chunk.pa,
                flush: config.flush_method as u32,
                access_reserved: config.access_reserved,
            };
            let status = self.request(Command::ReadFromPhysical, &mut args)?;
            account(chunk.pa, status, config)?;
        }
        Ok(())
    }

    /// Flushes every page touched by `[pa, pa + count)` from the caches.
    ///
    /// Nothing is sent to the helper if the configured method is
    /// [`FlushMethod::None`], but a closed channel is still an error.
    pub fn flush_range(&self, pa: Paddr, count: usize, config: &mut CopyConfig) -> Result<()> {
        self.channel()?;
        if config.flush_method == FlushMethod::None {
            return Ok(());
        }

        for chunk in PageChunks::new(pa, count) {
            let mut args = AccessArgs {
                buffer: UserBuf::None,
                pa: chunk.pa,
                flush: config.flush_method as u32,
                access_reserved: config.access_reserved,
            };
            let status = self.request(Command::FlushPhysical, &mut args)?;
            account(chunk.pa, status, config)?;
        }
        Ok(())
    }

    /// Writes back and invalidates all caches on all CPUs.
    pub fn flush_all_caches(&self) -> Result<()> {
        let mut args = AccessArgs {
            buffer: UserBuf::None,
            pa: 0,
            flush: FlushMethod::FullInvalidate as u32,
            access_reserved: false,
        };
        match self.request(Command::FlushAllCaches, &mut args)? {
            PageStatus::Ok => Ok(()),
            status => Err(Error::Rejected(status as i32)),
        }
    }

    fn channel(&self) -> Result<&C> {
        self.channel.as_ref().ok_or(Error::BoundaryUnavailable)
    }

    fn request(&self, cmd: Command, args: &mut AccessArgs<'_>) -> Result<PageStatus> {
        let status = self.channel()?.ioctl(cmd, args);
        trace!("{:?} pa={:#x} count={} -> {}", cmd, args.pa, args.count(), status);

        if status == -ENODEV {
            return Err(Error::BoundaryUnavailable);
        }
        PageStatus::try_from(status).map_err(|_| {
            warn!("{:?} at {:#x} rejected with {}", cmd, args.pa, status);
            Error::Rejected(status)
        })
    }
}

fn account(pa: Paddr, status: PageStatus, config: &mut CopyConfig) -> Result<()> {
    let cause = match status {
        PageStatus::Ok => return Ok(()),
        PageStatus::Reserved => {
            config.stats.reserved_pages += 1;
            AccessFailure::Reserved
        }
        PageStatus::MapFailed => {
            config.stats.map_failures += 1;
            AccessFailure::MapFailed
        }
    };

    debug!("cannot access page at {:#x}: {:?}", pa, cause);
    if config.err_on_access_fail {
        return Err(Error::AccessFailed { pa, cause });
    }
    Ok(())
}
