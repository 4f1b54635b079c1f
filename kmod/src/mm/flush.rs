// SPDX-License-Identifier: MPL-2.0

//! Cache flushing of mapped pages.

use int_to_c_enum::TryFromInt;
use log::warn;

use super::{CACHELINE_SIZE, MappingHandle};
use crate::platform::Platform;

/// How a page is pushed out of the caches around an access.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, TryFromInt)]
pub enum FlushMethod {
    /// Do not flush.
    #[default]
    None = 0,
    /// Flush every cache line of the page, then fence.
    CacheLineFlush = 1,
    /// Write back and invalidate the whole cache hierarchy on every CPU.
    ///
    /// This is coarse and slow. It is meant for machines where flushing a
    /// single line is not possible.
    FullInvalidate = 2,
}

impl FlushMethod {
    /// Decodes a flush method that came over the boundary.
    ///
    /// Unknown values are logged and treated as [`FlushMethod::None`].
    pub fn from_raw(raw: u32) -> Self {
        FlushMethod::try_from(raw).unwrap_or_else(|_| {
            warn!("invalid flush method {}", raw);
            FlushMethod::None
        })
    }
}

/// Flushes the first `len` bytes of a mapped page from the caches.
pub(crate) fn flush_mapping<P: Platform + ?Sized>(
    platform: &P,
    handle: &MappingHandle,
    len: usize,
    method: FlushMethod,
) {
    match method {
        FlushMethod::None => {}
        FlushMethod::CacheLineFlush => {
            let start = handle.vaddr();
            for vaddr in (start..start + len).step_by(CACHELINE_SIZE) {
                // SAFETY: `handle` is a live mapping of a full page and
                // `len` never exceeds the page size.
                unsafe { platform.flush_cache_line(vaddr) };
            }
            platform.memory_fence();
        }
        FlushMethod::FullInvalidate => platform.wbinvd_on_all_cpus(),
    }
}
