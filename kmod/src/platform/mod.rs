// SPDX-License-Identifier: MPL-2.0

//! The machine underneath the helper.
//!
//! Which frames are ordinary memory, which ones are reserved, and how a frame
//! can be mapped all depend on the host kernel and the firmware. The helper
//! only relies on the primitives listed in [`Platform`].

#[cfg(any(test, feature = "sim"))]
pub mod sim;

use crate::{
    arch,
    mm::{CachePolicy, Paddr, Pfn, RemapFlags, Vaddr},
};

/// A temporary mapping handed out by a [`Platform`].
///
/// This is an opaque token. It carries the start address of the mapping in
/// the helper's address space and must be given back to the release method
/// of the primitive that created it.
#[derive(Debug, PartialEq, Eq)]
pub struct RawMapping {
    vaddr: Vaddr,
    size: usize,
}

impl RawMapping {
    /// Creates a mapping token.
    ///
    /// # Safety
    ///
    /// `vaddr..vaddr + size` must be readable and writable until the token is
    /// released by the platform that created it.
    pub unsafe fn new(vaddr: Vaddr, size: usize) -> Self {
        Self { vaddr, size }
    }

    /// Returns the start of the mapping.
    pub fn vaddr(&self) -> Vaddr {
        self.vaddr
    }

    /// Returns the size of the mapping in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Platform primitives that the Page Mapper and the flush routines rely on.
///
/// # Safety
///
/// Every [`RawMapping`] returned by a mapping method must stay valid, as
/// described by [`RawMapping::new`], until it is passed to the matching
/// release method.
pub unsafe trait Platform: Send + Sync {
    /// Returns whether `pfn` is ordinary memory tracked by the host kernel.
    fn is_tracked_frame(&self, pfn: Pfn) -> bool;

    /// Returns whether a tracked frame is reserved.
    ///
    /// Reserved frames hold firmware tables, kernel text and similar things
    /// that crash the machine when written to. The result is meaningless for
    /// untracked frames.
    fn is_reserved_frame(&self, pfn: Pfn) -> bool;

    /// Maps a tracked frame into the kernel with the given cache policy.
    fn map_tracked_frame(&self, pfn: Pfn, cache: CachePolicy) -> Option<RawMapping>;

    /// Releases a mapping created by [`Platform::map_tracked_frame`].
    fn unmap_tracked_frame(&self, mapping: RawMapping);

    /// Maps a physical range as uncached device memory.
    fn ioremap(&self, pa: Paddr, size: usize) -> Option<RawMapping>;

    /// Releases a mapping created by [`Platform::ioremap`].
    fn iounmap(&self, mapping: RawMapping);

    /// Maps a physical range with any of the cache attributes in `flags`.
    fn memremap(&self, pa: Paddr, size: usize, flags: RemapFlags) -> Option<RawMapping>;

    /// Releases a mapping created by [`Platform::memremap`].
    fn memunmap(&self, mapping: RawMapping);

    /// Writes back and invalidates the cache line containing `vaddr`.
    ///
    /// # Safety
    ///
    /// `vaddr` must lie inside a live mapping.
    unsafe fn flush_cache_line(&self, vaddr: Vaddr) {
        // SAFETY: The caller guarantees that the address is mapped.
        unsafe { arch::flush_cache_line(vaddr) };
    }

    /// Serializes all memory accesses issued before the call.
    fn memory_fence(&self) {
        arch::memory_fence();
    }

    /// Writes back and invalidates all cache levels on every CPU.
    fn wbinvd_on_all_cpus(&self);
}
