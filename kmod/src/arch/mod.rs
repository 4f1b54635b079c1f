// SPDX-License-Identifier: MPL-2.0

//! Architecture-specific cache maintenance instructions.

use core::sync::atomic::{Ordering, fence};

use cfg_if::cfg_if;

use crate::mm::Vaddr;

cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// Writes back and invalidates the cache line that contains `vaddr`.
        ///
        /// # Safety
        ///
        /// `vaddr` must be mapped in the current address space.
        pub unsafe fn flush_cache_line(vaddr: Vaddr) {
            // SAFETY: The caller guarantees that the address is mapped.
            // `clflush` is part of SSE2, which every x86-64 CPU supports.
            unsafe { core::arch::x86_64::_mm_clflush(vaddr as *const u8) };
        }
    } else {
        /// Writes back and invalidates the cache line that contains `vaddr`.
        ///
        /// This architecture has no unprivileged line flush that we know
        /// how to issue, so this is a no-op and the fence that follows is
        /// the only ordering guarantee.
        ///
        /// # Safety
        ///
        /// `vaddr` must be mapped in the current address space.
        pub unsafe fn flush_cache_line(_vaddr: Vaddr) {}
    }
}

/// Serializes all memory accesses issued before the call.
///
/// On x86-64 this is an `mfence`.
pub fn memory_fence() {
    fence(Ordering::SeqCst);
}
