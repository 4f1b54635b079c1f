// SPDX-License-Identifier: MPL-2.0

//! Physical memory access.
//!
//! Every operation of this module works on at most one page. Ranges that
//! span several pages must be split by the caller, which is what the client
//! library does before it sends requests over the boundary.

pub mod flush;
pub mod map;
pub mod page_io;
pub mod page_prop;


pub use self::{
    flush::FlushMethod,
    map::{MappingHandle, map_frame, unmap_frame},
    page_io::{AccessPolicy, flush_page, read_page, write_page},
    page_prop::{CachePolicy, RemapFlags},
};

/// Physical addresses.
///
/// Physical addresses are 64 bits wide regardless of the width of the
/// virtual address space of the machine that runs the client.
pub type Paddr = u64;

/// Virtual addresses.
pub type Vaddr = usize;

/// Page frame numbers.
pub type Pfn = u64;

/// The log2 of the page size.
pub const PAGE_SHIFT: u32 = 12;

/// The page size.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// The size of a cache line.
pub const CACHELINE_SIZE: usize = 64;

/// Returns the frame number of the page containing `pa`.
pub const fn paddr_to_pfn(pa: Paddr) -> Pfn {
    pa >> PAGE_SHIFT
}

/// Returns the physical address of the first byte of frame `pfn`.
pub const fn pfn_to_paddr(pfn: Pfn) -> Paddr {
    pfn << PAGE_SHIFT
}

/// Returns the offset of `pa` within its page.
pub const fn page_offset(pa: Paddr) -> usize {
    (pa & (PAGE_SIZE as u64 - 1)) as usize
}

/// Returns the physical address of the first byte of the page after the one
/// containing `pa`.
pub const fn next_page(pa: Paddr) -> Paddr {
    pfn_to_paddr(paddr_to_pfn(pa) + 1)
}

/// Checks that `len` bytes starting at `pa` stay within a single page.
pub const fn fits_in_page(pa: Paddr, len: usize) -> bool {
    len <= PAGE_SIZE - page_offset(pa)
}
