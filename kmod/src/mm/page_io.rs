// SPDX-License-Identifier: MPL-2.0

//! Page-bounded copy and flush primitives.
//!
//! Each primitive maps the target page, performs its access through the
//! temporary mapping, and releases the mapping before returning. The checks
//! that can refuse an access run before anything is mapped, so a refused
//! access has no side effects.

use core::ptr;

use log::warn;

use super::{
    FlushMethod, PAGE_SIZE, Paddr, fits_in_page, flush::flush_mapping, map_frame, page_offset,
    paddr_to_pfn, unmap_frame,
};
use crate::{Error, Result, platform::Platform};

/// Per-request access options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    /// How to flush the page around the access.
    pub flush: FlushMethod,
    /// Whether reserved pages may be accessed.
    pub access_reserved: bool,
}

/// Copies `src` to the physical address `dst`.
///
/// All destination bytes must lie within one page. After the copy the page is
/// flushed with `policy.flush`, which forces the data out to DRAM.
pub fn write_page<P: Platform + ?Sized>(
    platform: &P,
    dst: Paddr,
    src: &[u8],
    policy: AccessPolicy,
) -> Result<()> {
    if !fits_in_page(dst, src.len()) {
        return Err(Error::InvalidRange);
    }
    check_reserved(platform, dst, policy)?;

    let Some(handle) = map_frame(platform, paddr_to_pfn(dst)) else {
        warn!("write_page: failed to map {:#x}", dst);
        return Err(Error::MapFailed);
    };

    let target = handle.vaddr() + page_offset(dst);
    // SAFETY: The handle maps a whole page, and we have checked that
    // `page_offset(dst) + src.len()` does not exceed the page size. The
    // mapping is not memory owned by Rust objects, so it cannot overlap `src`.
    unsafe { ptr::copy_nonoverlapping(src.as_ptr(), target as *mut u8, src.len()) };

    flush_mapping(platform, &handle, PAGE_SIZE, policy.flush);
    unmap_frame(platform, handle);

    Ok(())
}

/// Copies from the physical address `src` into `dst`.
///
/// All source bytes must lie within one page. The page is flushed with
/// `policy.flush` before the copy, so the data comes from DRAM and not from a
/// stale cache line.
pub fn read_page<P: Platform + ?Sized>(
    platform: &P,
    dst: &mut [u8],
    src: Paddr,
    policy: AccessPolicy,
) -> Result<()> {
    if !fits_in_page(src, dst.len()) {
        return Err(Error::InvalidRange);
    }
    check_reserved(platform, src, policy)?;

    let Some(handle) = map_frame(platform, paddr_to_pfn(src)) else {
        warn!("read_page: src={:#x}: failed to map", src);
        return Err(Error::MapFailed);
    };

    flush_mapping(platform, &handle, PAGE_SIZE, policy.flush);

    let source = handle.vaddr() + page_offset(src);
    // SAFETY: Same as in `write_page`.
    unsafe { ptr::copy_nonoverlapping(source as *const u8, dst.as_mut_ptr(), dst.len()) };

    unmap_frame(platform, handle);

    Ok(())
}

/// Flushes the page containing `pa` with `policy.flush`.
///
/// Any address within the target page works.
pub fn flush_page<P: Platform + ?Sized>(
    platform: &P,
    pa: Paddr,
    policy: AccessPolicy,
) -> Result<()> {
    check_reserved(platform, pa, policy)?;

    let Some(handle) = map_frame(platform, paddr_to_pfn(pa)) else {
        warn!("flush_page: failed to map {:#x}", pa);
        return Err(Error::MapFailed);
    };

    flush_mapping(platform, &handle, PAGE_SIZE, policy.flush);
    unmap_frame(platform, handle);

    Ok(())
}

fn check_reserved<P: Platform + ?Sized>(
    platform: &P,
    pa: Paddr,
    policy: AccessPolicy,
) -> Result<()> {
    let pfn = paddr_to_pfn(pa);
    // Writing to reserved pages can bring the whole machine down.
    if platform.is_tracked_frame(pfn)
        && platform.is_reserved_frame(pfn)
        && !policy.access_reserved
    {
        return Err(Error::Reserved);
    }
    Ok(())
}
