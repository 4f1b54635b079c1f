// SPDX-License-Identifier: MPL-2.0

//! The Page Mapper.
//!
//! Not every physical frame can be mapped the same way. Ordinary memory that
//! the host kernel tracks can be mapped through its frame descriptor, device
//! memory needs an uncached I/O mapping, and anything else (firmware areas,
//! encrypted memory, holes the kernel never learnt about) may still be
//! reachable with a generic remap. [`map_frame`] tries these strategies in
//! that order.

use log::trace;

use super::{CachePolicy, PAGE_SIZE, Pfn, RemapFlags, Vaddr, pfn_to_paddr};
use crate::platform::{Platform, RawMapping};

/// The mapping strategy that produced a [`MappingHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MappingKind {
    /// A kernel I/O mapping of a tracked frame.
    Tracked,
    /// An uncached device-memory mapping.
    IoRemap,
    /// A generic remap with a negotiated cache attribute.
    MemRemap,
}

/// A temporary mapping of one page frame.
///
/// The handle is owned by the operation that created it and must be
/// released with [`unmap_frame`], which picks the release primitive from the
/// variant.
#[derive(Debug)]
pub enum MappingHandle {
    /// Created by [`Platform::map_tracked_frame`].
    Tracked {
        /// The platform token.
        mapping: RawMapping,
        /// The frame backing the mapping.
        pfn: Pfn,
    },
    /// Created by [`Platform::ioremap`].
    IoRemap {
        /// The platform token.
        mapping: RawMapping,
    },
    /// Created by [`Platform::memremap`].
    MemRemap {
        /// The platform token.
        mapping: RawMapping,
    },
}

impl MappingHandle {
    /// Returns the start address of the mapped page.
    pub fn vaddr(&self) -> Vaddr {
        self.raw().vaddr()
    }

    /// Returns the strategy that created this mapping.
    pub fn kind(&self) -> MappingKind {
        match self {
            MappingHandle::Tracked { .. } => MappingKind::Tracked,
            MappingHandle::IoRemap { .. } => MappingKind::IoRemap,
            MappingHandle::MemRemap { .. } => MappingKind::MemRemap,
        }
    }

    fn raw(&self) -> &RawMapping {
        match self {
            MappingHandle::Tracked { mapping, .. }
            | MappingHandle::IoRemap { mapping }
            | MappingHandle::MemRemap { mapping } => mapping,
        }
    }
}

/// Maps the page frame `pfn`.
///
/// The strategies are tried in a fixed order and the first success wins:
///
/// 1. a kernel I/O mapping, if the frame is ordinary tracked memory;
/// 2. an uncached device-memory mapping;
/// 3. a generic remap that accepts any cache attribute the platform grants.
///
/// Returns `None` if all of them fail. Failed strategies are not retried.
pub fn map_frame<P: Platform + ?Sized>(platform: &P, pfn: Pfn) -> Option<MappingHandle> {
    let pa = pfn_to_paddr(pfn);

    if platform.is_tracked_frame(pfn) {
        if let Some(mapping) = platform.map_tracked_frame(pfn, CachePolicy::Uncacheable) {
            return Some(MappingHandle::Tracked { mapping, pfn });
        }
        trace!("map_frame: kernel mapping of tracked frame {:#x} failed", pfn);
    }

    if let Some(mapping) = platform.ioremap(pa, PAGE_SIZE) {
        return Some(MappingHandle::IoRemap { mapping });
    }
    trace!("map_frame: ioremap of {:#x} failed", pa);

    let flags =
        RemapFlags::WB | RemapFlags::WT | RemapFlags::WC | RemapFlags::ENC | RemapFlags::DEC;
    platform
        .memremap(pa, PAGE_SIZE, flags)
        .map(|mapping| MappingHandle::MemRemap { mapping })
}

/// Releases a mapping created by [`map_frame`].
pub fn unmap_frame<P: Platform + ?Sized>(platform: &P, handle: MappingHandle) {
    match handle {
        MappingHandle::Tracked { mapping, .. } => platform.unmap_tracked_frame(mapping),
        MappingHandle::IoRemap { mapping } => platform.iounmap(mapping),
        MappingHandle::MemRemap { mapping } => platform.memunmap(mapping),
    }
}
