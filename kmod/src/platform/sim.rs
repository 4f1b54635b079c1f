// SPDX-License-Identifier: MPL-2.0

//! A simulated platform for tests.
//!
//! [`SimPlatform`] models a small physical address space made of frames of
//! three kinds:
//!
//! - [`FrameKind::Ram`]: ordinary memory tracked by the kernel, which may be
//!   marked reserved;
//! - [`FrameKind::Mmio`]: untracked memory that accepts uncached mappings;
//! - [`FrameKind::Firmware`]: untracked memory that only a generic remap can
//!   reach.
//!
//! Every frame is backed by a storage cell. Several frames may share a cell,
//! which is how aliases are modelled. Data can be scrambled on its way to and
//! from the cells by a [`Scrambler`] keyed on the physical address used for
//! the access, in the way memory controllers scramble DRAM contents.
//!
//! Mappings are windows: a mapping gets a private page-sized buffer holding
//! the descrambled view of the cell, and releasing the mapping scrambles the
//! buffer back into the cell. Releasing a window through the wrong primitive
//! is recorded in [`SimCounters::bad_releases`].

use alloc::{
    boxed::Box,
    collections::{BTreeMap, BTreeSet},
    vec,
    vec::Vec,
};
use core::ops::Range;

use log::error;
use spin::Mutex;

use super::{Platform, RawMapping};
use crate::mm::{
    CachePolicy, PAGE_SIZE, Paddr, Pfn, RemapFlags, Vaddr, map::MappingKind, page_offset,
    paddr_to_pfn, pfn_to_paddr,
};

/// The kind of a simulated frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Tracked memory.
    Ram,
    /// Untracked device memory.
    Mmio,
    /// Untracked memory that can only be remapped.
    Firmware,
}

/// A fixed bitwise transform applied to data on its way to and from storage.
///
/// A value written through address `w` and read back through address `r` is
/// `descramble(r, scramble(w, value))`. For the transform to model a memory
/// controller, this must equal `value` when `w == r`.
pub trait Scrambler: Send {
    /// Transforms a byte written through `pa` into its stored form.
    fn scramble(&self, pa: Paddr, byte: u8) -> u8;

    /// Transforms a stored byte read through `pa` back into data.
    fn descramble(&self, pa: Paddr, byte: u8) -> u8;
}

/// XORs every byte with a key derived from its physical address.
#[derive(Clone, Copy, Debug)]
pub struct XorScrambler {
    seed: u64,
}

impl XorScrambler {
    /// Creates a scrambler whose keys are derived from `seed`.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn key(&self, pa: Paddr) -> u8 {
        let word = splitmix64(self.seed ^ (pa & !7));
        (word >> ((pa & 7) * 8)) as u8
    }
}

impl Scrambler for XorScrambler {
    fn scramble(&self, pa: Paddr, byte: u8) -> u8 {
        byte ^ self.key(pa)
    }

    fn descramble(&self, pa: Paddr, byte: u8) -> u8 {
        byte ^ self.key(pa)
    }
}

/// Inverts and rotates every byte, then XORs it with an address key.
///
/// Unlike [`XorScrambler`], the stored form is not the data XOR some key,
/// but the transform is still affine, so XOR differences survive it.
#[derive(Clone, Copy, Debug)]
pub struct RotateXorScrambler {
    keys: XorScrambler,
    rotation: u32,
}

impl RotateXorScrambler {
    /// Creates a scrambler with the given key seed and bit rotation.
    pub fn new(seed: u64, rotation: u32) -> Self {
        Self {
            keys: XorScrambler::new(seed),
            rotation,
        }
    }
}

impl Scrambler for RotateXorScrambler {
    fn scramble(&self, pa: Paddr, byte: u8) -> u8 {
        !byte.rotate_left(self.rotation) ^ self.keys.key(pa)
    }

    fn descramble(&self, pa: Paddr, byte: u8) -> u8 {
        (!(byte ^ self.keys.key(pa))).rotate_right(self.rotation)
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// What happened on a [`SimPlatform`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimCounters {
    /// Successful [`Platform::map_tracked_frame`] calls.
    pub tracked_maps: usize,
    /// Successful [`Platform::ioremap`] calls.
    pub io_maps: usize,
    /// Successful [`Platform::memremap`] calls.
    pub remaps: usize,
    /// Windows released through the primitive that created them.
    pub releases: usize,
    /// Releases of unknown windows or through the wrong primitive.
    pub bad_releases: usize,
    /// Flushed cache lines.
    pub line_flushes: usize,
    /// Memory fences.
    pub fences: usize,
    /// Whole-cache write-back-and-invalidate operations.
    pub full_flushes: usize,
    /// Windows written back to a storage cell.
    pub write_backs: usize,
}

#[derive(Clone, Copy, Debug)]
struct Frame {
    kind: FrameKind,
    cell: Pfn,
    reserved: bool,
}

#[derive(Debug)]
struct Window {
    kind: MappingKind,
    pa: Paddr,
    cell: Pfn,
}

struct SimState {
    frames: BTreeMap<Pfn, Frame>,
    cells: BTreeMap<Pfn, Box<[u8]>>,
    windows: BTreeMap<Vaddr, Window>,
    failing: BTreeSet<(Pfn, MappingKind)>,
    scrambler: Option<Box<dyn Scrambler>>,
    last_remap_flags: Option<RemapFlags>,
    last_remap_policy: Option<CachePolicy>,
    counters: SimCounters,
}

impl SimState {
    fn scramble(&self, pa: Paddr, byte: u8) -> u8 {
        self.scrambler.as_ref().map_or(byte, |s| s.scramble(pa, byte))
    }

    fn descramble(&self, pa: Paddr, byte: u8) -> u8 {
        self.scrambler.as_ref().map_or(byte, |s| s.descramble(pa, byte))
    }

    fn frame(&self, pa: Paddr) -> &Frame {
        let pfn = paddr_to_pfn(pa);
        self.frames
            .get(&pfn)
            .unwrap_or_else(|| panic!("no simulated frame at {:#x}", pa))
    }

    fn open_window(&mut self, pfn: Pfn, kind: MappingKind) -> Option<RawMapping> {
        let frame = *self.frames.get(&pfn)?;
        if self.failing.contains(&(pfn, kind)) {
            return None;
        }

        let pa = pfn_to_paddr(pfn);
        let cell = &self.cells[&frame.cell];
        let view: Vec<u8> = (0..PAGE_SIZE)
            .map(|i| self.descramble(pa + i as u64, cell[i]))
            .collect();
        let vaddr = Box::into_raw(view.into_boxed_slice()) as *mut u8 as Vaddr;

        self.windows.insert(
            vaddr,
            Window {
                kind,
                pa,
                cell: frame.cell,
            },
        );
        match kind {
            MappingKind::Tracked => self.counters.tracked_maps += 1,
            MappingKind::IoRemap => self.counters.io_maps += 1,
            MappingKind::MemRemap => self.counters.remaps += 1,
        }

        // SAFETY: The window stays allocated until `close_window` frees it.
        Some(unsafe { RawMapping::new(vaddr, PAGE_SIZE) })
    }

    fn close_window(&mut self, mapping: RawMapping, kind: MappingKind) {
        let Some(window) = self.windows.remove(&mapping.vaddr()) else {
            error!("release of unknown window {:#x}", mapping.vaddr());
            self.counters.bad_releases += 1;
            return;
        };
        if window.kind != kind {
            error!(
                "window {:#x} created by {:?} released by {:?}",
                mapping.vaddr(),
                window.kind,
                kind
            );
            self.counters.bad_releases += 1;
        } else {
            self.counters.releases += 1;
        }

        // SAFETY: The window was allocated by `open_window` as a boxed slice
        // of `PAGE_SIZE` bytes and has just been removed from the window
        // table, so nobody else refers to it.
        let view = unsafe {
            Box::from_raw(core::ptr::slice_from_raw_parts_mut(
                mapping.vaddr() as *mut u8,
                PAGE_SIZE,
            ))
        };
        let stored: Vec<u8> = view
            .iter()
            .enumerate()
            .map(|(i, byte)| self.scramble(window.pa + i as u64, *byte))
            .collect();
        if let Some(cell) = self.cells.get_mut(&window.cell) {
            cell.copy_from_slice(&stored);
        }
        self.counters.write_backs += 1;
    }
}

/// A simulated platform. See the module documentation.
pub struct SimPlatform {
    state: Mutex<SimState>,
}

impl SimPlatform {
    /// Creates an empty physical address space.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                frames: BTreeMap::new(),
                cells: BTreeMap::new(),
                windows: BTreeMap::new(),
                failing: BTreeSet::new(),
                scrambler: None,
                last_remap_flags: None,
                last_remap_policy: None,
                counters: SimCounters::default(),
            }),
        }
    }

    /// Adds frames of the given kind, each with its own zeroed storage cell.
    pub fn add_frames(&self, pfns: Range<Pfn>, kind: FrameKind) -> &Self {
        let mut state = self.state.lock();
        for pfn in pfns {
            state.cells.insert(pfn, vec![0u8; PAGE_SIZE].into_boxed_slice());
            state.frames.insert(
                pfn,
                Frame {
                    kind,
                    cell: pfn,
                    reserved: false,
                },
            );
        }
        self
    }

    /// Adds tracked memory frames.
    pub fn add_ram(&self, pfns: Range<Pfn>) -> &Self {
        self.add_frames(pfns, FrameKind::Ram)
    }

    /// Adds a frame of the given kind that shares the storage cell of
    /// `target`.
    ///
    /// # Panics
    ///
    /// Panics if `target` does not exist.
    pub fn add_alias(&self, alias: Pfn, target: Pfn, kind: FrameKind) -> &Self {
        let mut state = self.state.lock();
        let cell = state.frames[&target].cell;
        state.frames.insert(
            alias,
            Frame {
                kind,
                cell,
                reserved: false,
            },
        );
        self
    }

    /// Marks a frame as reserved.
    pub fn mark_reserved(&self, pfn: Pfn) -> &Self {
        if let Some(frame) = self.state.lock().frames.get_mut(&pfn) {
            frame.reserved = true;
        }
        self
    }

    /// Makes the given mapping strategy fail for `pfn`.
    pub fn fail_mapping(&self, pfn: Pfn, kind: MappingKind) -> &Self {
        self.state.lock().failing.insert((pfn, kind));
        self
    }

    /// Installs a scrambler for all later accesses.
    ///
    /// Storage cells keep their raw contents, so this should be called before
    /// any data is stored.
    pub fn set_scrambler(&self, scrambler: impl Scrambler + 'static) -> &Self {
        self.state.lock().scrambler = Some(Box::new(scrambler));
        self
    }

    /// Stores `data` through the physical address `pa`, as a write from the
    /// memory controller's point of view.
    ///
    /// # Panics
    ///
    /// Panics if any byte of the range lies outside the simulated frames.
    pub fn store(&self, pa: Paddr, data: &[u8]) {
        let mut state = self.state.lock();
        for (i, byte) in data.iter().enumerate() {
            let pa = pa + i as u64;
            let stored = state.scramble(pa, *byte);
            let cell = state.frame(pa).cell;
            if let Some(cell) = state.cells.get_mut(&cell) {
                cell[page_offset(pa)] = stored;
            }
        }
    }

    /// Loads `len` bytes through the physical address `pa`.
    pub fn load(&self, pa: Paddr, len: usize) -> Vec<u8> {
        let state = self.state.lock();
        (0..len as u64)
            .map(|i| {
                let pa = pa + i;
                let stored = state.cells[&state.frame(pa).cell][page_offset(pa)];
                state.descramble(pa, stored)
            })
            .collect()
    }

    /// Returns the raw contents of the storage cell behind `pa`.
    pub fn raw(&self, pa: Paddr, len: usize) -> Vec<u8> {
        let state = self.state.lock();
        (0..len as u64)
            .map(|i| {
                let pa = pa + i;
                state.cells[&state.frame(pa).cell][page_offset(pa)]
            })
            .collect()
    }

    /// Returns the cache policy granted to the last successful generic remap.
    pub fn last_remap_policy(&self) -> Option<CachePolicy> {
        self.state.lock().last_remap_policy
    }

    /// Returns the counters.
    pub fn counters(&self) -> SimCounters {
        self.state.lock().counters
    }

    /// Returns the number of windows that have not been released.
    pub fn live_windows(&self) -> usize {
        self.state.lock().windows.len()
    }

    /// Returns the attribute set of the last generic remap request.
    pub fn last_remap_flags(&self) -> Option<RemapFlags> {
        self.state.lock().last_remap_flags
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: Windows are heap allocations that are only freed by the release
// methods, so every returned mapping stays valid until it is released.
unsafe impl Platform for SimPlatform {
    fn is_tracked_frame(&self, pfn: Pfn) -> bool {
        self.state
            .lock()
            .frames
            .get(&pfn)
            .is_some_and(|frame| frame.kind == FrameKind::Ram)
    }

    fn is_reserved_frame(&self, pfn: Pfn) -> bool {
        self.state
            .lock()
            .frames
            .get(&pfn)
            .is_some_and(|frame| frame.reserved)
    }

    fn map_tracked_frame(&self, pfn: Pfn, _cache: CachePolicy) -> Option<RawMapping> {
        let mut state = self.state.lock();
        if state.frames.get(&pfn)?.kind != FrameKind::Ram {
            return None;
        }
        state.open_window(pfn, MappingKind::Tracked)
    }

    fn unmap_tracked_frame(&self, mapping: RawMapping) {
        self.state.lock().close_window(mapping, MappingKind::Tracked);
    }

    fn ioremap(&self, pa: Paddr, size: usize) -> Option<RawMapping> {
        debug_assert_eq!(size, PAGE_SIZE);
        let pfn = paddr_to_pfn(pa);
        let mut state = self.state.lock();
        if state.frames.get(&pfn)?.kind != FrameKind::Mmio {
            return None;
        }
        state.open_window(pfn, MappingKind::IoRemap)
    }

    fn iounmap(&self, mapping: RawMapping) {
        self.state.lock().close_window(mapping, MappingKind::IoRemap);
    }

    fn memremap(&self, pa: Paddr, size: usize, flags: RemapFlags) -> Option<RawMapping> {
        debug_assert_eq!(size, PAGE_SIZE);
        let mut state = self.state.lock();
        state.last_remap_flags = Some(flags);
        // Grant the first requested attribute.
        let policy = flags.iter().next()?.cache_policy()?;
        let mapping = state.open_window(paddr_to_pfn(pa), MappingKind::MemRemap)?;
        state.last_remap_policy = Some(policy);
        Some(mapping)
    }

    fn memunmap(&self, mapping: RawMapping) {
        self.state.lock().close_window(mapping, MappingKind::MemRemap);
    }

    unsafe fn flush_cache_line(&self, vaddr: Vaddr) {
        let mut state = self.state.lock();
        debug_assert!(
            state
                .windows
                .range(..=vaddr)
                .next_back()
                .is_some_and(|(start, _)| vaddr < start + PAGE_SIZE),
            "flushing an unmapped line"
        );
        state.counters.line_flushes += 1;
    }

    fn memory_fence(&self) {
        crate::arch::memory_fence();
        self.state.lock().counters.fences += 1;
    }

    fn wbinvd_on_all_cpus(&self) {
        self.state.lock().counters.full_flushes += 1;
    }
}

impl Drop for SimPlatform {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for vaddr in core::mem::take(&mut state.windows).into_keys() {
            // SAFETY: See `SimState::close_window`.
            drop(unsafe {
                Box::from_raw(core::ptr::slice_from_raw_parts_mut(
                    vaddr as *mut u8,
                    PAGE_SIZE,
                ))
            });
        }
    }
}
