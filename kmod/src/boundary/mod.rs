// SPDX-License-Identifier: MPL-2.0

//! The Privileged Access Boundary.
//!
//! The boundary is the only door from unprivileged code into this crate. It
//! accepts one fixed-shape request per call, each touching at most one page,
//! and answers with a status code:
//!
//! | Code | Meaning |
//! |------|---------|
//! | `0`  | [`PageStatus::Ok`] |
//! | `1`  | [`PageStatus::Reserved`]: the page is reserved and was not touched |
//! | `2`  | [`PageStatus::MapFailed`]: the page could not be mapped |
//! | `<0` | a negative errno for malformed requests and an unloaded boundary |
//!
//! Copies go through a single page-sized staging buffer owned by the
//! boundary, in the same way a driver copies from and to user space through a
//! kernel buffer. The buffer lock is held for the whole request, which
//! serializes concurrent clients.


use alloc::{boxed::Box, vec};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use int_to_c_enum::TryFromInt;
use log::{debug, trace, warn};
use spin::Mutex;

use crate::{
    Error, Result,
    mm::{AccessPolicy, FlushMethod, PAGE_SIZE, Paddr, flush_page, read_page, write_page},
    platform::Platform,
};

/// The commands understood by the boundary.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromInt)]
pub enum Command {
    /// Copies the request buffer to `pa`.
    WriteToPhysical = 0,
    /// Copies from `pa` into the request buffer.
    ReadFromPhysical = 1,
    /// Flushes the page containing `pa`.
    FlushPhysical = 2,
    /// Writes back and invalidates all caches on all CPUs.
    FlushAllCaches = 3,
}

/// The non-negative status codes of a request.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromInt)]
pub enum PageStatus {
    /// The request succeeded.
    Ok = 0,
    /// The page is reserved and reserved access was not requested.
    Reserved = 1,
    /// The page could not be mapped.
    MapFailed = 2,
}

/// The client buffer of a request.
#[derive(Debug)]
pub enum UserBuf<'a> {
    /// The bytes to write, for [`Command::WriteToPhysical`].
    Src(&'a [u8]),
    /// The space to read into, for [`Command::ReadFromPhysical`].
    Dst(&'a mut [u8]),
    /// No buffer, for the flush commands.
    None,
}

impl UserBuf<'_> {
    /// Returns the length of the buffer.
    pub fn len(&self) -> usize {
        match self {
            UserBuf::Src(buf) => buf.len(),
            UserBuf::Dst(buf) => buf.len(),
            UserBuf::None => 0,
        }
    }

    /// Returns whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The arguments of a request.
#[derive(Debug)]
pub struct AccessArgs<'a> {
    /// The client buffer. Its length is the byte count of the request.
    pub buffer: UserBuf<'a>,
    /// The target physical address.
    pub pa: Paddr,
    /// The raw [`FlushMethod`].
    pub flush: u32,
    /// Whether reserved pages may be accessed.
    pub access_reserved: bool,
}

impl AccessArgs<'_> {
    /// Returns the number of bytes the request transfers.
    pub fn count(&self) -> usize {
        self.buffer.len()
    }

    fn policy(&self) -> AccessPolicy {
        AccessPolicy {
            flush: FlushMethod::from_raw(self.flush),
            access_reserved: self.access_reserved,
        }
    }
}

/// Request counters of a boundary.
///
/// A request is counted once it has been decoded and passed the size check,
/// i.e., once it could have had an effect on physical memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundaryStats {
    /// [`Command::WriteToPhysical`] requests.
    pub writes: usize,
    /// [`Command::ReadFromPhysical`] requests.
    pub reads: usize,
    /// [`Command::FlushPhysical`] requests.
    pub flushes: usize,
    /// [`Command::FlushAllCaches`] requests.
    pub full_flushes: usize,
    /// Requests rejected with a negative status.
    pub rejected: usize,
}

/// The Privileged Access Boundary.
pub struct AccessBoundary<P> {
    platform: P,
    staging: Mutex<Box<[u8]>>,
    loaded: AtomicBool,
    nr_handles: AtomicUsize,
    stats: Mutex<BoundaryStats>,
}

impl<P: Platform> AccessBoundary<P> {
    /// Creates a loaded boundary on top of `platform`.
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            staging: Mutex::new(vec![0u8; PAGE_SIZE].into_boxed_slice()),
            loaded: AtomicBool::new(true),
            nr_handles: AtomicUsize::new(0),
            stats: Mutex::new(BoundaryStats::default()),
        }
    }

    /// Returns the underlying platform.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Opens a handle to the boundary.
    ///
    /// The handle is closed when dropped.
    pub fn open(&self) -> BoundaryHandle<'_, P> {
        let nr_handles = self.nr_handles.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("opened access boundary ({} handles)", nr_handles);
        BoundaryHandle { boundary: self }
    }

    /// Returns the number of open handles.
    pub fn nr_handles(&self) -> usize {
        self.nr_handles.load(Ordering::Relaxed)
    }

    /// Unloads the boundary.
    ///
    /// All later requests fail with `-ENODEV`, including those issued through
    /// handles that are still open.
    pub fn unload(&self) {
        // Wait for the request in flight, if any.
        let _staging = self.staging.lock();
        self.loaded.store(false, Ordering::Release);
        debug!("unloaded access boundary");
    }

    /// Returns whether the boundary accepts requests.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the request counters.
    pub fn stats(&self) -> BoundaryStats {
        *self.stats.lock()
    }

    /// Handles one request and returns its status code.
    pub fn ioctl(&self, cmd: u32, args: &mut AccessArgs<'_>) -> i32 {
        let status = match self.handle(cmd, args) {
            Ok(()) => PageStatus::Ok as i32,
            Err(err) => err.status(),
        };
        if status < 0 {
            self.stats.lock().rejected += 1;
        }
        trace!("ioctl: cmd={} pa={:#x} count={} -> {}", cmd, args.pa, args.count(), status);
        status
    }

    fn handle(&self, cmd: u32, args: &mut AccessArgs<'_>) -> Result<()> {
        let cmd = Command::try_from(cmd).map_err(|_| {
            warn!("unknown cmd={}", cmd);
            Error::InvalidArgs
        })?;

        let mut staging = self.staging.lock();
        if !self.is_loaded() {
            return Err(Error::NoDevice);
        }
        // Requests never span pages, so anything above one page is malformed.
        let count = args.count();
        if count > PAGE_SIZE {
            return Err(Error::InvalidArgs);
        }

        let policy = args.policy();
        match cmd {
            Command::WriteToPhysical => {
                let UserBuf::Src(src) = &args.buffer else {
                    return Err(Error::BadBuffer);
                };
                self.stats.lock().writes += 1;
                staging[..count].copy_from_slice(src);
                write_page(&self.platform, args.pa, &staging[..count], policy)
            }
            Command::ReadFromPhysical => {
                let UserBuf::Dst(dst) = &mut args.buffer else {
                    return Err(Error::BadBuffer);
                };
                self.stats.lock().reads += 1;
                read_page(&self.platform, &mut staging[..count], args.pa, policy)?;
                dst.copy_from_slice(&staging[..count]);
                Ok(())
            }
            Command::FlushPhysical => {
                self.stats.lock().flushes += 1;
                flush_page(&self.platform, args.pa, policy)
            }
            Command::FlushAllCaches => {
                self.stats.lock().full_flushes += 1;
                self.platform.wbinvd_on_all_cpus();
                Ok(())
            }
        }
    }
}

/// An open handle to an [`AccessBoundary`].
pub struct BoundaryHandle<'a, P> {
    boundary: &'a AccessBoundary<P>,
}

impl<P: Platform> BoundaryHandle<'_, P> {
    /// Issues one request through this handle.
    pub fn ioctl(&self, cmd: Command, args: &mut AccessArgs<'_>) -> i32 {
        self.boundary.ioctl(cmd as u32, args)
    }

    /// Returns the boundary this handle is connected to.
    pub fn boundary(&self) -> &AccessBoundary<P> {
        self.boundary
    }
}

impl<P> Drop for BoundaryHandle<'_, P> {
    fn drop(&mut self) {
        self.boundary.nr_handles.fetch_sub(1, Ordering::Relaxed);
        debug!("closed access boundary handle");
    }
}
