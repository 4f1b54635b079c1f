// SPDX-License-Identifier: MPL-2.0

//! The privileged half of readalias.
//!
//! This crate owns everything that needs privileges to touch physical memory:
//! mapping an arbitrary page frame into a temporary kernel window, copying
//! bytes in or out of that window, and flushing caches so that the copied
//! bytes actually travel to or from DRAM.
//!
//! All of it is exposed to unprivileged code only through the
//! [`AccessBoundary`], which accepts single-page requests and answers with a
//! status code, much like an `ioctl` on a character device.
//!
//! The machine itself is abstracted by the [`Platform`] trait. With the `sim`
//! feature, [`platform::sim::SimPlatform`] provides a simulated physical
//! address space that supports aliasing, data scrambling and failure
//! injection.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod arch;
pub mod boundary;
mod error;
pub mod mm;
pub mod platform;

pub use self::{
    boundary::{
        AccessArgs, AccessBoundary, BoundaryHandle, BoundaryStats, Command, PageStatus, UserBuf,
    },
    error::{EFAULT, EINVAL, ENODEV, Error, Result},
    mm::{FlushMethod, PAGE_SHIFT, PAGE_SIZE, Paddr, Pfn, Vaddr},
    platform::{Platform, RawMapping},
};
