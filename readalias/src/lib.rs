// SPDX-License-Identifier: MPL-2.0

//! Physical memory access and DRAM alias detection.
//!
//! This crate is the unprivileged half of readalias. It talks to the
//! privileged helper of [`readalias_kmod`] through a [`Channel`], turns
//! arbitrary physical ranges into the single-page requests the helper
//! accepts, and builds the alias probe on top of that.
//!
//! ```rust,ignore
//! let boundary = AccessBoundary::new(platform);
//! let mem = PhysMem::open(boundary.open());
//!
//! let mut config = CopyConfig::new();
//! config.flush_method(FlushMethod::CacheLineFlush);
//! let result = check_alias(&mem, 0x1000, 0x1000 ^ (1 << 30), &mut config)?;
//! ```

#![warn(missing_docs)]

pub mod alias;
pub mod channel;
mod chunk;
pub mod config;
mod error;
pub mod hexdump;
pub mod phys;

pub use readalias_kmod::{FlushMethod, PAGE_SIZE, Paddr};

pub use self::{
    alias::{AliasProbe, ProbeResult, ScanReport, check_alias, single_bit_flips},
    channel::Channel,
    config::{CopyConfig, PageStats},
    error::{AccessFailure, Error, Result},
    hexdump::HexDump,
    phys::PhysMem,
};
