// SPDX-License-Identifier: MPL-2.0

//! DRAM alias detection.
//!
//! Two physical addresses are aliases if the memory subsystem maps both of
//! them to the same storage cells. The data written through one address may
//! come back transformed when read through the other, since controllers
//! scramble data with address-dependent keys. The transform is fixed, though,
//! so *changes* written through one address show up unchanged through the
//! other:
//!
//! 1. write `m1` to the source and read `buf1` from the candidate;
//! 2. write `m2` to the source and read `buf2` from the candidate;
//! 3. the addresses alias if `buf1 ^ buf2 == m1 ^ m2`.
//!
//! The source is flushed first so that no dirty line of a previous access
//! can be written back in the middle of the probe.

mod scan;

#[cfg(test)]
mod test;

use log::{debug, info};
use rand::{Rng, rngs::ThreadRng};
use readalias_kmod::Paddr;

pub use self::scan::{ScanReport, single_bit_flips};
use crate::{CopyConfig, Error, HexDump, PhysMem, Result, channel::Channel};

/// The outcome of one alias probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeResult {
    /// Every byte change written to the source was observed at the
    /// candidate.
    Confirmed,
    /// The probe completed and the candidate did not follow the source.
    NoAlias,
    /// One of the accesses failed, so nothing can be concluded.
    AccessError,
}

/// The default number of bytes a probe writes.
pub const DEFAULT_PROBE_LEN: usize = 64;

/// A configurable alias probe.
///
/// # Examples
///
/// ```rust,ignore
/// let mut probe = AliasProbe::new();
/// probe.probe_len(128).verbose(true);
/// let result = probe.check(&mem, 0x1000, 0x1000 ^ (1 << 33), &mut config)?;
/// ```
pub struct AliasProbe<R = ThreadRng> {
    rng: R,
    probe_len: usize,
    verbose: bool,
}

impl AliasProbe<ThreadRng> {
    /// Creates a probe that draws its patterns from the thread-local RNG.
    pub fn new() -> Self {
        Self::with_rng(rand::rng())
    }
}

impl Default for AliasProbe<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> AliasProbe<R> {
    /// Creates a probe that draws its patterns from `rng`.
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            probe_len: DEFAULT_PROBE_LEN,
            verbose: false,
        }
    }

    /// Sets the number of bytes written and read by a probe.
    ///
    /// A probe touches at least one byte. The default value is
    /// [`DEFAULT_PROBE_LEN`].
    pub fn probe_len(&mut self, probe_len: usize) -> &mut Self {
        self.probe_len = probe_len.max(1);
        self
    }

    /// Sets whether the buffers of every probe are logged.
    ///
    /// The default value is `false`.
    pub fn verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Checks whether `candidate` is an alias of `source`.
    ///
    /// The probe overwrites `probe_len` bytes at `source`. Every access uses
    /// `config`, whose flush method also decides how the source is flushed
    /// before the probe.
    ///
    /// Any access failure makes the result [`ProbeResult::AccessError`],
    /// including failures that `config` would otherwise skip, which are
    /// detected through its [`PageStats`](crate::PageStats). Only a lost
    /// channel is returned as an error.
    pub fn check<C: Channel>(
        &mut self,
        mem: &PhysMem<C>,
        source: Paddr,
        candidate: Paddr,
        config: &mut CopyConfig,
    ) -> Result<ProbeResult> {
        let len = self.probe_len;
        let mut m1 = vec![0u8; len];
        let mut m2 = vec![0u8; len];
        self.rng.fill(&mut m1[..]);
        self.rng.fill(&mut m2[..]);
        // The patterns must differ in at least one byte.
        if m2 == m1 {
            m2[0] ^= 0xff;
        }

        let (buf1, buf2) = match exchange(mem, source, candidate, &m1, &m2, config) {
            Ok(Some(bufs)) => bufs,
            Ok(None) | Err(Error::AccessFailed { .. }) | Err(Error::Rejected(_)) => {
                debug!("probe {:#x} -> {:#x}: access error", source, candidate);
                return Ok(ProbeResult::AccessError);
            }
            Err(Error::BoundaryUnavailable) => return Err(Error::BoundaryUnavailable),
        };

        let expected = xor(&m1, &m2);
        let observed = xor(&buf1, &buf2);
        let result = if expected == observed {
            ProbeResult::Confirmed
        } else {
            ProbeResult::NoAlias
        };

        if self.verbose {
            debug!("buffer 1:\n{}", HexDump(&buf1));
            debug!("buffer 2:\n{}", HexDump(&buf2));
            debug!("expected XOR:\n{}", HexDump(&expected));
            debug!("observed XOR:\n{}", HexDump(&observed));
            if result == ProbeResult::Confirmed {
                info!(
                    "alias found: {:#x} -> {:#x} (diff {:#x})",
                    source,
                    candidate,
                    source ^ candidate
                );
            }
        }

        Ok(result)
    }
}

/// Checks whether `candidate` is an alias of `source` with a default probe.
///
/// See [`AliasProbe::check`].
pub fn check_alias<C: Channel>(
    mem: &PhysMem<C>,
    source: Paddr,
    candidate: Paddr,
    config: &mut CopyConfig,
) -> Result<ProbeResult> {
    AliasProbe::new().check(mem, source, candidate, config)
}

/// Runs the accesses of one probe and returns the two candidate reads.
///
/// Returns `Ok(None)` as soon as a step skipped a page.
fn exchange<C: Channel>(
    mem: &PhysMem<C>,
    source: Paddr,
    candidate: Paddr,
    m1: &[u8],
    m2: &[u8],
    config: &mut CopyConfig,
) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
    let before = config.stats();
    let skipped = |config: &CopyConfig| config.stats() != before;

    let mut buf1 = vec![0u8; m1.len()];
    let mut buf2 = vec![0u8; m2.len()];

    mem.flush_range(source, m1.len(), config)?;
    if skipped(config) {
        return Ok(None);
    }
    mem.memcpy_to_pa(source, m1, config)?;
    if skipped(config) {
        return Ok(None);
    }
    mem.memcpy_from_pa(&mut buf1, candidate, config)?;
    if skipped(config) {
        return Ok(None);
    }
    mem.memcpy_to_pa(source, m2, config)?;
    if skipped(config) {
        return Ok(None);
    }
    mem.memcpy_from_pa(&mut buf2, candidate, config)?;
    if skipped(config) {
        return Ok(None);
    }

    Ok(Some((buf1, buf2)))
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}
