// SPDX-License-Identifier: MPL-2.0

use core::ops::Range;

use log::debug;
use rand::Rng;
use readalias_kmod::Paddr;

use super::{AliasProbe, ProbeResult};
use crate::{CopyConfig, PhysMem, Result, channel::Channel};

/// The candidates of a scan, sorted by probe result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Confirmed aliases of the source.
    pub aliases: Vec<Paddr>,
    /// Candidates that are not aliases.
    pub no_alias: Vec<Paddr>,
    /// Candidates for which a probe could not complete.
    pub access_errors: Vec<Paddr>,
}

impl ScanReport {
    /// Returns the number of probed candidates.
    pub fn len(&self) -> usize {
        self.aliases.len() + self.no_alias.len() + self.access_errors.len()
    }

    /// Returns whether no candidate was probed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Rng> AliasProbe<R> {
    /// Probes every candidate against `source`, one after the other.
    ///
    /// The scan stops only if the channel is lost.
    pub fn scan<C, I>(
        &mut self,
        mem: &PhysMem<C>,
        source: Paddr,
        candidates: I,
        config: &mut CopyConfig,
    ) -> Result<ScanReport>
    where
        C: Channel,
        I: IntoIterator<Item = Paddr>,
    {
        let mut report = ScanReport::default();
        for candidate in candidates {
            match self.check(mem, source, candidate, config)? {
                ProbeResult::Confirmed => report.aliases.push(candidate),
                ProbeResult::NoAlias => report.no_alias.push(candidate),
                ProbeResult::AccessError => report.access_errors.push(candidate),
            }
        }
        debug!(
            "scan of {:#x}: {} aliases, {} errors out of {}",
            source,
            report.aliases.len(),
            report.access_errors.len(),
            report.len()
        );
        Ok(report)
    }
}

/// Returns the addresses that differ from `source` in exactly one of the
/// given bits.
///
/// Bits that are 64 or above are ignored.
pub fn single_bit_flips(source: Paddr, bits: Range<u32>) -> impl Iterator<Item = Paddr> {
    bits.filter(|&bit| bit < Paddr::BITS)
        .map(move |bit| source ^ (1 << bit))
}
