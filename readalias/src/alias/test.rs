// SPDX-License-Identifier: MPL-2.0

use rand::{RngCore, SeedableRng, rngs::StdRng};
use readalias_kmod::{
    AccessBoundary,
    platform::sim::{FrameKind, SimPlatform, XorScrambler},
};

use super::*;
use crate::{FlushMethod, PageStats};

/// Frames 0 to 15 are memory; frame 0x102 mirrors frame 2.
fn boundary() -> AccessBoundary<SimPlatform> {
    let _ = env_logger::builder().is_test(true).try_init();

    let sim = SimPlatform::new();
    sim.set_scrambler(XorScrambler::new(0xdead_beef));
    sim.add_ram(0..0x10).add_alias(0x102, 2, FrameKind::Mmio);
    AccessBoundary::new(sim)
}

fn probe() -> AliasProbe<StdRng> {
    AliasProbe::with_rng(StdRng::seed_from_u64(7))
}

fn cache_line_flush() -> CopyConfig {
    let mut config = CopyConfig::new();
    config.flush_method(FlushMethod::CacheLineFlush);
    config
}

#[test]
fn self_alias() {
    let boundary = boundary();
    let mem = PhysMem::open(boundary.open());
    let mut config = cache_line_flush();

    let result = probe().check(&mem, 0x1000, 0x1000, &mut config);
    assert_eq!(result, Ok(ProbeResult::Confirmed));
    assert_eq!(config.stats(), PageStats::default());
}

#[test]
fn scrambled_alias() {
    let boundary = boundary();
    let mem = PhysMem::open(boundary.open());
    let mut config = cache_line_flush();

    let result = probe().check(&mem, 0x2040, 0x102040, &mut config);
    assert_eq!(result, Ok(ProbeResult::Confirmed));
}

#[test]
fn distinct_pages() {
    let boundary = boundary();
    let mem = PhysMem::open(boundary.open());
    let mut config = CopyConfig::new();

    let result = probe().check(&mem, 0x2040, 0x3040, &mut config);
    assert_eq!(result, Ok(ProbeResult::NoAlias));
    // Same page, different bytes.
    let result = probe().check(&mem, 0x2040, 0x2080, &mut config);
    assert_eq!(result, Ok(ProbeResult::NoAlias));
}

#[test]
fn probe_across_a_page_boundary() {
    let boundary = boundary();
    let mem = PhysMem::open(boundary.open());
    let mut config = cache_line_flush();

    let result = probe().probe_len(256).check(&mem, 0x1f80, 0x1f80, &mut config);
    assert_eq!(result, Ok(ProbeResult::Confirmed));
}

#[test]
fn single_byte_probe() {
    let boundary = boundary();
    let mem = PhysMem::open(boundary.open());
    let mut config = CopyConfig::new();

    let mut probe = probe();
    probe.probe_len(0);
    for _ in 0..32 {
        assert_eq!(
            probe.check(&mem, 0x2000, 0x102000, &mut config),
            Ok(ProbeResult::Confirmed)
        );
        assert_eq!(
            probe.check(&mem, 0x2000, 0x2001, &mut config),
            Ok(ProbeResult::NoAlias)
        );
    }
}

/// Produces the same byte forever.
struct ConstRng(u8);

impl RngCore for ConstRng {
    fn next_u32(&mut self) -> u32 {
        u32::from_ne_bytes([self.0; 4])
    }

    fn next_u64(&mut self) -> u64 {
        u64::from_ne_bytes([self.0; 8])
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        dst.fill(self.0);
    }
}

#[test]
fn constant_rng() {
    let boundary = boundary();
    let mem = PhysMem::open(boundary.open());
    let mut config = cache_line_flush();

    for len in [1, 64] {
        let mut probe = AliasProbe::with_rng(ConstRng(0x5a));
        probe.probe_len(len);
        assert_eq!(
            probe.check(&mem, 0x1000, 0x1000, &mut config),
            Ok(ProbeResult::Confirmed)
        );
        assert_eq!(
            probe.check(&mem, 0x2040, 0x102040, &mut config),
            Ok(ProbeResult::Confirmed)
        );
        assert_eq!(
            probe.check(&mem, 0x2040, 0x3040, &mut config),
            Ok(ProbeResult::NoAlias)
        );
    }
}

#[test]
fn reserved_source() {
    let boundary = boundary();
    boundary.platform().mark_reserved(3);
    let mem = PhysMem::open(boundary.open());
    let mut config = cache_line_flush();

    let result = probe().check(&mem, 0x3000, 0x3000, &mut config);
    assert_eq!(result, Ok(ProbeResult::AccessError));
    assert_eq!(boundary.stats().writes, 0);
    assert_eq!(config.stats().reserved_pages, 1);
}

#[test]
fn reserved_source_without_flush() {
    let boundary = boundary();
    boundary.platform().mark_reserved(3);
    let mem = PhysMem::open(boundary.open());
    let mut config = CopyConfig::new();

    let result = probe().check(&mem, 0x3000, 0x3000, &mut config);
    assert_eq!(result, Ok(ProbeResult::AccessError));
    // The refused write is the last request of the probe.
    assert_eq!(boundary.stats().writes, 1);
    assert_eq!(boundary.stats().reads, 0);
    assert_eq!(boundary.platform().raw(0x3000, 64), [0u8; 64]);
}

#[test]
fn unmappable_candidate() {
    let boundary = boundary();
    let mem = PhysMem::open(boundary.open());

    let mut config = CopyConfig::new();
    let result = probe().check(&mem, 0x1000, 0x100_0000, &mut config);
    assert_eq!(result, Ok(ProbeResult::AccessError));
    assert_eq!(config.stats().map_failures, 1);

    let mut config = CopyConfig::new();
    config.err_on_access_fail(true);
    let result = probe().check(&mem, 0x1000, 0x100_0000, &mut config);
    assert_eq!(result, Ok(ProbeResult::AccessError));
    assert_eq!(config.stats().map_failures, 1);
}

#[test]
fn closed_channel() {
    let boundary = boundary();
    let mut mem = PhysMem::open(boundary.open());
    mem.close();

    let result = probe().check(&mem, 0x1000, 0x1000, &mut CopyConfig::new());
    assert_eq!(result, Err(Error::BoundaryUnavailable));
    assert_eq!(boundary.nr_handles(), 0);
}

#[test]
fn unloaded_boundary() {
    let boundary = boundary();
    let mem = PhysMem::open(boundary.open());
    boundary.unload();

    let result = probe().check(&mem, 0x1000, 0x1000, &mut cache_line_flush());
    assert_eq!(result, Err(Error::BoundaryUnavailable));
}

#[test]
fn verbose_probe() {
    let boundary = boundary();
    let mem = PhysMem::open(boundary.open());

    let result = probe()
        .verbose(true)
        .check(&mem, 0x2000, 0x102000, &mut CopyConfig::new());
    assert_eq!(result, Ok(ProbeResult::Confirmed));
}

#[test]
fn scan() {
    let boundary = boundary();
    let mem = PhysMem::open(boundary.open());
    let mut config = cache_line_flush();

    let report = probe()
        .scan(&mem, 0x2000, single_bit_flips(0x2000, 12..21), &mut config)
        .unwrap();
    assert_eq!(report.aliases, [0x102000]);
    assert_eq!(report.no_alias, [0x3000, 0x0, 0x6000, 0xa000]);
    assert_eq!(report.access_errors, [0x12000, 0x22000, 0x42000, 0x82000]);
    assert_eq!(report.len(), 9);
    assert_eq!(config.stats().map_failures, 4);
}

#[test]
fn scan_stops_without_channel() {
    let boundary = boundary();
    let mut mem = PhysMem::open(boundary.open());
    mem.close();

    let result = probe().scan(&mem, 0x2000, [0x3000, 0x4000], &mut CopyConfig::new());
    assert_eq!(result, Err(Error::BoundaryUnavailable));
}

#[test]
fn bit_flip_candidates() {
    let flips: Vec<Paddr> = single_bit_flips(0x1000, 12..15).collect();
    assert_eq!(flips, [0x0, 0x3000, 0x5000]);
    assert_eq!(single_bit_flips(0, 62..70).count(), 2);
    assert_eq!(single_bit_flips(0, 5..5).count(), 0);
}
