// SPDX-License-Identifier: MPL-2.0

use rand::{Rng, SeedableRng, rngs::StdRng};
use readalias::{
    AliasProbe, CopyConfig, FlushMethod, PAGE_SIZE, Paddr, PageStats, PhysMem, ProbeResult,
    check_alias, single_bit_flips,
};
use readalias_kmod::{
    AccessBoundary,
    platform::sim::{FrameKind, RotateXorScrambler, SimPlatform, XorScrambler},
};

const NR_FRAMES: u64 = 64;
/// Frames `MIRROR..MIRROR + NR_FRAMES` mirror frames `0..NR_FRAMES`.
const MIRROR: u64 = 1 << 8;

fn mirrored(sim: SimPlatform) -> AccessBoundary<SimPlatform> {
    let _ = env_logger::builder().is_test(true).try_init();

    sim.add_ram(0..NR_FRAMES);
    for pfn in 0..NR_FRAMES {
        sim.add_alias(MIRROR + pfn, pfn, FrameKind::Firmware);
    }
    AccessBoundary::new(sim)
}

fn cache_line_flush() -> CopyConfig {
    let mut config = CopyConfig::new();
    config.flush_method(FlushMethod::CacheLineFlush);
    config
}

fn mirror_of(pa: Paddr) -> Paddr {
    pa ^ (MIRROR << 12)
}

#[test]
fn self_alias() {
    let boundary = mirrored(SimPlatform::new());
    let mem = PhysMem::open(boundary.open());
    let mut config = cache_line_flush();

    assert_eq!(
        check_alias(&mem, 0x1000, 0x1000, &mut config),
        Ok(ProbeResult::Confirmed)
    );
}

#[test]
fn reserved_source_never_written() {
    let boundary = mirrored(SimPlatform::new());
    boundary.platform().mark_reserved(1);
    let mem = PhysMem::open(boundary.open());
    let mut config = cache_line_flush();

    assert_eq!(
        check_alias(&mem, 0x1000, mirror_of(0x1000), &mut config),
        Ok(ProbeResult::AccessError)
    );
    assert_eq!(boundary.stats().writes, 0);
    assert_eq!(boundary.platform().counters().tracked_maps, 0);
}

#[test]
fn aliases_survive_scrambling() {
    let scramblers: [fn(&SimPlatform); 3] = [
        |_| {},
        |sim| {
            sim.set_scrambler(XorScrambler::new(0x0123_4567_89ab_cdef));
        },
        |sim| {
            sim.set_scrambler(RotateXorScrambler::new(99, 5));
        },
    ];

    for install in scramblers {
        let sim = SimPlatform::new();
        install(&sim);
        let boundary = mirrored(sim);
        let mem = PhysMem::open(boundary.open());
        let mut config = cache_line_flush();
        let mut probe = AliasProbe::with_rng(StdRng::seed_from_u64(1));
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..32 {
            let source = rng.random_range(0..NR_FRAMES * PAGE_SIZE as u64 - 64);
            assert_eq!(
                probe.check(&mem, source, mirror_of(source), &mut config),
                Ok(ProbeResult::Confirmed),
                "source {:#x}",
                source
            );
            // The mirror works in both directions.
            assert_eq!(
                probe.check(&mem, mirror_of(source), source, &mut config),
                Ok(ProbeResult::Confirmed)
            );
        }
        assert_eq!(config.stats(), PageStats::default());
    }
}

#[test]
fn no_false_positives() {
    let sim = SimPlatform::new();
    sim.set_scrambler(XorScrambler::new(5));
    let boundary = mirrored(sim);
    let mem = PhysMem::open(boundary.open());
    let mut config = CopyConfig::new();
    let mut probe = AliasProbe::with_rng(StdRng::seed_from_u64(3));
    let mut rng = StdRng::seed_from_u64(4);

    let len = 64;
    let mut checked = 0;
    while checked < 200 {
        let source = rng.random_range(0..NR_FRAMES * PAGE_SIZE as u64 - len);
        let candidate = rng.random_range(0..NR_FRAMES * PAGE_SIZE as u64 - len);
        // Skip overlapping ranges, which do alias byte by byte.
        if source.abs_diff(candidate) < len {
            continue;
        }
        let candidate = if rng.random() { mirror_of(candidate) } else { candidate };

        assert_eq!(
            probe.check(&mem, source, candidate, &mut config),
            Ok(ProbeResult::NoAlias),
            "{:#x} -> {:#x}",
            source,
            candidate
        );
        checked += 1;
    }
}

#[test]
fn concurrent_probes() {
    const NR_THREADS: u64 = 4;

    let boundary = mirrored(SimPlatform::new());
    let mem = PhysMem::open(boundary.open());

    std::thread::scope(|s| {
        for i in 0..NR_THREADS {
            let mem = &mem;
            s.spawn(move || {
                let mut probe = AliasProbe::with_rng(StdRng::seed_from_u64(i));
                let mut config = cache_line_flush();
                // Every thread works on its own frames.
                for pfn in (i..NR_FRAMES).step_by(NR_THREADS as usize) {
                    let source = (pfn << 12) + 0x100;
                    assert_eq!(
                        probe.check(mem, source, mirror_of(source), &mut config),
                        Ok(ProbeResult::Confirmed)
                    );
                    assert_eq!(
                        probe.check(mem, source, source + 0x800, &mut config),
                        Ok(ProbeResult::NoAlias)
                    );
                }
                assert_eq!(config.stats(), PageStats::default());
            });
        }
    });

    assert_eq!(boundary.platform().live_windows(), 0);
    assert_eq!(boundary.platform().counters().bad_releases, 0);
}

#[test]
fn scan_finds_the_mirror() {
    let sim = SimPlatform::new();
    sim.set_scrambler(RotateXorScrambler::new(7, 1));
    let boundary = mirrored(sim);
    let mem = PhysMem::open(boundary.open());
    let mut config = cache_line_flush();

    let source = 0x5_0c0;
    let report = AliasProbe::new()
        .scan(&mem, source, single_bit_flips(source, 6..24), &mut config)
        .unwrap();

    assert_eq!(report.aliases, [mirror_of(source)]);
    assert_eq!(report.len(), 18);
    // Apart from the mirror bit, bits 18 and above leave the populated frames.
    assert_eq!(report.access_errors.len(), 5);
    assert_eq!(report.no_alias.len(), 12);
}
