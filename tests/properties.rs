use playclip::config::IndexConfig;
use playclip::{
    CalibrationSample, ClipBoundaryCalculator, ClipRequestOptions, DeadZone, IndexBuilder, PlayRecord,
    Resolver, VideoIdentity, VideoTimeIndex,
};
use proptest::prelude::*;

/// A clean Q1 broadcast: clock steps down while the offset steps up. Large
/// offset steps leave gaps that become dead zones.
fn quarter_samples() -> impl Strategy<Value = Vec<CalibrationSample>> {
    prop::collection::vec((1u32..40, 1u32..900), 2..30).prop_map(|steps| {
        let mut clock = 900i64;
        let mut offset = 50.0;
        let mut samples = Vec::new();
        for (clock_step, offset_step) in steps {
            if clock < 0 {
                break;
            }
            samples.push(CalibrationSample::reading(offset, 1, clock as f64, 0.9));
            clock -= clock_step as i64;
            offset += offset_step as f64;
        }
        samples
    })
}

fn noise() -> impl Strategy<Value = Vec<CalibrationSample>> {
    prop::collection::vec(
        prop_oneof![
            (0u32..=900, 0.0f64..20_000.0, 0.0f64..1.0)
                .prop_map(|(clock, offset, confidence)| CalibrationSample::reading(offset, 1, clock as f64, confidence)),
            (0.0f64..20_000.0).prop_map(|offset| CalibrationSample::no_clock(offset, None)),
        ],
        0..12,
    )
}

fn build(samples: &[CalibrationSample]) -> VideoTimeIndex {
    IndexBuilder::new(IndexConfig::default())
        .build(VideoIdentity::named("prop"), None, samples)
        .0
}

proptest! {
    #[test]
    fn earlier_clock_never_resolves_later(
        clean in quarter_samples(),
        noise in noise(),
        a in 0.0f64..=900.0,
        b in 0.0f64..=900.0,
    ) {
        let mut samples = clean;
        samples.extend(noise);
        let index = build(&samples);
        let resolver = Resolver::default();

        let (high, low) = if a >= b { (a, b) } else { (b, a) };
        if let (Ok(first), Ok(second)) = (resolver.resolve(&index, 1, high), resolver.resolve(&index, 1, low)) {
            prop_assert!(
                first.offset_seconds <= second.offset_seconds,
                "clock {} → {}, clock {} → {}",
                high, first.offset_seconds, low, second.offset_seconds
            );
        }
    }

    #[test]
    fn calibration_points_resolve_to_themselves(clean in quarter_samples()) {
        let index = build(&clean);
        let resolver = Resolver::default();
        if let Some(timeline) = index.quarter(1) {
            for point in &timeline.points {
                if let Ok(resolution) = resolver.resolve(&index, 1, point.clock_seconds) {
                    prop_assert_eq!(resolution.offset_seconds, point.video_offset_seconds);
                }
            }
        }
    }

    #[test]
    fn build_ignores_arrival_order(
        samples in (quarter_samples(), noise())
            .prop_map(|(mut clean, noise)| { clean.extend(noise); clean })
            .prop_flat_map(|samples| (Just(samples.clone()), Just(samples).prop_shuffle())),
    ) {
        let (original, shuffled) = samples;
        let first = build(&original);
        let second = build(&shuffled);
        prop_assert_eq!(first.quarters, second.quarters);
        prop_assert_eq!(first.dead_zones, second.dead_zones);
    }

    #[test]
    fn clips_never_start_or_end_inside_dead_zones(
        gaps in prop::collection::vec((1u32..300, 1u32..300), 1..6),
        resolved in 0.0f64..3000.0,
        next in prop::option::of(0.0f64..3000.0),
        yards in -10i32..80,
    ) {
        let mut index = VideoTimeIndex::empty(VideoIdentity::named("prop"));
        let mut cursor = 0.0;
        for (gap, length) in gaps {
            let start = cursor + gap as f64;
            let end = start + length as f64;
            index.dead_zones.push(DeadZone { start_seconds: start, end_seconds: end, label: None });
            cursor = end;
        }
        let play = PlayRecord {
            play_type: Some("pass".to_string()),
            yards_gained: Some(yards),
            ..PlayRecord::default()
        };

        let (start, end) = ClipBoundaryCalculator::default()
            .window(&index, &play, resolved, next, &ClipRequestOptions::default());

        prop_assert!(start <= end);
        for zone in &index.dead_zones {
            prop_assert!(!zone.contains_strictly(start), "start {} in {:?}", start, zone);
            prop_assert!(!zone.contains_strictly(end), "end {} in {:?}", end, zone);
        }
    }

    #[test]
    fn more_yards_never_shorten_a_clip(a in -20i32..120, b in -20i32..120, touchdown in any::<bool>()) {
        let calculator = ClipBoundaryCalculator::default();
        let play = |yards| PlayRecord {
            play_type: Some("run".to_string()),
            yards_gained: Some(yards),
            touchdown: Some(touchdown),
            ..PlayRecord::default()
        };
        let (fewer, more) = if a <= b { (a, b) } else { (b, a) };
        let options = ClipRequestOptions::default();
        prop_assert!(calculator.duration(&play(fewer), &options) <= calculator.duration(&play(more), &options));
    }
}
