//! Angle coverage of the sweep across a spread of ranges.

use polarsweep_core::sequence::{half_walk, sweep_angles};
use polarsweep_core::AlphaSweep;

const RANGES: &[(f64, f64, f64)] = &[
    (-10.0, 10.0, 2.0),
    (-5.0, 15.0, 0.5),
    (0.0, 12.0, 0.25),
    (12.0, -4.0, 1.0),
    (-2.0, 3.0, 0.7),
    (1.5, 2.5, 0.1),
];

#[test]
fn every_angle_stays_within_bounds() {
    for &(start, end, step) in RANGES {
        let (lo, hi) = (start.min(end), start.max(end));
        let tolerance = step * 1e-9;
        for angle in sweep_angles(AlphaSweep { start, end, step }) {
            assert!(
                angle >= lo - tolerance && angle <= hi + tolerance,
                "{angle} outside [{lo}, {hi}] for step {step}"
            );
        }
    }
}

#[test]
fn center_is_sent_exactly_once() {
    for &(start, end, step) in RANGES {
        let alpha = AlphaSweep { start, end, step };
        let center = alpha.center();
        let hits = sweep_angles(alpha)
            .into_iter()
            .filter(|a| (a - center).abs() < step * 1e-9)
            .count();
        assert_eq!(hits, 1, "center {center} for {start}..{end} step {step}");
    }
}

#[test]
fn no_angle_is_repeated() {
    for &(start, end, step) in RANGES {
        let mut angles = sweep_angles(AlphaSweep { start, end, step });
        angles.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for pair in angles.windows(2) {
            assert!(pair[1] - pair[0] > step * 0.5, "duplicate near {}", pair[0]);
        }
    }
}

#[test]
fn half_walk_steps_evenly_from_center() {
    let walk = half_walk(0.0, 10.0, 2.5);
    assert_eq!(walk, vec![0.0, 2.5, 5.0, 7.5, 10.0]);

    let walk = half_walk(0.0, -3.0, 1.0);
    assert_eq!(walk, vec![0.0, -1.0, -2.0, -3.0]);
}

#[test]
fn half_walk_stops_short_of_an_off_lattice_bound() {
    let walk = half_walk(0.0, 1.0, 0.3);
    assert_eq!(walk.len(), 4);
    assert!(*walk.last().unwrap() <= 1.0);
}
