//! Angle helpers shared by the rotation clock and the label ring.
//!
//! Angles are in radians. The world frame has 0 on the front-facing line of
//! the cylinder, the one the camera and the index pointers look at. The
//! co-rotating frame spins with the cylinder group: a label fixed at angle `a`
//! in that frame shows up at world angle `wrap(a + rotation)`.

use crate::common::{MinuteIndex, TAU};
use std::f64::consts::PI;

/// Start of the rear arc that is never in view (exclusive).
pub const HIDDEN_ZONE_START: f64 = 3.0 * PI / 4.0;
/// End of the rear arc that is never in view (exclusive).
pub const HIDDEN_ZONE_END: f64 = 5.0 * PI / 4.0;

/// Reduces any angle to `[0, 2π)` with a Euclidean modulo.
pub fn wrap(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// True when `angle` lies inside the rear quarter-turn `(3π/4, 5π/4)`.
///
/// The arc is conservative so that raised text never clips into view.
pub fn is_in_hidden_zone(angle: f64) -> bool {
    let angle = wrap(angle);
    HIDDEN_ZONE_START < angle && angle < HIDDEN_ZONE_END
}

/// World angle at which a minute boundary currently appears.
///
/// "Now" sits at 0. A boundary `Δt` milliseconds away sits at `2π·Δt/cycle`.
pub fn world_angle_for_minute(minute: MinuteIndex, cycle_duration_ms: i64, now_ms: i64) -> f64 {
    let delta_ms = minute.start_ms() - now_ms;
    wrap(TAU * delta_ms as f64 / cycle_duration_ms as f64)
}

/// Angle in the co-rotating frame at which the label for `minute` must be
/// fixed, given the cylinder's current physical rotation.
pub fn angle_for_minute(
    minute: MinuteIndex,
    cycle_duration_ms: i64,
    now_ms: i64,
    current_rotation: f64,
) -> f64 {
    wrap(world_angle_for_minute(minute, cycle_duration_ms, now_ms) - current_rotation)
}

/// Where a co-rotating angle currently shows up in the world frame.
pub fn to_world(local_angle: f64, current_rotation: f64) -> f64 {
    wrap(local_angle + current_rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MS_PER_MINUTE;

    const EPS: f64 = 1e-9;

    #[test]
    fn wrap_lands_in_range_for_awkward_inputs() {
        let inputs = [
            0.0,
            -0.0,
            TAU,
            -TAU,
            7.5 * TAU,
            -7.5 * TAU,
            -1e-17,
            1e-17,
            123_456.789,
            -987_654.321,
            f64::EPSILON - TAU,
        ];
        for x in inputs {
            let w = wrap(x);
            assert!((0.0..TAU).contains(&w), "wrap({x}) = {w}");
            assert_eq!(wrap(w), w, "wrap is not idempotent for {x}");
        }
    }

    #[test]
    fn wrap_is_euclidean_not_truncating() {
        assert!((wrap(-PI / 2.0) - 3.0 * PI / 2.0).abs() < EPS);
        assert!((wrap(5.0 * PI / 2.0) - PI / 2.0).abs() < EPS);
    }

    #[test]
    fn hidden_zone_is_an_open_rear_quarter() {
        assert!(is_in_hidden_zone(PI));
        assert!(is_in_hidden_zone(PI - 0.7));
        assert!(is_in_hidden_zone(-PI));
        assert!(!is_in_hidden_zone(HIDDEN_ZONE_START));
        assert!(!is_in_hidden_zone(HIDDEN_ZONE_END));
        assert!(!is_in_hidden_zone(0.0));
        assert!(!is_in_hidden_zone(PI / 2.0));
        assert!(!is_in_hidden_zone(3.0 * PI / 2.0));
    }

    #[test]
    fn current_minute_sits_just_behind_the_front() {
        let cycle = 4 * MS_PER_MINUTE;
        let now = 1_000 * MS_PER_MINUTE + 15_000;
        // A quarter of a minute into a 4-minute cycle: 1/16 turn in the past.
        let angle = world_angle_for_minute(MinuteIndex(1_000), cycle, now);
        assert!((angle - (TAU - TAU / 16.0)).abs() < EPS);
        let next = world_angle_for_minute(MinuteIndex(1_001), cycle, now);
        assert!((next - 3.0 * TAU / 16.0).abs() < EPS);
    }

    #[test]
    fn co_rotating_angle_maps_back_to_world_angle() {
        let cycle = 5 * MS_PER_MINUTE;
        let now = 28_000_000 * MS_PER_MINUTE + 42_123;
        let rotation = 1.234;
        let minute = MinuteIndex(28_000_002);
        let local = angle_for_minute(minute, cycle, now, rotation);
        let world = world_angle_for_minute(minute, cycle, now);
        assert!((to_world(local, rotation) - world).abs() < EPS);
    }
}
