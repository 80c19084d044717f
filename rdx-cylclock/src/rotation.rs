//! The cylinder's physical rotation as a pure function of wall-clock time.

use crate::angle::wrap;
use crate::common::{MS_PER_MINUTE, TAU};

/// Drives the cylinder group's rotation.
///
/// The cylinder turns once every `num_major_markers` minutes and spins
/// "upwards", so the angle runs negative. The label ring converts world angles
/// into the co-rotating frame by subtracting this same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationClock {
    cycle_duration_ms: i64,
}

impl RotationClock {
    pub fn new(num_major_markers: u32) -> Self {
        Self::with_cycle(i64::from(num_major_markers.max(1)) * MS_PER_MINUTE)
    }

    pub fn with_cycle(cycle_duration_ms: i64) -> Self {
        Self {
            cycle_duration_ms: cycle_duration_ms.max(1),
        }
    }

    pub fn cycle_duration_ms(&self) -> i64 {
        self.cycle_duration_ms
    }

    /// Rotation of the cylinder group at `timestamp_ms`.
    pub fn angle_at(&self, timestamp_ms: i64) -> f64 {
        rotation_angle(timestamp_ms, self.cycle_duration_ms)
    }
}

/// `wrap(-2π · (t mod T) / T)`: a sawtooth with period `T`.
///
/// The modulo is taken on the integer timestamp first so that precision is not
/// lost on large epoch values.
pub fn rotation_angle(timestamp_ms: i64, cycle_duration_ms: i64) -> f64 {
    let phase = timestamp_ms.rem_euclid(cycle_duration_ms);
    wrap(-TAU * phase as f64 / cycle_duration_ms as f64)
}
