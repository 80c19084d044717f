//! Contains common, primitive types shared across the clock.
//!
//! This module defines the identifiers used to key labels, geometry requests
//! and minutes. Using distinct types keeps minute arithmetic from being mixed
//! up with raw timestamps or request counters.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

/// Milliseconds in one whole minute.
pub const MS_PER_MINUTE: i64 = 60_000;

/// A full turn, in radians.
pub const TAU: f64 = std::f64::consts::TAU;

new_key_type! {
    /// Uniquely and safely identifies a label slot inside a `LabelRing`.
    ///
    /// Keys are handed out once when the ring is seeded. A label is never
    /// removed while the ring lives, only reassigned to a new minute.
    pub struct LabelId;
}

/// A whole minute, counted from the Unix epoch.
///
/// Labels are identified by the minute they represent rather than by a raw
/// timestamp, which keeps the "one label per minute" rule a plain integer
/// comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MinuteIndex(pub i64);

impl MinuteIndex {
    /// The minute that contains `timestamp_ms` (floor division, so instants
    /// before the epoch land on the minute that started before them).
    pub fn containing(timestamp_ms: i64) -> Self {
        Self(timestamp_ms.div_euclid(MS_PER_MINUTE))
    }

    /// The instant this minute starts, in milliseconds since the epoch.
    pub fn start_ms(self) -> i64 {
        self.0 * MS_PER_MINUTE
    }

    pub fn offset(self, minutes: i64) -> Self {
        Self(self.0 + minutes)
    }
}

impl fmt::Display for MinuteIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Correlates one geometry request with its reply.
///
/// Request ids are issued by the ring in increasing order and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}
