//! Event types broadcast by a running clock.
//!
//! Listeners subscribe through [`crate::engine::ClockHandle`]. Nothing in the
//! clock waits on listeners; a slow one just lags and misses events.

use crate::common::{LabelId, MinuteIndex, RequestId};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::warn;

/// Lifecycle and host-facing events.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    /// Fired once when the clock's loop begins.
    ClockStarted { timestamp: Instant },
    /// Fired after the viewport changed size.
    Resized { width: u32, height: u32 },
    /// Fired after "now" was moved, with the size of the jump.
    TimeRebased { jump_ms: i64, offset_ms: i64 },
    /// Fired once when the clock has released everything it held.
    ClockDestroyed,
}

/// Events about individual labels and their geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelEvent {
    /// Every label was rebuilt for a new "now".
    RingSeeded { minutes: Vec<MinuteIndex> },
    /// A label was handed a new minute.
    Reassigned {
        label: LabelId,
        retired: MinuteIndex,
        minute_index: MinuteIndex,
        display_text: String,
    },
    /// New geometry is on screen.
    GeometryInstalled {
        minute_index: MinuteIndex,
        request_id: RequestId,
        vertex_count: usize,
    },
    /// A reply arrived for an assignment that had moved on.
    GeometryDiscarded {
        minute_index: MinuteIndex,
        request_id: RequestId,
    },
    /// Generation failed; the previous mesh stays up.
    GeometryFailed {
        minute_index: MinuteIndex,
        request_id: RequestId,
        message: String,
    },
    /// The worker took too long and the geometry was built in place.
    GeometryTimedOut {
        minute_index: MinuteIndex,
        request_id: RequestId,
    },
}

/// Waits for the next event, stepping over any a slow listener missed.
/// Returns `None` once the clock is gone.
pub async fn next_event<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Option<T> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(missed)) => warn!("Listener lagged; {} events skipped.", missed),
            Err(RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_lagging_listener_keeps_receiving() {
        let (tx, mut rx) = broadcast::channel(2);
        for n in 0..5 {
            tx.send(SystemEvent::Resized { width: n, height: n }).unwrap();
        }
        assert_eq!(
            next_event(&mut rx).await,
            Some(SystemEvent::Resized { width: 3, height: 3 })
        );
        assert_eq!(
            next_event(&mut rx).await,
            Some(SystemEvent::Resized { width: 4, height: 4 })
        );
        tx.send(SystemEvent::ClockDestroyed).unwrap();
        drop(tx);
        assert_eq!(next_event(&mut rx).await, Some(SystemEvent::ClockDestroyed));
        assert_eq!(next_event(&mut rx).await, None);
    }
}
