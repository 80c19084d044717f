//! # Cylclock
//!
//! A clock drawn on a slowly turning cylinder.
//!
//! The cylinder makes one full turn every `N` minutes, where `N` is the number
//! of labelled (major) markers around it. Each major marker carries a label
//! spelling out a minute ("Quarter after 3", "20 past 3"). The labels always
//! show `N` consecutive minutes. As the oldest one slips round the back,
//! out of sight, it is handed the next minute and its 3D text is rebuilt off
//! the render path, so the front of the cylinder always reads the right time.
//!
//! ## Core Concepts
//!
//! - **RotationClock**: maps wall-clock time to the cylinder's rotation.
//! - **LabelRing**: owns the labels and keeps their minutes contiguous.
//! - **BoundaryWatcher**: decides when the oldest label is hidden and due for
//!   its next minute.
//! - **GeometryWorker**: builds label meshes concurrently; replies are matched
//!   back to labels by request id and minute, and stale ones are dropped.
//! - **SceneComposer**: frames the camera, owns the fixed geometry and hands a
//!   [`scene::Renderer`] one throttled frame per tick.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cylclock::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClockConfig::load(None)?;
//!     let clock = CylinderClock::new(config, HeadlessRenderer::new(), Viewport::new(800, 200))?;
//!     let handle = clock.handle();
//!
//!     let mut labels = handle.subscribe_label_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = labels.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         handle.destroy().await;
//!     });
//!     clock.run().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Cylinder Clock";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod angle;
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod factory;
pub mod formatter;
pub mod geometry;
pub mod rotation;
pub mod scene;
pub mod time;
pub mod worker;

/// The most common types in one import.
pub mod prelude {
    pub use crate::common::{LabelId, MinuteIndex, RequestId};
    pub use crate::config::ClockConfig;
    pub use crate::engine::{ClockHandle, ClockOptions, ClockSnapshot, ClockState, CylinderClock};
    pub use crate::error::{ClockError, GeometryError};
    pub use crate::events::{LabelEvent, SystemEvent};
    pub use crate::formatter::{Language, TimeFormatter};
    pub use crate::scene::{HeadlessRenderer, Renderer, Viewport};
}
