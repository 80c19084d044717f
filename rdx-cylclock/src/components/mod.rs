//! Stateful building blocks driven by the engine loop.

pub mod ring;
pub mod watcher;
