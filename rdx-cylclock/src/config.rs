//! Defines all configuration structures for the clock.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`, layered with `CYLCLOCK_*` environment
//! variables. Every field has a default, so an empty file is a valid config.

use crate::common::MS_PER_MINUTE;
use crate::error::{ClockError, Result};
use crate::formatter::{Language, TimeFormatter};
use crate::rotation::RotationClock;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// The top-level configuration for a `CylinderClock`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    /// Selects the phrasing used on labels.
    #[serde(default)]
    pub language: Language,

    /// Number of labelled minute markers around the cylinder. The cylinder
    /// turns once every `num_major_markers` minutes. Must be at least 2.
    #[serde(default = "default_num_major_markers")]
    pub num_major_markers: u32,

    /// Undecorated ticks drawn between two major markers.
    #[serde(default = "default_num_minor_markers")]
    pub num_minor_markers_between_major: u32,

    /// Upper bound on rendered frames per second.
    #[serde(default = "default_max_refresh_rate_hz")]
    pub max_refresh_rate_hz: u32,

    /// The timezone whose wall-clock time the labels spell out. Uses the
    /// string names from the IANA Time Zone Database (e.g., "Europe/London").
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// How long a label may wait on the geometry worker before its geometry
    /// is rebuilt in-process.
    #[serde(default = "default_geometry_timeout_secs")]
    pub geometry_timeout_secs: u64,

    /// How often the boundary watcher checks where the oldest label is.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub colors: ColorConfig,

    #[serde(default)]
    pub dimensions: DimensionConfig,

    #[serde(default)]
    pub text: TextConfig,
}

/// Cosmetic colours. Accepted forms are `#rrggbb` and `rgb(r, g, b)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub text: String,
    pub cylinder_surface: String,
    pub index_line: String,
    pub major_mark: String,
    pub minor_mark: String,
}

/// Physical proportions of the cylinder and its markers, in scene units.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DimensionConfig {
    pub cylinder_diameter: f32,
    pub cylinder_axial_length: f32,
    pub marker_depth: f32,
}

/// Parameters for label text geometry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub size: f32,
    pub depth: f32,
    /// Triangles with a longer edge are split before bending. Defaults to
    /// `size / 12`.
    pub max_edge_length: Option<f32>,
    pub max_passes: u32,
}

// --- Default value functions for serde ---

fn default_num_major_markers() -> u32 {
    4
}

fn default_num_minor_markers() -> u32 {
    11
}

fn default_max_refresh_rate_hz() -> u32 {
    30
}

fn default_timezone() -> Tz {
    Tz::UTC
}

fn default_geometry_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            text: "#1C1C1C".to_string(),
            cylinder_surface: "#F5F5DC".to_string(),
            index_line: "rgb(255, 40, 40)".to_string(),
            major_mark: "#1C1C1C".to_string(),
            minor_mark: "#333333".to_string(),
        }
    }
}

impl Default for DimensionConfig {
    fn default() -> Self {
        Self {
            cylinder_diameter: 3.0,
            cylinder_axial_length: 15.0,
            marker_depth: 0.06,
        }
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            size: 1.0,
            depth: 0.08,
            max_edge_length: None,
            max_passes: 6,
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            num_major_markers: default_num_major_markers(),
            num_minor_markers_between_major: default_num_minor_markers(),
            max_refresh_rate_hz: default_max_refresh_rate_hz(),
            timezone: default_timezone(),
            geometry_timeout_secs: default_geometry_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            colors: ColorConfig::default(),
            dimensions: DimensionConfig::default(),
            text: TextConfig::default(),
        }
    }
}

impl ClockConfig {
    /// Loads a config from an optional TOML file, then applies `CYLCLOCK_*`
    /// environment overrides (nested keys joined with `__`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("CYLCLOCK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        let config: ClockConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the clock cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.num_major_markers < 2 {
            return Err(ClockError::InvalidConfig(format!(
                "num_major_markers must be at least 2, got {}",
                self.num_major_markers
            )));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms >= MS_PER_MINUTE as u64 {
            return Err(ClockError::InvalidConfig(format!(
                "poll_interval_ms must be between 1 and {}, got {}",
                MS_PER_MINUTE - 1,
                self.poll_interval_ms
            )));
        }
        if self.max_refresh_rate_hz == 0 {
            return Err(ClockError::InvalidConfig(
                "max_refresh_rate_hz must be at least 1".to_string(),
            ));
        }
        let dims = &self.dimensions;
        if !(dims.cylinder_diameter > 0.0 && dims.cylinder_axial_length > 0.0) {
            return Err(ClockError::InvalidConfig(
                "cylinder dimensions must be positive".to_string(),
            ));
        }
        if !(self.text.size > 0.0) || self.text.depth < 0.0 {
            return Err(ClockError::InvalidConfig(
                "text size must be positive and depth non-negative".to_string(),
            ));
        }
        for (name, value) in [
            ("text", &self.colors.text),
            ("cylinder_surface", &self.colors.cylinder_surface),
            ("index_line", &self.colors.index_line),
            ("major_mark", &self.colors.major_mark),
            ("minor_mark", &self.colors.minor_mark),
        ] {
            if crate::scene::Rgb::parse(value).is_none() {
                return Err(ClockError::InvalidConfig(format!(
                    "colors.{name}: cannot parse '{value}'"
                )));
            }
        }
        Ok(())
    }

    pub fn formatter(&self) -> TimeFormatter {
        TimeFormatter::new(self.language, self.timezone)
    }

    pub fn rotation_clock(&self) -> RotationClock {
        RotationClock::new(self.num_major_markers)
    }

    pub fn geometry_timeout(&self) -> Duration {
        Duration::from_secs(self.geometry_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Minimum spacing between two rendered frames.
    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.max_refresh_rate_hz.max(1)))
    }

    /// All markers around one end of the cylinder, major and minor.
    pub fn total_markers_per_end(&self) -> u32 {
        self.num_major_markers * (1 + self.num_minor_markers_between_major)
    }

    pub fn cylinder_radius(&self) -> f32 {
        self.dimensions.cylinder_diameter / 2.0
    }
}

impl TextConfig {
    pub fn effective_max_edge_length(&self) -> f32 {
        self.max_edge_length.unwrap_or(self.size / 12.0)
    }
}
