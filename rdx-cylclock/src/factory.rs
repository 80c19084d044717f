//! Label geometry requests and the factories that fulfil them.
//!
//! A factory turns a [`GeometryRequest`] into transferable vertex buffers. The
//! request's correlation keys (`request_id`, `minute_index`) are always echoed
//! back, on success and on failure alike.

use crate::common::{MinuteIndex, RequestId};
use crate::config::ClockConfig;
use crate::error::GeometryError;
use crate::geometry::bend::bend_onto_cylinder;
use crate::geometry::tessellate::tessellate;
use crate::geometry::text::extrude_text;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::trace;

/// Text geometry parameters that travel with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StyleParams {
    pub text_size: f32,
    pub text_depth: f32,
    pub max_edge_length: f32,
    pub max_passes: u32,
    pub cylinder_radius: f32,
}

impl StyleParams {
    pub fn from_config(config: &ClockConfig) -> Self {
        Self {
            text_size: config.text.size,
            text_depth: config.text.depth,
            max_edge_length: config.text.effective_max_edge_length(),
            max_passes: config.text.max_passes,
            cylinder_radius: config.cylinder_radius(),
        }
    }
}

impl Default for StyleParams {
    fn default() -> Self {
        Self::from_config(&ClockConfig::default())
    }
}

/// Everything needed to build one label's geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryRequest {
    pub request_id: RequestId,
    pub minute_index: MinuteIndex,
    pub display_text: String,
    /// Angle in the co-rotating frame, radians.
    pub target_angle: f64,
    pub style: StyleParams,
}

/// Finished label geometry: three floats per vertex in each buffer.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelGeometry {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
}

impl LabelGeometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl fmt::Debug for LabelGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelGeometry")
            .field("vertices", &self.vertex_count())
            .finish()
    }
}

/// The outcome of one request, keyed for matching against live labels.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryReply {
    pub request_id: RequestId,
    pub minute_index: MinuteIndex,
    pub result: Result<LabelGeometry, GeometryError>,
}

/// Builds label geometry. Implementations must be reentrant: the worker runs
/// several requests at once on the blocking pool.
pub trait MeshFactory: Send + Sync + 'static {
    fn build(&self, request: &GeometryRequest) -> Result<LabelGeometry, GeometryError>;
}

/// The production factory: block text, tessellated, bent onto the cylinder.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextMeshFactory;

impl MeshFactory for TextMeshFactory {
    fn build(&self, request: &GeometryRequest) -> Result<LabelGeometry, GeometryError> {
        let started = Instant::now();
        let style = &request.style;
        let fail = |message: &str| {
            GeometryError::new(request.request_id, request.minute_index, message)
        };

        if !(style.cylinder_radius > 0.0) {
            return Err(fail("cylinder radius must be positive"));
        }
        if !(style.max_edge_length > 0.0) {
            return Err(fail("max edge length must be positive"));
        }
        if !request.target_angle.is_finite() {
            return Err(fail("target angle is not finite"));
        }

        let flat = extrude_text(&request.display_text, style.text_size, style.text_depth);
        let mut mesh = tessellate(&flat, style.max_edge_length, style.max_passes);
        bend_onto_cylinder(&mut mesh, style.cylinder_radius, request.target_angle as f32);
        let (positions, normals) = mesh.to_buffers();

        trace!(
            "Built '{}' for {}: {} triangles in {:?}.",
            request.display_text,
            request.minute_index,
            mesh.triangles.len(),
            started.elapsed()
        );
        Ok(LabelGeometry { positions, normals })
    }
}
