//! The seam between the clock and whatever draws it.

use super::camera::Camera;
use super::color::Rgb;
use crate::common::{MinuteIndex, RequestId};
use crate::error::{ClockError, Result};
use crate::factory::LabelGeometry;
use crate::geometry::Mesh;
use nalgebra::Matrix4;
use tracing::{debug, info};

/// Pixel size of the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

/// A piece of fixed scene geometry with its colour.
#[derive(Debug, Clone)]
pub struct SceneMesh {
    pub mesh: Mesh,
    pub color: Rgb,
}

/// A label mesh as it should be drawn this frame.
#[derive(Debug)]
pub struct LabelDraw<'a> {
    pub minute_index: MinuteIndex,
    pub source: RequestId,
    pub geometry: &'a LabelGeometry,
}

/// Everything the renderer needs for one frame. Borrowed from the composer
/// and ring, never retained.
#[derive(Debug)]
pub struct Frame<'a> {
    /// Cylinder rotation in radians, as reported by the rotation clock.
    pub rotation: f64,
    /// Transform of the rotating cylinder group.
    pub cylinder_transform: Matrix4<f32>,
    pub camera: &'a Camera,
    /// The cylinder itself, drawn in the surface colour under the transform.
    pub body: Option<&'a SceneMesh>,
    pub markers: &'a [SceneMesh],
    pub index_pointers: &'a [SceneMesh],
    pub labels: Vec<LabelDraw<'a>>,
    pub text_color: Rgb,
}

/// A rendering backend.
pub trait Renderer: Send {
    /// Acquires the backend. Failing here aborts clock construction.
    fn init(&mut self, size: SurfaceSize) -> Result<()>;
    fn resize(&mut self, size: SurfaceSize);
    fn render(&mut self, frame: &Frame<'_>) -> Result<()>;
    /// Releases everything the backend holds. Called exactly once.
    fn dispose(&mut self);
}

/// Counters kept by [`HeadlessRenderer`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    pub frames: u64,
    pub last_surface: Option<SurfaceSize>,
    pub last_rotation: f64,
    pub last_label_count: usize,
    pub last_vertex_count: usize,
    pub disposed: u32,
}

/// Draws nothing; records what it was asked to draw.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    stats: RenderStats,
    fail_init: bool,
    initialised: bool,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer whose backend is never available.
    pub fn unavailable() -> Self {
        Self {
            fail_init: true,
            ..Self::default()
        }
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }
}

impl Renderer for HeadlessRenderer {
    fn init(&mut self, size: SurfaceSize) -> Result<()> {
        if self.fail_init {
            return Err(ClockError::RendererInit(
                "headless backend marked unavailable".to_string(),
            ));
        }
        self.stats.last_surface = Some(size);
        self.initialised = true;
        info!("Headless renderer ready at {}x{}.", size.width, size.height);
        Ok(())
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.stats.last_surface = Some(size);
    }

    fn render(&mut self, frame: &Frame<'_>) -> Result<()> {
        if !self.initialised {
            return Err(ClockError::Render("renderer not initialised".to_string()));
        }
        self.stats.last_rotation = frame.rotation;
        self.stats.frames += 1;
        self.stats.last_label_count = frame.labels.len();
        self.stats.last_vertex_count = frame
            .labels
            .iter()
            .map(|l| l.geometry.vertex_count())
            .sum::<usize>()
            + frame
                .markers
                .iter()
                .chain(frame.body)
                .chain(frame.index_pointers)
                .map(|m| m.mesh.vertex_count())
                .sum::<usize>();
        Ok(())
    }

    fn dispose(&mut self) {
        self.stats.disposed += 1;
        self.initialised = false;
        debug!("Headless renderer disposed after {} frames.", self.stats.frames);
    }
}

/// Lets a caller keep reading stats from a renderer the clock owns.
impl<R: Renderer + ?Sized> Renderer for std::sync::Arc<std::sync::Mutex<R>> {
    fn init(&mut self, size: SurfaceSize) -> Result<()> {
        self.lock()
            .map_err(|_| ClockError::RendererInit("renderer lock poisoned".into()))?
            .init(size)
    }

    fn resize(&mut self, size: SurfaceSize) {
        if let Ok(mut inner) = self.lock() {
            inner.resize(size);
        }
    }

    fn render(&mut self, frame: &Frame<'_>) -> Result<()> {
        self.lock()
            .map_err(|_| ClockError::Render("renderer lock poisoned".into()))?
            .render(frame)
    }

    fn dispose(&mut self) {
        if let Ok(mut inner) = self.lock() {
            inner.dispose();
        }
    }
}
