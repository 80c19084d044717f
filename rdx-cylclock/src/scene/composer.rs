//! Builds each frame from the rotation clock and the label ring.

use super::camera::Camera;
use super::color::Rgb;
use super::renderer::{Frame, LabelDraw, Renderer, SceneMesh, SurfaceSize};
use crate::common::TAU;
use crate::components::ring::LabelRing;
use crate::config::ClockConfig;
use crate::error::{ClockError, Result};
use crate::geometry::{cylinder_body_geometry, marker_geometry, pointer_geometry, MarkerShape};
use nalgebra::{Matrix4, Point3, Vector3};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Turns the cylinder so that angle 0 of its own frame faces the camera.
const FRONT_OFFSET: f64 = std::f64::consts::FRAC_PI_2;

/// The host surface the clock draws into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixel_ratio: 1.0,
        }
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f32) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Drawing surface size in device pixels.
    pub fn surface_size(&self) -> SurfaceSize {
        SurfaceSize {
            width: (self.width as f32 * self.pixel_ratio).floor() as u32,
            height: (self.height as f32 * self.pixel_ratio).floor() as u32,
        }
    }
}

/// Lets a frame through only when enough time has passed since the last one.
#[derive(Debug)]
pub struct FrameThrottle {
    min_interval: Duration,
    last_rendered: Option<Instant>,
}

impl FrameThrottle {
    pub fn new(max_rate_hz: u32) -> Self {
        Self {
            min_interval: Duration::from_secs_f64(1.0 / f64::from(max_rate_hz.max(1))),
            last_rendered: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Returns `true` and records `now` if a frame may be drawn.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last_rendered {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last_rendered = Some(now);
                true
            }
        }
    }
}

/// Derived physical measurements of the cylinder and its furniture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneLayout {
    pub diameter: f32,
    pub axial_length: f32,
    pub marker_depth: f32,
}

impl SceneLayout {
    pub const MAJOR_AXIAL_WIDTH: f32 = 0.7;
    pub const MINOR_AXIAL_WIDTH: f32 = 0.5;

    pub fn from_config(config: &ClockConfig) -> Self {
        Self {
            diameter: config.dimensions.cylinder_diameter,
            axial_length: config.dimensions.cylinder_axial_length,
            marker_depth: config.dimensions.marker_depth,
        }
    }

    pub fn radius(&self) -> f32 {
        self.diameter / 2.0
    }

    pub fn scene_width(&self) -> f32 {
        self.axial_length + 2.0
    }

    pub fn scene_height(&self) -> f32 {
        self.diameter + 0.5
    }

    pub fn major_marker(&self) -> MarkerShape {
        MarkerShape {
            axial_width: Self::MAJOR_AXIAL_WIDTH,
            radial_height: self.marker_depth,
            circumferential_length: self.diameter / 35.0,
        }
    }

    pub fn minor_marker(&self) -> MarkerShape {
        MarkerShape {
            axial_width: Self::MINOR_AXIAL_WIDTH,
            radial_height: self.marker_depth / 3.0,
            circumferential_length: self.diameter / 85.0,
        }
    }

    /// Distance of each ring of markers from the middle of the cylinder.
    pub fn marker_x(&self) -> f32 {
        let end_buffer = Self::MAJOR_AXIAL_WIDTH.max(Self::MINOR_AXIAL_WIDTH) / 2.0 + 0.02;
        self.axial_length / 2.0 - end_buffer
    }

    pub fn pointer_length(&self) -> f32 {
        Self::MAJOR_AXIAL_WIDTH * 2.5
    }

    pub fn pointer_radius(&self) -> f32 {
        self.major_marker().circumferential_length * 0.66
    }

    /// Where the inward-facing tip of the +x pointer sits.
    pub fn pointer_tip(&self) -> Point3<f32> {
        Point3::new(
            self.axial_length / 2.0 - self.pointer_length() + 0.1,
            0.0,
            self.diameter / 2.0 + 0.3,
        )
    }
}

/// Angle of marker `i` of `total` in the cylinder's own frame. Major marker
/// `j` lands on `2πj/N`, the angle every label showing a minute `≡ j (mod N)`
/// is bent to.
pub fn marker_angle(i: u32, total: u32) -> f64 {
    crate::angle::wrap(TAU * f64::from(i) / f64::from(total))
}

/// Transform of the spinning cylinder group for a given rotation.
pub fn cylinder_transform(rotation: f64) -> Matrix4<f32> {
    Matrix4::new_rotation(Vector3::x() * (FRONT_OFFSET + rotation) as f32)
}

#[derive(Debug, Clone, Copy)]
struct Palette {
    text: Rgb,
    surface: Rgb,
    index_line: Rgb,
    major: Rgb,
    minor: Rgb,
}

impl Palette {
    fn from_config(config: &ClockConfig) -> Result<Self> {
        let parse = |name: &str, value: &str| {
            Rgb::parse(value).ok_or_else(|| {
                ClockError::InvalidConfig(format!("colors.{name}: cannot parse '{value}'"))
            })
        };
        let colors = &config.colors;
        Ok(Self {
            text: parse("text", &colors.text)?,
            surface: parse("cylinder_surface", &colors.cylinder_surface)?,
            index_line: parse("index_line", &colors.index_line)?,
            major: parse("major_mark", &colors.major_mark)?,
            minor: parse("minor_mark", &colors.minor_mark)?,
        })
    }
}

/// Frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposerStats {
    pub rendered: u64,
    pub throttled: u64,
    pub failed: u64,
}

/// Owns the camera and the fixed scene geometry, and hands the renderer one
/// frame per admitted tick.
#[derive(Debug)]
pub struct SceneComposer {
    camera: Camera,
    viewport: Viewport,
    layout: SceneLayout,
    palette: Palette,
    throttle: FrameThrottle,
    body: Option<SceneMesh>,
    markers: Vec<SceneMesh>,
    index_pointers: Vec<SceneMesh>,
    stats: ComposerStats,
    disposed: bool,
}

impl SceneComposer {
    pub fn new(config: &ClockConfig, viewport: Viewport) -> Result<Self> {
        let layout = SceneLayout::from_config(config);
        let palette = Palette::from_config(config)?;
        let mut composer = Self {
            camera: Camera::new(viewport.width, viewport.height),
            viewport,
            layout,
            palette,
            throttle: FrameThrottle::new(config.max_refresh_rate_hz),
            body: Some(SceneMesh {
                mesh: cylinder_body_geometry(layout.radius(), layout.axial_length),
                color: palette.surface,
            }),
            markers: build_markers(&layout, &palette, config),
            index_pointers: build_index_pointers(&layout, &palette),
            stats: ComposerStats::default(),
            disposed: false,
        };
        composer.fit_camera();
        debug!(
            "Scene composed: {} markers, camera fov {:.2} deg.",
            composer.markers.len(),
            composer.camera.fov.to_degrees()
        );
        Ok(composer)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn layout(&self) -> &SceneLayout {
        &self.layout
    }

    /// The cylinder body; `None` once disposed.
    pub fn body(&self) -> Option<&SceneMesh> {
        self.body.as_ref()
    }

    pub fn markers(&self) -> &[SceneMesh] {
        &self.markers
    }

    pub fn index_pointers(&self) -> &[SceneMesh] {
        &self.index_pointers
    }

    pub fn stats(&self) -> ComposerStats {
        self.stats
    }

    /// Re-frames the camera for a new viewport. Zero-sized viewports are
    /// ignored. Returns the new surface size when something changed.
    pub fn resize(&mut self, viewport: Viewport) -> Option<SurfaceSize> {
        if viewport.is_empty() {
            debug!("Ignoring resize to {}x{}.", viewport.width, viewport.height);
            return None;
        }
        self.viewport = viewport;
        self.fit_camera();
        Some(viewport.surface_size())
    }

    /// Assembles the frame for `rotation` without drawing it.
    pub fn compose<'a>(&'a self, rotation: f64, ring: &'a LabelRing) -> Frame<'a> {
        let labels = ring
            .labels()
            .filter_map(|(_, label)| {
                let source = label.mesh.source?;
                (!label.mesh.geometry.is_empty()).then_some(LabelDraw {
                    minute_index: label.minute_index,
                    source,
                    geometry: &label.mesh.geometry,
                })
            })
            .collect();
        Frame {
            rotation,
            cylinder_transform: cylinder_transform(rotation),
            camera: &self.camera,
            body: self.body.as_ref(),
            markers: &self.markers,
            index_pointers: &self.index_pointers,
            labels,
            text_color: self.palette.text,
        }
    }

    /// Draws one frame if the throttle lets it through. Render errors are
    /// counted and returned; they never disturb the composer's state.
    pub fn render_frame(
        &mut self,
        now: Instant,
        rotation: f64,
        ring: &LabelRing,
        renderer: &mut dyn Renderer,
    ) -> Result<bool> {
        if self.disposed {
            return Ok(false);
        }
        if !self.throttle.admit(now) {
            self.stats.throttled += 1;
            return Ok(false);
        }
        let frame = self.compose(rotation, ring);
        let outcome = renderer.render(&frame);
        match outcome {
            Ok(()) => {
                self.stats.rendered += 1;
                trace!("Frame {} at rotation {:.4}.", self.stats.rendered, rotation);
                Ok(true)
            }
            Err(err) => {
                self.stats.failed += 1;
                Err(err)
            }
        }
    }

    /// Drops all fixed geometry. Returns how many meshes were released; a
    /// second call releases nothing.
    pub fn dispose(&mut self) -> usize {
        if self.disposed {
            return 0;
        }
        self.disposed = true;
        let released =
            usize::from(self.body.take().is_some()) + self.markers.len() + self.index_pointers.len();
        self.markers.clear();
        self.index_pointers.clear();
        released
    }

    fn fit_camera(&mut self) {
        let (width, height) = (self.viewport.width.max(1), self.viewport.height.max(1));
        self.camera.fit(
            self.layout.scene_width(),
            self.layout.scene_height(),
            width,
            height,
        );
    }
}

fn build_markers(layout: &SceneLayout, palette: &Palette, config: &ClockConfig) -> Vec<SceneMesh> {
    let total = config.total_markers_per_end();
    let stride = config.num_minor_markers_between_major + 1;
    let (major, minor) = (layout.major_marker(), layout.minor_marker());
    let x = layout.marker_x();

    [-x, x]
        .into_iter()
        .flat_map(|center_x| {
            (0..total).map(move |i| {
                let is_major = i % stride == 0;
                let shape = if is_major { &major } else { &minor };
                SceneMesh {
                    mesh: marker_geometry(
                        shape,
                        layout.radius(),
                        center_x,
                        marker_angle(i, total) as f32,
                    ),
                    color: if is_major { palette.major } else { palette.minor },
                }
            })
        })
        .collect()
}

fn build_index_pointers(layout: &SceneLayout, palette: &Palette) -> Vec<SceneMesh> {
    let tip = layout.pointer_tip();
    let (radius, length) = (layout.pointer_radius(), layout.pointer_length());
    [(-1.0, Point3::new(-tip.x, tip.y, tip.z)), (1.0, tip)]
        .into_iter()
        .map(|(outward, tip)| SceneMesh {
            mesh: pointer_geometry(radius, length, tip, outward),
            color: palette.index_line,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{GeometryReply, LabelGeometry, StyleParams};
    use crate::formatter::{Language, TimeFormatter};
    use crate::scene::renderer::HeadlessRenderer;
    use chrono_tz::Tz;

    fn composer() -> SceneComposer {
        SceneComposer::new(&ClockConfig::default(), Viewport::new(800, 200)).unwrap()
    }

    #[test]
    fn throttle_admits_the_first_frame_and_spaces_the_rest() {
        let start = Instant::now();
        let mut throttle = FrameThrottle::new(10);
        assert!(throttle.admit(start));
        assert!(!throttle.admit(start + Duration::from_millis(99)));
        assert!(throttle.admit(start + Duration::from_millis(100)));
        assert!(!throttle.admit(start + Duration::from_millis(150)));
    }

    #[test]
    fn markers_ring_both_ends() {
        let config = ClockConfig::default();
        let composer = composer();
        assert_eq!(
            composer.markers().len(),
            2 * config.total_markers_per_end() as usize
        );
        assert_eq!(composer.index_pointers().len(), 2);
        let body = composer.body().unwrap();
        assert_eq!(body.color, Rgb::parse(&config.colors.cylinder_surface).unwrap());
        let size = body.mesh.bounding_box().unwrap().size();
        assert!((size.x - config.dimensions.cylinder_axial_length).abs() < 1e-4);

        let majors = composer
            .markers()
            .iter()
            .filter(|m| m.color == Rgb::parse(&config.colors.major_mark).unwrap())
            .count();
        assert_eq!(majors, 2 * config.num_major_markers as usize);
    }

    #[test]
    fn major_markers_line_up_with_label_angles() {
        let n = 4;
        let total = n * 12;
        for j in 0..n {
            let angle = marker_angle(j * 12, total);
            assert!((angle - TAU * f64::from(j) / f64::from(n)).abs() < 1e-12);
        }
    }

    #[test]
    fn front_of_the_cylinder_faces_the_camera() {
        let transform = cylinder_transform(0.0);
        let front = transform.transform_point(&Point3::new(0.0, 1.0, 0.0));
        assert!((front.z - 1.0).abs() < 1e-6 && front.y.abs() < 1e-6);

        // Half a turn later the same point is round the back.
        let back = cylinder_transform(std::f64::consts::PI).transform_point(&Point3::new(0.0, 1.0, 0.0));
        assert!((back.z + 1.0).abs() < 1e-6);
    }

    #[test]
    fn resize_ignores_empty_viewports_and_scales_the_surface() {
        let mut composer = composer();
        let fov = composer.camera().fov;
        assert_eq!(composer.resize(Viewport::new(0, 300)), None);
        assert_eq!(composer.camera().fov, fov);

        let size = composer
            .resize(Viewport::new(301, 151).with_pixel_ratio(1.5))
            .unwrap();
        assert_eq!(size, SurfaceSize { width: 451, height: 226 });
        assert_eq!(composer.viewport().width, 301);
    }

    #[test]
    fn frames_carry_only_installed_labels() {
        let mut ring = LabelRing::new(
            4,
            TimeFormatter::new(Language::EnGb, Tz::UTC),
            StyleParams::default(),
        );
        let requests = ring.seed(0, 0.0);
        ring.apply_reply(GeometryReply {
            request_id: requests[1].request_id,
            minute_index: requests[1].minute_index,
            result: Ok(LabelGeometry {
                positions: vec![0.0; 18],
                normals: vec![0.0; 18],
            }),
        });

        let mut composer = composer();
        let mut renderer = HeadlessRenderer::new();
        renderer.init(composer.viewport().surface_size()).unwrap();

        let now = Instant::now();
        assert!(composer.render_frame(now, 1.25, &ring, &mut renderer).unwrap());
        assert!(!composer.render_frame(now, 1.25, &ring, &mut renderer).unwrap());
        let stats = renderer.stats();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.last_label_count, 1);
        assert_eq!(stats.last_rotation, 1.25);
        assert_eq!(composer.stats().throttled, 1);
    }

    #[test]
    fn dispose_releases_fixed_geometry_once() {
        let mut composer = composer();
        let expected = 1 + composer.markers().len() + 2;
        assert_eq!(composer.dispose(), expected);
        assert_eq!(composer.dispose(), 0);
        assert!(composer.markers().is_empty());
        assert!(composer.body().is_none());
    }
}
