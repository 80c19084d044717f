//! Everything between the clock's state and pixels: camera framing, fixed
//! scene geometry, frame pacing and the renderer seam.

pub mod camera;
pub mod color;
pub mod composer;
pub mod renderer;

pub use camera::Camera;
pub use color::Rgb;
pub use composer::{FrameThrottle, SceneComposer, SceneLayout, Viewport};
pub use renderer::{Frame, HeadlessRenderer, RenderStats, Renderer, SceneMesh, SurfaceSize};
