//! Camera and projection utilities

use nalgebra::{Matrix4, Point3, Vector3};

/// Distance of the camera from the cylinder axis.
pub const CAMERA_DISTANCE: f32 = 30.0;

/// Perspective camera looking down -z at the cylinder.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view, radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            position: Point3::new(0.0, 0.0, CAMERA_DISTANCE),
            target: Point3::origin(),
            up: Vector3::new(0.0, 1.0, 0.0),
            fov: 75f32.to_radians(),
            aspect: width as f32 / height.max(1) as f32,
            near: 0.1,
            far: 1000.0,
        }
    }

    /// Frames a `scene_width` x `scene_height` rectangle at the target so that
    /// its apparent size depends only on the viewport's shape, never its size.
    /// A viewport narrower than the scene gets a taller view so nothing is
    /// cropped left and right.
    pub fn fit(&mut self, scene_width: f32, scene_height: f32, width: u32, height: u32) {
        let viewport_aspect = width as f32 / height as f32;
        let scene_aspect = scene_width / scene_height;
        let mut visible_height = scene_height;
        if viewport_aspect < scene_aspect {
            visible_height *= scene_aspect / viewport_aspect;
        }
        let distance = (self.position - self.target).norm();
        self.fov = 2.0 * (visible_height / (2.0 * distance)).atan();
        self.aspect = viewport_aspect;
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        Matrix4::new_perspective(self.aspect, self.fov, self.near, self.far)
    }

    /// Projects a world point to pixel coordinates, or `None` if it falls
    /// outside the view.
    pub fn project_to_screen(
        &self,
        point: &Point3<f32>,
        model_matrix: &Matrix4<f32>,
        width: u32,
        height: u32,
    ) -> Option<(f32, f32)> {
        let mvp = self.projection_matrix() * self.view_matrix() * model_matrix;
        let ndc = mvp.transform_point(point);
        if !(-1.0..=1.0).contains(&ndc.x) || !(-1.0..=1.0).contains(&ndc.y) {
            return None;
        }
        Some((
            (ndc.x + 1.0) * 0.5 * width as f32,
            (1.0 - ndc.y) * 0.5 * height as f32,
        ))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE_W: f32 = 17.0;
    const SCENE_H: f32 = 3.5;

    fn fraction_of_height(width: u32, height: u32) -> f32 {
        let mut camera = Camera::new(width, height);
        camera.fit(SCENE_W, SCENE_H, width, height);
        let (_, y) = camera
            .project_to_screen(&Point3::new(0.0, 1.5, 0.0), &Matrix4::identity(), width, height)
            .unwrap();
        y / height as f32
    }

    #[test]
    fn apparent_scale_ignores_viewport_size() {
        let small = fraction_of_height(400, 100);
        let large = fraction_of_height(1600, 400);
        assert!((small - large).abs() < 1e-4);
    }

    #[test]
    fn narrow_viewports_widen_the_view() {
        let mut camera = Camera::new(100, 100);
        camera.fit(SCENE_W, SCENE_H, 100, 100);
        let narrow_fov = camera.fov;
        camera.fit(SCENE_W, SCENE_H, 1000, 100);
        assert!(narrow_fov > camera.fov);
        // Wide enough that the scene height governs.
        let expected = 2.0 * (SCENE_H / (2.0 * CAMERA_DISTANCE)).atan();
        assert!((camera.fov - expected).abs() < 1e-6);
    }

    #[test]
    fn scene_edges_stay_in_view_when_narrow() {
        let (w, h) = (300, 300);
        let mut camera = Camera::new(w, h);
        camera.fit(SCENE_W, SCENE_H, w, h);
        let edge = Point3::new(SCENE_W / 2.0 - 0.01, 0.0, 0.0);
        assert!(camera
            .project_to_screen(&edge, &Matrix4::identity(), w, h)
            .is_some());
    }
}
