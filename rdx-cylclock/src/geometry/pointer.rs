//! The two index pointers marking "now" at the front of the cylinder.

use super::mesh::Mesh;
use nalgebra::Point3;

const SEGMENTS: usize = 12;

/// A pencil-shaped pointer lying along the x axis.
///
/// The tip sits at `tip`; the body runs towards +x when `outward` is positive
/// and towards -x otherwise.
pub fn pointer_geometry(radius: f32, length: f32, tip: Point3<f32>, outward: f32) -> Mesh {
    let profile = [
        (0.0, 0.0),
        (radius * 0.33, 0.02),
        (radius * 0.9, length * 0.05),
        (radius, length * 0.075),
        (radius, length),
        (0.0, length),
    ];
    let dir = outward.signum();
    let ring_point = |(r, h): (f32, f32), step: usize| {
        let phi = std::f32::consts::TAU * step as f32 / SEGMENTS as f32;
        Point3::new(tip.x + dir * h, tip.y + r * phi.cos(), tip.z + r * phi.sin())
    };

    let mut mesh = Mesh::with_capacity(profile.len() * SEGMENTS * 2);
    for pair in profile.windows(2) {
        let (near, far) = (pair[0], pair[1]);
        for step in 0..SEGMENTS {
            let a = ring_point(near, step);
            let b = ring_point(near, step + 1);
            let c = ring_point(far, step + 1);
            let d = ring_point(far, step);
            // Mirroring along x flips the winding.
            let (a, b, c, d) = if dir < 0.0 { (b, a, d, c) } else { (a, b, c, d) };
            if near.0 == 0.0 {
                mesh.add_triangle(super::Triangle::from_points(a, c, d));
            } else if far.0 == 0.0 {
                mesh.add_triangle(super::Triangle::from_points(a, b, c));
            } else {
                mesh.add_quad(a, b, c, d);
            }
        }
    }
    mesh.compute_smooth_normals(super::bend::CREASE_ANGLE_DEGREES.to_radians());
    mesh
}
