//! The cylinder body the labels and markers sit on.

use super::mesh::{Mesh, Triangle};
use nalgebra::Point3;
use std::f32::consts::{FRAC_PI_2, PI, TAU};

const RADIAL_SEGMENTS: usize = 64;
const BEVEL_SIZE: f32 = 0.04;
const BEVEL_SEGMENTS: usize = 2;

/// Outline of the body as `(x, r)` pairs from the -x end cap to the +x one.
/// Both rims are rounded by a small quarter-circle bevel.
fn profile(radius: f32, axial_length: f32) -> Vec<(f32, f32)> {
    let half = axial_length / 2.0;
    let b = BEVEL_SIZE.min(radius).min(half);
    let mut points = vec![(-half, 0.0), (-half, radius - b)];
    let arc = |center: (f32, f32), from: f32, to: f32, points: &mut Vec<(f32, f32)>| {
        for i in 1..BEVEL_SEGMENTS {
            let t = from + (to - from) * i as f32 / BEVEL_SEGMENTS as f32;
            points.push((center.0 + b * t.cos(), center.1 + b * t.sin()));
        }
    };
    if b > 0.0 {
        arc((-half + b, radius - b), PI, FRAC_PI_2, &mut points);
        points.push((-half + b, radius));
        points.push((half - b, radius));
        arc((half - b, radius - b), FRAC_PI_2, 0.0, &mut points);
    }
    points.push((half, radius - b));
    points.push((half, 0.0));
    points.dedup();
    points
}

/// A closed, bevelled cylinder centred on the origin with its axis along x,
/// swept from [`profile`].
pub fn cylinder_body_geometry(radius: f32, axial_length: f32) -> Mesh {
    let profile = profile(radius, axial_length);
    let ring_point = |(x, r): (f32, f32), step: usize| {
        let phi = TAU * step as f32 / RADIAL_SEGMENTS as f32;
        Point3::new(x, r * phi.cos(), r * phi.sin())
    };

    let mut mesh = Mesh::with_capacity(profile.len() * RADIAL_SEGMENTS * 2);
    for pair in profile.windows(2) {
        let (near, far) = (pair[0], pair[1]);
        for step in 0..RADIAL_SEGMENTS {
            let a = ring_point(near, step);
            let b = ring_point(near, step + 1);
            let c = ring_point(far, step + 1);
            let d = ring_point(far, step);
            if near.1 == 0.0 {
                mesh.add_triangle(Triangle::from_points(a, c, d));
            } else if far.1 == 0.0 {
                mesh.add_triangle(Triangle::from_points(a, b, c));
            } else {
                mesh.add_quad(a, b, c, d);
            }
        }
    }
    mesh.compute_smooth_normals(super::bend::CREASE_ANGLE_DEGREES.to_radians());
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn body_spans_the_cylinder_and_faces_out() {
        let mesh = cylinder_body_geometry(1.5, 15.0);
        let bounds = mesh.bounding_box().unwrap();
        let size = bounds.size();
        assert!((size.x - 15.0).abs() < 1e-4, "{size:?}");
        assert!((size.y - 3.0).abs() < 1e-3 && (size.z - 3.0).abs() < 1e-3, "{size:?}");

        for t in &mesh.triangles {
            let centroid: Vector3<f32> =
                t.vertices.iter().map(|v| v.position.coords).sum::<Vector3<f32>>() / 3.0;
            assert!(t.calculate_normal().dot(&centroid) > 0.0, "inward face at {centroid:?}");
        }
    }

    #[test]
    fn bevel_never_exceeds_a_tiny_cylinder() {
        let points = profile(0.01, 0.01);
        assert!(points.iter().all(|&(x, r)| x.abs() <= 0.005 + 1e-6 && (0.0..=0.01).contains(&r)));
        let mesh = cylinder_body_geometry(0.01, 0.01);
        assert!(!mesh.is_empty());
    }
}
