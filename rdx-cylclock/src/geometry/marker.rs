//! Tick marks raised off the cylinder surface.

use super::mesh::Mesh;
use nalgebra::Point3;

/// Keeps marker undersides off the cylinder surface to avoid z-fighting.
const SURFACE_GAP: f32 = 0.05;

/// Size of one tick mark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerShape {
    /// Extent along the cylinder axis.
    pub axial_width: f32,
    /// How far the mark stands off the surface.
    pub radial_height: f32,
    /// Arc length around the circumference.
    pub circumferential_length: f32,
}

/// A box bent around the cylinder: inner and outer faces are at constant
/// radius, the side walls are radial.
pub fn marker_geometry(
    shape: &MarkerShape,
    cylinder_radius: f32,
    center_x: f32,
    center_angle: f32,
) -> Mesh {
    let bottom = cylinder_radius + SURFACE_GAP;
    let top = bottom + shape.radial_height;
    let angular_width = shape.circumferential_length / (cylinder_radius + shape.radial_height / 2.0);
    let (a0, a1) = (
        center_angle - angular_width / 2.0,
        center_angle + angular_width / 2.0,
    );
    let (x0, x1) = (
        center_x - shape.axial_width / 2.0,
        center_x + shape.axial_width / 2.0,
    );
    let at = |x: f32, r: f32, a: f32| Point3::new(x, r * a.cos(), r * a.sin());

    let p0 = at(x0, bottom, a0);
    let p1 = at(x1, bottom, a0);
    let p2 = at(x0, bottom, a1);
    let p3 = at(x1, bottom, a1);
    let p4 = at(x0, top, a0);
    let p5 = at(x1, top, a0);
    let p6 = at(x0, top, a1);
    let p7 = at(x1, top, a1);

    let mut mesh = Mesh::with_capacity(12);
    mesh.add_quad(p0, p1, p3, p2); // inner, facing the axis
    mesh.add_quad(p4, p6, p7, p5); // outer
    mesh.add_quad(p0, p4, p5, p1); // leading side at a0
    mesh.add_quad(p3, p7, p6, p2); // trailing side at a1
    mesh.add_quad(p0, p2, p6, p4); // axial end at x0
    mesh.add_quad(p1, p5, p7, p3); // axial end at x1
    mesh.compute_smooth_normals(super::bend::CREASE_ANGLE_DEGREES.to_radians());
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn marker_is_a_closed_outward_facing_box() {
        let shape = MarkerShape {
            axial_width: 0.7,
            radial_height: 0.06,
            circumferential_length: 3.0 / 35.0,
        };
        let mesh = marker_geometry(&shape, 1.5, 7.0, 1.0);
        assert_eq!(mesh.triangles.len(), 12);

        let center = mesh.bounding_box().unwrap().center();
        for t in &mesh.triangles {
            let centroid: Vector3<f32> =
                t.vertices.iter().map(|v| v.position.coords).sum::<Vector3<f32>>() / 3.0;
            assert!(t.calculate_normal().dot(&(centroid - center.coords)) > 0.0);
        }

        let outer = 1.5 + SURFACE_GAP + 0.06;
        let bounds = mesh.bounding_box().unwrap();
        assert!((bounds.max.x - 7.35).abs() < 1e-5);
        assert!(bounds.max.y <= outer + 1e-5);
    }
}
