//! Wraps flat geometry around the cylinder's surface.

use super::mesh::Mesh;
use nalgebra::Point3;

/// Faces that meet at more than this angle keep separate normals.
pub const CREASE_ANGLE_DEGREES: f32 = 40.0;

/// Bends flat text onto a cylinder of `radius` whose axis is the x axis.
///
/// The text is centred on its bounding box. Its x becomes the axial
/// coordinate; its height turns into an angular offset (`y / radius`)
/// subtracted from `target_angle`, and its extrusion depth lifts it off the
/// surface. The result sits at `(x, (r + z)·cos θ, (r + z)·sin θ)`. Normals
/// are recomputed afterwards, since the flat ones no longer apply.
pub fn bend_onto_cylinder(mesh: &mut Mesh, radius: f32, target_angle: f32) {
    let Some(bounds) = mesh.bounding_box() else {
        return;
    };
    let middle = bounds.center();

    for vertex in mesh.vertices_mut() {
        let flat = vertex.position;
        let axial = flat.x - middle.x;
        let angle = target_angle - (flat.y - middle.y) / radius;
        let lifted = radius + flat.z;
        vertex.position = Point3::new(axial, lifted * angle.cos(), lifted * angle.sin());
    }
    mesh.compute_smooth_normals(CREASE_ANGLE_DEGREES.to_radians());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::text::extrude_text;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn text_lands_on_the_surface_at_the_target_angle() {
        let radius = 1.5;
        let depth = 0.08;
        let mut mesh = extrude_text("Quarter to 4", 1.0, depth);
        bend_onto_cylinder(&mut mesh, radius, FRAC_PI_2);

        let bounds = mesh.bounding_box().unwrap();
        // Axially centred.
        assert!((bounds.min.x + bounds.max.x).abs() < 1e-4);

        for v in mesh.vertices() {
            let r = (v.position.y * v.position.y + v.position.z * v.position.z).sqrt();
            assert!(r >= radius - 1e-4 && r <= radius + depth + 1e-4, "r = {r}");
        }

        // Vertical centre of the text lies on the target angle (+z at π/2).
        let mid_y = (bounds.min.y + bounds.max.y) / 2.0;
        assert!(mid_y.abs() < 0.05, "mid_y = {mid_y}");
        assert!(bounds.min.z > 0.0);
    }

    #[test]
    fn outer_faces_point_away_from_the_axis() {
        let mut mesh = extrude_text("O", 1.0, 0.1);
        bend_onto_cylinder(&mut mesh, 1.5, 0.3);
        let outermost = mesh
            .triangles
            .iter()
            .filter(|t| {
                t.vertices.iter().all(|v| {
                    let r = (v.position.y.powi(2) + v.position.z.powi(2)).sqrt();
                    (r - 1.6).abs() < 1e-4
                })
            })
            .collect::<Vec<_>>();
        assert!(!outermost.is_empty());
        for t in outermost {
            for v in &t.vertices {
                let radial = nalgebra::Vector3::new(0.0, v.position.y, v.position.z).normalize();
                assert!(v.normal.dot(&radial) > 0.9);
            }
        }
    }
}
