//! Splits long triangles so flat geometry can bend smoothly.

use super::mesh::{Mesh, Triangle, Vertex};
use nalgebra::center;

/// Repeatedly halves every triangle whose longest edge is longer than
/// `max_edge_length`, splitting that edge at its midpoint.
///
/// At most `max_passes` passes run; the loop stops early once a pass splits
/// nothing. Winding is preserved.
pub fn tessellate(mesh: &Mesh, max_edge_length: f32, max_passes: u32) -> Mesh {
    let max_sq = max_edge_length * max_edge_length;
    let mut triangles = mesh.triangles.clone();

    for _ in 0..max_passes {
        let mut split_any = false;
        let mut next = Vec::with_capacity(triangles.len() * 2);
        for triangle in triangles {
            match split_longest_edge(&triangle, max_sq) {
                Some((a, b)) => {
                    split_any = true;
                    next.push(a);
                    next.push(b);
                }
                None => next.push(triangle),
            }
        }
        triangles = next;
        if !split_any {
            break;
        }
    }
    Mesh { triangles }
}

fn split_longest_edge(triangle: &Triangle, max_sq: f32) -> Option<(Triangle, Triangle)> {
    let [v0, v1, v2] = triangle.vertices;
    let lengths = [
        (v1.position - v0.position).norm_squared(),
        (v2.position - v1.position).norm_squared(),
        (v0.position - v2.position).norm_squared(),
    ];
    let (edge, longest) = lengths
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
    if longest <= max_sq {
        return None;
    }

    // Rotate so the edge to split is always a -> b, with c opposite.
    let (a, b, c) = match edge {
        0 => (v0, v1, v2),
        1 => (v1, v2, v0),
        _ => (v2, v0, v1),
    };
    let m = Vertex::at(center(&a.position, &b.position));
    Some((Triangle::new(a, m, c), Triangle::new(m, b, c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn long_sliver() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.add_triangle(Triangle::from_points(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 0.1, 0.0),
        ));
        mesh
    }

    fn area(mesh: &Mesh) -> f32 {
        mesh.triangles.iter().map(|t| t.scaled_normal().norm() / 2.0).sum()
    }

    #[test]
    fn splits_until_edges_fit() {
        let mesh = long_sliver();
        let out = tessellate(&mesh, 0.3, 12);
        assert!(out.triangles.len() > 1);
        for t in &out.triangles {
            let [a, b, c] = t.vertices;
            for (p, q) in [(a, b), (b, c), (c, a)] {
                assert!((q.position - p.position).norm() <= 0.3 + 1e-6);
            }
        }
        assert!((area(&out) - area(&mesh)).abs() < 1e-6);
    }

    #[test]
    fn pass_limit_bounds_the_work() {
        let out = tessellate(&long_sliver(), 0.001, 3);
        assert_eq!(out.triangles.len(), 8);
    }

    #[test]
    fn winding_is_preserved() {
        let mesh = long_sliver();
        let normal = mesh.triangles[0].calculate_normal();
        for t in tessellate(&mesh, 0.2, 8).triangles {
            assert!((t.calculate_normal() - normal).norm() < 1e-5);
        }
    }

    #[test]
    fn short_triangles_pass_through() {
        let mesh = long_sliver();
        assert_eq!(tessellate(&mesh, 2.0, 5), mesh);
    }
}
