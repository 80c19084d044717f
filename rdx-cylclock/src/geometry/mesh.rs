//! Triangle-soup mesh primitives.

use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

/// A 3D vertex with position and normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
}

impl Vertex {
    pub fn at(position: Point3<f32>) -> Self {
        Self {
            position,
            normal: Vector3::zeros(),
        }
    }
}

/// A triangle face defined by three vertices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
}

impl Triangle {
    pub fn new(v0: Vertex, v1: Vertex, v2: Vertex) -> Self {
        Self {
            vertices: [v0, v1, v2],
        }
    }

    pub fn from_points(p0: Point3<f32>, p1: Point3<f32>, p2: Point3<f32>) -> Self {
        Self::new(Vertex::at(p0), Vertex::at(p1), Vertex::at(p2))
    }

    /// Area-weighted face normal (length is twice the triangle's area).
    pub fn scaled_normal(&self) -> Vector3<f32> {
        let v0 = self.vertices[0].position;
        let v1 = self.vertices[1].position;
        let v2 = self.vertices[2].position;
        (v1 - v0).cross(&(v2 - v0))
    }

    /// Calculate the unit face normal, or zero for a degenerate triangle.
    pub fn calculate_normal(&self) -> Vector3<f32> {
        self.scaled_normal()
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }
}

/// Axis-aligned bounds of a mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl BoundingBox {
    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }
}

/// A 3D mesh composed of triangles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    pub fn new() -> Self {
        Self {
            triangles: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            triangles: Vec::with_capacity(capacity),
        }
    }

    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    /// Adds the quad `a b c d` (counter-clockwise seen from outside) as two
    /// triangles.
    pub fn add_quad(&mut self, a: Point3<f32>, b: Point3<f32>, c: Point3<f32>, d: Point3<f32>) {
        self.add_triangle(Triangle::from_points(a, b, c));
        self.add_triangle(Triangle::from_points(a, c, d));
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.triangles.len() * 3
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.triangles.iter().flat_map(|t| t.vertices.iter())
    }

    pub fn vertices_mut(&mut self) -> impl Iterator<Item = &mut Vertex> {
        self.triangles.iter_mut().flat_map(|t| t.vertices.iter_mut())
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut vertices = self.vertices();
        let first = vertices.next()?.position;
        let (min, max) = vertices.fold((first, first), |(min, max), v| {
            (min.inf(&v.position), max.sup(&v.position))
        });
        Some(BoundingBox { min, max })
    }

    /// Sets every vertex normal to the normalised, area-weighted sum of the
    /// normals of the faces that share its position, ignoring faces that turn
    /// away by more than `crease_angle` radians. Sharp edges stay sharp while
    /// bent, subdivided surfaces shade smoothly.
    pub fn compute_smooth_normals(&mut self, crease_angle: f32) {
        let cos_crease = crease_angle.cos();
        let faces: Vec<(Vector3<f32>, Vector3<f32>)> = self
            .triangles
            .iter()
            .map(|t| (t.scaled_normal(), t.calculate_normal()))
            .collect();

        let mut shared: HashMap<[i32; 3], Vec<usize>> = HashMap::new();
        for (face, triangle) in self.triangles.iter().enumerate() {
            for vertex in &triangle.vertices {
                shared.entry(weld_key(&vertex.position)).or_default().push(face);
            }
        }

        for (face, triangle) in self.triangles.iter_mut().enumerate() {
            let own = faces[face].1;
            for vertex in triangle.vertices.iter_mut() {
                let sum = shared
                    .get(&weld_key(&vertex.position))
                    .into_iter()
                    .flatten()
                    .filter(|&&other| faces[other].1.dot(&own) >= cos_crease)
                    .fold(Vector3::zeros(), |acc, &other| acc + faces[other].0);
                vertex.normal = sum.try_normalize(f32::EPSILON).unwrap_or(own);
            }
        }
    }

    /// Flattens into interleaved-free position and normal buffers, three
    /// floats per vertex.
    pub fn to_buffers(&self) -> (Vec<f32>, Vec<f32>) {
        let mut positions = Vec::with_capacity(self.vertex_count() * 3);
        let mut normals = Vec::with_capacity(self.vertex_count() * 3);
        for v in self.vertices() {
            positions.extend_from_slice(&[v.position.x, v.position.y, v.position.z]);
            normals.extend_from_slice(&[v.normal.x, v.normal.y, v.normal.z]);
        }
        (positions, normals)
    }
}

/// Quantises a position so vertices produced by different faces still weld.
fn weld_key(p: &Point3<f32>) -> [i32; 3] {
    const SCALE: f32 = 1e4;
    [
        (p.x * SCALE).round() as i32,
        (p.y * SCALE).round() as i32,
        (p.z * SCALE).round() as i32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.add_quad(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        mesh
    }

    #[test]
    fn test_bounding_box() {
        let mesh = unit_quad();
        let bounds = mesh.bounding_box().unwrap();
        assert_eq!(bounds.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(bounds.max, Point3::new(1.0, 1.0, 0.0));
        assert_eq!(bounds.center(), Point3::new(0.5, 0.5, 0.0));
        assert!(Mesh::new().bounding_box().is_none());
    }

    #[test]
    fn test_flat_quad_normals_point_up() {
        let mut mesh = unit_quad();
        mesh.compute_smooth_normals(0.5);
        for v in mesh.vertices() {
            assert!((v.normal - Vector3::z()).norm() < 1e-6);
        }
    }

    #[test]
    fn test_crease_keeps_right_angles_sharp() {
        let mut mesh = unit_quad();
        // A wall standing on the quad's x = 1 edge, facing +x.
        mesh.add_quad(
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
        );
        mesh.compute_smooth_normals(40f32.to_radians());
        for triangle in &mesh.triangles[..2] {
            for v in &triangle.vertices {
                assert!((v.normal - Vector3::z()).norm() < 1e-6);
            }
        }
        for triangle in &mesh.triangles[2..] {
            for v in &triangle.vertices {
                assert!((v.normal - Vector3::x()).norm() < 1e-6);
            }
        }
    }

    #[test]
    fn test_buffers_have_three_floats_per_vertex() {
        let mesh = unit_quad();
        let (positions, normals) = mesh.to_buffers();
        assert_eq!(positions.len(), 18);
        assert_eq!(normals.len(), 18);
        assert_eq!(&positions[3..6], &[1.0, 0.0, 0.0]);
    }
}
