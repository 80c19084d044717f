//! Geometry generation for labels, tick marks and the cylinder itself.
//!
//! Text goes through three stages: flat extrusion ([`text`]), subdivision of
//! long triangles ([`tessellate`]) and bending onto the cylinder ([`bend`]).

pub mod bend;
pub mod cylinder;
pub mod glyphs;
pub mod marker;
pub mod mesh;
pub mod pointer;
pub mod tessellate;
pub mod text;

pub use cylinder::cylinder_body_geometry;
pub use marker::{marker_geometry, MarkerShape};
pub use mesh::{BoundingBox, Mesh, Triangle, Vertex};
pub use pointer::pointer_geometry;
