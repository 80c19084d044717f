//! Flat, extruded text geometry.
//!
//! Text runs along +x from the origin, glyph rows stack along +y (the
//! baseline at y = 0) and the extrusion goes from z = 0 to z = depth.

use super::glyphs::{glyph, is_lit, Glyph, ADVANCE_COLUMNS, GLYPH_COLUMNS, GLYPH_ROWS};
use super::mesh::Mesh;
use nalgebra::Point3;

/// Builds extruded block text. `size` is the cap height.
///
/// Each inked cell becomes a box; side walls between two inked cells are
/// skipped since they can never be seen.
pub fn extrude_text(text: &str, size: f32, depth: f32) -> Mesh {
    let cell = size / GLYPH_ROWS as f32;
    let mut mesh = Mesh::new();

    for (index, ch) in text.chars().enumerate() {
        let Some(glyph) = glyph(ch) else {
            continue;
        };
        let origin_x = (index as u32 * ADVANCE_COLUMNS) as f32 * cell;
        for row in 0..GLYPH_ROWS {
            for column in 0..GLYPH_COLUMNS {
                if is_lit(glyph, column, row) {
                    add_cell(&mut mesh, glyph, column, row, origin_x, cell, depth);
                }
            }
        }
    }
    mesh
}

/// Width of `text` as laid out by [`extrude_text`], trailing spacing excluded.
pub fn text_width(text: &str, size: f32) -> f32 {
    let cell = size / GLYPH_ROWS as f32;
    match text.chars().count() as u32 {
        0 => 0.0,
        n => (n * ADVANCE_COLUMNS - 1) as f32 * cell,
    }
}

fn add_cell(
    mesh: &mut Mesh,
    glyph: &Glyph,
    column: u32,
    row: u32,
    origin_x: f32,
    cell: f32,
    depth: f32,
) {
    let x0 = origin_x + column as f32 * cell;
    let x1 = x0 + cell;
    let y0 = (GLYPH_ROWS - 1 - row) as f32 * cell;
    let y1 = y0 + cell;
    let (z0, z1) = (0.0, depth);
    let p = Point3::new;

    // front (+z) and back (-z)
    mesh.add_quad(p(x0, y0, z1), p(x1, y0, z1), p(x1, y1, z1), p(x0, y1, z1));
    mesh.add_quad(p(x0, y0, z0), p(x0, y1, z0), p(x1, y1, z0), p(x1, y0, z0));

    if depth <= 0.0 {
        return;
    }
    // left (-x)
    if column == 0 || !is_lit(glyph, column - 1, row) {
        mesh.add_quad(p(x0, y0, z0), p(x0, y0, z1), p(x0, y1, z1), p(x0, y1, z0));
    }
    // right (+x)
    if !is_lit(glyph, column + 1, row) {
        mesh.add_quad(p(x1, y0, z0), p(x1, y1, z0), p(x1, y1, z1), p(x1, y0, z1));
    }
    // top (+y); the row above has the smaller index
    if row == 0 || !is_lit(glyph, column, row - 1) {
        mesh.add_quad(p(x0, y1, z0), p(x0, y1, z1), p(x1, y1, z1), p(x1, y1, z0));
    }
    // bottom (-y)
    if !is_lit(glyph, column, row + 1) {
        mesh.add_quad(p(x0, y0, z0), p(x1, y0, z0), p(x1, y0, z1), p(x0, y0, z1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn blank_text_has_no_triangles() {
        assert!(extrude_text("   ", 1.0, 0.1).is_empty());
        assert!(extrude_text("", 1.0, 0.1).is_empty());
    }

    #[test]
    fn a_dash_is_one_closed_bar() {
        let mesh = extrude_text("-", 0.7, 0.1);
        // Five cells: front + back each, two end caps, five tops, five bottoms.
        assert_eq!(mesh.triangles.len(), (5 * 2 + 2 + 5 + 5) * 2);
        let bounds = mesh.bounding_box().unwrap();
        assert!((bounds.size() - Vector3::new(0.5, 0.1, 0.1)).norm() < 1e-5);
    }

    #[test]
    fn faces_wind_outwards() {
        let mesh = extrude_text("-", 0.7, 0.1);
        let center = mesh.bounding_box().unwrap().center();
        for triangle in &mesh.triangles {
            let normal = triangle.calculate_normal();
            let centroid = triangle.vertices.iter().fold(Vector3::zeros(), |acc, v| {
                acc + v.position.coords
            }) / 3.0;
            let outward = centroid - center.coords;
            assert!(normal.dot(&outward) > 0.0, "inward face {triangle:?}");
        }
    }

    #[test]
    fn width_matches_the_laid_out_glyphs() {
        let size = 1.4;
        let mesh = extrude_text("20", size, 0.05);
        let bounds = mesh.bounding_box().unwrap();
        assert!((bounds.size().x - text_width("20", size)).abs() < 1e-5);
        assert!((bounds.size().y - size).abs() < 1e-5);
    }
}
