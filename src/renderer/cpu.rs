//! Software rasterizer mirroring the GPU pass discipline pixel for pixel.
//!
//! Consumes the same two vertex streams as the GPU path: a depth-tested
//! distance pass over the parabola quads, then the stencil winding passes
//! (orientation-split increment/decrement with the Loop-Blinn curve
//! discard) and the final inversion where the winding count is one.
//! Headless and portable; also what the tests exercise.

use crate::geometry::SdfVertex;
use crate::math::Vec2;

pub struct CpuRasterizer;

impl CpuRasterizer {
    pub fn new() -> Self {
        CpuRasterizer
    }

    pub fn max_size(&self) -> u32 {
        16384
    }

    /// Render both vertex streams into a single-channel image.
    /// Row 0 of the result is world y = 0, as with the GPU readback.
    pub fn render(
        &self,
        width: u32,
        height: u32,
        fill_vertices: &[SdfVertex],
        line_vertices: &[SdfVertex],
    ) -> Vec<u8> {
        let mut frame = Frame::new(width as usize, height as usize);

        for tri in line_vertices.chunks_exact(3) {
            frame.raster_line_triangle([tri[0], tri[1], tri[2]]);
        }

        if !fill_vertices.is_empty() {
            // Clockwise triangles increment the winding count, then
            // counter-clockwise ones decrement, both saturating - the same
            // order the GPU's two culled draws run in.
            for tri in fill_vertices.chunks_exact(3) {
                if triangle_area(tri) < 0.0 {
                    frame.raster_fill_triangle([tri[0], tri[1], tri[2]], Winding::Increment);
                }
            }
            for tri in fill_vertices.chunks_exact(3) {
                if triangle_area(tri) > 0.0 {
                    frame.raster_fill_triangle([tri[0], tri[1], tri[2]], Winding::Decrement);
                }
            }

            for (color, stencil) in frame.color.iter_mut().zip(&frame.stencil) {
                if *stencil == 1 {
                    *color = 1.0 - *color;
                }
            }
        }

        frame
            .color
            .iter()
            .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }
}

#[derive(Clone, Copy)]
enum Winding {
    Increment,
    Decrement,
}

/// Twice the signed area; positive for counter-clockwise in y-up coords.
fn triangle_area(tri: &[SdfVertex]) -> f32 {
    let a = Vec2::new(tri[0].pos[0], tri[0].pos[1]);
    let b = Vec2::new(tri[1].pos[0], tri[1].pos[1]);
    let c = Vec2::new(tri[2].pos[0], tri[2].pos[1]);
    edge(a, b, c)
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Boundary ownership for pixels exactly on a shared edge: the edge
/// direction decides, so of two triangles meeting at the edge exactly one
/// claims it.
fn edge_accepts_boundary(a: Vec2, b: Vec2) -> bool {
    let dy = b.y - a.y;
    dy > 0.0 || (dy == 0.0 && b.x < a.x)
}

struct Frame {
    width: usize,
    height: usize,
    color: Vec<f32>,
    depth: Vec<f32>,
    stencil: Vec<u8>,
}

impl Frame {
    fn new(width: usize, height: usize) -> Self {
        Frame {
            width,
            height,
            color: vec![0.0; width * height],
            depth: vec![1.0; width * height],
            stencil: vec![0; width * height],
        }
    }

    /// Visit every covered pixel center with its barycentric weights,
    /// triangle pre-normalized to counter-clockwise.
    fn for_each_covered(
        &mut self,
        tri: [SdfVertex; 3],
        mut visit: impl FnMut(&mut Frame, usize, [f32; 3], [SdfVertex; 3]),
    ) {
        let mut tri = tri;
        let mut area = triangle_area(&tri);
        if area == 0.0 || !area.is_finite() {
            return;
        }
        if area < 0.0 {
            tri.swap(1, 2);
            area = -area;
        }

        let p = [
            Vec2::new(tri[0].pos[0], tri[0].pos[1]),
            Vec2::new(tri[1].pos[0], tri[1].pos[1]),
            Vec2::new(tri[2].pos[0], tri[2].pos[1]),
        ];

        let min_x = p[0].x.min(p[1].x).min(p[2].x).floor().max(0.0) as usize;
        let min_y = p[0].y.min(p[1].y).min(p[2].y).floor().max(0.0) as usize;
        let max_x = p[0].x.max(p[1].x).max(p[2].x).ceil().min(self.width as f32) as usize;
        let max_y = p[0].y.max(p[1].y).max(p[2].y).ceil().min(self.height as f32) as usize;

        for py in min_y..max_y {
            for px in min_x..max_x {
                let c = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
                let w0 = edge(p[1], p[2], c);
                let w1 = edge(p[2], p[0], c);
                let w2 = edge(p[0], p[1], c);

                let inside = (w0 > 0.0 || (w0 == 0.0 && edge_accepts_boundary(p[1], p[2])))
                    && (w1 > 0.0 || (w1 == 0.0 && edge_accepts_boundary(p[2], p[0])))
                    && (w2 > 0.0 || (w2 == 0.0 && edge_accepts_boundary(p[0], p[1])));
                if !inside {
                    continue;
                }

                let weights = [w0 / area, w1 / area, w2 / area];
                let idx = py * self.width + px;
                visit(self, idx, weights, tri);
            }
        }
    }

    /// Distance pass fragment: solve the parabola cubic, depth test keeps
    /// the minimum.
    fn raster_line_triangle(&mut self, tri: [SdfVertex; 3]) {
        self.for_each_covered(tri, |frame, idx, w, tri| {
            let par = Vec2::new(
                w[0] * tri[0].par[0] + w[1] * tri[1].par[0] + w[2] * tri[2].par[0],
                w[0] * tri[0].par[1] + w[1] * tri[1].par[1] + w[2] * tri[2].par[1],
            );
            // per-primitive attributes are constant across the triangle
            let limits = tri[0].limits;
            let scale = tri[0].scale;
            let line_width = tri[0].line_width;

            let dist = solve_par_dist(par, limits[0], limits[1], 3);
            let pdist = (dist * scale / line_width).min(1.0);
            let color = 0.5 - 0.5 * pdist;
            if color == 0.0 {
                return;
            }
            if pdist <= frame.depth[idx] {
                frame.depth[idx] = pdist;
                frame.color[idx] = color;
            }
        });
    }

    /// Stencil pass fragment: curve test, then saturating winding update.
    fn raster_fill_triangle(&mut self, tri: [SdfVertex; 3], winding: Winding) {
        self.for_each_covered(tri, |frame, idx, w, tri| {
            let u = w[0] * tri[0].par[0] + w[1] * tri[1].par[0] + w[2] * tri[2].par[0];
            let v = w[0] * tri[0].par[1] + w[1] * tri[1].par[1] + w[2] * tri[2].par[1];
            if u * u - v > 0.0 {
                return;
            }
            frame.stencil[idx] = match winding {
                Winding::Increment => frame.stencil[idx].saturating_add(1),
                Winding::Decrement => frame.stencil[idx].saturating_sub(1),
            };
        });
    }
}

/// Nearest-point distance on the parabola y = x^2, clamped to the segment
/// limits: the Strobach low-rank LDL^T iteration, same as the fragment
/// shader. The second root may come out NaN below the evolute; `f32::min`
/// then picks the first.
fn solve_par_dist(par: Vec2, xstart: f32, xend: f32, iterations: u32) -> f32 {
    let sigx = if par.x > 0.0 { 1.0 } else { -1.0 };
    let px = par.x.abs();
    let py = par.y;
    let h = 0.5 * px;
    let g = 0.5 - py;
    let xr = (0.5 * px).sqrt();

    let mut x0 = if g < -h {
        g.abs().sqrt()
    } else if g > xr {
        h / g.abs()
    } else {
        xr
    };

    for _ in 0..iterations {
        let rcx0 = 1.0 / x0;
        let pb = h * rcx0 * rcx0;
        let pc = -px * rcx0 + g;
        x0 = 2.0 * pc / (-pb - (pb * pb - 4.0 * pc).abs().sqrt());
    }

    let x0 = sigx * x0;
    let dx = sigx * (-0.75 * x0 * x0 - g).sqrt();
    let x1 = -0.5 * x0 - dx;

    let x0 = x0.clamp(xstart, xend);
    let x1 = x1.clamp(xstart, xend);

    let d0 = (Vec2::new(x0, x0 * x0) - par).length();
    let d1 = (Vec2::new(x1, x1 * x1) - par).length();

    d0.min(d1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{FillBuilder, LineBuilder};

    /// Recover the signed pixel distance from an SDF byte.
    fn byte_to_dist(b: u8, border: f32) -> f32 {
        (b as f32 / 255.0 - 0.5) * 2.0 * border
    }

    /// Clockwise square outline (TTF outer contour direction in y-up
    /// coordinates) from (10,10) to (54,54), border 8, in a 64x64 image.
    fn square_sdf() -> Vec<u8> {
        let border = 8.0;
        let mut fill = FillBuilder::default();
        let mut line = LineBuilder::default();

        let pts = [
            Vec2::new(10.0, 10.0),
            Vec2::new(10.0, 54.0),
            Vec2::new(54.0, 54.0),
            Vec2::new(54.0, 10.0),
        ];
        fill.move_to(pts[0]);
        line.move_to(pts[0]);
        for p in &pts[1..] {
            fill.line_to(*p);
            line.line_to(*p, border);
        }
        fill.close();
        line.close(border);

        CpuRasterizer::new().render(64, 64, &fill.vertices, &line.vertices)
    }

    #[test]
    fn test_square_interior_and_exterior_signs() {
        let sdf = square_sdf();
        let at = |x: usize, y: usize| sdf[y * 64 + x];

        // deep interior: fully inverted
        assert_eq!(at(32, 32), 255);
        // far exterior: untouched clear color
        assert_eq!(at(1, 1), 0);
        // just inside / outside the bottom edge at y = 10
        assert!(at(32, 11) > 0x80);
        assert!(at(32, 8) < 0x80);
    }

    #[test]
    fn test_square_distance_round_trip() {
        let sdf = square_sdf();
        let border = 8.0;

        // pixel centers a few pixels inside the bottom edge
        for (x, y, expected) in [
            (32usize, 14usize, 4.5f32),
            (32, 12, 2.5),
            (20, 11, 1.5),
            (32, 6, -3.5),
            (13, 32, 3.5),
        ] {
            let got = byte_to_dist(sdf[y * 64 + x], border);
            assert!(
                (got - expected).abs() < 1.0,
                "pixel ({}, {}): expected {}, got {}",
                x,
                y,
                expected,
                got
            );
        }
    }

    #[test]
    fn test_square_matches_brute_force_distance() {
        let sdf = square_sdf();
        let border = 8.0;
        let segments = [
            (Vec2::new(10.0, 10.0), Vec2::new(10.0, 54.0)),
            (Vec2::new(10.0, 54.0), Vec2::new(54.0, 54.0)),
            (Vec2::new(54.0, 54.0), Vec2::new(54.0, 10.0)),
            (Vec2::new(54.0, 10.0), Vec2::new(10.0, 10.0)),
        ];
        let seg_dist = |p: Vec2, a: Vec2, b: Vec2| {
            let ab = b - a;
            let t = ((p - a).dot(ab) / ab.dot(ab)).clamp(0.0, 1.0);
            (p - (a + ab * t)).length()
        };

        // sample pixels inside the gradient band around the outline
        for (x, y) in [(16usize, 16usize), (32, 13), (50, 32), (32, 51), (12, 30)] {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let truth = segments
                .iter()
                .map(|&(a, b)| seg_dist(p, a, b))
                .fold(f32::MAX, f32::min);
            let got = byte_to_dist(sdf[y * 64 + x], border).abs();
            assert!(
                (got - truth).abs() < 1.0,
                "pixel ({}, {}): expected |d| {}, got {}",
                x,
                y,
                truth,
                got
            );
        }
    }

    #[test]
    fn test_curved_contour_fills_the_lens() {
        // One quadratic from (20,20) up over (48,90) to (76,20), closed by
        // a straight chord; clockwise so the interior winds to one.
        let border = 16.0;
        let mut fill = FillBuilder::default();
        let mut line = LineBuilder::default();

        let p0 = Vec2::new(20.0, 20.0);
        let ctrl = Vec2::new(48.0, 90.0);
        let p2 = Vec2::new(76.0, 20.0);

        fill.move_to(p0);
        line.move_to(p0);
        fill.qbez_to(ctrl, p2);
        line.qbez_to(ctrl, p2, border);
        fill.line_to(p0);
        line.line_to(p0, border);
        fill.close();
        line.close(border);

        let sdf = CpuRasterizer::new().render(96, 96, &fill.vertices, &line.vertices);
        let at = |x: usize, y: usize| sdf[y * 96 + x];

        // under the curve apex (curve peaks at (48, 55))
        assert!(at(48, 40) > 0x80, "lens interior should be inside");
        // just above the apex: outside but within the gradient band
        let above = at(48, 60);
        assert!(above > 0 && above < 0x80, "above apex should be outside");
        // well outside the quads
        assert_eq!(at(48, 90), 0);
        // below the chord
        assert!(at(48, 16) < 0x80);
    }
}
