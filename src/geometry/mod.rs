//! GPU geometry for SDF glyph rendering.
//!
//! Two builders walk the same command stream: [`FillBuilder`] emits the
//! triangle fans and Loop-Blinn curve triangles used by the stencil fill
//! passes, [`LineBuilder`] emits one parabola-parameterized quad per outline
//! segment for the distance pass. [`GlyphPainter`] drives both per glyph.

pub mod parabola;

use bytemuck::{Pod, Zeroable};
use vulkano::pipeline::graphics::vertex_input::Vertex;

use crate::font::{Font, GlyphCommand};
use crate::math::Vec2;
use parabola::{qbez_type, Parabola, QbezType};

/// Vertex consumed by both SDF programs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, Vertex)]
pub struct SdfVertex {
    /// World (atlas pixel) position
    #[format(R32G32_SFLOAT)]
    pub pos: [f32; 2],
    /// Position in the parabola's local frame; (0, 1) for solid fill
    #[format(R32G32_SFLOAT)]
    pub par: [f32; 2],
    /// Parabola segment x-range
    #[format(R32G32_SFLOAT)]
    pub limits: [f32; 2],
    /// Parabola-to-world scale
    #[format(R32_SFLOAT)]
    pub scale: f32,
    /// Outline half-width (the SDF border) in world units
    #[format(R32_SFLOAT)]
    pub line_width: f32,
}

impl SdfVertex {
    /// A vertex of a solid fill triangle: par = (0, 1) keeps the curve
    /// test `u^2 - v > 0` from ever discarding it.
    fn solid(pos: Vec2) -> Self {
        SdfVertex {
            pos: [pos.x, pos.y],
            par: [0.0, 1.0],
            limits: [0.0, 0.0],
            scale: 0.0,
            line_width: 0.0,
        }
    }

    fn curve(pos: Vec2, par: Vec2) -> Self {
        SdfVertex {
            pos: [pos.x, pos.y],
            par: [par.x, par.y],
            limits: [0.0, 0.0],
            scale: 0.0,
            line_width: 0.0,
        }
    }
}

/// Builds the stencil fill geometry: a triangle fan per contour plus one
/// curve triangle per quadratic segment.
#[derive(Default)]
pub struct FillBuilder {
    pub vertices: Vec<SdfVertex>,
    fan_pos: Vec2,
    prev_pos: Vec2,
}

impl FillBuilder {
    fn fill_triangle(&mut self, p0: Vec2, p1: Vec2, p2: Vec2) {
        self.vertices.push(SdfVertex::solid(p0));
        self.vertices.push(SdfVertex::solid(p1));
        self.vertices.push(SdfVertex::solid(p2));
    }

    pub fn move_to(&mut self, p0: Vec2) {
        self.fan_pos = p0;
        self.prev_pos = p0;
    }

    pub fn line_to(&mut self, p1: Vec2) {
        self.fill_triangle(self.fan_pos, self.prev_pos, p1);
        self.prev_pos = p1;
    }

    pub fn qbez_to(&mut self, ctrl: Vec2, p2: Vec2) {
        self.fill_triangle(self.fan_pos, self.prev_pos, p2);

        // Canonical quadratic triangle: the fragment test u^2 > v carves
        // the lens between chord and curve out of (or into) the fan.
        self.vertices.push(SdfVertex::curve(self.prev_pos, Vec2::new(-1.0, 1.0)));
        self.vertices.push(SdfVertex::curve(ctrl, Vec2::new(0.0, -1.0)));
        self.vertices.push(SdfVertex::curve(p2, Vec2::new(1.0, 1.0)));

        self.prev_pos = p2;
    }

    pub fn close(&mut self) {
        if (self.fan_pos - self.prev_pos).sqr_length() < 1e-7 {
            return;
        }
        self.line_to(self.fan_pos);
    }
}

/// Builds the distance-pass geometry: a quad per segment covering its
/// bounding box grown by the line width, every vertex carrying the
/// segment's parabola parameters.
#[derive(Default)]
pub struct LineBuilder {
    pub vertices: Vec<SdfVertex>,
    start_pos: Vec2,
    prev_pos: Vec2,
}

impl LineBuilder {
    pub fn move_to(&mut self, p0: Vec2) {
        self.start_pos = p0;
        self.prev_pos = p0;
    }

    fn par_vertex(pos: Vec2, par: &Parabola, line_width: f32) -> SdfVertex {
        let local = par.world_to_par(pos);
        SdfVertex {
            pos: [pos.x, pos.y],
            par: [local.x, local.y],
            limits: [par.xstart, par.xend],
            scale: par.scale,
            line_width,
        }
    }

    fn line_rect(&mut self, par: &Parabola, vmin: Vec2, vmax: Vec2, line_width: f32) {
        let v0 = Self::par_vertex(Vec2::new(vmin.x, vmin.y), par, line_width);
        let v1 = Self::par_vertex(Vec2::new(vmax.x, vmin.y), par, line_width);
        let v2 = Self::par_vertex(Vec2::new(vmax.x, vmax.y), par, line_width);
        let v3 = Self::par_vertex(Vec2::new(vmin.x, vmax.y), par, line_width);

        self.vertices.push(v0);
        self.vertices.push(v1);
        self.vertices.push(v2);

        self.vertices.push(v0);
        self.vertices.push(v2);
        self.vertices.push(v3);
    }

    pub fn line_to(&mut self, p1: Vec2, line_width: f32) {
        let vmin = self.prev_pos.min(p1) - Vec2::splat(line_width);
        let vmax = self.prev_pos.max(p1) + Vec2::splat(line_width);

        let par = Parabola::from_line(self.prev_pos, p1);
        self.line_rect(&par, vmin, vmax, line_width);

        self.prev_pos = p1;
    }

    pub fn qbez_to(&mut self, p1: Vec2, p2: Vec2, line_width: f32) {
        let p0 = self.prev_pos;

        // Control-polygon midpoints bound the curve tighter than p1 itself
        let mid01 = (p0 + p1) * 0.5;
        let mid12 = (p1 + p2) * 0.5;
        let vmin = p0.min(mid01).min(mid12).min(p2) - Vec2::splat(line_width);
        let vmax = p0.max(mid01).max(mid12).max(p2) + Vec2::splat(line_width);

        let v10 = p0 - p1;
        let v12 = p2 - p1;

        match qbez_type(v10.normalize(), v12.normalize()) {
            QbezType::Parabola => {
                let par = Parabola::from_qbez(p0, p1, p2);
                self.line_rect(&par, vmin, vmax, line_width);
            }
            QbezType::Line => {
                let par = Parabola::from_line(p0, p2);
                self.line_rect(&par, vmin, vmax, line_width);
            }
            QbezType::TwoLines => {
                // Split at the curve apex and cover each half with a
                // straight-segment parabola.
                let l10 = v10.length();
                let l12 = v12.length();
                let qt = l10 / (l10 + l12);
                let nqt = 1.0 - qt;
                let qtop = p0 * (nqt * nqt) + p1 * (2.0 * nqt * qt) + p2 * (qt * qt);
                let par0 = Parabola::from_line(p0, qtop);
                self.line_rect(&par0, vmin, vmax, line_width);
                let par1 = Parabola::from_line(qtop, p1);
                self.line_rect(&par1, vmin, vmax, line_width);
            }
        }

        self.prev_pos = p2;
    }

    pub fn close(&mut self, line_width: f32) {
        if (self.start_pos - self.prev_pos).sqr_length() < 1e-7 {
            return;
        }
        self.line_to(self.start_pos, line_width);
    }
}

/// Walks a glyph's command stream once, feeding both builders.
#[derive(Default)]
pub struct GlyphPainter {
    pub fill: FillBuilder,
    pub line: LineBuilder,
}

impl GlyphPainter {
    /// Paint one glyph at `pos` (atlas pixels), `scale` mapping normalized
    /// font units to pixels, `sdf_size` the border half-width in pixels.
    pub fn draw_glyph(&mut self, font: &Font, glyph_index: u16, pos: Vec2, scale: f32, sdf_size: f32) {
        let Some(glyph) = font.glyphs.get(glyph_index as usize) else {
            return;
        };
        if glyph.command_count == 0 {
            return;
        }

        for command in font.commands_of(glyph) {
            match *command {
                GlyphCommand::MoveTo(p0) => {
                    let p0 = p0 * scale + pos;
                    self.fill.move_to(p0);
                    self.line.move_to(p0);
                }
                GlyphCommand::LineTo(p0) => {
                    let p0 = p0 * scale + pos;
                    self.fill.line_to(p0);
                    self.line.line_to(p0, sdf_size);
                }
                GlyphCommand::QuadBezTo(ctrl, p1) => {
                    let ctrl = ctrl * scale + pos;
                    let p1 = p1 * scale + pos;
                    self.fill.qbez_to(ctrl, p1);
                    self.line.qbez_to(ctrl, p1, sdf_size);
                }
                GlyphCommand::ClosePath => {
                    self.fill.close();
                    self.line.close(sdf_size);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_builder_fan_and_curve_triangles() {
        let mut fb = FillBuilder::default();
        fb.move_to(Vec2::new(0.0, 0.0));
        fb.line_to(Vec2::new(10.0, 0.0));
        // one solid triangle
        assert_eq!(fb.vertices.len(), 3);
        assert_eq!(fb.vertices[0].par, [0.0, 1.0]);

        fb.qbez_to(Vec2::new(15.0, 5.0), Vec2::new(10.0, 10.0));
        // plus a solid fan triangle and a curve triangle
        assert_eq!(fb.vertices.len(), 9);
        assert_eq!(fb.vertices[6].par, [-1.0, 1.0]);
        assert_eq!(fb.vertices[7].par, [0.0, -1.0]);
        assert_eq!(fb.vertices[8].par, [1.0, 1.0]);
    }

    #[test]
    fn test_fill_close_emits_closing_triangle_once() {
        let mut fb = FillBuilder::default();
        fb.move_to(Vec2::new(0.0, 0.0));
        fb.line_to(Vec2::new(10.0, 0.0));
        fb.line_to(Vec2::new(10.0, 10.0));
        fb.close();
        assert_eq!(fb.vertices.len(), 9);
        let before = fb.vertices.len();
        // already closed: close again is a no-op
        fb.close();
        assert_eq!(fb.vertices.len(), before);
    }

    #[test]
    fn test_line_builder_quad_per_segment() {
        let mut lb = LineBuilder::default();
        lb.move_to(Vec2::new(0.0, 0.0));
        lb.line_to(Vec2::new(100.0, 0.0), 16.0);
        assert_eq!(lb.vertices.len(), 6);

        // quad covers the segment bbox grown by the line width
        let xs: Vec<f32> = lb.vertices.iter().map(|v| v.pos[0]).collect();
        let ys: Vec<f32> = lb.vertices.iter().map(|v| v.pos[1]).collect();
        assert!(xs.iter().cloned().fold(f32::MAX, f32::min) == -16.0);
        assert!(xs.iter().cloned().fold(f32::MIN, f32::max) == 116.0);
        assert!(ys.iter().cloned().fold(f32::MAX, f32::min) == -16.0);
        assert!(ys.iter().cloned().fold(f32::MIN, f32::max) == 16.0);

        // all vertices carry the segment's parabola
        let v = lb.vertices[0];
        assert!(v.limits[0] < v.limits[1]);
        assert!((v.line_width - 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_line_builder_classifies_quadratics() {
        // proper curve: one quad
        let mut lb = LineBuilder::default();
        lb.move_to(Vec2::new(0.0, 0.0));
        lb.qbez_to(Vec2::new(50.0, 80.0), Vec2::new(100.0, 0.0), 16.0);
        assert_eq!(lb.vertices.len(), 6);

        // collinear control point: one quad from the line parabola
        let mut lb = LineBuilder::default();
        lb.move_to(Vec2::new(0.0, 0.0));
        lb.qbez_to(Vec2::new(50.0, 0.0), Vec2::new(100.0, 0.0), 16.0);
        assert_eq!(lb.vertices.len(), 6);

        // cusp: split into two quads
        let mut lb = LineBuilder::default();
        lb.move_to(Vec2::new(0.0, 0.0));
        lb.qbez_to(Vec2::new(100.0, 0.0), Vec2::new(10.0, 0.0), 16.0);
        assert_eq!(lb.vertices.len(), 12);
    }

    #[test]
    fn test_straight_segment_parabola_distance() {
        // parabola-space distance times scale recovers world distance
        let p0 = Vec2::new(0.0, 0.0);
        let p2 = Vec2::new(100.0, 0.0);
        let par = Parabola::from_line(p0, p2);

        let probe = Vec2::new(50.0, 7.0);
        let local = par.world_to_par(probe);
        // nearest parabola point is essentially (local.x, local.x^2)
        let clamped = local.x.clamp(par.xstart, par.xend);
        let on_curve = Vec2::new(clamped, clamped * clamped);
        let dist = (on_curve - local).length() * par.scale;
        assert!((dist - 7.0).abs() < 1e-2);
    }
}
