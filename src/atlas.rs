//! Atlas layout: glyphs packed left to right in fixed-height rows, each
//! rect padded by the SDF border on every side.

use crate::font::Font;
use crate::geometry::GlyphPainter;
use crate::math::Vec2;

/// A glyph's rectangle in atlas pixels.
#[derive(Clone, Copy, Debug)]
pub struct GlyphRect {
    pub codepoint: u32,
    pub glyph_index: u16,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

pub struct AtlasPacker<'a> {
    font: &'a Font,
    tex_width: f32,
    row_height: f32,
    sdf_border: f32,

    pos_x: f32,
    pos_y: f32,
    /// Bottom of the lowest allocated row; the implied texture height
    pub max_height: f32,

    pub rects: Vec<GlyphRect>,
}

impl<'a> AtlasPacker<'a> {
    pub fn new(font: &'a Font, tex_width: f32, row_height: f32, sdf_border: f32) -> Self {
        Self {
            font,
            tex_width,
            row_height,
            sdf_border,
            pos_x: 0.0,
            pos_y: 0.0,
            max_height: row_height + sdf_border * 2.0,
            rects: Vec::new(),
        }
    }

    /// Glyphs-per-pixel scale: the row height spans ascent to descent.
    fn glyph_scale(&self) -> f32 {
        self.row_height / (self.font.ascent - self.font.descent)
    }

    /// Reserve a rect for one codepoint. Unmapped codepoints, the .notdef
    /// glyph and empty outlines are skipped.
    pub fn allocate_codepoint(&mut self, codepoint: u32) {
        let Some(glyph_index) = self.font.glyph_index(codepoint) else {
            return;
        };
        if glyph_index == 0 {
            return;
        }
        let Some(glyph) = self.font.glyphs.get(glyph_index as usize) else {
            return;
        };
        if glyph.command_count <= 2 {
            return;
        }

        let scale = self.glyph_scale();
        let rect_width = (glyph.max.x - glyph.min.x) * scale + self.sdf_border * 2.0;
        let row_and_border = self.row_height + self.sdf_border * 2.0;

        if self.pos_x + rect_width > self.tex_width {
            self.pos_x = 0.0;
            self.pos_y = (self.pos_y + row_and_border).ceil();
            self.max_height = (self.pos_y + row_and_border).ceil();
        }

        self.rects.push(GlyphRect {
            codepoint,
            glyph_index,
            x0: self.pos_x,
            y0: self.pos_y,
            x1: self.pos_x + rect_width,
            y1: self.pos_y + row_and_border,
        });

        self.pos_x = (self.pos_x + rect_width).ceil();
    }

    /// Allocate an inclusive codepoint range.
    pub fn allocate_range(&mut self, start: u32, end: u32) {
        for codepoint in start..=end {
            self.allocate_codepoint(codepoint);
        }
    }

    /// Allocate every codepoint the font maps.
    #[allow(dead_code)]
    pub fn allocate_all(&mut self) {
        let codepoints: Vec<u32> = self.font.glyph_map.keys().copied().collect();
        for codepoint in codepoints {
            self.allocate_codepoint(codepoint);
        }
    }

    /// Paint every allocated glyph into its rect: baseline sits
    /// `-descent * scale` above the rect bottom, inset by the SDF border
    /// and shifted left by the side bearing.
    pub fn draw_glyphs(&self, painter: &mut GlyphPainter) {
        let scale = self.glyph_scale();
        let baseline = -self.font.descent * scale;

        for rect in &self.rects {
            let left = self.font.glyphs[rect.glyph_index as usize].left_side_bearing * scale;
            let glyph_pos = Vec2::new(rect.x0, rect.y0 + baseline)
                + Vec2::new(self.sdf_border - left, self.sdf_border);
            painter.draw_glyph(self.font, rect.glyph_index, glyph_pos, scale, self.sdf_border);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::{CharClass, Glyph, GlyphCommand};
    use std::collections::BTreeMap;

    /// A synthetic font mapping the printable ASCII range to identical
    /// box glyphs, enough for packing tests.
    fn test_font() -> Font {
        let mut glyph_map = BTreeMap::new();
        let mut cp_map: BTreeMap<u16, Vec<u32>> = BTreeMap::new();
        let mut glyphs = vec![Glyph::default()]; // .notdef
        let mut commands = Vec::new();

        for (i, codepoint) in (0x21u32..=0x7e).enumerate() {
            let glyph_index = (i + 1) as u16;
            glyph_map.insert(codepoint, glyph_index);
            cp_map.entry(glyph_index).or_default().push(codepoint);

            let start = commands.len();
            commands.push(GlyphCommand::MoveTo(Vec2::new(0.0, 0.0)));
            commands.push(GlyphCommand::LineTo(Vec2::new(0.5, 0.0)));
            commands.push(GlyphCommand::LineTo(Vec2::new(0.5, 0.7)));
            commands.push(GlyphCommand::LineTo(Vec2::new(0.0, 0.7)));
            commands.push(GlyphCommand::LineTo(Vec2::new(0.0, 0.0)));
            commands.push(GlyphCommand::ClosePath);

            glyphs.push(Glyph {
                char_class: CharClass::Other,
                advance_width: 0.55,
                left_side_bearing: 0.02,
                min: Vec2::new(0.0, 0.0),
                max: Vec2::new(0.5, 0.7),
                command_start: start,
                command_count: 6,
                ..Glyph::default()
            });
        }

        Font {
            em_ascent: 1000,
            em_descent: -250,
            em_line_gap: 0,
            ascent: 1.0,
            descent: -0.25,
            line_gap: 0.0,
            glyph_map,
            cp_map,
            glyphs,
            commands,
            components: Vec::new(),
            kern_map: BTreeMap::new(),
            glyph_min: Vec2::new(0.0, 0.0),
            glyph_max: Vec2::new(0.5, 0.7),
        }
    }

    #[test]
    fn test_rows_wrap_and_keep_fixed_height() {
        let font = test_font();
        let mut packer = AtlasPacker::new(&font, 1024.0, 96.0, 16.0);
        packer.allocate_range(0x21, 0x7e);

        assert_eq!(packer.rects.len(), 94);

        let row_and_border = 96.0 + 32.0;
        let mut expected_x = 0.0f32;
        let mut expected_y = 0.0f32;
        for rect in &packer.rects {
            // every rect fits the texture and has the fixed row height
            assert!(rect.x1 <= 1024.0);
            assert!((rect.y1 - rect.y0 - row_and_border).abs() < 1e-4);

            let width = rect.x1 - rect.x0;
            if expected_x + width > 1024.0 {
                expected_x = 0.0;
                expected_y = (expected_y + row_and_border).ceil();
            }
            assert!((rect.x0 - expected_x).abs() < 1e-4);
            assert!((rect.y0 - expected_y).abs() < 1e-4);
            expected_x = (expected_x + width).ceil();
        }

        // more than one row was needed
        assert!(packer.max_height >= 2.0 * row_and_border);
        assert!(packer.rects.iter().any(|r| r.y0 > 0.0));
    }

    #[test]
    fn test_notdef_and_unmapped_are_skipped() {
        let font = test_font();
        let mut packer = AtlasPacker::new(&font, 1024.0, 96.0, 16.0);
        packer.allocate_codepoint(0x20); // unmapped
        packer.allocate_codepoint(0xffff); // unmapped
        assert!(packer.rects.is_empty());
    }

    #[test]
    fn test_draw_glyphs_emits_geometry_for_every_rect() {
        let font = test_font();
        let mut packer = AtlasPacker::new(&font, 1024.0, 96.0, 16.0);
        packer.allocate_range(0x21, 0x24);

        let mut painter = GlyphPainter::default();
        packer.draw_glyphs(&mut painter);

        // 4 box glyphs, 4 segments each (the last LineTo already closes),
        // one 6-vertex quad per segment
        assert_eq!(painter.line.vertices.len(), 4 * 4 * 6);
        assert!(!painter.fill.vertices.is_empty());
    }
}
