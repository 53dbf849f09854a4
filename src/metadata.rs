//! Sidecar metadata: a JavaScript object literal describing the atlas,
//! per-glyph rects and metrics in texture space, and kerning pairs.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::atlas::GlyphRect;
use crate::font::{Font, Glyph};

pub struct MetadataEmitter<'a> {
    pub font: &'a Font,
    pub rects: &'a [GlyphRect],
    pub tex_width: f32,
    pub tex_height: f32,
    pub row_height: f32,
    pub sdf_border: f32,
    /// Flip rect y coordinates for top-left-origin texture sampling
    pub flip_texcoord_y: bool,
}

impl MetadataEmitter<'_> {
    fn glyph_for(&self, c: char) -> Glyph {
        self.font
            .glyph_index(c as u32)
            .and_then(|idx| self.font.glyphs.get(idx as usize))
            .cloned()
            .unwrap_or_default()
    }

    pub fn emit(&self) -> String {
        let font = self.font;
        let fheight = font.ascent - font.descent;
        let scale_y = self.row_height / self.tex_height / fheight;
        let scale_x = self.row_height / self.tex_width / fheight;

        let g_space = self.glyph_for(' ');
        let g_x = self.glyph_for('x');
        let g_cap = self.glyph_for('X');

        let codepoints: BTreeSet<u32> = self.rects.iter().map(|r| r.codepoint).collect();

        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = writeln!(out, "{{");
        let _ = writeln!(out, "    ix: {}, ", self.sdf_border / self.tex_width);
        let _ = writeln!(out, "    iy: {}, ", self.sdf_border / self.tex_height);
        let _ = writeln!(
            out,
            "    row_height: {}, ",
            (self.row_height + 2.0 * self.sdf_border) / self.tex_height
        );
        let _ = writeln!(out, "    aspect: {}, ", self.tex_width / self.tex_height);
        let _ = writeln!(out, "    ascent: {}, ", font.ascent * scale_y);
        let _ = writeln!(out, "    descent: {}, ", (font.descent * scale_y).abs());
        let _ = writeln!(out, "    line_gap: {}, ", font.line_gap * scale_y);
        let _ = writeln!(out, "    cap_height: {}, ", g_cap.max.y * scale_y);
        let _ = writeln!(out, "    x_height: {}, ", g_x.max.y * scale_y);
        let _ = writeln!(
            out,
            "    space_advance: {}, \n",
            g_space.advance_width * scale_x
        );

        let _ = writeln!(out, "    chars: {{ ");

        for (irect, rect) in self.rects.iter().enumerate() {
            let glyph = &font.glyphs[rect.glyph_index as usize];

            let (tcy0, tcy1) = if self.flip_texcoord_y {
                (
                    1.0 - rect.y1 / self.tex_height,
                    1.0 - rect.y0 / self.tex_height,
                )
            } else {
                (rect.y0 / self.tex_height, rect.y1 / self.tex_height)
            };

            let _ = writeln!(out, "    \"\\u{:04x}\": {{", rect.codepoint);
            let _ = writeln!(out, "        codepoint: {},", rect.codepoint);
            let _ = writeln!(
                out,
                "        rect: [{}, {}, {}, {}],",
                rect.x0 / self.tex_width,
                tcy0,
                rect.x1 / self.tex_width,
                tcy1
            );
            let _ = writeln!(out, "        bearing_x: {},", glyph.left_side_bearing * scale_x);
            let _ = writeln!(out, "        advance_x: {},", glyph.advance_width * scale_x);
            let _ = writeln!(out, "        flags: {}", glyph.char_class.flags());
            let _ = write!(out, "    }}");
            if irect != self.rects.len() - 1 {
                let _ = write!(out, ",");
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "    }}, // end chars");
        let _ = writeln!(out, "    kern: {{");

        // Kerning is stored per glyph-index pair; expand each entry to every
        // codepoint pair present in the atlas via the inverse map.
        for (&pair, &value) in &font.kern_map {
            let value = value * scale_x;
            let left_index = ((pair >> 16) & 0xffff) as u16;
            let right_index = (pair & 0xffff) as u16;

            let (Some(left_cps), Some(right_cps)) =
                (font.cp_map.get(&left_index), font.cp_map.get(&right_index))
            else {
                continue;
            };

            for &left in left_cps {
                for &right in right_cps {
                    if codepoints.contains(&left) && codepoints.contains(&right) {
                        let _ = writeln!(
                            out,
                            "        \"\\u{:04x}\\u{:04x}\" : {},",
                            left, right, value
                        );
                    }
                }
            }
        }

        let _ = writeln!(out, "    }} // end kern");
        let _ = writeln!(out, "}}; // end font");

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::{CharClass, GlyphCommand};
    use crate::math::Vec2;
    use std::collections::BTreeMap;

    /// Font with glyphs for 'A' (index 1) and 'V' (index 2) plus a kern
    /// pair between them, and 'Z' (index 3) left out of the atlas.
    fn test_font() -> Font {
        let mut glyph_map = BTreeMap::new();
        let mut cp_map: BTreeMap<u16, Vec<u32>> = BTreeMap::new();
        let mut glyphs = vec![Glyph::default()];
        let mut commands = Vec::new();

        for (i, cp) in ['A', 'V', 'Z'].into_iter().enumerate() {
            let glyph_index = (i + 1) as u16;
            glyph_map.insert(cp as u32, glyph_index);
            cp_map.entry(glyph_index).or_default().push(cp as u32);

            let start = commands.len();
            commands.push(GlyphCommand::MoveTo(Vec2::new(0.0, 0.0)));
            commands.push(GlyphCommand::LineTo(Vec2::new(0.6, 0.0)));
            commands.push(GlyphCommand::LineTo(Vec2::new(0.3, 0.7)));
            commands.push(GlyphCommand::LineTo(Vec2::new(0.0, 0.0)));
            commands.push(GlyphCommand::ClosePath);

            glyphs.push(Glyph {
                char_class: CharClass::Upper,
                advance_width: 0.62,
                left_side_bearing: 0.01,
                min: Vec2::new(0.0, 0.0),
                max: Vec2::new(0.6, 0.7),
                command_start: start,
                command_count: 5,
                ..Glyph::default()
            });
        }

        let mut kern_map = BTreeMap::new();
        kern_map.insert((1u32 << 16) | 2, -0.08); // A V
        kern_map.insert((1u32 << 16) | 3, -0.05); // A Z, Z not in atlas

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
            kern_map,
            glyph_min: Vec2::ZERO,
            glyph_max: Vec2::new(0.6, 0.7),
        }
    }

    fn test_rects() -> Vec<GlyphRect> {
        vec![
            GlyphRect {
                codepoint: 'A' as u32,
                glyph_index: 1,
                x0: 0.0,
                y0: 0.0,
                x1: 100.0,
                y1: 128.0,
            },
            GlyphRect {
                codepoint: 'V' as u32,
                glyph_index: 2,
                x0: 100.0,
                y0: 0.0,
                x1: 200.0,
                y1: 128.0,
            },
        ]
    }

    #[test]
    fn test_header_and_char_entries() {
        let font = test_font();
        let rects = test_rects();
        let emitter = MetadataEmitter {
            font: &font,
            rects: &rects,
            tex_width: 1024.0,
            tex_height: 512.0,
            row_height: 96.0,
            sdf_border: 16.0,
            flip_texcoord_y: true,
        };
        let out = emitter.emit();

        assert!(out.starts_with("{\n"));
        assert!(out.trim_end().ends_with("}; // end font"));
        assert!(out.contains("ix: 0.015625"));
        assert!(out.contains("aspect: 2"));
        assert!(out.contains("\"\\u0041\": {"));
        assert!(out.contains("\"\\u0056\": {"));
        assert!(out.contains("codepoint: 65,"));
        assert!(out.contains("flags: 2"));
    }

    #[test]
    fn test_texcoord_flip() {
        let font = test_font();
        let rects = test_rects();
        let emitter = MetadataEmitter {
            font: &font,
            rects: &rects,
            tex_width: 1024.0,
            tex_height: 512.0,
            row_height: 96.0,
            sdf_border: 16.0,
            flip_texcoord_y: true,
        };
        let out = emitter.emit();
        // y0 = 0, y1 = 128 flips to [1 - 0.25, 1]
        assert!(out.contains("rect: [0, 0.75, 0.09765625, 1],"));
    }

    #[test]
    fn test_kern_pairs_expand_only_to_atlas_codepoints() {
        let font = test_font();
        let rects = test_rects();
        let emitter = MetadataEmitter {
            font: &font,
            rects: &rects,
            tex_width: 1024.0,
            tex_height: 512.0,
            row_height: 96.0,
            sdf_border: 16.0,
            flip_texcoord_y: true,
        };
        let out = emitter.emit();

        // A-V expanded, A-Z suppressed since Z has no atlas rect
        assert!(out.contains("\"\\u0041\\u0056\" :"));
        assert!(!out.contains("\\u005a"));

        // every emitted kern codepoint also has a chars entry
        for line in out.lines() {
            let Some(rest) = line.trim_start().strip_prefix("\"\\u") else {
                continue;
            };
            if let Some(second) = rest.find("\\u") {
                let first_cp = u32::from_str_radix(&rest[..4], 16).unwrap();
                let second_cp = u32::from_str_radix(&rest[second + 2..second + 6], 16).unwrap();
                assert!(out.contains(&format!("\"\\u{:04x}\": {{", first_cp)));
                assert!(out.contains(&format!("\"\\u{:04x}\": {{", second_cp)));
            }
        }
    }
}
