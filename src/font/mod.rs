//! TrueType font decoding.
//!
//! Reads the minimum table set (`head`, `maxp`, `hhea`, `hmtx`, `cmap`,
//! `loca`, `glyf`, `kern`) and produces an immutable [`Font`] whose glyph
//! outlines are flattened drawing commands in an ascent-normalized
//! coordinate system (ascent == 1.0).

mod cmap;
mod glyf;
mod kern;
mod reader;

use std::collections::BTreeMap;

use crate::math::{Mat2x3, Vec2};
use reader::Table;

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("not a TrueType font (unrecognized signature)")]
    UnsupportedSignature,
    #[error("missing required table '{0}'")]
    MissingTable(&'static str),
    #[error("malformed '{0}' table")]
    MalformedTable(&'static str),
    #[error("no usable unicode cmap encoding record")]
    NoUnicodeCmap,
    #[error("unsupported cmap subtable format {0}")]
    UnsupportedCmapFormat(u16),
    #[error("unsupported loca offset format {0}")]
    UnsupportedLocFormat(u16),
}

/// Character class of the codepoint(s) mapped to a glyph, exported as a
/// flags byte in the atlas metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CharClass {
    #[default]
    Other,
    Lower,
    Upper,
    Punct,
    Space,
}

impl CharClass {
    pub fn flags(self) -> u32 {
        match self {
            CharClass::Other => 0,
            CharClass::Lower => 1,
            CharClass::Upper => 2,
            CharClass::Punct => 4,
            CharClass::Space => 8,
        }
    }
}

/// One outline drawing command, points in normalized font units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GlyphCommand {
    MoveTo(Vec2),
    LineTo(Vec2),
    /// Quadratic Bezier: control point, then endpoint.
    QuadBezTo(Vec2, Vec2),
    ClosePath,
}

/// One component of a composite glyph: a child glyph and the affine
/// transform to place it, translation already in normalized units.
#[derive(Clone, Copy, Debug)]
pub struct GlyphComponent {
    pub glyph_index: u16,
    pub transform: Mat2x3,
}

#[derive(Clone, Debug, Default)]
pub struct Glyph {
    pub char_class: CharClass,
    pub advance_width: f32,
    pub left_side_bearing: f32,
    pub min: Vec2,
    pub max: Vec2,
    /// Slice into [`Font::commands`]
    pub command_start: usize,
    pub command_count: usize,
    pub is_composite: bool,
    /// Slice into [`Font::components`]
    pub components_start: usize,
    pub components_count: usize,
}

/// Decoded font: metrics, character maps, glyph table and pooled outline
/// commands. Immutable once decoding finishes.
pub struct Font {
    pub em_ascent: i32,
    pub em_descent: i32,
    pub em_line_gap: i32,

    /// Normalized metrics, scale = 1 / em_ascent
    pub ascent: f32,
    pub descent: f32,
    pub line_gap: f32,

    pub glyph_map: BTreeMap<u32, u16>,
    /// Inverse of `glyph_map`: glyph index -> codepoints mapped to it
    pub cp_map: BTreeMap<u16, Vec<u32>>,
    pub glyphs: Vec<Glyph>,
    pub commands: Vec<GlyphCommand>,
    pub components: Vec<GlyphComponent>,
    /// `(left_glyph << 16 | right_glyph) -> advance` in normalized units
    pub kern_map: BTreeMap<u32, f32>,

    /// Union of all glyph bounding boxes
    pub glyph_min: Vec2,
    pub glyph_max: Vec2,
}

fn is_font(ttf: &[u8]) -> bool {
    matches!(
        &ttf[0..4],
        [0x00, 0x01, 0x00, 0x00]
            | [b'O', b'T', b'T', b'O']
            | [b't', b'y', b'p', b'1']
            | [b'1', 0x00, 0x00, 0x00]
    )
}

fn find_table<'a>(ttf: &'a [u8], tag: &'static str) -> Option<Table<'a>> {
    let file = Table::new(tag, ttf);
    let num_tables = file.u16(4).ok()? as usize;
    for itbl in 0..num_tables {
        let entry = 12 + itbl * 16;
        if ttf.get(entry..entry + 4) == Some(tag.as_bytes()) {
            let offset = file.u32(entry + 8).ok()? as usize;
            return ttf.get(offset..).map(|data| Table::new(tag, data));
        }
    }
    None
}

impl Font {
    pub fn decode(ttf: &[u8]) -> Result<Font, FontError> {
        if ttf.len() < 12 || !is_font(ttf) {
            return Err(FontError::UnsupportedSignature);
        }

        let head = find_table(ttf, "head").ok_or(FontError::MissingTable("head"))?;
        let loc_format = head.u16(50)?;
        if loc_format > 1 {
            return Err(FontError::UnsupportedLocFormat(loc_format));
        }
        let long_offsets = loc_format == 1;

        let loca = find_table(ttf, "loca").ok_or(FontError::MissingTable("loca"))?;
        let hmtx = find_table(ttf, "hmtx").ok_or(FontError::MissingTable("hmtx"))?;
        let glyf = find_table(ttf, "glyf").ok_or(FontError::MissingTable("glyf"))?;
        let hhea = find_table(ttf, "hhea").ok_or(FontError::MissingTable("hhea"))?;

        // A missing maxp is tolerated; loca reads then bound the glyph count.
        let num_glyphs = match find_table(ttf, "maxp") {
            Some(maxp) => maxp.u16(4)? as usize,
            None => 0xffff,
        };

        let em_ascent = hhea.i16(4)? as i32;
        let em_descent = hhea.i16(6)? as i32;
        let em_line_gap = hhea.i16(8)? as i32;
        if em_ascent == 0 {
            return Err(FontError::MalformedTable("hhea"));
        }
        let num_hmtx = hhea.u16(34)? as usize;

        let scale = 1.0 / em_ascent as f32;

        let maps = cmap::parse(find_table(ttf, "cmap").ok_or(FontError::MissingTable("cmap"))?)?;

        let mut glyphs = vec![Glyph::default(); num_glyphs];

        // The first num_hmtx glyphs carry both advance width and left side
        // bearing; the rest have left side bearing only.
        for (iglyph, glyph) in glyphs.iter_mut().enumerate().take(num_hmtx) {
            let Ok(advance) = hmtx.u16(iglyph * 4) else {
                break;
            };
            let Ok(lsb) = hmtx.i16(iglyph * 4 + 2) else {
                break;
            };
            glyph.advance_width = advance as f32 * scale;
            glyph.left_side_bearing = lsb as f32 * scale;
        }
        for (i, glyph) in glyphs.iter_mut().skip(num_hmtx).enumerate() {
            let Ok(lsb) = hmtx.i16(num_hmtx * 4 + i * 2) else {
                break;
            };
            glyph.advance_width = 0.0;
            glyph.left_side_bearing = lsb as f32;
        }

        // Decode outlines: simple glyph commands and composite component
        // lists, accumulating the overall bounding box.
        let mut commands = Vec::new();
        let mut components = Vec::new();
        let mut glyph_min = Vec2::splat(2e38);
        let mut glyph_max = Vec2::splat(-2e38);

        for iglyph in 0..num_glyphs {
            glyf::read_glyph(
                &mut glyphs[iglyph],
                &mut commands,
                &mut components,
                iglyph,
                loca,
                glyf,
                long_offsets,
                scale,
            )?;
            glyph_min = glyph_min.min(glyphs[iglyph].min);
            glyph_max = glyph_max.max(glyphs[iglyph].max);
        }

        flatten_composites(&mut glyphs, &mut commands, &components);

        let mut font = Font {
            em_ascent,
            em_descent,
            em_line_gap,
            ascent: 1.0,
            descent: em_descent as f32 * scale,
            line_gap: em_line_gap as f32 * scale,
            glyph_map: maps.glyph_map,
            cp_map: maps.cp_map,
            glyphs,
            commands,
            components,
            kern_map: BTreeMap::new(),
            glyph_min,
            glyph_max,
        };

        font.fill_char_classes();

        if let Some(kern_table) = find_table(ttf, "kern") {
            font.kern_map = kern::parse(kern_table, scale)?;
        }

        Ok(font)
    }

    fn fill_char_classes(&mut self) {
        for (&codepoint, &glyph_index) in &self.glyph_map {
            let Some(c) = char::from_u32(codepoint) else {
                continue;
            };
            let Some(glyph) = self.glyphs.get_mut(glyph_index as usize) else {
                continue;
            };
            if c.is_lowercase() {
                glyph.char_class = CharClass::Lower;
            }
            if c.is_uppercase() || c.is_numeric() {
                glyph.char_class = CharClass::Upper;
            }
            if c.is_ascii_punctuation() {
                glyph.char_class = CharClass::Punct;
            }
            if c.is_whitespace() {
                glyph.char_class = CharClass::Space;
            }
        }
    }

    pub fn glyph_index(&self, codepoint: u32) -> Option<u16> {
        self.glyph_map.get(&codepoint).copied()
    }

    pub fn commands_of(&self, glyph: &Glyph) -> &[GlyphCommand] {
        &self.commands[glyph.command_start..glyph.command_start + glyph.command_count]
    }
}

/// Composites may reference other composites; TTF forbids cycles, so a
/// depth bound is enough of a safety net. Children are flattened first and
/// their cached command slices concatenated under the parent's transforms.
const MAX_COMPOSITE_DEPTH: u32 = 16;

fn flatten_composites(
    glyphs: &mut [Glyph],
    commands: &mut Vec<GlyphCommand>,
    components: &[GlyphComponent],
) {
    for iglyph in 0..glyphs.len() {
        flatten_one(iglyph, 0, glyphs, commands, components);
    }
}

fn flatten_one(
    iglyph: usize,
    depth: u32,
    glyphs: &mut [Glyph],
    commands: &mut Vec<GlyphCommand>,
    components: &[GlyphComponent],
) {
    if !glyphs[iglyph].is_composite || glyphs[iglyph].command_count > 0 {
        return;
    }
    if depth > MAX_COMPOSITE_DEPTH {
        return;
    }

    let comp_start = glyphs[iglyph].components_start;
    let comp_count = glyphs[iglyph].components_count;

    for icomp in comp_start..comp_start + comp_count {
        let child = components[icomp].glyph_index as usize;
        if child < glyphs.len() && child != iglyph {
            flatten_one(child, depth + 1, glyphs, commands, components);
        }
    }

    let start = commands.len();
    for icomp in comp_start..comp_start + comp_count {
        let component = components[icomp];
        let Some(child) = glyphs.get(component.glyph_index as usize) else {
            continue;
        };
        let (cmd_start, cmd_count) = (child.command_start, child.command_count);
        let tr = component.transform;
        for icmd in cmd_start..cmd_start + cmd_count {
            let transformed = match commands[icmd] {
                GlyphCommand::MoveTo(p) => GlyphCommand::MoveTo(tr.transform_point(p)),
                GlyphCommand::LineTo(p) => GlyphCommand::LineTo(tr.transform_point(p)),
                GlyphCommand::QuadBezTo(c, p) => {
                    GlyphCommand::QuadBezTo(tr.transform_point(c), tr.transform_point(p))
                }
                GlyphCommand::ClosePath => GlyphCommand::ClosePath,
            };
            commands.push(transformed);
        }
    }

    glyphs[iglyph].command_start = start;
    glyphs[iglyph].command_count = commands.len() - start;
}
