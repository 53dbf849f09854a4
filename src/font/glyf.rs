//! Glyph outline decoding from the `glyf` and `loca` tables.
//!
//! Simple glyphs are decoded into drawing commands in one pass over the
//! point stream; composite glyphs record their component list (child index
//! plus affine transform) for later flattening.

use super::reader::Table;
use super::{FontError, Glyph, GlyphCommand, GlyphComponent};
use crate::math::{Mat2x3, Vec2};

/// Byte offset of glyph `glyph_index` inside `glyf`, or `None` when the
/// glyph has no outline (equal consecutive offsets) or `loca` is too short
/// for the index.
fn loc_offset(glyph_index: usize, long_offsets: bool, loca: Table) -> Option<usize> {
    let (off0, off1) = if long_offsets {
        (
            loca.u32(glyph_index * 4).ok()?,
            loca.u32(glyph_index * 4 + 4).ok()?,
        )
    } else {
        (
            loca.u16(glyph_index * 2).ok()? as u32 * 2,
            loca.u16(glyph_index * 2 + 2).ok()? as u32 * 2,
        )
    };
    if off0 == off1 {
        None
    } else {
        Some(off0 as usize)
    }
}

/// Decode one glyph: bounding box plus either drawing commands (simple) or
/// a component list (composite). Empty glyphs are left untouched.
pub fn read_glyph(
    glyph: &mut Glyph,
    commands: &mut Vec<GlyphCommand>,
    components: &mut Vec<GlyphComponent>,
    glyph_index: usize,
    loca: Table,
    glyf: Table,
    long_offsets: bool,
    scale: f32,
) -> Result<(), FontError> {
    let Some(offset) = loc_offset(glyph_index, long_offsets, loca) else {
        return Ok(());
    };
    let g = glyf.sub(offset)?;

    let num_contours = g.i16(0)?;
    glyph.min = Vec2::new(g.i16(2)? as f32, g.i16(4)? as f32) * scale;
    glyph.max = Vec2::new(g.i16(6)? as f32, g.i16(8)? as f32) * scale;

    if num_contours > 0 {
        decode_simple(glyph, commands, g, num_contours as usize, scale)?;
    } else if num_contours < 0 {
        decode_composite(glyph, components, g, scale)?;
    }
    Ok(())
}

// Point flag bits:
//   0x01  on-curve
//   0x02  x is u8, sign from 0x10; otherwise x is i16, or repeats prev if 0x10
//   0x04  y is u8, sign from 0x20; otherwise y is i16, or repeats prev if 0x20
//   0x08  next byte is a repeat count for this flag
fn x_size(flag: u8) -> usize {
    if flag & 0x02 != 0 {
        1
    } else if flag & 0x10 != 0 {
        0
    } else {
        2
    }
}

fn decode_simple(
    glyph: &mut Glyph,
    commands: &mut Vec<GlyphCommand>,
    g: Table,
    num_contours: usize,
    scale: f32,
) -> Result<(), FontError> {
    let end_pts_base = 10;
    let instr_len = g.u16(end_pts_base + num_contours * 2)? as usize;
    let num_points = g.u16(end_pts_base + num_contours * 2 - 2)? as usize + 1;
    let flags_base = end_pts_base + num_contours * 2 + 2 + instr_len;

    // Expand the run-length encoded flag stream into one flag per point.
    let mut flags = Vec::with_capacity(num_points);
    let mut pos = flags_base;
    while flags.len() < num_points {
        let flag = g.u8(pos)?;
        pos += 1;
        if flag & 0x08 != 0 {
            let repeat = g.u8(pos)? as usize;
            pos += 1;
            for _ in 0..=repeat {
                flags.push(flag);
                if flags.len() == num_points {
                    break;
                }
            }
        } else {
            flags.push(flag);
        }
    }

    // Coordinates are deltas; x values are packed first, y values follow at
    // an offset derived from the flag bits.
    let x_bytes: usize = flags.iter().map(|&f| x_size(f)).sum();

    let mut xpos = pos;
    let mut x = 0.0f32;
    let mut xs = Vec::with_capacity(num_points);
    for &flag in &flags {
        if flag & 0x02 != 0 {
            let d = g.u8(xpos)? as f32;
            xpos += 1;
            x += if flag & 0x10 != 0 { d } else { -d };
        } else if flag & 0x10 == 0 {
            x += g.i16(xpos)? as f32;
            xpos += 2;
        }
        xs.push(x);
    }

    let mut ypos = pos + x_bytes;
    let mut y = 0.0f32;
    let mut points = Vec::with_capacity(num_points);
    for (i, &flag) in flags.iter().enumerate() {
        if flag & 0x04 != 0 {
            let d = g.u8(ypos)? as f32;
            ypos += 1;
            y += if flag & 0x20 != 0 { d } else { -d };
        } else if flag & 0x20 == 0 {
            y += g.i16(ypos)? as f32;
            ypos += 2;
        }
        points.push(Vec2::new(xs[i], y));
    }

    glyph.command_start = commands.len();
    emit_contours(commands, g, end_pts_base, num_contours, &flags, &points, scale)?;
    glyph.command_count = commands.len() - glyph.command_start;
    Ok(())
}

/// Walk the decoded points and emit MoveTo/LineTo/QuadBezTo/ClosePath,
/// synthesizing implicit on-curve midpoints between consecutive off-curve
/// points and resolving contours whose start point is off-curve.
fn emit_contours(
    commands: &mut Vec<GlyphCommand>,
    g: Table,
    end_pts_base: usize,
    num_contours: usize,
    flags: &[u8],
    points: &[Vec2],
    scale: f32,
) -> Result<(), FontError> {
    let mut on_curve = true;
    let mut contour_start_cmd = 0usize;
    let mut starts_off_curve = false;
    let mut new_contour = true;
    let mut contour_end = 0usize;
    let mut icontour = 0usize;

    for (ipoint, &cur) in points.iter().enumerate() {
        let prev_on_curve = on_curve;
        on_curve = flags[ipoint] & 0x01 != 0;
        let scaled = cur * scale;

        if new_contour {
            starts_off_curve = !on_curve;
            contour_start_cmd = commands.len();
            commands.push(GlyphCommand::MoveTo(scaled));
            contour_end = g.u16(end_pts_base + icontour * 2)? as usize;
            icontour += 1;
            if icontour > num_contours {
                return Err(FontError::MalformedTable("glyf"));
            }
            new_contour = false;
        } else {
            let prev = points[ipoint - 1] * scale;
            if on_curve {
                if prev_on_curve {
                    commands.push(GlyphCommand::LineTo(scaled));
                } else {
                    commands.push(GlyphCommand::QuadBezTo(prev, scaled));
                }
            } else if !prev_on_curve {
                // Two consecutive off-curve points imply an on-curve
                // midpoint between them.
                let mid = (prev + scaled) * 0.5;
                commands.push(GlyphCommand::QuadBezTo(prev, mid));
            }
        }

        if ipoint == contour_end && ipoint > 0 {
            close_contour(commands, contour_start_cmd, starts_off_curve, on_curve, scaled);
            new_contour = true;
        }
    }
    Ok(())
}

fn close_contour(
    commands: &mut Vec<GlyphCommand>,
    contour_start_cmd: usize,
    starts_off_curve: bool,
    ends_on_curve: bool,
    last: Vec2,
) {
    if starts_off_curve {
        if ends_on_curve {
            // The last on-curve point is the true contour start.
            commands[contour_start_cmd] = GlyphCommand::MoveTo(last);
        } else {
            // Start and end are both off-curve: the true start is the
            // midpoint between them, and the final curve closes onto it.
            let first_off = match commands.get(contour_start_cmd + 1) {
                Some(GlyphCommand::QuadBezTo(ctrl, _)) => *ctrl,
                _ => last,
            };
            let start = (last + first_off) * 0.5;
            commands[contour_start_cmd] = GlyphCommand::MoveTo(start);
            commands.push(GlyphCommand::QuadBezTo(last, start));
        }
    } else {
        let start = match commands[contour_start_cmd] {
            GlyphCommand::MoveTo(p) => p,
            _ => last,
        };
        if ends_on_curve {
            if (start - last).sqr_length() >= 1e-7 {
                commands.push(GlyphCommand::LineTo(start));
            }
        } else {
            commands.push(GlyphCommand::QuadBezTo(last, start));
        }
    }
    commands.push(GlyphCommand::ClosePath);
}

// Composite component flags
const ARG_1_AND_2_ARE_WORDS: u16 = 1 << 0;
const ARGS_ARE_XY_VALUES: u16 = 1 << 1;
const WE_HAVE_A_SCALE: u16 = 1 << 3;
const MORE_COMPONENTS: u16 = 1 << 5;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 1 << 6;
const WE_HAVE_A_TWO_BY_TWO: u16 = 1 << 7;

fn f2dot14(v: i16) -> f32 {
    v as f32 / 16384.0
}

fn decode_composite(
    glyph: &mut Glyph,
    components: &mut Vec<GlyphComponent>,
    g: Table,
    scale: f32,
) -> Result<(), FontError> {
    glyph.is_composite = true;
    glyph.components_start = components.len();

    let mut pos = 10;
    loop {
        let flags = g.u16(pos)?;
        let child_index = g.u16(pos + 2)?;
        pos += 4;

        let mut transform = Mat2x3::IDENTITY;

        // Translation arguments; point-matching args (no ARGS_ARE_XY_VALUES)
        // are skipped and leave the component untranslated.
        if flags & ARG_1_AND_2_ARE_WORDS != 0 {
            if flags & ARGS_ARE_XY_VALUES != 0 {
                transform.origin =
                    Vec2::new(g.i16(pos)? as f32, g.i16(pos + 2)? as f32) * scale;
            }
            pos += 4;
        } else {
            if flags & ARGS_ARE_XY_VALUES != 0 {
                transform.origin =
                    Vec2::new(g.i8(pos)? as f32, g.i8(pos + 1)? as f32) * scale;
            }
            pos += 2;
        }

        if flags & WE_HAVE_A_SCALE != 0 {
            let s = f2dot14(g.i16(pos)?);
            pos += 2;
            transform.x_axis = Vec2::new(s, 0.0);
            transform.y_axis = Vec2::new(0.0, s);
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            transform.x_axis = Vec2::new(f2dot14(g.i16(pos)?), 0.0);
            transform.y_axis = Vec2::new(0.0, f2dot14(g.i16(pos + 2)?));
            pos += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            transform.x_axis = Vec2::new(f2dot14(g.i16(pos)?), f2dot14(g.i16(pos + 2)?));
            transform.y_axis = Vec2::new(f2dot14(g.i16(pos + 4)?), f2dot14(g.i16(pos + 6)?));
            pos += 8;
        }

        components.push(GlyphComponent {
            glyph_index: child_index,
            transform,
        });

        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }

    glyph.components_count = components.len() - glyph.components_start;
    Ok(())
}
