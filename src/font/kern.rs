//! Legacy `kern` table: format-0 horizontal pair kerning.

use std::collections::BTreeMap;

use super::reader::Table;
use super::FontError;

/// Parse the first horizontal format-0 subtable into a
/// `(left_glyph << 16 | right_glyph) -> advance` map, values scaled to
/// normalized font units.
pub fn parse(kern: Table, scale: f32) -> Result<BTreeMap<u32, f32>, FontError> {
    let mut pairs = BTreeMap::new();

    let num_subtables = kern.u16(2)? as usize;
    let mut pos = 4;
    let mut table = None;

    for _ in 0..num_subtables {
        let length = kern.u16(pos + 2)? as usize;
        let coverage = kern.u16(pos + 4)?;
        if coverage == 1 {
            table = Some(pos);
            break;
        }
        if length == 0 {
            break;
        }
        pos += length;
    }

    let Some(table) = table else {
        return Ok(pairs);
    };

    let num_pairs = kern.u16(table + 6)? as usize;
    let mut pos = table + 14;
    for _ in 0..num_pairs {
        let left = kern.u16(pos)? as u32;
        let right = kern.u16(pos + 2)? as u32;
        let value = kern.i16(pos + 4)?;
        pairs.insert((left << 16) | right, value as f32 * scale);
        pos += 6;
    }

    Ok(pairs)
}
