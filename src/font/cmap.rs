//! Codepoint to glyph index mapping from the `cmap` table.
//!
//! Walks the encoding records, picks the first Unicode (platform 0) or
//! Microsoft BMP/UCS-4 (platform 3, encoding 1 or 10) subtable, then
//! dispatches on the subtable format. Formats 0, 4, 6, 10, 12 and 13 are
//! supported; anything else is rejected.

use std::collections::BTreeMap;

use super::reader::Table;
use super::FontError;

/// Forward and inverse character maps. The inverse map is what lets the
/// metadata emitter expand glyph-index kerning pairs back into codepoints.
#[derive(Default)]
pub struct CharMaps {
    pub glyph_map: BTreeMap<u32, u16>,
    pub cp_map: BTreeMap<u16, Vec<u32>>,
}

impl CharMaps {
    fn insert(&mut self, codepoint: u32, glyph_index: u16) {
        use std::collections::btree_map::Entry;
        // First mapping for a codepoint wins, as with repeated cmap entries.
        if let Entry::Vacant(e) = self.glyph_map.entry(codepoint) {
            e.insert(glyph_index);
            self.cp_map.entry(glyph_index).or_default().push(codepoint);
        }
    }
}

pub fn parse(cmap: Table) -> Result<CharMaps, FontError> {
    let num_records = cmap.u16(2)? as usize;
    let mut subtable = None;

    for irec in 0..num_records {
        let rec = 4 + irec * 8;
        let platform = cmap.u16(rec)?;
        let encoding = cmap.u16(rec + 2)?;
        let offset = cmap.u32(rec + 4)? as usize;

        if platform == 0 || (platform == 3 && (encoding == 1 || encoding == 10)) {
            subtable = Some(cmap.sub(offset)?);
            break;
        }
    }

    let sub = subtable.ok_or(FontError::NoUnicodeCmap)?;
    let mut maps = CharMaps::default();

    let format = sub.u16(0)?;
    match format {
        0 => parse_format0(sub, &mut maps)?,
        4 => parse_format4(sub, &mut maps)?,
        6 => parse_format6(sub, &mut maps)?,
        10 => parse_format10(sub, &mut maps)?,
        12 => parse_groups(sub, &mut maps, true)?,
        13 => parse_groups(sub, &mut maps, false)?,
        other => return Err(FontError::UnsupportedCmapFormat(other)),
    }

    Ok(maps)
}

/// Format 0: a flat 256-entry byte array.
fn parse_format0(sub: Table, maps: &mut CharMaps) -> Result<(), FontError> {
    for cp in 1u32..256 {
        let idx = sub.u8(6 + cp as usize)? as u16;
        if idx != 0 {
            maps.insert(cp, idx);
        }
    }
    Ok(())
}

/// Format 4: segmented BMP mapping with four parallel arrays. The
/// idRangeOffset values are self-relative byte offsets into the glyph id
/// array that follows them.
fn parse_format4(sub: Table, maps: &mut CharMaps) -> Result<(), FontError> {
    let seg_count = (sub.u16(6)? >> 1) as usize;
    let end_base = 14;
    let start_base = 16 + seg_count * 2;
    let delta_base = 16 + seg_count * 4;
    let offset_base = 16 + seg_count * 6;

    for iseg in 0..seg_count {
        let seg_start = sub.u16(start_base + iseg * 2)? as u32;
        let seg_end = sub.u16(end_base + iseg * 2)? as u32;
        let seg_delta = sub.i16(delta_base + iseg * 2)? as i32;
        let seg_offset = sub.u16(offset_base + iseg * 2)? as usize;

        if seg_start > seg_end {
            return Err(FontError::MalformedTable("cmap"));
        }

        for cp in seg_start..=seg_end {
            let glyph = if seg_offset == 0 {
                ((cp as i32 + seg_delta) & 0xffff) as u16
            } else {
                // Pointer arithmetic relative to this segment's slot in the
                // idRangeOffset array.
                let item = (cp - seg_start) as usize;
                let at = offset_base + iseg * 2 + seg_offset + item * 2;
                let raw = sub.u16(at)?;
                if raw == 0 {
                    continue;
                }
                ((raw as i32 + seg_delta) & 0xffff) as u16
            };
            if glyph != 0 {
                maps.insert(cp, glyph);
            }
        }
    }
    Ok(())
}

/// Format 6: dense range of 16-bit glyph ids.
fn parse_format6(sub: Table, maps: &mut CharMaps) -> Result<(), FontError> {
    let first = sub.u16(6)? as u32;
    let count = sub.u16(8)? as u32;
    for i in 0..count {
        let idx = sub.u16(10 + i as usize * 2)?;
        if idx != 0 {
            maps.insert(first + i, idx);
        }
    }
    Ok(())
}

/// Format 10: like format 6 with 32-bit start and count.
fn parse_format10(sub: Table, maps: &mut CharMaps) -> Result<(), FontError> {
    let first = sub.u32(12)?;
    let count = sub.u32(16)?;
    if count as usize > sub.len() / 2 {
        return Err(FontError::MalformedTable("cmap"));
    }
    for i in 0..count {
        let idx = sub.u16(20 + i as usize * 2)?;
        if idx != 0 {
            maps.insert(first + i, idx);
        }
    }
    Ok(())
}

/// Formats 12 and 13: sequential-map / many-to-one group tables. They share
/// the group layout; format 12 increments the glyph id per codepoint,
/// format 13 maps the whole group to one glyph.
fn parse_groups(sub: Table, maps: &mut CharMaps, sequential: bool) -> Result<(), FontError> {
    let num_groups = sub.u32(12)? as usize;
    if num_groups > sub.len() / 12 {
        return Err(FontError::MalformedTable("cmap"));
    }
    for igroup in 0..num_groups {
        let group = 16 + igroup * 12;
        let start_code = sub.u32(group)?;
        let end_code = sub.u32(group + 4)?;
        let start_glyph = sub.u32(group + 8)?;
        if start_code > end_code {
            return Err(FontError::MalformedTable("cmap"));
        }
        for cp in start_code..=end_code {
            let idx = if sequential {
                start_glyph + (cp - start_code)
            } else {
                start_glyph
            } as u16;
            if idx != 0 {
                maps.insert(cp, idx);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    fn push_u32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    /// One encoding record (platform 0) pointing at the given subtable.
    fn wrap_subtable(subtable: Vec<u8>) -> Vec<u8> {
        let mut out = Vec::new();
        push_u16(&mut out, 0); // version
        push_u16(&mut out, 1); // one encoding record
        push_u16(&mut out, 0); // platform: unicode
        push_u16(&mut out, 3); // encoding
        push_u32(&mut out, 12); // offset
        out.extend_from_slice(&subtable);
        out
    }

    fn format4_subtable(segments: &[(u16, u16, i16, u16)]) -> Vec<u8> {
        let seg_count = segments.len() as u16;
        let mut out = Vec::new();
        push_u16(&mut out, 4); // format
        push_u16(&mut out, 16 + seg_count * 8); // length
        push_u16(&mut out, 0); // language
        push_u16(&mut out, seg_count * 2);
        push_u16(&mut out, 0); // search range (unused here)
        push_u16(&mut out, 0); // entry selector
        push_u16(&mut out, 0); // range shift
        for &(_, end, _, _) in segments {
            push_u16(&mut out, end);
        }
        push_u16(&mut out, 0); // reserved pad
        for &(start, _, _, _) in segments {
            push_u16(&mut out, start);
        }
        for &(_, _, delta, _) in segments {
            push_u16(&mut out, delta as u16);
        }
        for &(_, _, _, offset) in segments {
            push_u16(&mut out, offset);
        }
        out
    }

    #[test]
    fn test_format4_delta_segment() {
        // A..Z with delta -0x40 plus the conventional 0xffff terminator.
        let bytes = wrap_subtable(format4_subtable(&[
            (0x41, 0x5a, -0x40, 0),
            (0xffff, 0xffff, 1, 0),
        ]));
        let maps = parse(Table::new("cmap", &bytes)).unwrap();
        assert_eq!(maps.glyph_map.get(&0x41), Some(&1));
        assert_eq!(maps.glyph_map.get(&0x5a), Some(&26));
        // 0xffff + 1 wraps to glyph 0, which is never mapped
        assert_eq!(maps.glyph_map.get(&0xffff), None);
        // inverse map filled alongside
        assert_eq!(maps.cp_map.get(&1), Some(&vec![0x41]));
    }

    #[test]
    fn test_format12_groups() {
        let mut sub = Vec::new();
        push_u16(&mut sub, 12);
        push_u16(&mut sub, 0); // reserved
        push_u32(&mut sub, 28); // length
        push_u32(&mut sub, 0); // language
        push_u32(&mut sub, 1); // one group
        push_u32(&mut sub, 0x1f600);
        push_u32(&mut sub, 0x1f602);
        push_u32(&mut sub, 7);
        let bytes = wrap_subtable(sub);
        let maps = parse(Table::new("cmap", &bytes)).unwrap();
        assert_eq!(maps.glyph_map.get(&0x1f600), Some(&7));
        assert_eq!(maps.glyph_map.get(&0x1f602), Some(&9));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let mut sub = Vec::new();
        push_u16(&mut sub, 2); // high-byte mapping, unsupported
        let bytes = wrap_subtable(sub);
        assert!(matches!(
            parse(Table::new("cmap", &bytes)),
            Err(FontError::UnsupportedCmapFormat(2))
        ));
    }
}
