//! Bounds-checked big-endian reads over raw TTF table bytes.
//!
//! TTF stores every multi-byte integer big-endian; all access goes through
//! these helpers so host byte order never leaks in. Each `Table` carries the
//! tag it was resolved from so overruns surface as `MalformedTable(tag)`.

use super::FontError;

#[derive(Clone, Copy)]
pub struct Table<'a> {
    name: &'static str,
    data: &'a [u8],
}

impl<'a> Table<'a> {
    pub fn new(name: &'static str, data: &'a [u8]) -> Self {
        Self { name, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    fn bytes(&self, offset: usize, count: usize) -> Result<&'a [u8], FontError> {
        offset
            .checked_add(count)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(FontError::MalformedTable(self.name))
    }

    pub fn u8(&self, offset: usize) -> Result<u8, FontError> {
        Ok(self.bytes(offset, 1)?[0])
    }

    pub fn i8(&self, offset: usize) -> Result<i8, FontError> {
        Ok(self.bytes(offset, 1)?[0] as i8)
    }

    pub fn u16(&self, offset: usize) -> Result<u16, FontError> {
        let b = self.bytes(offset, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn i16(&self, offset: usize) -> Result<i16, FontError> {
        Ok(self.u16(offset)? as i16)
    }

    pub fn u32(&self, offset: usize) -> Result<u32, FontError> {
        let b = self.bytes(offset, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Narrow to a sub-span starting at `offset`, keeping the table tag.
    /// The span runs to the end of the parent, matching how TTF subtable
    /// offsets are used (lengths are frequently unreliable in the wild).
    pub fn sub(&self, offset: usize) -> Result<Table<'a>, FontError> {
        let data = self
            .data
            .get(offset..)
            .ok_or(FontError::MalformedTable(self.name))?;
        Ok(Table {
            name: self.name,
            data,
        })
    }
}
