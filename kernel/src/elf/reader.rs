//! Bounds-checked access to an untrusted byte image.
//!
//! Every offset that comes out of a file header goes through [Bytes] before it is
//! dereferenced, so a bad header turns into an [OutOfBounds] error instead of a wild read.

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("read of {len} bytes at offset {offset:#x} is outside of the {size} byte image")]
pub struct OutOfBounds {
    pub offset: u64,
    pub len: u64,
    pub size: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Bytes<'a> {
    data: &'a [u8],
}

impl<'a> Bytes<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub const fn len(&self) -> usize {
        self.data.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub const fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    fn out_of_bounds(&self, offset: u64, len: u64) -> OutOfBounds {
        OutOfBounds {
            offset,
            len,
            size: self.data.len(),
        }
    }

    /// Returns `len` bytes starting at `offset`, or an error if any of them lies past the end.
    pub fn slice(&self, offset: u64, len: u64) -> Result<&'a [u8], OutOfBounds> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| self.out_of_bounds(offset, len))?;
        if end > self.data.len() as u64 {
            return Err(self.out_of_bounds(offset, len));
        }
        Ok(&self.data[offset as usize..end as usize])
    }

    /// Checks that a table of `count` entries of `entry_size` bytes fits at `offset`.
    pub fn table(&self, offset: u64, count: u64, entry_size: u64) -> Result<&'a [u8], OutOfBounds> {
        let len = count
            .checked_mul(entry_size)
            .ok_or_else(|| self.out_of_bounds(offset, u64::MAX))?;
        self.slice(offset, len)
    }

    pub fn u8_at(&self, offset: u64) -> Result<u8, OutOfBounds> {
        Ok(self.slice(offset, 1)?[0])
    }

    pub fn u16_at(&self, offset: u64) -> Result<u16, OutOfBounds> {
        let mut buf = [0; 2];
        buf.copy_from_slice(self.slice(offset, 2)?);
        Ok(u16::from_le_bytes(buf))
    }

    pub fn u32_at(&self, offset: u64) -> Result<u32, OutOfBounds> {
        let mut buf = [0; 4];
        buf.copy_from_slice(self.slice(offset, 4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub fn u64_at(&self, offset: u64) -> Result<u64, OutOfBounds> {
        let mut buf = [0; 8];
        buf.copy_from_slice(self.slice(offset, 8)?);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a NUL-terminated string starting at `offset`.
    ///
    /// The terminator must be present inside the image. Invalid UTF-8 yields `Ok(None)`.
    pub fn cstr_at(&self, offset: u64) -> Result<Option<&'a str>, OutOfBounds> {
        let rest = self.slice(offset, (self.data.len() as u64).saturating_sub(offset))?;
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.out_of_bounds(offset, rest.len() as u64 + 1))?;
        Ok(core::str::from_utf8(&rest[..end]).ok())
    }

    /// Narrows the view to a sub-range, e.g. a string table section.
    pub fn sub(&self, offset: u64, len: u64) -> Result<Bytes<'a>, OutOfBounds> {
        self.slice(offset, len).map(Bytes::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_values() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let bytes = Bytes::new(&data);
        assert_eq!(bytes.u8_at(0), Ok(0x01));
        assert_eq!(bytes.u16_at(0), Ok(0x0201));
        assert_eq!(bytes.u32_at(4), Ok(0x0807_0605));
        assert_eq!(bytes.u64_at(0), Ok(0x0807_0605_0403_0201));
    }

    #[test]
    fn rejects_reads_past_the_end() {
        let data = [0u8; 8];
        let bytes = Bytes::new(&data);
        assert!(bytes.u64_at(1).is_err());
        assert!(bytes.u32_at(5).is_err());
        assert!(bytes.slice(8, 0).is_ok());
        assert!(bytes.slice(9, 0).is_err());
    }

    #[test]
    fn offset_overflow_is_an_error() {
        let data = [0u8; 16];
        let bytes = Bytes::new(&data);
        assert!(bytes.slice(u64::MAX, 2).is_err());
        assert!(bytes.table(0, u64::MAX, 64).is_err());
        assert!(bytes.table(0, 2, 8).is_ok());
        assert!(bytes.table(8, 2, 8).is_err());
    }

    #[test]
    fn strings_need_a_terminator() {
        let data = *b"abc\0de";
        let bytes = Bytes::new(&data);
        assert_eq!(bytes.cstr_at(0), Ok(Some("abc")));
        assert_eq!(bytes.cstr_at(3), Ok(Some("")));
        assert!(bytes.cstr_at(4).is_err());
        assert!(bytes.cstr_at(7).is_err());
    }
}
