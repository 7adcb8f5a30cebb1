//! Address spaces that executable images are loaded into.

use alloc::{boxed::Box, collections::BTreeMap};
use core::ops::Range;
use thiserror_no_std::Error;

pub const PAGE_SIZE: u64 = 4096;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address {0:#x} is not mapped")]
    Unmapped(u64),
    #[error("failed to map page at {0:#x}")]
    MapFailed(u64),
    #[error("range {start:#x}..{end:#x} is invalid")]
    BadRange { start: u64, end: u64 },
}

/// Memory an environment's image lives in.
///
/// `map` must hand out zero-filled memory: loaders rely on it for the part of a segment
/// that has no file contents.
pub trait AddressSpace {
    /// Makes `range` accessible. Pages that are already present are left untouched.
    fn map(&mut self, range: Range<u64>) -> Result<(), MemoryError>;

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError>;

    fn write_u64(&mut self, addr: u64, value: u64) -> Result<(), MemoryError> {
        self.write(addr, &value.to_le_bytes())
    }
}

pub fn page_base(addr: u64) -> u64 {
    addr & !(PAGE_SIZE - 1)
}

/// Pages covering `range`, as page base addresses.
pub fn pages(range: Range<u64>) -> Result<impl Iterator<Item = u64>, MemoryError> {
    if range.start > range.end {
        return Err(MemoryError::BadRange {
            start: range.start,
            end: range.end,
        });
    }
    let first = page_base(range.start);
    let count = if range.is_empty() {
        0
    } else {
        (page_base(range.end - 1) - first) / PAGE_SIZE + 1
    };
    Ok((0..count).map(move |i| first + i * PAGE_SIZE))
}

/// A page-granular address space backed by heap memory.
///
/// Used to load images outside of the running kernel's page tables.
#[derive(Default)]
pub struct SparseSpace {
    pages: BTreeMap<u64, Box<[u8; PAGE_SIZE as usize]>>,
}

impl SparseSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mapped(&self, addr: u64) -> bool {
        self.pages.contains_key(&page_base(addr))
    }

    pub fn mapped_pages(&self) -> usize {
        self.pages.len()
    }

    /// Copies `buf.len()` bytes starting at `addr` out of the space.
    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        let mut done = 0;
        while done < buf.len() {
            let at = addr
                .checked_add(done as u64)
                .ok_or(MemoryError::Unmapped(addr))?;
            let page = self.pages.get(&page_base(at)).ok_or(MemoryError::Unmapped(at))?;
            let offset = (at - page_base(at)) as usize;
            let n = (PAGE_SIZE as usize - offset).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&page[offset..offset + n]);
            done += n;
        }
        Ok(())
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64, MemoryError> {
        let mut buf = [0; 8];
        self.read(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

impl AddressSpace for SparseSpace {
    fn map(&mut self, range: Range<u64>) -> Result<(), MemoryError> {
        for page in pages(range)? {
            self.pages
                .entry(page)
                .or_insert_with(|| Box::new([0; PAGE_SIZE as usize]));
        }
        Ok(())
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        let end = addr
            .checked_add(bytes.len() as u64)
            .ok_or(MemoryError::BadRange { start: addr, end: u64::MAX })?;
        // nothing is written unless the whole destination is mapped
        if let Some(missing) = pages(addr..end)?.find(|p| !self.pages.contains_key(p)) {
            return Err(MemoryError::Unmapped(missing.max(addr)));
        }

        let mut done = 0;
        while done < bytes.len() {
            let at = addr + done as u64;
            let offset = (at - page_base(at)) as usize;
            let n = (PAGE_SIZE as usize - offset).min(bytes.len() - done);
            if let Some(page) = self.pages.get_mut(&page_base(at)) {
                page[offset..offset + n].copy_from_slice(&bytes[done..done + n]);
            }
            done += n;
        }
        Ok(())
    }
}
