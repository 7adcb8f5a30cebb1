//! ELF64 executable images
//!
//! [ElfImage::parse] validates the fixed header of a raw image and hands out views over its
//! program headers, section headers and symbols. Offsets and extents are checked through
//! [reader::Bytes] before anything is decoded; the records themselves are `xmas_elf` types.

use core::mem;
use thiserror_no_std::Error;
use xmas_elf::{
    header,
    program::{self, ProgramHeader64},
    sections::{self, SectionHeader_, ShType},
    symbol_table::{self, Entry, Entry64},
    P64,
};

pub mod loader;
pub mod reader;

use reader::{Bytes, OutOfBounds};

pub const ELF_MAGIC: [u8; 4] = *b"\x7fELF";

pub const EHDR_SIZE: u64 = 64;
pub const PHDR_SIZE: u64 = 56;
pub const SHDR_SIZE: u64 = 64;
pub const SYM_SIZE: u64 = 24;

const _: () = assert!(mem::size_of::<ProgramHeader64>() as u64 == PHDR_SIZE);
const _: () = assert!(mem::size_of::<SectionHeader_<P64>>() as u64 == SHDR_SIZE);
const _: () = assert!(mem::size_of::<Entry64>() as u64 == SYM_SIZE);

pub const ET_EXEC: u16 = 2;
pub const ELFCLASS64: u8 = 2;

pub const SHN_UNDEF: u16 = 0;
pub const SHN_XINDEX: u16 = 0xffff;

pub const PT_LOAD: u32 = 1;

pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_NOBITS: u32 = 8;

pub const STB_GLOBAL: u8 = 1;
pub const STT_OBJECT: u8 = 1;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    #[error("image of {0} bytes is too short for an ELF header")]
    Truncated(usize),
    #[error("bad ELF magic")]
    BadMagic,
    #[error("not an executable (e_type {0})")]
    NotExecutable(u16),
    #[error("not a 64-bit image (class {0})")]
    WrongClass(u8),
    #[error("bad ELF header: {0}")]
    Header(&'static str),
    #[error("unexpected section header entry size {0}")]
    BadSectionEntrySize(u16),
    #[error("unexpected program header entry size {0}")]
    BadProgramEntrySize(u16),
    #[error("section name table index {index} is invalid for {count} sections")]
    BadSectionNameIndex { index: u16, count: u16 },
    #[error("program header table offset {0:#x} is invalid")]
    BadProgramTableOffset(u64),
    #[error("section header table offset {0:#x} is invalid")]
    BadSectionTableOffset(u64),
    #[error("program header table does not fit in the image")]
    ProgramTableOutOfBounds,
    #[error("section header table does not fit in the image")]
    SectionTableOutOfBounds,
    #[error("entry point is zero")]
    NoEntryPoint,
    #[error("region at {addr:#x} of {size:#x} bytes wraps around the address space")]
    AddressOverflow { addr: u64, size: u64 },
    #[error("{0}")]
    OutOfBounds(#[from] OutOfBounds),
}

/// Copies a fixed-size record out of the image. Images are byte slices with no alignment
/// guarantee, so the record is read unaligned instead of borrowed in place.
///
/// `T` must be one of the plain-old-data record types of `xmas_elf`, which are valid for
/// any bit pattern.
fn record<T>(bytes: &Bytes, at: u64) -> Result<T, OutOfBounds> {
    let raw = bytes.slice(at, mem::size_of::<T>() as u64)?;
    // SAFETY: `raw` holds exactly size_of::<T>() bytes and every bit pattern is a valid T
    Ok(unsafe { core::ptr::read_unaligned(raw.as_ptr().cast::<T>()) })
}

/// The part of the file header the loader cares about.
#[derive(Debug, Clone, Copy)]
pub struct ElfHeader {
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

impl ElfHeader {
    fn parse(bytes: &Bytes) -> Result<Self, ElfError> {
        #[repr(C, align(8))]
        struct Aligned([u8; EHDR_SIZE as usize]);

        let mut raw = Aligned([0; EHDR_SIZE as usize]);
        raw.0.copy_from_slice(bytes.slice(0, EHDR_SIZE)?);
        let header = header::parse_header(&raw.0).map_err(ElfError::Header)?;

        Ok(Self {
            entry: header.pt2.entry_point(),
            phoff: header.pt2.ph_offset(),
            shoff: header.pt2.sh_offset(),
            phentsize: header.pt2.ph_entry_size(),
            phnum: header.pt2.ph_count(),
            shentsize: header.pt2.sh_entry_size(),
            shnum: header.pt2.sh_count(),
            shstrndx: header.pt2.sh_str_index(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub load: bool,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
}

impl ProgramHeader {
    fn parse(bytes: &Bytes, at: u64) -> Result<Self, OutOfBounds> {
        let ph: ProgramHeader64 = record(bytes, at)?;
        Ok(Self {
            load: matches!(ph.get_type(), Ok(program::Type::Load)),
            offset: ph.offset,
            vaddr: ph.virtual_addr,
            paddr: ph.physical_addr,
            filesz: ph.file_size,
            memsz: ph.mem_size,
        })
    }

    pub fn is_load(&self) -> bool {
        self.load
    }
}

/// What a section holds, as far as loading and binding are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    SymbolTable,
    StringTable,
    /// Occupies memory but has no bytes in the file, like `.bss`.
    NoBits,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: u32,
    pub kind: SectionKind,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
}

impl SectionHeader {
    fn parse(bytes: &Bytes, at: u64) -> Result<Self, OutOfBounds> {
        let raw: SectionHeader_<P64> = record(bytes, at)?;
        let sh = sections::SectionHeader::Sh64(&raw);
        let kind = match sh.get_type() {
            Ok(ShType::SymTab) => SectionKind::SymbolTable,
            Ok(ShType::StrTab) => SectionKind::StringTable,
            Ok(ShType::NoBits) => SectionKind::NoBits,
            _ => SectionKind::Other,
        };
        Ok(Self {
            name: sh.name(),
            kind,
            addr: sh.address(),
            offset: sh.offset(),
            size: sh.size(),
        })
    }

    pub fn has_file_data(&self) -> bool {
        self.kind != SectionKind::NoBits
    }

    /// Address range the section occupies once loaded, if it doesn't wrap.
    pub fn addr_range(&self) -> Option<core::ops::Range<u64>> {
        Some(self.addr..self.addr.checked_add(self.size)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub name: u32,
    pub global: bool,
    pub object: bool,
    pub shndx: u16,
    pub value: u64,
    pub size: u64,
}

impl Symbol {
    fn parse(bytes: &Bytes, at: u64) -> Result<Self, OutOfBounds> {
        let entry: Entry64 = record(bytes, at)?;
        Ok(Self {
            name: entry.name(),
            global: matches!(entry.get_binding(), Ok(symbol_table::Binding::Global)),
            object: matches!(entry.get_type(), Ok(symbol_table::Type::Object)),
            shndx: entry.shndx(),
            value: entry.value(),
            size: entry.size(),
        })
    }

    /// A global data object, the only kind of symbol the binder patches.
    pub fn is_global_object(&self) -> bool {
        self.global && self.object
    }
}

/// A raw image whose fixed header passed validation.
#[derive(Debug, Clone, Copy)]
pub struct ElfImage<'a> {
    bytes: Bytes<'a>,
    header: ElfHeader,
}

impl<'a> ElfImage<'a> {
    /// Validates the header. The checks run in a fixed order and stop at the first failure:
    /// identity, table entry sizes, section name index, table offsets, table extents, entry.
    pub fn parse(data: &'a [u8]) -> Result<Self, ElfError> {
        let bytes = Bytes::new(data);

        if (data.len() as u64) < EHDR_SIZE {
            return Err(ElfError::Truncated(data.len()));
        }
        if bytes.slice(0, 4)? != ELF_MAGIC {
            return Err(ElfError::BadMagic);
        }
        let e_type = bytes.u16_at(16)?;
        if e_type != ET_EXEC {
            return Err(ElfError::NotExecutable(e_type));
        }
        let class = bytes.u8_at(4)?;
        if class != ELFCLASS64 {
            return Err(ElfError::WrongClass(class));
        }

        let header = ElfHeader::parse(&bytes)?;
        if u64::from(header.shentsize) != SHDR_SIZE {
            return Err(ElfError::BadSectionEntrySize(header.shentsize));
        }
        if u64::from(header.phentsize) != PHDR_SIZE {
            return Err(ElfError::BadProgramEntrySize(header.phentsize));
        }

        if header.shstrndx == SHN_UNDEF
            || header.shstrndx == SHN_XINDEX
            || header.shstrndx >= header.shnum
        {
            return Err(ElfError::BadSectionNameIndex {
                index: header.shstrndx,
                count: header.shnum,
            });
        }

        let len = data.len() as u64;
        if header.phoff == 0 || header.phoff >= len {
            return Err(ElfError::BadProgramTableOffset(header.phoff));
        }
        if header.shoff >= len {
            return Err(ElfError::BadSectionTableOffset(header.shoff));
        }

        bytes
            .table(header.phoff, header.phnum.into(), PHDR_SIZE)
            .map_err(|_| ElfError::ProgramTableOutOfBounds)?;
        bytes
            .table(header.shoff, header.shnum.into(), SHDR_SIZE)
            .map_err(|_| ElfError::SectionTableOutOfBounds)?;

        if header.entry == 0 {
            return Err(ElfError::NoEntryPoint);
        }

        #[cfg(feature = "dbg-elf")]
        log::trace!("elf header: {:x?}", header);

        Ok(Self { bytes, header })
    }

    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    pub fn entry(&self) -> u64 {
        self.header.entry
    }

    pub fn bytes(&self) -> Bytes<'a> {
        self.bytes
    }

    pub fn program_headers(&self) -> impl Iterator<Item = ProgramHeader> + 'a {
        let bytes = self.bytes;
        let phoff = self.header.phoff;
        // the table extent was checked in parse, so these reads can't fail
        (0..u64::from(self.header.phnum))
            .filter_map(move |i| ProgramHeader::parse(&bytes, phoff + i * PHDR_SIZE).ok())
    }

    pub fn section_headers(&self) -> impl Iterator<Item = SectionHeader> + 'a {
        let bytes = self.bytes;
        let shoff = self.header.shoff;
        (0..u64::from(self.header.shnum))
            .filter_map(move |i| SectionHeader::parse(&bytes, shoff + i * SHDR_SIZE).ok())
    }

    pub fn section(&self, index: u16) -> Option<SectionHeader> {
        if index >= self.header.shnum {
            return None;
        }
        SectionHeader::parse(&self.bytes, self.header.shoff + u64::from(index) * SHDR_SIZE).ok()
    }

    /// Section holding section names, as named by the header.
    pub fn section_names(&self) -> Option<SectionHeader> {
        self.section(self.header.shstrndx)
    }

    /// File contents of a section.
    pub fn section_data(&self, section: &SectionHeader) -> Result<Bytes<'a>, OutOfBounds> {
        self.bytes.sub(section.offset, section.size)
    }

    /// Name of `section` looked up in the string table `names`.
    pub fn section_name(
        &self,
        names: &Bytes<'a>,
        section: &SectionHeader,
    ) -> Result<Option<&'a str>, OutOfBounds> {
        names.cstr_at(section.name.into())
    }

    /// Entries of a symbol table section. Trailing bytes short of a whole entry are ignored.
    pub fn symbols(
        &self,
        symtab: &SectionHeader,
    ) -> Result<impl Iterator<Item = Symbol> + 'a, OutOfBounds> {
        let data = self.section_data(symtab)?;
        let count = data.len() as u64 / SYM_SIZE;
        Ok((0..count).filter_map(move |i| Symbol::parse(&data, i * SYM_SIZE).ok()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Builder for small, well-formed executables used across the test suite.

    use super::*;
    use alloc::{string::String, vec, vec::Vec};

    pub const TEXT_ADDR: u64 = 0x80_0000;
    pub const BSS_ADDR: u64 = 0x80_1000;

    pub struct ImageBuilder {
        text: Vec<u8>,
        bss_size: u64,
        symbols: Vec<(String, u8, u64)>,
        with_bss: bool,
        with_strtab: bool,
        with_symtab: bool,
    }

    /// Where the interesting parts of a built image ended up.
    #[derive(Debug, Clone, Copy)]
    pub struct Layout {
        pub text_offset: u64,
        pub shoff: u64,
        pub phoff: u64,
        pub shnum: u16,
    }

    impl Default for ImageBuilder {
        fn default() -> Self {
            Self {
                text: vec![0x90; 16],
                bss_size: 0x40,
                symbols: Vec::new(),
                with_bss: true,
                with_strtab: true,
                with_symtab: true,
            }
        }
    }

    impl ImageBuilder {
        pub fn text(mut self, text: &[u8]) -> Self {
            self.text = text.to_vec();
            self
        }

        pub fn bss_size(mut self, size: u64) -> Self {
            self.bss_size = size;
            self
        }

        /// Adds a global object symbol at `BSS_ADDR + offset`.
        pub fn bss_symbol(self, name: &str, offset: u64) -> Self {
            self.symbol(name, (STB_GLOBAL << 4) | STT_OBJECT, BSS_ADDR + offset)
        }

        pub fn symbol(mut self, name: &str, info: u8, value: u64) -> Self {
            self.symbols.push((name.into(), info, value));
            self
        }

        pub fn without_bss(mut self) -> Self {
            self.with_bss = false;
            self
        }

        pub fn without_strtab(mut self) -> Self {
            self.with_strtab = false;
            self
        }

        pub fn without_symtab(mut self) -> Self {
            self.with_symtab = false;
            self
        }

        pub fn build(self) -> Vec<u8> {
            self.build_with_layout().0
        }

        pub fn build_with_layout(self) -> (Vec<u8>, Layout) {
            struct Section {
                name: &'static str,
                sh_type: u32,
                addr: u64,
                data: Vec<u8>,
                size: u64,
            }

            let mut strtab = vec![0u8];
            let mut symtab = vec![0u8; SYM_SIZE as usize];
            for (name, info, value) in &self.symbols {
                let name_offset = strtab.len() as u32;
                strtab.extend_from_slice(name.as_bytes());
                strtab.push(0);
                symtab.extend_from_slice(&name_offset.to_le_bytes());
                symtab.push(*info);
                symtab.push(0);
                symtab.extend_from_slice(&1u16.to_le_bytes());
                symtab.extend_from_slice(&value.to_le_bytes());
                symtab.extend_from_slice(&8u64.to_le_bytes());
            }

            let mut sections = vec![Section {
                name: ".text",
                sh_type: 1,
                addr: TEXT_ADDR,
                size: self.text.len() as u64,
                data: self.text.clone(),
            }];
            if self.with_bss {
                sections.push(Section {
                    name: ".bss",
                    sh_type: SHT_NOBITS,
                    addr: BSS_ADDR,
                    data: Vec::new(),
                    size: self.bss_size,
                });
            }
            if self.with_strtab {
                sections.push(Section {
                    name: ".strtab",
                    sh_type: SHT_STRTAB,
                    addr: 0,
                    size: strtab.len() as u64,
                    data: strtab,
                });
            }
            if self.with_symtab {
                sections.push(Section {
                    name: ".symtab",
                    sh_type: SHT_SYMTAB,
                    addr: 0,
                    size: symtab.len() as u64,
                    data: symtab,
                });
            }

            let mut shstrtab = vec![0u8];
            let mut name_offsets = Vec::new();
            for s in sections.iter().map(|s| s.name).chain([".shstrtab"]) {
                name_offsets.push(shstrtab.len() as u32);
                shstrtab.extend_from_slice(s.as_bytes());
                shstrtab.push(0);
            }
            sections.push(Section {
                name: ".shstrtab",
                sh_type: SHT_STRTAB,
                addr: 0,
                size: shstrtab.len() as u64,
                data: shstrtab,
            });

            let phoff = EHDR_SIZE;
            let mut out = vec![0u8; (EHDR_SIZE + PHDR_SIZE) as usize];
            let mut file_offsets = Vec::new();
            for s in &sections {
                file_offsets.push(out.len() as u64);
                out.extend_from_slice(&s.data);
            }
            while out.len() % 8 != 0 {
                out.push(0);
            }
            let shoff = out.len() as u64;
            let shnum = sections.len() as u16 + 1;

            // null section header
            out.extend_from_slice(&[0u8; SHDR_SIZE as usize]);
            for (i, s) in sections.iter().enumerate() {
                out.extend_from_slice(&name_offsets[i].to_le_bytes());
                out.extend_from_slice(&s.sh_type.to_le_bytes());
                out.extend_from_slice(&0u64.to_le_bytes());
                out.extend_from_slice(&s.addr.to_le_bytes());
                out.extend_from_slice(&file_offsets[i].to_le_bytes());
                out.extend_from_slice(&s.size.to_le_bytes());
                out.extend_from_slice(&[0u8; 24]);
            }

            out[0..4].copy_from_slice(&ELF_MAGIC);
            out[4] = ELFCLASS64;
            out[5] = 1;
            out[6] = 1;
            out[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
            out[18..20].copy_from_slice(&0x3eu16.to_le_bytes());
            out[20..24].copy_from_slice(&1u32.to_le_bytes());
            out[24..32].copy_from_slice(&TEXT_ADDR.to_le_bytes());
            out[32..40].copy_from_slice(&phoff.to_le_bytes());
            out[40..48].copy_from_slice(&shoff.to_le_bytes());
            out[52..54].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
            out[54..56].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
            out[56..58].copy_from_slice(&1u16.to_le_bytes());
            out[58..60].copy_from_slice(&(SHDR_SIZE as u16).to_le_bytes());
            out[60..62].copy_from_slice(&shnum.to_le_bytes());
            out[62..64].copy_from_slice(&(shnum - 1).to_le_bytes());

            // one loadable segment: text followed by the zero-filled bss
            let text_offset = file_offsets[0];
            let memsz = if self.with_bss {
                BSS_ADDR + self.bss_size - TEXT_ADDR
            } else {
                self.text.len() as u64
            };
            let ph = phoff as usize;
            out[ph..ph + 4].copy_from_slice(&PT_LOAD.to_le_bytes());
            out[ph + 4..ph + 8].copy_from_slice(&7u32.to_le_bytes());
            out[ph + 8..ph + 16].copy_from_slice(&text_offset.to_le_bytes());
            out[ph + 16..ph + 24].copy_from_slice(&TEXT_ADDR.to_le_bytes());
            out[ph + 24..ph + 32].copy_from_slice(&TEXT_ADDR.to_le_bytes());
            out[ph + 32..ph + 40].copy_from_slice(&(self.text.len() as u64).to_le_bytes());
            out[ph + 40..ph + 48].copy_from_slice(&memsz.to_le_bytes());
            out[ph + 48..ph + 56].copy_from_slice(&0x1000u64.to_le_bytes());

            let layout = Layout {
                text_offset,
                shoff,
                phoff,
                shnum,
            };
            (out, layout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn set_u16(image: &mut [u8], at: usize, value: u16) {
        image[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn set_u64(image: &mut [u8], at: usize, value: u64) {
        image[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn accepts_well_formed_image() {
        let image = ImageBuilder::default().bss_symbol("sys_yield", 0).build();
        let elf = ElfImage::parse(&image).unwrap();
        assert_eq!(elf.entry(), TEXT_ADDR);
        assert_eq!(elf.program_headers().count(), 1);
        assert!(elf.program_headers().all(|ph| ph.is_load()));

        let names = elf.section_names().unwrap();
        assert_eq!(names.kind, SectionKind::StringTable);
        let names = elf.section_data(&names).unwrap();
        let found: alloc::vec::Vec<_> = elf
            .section_headers()
            .skip(1)
            .filter_map(|s| elf.section_name(&names, &s).ok().flatten())
            .collect();
        assert_eq!(found, [".text", ".bss", ".strtab", ".symtab", ".shstrtab"]);
    }

    #[test]
    fn rejects_truncated_header() {
        let image = ImageBuilder::default().build();
        assert_eq!(
            ElfImage::parse(&image[..63]).unwrap_err(),
            ElfError::Truncated(63)
        );
        assert_eq!(ElfImage::parse(&[]).unwrap_err(), ElfError::Truncated(0));
    }

    #[test]
    fn rejects_bad_identity() {
        let mut image = ImageBuilder::default().build();
        image[1] = b'X';
        assert_eq!(ElfImage::parse(&image).unwrap_err(), ElfError::BadMagic);

        let mut image = ImageBuilder::default().build();
        set_u16(&mut image, 16, 1);
        assert_eq!(ElfImage::parse(&image).unwrap_err(), ElfError::NotExecutable(1));

        let mut image = ImageBuilder::default().build();
        image[4] = 1;
        assert_eq!(ElfImage::parse(&image).unwrap_err(), ElfError::WrongClass(1));
    }

    #[test]
    fn type_is_checked_before_class() {
        let mut image = ImageBuilder::default().build();
        set_u16(&mut image, 16, 3);
        image[4] = 1;
        assert_eq!(ElfImage::parse(&image).unwrap_err(), ElfError::NotExecutable(3));
    }

    #[test]
    fn rejects_unexpected_entry_sizes() {
        let mut image = ImageBuilder::default().build();
        set_u16(&mut image, 58, 40);
        assert_eq!(
            ElfImage::parse(&image).unwrap_err(),
            ElfError::BadSectionEntrySize(40)
        );

        let mut image = ImageBuilder::default().build();
        set_u16(&mut image, 54, 32);
        assert_eq!(
            ElfImage::parse(&image).unwrap_err(),
            ElfError::BadProgramEntrySize(32)
        );
    }

    #[test]
    fn rejects_section_name_index_sentinels() {
        let (image, layout) = ImageBuilder::default().build_with_layout();
        for index in [SHN_UNDEF, SHN_XINDEX, layout.shnum] {
            let mut image = image.clone();
            set_u16(&mut image, 62, index);
            assert_eq!(
                ElfImage::parse(&image).unwrap_err(),
                ElfError::BadSectionNameIndex {
                    index,
                    count: layout.shnum
                }
            );
        }
    }

    #[test]
    fn rejects_bad_table_offsets() {
        let image = ImageBuilder::default().build();
        let len = image.len() as u64;

        let mut bad = image.clone();
        set_u64(&mut bad, 32, 0);
        assert_eq!(
            ElfImage::parse(&bad).unwrap_err(),
            ElfError::BadProgramTableOffset(0)
        );

        let mut bad = image.clone();
        set_u64(&mut bad, 32, len);
        assert_eq!(
            ElfImage::parse(&bad).unwrap_err(),
            ElfError::BadProgramTableOffset(len)
        );

        let mut bad = image.clone();
        set_u64(&mut bad, 40, u64::MAX);
        assert_eq!(
            ElfImage::parse(&bad).unwrap_err(),
            ElfError::BadSectionTableOffset(u64::MAX)
        );
    }

    #[test]
    fn rejects_tables_running_past_the_end() {
        let (image, layout) = ImageBuilder::default().build_with_layout();
        let len = image.len() as u64;

        let mut bad = image.clone();
        set_u64(&mut bad, 32, len - 8);
        assert_eq!(
            ElfImage::parse(&bad).unwrap_err(),
            ElfError::ProgramTableOutOfBounds
        );

        let mut bad = image.clone();
        set_u64(&mut bad, 40, layout.shoff + 8);
        assert_eq!(
            ElfImage::parse(&bad).unwrap_err(),
            ElfError::SectionTableOutOfBounds
        );

        let mut bad = image;
        set_u16(&mut bad, 56, u16::MAX);
        assert_eq!(
            ElfImage::parse(&bad).unwrap_err(),
            ElfError::ProgramTableOutOfBounds
        );
    }

    #[test]
    fn rejects_zero_entry() {
        let mut image = ImageBuilder::default().build();
        set_u64(&mut image, 24, 0);
        assert_eq!(ElfImage::parse(&image).unwrap_err(), ElfError::NoEntryPoint);
    }

    #[test]
    fn symbols_decode_binding_and_type() {
        let image = ImageBuilder::default()
            .bss_symbol("sys_exit", 8)
            .symbol("main", (STB_GLOBAL << 4) | 2, TEXT_ADDR)
            .symbol("counter", STT_OBJECT, BSS_ADDR)
            .build();
        let elf = ElfImage::parse(&image).unwrap();
        let symtab = elf
            .section_headers()
            .find(|s| s.kind == SectionKind::SymbolTable)
            .unwrap();
        let symbols: alloc::vec::Vec<_> = elf.symbols(&symtab).unwrap().collect();
        assert_eq!(symbols.len(), 4);
        assert!(symbols[1].is_global_object());
        assert_eq!(symbols[1].value, BSS_ADDR + 8);
        assert!(symbols[2].global && !symbols[2].object);
        assert!(!symbols[3].global && symbols[3].object);
    }

    #[test]
    fn decodes_images_at_any_alignment() {
        let (image, layout) = ImageBuilder::default()
            .bss_symbol("sys_yield", 0)
            .build_with_layout();
        let mut shifted = alloc::vec![0u8; image.len() + 1];
        shifted[1..].copy_from_slice(&image);
        let elf = ElfImage::parse(&shifted[1..]).unwrap();

        assert_eq!(elf.header().shoff, layout.shoff);
        let ph = elf.program_headers().next().unwrap();
        assert!(ph.is_load());
        assert_eq!((ph.offset, ph.vaddr), (layout.text_offset, TEXT_ADDR));
        let kinds: alloc::vec::Vec<_> = elf.section_headers().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            [
                SectionKind::Other,
                SectionKind::Other,
                SectionKind::NoBits,
                SectionKind::StringTable,
                SectionKind::SymbolTable,
                SectionKind::StringTable,
            ]
        );
    }
}
