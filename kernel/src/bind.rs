//! Symbol binding
//!
//! Loaded programs reach the kernel through global function pointers they leave uninitialized.
//! After an image is loaded the binder walks its symbol table and writes a kernel address into
//! every such pointer: first from the fixed table of [ExportedFunction]s, then from the
//! [SymbolResolver]. Anything left over gets zero, so calling it faults.
//!
//! A pointer qualifies when its symbol is a global object that lies entirely inside `.bss`, the
//! only memory the file provides no contents for.

use core::ops::Range;
use heapless::Vec;
use thiserror_no_std::Error;

use crate::{
    elf::{
        reader::OutOfBounds, ElfError, ElfImage, SectionHeader, SectionKind,
    },
    symbols::{ExportedFunction, SymbolResolver},
    vm::{AddressSpace, MemoryError},
};

/// How many unresolved names a [BindReport] keeps.
pub const MAX_REPORTED: usize = 8;

const POINTER_SIZE: u64 = 8;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    #[error("image has no section name table")]
    NoSectionNames,
    #[error("image has no .bss section")]
    NoUninitializedDataSection,
    #[error("image has no .strtab section")]
    NoSymbolStringTable,
    #[error("malformed executable: {0}")]
    Malformed(#[from] ElfError),
    #[error("{0}")]
    Memory(#[from] MemoryError),
}

impl From<OutOfBounds> for BindError {
    fn from(e: OutOfBounds) -> Self {
        BindError::Malformed(e.into())
    }
}

/// Where the address written into a bound pointer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Exported(u64),
    Debug(u64),
    Unresolved,
}

impl Resolution {
    pub fn address(self) -> u64 {
        match self {
            Resolution::Exported(address) | Resolution::Debug(address) => address,
            Resolution::Unresolved => 0,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BindReport<'a> {
    pub bound: usize,
    pub unresolved: usize,
    /// The first [MAX_REPORTED] names that were bound to zero.
    pub unresolved_names: Vec<&'a str, MAX_REPORTED>,
}

pub struct Binder<'a> {
    exports: &'a [ExportedFunction],
    resolver: &'a dyn SymbolResolver,
}

impl<'a> Binder<'a> {
    pub fn new(exports: &'a [ExportedFunction], resolver: &'a dyn SymbolResolver) -> Self {
        Self { exports, resolver }
    }

    pub fn resolve(&self, name: &str) -> Resolution {
        if let Some(export) = self.exports.iter().find(|e| e.name == name) {
            return Resolution::Exported(export.address);
        }
        match self.resolver.find_function(name) {
            Some(address) if address != 0 => Resolution::Debug(address),
            _ => Resolution::Unresolved,
        }
    }

    /// Patches the function pointers of `binary`, which must already be loaded into `space`.
    pub fn bind<'b>(
        &self,
        binary: &'b [u8],
        space: &mut impl AddressSpace,
    ) -> Result<BindReport<'b>, BindError> {
        let elf = ElfImage::parse(binary)?;

        let names = elf
            .section_names()
            .filter(|s| s.kind == SectionKind::StringTable)
            .ok_or(BindError::NoSectionNames)?;
        let names = elf.section_data(&names)?;
        // a name that can't be read just doesn't match
        let named = |section: &SectionHeader, name: &str| {
            elf.section_name(&names, section).ok().flatten() == Some(name)
        };

        let bss = elf
            .section_headers()
            .find(|s| named(s, ".bss"))
            .ok_or(BindError::NoUninitializedDataSection)?;
        let bss: Range<u64> = bss.addr_range().ok_or(ElfError::AddressOverflow {
            addr: bss.addr,
            size: bss.size,
        })?;

        let strtab = elf
            .section_headers()
            .find(|s| s.kind == SectionKind::StringTable && named(s, ".strtab"))
            .ok_or(BindError::NoSymbolStringTable)?;
        let strtab = elf.section_data(&strtab)?;

        let mut report = BindReport::default();
        let symtab = elf
            .section_headers()
            .find(|s| s.kind == SectionKind::SymbolTable);
        let Some(symtab) = symtab else {
            return Ok(report);
        };

        for symbol in elf.symbols(&symtab)? {
            if !symbol.is_global_object() {
                continue;
            }
            let fits = symbol.value >= bss.start
                && symbol
                    .value
                    .checked_add(POINTER_SIZE)
                    .map_or(false, |end| end <= bss.end);
            if !fits {
                #[cfg(feature = "dbg-bind")]
                log::trace!("skipping object at {:#x} outside of .bss", symbol.value);
                continue;
            }

            let name = strtab.cstr_at(symbol.name.into()).ok().flatten();
            let resolution = name.map_or(Resolution::Unresolved, |name| self.resolve(name));
            space.write_u64(symbol.value, resolution.address())?;

            let name = name.unwrap_or("<invalid>");
            match resolution {
                Resolution::Unresolved => {
                    log::debug!("no kernel symbol for {}, binding it to zero", name);
                    report.unresolved += 1;
                    let _ = report.unresolved_names.push(name);
                }
                resolved => {
                    log::debug!(
                        "binding {}@{:#x} -> {:#x}",
                        name,
                        symbol.value,
                        resolved.address()
                    );
                    report.bound += 1;
                }
            }
        }

        Ok(report)
    }
}
