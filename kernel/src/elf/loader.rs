//! Copies an executable image into an environment's address space.

use alloc::vec::Vec;
use core::ops::Range;
use thiserror_no_std::Error;

use super::{ElfError, ElfImage};
use crate::{
    env::Env,
    vm::{AddressSpace, MemoryError},
};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    #[error("malformed executable: {0}")]
    Malformed(#[from] ElfError),
    #[error("{0}")]
    Memory(#[from] MemoryError),
}

/// One region to make available and the file bytes that go at its start.
#[derive(Debug)]
struct Placement<'a> {
    region: Range<u64>,
    contents: &'a [u8],
}

fn region(addr: u64, size: u64) -> Result<Range<u64>, ElfError> {
    let end = addr
        .checked_add(size)
        .ok_or(ElfError::AddressOverflow { addr, size })?;
    Ok(addr..end)
}

/// Everything the image asks for, checked against the file before memory is touched.
fn plan<'a>(elf: &ElfImage<'a>) -> Result<Vec<Placement<'a>>, ElfError> {
    let bytes = elf.bytes();
    let mut placements = Vec::new();

    for ph in elf.program_headers().filter(|ph| ph.is_load()) {
        let size = ph.memsz.max(ph.filesz);
        if size == 0 {
            continue;
        }
        let contents: &[u8] = if ph.filesz > 0 {
            bytes.slice(ph.offset, ph.filesz)?
        } else {
            &[]
        };
        // segments go to their physical address, which is the virtual one in a flat layout
        placements.push(Placement {
            region: region(ph.paddr, size)?,
            contents,
        });
    }

    for sh in elf.section_headers() {
        if !sh.has_file_data() || sh.addr == 0 {
            continue;
        }
        placements.push(Placement {
            region: region(sh.addr, sh.size)?,
            contents: bytes.slice(sh.offset, sh.size)?,
        });
    }

    Ok(placements)
}

/// Loads `binary` into `space` and points `env` at its entry.
///
/// The image is fully validated first, a malformed one leaves both `env` and `space`
/// untouched. Memory past a segment's file contents is whatever `space` maps, which is zero.
pub fn load_icode(
    env: &mut Env,
    binary: &'static [u8],
    space: &mut impl AddressSpace,
) -> Result<(), LoadError> {
    let elf = ElfImage::parse(binary)?;
    let placements = plan(&elf)?;

    for placement in placements {
        #[cfg(feature = "dbg-elf")]
        log::trace!(
            "env {}: loading {:#x}..{:#x} ({} bytes from file)",
            env.id,
            placement.region.start,
            placement.region.end,
            placement.contents.len()
        );

        space.map(placement.region.clone())?;
        if !placement.contents.is_empty() {
            space.write(placement.region.start, placement.contents)?;
        }
    }

    env.tf.rip = elf.entry();
    env.binary = Some(binary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        elf::testing::{ImageBuilder, BSS_ADDR, TEXT_ADDR},
        env::{Env, EnvId},
        vm::SparseSpace,
    };
    use alloc::vec::Vec;

    fn leak(image: Vec<u8>) -> &'static [u8] {
        image.leak()
    }

    fn fresh_env() -> Env {
        let mut env = Env::free(None);
        env.id = EnvId::NONE.next_generation(0);
        env
    }

    fn set_u64(image: &mut [u8], at: u64, value: u64) {
        let at = at as usize;
        image[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn copies_text_and_sets_entry() {
        let text = [0x55, 0x48, 0x89, 0xe5, 0xc3];
        let binary = leak(ImageBuilder::default().text(&text).build());
        let mut env = fresh_env();
        let mut space = SparseSpace::new();

        load_icode(&mut env, binary, &mut space).unwrap();

        let mut loaded = [0; 5];
        space.read(TEXT_ADDR, &mut loaded).unwrap();
        assert_eq!(loaded, text);
        assert_eq!(env.tf.rip, TEXT_ADDR);
        assert_eq!(env.binary.map(|b| b.as_ptr()), Some(binary.as_ptr()));
    }

    #[test]
    fn bss_is_mapped_and_zero() {
        let binary = leak(ImageBuilder::default().bss_size(0x2000).build());
        let mut env = fresh_env();
        let mut space = SparseSpace::new();

        load_icode(&mut env, binary, &mut space).unwrap();

        assert!(space.is_mapped(BSS_ADDR));
        assert!(space.is_mapped(BSS_ADDR + 0x1fff));
        assert_eq!(space.read_u64(BSS_ADDR + 0x100), Ok(0));
    }

    #[test]
    fn malformed_header_has_no_side_effects() {
        let mut image = ImageBuilder::default().build();
        image[0] = 0;
        let binary = leak(image);
        let mut env = fresh_env();
        let mut space = SparseSpace::new();

        assert_eq!(
            load_icode(&mut env, binary, &mut space),
            Err(LoadError::Malformed(ElfError::BadMagic))
        );
        assert_eq!(space.mapped_pages(), 0);
        assert_eq!(env.tf.rip, 0);
        assert!(env.binary.is_none());
    }

    #[test]
    fn segment_past_the_end_is_rejected_before_copying() {
        let (mut image, layout) = ImageBuilder::default().build_with_layout();
        let len = image.len() as u64;
        set_u64(&mut image, layout.phoff + 8, len - 4);
        let binary = leak(image);
        let mut env = fresh_env();
        let mut space = SparseSpace::new();

        assert!(matches!(
            load_icode(&mut env, binary, &mut space),
            Err(LoadError::Malformed(ElfError::OutOfBounds(_)))
        ));
        assert_eq!(space.mapped_pages(), 0);
        assert_eq!(env.tf.rip, 0);
    }

    #[test]
    fn section_past_the_end_is_rejected_before_copying() {
        let (mut image, layout) = ImageBuilder::default().build_with_layout();
        // size of the .text section header, which is the first after the null one
        set_u64(&mut image, layout.shoff + 64 + 32, u64::MAX);
        let binary = leak(image);
        let mut env = fresh_env();
        let mut space = SparseSpace::new();

        assert!(load_icode(&mut env, binary, &mut space).is_err());
        assert_eq!(space.mapped_pages(), 0);
        assert!(env.binary.is_none());
    }

    #[test]
    fn wrapping_segment_address_is_rejected() {
        let (mut image, layout) = ImageBuilder::default().build_with_layout();
        set_u64(&mut image, layout.phoff + 24, u64::MAX - 8);
        let binary = leak(image);
        let mut env = fresh_env();
        let mut space = SparseSpace::new();

        assert!(matches!(
            load_icode(&mut env, binary, &mut space),
            Err(LoadError::Malformed(ElfError::AddressOverflow { .. }))
        ));
        assert_eq!(space.mapped_pages(), 0);
    }

    #[test]
    fn empty_file_segment_is_only_mapped() {
        let (mut image, layout) = ImageBuilder::default().build_with_layout();
        // drop the file contents of the only segment, keep its memory size
        set_u64(&mut image, layout.phoff + 32, 0);
        let binary = leak(image);
        let mut env = fresh_env();
        let mut space = SparseSpace::new();

        load_icode(&mut env, binary, &mut space).unwrap();
        assert!(space.is_mapped(BSS_ADDR));
        // the .text section still carries the code
        assert_eq!(space.read_u64(TEXT_ADDR), Ok(0x9090_9090_9090_9090));
    }
}
