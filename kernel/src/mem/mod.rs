//! Kernel memory management
//!
//! This module provides [MemoryManager] for the kernel and [KernelSpace], the address space
//! environments are loaded into.

use alloc::collections::BTreeSet;
use bootloader_api::info::MemoryRegions;
use conquer_once::spin::OnceCell;
use core::ops::Range;
use x86_64::{
    structures::paging::{
        mapper::MapToError, FrameAllocator, Mapper, OffsetPageTable, Page, PageTable,
        PageTableFlags, PhysFrame, Size4KiB, Translate,
    },
    PhysAddr, VirtAddr,
};

use self::frame_allocator::BootInfoFrameAllocator;
use crate::{
    util::Spinlock,
    vm::{self, AddressSpace, MemoryError, PAGE_SIZE},
};

mod allocator;
mod frame_allocator;

static MEMORY_MANAGER: OnceCell<MemoryManager> = OnceCell::uninit();

pub fn get_memory_manager() -> &'static MemoryManager {
    MEMORY_MANAGER
        .try_get()
        .unwrap_or_else(|e| panic!("kernel memory manager is unavailable: {:?}", e))
}

pub struct MemoryManager {
    page_table: Spinlock<OffsetPageTable<'static>>,
    frame_allocator: Spinlock<BootInfoFrameAllocator>,
}

impl MemoryManager {
    pub fn translate_addr(&self, addr: VirtAddr) -> Option<PhysAddr> {
        self.page_table.lock().translate_addr(addr)
    }

    /// Backs `page` with a fresh frame.
    pub fn map(&self, page: Page<Size4KiB>) -> Result<PhysFrame<Size4KiB>, MapToError<Size4KiB>> {
        #[cfg(feature = "dbg-mem")]
        log::trace!("mapping page: {:x?}", page);

        let mut frame_allocator = self.frame_allocator.lock();
        let frame = frame_allocator
            .allocate_frame()
            .ok_or(MapToError::FrameAllocationFailed)?;
        unsafe {
            self.page_table
                .lock()
                .map_to(
                    page,
                    frame,
                    PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
                    &mut *frame_allocator,
                )?
                .flush();
        }
        Ok(frame)
    }

    pub fn used_frames(&self) -> usize {
        self.frame_allocator.lock().used_frame_count()
    }
}

/// The address space of the running kernel. Environments share it.
pub struct KernelSpace {
    mm: &'static MemoryManager,
    /// Pages this space backed itself. Anything else found present belongs to someone else.
    mapped: BTreeSet<u64>,
}

impl KernelSpace {
    pub fn new() -> Self {
        Self {
            mm: get_memory_manager(),
            mapped: BTreeSet::new(),
        }
    }

    fn page(addr: u64) -> Result<Page<Size4KiB>, MemoryError> {
        VirtAddr::try_new(addr)
            .map(Page::containing_address)
            .map_err(|_| MemoryError::MapFailed(addr))
    }

    fn check_mapped(&self, range: Range<u64>) -> Result<(), MemoryError> {
        for page in vm::pages(range.clone())? {
            let addr = VirtAddr::try_new(page).map_err(|_| MemoryError::Unmapped(page))?;
            if self.mm.translate_addr(addr).is_none() {
                return Err(MemoryError::Unmapped(page.max(range.start)));
            }
        }
        Ok(())
    }
}

impl AddressSpace for KernelSpace {
    fn map(&mut self, range: Range<u64>) -> Result<(), MemoryError> {
        for addr in vm::pages(range)? {
            let page = Self::page(addr)?;
            if self.mm.translate_addr(page.start_address()).is_some() {
                if !self.mapped.contains(&addr) {
                    log::warn!("{:#x} is already mapped, loading over it", addr);
                }
                continue;
            }
            self.mm.map(page).map_err(|e| {
                log::error!("failed to map {:x?}: {:?}", page, e);
                MemoryError::MapFailed(addr)
            })?;
            self.mapped.insert(addr);
            // fresh frames hold whatever was there before
            unsafe {
                core::ptr::write_bytes(
                    page.start_address().as_mut_ptr::<u8>(),
                    0,
                    PAGE_SIZE as usize,
                );
            }
        }
        Ok(())
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        let end = addr
            .checked_add(bytes.len() as u64)
            .ok_or(MemoryError::BadRange {
                start: addr,
                end: u64::MAX,
            })?;
        self.check_mapped(addr..end)?;
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
        }
        Ok(())
    }
}

/// Initialize the kernel memory management.
///
/// # Safety
///
/// This function is unsafe because the caller must guarantee that the
/// complete physical memory is mapped to virtual memory at the passed
/// `physical_memory_offset`. Also, this function must be only called once
/// to avoid aliasing `&mut` references (which is undefined behavior).
pub unsafe fn init(physical_memory_offset: VirtAddr, memory_regions: &'static MemoryRegions) {
    let level_4_table = active_level_4_table(physical_memory_offset);
    let mut page_table = OffsetPageTable::new(level_4_table, physical_memory_offset);
    let mut frame_allocator = BootInfoFrameAllocator::init(memory_regions);

    allocator::init_heap(&mut page_table, &mut frame_allocator)
        .unwrap_or_else(|e| panic!("heap init failed: {:#?}", e));

    MEMORY_MANAGER.init_once(|| MemoryManager {
        page_table: Spinlock::new(page_table),
        frame_allocator: Spinlock::new(frame_allocator),
    });
}

/// Returns a mutable reference to the active level 4 table.
///
/// # Safety
///
/// This function is unsafe because the caller must guarantee that the
/// complete physical memory is mapped to virtual memory at the passed
/// `physical_memory_offset`. Also, this function must be only called once
/// to avoid aliasing `&mut` references (which is undefined behavior).
unsafe fn active_level_4_table(physical_memory_offset: VirtAddr) -> &'static mut PageTable {
    use x86_64::registers::control::Cr3;

    let (level_4_table_frame, _) = Cr3::read();

    let phys = level_4_table_frame.start_address();
    let virt = physical_memory_offset + phys.as_u64();
    let page_table_ptr: *mut PageTable = virt.as_mut_ptr();

    &mut *page_table_ptr // unsafe
}
