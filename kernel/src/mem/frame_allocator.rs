use bootloader_api::info::{MemoryRegionKind, MemoryRegions};
use core::ops::Range;
use x86_64::{
    structures::paging::{FrameAllocator, PhysFrame, Size4KiB},
    PhysAddr,
};

const MAX_USABLE_REGIONS: usize = 64;

/// Hands out the usable frames of the boot memory map in order. Frames are never returned.
pub struct BootInfoFrameAllocator {
    usable: heapless::Vec<Range<u64>, MAX_USABLE_REGIONS>,
    next: usize,
}

impl BootInfoFrameAllocator {
    /// Create a FrameAllocator from the passed memory map.
    ///
    /// # Safety
    ///
    /// This function is unsafe because the caller must guarantee that the passed
    /// memory map is valid. The main requirement is that all frames that are marked
    /// as `USABLE` in it are really unused.
    pub unsafe fn init(memory_regions: &MemoryRegions) -> Self {
        let mut usable = heapless::Vec::new();
        for region in memory_regions
            .iter()
            .filter(|r| r.kind == MemoryRegionKind::Usable)
        {
            if usable.push(region.start..region.end).is_err() {
                log::warn!("too many usable memory regions, ignoring {:#x?}", region);
            }
        }
        BootInfoFrameAllocator { usable, next: 0 }
    }

    /// Returns an iterator over the usable frames specified in the memory map.
    fn usable_frames(&self) -> impl Iterator<Item = PhysFrame> + '_ {
        self.usable
            .iter()
            .flat_map(|r| r.clone().step_by(4096))
            .map(|addr| PhysFrame::containing_address(PhysAddr::new(addr)))
    }

    pub fn used_frame_count(&self) -> usize {
        self.next
    }
}

unsafe impl FrameAllocator<Size4KiB> for BootInfoFrameAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame> {
        let frame = self.usable_frames().nth(self.next);
        self.next += 1;

        #[cfg(feature = "dbg-mem")]
        log::trace!("allocated frame: {:x?}, count so far: {}", frame, self.next);

        frame
    }
}
