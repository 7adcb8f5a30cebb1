#![cfg_attr(target_os = "none", no_std, no_main)]

#[cfg(target_os = "none")]
mod kernel {
    use bootloader_api::{config::Mapping, entry_point, BootInfo, BootloaderConfig};
    use kspace_kernel::{
        env::{runtime, EnvType},
        logger, mem, programs,
    };
    use x86_64::VirtAddr;

    pub static BOOTLOADER_CONFIG: BootloaderConfig = {
        let mut config = BootloaderConfig::new_default();
        config.mappings.physical_memory = Some(Mapping::Dynamic);
        config
    };

    entry_point!(main, config = &BOOTLOADER_CONFIG);

    fn main(boot_info: &'static mut BootInfo) -> ! {
        logger::LOGGER.init();
        log::info!(
            "kspace kernel built {} ({}, {})",
            env!("BUILD_DATE"),
            env!("BUILD_TARGET"),
            env!("PROFILE")
        );
        log::debug!("{}, {}", env!("RUSTC_VERSION"), env!("CARGO_VERSION"));

        let physical_memory_offset = boot_info
            .physical_memory_offset
            .into_option()
            .map(VirtAddr::new)
            .unwrap_or_else(|| panic!("bootloader did not map physical memory"));
        log::trace!("physical_memory_offset: {:#x}", physical_memory_offset);
        unsafe { mem::init(physical_memory_offset, &boot_info.memory_regions) };

        kspace_kernel::init();
        runtime::init();

        for &(name, binary) in programs::PROGRAMS {
            let id = runtime::create(binary, EnvType::Kernel);
            log::info!("created env {} from {}", id, name);
        }
        log::debug!(
            "{} frames in use after loading",
            mem::get_memory_manager().used_frames()
        );

        runtime::yield_now()
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        unsafe { logger::LOGGER.force_unlock() };
        log::error!("{}", info);
        x86_64::instructions::interrupts::disable();
        kspace_kernel::halt();
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("the kspace kernel only runs on x86_64-unknown-none");
}
