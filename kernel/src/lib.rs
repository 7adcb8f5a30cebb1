#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_os = "none", feature(abi_x86_interrupt))]

extern crate alloc;

pub mod bind;
pub mod elf;
pub mod env;
pub mod symbols;
pub mod util;
pub mod vm;

#[cfg(target_os = "none")]
pub mod arch;
#[cfg(target_os = "none")]
pub mod gdt;
#[cfg(target_os = "none")]
pub mod interrupts;
#[cfg(target_os = "none")]
pub mod logger;
#[cfg(target_os = "none")]
pub mod mem;
#[cfg(target_os = "none")]
pub mod programs;

#[cfg(target_os = "none")]
pub fn init() {
    gdt::init();
    interrupts::init();
}

#[cfg(target_os = "none")]
pub fn halt() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}
