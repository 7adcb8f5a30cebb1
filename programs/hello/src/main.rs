//! A program for the kspace kernel.
//!
//! It is not linked against the kernel. Instead the kernel fills in the function pointers
//! below when it loads the image: every global uninitialized pointer whose name matches a
//! kernel function gets that function's address, the rest stay null.

#![no_std]
#![no_main]

use core::ptr::{addr_of, read_volatile};

#[allow(non_upper_case_globals)]
#[no_mangle]
static mut sys_yield: Option<extern "C" fn()> = None;

#[allow(non_upper_case_globals)]
#[no_mangle]
static mut sys_exit: Option<extern "C" fn() -> !> = None;

#[allow(non_upper_case_globals)]
#[no_mangle]
static mut sys_getenvid: Option<extern "C" fn() -> i32> = None;

#[allow(non_upper_case_globals)]
#[no_mangle]
static mut cputs: Option<extern "C" fn(*const u8)> = None;

const ROUNDS: usize = 3;

fn puts(s: &[u8]) {
    if let Some(f) = unsafe { read_volatile(addr_of!(cputs)) } {
        f(s.as_ptr());
    }
}

/// Prints `id` as eight hex digits.
fn put_id(id: i32) {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut buf = [0u8; 9];
    for (i, b) in buf[..8].iter_mut().enumerate() {
        *b = DIGITS[((id as u32) >> (28 - 4 * i) & 0xf) as usize];
    }
    puts(&buf);
}

fn yield_now() {
    if let Some(f) = unsafe { read_volatile(addr_of!(sys_yield)) } {
        f();
    }
}

fn exit() -> ! {
    match unsafe { read_volatile(addr_of!(sys_exit)) } {
        Some(f) => f(),
        None => loop {
            core::hint::spin_loop();
        },
    }
}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    let id = unsafe { read_volatile(addr_of!(sys_getenvid)) }.map_or(0, |f| f());
    for _ in 0..ROUNDS {
        puts(b"[\0");
        put_id(id);
        puts(b"] hello from kernel space\n\0");
        yield_now();
    }
    exit()
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    puts(b"hello: panicked\n\0");
    exit()
}
