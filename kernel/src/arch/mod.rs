//! Context switch primitives

use core::arch::{asm, global_asm};

use crate::env::Trapframe;

global_asm!(include_str!("sys_yield.s"));

extern "C" {
    /// Saves the caller's context and switches to the next runnable environment.
    pub fn sys_yield();
}

/// Restores `tf` and continues executing at `tf.rip`.
///
/// `rip` and `rflags` are pushed onto the target stack first, so the final `popfq; ret`
/// leaves the stack pointer at `tf.rsp`.
///
/// # Safety
///
/// `tf` must describe a valid context: its stack must be mapped and writable and no lock or
/// borrow may be held by the caller, since this function never returns to it.
pub unsafe fn pop_tf(tf: &Trapframe) -> ! {
    let mut tf = *tf;
    tf.rsp -= 8;
    (tf.rsp as *mut u64).write(tf.rip);
    tf.rsp -= 8;
    (tf.rsp as *mut u64).write(tf.rflags);

    asm!(
        "mov rsp, {tf}",
        "mov r15, [rsp]",
        "mov r14, [rsp + 8]",
        "mov r13, [rsp + 16]",
        "mov r12, [rsp + 24]",
        "mov r11, [rsp + 32]",
        "mov r10, [rsp + 40]",
        "mov r9, [rsp + 48]",
        "mov r8, [rsp + 56]",
        "mov rsi, [rsp + 64]",
        "mov rdi, [rsp + 72]",
        "mov rbp, [rsp + 80]",
        "mov rdx, [rsp + 88]",
        "mov rcx, [rsp + 96]",
        "mov rbx, [rsp + 104]",
        "mov rax, [rsp + 112]",
        "mov es, word ptr [rsp + 120]",
        "mov ds, word ptr [rsp + 128]",
        "mov rsp, [rsp + 176]",
        "popfq",
        "ret",
        tf = in(reg) &tf as *const Trapframe,
        options(noreturn),
    )
}
