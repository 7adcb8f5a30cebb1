/// General purpose registers in the order the context switch pushes and pops them.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PushRegs {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
}

/// Saved register state of an environment.
///
/// The layout is shared with the assembly in `arch`; field offsets must not change.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Trapframe {
    pub regs: PushRegs,
    pub es: u64,
    pub ds: u64,
    pub trapno: u64,
    pub err: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

pub const TF_SIZE: usize = core::mem::size_of::<Trapframe>();
pub const TF_RSP: usize = 176;

const _: () = assert!(TF_SIZE == 192);

/// Code and data selectors loaded into a fresh trapframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSelectors {
    pub code: u16,
    pub data: u16,
}

impl Trapframe {
    pub fn new(selectors: SegmentSelectors, rsp: u64) -> Self {
        let data = u64::from(selectors.data);
        Self {
            es: data,
            ds: data,
            ss: data,
            cs: u64::from(selectors.code),
            rsp,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn layout_matches_the_switch_code() {
        assert_eq!(core::mem::size_of::<PushRegs>(), 120);
        assert_eq!(offset_of!(Trapframe, es), 120);
        assert_eq!(offset_of!(Trapframe, ds), 128);
        assert_eq!(offset_of!(Trapframe, rip), 152);
        assert_eq!(offset_of!(Trapframe, rflags), 168);
        assert_eq!(offset_of!(Trapframe, rsp), TF_RSP);
        assert_eq!(offset_of!(Trapframe, ss), 184);
    }

    #[test]
    fn new_frame_only_sets_selectors_and_stack() {
        let tf = Trapframe::new(SegmentSelectors { code: 0x8, data: 0x10 }, 0x200_0000);
        assert_eq!(tf.cs, 0x8);
        assert_eq!((tf.ds, tf.es, tf.ss), (0x10, 0x10, 0x10));
        assert_eq!(tf.rsp, 0x200_0000);
        assert_eq!(tf.rip, 0);
        assert_eq!(tf.regs, PushRegs::default());
    }
}
