//! Environments
//!
//! An environment is the kernel's unit of execution: a saved register context, an image loaded
//! from a raw ELF binary and a slot in the [EnvTable]. Handles ([EnvId]) carry a generation so
//! a handle to a freed and reused slot is detected instead of silently aliasing the new owner.

use core::fmt;
use thiserror_no_std::Error;

use crate::{bind::BindError, elf::loader::LoadError};

pub mod lifecycle;
pub mod table;
pub mod trapframe;

#[cfg(target_os = "none")]
pub mod runtime;

pub use table::EnvTable;
pub use trapframe::{PushRegs, SegmentSelectors, Trapframe};

/// log2 of the default table capacity.
pub const LOG2NENV: u32 = 10;
pub const NENV: usize = 1 << LOG2NENV;
/// Generation bits start above the slot index bits.
pub const ENVGENSHIFT: u32 = 12;
/// Largest capacity whose slot index fits below the generation bits.
pub const MAX_ENVS: usize = 1 << ENVGENSHIFT;

const SLOT_MASK: i32 = (1 << ENVGENSHIFT) - 1;

pub const PAGE_SIZE: u64 = crate::vm::PAGE_SIZE;
/// Top of the area holding private environment stacks in kernel-space mode.
pub const STACK_AREA_TOP: u64 = 0x200_0000;
pub const ENV_STACK_SIZE: u64 = 2 * PAGE_SIZE;
/// Stack top shared by all environments in user-space mode.
pub const USER_STACK_TOP: u64 = 0xeebf_e000;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct EnvId(i32);

impl EnvId {
    /// No parent, or "the caller" when used for lookups.
    pub const NONE: EnvId = EnvId(0);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn slot(self) -> usize {
        (self.0 & SLOT_MASK) as usize
    }

    pub const fn generation(self) -> i32 {
        self.0 >> ENVGENSHIFT
    }

    /// Identity for the next occupant of the slot after `self`.
    ///
    /// The generation advances by one and is kept positive, so new identities are never zero
    /// and never equal to the previous occupant's.
    pub fn next_generation(self, slot: usize) -> Self {
        let mut generation = self.0.wrapping_add(1 << ENVGENSHIFT) & !SLOT_MASK;
        if generation <= 0 {
            generation = 1 << ENVGENSHIFT;
        }
        Self(generation | slot as i32)
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl fmt::Debug for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnvId({:08x})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    Free,
    /// Destruction pending while the environment is still running. Nothing enters this state yet.
    Dying,
    Runnable,
    Running,
    /// Blocked. Reserved, nothing enters this state yet.
    NotRunnable,
}

impl fmt::Display for EnvStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnvStatus::Free => "FREE",
            EnvStatus::Dying => "DYING",
            EnvStatus::Runnable => "RUNNABLE",
            EnvStatus::Running => "RUNNING",
            EnvStatus::NotRunnable => "NOT_RUNNABLE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvType {
    Kernel,
    User,
}

/// Where environment stacks live and which privilege they run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// Everything shares the kernel's address space and runs with kernel selectors. Each slot
    /// owns the stack that ends at `stack_top - slot * stack_size`.
    KernelSpace { stack_top: u64, stack_size: u64 },
    /// Each environment has its own address space, so they all use the same stack top.
    UserSpace { stack_top: u64, stack_size: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvConfig {
    pub mode: AddressingMode,
    pub kernel: SegmentSelectors,
    pub user: SegmentSelectors,
}

impl EnvConfig {
    pub const fn kernel_space(kernel: SegmentSelectors) -> Self {
        Self {
            mode: AddressingMode::KernelSpace {
                stack_top: STACK_AREA_TOP,
                stack_size: ENV_STACK_SIZE,
            },
            kernel,
            user: kernel,
        }
    }

    pub const fn user_space(kernel: SegmentSelectors, user: SegmentSelectors) -> Self {
        Self {
            mode: AddressingMode::UserSpace {
                stack_top: USER_STACK_TOP,
                stack_size: ENV_STACK_SIZE,
            },
            kernel,
            user,
        }
    }
}

/// One slot of the environment table.
#[derive(Debug, Clone)]
pub struct Env {
    pub id: EnvId,
    pub parent: EnvId,
    pub status: EnvStatus,
    pub kind: EnvType,
    /// Number of times the environment was switched to.
    pub runs: u32,
    pub tf: Trapframe,
    /// The image the environment was loaded from. Kept for binding after the load.
    pub binary: Option<&'static [u8]>,
    pub(crate) link: Option<usize>,
}

impl Env {
    pub(crate) fn free(link: Option<usize>) -> Self {
        Self {
            id: EnvId::NONE,
            parent: EnvId::NONE,
            status: EnvStatus::Free,
            kind: EnvType::User,
            runs: 0,
            tf: Trapframe::default(),
            binary: None,
            link,
        }
    }
}

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("no free environment slots")]
    NoFreeSlots,
    #[error("bad environment handle {0}")]
    BadHandle(EnvId),
    #[error("environment {id} is {status}, not runnable")]
    NotRunnable { id: EnvId, status: EnvStatus },
    #[error("failed to load executable: {0}")]
    Load(#[from] LoadError),
    #[error("failed to bind symbols: {0}")]
    Bind(#[from] BindError),
}
