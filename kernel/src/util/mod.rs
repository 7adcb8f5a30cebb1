//! Utitilies, structures used by the kernel

pub mod spinlock;

pub use spinlock::Spinlock;
