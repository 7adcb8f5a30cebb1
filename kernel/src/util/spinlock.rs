use core::sync::atomic::{AtomicBool, Ordering};
use lock_api::{GuardSend, Mutex, MutexGuard, RawMutex};

pub struct RawSpinlock {
    locked: AtomicBool,
}
impl RawSpinlock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }
}

unsafe impl RawMutex for RawSpinlock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: RawSpinlock = RawSpinlock::new();

    type GuardMarker = GuardSend;

    fn lock(&self) {
        while !self.try_lock() {
            core::hint::spin_loop();
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

pub type SpinlockGuard<'a, T> = MutexGuard<'a, RawSpinlock, T>;

pub struct Spinlock<T> {
    mutex: Mutex<RawSpinlock, T>,
}

impl<T> Spinlock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            mutex: Mutex::new(data),
        }
    }

    /// Spin until the lock is free and return the underlying data as a `SpinlockGuard`.
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        self.mutex.lock()
    }

    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        self.mutex.try_lock()
    }

    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }

    /// # Safety
    ///
    /// This function is unsafe because it only should be called if the lock is held by the current
    /// context, e.g. one that is about to switch away without returning. Otherwise undefined
    /// behavior will occur.
    pub unsafe fn force_unlock(&self) {
        self.mutex.force_unlock()
    }
}

unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send> Sync for Spinlock<T> {}

impl<T: Default> Default for Spinlock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for Spinlock<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Spinlock").field("mutex", &self.mutex).finish()
    }
}
