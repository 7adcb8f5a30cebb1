use alloc::vec::Vec;
use core::ops::Range;

use super::{
    AddressingMode, Env, EnvConfig, EnvError, EnvId, EnvStatus, EnvType, Trapframe, MAX_ENVS,
};

/// Fixed-capacity table of environments with an intrusive free list.
///
/// The free list starts out in table order, so a fresh table hands out slots `0, 1, 2, ...`.
/// Freed slots are pushed on the front and reused first.
#[derive(Debug)]
pub struct EnvTable {
    envs: Vec<Env>,
    free_head: Option<usize>,
    current: Option<usize>,
    config: EnvConfig,
}

impl EnvTable {
    /// Creates a table where every slot is free.
    ///
    /// Panics if `capacity` is not a power of two up to [MAX_ENVS], or if the kernel-space stack
    /// area can't hold one stack per slot.
    pub fn new(capacity: usize, config: EnvConfig) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity <= MAX_ENVS,
            "invalid environment table capacity: {}",
            capacity
        );
        if let AddressingMode::KernelSpace {
            stack_top,
            stack_size,
        } = config.mode
        {
            let lowest = (capacity as u64 - 1)
                .checked_mul(stack_size)
                .and_then(|below| stack_top.checked_sub(below))
                .and_then(|top| top.checked_sub(stack_size));
            assert!(
                lowest.is_some(),
                "stack area below {:#x} can't hold {} stacks of {:#x} bytes",
                stack_top,
                capacity,
                stack_size
            );
        }

        let envs = (0..capacity)
            .map(|i| Env::free((i + 1 < capacity).then_some(i + 1)))
            .collect();

        Self {
            envs,
            free_head: Some(0),
            current: None,
            config,
        }
    }

    pub fn capacity(&self) -> usize {
        self.envs.len()
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// The running environment, if there is one.
    pub fn current(&self) -> Option<&Env> {
        self.current
            .map(|i| &self.envs[i])
            .filter(|e| e.status == EnvStatus::Running)
    }

    /// Identity of the caller. The kernel itself is [EnvId::NONE].
    pub fn current_id(&self) -> EnvId {
        self.current().map_or(EnvId::NONE, |e| e.id)
    }

    /// All environments that are not free.
    pub fn iter(&self) -> impl Iterator<Item = &Env> {
        self.envs.iter().filter(|e| e.status != EnvStatus::Free)
    }

    pub fn free_count(&self) -> usize {
        let mut count = 0;
        let mut next = self.free_head;
        while let Some(i) = next {
            count += 1;
            next = self.envs[i].link;
        }
        count
    }

    pub fn alloc(&mut self, parent: EnvId, kind: EnvType) -> Result<&mut Env, EnvError> {
        let index = self.free_head.ok_or(EnvError::NoFreeSlots)?;

        let (kind, selectors, rsp) = match self.config.mode {
            AddressingMode::KernelSpace {
                stack_top,
                stack_size,
            } => (
                EnvType::Kernel,
                self.config.kernel,
                stack_top - index as u64 * stack_size,
            ),
            AddressingMode::UserSpace { stack_top, .. } => {
                let selectors = match kind {
                    EnvType::Kernel => self.config.kernel,
                    EnvType::User => self.config.user,
                };
                (kind, selectors, stack_top)
            }
        };

        #[cfg(feature = "dbg-env")]
        let caller = self.current_id();

        let env = &mut self.envs[index];
        self.free_head = env.link.take();

        env.id = env.id.next_generation(index);
        env.parent = parent;
        env.status = EnvStatus::Runnable;
        env.kind = kind;
        env.runs = 0;
        env.tf = Trapframe::new(selectors, rsp);
        env.binary = None;

        #[cfg(feature = "dbg-env")]
        log::debug!("[{}] new env {}", caller, env.id);

        Ok(env)
    }

    /// Slot named by `id`. `EnvId::NONE` is the caller, `None` when that is the kernel.
    fn resolve(&self, id: EnvId, check_perm: bool) -> Result<Option<usize>, EnvError> {
        if id.is_none() {
            return Ok(self
                .current
                .filter(|&i| self.envs[i].status == EnvStatus::Running));
        }

        let index = id.slot();
        let env = self.envs.get(index).ok_or(EnvError::BadHandle(id))?;
        if env.status == EnvStatus::Free || env.id != id {
            return Err(EnvError::BadHandle(id));
        }

        if check_perm {
            let caller = self.current_id();
            if env.id != caller && env.parent != caller {
                return Err(EnvError::BadHandle(id));
            }
        }
        Ok(Some(index))
    }

    /// Like `resolve`, for operations that need an environment and not the kernel.
    fn resolve_env(&self, id: EnvId) -> Result<usize, EnvError> {
        self.resolve(id, false)?.ok_or(EnvError::BadHandle(id))
    }

    /// Looks up a live environment. `EnvId::NONE` names the caller and never fails; it gives
    /// `None` when the caller is the kernel.
    ///
    /// With `check_perm`, only the caller itself and its direct children are accessible.
    pub fn get(&self, id: EnvId, check_perm: bool) -> Result<Option<&Env>, EnvError> {
        Ok(self.resolve(id, check_perm)?.map(|i| &self.envs[i]))
    }

    pub fn get_mut(&mut self, id: EnvId, check_perm: bool) -> Result<Option<&mut Env>, EnvError> {
        Ok(self.resolve(id, check_perm)?.map(|i| &mut self.envs[i]))
    }

    /// Returns the slot to the free list. Any handle to it becomes stale.
    pub fn free(&mut self, id: EnvId) -> Result<(), EnvError> {
        let index = self.resolve_env(id)?;

        #[cfg(feature = "dbg-env")]
        log::debug!("[{}] free env {}", self.current_id(), self.envs[index].id);

        let env = &mut self.envs[index];
        env.status = EnvStatus::Free;
        env.binary = None;
        env.link = self.free_head;
        self.free_head = Some(index);
        Ok(())
    }

    /// Stack memory reserved for an environment.
    pub fn stack_region(&self, id: EnvId) -> Result<Range<u64>, EnvError> {
        let index = self.resolve_env(id)?;
        let top = match self.config.mode {
            AddressingMode::KernelSpace {
                stack_top,
                stack_size,
            } => stack_top - index as u64 * stack_size,
            AddressingMode::UserSpace { stack_top, .. } => stack_top,
        };
        let size = match self.config.mode {
            AddressingMode::KernelSpace { stack_size, .. }
            | AddressingMode::UserSpace { stack_size, .. } => stack_size,
        };
        Ok(top - size..top)
    }

    /// Makes `id` the running environment and returns the context to restore.
    ///
    /// A previously running environment goes back to runnable. Free environments are passed
    /// over, they were destroyed while running.
    pub fn switch_to(&mut self, id: EnvId) -> Result<Trapframe, EnvError> {
        let index = self.resolve_env(id)?;
        let target = &self.envs[index];
        match target.status {
            EnvStatus::Runnable => {}
            EnvStatus::Running if self.current == Some(index) => {}
            status => {
                return Err(EnvError::NotRunnable {
                    id: target.id,
                    status,
                })
            }
        }

        if let Some(previous) = self.current.filter(|&i| i != index) {
            let previous = &mut self.envs[previous];
            match previous.status {
                EnvStatus::Running => previous.status = EnvStatus::Runnable,
                EnvStatus::Dying => unimplemented!("destroying a running environment"),
                _ => {}
            }
        }

        let env = &mut self.envs[index];

        #[cfg(feature = "dbg-env")]
        log::trace!("env {}: {} -> {}", env.id, env.status, EnvStatus::Running);

        env.status = EnvStatus::Running;
        env.runs = env.runs.wrapping_add(1);
        self.current = Some(index);
        Ok(env.tf)
    }

    /// Stores the context the running environment was interrupted with.
    pub fn save_current(&mut self, tf: &Trapframe) -> Result<(), EnvError> {
        let index = self.resolve_env(EnvId::NONE)?;
        self.envs[index].tf = *tf;
        Ok(())
    }

    /// Round-robin choice of the environment to run next.
    ///
    /// Looks at the slots after the current one first and wraps around. Falls back to the
    /// current environment if nothing else is runnable and it is still running.
    pub fn next_runnable(&self) -> Option<EnvId> {
        let count = self.envs.len();
        let start = self.current.map_or(0, |i| i + 1);
        (0..count)
            .map(|i| (start + i) % count)
            .map(|i| &self.envs[i])
            .find(|e| e.status == EnvStatus::Runnable)
            .or_else(|| self.current())
            .map(|e| e.id)
    }
}
