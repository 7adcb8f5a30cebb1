use super::{EnvError, EnvId, EnvTable, EnvType};
use crate::{
    bind::Binder,
    elf::loader::{load_icode, LoadError},
    vm::AddressSpace,
};

/// Allocates an environment for `binary`, loads it into `space` and binds its kernel pointers.
///
/// The new environment is runnable and has no parent. On failure its slot is freed again.
pub fn create(
    envs: &mut EnvTable,
    space: &mut impl AddressSpace,
    binder: &Binder,
    binary: &'static [u8],
    kind: EnvType,
) -> Result<EnvId, EnvError> {
    let id = envs.alloc(EnvId::NONE, kind)?.id;

    if let Err(e) = load_and_bind(envs, space, binder, binary, id) {
        envs.free(id)?;
        return Err(e);
    }
    Ok(id)
}

fn load_and_bind(
    envs: &mut EnvTable,
    space: &mut impl AddressSpace,
    binder: &Binder,
    binary: &'static [u8],
    id: EnvId,
) -> Result<(), EnvError> {
    let stack = envs.stack_region(id)?;
    space.map(stack).map_err(LoadError::from)?;

    let env = envs.get_mut(id, false)?.ok_or(EnvError::BadHandle(id))?;
    load_icode(env, binary, space)?;
    let report = binder.bind(binary, space)?;

    log::debug!(
        "env {}: entry {:#x}, {} symbols bound, {} unresolved {:?}",
        id,
        env.tf.rip,
        report.bound,
        report.unresolved,
        report.unresolved_names
    );
    Ok(())
}
