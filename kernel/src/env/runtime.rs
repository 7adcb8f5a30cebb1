//! The kernel's environment table and the entry points environments call into.

use conquer_once::spin::OnceCell;
use core::ffi::CStr;
use lazy_static::lazy_static;

use super::{lifecycle, EnvConfig, EnvId, EnvTable, EnvType, Trapframe, NENV};
use crate::{
    arch,
    bind::Binder,
    gdt,
    mem::KernelSpace,
    symbols::{ExportedFunction, KernelSymbol, SymbolTable},
    util::Spinlock,
};

static ENVS: OnceCell<Spinlock<EnvTable>> = OnceCell::uninit();

fn envs() -> &'static Spinlock<EnvTable> {
    ENVS.try_get()
        .unwrap_or_else(|e| panic!("environment table is unavailable: {:?}", e))
}

macro_rules! kernel_symbol {
    ($name:literal, $f:expr) => {
        KernelSymbol {
            name: $name,
            address: $f as usize as u64,
            file: file!(),
            line: line!(),
        }
    };
}

lazy_static! {
    static ref EXPORTS: [ExportedFunction; 2] = [
        ExportedFunction {
            name: "sys_yield",
            address: arch::sys_yield as usize as u64,
        },
        ExportedFunction {
            name: "sys_exit",
            address: sys_exit as usize as u64,
        },
    ];
    static ref KERNEL_SYMBOLS: [KernelSymbol; 5] = [
        kernel_symbol!("cputs", cputs),
        kernel_symbol!("sys_getenvid", sys_getenvid),
        kernel_symbol!("sys_yield", arch::sys_yield),
        kernel_symbol!("sys_exit", sys_exit),
        kernel_symbol!("csys_yield", csys_yield),
    ];
}

/// Functions of the running kernel, by name and by address.
pub fn kernel_symbols() -> SymbolTable<'static> {
    SymbolTable::new(&*KERNEL_SYMBOLS)
}

pub fn init() {
    let (kernel, _) = gdt::selectors();
    ENVS.init_once(|| Spinlock::new(EnvTable::new(NENV, EnvConfig::kernel_space(kernel))));
    log::info!("environment table ready, {} slots", NENV);
}

/// Creates an environment from an image built into the kernel.
///
/// Such images are trusted, so any failure is a kernel bug.
pub fn create(binary: &'static [u8], kind: EnvType) -> EnvId {
    let symbols = kernel_symbols();
    let binder = Binder::new(&*EXPORTS, &symbols);
    let mut space = KernelSpace::new();
    lifecycle::create(&mut envs().lock(), &mut space, &binder, binary, kind)
        .unwrap_or_else(|e| panic!("env_create: {}", e))
}

/// Switches to `id`.
pub fn run(id: EnvId) -> ! {
    let tf = envs()
        .lock()
        .switch_to(id)
        .unwrap_or_else(|e| panic!("env_run: {}", e));
    unsafe { arch::pop_tf(&tf) }
}

/// Frees `id` and gives the CPU to whoever is next.
pub fn destroy(id: EnvId) -> ! {
    envs()
        .lock()
        .free(id)
        .unwrap_or_else(|e| panic!("env_destroy: {}", e));
    yield_now()
}

/// Runs the next runnable environment, halting once there is none left.
pub fn yield_now() -> ! {
    let next = envs().lock().next_runnable();
    match next {
        Some(id) => run(id),
        None => {
            log::info!("no runnable environments left");
            crate::halt()
        }
    }
}

/// The running environment, [EnvId::NONE] for the kernel.
///
/// Never blocks, so it is safe to call from exception handlers.
pub fn current_id() -> EnvId {
    ENVS.get()
        .and_then(|envs| envs.try_lock())
        .map_or(EnvId::NONE, |envs| envs.current_id())
}

#[no_mangle]
extern "C" fn csys_yield(tf: *const Trapframe) -> ! {
    let tf = unsafe { tf.read() };
    envs()
        .lock()
        .save_current(&tf)
        .unwrap_or_else(|e| panic!("sys_yield: {}", e));
    yield_now()
}

pub extern "C" fn sys_exit() -> ! {
    destroy(EnvId::NONE)
}

pub extern "C" fn cputs(s: *const u8) {
    if s.is_null() {
        return;
    }
    let s = unsafe { CStr::from_ptr(s.cast()) };
    crate::print!("{}", s.to_str().unwrap_or("<invalid utf-8>"));
}

pub extern "C" fn sys_getenvid() -> i32 {
    current_id().as_raw()
}
