use x86_64::structures::idt::{InterruptStackFrame, PageFaultErrorCode};

use crate::{env::runtime, symbols::SymbolResolver};

/// Names the running environment and the kernel function containing `rip`, if any.
fn report_location(rip: u64) {
    log::error!("current env: {}", runtime::current_id());
    match runtime::kernel_symbols().resolve_address(rip) {
        Some(info) => log::error!(
            "rip {:#x} is in {}+{:#x} ({}:{})",
            rip,
            info.function,
            rip - info.function_address,
            info.file,
            info.line
        ),
        None => log::error!("rip {:#x} is outside of known kernel functions", rip),
    }
}

pub extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::warn!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

pub extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    let accessed = Cr2::read();
    let rip = stack_frame.instruction_pointer.as_u64();

    log::error!("EXCEPTION: PAGE FAULT");
    log::error!("Accessed Address: {:?}", accessed);
    log::error!("Error Code: {:?}", error_code);
    if rip == 0 || accessed.as_u64() == 0 {
        log::error!("called through a kernel function pointer that was never bound");
    }
    report_location(rip);
    log::trace!("{:#?}", stack_frame);
    panic!("Unhandled page fault");
}

pub extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    report_location(stack_frame.instruction_pointer.as_u64());
    panic!(
        "EXCEPTION: GENERAL PROTECTION FAULT\nerror code: {}, {:#?}",
        error_code, stack_frame
    );
}

pub extern "x86-interrupt" fn stack_segment_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    panic!(
        "EXCEPTION: STACK SEGMENT FAULT\nerror code: {}, {:#?}",
        error_code, stack_frame
    );
}

pub extern "x86-interrupt" fn segment_not_present_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    panic!(
        "EXCEPTION: SEGMENT NOT PRESENT\nerror code: {}, {:#?}",
        error_code, stack_frame
    );
}

pub extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    panic!(
        "EXCEPTION: DIVIDE ERROR

{:#?}",
        stack_frame
    );
}

pub extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    report_location(stack_frame.instruction_pointer.as_u64());
    panic!(
        "EXCEPTION: INVALID OPCODE

{:#?}",
        stack_frame
    );
}

pub extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    panic!(
        "EXCEPTION: DOUBLE FAULT\nerror code: {}, {:#?}",
        error_code, stack_frame
    );
}
