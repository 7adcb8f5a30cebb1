use log::{Log, Metadata, Record};
use uart_16550::SerialPort;

use crate::util::Spinlock;

const COM1: u16 = 0x3f8;

pub static LOGGER: LockedLogger = LockedLogger::new();

pub struct LockedLogger {
    serial: Spinlock<Serial>,
}

impl LockedLogger {
    pub const fn new() -> Self {
        LockedLogger {
            serial: Spinlock::new(Serial::new()),
        }
    }

    /// # Safety
    ///
    /// This function is unsafe because it should only be called
    /// when panicking. It forcibly unlocks the logger, so we can always print the panic message.
    pub unsafe fn force_unlock(&self) {
        self.serial.force_unlock();
    }

    pub fn init(&'static self) {
        self.serial.lock().init();
        log::set_logger(self).unwrap_or_else(|e| panic!("failed to setup logger: {}", e));
        log::set_max_level(log::LevelFilter::Trace);
    }
}

impl Log for LockedLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    #[cfg(debug_assertions)]
    fn log(&self, record: &Record) {
        match (record.file(), record.line()) {
            (Some(file), Some(line)) => crate::println!(
                "[{}\t{}:{}]\t{}",
                record.level(),
                file,
                line,
                record.args(),
            ),
            _ => crate::println!("[{}] {}", record.level(), record.args()),
        }
    }

    #[cfg(not(debug_assertions))]
    fn log(&self, record: &Record) {
        crate::println!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

pub struct Serial {
    port: SerialPort,
}

impl Serial {
    pub const fn new() -> Self {
        Self {
            port: unsafe { SerialPort::new(COM1) },
        }
    }

    fn init(&mut self) {
        self.port.init();
    }
}

impl core::fmt::Write for Serial {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for b in s.bytes() {
            self.port.send(b);
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;
    use x86_64::instructions::interrupts;

    interrupts::without_interrupts(|| {
        // a failed write to the serial port has nowhere to be reported
        let _ = LOGGER.serial.lock().write_fmt(args);
    });
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::logger::_print(format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! println {
    () => { $crate::print!("\n"); };
    ($fmt:expr) => { $crate::print!(concat!($fmt, "\n")); };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::print!(concat!($fmt, "\n"), $($arg)*);
    };
}
