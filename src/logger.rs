// Forwards the `log` facade onto the existing UART-backed printer. The
// kernel declared `log` as a dependency from the start but never called
// into it; every call site instead used `printf!`/`debug_log!` directly.
// This wires the facade up so new code (proc/signal) can use
// `log::info!`/`log::warn!` like any other Rust crate would, while old
// call sites keep working unchanged.

use log::{Level, Log, Metadata, Record};

use crate::printf;

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        printf!("[{}] {}\n", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Install the kernel logger as the `log` crate's global logger. Must run
/// once, early in boot, before any `log::info!`/`log::warn!`/`log::error!`
/// call; calling it twice is harmless (the second `set_logger` just fails
/// and is ignored).
pub fn init() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Info);
}
