//! Console backend for the `log` facade.
//!
//! Step traces (`debug` and `trace` records) go to stdout prefixed with
//! `[DEBUG]` so they interleave with guest output. Everything else goes to
//! stderr. Tracing can be switched on and off while the machine runs.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

static TRACING: AtomicBool = AtomicBool::new(false);
static LOGGER: ConsoleLogger = ConsoleLogger;

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info || TRACING.load(Ordering::Relaxed)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Debug | Level::Trace => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "[DEBUG] {}", record.args());
            }
            level => {
                let mut err = std::io::stderr().lock();
                let _ = writeln!(err, "[{}] {}", level, record.args());
            }
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Install the console logger.
///
/// `trace` enables step tracing from the start. Calling this twice is
/// harmless; the first logger stays installed.
pub fn init(trace: bool) {
    set_tracing(trace);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}

/// Turn step tracing on or off.
pub fn set_tracing(on: bool) {
    TRACING.store(on, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_toggle() {
        init(false);
        assert!(!LOGGER.enabled(&Metadata::builder().level(Level::Debug).build()));
        assert!(LOGGER.enabled(&Metadata::builder().level(Level::Warn).build()));

        set_tracing(true);
        assert!(LOGGER.enabled(&Metadata::builder().level(Level::Debug).build()));
        set_tracing(false);
    }
}
