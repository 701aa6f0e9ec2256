use crate::{DebugPort, DebugconSink};
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, Ordering};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

static INSTALLED: AtomicBool = AtomicBool::new(false);
static mut LOGGER: Option<DebugconLogger> = None;

/// Offered to the facade on repeated installs, which it always refuses.
static REFUSED: DebugconLogger = DebugconLogger::new(DebugPort::QEMU, LevelFilter::Off);

pub struct DebugconLogger {
    port: DebugPort,
    max_level: LevelFilter,
}

impl DebugconLogger {
    #[must_use]
    pub const fn new(port: DebugPort, max_level: LevelFilter) -> Self {
        Self { port, max_level }
    }

    /// Install the logger. Only the first call has an effect; later ones
    /// fail and leave the installed logger alone.
    #[allow(static_mut_refs, clippy::missing_errors_doc)]
    pub fn init(self) -> Result<(), SetLoggerError> {
        if INSTALLED.swap(true, Ordering::AcqRel) {
            return log::set_logger(&REFUSED);
        }

        let max_level = self.max_level;
        // SAFETY: guarded by `INSTALLED`, the static is written exactly once
        // and before it is shared with the `log` facade.
        unsafe {
            LOGGER = Some(self);
            if let Some(logger) = LOGGER.as_ref() {
                log::set_logger(logger as &'static dyn Log)?;
            }
        }
        log::set_max_level(max_level);
        Ok(())
    }
}

/// Render `record` as one `"[LEVEL] target: message"` line.
///
/// # Errors
/// Whatever `out` reports.
pub fn format_record(out: &mut impl Write, record: &Record) -> fmt::Result {
    writeln!(out, "[{}] {}: {}", record.level(), record.target(), record.args())
}

impl Log for DebugconLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = format_record(&mut DebugconSink(self.port), record);
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn records_render_as_single_lines() {
        let mut out = String::new();
        format_record(
            &mut out,
            &Record::builder()
                .level(Level::Warn)
                .target("memdisk::graft")
                .args(format_args!("NFIT at {:#010x}", 0xF_0000))
                .build(),
        )
        .unwrap();
        assert_eq!(out, "[WARN] memdisk::graft: NFIT at 0x000f0000\n");
    }

    #[test]
    fn levels_above_the_threshold_are_dropped() {
        let logger = DebugconLogger::new(DebugPort::BOCHS, LevelFilter::Info);
        let meta = |level| Metadata::builder().level(level).target("t").build();
        assert!(logger.enabled(&meta(Level::Error)));
        assert!(logger.enabled(&meta(Level::Info)));
        assert!(!logger.enabled(&meta(Level::Debug)));
    }

    #[test]
    fn second_install_is_refused() {
        DebugconLogger::new(DebugPort::BOCHS, LevelFilter::Warn)
            .init()
            .unwrap();
        assert!(
            DebugconLogger::new(DebugPort::QEMU, LevelFilter::Trace)
                .init()
                .is_err()
        );
        assert_eq!(log::max_level(), LevelFilter::Warn);
        let info = Metadata::builder().level(Level::Info).target("t").build();
        assert!(!log::logger().enabled(&info));
    }
}
