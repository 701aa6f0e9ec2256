//! # Debug Console Output
//!
//! Emulators expose a write-only "debug console" I/O port: every byte
//! written to it shows up on the host (`-debugcon stdio` in QEMU, `port_e9_hack`
//! in Bochs). The loader has no usable console of its own while it shuffles
//! memory around, so this is where its log goes.
//!
//! ## Components
//!
//! ### Logger ([`DebugconLogger`])
//! A `log::Log` implementation printing `"[LEVEL] target: message"` lines to
//! a [`DebugPort`]. It lives in a static, needs no allocator and is installed
//! once with [`DebugconLogger::init`].
//!
//! ### Trace Macro ([`debugcon_trace!`])
//! `format!`-style output straight to the default port, bypassing the `log`
//! facade. Useful before the logger is up.
//!
//! ### Sink ([`DebugconSink`])
//! A `core::fmt::Write` adapter over a port.
//!
//! ## Feature `enabled`
//! Only with `enabled` are bytes actually written to the port; without it
//! every write is a no-op. Host builds (tests, tools) must leave it off,
//! since `out` faults in user mode.
//!
//! ## Usage
//! ```rust,no_run
//! use log::{LevelFilter, info};
//! use memdisk_debugcon::{DebugPort, DebugconLogger};
//!
//! DebugconLogger::new(DebugPort::QEMU, LevelFilter::Debug)
//!     .init()
//!     .expect("logger initialization");
//! info!("memdisk: loader up");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::{DebugconLogger, format_record};

use core::fmt::{self, Write};

/// An emulator debug-console port.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DebugPort(pub u16);

impl DebugPort {
    /// QEMU's `isa-debugcon` default.
    pub const QEMU: Self = Self(0x402);
    /// Bochs' port E9 hack; QEMU can be configured for it too.
    pub const BOCHS: Self = Self(0xE9);
}

impl Default for DebugPort {
    fn default() -> Self {
        Self::QEMU
    }
}

/// Write one byte to `port`.
#[allow(clippy::inline_always)]
#[inline(always)]
pub fn putc(port: DebugPort, c: u8) {
    #[cfg(all(feature = "enabled", any(target_arch = "x86", target_arch = "x86_64")))]
    unsafe {
        outb(port.0, c);
    }
    #[cfg(not(all(feature = "enabled", any(target_arch = "x86", target_arch = "x86_64"))))]
    let _ = (port, c);
}

#[cfg(all(feature = "enabled", any(target_arch = "x86", target_arch = "x86_64")))]
#[allow(clippy::inline_always)]
#[inline(always)]
unsafe fn outb(port: u16, val: u8) {
    unsafe {
        core::arch::asm!(
        "out dx, al",
        in("dx") port,
        in("al") val,
        options(nomem, nostack, preserves_flags)
        );
    }
}

/// `core::fmt::Write` over a debug port.
pub struct DebugconSink(pub DebugPort);

impl Write for DebugconSink {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            putc(self.0, b);
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn debugcon_write(port: DebugPort, args: fmt::Arguments) {
    // best effort, nobody to report a failure to
    let _ = fmt::write(&mut DebugconSink(port), args);
}

#[macro_export]
macro_rules! debugcon_trace {
    ($($arg:tt)*) => {{
        $crate::debugcon_write($crate::DebugPort::QEMU, core::format_args!($($arg)*));
    }};
}
