//! # MFTAH MEMDISK
//!
//! Boot-time core of a ramdisk loader that decrypts an MFTAH payload in
//! place and makes it discoverable by the operating system as an
//! NVDIMM-backed block device.
//!
//! ## Boot Sequence
//!
//! [`boot`] runs once, after the rest of the loader has copied the payload
//! into memory and reserved it in the e820 map:
//! 1. Pick the passphrase: `mftahkey=` from the command line, or the
//!    console if none was given or `mftahcli` asks for it.
//! 2. Authenticate and decrypt the payload ([`memdisk_mftah::decrypt`]).
//!    Any failure here ends the boot.
//! 3. Graft the plaintext into ACPI ([`graft()`]): an NVDIMM root SSDT if
//!    the firmware has none, and an NFIT SPA range describing the disk.
//!    Failures are reported to the operator and the boot continues, since
//!    the ramdisk is still usable through the BIOS.
//!
//! ## State
//!
//! All mutable state of the loader lives in a [`BootContext`]: physical
//! memory access, the e820 range table and the discovered ACPI tables.
//! It is created once and passed by `&mut` to every step.
//!
//! ## Logging
//!
//! Everything is logged through the `log` facade. [`init_logging`]
//! installs the debug console backend; build with the `debugcon` feature
//! to actually emit bytes on the port.
//!
//! ## Example
//! ```rust,no_run
//! use memdisk::{BootContext, BootOptions, Unattended, boot, init_logging};
//! use memdisk_e820::{MemoryRange, RangeType};
//! use memdisk_physmem::{IdentityMemory, PhysSpan};
//!
//! let mut cmdline = *b"mftahdisk mftahkey=hunter2 mftaheph";
//! let mut options = BootOptions::from_cmdline(&mut cmdline);
//! init_logging(options.log_level).expect("logger installed once");
//!
//! // SAFETY: identity-mapped real-mode environment.
//! let memory = unsafe { IdentityMemory::new(0x1_0000_0000) };
//! let map = [MemoryRange::new(0x10_0000, 0x3FF0_0000, RangeType::Usable)];
//! let mut ctx = BootContext::new(memory, &map).expect("memory map fits");
//!
//! let payload = PhysSpan::new(0x0800_0000, 0x10_0080);
//! match boot(&mut ctx, &mut Unattended, &mut options, payload) {
//!     Ok(Some(booted)) => log::info!("ramdisk at {:#x}", booted.disk.base),
//!     Ok(None) => log::info!("plain memdisk"),
//!     Err(e) => panic!("{e}"),
//! }
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod console;
pub mod graft;
pub mod options;
pub mod ssdt;

pub use console::{Console, Unattended};
pub use graft::{Graft, GraftError, Ramdisk, graft};
pub use options::{BootOptions, MAX_PASSPHRASE_LEN, Passphrase, scrub_key};

use log::{LevelFilter, SetLoggerError, debug, error, info, warn};
use memdisk_acpi::AcpiTables;
use memdisk_debugcon::{DebugPort, DebugconLogger};
use memdisk_e820::{E820Error, E820Map, MemoryRange};
use memdisk_mftah::{HEADER_LEN, MftahError, PayloadHeader};
use memdisk_physmem::{MemoryError, PhysMemory, PhysSpan};

pub const PASSPHRASE_PROMPT: &str = "Enter the MFTAH passphrase: ";
pub const CONTINUE_PROMPT: &str = "  Press any key to continue... ";

/// Process-wide loader state.
pub struct BootContext<M> {
    pub memory: M,
    pub ranges: E820Map,
    pub acpi: AcpiTables,
}

impl<M: PhysMemory> BootContext<M> {
    /// Start from the firmware-reported memory map.
    ///
    /// # Errors
    /// [`BootError::MemoryMap`] if the map does not fit the range table.
    pub fn new(memory: M, firmware_map: &[MemoryRange]) -> Result<Self, BootError> {
        let ranges = E820Map::from_firmware(firmware_map).map_err(BootError::MemoryMap)?;
        Ok(Self::with_ranges(memory, ranges))
    }

    #[must_use]
    pub const fn with_ranges(memory: M, ranges: E820Map) -> Self {
        Self {
            memory,
            ranges,
            acpi: AcpiTables::new(),
        }
    }
}

/// Failures that end the boot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootError {
    #[error("firmware memory map does not fit the range table")]
    MemoryMap(#[source] E820Error),
    #[error("no passphrase given")]
    NoPassphrase,
    #[error("payload is not accessible")]
    Payload(#[source] MemoryError),
    #[error("payload rejected: {0} (status {code})", code = .0.code())]
    Decrypt(#[from] MftahError),
    #[error("cannot continue safely")]
    Fatal(#[source] GraftError),
}

/// A decrypted and registered ramdisk.
#[derive(Debug, Copy, Clone)]
pub struct Booted {
    pub header: PayloadHeader,
    pub disk: Ramdisk,
    /// `None` if the OS will not find the disk through ACPI.
    pub graft: Option<Graft>,
}

/// Install the debug console logger at `level`.
///
/// # Errors
/// Fails if a logger is already installed.
pub fn init_logging(level: LevelFilter) -> Result<(), SetLoggerError> {
    DebugconLogger::new(DebugPort::QEMU, level).init()
}

/// Decrypt the MFTAH payload occupying `payload` and register it with ACPI.
///
/// Returns `Ok(None)` without touching anything unless `mftahdisk` was
/// given. With `mftaheph` the parsed passphrase is dropped from `options`
/// once used, whatever the outcome.
///
/// # Errors
/// See [`BootError`]. ACPI problems are only errors if the range table
/// overflowed; otherwise they are logged, the operator is asked to
/// acknowledge them and the result carries no [`Graft`].
pub fn boot<M: PhysMemory, C: Console>(
    ctx: &mut BootContext<M>,
    console: &mut C,
    options: &mut BootOptions,
    payload: PhysSpan,
) -> Result<Option<Booted>, BootError> {
    if !options.mftah_disk {
        debug!("boot: no {} option, nothing to do", options::OPTION_DISK);
        return Ok(None);
    }

    let mut typed = Passphrase::new();
    let decrypted = {
        let passphrase = match &options.key {
            Some(key) if !options.needs_prompt() => key,
            _ => {
                console.read_passphrase(PASSPHRASE_PROMPT, &mut typed);
                &typed
            }
        };
        if passphrase.is_empty() {
            Err(BootError::NoPassphrase)
        } else {
            info!("boot: decrypting payload at {payload:?}");
            ctx.memory
                .slice_mut(payload)
                .map_err(BootError::Payload)
                .and_then(|image| {
                    memdisk_mftah::decrypt(image, passphrase.as_bytes()).map_err(BootError::from)
                })
        }
    };
    typed.clear();
    if options.ephemeral && options.key.take().is_some() {
        debug!("boot: discarded the command-line passphrase");
    }

    let header = decrypted.inspect_err(|e| error!("boot: {e}"))?;
    let disk = Ramdisk {
        base: payload.base + HEADER_LEN as u64,
        length: header.payload_length,
    };

    let graft = match graft::graft(ctx, disk) {
        Ok(graft) => Some(graft),
        Err(e) if e.is_fatal() => {
            error!("boot: {e}: {:?}", core::error::Error::source(&e));
            return Err(BootError::Fatal(e));
        }
        Err(e) => {
            match core::error::Error::source(&e) {
                Some(cause) => error!("ERROR: {e}: {cause}."),
                None => error!("ERROR: {e}."),
            }
            warn!("The ramdisk might not be discoverable by the OS!");
            console.pause(CONTINUE_PROMPT);
            None
        }
    };

    Ok(Some(Booted {
        header,
        disk,
        graft,
    }))
}
