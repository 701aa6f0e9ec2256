//! # ACPI Table Engine
//!
//! Discovers the firmware's ACPI tables in the legacy BIOS window, keeps a
//! staging area free behind the XSDT, and links new tables (the NFIT and
//! the NVDIMM root SSDT that expose a RAM disk) into the root tables.
//!
//! ## Key Components
//!
//! ### Root Pointer ([`RootPointer`])
//! Found by a 16-byte-stride scan of `0xE0000..0x100000`. Only revision 2
//! and later is accepted because the loader relies on the XSDT.
//!
//! ### Root Tables ([`RootTable`])
//! The RSDT (32-bit entries) and the XSDT (64-bit entries) are aliased in
//! place. When both are valid the XSDT is authoritative and the RSDT only
//! mirrors replacements.
//!
//! ### The Engine ([`AcpiTables`])
//! * **Discovery** walks both root tables and classifies every entry,
//!   remembering the NFIT and any SSDT that declares `ACPI0012`.
//! * **Relocation** moves any table living in the XSDT's staging area
//!   (sixteen 8-byte slots past its declared end) into fresh reserved
//!   memory taken from the e820 map, zeroes the original and rewrites every
//!   pointer to it: root slots, the RSDP and the FADT's FACS/DSDT fields.
//! * **Insertion** overrides an existing entry with the same signature or
//!   appends into the staging area. SSDT, PSDT and NFIT tables are always
//!   appended. Checksums are recomputed after every change.
//!
//! ### NFIT Layout ([`nfit`])
//! Header, SPA range structures and the range-type GUIDs, plus helpers to
//! build a table from scratch or grow an existing one.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut tables = AcpiTables::new();
//! tables.parse(&mut mem, &mut ranges)?;
//! let placement = tables.insert_table(&mut mem, &mut ranges, nfit_address)?;
//! tables.dump(&mem);
//! ```
//!
//! ## Errors
//! Every operation returns [`AcpiError`]. Failing to move a table out of
//! the way ([`AcpiError::OutOfMemory`], [`AcpiError::RangeTable`]) aborts
//! the whole parse or insert, see [`AcpiError::aborts_insertion`].
//!
//! ## Fixtures
//! With the `fixtures` feature, [`fixtures::FirmwareBuilder`] lays out a
//! synthetic BIOS image (RSDP, root tables, FADT/FACS/DSDT, SSDTs) in a
//! [`memdisk_physmem::BufferMemory`] for host-side tests.

#![cfg_attr(not(any(test, doctest, feature = "fixtures")), no_std)]
#![allow(unsafe_code)]

pub mod fadt;
pub mod nfit;
mod root;
mod rsdp;
mod sdt;
mod signature;
mod tables;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

#[cfg(test)]
mod tests;

pub use root::{MAX_ROOT_ENTRIES, Placement, RootKind, RootTable, Slots, XSDT_STAGING_SLOTS};
pub use rsdp::{RSDP_WINDOW, RootPointer};
pub use sdt::{CHECKSUM_OFFSET, HEADER_LEN, LENGTH_OFFSET, SdtHeader, checksum, table_span, verify};
pub use signature::{KNOWN, Signature};
pub use tables::{
    AcpiTables, DiscoveryState, EntryRef, NVDIMM_ROOT_HID, Relocation, TableKind,
    XSDT_STAGING_LEN,
};

use memdisk_e820::E820Error;
use memdisk_physmem::MemoryError;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AcpiError {
    #[error("no RSDP in the BIOS area")]
    RsdpNotFound,
    #[error("RSDP revision {0} is not supported, need 2 or later")]
    IncompatibleRevision(u8),
    #[error("no valid {0} table")]
    TableNotFound(Signature),
    #[error("the ACPI tables have not been parsed")]
    NotParsed,
    #[error("invalid table address {0:#x}")]
    InvalidAddress(u64),
    #[error("table at {address:#x} claims an implausible length of {length} bytes")]
    Truncated { address: u64, length: usize },
    #[error("no memory to relocate a table of {length} bytes")]
    OutOfMemory { length: u64 },
    #[error("range table: {0}")]
    RangeTable(#[source] E820Error),
    #[error("no staging space left in the {0}")]
    NoStagingSpace(RootKind),
    #[error("table at {address:#x} cannot grow, {shortfall:#x} bytes run into the next memory range")]
    Blocked { address: u64, shortfall: u64 },
    #[error("address {0:#x} does not fit a 32-bit table pointer")]
    AddressTooWide(u64),
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl AcpiError {
    /// Whether the failure left a table in the way of the operation, so
    /// the parse or insert must stop rather than continue degraded.
    #[must_use]
    pub const fn aborts_insertion(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::RangeTable(_))
    }

    /// Whether the range table itself ran out of slots, which leaves no
    /// safe way to continue booting.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::RangeTable(E820Error::CapacityExhausted))
    }
}

impl From<E820Error> for AcpiError {
    fn from(e: E820Error) -> Self {
        match e {
            E820Error::NoMemory { length } => Self::OutOfMemory { length },
            E820Error::CapacityExhausted => Self::RangeTable(e),
        }
    }
}
