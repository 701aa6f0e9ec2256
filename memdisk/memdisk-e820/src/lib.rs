//! # E820 Range Allocator
//!
//! The BIOS reports physical memory through the INT 15h/E820 interface as a
//! list of `(start, length, type)` triples. Before the operating system
//! takes over, the ramdisk loader owns that list: every byte it claims for
//! itself (relocated ACPI tables, a freshly built NFIT, the NVDIMM root SSDT)
//! must be carved out of a usable range and re-labelled so the OS will not
//! hand it out again.
//!
//! ## Architecture
//!
//! ```text
//! Firmware E820 map
//!     ↓ from_firmware / insert_range
//! E820Map (sorted, bounded, terminated)
//!     ↓ allocate / allocate_aligned          ↓ extend_in_place
//! carved tail of the highest usable range    grown ACPI root table
//! ```
//!
//! ## Key Components
//!
//! ### Ranges ([`MemoryRange`], [`RangeType`])
//! A range is a start address, a length and one of the ACPI address range
//! types. [`RangeType::Unknown`] doubles as the terminator sentinel which
//! [`E820Map::entry`] yields one past the last active range.
//!
//! ### The Map ([`E820Map`])
//! * **Bounded**: [`MAX_RANGES`] slots including the terminator, no heap
//! * **Ordered**: every insertion re-sorts by start address
//! * **Forward-only**: ranges are shrunk, split and grown but never freed
//!
//! ## Allocation Strategy
//!
//! Allocations are served from the *top* of the highest usable range below
//! 4 GiB. Legacy firmware paths and real-mode code tend to assume low memory
//! is theirs; the upper end of conventional RAM is the least likely place
//! for anyone still running to probe. The carved tail becomes a new range of
//! the requested type directly above the shrunk usable range:
//!
//! ```text
//! before: [0x0010_0000 .. 0x0020_0000) usable
//! allocate(0x1000, Reserved)
//! after:  [0x0010_0000 .. 0x001F_F000) usable
//!         [0x001F_F000 .. 0x0020_0000) reserved   ← returned
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use memdisk_e820::{E820Map, MemoryRange, RangeType};
//!
//! let mut map = E820Map::from_firmware(&[
//!     MemoryRange::new(0x0, 0x9_FC00, RangeType::Usable),
//!     MemoryRange::new(0x10_0000, 0x10_0000, RangeType::Usable),
//! ])
//! .unwrap();
//!
//! let table = map.allocate(0x1000, RangeType::Reserved).unwrap();
//! assert_eq!(table, 0x1F_F000);
//! assert_eq!(map.entry(1).unwrap().length, 0xF_F000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod map;
mod range;

pub use map::{E820Map, Extension, MAX_RANGES};
pub use range::{MemoryRange, RangeType};

/// Highest address (exclusive) the loader hands out; RSDT entries and the
/// loader itself are 32-bit.
pub const ALLOCATION_CEILING: u64 = 0x1_0000_0000;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum E820Error {
    #[error("out of e820 range slots")]
    CapacityExhausted,
    #[error("no usable range can supply {length:#x} bytes")]
    NoMemory { length: u64 },
}
