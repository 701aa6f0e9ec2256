//! # RSDT/XSDT (Root/Extended System Description Table)
//!
//! Both root tables are an [`SdtHeader`](crate::SdtHeader) followed by a
//! packed array of table pointers; they only differ in the pointer width.
//! [`RootTable`] aliases the firmware's table in place and never copies it.

use crate::sdt::{HEADER_LEN, LENGTH_OFFSET, SdtHeader};
use crate::{AcpiError, Signature};
use arrayvec::ArrayVec;
use core::fmt;
use log::{debug, warn};
use memdisk_e820::{E820Map, Extension};
use memdisk_physmem::PhysMemory;

/// Upper bound of entries tracked per root table.
pub const MAX_ROOT_ENTRIES: usize = 255;

/// Pointer slots reserved past the XSDT's declared end for appended entries.
pub const XSDT_STAGING_SLOTS: usize = 16;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RootKind {
    Rsdt,
    Xsdt,
}

impl RootKind {
    #[must_use]
    pub const fn signature(self) -> Signature {
        match self {
            Self::Rsdt => Signature::RSDT,
            Self::Xsdt => Signature::XSDT,
        }
    }

    /// Width of one entry in bytes.
    #[must_use]
    pub const fn entry_width(self) -> usize {
        match self {
            Self::Rsdt => 4,
            Self::Xsdt => 8,
        }
    }

    /// The other root table.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Rsdt => Self::Xsdt,
            Self::Xsdt => Self::Rsdt,
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.signature(), f)
    }
}

/// Where [`RootTable::replace_or_append`] put the new pointer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Placement {
    /// An existing slot pointing at `previous` was overwritten.
    Replaced { slot: u64, previous: u64 },
    /// A new slot was added at the end of the table.
    Appended { slot: u64 },
}

impl Placement {
    #[must_use]
    pub const fn slot(&self) -> u64 {
        match *self {
            Self::Replaced { slot, .. } | Self::Appended { slot } => slot,
        }
    }
}

/// Slot addresses of a root table, detached from the memory they live in.
#[derive(Clone, Debug)]
pub struct Slots {
    next: u64,
    end: u64,
    width: u64,
}

impl Iterator for Slots {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next >= self.end {
            return None;
        }
        let slot = self.next;
        self.next += self.width;
        Some(slot)
    }
}

/// One root table as found in firmware memory.
#[derive(Clone, Debug)]
pub struct RootTable {
    pub(crate) kind: RootKind,
    pub(crate) address: u64,
    pub(crate) valid: bool,
    pub(crate) entries: ArrayVec<u64, MAX_ROOT_ENTRIES>,
    /// Exclusive end of the space this table may grow into.
    pub(crate) staging_end: Option<u64>,
}

impl RootTable {
    #[must_use]
    pub const fn new(kind: RootKind) -> Self {
        Self {
            kind,
            address: 0,
            valid: false,
            entries: ArrayVec::new_const(),
            staging_end: None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> RootKind {
        self.kind
    }

    #[must_use]
    pub const fn address(&self) -> u64 {
        self.address
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Tables recorded while walking this root table and inserting into it.
    #[must_use]
    pub fn entries(&self) -> &[u64] {
        &self.entries
    }

    #[must_use]
    pub const fn staging_end(&self) -> Option<u64> {
        self.staging_end
    }

    /// Remember a table; entries beyond [`MAX_ROOT_ENTRIES`] are dropped.
    pub(crate) fn record(&mut self, address: u64) {
        if self.entries.try_push(address).is_err() {
            debug!("acpi: {} entry list full, not tracking {address:#x}", self.kind);
        }
    }

    pub(crate) fn forget(&mut self) {
        self.valid = false;
        self.address = 0;
        self.entries.clear();
        self.staging_end = None;
    }

    /// Declared length in bytes, header included.
    ///
    /// # Errors
    /// Fails if the table is not mapped.
    pub fn length(&self, mem: &impl PhysMemory) -> Result<u32, AcpiError> {
        Ok(mem.read_u32(self.address + LENGTH_OFFSET)?)
    }

    /// Addresses of the pointer slots within the declared length.
    ///
    /// # Errors
    /// Fails if the table is not mapped.
    pub fn slots(&self, mem: &impl PhysMemory) -> Result<Slots, AcpiError> {
        let width = self.kind.entry_width() as u64;
        let length = u64::from(self.length(mem)?);
        let next = self.address + HEADER_LEN as u64;
        let count = length.saturating_sub(HEADER_LEN as u64) / width;
        Ok(Slots {
            next,
            end: next + count * width,
            width,
        })
    }

    /// Read the pointer stored in `slot`.
    ///
    /// # Errors
    /// Fails if the slot is not mapped.
    pub fn read_slot(&self, mem: &impl PhysMemory, slot: u64) -> Result<u64, AcpiError> {
        Ok(match self.kind {
            RootKind::Rsdt => u64::from(mem.read_u32(slot)?),
            RootKind::Xsdt => mem.read_u64(slot)?,
        })
    }

    /// Store `target` in `slot`.
    ///
    /// # Errors
    /// [`AcpiError::AddressTooWide`] for RSDT slots and targets above 4 GiB.
    pub fn write_slot(
        &self,
        mem: &mut impl PhysMemory,
        slot: u64,
        target: u64,
    ) -> Result<(), AcpiError> {
        match self.kind {
            RootKind::Rsdt => {
                let narrow =
                    u32::try_from(target).map_err(|_| AcpiError::AddressTooWide(target))?;
                mem.write_u32(slot, narrow)?;
            }
            RootKind::Xsdt => mem.write_u64(slot, target)?,
        }
        Ok(())
    }

    /// First slot whose target carries `signature`.
    ///
    /// # Errors
    /// Fails if the table itself is not mapped; unreadable targets are skipped.
    pub fn find_slot(
        &self,
        mem: &impl PhysMemory,
        signature: Signature,
    ) -> Result<Option<u64>, AcpiError> {
        for slot in self.slots(mem)? {
            let target = self.read_slot(mem, slot)?;
            if target == 0 {
                continue;
            }
            if let Ok(sig) = mem.read_array::<4>(target)
                && signature == sig
            {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// Rewrite every slot holding `old` to hold `new`. Returns the number of
    /// rewritten slots. The checksum is left to the caller.
    ///
    /// # Errors
    /// [`AcpiError::AddressTooWide`] if `new` does not fit an RSDT slot.
    pub fn rewrite(
        &mut self,
        mem: &mut impl PhysMemory,
        old: u64,
        new: u64,
    ) -> Result<usize, AcpiError> {
        let mut count = 0;
        for slot in self.slots(mem)? {
            if self.read_slot(mem, slot)? == old {
                self.write_slot(mem, slot, new)?;
                count += 1;
            }
        }
        for entry in &mut self.entries {
            if *entry == old {
                *entry = new;
            }
        }
        Ok(count)
    }

    /// Point the first slot whose target carries `signature` at `address`,
    /// or add a new slot if there is none (or `signature` is `None`).
    ///
    /// Appending writes past the declared end, grows the declared length by
    /// one entry and asks the range allocator to cover the grown table. The
    /// caller recomputes the checksum.
    ///
    /// # Errors
    /// * [`AcpiError::NoStagingSpace`] if appending would leave the staging area.
    /// * [`AcpiError::AddressTooWide`] for RSDT entries above 4 GiB.
    pub fn replace_or_append(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
        signature: Option<Signature>,
        address: u64,
    ) -> Result<Placement, AcpiError> {
        if let Some(signature) = signature
            && let Some(slot) = self.find_slot(mem, signature)?
        {
            let previous = self.read_slot(mem, slot)?;
            self.write_slot(mem, slot, address)?;
            for entry in &mut self.entries {
                if *entry == previous {
                    *entry = address;
                }
            }
            debug!(
                "acpi: {} slot {slot:#x} now points at {address:#x} (was {previous:#x})",
                self.kind
            );
            return Ok(Placement::Replaced { slot, previous });
        }

        self.append(mem, ranges, address)
    }

    fn append(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
        address: u64,
    ) -> Result<Placement, AcpiError> {
        let width = self.kind.entry_width();
        let length = self.length(mem)?;
        let slot = self.address + u64::from(length);
        let limit = self.staging_end.ok_or(AcpiError::NoStagingSpace(self.kind))?;
        if slot + width as u64 > limit {
            return Err(AcpiError::NoStagingSpace(self.kind));
        }

        self.write_slot(mem, slot, address)?;
        let grown = length + width as u32;
        mem.write_u32(self.address + LENGTH_OFFSET, grown)?;

        match ranges.extend_in_place(self.address, u64::from(grown)) {
            Extension::Blocked { shortfall } => warn!(
                "acpi: {} grew {shortfall:#x} bytes past its memory range",
                self.kind
            ),
            Extension::NotTracked => {
                debug!("acpi: {} at {:#x} is not in the e820 map", self.kind, self.address);
            }
            Extension::AlreadyCovered | Extension::Extended { .. } => {}
        }

        debug!("acpi: appended {address:#x} to {} at slot {slot:#x}", self.kind);
        Ok(Placement::Appended { slot })
    }

    /// Read the table header.
    ///
    /// # Errors
    /// Fails if the header is not mapped.
    pub fn header(&self, mem: &impl PhysMemory) -> Result<SdtHeader, AcpiError> {
        SdtHeader::read(mem, self.address)
    }
}
