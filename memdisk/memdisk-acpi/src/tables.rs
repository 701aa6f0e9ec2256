//! # ACPI Table Engine
//!
//! Discovery, relocation and insertion over the live firmware tables.

use crate::root::{Placement, RootKind, RootTable, XSDT_STAGING_SLOTS};
use crate::rsdp::RootPointer;
use crate::sdt::{self, HEADER_LEN, SdtHeader};
use crate::{AcpiError, Signature, fadt, nfit};
use arrayvec::ArrayVec;
use log::{Level, debug, info, log_enabled, trace, warn};
use memdisk_e820::{E820Map, Extension, MemoryRange, RangeType};
use memdisk_physmem::{HexDump, PhysMemory, PhysSpan};

/// `_HID` of the NVDIMM root device.
pub const NVDIMM_ROOT_HID: &[u8; 8] = b"ACPI0012";

/// Bytes reserved past the XSDT's declared end.
pub const XSDT_STAGING_LEN: usize = XSDT_STAGING_SLOTS * 8;

/// Stray tables handled per scanned region.
const MAX_STRAY_TABLES: usize = 32;

/// Progress of discovery. [`AcpiTables::parse`] runs every step; callers
/// driving the steps themselves see each intermediate state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DiscoveryState {
    SearchingRsdp,
    /// [`AcpiTables::locate_rsdp`] succeeded.
    HaveRsdp,
    /// At least one [`AcpiTables::parse_root_table`] call was made.
    ParsingRootTables,
    /// [`AcpiTables::select_root`] found a usable root table.
    HaveRootTable,
    /// [`AcpiTables::parse`] completed.
    Done,
    Failed,
}

/// What [`AcpiTables::classify_header`] made of a table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TableKind {
    Nfit,
    /// An SSDT or PSDT declaring the NVDIMM root device.
    NvdimmRoot,
    Ssdt,
    Other(Signature),
}

/// Who points at a table that may be relocated.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryRef {
    /// A pointer slot inside a root table.
    Slot { root: RootKind, slot: u64 },
    /// A table found by scanning memory; no slot owns it directly.
    Detached(u64),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Relocation {
    /// The table does not lie in the claimed region.
    Unchanged,
    Moved { from: u64, to: u64 },
}

/// The loader's view of the firmware ACPI tables.
#[derive(Clone, Debug)]
pub struct AcpiTables {
    state: DiscoveryState,
    rsdp: Option<RootPointer>,
    rsdt: RootTable,
    xsdt: RootTable,
    nfit: Option<u64>,
    nvdimm_root: Option<u64>,
}

impl Default for AcpiTables {
    fn default() -> Self {
        Self::new()
    }
}

impl AcpiTables {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: DiscoveryState::SearchingRsdp,
            rsdp: None,
            rsdt: RootTable::new(RootKind::Rsdt),
            xsdt: RootTable::new(RootKind::Xsdt),
            nfit: None,
            nvdimm_root: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> DiscoveryState {
        self.state
    }

    #[must_use]
    pub const fn is_parsed(&self) -> bool {
        matches!(
            self.state,
            DiscoveryState::HaveRootTable | DiscoveryState::Done
        )
    }

    #[must_use]
    pub const fn rsdp(&self) -> Option<&RootPointer> {
        self.rsdp.as_ref()
    }

    #[must_use]
    pub const fn root(&self, kind: RootKind) -> &RootTable {
        match kind {
            RootKind::Rsdt => &self.rsdt,
            RootKind::Xsdt => &self.xsdt,
        }
    }

    const fn root_mut(&mut self, kind: RootKind) -> &mut RootTable {
        match kind {
            RootKind::Rsdt => &mut self.rsdt,
            RootKind::Xsdt => &mut self.xsdt,
        }
    }

    /// The root table insertions go to: the XSDT when valid, else the RSDT.
    #[must_use]
    pub const fn primary(&self) -> Option<RootKind> {
        if self.xsdt.valid {
            Some(RootKind::Xsdt)
        } else if self.rsdt.valid {
            Some(RootKind::Rsdt)
        } else {
            None
        }
    }

    /// Address of the NFIT, if one is listed.
    #[must_use]
    pub const fn nfit(&self) -> Option<u64> {
        self.nfit
    }

    /// Address of the SSDT/PSDT declaring the NVDIMM root device, if any.
    #[must_use]
    pub const fn nvdimm_root(&self) -> Option<u64> {
        self.nvdimm_root
    }

    /// Run discovery unless it already completed.
    ///
    /// # Errors
    /// See [`AcpiTables::parse`].
    pub fn ensure_parsed(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
    ) -> Result<(), AcpiError> {
        if self.is_parsed() {
            return Ok(());
        }
        self.parse(mem, ranges)
    }

    /// Locate the RSDP, walk the RSDT and the XSDT and move tables out of
    /// the XSDT's staging area.
    ///
    /// # Errors
    /// * [`AcpiError::RsdpNotFound`] or [`AcpiError::IncompatibleRevision`]
    ///   if there is no usable root pointer.
    /// * [`AcpiError::TableNotFound`] if neither root table is valid.
    /// * [`AcpiError::OutOfMemory`] or [`AcpiError::RangeTable`] if a
    ///   colliding table could not be moved.
    pub fn parse(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
    ) -> Result<(), AcpiError> {
        *self = Self::new();
        let result = self.discover(mem, ranges);
        if let Err(e) = &result {
            warn!("acpi: discovery failed: {e}");
            self.state = DiscoveryState::Failed;
        }
        result
    }

    fn discover(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
    ) -> Result<(), AcpiError> {
        self.locate_rsdp(mem)?;
        for kind in [RootKind::Rsdt, RootKind::Xsdt] {
            match self.parse_root_table(mem, ranges, kind) {
                Ok(count) => info!("acpi: {kind} ok; parsed {count} entries"),
                Err(e) if e.aborts_insertion() => return Err(e),
                Err(e) => warn!("acpi: {kind} unusable: {e}"),
            }
        }
        self.select_root()?;
        self.state = DiscoveryState::Done;
        Ok(())
    }

    /// Scan for the root pointer and remember it.
    ///
    /// # Errors
    /// [`AcpiError::RsdpNotFound`] or [`AcpiError::IncompatibleRevision`].
    pub fn locate_rsdp(&mut self, mem: &impl PhysMemory) -> Result<RootPointer, AcpiError> {
        let rsdp = RootPointer::find(mem)?;
        info!(
            "acpi: RSDP at {:#010x}, revision {}",
            rsdp.address, rsdp.revision
        );
        self.rsdp = Some(rsdp);
        self.state = DiscoveryState::HaveRsdp;
        Ok(rsdp)
    }

    /// Pick the root table insertions go to.
    ///
    /// # Errors
    /// [`AcpiError::TableNotFound`] if no root table was parsed successfully.
    pub fn select_root(&mut self) -> Result<RootKind, AcpiError> {
        let primary = self
            .primary()
            .ok_or(AcpiError::TableNotFound(Signature::XSDT))?;
        if primary == RootKind::Rsdt {
            warn!("acpi: no usable XSDT, falling back to the RSDT");
        }
        self.state = DiscoveryState::HaveRootTable;
        Ok(primary)
    }

    /// Validate one root table and record its entries.
    ///
    /// For the XSDT, the bytes past its declared end are reserved as a
    /// staging area for appended entries: every table found there, whether
    /// through a root entry or by signature, is relocated first. If that
    /// area holds the RSDP or usable memory, nothing is claimed and appends
    /// fail with [`AcpiError::NoStagingSpace`].
    ///
    /// # Errors
    /// * [`AcpiError::TableNotFound`] if the RSDP does not point at a table
    ///   of the expected signature.
    /// * [`AcpiError::OutOfMemory`] if a colliding table could not be moved.
    pub fn parse_root_table(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
        kind: RootKind,
    ) -> Result<usize, AcpiError> {
        let rsdp = self.rsdp.ok_or(AcpiError::NotParsed)?;
        self.state = DiscoveryState::ParsingRootTables;
        let address = match kind {
            RootKind::Rsdt => rsdp.rsdt_address,
            RootKind::Xsdt => rsdp.xsdt_address,
        };

        self.root_mut(kind).forget();
        if address == 0 {
            return Err(AcpiError::TableNotFound(kind.signature()));
        }
        let header = SdtHeader::read(mem, address)?;
        if header.signature() != kind.signature() {
            return Err(AcpiError::TableNotFound(kind.signature()));
        }
        let span = sdt::table_span(mem, address, HEADER_LEN)?;
        if !sdt::verify(mem, address)? {
            warn!("acpi: {kind} at {address:#010x} has a bad checksum");
        }

        let declared_end = address + span.len as u64;
        let pad = PhysSpan::new(declared_end, XSDT_STAGING_LEN);
        let claimed = match kind {
            RootKind::Xsdt if staging_available(mem, ranges, &rsdp, pad) => Some(PhysSpan::new(
                address + HEADER_LEN as u64,
                span.len - HEADER_LEN + XSDT_STAGING_LEN,
            )),
            RootKind::Xsdt | RootKind::Rsdt => None,
        };

        let root = self.root_mut(kind);
        root.address = address;
        root.valid = true;
        root.staging_end = claimed.and_then(|c| c.end());

        let result = self.walk_root_table(mem, ranges, kind, claimed, declared_end);
        if result.is_err() {
            self.root_mut(kind).forget();
        }
        result
    }

    fn walk_root_table(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
        kind: RootKind,
        claimed: Option<PhysSpan>,
        declared_end: u64,
    ) -> Result<usize, AcpiError> {
        let slots = self.root(kind).slots(mem)?;
        for slot in slots {
            if let Some(claimed) = claimed {
                self.relocate_table(mem, ranges, EntryRef::Slot { root: kind, slot }, claimed)?;
            }
            let target = self.root(kind).read_slot(mem, slot)?;
            if target != 0 {
                self.track(mem, kind, target);
            }
        }

        if let Some(claimed) = claimed {
            let pad = PhysSpan::new(declared_end, XSDT_STAGING_LEN);
            for moved in self.clear_stray_tables(mem, ranges, pad, claimed)? {
                self.track(mem, kind, moved);
            }
        }

        Ok(self.root(kind).entries.len())
    }

    fn track(&mut self, mem: &impl PhysMemory, kind: RootKind, target: u64) {
        match self.classify_header(mem, target) {
            Ok(class) => trace!("acpi: {kind} entry {target:#010x} is {class:?}"),
            Err(e) => debug!("acpi: cannot classify {target:#010x}: {e}"),
        }
        self.root_mut(kind).record(target);
    }

    /// Identify the table at `address` and remember the ones the loader
    /// cares about. SSDT and PSDT bodies are searched for the NVDIMM root
    /// device's hardware ID.
    ///
    /// # Errors
    /// Fails if the table is not mapped or its length is implausible.
    pub fn classify_header(
        &mut self,
        mem: &impl PhysMemory,
        address: u64,
    ) -> Result<TableKind, AcpiError> {
        let signature = Signature(mem.read_array(address)?);
        if signature == Signature::NFIT {
            self.nfit = Some(address);
            return Ok(TableKind::Nfit);
        }
        if !signature.is_secondary() {
            return Ok(TableKind::Other(signature));
        }

        let span = sdt::table_span(mem, address, HEADER_LEN)?;
        let body = mem.slice(PhysSpan::new(
            address + HEADER_LEN as u64,
            span.len - HEADER_LEN,
        ))?;
        if body.windows(NVDIMM_ROOT_HID.len()).any(|w| w == NVDIMM_ROOT_HID) {
            debug!("acpi: {signature} at {address:#010x} declares the NVDIMM root device");
            self.nvdimm_root = Some(address);
            return Ok(TableKind::NvdimmRoot);
        }
        Ok(TableKind::Ssdt)
    }

    /// Move the table referenced by `entry` out of `region` if its address
    /// lies strictly inside it.
    ///
    /// The copy lands in freshly allocated reserved memory, the original
    /// bytes are zeroed, and every reference to the old address is updated:
    /// the owning slot, all RSDT/XSDT slots, the RSDP (for root tables), the
    /// FADT's FACS/DSDT pointers and the tracked NFIT/NVDIMM root.
    ///
    /// # Errors
    /// * [`AcpiError::OutOfMemory`] if no usable range can take the copy.
    /// * [`AcpiError::RangeTable`] if the range table is full.
    /// * [`AcpiError::Truncated`] if the table's length is implausible.
    pub fn relocate_table(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
        entry: EntryRef,
        region: PhysSpan,
    ) -> Result<Relocation, AcpiError> {
        let from = match entry {
            EntryRef::Slot { root, slot } => self.root(root).read_slot(mem, slot)?,
            EntryRef::Detached(address) => address,
        };
        let end = region.end().unwrap_or(u64::MAX);
        if from <= region.base || from >= end {
            return Ok(Relocation::Unchanged);
        }

        let span = sdt::table_span(mem, from, 8)?;
        let signature = Signature(mem.read_array(from)?);
        let is_xsdt = self.xsdt.valid && from == self.xsdt.address;
        let staging = if is_xsdt { XSDT_STAGING_LEN } else { 0 };
        let align = if signature == Signature::FACS { 64 } else { 16 };

        let to = ranges
            .allocate_aligned((span.len + staging) as u64, align, RangeType::Reserved)?;

        info!(
            "acpi: relocating {signature} ({:#010x} -> {to:#010x} : {})",
            from, span.len
        );
        mem.copy(from, to, span.len)?;
        mem.fill(span, 0)?;
        if staging > 0 {
            mem.fill(PhysSpan::new(to + span.len as u64, staging), 0)?;
            self.xsdt.staging_end = Some(to + (span.len + staging) as u64);
        }

        if let EntryRef::Slot { root, slot } = entry {
            self.root(root).write_slot(mem, slot, to)?;
            sdt::checksum(mem, self.root(root).address)?;
        }
        self.redirect(mem, from, to)?;
        Ok(Relocation::Moved { from, to })
    }

    /// Update every known reference to a table that moved.
    fn redirect(&mut self, mem: &mut impl PhysMemory, from: u64, to: u64) -> Result<(), AcpiError> {
        if let Some(rsdp) = self.rsdp.as_mut() {
            if rsdp.rsdt_address == from {
                rsdp.set_rsdt_address(mem, to)?;
                if self.rsdt.valid {
                    self.rsdt.address = to;
                }
            }
            if rsdp.xsdt_address == from {
                rsdp.set_xsdt_address(mem, to)?;
                if self.xsdt.valid {
                    self.xsdt.address = to;
                }
            }
        }

        for kind in [RootKind::Xsdt, RootKind::Rsdt] {
            if !self.root(kind).valid {
                continue;
            }
            if self.root_mut(kind).rewrite(mem, from, to)? > 0 {
                sdt::checksum(mem, self.root(kind).address)?;
            }
        }

        for fadt in self.fadt_addresses(mem)? {
            match fadt::rewrite_references(mem, fadt, from, to) {
                Ok(true) => debug!("acpi: FADT at {fadt:#010x} now refers to {to:#010x}"),
                Ok(false) => {}
                Err(e) => warn!("acpi: cannot update FADT at {fadt:#010x}: {e}"),
            }
        }

        if self.nfit == Some(from) {
            self.nfit = Some(to);
        }
        if self.nvdimm_root == Some(from) {
            self.nvdimm_root = Some(to);
        }
        Ok(())
    }

    fn fadt_addresses(&self, mem: &impl PhysMemory) -> Result<ArrayVec<u64, 2>, AcpiError> {
        let mut out = ArrayVec::new();
        for kind in [RootKind::Xsdt, RootKind::Rsdt] {
            let root = self.root(kind);
            if !root.valid {
                continue;
            }
            if let Some(slot) = root.find_slot(mem, Signature::FADT)? {
                let fadt = root.read_slot(mem, slot)?;
                if !out.contains(&fadt) {
                    out.push(fadt);
                }
            }
        }
        Ok(out)
    }

    /// Relocate every recognisable table starting inside `region`. Returns
    /// how many tables moved.
    ///
    /// # Errors
    /// See [`AcpiTables::relocate_table`].
    pub fn clear_region(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
        region: PhysSpan,
    ) -> Result<usize, AcpiError> {
        // relocation only moves tables strictly past the region's first byte
        let claimed = PhysSpan::new(region.base.saturating_sub(1), region.len + 1);
        Ok(self.clear_stray_tables(mem, ranges, region, claimed)?.len())
    }

    /// Locate signatures in `scan` first, then relocate them against
    /// `claimed`; relocating never feeds back into the scan.
    fn clear_stray_tables(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
        scan: PhysSpan,
        claimed: PhysSpan,
    ) -> Result<ArrayVec<u64, MAX_STRAY_TABLES>, AcpiError> {
        let hits = scan_signatures(mem, scan);
        let mut moved = ArrayVec::new();
        for from in hits {
            if let Relocation::Moved { to, .. } =
                self.relocate_table(mem, ranges, EntryRef::Detached(from), claimed)?
            {
                moved.push(to);
            }
        }
        Ok(moved)
    }

    /// Recompute the checksum of the table at `address`.
    ///
    /// # Errors
    /// Fails if the table is not mapped or its length is implausible.
    pub fn checksum(&self, mem: &mut impl PhysMemory, address: u64) -> Result<u8, AcpiError> {
        sdt::checksum(mem, address)
    }

    /// Link the table at `address` into the primary root table.
    ///
    /// SSDT, PSDT and NFIT tables are always appended. Any other table
    /// replaces the first entry with the same signature, or is appended if
    /// there is none. Replacements are mirrored into the RSDT. Checksums of
    /// the new table and the root table are recomputed and the new table is
    /// classified.
    ///
    /// # Errors
    /// * [`AcpiError::NotParsed`] before successful discovery.
    /// * [`AcpiError::NoStagingSpace`] if appending would leave the staging area.
    pub fn insert_table(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
        address: u64,
    ) -> Result<Placement, AcpiError> {
        if !self.is_parsed() {
            return Err(AcpiError::NotParsed);
        }
        let primary = self.primary().ok_or(AcpiError::NotParsed)?;
        let signature = SdtHeader::read(mem, address)?.signature();
        sdt::checksum(mem, address)?;

        let key = (!signature.is_multi_instance()).then_some(signature);
        match key {
            Some(_) => info!("acpi: inserting new table with signature '{signature}'"),
            None => info!("acpi: adding table with signature '{signature}'"),
        }

        let placement = self
            .root_mut(primary)
            .replace_or_append(mem, ranges, key, address)?;
        if !self.root(primary).entries.contains(&address) {
            self.root_mut(primary).record(address);
        }
        sdt::checksum(mem, self.root(primary).address)?;

        if primary == RootKind::Xsdt && self.rsdt.valid {
            self.mirror_into_rsdt(mem, placement, signature, address)?;
        }

        self.classify_header(mem, address)?;
        Ok(placement)
    }

    fn mirror_into_rsdt(
        &mut self,
        mem: &mut impl PhysMemory,
        placement: Placement,
        signature: Signature,
        address: u64,
    ) -> Result<(), AcpiError> {
        let Placement::Replaced { previous, .. } = placement else {
            debug!("acpi: '{signature}' is only listed in the XSDT");
            return Ok(());
        };
        if u32::try_from(address).is_err() {
            warn!("acpi: '{signature}' at {address:#x} cannot be listed in the RSDT");
            return Ok(());
        }
        if self.rsdt.rewrite(mem, previous, address)? > 0 {
            sdt::checksum(mem, self.rsdt.address)?;
        }
        Ok(())
    }

    /// Append one sub-structure to the tracked NFIT in place, moving
    /// whatever table follows it out of the way first.
    ///
    /// # Errors
    /// * [`AcpiError::NotParsed`] if no NFIT is tracked.
    /// * [`AcpiError::Blocked`] if the grown NFIT would spill into the next
    ///   memory range.
    /// * See [`AcpiTables::relocate_table`].
    pub fn extend_nfit(
        &mut self,
        mem: &mut impl PhysMemory,
        ranges: &mut E820Map,
        structure: &[u8],
    ) -> Result<u32, AcpiError> {
        let address = self.nfit.ok_or(AcpiError::NotParsed)?;
        let span = sdt::table_span(mem, address, nfit::NFIT_HEADER_LEN)?;
        let grown = (span.len + structure.len()) as u64;

        match ranges.extend_in_place(address, grown) {
            Extension::Blocked { shortfall } => {
                return Err(AcpiError::Blocked { address, shortfall });
            }
            Extension::NotTracked => {
                debug!("acpi: NFIT at {address:#010x} is not in the e820 map");
            }
            Extension::AlreadyCovered | Extension::Extended { .. } => {}
        }

        let tail = PhysSpan::new(address + span.len as u64, structure.len());
        let moved = self.clear_region(mem, ranges, tail)?;
        if moved > 0 {
            debug!("acpi: moved {moved} table(s) out of the NFIT's way");
        }
        nfit::append_structure(mem, address, structure)
    }

    /// Log the root pointer, both root tables and every primary entry.
    pub fn dump(&self, mem: &impl PhysMemory) {
        if let Some(rsdp) = &self.rsdp {
            info!(
                "acpi: RSDP [{:#010x} : rev {}]",
                rsdp.address, rsdp.revision
            );
        }
        for kind in [RootKind::Rsdt, RootKind::Xsdt] {
            let root = self.root(kind);
            let length = root.length(mem).unwrap_or(0);
            let note = if self.primary() == Some(kind) {
                ""
            } else {
                " (disregarded)"
            };
            info!("acpi: {kind}  [{:#010x} : {length:#06x}]{note}", root.address);
        }

        let Some(primary) = self.primary() else {
            info!("acpi: no root table captured");
            return;
        };
        let root = self.root(primary);
        if let Ok(slots) = root.slots(mem) {
            for slot in slots {
                let Ok(target) = root.read_slot(mem, slot) else {
                    continue;
                };
                if target == 0 {
                    continue;
                }
                match SdtHeader::read(mem, target) {
                    Ok(h) => info!(
                        "acpi: {}  [{target:#010x} : {:#06x}]",
                        h.signature(),
                        h.length()
                    ),
                    Err(e) => info!("acpi: ????  [{target:#010x}] {e}"),
                }
            }
        }

        if log_enabled!(Level::Trace)
            && let Ok(length) = root.length(mem)
            && let Ok(bytes) = mem.slice(PhysSpan::new(root.address, length as usize))
        {
            trace!("acpi: {primary}\n{}", HexDump::new(root.address, bytes));
        }
    }
}

/// Whether `pad`, the bytes past the XSDT's declared end, may be taken
/// over for appended entries. The root pointer cannot move, and free memory
/// would be handed out by the allocator.
fn staging_available(
    mem: &impl PhysMemory,
    ranges: &E820Map,
    rsdp: &RootPointer,
    pad: PhysSpan,
) -> bool {
    let claimed = MemoryRange::new(pad.base, pad.len as u64, RangeType::Reserved);
    let anchor = MemoryRange::new(
        rsdp.address,
        u64::from(rsdp.length.max(36)),
        RangeType::Reserved,
    );
    if !mem.is_mapped(pad) {
        warn!("acpi: no room past the XSDT, appending is disabled");
        false
    } else if claimed.overlaps(&anchor) {
        warn!(
            "acpi: RSDP at {:#010x} lies past the XSDT, appending is disabled",
            rsdp.address
        );
        false
    } else if let Some(free) = ranges
        .iter()
        .find(|r| r.is_usable() && r.overlaps(&claimed))
    {
        warn!(
            "acpi: usable memory at {:#010x} lies past the XSDT, appending is disabled",
            free.start
        );
        false
    } else {
        true
    }
}

/// Addresses inside `scan` that start with a known signature and a
/// plausible length. A hit skips the scan past the table it found.
fn scan_signatures(
    mem: &impl PhysMemory,
    scan: PhysSpan,
) -> ArrayVec<u64, MAX_STRAY_TABLES> {
    let mut hits = ArrayVec::new();
    let Some(end) = scan.end() else {
        return hits;
    };

    let mut address = scan.base;
    while address < end {
        let Ok(first) = mem.read_u8(address) else {
            address += 1;
            continue;
        };
        if !first.is_ascii_uppercase() {
            address += 1;
            continue;
        }
        let Ok(raw) = mem.read_array::<4>(address) else {
            address += 1;
            continue;
        };
        let signature = Signature(raw);
        // the root pointer is never moved
        if !signature.is_known() || signature == *b"RSD " {
            address += 1;
            continue;
        }
        let Ok(span) = sdt::table_span(mem, address, 8) else {
            address += 1;
            continue;
        };
        if hits.try_push(address).is_err() {
            warn!("acpi: too many tables in {scan:?}, ignoring the rest");
            break;
        }
        debug!("acpi: found stray {signature} at {address:#010x}");
        address += span.len as u64;
    }
    hits
}
