//! # NFIT (NVDIMM Firmware Interface Table)
//!
//! The NFIT is a description header, four reserved bytes and a list of
//! type/length prefixed sub-structures. The loader only produces and reads
//! System Physical Address (SPA) range structures.

use crate::sdt::{HEADER_LEN, LENGTH_OFFSET, SdtHeader, checksum, table_span};
use crate::{AcpiError, Signature};
use core::fmt;
use memdisk_physmem::PhysMemory;

/// Header plus the reserved dword preceding the first sub-structure.
pub const NFIT_HEADER_LEN: usize = HEADER_LEN + 4;

/// Size of an SPA range structure without the optional location cookie.
pub const SPA_LEN: usize = 56;

/// Sub-structure type of an SPA range.
pub const SPA_TYPE: u16 = 0;

/// Revision of the NFIT layout produced here.
pub const NFIT_REVISION: u8 = 1;

/// Mixed-endian GUID as laid out in ACPI structures.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    /// Byte-addressable persistent memory.
    pub const PERSISTENT_MEMORY: Self = Self::new(
        0x66F0_D379,
        0xB4F3,
        0x4074,
        [0xAC, 0x43, 0x0D, 0x33, 0x18, 0xB7, 0x8C, 0xDB],
    );
    pub const NVDIMM_CONTROL_REGION: Self = Self::new(
        0x92F7_01F6,
        0x13B4,
        0x405D,
        [0x91, 0x0B, 0x29, 0x93, 0x67, 0xE8, 0x23, 0x4C],
    );
    pub const NVDIMM_BLOCK_DATA_WINDOW: Self = Self::new(
        0x91AF_0530,
        0x5D86,
        0x470E,
        [0xA6, 0xB0, 0x0A, 0x2D, 0xB9, 0x40, 0x82, 0x49],
    );
    /// RAM disk backed by volatile memory, exposed as a disk.
    pub const VIRTUAL_DISK: Self = Self::new(
        0x77AB_535A,
        0x45FC,
        0x624B,
        [0x55, 0x60, 0xF7, 0xB2, 0x81, 0xD1, 0xF9, 0x6E],
    );
    /// RAM disk backed by volatile memory, exposed as a CD.
    pub const VIRTUAL_CD: Self = Self::new(
        0x3D5A_BD30,
        0x4175,
        0x87CE,
        [0x6D, 0x64, 0xD2, 0xAD, 0xE5, 0x23, 0xC4, 0xBB],
    );
    pub const PERSISTENT_VIRTUAL_DISK: Self = Self::new(
        0x5CEA_02C9,
        0x4D07,
        0x69D3,
        [0x26, 0x9F, 0x44, 0x96, 0xFB, 0xE0, 0x96, 0xF9],
    );
    pub const PERSISTENT_VIRTUAL_CD: Self = Self::new(
        0x0801_8188,
        0x42CD,
        0xBB48,
        [0x10, 0x0F, 0x53, 0x87, 0xD5, 0x3D, 0xED, 0x3D],
    );

    #[must_use]
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&bytes[8..16]);
        Self {
            data1: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data2: u16::from_le_bytes([bytes[4], bytes[5]]),
            data3: u16::from_le_bytes([bytes[6], bytes[7]]),
            data4,
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

/// SPA range structure flags.
///
/// Layout (LSB→MSB):
/// - bit 0: control region is for hot-swap
/// - bit 1: proximity domain field is valid
/// - bit 2: location cookie field is valid
/// - bits 3..15: reserved
#[bitfield_struct::bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct SpaFlags {
    #[bits(1)]
    pub control_for_hotswap: bool,
    #[bits(1)]
    pub proximity_domain_valid: bool,
    #[bits(1)]
    pub location_cookie_valid: bool,
    #[bits(13)]
    __: u16,
}

/// System Physical Address range structure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SpaRange {
    /// Non-zero index referenced by other NFIT structures.
    pub index: u16,
    pub flags: SpaFlags,
    pub proximity_domain: u32,
    pub range_type: Guid,
    pub base: u64,
    pub length: u64,
    /// UEFI memory mapping attributes.
    pub attributes: u64,
}

impl SpaRange {
    /// A range of `range_type` with no proximity domain and no cookie.
    #[must_use]
    pub const fn new(index: u16, range_type: Guid, base: u64, length: u64) -> Self {
        Self {
            index,
            flags: SpaFlags::new(),
            proximity_domain: 0,
            range_type,
            base,
            length,
            attributes: 0,
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bytes(&self) -> [u8; SPA_LEN] {
        let mut out = [0u8; SPA_LEN];
        out[0..2].copy_from_slice(&SPA_TYPE.to_le_bytes());
        out[2..4].copy_from_slice(&(SPA_LEN as u16).to_le_bytes());
        out[4..6].copy_from_slice(&self.index.to_le_bytes());
        out[6..8].copy_from_slice(&self.flags.into_bits().to_le_bytes());
        out[12..16].copy_from_slice(&self.proximity_domain.to_le_bytes());
        out[16..32].copy_from_slice(&self.range_type.to_bytes());
        out[32..40].copy_from_slice(&self.base.to_le_bytes());
        out[40..48].copy_from_slice(&self.length.to_le_bytes());
        out[48..56].copy_from_slice(&self.attributes.to_le_bytes());
        out
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8; SPA_LEN]) -> Self {
        let u16_at = |o: usize| u16::from_le_bytes([bytes[o], bytes[o + 1]]);
        let u32_at = |o: usize| {
            u32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]])
        };
        let u64_at = |o: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[o..o + 8]);
            u64::from_le_bytes(b)
        };
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&bytes[16..32]);

        Self {
            index: u16_at(4),
            flags: SpaFlags::from_bits(u16_at(6)),
            proximity_domain: u32_at(12),
            range_type: Guid::from_bytes(&guid),
            base: u64_at(32),
            length: u64_at(40),
            attributes: u64_at(48),
        }
    }
}

/// OEM and creator fields of a table built by the loader.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableIdentity {
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: [u8; 4],
    pub creator_revision: u32,
}

impl TableIdentity {
    /// Header for a table of `signature` carrying these identifiers.
    #[must_use]
    pub const fn header(&self, signature: Signature, length: u32, revision: u8) -> SdtHeader {
        let mut header = SdtHeader::new(signature, length, revision);
        header.oem_id = self.oem_id;
        header.oem_table_id = self.oem_table_id;
        header.oem_revision = self.oem_revision;
        header.creator_id = self.creator_id;
        header.creator_revision = self.creator_revision;
        header
    }
}

/// Write a complete NFIT holding a single SPA range at `address`.
/// Returns the table length.
///
/// # Errors
/// Fails if the target memory is not mapped.
#[allow(clippy::cast_possible_truncation)]
pub fn write_table(
    mem: &mut impl PhysMemory,
    address: u64,
    identity: &TableIdentity,
    spa: &SpaRange,
) -> Result<u32, AcpiError> {
    let length = (NFIT_HEADER_LEN + SPA_LEN) as u32;
    let header = identity.header(Signature::NFIT, length, NFIT_REVISION);
    mem.write_bytes(address, &header.to_bytes())?;
    mem.write_u32(address + HEADER_LEN as u64, 0)?;
    mem.write_bytes(address + NFIT_HEADER_LEN as u64, &spa.to_bytes())?;
    checksum(mem, address)?;
    Ok(length)
}

/// One sub-structure of an NFIT.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Structure {
    pub address: u64,
    pub kind: u16,
    pub length: u16,
}

/// Walk the sub-structures of the NFIT at `nfit`. A structure shorter
/// than its own type/length prefix ends the walk.
///
/// # Errors
/// Fails if the NFIT is truncated or unmapped.
pub fn structures<M: PhysMemory>(
    mem: &M,
    nfit: u64,
) -> Result<impl Iterator<Item = Structure> + '_, AcpiError> {
    let span = table_span(mem, nfit, NFIT_HEADER_LEN)?;
    let end = nfit + span.len as u64;
    let mut cursor = nfit + NFIT_HEADER_LEN as u64;
    Ok(core::iter::from_fn(move || {
        if cursor + 4 > end {
            return None;
        }
        let kind = mem.read_u16(cursor).ok()?;
        let length = mem.read_u16(cursor + 2).ok()?;
        if length < 4 || cursor + u64::from(length) > end {
            return None;
        }
        let structure = Structure {
            address: cursor,
            kind,
            length,
        };
        cursor += u64::from(length);
        Some(structure)
    }))
}

/// The SPA ranges of the NFIT at `nfit`.
///
/// # Errors
/// See [`structures`].
pub fn spa_ranges<M: PhysMemory>(
    mem: &M,
    nfit: u64,
) -> Result<impl Iterator<Item = SpaRange> + '_, AcpiError> {
    Ok(structures(mem, nfit)?
        .filter(|s| s.kind == SPA_TYPE && usize::from(s.length) >= SPA_LEN)
        .filter_map(move |s| mem.read_array::<SPA_LEN>(s.address).ok())
        .map(|bytes| SpaRange::from_bytes(&bytes)))
}

/// Smallest SPA index not yet used by the NFIT at `nfit`. Index 0 is
/// reserved, so an NFIT without SPA ranges yields 1.
///
/// # Errors
/// See [`structures`].
pub fn next_spa_index(mem: &impl PhysMemory, nfit: u64) -> Result<u16, AcpiError> {
    let highest = spa_ranges(mem, nfit)?.map(|s| s.index).max().unwrap_or(0);
    Ok(highest.saturating_add(1))
}

/// Append raw sub-structure bytes at the current end of the NFIT, grow its
/// length and fix its checksum. The bytes past the end must already be free.
///
/// # Errors
/// Fails if the NFIT or the bytes following it are not mapped.
#[allow(clippy::cast_possible_truncation)]
pub fn append_structure(
    mem: &mut impl PhysMemory,
    nfit: u64,
    bytes: &[u8],
) -> Result<u32, AcpiError> {
    let span = table_span(mem, nfit, NFIT_HEADER_LEN)?;
    let end = nfit + span.len as u64;
    mem.write_bytes(end, bytes)?;
    let length = (span.len + bytes.len()) as u32;
    mem.write_u32(nfit + LENGTH_OFFSET, length)?;
    checksum(mem, nfit)?;
    Ok(length)
}
