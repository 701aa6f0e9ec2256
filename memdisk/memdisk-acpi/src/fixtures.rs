//! Synthetic BIOS memory images for host-side tests.
//!
//! ```rust,ignore
//! let fw = FirmwareBuilder::new()
//!     .xsdt()
//!     .gap(XSDT_STAGING_LEN)
//!     .table(TableSpec::fadt())
//!     .table(TableSpec::facs())
//!     .table(TableSpec::dsdt(&[]))
//!     .build();
//! ```
#![allow(clippy::missing_panics_doc, clippy::cast_possible_truncation)]

use crate::fadt::{DSDT, FIRMWARE_CTRL, X_DSDT, X_FIRMWARE_CTRL};
use crate::{HEADER_LEN, SdtHeader, Signature, checksum};
use memdisk_e820::{E820Map, MemoryRange, RangeType};
use memdisk_physmem::{BufferMemory, PhysMemory, sum};

/// First byte backed by the image.
pub const MEMORY_BASE: u64 = 0x1000;
/// Exclusive end of the image; the usable range ends here.
pub const MEMORY_END: u64 = 0x20_0000;
pub const RSDP_ADDRESS: u64 = 0xE_0040;
/// Where the first table is placed.
pub const TABLES_BASE: u64 = 0xF_0000;

const BIOS_END: u64 = 0x10_0000;
const FADT_LEN: usize = 244;
const FACS_LEN: usize = 64;

/// One description table to lay out.
#[derive(Clone, Debug)]
pub struct TableSpec {
    signature: Signature,
    revision: u8,
    body: Vec<u8>,
    listed: bool,
}

impl TableSpec {
    /// A table with a standard header followed by `body`, listed in every
    /// root table.
    #[must_use]
    pub fn new(signature: Signature, body: &[u8]) -> Self {
        Self {
            signature,
            revision: 1,
            body: body.to_vec(),
            listed: true,
        }
    }

    /// An ACPI 2.0+ FADT. Its FACS and DSDT pointers are filled in by
    /// [`FirmwareBuilder::build`].
    #[must_use]
    pub fn fadt() -> Self {
        Self {
            revision: 4,
            ..Self::new(Signature::FADT, &[0; FADT_LEN - HEADER_LEN])
        }
    }

    /// A FACS. It has no standard header and is only reachable via the FADT.
    #[must_use]
    pub fn facs() -> Self {
        Self::new(Signature::FACS, &[0; FACS_LEN - 8]).unlisted()
    }

    /// A DSDT holding `aml`, only reachable via the FADT.
    #[must_use]
    pub fn dsdt(aml: &[u8]) -> Self {
        Self {
            revision: 2,
            ..Self::new(Signature::DSDT, aml)
        }
        .unlisted()
    }

    #[must_use]
    pub fn ssdt(aml: &[u8]) -> Self {
        Self {
            revision: 2,
            ..Self::new(Signature::SSDT, aml)
        }
    }

    /// Keep the table out of the root tables.
    #[must_use]
    pub fn unlisted(mut self) -> Self {
        self.listed = false;
        self
    }

    fn is_facs(&self) -> bool {
        self.signature == Signature::FACS
    }

    fn len(&self) -> usize {
        if self.is_facs() {
            8 + self.body.len()
        } else {
            HEADER_LEN + self.body.len()
        }
    }

    fn align(&self) -> u64 {
        if self.is_facs() { 64 } else { 16 }
    }
}

#[derive(Clone, Debug)]
enum Item {
    Rsdt,
    Xsdt,
    Table(TableSpec),
    Gap(usize),
}

/// Lays out tables upwards from [`TABLES_BASE`] in the order they are added.
///
/// Tables are 16-byte aligned (the FACS 64-byte aligned); a gap is added
/// verbatim. A table placed right behind the XSDT without a gap ends up in
/// its staging area.
#[derive(Clone, Debug)]
pub struct FirmwareBuilder {
    items: Vec<Item>,
    revision: u8,
}

impl Default for FirmwareBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwareBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            revision: 2,
        }
    }

    #[must_use]
    pub fn rsdt(mut self) -> Self {
        self.items.push(Item::Rsdt);
        self
    }

    #[must_use]
    pub fn xsdt(mut self) -> Self {
        self.items.push(Item::Xsdt);
        self
    }

    #[must_use]
    pub fn table(mut self, spec: TableSpec) -> Self {
        self.items.push(Item::Table(spec));
        self
    }

    #[must_use]
    pub fn gap(mut self, len: usize) -> Self {
        self.items.push(Item::Gap(len));
        self
    }

    /// Revision written to the RSDP.
    #[must_use]
    pub const fn rsdp_revision(mut self, revision: u8) -> Self {
        self.revision = revision;
        self
    }

    /// Lay out the image. Panics if the tables run past the BIOS area.
    #[must_use]
    pub fn build(self) -> Firmware {
        let listed = self
            .items
            .iter()
            .filter(|i| matches!(i, Item::Table(t) if t.listed))
            .count();

        let mut cursor = TABLES_BASE;
        let mut rsdt = None;
        let mut xsdt = None;
        let mut placed = Vec::new();
        for item in &self.items {
            match item {
                Item::Gap(len) => cursor += *len as u64,
                Item::Rsdt => {
                    cursor = cursor.next_multiple_of(16);
                    rsdt = Some(cursor);
                    cursor += (HEADER_LEN + 4 * listed) as u64;
                }
                Item::Xsdt => {
                    cursor = cursor.next_multiple_of(16);
                    xsdt = Some(cursor);
                    cursor += (HEADER_LEN + 8 * listed) as u64;
                }
                Item::Table(spec) => {
                    cursor = cursor.next_multiple_of(spec.align());
                    placed.push((spec, cursor));
                    cursor += spec.len() as u64;
                }
            }
        }
        assert!(cursor <= BIOS_END, "fixture tables overflow the BIOS area");

        let mut memory = BufferMemory::new(
            MEMORY_BASE,
            vec![0u8; (MEMORY_END - MEMORY_BASE) as usize],
        );
        let find = |sig: Signature| {
            placed
                .iter()
                .find(|(s, _)| s.signature == sig)
                .map(|(_, a)| *a)
        };
        let facs = find(Signature::FACS).unwrap_or(0);
        let dsdt = find(Signature::DSDT).unwrap_or(0);

        for (spec, address) in &placed {
            let address = *address;
            if spec.is_facs() {
                memory.write_bytes(address, b"FACS").expect("FACS fits");
                memory.write_u32(address + 4, spec.len() as u32).expect("FACS fits");
                memory.write_bytes(address + 8, &spec.body).expect("FACS fits");
                continue;
            }

            let header = SdtHeader::new(spec.signature, spec.len() as u32, spec.revision);
            memory.write_bytes(address, &header.to_bytes()).expect("table fits");
            memory
                .write_bytes(address + HEADER_LEN as u64, &spec.body)
                .expect("table fits");
            if spec.signature == Signature::FADT {
                memory.write_u32(address + FIRMWARE_CTRL, facs as u32).expect("FADT fits");
                memory.write_u32(address + DSDT, dsdt as u32).expect("FADT fits");
                memory.write_u64(address + X_FIRMWARE_CTRL, facs).expect("FADT fits");
                memory.write_u64(address + X_DSDT, dsdt).expect("FADT fits");
            }
            checksum(&mut memory, address).expect("table fits");
        }

        let entries: Vec<u64> = placed
            .iter()
            .filter(|(s, _)| s.listed)
            .map(|(_, a)| *a)
            .collect();
        if let Some(at) = rsdt {
            write_root(&mut memory, at, Signature::RSDT, 4, &entries);
        }
        if let Some(at) = xsdt {
            write_root(&mut memory, at, Signature::XSDT, 8, &entries);
        }
        write_rsdp(
            &mut memory,
            self.revision,
            rsdt.unwrap_or(0),
            xsdt.unwrap_or(0),
        );

        let ranges = E820Map::from_firmware(&[
            MemoryRange::new(0, 0x9_FC00, RangeType::Usable),
            MemoryRange::new(0x9_FC00, 0x400, RangeType::Reserved),
            MemoryRange::new(0xE_0000, 0x2_0000, RangeType::Reserved),
            MemoryRange::new(BIOS_END, MEMORY_END - BIOS_END, RangeType::Usable),
        ])
        .expect("four ranges fit");

        Firmware {
            memory,
            ranges,
            rsdp: RSDP_ADDRESS,
            rsdt,
            xsdt,
            tables: placed.iter().map(|(s, a)| (s.signature, *a)).collect(),
        }
    }
}

fn write_root(memory: &mut impl PhysMemory, at: u64, sig: Signature, width: usize, entries: &[u64]) {
    let length = HEADER_LEN + width * entries.len();
    let header = SdtHeader::new(sig, length as u32, 1);
    memory.write_bytes(at, &header.to_bytes()).expect("root table fits");
    for (i, entry) in entries.iter().enumerate() {
        let slot = at + (HEADER_LEN + i * width) as u64;
        if width == 4 {
            memory.write_u32(slot, *entry as u32).expect("root table fits");
        } else {
            memory.write_u64(slot, *entry).expect("root table fits");
        }
    }
    checksum(memory, at).expect("root table fits");
}

fn write_rsdp(memory: &mut impl PhysMemory, revision: u8, rsdt: u64, xsdt: u64) {
    let mut bytes = [0u8; 36];
    bytes[0..8].copy_from_slice(b"RSD PTR ");
    bytes[9..15].copy_from_slice(b"MEMDSK");
    bytes[15] = revision;
    bytes[16..20].copy_from_slice(&(rsdt as u32).to_le_bytes());
    bytes[20..24].copy_from_slice(&36u32.to_le_bytes());
    bytes[24..32].copy_from_slice(&xsdt.to_le_bytes());
    bytes[8] = 0u8.wrapping_sub(sum(&bytes[..20]));
    bytes[32] = 0u8.wrapping_sub(sum(&bytes));
    memory.write_bytes(RSDP_ADDRESS, &bytes).expect("RSDP fits");
}

/// A laid-out image together with its memory map.
pub struct Firmware {
    pub memory: BufferMemory<Vec<u8>>,
    pub ranges: E820Map,
    pub rsdp: u64,
    pub rsdt: Option<u64>,
    pub xsdt: Option<u64>,
    tables: Vec<(Signature, u64)>,
}

impl Firmware {
    /// Where the first table with `signature` was placed.
    #[must_use]
    pub fn address_of(&self, signature: Signature) -> Option<u64> {
        self.tables
            .iter()
            .find(|(s, _)| *s == signature)
            .map(|(_, a)| *a)
    }

    /// Signatures and addresses of all placed tables, in layout order.
    #[must_use]
    pub fn tables(&self) -> &[(Signature, u64)] {
        &self.tables
    }
}
