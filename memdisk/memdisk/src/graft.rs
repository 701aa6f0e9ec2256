//! Describing the decrypted ramdisk to the operating system.
//!
//! The ramdisk becomes an NFIT System Physical Address range of the
//! "virtual disk" type. An existing NFIT is extended in place; otherwise a
//! new one is allocated and linked into the root table. Either way the OS
//! only looks at the NFIT if an NVDIMM root device exists, so one is added
//! first when the firmware has none.

use crate::BootContext;
use crate::ssdt::{NVDIMM_ROOT_LEN, write_nvdimm_root};
use log::{Level, debug, info, log_enabled, trace};
use memdisk_acpi::nfit::{self, Guid, NFIT_HEADER_LEN, SPA_LEN, SpaRange, TableIdentity};
use memdisk_acpi::{AcpiError, RootKind, table_span};
use memdisk_e820::{E820Error, RangeType};
use memdisk_physmem::{HexDump, PhysMemory};

pub const NFIT_IDENTITY: TableIdentity = TableIdentity {
    oem_id: *b"MFTAH ",
    oem_table_id: *b"MFTAHNVD",
    oem_revision: 0x1000,
    creator_id: *b"XMIT",
    creator_revision: 1,
};

/// Index of the SPA range in an NFIT the loader creates itself.
pub const FIRST_SPA_INDEX: u16 = 1;

const TABLE_ALIGN: u64 = 16;

/// Physical extent of the decrypted disk image.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Ramdisk {
    pub base: u64,
    pub length: u64,
}

/// What [`graft`] changed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Graft {
    pub nfit: u64,
    pub spa_index: u16,
    /// `true` if the NFIT was created rather than extended.
    pub created_nfit: bool,
    /// The SSDT added for the NVDIMM root device, if the firmware lacked one.
    pub nvdimm_root: Option<u64>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum GraftError {
    #[error("failed to parse ACPI structures")]
    Discovery(#[source] AcpiError),
    #[error("out of memory")]
    Allocation(#[source] E820Error),
    #[error("could not register a new SSDT")]
    NvdimmRoot(#[source] AcpiError),
    #[error("could not register an NFIT table")]
    Nfit(#[source] AcpiError),
}

impl GraftError {
    /// Whether the range table overflowed. Every other failure only costs
    /// the OS its view of the ramdisk.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Allocation(e) => matches!(e, E820Error::CapacityExhausted),
            Self::Discovery(e) | Self::NvdimmRoot(e) | Self::Nfit(e) => e.is_fatal(),
        }
    }
}

/// Register `disk` with the live ACPI tables.
///
/// # Errors
/// See [`GraftError`]. Tables written before the failing step stay in
/// place.
pub fn graft<M: PhysMemory>(ctx: &mut BootContext<M>, disk: Ramdisk) -> Result<Graft, GraftError> {
    let BootContext {
        memory,
        ranges,
        acpi,
    } = ctx;

    info!("graft: parsing system ACPI entries");
    acpi.ensure_parsed(memory, ranges)
        .map_err(GraftError::Discovery)?;
    debug!(
        "graft: RSDT {:#010x} / XSDT {:#010x}",
        acpi.root(RootKind::Rsdt).address(),
        acpi.root(RootKind::Xsdt).address()
    );

    let nvdimm_root = if let Some(existing) = acpi.nvdimm_root() {
        debug!("graft: firmware declares an NVDIMM root device at {existing:#010x}");
        None
    } else {
        info!("graft: adding an NVDIMM root device");
        let address = ranges
            .allocate_aligned(NVDIMM_ROOT_LEN as u64, TABLE_ALIGN, RangeType::AcpiNvs)
            .map_err(GraftError::Allocation)?;
        debug!("graft: NVDR SSDT at {address:#010x} ({NVDIMM_ROOT_LEN} bytes)");
        write_nvdimm_root(memory, address).map_err(GraftError::NvdimmRoot)?;
        acpi.insert_table(memory, ranges, address)
            .map_err(GraftError::NvdimmRoot)?;
        Some(address)
    };

    info!("graft: registering an NFIT range");
    let (nfit, spa_index, created_nfit) = if let Some(nfit) = acpi.nfit() {
        let index = nfit::next_spa_index(&*memory, nfit).map_err(GraftError::Nfit)?;
        let spa = SpaRange::new(index, Guid::VIRTUAL_DISK, disk.base, disk.length);
        let length = acpi
            .extend_nfit(memory, ranges, &spa.to_bytes())
            .map_err(GraftError::Nfit)?;
        debug!("graft: NFIT at {nfit:#010x} grew to {length} bytes");
        (nfit, index, false)
    } else {
        let length = (NFIT_HEADER_LEN + SPA_LEN) as u64;
        let address = ranges
            .allocate_aligned(length, TABLE_ALIGN, RangeType::AcpiNvs)
            .map_err(GraftError::Allocation)?;
        let spa = SpaRange::new(FIRST_SPA_INDEX, Guid::VIRTUAL_DISK, disk.base, disk.length);
        nfit::write_table(memory, address, &NFIT_IDENTITY, &spa).map_err(GraftError::Nfit)?;
        acpi.insert_table(memory, ranges, address)
            .map_err(GraftError::Nfit)?;
        debug!("graft: new NFIT at {address:#010x}");
        (address, FIRST_SPA_INDEX, true)
    };

    if log_enabled!(Level::Trace)
        && let Ok(span) = table_span(&*memory, nfit, NFIT_HEADER_LEN)
        && let Ok(bytes) = memory.slice(span)
    {
        trace!("graft: NFIT\n{}", HexDump::new(nfit, bytes));
    }

    info!(
        "graft: OK, ramdisk [{:#x} : {:#x}] is SPA range {spa_index}",
        disk.base, disk.length
    );
    Ok(Graft {
        nfit,
        spa_index,
        created_nfit,
        nvdimm_root,
    })
}
