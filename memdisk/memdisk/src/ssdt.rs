//! The NVDIMM root device table.
//!
//! Operating systems only enumerate NFIT ranges once an NVDIMM root device
//! (`_HID "ACPI0012"`) exists. Firmware without NVDIMM support has none, so
//! the loader carries a minimal SSDT declaring one:
//!
//! ```text
//! Scope (\_SB) {
//!     Device (NVDR) {
//!         Name (_HID, "ACPI0012")
//!         Name (_STA, 0x0F)
//!     }
//! }
//! ```

use memdisk_acpi::nfit::TableIdentity;
use memdisk_acpi::{AcpiError, HEADER_LEN, Signature, checksum};
use memdisk_physmem::PhysMemory;

/// Compiled AML of the definition block body.
#[rustfmt::skip]
pub const NVDIMM_ROOT_AML: [u8; 36] = [
    // Scope (\_SB), 35 bytes
    0x10, 0x23, b'\\', b'_', b'S', b'B', b'_',
    // Device (NVDR), 27 bytes
    0x5B, 0x82, 0x1B, b'N', b'V', b'D', b'R',
    // Name (_HID, "ACPI0012")
    0x08, b'_', b'H', b'I', b'D', 0x0D,
    b'A', b'C', b'P', b'I', b'0', b'0', b'1', b'2', 0x00,
    // Name (_STA, 0x0F)
    0x08, b'_', b'S', b'T', b'A', 0x0A, 0x0F,
];

/// Full table length.
pub const NVDIMM_ROOT_LEN: usize = HEADER_LEN + NVDIMM_ROOT_AML.len();

/// DSDT/SSDT revision 2: 64-bit AML integers.
const SSDT_REVISION: u8 = 2;

pub const NVDIMM_ROOT_IDENTITY: TableIdentity = TableIdentity {
    oem_id: *b"MFTAH ",
    oem_table_id: *b"MFTAHNVR",
    oem_revision: 0x1000,
    creator_id: *b"XMIT",
    creator_revision: 1,
};

/// Write the NVDIMM root SSDT to `address` and checksum it.
///
/// # Errors
/// Fails if `address` does not have [`NVDIMM_ROOT_LEN`] mapped bytes.
#[allow(clippy::cast_possible_truncation)]
pub fn write_nvdimm_root(mem: &mut impl PhysMemory, address: u64) -> Result<(), AcpiError> {
    let header =
        NVDIMM_ROOT_IDENTITY.header(Signature::SSDT, NVDIMM_ROOT_LEN as u32, SSDT_REVISION);
    mem.write_bytes(address, &header.to_bytes())?;
    mem.write_bytes(address + HEADER_LEN as u64, &NVDIMM_ROOT_AML)?;
    checksum(mem, address)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use memdisk_acpi::{NVDIMM_ROOT_HID, SdtHeader, verify};
    use memdisk_physmem::BufferMemory;

    #[test]
    fn package_lengths_match_the_body() {
        // scope length covers everything after its opcode
        assert_eq!(usize::from(NVDIMM_ROOT_AML[1]), NVDIMM_ROOT_AML.len() - 1);
        // device length covers everything after its two-byte opcode
        assert_eq!(usize::from(NVDIMM_ROOT_AML[9]), NVDIMM_ROOT_AML.len() - 9);
        assert!(
            NVDIMM_ROOT_AML
                .windows(NVDIMM_ROOT_HID.len())
                .any(|w| w == NVDIMM_ROOT_HID)
        );
    }

    #[test]
    fn written_table_is_a_valid_ssdt() {
        let mut mem = BufferMemory::new(0x2000, vec![0u8; 0x100]);
        write_nvdimm_root(&mut mem, 0x2010).unwrap();

        let header = SdtHeader::read(&mem, 0x2010).unwrap();
        assert_eq!(header.signature(), Signature::SSDT);
        assert_eq!(header.length() as usize, NVDIMM_ROOT_LEN);
        assert!(verify(&mem, 0x2010).unwrap());
    }
}
