//! # RSDP/XSDP (Root/Extended System Description Pointer)

use crate::AcpiError;
use core::ptr::read_unaligned;
use memdisk_physmem::{PhysMemory, PhysSpan, sum};

/// Legacy BIOS window searched for the root pointer.
pub const RSDP_WINDOW: PhysSpan = PhysSpan::new(0x000E_0000, 0x2_0000);

const SIGNATURE: &[u8; 8] = b"RSD PTR ";
const V1_LEN: usize = 20;
const RSDT_ADDRESS_OFFSET: u64 = 16;
const XSDT_ADDRESS_OFFSET: u64 = 24;
const EXT_CHECKSUM_OFFSET: u64 = 32;

/// ACPI 1.0 Root System Description Pointer (RSDP)
#[derive(Clone, Copy)]
#[repr(C, packed)]
struct Rsdp {
    signature: [u8; 8], // "RSD PTR "
    checksum: u8,       // sum of first 20 bytes == 0
    oem_id: [u8; 6],
    revision: u8, // 0 for ACPI 1.0
    rsdt_address: u32,
}

/// ACPI 2.0 Extended System Description Pointer (XSDP)
#[derive(Clone, Copy)]
#[repr(C, packed)]
struct Xsdp {
    v1: Rsdp,
    length: u32,
    xsdt_address: u64,
    ext_checksum: u8, // checksum of entire table
    reserved: [u8; 3],
}

/// A validated root pointer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RootPointer {
    pub address: u64,
    pub revision: u8,
    pub oem_id: [u8; 6],
    pub rsdt_address: u64,
    pub xsdt_address: u64,
    pub length: u32,
}

impl RootPointer {
    /// Scan the legacy BIOS window for the root pointer.
    ///
    /// # Errors
    /// * [`AcpiError::RsdpNotFound`] if no candidate with a valid checksum exists.
    /// * [`AcpiError::IncompatibleRevision`] for ACPI 1.0 firmware.
    pub fn find(mem: &impl PhysMemory) -> Result<Self, AcpiError> {
        Self::find_in(mem, RSDP_WINDOW)
    }

    /// Scan `window` in 16-byte steps. The first candidate whose ACPI 1.0
    /// checksum holds wins.
    ///
    /// # Errors
    /// See [`RootPointer::find`].
    pub fn find_in(mem: &impl PhysMemory, window: PhysSpan) -> Result<Self, AcpiError> {
        let end = window.end().ok_or(AcpiError::RsdpNotFound)?;
        let mut candidate = window.base.next_multiple_of(16);
        while candidate + V1_LEN as u64 <= end {
            if let Ok(v1) = mem.slice(PhysSpan::new(candidate, V1_LEN))
                && &v1[0..8] == SIGNATURE
                && sum(v1) == 0
            {
                return Self::parse(mem, candidate);
            }
            candidate += 16;
        }
        Err(AcpiError::RsdpNotFound)
    }

    /// Validate the root pointer at `address`; only revision 2 and later
    /// carry the XSDT this loader relies on.
    ///
    /// # Errors
    /// See [`RootPointer::find`].
    #[allow(clippy::similar_names)]
    pub fn parse(mem: &impl PhysMemory, address: u64) -> Result<Self, AcpiError> {
        let v1: [u8; size_of::<Rsdp>()] = mem.read_array(address)?;
        if &v1[0..8] != SIGNATURE || sum(&v1) != 0 {
            return Err(AcpiError::RsdpNotFound);
        }

        // SAFETY: the array is exactly one packed `Rsdp`.
        let v1p = unsafe { read_unaligned(v1.as_ptr().cast::<Rsdp>()) };
        if v1p.revision < 2 {
            return Err(AcpiError::IncompatibleRevision(v1p.revision));
        }

        let v2: [u8; size_of::<Xsdp>()] = mem.read_array(address)?;
        // SAFETY: as above, for the extended layout.
        let v2p = unsafe { read_unaligned(v2.as_ptr().cast::<Xsdp>()) };
        let length = v2p.length;
        let full = mem.slice(PhysSpan::new(address, length.max(36) as usize))?;
        if sum(full) != 0 {
            log::warn!("acpi: RSDP extended checksum is wrong, continuing anyway");
        }

        Ok(Self {
            address,
            revision: v1p.revision,
            oem_id: v1p.oem_id,
            rsdt_address: u64::from(v1p.rsdt_address),
            xsdt_address: v2p.xsdt_address,
            length,
        })
    }

    /// Point the RSDP at a relocated RSDT and fix both checksums.
    ///
    /// # Errors
    /// [`AcpiError::AddressTooWide`] if `rsdt` is not a 32-bit address.
    pub fn set_rsdt_address(
        &mut self,
        mem: &mut impl PhysMemory,
        rsdt: u64,
    ) -> Result<(), AcpiError> {
        let narrow = u32::try_from(rsdt).map_err(|_| AcpiError::AddressTooWide(rsdt))?;
        mem.write_u32(self.address + RSDT_ADDRESS_OFFSET, narrow)?;
        self.rsdt_address = rsdt;
        self.fix_checksums(mem)
    }

    /// Point the RSDP at a relocated XSDT and fix both checksums.
    ///
    /// # Errors
    /// Fails if the RSDP is no longer mapped.
    pub fn set_xsdt_address(
        &mut self,
        mem: &mut impl PhysMemory,
        xsdt: u64,
    ) -> Result<(), AcpiError> {
        mem.write_u64(self.address + XSDT_ADDRESS_OFFSET, xsdt)?;
        self.xsdt_address = xsdt;
        self.fix_checksums(mem)
    }

    fn fix_checksums(&self, mem: &mut impl PhysMemory) -> Result<(), AcpiError> {
        mem.write_u8(self.address + 8, 0)?;
        let v1 = mem.checksum(PhysSpan::new(self.address, V1_LEN))?;
        mem.write_u8(self.address + 8, 0u8.wrapping_sub(v1))?;

        let full = PhysSpan::new(self.address, self.length.max(36) as usize);
        mem.write_u8(self.address + EXT_CHECKSUM_OFFSET, 0)?;
        let v2 = mem.checksum(full)?;
        mem.write_u8(self.address + EXT_CHECKSUM_OFFSET, 0u8.wrapping_sub(v2))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memdisk_physmem::BufferMemory;

    fn write_rsdp(mem: &mut impl PhysMemory, at: u64, revision: u8) {
        let mut bytes = [0u8; 36];
        bytes[0..8].copy_from_slice(SIGNATURE);
        bytes[9..15].copy_from_slice(b"BOCHS ");
        bytes[15] = revision;
        bytes[16..20].copy_from_slice(&0x000F_1000u32.to_le_bytes());
        bytes[20..24].copy_from_slice(&36u32.to_le_bytes());
        bytes[24..32].copy_from_slice(&0x000F_2000u64.to_le_bytes());
        bytes[8] = 0u8.wrapping_sub(sum(&bytes[..20]));
        bytes[32] = 0u8.wrapping_sub(sum(&bytes));
        mem.write_bytes(at, &bytes).unwrap();
    }

    fn bios() -> BufferMemory<Vec<u8>> {
        BufferMemory::new(0xE0000, vec![0u8; 0x2_0000])
    }

    #[test]
    fn finds_the_first_valid_candidate() {
        let mut mem = bios();
        // decoy with the right signature but a broken checksum
        mem.write_bytes(0xE0100, SIGNATURE).unwrap();
        write_rsdp(&mut mem, 0xF5A40, 2);

        let rsdp = RootPointer::find(&mem).unwrap();
        assert_eq!(rsdp.address, 0xF5A40);
        assert_eq!(rsdp.revision, 2);
        assert_eq!(rsdp.rsdt_address, 0xF_1000);
        assert_eq!(rsdp.xsdt_address, 0xF_2000);
        assert_eq!(&rsdp.oem_id, b"BOCHS ");
    }

    #[test]
    fn unaligned_signatures_are_not_found() {
        let mut mem = bios();
        write_rsdp(&mut mem, 0xF5A48, 2);
        assert_eq!(RootPointer::find(&mem), Err(AcpiError::RsdpNotFound));
    }

    #[test]
    fn acpi_1_is_rejected() {
        let mut mem = bios();
        write_rsdp(&mut mem, 0xE0000, 0);
        assert_eq!(
            RootPointer::find(&mem),
            Err(AcpiError::IncompatibleRevision(0))
        );
    }

    #[test]
    fn rewriting_root_addresses_keeps_checksums_valid() {
        let mut mem = bios();
        write_rsdp(&mut mem, 0xE0040, 2);
        let mut rsdp = RootPointer::find(&mem).unwrap();
        rsdp.set_rsdt_address(&mut mem, 0x1F_F000).unwrap();
        rsdp.set_xsdt_address(&mut mem, 0x1F_E000).unwrap();

        let again = RootPointer::parse(&mem, 0xE0040).unwrap();
        assert_eq!(again.rsdt_address, 0x1F_F000);
        assert_eq!(again.xsdt_address, 0x1F_E000);
        assert_eq!(mem.checksum(PhysSpan::new(0xE0040, 36)).unwrap(), 0);
        assert_eq!(
            rsdp.set_rsdt_address(&mut mem, 0x1_0000_0000),
            Err(AcpiError::AddressTooWide(0x1_0000_0000))
        );
    }
}
