//! # System Description Table Header

use crate::{AcpiError, Signature};
use core::ptr::read_unaligned;
use memdisk_physmem::{PhysMemory, PhysSpan};

/// Size of [`SdtHeader`] in bytes.
pub const HEADER_LEN: usize = size_of::<SdtHeader>();

/// Byte offset of the `length` field.
pub const LENGTH_OFFSET: u64 = 4;

/// Byte offset of the `checksum` field.
pub const CHECKSUM_OFFSET: u64 = 9;

/// Common header of every ACPI description table except the FACS.
#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct SdtHeader {
    pub signature: [u8; 4],
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: [u8; 4],
    pub creator_revision: u32,
}

const _: () = assert!(size_of::<SdtHeader>() == 36);

impl SdtHeader {
    /// A header with a zero checksum; fix it with [`checksum`] once the
    /// table body is in place.
    #[must_use]
    pub const fn new(signature: Signature, length: u32, revision: u8) -> Self {
        Self {
            signature: signature.0,
            length,
            revision,
            checksum: 0,
            oem_id: [0; 6],
            oem_table_id: [0; 8],
            oem_revision: 0,
            creator_id: [0; 4],
            creator_revision: 0,
        }
    }

    /// Read the header at `address`.
    ///
    /// # Errors
    /// Fails if the 36 header bytes are not mapped.
    pub fn read(mem: &impl PhysMemory, address: u64) -> Result<Self, AcpiError> {
        if address == 0 {
            return Err(AcpiError::InvalidAddress(address));
        }
        let bytes: [u8; HEADER_LEN] = mem.read_array(address)?;
        // SAFETY: `bytes` holds exactly one packed header.
        Ok(unsafe { read_unaligned(bytes.as_ptr().cast::<Self>()) })
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        // SAFETY: `Self` is packed plain old data of exactly `HEADER_LEN` bytes.
        let raw = unsafe {
            core::slice::from_raw_parts(core::ptr::from_ref(self).cast::<u8>(), HEADER_LEN)
        };
        out.copy_from_slice(raw);
        out
    }

    #[must_use]
    pub const fn signature(&self) -> Signature {
        Signature(self.signature)
    }

    #[must_use]
    pub const fn length(&self) -> u32 {
        self.length
    }
}

/// Declared length of the table at `address`, validated to cover at least
/// `min` bytes and to be fully mapped.
///
/// # Errors
/// [`AcpiError::Truncated`] if the declared length is shorter than `min`
/// or runs past the end of mapped memory.
pub fn table_span(mem: &impl PhysMemory, address: u64, min: usize) -> Result<PhysSpan, AcpiError> {
    if address == 0 {
        return Err(AcpiError::InvalidAddress(address));
    }
    let length = mem.read_u32(address + LENGTH_OFFSET)? as usize;
    let span = PhysSpan::new(address, length);
    if length < min || !mem.is_mapped(span) {
        return Err(AcpiError::Truncated { address, length });
    }
    Ok(span)
}

/// Recompute the checksum byte of the table at `address` so the whole table
/// sums to zero. Returns the new checksum.
///
/// # Errors
/// See [`table_span`].
pub fn checksum(mem: &mut impl PhysMemory, address: u64) -> Result<u8, AcpiError> {
    let span = table_span(mem, address, HEADER_LEN)?;
    mem.write_u8(address + CHECKSUM_OFFSET, 0)?;
    let value = 0u8.wrapping_sub(mem.checksum(span)?);
    mem.write_u8(address + CHECKSUM_OFFSET, value)?;
    Ok(value)
}

/// Whether the table at `address` sums to zero.
///
/// # Errors
/// See [`table_span`].
pub fn verify(mem: &impl PhysMemory, address: u64) -> Result<bool, AcpiError> {
    let span = table_span(mem, address, HEADER_LEN)?;
    Ok(mem.checksum(span)? == 0)
}
