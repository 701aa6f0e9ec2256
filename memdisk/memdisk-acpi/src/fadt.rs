//! # FADT Table References
//!
//! The FACS and the DSDT are not listed in the root tables; the FADT points
//! at them directly. A relocated FACS or DSDT must be re-pointed here too or
//! the OS follows a pointer into zeroed memory.

use crate::AcpiError;
use crate::sdt::{HEADER_LEN, checksum, table_span};
use memdisk_physmem::PhysMemory;

/// 32-bit `FIRMWARE_CTRL` (FACS) pointer.
pub(crate) const FIRMWARE_CTRL: u64 = 36;
/// 32-bit `DSDT` pointer.
pub(crate) const DSDT: u64 = 40;
/// 64-bit `X_FIRMWARE_CTRL` pointer (ACPI 2.0+).
pub(crate) const X_FIRMWARE_CTRL: u64 = 132;
/// 64-bit `X_DSDT` pointer (ACPI 2.0+).
pub(crate) const X_DSDT: u64 = 140;

/// The FACS and DSDT addresses the FADT at `fadt` refers to, preferring
/// the 64-bit fields when present and non-zero.
///
/// # Errors
/// Fails if the FADT is truncated.
pub fn references(mem: &impl PhysMemory, fadt: u64) -> Result<(Option<u64>, Option<u64>), AcpiError> {
    let span = table_span(mem, fadt, HEADER_LEN + 8)?;
    let field = |offset: u64, wide: bool| -> Result<Option<u64>, AcpiError> {
        let width = if wide { 8 } else { 4 };
        if offset + width > span.len as u64 {
            return Ok(None);
        }
        let value = if wide {
            mem.read_u64(fadt + offset)?
        } else {
            u64::from(mem.read_u32(fadt + offset)?)
        };
        Ok((value != 0).then_some(value))
    };

    let facs = field(X_FIRMWARE_CTRL, true)?.or(field(FIRMWARE_CTRL, false)?);
    let dsdt = field(X_DSDT, true)?.or(field(DSDT, false)?);
    Ok((facs, dsdt))
}

/// Replace every FACS/DSDT pointer in the FADT at `fadt` equal to `old`
/// with `new` and fix the FADT checksum. Returns whether anything changed.
///
/// # Errors
/// * [`AcpiError::AddressTooWide`] if a 32-bit field would need an address above 4 GiB.
/// * Fails if the FADT is truncated.
pub fn rewrite_references(
    mem: &mut impl PhysMemory,
    fadt: u64,
    old: u64,
    new: u64,
) -> Result<bool, AcpiError> {
    let span = table_span(mem, fadt, HEADER_LEN + 8)?;
    let length = span.len as u64;
    let mut changed = false;

    for offset in [FIRMWARE_CTRL, DSDT] {
        if offset + 4 <= length && u64::from(mem.read_u32(fadt + offset)?) == old {
            let narrow = u32::try_from(new).map_err(|_| AcpiError::AddressTooWide(new))?;
            mem.write_u32(fadt + offset, narrow)?;
            changed = true;
        }
    }
    for offset in [X_FIRMWARE_CTRL, X_DSDT] {
        if offset + 8 <= length && mem.read_u64(fadt + offset)? == old {
            mem.write_u64(fadt + offset, new)?;
            changed = true;
        }
    }

    if changed {
        checksum(mem, fadt)?;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Signature;
    use crate::sdt::{SdtHeader, verify};
    use memdisk_physmem::BufferMemory;

    fn fadt(length: u32) -> BufferMemory<Vec<u8>> {
        let mut mem = BufferMemory::new(0x1000, vec![0u8; 0x200]);
        mem.write_bytes(0x1000, &SdtHeader::new(Signature::FADT, length, 4).to_bytes())
            .unwrap();
        mem
    }

    #[test]
    fn rewrites_both_pointer_widths() {
        let mut mem = fadt(244);
        mem.write_u32(0x1000 + FIRMWARE_CTRL, 0xF_0100).unwrap();
        mem.write_u64(0x1000 + X_FIRMWARE_CTRL, 0xF_0100).unwrap();
        mem.write_u32(0x1000 + DSDT, 0xF_0200).unwrap();
        mem.write_u64(0x1000 + X_DSDT, 0xF_0200).unwrap();
        checksum(&mut mem, 0x1000).unwrap();

        assert!(rewrite_references(&mut mem, 0x1000, 0xF_0100, 0x1F_FFC0).unwrap());
        assert!(verify(&mem, 0x1000).unwrap());
        assert_eq!(
            references(&mem, 0x1000).unwrap(),
            (Some(0x1F_FFC0), Some(0xF_0200))
        );
        assert_eq!(mem.read_u32(0x1000 + FIRMWARE_CTRL).unwrap(), 0x1F_FFC0);

        assert!(!rewrite_references(&mut mem, 0x1000, 0xDEAD, 0xBEEF).unwrap());
    }

    #[test]
    fn acpi_1_fadt_has_no_extended_fields() {
        let mut mem = fadt(116);
        mem.write_u32(0x1000 + DSDT, 0xF_0200).unwrap();
        // bytes past the declared length must not be touched
        mem.write_u64(0x1000 + X_DSDT, 0xF_0200).unwrap();

        assert!(rewrite_references(&mut mem, 0x1000, 0xF_0200, 0x1F_0000).unwrap());
        assert_eq!(mem.read_u32(0x1000 + DSDT).unwrap(), 0x1F_0000);
        assert_eq!(mem.read_u64(0x1000 + X_DSDT).unwrap(), 0xF_0200);
        assert_eq!(references(&mem, 0x1000).unwrap(), (None, Some(0x1F_0000)));
    }
}
