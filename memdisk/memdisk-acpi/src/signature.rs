//! # Table Signatures

use core::fmt;

/// Four-byte ACPI table signature.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Signature(pub [u8; 4]);

impl Signature {
    pub const RSDT: Self = Self(*b"RSDT");
    pub const XSDT: Self = Self(*b"XSDT");
    pub const FADT: Self = Self(*b"FACP");
    pub const FACS: Self = Self(*b"FACS");
    pub const DSDT: Self = Self(*b"DSDT");
    pub const SSDT: Self = Self(*b"SSDT");
    pub const PSDT: Self = Self(*b"PSDT");
    pub const NFIT: Self = Self(*b"NFIT");

    /// SSDT and PSDT are handled identically.
    #[must_use]
    pub fn is_secondary(self) -> bool {
        self == Self::SSDT || self == Self::PSDT
    }

    /// Whether the signature belongs to a table type that may appear more
    /// than once and is therefore never overridden on insertion.
    #[must_use]
    pub fn is_multi_instance(self) -> bool {
        self.is_secondary() || self == Self::NFIT
    }

    /// Whether this is one of the signatures defined by the ACPI specification.
    #[must_use]
    pub fn is_known(self) -> bool {
        KNOWN.contains(&self)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(\"{self}\")")
    }
}

impl From<[u8; 4]> for Signature {
    fn from(value: [u8; 4]) -> Self {
        Self(value)
    }
}

impl PartialEq<[u8; 4]> for Signature {
    fn eq(&self, other: &[u8; 4]) -> bool {
        &self.0 == other
    }
}

/// Signatures recognised when scanning raw memory for stray tables.
/// `"RSD "` stands in for the RSDP, whose signature is eight bytes long.
pub static KNOWN: [Signature; 68] = {
    const fn s(sig: &[u8; 4]) -> Signature {
        Signature(*sig)
    }
    [
        s(b"RSD "), s(b"RSDT"), s(b"XSDT"), s(b"DSDT"), s(b"SSDT"), s(b"PSDT"), s(b"NFIT"),
        s(b"APIC"), s(b"BERT"), s(b"BGRT"), s(b"CPEP"), s(b"ECDT"), s(b"EINJ"), s(b"ERST"),
        s(b"FACP"), s(b"FACS"), s(b"FPDT"), s(b"GTDT"), s(b"HEST"), s(b"MSCT"), s(b"MPST"),
        s(b"OEMx"), s(b"PCCT"), s(b"PHAT"), s(b"PMTT"), s(b"RASF"), s(b"SBST"), s(b"SDEV"),
        s(b"SLIT"), s(b"SRAT"), s(b"AEST"), s(b"BDAT"), s(b"BOOT"), s(b"CDIT"), s(b"CEDT"),
        s(b"CRAT"), s(b"CSRT"), s(b"DBGP"), s(b"DBG2"), s(b"DMAR"), s(b"DRTM"), s(b"ETDT"),
        s(b"HPET"), s(b"IBFT"), s(b"IORT"), s(b"IVRS"), s(b"LPIT"), s(b"MCFG"), s(b"MCHI"),
        s(b"MPAM"), s(b"MSDM"), s(b"PRMT"), s(b"RGRT"), s(b"SDEI"), s(b"SLIC"), s(b"SPCR"),
        s(b"SPMI"), s(b"STAO"), s(b"SVKL"), s(b"TCPA"), s(b"TPM2"), s(b"UEFI"), s(b"WAET"),
        s(b"WDAT"), s(b"WDRT"), s(b"WPBT"), s(b"WSMT"), s(b"XENV"),
    ]
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_list_has_no_duplicates() {
        for (i, a) in KNOWN.iter().enumerate() {
            assert!(!KNOWN[i + 1..].contains(a), "duplicate {a}");
        }
    }

    #[test]
    fn classification_helpers() {
        assert!(Signature::PSDT.is_secondary());
        assert!(Signature::NFIT.is_multi_instance());
        assert!(!Signature::FADT.is_multi_instance());
        assert!(Signature::FACS.is_known());
        assert!(!Signature(*b"ZZZZ").is_known());
        assert_eq!(Signature(*b"FA\0S").to_string(), "FA?S");
    }
}
