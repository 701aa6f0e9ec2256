use core::fmt;

/// ACPI address range type as reported by E820.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RangeType {
    Usable,
    Reserved,
    AcpiReclaimable,
    AcpiNvs,
    Unusable,
    Disabled,
    Persistent,
    /// Any vendor specific code.
    Other(u32),
    /// Terminator sentinel.
    Unknown,
}

impl RangeType {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Usable,
            2 => Self::Reserved,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::Unusable,
            6 => Self::Disabled,
            7 => Self::Persistent,
            u32::MAX => Self::Unknown,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::Usable => 1,
            Self::Reserved => 2,
            Self::AcpiReclaimable => 3,
            Self::AcpiNvs => 4,
            Self::Unusable => 5,
            Self::Disabled => 6,
            Self::Persistent => 7,
            Self::Other(raw) => raw,
            Self::Unknown => u32::MAX,
        }
    }
}

impl fmt::Display for RangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usable => f.write_str("usable"),
            Self::Reserved => f.write_str("reserved"),
            Self::AcpiReclaimable => f.write_str("ACPI data"),
            Self::AcpiNvs => f.write_str("ACPI NVS"),
            Self::Unusable => f.write_str("unusable"),
            Self::Disabled => f.write_str("disabled"),
            Self::Persistent => f.write_str("persistent"),
            Self::Other(raw) => write!(f, "type {raw}"),
            Self::Unknown => f.write_str("end"),
        }
    }
}

/// One entry of the E820 map.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryRange {
    pub start: u64,
    pub length: u64,
    pub kind: RangeType,
}

impl MemoryRange {
    /// Sentinel following the last active range.
    pub const TERMINATOR: Self = Self::new(0, 0, RangeType::Unknown);

    #[must_use]
    pub const fn new(start: u64, length: u64, kind: RangeType) -> Self {
        Self {
            start,
            length,
            kind,
        }
    }

    /// Exclusive end address.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }

    #[must_use]
    pub const fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end()
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.kind, RangeType::Usable)
    }
}
