use crate::{ALLOCATION_CEILING, E820Error, MemoryRange, RangeType};
use arrayvec::ArrayVec;
use log::{debug, info, warn};

/// Slots in the range table, the terminator included.
pub const MAX_RANGES: usize = 256;

/// Result of [`E820Map::extend_in_place`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Extension {
    /// The requested span already lies inside the owning range.
    AlreadyCovered,
    /// The owning range now ends at `to` instead of `from`.
    Extended { from: u64, to: u64 },
    /// Growing would overlap the next range by `shortfall` bytes; nothing changed.
    Blocked { shortfall: u64 },
    /// No range contains the address.
    NotTracked,
}

/// The loader's copy of the firmware memory map.
#[derive(Clone, Default)]
pub struct E820Map {
    ranges: ArrayVec<MemoryRange, MAX_RANGES>,
}

impl E820Map {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ranges: ArrayVec::new_const(),
        }
    }

    /// Build the map from the firmware-reported ranges, in any order.
    ///
    /// # Errors
    /// [`E820Error::CapacityExhausted`] if the firmware reports more ranges
    /// than the table can hold.
    pub fn from_firmware(ranges: &[MemoryRange]) -> Result<Self, E820Error> {
        let mut map = Self::new();
        for range in ranges {
            map.insert_range(range.start, range.length, range.kind)?;
        }
        Ok(map)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRange> {
        self.ranges.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[MemoryRange] {
        &self.ranges
    }

    /// Entry at `index`; the terminator at `len()`, `None` past it.
    #[must_use]
    pub fn entry(&self, index: usize) -> Option<MemoryRange> {
        match index.cmp(&self.ranges.len()) {
            core::cmp::Ordering::Less => Some(self.ranges[index]),
            core::cmp::Ordering::Equal => Some(MemoryRange::TERMINATOR),
            core::cmp::Ordering::Greater => None,
        }
    }

    /// The range containing `address`, if any.
    #[must_use]
    pub fn find(&self, address: u64) -> Option<&MemoryRange> {
        self.ranges.iter().find(|r| r.contains(address))
    }

    /// Sum of the lengths of all ranges of `kind`.
    #[must_use]
    pub fn total(&self, kind: RangeType) -> u64 {
        self.ranges
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.length)
            .sum()
    }

    /// Insert a range and restore ascending start order.
    ///
    /// A zero length is ignored.
    ///
    /// # Errors
    /// [`E820Error::CapacityExhausted`] when no slot besides the terminator's
    /// is left. The boot sequence treats this as fatal.
    pub fn insert_range(
        &mut self,
        start: u64,
        length: u64,
        kind: RangeType,
    ) -> Result<(), E820Error> {
        if length == 0 {
            return Ok(());
        }
        if self.ranges.len() + 1 >= MAX_RANGES {
            return Err(E820Error::CapacityExhausted);
        }

        self.ranges.push(MemoryRange::new(start, length, kind));
        self.sort();
        Ok(())
    }

    /// Selection sort by start address; the table is small and mostly sorted.
    fn sort(&mut self) {
        let n = self.ranges.len();
        for k in 0..n {
            let mut min = k;
            for j in (k + 1)..n {
                if self.ranges[j].start < self.ranges[min].start {
                    min = j;
                }
            }
            if min != k {
                self.ranges.swap(k, min);
            }
        }
    }

    /// Carve `length` bytes of `kind` from the highest usable range.
    ///
    /// # Errors
    /// See [`E820Map::allocate_aligned`].
    pub fn allocate(&mut self, length: u64, kind: RangeType) -> Result<u64, E820Error> {
        self.allocate_aligned(length, 1, kind)
    }

    /// Carve at least `length` bytes of `kind` from the top of the highest
    /// usable range below [`ALLOCATION_CEILING`], with the start aligned down
    /// to `align` (a power of two).
    ///
    /// The carved range spans from the aligned start to the end of the
    /// usable range, so it may be longer than `length`. A usable range that
    /// is consumed completely is retyped instead of split.
    ///
    /// # Errors
    /// * [`E820Error::NoMemory`] if no usable range is large enough or the
    ///   request is empty.
    /// * [`E820Error::CapacityExhausted`] if splitting needs a slot and none
    ///   is left; the map is unchanged in that case.
    pub fn allocate_aligned(
        &mut self,
        length: u64,
        align: u64,
        kind: RangeType,
    ) -> Result<u64, E820Error> {
        let no_memory = E820Error::NoMemory { length };
        if length == 0 || !align.is_power_of_two() {
            return Err(no_memory);
        }

        for i in (0..self.ranges.len()).rev() {
            let range = self.ranges[i];
            if !range.is_usable() || range.end() > ALLOCATION_CEILING {
                continue;
            }

            let Some(start) = range.end().checked_sub(length).map(|s| s & !(align - 1)) else {
                continue;
            };
            if start < range.start {
                continue;
            }

            if start == range.start {
                self.ranges[i].kind = kind;
            } else {
                if self.ranges.len() + 1 >= MAX_RANGES {
                    return Err(E820Error::CapacityExhausted);
                }
                self.ranges[i].length = start - range.start;
                self.insert_range(start, range.end() - start, kind)?;
            }

            debug!(
                "e820: allocated {:#x} bytes ({kind}) at {start:#010x}",
                range.end() - start
            );
            return Ok(start);
        }

        warn!("e820: no usable range for {length:#x} bytes");
        Err(no_memory)
    }

    /// Grow the range containing `address` so that it covers
    /// `[address, address + new_length)`, without encroaching on the next
    /// range.
    pub fn extend_in_place(&mut self, address: u64, new_length: u64) -> Extension {
        let Some(i) = self.ranges.iter().position(|r| r.contains(address)) else {
            return Extension::NotTracked;
        };

        let range = self.ranges[i];
        let target = address.saturating_add(new_length);
        if target <= range.end() {
            return Extension::AlreadyCovered;
        }

        if let Some(next) = self.ranges.get(i + 1)
            && target > next.start
        {
            let shortfall = target - next.start;
            warn!(
                "e820: cannot grow range at {:#010x} to {target:#010x}, next range starts at {:#010x}",
                range.start, next.start
            );
            return Extension::Blocked { shortfall };
        }

        info!(
            "e820: shifting range extent from {:#010x} -> {target:#010x}",
            range.end()
        );
        self.ranges[i].length = target - range.start;
        Extension::Extended {
            from: range.end(),
            to: target,
        }
    }

    /// Log every range.
    pub fn dump(&self) {
        for range in &self.ranges {
            info!(
                "e820: {:#018x} {:#018x} {} ({})",
                range.start,
                range.length,
                range.kind.raw(),
                range.kind
            );
        }
    }
}

impl core::fmt::Debug for E820Map {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.ranges.iter()).finish()
    }
}
