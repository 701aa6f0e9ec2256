//! # Physical Memory Access
//!
//! The loader runs with physical memory identity-mapped and mutates firmware
//! structures (the e820 map, ACPI tables, the decrypted payload) in place.
//! This crate puts a bounds-checked seam in front of that access so the
//! table engines above it never dereference raw addresses themselves.
//!
//! ## Key Components
//!
//! ### Spans ([`PhysSpan`])
//! A `(base, len)` pair naming a physical byte range. All accessors take a
//! span and fail with [`MemoryError`] instead of faulting when the range is
//! not backed.
//!
//! ### Memory Backends ([`PhysMemory`])
//! * [`IdentityMemory`]: physical address == pointer value, used by the
//!   real loader.
//! * [`BufferMemory`]: a byte buffer pretending to live at a physical base
//!   address, used by host-side tests and fixtures.
//!
//! Both expose little-endian scalar accessors, bulk copies that tolerate
//! overlapping ranges, fills and the ACPI-style byte checksum.
//!
//! ### Diagnostics ([`HexDump`])
//! A `Display` adapter printing a region as a classic 16-bytes-per-line hex
//! dump, intended for `log::trace!` output.
//!
//! ## Usage
//!
//! ```rust
//! use memdisk_physmem::{BufferMemory, PhysMemory, PhysSpan};
//!
//! let mut mem = BufferMemory::new(0x1000, [0u8; 64]);
//! mem.write_u32(0x1004, 0xDEAD_BEEF).unwrap();
//! assert_eq!(mem.read_u32(0x1004).unwrap(), 0xDEAD_BEEF);
//! assert!(mem.slice(PhysSpan::new(0x1030, 32)).is_err());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod dump;

use core::fmt;
pub use dump::HexDump;

/// A physical byte range.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct PhysSpan {
    pub base: u64,
    pub len: usize,
}

impl PhysSpan {
    #[inline]
    #[must_use]
    pub const fn new(base: u64, len: usize) -> Self {
        Self { base, len }
    }

    /// Exclusive end address, or `None` if the span wraps the address space.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> Option<u64> {
        self.base.checked_add(self.len as u64)
    }

    /// Whether `addr` lies inside `[base, end)`.
    #[inline]
    #[must_use]
    pub const fn contains(&self, addr: u64) -> bool {
        match self.end() {
            Some(end) => addr >= self.base && addr < end,
            None => addr >= self.base,
        }
    }
}

impl fmt::Debug for PhysSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysSpan({:#x}+{:#x})", self.base, self.len)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MemoryError {
    #[error("access to the null page")]
    Null,
    #[error("physical range {0:?} wraps the address space")]
    Overflow(PhysSpan),
    #[error("physical range {0:?} is not backed by memory")]
    OutOfBounds(PhysSpan),
}

/// Bounds-checked access to physical memory.
///
/// Implementors only provide the two slice accessors; everything else is
/// built on top of them.
pub trait PhysMemory {
    /// Borrow `span` read-only.
    ///
    /// # Errors
    /// Fails if any byte of the span is not backed by this memory.
    fn slice(&self, span: PhysSpan) -> Result<&[u8], MemoryError>;

    /// Borrow `span` mutably.
    ///
    /// # Errors
    /// Fails if any byte of the span is not backed by this memory.
    fn slice_mut(&mut self, span: PhysSpan) -> Result<&mut [u8], MemoryError>;

    /// Whether the whole span can be accessed.
    fn is_mapped(&self, span: PhysSpan) -> bool {
        self.slice(span).is_ok()
    }

    /// Read `N` bytes starting at `addr`.
    ///
    /// # Errors
    /// See [`PhysMemory::slice`].
    fn read_array<const N: usize>(&self, addr: u64) -> Result<[u8; N], MemoryError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(PhysSpan::new(addr, N))?);
        Ok(out)
    }

    /// # Errors
    /// See [`PhysMemory::slice`].
    fn read_u8(&self, addr: u64) -> Result<u8, MemoryError> {
        Ok(self.read_array::<1>(addr)?[0])
    }

    /// # Errors
    /// See [`PhysMemory::slice`].
    fn read_u16(&self, addr: u64) -> Result<u16, MemoryError> {
        self.read_array(addr).map(u16::from_le_bytes)
    }

    /// # Errors
    /// See [`PhysMemory::slice`].
    fn read_u32(&self, addr: u64) -> Result<u32, MemoryError> {
        self.read_array(addr).map(u32::from_le_bytes)
    }

    /// # Errors
    /// See [`PhysMemory::slice`].
    fn read_u64(&self, addr: u64) -> Result<u64, MemoryError> {
        self.read_array(addr).map(u64::from_le_bytes)
    }

    /// # Errors
    /// See [`PhysMemory::slice_mut`].
    fn write_bytes(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        self.slice_mut(PhysSpan::new(addr, bytes.len()))?
            .copy_from_slice(bytes);
        Ok(())
    }

    /// # Errors
    /// See [`PhysMemory::slice_mut`].
    fn write_u8(&mut self, addr: u64, value: u8) -> Result<(), MemoryError> {
        self.write_bytes(addr, &[value])
    }

    /// # Errors
    /// See [`PhysMemory::slice_mut`].
    fn write_u16(&mut self, addr: u64, value: u16) -> Result<(), MemoryError> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// # Errors
    /// See [`PhysMemory::slice_mut`].
    fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), MemoryError> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// # Errors
    /// See [`PhysMemory::slice_mut`].
    fn write_u64(&mut self, addr: u64, value: u64) -> Result<(), MemoryError> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Set every byte of `span` to `value`.
    ///
    /// # Errors
    /// See [`PhysMemory::slice_mut`].
    fn fill(&mut self, span: PhysSpan, value: u8) -> Result<(), MemoryError> {
        self.slice_mut(span)?.fill(value);
        Ok(())
    }

    /// Copy `len` bytes from `from` to `to`. Overlapping ranges behave like
    /// `memmove`.
    ///
    /// # Errors
    /// Fails before touching anything if either range is not backed.
    fn copy(&mut self, from: u64, to: u64, len: usize) -> Result<(), MemoryError> {
        self.slice(PhysSpan::new(from, len))?;
        self.slice_mut(PhysSpan::new(to, len))?;

        let mut bounce = [0u8; 256];
        let backward = to > from && to - from < len as u64;
        let mut done = 0;
        while done < len {
            let n = (len - done).min(bounce.len());
            let offset = (if backward { len - done - n } else { done }) as u64;
            bounce[..n].copy_from_slice(self.slice(PhysSpan::new(from + offset, n))?);
            self.write_bytes(to + offset, &bounce[..n])?;
            done += n;
        }
        Ok(())
    }

    /// Wrapping byte sum of `span`; zero for a well-formed ACPI table.
    ///
    /// # Errors
    /// See [`PhysMemory::slice`].
    fn checksum(&self, span: PhysSpan) -> Result<u8, MemoryError> {
        self.slice(span).map(sum)
    }
}

/// Wrapping 8-bit sum as used by every ACPI checksum.
#[must_use]
pub fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |a, &b| a.wrapping_add(b))
}

/// Identity-mapped physical memory below `limit`.
pub struct IdentityMemory {
    limit: u64,
}

impl IdentityMemory {
    /// # Safety
    /// Every address in `[1, limit)` must be identity-mapped, readable and
    /// writable, and nothing else may hold references into that memory while
    /// this value is alive.
    #[must_use]
    pub const unsafe fn new(limit: u64) -> Self {
        Self { limit }
    }

    fn check(&self, span: PhysSpan) -> Result<(), MemoryError> {
        if span.base == 0 {
            return Err(MemoryError::Null);
        }
        let end = span.end().ok_or(MemoryError::Overflow(span))?;
        if end > self.limit {
            return Err(MemoryError::OutOfBounds(span));
        }
        Ok(())
    }
}

impl PhysMemory for IdentityMemory {
    fn slice(&self, span: PhysSpan) -> Result<&[u8], MemoryError> {
        self.check(span)?;
        // SAFETY: the constructor contract covers every checked span.
        Ok(unsafe { core::slice::from_raw_parts(span.base as *const u8, span.len) })
    }

    fn slice_mut(&mut self, span: PhysSpan) -> Result<&mut [u8], MemoryError> {
        self.check(span)?;
        // SAFETY: as above; `&mut self` rules out aliasing through this handle.
        Ok(unsafe { core::slice::from_raw_parts_mut(span.base as *mut u8, span.len) })
    }
}

/// A byte buffer standing in for the physical range starting at `base`.
pub struct BufferMemory<B> {
    base: u64,
    buffer: B,
}

impl<B> BufferMemory<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    #[must_use]
    pub const fn new(base: u64, buffer: B) -> Self {
        Self { base, buffer }
    }

    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// The whole backing range.
    #[must_use]
    pub fn span(&self) -> PhysSpan {
        PhysSpan::new(self.base, self.buffer.as_ref().len())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_ref()
    }

    pub fn into_inner(self) -> B {
        self.buffer
    }

    fn offset(&self, span: PhysSpan) -> Result<usize, MemoryError> {
        if span.base == 0 {
            return Err(MemoryError::Null);
        }
        let end = span.end().ok_or(MemoryError::Overflow(span))?;
        let len = self.buffer.as_ref().len() as u64;
        if span.base < self.base || end > self.base + len {
            return Err(MemoryError::OutOfBounds(span));
        }
        usize::try_from(span.base - self.base).map_err(|_| MemoryError::OutOfBounds(span))
    }
}

impl<B> PhysMemory for BufferMemory<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    fn slice(&self, span: PhysSpan) -> Result<&[u8], MemoryError> {
        let offset = self.offset(span)?;
        Ok(&self.buffer.as_ref()[offset..offset + span.len])
    }

    fn slice_mut(&mut self, span: PhysSpan) -> Result<&mut [u8], MemoryError> {
        let offset = self.offset(span)?;
        Ok(&mut self.buffer.as_mut()[offset..offset + span.len])
    }
}
