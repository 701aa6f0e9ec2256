use core::fmt;

/// Hex dump of a byte region, 16 bytes per line, prefixed with the physical
/// address of the first byte on each line.
///
/// ```text
/// 000e0000: 52 53 44 20 50 54 52 20 8e 4d 46 54 41 48 20 02  |RSD PTR .MFTAH .|
/// ```
pub struct HexDump<'a> {
    address: u64,
    bytes: &'a [u8],
}

impl<'a> HexDump<'a> {
    #[must_use]
    pub const fn new(address: u64, bytes: &'a [u8]) -> Self {
        Self { address, bytes }
    }
}

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (line, chunk) in self.bytes.chunks(16).enumerate() {
            if line > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{:08x}:", self.address + (line as u64) * 16)?;
            for i in 0..16 {
                match chunk.get(i) {
                    Some(b) => write!(f, " {b:02x}")?,
                    None => f.write_str("   ")?,
                }
            }
            f.write_str("  |")?;
            for &b in chunk {
                let c = if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                };
                write!(f, "{c}")?;
            }
            f.write_str("|")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_partial_lines() {
        let bytes = *b"RSD PTR \x8eMFTAH \x02abc";
        let text = HexDump::new(0xE0000, &bytes).to_string();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("000e0000: 52 53 44 20 50 54 52 20 8e 4d 46 54 41 48 20 02  |RSD PTR .MFTAH .|")
        );
        assert_eq!(
            lines.next(),
            Some(
                "000e0010: 61 62 63                                         |abc|"
            )
        );
        assert_eq!(lines.next(), None);
    }
}
