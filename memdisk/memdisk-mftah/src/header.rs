use crate::MftahError;
use core::ptr::{read_unaligned, write_unaligned};

/// Marker at the start of the encrypted header region. Finding it after
/// decrypting the header proves the passphrase was right.
pub const PAYLOAD_SIGNATURE: &[u8; 8] = b"MFTAHPLD";

/// Size of the complete header; the ciphertext starts right after it.
pub const HEADER_LEN: usize = size_of::<PayloadHeader>();

/// Offset of the header part that is encrypted along with the payload.
pub const ENCRYPTED_OFFSET: usize = 0x60;

/// Length of the encrypted header part, two AES blocks.
pub const ENCRYPTED_LEN: usize = HEADER_LEN - ENCRYPTED_OFFSET;

pub const BLOCK_LEN: usize = 16;
pub const SEED_COUNT: usize = 8;
pub const HMAC_LEN: usize = 32;

/// Upper bound for [`PayloadHeader::thread_count`].
pub const MAX_THREAD_COUNT: u8 = 64;

/// Current payload format version.
pub const FORMAT_VERSION: u8 = 1;

const _: () = assert!(HEADER_LEN == 128);
const _: () = assert!(ENCRYPTED_LEN == 2 * BLOCK_LEN);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum EncryptionType {
    Aes256Cbc = 1,
}

impl TryFrom<u8> for EncryptionType {
    type Error = MftahError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Aes256Cbc),
            other => Err(MftahError::InvalidEncryptionType(other)),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum HmacType {
    Sha256 = 1,
}

impl TryFrom<u8> for HmacType {
    type Error = MftahError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Sha256),
            other => Err(MftahError::InvalidHmacType(other)),
        }
    }
}

/// Fixed-size header at the start of every MFTAH payload image.
///
/// Everything up to [`ENCRYPTED_OFFSET`] is stored in the clear. The
/// remaining two blocks are encrypted with the public IV and only become
/// readable with the right passphrase.
#[repr(C, packed)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Public IV; decrypts the header and seeds the per-order IV chain.
    pub initialization_vector: [u8; BLOCK_LEN],

    /// HMAC over the encrypted header part and the ciphertext.
    pub wrapper_hmac: [u8; HMAC_LEN],

    /// HMAC over the plaintext payload.
    pub original_hmac: [u8; HMAC_LEN],

    /// See [`EncryptionType`].
    pub encryption_type: u8,

    /// See [`HmacType`].
    pub hmac_type: u8,

    pub version: u8,

    pub reserved: [u8; 13],

    /// [`PAYLOAD_SIGNATURE`] once decrypted.
    pub signature: [u8; 8],

    /// Plaintext length in bytes, without block padding.
    pub payload_length: u64,

    /// Number of independently chained chunks; `0` means one.
    pub thread_count: u8,

    pub iv_seeds: [u8; SEED_COUNT],

    pub iv_seed_step: u8,

    pub reserved_encrypted: [u8; 6],
}

impl Default for PayloadHeader {
    fn default() -> Self {
        Self {
            initialization_vector: [0; BLOCK_LEN],
            wrapper_hmac: [0; HMAC_LEN],
            original_hmac: [0; HMAC_LEN],
            encryption_type: EncryptionType::Aes256Cbc as u8,
            hmac_type: HmacType::Sha256 as u8,
            version: FORMAT_VERSION,
            reserved: [0; 13],
            signature: *PAYLOAD_SIGNATURE,
            payload_length: 0,
            thread_count: 1,
            iv_seeds: [0; SEED_COUNT],
            iv_seed_step: 0,
            reserved_encrypted: [0; 6],
        }
    }
}

impl PayloadHeader {
    #[must_use]
    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Self {
        // SAFETY: the array holds exactly one packed header.
        unsafe { read_unaligned(bytes.as_ptr().cast::<Self>()) }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        // SAFETY: the array is exactly one packed header long.
        unsafe { write_unaligned(out.as_mut_ptr().cast::<Self>(), *self) };
        out
    }

    /// Whether the decrypted signature is intact.
    #[must_use]
    pub fn has_signature(&self) -> bool {
        self.signature == *PAYLOAD_SIGNATURE
    }

    /// Thread count with `0` read as one.
    #[must_use]
    pub fn threads(&self) -> u8 {
        self.thread_count.max(1)
    }

    /// Ciphertext length: the payload length rounded up to whole blocks.
    #[must_use]
    pub fn padded_length(&self) -> Option<u64> {
        let length = self.payload_length;
        length.checked_next_multiple_of(BLOCK_LEN as u64)
    }
}

impl core::fmt::Debug for PayloadHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let payload_length = self.payload_length;
        f.debug_struct("PayloadHeader")
            .field("encryption_type", &self.encryption_type)
            .field("hmac_type", &self.hmac_type)
            .field("version", &self.version)
            .field("payload_length", &payload_length)
            .field("thread_count", &self.thread_count)
            .field("iv_seed_step", &self.iv_seed_step)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_offsets_match_the_image_format() {
        let header = PayloadHeader {
            payload_length: 0x0102_0304_0506_0708,
            thread_count: 9,
            iv_seed_step: 0xA5,
            ..PayloadHeader::default()
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[0x50], 1);
        assert_eq!(bytes[0x51], 1);
        assert_eq!(&bytes[0x60..0x68], PAYLOAD_SIGNATURE);
        assert_eq!(&bytes[0x68..0x70], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(bytes[0x70], 9);
        assert_eq!(bytes[0x79], 0xA5);

        let back = PayloadHeader::from_bytes(&bytes);
        assert!(back.has_signature());
        assert_eq!(back.threads(), 9);
    }

    #[test]
    fn zero_threads_means_one() {
        let header = PayloadHeader {
            thread_count: 0,
            ..PayloadHeader::default()
        };
        assert_eq!(header.threads(), 1);
    }

    #[test]
    fn padding_rounds_up_to_blocks() {
        let mut header = PayloadHeader::default();
        for (length, padded) in [(0, 0), (1, 16), (16, 16), (17, 32)] {
            header.payload_length = length;
            assert_eq!(header.padded_length(), Some(padded));
        }
        header.payload_length = u64::MAX;
        assert_eq!(header.padded_length(), None);
    }

    #[test]
    fn unknown_algorithms_are_rejected() {
        assert_eq!(EncryptionType::try_from(1), Ok(EncryptionType::Aes256Cbc));
        assert_eq!(
            EncryptionType::try_from(2),
            Err(MftahError::InvalidEncryptionType(2))
        );
        assert_eq!(HmacType::try_from(0), Err(MftahError::InvalidHmacType(0)));
    }
}
