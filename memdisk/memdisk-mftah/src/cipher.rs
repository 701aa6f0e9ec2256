use crate::{BLOCK_LEN, EncryptionType, MftahError};
use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use sha2::{Digest, Sha256};

/// AES-256 key derived from the passphrase; wiped on drop.
pub struct Key([u8; 32]);

impl Key {
    /// `SHA-256(passphrase)`.
    #[must_use]
    pub fn derive(passphrase: &[u8]) -> Self {
        Self(Sha256::digest(passphrase).into())
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        crate::wipe(&mut self.0);
    }
}

/// Decrypt `buffer` in place as one CBC chain.
///
/// # Errors
/// [`MftahError::InvalidParameter`] if `buffer` is not a whole number of blocks.
pub fn decrypt_chain(
    enc_type: EncryptionType,
    key: &Key,
    iv: &[u8; BLOCK_LEN],
    buffer: &mut [u8],
) -> Result<(), MftahError> {
    match enc_type {
        EncryptionType::Aes256Cbc => {
            cbc::Decryptor::<Aes256>::new_from_slices(key.as_bytes(), iv)
                .map_err(|_| MftahError::InvalidParameter)?
                .decrypt_padded_mut::<NoPadding>(buffer)
                .map_err(|_| MftahError::InvalidParameter)?;
        }
    }
    Ok(())
}

/// Encrypt `buffer` in place as one CBC chain.
///
/// # Errors
/// [`MftahError::InvalidParameter`] if `buffer` is not a whole number of blocks.
#[cfg(any(test, feature = "encrypt"))]
pub fn encrypt_chain(
    enc_type: EncryptionType,
    key: &Key,
    iv: &[u8; BLOCK_LEN],
    buffer: &mut [u8],
) -> Result<(), MftahError> {
    use cbc::cipher::BlockEncryptMut;

    let length = buffer.len();
    match enc_type {
        EncryptionType::Aes256Cbc => {
            cbc::Encryptor::<Aes256>::new_from_slices(key.as_bytes(), iv)
                .map_err(|_| MftahError::InvalidParameter)?
                .encrypt_padded_mut::<NoPadding>(buffer, length)
                .map_err(|_| MftahError::InvalidParameter)?;
        }
    }
    Ok(())
}
