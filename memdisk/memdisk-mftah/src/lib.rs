//! # MFTAH Payloads
//!
//! Authenticates and decrypts an MFTAH payload image in place.
//!
//! ## Image Layout
//!
//! | Offset | Size | Field                          | Encrypted |
//! |--------|------|--------------------------------|-----------|
//! | `0x00` | 16   | public initialization vector   | no        |
//! | `0x10` | 32   | wrapper HMAC                   | no        |
//! | `0x30` | 32   | original-content HMAC          | no        |
//! | `0x50` | 1    | encryption type                | no        |
//! | `0x51` | 1    | HMAC type                      | no        |
//! | `0x52` | 1    | format version                 | no        |
//! | `0x60` | 8    | signature `"MFTAHPLD"`         | yes       |
//! | `0x68` | 8    | payload length                 | yes       |
//! | `0x70` | 1    | thread count                   | yes       |
//! | `0x71` | 8    | IV seeds                       | yes       |
//! | `0x79` | 1    | IV seed step                   | yes       |
//! | `0x80` |      | ciphertext, padded to 16 bytes | yes       |
//!
//! ## Pipeline
//!
//! [`decrypt`] runs strictly in order and stops at the first failure:
//! 1. The key is `SHA-256(passphrase)`.
//! 2. A copy of the encrypted header part is decrypted with the public IV;
//!    a missing signature means the passphrase was wrong.
//! 3. The declared payload length must fit the image.
//! 4. The wrapper HMAC (keyed with the raw passphrase) over the encrypted
//!    header part and the ciphertext must match, then the thread count is
//!    checked.
//! 5. The decrypted header replaces the encrypted one in the image.
//! 6. The ciphertext is decrypted chunk by chunk, each chunk with its own
//!    IV derived by [`mix_vectors`] (see [`plan`]).
//! 7. The signature is checked again and the HMAC over the plaintext must
//!    match the original HMAC.
//!
//! Every failure is a distinct [`MftahError`] with a stable numeric
//! [`code`](MftahError::code).
//!
//! ## Features
//! * `encrypt`: [`encrypt_in_place`], the inverse pipeline used by the
//!   packing tool.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod cipher;
mod header;
mod hmac;
mod orders;

#[cfg(test)]
mod tests;

pub use cipher::Key;
pub use header::{
    BLOCK_LEN, ENCRYPTED_LEN, ENCRYPTED_OFFSET, EncryptionType, FORMAT_VERSION, HEADER_LEN,
    HMAC_LEN, HmacType, MAX_THREAD_COUNT, PAYLOAD_SIGNATURE, PayloadHeader, SEED_COUNT,
};
pub use hmac::{hmac_sha256, mac_eq};
pub use orders::{Vectors, WorkOrder, mix_vectors, plan};

use log::{debug, info, trace};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MftahError {
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("invalid password")]
    InvalidPassword,
    #[error("payload claims {declared} bytes but only {available} are present")]
    BadPayloadLength { declared: u64, available: u64 },
    #[error("thread count {0} exceeds the maximum of 64")]
    InvalidThreadCount(u8),
    #[error("unsupported encryption type {0}")]
    InvalidEncryptionType(u8),
    #[error("unsupported HMAC type {0}")]
    InvalidHmacType(u8),
    #[error("wrapper HMAC mismatch")]
    BadWrapperHmac,
    #[error("payload signature missing after decryption")]
    InvalidSignature,
    #[error("original HMAC mismatch")]
    BadOriginalHmac,
}

impl MftahError {
    /// Stable status code; `0` is reserved for success.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::InvalidParameter => 1,
            Self::InvalidPassword => 2,
            Self::BadPayloadLength { .. } => 3,
            Self::InvalidThreadCount(_) => 4,
            Self::InvalidEncryptionType(_) => 5,
            Self::InvalidHmacType(_) => 6,
            Self::BadWrapperHmac => 7,
            Self::InvalidSignature => 8,
            Self::BadOriginalHmac => 9,
        }
    }
}

/// Overwrite `bytes` with zeros in a way the optimizer keeps.
pub fn wipe(bytes: &mut [u8]) {
    for byte in bytes.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference.
        unsafe { core::ptr::write_volatile(byte, 0) };
    }
    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
}

/// Authenticate and decrypt the payload image in place. On success the
/// image holds the decrypted header followed by the plaintext.
///
/// `image` is the whole buffer the payload was loaded into; the declared
/// payload must fit into it.
///
/// # Errors
/// See [`MftahError`]. The image is untouched unless the wrapper HMAC
/// verified.
pub fn decrypt(image: &mut [u8], passphrase: &[u8]) -> Result<PayloadHeader, MftahError> {
    if passphrase.is_empty() || image.len() < HEADER_LEN {
        return Err(MftahError::InvalidParameter);
    }

    let key = Key::derive(passphrase);
    debug!("mftah: passphrase hashed");

    let mut saved = [0u8; HEADER_LEN];
    saved.copy_from_slice(&image[..HEADER_LEN]);
    let public = PayloadHeader::from_bytes(&saved);
    let enc_type = EncryptionType::try_from(public.encryption_type)?;

    info!("mftah: decrypting header");
    cipher::decrypt_chain(
        enc_type,
        &key,
        &public.initialization_vector,
        &mut saved[ENCRYPTED_OFFSET..],
    )?;
    let header = PayloadHeader::from_bytes(&saved);
    if !header.has_signature() {
        wipe(&mut saved);
        return Err(MftahError::InvalidPassword);
    }
    trace!("mftah: {header:?}");

    let available = (image.len() - HEADER_LEN) as u64;
    let declared = header.payload_length;
    let padded = header
        .padded_length()
        .filter(|&p| p <= available)
        .ok_or(MftahError::BadPayloadLength {
            declared,
            available,
        })?;
    let padded = usize::try_from(padded).map_err(|_| MftahError::InvalidParameter)?;

    info!("mftah: checking wrapper HMAC");
    let hmac_type = HmacType::try_from(header.hmac_type)?;
    let wrapper = match hmac_type {
        HmacType::Sha256 => hmac_sha256(passphrase, &[&image[ENCRYPTED_OFFSET..HEADER_LEN + padded]]),
    };
    if !mac_eq(&wrapper, &header.wrapper_hmac) {
        return Err(MftahError::BadWrapperHmac);
    }

    let threads = header.threads();
    if threads > MAX_THREAD_COUNT {
        return Err(MftahError::InvalidThreadCount(threads));
    }

    image[..HEADER_LEN].copy_from_slice(&saved);
    wipe(&mut saved);

    let vectors = mix_vectors(
        &header.initialization_vector,
        &header.iv_seeds,
        header.iv_seed_step,
        threads,
    );
    let (_, body) = image.split_at_mut(HEADER_LEN);
    info!("mftah: decrypting {padded} bytes across {threads} vector(s)");
    for order in plan(padded, threads, enc_type, hmac_type) {
        debug!(
            "mftah: order {:02}: {:#x} : {:#x}",
            order.thread_index, order.offset, order.length
        );
        cipher::decrypt_chain(
            order.enc_type,
            &key,
            &vectors[usize::from(order.thread_index)],
            &mut body[order.offset..order.end()],
        )?;
    }

    let mut committed = [0u8; HEADER_LEN];
    committed.copy_from_slice(&image[..HEADER_LEN]);
    if !PayloadHeader::from_bytes(&committed).has_signature() {
        return Err(MftahError::InvalidSignature);
    }

    info!("mftah: checking original HMAC");
    let length = usize::try_from(declared).map_err(|_| MftahError::InvalidParameter)?;
    let original = hmac_sha256(passphrase, &[&image[HEADER_LEN..HEADER_LEN + length]]);
    if !mac_eq(&original, &header.original_hmac) {
        return Err(MftahError::BadOriginalHmac);
    }

    info!("mftah: payload ok ({declared} bytes)");
    Ok(header)
}

/// Parameters of a new payload image.
#[cfg(any(test, feature = "encrypt"))]
#[derive(Copy, Clone, Debug, Default)]
pub struct EncryptParams {
    pub initialization_vector: [u8; BLOCK_LEN],
    pub iv_seeds: [u8; SEED_COUNT],
    pub iv_seed_step: u8,
    /// `0` is stored as is and read back as one.
    pub thread_count: u8,
}

/// Total image size for a payload of `payload_length` bytes.
#[must_use]
pub const fn image_len(payload_length: usize) -> usize {
    HEADER_LEN + payload_length.next_multiple_of(BLOCK_LEN)
}

/// Turn `image` into a payload image in place. The plaintext must already
/// sit at [`HEADER_LEN`], followed by zero padding up to
/// [`image_len`]`(payload_length)`; the header bytes are overwritten.
///
/// Returns the header as it reads after decryption.
///
/// # Errors
/// * [`MftahError::InvalidParameter`] for an empty passphrase or a short image.
/// * [`MftahError::InvalidThreadCount`] for more than [`MAX_THREAD_COUNT`] threads.
#[cfg(any(test, feature = "encrypt"))]
pub fn encrypt_in_place(
    image: &mut [u8],
    payload_length: usize,
    passphrase: &[u8],
    params: &EncryptParams,
) -> Result<PayloadHeader, MftahError> {
    if passphrase.is_empty() || image.len() < image_len(payload_length) {
        return Err(MftahError::InvalidParameter);
    }
    if params.thread_count > MAX_THREAD_COUNT {
        return Err(MftahError::InvalidThreadCount(params.thread_count));
    }

    let key = Key::derive(passphrase);
    let padded = payload_length.next_multiple_of(BLOCK_LEN);
    let mut header = PayloadHeader {
        initialization_vector: params.initialization_vector,
        original_hmac: hmac_sha256(passphrase, &[&image[HEADER_LEN..HEADER_LEN + payload_length]]),
        payload_length: payload_length as u64,
        thread_count: params.thread_count,
        iv_seeds: params.iv_seeds,
        iv_seed_step: params.iv_seed_step,
        ..PayloadHeader::default()
    };

    let threads = header.threads();
    let vectors = mix_vectors(
        &header.initialization_vector,
        &header.iv_seeds,
        header.iv_seed_step,
        threads,
    );
    let (_, body) = image.split_at_mut(HEADER_LEN);
    for order in plan(padded, threads, EncryptionType::Aes256Cbc, HmacType::Sha256) {
        cipher::encrypt_chain(
            order.enc_type,
            &key,
            &vectors[usize::from(order.thread_index)],
            &mut body[order.offset..order.end()],
        )?;
    }

    seal(image, &mut header, passphrase, &key, padded)?;
    Ok(header)
}

/// Write `header` into the image, encrypt its secret part and compute the
/// wrapper HMAC over it and the `padded` ciphertext bytes.
#[cfg(any(test, feature = "encrypt"))]
fn seal(
    image: &mut [u8],
    header: &mut PayloadHeader,
    passphrase: &[u8],
    key: &Key,
    padded: usize,
) -> Result<(), MftahError> {
    let mut bytes = header.to_bytes();
    cipher::encrypt_chain(
        EncryptionType::try_from(header.encryption_type)?,
        key,
        &header.initialization_vector,
        &mut bytes[ENCRYPTED_OFFSET..],
    )?;
    image[..HEADER_LEN].copy_from_slice(&bytes);

    header.wrapper_hmac = hmac_sha256(passphrase, &[&image[ENCRYPTED_OFFSET..HEADER_LEN + padded]]);
    let at = core::mem::offset_of!(PayloadHeader, wrapper_hmac);
    image[at..at + HMAC_LEN].copy_from_slice(&header.wrapper_hmac);
    Ok(())
}
