use crate::cipher::{self, Key};
use crate::{
    BLOCK_LEN, EncryptParams, EncryptionType, HEADER_LEN, MftahError, PayloadHeader, decrypt,
    encrypt_in_place, image_len, seal,
};

const PASSPHRASE: &[u8] = b"correct horse battery staple";

fn params(threads: u8) -> EncryptParams {
    EncryptParams {
        initialization_vector: *b"0123456789abcdef",
        iv_seeds: [0x3C, 0xA1, 0x07, 0x99, 0x42, 0xE5, 0x18, 0x6B],
        iv_seed_step: 0x5D,
        thread_count: threads,
    }
}

fn plaintext(length: usize) -> Vec<u8> {
    (0..length).map(|i| u8::try_from(i * 7 % 256).unwrap()).collect()
}

/// Encrypt `plain` into a fresh image.
fn packed(plain: &[u8], threads: u8) -> (Vec<u8>, PayloadHeader) {
    let mut image = vec![0u8; image_len(plain.len())];
    image[HEADER_LEN..HEADER_LEN + plain.len()].copy_from_slice(plain);
    let header = encrypt_in_place(&mut image, plain.len(), PASSPHRASE, &params(threads)).unwrap();
    (image, header)
}

/// Rewrite the header of an encrypted image with a valid wrapper HMAC.
fn reseal(image: &mut [u8], mut header: PayloadHeader) {
    let padded = image.len() - HEADER_LEN;
    let key = Key::derive(PASSPHRASE);
    seal(image, &mut header, PASSPHRASE, &key, padded).unwrap();
}

#[test]
fn round_trip_recovers_the_plaintext() {
    for (length, threads) in [(17, 1), (4096, 1), (1000, 3), (5000, 8), (5000, 9), (3000, 0)] {
        let plain = plaintext(length);
        let (mut image, sealed) = packed(&plain, threads);
        assert_ne!(&image[HEADER_LEN..HEADER_LEN + length], plain.as_slice());

        let header = decrypt(&mut image, PASSPHRASE).unwrap();
        assert_eq!(&image[HEADER_LEN..HEADER_LEN + length], plain.as_slice());
        assert!(header.has_signature());
        let (declared, expected) = (header.payload_length, length as u64);
        assert_eq!(declared, expected);
        assert_eq!(header.thread_count, threads);
        assert_eq!(header.wrapper_hmac, sealed.wrapper_hmac);

        // the live header is committed in the clear
        assert_eq!(&image[0x60..0x68], b"MFTAHPLD");
    }
}

#[test]
fn single_chain_is_plain_cbc_under_the_public_iv() {
    let plain = plaintext(256);
    let (mut image, _) = packed(&plain, 1);

    let mut body = image[HEADER_LEN..].to_vec();
    cipher::decrypt_chain(
        EncryptionType::Aes256Cbc,
        &Key::derive(PASSPHRASE),
        b"0123456789abcdef",
        &mut body,
    )
    .unwrap();
    assert_eq!(body, plain);

    decrypt(&mut image, PASSPHRASE).unwrap();
    assert_eq!(&image[HEADER_LEN..], plain.as_slice());
}

#[test]
fn wrong_passphrase_is_an_invalid_password() {
    let (mut image, _) = packed(&plaintext(100), 2);
    let before = image.clone();
    assert_eq!(
        decrypt(&mut image, b"Tr0ub4dor&3"),
        Err(MftahError::InvalidPassword)
    );
    assert_eq!(image, before);
}

#[test]
fn empty_passphrase_and_short_images_are_invalid() {
    let (mut image, _) = packed(&plaintext(100), 2);
    assert_eq!(decrypt(&mut image, b""), Err(MftahError::InvalidParameter));
    assert_eq!(
        decrypt(&mut image[..HEADER_LEN - 1], PASSPHRASE),
        Err(MftahError::InvalidParameter)
    );
}

#[test]
fn payload_longer_than_the_buffer_is_rejected() {
    let (mut image, _) = packed(&plaintext(100), 1);
    assert_eq!(
        decrypt(&mut image[..HEADER_LEN + 64], PASSPHRASE),
        Err(MftahError::BadPayloadLength {
            declared: 100,
            available: 64
        })
    );
}

#[test]
fn flipped_ciphertext_fails_the_wrapper_hmac() {
    let (mut image, _) = packed(&plaintext(512), 4);
    image[HEADER_LEN + 300] ^= 0x01;
    let before = image.clone();
    assert_eq!(decrypt(&mut image, PASSPHRASE), Err(MftahError::BadWrapperHmac));
    assert_eq!(image, before);
}

#[test]
fn flipped_header_blocks_fail_in_order() {
    // first encrypted block holds the signature
    let (mut image, _) = packed(&plaintext(64), 1);
    image[0x60] ^= 0x80;
    assert_eq!(decrypt(&mut image, PASSPHRASE), Err(MftahError::InvalidPassword));

    // second block only garbles the thread count and seeds
    let (mut image, _) = packed(&plaintext(64), 1);
    image[0x78] ^= 0x80;
    assert_eq!(decrypt(&mut image, PASSPHRASE), Err(MftahError::BadWrapperHmac));
}

#[test]
fn unknown_algorithms_are_reported() {
    let (mut image, _) = packed(&plaintext(64), 1);
    image[0x50] = 7;
    assert_eq!(
        decrypt(&mut image, PASSPHRASE),
        Err(MftahError::InvalidEncryptionType(7))
    );

    let (mut image, _) = packed(&plaintext(64), 1);
    image[0x51] = 9;
    assert_eq!(
        decrypt(&mut image, PASSPHRASE),
        Err(MftahError::InvalidHmacType(9))
    );
}

#[test]
fn thread_count_is_checked_after_the_wrapper() {
    let (mut image, header) = packed(&plaintext(64), 1);
    reseal(
        &mut image,
        PayloadHeader {
            thread_count: 65,
            ..header
        },
    );
    assert_eq!(
        decrypt(&mut image, PASSPHRASE),
        Err(MftahError::InvalidThreadCount(65))
    );

    assert_eq!(
        encrypt_in_place(&mut image, 64, PASSPHRASE, &params(65)).map(|_| ()),
        Err(MftahError::InvalidThreadCount(65))
    );
}

#[test]
fn tampered_plaintext_fails_the_original_hmac() {
    let plain = plaintext(200);
    let (_, original) = packed(&plain, 3);

    // same parameters, different content, but the original HMAC of the
    // untampered payload
    let mut tampered = plain.clone();
    tampered[10] ^= 0xFF;
    let (mut image, header) = packed(&tampered, 3);
    reseal(
        &mut image,
        PayloadHeader {
            original_hmac: original.original_hmac,
            ..header
        },
    );

    assert_eq!(decrypt(&mut image, PASSPHRASE), Err(MftahError::BadOriginalHmac));
}

#[test]
fn codes_are_distinct() {
    let all = [
        MftahError::InvalidParameter,
        MftahError::InvalidPassword,
        MftahError::BadPayloadLength {
            declared: 0,
            available: 0,
        },
        MftahError::InvalidThreadCount(0),
        MftahError::InvalidEncryptionType(0),
        MftahError::InvalidHmacType(0),
        MftahError::BadWrapperHmac,
        MftahError::InvalidSignature,
        MftahError::BadOriginalHmac,
    ];
    let mut codes: Vec<u32> = all.iter().map(MftahError::code).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), all.len());
    assert!(!codes.contains(&0));
}

#[test]
fn image_length_pads_to_whole_blocks() {
    assert_eq!(image_len(0), HEADER_LEN);
    assert_eq!(image_len(1), HEADER_LEN + BLOCK_LEN);
    assert_eq!(image_len(32), HEADER_LEN + 32);
}
