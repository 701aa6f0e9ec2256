use crate::HMAC_LEN;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// HMAC-SHA-256 (RFC 2104) over the concatenation of `chunks`.
#[must_use]
pub fn hmac_sha256(key: &[u8], chunks: &[&[u8]]) -> [u8; HMAC_LEN] {
    const BLOCK_LEN: usize = 64;
    let mut key_block = [0u8; BLOCK_LEN];
    if key.len() > BLOCK_LEN {
        let digest = Sha256::digest(key);
        key_block[..digest.len()].copy_from_slice(&digest);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut ipad = [0u8; BLOCK_LEN];
    let mut opad = [0u8; BLOCK_LEN];
    for i in 0..BLOCK_LEN {
        ipad[i] = key_block[i] ^ 0x36;
        opad[i] = key_block[i] ^ 0x5c;
    }
    crate::wipe(&mut key_block);

    let mut inner = Sha256::new();
    inner.update(ipad);
    for chunk in chunks {
        inner.update(chunk);
    }
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(opad);
    outer.update(inner_hash);
    crate::wipe(&mut ipad);
    crate::wipe(&mut opad);
    outer.finalize().into()
}

/// Constant-time comparison of two MACs.
#[must_use]
pub fn mac_eq(a: &[u8; HMAC_LEN], b: &[u8; HMAC_LEN]) -> bool {
    bool::from(a.ct_eq(b))
}
