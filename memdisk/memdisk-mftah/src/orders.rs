//! # Work Orders
//!
//! The ciphertext is split into up to [`MAX_THREAD_COUNT`] chunks, each
//! encrypted as its own CBC chain with its own IV. The packer may run those
//! chains in parallel; the loader walks them in issue order.

use crate::{BLOCK_LEN, EncryptionType, HmacType, MAX_THREAD_COUNT};
use arrayvec::ArrayVec;

/// One IV per work order.
pub type Vectors = ArrayVec<[u8; BLOCK_LEN], { MAX_THREAD_COUNT as usize }>;

/// One chunk of the ciphertext with its own CBC chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WorkOrder {
    /// Offset from the start of the ciphertext.
    pub offset: usize,
    pub length: usize,
    pub thread_index: u8,
    pub enc_type: EncryptionType,
    pub hmac_type: HmacType,
}

impl WorkOrder {
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Split `total` ciphertext bytes over `threads` orders.
///
/// Every order but the last gets `total / threads` rounded down to whole
/// blocks; the last one absorbs the remainder. Orders are contiguous and
/// never overlap. `threads` is clamped to `1..=MAX_THREAD_COUNT`.
#[must_use]
pub fn plan(
    total: usize,
    threads: u8,
    enc_type: EncryptionType,
    hmac_type: HmacType,
) -> ArrayVec<WorkOrder, { MAX_THREAD_COUNT as usize }> {
    let threads = threads.clamp(1, MAX_THREAD_COUNT);
    let count = usize::from(threads);
    let chunk = (total / count) - ((total / count) % BLOCK_LEN);
    let last = total - (count - 1) * chunk;

    (0..threads)
        .map(|t| {
            let index = usize::from(t);
            WorkOrder {
                offset: index * chunk,
                length: if index == count - 1 { last } else { chunk },
                thread_index: t,
                enc_type,
                hmac_type,
            }
        })
        .collect()
}

/// Derive the IV of every order from the public one.
///
/// `v[0]` is the public IV and `v[t + 1] = v[t] ^ (step ^ seed)` byte-wise,
/// where `seed` cycles through `seeds` (it is `0` when the thread count
/// equals the number of seeds) and `step` only applies once the thread
/// count reaches the number of seeds.
#[must_use]
pub fn mix_vectors(iv: &[u8; BLOCK_LEN], seeds: &[u8], step: u8, threads: u8) -> Vectors {
    let threads = usize::from(threads.clamp(1, MAX_THREAD_COUNT));
    let step = if threads >= seeds.len() { step } else { 0 };

    let mut vectors = Vectors::new();
    vectors.push(*iv);
    for t in 0..threads - 1 {
        let seed = if threads == seeds.len() || seeds.is_empty() {
            0
        } else {
            seeds[t % seeds.len()]
        };
        let mix = step ^ seed;
        let next = vectors[t].map(|b| b ^ mix);
        vectors.push(next);
    }
    vectors
}
