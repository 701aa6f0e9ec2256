use memdisk_mftah::{
    EncryptParams, HEADER_LEN, MAX_THREAD_COUNT, decrypt, encrypt_in_place, image_len,
};
use rand::Rng;
use std::io::{self, ErrorKind};
use std::{env, fs};

const PASSPHRASE_VAR: &str = "MFTAH_PASSPHRASE";
const DEFAULT_THREADS: u8 = 8;

fn main() -> io::Result<()> {
    // args: <input> <output> [threads]
    let mut args = env::args().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        eprintln!("usage: mftah-pack <input> <output> [threads]");
        eprintln!("       the passphrase is read from {PASSPHRASE_VAR}");
        std::process::exit(2);
    };
    let threads = match args.next() {
        Some(arg) => arg
            .parse::<u8>()
            .ok()
            .filter(|&t| t <= MAX_THREAD_COUNT)
            .ok_or_else(|| {
                invalid(format!("thread count must be 0..={MAX_THREAD_COUNT}, got '{arg}'"))
            })?,
        None => DEFAULT_THREADS,
    };
    let passphrase = env::var(PASSPHRASE_VAR)
        .ok()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| invalid(format!("{PASSPHRASE_VAR} is not set")))?;

    let plain = fs::read(&input)?;
    let image = pack(&plain, passphrase.as_bytes(), threads, &mut rand::thread_rng())?;

    // never write an image the loader would reject
    let mut check = image.clone();
    decrypt(&mut check, passphrase.as_bytes()).map_err(io::Error::other)?;
    if check[HEADER_LEN..HEADER_LEN + plain.len()] != plain[..] {
        return Err(io::Error::other("round trip does not reproduce the input"));
    }

    fs::write(&output, &image)?;
    eprintln!(
        "packed {} bytes from {input} into {output} ({} bytes, {threads} thread(s))",
        plain.len(),
        image.len()
    );
    Ok(())
}

/// Encrypt `plain` into a new payload image with random vectors.
fn pack(plain: &[u8], passphrase: &[u8], threads: u8, rng: &mut impl Rng) -> io::Result<Vec<u8>> {
    let mut params = EncryptParams {
        thread_count: threads,
        iv_seed_step: rng.gen_range(0..=u8::MAX),
        ..EncryptParams::default()
    };
    rng.fill(&mut params.initialization_vector);
    rng.fill(&mut params.iv_seeds);

    let mut image = vec![0u8; image_len(plain.len())];
    image[HEADER_LEN..HEADER_LEN + plain.len()].copy_from_slice(plain);
    encrypt_in_place(&mut image, plain.len(), passphrase, &params).map_err(io::Error::other)?;
    Ok(image)
}

fn invalid(message: String) -> io::Error {
    io::Error::new(ErrorKind::InvalidInput, message)
}
