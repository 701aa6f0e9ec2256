//! Loader command-line options.
//!
//! The command line is a whitespace-separated list of `name` flags and
//! `name=value` pairs. Options the MFTAH path does not know are left to the
//! rest of the loader and skipped here.

use arrayvec::ArrayVec;
use core::fmt;
use log::{LevelFilter, debug, warn};

pub const OPTION_DISK: &str = "mftahdisk";
pub const OPTION_KEY: &str = "mftahkey";
pub const OPTION_EPHEMERAL: &str = "mftaheph";
pub const OPTION_RAW_CLI: &str = "mftahcli";
pub const OPTION_LOG: &str = "mftahlog";

/// Longest passphrase accepted from the command line or the console.
pub const MAX_PASSPHRASE_LEN: usize = 256;

/// A passphrase held in a fixed buffer that is wiped when dropped.
#[derive(Default)]
pub struct Passphrase(ArrayVec<u8, MAX_PASSPHRASE_LEN>);

impl Passphrase {
    #[must_use]
    pub const fn new() -> Self {
        Self(ArrayVec::new_const())
    }

    /// `None` if `bytes` exceeds [`MAX_PASSPHRASE_LEN`].
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut passphrase = Self::new();
        passphrase.0.try_extend_from_slice(bytes).ok()?;
        Some(passphrase)
    }

    /// Append one byte; `false` once the buffer is full.
    pub fn push(&mut self, byte: u8) -> bool {
        self.0.try_push(byte).is_ok()
    }

    /// Drop the last byte, as a backspace would.
    pub fn pop(&mut self) {
        if let Some(last) = self.0.last_mut() {
            *last = 0;
        }
        self.0.pop();
    }

    pub fn clear(&mut self) {
        memdisk_mftah::wipe(&mut self.0);
        self.0.clear();
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for Passphrase {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Passphrase(<{} bytes>)", self.0.len())
    }
}

/// The MFTAH-related part of the loader command line.
#[derive(Debug)]
pub struct BootOptions {
    /// `mftahdisk`: the loaded image is an MFTAH payload.
    pub mftah_disk: bool,
    /// `mftahkey=<passphrase>`.
    pub key: Option<Passphrase>,
    /// `mftaheph`: drop the parsed passphrase once it was used. With
    /// [`BootOptions::from_cmdline`] the raw command line is blanked too.
    pub ephemeral: bool,
    /// `mftahcli`: always ask on the console, even if a key was given.
    pub prompt: bool,
    /// `mftahlog=<level>`, [`LevelFilter::Info`] if absent or unparsable.
    pub log_level: LevelFilter,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            mftah_disk: false,
            key: None,
            ephemeral: false,
            prompt: false,
            log_level: LevelFilter::Info,
        }
    }
}

impl BootOptions {
    #[must_use]
    pub fn parse(cmdline: &str) -> Self {
        let mut options = Self::default();
        for token in cmdline.split_ascii_whitespace() {
            let (name, value) = match token.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (token, None),
            };
            match (name, value) {
                (OPTION_DISK, _) => options.mftah_disk = true,
                (OPTION_EPHEMERAL, _) => options.ephemeral = true,
                (OPTION_RAW_CLI, _) => options.prompt = true,
                (OPTION_KEY, Some(value)) if !value.is_empty() => {
                    options.key = Passphrase::from_bytes(value.as_bytes());
                    if options.key.is_none() {
                        warn!(
                            "options: {OPTION_KEY} exceeds {MAX_PASSPHRASE_LEN} bytes, ignoring it"
                        );
                    }
                }
                (OPTION_LOG, Some(value)) => match value.parse::<LevelFilter>() {
                    Ok(level) => options.log_level = level,
                    Err(_) => warn!("options: unknown log level '{value}'"),
                },
                _ => {}
            }
        }
        options
    }

    /// Parse the raw command line the loader will later hand to the OS.
    /// With `mftaheph` every `mftahkey=` value in `cmdline` is blanked
    /// before returning. Parsing stops at the first byte that is not UTF-8.
    #[must_use]
    pub fn from_cmdline(cmdline: &mut [u8]) -> Self {
        let valid = match core::str::from_utf8(cmdline) {
            Ok(text) => text.len(),
            Err(e) => {
                warn!("options: command line is not UTF-8 past byte {}", e.valid_up_to());
                e.valid_up_to()
            }
        };
        let options = core::str::from_utf8(&cmdline[..valid])
            .map_or_else(|_| Self::default(), Self::parse);
        if options.ephemeral {
            let scrubbed = scrub_key(cmdline);
            debug!("options: blanked {scrubbed} passphrase bytes in the command line");
        }
        options
    }

    /// Whether the passphrase has to be read from the console.
    #[must_use]
    pub const fn needs_prompt(&self) -> bool {
        self.prompt || self.key.is_none()
    }
}

/// Blank out the value of every `mftahkey=` option in a raw command line,
/// keeping its length so later options stay where they are. Returns the
/// number of bytes scrubbed.
pub fn scrub_key(cmdline: &mut [u8]) -> usize {
    let prefix = OPTION_KEY.as_bytes();
    let mut scrubbed = 0;
    let mut i = 0;
    while i < cmdline.len() {
        let starts_token = i == 0 || cmdline[i - 1].is_ascii_whitespace();
        let rest = &cmdline[i..];
        let is_key = starts_token
            && rest.len() > prefix.len()
            && rest.starts_with(prefix)
            && rest[prefix.len()] == b'=';
        if is_key {
            i += prefix.len() + 1;
            while i < cmdline.len() && !cmdline[i].is_ascii_whitespace() && cmdline[i] != 0 {
                cmdline[i] = b' ';
                scrubbed += 1;
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    scrubbed
}
