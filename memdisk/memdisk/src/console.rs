use crate::options::Passphrase;

/// Operator interaction available while the loader runs.
///
/// The real loader drives the BIOS screen and keyboard; tests script it.
pub trait Console {
    /// Show `prompt` and wait for any key.
    fn pause(&mut self, prompt: &str);

    /// Show `prompt` and read a line without echo into `out`.
    fn read_passphrase(&mut self, prompt: &str, out: &mut Passphrase);
}

/// A console nobody is sitting at: pauses return at once and every
/// passphrase read comes back empty.
#[derive(Debug, Default, Copy, Clone)]
pub struct Unattended;

impl Console for Unattended {
    fn pause(&mut self, prompt: &str) {
        log::debug!("console: skipping pause '{}'", prompt.trim());
    }

    fn read_passphrase(&mut self, _prompt: &str, out: &mut Passphrase) {
        out.clear();
    }
}
