use std::fs;
use std::path::Path;
use std::sync::Mutex;

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};

use super::RandomSource;
use crate::error::{CoreError, Result};
use crate::file_atomics;

/// The seed length this PRG requires, in bytes. `ChaCha20Rng` takes a
/// 32-byte seed.
pub const SEED_LEN: usize = 32;

/// A seeded, reseed-on-start PRG.
///
/// A `Prg` is only ever constructed through [`Prg::reseed_from`], which
/// performs the single-use reseed-and-store described in §4.4 of
/// `SPEC_FULL.md`: the stored seed is read once, used to derive both this
/// session's generator state and a fresh replacement seed, and the
/// replacement is written back atomically before a single byte is handed to
/// a caller. There is no other constructor, so it is not possible to obtain
/// a `Prg` that shares a keystream with a previous execution, barring a
/// non-atomic filesystem.
#[derive(Debug)]
pub struct Prg {
    rng: Mutex<ChaCha20Rng>,
}

impl Prg {
    /// Performs the one-time reseed-and-store sequence and returns a usable
    /// `Prg`.
    ///
    /// Sequence (matching §4.4): (a) read the current `seed_file` contents,
    /// failing if missing or shorter than [`SEED_LEN`]; (b) run a PRG keyed
    /// by those bytes to derive two independent 32-byte outputs — this
    /// session's seed and the replacement stored seed; (c) write the
    /// replacement to `tmp_seed_file`; (d) rename `tmp_seed_file` to
    /// `seed_file`. If (c) or (d) fails, no `Prg` is returned and no byte of
    /// the session seed has been exposed to a caller.
    pub fn reseed_from(seed_file: &Path, tmp_seed_file: &Path) -> Result<Self> {
        let stored = fs::read(seed_file)
            .map_err(|e| CoreError::resource(format!("reading seed file {}", seed_file.display()), e))?;
        if stored.len() < SEED_LEN {
            return Err(CoreError::invalid_arg(format!(
                "seed file {} has {} bytes, need at least {SEED_LEN}",
                seed_file.display(),
                stored.len()
            )));
        }

        let mut keying_seed = [0u8; SEED_LEN];
        keying_seed.copy_from_slice(&stored[..SEED_LEN]);
        let mut deriver = ChaCha20Rng::from_seed(keying_seed);

        let mut session_seed = [0u8; SEED_LEN];
        deriver.fill_bytes(&mut session_seed);
        let mut replacement_seed = [0u8; SEED_LEN];
        deriver.fill_bytes(&mut replacement_seed);

        // Write the replacement seed before a single byte of `session_seed`
        // is ever produced via `fill`. If this fails, `?` returns early and
        // this `Prg` is never constructed.
        write_replacement(tmp_seed_file, seed_file, &replacement_seed)?;

        Ok(Self {
            rng: Mutex::new(ChaCha20Rng::from_seed(session_seed)),
        })
    }
}

fn write_replacement(tmp_seed_file: &Path, seed_file: &Path, bytes: &[u8]) -> Result<()> {
    file_atomics::write_atomic_via(tmp_seed_file, seed_file, bytes)
}

impl RandomSource for Prg {
    fn fill(&self, bytes: &mut [u8]) -> Result<()> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| CoreError::fatal("PRG random source mutex poisoned"))?;
        rng.fill_bytes(bytes);
        Ok(())
    }
}

/// Writes an initial `seed_file` from a user-supplied hex file, then deletes
/// the hex file.
///
/// This is the one external, one-time `-rndinit`-style boundary named in
/// §4.4: everywhere else in this crate, seed files hold opaque raw bytes,
/// never hex text (see the Open Questions resolution in `SPEC_FULL.md`).
pub fn seed_file_from_hex(hex_path: &Path, seed_file: &Path) -> Result<()> {
    let hex_contents = fs::read_to_string(hex_path)
        .map_err(|e| CoreError::resource(format!("reading hex seed file {}", hex_path.display()), e))?;
    let bytes = hex::decode(hex_contents.trim())
        .map_err(|e| CoreError::invalid_arg(format!("seed file {} is not valid hex: {e}", hex_path.display())))?;
    if bytes.len() < SEED_LEN {
        return Err(CoreError::invalid_arg(format!(
            "hex seed file {} decodes to {} bytes, need at least {SEED_LEN}",
            hex_path.display(),
            bytes.len()
        )));
    }
    file_atomics::write_atomic(seed_file, &bytes)?;
    fs::remove_file(hex_path)
        .map_err(|e| CoreError::resource(format!("deleting hex seed file {}", hex_path.display()), e))
}
