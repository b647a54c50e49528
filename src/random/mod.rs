//! Randomness sources.
//!
//! Every party in a run is wired to exactly one [`RandomSource`]: either a
//! thin wrapper over an OS entropy device ([`device::Device`]), or a seeded
//! PRG that is reseeded exactly once at root construction
//! ([`prg::Prg`], see §4.4 of `SPEC_FULL.md`). The rest of the crate only
//! ever calls [`RandomSource::fill`]; it does not know or care which variant
//! is in play.

mod device;
mod prg;

pub use device::Device;
pub use prg::Prg;

use std::fmt::Debug;

use crate::error::Result;

/// A source of random bytes, shared by reference across an entire protocol
/// tree.
///
/// Implementations must be safe for concurrent `fill` calls from multiple
/// threads: [`Device`] delegates to the OS, and [`Prg`] wraps its generator
/// in a mutex.
pub trait RandomSource: Debug + Send + Sync {
    /// Fills `bytes` with random data.
    fn fill(&self, bytes: &mut [u8]) -> Result<()>;
}

/// A descriptor selecting and parametrizing a [`RandomSource`], as it would
/// appear in a parameter map's `randomness` key (see
/// [`crate::config::ParamValue`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RandomSourceDescriptor {
    /// Read raw bytes from an OS entropy device at `path`.
    Device { path: std::path::PathBuf },
    /// Use a seeded PRG, reseeding it from `seed_file` to `tmp_seed_file` at
    /// construction time.
    Prg {
        seed_file: std::path::PathBuf,
        tmp_seed_file: std::path::PathBuf,
    },
}

impl RandomSourceDescriptor {
    /// The default descriptor: a device reader over `/dev/urandom`.
    pub fn default_device() -> Self {
        RandomSourceDescriptor::Device {
            path: std::path::PathBuf::from("/dev/urandom"),
        }
    }

    /// Resolves this descriptor into a live [`RandomSource`], performing the
    /// one-time PRG reseed if this is a [`RandomSourceDescriptor::Prg`].
    pub fn resolve(&self) -> Result<std::sync::Arc<dyn RandomSource>> {
        match self {
            RandomSourceDescriptor::Device { path } => {
                Ok(std::sync::Arc::new(Device::new(path.clone())))
            }
            RandomSourceDescriptor::Prg {
                seed_file,
                tmp_seed_file,
            } => {
                let prg = Prg::reseed_from(seed_file, tmp_seed_file)?;
                Ok(std::sync::Arc::new(prg))
            }
        }
    }
}
