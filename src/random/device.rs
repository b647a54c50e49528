use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::RandomSource;
use crate::error::{CoreError, Result};

/// A [`RandomSource`] that reads raw bytes from an OS entropy device (by
/// default `/dev/urandom`).
///
/// The file handle is opened lazily on first use and kept open behind a
/// mutex, so concurrent `fill` calls serialize on the read but never reopen
/// the device.
#[derive(Debug)]
pub struct Device {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl Device {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl RandomSource for Device {
    fn fill(&self, bytes: &mut [u8]) -> Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|_| CoreError::fatal("device random source mutex poisoned"))?;
        if guard.is_none() {
            let file = File::open(self.path())
                .map_err(|e| CoreError::resource(format!("opening random device {}", self.path.display()), e))?;
            *guard = Some(file);
        }
        let file = guard.as_mut().expect("just initialized");
        file.read_exact(bytes)
            .map_err(|e| CoreError::resource(format!("reading from random device {}", self.path.display()), e))
    }
}
