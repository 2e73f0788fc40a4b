use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(
        "not enough room for another photo in {}: {} MB free, {} MB required",
        dir.display(),
        available_bytes / BYTES_PER_MB,
        required_bytes / BYTES_PER_MB
    )]
    Full {
        dir: PathBuf,
        available_bytes: u64,
        required_bytes: u64,
    },
    #[error("could not read free space under {}", dir.display())]
    Probe {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Minimum free space a capture directory must keep before a photo is
/// written. Zero disables the check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskHeadroom {
    min_free_bytes: u64,
}

impl DiskHeadroom {
    pub const DISABLED: Self = Self { min_free_bytes: 0 };

    pub fn from_megabytes(megabytes: u64) -> Self {
        Self {
            min_free_bytes: megabytes.saturating_mul(BYTES_PER_MB),
        }
    }

    pub fn min_free_bytes(&self) -> u64 {
        self.min_free_bytes
    }

    /// Returns the free bytes under `dir`, or `None` when the check is off.
    pub fn check(&self, dir: &Path) -> Result<Option<u64>, StorageError> {
        if self.min_free_bytes == 0 {
            return Ok(None);
        }

        let available = free_bytes(dir).map_err(|source| StorageError::Probe {
            dir: dir.to_path_buf(),
            source,
        })?;
        if available < self.min_free_bytes {
            return Err(StorageError::Full {
                dir: dir.to_path_buf(),
                available_bytes: available,
                required_bytes: self.min_free_bytes,
            });
        }
        Ok(Some(available))
    }
}

#[cfg(target_family = "unix")]
fn free_bytes(dir: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_dir = CString::new(dir.as_os_str().as_bytes())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: `c_dir` is NUL-terminated and `stat` is only read after statvfs succeeds.
    let stat = unsafe {
        if libc::statvfs(c_dir.as_ptr(), stat.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        stat.assume_init()
    };
    Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
}

#[cfg(not(target_family = "unix"))]
fn free_bytes(_dir: &Path) -> io::Result<u64> {
    Ok(u64::MAX)
}
