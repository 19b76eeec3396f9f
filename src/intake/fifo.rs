//! Named pipe job source
//!
//! The pipe is opened read-write so the daemon itself holds a writer end:
//! writers may come and go without the reader ever seeing end-of-input.

use crate::error::{Error, Result};
use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::{self, Read};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tokio::net::unix::pipe;
use tracing::{debug, info, warn};

/// Non-blocking reader over a named pipe the daemon created
///
/// The pipe is unlinked when the source is dropped.
#[derive(Debug)]
pub struct FifoSource {
    path: PathBuf,
    receiver: pipe::Receiver,
}

impl FifoSource {
    /// Create the named pipe at `path` and open it for reading
    ///
    /// A stale pipe at `path` is replaced; any other kind of file is left
    /// alone and reported as an error. Must be called within a tokio runtime.
    pub fn create(path: &Path) -> Result<Self> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_fifo() => {
                debug!(path = %path.display(), "removing stale named pipe");
                std::fs::remove_file(path)?;
            }
            Ok(_) => {
                return Err(Error::Intake(format!(
                    "{} exists and is not a named pipe",
                    path.display()
                )));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        make_fifo(path)?;

        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) => {
                let _ = std::fs::remove_file(path);
                return Err(e.into());
            }
        };
        let receiver = match pipe::Receiver::from_file(file) {
            Ok(receiver) => receiver,
            Err(e) => {
                let _ = std::fs::remove_file(path);
                return Err(e.into());
            }
        };

        info!(path = %path.display(), "listening for jobs on named pipe");
        Ok(Self {
            path: path.to_path_buf(),
            receiver,
        })
    }

    /// Path of the pipe
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until the pipe has data to read
    pub async fn readable(&self) -> io::Result<()> {
        self.receiver.readable().await
    }
}

fn make_fifo(path: &Path) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::Intake(format!("{} contains a NUL byte", path.display())))?;

    // SAFETY: c_path is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        return Err(Error::Intake(format!(
            "cannot create named pipe {}: {}",
            path.display(),
            err
        )));
    }
    Ok(())
}

impl Read for FifoSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.receiver.try_read(buf)
    }
}

impl Drop for FifoSource {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "named pipe removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove named pipe"),
        }
    }
}
