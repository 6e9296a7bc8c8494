//! Crash-safe on-disk monotonic identifier generator.
//!
//! The counter file holds the decimal representation of the last identifier
//! handed out, nothing else. Each [`DurableCounter::next`] call performs one
//! locked read-modify-write cycle:
//!
//! 1. acquire an exclusive, non-blocking advisory lock on the file
//!    (fail fast with `CounterBusy` instead of queueing)
//! 2. read the current value (absent or empty file counts as 0)
//! 3. increment
//! 4. overwrite and flush to disk
//! 5. release the lock and return the new value
//!
//! The persisted value and the returned value come from the same computed
//! integer, and the write is flushed before the lock is released, so no
//! identifier is ever handed out twice — even if the process dies between a
//! call returning and the caller using the value. The lock guards against
//! concurrent client instances sharing one counter file; it is never held
//! across the caller's use of the returned value.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{ClientError, Result};

/// Durable monotonic counter backed by a lock-protected file.
#[derive(Debug, Clone)]
pub struct DurableCounter {
    path: PathBuf,
}

impl DurableCounter {
    /// Create a counter backed by the given file path.
    ///
    /// The file is created on first use; an absent file is the valid initial
    /// state (value 0, so the first call yields 1).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mint the next identifier.
    ///
    /// Fails with [`ClientError::CounterBusy`] if another execution context
    /// holds the lock, [`ClientError::CounterCorrupt`] if the persisted
    /// content is not a decimal integer, and [`ClientError::CounterIo`] for
    /// any other file failure. Counter errors must never be masked by the
    /// caller: a swallowed failure risks silently reusing an identifier.
    pub fn next(&self) -> Result<u64> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Err(ClientError::CounterBusy(self.path.clone()));
            }
            Err(e) => return Err(self.io_error(e)),
        }

        let result = self.increment_locked(&mut file);
        // The write is already flushed; dropping the file would also release
        // the lock, but an explicit unlock keeps the hold window obvious.
        let _ = file.unlock();
        result
    }

    fn increment_locked(&self, file: &mut File) -> Result<u64> {
        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| self.io_error(e))?;

        let trimmed = content.trim();
        let current: u64 = if trimmed.is_empty() {
            0
        } else {
            trimmed.parse().map_err(|_| self.corrupt(trimmed))?
        };

        let next = current.checked_add(1).ok_or_else(|| self.corrupt(trimmed))?;

        file.seek(SeekFrom::Start(0)).map_err(|e| self.io_error(e))?;
        file.set_len(0).map_err(|e| self.io_error(e))?;
        file.write_all(next.to_string().as_bytes())
            .map_err(|e| self.io_error(e))?;
        // Durable before the lock is released and before the caller sees the
        // value: a crash after this point can waste the value, never reuse it.
        file.sync_all().map_err(|e| self.io_error(e))?;

        Ok(next)
    }

    fn io_error(&self, source: std::io::Error) -> ClientError {
        ClientError::CounterIo {
            path: self.path.clone(),
            source,
        }
    }

    fn corrupt(&self, content: &str) -> ClientError {
        ClientError::CounterCorrupt {
            path: self.path.clone(),
            content: content.chars().take(64).collect(),
        }
    }
}
