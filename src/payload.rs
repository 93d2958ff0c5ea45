//! The served file.

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;

/// The payload: an open file and its byte length, both fixed at startup.
///
/// The length is stat'ed exactly once. The file is served as it was sized
/// then, never re-checked, and stays open until process exit.
pub struct Payload {
    file: File,
    len: u64,
}

impl Payload {
    /// Open and size the payload.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening payload {}", path.display()))?;
        let len = file.metadata().context("stat on payload")?.len();
        Ok(Self { file, len })
    }

    /// Byte length, as cached at open time.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the whole file once to pull it into the page cache.
    ///
    /// Transfers use explicit offsets, so the file position this leaves
    /// behind does not matter.
    pub fn warm(&self) -> Result<u64> {
        let n = io::copy(&mut &self.file, &mut io::sink()).context("warming payload")?;
        debug!("Warmed {n} bytes of payload");
        Ok(n)
    }
}

impl AsFd for Payload {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn open_caches_length() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let p = Payload::open(f.path()).unwrap();
        assert_eq!(p.len(), 11);
        assert!(!p.is_empty());
    }

    #[test]
    fn warm_reads_everything() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[7u8; 4096]).unwrap();
        let p = Payload::open(f.path()).unwrap();
        assert_eq!(p.warm().unwrap(), 4096);
    }

    #[test]
    fn missing_payload_is_an_error() {
        assert!(Payload::open("/no/such/payload").is_err());
    }
}
