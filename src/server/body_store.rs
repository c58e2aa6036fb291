//! Request body spooling.
//!
//! Bodies stream into a file as they are decoded: by default a per-session
//! temp file (later fed to CGI stdin), or — once routing picks a
//! `store-body` action — the upload destination itself. The temp file is
//! removed on every reset; an upload survives only if the request reached
//! commit.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::fs_path::PhysicalPath;
use crate::http::{BodySink, HttpStatus};

#[derive(Debug)]
pub struct BodyStore {
    default_path: PathBuf,
    path: PathBuf,
    file: Option<fs::File>,
    size_bytes: u64,
    remove_on_reset: bool,
    allow_overwrite: bool,
    committed: bool,
}

impl BodyStore {
    /// `unique_key` keeps concurrent sessions' temp files apart.
    pub fn new(unique_key: u64) -> Self {
        let default_path = std::env::temp_dir().join(format!(
            "webhive_body_{}_{}.tmp",
            std::process::id(),
            unique_key
        ));
        BodyStore {
            path: default_path.clone(),
            default_path,
            file: None,
            size_bytes: 0,
            remove_on_reset: true,
            allow_overwrite: true,
            committed: false,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_upload(&self) -> bool {
        !self.remove_on_reset
    }

    /// Redirects the store at an upload destination. Must happen before the
    /// first body byte is written.
    pub fn configure_for_upload(
        &mut self,
        destination: &PhysicalPath,
        allow_overwrite: bool,
    ) -> Result<(), HttpStatus> {
        if self.file.is_some() {
            return Err(HttpStatus::SERVER_ERROR);
        }
        self.path = PathBuf::from(destination.as_str());
        self.remove_on_reset = false;
        self.allow_overwrite = allow_overwrite;
        Ok(())
    }

    /// Marks the upload as complete; the file now outlives the request.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    fn begin(&mut self) -> io::Result<()> {
        if self.file.is_some() {
            return Ok(());
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true);
        if self.allow_overwrite {
            options.truncate(true);
        } else {
            options.create_new(true);
        }
        self.file = Some(options.open(&self.path)?);
        self.size_bytes = 0;
        Ok(())
    }

    /// Flushes and closes the write side so the file can be reopened for
    /// reading (CGI stdin) or stat'ed.
    pub fn finish(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    /// Opens the spooled body for reading. An empty store yields an empty
    /// file.
    pub fn open_for_read(&mut self) -> io::Result<fs::File> {
        self.begin()?;
        self.finish()?;
        fs::File::open(&self.path)
    }

    pub fn stored_size(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.size())
    }

    /// Drops state for connection reuse. The temp file always goes; a
    /// configured upload goes too unless the request committed.
    pub fn reset(&mut self) {
        self.file = None;
        self.size_bytes = 0;
        if self.remove_on_reset || !self.committed {
            let _ = fs::remove_file(&self.path);
        }
        self.path = self.default_path.clone();
        self.remove_on_reset = true;
        self.allow_overwrite = true;
        self.committed = false;
    }
}

impl BodySink for BodyStore {
    fn write_body(&mut self, data: &[u8]) -> io::Result<()> {
        self.begin()?;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "body store not open"))?;
        file.write_all(data)?;
        self.size_bytes += data.len() as u64;
        Ok(())
    }
}

impl Drop for BodyStore {
    fn drop(&mut self) {
        self.file = None;
        if self.remove_on_reset || !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn temp_spool_is_removed_on_reset() {
        let mut store = BodyStore::new(1);
        store.write_body(b"abc").unwrap();
        let path = store.path().to_path_buf();
        assert!(path.exists());
        store.reset();
        assert!(!path.exists());
    }

    #[test]
    fn upload_survives_reset_only_after_commit() {
        let dir = tempfile::tempdir().unwrap();

        let dest = dir.path().join("kept.bin");
        let physical = PhysicalPath::resolve(dest.to_str().unwrap()).unwrap();
        let mut store = BodyStore::new(2);
        store.configure_for_upload(&physical, true).unwrap();
        store.write_body(b"payload").unwrap();
        store.finish().unwrap();
        store.commit();
        store.reset();
        assert!(dest.exists());

        let dest2 = dir.path().join("dropped.bin");
        let physical2 = PhysicalPath::resolve(dest2.to_str().unwrap()).unwrap();
        let mut store2 = BodyStore::new(3);
        store2.configure_for_upload(&physical2, true).unwrap();
        store2.write_body(b"payload").unwrap();
        store2.reset();
        assert!(!dest2.exists());
    }

    #[test]
    fn open_for_read_returns_spooled_bytes() {
        let mut store = BodyStore::new(4);
        store.write_body(b"spooled").unwrap();
        let mut file = store.open_for_read().unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        assert_eq!(out, "spooled");
        store.reset();
    }
}
