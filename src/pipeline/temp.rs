//! Scratch WAV files owned by a single render.
//!
//! Each render gets its own private directory. Every intermediate file is a
//! [`TempPath`] inside it, so it is removed when dropped: on success, on an
//! aborted render and on unwinding alike. The directory goes with
//! [`TempFiles`].

use std::cell::Cell;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, TempPath};

use crate::error::Result;

const PREFIX: &str = "vocalrender-";

/// Hands out unique temporary `.wav` paths in a private directory.
#[derive(Debug)]
pub struct TempFiles {
    dir: TempDir,
    reserved: Cell<u32>,
}

impl TempFiles {
    /// Creates the render directory under `root`, or under the system temp
    /// directory when `None`.
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let root = root.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let dir = tempfile::Builder::new().prefix(PREFIX).tempdir_in(&root)?;
        Ok(Self {
            dir,
            reserved: Cell::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Creates an empty file with a unique name tagged with `label`.
    pub fn create(&self, label: &str) -> Result<TempPath> {
        let file = tempfile::Builder::new()
            .prefix(&format!("{}-", sanitize(label)))
            .suffix(".wav")
            .tempfile_in(self.dir.path())?;
        Ok(file.into_temp_path())
    }

    /// Reserves a unique path for a file another process will write.
    ///
    /// Nothing is created. The name is unique within the render directory,
    /// which no other render shares.
    pub fn reserve(&self, label: &str) -> TempPath {
        let index = self.reserved.get();
        self.reserved.set(index + 1);
        let path: PathBuf = self
            .dir
            .path()
            .join(format!("{}-out{index}.wav", sanitize(label)));
        TempPath::from_path(path)
    }
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}
