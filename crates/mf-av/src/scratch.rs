//! Scratch filesystem for the transcode engine.
//!
//! A [`ScratchFs`] is a private temporary directory in which engine inputs
//! and outputs live under flat, caller-chosen names. It plays the role of
//! an in-memory virtual filesystem: files are written, consumed, and
//! deleted by name, and the whole directory disappears when the value is
//! dropped.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Flat, name-addressed scratch directory.
///
/// # Example
///
/// ```no_run
/// use mf_av::ScratchFs;
///
/// # async fn example() -> mf_core::Result<()> {
/// let fs = ScratchFs::new()?;
/// fs.write_file("input_1.mp4", b"...").await?;
/// let bytes = fs.read_file("input_1.mp4").await?;
/// fs.delete_file("input_1.mp4").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ScratchFs {
    temp_dir: TempDir,
}

impl ScratchFs {
    /// Create a fresh scratch directory.
    pub fn new() -> mf_core::Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("mediaforge-")
            .tempdir()
            .map_err(|e| mf_core::Error::tool("scratch", format!("failed to create temp dir: {e}")))?;
        Ok(Self { temp_dir })
    }

    /// Path to the scratch directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path for a file name inside the scratch directory.
    pub fn path(&self, name: &str) -> mf_core::Result<PathBuf> {
        validate_name(name)?;
        Ok(self.temp_dir.path().join(name))
    }

    /// Write (or overwrite) a file.
    pub async fn write_file(&self, name: &str, data: &[u8]) -> mf_core::Result<()> {
        let path = self.path(name)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    /// Read a whole file.
    pub async fn read_file(&self, name: &str) -> mf_core::Result<Vec<u8>> {
        let path = self.path(name)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => mf_core::Error::not_found("scratch file", name),
            _ => e.into(),
        })
    }

    /// Delete a file. Deleting a file that does not exist is not an error.
    pub async fn delete_file(&self, name: &str) -> mf_core::Result<()> {
        let path = self.path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of all files currently present, sorted.
    pub fn list(&self) -> mf_core::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.temp_dir.path())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Names are flat: no separators, no parent references, not empty.
fn validate_name(name: &str) -> mf_core::Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(mf_core::Error::Validation(format!(
            "invalid scratch file name '{name}'"
        )));
    }
    Ok(())
}
