//! Filesystem-backed host for native embedders and the CLI.

use super::{FileHandle, FileHost};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Host whose "pickers" answer with preconfigured paths.
///
/// A missing save target makes the save picker report cancellation. A host
/// built with a downloads directory reports no save picker, so the bridge
/// selector falls back to downloads. Writes land in a temp file next to the
/// target and are renamed over it.
#[derive(Debug, Clone, Default)]
pub struct DirectoryHost {
    save_target: Option<PathBuf>,
    open_source: Option<PathBuf>,
    downloads_dir: Option<PathBuf>,
}

impl DirectoryHost {
    /// Host with a save picker that answers `target`.
    pub fn with_save_target(target: impl Into<PathBuf>) -> Self {
        Self {
            save_target: Some(target.into()),
            ..Self::default()
        }
    }

    /// Host without a save picker; exports land in `dir` as downloads.
    pub fn with_downloads_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            downloads_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Sets the file the open picker answers with.
    pub fn open_from(mut self, source: impl Into<PathBuf>) -> Self {
        self.open_source = Some(source.into());
        self
    }
}

impl FileHost for DirectoryHost {
    fn supports_save_picker(&self) -> bool {
        self.downloads_dir.is_none()
    }

    fn pick_save_location(&self, _suggested_name: &str) -> std::io::Result<Option<FileHandle>> {
        Ok(self.save_target.clone().map(FileHandle::new))
    }

    fn pick_open_location(&self) -> std::io::Result<Option<FileHandle>> {
        Ok(self.open_source.clone().map(FileHandle::new))
    }

    fn write_handle(&self, handle: &FileHandle, bytes: &[u8]) -> std::io::Result<()> {
        write_atomically(handle.path(), bytes)
    }

    fn read_handle(&self, handle: &FileHandle) -> std::io::Result<Vec<u8>> {
        std::fs::read(handle.path())
    }

    fn download(&self, filename: &str, bytes: &[u8]) -> std::io::Result<()> {
        let dir = self.downloads_dir.as_deref().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "host has no downloads directory",
            )
        })?;
        std::fs::create_dir_all(dir)?;
        write_atomically(&dir.join(filename), bytes)
    }
}

fn write_atomically(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(target).map_err(|err| err.error)?;
    Ok(())
}
