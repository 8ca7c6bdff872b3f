//! External-file bridge with capability fallback.
//!
//! # Responsibility
//! - Write a model envelope to an external file and read external bytes back.
//! - Hide host capabilities (save picker vs. synthetic download) behind one
//!   `FileBridge` chosen once by `select_file_bridge`.
//!
//! # Invariants
//! - A cancelled picker is `WriteOutcome::Cancelled` / `ReadOutcome::Cancelled`,
//!   never an error.
//! - The receipt digest is the content hash of the written `ModelData`.
//! - The download fallback never retains a handle.

mod download;
mod host;
mod picker;

pub use download::DownloadFileBridge;
pub use host::DirectoryHost;
pub use picker::PickerFileBridge;

use crate::model::data::ModelData;
use crate::model::metadata::ModelMetadata;
use crate::sync::content_hash::ContentHash;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Host-issued writable/readable file location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHandle {
    path: PathBuf,
}

impl FileHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, or the whole path when it has none.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// File capabilities offered by the embedding host.
pub trait FileHost {
    /// Whether the host can ask the user for a save location.
    fn supports_save_picker(&self) -> bool;

    /// Asks the user where to save. `Ok(None)` means the user cancelled.
    fn pick_save_location(&self, suggested_name: &str) -> std::io::Result<Option<FileHandle>>;

    /// Asks the user which file to open. `Ok(None)` means the user cancelled.
    fn pick_open_location(&self) -> std::io::Result<Option<FileHandle>>;

    fn write_handle(&self, handle: &FileHandle, bytes: &[u8]) -> std::io::Result<()>;

    fn read_handle(&self, handle: &FileHandle) -> std::io::Result<Vec<u8>>;

    /// Hands bytes to the user as a download named `filename`.
    fn download(&self, filename: &str, bytes: &[u8]) -> std::io::Result<()>;
}

/// Which capability a bridge was built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMode {
    Picker,
    Download,
}

impl BridgeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Picker => "picker",
            Self::Download => "download",
        }
    }
}

/// Result of a successful external write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Handle to reuse for the next write of the same model, if any.
    pub handle: Option<FileHandle>,
    pub filename: String,
    pub digest: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(WriteReceipt),
    Cancelled,
}

/// Bytes read from an external file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Read(ExternalFile),
    Cancelled,
}

/// Capability-abstracted external file access.
pub trait FileBridge {
    fn mode(&self) -> BridgeMode;

    /// Writes the export envelope, reusing `retained` when given.
    fn write(
        &self,
        retained: Option<&FileHandle>,
        metadata: &ModelMetadata,
        data: &ModelData,
    ) -> BridgeResult<WriteOutcome>;

    fn read(&self) -> BridgeResult<ReadOutcome>;
}

/// Probes `host` once and returns the matching bridge.
pub fn select_file_bridge(host: Arc<dyn FileHost>, extension: &str) -> Box<dyn FileBridge> {
    let bridge: Box<dyn FileBridge> = if host.supports_save_picker() {
        Box::new(PickerFileBridge::new(host, extension))
    } else {
        Box::new(DownloadFileBridge::new(host, extension))
    };
    info!(
        "event=bridge_select module=bridge status=ok mode={}",
        bridge.mode().as_str()
    );
    bridge
}

/// External file read/write failure.
#[derive(Debug)]
pub enum BridgeError {
    Io(std::io::Error),
    Encode(serde_json::Error),
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "external file access failed: {err}"),
            Self::Encode(err) => write!(f, "cannot encode export envelope: {err}"),
        }
    }
}

impl Error for BridgeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Encode(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

/// Shared read path: both capabilities open through the host's open picker.
fn read_via_open_picker(host: &dyn FileHost) -> BridgeResult<ReadOutcome> {
    let Some(handle) = host.pick_open_location()? else {
        info!("event=bridge_read module=bridge status=skip reason=cancelled");
        return Ok(ReadOutcome::Cancelled);
    };
    let bytes = host.read_handle(&handle)?;
    info!(
        "event=bridge_read module=bridge status=ok byte_len={}",
        bytes.len()
    );
    Ok(ReadOutcome::Read(ExternalFile {
        filename: handle.file_name(),
        bytes,
    }))
}
