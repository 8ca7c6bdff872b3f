//! Fallback bridge for hosts that can only offer a synthetic download.

use super::{
    read_via_open_picker, BridgeMode, BridgeResult, FileBridge, FileHandle, FileHost,
    ReadOutcome, WriteOutcome, WriteReceipt,
};
use crate::model::data::ModelData;
use crate::model::envelope::{suggested_filename, ModelEnvelope};
use crate::model::metadata::ModelMetadata;
use crate::sync::content_hash::hash_model_data;
use log::info;
use std::sync::Arc;

/// Serializes the envelope and hands it to the host as a download.
pub struct DownloadFileBridge {
    host: Arc<dyn FileHost>,
    extension: String,
}

impl DownloadFileBridge {
    pub fn new(host: Arc<dyn FileHost>, extension: &str) -> Self {
        Self {
            host,
            extension: extension.to_string(),
        }
    }
}

impl FileBridge for DownloadFileBridge {
    fn mode(&self) -> BridgeMode {
        BridgeMode::Download
    }

    /// Ignores `retained`: downloads cannot overwrite a previous file.
    fn write(
        &self,
        _retained: Option<&FileHandle>,
        metadata: &ModelMetadata,
        data: &ModelData,
    ) -> BridgeResult<WriteOutcome> {
        let filename = metadata
            .filename
            .clone()
            .unwrap_or_else(|| suggested_filename(&metadata.name, &self.extension));
        let envelope = ModelEnvelope {
            metadata: metadata.clone(),
            data: data.clone(),
        };
        let bytes = envelope.to_bytes()?;
        self.host.download(&filename, &bytes)?;

        let digest = hash_model_data(data);
        info!(
            "event=bridge_write module=bridge status=ok mode=download model_id={} byte_len={} digest={}",
            metadata.id,
            bytes.len(),
            digest.short()
        );
        Ok(WriteOutcome::Written(WriteReceipt {
            handle: None,
            filename,
            digest,
        }))
    }

    fn read(&self) -> BridgeResult<ReadOutcome> {
        read_via_open_picker(self.host.as_ref())
    }
}
