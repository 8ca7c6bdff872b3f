//! Bridge for hosts with a user-mediated save-location picker.

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

/// Writes through a retained handle, or asks the picker for one.
pub struct PickerFileBridge {
    host: Arc<dyn FileHost>,
    extension: String,
}

impl PickerFileBridge {
    pub fn new(host: Arc<dyn FileHost>, extension: &str) -> Self {
        Self {
            host,
            extension: extension.to_string(),
        }
    }
}

impl FileBridge for PickerFileBridge {
    fn mode(&self) -> BridgeMode {
        BridgeMode::Picker
    }

    fn write(
        &self,
        retained: Option<&FileHandle>,
        metadata: &ModelMetadata,
        data: &ModelData,
    ) -> BridgeResult<WriteOutcome> {
        let handle = match retained {
            Some(handle) => handle.clone(),
            None => {
                let suggested = metadata
                    .filename
                    .clone()
                    .unwrap_or_else(|| suggested_filename(&metadata.name, &self.extension));
                match self.host.pick_save_location(&suggested)? {
                    Some(handle) => handle,
                    None => {
                        info!(
                            "event=bridge_write module=bridge status=skip mode=picker model_id={} reason=cancelled",
                            metadata.id
                        );
                        return Ok(WriteOutcome::Cancelled);
                    }
                }
            }
        };

        let envelope = ModelEnvelope {
            metadata: metadata.clone(),
            data: data.clone(),
        };
        let bytes = envelope.to_bytes()?;
        self.host.write_handle(&handle, &bytes)?;

        let digest = hash_model_data(data);
        info!(
            "event=bridge_write module=bridge status=ok mode=picker model_id={} reused_handle={} byte_len={} digest={}",
            metadata.id,
            retained.is_some(),
            bytes.len(),
            digest.short()
        );
        Ok(WriteOutcome::Written(WriteReceipt {
            filename: handle.file_name(),
            handle: Some(handle),
            digest,
        }))
    }

    fn read(&self) -> BridgeResult<ReadOutcome> {
        read_via_open_picker(self.host.as_ref())
    }
}
