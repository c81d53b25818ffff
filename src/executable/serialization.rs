use crate::backend::{BackendCompileError, Device, ExecutionRuntime, RuntimeError};
use crate::executable::{Executable, ExecutableError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
    #[error(transparent)]
    Artifact(#[from] BackendCompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Executable(#[from] ExecutableError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Persisted form of an [`Executable`]. The signature is re-derived on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableRecord {
    pub arg_names: Vec<String>,
    pub output_devices: Vec<Device>,
    /// Base64 of the serialized artifact.
    pub executable: String,
}

impl Executable {
    pub fn to_record(&self) -> Result<ExecutableRecord, SerializationError> {
        let bytes = self.artifact().serialize()?;
        Ok(ExecutableRecord {
            arg_names: self.arg_names().to_vec(),
            output_devices: self.output_devices().to_vec(),
            executable: STANDARD.encode(bytes),
        })
    }

    pub fn from_record(
        record: ExecutableRecord,
        runtime: Arc<dyn ExecutionRuntime>,
    ) -> Result<Self, SerializationError> {
        let bytes = STANDARD.decode(record.executable.as_bytes())?;
        let artifact = runtime.load_artifact(&bytes)?;
        Ok(Executable::new(
            runtime,
            artifact,
            record.arg_names,
            record.output_devices,
        )?)
    }

    pub fn encode(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(&self.to_record()?)?)
    }

    pub fn decode(json: &str, runtime: Arc<dyn ExecutionRuntime>) -> Result<Self, SerializationError> {
        let record: ExecutableRecord = serde_json::from_str(json)?;
        Self::from_record(record, runtime)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SerializationError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.encode()?)?;
        log::info!("Saved executable to {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>, runtime: Arc<dyn ExecutionRuntime>) -> Result<Self, SerializationError> {
        let json = std::fs::read_to_string(path)?;
        Self::decode(&json, runtime)
    }
}
