//! In-process backend that interprets flat IR on the host with [`NumericTensor`].
//!
//! [`NumericTensor`]: crate::numeric_tensor::NumericTensor

mod compiler;
mod runtime;

pub use compiler::ReferenceCompiler;
pub use runtime::ReferenceRuntime;

use crate::backend::{Artifact, BackendCompileError, ExecutableSignature, RuntimeError};
use crate::flat_ir::FlatIR;
use serde::{Deserialize, Serialize};
use std::any::Any;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceArtifact {
    entry_point: String,
    program: FlatIR,
    signature: ExecutableSignature,
}

impl ReferenceArtifact {
    pub fn program(&self) -> &FlatIR {
        &self.program
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, RuntimeError> {
        ciborium::from_reader::<ReferenceArtifact, _>(bytes)
            .map_err(|err| RuntimeError::new(format!("failed to load artifact: {err}")))
    }
}

impl Artifact for ReferenceArtifact {
    fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn serialize(&self) -> Result<Vec<u8>, BackendCompileError> {
        let mut data = vec![];
        ciborium::into_writer(self, &mut data)
            .map_err(|err| BackendCompileError::Serialization(err.to_string()))?;
        Ok(data)
    }

    fn signature(&self, entry_point: &str) -> Result<ExecutableSignature, RuntimeError> {
        if entry_point != self.entry_point {
            return Err(RuntimeError::new(format!(
                "InvalidArgument: no function named \"{entry_point}\" in artifact"
            )));
        }
        Ok(self.signature.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
