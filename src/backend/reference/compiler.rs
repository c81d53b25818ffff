use crate::backend::reference::ReferenceArtifact;
use crate::backend::{
    ArgBounds, Artifact, ArtifactCompiler, BackendCompileError, ExecutableSignature, MemRefType, ScalarType,
};
use crate::compiler::CompileOptions;
use crate::dtype::{DType, DTypeError};
use crate::flat_ir::{FlatIR, FlatIRTensorInfo};
use crate::shape::Dimension;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct ReferenceCompiler {}

impl ReferenceCompiler {
    pub fn new() -> Self {
        Self {}
    }

    fn mem_ref_type(info: &FlatIRTensorInfo) -> MemRefType {
        MemRefType {
            shape: info
                .shape
                .iter()
                .map(|d| d.known().map(|x| x as i64).unwrap_or(-1))
                .collect(),
            dtype: ScalarType::from(info.dtype),
        }
    }

    fn arg_bounds(info: &FlatIRTensorInfo) -> ArgBounds {
        if info.shape.iter().all(|d| d.known().is_some()) {
            return ArgBounds::default();
        }
        let (min, max) = info
            .shape
            .iter()
            .map(|d| match d {
                Dimension::Known(x) => (*x as i64, *x as i64),
                Dimension::Dynamic(bounds) => (bounds.min as i64, bounds.max.min(i64::MAX as u64) as i64),
            })
            .unzip();
        ArgBounds { min, max }
    }
}

impl ArtifactCompiler for ReferenceCompiler {
    fn compile(
        &self,
        program: &FlatIR,
        options: &CompileOptions,
    ) -> Result<Arc<dyn Artifact>, BackendCompileError> {
        if let Some((id, _)) = program.tensors().find(|(_, info)| info.dtype == DType::F8) {
            log::debug!("Rejecting program: tensor {id} is float8");
            return Err(DTypeError::DTypeNotSupportedByBackend(DType::F8).into());
        }

        let mut args = vec![];
        let mut arg_bounds = vec![];
        let ids = program
            .get_inputs()
            .iter()
            .map(|(_, id)| *id)
            .chain(program.get_outputs().iter().copied());
        for id in ids {
            let info = program
                .get_tensor_info(id)
                .map_err(|err| BackendCompileError::Diagnostic(err.to_string()))?;
            args.push(Self::mem_ref_type(info));
            arg_bounds.push(Self::arg_bounds(info));
        }
        let signature = ExecutableSignature {
            num_input_args: program.get_inputs().len(),
            num_output_args: program.get_outputs().len(),
            args,
            arg_bounds,
        };

        Ok(Arc::new(ReferenceArtifact {
            entry_point: options.entry_point.clone(),
            program: program.clone(),
            signature,
        }))
    }
}
