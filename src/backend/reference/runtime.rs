use crate::backend::reference::ReferenceArtifact;
use crate::backend::{Artifact, Device, DeviceKind, ExecutableSignature, ExecutionRuntime, RuntimeError, ScalarType, Stream};
use crate::flat_ir::ops::FlatIROp;
use crate::numeric_tensor::NumericTensor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ReferenceRuntime {
    next_stream: AtomicU64,
}

impl ReferenceRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate_input(
        signature: &ExecutableSignature,
        index: usize,
        input: &NumericTensor,
    ) -> Result<(), RuntimeError> {
        let arg = signature.get_arg(index)?;
        let got = ScalarType::from(input.dtype());
        if got != arg.dtype {
            return Err(RuntimeError::new(format!(
                "InvalidArgument: function expects a memref type with element type {} but got {got} for argument {index}",
                arg.dtype
            )));
        }

        let shape = input.shape();
        if shape.len() != arg.shape.len() {
            return Err(RuntimeError::new(format!(
                "Runtime shape mismatch: argument {index} expects rank {} but got rank {}",
                arg.shape.len(),
                shape.len()
            )));
        }
        for (dim, (expected, actual)) in arg.shape.iter().zip(&shape).enumerate() {
            if *expected >= 0 && *expected as usize != *actual {
                return Err(RuntimeError::new(format!(
                    "Runtime shape mismatch: argument {index} expects {expected} at dimension {dim} but got {actual}"
                )));
            }
        }

        let bounds = signature.get_arg_bound(index)?;
        for (dim, actual) in shape.iter().enumerate() {
            let (Some(min), Some(max)) = (bounds.min.get(dim), bounds.max.get(dim)) else {
                continue;
            };
            let actual = *actual as i64;
            if actual < *min || actual > *max {
                return Err(RuntimeError::new(format!(
                    "InternalError: failed to set input shape: dimension {dim} of argument {index} has size {actual}, outside [{min}, {max}]"
                )));
            }
        }

        if !input.is_standard_layout() {
            return Err(RuntimeError::new(format!(
                "Runtime stride mismatch: argument {index} is not in canonical row-major layout"
            )));
        }
        Ok(())
    }

    fn interpret(artifact: &ReferenceArtifact, inputs: &[NumericTensor]) -> Result<Vec<NumericTensor>, RuntimeError> {
        let program = artifact.program();
        let mut values: Vec<Option<NumericTensor>> = vec![None; program.num_tensors()];
        for ((_, id), input) in program.get_inputs().iter().zip(inputs) {
            values[id.index()] = Some(input.clone());
        }

        for op in program.ops() {
            let operands = op
                .get_inputs()
                .iter()
                .map(|id| {
                    values
                        .get(id.index())
                        .and_then(|x| x.as_ref())
                        .ok_or_else(|| RuntimeError::new(format!("InternalError: {id} has no value")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let results = op
                .eval(&operands)
                .map_err(|err| RuntimeError::new(format!("InternalError: {} failed: {err}", op.get_op_name())))?;
            for (id, value) in op.get_outputs().into_iter().zip(results) {
                values[id.index()] = Some(value);
            }
        }

        program
            .get_outputs()
            .iter()
            .map(|id| {
                values
                    .get_mut(id.index())
                    .and_then(Option::take)
                    .ok_or_else(|| RuntimeError::new(format!("InternalError: output {id} was not computed")))
            })
            .collect()
    }
}

impl ExecutionRuntime for ReferenceRuntime {
    fn load_artifact(&self, bytes: &[u8]) -> Result<Arc<dyn Artifact>, RuntimeError> {
        Ok(Arc::new(ReferenceArtifact::from_bytes(bytes)?))
    }

    fn create_stream(&self) -> Stream {
        Stream {
            id: self.next_stream.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn execute(
        &self,
        artifact: &dyn Artifact,
        entry_point: &str,
        inputs: &[NumericTensor],
        output_devices: &[Device],
        stream: &Stream,
    ) -> Result<Vec<NumericTensor>, RuntimeError> {
        let Some(artifact) = artifact.as_any().downcast_ref::<ReferenceArtifact>() else {
            return Err(RuntimeError::new(
                "InvalidArgument: artifact was not produced by the reference compiler",
            ));
        };
        let signature = artifact.signature(entry_point)?;

        if output_devices.len() != signature.num_output_args {
            return Err(RuntimeError::new(format!(
                "InvalidArgument: expected {} output devices but got {}",
                signature.num_output_args,
                output_devices.len()
            )));
        }
        if let Some(device) = output_devices.iter().find(|d| d.kind != DeviceKind::Cpu) {
            return Err(RuntimeError::new(format!("InvalidArgument: device {device} is not available")));
        }
        if inputs.len() != signature.num_input_args {
            return Err(RuntimeError::new(format!(
                "InvalidArgument: function expects {} arguments but got {}",
                signature.num_input_args,
                inputs.len()
            )));
        }
        for (index, input) in inputs.iter().enumerate() {
            Self::validate_input(&signature, index, input)?;
        }

        log::debug!("Executing {entry_point} on stream {}", stream.id);
        Self::interpret(artifact, inputs)
    }
}
