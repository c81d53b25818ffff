mod diagnostics;
pub mod serialization;

pub use diagnostics::{
    ELEMENT_TYPE_MISMATCH, INPUT_SHAPE_FAILURE, SHAPE_MISMATCH, STRIDE_MISMATCH, translate_runtime_error,
};

use crate::backend::{Artifact, Device, ExecutableSignature, ExecutionRuntime, RuntimeError, Stream};
use crate::dtype::DType;
use crate::frontend::{Tensor, TensorError};
use crate::numeric_tensor::NumericTensor;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ExecutableError {
    #[error("Missing argument: {name}\nNote: Expected the following arguments: {expected:?}")]
    MissingArgument { name: String, expected: Vec<String> },
    #[error(
        "Extra keyword arguments: {names:?}\nNote: Expected the following arguments: {expected:?}.\nNote: The following arguments were already provided as positional arguments: {positional:?}"
    )]
    ExtraArgument {
        names: Vec<String>,
        expected: Vec<String>,
        positional: Vec<String>,
    },
    #[error(
        "Incorrect number of arguments.\nExpected {expected} arguments but got {got}.\nNote: Expected arguments were: {names:?}"
    )]
    ArityMismatch {
        expected: usize,
        got: usize,
        names: Vec<String>,
    },
    #[error("Unexpected tensor data type.\nFor parameter {param}, expected data type: {expected} but got: {actual}.")]
    UnexpectedDtype {
        param: String,
        expected: DType,
        actual: DType,
    },
    #[error(
        "Unexpected tensor shape.\nFor tensor: `{param}`, expected a shape within the bounds: min={min_shape:?}, max={max_shape:?}, but got: {shape:?}.\nDimension {dim} has a shape of {actual}, which is not within the expected bounds of [{min}, {max}]."
    )]
    ShapeOutOfBounds {
        param: String,
        dim: usize,
        min: u64,
        max: u64,
        actual: u64,
        min_shape: Vec<u64>,
        max_shape: Vec<u64>,
        shape: Vec<usize>,
    },
    #[error("{0}")]
    StrideMismatch(String),
    #[error("Failed to materialize argument {param}: {source}")]
    Materialization {
        param: String,
        #[source]
        source: TensorError,
    },
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("Invalid executable signature: {0}")]
    Signature(String),
}

/// Shape bounds and dtype of one compiled argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgInfo {
    /// (min, max) per dimension; equal for static dimensions.
    pub shape_bounds: Vec<(u64, u64)>,
    pub dtype: DType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnArity {
    Single,
    Sequence(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSignature {
    pub params: Vec<String>,
    pub returns: ReturnArity,
}

impl CallSignature {
    fn new(params: Vec<String>, num_outputs: usize) -> Self {
        let returns = if num_outputs == 1 {
            ReturnArity::Single
        } else {
            ReturnArity::Sequence(num_outputs)
        };
        Self { params, returns }
    }

    /// Orders positional and keyword arguments by parameter name.
    ///
    /// Name errors are reported before the argument count is checked.
    pub fn bind<T: Copy>(&self, args: &[T], kwargs: &BTreeMap<&str, T>) -> Result<Vec<T>, ExecutableError> {
        let num_positional = args.len();
        let num_args = num_positional + kwargs.len();

        let mut bound = args.to_vec();
        let mut remaining = kwargs.clone();
        for name in self.params.iter().skip(num_positional) {
            let Some(value) = remaining.remove(name.as_str()) else {
                return Err(ExecutableError::MissingArgument {
                    name: name.clone(),
                    expected: self.params.clone(),
                });
            };
            bound.push(value);
        }

        if !remaining.is_empty() {
            return Err(ExecutableError::ExtraArgument {
                names: remaining.keys().map(|x| x.to_string()).collect(),
                expected: self.params.clone(),
                positional: self.params.iter().take(num_positional).cloned().collect(),
            });
        }

        if num_args != self.params.len() {
            return Err(ExecutableError::ArityMismatch {
                expected: self.params.len(),
                got: num_args,
                names: self.params.clone(),
            });
        }
        Ok(bound)
    }
}

impl Display for CallSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let params = self
            .params
            .iter()
            .map(|x| format!("{x}: Tensor"))
            .collect::<Vec<_>>();
        let returns = match self.returns {
            ReturnArity::Single => "Tensor",
            ReturnArity::Sequence(_) => "Sequence[Tensor]",
        };
        write!(f, "({}) -> {returns}", params.join(", "))
    }
}

#[derive(Debug)]
pub enum Outputs {
    Single(Tensor),
    Many(Vec<Tensor>),
}

impl Outputs {
    pub fn into_vec(self) -> Vec<Tensor> {
        match self {
            Outputs::Single(x) => vec![x],
            Outputs::Many(x) => x,
        }
    }

    pub fn single(self) -> Option<Tensor> {
        match self {
            Outputs::Single(x) => Some(x),
            Outputs::Many(_) => None,
        }
    }
}

/// Compiled artifact bound to a runtime, with its calling convention.
#[derive(Debug)]
pub struct Executable {
    runtime: Arc<dyn ExecutionRuntime>,
    artifact: Arc<dyn Artifact>,
    arg_names: Vec<String>,
    output_devices: Vec<Device>,
    signature: ExecutableSignature,
    call_signature: CallSignature,
    stream: Stream,
}

impl Executable {
    pub fn new(
        runtime: Arc<dyn ExecutionRuntime>,
        artifact: Arc<dyn Artifact>,
        arg_names: Vec<String>,
        output_devices: Vec<Device>,
    ) -> Result<Self, ExecutableError> {
        let signature = artifact.signature(artifact.entry_point())?;
        if arg_names.len() != signature.num_input_args {
            return Err(ExecutableError::Signature(format!(
                "{} argument names given for {} inputs",
                arg_names.len(),
                signature.num_input_args
            )));
        }
        if output_devices.len() != signature.num_output_args {
            return Err(ExecutableError::Signature(format!(
                "{} output devices given for {} outputs",
                output_devices.len(),
                signature.num_output_args
            )));
        }
        let call_signature = CallSignature::new(arg_names.clone(), signature.num_output_args);
        let stream = runtime.create_stream();
        Ok(Self {
            runtime,
            artifact,
            arg_names,
            output_devices,
            signature,
            call_signature,
            stream,
        })
    }

    pub fn arg_names(&self) -> &[String] {
        &self.arg_names
    }

    pub fn output_devices(&self) -> &[Device] {
        &self.output_devices
    }

    pub fn artifact(&self) -> &Arc<dyn Artifact> {
        &self.artifact
    }

    pub fn runtime(&self) -> &Arc<dyn ExecutionRuntime> {
        &self.runtime
    }

    pub fn signature(&self) -> &ExecutableSignature {
        &self.signature
    }

    pub fn call_signature(&self) -> &CallSignature {
        &self.call_signature
    }

    pub fn stream(&self) -> Stream {
        self.stream
    }

    pub fn set_stream(&mut self, stream: Stream) {
        self.stream = stream;
    }

    fn arg_info(&self, index: usize) -> Result<ArgInfo, ExecutableError> {
        let arg = self.signature.get_arg(index)?;
        let bounds = self.signature.get_arg_bound(index)?;
        let mut shape_bounds = bounds
            .min
            .iter()
            .zip(&bounds.max)
            .map(|(min, max)| ((*min).max(0) as u64, (*max).max(0) as u64))
            .collect::<Vec<_>>();
        if shape_bounds.is_empty() {
            shape_bounds = arg
                .shape
                .iter()
                .map(|x| ((*x).max(0) as u64, (*x).max(0) as u64))
                .collect();
        }
        Ok(ArgInfo {
            shape_bounds,
            dtype: DType::from(arg.dtype),
        })
    }

    pub fn input_info(&self) -> Result<Vec<ArgInfo>, ExecutableError> {
        (0..self.signature.num_input_args)
            .map(|i| self.arg_info(i))
            .collect()
    }

    pub fn output_info(&self) -> Result<Vec<ArgInfo>, ExecutableError> {
        let offset = self.signature.num_input_args;
        (0..self.signature.num_output_args)
            .map(|i| self.arg_info(offset + i))
            .collect()
    }

    /// Binds, materializes and runs. A single output is returned unwrapped.
    pub fn call(&self, args: &[&Tensor], kwargs: &BTreeMap<&str, &Tensor>) -> Result<Outputs, ExecutableError> {
        let bound = self.call_signature.bind(args, kwargs)?;

        let mut inputs: Vec<NumericTensor> = vec![];
        for (tensor, name) in bound.iter().zip(&self.arg_names) {
            let value = tensor
                .materialize()
                .map_err(|source| ExecutableError::Materialization {
                    param: name.clone(),
                    source,
                })?;
            inputs.push(value.clone());
        }

        log::debug!("Invoking executable{} on stream {}", self.call_signature, self.stream.id);
        let outputs = match self.runtime.execute(
            self.artifact.as_ref(),
            self.artifact.entry_point(),
            &inputs,
            &self.output_devices,
            &self.stream,
        ) {
            Ok(outputs) => outputs,
            Err(err) => {
                return Err(match self.input_info() {
                    Ok(input_info) => translate_runtime_error(err, &self.arg_names, &inputs, &input_info),
                    Err(lookup) => {
                        log::warn!("Cannot describe inputs while translating a runtime error: {lookup}");
                        ExecutableError::Runtime(err)
                    }
                });
            }
        };

        let mut tensors = outputs
            .into_iter()
            .zip(&self.output_devices)
            .map(|(value, device)| Tensor::on_device(value, *device))
            .collect::<Vec<_>>();
        if tensors.len() == 1 {
            if let Some(tensor) = tensors.pop() {
                return Ok(Outputs::Single(tensor));
            }
        }
        Ok(Outputs::Many(tensors))
    }

    /// Positional-only convenience for [`Executable::call`].
    pub fn call_positional(&self, args: &[&Tensor]) -> Result<Outputs, ExecutableError> {
        self.call(args, &BTreeMap::new())
    }
}

impl Display for Executable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Executable{}", self.call_signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature() -> CallSignature {
        CallSignature::new(vec!["a".to_string(), "b".to_string()], 1)
    }

    #[test]
    fn test_bind_mixed() {
        let sig = signature();
        let all_positional = sig.bind(&[1, 2], &BTreeMap::new()).unwrap();
        let all_keyword = sig.bind(&[], &BTreeMap::from([("b", 2), ("a", 1)])).unwrap();
        let mixed = sig.bind(&[1], &BTreeMap::from([("b", 2)])).unwrap();
        assert_eq!(all_positional, vec![1, 2]);
        assert_eq!(all_keyword, vec![1, 2]);
        assert_eq!(mixed, vec![1, 2]);
    }

    #[test]
    fn test_bind_errors() {
        let sig = signature();
        assert!(matches!(
            sig.bind::<i32>(&[], &BTreeMap::new()),
            Err(ExecutableError::MissingArgument { ref name, .. }) if name == "a"
        ));
        assert!(matches!(
            sig.bind(&[1], &BTreeMap::new()),
            Err(ExecutableError::MissingArgument { ref name, .. }) if name == "b"
        ));
        assert!(matches!(
            sig.bind(&[1, 2, 3], &BTreeMap::new()),
            Err(ExecutableError::ArityMismatch { expected: 2, got: 3, .. })
        ));
        let err = sig
            .bind(&[1, 2], &BTreeMap::from([("c", 3), ("a", 4)]))
            .unwrap_err();
        match err {
            ExecutableError::ExtraArgument { names, positional, .. } => {
                assert_eq!(names, vec!["a".to_string(), "c".to_string()]);
                assert_eq!(positional, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_signature_display() {
        assert_eq!(signature().to_string(), "(a: Tensor, b: Tensor) -> Tensor");
        let many = CallSignature::new(vec!["x".to_string()], 2);
        assert_eq!(many.to_string(), "(x: Tensor) -> Sequence[Tensor]");
    }

    /// Declares one input but carries no argument types for it.
    #[derive(Debug)]
    struct UntypedArtifact;

    impl Artifact for UntypedArtifact {
        fn entry_point(&self) -> &str {
            "main"
        }

        fn serialize(&self) -> Result<Vec<u8>, crate::backend::BackendCompileError> {
            Ok(vec![])
        }

        fn signature(&self, _entry_point: &str) -> Result<ExecutableSignature, RuntimeError> {
            Ok(ExecutableSignature {
                num_input_args: 1,
                num_output_args: 1,
                args: vec![],
                arg_bounds: vec![],
            })
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[derive(Debug)]
    struct FailingRuntime;

    impl ExecutionRuntime for FailingRuntime {
        fn load_artifact(&self, _bytes: &[u8]) -> Result<Arc<dyn Artifact>, RuntimeError> {
            Ok(Arc::new(UntypedArtifact))
        }

        fn create_stream(&self) -> Stream {
            Stream { id: 0 }
        }

        fn execute(
            &self,
            _artifact: &dyn Artifact,
            _entry_point: &str,
            _inputs: &[NumericTensor],
            _output_devices: &[Device],
            _stream: &Stream,
        ) -> Result<Vec<NumericTensor>, RuntimeError> {
            Err(RuntimeError::new(format!("{ELEMENT_TYPE_MISMATCH} 'f32' but got 'f16'")))
        }
    }

    #[test]
    fn test_runtime_error_survives_missing_arg_types() {
        let exe = Executable::new(
            Arc::new(FailingRuntime),
            Arc::new(UntypedArtifact),
            vec!["x".to_string()],
            vec![Device::cpu(0)],
        )
        .unwrap();
        assert!(exe.input_info().is_err());

        let x = Tensor::new(NumericTensor::from_vec(vec![1.0f32]));
        match exe.call_positional(&[&x]) {
            Err(ExecutableError::Runtime(err)) => {
                assert_eq!(err.message, format!("{ELEMENT_TYPE_MISMATCH} 'f32' but got 'f16'"));
            }
            other => panic!("expected the runtime error, got {other:?}"),
        }
    }
}
