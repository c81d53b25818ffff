use crate::backend::{ArtifactCompiler, BackendCompileError, Device, ExecutionRuntime};
use crate::dtype::DType;
use crate::executable::{Executable, ExecutableError};
use crate::flat_ir::{self, FlatIRError};
use crate::shape::{DimBounds, Dimension};
use crate::trace::{TraceError, TraceGraph, TraceTensorId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum CompilerError {
    #[error("Invalid compile option: {0}")]
    InvalidOption(String),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Lowering(#[from] FlatIRError),
    #[error(transparent)]
    Backend(#[from] BackendCompileError),
    #[error(transparent)]
    Executable(#[from] ExecutableError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One dimension of a compiled argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputDim {
    Static(u64),
    /// `opt` is the size the backend should tune for.
    Dynamic { min: u64, opt: u64, max: u64 },
}

impl InputDim {
    fn to_dimension(self) -> Result<Dimension, CompilerError> {
        match self {
            InputDim::Static(x) => Ok(Dimension::Known(x)),
            InputDim::Dynamic { min, opt, max } => {
                if !(min <= opt && opt <= max) {
                    return Err(CompilerError::InvalidOption(format!(
                        "dynamic dimension bounds must satisfy min <= opt <= max, got ({min}, {opt}, {max})"
                    )));
                }
                if min == max {
                    Ok(Dimension::Known(min))
                } else {
                    Ok(Dimension::Dynamic(DimBounds::new(min, max)))
                }
            }
        }
    }
}

impl From<u64> for InputDim {
    fn from(value: u64) -> Self {
        InputDim::Static(value)
    }
}

/// Shape and dtype of one argument of the function being compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputInfo {
    pub shape: Vec<InputDim>,
    pub dtype: DType,
}

impl InputInfo {
    pub fn new(shape: Vec<InputDim>, dtype: DType) -> Self {
        Self { shape, dtype }
    }

    pub fn from_static(shape: &[u64], dtype: DType) -> Self {
        Self::new(shape.iter().map(|x| InputDim::Static(*x)).collect(), dtype)
    }

    pub fn to_dimensions(&self) -> Result<Vec<Dimension>, CompilerError> {
        self.shape.iter().map(|x| x.to_dimension()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub optimization_level: u8,
    pub strongly_typed: bool,
    pub entry_point: String,
    pub output_device: Device,
    /// Logs the lowered program at debug level.
    pub debug: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimization_level: 3,
            strongly_typed: false,
            entry_point: "main".to_string(),
            output_device: Device::default(),
            debug: false,
        }
    }
}

impl CompileOptions {
    pub const MAX_OPTIMIZATION_LEVEL: u8 = 5;

    pub fn from_json(json: &str) -> Result<Self, CompilerError> {
        let options: CompileOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), CompilerError> {
        if self.optimization_level > Self::MAX_OPTIMIZATION_LEVEL {
            return Err(CompilerError::InvalidOption(format!(
                "optimization_level must be between 0 and {}, got {}",
                Self::MAX_OPTIMIZATION_LEVEL,
                self.optimization_level
            )));
        }
        if self.entry_point.is_empty() {
            return Err(CompilerError::InvalidOption("entry_point must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn to_flags(&self) -> Vec<String> {
        vec![
            format!("--tensorrt-builder-opt-level={}", self.optimization_level),
            format!("--tensorrt-strongly-typed={}", self.strongly_typed),
        ]
    }
}

/// Builds a trace graph with one input per entry of `args`, in order, and marks the
/// tensors returned by `f` as its outputs.
pub fn trace<F>(args: &[(&str, InputInfo)], f: F) -> Result<TraceGraph, CompilerError>
where
    F: FnOnce(&mut TraceGraph, &[TraceTensorId]) -> Result<Vec<TraceTensorId>, TraceError>,
{
    let mut graph = TraceGraph::new();
    let mut inputs = vec![];
    for (name, info) in args {
        inputs.push(graph.add_input(name, info.to_dimensions()?, info.dtype)?);
    }
    let outputs = f(&mut graph, &inputs)?;
    graph.set_outputs(outputs)?;
    Ok(graph)
}

/// Lowers `graph`, compiles it with `compiler` and binds the result to `runtime`.
///
/// A compiler instance may not be shared by concurrent calls.
pub fn compile(
    graph: &TraceGraph,
    options: &CompileOptions,
    compiler: &dyn ArtifactCompiler,
    runtime: Arc<dyn ExecutionRuntime>,
) -> Result<Executable, CompilerError> {
    options.validate()?;
    let program = flat_ir::lower(graph)?;
    if options.debug {
        log::debug!("Lowered program:\n{program}");
    }
    log::info!(
        "Compiling {} flat IR operations with flags {:?}",
        program.ops().len(),
        options.to_flags()
    );
    let artifact = compiler.compile(&program, options)?;
    let output_devices = vec![options.output_device; graph.get_outputs().len()];
    Ok(Executable::new(
        runtime,
        artifact,
        graph.get_input_names(),
        output_devices,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults_from_json() {
        let options = CompileOptions::from_json("{\"strongly_typed\": true}").unwrap();
        assert_eq!(options.optimization_level, 3);
        assert!(options.strongly_typed);
        assert_eq!(options.entry_point, "main");
        assert_eq!(options.output_device, Device::cpu(0));
        assert_eq!(
            options.to_flags(),
            [
                "--tensorrt-builder-opt-level=3".to_string(),
                "--tensorrt-strongly-typed=true".to_string()
            ]
        );
    }

    #[test]
    fn test_options_reject_level() {
        let err = CompileOptions::from_json("{\"optimization_level\": 9}").unwrap_err();
        assert!(matches!(err, CompilerError::InvalidOption(_)));
    }

    #[test]
    fn test_input_dims() {
        let info = InputInfo::new(
            vec![InputDim::Dynamic { min: 1, opt: 2, max: 4 }, InputDim::Static(3), InputDim::Dynamic { min: 2, opt: 2, max: 2 }],
            DType::F32,
        );
        assert_eq!(
            info.to_dimensions().unwrap(),
            vec![
                Dimension::Dynamic(DimBounds::new(1, 4)),
                Dimension::Known(3),
                Dimension::Known(2)
            ]
        );
        let bad = InputInfo::new(vec![InputDim::Dynamic { min: 3, opt: 2, max: 4 }], DType::F32);
        assert!(bad.to_dimensions().is_err());
    }
}
