use crate::compiler::CompileOptions;
use crate::dtype::{DType, DTypeError};
use crate::flat_ir::FlatIR;
use crate::numeric_tensor::NumericTensor;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "reference")]
pub mod reference;

/// Opaque failure raised by a runtime. Only its text is available.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendCompileError {
    #[error(transparent)]
    DTypeError(#[from] DTypeError),
    #[error("Failed to serialize artifact: {0}")]
    Serialization(String),
    #[error("Compilation failed: {0}")]
    Diagnostic(String),
}

/// Element types as the backend names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    F64,
    F32,
    BF16,
    F16,
    F8E4M3FN,
    I64,
    I32,
    I8,
    UI8,
    I1,
}

impl From<DType> for ScalarType {
    fn from(value: DType) -> Self {
        match value {
            DType::F64 => ScalarType::F64,
            DType::F32 => ScalarType::F32,
            DType::BF16 => ScalarType::BF16,
            DType::F16 => ScalarType::F16,
            DType::F8 => ScalarType::F8E4M3FN,
            DType::I64 => ScalarType::I64,
            DType::I32 => ScalarType::I32,
            DType::I8 => ScalarType::I8,
            DType::U8 => ScalarType::UI8,
            DType::BOOL => ScalarType::I1,
        }
    }
}

impl From<ScalarType> for DType {
    fn from(value: ScalarType) -> Self {
        match value {
            ScalarType::F64 => DType::F64,
            ScalarType::F32 => DType::F32,
            ScalarType::BF16 => DType::BF16,
            ScalarType::F16 => DType::F16,
            ScalarType::F8E4M3FN => DType::F8,
            ScalarType::I64 => DType::I64,
            ScalarType::I32 => DType::I32,
            ScalarType::I8 => DType::I8,
            ScalarType::UI8 => DType::U8,
            ScalarType::I1 => DType::BOOL,
        }
    }
}

impl Display for ScalarType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScalarType::F64 => "f64",
            ScalarType::F32 => "f32",
            ScalarType::BF16 => "bf16",
            ScalarType::F16 => "f16",
            ScalarType::F8E4M3FN => "f8E4M3FN",
            ScalarType::I64 => "i64",
            ScalarType::I32 => "i32",
            ScalarType::I8 => "i8",
            ScalarType::UI8 => "ui8",
            ScalarType::I1 => "i1",
        };
        write!(f, "{name}")
    }
}

/// Static type of one signature argument. Dynamic dimensions are `-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemRefType {
    pub shape: Vec<i64>,
    pub dtype: ScalarType,
}

/// Per-dimension bounds of one argument; empty when the argument is fully static.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgBounds {
    pub min: Vec<i64>,
    pub max: Vec<i64>,
}

/// Signature of one entry point. Outputs are indexed after inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableSignature {
    pub num_input_args: usize,
    pub num_output_args: usize,
    pub args: Vec<MemRefType>,
    pub arg_bounds: Vec<ArgBounds>,
}

impl ExecutableSignature {
    pub fn get_arg(&self, index: usize) -> Result<&MemRefType, RuntimeError> {
        self.args
            .get(index)
            .ok_or_else(|| RuntimeError::new(format!("signature has no argument {index}")))
    }

    pub fn get_arg_bound(&self, index: usize) -> Result<&ArgBounds, RuntimeError> {
        self.arg_bounds
            .get(index)
            .ok_or_else(|| RuntimeError::new(format!("signature has no bounds for argument {index}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

/// Device identifier, written `cpu:0` or `gpu:1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Device {
    pub kind: DeviceKind,
    pub index: u32,
}

impl Device {
    pub fn cpu(index: u32) -> Self {
        Self {
            kind: DeviceKind::Cpu,
            index,
        }
    }

    pub fn gpu(index: u32) -> Self {
        Self {
            kind: DeviceKind::Gpu,
            index,
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::cpu(0)
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
        };
        write!(f, "{kind}:{}", self.index)
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, index) = s.split_once(':').unwrap_or((s, "0"));
        let kind = match kind {
            "cpu" => DeviceKind::Cpu,
            "gpu" => DeviceKind::Gpu,
            _ => return Err(format!("Unknown device kind \"{kind}\" in \"{s}\"")),
        };
        let index = index
            .parse()
            .map_err(|_| format!("Invalid device index in \"{s}\""))?;
        Ok(Self { kind, index })
    }
}

impl TryFrom<String> for Device {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(value: Device) -> Self {
        value.to_string()
    }
}

/// Orders device work issued through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stream {
    pub id: u64,
}

/// A compiled, loadable program.
pub trait Artifact: Debug + Send + Sync {
    fn entry_point(&self) -> &str;
    fn serialize(&self) -> Result<Vec<u8>, BackendCompileError>;
    fn signature(&self, entry_point: &str) -> Result<ExecutableSignature, RuntimeError>;
    fn as_any(&self) -> &dyn Any;
}

pub trait ArtifactCompiler {
    fn compile(
        &self,
        program: &FlatIR,
        options: &CompileOptions,
    ) -> Result<Arc<dyn Artifact>, BackendCompileError>;
}

pub trait ExecutionRuntime: Debug + Send + Sync {
    fn load_artifact(&self, bytes: &[u8]) -> Result<Arc<dyn Artifact>, RuntimeError>;
    fn create_stream(&self) -> Stream;
    fn execute(
        &self,
        artifact: &dyn Artifact,
        entry_point: &str,
        inputs: &[NumericTensor],
        output_devices: &[Device],
        stream: &Stream,
    ) -> Result<Vec<NumericTensor>, RuntimeError>;
}
