pub mod backend;
pub mod compiler;
pub mod constraints;
pub mod dtype;
pub mod executable;
pub mod flat_ir;
pub mod frontend;
pub mod numeric_tensor;
pub mod registry;
pub mod shape;
pub mod trace;

pub use compiler::{CompileOptions, CompilerError, InputDim, InputInfo, compile};
pub use dtype::DType;
pub use executable::{ArgInfo, Executable, ExecutableError, Outputs};
pub use frontend::Tensor;
pub use numeric_tensor::NumericTensor;
pub use trace::{TraceGraph, TraceTensorId};
