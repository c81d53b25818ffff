use std::sync::Arc;
use whisper_trace::backend::reference::{ReferenceCompiler, ReferenceRuntime};
use whisper_trace::compiler::{self, CompileOptions, InputInfo};
use whisper_trace::dtype::DType;
use whisper_trace::trace::TraceError;
use whisper_trace::{Executable, NumericTensor, Tensor, TraceGraph, TraceTensorId};

pub mod conv_matmul;
pub mod elementwise;
pub mod reductions;
pub mod shape_ops;

pub struct Pipeline {
    compiler: ReferenceCompiler,
    runtime: Arc<ReferenceRuntime>,
}

impl Pipeline {
    pub fn reference() -> Self {
        Self {
            compiler: ReferenceCompiler::new(),
            runtime: Arc::new(ReferenceRuntime::new()),
        }
    }

    pub fn build<F>(&self, args: &[(&str, InputInfo)], f: F) -> Executable
    where
        F: FnOnce(&mut TraceGraph, &[TraceTensorId]) -> Result<Vec<TraceTensorId>, TraceError>,
    {
        let graph = compiler::trace(args, f).unwrap();
        compiler::compile(
            &graph,
            &CompileOptions::default(),
            &self.compiler,
            self.runtime.clone(),
        )
        .unwrap()
    }
}

pub fn run(executable: &Executable, inputs: Vec<NumericTensor>) -> Vec<NumericTensor> {
    let tensors = inputs.into_iter().map(Tensor::new).collect::<Vec<_>>();
    let refs = tensors.iter().collect::<Vec<_>>();
    executable
        .call_positional(&refs)
        .unwrap()
        .into_vec()
        .iter()
        .map(|x| x.materialize().unwrap().clone())
        .collect()
}

pub fn run_single(executable: &Executable, inputs: Vec<NumericTensor>) -> NumericTensor {
    let mut outputs = run(executable, inputs);
    assert_eq!(outputs.len(), 1);
    outputs.remove(0)
}

pub fn tensor<T: whisper_trace::numeric_tensor::NumericElement>(v: Vec<T>, shape: &[usize]) -> NumericTensor {
    NumericTensor::from_vec_shape(v, shape.to_vec()).unwrap()
}

fn test_eq(value: &NumericTensor, correct: &NumericTensor, atol: f64, rtol: f64) {
    assert_eq!(value.shape(), correct.shape());
    assert_eq!(value.dtype(), correct.dtype());
    let value_vec = value.to_f64_array().iter().copied().collect::<Vec<_>>();
    let correct_vec = correct.to_f64_array().iter().copied().collect::<Vec<_>>();
    for (a, b) in value_vec.iter().zip(correct_vec.iter()) {
        let err = (a - b).abs();
        let limit = atol + rtol * (a.abs().max(b.abs()));
        assert!(err < limit, "{a} != {b}: {err} < {limit}");
    }
}

pub fn test_eq_f32(value: &NumericTensor, correct: &NumericTensor) {
    assert_eq!(value.dtype(), DType::F32);
    test_eq(value, correct, 1e-5, 1.3e-6);
}

pub fn test_eq_f16(value: &NumericTensor, correct: &NumericTensor) {
    assert_eq!(value.dtype(), DType::F16);
    test_eq(value, correct, 1e-5, 4e-3);
}

pub fn test_eq_bf16(value: &NumericTensor, correct: &NumericTensor) {
    assert_eq!(value.dtype(), DType::BF16);
    test_eq(value, correct, 1e-5, 1.6e-2);
}
