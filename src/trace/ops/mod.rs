mod binary;
mod cast;
mod constant;
mod conv;
mod matmul;
mod permute;
mod reduce;
mod reshape;
mod unary;

pub use binary::BinaryElementwise;
pub use cast::Cast;
pub use constant::Constant;
pub use conv::Convolution;
pub use matmul::MatrixMultiply;
pub use permute::Permute;
pub use reduce::{Reduce, ReduceKind};
pub use reshape::{Reshape, Squeeze, Unsqueeze};
pub use unary::UnaryElementwise;

use crate::dtype::DType;
use crate::flat_ir::ops::{Reshape as FlatReshape, ReshapeDim};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::shape::{Dimension, InferRankPolicy};
use crate::trace::{TraceError, TraceTensorId};
use serde::{Deserialize, Serialize};

/// A node of the trace graph.
///
/// Output rank, dtype and shape are pure functions of the input ranks, dtypes and
/// shapes together with the node's own attributes.
pub trait Operation {
    fn get_op_type_name(&self) -> String;
    fn get_inputs(&self) -> Vec<TraceTensorId>;
    fn get_outputs(&self) -> Vec<TraceTensorId>;
    fn infer_rank(&self, input_ranks: &[usize]) -> Result<Vec<usize>, TraceError>;
    fn infer_dtypes(&self, input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError>;
    fn infer_shapes(&self, input_shapes: &[Vec<Dimension>]) -> Result<Vec<Vec<Dimension>>, TraceError>;
    /// Emits flat IR that produces exactly `outputs`, in order, from `inputs`.
    fn to_flat_ir(
        &self,
        flat_ir: &mut FlatIR,
        inputs: &[FlatIRTensorId],
        outputs: &[FlatIRTensorId],
    ) -> Result<(), FlatIRError>;
}

pub(crate) fn apply_rank_policy(
    op: &str,
    policy: InferRankPolicy,
    input_ranks: &[usize],
) -> Result<Vec<usize>, TraceError> {
    policy
        .apply(input_ranks)
        .map(|rank| vec![rank])
        .map_err(|reason| TraceError::rank(op, reason))
}

pub(crate) fn input_at<T: Clone>(op: &str, values: &[T], index: usize) -> Result<T, TraceError> {
    values
        .get(index)
        .cloned()
        .ok_or_else(|| TraceError::rank(op, format!("missing input {index}")))
}

pub(crate) fn flat_at(
    op: &str,
    values: &[FlatIRTensorId],
    index: usize,
) -> Result<FlatIRTensorId, FlatIRError> {
    values
        .get(index)
        .copied()
        .ok_or_else(|| FlatIRError::invalid(op, format!("missing tensor {index}")))
}

/// Reshapes `input` to `rank` by prepending unit dimensions.
pub(crate) fn expand_rank(
    flat_ir: &mut FlatIR,
    input: FlatIRTensorId,
    rank: usize,
) -> Result<FlatIRTensorId, FlatIRError> {
    let info = flat_ir.get_tensor_info(input)?;
    let in_rank = info.rank();
    if in_rank >= rank {
        return Ok(input);
    }
    let extra = rank - in_rank;
    let dtype = info.dtype;
    let mut shape = vec![Dimension::Known(1); extra];
    shape.extend(info.shape.iter().copied());
    let mut dims = vec![ReshapeDim::Fixed(1); extra];
    dims.extend((0..in_rank).map(ReshapeDim::FromInput));
    let output = flat_ir.new_tensor(shape, dtype);
    FlatReshape::push(flat_ir, input, dims, output)?;
    Ok(output)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, strum_macros::VariantNames)]
pub enum AnyOperation {
    Unary(UnaryElementwise),
    Binary(BinaryElementwise),
    Constant(Constant),
    Cast(Cast),
    Squeeze(Squeeze),
    Unsqueeze(Unsqueeze),
    Reshape(Reshape),
    Permute(Permute),
    Reduce(Reduce),
    Convolution(Convolution),
    MatrixMultiply(MatrixMultiply),
}

macro_rules! delegate {
    ($name:ident($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        fn $name(&self, $($arg: $ty),*) -> $ret {
            match self {
                AnyOperation::Unary(x) => x.$name($($arg),*),
                AnyOperation::Binary(x) => x.$name($($arg),*),
                AnyOperation::Constant(x) => x.$name($($arg),*),
                AnyOperation::Cast(x) => x.$name($($arg),*),
                AnyOperation::Squeeze(x) => x.$name($($arg),*),
                AnyOperation::Unsqueeze(x) => x.$name($($arg),*),
                AnyOperation::Reshape(x) => x.$name($($arg),*),
                AnyOperation::Permute(x) => x.$name($($arg),*),
                AnyOperation::Reduce(x) => x.$name($($arg),*),
                AnyOperation::Convolution(x) => x.$name($($arg),*),
                AnyOperation::MatrixMultiply(x) => x.$name($($arg),*),
            }
        }
    }
}

impl Operation for AnyOperation {
    delegate!(get_op_type_name() -> String);
    delegate!(get_inputs() -> Vec<TraceTensorId>);
    delegate!(get_outputs() -> Vec<TraceTensorId>);
    delegate!(infer_rank(input_ranks: &[usize]) -> Result<Vec<usize>, TraceError>);
    delegate!(infer_dtypes(input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError>);
    delegate!(infer_shapes(input_shapes: &[Vec<Dimension>]) -> Result<Vec<Vec<Dimension>>, TraceError>);
    delegate!(to_flat_ir(
        flat_ir: &mut FlatIR,
        inputs: &[FlatIRTensorId],
        outputs: &[FlatIRTensorId]
    ) -> Result<(), FlatIRError>);
}
