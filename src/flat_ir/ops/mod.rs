mod constant;
mod convert;
mod convolution;
mod dimension;
mod dot;
mod elementwise;
mod reduce;
mod reshape;

pub use constant::{Constant, materialize_constant};
pub use convert::Convert;
pub use convolution::Convolution;
pub use dimension::GetDimensionSize;
pub use dot::Dot;
pub use elementwise::{Binary, Unary};
pub use reduce::Reduce;
pub use reshape::{Reshape, ReshapeDim, Transpose};

use crate::flat_ir::{FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::NumericTensor;
use serde::{Deserialize, Serialize};

pub trait FlatIROp {
    fn get_op_name(&self) -> &'static str;
    fn get_inputs(&self) -> Vec<FlatIRTensorId>;
    fn get_outputs(&self) -> Vec<FlatIRTensorId>;
    /// Rendered inside `{}` in the textual form.
    fn attributes(&self) -> Option<String> {
        None
    }
    /// Reference semantics; `inputs` follow the order of `get_inputs`.
    fn eval(&self, inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError>;
}

pub(crate) fn operand<'a>(
    inputs: &[&'a NumericTensor],
    index: usize,
    op: &str,
) -> Result<&'a NumericTensor, FlatIRError> {
    inputs
        .get(index)
        .copied()
        .ok_or_else(|| FlatIRError::invalid(op, format!("missing operand {index}")))
}

pub(crate) fn render_list<T: ToString>(items: &[T]) -> String {
    let items = items.iter().map(|x| x.to_string()).collect::<Vec<_>>();
    format!("[{}]", items.join(", "))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum_macros::VariantNames)]
pub enum AnyFlatIROp {
    Constant(Constant),
    Convert(Convert),
    Unary(Unary),
    Binary(Binary),
    Reshape(Reshape),
    Transpose(Transpose),
    Reduce(Reduce),
    Convolution(Convolution),
    Dot(Dot),
    GetDimensionSize(GetDimensionSize),
}

macro_rules! delegate {
    ($name:ident($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        fn $name(&self, $($arg: $ty),*) -> $ret {
            match self {
                AnyFlatIROp::Constant(x) => x.$name($($arg),*),
                AnyFlatIROp::Convert(x) => x.$name($($arg),*),
                AnyFlatIROp::Unary(x) => x.$name($($arg),*),
                AnyFlatIROp::Binary(x) => x.$name($($arg),*),
                AnyFlatIROp::Reshape(x) => x.$name($($arg),*),
                AnyFlatIROp::Transpose(x) => x.$name($($arg),*),
                AnyFlatIROp::Reduce(x) => x.$name($($arg),*),
                AnyFlatIROp::Convolution(x) => x.$name($($arg),*),
                AnyFlatIROp::Dot(x) => x.$name($($arg),*),
                AnyFlatIROp::GetDimensionSize(x) => x.$name($($arg),*),
            }
        }
    }
}

impl FlatIROp for AnyFlatIROp {
    delegate!(get_op_name() -> &'static str);
    delegate!(get_inputs() -> Vec<FlatIRTensorId>);
    delegate!(get_outputs() -> Vec<FlatIRTensorId>);
    delegate!(attributes() -> Option<String>);
    delegate!(eval(inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError>);
}
