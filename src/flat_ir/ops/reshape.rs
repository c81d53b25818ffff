use crate::flat_ir::ops::{AnyFlatIROp, FlatIROp, operand, render_list};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::NumericTensor;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Source of one output dimension of a reshape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReshapeDim {
    Fixed(u64),
    /// Runtime size of the given input dimension.
    FromInput(usize),
    /// Whatever remains after the other dimensions are accounted for.
    Infer,
}

impl Display for ReshapeDim {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReshapeDim::Fixed(x) => write!(f, "{x}"),
            ReshapeDim::FromInput(i) => write!(f, "d{i}"),
            ReshapeDim::Infer => write!(f, "-1"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reshape {
    input: FlatIRTensorId,
    output: FlatIRTensorId,
    dims: Vec<ReshapeDim>,
}

impl Reshape {
    pub fn push(
        flat_ir: &mut FlatIR,
        input: FlatIRTensorId,
        dims: Vec<ReshapeDim>,
        output: FlatIRTensorId,
    ) -> Result<(), FlatIRError> {
        let in_rank = flat_ir.get_tensor_info(input)?.rank();
        let out_rank = flat_ir.get_tensor_info(output)?.rank();
        if dims.len() != out_rank {
            return Err(FlatIRError::invalid(
                "stablehlo.reshape",
                format!("{} dims given for a rank {out_rank} output", dims.len()),
            ));
        }
        if dims.iter().filter(|d| **d == ReshapeDim::Infer).count() > 1 {
            return Err(FlatIRError::invalid(
                "stablehlo.reshape",
                "at most one dimension may be inferred",
            ));
        }
        if let Some(ReshapeDim::FromInput(i)) = dims
            .iter()
            .find(|d| matches!(d, ReshapeDim::FromInput(i) if *i >= in_rank))
        {
            return Err(FlatIRError::invalid(
                "stablehlo.reshape",
                format!("input has rank {in_rank}, cannot copy dimension {i}"),
            ));
        }
        flat_ir.push_op(AnyFlatIROp::Reshape(Self {
            input,
            output,
            dims,
        }))
    }

    fn resolve(&self, input_shape: &[usize]) -> Result<Vec<usize>, FlatIRError> {
        let overflow = |shape: String| {
            FlatIRError::invalid("stablehlo.reshape", format!("element count of {shape} overflows"))
        };
        let total: usize = input_shape.iter().product();
        let mut known = 1usize;
        let mut out = Vec::with_capacity(self.dims.len());
        for dim in &self.dims {
            let size = match dim {
                ReshapeDim::Fixed(x) => Some(*x as usize),
                ReshapeDim::FromInput(i) => Some(input_shape.get(*i).copied().ok_or_else(|| {
                    FlatIRError::invalid(
                        "stablehlo.reshape",
                        format!("input {input_shape:?} has no dimension {i}"),
                    )
                })?),
                ReshapeDim::Infer => None,
            };
            if let Some(size) = size {
                known = known.checked_mul(size).ok_or_else(|| overflow(render_list(&self.dims)))?;
            }
            out.push(size);
        }
        let inferred = if known == 0 { 0 } else { total / known };
        let out = out
            .into_iter()
            .map(|x| x.unwrap_or(inferred))
            .collect::<Vec<_>>();
        let out_total = out
            .iter()
            .try_fold(1usize, |acc, x| acc.checked_mul(*x))
            .ok_or_else(|| overflow(format!("{out:?}")))?;
        if out_total != total {
            return Err(FlatIRError::invalid(
                "stablehlo.reshape",
                format!("cannot reshape {input_shape:?} into {out:?}"),
            ));
        }
        Ok(out)
    }
}

impl FlatIROp for Reshape {
    fn get_op_name(&self) -> &'static str {
        "stablehlo.reshape"
    }

    fn get_inputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.output]
    }

    fn attributes(&self) -> Option<String> {
        Some(format!("dims = {}", render_list(&self.dims)))
    }

    fn eval(&self, inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError> {
        let input = operand(inputs, 0, self.get_op_name())?;
        let shape = self.resolve(&input.shape())?;
        Ok(vec![input.reshape(&shape)?])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transpose {
    input: FlatIRTensorId,
    output: FlatIRTensorId,
    permutation: Vec<usize>,
}

impl Transpose {
    pub fn push(
        flat_ir: &mut FlatIR,
        input: FlatIRTensorId,
        permutation: Vec<usize>,
        output: FlatIRTensorId,
    ) -> Result<(), FlatIRError> {
        let rank = flat_ir.get_tensor_info(input)?.rank();
        let mut sorted = permutation.clone();
        sorted.sort_unstable();
        if sorted != (0..rank).collect::<Vec<_>>() {
            return Err(FlatIRError::invalid(
                "stablehlo.transpose",
                format!("{permutation:?} is not a permutation of {rank} dimensions"),
            ));
        }
        flat_ir.push_op(AnyFlatIROp::Transpose(Self {
            input,
            output,
            permutation,
        }))
    }
}

impl FlatIROp for Transpose {
    fn get_op_name(&self) -> &'static str {
        "stablehlo.transpose"
    }

    fn get_inputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.output]
    }

    fn attributes(&self) -> Option<String> {
        Some(format!("permutation = {}", render_list(&self.permutation)))
    }

    fn eval(&self, inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError> {
        let input = operand(inputs, 0, self.get_op_name())?;
        Ok(vec![input.permute(&self.permutation)?])
    }
}
