use crate::flat_ir::ops::{AnyFlatIROp, FlatIROp, operand, render_list};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::{NumericTensor, ReduceOp};
use serde::{Deserialize, Serialize};

/// Reduction that removes `dims` from the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reduce {
    input: FlatIRTensorId,
    output: FlatIRTensorId,
    dims: Vec<usize>,
    op: ReduceOp,
}

impl Reduce {
    pub fn push(
        flat_ir: &mut FlatIR,
        op: ReduceOp,
        input: FlatIRTensorId,
        dims: Vec<usize>,
        output: FlatIRTensorId,
    ) -> Result<(), FlatIRError> {
        let in_rank = flat_ir.get_tensor_info(input)?.rank();
        let out_rank = flat_ir.get_tensor_info(output)?.rank();
        let mut unique = dims.clone();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() != dims.len()
            || dims.iter().any(|d| *d >= in_rank)
            || out_rank + dims.len() != in_rank
        {
            return Err(FlatIRError::invalid(
                "stablehlo.reduce",
                format!("cannot reduce dimensions {dims:?} of a rank {in_rank} input into rank {out_rank}"),
            ));
        }
        flat_ir.push_op(AnyFlatIROp::Reduce(Self {
            input,
            output,
            dims,
            op,
        }))
    }
}

impl FlatIROp for Reduce {
    fn get_op_name(&self) -> &'static str {
        "stablehlo.reduce"
    }

    fn get_inputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.output]
    }

    fn attributes(&self) -> Option<String> {
        Some(format!(
            "applies = {}, dimensions = {}",
            self.op.to_string().to_lowercase(),
            render_list(&self.dims)
        ))
    }

    fn eval(&self, inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError> {
        let input = operand(inputs, 0, self.get_op_name())?;
        Ok(vec![input.reduce(&self.dims, self.op)?])
    }
}
