use crate::flat_ir::ops::{AnyFlatIROp, FlatIROp, operand};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::NumericTensor;
use serde::{Deserialize, Serialize};

/// Batched matrix product of equal-rank operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dot {
    lhs: FlatIRTensorId,
    rhs: FlatIRTensorId,
    output: FlatIRTensorId,
    batch_dims: usize,
}

impl Dot {
    pub fn push(
        flat_ir: &mut FlatIR,
        lhs: FlatIRTensorId,
        rhs: FlatIRTensorId,
        output: FlatIRTensorId,
    ) -> Result<(), FlatIRError> {
        let a = flat_ir.get_tensor_info(lhs)?.rank();
        let b = flat_ir.get_tensor_info(rhs)?.rank();
        let out = flat_ir.get_tensor_info(output)?.rank();
        if a < 2 || a != b || a != out {
            return Err(FlatIRError::invalid(
                "stablehlo.dot_general",
                format!("operand ranks {a} and {b} with output rank {out}"),
            ));
        }
        flat_ir.push_op(AnyFlatIROp::Dot(Self {
            lhs,
            rhs,
            output,
            batch_dims: a - 2,
        }))
    }
}

impl FlatIROp for Dot {
    fn get_op_name(&self) -> &'static str {
        "stablehlo.dot_general"
    }

    fn get_inputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.lhs, self.rhs]
    }

    fn get_outputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.output]
    }

    fn attributes(&self) -> Option<String> {
        let batch = (0..self.batch_dims)
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "batching_dims = [{batch}] x [{batch}], contracting_dims = [{}] x [{}]",
            self.batch_dims + 1,
            self.batch_dims
        ))
    }

    fn eval(&self, inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError> {
        let lhs = operand(inputs, 0, self.get_op_name())?;
        let rhs = operand(inputs, 1, self.get_op_name())?;
        Ok(vec![lhs.matmul(rhs)?])
    }
}
