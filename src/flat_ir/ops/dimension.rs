use crate::dtype::DType;
use crate::flat_ir::ops::{AnyFlatIROp, FlatIROp, operand};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::NumericTensor;
use serde::{Deserialize, Serialize};

/// Runtime size of one input dimension as a rank-0 int32 tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetDimensionSize {
    input: FlatIRTensorId,
    output: FlatIRTensorId,
    dim: usize,
}

impl GetDimensionSize {
    pub fn push(
        flat_ir: &mut FlatIR,
        input: FlatIRTensorId,
        dim: usize,
        output: FlatIRTensorId,
    ) -> Result<(), FlatIRError> {
        let rank = flat_ir.get_tensor_info(input)?.rank();
        let out = flat_ir.get_tensor_info(output)?;
        if dim >= rank || out.rank() != 0 || out.dtype != DType::I32 {
            return Err(FlatIRError::invalid(
                "stablehlo.get_dimension_size",
                format!("dimension {dim} of a rank {rank} input into {}", out.type_string()),
            ));
        }
        flat_ir.push_op(AnyFlatIROp::GetDimensionSize(Self { input, output, dim }))
    }
}

impl FlatIROp for GetDimensionSize {
    fn get_op_name(&self) -> &'static str {
        "stablehlo.get_dimension_size"
    }

    fn get_inputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.output]
    }

    fn attributes(&self) -> Option<String> {
        Some(format!("dimension = {}", self.dim))
    }

    fn eval(&self, inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError> {
        let input = operand(inputs, 0, self.get_op_name())?;
        let size = input.shape().get(self.dim).copied().ok_or_else(|| {
            FlatIRError::invalid(self.get_op_name(), format!("no dimension {}", self.dim))
        })?;
        Ok(vec![NumericTensor::scalar(size as i32)])
    }
}
