use crate::dtype::DType;
use crate::flat_ir::ops::{AnyFlatIROp, FlatIROp, operand};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::NumericTensor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Convert {
    input: FlatIRTensorId,
    output: FlatIRTensorId,
    dtype: DType,
}

impl Convert {
    pub fn push(
        flat_ir: &mut FlatIR,
        input: FlatIRTensorId,
        output: FlatIRTensorId,
    ) -> Result<(), FlatIRError> {
        let in_rank = flat_ir.get_tensor_info(input)?.rank();
        let out = flat_ir.get_tensor_info(output)?;
        if in_rank != out.rank() {
            return Err(FlatIRError::invalid(
                "stablehlo.convert",
                format!("rank {in_rank} input converted into {}", out.type_string()),
            ));
        }
        let dtype = out.dtype;
        flat_ir.push_op(AnyFlatIROp::Convert(Self {
            input,
            output,
            dtype,
        }))
    }
}

impl FlatIROp for Convert {
    fn get_op_name(&self) -> &'static str {
        "stablehlo.convert"
    }

    fn get_inputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.output]
    }

    fn eval(&self, inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError> {
        let input = operand(inputs, 0, self.get_op_name())?;
        Ok(vec![input.cast(self.dtype)?])
    }
}
