use crate::dtype::DType;
use crate::flat_ir::ops::Convert;
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::shape::{Dimension, InferRankPolicy};
use crate::trace::ops::{Operation, apply_rank_policy, flat_at, input_at};
use crate::trace::{TraceError, TraceTensorId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cast {
    input: TraceTensorId,
    output: TraceTensorId,
    dtype: DType,
}

impl Cast {
    pub fn new(input: TraceTensorId, output: TraceTensorId, dtype: DType) -> Self {
        Self {
            input,
            output,
            dtype,
        }
    }
}

impl Operation for Cast {
    fn get_op_type_name(&self) -> String {
        "Cast".to_string()
    }

    fn get_inputs(&self) -> Vec<TraceTensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TraceTensorId> {
        vec![self.output]
    }

    fn infer_rank(&self, input_ranks: &[usize]) -> Result<Vec<usize>, TraceError> {
        apply_rank_policy(&self.get_op_type_name(), InferRankPolicy::SameAsInput(0), input_ranks)
    }

    fn infer_dtypes(&self, _input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError> {
        Ok(vec![self.dtype])
    }

    fn infer_shapes(&self, input_shapes: &[Vec<Dimension>]) -> Result<Vec<Vec<Dimension>>, TraceError> {
        Ok(vec![input_at(&self.get_op_type_name(), input_shapes, 0)?])
    }

    fn to_flat_ir(
        &self,
        flat_ir: &mut FlatIR,
        inputs: &[FlatIRTensorId],
        outputs: &[FlatIRTensorId],
    ) -> Result<(), FlatIRError> {
        let name = self.get_op_type_name();
        Convert::push(flat_ir, flat_at(&name, inputs, 0)?, flat_at(&name, outputs, 0)?)
    }
}
