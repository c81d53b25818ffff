use crate::dtype::DType;
use crate::flat_ir::ops::Unary;
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::UnaryOp;
use crate::shape::{Dimension, InferRankPolicy};
use crate::trace::ops::{Operation, apply_rank_policy, flat_at, input_at};
use crate::trace::{TraceError, TraceTensorId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnaryElementwise {
    input: TraceTensorId,
    output: TraceTensorId,
    kind: UnaryOp,
}

impl UnaryElementwise {
    pub fn new(input: TraceTensorId, output: TraceTensorId, kind: UnaryOp) -> Self {
        Self {
            input,
            output,
            kind,
        }
    }

    pub fn kind(&self) -> UnaryOp {
        self.kind
    }
}

impl Operation for UnaryElementwise {
    fn get_op_type_name(&self) -> String {
        self.kind.to_string()
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

    fn infer_dtypes(&self, input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError> {
        Ok(vec![input_at(&self.get_op_type_name(), input_dtypes, 0)?])
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
        Unary::push(
            flat_ir,
            self.kind,
            flat_at(&name, inputs, 0)?,
            flat_at(&name, outputs, 0)?,
        )
    }
}
