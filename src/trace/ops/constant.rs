use crate::dtype::DType;
use crate::flat_ir::ops::materialize_constant;
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::NumericTensor;
use crate::shape::{Dimension, InferRankPolicy};
use crate::trace::ops::{Operation, apply_rank_policy, flat_at};
use crate::trace::{TraceError, TraceTensorId};
use serde::{Deserialize, Serialize};

/// Host-resident data embedded in the graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    output: TraceTensorId,
    value: NumericTensor,
}

impl Constant {
    pub fn new(output: TraceTensorId, value: NumericTensor) -> Self {
        Self { output, value }
    }

    pub fn value(&self) -> &NumericTensor {
        &self.value
    }
}

impl Operation for Constant {
    fn get_op_type_name(&self) -> String {
        "Constant".to_string()
    }

    fn get_inputs(&self) -> Vec<TraceTensorId> {
        vec![]
    }

    fn get_outputs(&self) -> Vec<TraceTensorId> {
        vec![self.output]
    }

    fn infer_rank(&self, input_ranks: &[usize]) -> Result<Vec<usize>, TraceError> {
        apply_rank_policy(
            &self.get_op_type_name(),
            InferRankPolicy::Fixed(self.value.rank()),
            input_ranks,
        )
    }

    fn infer_dtypes(&self, _input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError> {
        Ok(vec![self.value.dtype()])
    }

    fn infer_shapes(&self, _input_shapes: &[Vec<Dimension>]) -> Result<Vec<Vec<Dimension>>, TraceError> {
        Ok(vec![
            self.value
                .shape()
                .into_iter()
                .map(|x| Dimension::Known(x as u64))
                .collect(),
        ])
    }

    fn to_flat_ir(
        &self,
        flat_ir: &mut FlatIR,
        _inputs: &[FlatIRTensorId],
        outputs: &[FlatIRTensorId],
    ) -> Result<(), FlatIRError> {
        let output = flat_at(&self.get_op_type_name(), outputs, 0)?;
        materialize_constant(flat_ir, &self.value, output)
    }
}
