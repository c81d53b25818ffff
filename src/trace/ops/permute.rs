use crate::dtype::DType;
use crate::flat_ir::ops::Transpose;
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::shape::{Dimension, InferRankPolicy};
use crate::trace::ops::{Operation, apply_rank_policy, flat_at, input_at};
use crate::trace::{TraceError, TraceTensorId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Permute {
    input: TraceTensorId,
    output: TraceTensorId,
    permutation: Vec<usize>,
}

impl Permute {
    pub fn new(input: TraceTensorId, output: TraceTensorId, permutation: Vec<usize>) -> Self {
        Self {
            input,
            output,
            permutation,
        }
    }
}

impl Operation for Permute {
    fn get_op_type_name(&self) -> String {
        "Permute".to_string()
    }

    fn get_inputs(&self) -> Vec<TraceTensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TraceTensorId> {
        vec![self.output]
    }

    fn infer_rank(&self, input_ranks: &[usize]) -> Result<Vec<usize>, TraceError> {
        let name = self.get_op_type_name();
        let rank = input_at(&name, input_ranks, 0)?;
        let mut sorted = self.permutation.clone();
        sorted.sort_unstable();
        if sorted != (0..rank).collect::<Vec<_>>() {
            return Err(TraceError::rank(
                &name,
                format!("{:?} is not a permutation of {rank} dimensions", self.permutation),
            ));
        }
        apply_rank_policy(&name, InferRankPolicy::SameAsInput(0), input_ranks)
    }

    fn infer_dtypes(&self, input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError> {
        Ok(vec![input_at(&self.get_op_type_name(), input_dtypes, 0)?])
    }

    fn infer_shapes(&self, input_shapes: &[Vec<Dimension>]) -> Result<Vec<Vec<Dimension>>, TraceError> {
        let name = self.get_op_type_name();
        let shape = input_at(&name, input_shapes, 0)?;
        let out = self
            .permutation
            .iter()
            .map(|p| {
                shape
                    .get(*p)
                    .copied()
                    .ok_or_else(|| TraceError::rank(&name, format!("no dimension {p}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vec![out])
    }

    fn to_flat_ir(
        &self,
        flat_ir: &mut FlatIR,
        inputs: &[FlatIRTensorId],
        outputs: &[FlatIRTensorId],
    ) -> Result<(), FlatIRError> {
        let name = self.get_op_type_name();
        Transpose::push(
            flat_ir,
            flat_at(&name, inputs, 0)?,
            self.permutation.clone(),
            flat_at(&name, outputs, 0)?,
        )
    }
}
