use crate::dtype::DType;
use crate::flat_ir::ops::Dot;
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::shape::{Dimension, InferRankPolicy, broadcast_shapes, format_shape};
use crate::trace::ops::{Operation, apply_rank_policy, flat_at, input_at};
use crate::trace::{TraceError, TraceTensorId};
use serde::{Deserialize, Serialize};

/// Batched matrix product over the last two dimensions of equal-rank operands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatrixMultiply {
    lhs: TraceTensorId,
    rhs: TraceTensorId,
    output: TraceTensorId,
}

impl MatrixMultiply {
    pub fn new(lhs: TraceTensorId, rhs: TraceTensorId, output: TraceTensorId) -> Self {
        Self { lhs, rhs, output }
    }
}

impl Operation for MatrixMultiply {
    fn get_op_type_name(&self) -> String {
        "MatrixMultiply".to_string()
    }

    fn get_inputs(&self) -> Vec<TraceTensorId> {
        vec![self.lhs, self.rhs]
    }

    fn get_outputs(&self) -> Vec<TraceTensorId> {
        vec![self.output]
    }

    fn infer_rank(&self, input_ranks: &[usize]) -> Result<Vec<usize>, TraceError> {
        let name = self.get_op_type_name();
        let ranks = apply_rank_policy(&name, InferRankPolicy::SameAsInputs, input_ranks)?;
        if ranks.iter().any(|r| *r < 2) {
            return Err(TraceError::rank(&name, "operands must have rank 2 or more"));
        }
        Ok(ranks)
    }

    fn infer_dtypes(&self, input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError> {
        let name = self.get_op_type_name();
        let lhs = input_at(&name, input_dtypes, 0)?;
        let rhs = input_at(&name, input_dtypes, 1)?;
        if lhs != rhs {
            return Err(TraceError::DtypeInconsistent {
                op: name,
                reason: format!("operands have dtypes {lhs} and {rhs}"),
            });
        }
        Ok(vec![lhs])
    }

    fn infer_shapes(&self, input_shapes: &[Vec<Dimension>]) -> Result<Vec<Vec<Dimension>>, TraceError> {
        let name = self.get_op_type_name();
        let lhs = input_at(&name, input_shapes, 0)?;
        let rhs = input_at(&name, input_shapes, 1)?;
        let rank = lhs.len();
        if rhs.len() != rank || rank < 2 {
            return Err(TraceError::rank(
                &name,
                format!("cannot multiply {} by {}", format_shape(&lhs), format_shape(&rhs)),
            ));
        }
        if lhs[rank - 1].try_test_eq(&rhs[rank - 2]) == Some(false) {
            return Err(TraceError::shape(
                &name,
                format!(
                    "contracting dimensions differ: {} and {}",
                    format_shape(&lhs),
                    format_shape(&rhs)
                ),
            ));
        }
        let mut out = broadcast_shapes(&lhs[..rank - 2], &rhs[..rank - 2])
            .map_err(|reason| TraceError::shape(&name, reason))?;
        out.push(lhs[rank - 2]);
        out.push(rhs[rank - 1]);
        Ok(vec![out])
    }

    fn to_flat_ir(
        &self,
        flat_ir: &mut FlatIR,
        inputs: &[FlatIRTensorId],
        outputs: &[FlatIRTensorId],
    ) -> Result<(), FlatIRError> {
        let name = self.get_op_type_name();
        Dot::push(
            flat_ir,
            flat_at(&name, inputs, 0)?,
            flat_at(&name, inputs, 1)?,
            flat_at(&name, outputs, 0)?,
        )
    }
}
