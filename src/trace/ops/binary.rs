use crate::dtype::DType;
use crate::flat_ir::ops::Binary;
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::BinaryOp;
use crate::shape::{Dimension, InferRankPolicy, broadcast_shapes};
use crate::trace::ops::{Operation, apply_rank_policy, expand_rank, flat_at, input_at};
use crate::trace::{TraceError, TraceTensorId};
use serde::{Deserialize, Serialize};

/// Broadcasting elementwise binary operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaryElementwise {
    lhs: TraceTensorId,
    rhs: TraceTensorId,
    output: TraceTensorId,
    kind: BinaryOp,
}

impl BinaryElementwise {
    pub fn new(lhs: TraceTensorId, rhs: TraceTensorId, output: TraceTensorId, kind: BinaryOp) -> Self {
        Self {
            lhs,
            rhs,
            output,
            kind,
        }
    }
}

impl Operation for BinaryElementwise {
    fn get_op_type_name(&self) -> String {
        self.kind.to_string()
    }

    fn get_inputs(&self) -> Vec<TraceTensorId> {
        vec![self.lhs, self.rhs]
    }

    fn get_outputs(&self) -> Vec<TraceTensorId> {
        vec![self.output]
    }

    fn infer_rank(&self, input_ranks: &[usize]) -> Result<Vec<usize>, TraceError> {
        apply_rank_policy(&self.get_op_type_name(), InferRankPolicy::MaxOfInputs, input_ranks)
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
        let out = broadcast_shapes(&lhs, &rhs).map_err(|reason| TraceError::shape(&name, reason))?;
        Ok(vec![out])
    }

    fn to_flat_ir(
        &self,
        flat_ir: &mut FlatIR,
        inputs: &[FlatIRTensorId],
        outputs: &[FlatIRTensorId],
    ) -> Result<(), FlatIRError> {
        let name = self.get_op_type_name();
        let output = flat_at(&name, outputs, 0)?;
        let rank = flat_ir.get_tensor_info(output)?.rank();
        let lhs = expand_rank(flat_ir, flat_at(&name, inputs, 0)?, rank)?;
        let rhs = expand_rank(flat_ir, flat_at(&name, inputs, 1)?, rank)?;
        Binary::push(flat_ir, self.kind, lhs, rhs, output)
    }
}
