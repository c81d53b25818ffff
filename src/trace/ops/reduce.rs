use crate::dtype::DType;
use crate::flat_ir::ops::{
    Binary, Constant as FlatConstant, Convert, GetDimensionSize, Reduce as FlatReduce,
    Reshape as FlatReshape, ReshapeDim,
};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::{BinaryOp, NumericTensor, ReduceOp};
use crate::shape::{Dimension, InferRankPolicy};
use crate::trace::ops::{Operation, apply_rank_policy, flat_at, input_at};
use crate::trace::{TraceError, TraceTensorId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum ReduceKind {
    Sum,
    Max,
    Min,
    Prod,
    Mean,
}

/// Reduction over `dims` (resolved, sorted and unique).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reduce {
    input: TraceTensorId,
    output: TraceTensorId,
    dims: Vec<usize>,
    keep_dim: bool,
    kind: ReduceKind,
}

impl Reduce {
    pub fn new(
        input: TraceTensorId,
        output: TraceTensorId,
        dims: Vec<usize>,
        keep_dim: bool,
        kind: ReduceKind,
    ) -> Self {
        Self {
            input,
            output,
            dims,
            keep_dim,
            kind,
        }
    }

    fn reduced_shape(&self, shape: &[Dimension]) -> Vec<Dimension> {
        shape
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.dims.contains(i))
            .map(|(_, d)| *d)
            .collect()
    }

    /// Emits the element count of the reduced window, as a unit-dimension tensor of
    /// `dtype` with rank `rank`.
    fn emit_count(
        &self,
        flat_ir: &mut FlatIR,
        input: FlatIRTensorId,
        dtype: DType,
        rank: usize,
    ) -> Result<FlatIRTensorId, FlatIRError> {
        let mut count: Option<FlatIRTensorId> = None;
        for dim in &self.dims {
            let size = flat_ir.new_tensor(vec![], DType::I32);
            GetDimensionSize::push(flat_ir, input, *dim, size)?;
            count = Some(match count {
                None => size,
                Some(previous) => {
                    let product = flat_ir.new_tensor(vec![], DType::I32);
                    Binary::push(flat_ir, BinaryOp::Mul, previous, size, product)?;
                    product
                }
            });
        }
        let count = match count {
            Some(count) => count,
            None => {
                let one = flat_ir.new_tensor(vec![], DType::I32);
                FlatConstant::push(flat_ir, NumericTensor::scalar(1i32), one)?;
                one
            }
        };
        let converted = flat_ir.new_tensor(vec![], dtype);
        Convert::push(flat_ir, count, converted)?;
        let expanded = flat_ir.new_tensor(vec![Dimension::Known(1); rank], dtype);
        FlatReshape::push(flat_ir, converted, vec![ReshapeDim::Fixed(1); rank], expanded)?;
        Ok(expanded)
    }
}

impl Operation for Reduce {
    fn get_op_type_name(&self) -> String {
        format!("Reduce{}", self.kind)
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
        if let Some(dim) = self.dims.iter().find(|d| **d >= rank) {
            return Err(TraceError::rank(
                &name,
                format!("dimension {dim} is out of range for a rank {rank} input"),
            ));
        }
        let policy = if self.keep_dim {
            InferRankPolicy::SameAsInput(0)
        } else {
            InferRankPolicy::InputMinus(self.dims.len())
        };
        apply_rank_policy(&name, policy, input_ranks)
    }

    fn infer_dtypes(&self, input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError> {
        Ok(vec![input_at(&self.get_op_type_name(), input_dtypes, 0)?])
    }

    fn infer_shapes(&self, input_shapes: &[Vec<Dimension>]) -> Result<Vec<Vec<Dimension>>, TraceError> {
        let shape = input_at(&self.get_op_type_name(), input_shapes, 0)?;
        let out = if self.keep_dim {
            shape
                .iter()
                .enumerate()
                .map(|(i, d)| if self.dims.contains(&i) { Dimension::Known(1) } else { *d })
                .collect()
        } else {
            self.reduced_shape(&shape)
        };
        Ok(vec![out])
    }

    fn to_flat_ir(
        &self,
        flat_ir: &mut FlatIR,
        inputs: &[FlatIRTensorId],
        outputs: &[FlatIRTensorId],
    ) -> Result<(), FlatIRError> {
        let name = self.get_op_type_name();
        let input = flat_at(&name, inputs, 0)?;
        let output = flat_at(&name, outputs, 0)?;
        let info = flat_ir.get_tensor_info(input)?;
        let rank = info.rank();
        let dtype = info.dtype;
        let reduced_shape = self.reduced_shape(&info.shape);

        let op = match self.kind {
            ReduceKind::Sum | ReduceKind::Mean => ReduceOp::Sum,
            ReduceKind::Max => ReduceOp::Max,
            ReduceKind::Min => ReduceOp::Min,
            ReduceKind::Prod => ReduceOp::Prod,
        };
        let direct = !self.keep_dim && self.kind != ReduceKind::Mean;
        let reduced = if direct {
            output
        } else {
            flat_ir.new_tensor(reduced_shape.clone(), dtype)
        };
        FlatReduce::push(flat_ir, op, input, self.dims.clone(), reduced)?;
        if direct {
            return Ok(());
        }

        let reduced = if self.kind == ReduceKind::Mean {
            let count = self.emit_count(flat_ir, input, dtype, reduced_shape.len())?;
            let mean = if self.keep_dim {
                flat_ir.new_tensor(reduced_shape, dtype)
            } else {
                output
            };
            Binary::push(flat_ir, BinaryOp::Div, reduced, count, mean)?;
            if !self.keep_dim {
                return Ok(());
            }
            mean
        } else {
            reduced
        };

        let mut next = 0;
        let dims = (0..rank)
            .map(|i| {
                if self.dims.contains(&i) {
                    ReshapeDim::Fixed(1)
                } else {
                    next += 1;
                    ReshapeDim::FromInput(next - 1)
                }
            })
            .collect();
        FlatReshape::push(flat_ir, reduced, dims, output)
    }
}
