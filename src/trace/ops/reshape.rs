use crate::dtype::DType;
use crate::flat_ir::ops::{Reshape as FlatReshape, ReshapeDim};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::shape::{DimBounds, Dimension, InferRankPolicy, format_shape};
use crate::trace::ops::{Operation, apply_rank_policy, flat_at, input_at};
use crate::trace::{TraceError, TraceTensorId};
use serde::{Deserialize, Serialize};

/// Removes size-1 dimensions.
///
/// `dims` are already resolved: non-negative, sorted and unique.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Squeeze {
    input: TraceTensorId,
    output: TraceTensorId,
    dims: Vec<usize>,
}

impl Squeeze {
    pub fn new(input: TraceTensorId, output: TraceTensorId, dims: Vec<usize>) -> Self {
        Self {
            input,
            output,
            dims,
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }
}

impl Operation for Squeeze {
    fn get_op_type_name(&self) -> String {
        "Squeeze".to_string()
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
        apply_rank_policy(&name, InferRankPolicy::InputMinus(self.dims.len()), input_ranks)
    }

    fn infer_dtypes(&self, input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError> {
        Ok(vec![input_at(&self.get_op_type_name(), input_dtypes, 0)?])
    }

    fn infer_shapes(&self, input_shapes: &[Vec<Dimension>]) -> Result<Vec<Vec<Dimension>>, TraceError> {
        let name = self.get_op_type_name();
        let shape = input_at(&name, input_shapes, 0)?;
        for dim in &self.dims {
            match shape.get(*dim) {
                Some(Dimension::Known(1)) | Some(Dimension::Dynamic(_)) => {}
                Some(Dimension::Known(size)) => {
                    return Err(TraceError::shape(
                        &name,
                        format!(
                            "cannot squeeze dimension {dim} of {} since it has size {size}",
                            format_shape(&shape)
                        ),
                    ));
                }
                None => {
                    return Err(TraceError::rank(
                        &name,
                        format!("dimension {dim} is out of range for {}", format_shape(&shape)),
                    ));
                }
            }
        }
        let out = shape
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.dims.contains(i))
            .map(|(_, d)| *d)
            .collect();
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
        let rank = flat_ir.get_tensor_info(input)?.rank();
        let dims = (0..rank)
            .filter(|i| !self.dims.contains(i))
            .map(ReshapeDim::FromInput)
            .collect();
        FlatReshape::push(flat_ir, input, dims, flat_at(&name, outputs, 0)?)
    }
}

/// Inserts a size-1 dimension at `dim` (already resolved against the output rank).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unsqueeze {
    input: TraceTensorId,
    output: TraceTensorId,
    dim: usize,
}

impl Unsqueeze {
    pub fn new(input: TraceTensorId, output: TraceTensorId, dim: usize) -> Self {
        Self { input, output, dim }
    }
}

impl Operation for Unsqueeze {
    fn get_op_type_name(&self) -> String {
        "Unsqueeze".to_string()
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
        if self.dim > rank {
            return Err(TraceError::rank(
                &name,
                format!("cannot insert dimension {} into a rank {rank} input", self.dim),
            ));
        }
        apply_rank_policy(&name, InferRankPolicy::InputPlus(1), input_ranks)
    }

    fn infer_dtypes(&self, input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError> {
        Ok(vec![input_at(&self.get_op_type_name(), input_dtypes, 0)?])
    }

    fn infer_shapes(&self, input_shapes: &[Vec<Dimension>]) -> Result<Vec<Vec<Dimension>>, TraceError> {
        let mut shape = input_at(&self.get_op_type_name(), input_shapes, 0)?;
        shape.insert(self.dim.min(shape.len()), Dimension::Known(1));
        Ok(vec![shape])
    }

    fn to_flat_ir(
        &self,
        flat_ir: &mut FlatIR,
        inputs: &[FlatIRTensorId],
        outputs: &[FlatIRTensorId],
    ) -> Result<(), FlatIRError> {
        let name = self.get_op_type_name();
        let input = flat_at(&name, inputs, 0)?;
        let rank = flat_ir.get_tensor_info(input)?.rank();
        let mut dims = (0..rank).map(ReshapeDim::FromInput).collect::<Vec<_>>();
        dims.insert(self.dim.min(rank), ReshapeDim::Fixed(1));
        FlatReshape::push(flat_ir, input, dims, flat_at(&name, outputs, 0)?)
    }
}

/// Reshape to an explicit shape in which at most one entry is `-1`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reshape {
    input: TraceTensorId,
    output: TraceTensorId,
    shape: Vec<i64>,
}

impl Reshape {
    pub fn new(input: TraceTensorId, output: TraceTensorId, shape: Vec<i64>) -> Self {
        Self {
            input,
            output,
            shape,
        }
    }

    fn validate(&self) -> Result<(), TraceError> {
        let name = self.get_op_type_name();
        if self.shape.iter().filter(|x| **x == -1).count() > 1 {
            return Err(TraceError::attribute(&name, "at most one dimension may be -1"));
        }
        if let Some(bad) = self.shape.iter().find(|x| **x < -1) {
            return Err(TraceError::attribute(&name, format!("invalid dimension size {bad}")));
        }
        Ok(())
    }
}

impl Operation for Reshape {
    fn get_op_type_name(&self) -> String {
        "Reshape".to_string()
    }

    fn get_inputs(&self) -> Vec<TraceTensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<TraceTensorId> {
        vec![self.output]
    }

    fn infer_rank(&self, input_ranks: &[usize]) -> Result<Vec<usize>, TraceError> {
        self.validate()?;
        apply_rank_policy(
            &self.get_op_type_name(),
            InferRankPolicy::Fixed(self.shape.len()),
            input_ranks,
        )
    }

    fn infer_dtypes(&self, input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError> {
        Ok(vec![input_at(&self.get_op_type_name(), input_dtypes, 0)?])
    }

    fn infer_shapes(&self, input_shapes: &[Vec<Dimension>]) -> Result<Vec<Vec<Dimension>>, TraceError> {
        let name = self.get_op_type_name();
        let input = input_at(&name, input_shapes, 0)?;
        let known = self
            .shape
            .iter()
            .filter(|x| **x >= 0)
            .try_fold(1u64, |acc, x| acc.checked_mul(*x as u64))
            .ok_or_else(|| {
                TraceError::shape(&name, format!("element count of {:?} overflows", self.shape))
            })?;
        let min_total = input.iter().map(|d| d.bounds().min).fold(1u64, u64::saturating_mul);
        let max_total = input.iter().map(|d| d.bounds().max).fold(1u64, u64::saturating_mul);

        let mismatch = || {
            TraceError::shape(
                &name,
                format!("cannot reshape {} into {:?}", format_shape(&input), self.shape),
            )
        };
        let has_inferred = self.shape.contains(&-1);
        let inferred = if min_total == max_total {
            if has_inferred && (known == 0 || min_total % known != 0) {
                return Err(mismatch());
            }
            if !has_inferred && known != min_total {
                return Err(mismatch());
            }
            Dimension::Known(min_total / known.max(1))
        } else {
            let divisor = known.max(1);
            let max = if max_total >= DimBounds::UNBOUNDED.max {
                DimBounds::UNBOUNDED.max
            } else {
                max_total / divisor
            };
            Dimension::Dynamic(DimBounds::new(min_total / divisor, max))
        };

        let out = self
            .shape
            .iter()
            .map(|x| if *x == -1 { inferred } else { Dimension::Known(*x as u64) })
            .collect();
        Ok(vec![out])
    }

    fn to_flat_ir(
        &self,
        flat_ir: &mut FlatIR,
        inputs: &[FlatIRTensorId],
        outputs: &[FlatIRTensorId],
    ) -> Result<(), FlatIRError> {
        let name = self.get_op_type_name();
        let dims = self
            .shape
            .iter()
            .map(|x| if *x == -1 { ReshapeDim::Infer } else { ReshapeDim::Fixed(*x as u64) })
            .collect();
        FlatReshape::push(flat_ir, flat_at(&name, inputs, 0)?, dims, flat_at(&name, outputs, 0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::static_shape;

    fn ids() -> (TraceTensorId, TraceTensorId) {
        (TraceTensorId { inner: 0 }, TraceTensorId { inner: 1 })
    }

    #[test]
    fn test_squeeze_selected_dims() {
        let (a, b) = ids();
        let op = Squeeze::new(a, b, vec![0, 2]);
        let shapes = op.infer_shapes(&[static_shape(&[1, 2, 1])]).unwrap();
        assert_eq!(shapes, vec![static_shape(&[2])]);
        assert_eq!(op.infer_rank(&[3]).unwrap(), vec![1]);
    }

    #[test]
    fn test_squeeze_non_unit_dim_fails() {
        let (a, b) = ids();
        let op = Squeeze::new(a, b, vec![1]);
        assert!(matches!(
            op.infer_shapes(&[static_shape(&[1, 2, 1])]),
            Err(TraceError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_reshape_infers_remaining_dim() {
        let (a, b) = ids();
        let op = Reshape::new(a, b, vec![3, -1]);
        let shapes = op.infer_shapes(&[static_shape(&[2, 6])]).unwrap();
        assert_eq!(shapes, vec![static_shape(&[3, 4])]);
        let bad = Reshape::new(a, b, vec![5, -1]);
        assert!(bad.infer_shapes(&[static_shape(&[2, 6])]).is_err());
    }

    #[test]
    fn test_reshape_overflowing_target_fails() {
        let (a, b) = ids();
        for shape in [vec![i64::MAX, 4], vec![i64::MAX, 4, -1]] {
            let op = Reshape::new(a, b, shape);
            assert!(matches!(
                op.infer_shapes(&[static_shape(&[2, 6])]),
                Err(TraceError::ShapeError { .. })
            ));
        }
    }

    #[test]
    fn test_unsqueeze_inserts_unit_dim() {
        let (a, b) = ids();
        let op = Unsqueeze::new(a, b, 1);
        let shapes = op.infer_shapes(&[static_shape(&[2, 3])]).unwrap();
        assert_eq!(shapes, vec![static_shape(&[2, 1, 3])]);
    }
}
