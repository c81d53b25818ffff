use crate::dtype::DType;
use crate::flat_ir::ops::{Binary, Convolution as FlatConvolution, Reshape as FlatReshape, ReshapeDim};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::{BinaryOp, ConvolutionParams};
use crate::shape::{DimBounds, Dimension, InferRankPolicy, format_shape};
use crate::trace::ops::{Operation, apply_rank_policy, flat_at, input_at};
use crate::trace::{TraceError, TraceTensorId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Convolution {
    input: TraceTensorId,
    weight: TraceTensorId,
    bias: Option<TraceTensorId>,
    output: TraceTensorId,
    params: ConvolutionParams,
}

impl Convolution {
    pub fn new(
        input: TraceTensorId,
        weight: TraceTensorId,
        bias: Option<TraceTensorId>,
        output: TraceTensorId,
        params: ConvolutionParams,
    ) -> Self {
        Self {
            input,
            weight,
            bias,
            output,
            params,
        }
    }

    fn output_spatial_dim(&self, i: usize, input: Dimension, kernel: Dimension) -> Result<Dimension, TraceError> {
        let (lo, hi) = self.params.padding[i];
        let stride = self.params.stride[i];
        let lhs_dilation = self.params.lhs_dilation[i];
        let rhs_dilation = self.params.rhs_dilation[i];
        let name = self.get_op_type_name();
        let overflow = || {
            TraceError::attribute(
                &name,
                format!("padding and dilation of spatial dimension {i} overflow the window size"),
            )
        };
        let window = |size: u64, dilation: u64| -> Result<i64, TraceError> {
            let size = match size.checked_sub(1) {
                None => 0,
                Some(x) => x.checked_mul(dilation).and_then(|x| x.checked_add(1)).ok_or_else(overflow)?,
            };
            i64::try_from(size).map_err(|_| overflow())
        };
        let Some(kernel) = kernel.known() else {
            return Err(TraceError::shape(&name, "kernel spatial dimensions must be static"));
        };
        let effective_kernel = window(kernel, rhs_dilation)?;
        let output_size = |size: u64| -> Result<Option<u64>, TraceError> {
            let padded = window(size, lhs_dilation)?
                .checked_add(lo)
                .and_then(|x| x.checked_add(hi))
                .ok_or_else(overflow)?;
            Ok((padded >= effective_kernel).then(|| ((padded - effective_kernel) as u64) / stride + 1))
        };
        match input {
            Dimension::Known(size) => output_size(size)?.map(Dimension::Known).ok_or_else(|| {
                TraceError::shape(
                    &name,
                    format!("spatial dimension {i} of size {size} is smaller than the kernel"),
                )
            }),
            Dimension::Dynamic(bounds) => {
                let min = output_size(bounds.min)?.unwrap_or(0);
                let max = if bounds.max == DimBounds::UNBOUNDED.max {
                    DimBounds::UNBOUNDED.max
                } else {
                    output_size(bounds.max)?.unwrap_or(0)
                };
                Ok(Dimension::Dynamic(DimBounds::new(min, max)))
            }
        }
    }
}

impl Operation for Convolution {
    fn get_op_type_name(&self) -> String {
        "Convolution".to_string()
    }

    fn get_inputs(&self) -> Vec<TraceTensorId> {
        let mut inputs = vec![self.input, self.weight];
        inputs.extend(self.bias);
        inputs
    }

    fn get_outputs(&self) -> Vec<TraceTensorId> {
        vec![self.output]
    }

    fn infer_rank(&self, input_ranks: &[usize]) -> Result<Vec<usize>, TraceError> {
        let name = self.get_op_type_name();
        let rank = input_at(&name, input_ranks, 0)?;
        let weight_rank = input_at(&name, input_ranks, 1)?;
        if rank < 3 || weight_rank != rank {
            return Err(TraceError::rank(
                &name,
                format!("input rank {rank} and weight rank {weight_rank} must be equal and at least 3"),
            ));
        }
        if self.bias.is_some() && input_at(&name, input_ranks, 2)? != 1 {
            return Err(TraceError::rank(&name, "bias must have rank 1"));
        }
        let spatial = rank - 2;
        let p = &self.params;
        if p.padding.len() != spatial
            || p.stride.len() != spatial
            || p.lhs_dilation.len() != spatial
            || p.rhs_dilation.len() != spatial
        {
            return Err(TraceError::attribute(
                &name,
                format!("padding, stride and dilations must have {spatial} entries"),
            ));
        }
        if p.feature_group_count == 0
            || p.stride.contains(&0)
            || p.lhs_dilation.contains(&0)
            || p.rhs_dilation.contains(&0)
        {
            return Err(TraceError::attribute(
                &name,
                "groups, strides and dilations must be positive",
            ));
        }
        apply_rank_policy(&name, InferRankPolicy::SameAsInput(0), input_ranks)
    }

    fn infer_dtypes(&self, input_dtypes: &[DType]) -> Result<Vec<DType>, TraceError> {
        let name = self.get_op_type_name();
        let dtype = input_at(&name, input_dtypes, 0)?;
        if let Some(other) = input_dtypes.iter().find(|d| **d != dtype) {
            return Err(TraceError::DtypeInconsistent {
                op: name,
                reason: format!("input is {dtype} but another operand is {other}"),
            });
        }
        Ok(vec![dtype])
    }

    fn infer_shapes(&self, input_shapes: &[Vec<Dimension>]) -> Result<Vec<Vec<Dimension>>, TraceError> {
        let name = self.get_op_type_name();
        let input = input_at(&name, input_shapes, 0)?;
        let weight = input_at(&name, input_shapes, 1)?;
        let groups = self.params.feature_group_count;
        if let (Some(c_in), Some(c_per_group)) = (input[1].known(), weight[1].known()) {
            if c_in != c_per_group * groups {
                return Err(TraceError::shape(
                    &name,
                    format!(
                        "input {} has {c_in} channels but weight {} expects {} across {groups} groups",
                        format_shape(&input),
                        format_shape(&weight),
                        c_per_group * groups
                    ),
                ));
            }
        }
        if let Some(c_out) = weight[0].known() {
            if c_out % groups != 0 {
                return Err(TraceError::shape(
                    &name,
                    format!("{c_out} output channels cannot be split into {groups} groups"),
                ));
            }
        }
        if self.bias.is_some() {
            let bias = input_at(&name, input_shapes, 2)?;
            if bias[0].try_test_eq(&weight[0]) == Some(false) {
                return Err(TraceError::shape(
                    &name,
                    format!("bias {} does not match {} output channels", format_shape(&bias), weight[0]),
                ));
            }
        }
        let mut out = vec![input[0], weight[0]];
        for i in 0..input.len() - 2 {
            out.push(self.output_spatial_dim(i, input[2 + i], weight[2 + i])?);
        }
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
        let weight = flat_at(&name, inputs, 1)?;
        let output = flat_at(&name, outputs, 0)?;
        if self.bias.is_none() {
            return FlatConvolution::push(flat_ir, input, weight, self.params.clone(), output);
        }
        let bias = flat_at(&name, inputs, 2)?;
        let out_info = flat_ir.get_tensor_info(output)?;
        let out_shape = out_info.shape.clone();
        let dtype = out_info.dtype;
        let rank = out_shape.len();

        let convolved = flat_ir.new_tensor(out_shape.clone(), dtype);
        FlatConvolution::push(flat_ir, input, weight, self.params.clone(), convolved)?;

        let mut bias_shape = vec![Dimension::Known(1); rank];
        bias_shape[1] = out_shape[1];
        let mut dims = vec![ReshapeDim::Fixed(1); rank];
        dims[1] = ReshapeDim::FromInput(0);
        let expanded = flat_ir.new_tensor(bias_shape, dtype);
        FlatReshape::push(flat_ir, bias, dims, expanded)?;
        Binary::push(flat_ir, BinaryOp::Add, convolved, expanded, output)
    }
}
