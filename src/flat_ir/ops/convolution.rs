use crate::flat_ir::ops::{AnyFlatIROp, FlatIROp, operand, render_list};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::{ConvolutionParams, NumericTensor};
use serde::{Deserialize, Serialize};

/// N-d convolution over `[batch, feature, spatial...]` inputs and
/// `[out_feature, in_feature / groups, spatial...]` kernels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Convolution {
    input: FlatIRTensorId,
    weight: FlatIRTensorId,
    output: FlatIRTensorId,
    params: ConvolutionParams,
}

impl Convolution {
    pub fn push(
        flat_ir: &mut FlatIR,
        input: FlatIRTensorId,
        weight: FlatIRTensorId,
        params: ConvolutionParams,
        output: FlatIRTensorId,
    ) -> Result<(), FlatIRError> {
        let rank = flat_ir.get_tensor_info(input)?.rank();
        let weight_rank = flat_ir.get_tensor_info(weight)?.rank();
        let out_rank = flat_ir.get_tensor_info(output)?.rank();
        if rank < 3 || weight_rank != rank || out_rank != rank {
            return Err(FlatIRError::invalid(
                "stablehlo.convolution",
                format!("input rank {rank}, kernel rank {weight_rank}, output rank {out_rank}"),
            ));
        }
        let spatial = rank - 2;
        if params.padding.len() != spatial
            || params.stride.len() != spatial
            || params.lhs_dilation.len() != spatial
            || params.rhs_dilation.len() != spatial
        {
            return Err(FlatIRError::invalid(
                "stablehlo.convolution",
                format!("attributes must cover {spatial} spatial dimensions"),
            ));
        }
        flat_ir.push_op(AnyFlatIROp::Convolution(Self {
            input,
            weight,
            output,
            params,
        }))
    }
}

impl FlatIROp for Convolution {
    fn get_op_name(&self) -> &'static str {
        "stablehlo.convolution"
    }

    fn get_inputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.input, self.weight]
    }

    fn get_outputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.output]
    }

    fn attributes(&self) -> Option<String> {
        let padding = self
            .params
            .padding
            .iter()
            .map(|(lo, hi)| format!("[{lo}, {hi}]"))
            .collect::<Vec<_>>();
        Some(format!(
            "padding = [{}], window_strides = {}, lhs_dilation = {}, rhs_dilation = {}, feature_group_count = {}",
            padding.join(", "),
            render_list(&self.params.stride),
            render_list(&self.params.lhs_dilation),
            render_list(&self.params.rhs_dilation),
            self.params.feature_group_count
        ))
    }

    fn eval(&self, inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError> {
        let input = operand(inputs, 0, self.get_op_name())?;
        let weight = operand(inputs, 1, self.get_op_name())?;
        Ok(vec![input.convolution(weight, &self.params)?])
    }
}
