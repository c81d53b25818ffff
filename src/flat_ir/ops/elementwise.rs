use crate::flat_ir::ops::{AnyFlatIROp, FlatIROp, operand};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::{BinaryOp, NumericTensor, UnaryOp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unary {
    input: FlatIRTensorId,
    output: FlatIRTensorId,
    op: UnaryOp,
}

impl Unary {
    pub fn push(
        flat_ir: &mut FlatIR,
        op: UnaryOp,
        input: FlatIRTensorId,
        output: FlatIRTensorId,
    ) -> Result<(), FlatIRError> {
        let a = flat_ir.get_tensor_info(input)?;
        let b = flat_ir.get_tensor_info(output)?;
        if a.rank() != b.rank() || a.dtype != b.dtype {
            return Err(FlatIRError::invalid(
                unary_name(op),
                format!("{} does not map to {}", a.type_string(), b.type_string()),
            ));
        }
        flat_ir.push_op(AnyFlatIROp::Unary(Self { input, output, op }))
    }
}

fn unary_name(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Exp => "stablehlo.exponential",
        UnaryOp::Tanh => "stablehlo.tanh",
        UnaryOp::Rsqrt => "stablehlo.rsqrt",
        UnaryOp::Log => "stablehlo.log",
        UnaryOp::Sine => "stablehlo.sine",
        UnaryOp::Cosine => "stablehlo.cosine",
        UnaryOp::Sqrt => "stablehlo.sqrt",
        UnaryOp::Abs => "stablehlo.abs",
    }
}

impl FlatIROp for Unary {
    fn get_op_name(&self) -> &'static str {
        unary_name(self.op)
    }

    fn get_inputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.input]
    }

    fn get_outputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.output]
    }

    fn eval(&self, inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError> {
        let input = operand(inputs, 0, self.get_op_name())?;
        Ok(vec![input.unary(self.op)?])
    }
}

/// Elementwise binary op over operands of equal rank.
///
/// Size-1 dimensions are stretched at runtime; rank differences must be resolved
/// before this op with an explicit reshape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binary {
    lhs: FlatIRTensorId,
    rhs: FlatIRTensorId,
    output: FlatIRTensorId,
    op: BinaryOp,
}

impl Binary {
    pub fn push(
        flat_ir: &mut FlatIR,
        op: BinaryOp,
        lhs: FlatIRTensorId,
        rhs: FlatIRTensorId,
        output: FlatIRTensorId,
    ) -> Result<(), FlatIRError> {
        let a = flat_ir.get_tensor_info(lhs)?;
        let b = flat_ir.get_tensor_info(rhs)?;
        let out = flat_ir.get_tensor_info(output)?;
        if a.rank() != b.rank() || a.rank() != out.rank() {
            return Err(FlatIRError::invalid(
                binary_name(op),
                format!(
                    "operand ranks differ: {}, {} -> {}",
                    a.type_string(),
                    b.type_string(),
                    out.type_string()
                ),
            ));
        }
        if a.dtype != b.dtype || a.dtype != out.dtype {
            return Err(FlatIRError::invalid(
                binary_name(op),
                format!("operand dtypes differ: {} and {}", a.dtype, b.dtype),
            ));
        }
        flat_ir.push_op(AnyFlatIROp::Binary(Self {
            lhs,
            rhs,
            output,
            op,
        }))
    }
}

fn binary_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "stablehlo.add",
        BinaryOp::Sub => "stablehlo.subtract",
        BinaryOp::Mul => "stablehlo.multiply",
        BinaryOp::Div => "stablehlo.divide",
        BinaryOp::Pow => "stablehlo.power",
        BinaryOp::Max => "stablehlo.maximum",
        BinaryOp::Min => "stablehlo.minimum",
    }
}

impl FlatIROp for Binary {
    fn get_op_name(&self) -> &'static str {
        binary_name(self.op)
    }

    fn get_inputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.lhs, self.rhs]
    }

    fn get_outputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.output]
    }

    fn eval(&self, inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError> {
        let lhs = operand(inputs, 0, self.get_op_name())?;
        let rhs = operand(inputs, 1, self.get_op_name())?;
        Ok(vec![lhs.binary(rhs, self.op)?])
    }
}
