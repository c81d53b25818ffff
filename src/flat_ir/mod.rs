use crate::backend::ScalarType;
use crate::dtype::DType;
use crate::numeric_tensor::NumericTensorError;
use crate::shape::Dimension;
use crate::trace::ops::Operation;
use crate::trace::{TraceGraph, TraceTensorId};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub mod ops;

use ops::{AnyFlatIROp, FlatIROp};

#[derive(Debug, thiserror::Error)]
pub enum FlatIRError {
    #[error("Unknown flat IR tensor {0}")]
    UnknownTensor(FlatIRTensorId),
    #[error("Unknown trace tensor {0}")]
    UnknownTraceTensor(TraceTensorId),
    #[error("Tensor {0} is produced more than once")]
    OutputProducedTwice(FlatIRTensorId),
    #[error("Tensor {0} is used before it is produced")]
    UseBeforeDefinition(FlatIRTensorId),
    #[error("Lowering {op} did not produce its output {tensor}")]
    OutputNotProduced { op: String, tensor: FlatIRTensorId },
    #[error("Constant literals cannot hold bool data, store it as int32 and convert instead")]
    BoolConstant,
    #[error("Invalid {op}: {reason}")]
    InvalidOperation { op: String, reason: String },
    #[error(transparent)]
    NumericTensor(#[from] NumericTensorError),
}

impl FlatIRError {
    pub(crate) fn invalid(op: &str, reason: impl Into<String>) -> Self {
        FlatIRError::InvalidOperation {
            op: op.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct FlatIRTensorId {
    inner: usize,
}

impl FlatIRTensorId {
    pub fn index(&self) -> usize {
        self.inner
    }
}

impl Display for FlatIRTensorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum FlatIRProducer {
    Input,
    Op,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIRTensorInfo {
    pub shape: Vec<Dimension>,
    pub dtype: DType,
    producer: Option<FlatIRProducer>,
}

impl FlatIRTensorInfo {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn type_string(&self) -> String {
        let mut parts = self.shape.iter().map(|d| d.to_string()).collect::<Vec<_>>();
        parts.push(ScalarType::from(self.dtype).to_string());
        format!("tensor<{}>", parts.join("x"))
    }
}

/// Lowered program: an ordered list of single-assignment operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatIR {
    tensors: Vec<FlatIRTensorInfo>,
    ops: Vec<AnyFlatIROp>,
    inputs: Vec<(String, FlatIRTensorId)>,
    outputs: Vec<FlatIRTensorId>,
}

impl FlatIR {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, name: &str, shape: Vec<Dimension>, dtype: DType) -> FlatIRTensorId {
        let id = self.push_tensor(shape, dtype, Some(FlatIRProducer::Input));
        self.inputs.push((name.to_string(), id));
        id
    }

    /// Allocates an as yet unproduced tensor.
    pub fn new_tensor(&mut self, shape: Vec<Dimension>, dtype: DType) -> FlatIRTensorId {
        self.push_tensor(shape, dtype, None)
    }

    fn push_tensor(
        &mut self,
        shape: Vec<Dimension>,
        dtype: DType,
        producer: Option<FlatIRProducer>,
    ) -> FlatIRTensorId {
        let id = FlatIRTensorId {
            inner: self.tensors.len(),
        };
        self.tensors.push(FlatIRTensorInfo {
            shape,
            dtype,
            producer,
        });
        id
    }

    pub fn get_tensor_info(&self, id: FlatIRTensorId) -> Result<&FlatIRTensorInfo, FlatIRError> {
        self.tensors.get(id.inner).ok_or(FlatIRError::UnknownTensor(id))
    }

    pub fn shape(&self, id: FlatIRTensorId) -> Result<&[Dimension], FlatIRError> {
        Ok(&self.get_tensor_info(id)?.shape)
    }

    pub fn dtype(&self, id: FlatIRTensorId) -> Result<DType, FlatIRError> {
        Ok(self.get_tensor_info(id)?.dtype)
    }

    pub fn is_produced(&self, id: FlatIRTensorId) -> bool {
        self.tensors
            .get(id.inner)
            .is_some_and(|x| x.producer.is_some())
    }

    pub fn num_tensors(&self) -> usize {
        self.tensors.len()
    }

    pub fn tensors(&self) -> impl Iterator<Item = (FlatIRTensorId, &FlatIRTensorInfo)> {
        self.tensors
            .iter()
            .enumerate()
            .map(|(inner, info)| (FlatIRTensorId { inner }, info))
    }

    /// Appends `op`. Its inputs must already be produced and its outputs must not be.
    pub fn push_op(&mut self, op: AnyFlatIROp) -> Result<(), FlatIRError> {
        for input in op.get_inputs() {
            self.get_tensor_info(input)?;
            if !self.is_produced(input) {
                return Err(FlatIRError::UseBeforeDefinition(input));
            }
        }
        for output in op.get_outputs() {
            self.get_tensor_info(output)?;
            if self.is_produced(output) {
                return Err(FlatIRError::OutputProducedTwice(output));
            }
        }
        for output in op.get_outputs() {
            self.tensors[output.inner].producer = Some(FlatIRProducer::Op);
        }
        self.ops.push(op);
        Ok(())
    }

    pub fn ops(&self) -> &[AnyFlatIROp] {
        &self.ops
    }

    pub fn get_inputs(&self) -> &[(String, FlatIRTensorId)] {
        &self.inputs
    }

    pub fn get_outputs(&self) -> &[FlatIRTensorId] {
        &self.outputs
    }

    pub fn set_outputs(&mut self, outputs: Vec<FlatIRTensorId>) -> Result<(), FlatIRError> {
        for output in &outputs {
            if !self.is_produced(*output) {
                return Err(FlatIRError::UseBeforeDefinition(*output));
            }
        }
        self.outputs = outputs;
        Ok(())
    }
}

impl Display for FlatIR {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let args = self
            .inputs
            .iter()
            .map(|(name, id)| format!("{id}: {} {{name = \"{name}\"}}", self.tensors[id.inner].type_string()))
            .collect::<Vec<_>>();
        let results = self
            .outputs
            .iter()
            .map(|id| self.tensors[id.inner].type_string())
            .collect::<Vec<_>>();
        writeln!(f, "func.func @main({}) -> ({}) {{", args.join(", "), results.join(", "))?;
        for op in &self.ops {
            let outputs = op.get_outputs();
            let lhs = outputs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
            let operands = op
                .get_inputs()
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>();
            write!(f, "  {} = {}", lhs.join(", "), op.get_op_name())?;
            if !operands.is_empty() {
                write!(f, " {}", operands.join(", "))?;
            }
            if let Some(attributes) = op.attributes() {
                write!(f, " {{{attributes}}}")?;
            }
            let types = outputs
                .iter()
                .map(|x| self.tensors[x.inner].type_string())
                .collect::<Vec<_>>();
            writeln!(f, " : {}", types.join(", "))?;
        }
        let returns = self.outputs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        writeln!(f, "  return {}", returns.join(", "))?;
        write!(f, "}}")
    }
}

/// Lowers every admitted trace operation, in admission order, into one flat IR program.
pub fn lower(graph: &TraceGraph) -> Result<FlatIR, FlatIRError> {
    let mut flat_ir = FlatIR::new();
    let mut mapping: Vec<Option<FlatIRTensorId>> = vec![None; graph.num_tensors()];

    for (id, name) in graph.get_inputs().iter().zip(graph.get_input_names()) {
        let info = graph
            .get_tensor_info(*id)
            .map_err(|_| FlatIRError::UnknownTraceTensor(*id))?;
        mapping[id.index()] = Some(flat_ir.add_input(&name, info.shape.clone(), info.dtype));
    }

    let lookup = |mapping: &[Option<FlatIRTensorId>], id: TraceTensorId| {
        mapping
            .get(id.index())
            .copied()
            .flatten()
            .ok_or(FlatIRError::UnknownTraceTensor(id))
    };

    for op in graph.operations() {
        let inputs = op
            .get_inputs()
            .into_iter()
            .map(|id| lookup(&mapping, id))
            .collect::<Result<Vec<_>, _>>()?;
        let mut outputs = Vec::new();
        for id in op.get_outputs() {
            let info = graph
                .get_tensor_info(id)
                .map_err(|_| FlatIRError::UnknownTraceTensor(id))?;
            let flat = flat_ir.new_tensor(info.shape.clone(), info.dtype);
            mapping[id.index()] = Some(flat);
            outputs.push(flat);
        }
        op.to_flat_ir(&mut flat_ir, &inputs, &outputs)?;
        if let Some(missing) = outputs.iter().find(|x| !flat_ir.is_produced(**x)) {
            return Err(FlatIRError::OutputNotProduced {
                op: op.get_op_type_name(),
                tensor: *missing,
            });
        }
    }

    let outputs = graph
        .get_outputs()
        .iter()
        .map(|id| lookup(&mapping, *id))
        .collect::<Result<Vec<_>, _>>()?;
    flat_ir.set_outputs(outputs)?;
    log::debug!(
        "Lowered {} trace operations into {} flat IR operations",
        graph.operations().len(),
        flat_ir.ops().len()
    );
    Ok(flat_ir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric_tensor::UnaryOp;
    use crate::shape::static_shape;
    use ops::Unary;

    #[test]
    fn test_textual_form() {
        let mut program = FlatIR::new();
        let x = program.add_input("x", static_shape(&[2]), DType::F32);
        let y = program.new_tensor(static_shape(&[2]), DType::F32);
        Unary::push(&mut program, UnaryOp::Exp, x, y).unwrap();
        program.set_outputs(vec![y]).unwrap();
        assert_eq!(
            program.to_string(),
            "func.func @main(%0: tensor<2xf32> {name = \"x\"}) -> (tensor<2xf32>) {\n  \
             %1 = stablehlo.exponential %0 : tensor<2xf32>\n  \
             return %1\n}"
        );
    }

    #[test]
    fn test_single_assignment() {
        let mut program = FlatIR::new();
        let x = program.add_input("x", static_shape(&[2]), DType::F32);
        let pending = program.new_tensor(static_shape(&[2]), DType::F32);
        let y = program.new_tensor(static_shape(&[2]), DType::F32);

        let err = Unary::push(&mut program, UnaryOp::Exp, pending, y).unwrap_err();
        assert!(matches!(err, FlatIRError::UseBeforeDefinition(id) if id == pending));

        Unary::push(&mut program, UnaryOp::Exp, x, y).unwrap();
        let err = Unary::push(&mut program, UnaryOp::Tanh, x, y).unwrap_err();
        assert!(matches!(err, FlatIRError::OutputProducedTwice(id) if id == y));
        assert_eq!(program.ops().len(), 1);

        assert!(matches!(
            program.set_outputs(vec![pending]),
            Err(FlatIRError::UseBeforeDefinition(_))
        ));
    }
}
