use crate::dtype::DType;
use crate::flat_ir::ops::{AnyFlatIROp, Convert, FlatIROp};
use crate::flat_ir::{FlatIR, FlatIRError, FlatIRTensorId};
use crate::numeric_tensor::NumericTensor;
use serde::{Deserialize, Serialize};

/// Literals above this many elements are elided from the textual form.
const MAX_RENDERED_ELEMENTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    output: FlatIRTensorId,
    value: NumericTensor,
}

impl Constant {
    pub fn push(
        flat_ir: &mut FlatIR,
        value: NumericTensor,
        output: FlatIRTensorId,
    ) -> Result<(), FlatIRError> {
        if value.dtype() == DType::BOOL {
            return Err(FlatIRError::BoolConstant);
        }
        let info = flat_ir.get_tensor_info(output)?;
        if info.dtype != value.dtype() {
            return Err(FlatIRError::invalid(
                "stablehlo.constant",
                format!("literal of type {} assigned to {}", value.dtype(), info.dtype),
            ));
        }
        let shape = value.shape();
        let shape_matches = info.rank() == shape.len()
            && info
                .shape
                .iter()
                .zip(shape.iter())
                .all(|(d, s)| d.known().is_none_or(|d| d == *s as u64));
        if !shape_matches {
            return Err(FlatIRError::invalid(
                "stablehlo.constant",
                format!("literal of shape {shape:?} assigned to {}", info.type_string()),
            ));
        }
        flat_ir.push_op(AnyFlatIROp::Constant(Self { output, value }))
    }

    pub fn value(&self) -> &NumericTensor {
        &self.value
    }
}

/// Emits `value` into `output`.
///
/// Bool data has no literal form, so it is written as an int32 literal followed by a
/// conversion back to bool.
pub fn materialize_constant(
    flat_ir: &mut FlatIR,
    value: &NumericTensor,
    output: FlatIRTensorId,
) -> Result<(), FlatIRError> {
    if value.dtype() != DType::BOOL {
        return Constant::push(flat_ir, value.clone(), output);
    }
    let widened = value.cast(DType::I32)?;
    let shape = flat_ir.shape(output)?.to_vec();
    let literal = flat_ir.new_tensor(shape, DType::I32);
    Constant::push(flat_ir, widened, literal)?;
    Convert::push(flat_ir, literal, output)
}

impl FlatIROp for Constant {
    fn get_op_name(&self) -> &'static str {
        "stablehlo.constant"
    }

    fn get_inputs(&self) -> Vec<FlatIRTensorId> {
        vec![]
    }

    fn get_outputs(&self) -> Vec<FlatIRTensorId> {
        vec![self.output]
    }

    fn attributes(&self) -> Option<String> {
        if self.value.num_elements() > MAX_RENDERED_ELEMENTS {
            Some("value = dense<...>".to_string())
        } else {
            Some(format!(
                "value = dense<[{}]>",
                self.value.element_strings().join(", ")
            ))
        }
    }

    fn eval(&self, _inputs: &[&NumericTensor]) -> Result<Vec<NumericTensor>, FlatIRError> {
        Ok(vec![self.value.clone()])
    }
}
