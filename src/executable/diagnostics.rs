//! Translation of free-text runtime failures into argument-level errors.
//!
//! Matching is done on fixed substrings of the runtime's messages, so any change to
//! that text on the runtime side silently disables the translation. Unmatched
//! failures are propagated unchanged.

use crate::backend::RuntimeError;
use crate::executable::{ArgInfo, ExecutableError};
use crate::numeric_tensor::NumericTensor;

pub const ELEMENT_TYPE_MISMATCH: &str = "function expects a memref type with element type";
pub const INPUT_SHAPE_FAILURE: &str = "InternalError: failed to set input shape";
pub const SHAPE_MISMATCH: &str = "Runtime shape mismatch";
pub const STRIDE_MISMATCH: &str = "Runtime stride mismatch";

fn first_dtype_mismatch(
    arg_names: &[String],
    inputs: &[NumericTensor],
    input_info: &[ArgInfo],
) -> Option<ExecutableError> {
    inputs
        .iter()
        .zip(input_info)
        .zip(arg_names)
        .find(|((input, info), _)| input.dtype() != info.dtype)
        .map(|((input, info), name)| ExecutableError::UnexpectedDtype {
            param: name.clone(),
            expected: info.dtype,
            actual: input.dtype(),
        })
}

fn first_shape_violation(
    arg_names: &[String],
    inputs: &[NumericTensor],
    input_info: &[ArgInfo],
) -> Option<ExecutableError> {
    for ((input, info), name) in inputs.iter().zip(input_info).zip(arg_names) {
        let shape = input.shape();
        for (dim, size) in shape.iter().enumerate() {
            let Some((min, max)) = info.shape_bounds.get(dim).copied() else {
                break;
            };
            let actual = *size as u64;
            if actual < min || actual > max {
                return Some(ExecutableError::ShapeOutOfBounds {
                    param: name.clone(),
                    dim,
                    min,
                    max,
                    actual,
                    min_shape: info.shape_bounds.iter().map(|(x, _)| *x).collect(),
                    max_shape: info.shape_bounds.iter().map(|(_, x)| *x).collect(),
                    shape,
                });
            }
        }
    }
    None
}

/// Re-raises `error` as an [`ExecutableError`] naming the offending argument.
///
/// `inputs` are the bound inputs in parameter order and `input_info` their compiled
/// bounds. When a message matches but no argument is at fault, `error` is returned
/// as is.
pub fn translate_runtime_error(
    error: RuntimeError,
    arg_names: &[String],
    inputs: &[NumericTensor],
    input_info: &[ArgInfo],
) -> ExecutableError {
    let message = error.message.as_str();
    let translated = if message.contains(ELEMENT_TYPE_MISMATCH) {
        first_dtype_mismatch(arg_names, inputs, input_info)
    } else if message.contains(INPUT_SHAPE_FAILURE) || message.contains(SHAPE_MISMATCH) {
        first_shape_violation(arg_names, inputs, input_info)
    } else if message.contains(STRIDE_MISMATCH) {
        Some(ExecutableError::StrideMismatch(error.message.clone()))
    } else {
        None
    };
    match translated {
        Some(translated) => translated,
        None => {
            log::warn!("Propagating untranslated runtime error: {}", error.message);
            ExecutableError::Runtime(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    fn names() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    fn info(bounds: &[(u64, u64)], dtype: DType) -> ArgInfo {
        ArgInfo {
            shape_bounds: bounds.to_vec(),
            dtype,
        }
    }

    #[test]
    fn test_dtype_mismatch_names_second_argument() {
        let inputs = vec![
            NumericTensor::from_vec(vec![1.0f32]),
            NumericTensor::from_vec(vec![1i32]),
        ];
        let infos = vec![info(&[(1, 1)], DType::F32), info(&[(1, 1)], DType::F32)];
        let err = translate_runtime_error(
            RuntimeError::new("InvalidArgument: function expects a memref type with element type f32 but got i32"),
            &names(),
            &inputs,
            &infos,
        );
        match err {
            ExecutableError::UnexpectedDtype { param, expected, actual } => {
                assert_eq!(param, "b");
                assert_eq!(expected, DType::F32);
                assert_eq!(actual, DType::I32);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_shape_patterns() {
        let inputs = vec![
            NumericTensor::from_vec(vec![1.0f32; 3]),
            NumericTensor::from_vec(vec![1.0f32; 5]),
        ];
        let infos = vec![info(&[(1, 4)], DType::F32), info(&[(1, 4)], DType::F32)];
        for message in [
            "InternalError: failed to set input shape: out of range",
            "Runtime shape mismatch: argument 1",
        ] {
            let err = translate_runtime_error(RuntimeError::new(message), &names(), &inputs, &infos);
            match err {
                ExecutableError::ShapeOutOfBounds {
                    param,
                    dim,
                    min,
                    max,
                    actual,
                    ..
                } => {
                    assert_eq!(param, "b");
                    assert_eq!((dim, min, max, actual), (0, 1, 4, 5));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_stride_message_is_kept() {
        let message = "Runtime stride mismatch: argument 0 is not row-major";
        let err = translate_runtime_error(RuntimeError::new(message), &names(), &[], &[]);
        assert!(matches!(err, ExecutableError::StrideMismatch(ref m) if m == message));
    }

    #[test]
    fn test_unmatched_and_unattributable_errors_propagate() {
        let err = translate_runtime_error(RuntimeError::new("device lost"), &names(), &[], &[]);
        assert!(matches!(err, ExecutableError::Runtime(ref e) if e.message == "device lost"));

        let inputs = vec![NumericTensor::from_vec(vec![1.0f32])];
        let infos = vec![info(&[(1, 1)], DType::F32)];
        let message = "function expects a memref type with element type f32 but got f32";
        let err = translate_runtime_error(RuntimeError::new(message), &names(), &inputs, &infos);
        assert!(matches!(err, ExecutableError::Runtime(ref e) if e.message == message));
    }
}
