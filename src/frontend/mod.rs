//! Public operation constructors.
//!
//! Each constructor looks up its registry entry, checks argument dtypes against the
//! declared constraints, and only then admits the node to the graph.

mod tensor;

pub use tensor::{Tensor, TensorError};

use crate::constraints::BoundArgument;
use crate::dtype::DType;
use crate::numeric_tensor::{BinaryOp, ConvolutionParams, NumericTensor, UnaryOp};
use crate::registry::REGISTRY;
use crate::shape::{Dimension, normalize_dim};
use crate::trace::ops::{
    AnyOperation, BinaryElementwise, Cast, Constant, Convolution, MatrixMultiply, Permute, Reduce,
    ReduceKind, Reshape, Squeeze, UnaryElementwise, Unsqueeze,
};
use crate::trace::{TraceError, TraceGraph, TraceTensorId};

fn create_op<F>(
    graph: &mut TraceGraph,
    name: &str,
    arguments: &[(&str, TraceTensorId)],
    extra: &[BoundArgument],
    build: F,
) -> Result<TraceTensorId, TraceError>
where
    F: FnOnce(TraceTensorId) -> AnyOperation,
{
    let definition = REGISTRY
        .get(name)
        .ok_or_else(|| TraceError::UnknownOperation(name.to_string()))?;
    let mut bound = vec![];
    for (param, id) in arguments {
        bound.push(BoundArgument::new(param, graph.get_tensor_info(*id)?.dtype));
    }
    bound.extend_from_slice(extra);
    let resolved = definition.constraints.check(&bound)?;

    let output = graph.reserve_outputs(1)[0];
    let op = build(output);
    let inferred = graph.infer_outputs(&op)?;
    if let (Some(constrained), Some(first)) = (resolved.return_dtype(), inferred.first()) {
        if constrained != first.dtype {
            return Err(TraceError::ReturnDtypeMismatch {
                op: name.to_string(),
                inferred: first.dtype,
                constrained,
            });
        }
    }
    graph.push_op(op)?;
    Ok(output)
}

fn unary(graph: &mut TraceGraph, name: &str, input: TraceTensorId, kind: UnaryOp) -> Result<TraceTensorId, TraceError> {
    create_op(graph, name, &[("input", input)], &[], |output| {
        AnyOperation::Unary(UnaryElementwise::new(input, output, kind))
    })
}

fn binary(
    graph: &mut TraceGraph,
    name: &str,
    lhs: TraceTensorId,
    rhs: TraceTensorId,
    kind: BinaryOp,
) -> Result<TraceTensorId, TraceError> {
    create_op(graph, name, &[("lhs", lhs), ("rhs", rhs)], &[], |output| {
        AnyOperation::Binary(BinaryElementwise::new(lhs, rhs, output, kind))
    })
}

macro_rules! unary_constructors {
    ($($fn_name:ident => $kind:ident),* $(,)?) => {
        $(
            pub fn $fn_name(graph: &mut TraceGraph, input: TraceTensorId) -> Result<TraceTensorId, TraceError> {
                unary(graph, stringify!($fn_name), input, UnaryOp::$kind)
            }
        )*
    };
}

macro_rules! binary_constructors {
    ($($fn_name:ident => $kind:ident),* $(,)?) => {
        $(
            pub fn $fn_name(
                graph: &mut TraceGraph,
                lhs: TraceTensorId,
                rhs: TraceTensorId,
            ) -> Result<TraceTensorId, TraceError> {
                binary(graph, stringify!($fn_name), lhs, rhs, BinaryOp::$kind)
            }
        )*
    };
}

unary_constructors!(
    exp => Exp,
    tanh => Tanh,
    rsqrt => Rsqrt,
    log => Log,
    sin => Sine,
    cos => Cosine,
    sqrt => Sqrt,
    abs => Abs,
);

binary_constructors!(
    add => Add,
    sub => Sub,
    mul => Mul,
    div => Div,
    pow => Pow,
    maximum => Max,
    minimum => Min,
);

pub fn constant(graph: &mut TraceGraph, value: NumericTensor) -> Result<TraceTensorId, TraceError> {
    let data = BoundArgument::new("data", value.dtype());
    create_op(graph, "constant", &[], &[data], |output| {
        AnyOperation::Constant(Constant::new(output, value))
    })
}

pub fn cast(graph: &mut TraceGraph, input: TraceTensorId, dtype: DType) -> Result<TraceTensorId, TraceError> {
    let target = BoundArgument::new("dtype", dtype);
    create_op(graph, "cast", &[("input", input)], &[target], |output| {
        AnyOperation::Cast(Cast::new(input, output, dtype))
    })
}

fn resolve_dims(op: &str, input: TraceTensorId, dims: &[i64], rank: usize) -> Result<Vec<usize>, TraceError> {
    let mut resolved = dims
        .iter()
        .map(|d| {
            normalize_dim(*d, rank).ok_or_else(|| {
                TraceError::rank(op, format!("dimension {d} is out of range for rank {rank} input {input}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    resolved.sort_unstable();
    resolved.dedup();
    if resolved.len() != dims.len() {
        return Err(TraceError::attribute(op, format!("duplicate dimensions in {dims:?}")));
    }
    Ok(resolved)
}

/// Removes the size-1 dimensions `dims`, or every statically size-1 dimension when
/// `dims` is empty.
pub fn squeeze(graph: &mut TraceGraph, input: TraceTensorId, dims: &[i64]) -> Result<TraceTensorId, TraceError> {
    let info = graph.get_tensor_info(input)?;
    let rank = info.rank();
    let dims = if dims.is_empty() {
        if info.shape.iter().any(|d| matches!(d, Dimension::Dynamic(_))) {
            return Err(TraceError::shape(
                "Squeeze",
                format!("cannot infer squeezed dimensions of {input} with dynamic dimensions"),
            ));
        }
        info.shape
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == Dimension::Known(1))
            .map(|(i, _)| i)
            .collect()
    } else {
        resolve_dims("Squeeze", input, dims, rank)?
    };
    create_op(graph, "squeeze", &[("input", input)], &[], |output| {
        AnyOperation::Squeeze(Squeeze::new(input, output, dims))
    })
}

pub fn unsqueeze(graph: &mut TraceGraph, input: TraceTensorId, dim: i64) -> Result<TraceTensorId, TraceError> {
    let rank = graph.get_tensor_info(input)?.rank();
    let dim = normalize_dim(dim, rank + 1).ok_or_else(|| {
        TraceError::rank("Unsqueeze", format!("dimension {dim} is out of range for rank {rank} input"))
    })?;
    create_op(graph, "unsqueeze", &[("input", input)], &[], |output| {
        AnyOperation::Unsqueeze(Unsqueeze::new(input, output, dim))
    })
}

/// `shape` may contain a single `-1`, inferred from the element count.
pub fn reshape(graph: &mut TraceGraph, input: TraceTensorId, shape: &[i64]) -> Result<TraceTensorId, TraceError> {
    create_op(graph, "reshape", &[("input", input)], &[], |output| {
        AnyOperation::Reshape(Reshape::new(input, output, shape.to_vec()))
    })
}

pub fn permute(graph: &mut TraceGraph, input: TraceTensorId, permutation: &[usize]) -> Result<TraceTensorId, TraceError> {
    create_op(graph, "permute", &[("input", input)], &[], |output| {
        AnyOperation::Permute(Permute::new(input, output, permutation.to_vec()))
    })
}

fn reduce(
    graph: &mut TraceGraph,
    name: &str,
    input: TraceTensorId,
    dims: &[i64],
    keep_dim: bool,
    kind: ReduceKind,
) -> Result<TraceTensorId, TraceError> {
    let rank = graph.get_tensor_info(input)?.rank();
    let dims = if dims.is_empty() {
        (0..rank).collect()
    } else {
        resolve_dims(&format!("Reduce{kind}"), input, dims, rank)?
    };
    create_op(graph, name, &[("input", input)], &[], |output| {
        AnyOperation::Reduce(Reduce::new(input, output, dims, keep_dim, kind))
    })
}

macro_rules! reduce_constructors {
    ($($fn_name:ident => $kind:ident),* $(,)?) => {
        $(
            /// Reduces over `dims`, or over every dimension when `dims` is empty.
            pub fn $fn_name(
                graph: &mut TraceGraph,
                input: TraceTensorId,
                dims: &[i64],
                keep_dim: bool,
            ) -> Result<TraceTensorId, TraceError> {
                reduce(graph, stringify!($fn_name), input, dims, keep_dim, ReduceKind::$kind)
            }
        )*
    };
}

reduce_constructors!(
    sum => Sum,
    max => Max,
    min => Min,
    prod => Prod,
    mean => Mean,
);

pub fn convolution(
    graph: &mut TraceGraph,
    input: TraceTensorId,
    weight: TraceTensorId,
    bias: Option<TraceTensorId>,
    params: ConvolutionParams,
) -> Result<TraceTensorId, TraceError> {
    let mut arguments = vec![("input", input), ("weight", weight)];
    if let Some(bias) = bias {
        arguments.push(("bias", bias));
    }
    create_op(graph, "convolution", &arguments, &[], |output| {
        AnyOperation::Convolution(Convolution::new(input, weight, bias, output, params))
    })
}

pub fn matmul(graph: &mut TraceGraph, lhs: TraceTensorId, rhs: TraceTensorId) -> Result<TraceTensorId, TraceError> {
    create_op(graph, "matmul", &[("lhs", lhs), ("rhs", rhs)], &[], |output| {
        AnyOperation::MatrixMultiply(MatrixMultiply::new(lhs, rhs, output))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintError;
    use crate::shape::static_shape;

    fn graph_with(inputs: &[(&str, &[u64], DType)]) -> (TraceGraph, Vec<TraceTensorId>) {
        let mut graph = TraceGraph::new();
        let ids = inputs
            .iter()
            .map(|(name, shape, dtype)| graph.add_input(name, static_shape(shape), *dtype).unwrap())
            .collect();
        (graph, ids)
    }

    #[test]
    fn test_add_admits_node() {
        let (mut graph, ids) = graph_with(&[("a", &[2, 3], DType::F32), ("b", &[3], DType::F32)]);
        let out = add(&mut graph, ids[0], ids[1]).unwrap();
        let info = graph.get_tensor_info(out).unwrap();
        assert_eq!(info.shape, static_shape(&[2, 3]));
        assert_eq!(info.dtype, DType::F32);
        assert_eq!(graph.operations().len(), 1);
    }

    #[test]
    fn test_rejected_node_is_not_admitted() {
        let (mut graph, ids) = graph_with(&[("a", &[2], DType::F32), ("b", &[2], DType::I32)]);
        let err = add(&mut graph, ids[0], ids[1]).unwrap_err();
        assert!(matches!(
            err,
            TraceError::Constraint(ConstraintError::DtypeMismatch { ref param, .. }) if param == "rhs"
        ));
        assert!(graph.operations().is_empty());
        assert_eq!(graph.num_tensors(), 2);
    }

    #[test]
    fn test_cast_return_dtype() {
        let (mut graph, ids) = graph_with(&[("a", &[2], DType::F32)]);
        let out = cast(&mut graph, ids[0], DType::I32).unwrap();
        assert_eq!(graph.get_tensor_info(out).unwrap().dtype, DType::I32);
    }

    #[test]
    fn test_squeeze_all_unit_dims() {
        let (mut graph, ids) = graph_with(&[("a", &[1, 2, 1], DType::F32)]);
        let out = squeeze(&mut graph, ids[0], &[]).unwrap();
        assert_eq!(graph.get_tensor_info(out).unwrap().shape, static_shape(&[2]));
    }

    #[test]
    fn test_mean_keep_dim_negative_axis() {
        let (mut graph, ids) = graph_with(&[("a", &[2, 3], DType::F32)]);
        let out = mean(&mut graph, ids[0], &[-1], true).unwrap();
        assert_eq!(graph.get_tensor_info(out).unwrap().shape, static_shape(&[2, 1]));
    }
}
