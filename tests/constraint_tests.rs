use paste::paste;
use whisper_trace::constraints::ConstraintError;
use whisper_trace::dtype::DType;
use whisper_trace::frontend;
use whisper_trace::shape::static_shape;
use whisper_trace::trace::TraceError;
use whisper_trace::{TraceGraph, TraceTensorId};

fn graph_with_input(shape: &[u64], dtype: DType) -> (TraceGraph, TraceTensorId) {
    let mut graph = TraceGraph::new();
    let id = graph.add_input("x", static_shape(shape), dtype).unwrap();
    (graph, id)
}

fn assert_not_allowed(result: Result<TraceTensorId, TraceError>, expected_param: &str, expected_dtype: DType) {
    match result {
        Err(TraceError::Constraint(ConstraintError::DtypeNotAllowed { param, dtype, allowed, .. })) => {
            assert_eq!(param, expected_param);
            assert_eq!(dtype, expected_dtype);
            assert!(!allowed.contains(&dtype));
        }
        other => panic!("expected DtypeNotAllowed, got {other:?}"),
    }
}

macro_rules! unary_rejects {
    ($op:ident, $dtype:ident) => {
        paste! {
            #[allow(non_snake_case)]
            #[test]
            fn [<test_ $op _rejects_ $dtype>]() {
                let (mut graph, x) = graph_with_input(&[2], DType::$dtype);
                assert_not_allowed(frontend::$op(&mut graph, x), "input", DType::$dtype);
                assert!(graph.operations().is_empty());
            }
        }
    };
}

macro_rules! binary_rejects {
    ($op:ident, $dtype:ident) => {
        paste! {
            #[allow(non_snake_case)]
            #[test]
            fn [<test_ $op _rejects_ $dtype>]() {
                let (mut graph, x) = graph_with_input(&[2, 2], DType::$dtype);
                assert_not_allowed(frontend::$op(&mut graph, x, x), "lhs", DType::$dtype);
                assert!(graph.operations().is_empty());
            }
        }
    };
}

macro_rules! reduce_rejects {
    ($op:ident, $dtype:ident) => {
        paste! {
            #[allow(non_snake_case)]
            #[test]
            fn [<test_ $op _rejects_ $dtype>]() {
                let (mut graph, x) = graph_with_input(&[2, 2], DType::$dtype);
                assert_not_allowed(frontend::$op(&mut graph, x, &[0], false), "input", DType::$dtype);
            }
        }
    };
}

unary_rejects!(exp, I32);
unary_rejects!(exp, F8);
unary_rejects!(tanh, BOOL);
unary_rejects!(sqrt, I64);
unary_rejects!(abs, I64);
unary_rejects!(abs, BOOL);
binary_rejects!(add, F64);
binary_rejects!(pow, BOOL);
binary_rejects!(pow, F8);
binary_rejects!(matmul, I64);
reduce_rejects!(sum, BOOL);
reduce_rejects!(mean, I8);
reduce_rejects!(prod, F8);

#[test]
fn test_mismatched_operand_names_second_param() {
    let mut graph = TraceGraph::new();
    let a = graph.add_input("a", static_shape(&[2]), DType::F16).unwrap();
    let b = graph.add_input("b", static_shape(&[2]), DType::F32).unwrap();
    match frontend::sub(&mut graph, a, b) {
        Err(TraceError::Constraint(ConstraintError::DtypeMismatch { expected, got, param })) => {
            assert_eq!(expected, DType::F16);
            assert_eq!(got, DType::F32);
            assert_eq!(param, "rhs");
        }
        other => panic!("expected DtypeMismatch, got {other:?}"),
    }
}

#[test]
fn test_convolution_rejects_integer_weight_first() {
    let mut graph = TraceGraph::new();
    let input = graph.add_input("input", static_shape(&[1, 1, 4]), DType::I32).unwrap();
    let weight = graph.add_input("weight", static_shape(&[1, 1, 2]), DType::I32).unwrap();
    let params = whisper_trace::numeric_tensor::ConvolutionParams {
        padding: vec![(0, 0)],
        stride: vec![1],
        lhs_dilation: vec![1],
        rhs_dilation: vec![1],
        feature_group_count: 1,
    };
    assert_not_allowed(
        frontend::convolution(&mut graph, input, weight, None, params),
        "input",
        DType::I32,
    );
}

#[test]
fn test_rank_preserving_ops_keep_rank() {
    let shapes: [&[u64]; 5] = [&[], &[3], &[2, 3], &[2, 1, 3], &[1, 2, 3, 4]];
    for shape in shapes {
        let (mut graph, x) = graph_with_input(shape, DType::F32);
        let outputs = [
            frontend::exp(&mut graph, x).unwrap(),
            frontend::abs(&mut graph, x).unwrap(),
            frontend::add(&mut graph, x, x).unwrap(),
            frontend::cast(&mut graph, x, DType::F16).unwrap(),
        ];
        for out in outputs {
            assert_eq!(graph.get_tensor_info(out).unwrap().shape, static_shape(shape));
        }
    }
}

#[test]
fn test_overflowing_reshape_is_an_error() {
    let (mut graph, x) = graph_with_input(&[2, 6], DType::F32);
    assert!(matches!(
        frontend::reshape(&mut graph, x, &[i64::MAX, 4]),
        Err(TraceError::ShapeError { .. })
    ));
    assert!(frontend::reshape(&mut graph, x, &[i64::MAX, 4, -1]).is_err());
    assert!(graph.operations().is_empty());
}

#[test]
fn test_overflowing_convolution_window_is_an_error() {
    let mut graph = TraceGraph::new();
    let input = graph.add_input("input", static_shape(&[1, 1, 4]), DType::F32).unwrap();
    let weight = graph.add_input("weight", static_shape(&[1, 1, 3]), DType::F32).unwrap();
    let params = |rhs_dilation: u64, padding: (i64, i64)| whisper_trace::numeric_tensor::ConvolutionParams {
        padding: vec![padding],
        stride: vec![1],
        lhs_dilation: vec![1],
        rhs_dilation: vec![rhs_dilation],
        feature_group_count: 1,
    };
    for params in [params(u64::MAX, (0, 0)), params(1 << 62, (0, 0)), params(1, (0, i64::MAX))] {
        assert!(matches!(
            frontend::convolution(&mut graph, input, weight, None, params),
            Err(TraceError::InvalidAttribute { .. })
        ));
    }
    assert!(graph.operations().is_empty());
}
