use crate::pipeline_tests::{Pipeline, run_single, tensor, test_eq_f32};
use whisper_trace::compiler::InputInfo;
use whisper_trace::dtype::DType;
use whisper_trace::frontend;
use whisper_trace::numeric_tensor::ConvolutionParams;

fn unpadded(spatial: usize) -> ConvolutionParams {
    ConvolutionParams {
        padding: vec![(0, 0); spatial],
        stride: vec![1; spatial],
        lhs_dilation: vec![1; spatial],
        rhs_dilation: vec![1; spatial],
        feature_group_count: 1,
    }
}

pub fn test_matmul_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(
        &[
            ("a", InputInfo::from_static(&[2, 3], DType::F32)),
            ("b", InputInfo::from_static(&[3, 2], DType::F32)),
        ],
        |graph, inputs| Ok(vec![frontend::matmul(graph, inputs[0], inputs[1])?]),
    );
    let out = run_single(
        &exe,
        vec![
            tensor(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]),
            tensor(vec![7.0f32, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2]),
        ],
    );
    test_eq_f32(&out, &tensor(vec![58.0f32, 64.0, 139.0, 154.0], &[2, 2]));
}

pub fn test_matmul_batched_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(
        &[
            ("a", InputInfo::from_static(&[2, 1, 2], DType::F32)),
            ("b", InputInfo::from_static(&[1, 2, 1], DType::F32)),
        ],
        |graph, inputs| Ok(vec![frontend::matmul(graph, inputs[0], inputs[1])?]),
    );
    let out = run_single(
        &exe,
        vec![
            tensor(vec![1.0f32, 2.0, 3.0, 4.0], &[2, 1, 2]),
            tensor(vec![5.0f32, 6.0], &[1, 2, 1]),
        ],
    );
    test_eq_f32(&out, &tensor(vec![17.0f32, 39.0], &[2, 1, 1]));
}

pub fn test_conv1d_bias_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(
        &[
            ("input", InputInfo::from_static(&[1, 1, 5], DType::F32)),
            ("weight", InputInfo::from_static(&[1, 1, 3], DType::F32)),
            ("bias", InputInfo::from_static(&[1], DType::F32)),
        ],
        |graph, inputs| {
            Ok(vec![frontend::convolution(
                graph,
                inputs[0],
                inputs[1],
                Some(inputs[2]),
                unpadded(1),
            )?])
        },
    );
    let out = run_single(
        &exe,
        vec![
            tensor(vec![1.0f32, 2.0, 3.0, 4.0, 5.0], &[1, 1, 5]),
            tensor(vec![1.0f32, 1.0, 1.0], &[1, 1, 3]),
            tensor(vec![7.0f32], &[1]),
        ],
    );
    test_eq_f32(&out, &tensor(vec![13.0f32, 16.0, 19.0], &[1, 1, 3]));
}

pub fn test_conv2d_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(
        &[
            ("input", InputInfo::from_static(&[1, 1, 3, 3], DType::F32)),
            ("weight", InputInfo::from_static(&[1, 1, 2, 2], DType::F32)),
        ],
        |graph, inputs| Ok(vec![frontend::convolution(graph, inputs[0], inputs[1], None, unpadded(2))?]),
    );
    let out = run_single(
        &exe,
        vec![
            tensor((1..=9).map(|x| x as f32).collect(), &[1, 1, 3, 3]),
            tensor(vec![1.0f32; 4], &[1, 1, 2, 2]),
        ],
    );
    test_eq_f32(&out, &tensor(vec![12.0f32, 16.0, 24.0, 28.0], &[1, 1, 2, 2]));
}
