use crate::pipeline_tests::{Pipeline, run_single, tensor, test_eq_f32};
use whisper_trace::compiler::{InputDim, InputInfo};
use whisper_trace::dtype::DType;
use whisper_trace::frontend;

fn matrix_2x3() -> whisper_trace::NumericTensor {
    tensor(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])
}

pub fn test_sum_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[2, 3], DType::F32))], |graph, inputs| {
        Ok(vec![frontend::sum(graph, inputs[0], &[1], false)?])
    });
    let out = run_single(&exe, vec![matrix_2x3()]);
    test_eq_f32(&out, &tensor(vec![6.0f32, 15.0], &[2]));
}

pub fn test_sum_all_keep_dim_i32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[2, 2], DType::I32))], |graph, inputs| {
        Ok(vec![frontend::sum(graph, inputs[0], &[], true)?])
    });
    let out = run_single(&exe, vec![tensor(vec![1i32, 2, 3, 4], &[2, 2])]);
    assert_eq!(out, tensor(vec![10i32], &[1, 1]));
}

pub fn test_mean_keep_dim_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[2, 3], DType::F32))], |graph, inputs| {
        Ok(vec![frontend::mean(graph, inputs[0], &[-1], true)?])
    });
    let out = run_single(&exe, vec![matrix_2x3()]);
    test_eq_f32(&out, &tensor(vec![2.0f32, 5.0], &[2, 1]));
}

pub fn test_mean_dynamic_fp32(pipeline: &Pipeline) {
    let shape = vec![InputDim::Dynamic { min: 1, opt: 4, max: 8 }];
    let exe = pipeline.build(&[("x", InputInfo::new(shape, DType::F32))], |graph, inputs| {
        Ok(vec![frontend::mean(graph, inputs[0], &[0], false)?])
    });
    let out = run_single(&exe, vec![tensor(vec![1.0f32, 2.0, 3.0, 4.0], &[4])]);
    test_eq_f32(&out, &tensor(vec![2.5f32], &[]));
}

pub fn test_max_i32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[2, 3], DType::I32))], |graph, inputs| {
        Ok(vec![frontend::max(graph, inputs[0], &[0], false)?])
    });
    let out = run_single(&exe, vec![tensor(vec![3i32, 1, 4, 1, 5, 9], &[2, 3])]);
    assert_eq!(out, tensor(vec![3i32, 5, 9], &[3]));
}

pub fn test_prod_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[4], DType::F32))], |graph, inputs| {
        Ok(vec![frontend::prod(graph, inputs[0], &[], false)?])
    });
    let out = run_single(&exe, vec![tensor(vec![1.0f32, 2.0, 3.0, 4.0], &[4])]);
    test_eq_f32(&out, &tensor(vec![24.0f32], &[]));
}
