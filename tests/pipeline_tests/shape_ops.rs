use crate::pipeline_tests::{Pipeline, run_single, tensor, test_eq_f32};
use whisper_trace::compiler::InputInfo;
use whisper_trace::dtype::DType;
use whisper_trace::frontend;

pub fn test_squeeze_dims_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[1, 2, 1], DType::F32))], |graph, inputs| {
        Ok(vec![frontend::squeeze(graph, inputs[0], &[0, 2])?])
    });
    let out = run_single(&exe, vec![tensor(vec![5.0f32, 6.0], &[1, 2, 1])]);
    test_eq_f32(&out, &tensor(vec![5.0f32, 6.0], &[2]));
}

pub fn test_squeeze_all_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(
        &[("x", InputInfo::from_static(&[1, 3, 1, 1], DType::F32))],
        |graph, inputs| Ok(vec![frontend::squeeze(graph, inputs[0], &[])?]),
    );
    let out = run_single(&exe, vec![tensor(vec![1.0f32, 2.0, 3.0], &[1, 3, 1, 1])]);
    test_eq_f32(&out, &tensor(vec![1.0f32, 2.0, 3.0], &[3]));
}

pub fn test_unsqueeze_i32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[2, 2], DType::I32))], |graph, inputs| {
        Ok(vec![frontend::unsqueeze(graph, inputs[0], -1)?])
    });
    let out = run_single(&exe, vec![tensor(vec![1i32, 2, 3, 4], &[2, 2])]);
    assert_eq!(out, tensor(vec![1i32, 2, 3, 4], &[2, 2, 1]));
}

pub fn test_reshape_infer_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[2, 3], DType::F32))], |graph, inputs| {
        Ok(vec![frontend::reshape(graph, inputs[0], &[3, -1])?])
    });
    let values = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
    let out = run_single(&exe, vec![tensor(values.clone(), &[2, 3])]);
    test_eq_f32(&out, &tensor(values, &[3, 2]));
}

pub fn test_permute_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[2, 3], DType::F32))], |graph, inputs| {
        Ok(vec![frontend::permute(graph, inputs[0], &[1, 0])?])
    });
    let out = run_single(&exe, vec![tensor(vec![0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0], &[2, 3])]);
    test_eq_f32(&out, &tensor(vec![0.0f32, 3.0, 1.0, 4.0, 2.0, 5.0], &[3, 2]));
}

pub fn test_permute_bool(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[2, 2], DType::BOOL))], |graph, inputs| {
        Ok(vec![frontend::permute(graph, inputs[0], &[1, 0])?])
    });
    let out = run_single(&exe, vec![tensor(vec![true, true, false, false], &[2, 2])]);
    assert_eq!(out, tensor(vec![true, false, true, false], &[2, 2]));
}
