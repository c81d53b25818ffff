use crate::pipeline_tests::{Pipeline, run_single, tensor, test_eq_bf16, test_eq_f16, test_eq_f32};
use half::{bf16, f16};
use whisper_trace::compiler::InputInfo;
use whisper_trace::dtype::DType;
use whisper_trace::frontend;

fn binary_fixture(
    pipeline: &Pipeline,
    a: &[u64],
    b: &[u64],
    dtype: DType,
    op: fn(
        &mut whisper_trace::TraceGraph,
        whisper_trace::TraceTensorId,
        whisper_trace::TraceTensorId,
    ) -> Result<whisper_trace::TraceTensorId, whisper_trace::trace::TraceError>,
) -> whisper_trace::Executable {
    pipeline.build(
        &[
            ("a", InputInfo::from_static(a, dtype)),
            ("b", InputInfo::from_static(b, dtype)),
        ],
        |graph, inputs| Ok(vec![op(graph, inputs[0], inputs[1])?]),
    )
}

pub fn test_add_fp32(pipeline: &Pipeline) {
    let exe = binary_fixture(pipeline, &[1], &[1], DType::F32, frontend::add);
    let out = run_single(&exe, vec![tensor(vec![1.0f32], &[1]), tensor(vec![2.0f32], &[1])]);
    test_eq_f32(&out, &tensor(vec![3.0f32], &[1]));
}

pub fn test_add_broadcast_fp32(pipeline: &Pipeline) {
    let exe = binary_fixture(pipeline, &[2, 3], &[3], DType::F32, frontend::add);
    let out = run_single(
        &exe,
        vec![
            tensor(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]),
            tensor(vec![10.0f32, 20.0, 30.0], &[3]),
        ],
    );
    test_eq_f32(&out, &tensor(vec![11.0f32, 22.0, 33.0, 14.0, 25.0, 36.0], &[2, 3]));
}

pub fn test_sub_i32(pipeline: &Pipeline) {
    let exe = binary_fixture(pipeline, &[3], &[3], DType::I32, frontend::sub);
    let out = run_single(&exe, vec![tensor(vec![5i32, 0, -3], &[3]), tensor(vec![2i32, 7, -3], &[3])]);
    assert_eq!(out, tensor(vec![3i32, -7, 0], &[3]));
}

pub fn test_mul_f16(pipeline: &Pipeline) {
    let exe = binary_fixture(pipeline, &[2], &[2], DType::F16, frontend::mul);
    let a = [1.5f32, -2.0].map(f16::from_f32).to_vec();
    let b = [4.0f32, 0.25].map(f16::from_f32).to_vec();
    let out = run_single(&exe, vec![tensor(a, &[2]), tensor(b, &[2])]);
    test_eq_f16(&out, &tensor([6.0f32, -0.5].map(f16::from_f32).to_vec(), &[2]));
}

pub fn test_div_fp32(pipeline: &Pipeline) {
    let exe = binary_fixture(pipeline, &[3], &[3], DType::F32, frontend::div);
    let out = run_single(
        &exe,
        vec![tensor(vec![1.0f32, 9.0, -4.0], &[3]), tensor(vec![4.0f32, 3.0, 8.0], &[3])],
    );
    test_eq_f32(&out, &tensor(vec![0.25f32, 3.0, -0.5], &[3]));
}

pub fn test_maximum_i32(pipeline: &Pipeline) {
    let exe = binary_fixture(pipeline, &[4], &[4], DType::I32, frontend::maximum);
    let out = run_single(
        &exe,
        vec![tensor(vec![1i32, 8, -2, 4], &[4]), tensor(vec![3i32, 5, -7, 4], &[4])],
    );
    assert_eq!(out, tensor(vec![3i32, 8, -2, 4], &[4]));
}

pub fn test_pow_fp32(pipeline: &Pipeline) {
    let exe = binary_fixture(pipeline, &[2], &[2], DType::F32, frontend::pow);
    let out = run_single(&exe, vec![tensor(vec![2.0f32, 3.0], &[2]), tensor(vec![3.0f32, 2.0], &[2])]);
    test_eq_f32(&out, &tensor(vec![8.0f32, 9.0], &[2]));
}

pub fn test_exp_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[3], DType::F32))], |graph, inputs| {
        Ok(vec![frontend::exp(graph, inputs[0])?])
    });
    let out = run_single(&exe, vec![tensor(vec![0.0f32, 1.0, -1.0], &[3])]);
    test_eq_f32(
        &out,
        &tensor(vec![1.0f32, std::f32::consts::E, 1.0 / std::f32::consts::E], &[3]),
    );
}

pub fn test_abs_i32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[3], DType::I32))], |graph, inputs| {
        Ok(vec![frontend::abs(graph, inputs[0])?])
    });
    let out = run_single(&exe, vec![tensor(vec![-4i32, 0, 7], &[3])]);
    assert_eq!(out, tensor(vec![4i32, 0, 7], &[3]));
}

pub fn test_rsqrt_bf16(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[2], DType::BF16))], |graph, inputs| {
        Ok(vec![frontend::rsqrt(graph, inputs[0])?])
    });
    let input = [4.0f32, 16.0].map(bf16::from_f32).to_vec();
    let out = run_single(&exe, vec![tensor(input, &[2])]);
    test_eq_bf16(&out, &tensor([0.5f32, 0.25].map(bf16::from_f32).to_vec(), &[2]));
}

pub fn test_cast_fp32_to_i32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[2], DType::F32))], |graph, inputs| {
        Ok(vec![frontend::cast(graph, inputs[0], DType::I32)?])
    });
    let out = run_single(&exe, vec![tensor(vec![1.7f32, -2.2], &[2])]);
    assert_eq!(out, tensor(vec![1i32, -2], &[2]));
}

pub fn test_bool_constant_mask_fp32(pipeline: &Pipeline) {
    let exe = pipeline.build(&[("x", InputInfo::from_static(&[3], DType::F32))], |graph, inputs| {
        let mask = frontend::constant(graph, tensor(vec![true, false, true], &[3]))?;
        let mask = frontend::cast(graph, mask, DType::F32)?;
        Ok(vec![frontend::mul(graph, inputs[0], mask)?])
    });
    let out = run_single(&exe, vec![tensor(vec![1.0f32, 2.0, 3.0], &[3])]);
    test_eq_f32(&out, &tensor(vec![1.0f32, 0.0, 3.0], &[3]));
}
