#![cfg(feature = "reference")]

use paste::paste;
mod pipeline_tests;
use pipeline_tests::Pipeline;
use pipeline_tests::conv_matmul::*;
use pipeline_tests::elementwise::*;
use pipeline_tests::reductions::*;
use pipeline_tests::shape_ops::*;

fn run_reference_test(test: impl FnOnce(&Pipeline)) {
    let _ = env_logger::builder().is_test(true).try_init();
    test(&Pipeline::reference())
}

macro_rules! do_test {
    ($runner_fn:expr, $runner_name:ident, $test_name:ident) => {
        paste! {
            #[allow(non_snake_case)]
            #[test]
            fn [<$runner_name _ $test_name>]() {
                $runner_fn($test_name);
            }
        }
    };
}

macro_rules! do_tests {
    ($runner_fn:expr, $runner_name:ident) => {
        do_test!($runner_fn, $runner_name, test_add_fp32);
        do_test!($runner_fn, $runner_name, test_add_broadcast_fp32);
        do_test!($runner_fn, $runner_name, test_sub_i32);
        do_test!($runner_fn, $runner_name, test_mul_f16);
        do_test!($runner_fn, $runner_name, test_div_fp32);
        do_test!($runner_fn, $runner_name, test_maximum_i32);
        do_test!($runner_fn, $runner_name, test_pow_fp32);
        do_test!($runner_fn, $runner_name, test_exp_fp32);
        do_test!($runner_fn, $runner_name, test_abs_i32);
        do_test!($runner_fn, $runner_name, test_rsqrt_bf16);
        do_test!($runner_fn, $runner_name, test_cast_fp32_to_i32);
        do_test!($runner_fn, $runner_name, test_bool_constant_mask_fp32);
        do_test!($runner_fn, $runner_name, test_squeeze_dims_fp32);
        do_test!($runner_fn, $runner_name, test_squeeze_all_fp32);
        do_test!($runner_fn, $runner_name, test_unsqueeze_i32);
        do_test!($runner_fn, $runner_name, test_reshape_infer_fp32);
        do_test!($runner_fn, $runner_name, test_permute_fp32);
        do_test!($runner_fn, $runner_name, test_permute_bool);
        do_test!($runner_fn, $runner_name, test_sum_fp32);
        do_test!($runner_fn, $runner_name, test_sum_all_keep_dim_i32);
        do_test!($runner_fn, $runner_name, test_mean_keep_dim_fp32);
        do_test!($runner_fn, $runner_name, test_mean_dynamic_fp32);
        do_test!($runner_fn, $runner_name, test_max_i32);
        do_test!($runner_fn, $runner_name, test_prod_fp32);
        do_test!($runner_fn, $runner_name, test_matmul_fp32);
        do_test!($runner_fn, $runner_name, test_matmul_batched_fp32);
        do_test!($runner_fn, $runner_name, test_conv1d_bias_fp32);
        do_test!($runner_fn, $runner_name, test_conv2d_fp32);
    };
}

do_tests!(run_reference_test, reference);
