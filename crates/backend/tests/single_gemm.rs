//! End-to-end expectations for a single non-transposed gemm.

mod common;

use chainforge_backend::Generator;
use chainforge_common::Backend;

use common::{context, count_occurrences, single_gemm_chain};

#[test]
fn cuda_kernel_has_the_expected_shape() {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = single_gemm_chain();
    let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
    let artifacts = generator.generate().unwrap();

    assert!(artifacts.name.starts_with("cf_gemms_"));
    assert!(artifacts.kernel.contains(&format!("kernel_{}", artifacts.name)));

    // Only B moves to shared memory, through a straight extended loader.
    assert_eq!(count_occurrences(&artifacts.kernel, "// loading "), 1);
    assert!(artifacts.kernel.contains("// loading glbB to _0: # no trans, extended"));
    assert!(!artifacts.kernel.contains("# trans"));

    // One barrier between the load and the gemm; 64 threads need the
    // block-wide form.
    assert_eq!(count_occurrences(&artifacts.kernel, "__syncthreads();"), 1);
    let sync_at = artifacts.kernel.find("__syncthreads();").unwrap();
    let load_at = artifacts.kernel.find("// loading glbB").unwrap();
    let gemm_at = artifacts.kernel.find("// gemm: glbA x _0").unwrap();
    assert!(load_at < sync_at && sync_at < gemm_at);

    // The final store runs with beta = 0: a plain write, no read-back.
    assert!(artifacts
        .kernel
        .contains("glbC[threadIdx.x + n * 56] = 1.0 * reg0[0][n];"));
    assert!(!artifacts.kernel.contains("+ 0.0 * glbC"));

    let report = generator.report().unwrap();
    assert_eq!(report.num_threads, 64);
    assert_eq!(report.accumulator_size, (1, 9));
    assert_eq!(report.mults_per_block, 1);
    assert_eq!(report.num_regions, 1);
    // B's patch is 81 elements, padded to the 32-element quantum.
    assert_eq!(report.size_per_mult, 96);
}

#[test]
fn launcher_and_header_follow_the_cuda_syntax() {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = single_gemm_chain();
    let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
    let artifacts = generator.generate().unwrap();

    assert!(artifacts.launcher.contains("dim3 block(64, 1, 1);"));
    assert!(artifacts
        .launcher
        .contains("dim3 grid((numElements + 1 - 1) / 1, 1, 1);"));
    assert!(artifacts.launcher.contains(
        "cudaStream_t stream = (streamPtr != nullptr) ? static_cast<cudaStream_t>(streamPtr) : 0;"
    ));
    assert!(artifacts
        .launcher
        .contains(&format!("kernel_{}<<<grid, block, 0, stream>>>(", artifacts.name)));
    assert!(artifacts.launcher.contains("CHECK_ERR;"));

    assert!(artifacts.header.starts_with(&format!("void launcher_{}(", artifacts.name)));
    assert!(artifacts.header.contains("unsigned* flags = nullptr"));
    assert!(artifacts.header.trim_end().ends_with("void* streamPtr = nullptr);"));
}

#[test]
fn batch_guards_wrap_the_body() {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = single_gemm_chain();
    let artifacts = Generator::new(&ctx, pool, gemms).unwrap().generate().unwrap();

    assert!(artifacts
        .kernel
        .contains("unsigned bid = threadIdx.y + blockDim.y * blockIdx.x;"));
    assert!(artifacts.kernel.contains("if (bid < numElements)"));
    assert!(artifacts.kernel.contains("if (flags == nullptr || flags[bid] != 0)"));
}

#[test]
fn hip_backend_switches_the_lexicon() {
    let ctx = context("gfx906", Backend::Hip);
    let (pool, gemms) = single_gemm_chain();
    let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
    let artifacts = generator.generate().unwrap();

    assert!(artifacts.launcher.contains("hipLaunchKernelGGL(kernel_"));
    assert!(artifacts.launcher.contains("hipStream_t stream ="));
    assert!(artifacts.kernel.contains("hipThreadIdx_x"));
    assert!(artifacts
        .kernel
        .contains("unsigned bid = hipThreadIdx_y + hipBlockDim_y * hipBlockIdx_x;"));

    // The wavefront is 64 wide, so the kernel runs on a single warp's
    // worth of threads; HIP spells the warp-scoped barrier as the
    // block-wide one.
    assert_eq!(generator.report().unwrap().num_threads, 64);
    assert!(artifacts.kernel.contains("__syncthreads();"));
    assert!(!artifacts.kernel.contains("__syncwarp"));
}

#[test]
fn strided_addressing_recovers_the_batch_pointer() {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = single_gemm_chain();
    let artifacts = Generator::new(&ctx, pool, gemms).unwrap().generate().unwrap();

    assert!(artifacts.kernel.contains(
        "const float * const __restrict__ glbA = \
         &A[(threadIdx.y + blockDim.y * blockIdx.x) * 504 + A_extraOffset];"
    ));
    // The sink keeps a writable pointer.
    assert!(artifacts.kernel.contains(
        "float * const __restrict__ glbC = \
         &C[(threadIdx.y + blockDim.y * blockIdx.x) * 504 + C_extraOffset];"
    ));
}
