//! The single-warp kernel flavor.

mod common;

use chainforge_backend::{Generator, KernelType};
use chainforge_common::Backend;

use common::{context, gemm, strided};

#[test]
fn one_warp_sweeps_the_rows_with_a_tall_register_tile() {
    let ctx = context("sm_60", Backend::Cuda);
    let mut pool = chainforge_common::MatrixPool::new();
    let a = strided(&mut pool, 64, 9);
    let b = strided(&mut pool, 9, 9);
    let c = strided(&mut pool, 64, 9);
    let descr = gemm(&mut pool, false, false, a, b, c, 1.0, 0.0);

    let mut generator = Generator::new(&ctx, pool, vec![descr])
        .unwrap()
        .with_kernel_type(KernelType::SingleWarp);
    let artifacts = generator.generate().unwrap();

    let report = generator.report().unwrap();
    assert_eq!(report.num_threads, 32);
    // 64 output rows over a 32-wide warp: two tile rows.
    assert_eq!(report.accumulator_size, (2, 9));
    // A 32-thread kernel packs two chain instances per block.
    assert_eq!(report.mults_per_block, 2);

    assert!(artifacts.kernel.contains("float reg0[2][9]"));
    assert!(artifacts.kernel.contains("for (int c = 0; c < 2; ++c)"));
    assert!(artifacts.kernel.contains("int t = threadIdx.x + c * 32;"));
    assert!(artifacts.kernel.contains("if (t >= 64)"));
    assert!(artifacts.kernel.contains("break;"));

    // The store sweeps the same rows under a range guard.
    assert!(artifacts.kernel.contains("if (t < 64)"));
    assert!(artifacts.kernel.contains("= 1.0 * reg0[c][n];"));

    // 32 threads fit a warp: the barrier is warp-scoped on CUDA.
    assert!(artifacts.kernel.contains("__syncwarp();"));
    assert!(!artifacts.kernel.contains("__syncthreads();"));

    assert!(artifacts.launcher.contains("dim3 block(32, 2, 1);"));
    assert!(artifacts.launcher.contains("dim3 grid((numElements + 2 - 1) / 2, 1, 1);"));
}
