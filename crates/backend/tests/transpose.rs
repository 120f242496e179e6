//! Transposed operands: prime-padded patches and region coloring.

mod common;

use chainforge_backend::Generator;
use chainforge_common::Backend;

use common::{context, gemm, strided, tmp};

#[test]
fn transposed_operand_gets_a_prime_padded_patch() {
    let ctx = context("sm_60", Backend::Cuda);
    let mut pool = chainforge_common::MatrixPool::new();
    // tmp = A^T x B, C = tmp x B.
    let a = strided(&mut pool, 56, 9);
    let b = strided(&mut pool, 56, 56);
    let product = tmp(&mut pool, 9, 56);
    let c = strided(&mut pool, 9, 56);

    let first = gemm(&mut pool, true, false, a, b, product, 1.0, 0.0);
    let second = gemm(&mut pool, false, false, product, b, c, 1.0, 0.0);

    let mut generator = Generator::new(&ctx, pool, vec![first, second]).unwrap();
    let artifacts = generator.generate().unwrap();

    // A is loaded through the transposing strategy; B through the
    // straight one.
    assert!(artifacts.kernel.contains("// loading glbA to _0: # trans, extended"));
    assert!(artifacts.kernel.contains("// loading glbB to _1: # no trans, extended"));

    // The transposed patch's lead dimension is the next prime above the 9
    // active columns of A; the source is walked modulo its 56 rows.
    assert!(artifacts.kernel.contains("(index % 56) * 11 + index / 56"));

    // The gemm reads the patch with the prime lead dimension.
    assert!(artifacts.kernel.contains("* _0[t") || artifacts.kernel.contains("value = _0["));

    // Coloring folds the three patches into two regions: A's transposed
    // patch and B's straight patch interfere; the temporary aliases one
    // of them.
    let report = generator.report().unwrap();
    assert!(report.num_regions <= 2);
    assert_eq!(report.num_regions, 2);
    let members: usize = report.region_members.iter().map(Vec::len).sum();
    assert_eq!(members, 3);
}

#[test]
fn transposed_layout_mismatch_is_rejected() {
    use chainforge_common::{Error, GenerationError};

    let ctx = context("sm_60", Backend::Cuda);
    let mut pool = chainforge_common::MatrixPool::new();
    // tmp = B x A with a transposed temporary consumer: the temporary is
    // stored straight, so requesting `tmp^T` later cannot be served.
    let a = strided(&mut pool, 32, 32);
    let b = strided(&mut pool, 32, 32);
    let product = tmp(&mut pool, 32, 32);
    let c = strided(&mut pool, 32, 32);

    let first = gemm(&mut pool, false, false, b, a, product, 1.0, 0.0);
    let second = gemm(&mut pool, true, false, product, a, c, 1.0, 0.0);

    let mut generator = Generator::new(&ctx, pool, vec![first, second]).unwrap();
    let result = generator.generate();
    assert!(matches!(
        result,
        Err(Error::Generation(GenerationError::LayoutMismatch))
    ));
}
