//! Shared fixtures for the end-to-end generator tests.

#![allow(dead_code)]

use chainforge_common::{
    Addressing, Backend, Context, FloatingPointType, GemmDescr, MatrixBatch, MatrixId,
    MatrixPool, Options, Scalar,
};

pub fn context(arch: &str, backend: Backend) -> Context {
    Context::new(arch, backend, FloatingPointType::Float, Options::default()).unwrap()
}

pub fn strided(pool: &mut MatrixPool, rows: usize, cols: usize) -> MatrixId {
    pool.add(MatrixBatch::new(rows, cols, Addressing::Strided))
}

pub fn tmp(pool: &mut MatrixPool, rows: usize, cols: usize) -> MatrixId {
    pool.add(MatrixBatch::new(rows, cols, Addressing::Strided).as_tmp())
}

pub fn gemm(
    pool: &mut MatrixPool,
    trans_a: bool,
    trans_b: bool,
    a: MatrixId,
    b: MatrixId,
    c: MatrixId,
    alpha: f64,
    beta: f64,
) -> GemmDescr {
    GemmDescr::new(
        pool,
        trans_a,
        trans_b,
        a,
        b,
        c,
        Scalar::from(alpha),
        Scalar::from(beta),
        false,
    )
    .unwrap()
}

/// S1: a single non-transposed gemm `C = A x B`.
pub fn single_gemm_chain() -> (MatrixPool, Vec<GemmDescr>) {
    let mut pool = MatrixPool::new();
    let a = strided(&mut pool, 56, 9);
    let b = strided(&mut pool, 9, 9);
    let c = strided(&mut pool, 56, 9);
    let descr = gemm(&mut pool, false, false, a, b, c, 1.0, 0.0);
    (pool, vec![descr])
}

/// S2: the fused chain `D = A x (B x C) + D`.
pub fn two_gemm_chain() -> (MatrixPool, Vec<GemmDescr>) {
    let mut pool = MatrixPool::new();
    let mat_a = strided(&mut pool, 56, 56);
    let mat_b = strided(&mut pool, 56, 9);
    let mat_c = strided(&mut pool, 9, 9);
    let mat_d = strided(&mut pool, 56, 9);
    let tmp1 = tmp(&mut pool, 56, 9);

    let first = gemm(&mut pool, false, false, mat_b, mat_c, tmp1, 1.0, 0.0);
    let second = gemm(&mut pool, false, false, mat_a, tmp1, mat_d, 1.0, 1.0);
    (pool, vec![first, second])
}

/// Count non-overlapping occurrences of `needle` in `haystack`.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
