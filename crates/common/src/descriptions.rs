//! GEMM descriptors: the frontend/backend hand-off format.

use serde::{Deserialize, Serialize};

use crate::basic_types::{DataFlowDirection, Scalar};
use crate::context::Context;
use crate::error::GenerationError;
use crate::matrix::{MatrixBatch, MatrixId, MatrixPool};

/// One step of a gemm chain: `C = alpha * op(A) x op(B) + beta * C`.
///
/// Construction assigns data-flow directions to the participating matrices,
/// derives `(m, n, k)` from the transposed or plain active dimensions, and
/// validates that the shapes agree. Descriptors are immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GemmDescr {
    /// Whether the first operand is transposed.
    pub trans_a: bool,
    /// Whether the second operand is transposed.
    pub trans_b: bool,
    /// First operand.
    pub mat_a: MatrixId,
    /// Second operand.
    pub mat_b: MatrixId,
    /// Result.
    pub mat_c: MatrixId,
    /// Scale of the product.
    pub alpha: Scalar,
    /// Scale of the previous result contents.
    pub beta: Scalar,
    m: usize,
    n: usize,
    k: usize,
    strict_match: bool,
}

impl GemmDescr {
    /// Build and validate a descriptor over matrices of `pool`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: &mut MatrixPool,
        trans_a: bool,
        trans_b: bool,
        mat_a: MatrixId,
        mat_b: MatrixId,
        mat_c: MatrixId,
        alpha: Scalar,
        beta: Scalar,
        strict_match: bool,
    ) -> Result<Self, GenerationError> {
        pool[mat_a].set_direction(DataFlowDirection::Source);
        pool[mat_b].set_direction(DataFlowDirection::Source);
        pool[mat_c].set_direction(DataFlowDirection::Sink);

        let (m, k) = if trans_a {
            (pool[mat_a].active_num_cols(), pool[mat_a].active_num_rows())
        } else {
            (pool[mat_a].active_num_rows(), pool[mat_a].active_num_cols())
        };
        let n = if trans_b {
            pool[mat_b].active_num_rows()
        } else {
            pool[mat_b].active_num_cols()
        };

        let descr = GemmDescr {
            trans_a,
            trans_b,
            mat_a,
            mat_b,
            mat_c,
            alpha,
            beta,
            m,
            n,
            k,
            strict_match,
        };
        descr.check(pool)?;
        Ok(descr)
    }

    fn check(&self, pool: &MatrixPool) -> Result<(), GenerationError> {
        let a = &pool[self.mat_a];
        let b = &pool[self.mat_b];
        let c = &pool[self.mat_c];

        let a_rows = if self.trans_a { a.active_num_cols() } else { a.active_num_rows() };
        if c.active_num_rows() != a_rows {
            let layout = if self.trans_a { "Trans" } else { "NoTrans" };
            return Err(GenerationError::ShapeMismatch(format!(
                "matrix C and A ({layout}) do not match"
            )));
        }

        let b_cols = if self.trans_b { b.active_num_rows() } else { b.active_num_cols() };
        if c.active_num_cols() != b_cols {
            let layout = if self.trans_b { "Trans" } else { "NoTrans" };
            return Err(GenerationError::ShapeMismatch(format!(
                "matrix C and B ({layout}) do not match"
            )));
        }

        // The contraction lengths of A and B may legitimately differ when
        // chained matrices are padded differently; only strict mode insists.
        if self.strict_match {
            let k_a = if self.trans_a { a.active_num_rows() } else { a.active_num_cols() };
            let k_b = if self.trans_b { b.active_num_cols() } else { b.active_num_rows() };
            if k_a != k_b {
                let layout_a = if self.trans_a { "Trans" } else { "NoTrans" };
                let layout_b = if self.trans_b { "Trans" } else { "NoTrans" };
                return Err(GenerationError::ShapeMismatch(format!(
                    "matrix A ({layout_a}) and B ({layout_b}) do not match"
                )));
            }
        }
        Ok(())
    }

    /// Output rows of the gemm.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Output columns of the gemm.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Contraction length as seen through the first operand.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Whether the descriptor was built under strict shape matching.
    pub fn is_strict_math(&self) -> bool {
        self.strict_match
    }

    /// Threads needed to cover the output rows, aligned to the hardware
    /// quantum, together with the raw row count.
    pub fn num_threads(&self, context: &Context) -> (usize, usize) {
        (context.align(self.m), self.m)
    }

    /// Register-accumulator columns this gemm needs.
    pub fn accumulator_size(&self) -> usize {
        self.n
    }

    /// Floating-point operations of one batch element.
    pub fn compute_flops(&self) -> usize {
        let mut flops = (2 * self.k - 1) * self.m * self.n;
        if !self.beta.is_zero() {
            flops += self.m * self.n;
        }
        flops
    }

    /// Human-readable equation, used in kernel metadata comments.
    pub fn equation(&self, pool: &MatrixPool) -> String {
        let name = |id: MatrixId| {
            pool[id].name().map_or_else(|| "<unnamed>".to_string(), str::to_string)
        };
        let suffix_a = if self.trans_a { "^T" } else { "" };
        let suffix_b = if self.trans_b { "^T" } else { "" };
        let product = format!(
            "{} * {}{} x {}{}",
            self.alpha,
            name(self.mat_a),
            suffix_a,
            name(self.mat_b),
            suffix_b
        );
        let update = if self.beta.is_zero() {
            String::new()
        } else {
            format!(" + {} * {}", self.beta, name(self.mat_c))
        };
        format!("{} = {product}{update}", name(self.mat_c))
    }
}

/// Derive the temporary matrix holding the product of two operands.
pub fn generate_tmp_matrix(
    pool: &mut MatrixPool,
    op1: MatrixId,
    op2: MatrixId,
    trans_op1: bool,
    trans_op2: bool,
) -> MatrixId {
    use crate::basic_types::Addressing;

    let m = if trans_op1 { pool[op1].active_num_cols() } else { pool[op1].active_num_rows() };
    let n = if trans_op2 { pool[op2].active_num_rows() } else { pool[op2].active_num_cols() };
    pool.add(MatrixBatch::new(m, n, Addressing::Strided).as_tmp())
}

#[cfg(test)]
mod tests {
    use crate::basic_types::Addressing;
    use crate::matrix::BoundingBox;

    use super::*;

    fn strided(pool: &mut MatrixPool, rows: usize, cols: usize) -> MatrixId {
        pool.add(MatrixBatch::new(rows, cols, Addressing::Strided))
    }

    #[test]
    fn dims_follow_the_transposition() {
        let mut pool = MatrixPool::new();
        let a = strided(&mut pool, 9, 56);
        let b = strided(&mut pool, 9, 9);
        let c = strided(&mut pool, 56, 9);
        let descr = GemmDescr::new(
            &mut pool,
            true,
            false,
            a,
            b,
            c,
            Scalar::from(1.0),
            Scalar::from(0.0),
            false,
        )
        .unwrap();
        assert_eq!((descr.m(), descr.n(), descr.k()), (56, 9, 9));
        assert_eq!(pool[a].direction(), Some(DataFlowDirection::Source));
        assert_eq!(pool[c].direction(), Some(DataFlowDirection::Sink));
    }

    #[test]
    fn mismatched_result_rows_are_rejected() {
        let mut pool = MatrixPool::new();
        let a = strided(&mut pool, 56, 9);
        let b = strided(&mut pool, 9, 9);
        let c = strided(&mut pool, 55, 9);
        let result = GemmDescr::new(
            &mut pool,
            false,
            false,
            a,
            b,
            c,
            Scalar::from(1.0),
            Scalar::from(0.0),
            false,
        );
        assert!(matches!(result, Err(GenerationError::ShapeMismatch(_))));
    }

    #[test]
    fn loose_contraction_only_fails_under_strict_match() {
        let mut pool = MatrixPool::new();
        // A is 56x9 active, B is 12x9: k differs (9 vs 12).
        let a = strided(&mut pool, 56, 9);
        let b = pool
            .add(
                MatrixBatch::new(12, 9, Addressing::Strided)
                    .with_bbox(BoundingBox::new(0, 0, 12, 9))
                    .unwrap(),
            );
        let c = strided(&mut pool, 56, 9);

        let loose = GemmDescr::new(
            &mut pool,
            false,
            false,
            a,
            b,
            c,
            Scalar::from(1.0),
            Scalar::from(0.0),
            false,
        );
        assert!(loose.is_ok());

        let strict = GemmDescr::new(
            &mut pool,
            false,
            false,
            a,
            b,
            c,
            Scalar::from(1.0),
            Scalar::from(0.0),
            true,
        );
        assert!(strict.is_err());
    }

    #[test]
    fn flops_count_the_beta_update() {
        let mut pool = MatrixPool::new();
        let a = strided(&mut pool, 4, 8);
        let b = strided(&mut pool, 8, 2);
        let c = strided(&mut pool, 4, 2);
        let without = GemmDescr::new(
            &mut pool,
            false,
            false,
            a,
            b,
            c,
            Scalar::from(1.0),
            Scalar::from(0.0),
            false,
        )
        .unwrap();
        let with = GemmDescr::new(
            &mut pool,
            false,
            false,
            a,
            b,
            c,
            Scalar::from(1.0),
            Scalar::from(1.0),
            false,
        )
        .unwrap();
        assert_eq!(without.compute_flops(), 15 * 8);
        assert_eq!(with.compute_flops(), 15 * 8 + 8);
    }

    #[test]
    fn tmp_matrix_takes_the_product_shape() {
        let mut pool = MatrixPool::new();
        let b = strided(&mut pool, 56, 9);
        let c = strided(&mut pool, 9, 9);
        let tmp = generate_tmp_matrix(&mut pool, b, c, false, false);
        assert_eq!(pool[tmp].num_rows(), 56);
        assert_eq!(pool[tmp].num_cols(), 9);
        assert!(pool[tmp].is_tmp());
    }
}
