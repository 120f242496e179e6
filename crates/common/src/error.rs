//! Error types shared by the whole generator.

use thiserror::Error;

/// A user-visible inconsistency in the input description.
///
/// Raised at the point of detection; generation aborts and no artifact is
/// produced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The shapes of two matrices participating in a gemm do not agree.
    #[error("cannot generate a matrix multiplication with given parameters: {0}")]
    ShapeMismatch(String),

    /// The contraction lengths of the two operands differ under strict
    /// matching.
    #[error("gemm: mismatch of contraction length k_op1 ({op1}) != k_op2 ({op2})")]
    ContractionMismatch {
        /// Contraction length seen through the first operand.
        op1: usize,
        /// Contraction length seen through the second operand.
        op2: usize,
    },

    /// A bounding box does not fit into its matrix allocation.
    #[error("bbox {bbox} is outside of matrix {num_rows}x{num_cols}")]
    BboxOutOfBounds {
        /// Textual form of the offending bounding box.
        bbox: String,
        /// Allocated rows.
        num_rows: usize,
        /// Allocated columns.
        num_cols: usize,
    },

    /// The layout of an operand does not match what the gemm requested.
    #[error("op1 layout does not match the layout requested by the gemm instruction")]
    LayoutMismatch,

    /// An instruction reached the emitter before it became ready.
    #[error("instruction is not ready to be generated: {0}")]
    NotReady(String),

    /// The backend string is not one of the supported ones.
    #[error("unknown backend, given: {0}")]
    UnknownBackend(String),

    /// The architecture is unknown or not served by the chosen backend.
    #[error("unknown gpu architecture: {backend} {arch}")]
    UnknownArch {
        /// Requested backend.
        backend: String,
        /// Requested architecture model.
        arch: String,
    },

    /// The gemm list disagrees with the user options.
    #[error(
        "gemm list is not consistent with user options: `strict_match` in gemm descr. \
         set to {strict_match}, but `exact_contraction_length` is set to \
         {exact_contraction_length}"
    )]
    InconsistentOptions {
        /// Strictness requested by the descriptor.
        strict_match: bool,
        /// Strictness requested by the user options.
        exact_contraction_length: bool,
    },

    /// A shared-memory region contains a symbol whose first user is not a
    /// shared-memory write.
    #[error("expected the first user of symbol {0} to be a shared memory write")]
    BadRegionUser(String),

    /// The generator received an empty gemm list.
    #[error("gemm list must not be empty")]
    EmptyGemmList,

    /// A call site was requested before the generator was registered.
    #[error("generator is not registered; call register() first")]
    NotRegistered,
}

/// A violated invariant inside the generator itself.
///
/// Any of these surfacing means a bug in the builders or the optimizer, not
/// in the user input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InternalError {
    /// An instruction received an operand of the wrong symbol kind.
    #[error("{instr}: operand `{operand}` is not in {expected}")]
    WrongOperandKind {
        /// Instruction mnemonic.
        instr: &'static str,
        /// Operand role.
        operand: &'static str,
        /// Expected location of the operand.
        expected: &'static str,
    },

    /// A symbol was consumed before any instruction attached a data view.
    #[error("symbol data view has not been assigned to `{0}`")]
    MissingDataView(String),

    /// Two live symbols would share one name.
    #[error("name has already been occupied: {0}")]
    NameOccupied(String),

    /// A builder tried to pop the global scope.
    #[error("attempt to delete the global scope")]
    GlobalScopeRemoval,

    /// A gemm result is neither in scope nor marked temporary.
    #[error("gemm result is not in scopes and thus must be a temporary")]
    UnboundResult,

    /// The register accumulator cannot hold the gemm output columns.
    #[error("gemm: output columns exceed the register tile, i.e. {need} > {have}")]
    AccumulatorTooSmall {
        /// Columns the accumulator provides.
        have: usize,
        /// Columns the gemm needs.
        need: usize,
    },

    /// A symbol expected to be in scope could not be resolved.
    #[error("unresolved symbol for object `{0}`")]
    UnresolvedSymbol(String),

    /// Source and destination of a store disagree on the row count.
    #[error("store: `src` and `dest` do not match in size along dim 0")]
    StoreDimMismatch,
}

/// Sum of all error classes the generator can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// User-visible input inconsistency.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Internal invariant violation.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Convenience alias used across the generator crates.
pub type Result<T, E = Error> = std::result::Result<T, E>;
