//! User options and the generation context.

use serde::{Deserialize, Serialize};

use crate::basic_types::FloatingPointType;
use crate::error::GenerationError;
use crate::vm::{vm_factory, Backend, Vm};

/// User-tunable knobs of the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Require the contraction lengths of both gemm operands to agree
    /// exactly. Off by default because chained matrices may be padded
    /// differently by the frontend.
    pub exact_contraction_length: bool,
    /// Software-prefetch the first operand when it is read from global
    /// memory inside the gemm loop.
    pub prefetch_gemm: bool,
    /// Round every shared-memory patch up to the alignment quantum.
    pub align_shr_mem: bool,
    /// Run the synchronization minimization pass; when off, the
    /// conservative builder-inserted barriers are kept.
    pub enable_sync_threads_opt: bool,
    /// Explicit factor for `#pragma unroll`; `None` leaves the factor to
    /// the device compiler.
    pub unroll_factor: Option<u32>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            exact_contraction_length: false,
            prefetch_gemm: false,
            align_shr_mem: true,
            enable_sync_threads_opt: true,
            unroll_factor: None,
        }
    }
}

/// Everything the backend needs to know about the target: the virtual
/// machine, the floating-point type, and the user options.
#[derive(Debug, Clone)]
pub struct Context {
    vm: Vm,
    fp_type: FloatingPointType,
    options: Options,
}

impl Context {
    /// Create a context for an architecture/backend pair.
    pub fn new(
        arch: &str,
        backend: Backend,
        fp_type: FloatingPointType,
        options: Options,
    ) -> Result<Self, GenerationError> {
        Ok(Context { vm: vm_factory(arch, backend)?, fp_type, options })
    }

    /// The virtual machine model.
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// The floating-point type of the generated kernel.
    pub fn fp_type(&self) -> FloatingPointType {
        self.fp_type
    }

    /// The C spelling of the floating-point type.
    pub fn fp_as_str(&self) -> &'static str {
        self.fp_type.as_str()
    }

    /// The user options.
    pub fn user_options(&self) -> &Options {
        &self.options
    }

    /// The alignment quantum in elements: `vec_unit_length * hw_fp_word_size
    /// / sizeof(fp)`.
    pub fn align_quantum(&self) -> usize {
        self.vm.hw_descr.vec_unit_length * self.vm.hw_descr.hw_fp_word_size / self.fp_type.size()
    }

    /// Round `num` up to the next multiple of the alignment quantum.
    pub fn align(&self, num: usize) -> usize {
        let quantum = self.align_quantum();
        num.div_ceil(quantum) * quantum
    }

    /// Widen the half-open range `[begin, end)` outwards to quantum
    /// boundaries. Callers clip the result to their allocation.
    pub fn align_range(&self, begin: usize, end: usize) -> (usize, usize) {
        let quantum = self.align_quantum();
        let aligned_begin = begin - begin % quantum;
        let aligned_end = end + (quantum - end % quantum) % quantum;
        (aligned_begin, aligned_end)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn context(fp_type: FloatingPointType) -> Context {
        Context::new("sm_60", Backend::Cuda, fp_type, Options::default()).unwrap()
    }

    #[test]
    fn quantum_depends_on_fp_type() {
        // 32 lanes * 4 bytes / 4 bytes.
        assert_eq!(context(FloatingPointType::Float).align_quantum(), 32);
        // 32 lanes * 4 bytes / 8 bytes.
        assert_eq!(context(FloatingPointType::Double).align_quantum(), 16);
    }

    #[test]
    fn align_rounds_up_to_quantum() {
        let ctx = context(FloatingPointType::Float);
        assert_eq!(ctx.align(1), 32);
        assert_eq!(ctx.align(32), 32);
        assert_eq!(ctx.align(56), 64);
        assert_eq!(ctx.align(504), 512);
    }

    #[test]
    fn align_range_widens_outwards() {
        let ctx = context(FloatingPointType::Float);
        assert_eq!(ctx.align_range(0, 56), (0, 64));
        assert_eq!(ctx.align_range(33, 60), (32, 64));
        assert_eq!(ctx.align_range(32, 64), (32, 64));
    }

    proptest! {
        #[test]
        fn aligned_range_contains_the_original(begin in 0usize..512, len in 1usize..512) {
            let ctx = context(FloatingPointType::Float);
            let end = begin + len;
            let (a, b) = ctx.align_range(begin, end);
            prop_assert!(a <= begin);
            prop_assert!(b >= end);
            prop_assert_eq!(a % ctx.align_quantum(), 0);
            prop_assert_eq!(b % ctx.align_quantum(), 0);
        }

        #[test]
        fn align_is_idempotent(num in 0usize..4096) {
            let ctx = context(FloatingPointType::Double);
            let once = ctx.align(num);
            prop_assert_eq!(ctx.align(once), once);
            prop_assert!(once >= num);
        }
    }
}
