//! Thread-block occupancy policies.

use chainforge_common::Vm;

/// Decides how many chain instances one thread block executes.
pub trait ThreadBlockPolicy {
    /// Instances per block for a kernel of `num_threads` threads needing
    /// `mem_size_per_mult` shared-memory elements per instance.
    fn num_mults_per_block(
        &self,
        vm: &Vm,
        mem_size_per_mult: usize,
        num_threads: usize,
    ) -> usize;
}

/// Pack two instances into a block when a single warp suffices per
/// instance; otherwise one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleThreadBlockPolicy;

impl ThreadBlockPolicy for SimpleThreadBlockPolicy {
    fn num_mults_per_block(
        &self,
        _vm: &Vm,
        _mem_size_per_mult: usize,
        num_threads: usize,
    ) -> usize {
        if num_threads <= 32 {
            2
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use chainforge_common::{vm_factory, Backend};

    use super::*;

    #[test]
    fn narrow_kernels_double_up() {
        let vm = vm_factory("sm_60", Backend::Cuda).unwrap();
        let policy = SimpleThreadBlockPolicy;
        assert_eq!(policy.num_mults_per_block(&vm, 512, 32), 2);
        assert_eq!(policy.num_mults_per_block(&vm, 512, 64), 1);
    }
}
