//! Small helpers shared between the generator and its instruction set.

use crate::basic_types::lexicon;
use crate::vm::Vm;

/// The 2-D block-id expression identifying one batch element:
/// `threadIdx.y + blockDim.y * blockIdx.x` in the backend's spelling.
#[must_use]
pub fn block_id_2d(vm: &Vm) -> String {
    format!(
        "{} + {} * {}",
        vm.lexic.thread_idx_y, vm.lexic.block_dim_y, vm.lexic.block_idx_x
    )
}

/// Name of the implicit host-supplied offset parameter of a symbol.
#[must_use]
pub fn extra_offset_name(symbol_name: &str) -> String {
    format!("{symbol_name}{}", lexicon::EXTRA_OFFSET_SUFFIX)
}

#[cfg(test)]
mod tests {
    use crate::vm::{vm_factory, Backend};

    use super::*;

    #[test]
    fn block_id_uses_the_backend_lexicon() {
        let vm = vm_factory("sm_60", Backend::Cuda).unwrap();
        assert_eq!(block_id_2d(&vm), "threadIdx.y + blockDim.y * blockIdx.x");

        let vm = vm_factory("gfx906", Backend::Hip).unwrap();
        assert_eq!(block_id_2d(&vm), "hipThreadIdx_y + hipBlockDim_y * hipBlockIdx_x");
    }

    #[test]
    fn offset_parameter_name() {
        assert_eq!(extra_offset_name("A"), "A_extraOffset");
    }
}
