//! The virtual machine model: per-architecture hardware constants paired
//! with the per-backend source lexicon.

pub mod hw_descr;
pub mod lexic;

use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

pub use hw_descr::{hw_descr_factory, HwDescription, Manufacturer};
pub use lexic::Lexic;

use crate::error::GenerationError;

/// Target GPU programming backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    /// NVIDIA CUDA.
    Cuda,
    /// AMD HIP (also serves NVIDIA models).
    Hip,
}

/// A hardware description together with the lexicon used to spell kernels
/// for it.
#[derive(Debug, Clone)]
pub struct Vm {
    /// Per-architecture constants.
    pub hw_descr: HwDescription,
    /// Per-backend source vocabulary.
    pub lexic: Lexic,
}

/// Build a [`Vm`] for an architecture/backend pair.
pub fn vm_factory(arch: &str, backend: Backend) -> Result<Vm, GenerationError> {
    let descr = hw_descr_factory(arch, backend)?;
    Ok(Vm { hw_descr: descr, lexic: Lexic::new(backend) })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn backend_parses_from_lowercase() {
        assert_eq!(Backend::from_str("cuda").unwrap(), Backend::Cuda);
        assert_eq!(Backend::from_str("hip").unwrap(), Backend::Hip);
        assert!(Backend::from_str("oneapi").is_err());
    }

    #[test]
    fn vm_factory_rejects_amd_arch_on_cuda() {
        assert!(vm_factory("gfx906", Backend::Cuda).is_err());
        assert!(vm_factory("gfx906", Backend::Hip).is_ok());
        assert!(vm_factory("sm_70", Backend::Cuda).is_ok());
    }
}
