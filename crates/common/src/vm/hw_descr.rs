//! Per-architecture hardware constants.

use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

use super::Backend;
use crate::error::GenerationError;

const KB: usize = 1024;
const NVIDIA_WARP: usize = 32;
const AMD_WAVEFRONT: usize = 64;

/// GPU vendor of an architecture entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Manufacturer {
    /// NVIDIA models (`sm_*`).
    Nvidia,
    /// AMD models (`gfx*`).
    Amd,
    /// Intel models.
    Intel,
}

/// Constants of one GPU architecture relevant to kernel generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwDescription {
    /// Hardware vector width in lanes (warp or wavefront size).
    pub vec_unit_length: usize,
    /// Word size in bytes the vector unit operates on.
    pub hw_fp_word_size: usize,
    /// Preferred global-memory access alignment in bytes.
    pub mem_access_align_size: usize,
    /// Shared/local memory available to one thread block, in bytes.
    pub max_local_mem_size_per_block: usize,
    /// Maximum threads of one block.
    pub max_threads_per_block: usize,
    /// Register file available to one block, in bytes.
    pub max_reg_per_block: usize,
    /// Maximum resident threads per multiprocessor.
    pub max_threads_per_sm: usize,
    /// Maximum resident blocks per multiprocessor.
    pub max_block_per_sm: usize,
    /// Vendor of the model.
    pub manufacturer: Manufacturer,
    /// Architecture model string, e.g. `sm_80`.
    pub model: String,
}

/// Resolve an architecture/backend pair to a hardware description.
///
/// `cuda` serves NVIDIA models only; `hip` serves NVIDIA and AMD models.
pub fn hw_descr_factory(arch: &str, backend: Backend) -> Result<HwDescription, GenerationError> {
    let unknown = || GenerationError::UnknownArch {
        backend: backend.to_string(),
        arch: arch.to_string(),
    };

    let descr = known_arch(arch).ok_or_else(unknown)?;
    match backend {
        Backend::Cuda if descr.manufacturer == Manufacturer::Nvidia => Ok(descr),
        Backend::Hip
            if matches!(descr.manufacturer, Manufacturer::Nvidia | Manufacturer::Amd) =>
        {
            Ok(descr)
        }
        _ => Err(unknown()),
    }
}

fn nvidia_base(model: &str) -> HwDescription {
    HwDescription {
        vec_unit_length: NVIDIA_WARP,
        hw_fp_word_size: 4,
        mem_access_align_size: 32,
        max_local_mem_size_per_block: 48 * KB,
        max_threads_per_block: 1024,
        max_reg_per_block: 64 * KB,
        max_threads_per_sm: 2048,
        max_block_per_sm: 32,
        manufacturer: Manufacturer::Nvidia,
        model: model.to_string(),
    }
}

fn amd_base(model: &str) -> HwDescription {
    HwDescription {
        vec_unit_length: AMD_WAVEFRONT,
        hw_fp_word_size: 4,
        mem_access_align_size: 32,
        max_local_mem_size_per_block: 64 * KB,
        max_threads_per_block: 1024,
        max_reg_per_block: 256 * KB,
        max_threads_per_sm: 40 * AMD_WAVEFRONT,
        max_block_per_sm: 40,
        manufacturer: Manufacturer::Amd,
        model: model.to_string(),
    }
}

fn intel_integrated(model: &str) -> HwDescription {
    HwDescription {
        vec_unit_length: 32,
        hw_fp_word_size: 4,
        mem_access_align_size: 32,
        max_local_mem_size_per_block: 48 * KB,
        max_threads_per_block: 256,
        max_reg_per_block: 64 * KB,
        max_threads_per_sm: 256,
        max_block_per_sm: 32,
        manufacturer: Manufacturer::Intel,
        model: model.to_string(),
    }
}

fn known_arch(arch: &str) -> Option<HwDescription> {
    let descr = match arch {
        "sm_60" | "sm_61" | "sm_62" | "sm_71" => nvidia_base(arch),
        "sm_70" => HwDescription {
            max_local_mem_size_per_block: 96 * KB,
            ..nvidia_base(arch)
        },
        "sm_75" => HwDescription {
            max_local_mem_size_per_block: 64 * KB,
            max_block_per_sm: 16,
            ..nvidia_base(arch)
        },
        "sm_80" => HwDescription {
            max_local_mem_size_per_block: 164 * KB,
            ..nvidia_base(arch)
        },
        "sm_86" => HwDescription {
            max_local_mem_size_per_block: 100 * KB,
            max_block_per_sm: 16,
            max_threads_per_sm: 1536,
            ..nvidia_base(arch)
        },
        "sm_90" => HwDescription {
            max_local_mem_size_per_block: 228 * KB,
            ..nvidia_base(arch)
        },
        "gfx906" => amd_base(arch),
        "gfx908" | "gfx90a" => HwDescription {
            max_reg_per_block: 512 * KB,
            ..amd_base(arch)
        },
        "dg1" => HwDescription {
            vec_unit_length: 64,
            hw_fp_word_size: 4,
            mem_access_align_size: 32,
            max_local_mem_size_per_block: 64 * KB,
            max_threads_per_block: 512,
            max_reg_per_block: 64 * KB,
            max_threads_per_sm: 512,
            max_block_per_sm: 64,
            manufacturer: Manufacturer::Intel,
            model: arch.to_string(),
        },
        "bdw" | "skl" | "Gen8" | "Gen9" | "Gen11" | "Gen12LP" => intel_integrated(arch),
        _ => return None,
    };
    Some(descr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warp_sizes_follow_the_vendor() {
        let sm = hw_descr_factory("sm_80", Backend::Cuda).unwrap();
        assert_eq!(sm.vec_unit_length, 32);
        assert_eq!(sm.manufacturer, Manufacturer::Nvidia);

        let gfx = hw_descr_factory("gfx90a", Backend::Hip).unwrap();
        assert_eq!(gfx.vec_unit_length, 64);
        assert_eq!(gfx.max_reg_per_block, 512 * KB);
    }

    #[test]
    fn shared_memory_budget_grows_with_generation() {
        let sm60 = known_arch("sm_60").unwrap();
        let sm90 = known_arch("sm_90").unwrap();
        assert!(sm90.max_local_mem_size_per_block > sm60.max_local_mem_size_per_block);
    }

    #[test]
    fn unknown_model_is_rejected() {
        assert!(hw_descr_factory("sm_999", Backend::Cuda).is_err());
        assert!(hw_descr_factory("dg1", Backend::Cuda).is_err());
    }
}
