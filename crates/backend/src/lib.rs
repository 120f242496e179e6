//! Kernel synthesis backend of the ChainForge gemm-chain generator.
//!
//! The pipeline: a list of gemm descriptors is lowered by the kernel
//! builders into a flat instruction program, the optimizer assigns shared
//! memory and minimal synchronization, and the emitter renders the kernel,
//! its launcher, and a header declaration.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

pub mod data_types;
pub mod generator;
pub mod instructions;
pub mod ir;
pub mod opt;
pub mod scopes;
pub mod symbol;
pub mod thread_block;
pub mod writer;

pub use data_types::*;
pub use generator::*;
pub use instructions::builders::kernels::KernelType;
pub use ir::*;
pub use scopes::*;
pub use symbol::*;
pub use thread_block::*;
pub use writer::*;
