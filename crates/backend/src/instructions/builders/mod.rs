//! Stateful factories appending well-formed IR sequences.

pub mod alloc_builder;
pub mod gemm_builder;
pub mod kernels;
pub mod ptr_builder;

pub use alloc_builder::{RegistersAllocBuilder, ShrMemAllocBuilder};
pub use gemm_builder::GemmBuilder;
pub use kernels::{KernelBuilder, KernelType};
pub use ptr_builder::build_get_element_ptr;
