//! Whole-kernel builders.
//!
//! Both variants share the prologue (per-batch pointer setup) and the
//! per-gemm body; they differ in how many threads cover the output rows
//! and in the register-tile shape.

use chainforge_common::{Context, GemmDescr, MatrixPool, Result};

use crate::data_types::{RegMemId, ShrMemId};
use crate::ir::Ir;
use crate::symbol::ObjectRef;

use super::alloc_builder::{RegistersAllocBuilder, ShrMemAllocBuilder};
use super::gemm_builder::GemmBuilder;
use super::ptr_builder::build_get_element_ptr;

/// Kernel flavor selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelType {
    /// Let the builder pick; currently resolves to [`KernelType::Default`].
    #[default]
    Auto,
    /// One thread per output row, `num_threads = align(max m)`.
    Default,
    /// A single warp sweeping the rows, tile shape
    /// `[ceil(max m / warp), max n]`.
    SingleWarp,
}

/// Lowers a gemm list into a complete kernel body.
pub struct KernelBuilder<'a> {
    context: &'a Context,
    pool: &'a MatrixPool,
    gemm_list: &'a [GemmDescr],
    kind: KernelType,
    num_threads: usize,
    accumulator: (usize, usize),
    reg_obj: Option<RegMemId>,
    shr_obj: Option<ShrMemId>,
}

impl<'a> KernelBuilder<'a> {
    /// A builder for the requested kernel type; `Auto` resolves to the
    /// default wide kernel.
    pub fn new(
        context: &'a Context,
        pool: &'a MatrixPool,
        gemm_list: &'a [GemmDescr],
        requested: KernelType,
    ) -> Self {
        let kind = match requested {
            KernelType::Auto | KernelType::Default => KernelType::Default,
            KernelType::SingleWarp => KernelType::SingleWarp,
        };
        KernelBuilder {
            context,
            pool,
            gemm_list,
            kind,
            num_threads: 0,
            accumulator: (0, 0),
            reg_obj: None,
            shr_obj: None,
        }
    }

    /// Run prologue, allocations, and the per-gemm bodies.
    pub fn build(&mut self, ir: &mut Ir) -> Result<()> {
        self.num_threads = self.deduce_num_threads();
        self.accumulator = self.deduce_accumulator_size();

        self.build_prologue(ir)?;
        self.build_kernel(ir)
    }

    fn build_prologue(&mut self, ir: &mut Ir) -> Result<()> {
        ir.scopes.add_scope();
        let globals: Vec<_> = ir.scopes.global().iter().map(|&(_, symbol)| symbol).collect();
        for symbol in globals {
            let instr = build_get_element_ptr(self.context, self.pool, ir, symbol)?;
            ir.program.push(instr);
        }
        Ok(())
    }

    fn build_kernel(&mut self, ir: &mut Ir) -> Result<()> {
        let (rows, cols) = self.accumulator;

        let mut reg_builder = RegistersAllocBuilder::new();
        let (reg_obj, instr) = reg_builder.build(self.context, ir, rows, cols, Some(0.0))?;
        ir.program.push(instr);
        self.reg_obj = Some(reg_obj);

        let mut shr_builder = ShrMemAllocBuilder::new();
        let (shr_obj, instr) = shr_builder.build(self.context, ir)?;
        ir.program.push(instr);
        self.shr_obj = Some(shr_obj);

        ir.scopes.add_scope();
        let reg_symbol = ir.resolve(ObjectRef::Reg(reg_obj))?;
        let shr_symbol = ir.resolve(ObjectRef::ShrMem(shr_obj))?;
        let mut gemm_builder = GemmBuilder::new(
            self.context,
            self.pool,
            reg_symbol,
            shr_symbol,
            self.num_threads,
        );
        for descr in self.gemm_list {
            let op1 = ir.resolve(ObjectRef::Matrix(descr.mat_a))?;
            let op2 = ir.resolve(ObjectRef::Matrix(descr.mat_b))?;
            gemm_builder.build(ir, op1, op2, descr.mat_c, descr)?;
        }
        Ok(())
    }

    fn deduce_num_threads(&self) -> usize {
        match self.kind {
            KernelType::Auto | KernelType::Default => self
                .gemm_list
                .iter()
                .map(|gemm| gemm.num_threads(self.context).0)
                .max()
                .unwrap_or(0),
            KernelType::SingleWarp => self.context.vm().hw_descr.vec_unit_length,
        }
    }

    fn deduce_accumulator_size(&self) -> (usize, usize) {
        let cols = self
            .gemm_list
            .iter()
            .map(GemmDescr::accumulator_size)
            .max()
            .unwrap_or(0);
        match self.kind {
            KernelType::Auto | KernelType::Default => (1, cols),
            KernelType::SingleWarp => {
                let max_rows = self
                    .gemm_list
                    .iter()
                    .map(|gemm| gemm.num_threads(self.context).1)
                    .max()
                    .unwrap_or(0);
                (max_rows.div_ceil(self.num_threads), cols)
            }
        }
    }

    /// Threads covering one chain instance.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Register-tile shape `(rows, cols)`.
    pub fn accumulator_size(&self) -> (usize, usize) {
        self.accumulator
    }

    /// The register-tile object, once built.
    pub fn reg_obj(&self) -> Option<RegMemId> {
        self.reg_obj
    }

    /// The backing-store object, once built.
    pub fn shr_obj(&self) -> Option<ShrMemId> {
        self.shr_obj
    }

    /// The kernel flavor the builder settled on.
    pub fn selected_kernel_type(&self) -> KernelType {
        self.kind
    }
}
