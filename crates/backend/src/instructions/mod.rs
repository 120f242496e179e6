//! The IR instruction set.
//!
//! Each variant carries its operand symbols and renders itself. The render
//! contract: produce GPU-C text in the backend lexicon, assuming the outer
//! batch-index and flag guards are already emitted by the kernel wrapper.

pub mod allocate;
pub mod builders;
pub mod clear_registers;
pub mod gemm;
pub mod loaders;
pub mod ptr_manip;
pub mod store;
pub mod sync_threads;

use chainforge_common::{Context, Lexic, MatrixPool, Result};

pub use allocate::{RegisterAlloc, ShrMemAlloc};
pub use clear_registers::ClearRegisters;
pub use gemm::Gemm;
pub use loaders::{ShrMemLoad, ShrMemLoadKind};
pub use ptr_manip::GetElementPtr;
pub use store::{LoadGlbToReg, StoreRegToGlb, StoreRegToShr};
pub use sync_threads::SyncThreads;

use crate::ir::Ir;
use crate::symbol::SymbolId;
use crate::writer::Writer;

/// Handle of an instruction inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(usize);

impl InstrId {
    pub(crate) const fn new(index: usize) -> Self {
        InstrId(index)
    }

    /// Position inside the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// One IR node.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Bind a per-batch global pointer from a batch parameter.
    GetElementPtr(GetElementPtr),
    /// Copy a matrix patch from global to shared memory.
    LoadToShared(ShrMemLoad),
    /// Accumulate one matrix product into the register tile.
    Gemm(Gemm),
    /// Write the register tile to a shared-memory patch.
    StoreRegToShr(StoreRegToShr),
    /// Write the register tile back to global memory.
    StoreRegToGlb(StoreRegToGlb),
    /// Preload `beta * C` into the register tile.
    LoadGlbToReg(LoadGlbToReg),
    /// Zero the register tile.
    ClearRegisters(ClearRegisters),
    /// A block- or warp-wide barrier.
    SyncThreads(SyncThreads),
    /// Declare the register tile.
    RegisterAlloc(RegisterAlloc),
    /// Declare the shared-memory backing store.
    ShrMemAlloc(ShrMemAlloc),
}

impl Instruction {
    /// Whether the instruction may be emitted. Shared-memory writes become
    /// ready once the optimizer assigned their region offset; the shared
    /// allocation once both of its extents are known.
    pub fn is_ready(&self, ir: &Ir) -> bool {
        match self {
            Instruction::LoadToShared(load) => load.shr_mem_offset.is_some(),
            Instruction::StoreRegToShr(store) => store.shr_mem_offset.is_some(),
            Instruction::ShrMemAlloc(alloc) => alloc.is_ready(ir),
            _ => true,
        }
    }

    /// Render the instruction into `writer`.
    pub fn render(
        &self,
        context: &Context,
        pool: &MatrixPool,
        ir: &Ir,
        writer: &mut Writer,
    ) -> Result<()> {
        match self {
            Instruction::GetElementPtr(instr) => instr.render(context, pool, ir, writer),
            Instruction::LoadToShared(instr) => instr.render(context, ir, writer),
            Instruction::Gemm(instr) => instr.render(context, ir, writer),
            Instruction::StoreRegToShr(instr) => instr.render(context, ir, writer),
            Instruction::StoreRegToGlb(instr) => instr.render(context, ir, writer),
            Instruction::LoadGlbToReg(instr) => instr.render(context, ir, writer),
            Instruction::ClearRegisters(instr) => instr.render(context, ir, writer),
            Instruction::SyncThreads(instr) => {
                instr.render(context, writer);
                Ok(())
            }
            Instruction::RegisterAlloc(instr) => instr.render(context, ir, writer),
            Instruction::ShrMemAlloc(instr) => instr.render(context, ir, writer),
        }
    }

    /// A short textual form for diagnostics and error messages.
    pub fn descr(&self, ir: &Ir) -> String {
        let name = |symbol: SymbolId| ir.symbols[symbol].name.clone();
        match self {
            Instruction::GetElementPtr(i) => {
                format!("{} = getelementptr_b2g {};", name(i.dest), name(i.src))
            }
            Instruction::LoadToShared(i) => format!(
                "{} = {} {}, {};",
                name(i.dest),
                i.kind.mnemonic(),
                name(i.shr_mem),
                name(i.src)
            ),
            Instruction::Gemm(i) => {
                format!("{} = gemm {}, {};", name(i.dest), name(i.op1), name(i.op2))
            }
            Instruction::StoreRegToShr(i) => {
                format!("{} = store_r2s {}, {};", name(i.dest), name(i.shr_mem), name(i.src))
            }
            Instruction::StoreRegToGlb(i) => {
                format!("{} = store_r2g {};", name(i.dest), name(i.src))
            }
            Instruction::LoadGlbToReg(i) => {
                format!("{} = load_g2r {};", name(i.dest), name(i.src))
            }
            Instruction::ClearRegisters(i) => format!("clear_regs {};", name(i.src)),
            Instruction::SyncThreads(_) => "sync_threads;".to_string(),
            Instruction::RegisterAlloc(i) => {
                format!("{} = alloc_regs [{}][{}];", name(i.dest), i.rows, i.cols)
            }
            Instruction::ShrMemAlloc(i) => format!("{} = alloc_shr;", name(i.dest)),
        }
    }

    /// The shared-memory symbol this instruction defines, if any.
    pub fn shr_mem_write_dest(&self) -> Option<SymbolId> {
        match self {
            Instruction::LoadToShared(load) => Some(load.dest),
            Instruction::StoreRegToShr(store) => Some(store.dest),
            _ => None,
        }
    }

    /// Elements this shared-memory write occupies, aligned when the user
    /// options ask for it. `None` for non-writes.
    pub fn compute_shared_mem_size(&self, context: &Context) -> Option<usize> {
        let volume = match self {
            Instruction::LoadToShared(load) => load.shm_volume,
            Instruction::StoreRegToShr(store) => store.shm_volume,
            _ => return None,
        };
        if context.user_options().align_shr_mem {
            Some(context.align(volume))
        } else {
            Some(volume)
        }
    }

    /// Hand a shared-memory write its region offset, making it ready.
    pub fn set_shr_mem_offset(&mut self, offset: usize) {
        match self {
            Instruction::LoadToShared(load) => load.shr_mem_offset = Some(offset),
            Instruction::StoreRegToShr(store) => store.shr_mem_offset = Some(offset),
            _ => {}
        }
    }
}

/// The `if (threadIdx.x < n)` guard limiting a statement to active threads.
pub(crate) fn mask_threads(lexic: &Lexic, num_threads: usize) -> String {
    format!("if ({} < {num_threads})", lexic.thread_idx_x)
}

/// A guard limiting `threadIdx.x` to the half-open row range `[begin, end)`.
pub(crate) fn range_mask_threads(lexic: &Lexic, begin: usize, end: usize) -> String {
    range_guard(lexic.thread_idx_x, begin, end)
}

/// A guard limiting an arbitrary row expression to `[begin, end)`.
pub(crate) fn range_guard(var: &str, begin: usize, end: usize) -> String {
    if begin == 0 {
        format!("if ({var} < {end})")
    } else {
        format!("if ({var} >= {begin} && {var} < {end})")
    }
}
