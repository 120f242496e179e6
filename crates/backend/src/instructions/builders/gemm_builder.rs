//! Per-gemm lowering: loads, compute, store, barriers.

use chainforge_common::{Context, Error, GemmDescr, InternalError, MatrixId, MatrixPool, Result};

use crate::instructions::gemm::Gemm;
use crate::instructions::loaders::ShrMemLoad;
use crate::instructions::store::{StoreRegToGlb, StoreRegToShr};
use crate::instructions::{ClearRegisters, InstrId, Instruction, SyncThreads};
use crate::ir::Ir;
use crate::symbol::{ObjectRef, SymbolId, SymbolKind};

/// Lowers one gemm at a time, reusing shared-memory loads across the chain.
///
/// The reuse rule: a prior load of the same object is reused unless its
/// transposition disagrees with the current request. A straight patch that
/// must now be transposed is reloaded through a fresh symbol in a new
/// scope; a transposed patch that is now needed straight falls back to the
/// global-memory source without a reload.
pub struct GemmBuilder<'a> {
    context: &'a Context,
    pool: &'a MatrixPool,
    dest_regs: SymbolId,
    shr_mem: SymbolId,
    num_threads: usize,
    counter: usize,
    loaders_cache: Vec<(SymbolId, InstrId)>,
}

impl<'a> GemmBuilder<'a> {
    /// A builder writing through the given register tile and backing store.
    pub fn new(
        context: &'a Context,
        pool: &'a MatrixPool,
        dest_regs: SymbolId,
        shr_mem: SymbolId,
        num_threads: usize,
    ) -> Self {
        GemmBuilder {
            context,
            pool,
            dest_regs,
            shr_mem,
            num_threads,
            counter: 0,
            loaders_cache: Vec::new(),
        }
    }

    /// Append the full sequence of one gemm: operand loads, a barrier, the
    /// compute, a barrier, the store, a barrier, and a register clear.
    pub fn build(
        &mut self,
        ir: &mut Ir,
        op1: SymbolId,
        op2: SymbolId,
        dest_obj: MatrixId,
        descr: &GemmDescr,
    ) -> Result<()> {
        if ir.symbols[self.dest_regs].kind != SymbolKind::Register {
            return Err(Error::Internal(InternalError::WrongOperandKind {
                instr: "gemm-builder",
                operand: "reg_array",
                expected: "registers",
            }));
        }

        let mem_region_a = self.make_load_op1(ir, op1, descr)?;
        let mem_region_b = self.make_load_op2(ir, op2, descr)?;
        self.insert_sync_threads(ir);

        // Reads striding global memory benefit from aligned row ranges.
        let prefer_align = ir.symbols[mem_region_a].kind == SymbolKind::Global;
        let gemm = Gemm::build(
            self.context,
            self.pool,
            ir,
            descr.trans_a,
            descr.trans_b,
            mem_region_a,
            mem_region_b,
            self.dest_regs,
            prefer_align,
            self.num_threads,
        )?;
        ir.program.push(gemm);
        self.insert_sync_threads(ir);

        self.make_store(ir, dest_obj, descr)?;
        self.insert_sync_threads(ir);

        let clear = ClearRegisters::build(self.context, ir, self.dest_regs)?;
        ir.program.push(clear);
        Ok(())
    }

    fn make_load_op1(
        &mut self,
        ir: &mut Ir,
        op1: SymbolId,
        descr: &GemmDescr,
    ) -> Result<SymbolId> {
        match ir.symbols[op1].kind {
            SymbolKind::Global => {
                if descr.trans_a {
                    let (dest, load) = self.make_loader_and_symbol(ir, op1, true)?;
                    self.loaders_cache.push((dest, load));
                    ir.program.push(load);
                    Ok(dest)
                } else {
                    // The operand stays in global memory for the compute.
                    Ok(op1)
                }
            }
            SymbolKind::SharedMem => {
                let cached = self
                    .loaders_cache
                    .iter()
                    .find(|&&(dest, _)| dest == op1)
                    .map(|&(_, load)| load);
                let Some(loader_id) = cached else {
                    return Ok(op1);
                };
                let Instruction::LoadToShared(loader) = ir.instr(loader_id) else {
                    return Err(Error::Internal(InternalError::WrongOperandKind {
                        instr: "gemm-builder",
                        operand: "op1",
                        expected: "a cached shared-memory load",
                    }));
                };
                let loaded_transposed = loader.kind.is_transposed();
                let prev_src = loader.src;

                if descr.trans_a && !loaded_transposed {
                    // The straight patch cannot serve a transposed read;
                    // reload under a fresh name to avoid a clash.
                    ir.scopes.add_scope();
                    let (dest, load) = self.make_loader_and_symbol(ir, prev_src, true)?;
                    self.loaders_cache.push((dest, load));
                    ir.program.push(load);
                    Ok(dest)
                } else if !descr.trans_a && loaded_transposed {
                    // The transposed patch is useless for a straight read,
                    // but the source is still available in global memory.
                    Ok(prev_src)
                } else {
                    Ok(op1)
                }
            }
            _ => Err(Error::Internal(InternalError::WrongOperandKind {
                instr: "gemm-builder",
                operand: "op1",
                expected: "shr. or glb. mem.",
            })),
        }
    }

    fn make_load_op2(
        &mut self,
        ir: &mut Ir,
        op2: SymbolId,
        descr: &GemmDescr,
    ) -> Result<SymbolId> {
        match ir.symbols[op2].kind {
            SymbolKind::Global => {
                let (dest, load) = self.make_loader_and_symbol(ir, op2, descr.trans_b)?;
                self.loaders_cache.push((dest, load));
                ir.program.push(load);
                Ok(dest)
            }
            SymbolKind::SharedMem => Ok(op2),
            _ => Err(Error::Internal(InternalError::WrongOperandKind {
                instr: "gemm-builder",
                operand: "op2",
                expected: "shr. or glb. mem.",
            })),
        }
    }

    fn make_loader_and_symbol(
        &mut self,
        ir: &mut Ir,
        operand: SymbolId,
        is_transpose: bool,
    ) -> Result<(SymbolId, InstrId)> {
        let name = self.name_shr_region();
        let obj = ir.symbols[operand].obj;
        let dest = ir.declare_symbol(name, SymbolKind::SharedMem, obj)?;
        let load = ShrMemLoad::build(
            self.context,
            self.pool,
            ir,
            dest,
            operand,
            self.shr_mem,
            self.num_threads,
            is_transpose,
        )?;
        Ok((dest, load))
    }

    fn make_store(&mut self, ir: &mut Ir, dest_obj: MatrixId, descr: &GemmDescr) -> Result<()> {
        let obj = ObjectRef::Matrix(dest_obj);
        if let Some(dest_symbol) = ir.scopes.get(obj) {
            match ir.symbols[dest_symbol].kind {
                SymbolKind::SharedMem => {
                    let store = StoreRegToShr::build(
                        self.context,
                        self.pool,
                        ir,
                        self.dest_regs,
                        dest_symbol,
                        self.shr_mem,
                        self.num_threads,
                    )?;
                    ir.program.push(store);
                }
                SymbolKind::Global => {
                    let store = StoreRegToGlb::build(
                        self.context,
                        self.pool,
                        ir,
                        self.dest_regs,
                        dest_symbol,
                        descr.alpha.clone(),
                        descr.beta.clone(),
                        self.num_threads,
                    )?;
                    ir.program.push(store);
                }
                _ => {
                    return Err(Error::Internal(InternalError::WrongOperandKind {
                        instr: "gemm-builder",
                        operand: "res",
                        expected: "shr. or glb. mem.",
                    }))
                }
            }
        } else {
            if !self.pool[dest_obj].is_tmp() {
                return Err(Error::Internal(InternalError::UnboundResult));
            }
            let name = self.name_shr_region();
            let dest_symbol = ir.declare_symbol(name, SymbolKind::SharedMem, obj)?;
            let store = StoreRegToShr::build(
                self.context,
                self.pool,
                ir,
                self.dest_regs,
                dest_symbol,
                self.shr_mem,
                self.num_threads,
            )?;
            ir.program.push(store);
        }
        Ok(())
    }

    fn insert_sync_threads(&self, ir: &mut Ir) {
        let sync = ir.push_instr(Instruction::SyncThreads(SyncThreads {
            num_threads: self.num_threads,
        }));
        ir.program.push(sync);
    }

    fn name_shr_region(&mut self) -> String {
        let name = format!("_{}", self.counter);
        self.counter += 1;
        name
    }
}
