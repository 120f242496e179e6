//! Register-tile and shared-memory declarations.

use chainforge_common::{Context, Error, InternalError, Result};

use crate::ir::Ir;
use crate::symbol::{DataView, ObjectRef, SymbolId, SymbolKind};
use crate::writer::Writer;

use super::{InstrId, Instruction};

/// Declares the per-thread register tile, optionally initialized.
#[derive(Debug, Clone)]
pub struct RegisterAlloc {
    /// The register-tile symbol.
    pub dest: SymbolId,
    /// Tile rows.
    pub rows: usize,
    /// Tile columns.
    pub cols: usize,
    /// Initial element value; `None` leaves the tile uninitialized.
    pub init_value: Option<f64>,
}

impl RegisterAlloc {
    /// Attach the tile view and append to the arena.
    pub fn build(
        _context: &Context,
        ir: &mut Ir,
        dest: SymbolId,
        rows: usize,
        cols: usize,
        init_value: Option<f64>,
    ) -> Result<InstrId> {
        if ir.symbols[dest].kind != SymbolKind::Register {
            return Err(Error::Internal(InternalError::WrongOperandKind {
                instr: "alloc_regs",
                operand: "dest",
                expected: "registers",
            }));
        }
        ir.symbols[dest].data_view = Some(DataView::new(rows, cols, false));
        let id = ir.push_instr(Instruction::RegisterAlloc(RegisterAlloc {
            dest,
            rows,
            cols,
            init_value,
        }));
        ir.add_user(dest, id);
        Ok(id)
    }

    pub(crate) fn render(&self, context: &Context, ir: &Ir, writer: &mut Writer) -> Result<()> {
        let name = &ir.symbols[self.dest].name;
        let init = match self.init_value {
            Some(value) => {
                let literal = format!("{value:?}{}", context.fp_type().literal_suffix());
                let row = format!("{{{}}}", vec![literal; self.cols].join(", "));
                format!(" = {{{}}}", vec![row; self.rows].join(", "))
            }
            None => String::new(),
        };
        writer.line(format!(
            "{} {name}[{}][{}]{init};",
            context.fp_as_str(),
            self.rows,
            self.cols
        ));
        Ok(())
    }
}

/// Declares the block-wide shared-memory backing store and binds the
/// per-instance base pointer at `&backing[size_per_mult * threadIdx.y]`.
///
/// Deferred ready: emission is legal only after the optimizer fixed the
/// per-instance size and the thread-block policy fixed the instance count.
#[derive(Debug, Clone)]
pub struct ShrMemAlloc {
    /// The backing-store symbol.
    pub dest: SymbolId,
}

impl ShrMemAlloc {
    const ALIGNMENT: usize = 8;

    /// Append to the arena; the extents stay open.
    pub fn build(ir: &mut Ir, dest: SymbolId) -> Result<InstrId> {
        if ir.symbols[dest].kind != SymbolKind::SharedMem {
            return Err(Error::Internal(InternalError::WrongOperandKind {
                instr: "alloc_shr",
                operand: "dest",
                expected: "shared mem.",
            }));
        }
        let id = ir.push_instr(Instruction::ShrMemAlloc(ShrMemAlloc { dest }));
        ir.add_user(dest, id);
        Ok(id)
    }

    pub(crate) fn is_ready(&self, ir: &Ir) -> bool {
        self.object(ir).is_some_and(|obj| {
            let obj = &ir.shr_objects[obj.index()];
            obj.size_per_mult().is_some() && obj.mults_per_block().is_some()
        })
    }

    fn object(&self, ir: &Ir) -> Option<crate::data_types::ShrMemId> {
        match ir.symbols[self.dest].obj {
            ObjectRef::ShrMem(id) => Some(id),
            _ => None,
        }
    }

    pub(crate) fn render(&self, context: &Context, ir: &Ir, writer: &mut Writer) -> Result<()> {
        let missing = || {
            Error::Internal(InternalError::WrongOperandKind {
                instr: "alloc_shr",
                operand: "dest",
                expected: "a shared mem. object",
            })
        };
        let obj = &ir.shr_objects[self.object(ir).ok_or_else(missing)?.index()];
        let total_size = obj
            .total_size()
            .ok_or_else(|| chainforge_common::GenerationError::NotReady(format!(
                "{} = alloc_shr;",
                obj.name()
            )))?;
        let size_per_mult = obj.size_per_mult().unwrap_or(0);

        let lexic = &context.vm().lexic;
        let fp = context.fp_as_str();
        let backing = format!("total_{}", obj.name());
        writer.line(format!(
            "{} __align__({}) {fp} {backing}[{total_size}];",
            lexic.shr_mem_kw,
            Self::ALIGNMENT
        ));
        writer.line(format!(
            "{fp} * {} = &{backing}[{size_per_mult} * {}];",
            obj.name(),
            lexic.thread_idx_y
        ));
        Ok(())
    }
}
