//! Zeroing of the register tile between chain steps.

use chainforge_common::{Context, Error, InternalError, Result};

use crate::ir::Ir;
use crate::symbol::{ObjectRef, SymbolId, SymbolKind};
use crate::writer::Writer;

use super::{InstrId, Instruction};

/// Nested loops zeroing the tile. The optimizer drops the instance at the
/// program tail and the one collapsed into a [`LoadGlbToReg`](super::LoadGlbToReg).
#[derive(Debug, Clone)]
pub struct ClearRegisters {
    /// The register-tile symbol.
    pub src: SymbolId,
}

impl ClearRegisters {
    /// Validate the operand and append to the arena.
    pub fn build(_context: &Context, ir: &mut Ir, src: SymbolId) -> Result<InstrId> {
        if ir.symbols[src].kind != SymbolKind::Register {
            return Err(Error::Internal(InternalError::WrongOperandKind {
                instr: "clear_regs",
                operand: "src",
                expected: "registers",
            }));
        }
        let id = ir.push_instr(Instruction::ClearRegisters(ClearRegisters { src }));
        ir.add_user(src, id);
        Ok(id)
    }

    pub(crate) fn render(&self, context: &Context, ir: &Ir, writer: &mut Writer) -> Result<()> {
        let symbol = &ir.symbols[self.src];
        let ObjectRef::Reg(obj) = symbol.obj else {
            return Err(Error::Internal(InternalError::WrongOperandKind {
                instr: "clear_regs",
                operand: "src",
                expected: "a register object",
            }));
        };
        let tile = &ir.reg_objects[obj.index()];
        let unroll = context.user_options().unroll_factor;

        writer.new_line();
        writer.line("// clear registers");
        writer.pragma_unroll(unroll);
        writer.block(&format!("for (int i = 0; i < {}; ++i)", tile.rows), |writer| {
            writer.pragma_unroll(unroll);
            writer.block(&format!("for (int j = 0; j < {}; ++j)", tile.cols), |writer| {
                writer.line(format!(
                    "{}[i][j] = 0.0{};",
                    symbol.name,
                    context.fp_type().literal_suffix()
                ));
            });
        });
        Ok(())
    }
}
