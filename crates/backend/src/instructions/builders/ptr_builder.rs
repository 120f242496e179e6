//! Batch-pointer prologue builder.

use chainforge_common::{Context, Error, InternalError, MatrixPool, Result};

use crate::instructions::ptr_manip::GetElementPtr;
use crate::instructions::InstrId;
use crate::ir::Ir;
use crate::symbol::{SymbolId, SymbolKind};

/// Bind the per-batch global pointer of one batch symbol, introducing the
/// `glb<name>` symbol in the current scope.
pub fn build_get_element_ptr(
    context: &Context,
    pool: &MatrixPool,
    ir: &mut Ir,
    src: SymbolId,
) -> Result<InstrId> {
    if ir.symbols[src].kind != SymbolKind::Batch {
        return Err(Error::Internal(InternalError::WrongOperandKind {
            instr: "ptr-builder",
            operand: "src",
            expected: "a batch",
        }));
    }
    let name = format!("glb{}", ir.symbols[src].name);
    let obj = ir.symbols[src].obj;
    let dest = ir.declare_symbol(name, SymbolKind::Global, obj)?;
    GetElementPtr::build(context, pool, ir, src, dest)
}
