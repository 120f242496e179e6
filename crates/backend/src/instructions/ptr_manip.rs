//! Batch-pointer setup.

use chainforge_common::aux::{block_id_2d, extra_offset_name};
use chainforge_common::{
    Addressing, Context, DataFlowDirection, Error, InternalError, MatrixPool, Result,
};

use crate::ir::Ir;
use crate::symbol::{DataView, ObjectRef, SymbolId, SymbolKind};
use crate::writer::Writer;

/// Binds a restricted per-batch pointer whose address follows the matrix
/// addressing mode. Attaches a data view mirroring the source bounding box
/// to the destination.
#[derive(Debug, Clone)]
pub struct GetElementPtr {
    /// The batch parameter symbol.
    pub src: SymbolId,
    /// The global-memory pointer symbol being bound.
    pub dest: SymbolId,
}

impl GetElementPtr {
    /// Validate operands, attach the view, and append to the arena.
    pub fn build(
        _context: &Context,
        pool: &MatrixPool,
        ir: &mut Ir,
        src: SymbolId,
        dest: SymbolId,
    ) -> Result<InstrId> {
        if ir.symbols[src].kind != SymbolKind::Batch {
            return Err(wrong_kind("src", "a batch"));
        }
        let ObjectRef::Matrix(matrix_id) = ir.symbols[src].obj else {
            return Err(wrong_kind("src", "a matrix"));
        };
        if ir.symbols[dest].kind != SymbolKind::Global {
            return Err(wrong_kind("dest", "global mem."));
        }
        if !matches!(ir.symbols[dest].obj, ObjectRef::Matrix(_)) {
            return Err(wrong_kind("dest", "a matrix"));
        }

        let matrix = &pool[matrix_id];
        ir.symbols[dest].data_view = Some(DataView::with_bbox(
            matrix.num_rows(),
            matrix.num_cols(),
            false,
            matrix.bbox(),
        ));

        let id = ir.push_instr(super::Instruction::GetElementPtr(GetElementPtr { src, dest }));
        ir.add_user(src, id);
        ir.add_user(dest, id);
        Ok(id)
    }

    pub(crate) fn render(
        &self,
        context: &Context,
        pool: &MatrixPool,
        ir: &Ir,
        writer: &mut Writer,
    ) -> Result<()> {
        let src = &ir.symbols[self.src];
        let dest = &ir.symbols[self.dest];
        let ObjectRef::Matrix(matrix_id) = src.obj else {
            return Err(wrong_kind("src", "a matrix"));
        };
        let matrix = &pool[matrix_id];

        let batch_id = block_id_2d(context.vm());
        let extra_offset = extra_offset_name(&src.name);
        let address = match matrix.addressing() {
            Addressing::Strided => {
                format!("({batch_id}) * {} + {extra_offset}", matrix.real_volume())
            }
            // A two-level dereference, rendered literally.
            Addressing::PtrBased => format!("{batch_id}][{extra_offset}"),
            Addressing::None => "0".to_string(),
        };

        let constness = if matrix.direction() == Some(DataFlowDirection::Source) {
            "const "
        } else {
            ""
        };
        let lexic = &context.vm().lexic;
        writer.line(format!(
            "{constness}{} * const {} {} = &{}[{address}];",
            context.fp_as_str(),
            lexic.restrict_kw,
            dest.name,
            src.name
        ));
        Ok(())
    }
}

use super::InstrId;

fn wrong_kind(operand: &'static str, expected: &'static str) -> Error {
    Error::Internal(InternalError::WrongOperandKind { instr: "ptr", operand, expected })
}
