//! The matrix-product instruction.

use chainforge_common::{
    BoundingBox, Context, Error, GenerationError, InternalError, MatrixPool, Result,
};

use crate::ir::Ir;
use crate::symbol::{DataView, ObjectRef, SymbolId, SymbolKind};
use crate::writer::Writer;

use super::{mask_threads, InstrId, Instruction};

/// Accumulates `op1 x op2` into the register tile.
///
/// The outer loop sweeps the `m` dimension in chunks of `num_threads`; each
/// thread reads one `op1` element per `k` step and accumulates `n` columns
/// into its tile row. When `op2` is not stored in the requested layout, it
/// is transposed on the read.
#[derive(Debug, Clone)]
pub struct Gemm {
    /// Whether the first operand is requested transposed.
    pub trans_a: bool,
    /// Whether the second operand is requested transposed.
    pub trans_b: bool,
    /// First operand, in shared or global memory.
    pub op1: SymbolId,
    /// Second operand, in shared or global memory.
    pub op2: SymbolId,
    /// The register-tile accumulator.
    pub dest: SymbolId,
    /// Whether the `m` row range of `op1` was widened to aligned bounds.
    pub prefer_align: bool,
    /// Whether `op1` reads are software-prefetched.
    pub prefetch: bool,
    /// Threads cooperating on one chain instance.
    pub num_threads: usize,
    op1_view: DataView,
    op2_view: DataView,
    n_range: usize,
    layout_as_requested: bool,
    meta: Option<String>,
}

impl Gemm {
    /// Validate operands, derive loop ranges, attach the accumulator view,
    /// and append to the arena.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        context: &Context,
        _pool: &MatrixPool,
        ir: &mut Ir,
        trans_a: bool,
        trans_b: bool,
        op1: SymbolId,
        op2: SymbolId,
        dest: SymbolId,
        prefer_align: bool,
        num_threads: usize,
    ) -> Result<InstrId> {
        if ir.symbols[dest].kind != SymbolKind::Register {
            return Err(wrong_kind("dest", "registers"));
        }
        if !matches!(ir.symbols[op1].obj, ObjectRef::Matrix(_)) {
            return Err(wrong_kind("op1", "a matrix"));
        }
        if !matches!(ir.symbols[op2].obj, ObjectRef::Matrix(_)) {
            return Err(wrong_kind("op2", "a matrix"));
        }

        let mut op1_view = cloned_view(ir, op1)?;
        let op2_view = cloned_view(ir, op2)?;

        if op1_view.is_transposed != trans_a {
            return Err(Error::Generation(GenerationError::LayoutMismatch));
        }

        let layout_as_requested = op2_view.is_transposed == trans_b;
        let n_range = if layout_as_requested {
            op2_view.dim_size(1)
        } else {
            op2_view.dim_size(0)
        };

        // `op1` carries the requested layout already; `op2` may be read
        // transposed, hence the projection switch.
        if context.user_options().exact_contraction_length {
            let k_op1 = op1_view.dim_size(1);
            let k_op2 = if layout_as_requested {
                op2_view.dim_size(0)
            } else {
                op2_view.dim_size(1)
            };
            if k_op1 != k_op2 {
                return Err(Error::Generation(GenerationError::ContractionMismatch {
                    op1: k_op1,
                    op2: k_op2,
                }));
            }
        }

        let ObjectRef::Reg(reg_id) = ir.symbols[dest].obj else {
            return Err(wrong_kind("dest", "a register object"));
        };
        let accumulator_cols = ir.reg_objects[reg_id.index()].cols;
        let op2_columns = op2_view.dim_size(1);
        if op2_columns > accumulator_cols {
            return Err(Error::Internal(InternalError::AccumulatorTooSmall {
                have: accumulator_cols,
                need: op2_columns,
            }));
        }

        let m_range = op1_view.dim_size(0);
        let mut num_dirty_rows = 0;
        let mut meta = None;
        if prefer_align {
            let bbox = op1_view.bbox();
            let (aligned_begin, aligned_end) =
                context.align_range(bbox.first_row, bbox.last_row);
            let aligned_end = aligned_end.min(op1_view.lead_dim());
            op1_view.reset_bbox(BoundingBox::new(
                aligned_begin,
                bbox.first_col,
                aligned_end,
                bbox.last_col,
            ));
            num_dirty_rows = bbox.first_row - aligned_begin;
            if aligned_begin != bbox.first_row || aligned_end != bbox.last_row {
                meta = Some(format!(
                    "gemm aligned along `m` dim: from [{}, {}] to [{aligned_begin}, \
                     {aligned_end}]; num. dirty rows in `result`: {num_dirty_rows}",
                    bbox.first_row, bbox.last_row
                ));
            }
        }

        ir.symbols[dest].data_view = Some(DataView::with_bbox(
            op1_view.dim_size(0),
            n_range,
            false,
            BoundingBox::new(num_dirty_rows, 0, num_dirty_rows + m_range, n_range),
        ));

        let prefetch =
            ir.symbols[op1].kind == SymbolKind::Global && context.user_options().prefetch_gemm;

        let id = ir.push_instr(Instruction::Gemm(Gemm {
            trans_a,
            trans_b,
            op1,
            op2,
            dest,
            prefer_align,
            prefetch,
            num_threads,
            op1_view,
            op2_view,
            n_range,
            layout_as_requested,
            meta,
        }));
        ir.add_user(op1, id);
        ir.add_user(op2, id);
        ir.add_user(dest, id);
        Ok(id)
    }

    pub(crate) fn render(&self, context: &Context, ir: &Ir, writer: &mut Writer) -> Result<()> {
        let op1_name = &ir.symbols[self.op1].name;
        let op2_name = &ir.symbols[self.op2].name;
        let dest_name = &ir.symbols[self.dest].name;
        let ObjectRef::Reg(reg_id) = ir.symbols[self.dest].obj else {
            return Err(wrong_kind("dest", "a register object"));
        };
        let tile_rows = ir.reg_objects[reg_id.index()].rows;

        writer.new_line();
        writer.line(format!("// gemm: {op1_name} x {op2_name}"));
        if let Some(meta) = &self.meta {
            writer.line(format!("// meta: {meta}"));
        }

        let lexic = &context.vm().lexic;
        let m_total = self.op1_view.dim_size(0);
        if tile_rows == 1 {
            writer.block(&mask_threads(lexic, m_total), |writer| {
                self.render_k_loop(context, writer, op1_name, op2_name, dest_name, lexic.thread_idx_x, "0");
            });
        } else {
            // One warp sweeps the rows of the tile.
            writer.block(&format!("for (int c = 0; c < {tile_rows}; ++c)"), |writer| {
                writer.line(format!(
                    "int t = {} + c * {};",
                    lexic.thread_idx_x, self.num_threads
                ));
                writer.block(&format!("if (t >= {m_total})"), |writer| {
                    writer.line("break;");
                });
                self.render_k_loop(context, writer, op1_name, op2_name, dest_name, "t", "c");
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn render_k_loop(
        &self,
        context: &Context,
        writer: &mut Writer,
        op1: &str,
        op2: &str,
        dest: &str,
        row: &str,
        tile_row: &str,
    ) {
        let fp = context.fp_as_str();
        let unroll = context.user_options().unroll_factor;
        let k_range = self.op1_view.dim_size(1);

        if self.prefetch && k_range > 1 {
            writer.line(format!(
                "{fp} value = {op1}[{}];",
                self.op1_view.address(row, "0")
            ));
            writer.new_line();
            writer.pragma_unroll(unroll);
            writer.block(&format!("for (int k = 0; k < {}; ++k)", k_range - 1), |writer| {
                writer.line(format!(
                    "{fp} next = {op1}[{}];",
                    self.op1_view.address(row, "(k + 1)")
                ));
                self.render_inner_loop(context, writer, op2, dest, "value", "k", tile_row);
                writer.line("value = next;");
            });
            writer.new_line();
            // Unrolled tail with the prefetched last element.
            self.render_inner_loop(
                context,
                writer,
                op2,
                dest,
                "value",
                &(k_range - 1).to_string(),
                tile_row,
            );
        } else {
            writer.pragma_unroll(unroll);
            writer.block(&format!("for (int k = 0; k < {k_range}; ++k)"), |writer| {
                writer.line(format!(
                    "{fp} value = {op1}[{}];",
                    self.op1_view.address(row, "k")
                ));
                writer.new_line();
                self.render_inner_loop(context, writer, op2, dest, "value", "k", tile_row);
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_inner_loop(
        &self,
        context: &Context,
        writer: &mut Writer,
        op2: &str,
        dest: &str,
        op1_element: &str,
        k: &str,
        tile_row: &str,
    ) {
        writer.pragma_unroll(context.user_options().unroll_factor);
        writer.block(&format!("for (int n = 0; n < {}; ++n)", self.n_range), |writer| {
            let address = if self.layout_as_requested {
                self.op2_view.address(k, "n")
            } else {
                self.op2_view.address("n", k)
            };
            writer.line(format!(
                "{dest}[{tile_row}][n] += {op1_element} * {op2}[{address}];"
            ));
        });
    }
}

fn cloned_view(ir: &Ir, symbol: SymbolId) -> Result<DataView> {
    ir.symbols[symbol]
        .data_view
        .clone()
        .ok_or_else(|| {
            Error::Internal(InternalError::MissingDataView(ir.symbols[symbol].name.clone()))
        })
}

fn wrong_kind(operand: &'static str, expected: &'static str) -> Error {
    Error::Internal(InternalError::WrongOperandKind { instr: "gemm", operand, expected })
}
