//! Register-tile stores and the collapse preload.

use chainforge_common::{
    BoundingBox, Context, Error, GenerationError, InternalError, MatrixPool, Result, Scalar,
};

use crate::ir::Ir;
use crate::symbol::{DataView, ObjectRef, SymbolId, SymbolKind};
use crate::writer::Writer;

use super::{range_guard, range_mask_threads, InstrId, Instruction};

/// Writes the register tile into a shared-memory patch holding a temporary
/// chain result.
///
/// Deferred ready, like the loaders: renders once the optimizer assigned
/// the region offset.
#[derive(Debug, Clone)]
pub struct StoreRegToShr {
    /// The register-tile symbol.
    pub src: SymbolId,
    /// The shared-memory destination symbol.
    pub dest: SymbolId,
    /// The backing-store symbol.
    pub shr_mem: SymbolId,
    /// Threads cooperating on one chain instance.
    pub num_threads: usize,
    /// Elements the destination patch occupies.
    pub shm_volume: usize,
    /// Offset inside the backing store; assigned by the optimizer.
    pub shr_mem_offset: Option<usize>,
    src_view: DataView,
}

impl StoreRegToShr {
    /// Validate operands, shape the destination patch, and append to the
    /// arena.
    pub fn build(
        context: &Context,
        pool: &MatrixPool,
        ir: &mut Ir,
        src: SymbolId,
        dest: SymbolId,
        shr_mem: SymbolId,
        num_threads: usize,
    ) -> Result<InstrId> {
        check_register_src("store", ir, src)?;
        if ir.symbols[dest].kind != SymbolKind::SharedMem {
            return Err(wrong_kind("dest", "shr. mem."));
        }
        let ObjectRef::Matrix(matrix_id) = ir.symbols[dest].obj else {
            return Err(wrong_kind("dest", "a matrix"));
        };

        let matrix = &pool[matrix_id];
        // The patch starts at the origin; rows are padded to the alignment
        // quantum so follow-up loads stay aligned.
        let bbox = BoundingBox::new(0, 0, matrix.active_num_rows(), matrix.active_num_cols());
        let num_rows = context.align(matrix.active_num_rows());
        let dest_view =
            DataView::with_bbox(num_rows, matrix.active_num_cols(), false, bbox);
        let shm_volume = dest_view.volume();
        ir.symbols[dest].data_view = Some(dest_view);

        let src_view = cloned_view(ir, src)?;

        let id = ir.push_instr(Instruction::StoreRegToShr(StoreRegToShr {
            src,
            dest,
            shr_mem,
            num_threads,
            shm_volume,
            shr_mem_offset: None,
            src_view,
        }));
        ir.add_user(src, id);
        ir.add_user(dest, id);
        ir.add_user(shr_mem, id);
        Ok(id)
    }

    pub(crate) fn render(&self, context: &Context, ir: &Ir, writer: &mut Writer) -> Result<()> {
        let offset = self.shr_mem_offset.ok_or_else(|| {
            Error::Generation(GenerationError::NotReady("store_r2s".to_string()))
        })?;
        let src_name = &ir.symbols[self.src].name;
        let dest_name = &ir.symbols[self.dest].name;
        let dest_view = ir.symbols[self.dest]
            .data_view
            .as_ref()
            .ok_or_else(|| missing_view(dest_name))?;
        let tile_rows = tile_rows(ir, self.src)?;

        let lexic = &context.vm().lexic;
        writer.new_line();
        writer.line(format!("// writing to shr mem: from {src_name} to {dest_name}"));
        writer.line(format!(
            "{}* {} {dest_name} = &{}[{offset}];",
            context.fp_as_str(),
            lexic.restrict_kw,
            ir.symbols[self.shr_mem].name
        ));

        let columns = dest_view.dim_size(1);
        render_tile_sweep(
            context,
            writer,
            &self.src_view,
            tile_rows,
            self.num_threads,
            |writer, row, tile_row| {
                writer.pragma_unroll(context.user_options().unroll_factor);
                writer.block(&format!("for (int i = 0; i < {columns}; ++i)"), |writer| {
                    writer.line(format!(
                        "{dest_name}[{}] = {src_name}[{tile_row}][i];",
                        dest_view.address(row, "i")
                    ));
                });
            },
        );
        Ok(())
    }
}

/// Writes the register tile back to the global result:
/// `dst = alpha * reg + beta * dst`, the update term omitted when `beta`
/// is the zero literal.
#[derive(Debug, Clone)]
pub struct StoreRegToGlb {
    /// The register-tile symbol.
    pub src: SymbolId,
    /// The global-memory destination symbol.
    pub dest: SymbolId,
    /// Scale of the accumulated product.
    pub alpha: Scalar,
    /// Scale of the previous destination contents.
    pub beta: Scalar,
    /// Threads cooperating on one chain instance.
    pub num_threads: usize,
    src_view: DataView,
    dest_view: DataView,
}

impl StoreRegToGlb {
    /// Validate operands, shape the destination view, and append to the
    /// arena.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        _context: &Context,
        pool: &MatrixPool,
        ir: &mut Ir,
        src: SymbolId,
        dest: SymbolId,
        alpha: Scalar,
        beta: Scalar,
        num_threads: usize,
    ) -> Result<InstrId> {
        check_register_src("store", ir, src)?;
        if ir.symbols[dest].kind != SymbolKind::Global {
            return Err(wrong_kind("dest", "global memory"));
        }
        let ObjectRef::Matrix(matrix_id) = ir.symbols[dest].obj else {
            return Err(wrong_kind("dest", "a matrix"));
        };

        let src_view = cloned_view(ir, src)?;
        let prior_dest_view = cloned_view(ir, dest)?;
        if prior_dest_view.dim_size(0) != src_view.dim_size(0) {
            return Err(Error::Internal(InternalError::StoreDimMismatch));
        }

        let matrix = &pool[matrix_id];
        let dest_view =
            DataView::with_bbox(matrix.num_rows(), matrix.num_cols(), false, matrix.bbox());
        ir.symbols[dest].data_view = Some(dest_view.clone());

        let id = ir.push_instr(Instruction::StoreRegToGlb(StoreRegToGlb {
            src,
            dest,
            alpha,
            beta,
            num_threads,
            src_view,
            dest_view,
        }));
        ir.add_user(src, id);
        ir.add_user(dest, id);
        Ok(id)
    }

    /// The register view the store captured at construction; the collapse
    /// pass reuses it for the preload it substitutes.
    pub fn src_view(&self) -> &DataView {
        &self.src_view
    }

    /// The destination view the store captured at construction.
    pub fn dest_view(&self) -> &DataView {
        &self.dest_view
    }

    pub(crate) fn render(&self, context: &Context, ir: &Ir, writer: &mut Writer) -> Result<()> {
        let src_name = &ir.symbols[self.src].name;
        let dest_name = &ir.symbols[self.dest].name;
        let tile_rows = tile_rows(ir, self.src)?;

        writer.new_line();
        writer.line("// write results back to glb. memory");
        let columns = self.dest_view.dim_size(1);
        render_tile_sweep(
            context,
            writer,
            &self.src_view,
            tile_rows,
            self.num_threads,
            |writer, row, tile_row| {
                writer.pragma_unroll(context.user_options().unroll_factor);
                writer.block(&format!("for (int n = 0; n < {columns}; ++n)"), |writer| {
                    let lhs = format!("{dest_name}[{}]", self.dest_view.address(row, "n"));
                    let mut rhs = format!("{} * {src_name}[{tile_row}][n]", self.alpha);
                    if !self.beta.is_zero() {
                        rhs = format!("{rhs} + {} * {lhs}", self.beta);
                    }
                    writer.line(format!("{lhs} = {rhs};"));
                });
            },
        );
        Ok(())
    }
}

/// Preloads `beta * C` into the register tile so the final store can run
/// with `beta = 0`. Substituted for a [`ClearRegisters`](super::ClearRegisters)
/// by the write-after-read collapse.
#[derive(Debug, Clone)]
pub struct LoadGlbToReg {
    /// The global-memory source symbol (the chain result).
    pub src: SymbolId,
    /// The register-tile symbol.
    pub dest: SymbolId,
    /// Scale applied to the loaded values.
    pub beta: Scalar,
    /// Threads cooperating on one chain instance.
    pub num_threads: usize,
    glb_view: DataView,
    reg_view: DataView,
}

impl LoadGlbToReg {
    /// Append to the arena; views are taken over from the collapsed store.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        ir: &mut Ir,
        src: SymbolId,
        dest: SymbolId,
        beta: Scalar,
        num_threads: usize,
        glb_view: DataView,
        reg_view: DataView,
    ) -> Result<InstrId> {
        if ir.symbols[src].kind != SymbolKind::Global {
            return Err(wrong_kind("src", "global memory"));
        }
        check_register_src("load_g2r", ir, dest)?;

        let id = ir.push_instr(Instruction::LoadGlbToReg(LoadGlbToReg {
            src,
            dest,
            beta,
            num_threads,
            glb_view,
            reg_view,
        }));
        ir.add_user(src, id);
        ir.add_user(dest, id);
        Ok(id)
    }

    pub(crate) fn render(&self, context: &Context, ir: &Ir, writer: &mut Writer) -> Result<()> {
        let src_name = &ir.symbols[self.src].name;
        let dest_name = &ir.symbols[self.dest].name;
        let tile_rows = tile_rows(ir, self.dest)?;

        writer.new_line();
        writer.line(format!("// loading {} * {src_name} to {dest_name}", self.beta));
        let columns = self.glb_view.dim_size(1);
        render_tile_sweep(
            context,
            writer,
            &self.reg_view,
            tile_rows,
            self.num_threads,
            |writer, row, tile_row| {
                writer.pragma_unroll(context.user_options().unroll_factor);
                writer.block(&format!("for (int n = 0; n < {columns}; ++n)"), |writer| {
                    writer.line(format!(
                        "{dest_name}[{tile_row}][n] = {} * {src_name}[{}];",
                        self.beta,
                        self.glb_view.address(row, "n")
                    ));
                });
            },
        );
        Ok(())
    }
}

/// Sweep the rows covered by the register tile.
///
/// With a single tile row the sweep is a plain thread mask over the active
/// row range; with more rows each thread walks the row axis in strides of
/// `num_threads`. The callback receives the row expression and the tile
/// row index.
fn render_tile_sweep(
    context: &Context,
    writer: &mut Writer,
    reg_view: &DataView,
    tile_rows: usize,
    num_threads: usize,
    body: impl Fn(&mut Writer, &str, &str),
) {
    let lexic = &context.vm().lexic;
    let bbox = reg_view.bbox();
    let displacement = reg_view.offset();

    if tile_rows == 1 {
        let row = if displacement == 0 {
            lexic.thread_idx_x.to_string()
        } else {
            format!("{} - {displacement}", lexic.thread_idx_x)
        };
        writer.block(&range_mask_threads(lexic, bbox.first_row, bbox.last_row), |writer| {
            body(writer, &row, "0");
        });
    } else {
        writer.block(&format!("for (int c = 0; c < {tile_rows}; ++c)"), |writer| {
            writer.line(format!("int t = {} + c * {num_threads};", lexic.thread_idx_x));
            let row = if displacement == 0 {
                "t".to_string()
            } else {
                format!("t - {displacement}")
            };
            writer.block(&range_guard("t", bbox.first_row, bbox.last_row), |writer| {
                body(writer, &row, "c");
            });
        });
    }
}

fn tile_rows(ir: &Ir, register: SymbolId) -> Result<usize> {
    match ir.symbols[register].obj {
        ObjectRef::Reg(obj) => Ok(ir.reg_objects[obj.index()].rows),
        _ => Err(wrong_kind("src", "a register object")),
    }
}

fn check_register_src(instr: &'static str, ir: &Ir, src: SymbolId) -> Result<()> {
    if ir.symbols[src].kind != SymbolKind::Register {
        return Err(Error::Internal(InternalError::WrongOperandKind {
            instr,
            operand: "src",
            expected: "registers",
        }));
    }
    if !matches!(ir.symbols[src].obj, ObjectRef::Reg(_)) {
        return Err(Error::Internal(InternalError::WrongOperandKind {
            instr,
            operand: "src",
            expected: "a register object",
        }));
    }
    Ok(())
}

fn cloned_view(ir: &Ir, symbol: SymbolId) -> Result<DataView> {
    ir.symbols[symbol]
        .data_view
        .clone()
        .ok_or_else(|| missing_view(&ir.symbols[symbol].name))
}

fn missing_view(name: &str) -> Error {
    Error::Internal(InternalError::MissingDataView(name.to_string()))
}

fn wrong_kind(operand: &'static str, expected: &'static str) -> Error {
    Error::Internal(InternalError::WrongOperandKind { instr: "store", operand, expected })
}
