//! Global-to-shared loaders.
//!
//! Four strategies, the cross product of `{extended, exact}` and
//! `{straight, transposed}`. Extended loaders copy the whole allocation
//! column span in one linear sweep, which is cheaper whenever the tail of
//! active threads would spill into the next column anyway; exact loaders
//! copy only the active bounding box. Transposed loaders flip the patch on
//! the fly and pad the destination lead dimension to the next prime to
//! avoid shared-memory bank conflicts.

use chainforge_common::{
    BoundingBox, Context, Error, GenerationError, InternalError, MatrixPool, Result,
};

use crate::ir::Ir;
use crate::symbol::{DataView, ObjectRef, SymbolId, SymbolKind};
use crate::writer::Writer;

use super::{InstrId, Instruction};

/// Strategy of a [`ShrMemLoad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrMemLoadKind {
    /// Straight copy of the whole allocation span.
    Extended,
    /// Straight copy of the active box only.
    Exact,
    /// Transpose-on-the-fly copy of the whole allocation span.
    ExtendedTranspose,
    /// Transpose-on-the-fly copy of the active box only.
    ExactTranspose,
}

impl ShrMemLoadKind {
    /// Whether the destination patch holds transposed data.
    #[must_use]
    pub const fn is_transposed(self) -> bool {
        matches!(self, ShrMemLoadKind::ExtendedTranspose | ShrMemLoadKind::ExactTranspose)
    }

    /// Mnemonic used in diagnostics.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            ShrMemLoadKind::Extended => "load_g2s_ext",
            ShrMemLoadKind::Exact => "load_g2s",
            ShrMemLoadKind::ExtendedTranspose => "load_g2s_trans_ext",
            ShrMemLoadKind::ExactTranspose => "load_g2s_trans",
        }
    }

    const fn comment(self) -> &'static str {
        match self {
            ShrMemLoadKind::Extended => "# no trans, extended",
            ShrMemLoadKind::Exact => "# no trans, exact",
            ShrMemLoadKind::ExtendedTranspose => "# trans, extended",
            ShrMemLoadKind::ExactTranspose => "# trans, exact",
        }
    }
}

/// Copies a matrix patch from global memory into a shared-memory region.
///
/// Deferred ready: renders only after the optimizer assigned the region
/// offset inside the backing store.
#[derive(Debug, Clone)]
pub struct ShrMemLoad {
    /// Selected strategy.
    pub kind: ShrMemLoadKind,
    /// Global-memory source symbol.
    pub src: SymbolId,
    /// Shared-memory destination symbol.
    pub dest: SymbolId,
    /// The backing-store symbol.
    pub shr_mem: SymbolId,
    /// Threads cooperating on the copy.
    pub num_threads: usize,
    /// Elements the destination patch occupies.
    pub shm_volume: usize,
    /// Offset inside the backing store; assigned by the optimizer.
    pub shr_mem_offset: Option<usize>,
}

/// First prime not smaller than `number`; `0` and `1` map to themselves.
#[must_use]
pub fn next_prime(number: usize) -> usize {
    let mut candidate = number;
    loop {
        if is_prime(candidate) {
            return candidate;
        }
        candidate += 1;
    }
}

fn is_prime(number: usize) -> bool {
    (2..number).all(|divisor| number % divisor != 0)
}

impl ShrMemLoad {
    /// Pick a strategy and append the load to the arena.
    ///
    /// The extended variants win when
    /// `ceil(active_rows / num_threads) * num_threads` covers the allocated
    /// rows; the exact ones otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        _context: &Context,
        pool: &MatrixPool,
        ir: &mut Ir,
        dest: SymbolId,
        src: SymbolId,
        shr_mem: SymbolId,
        num_threads: usize,
        load_and_transpose: bool,
    ) -> Result<InstrId> {
        if ir.symbols[src].kind != SymbolKind::Global {
            return Err(wrong_kind("src", "glb. mem."));
        }
        let ObjectRef::Matrix(matrix_id) = ir.symbols[src].obj else {
            return Err(wrong_kind("src", "a matrix"));
        };
        if ir.symbols[dest].kind != SymbolKind::SharedMem {
            return Err(wrong_kind("dest", "shr. mem."));
        }
        if !matches!(ir.symbols[dest].obj, ObjectRef::Matrix(_)) {
            return Err(wrong_kind("dest", "a matrix"));
        }

        let matrix = &pool[matrix_id];
        let num_loads_per_column =
            matrix.active_num_rows().div_ceil(num_threads) * num_threads;
        let exact = matrix.num_rows() > num_loads_per_column;
        let kind = match (exact, load_and_transpose) {
            (false, false) => ShrMemLoadKind::Extended,
            (true, false) => ShrMemLoadKind::Exact,
            (false, true) => ShrMemLoadKind::ExtendedTranspose,
            (true, true) => ShrMemLoadKind::ExactTranspose,
        };

        let src_view = DataView::with_bbox(
            matrix.num_rows(),
            matrix.num_cols(),
            false,
            matrix.bbox(),
        );
        let (shm_volume, dest_view) = match kind {
            ShrMemLoadKind::Extended => {
                // The copy sweeps through the padding between active
                // columns, so the patch spans whole allocation columns.
                let volume =
                    matrix.num_rows() * (matrix.active_num_cols() - 1) + matrix.active_num_rows();
                let view = DataView::with_bbox(
                    matrix.num_rows(),
                    matrix.num_cols(),
                    false,
                    BoundingBox::new(0, 0, matrix.active_num_rows(), matrix.active_num_cols()),
                );
                (volume, view)
            }
            ShrMemLoadKind::Exact => {
                let view =
                    DataView::new(matrix.active_num_rows(), matrix.active_num_cols(), false);
                (matrix.active_volume(), view)
            }
            ShrMemLoadKind::ExtendedTranspose | ShrMemLoadKind::ExactTranspose => {
                let optimal_num_rows = next_prime(matrix.active_num_cols());
                let view = DataView::with_bbox(
                    optimal_num_rows,
                    matrix.active_num_rows(),
                    true,
                    BoundingBox::new(0, 0, matrix.active_num_cols(), matrix.active_num_rows()),
                );
                (optimal_num_rows * matrix.num_rows(), view)
            }
        };

        ir.symbols[src].data_view = Some(src_view);
        ir.symbols[dest].data_view = Some(dest_view);

        let id = ir.push_instr(Instruction::LoadToShared(ShrMemLoad {
            kind,
            src,
            dest,
            shr_mem,
            num_threads,
            shm_volume,
            shr_mem_offset: None,
        }));
        ir.add_user(dest, id);
        ir.add_user(src, id);
        ir.add_user(shr_mem, id);
        Ok(id)
    }

    pub(crate) fn render(&self, context: &Context, ir: &Ir, writer: &mut Writer) -> Result<()> {
        let offset = self.shr_mem_offset.ok_or_else(|| {
            Error::Generation(GenerationError::NotReady(self.kind.mnemonic().to_string()))
        })?;
        let src = &ir.symbols[self.src];
        let dest = &ir.symbols[self.dest];
        let src_view = view(src)?;
        let dest_view = view(dest)?;

        let lexic = &context.vm().lexic;
        writer.new_line();
        writer.line(format!(
            "{}* {} {} = &{}[{offset}];",
            context.fp_as_str(),
            lexic.restrict_kw,
            dest.name,
            ir.symbols[self.shr_mem].name
        ));
        writer.line(format!(
            "// loading {} to {}: {}",
            src.name,
            dest.name,
            self.kind.comment()
        ));

        let src_offset = match src_view.offset() {
            0 => String::new(),
            offset => format!("{offset} + "),
        };
        match self.kind {
            ShrMemLoadKind::Extended => {
                self.render_extended(context, writer, &src.name, &dest.name, &src_offset);
            }
            ShrMemLoadKind::Exact => {
                self.render_exact(
                    context, writer, &src.name, &dest.name, &src_offset, src_view, dest_view,
                );
            }
            ShrMemLoadKind::ExtendedTranspose => {
                self.render_extended_transpose(
                    context, writer, &src.name, &dest.name, &src_offset, src_view, dest_view,
                );
            }
            ShrMemLoadKind::ExactTranspose => {
                self.render_exact_transpose(
                    context, writer, &src.name, &dest.name, &src_offset, src_view, dest_view,
                );
            }
        }
        Ok(())
    }

    fn render_extended(
        &self,
        context: &Context,
        writer: &mut Writer,
        src: &str,
        dest: &str,
        src_offset: &str,
    ) {
        let tid = context.vm().lexic.thread_idx_x;
        let num_hops = self.shm_volume / self.num_threads;
        if num_hops > 0 {
            writer.pragma_unroll(context.user_options().unroll_factor);
            writer.block(&format!("for (int i = 0; i < {num_hops}; ++i)"), |writer| {
                let index = format!("{tid} + i * {}", self.num_threads);
                writer.line(format!("{dest}[{index}] = {src}[{src_offset}{index}];"));
            });
        }
        // The last hop fills the residue of the patch.
        if self.shm_volume % self.num_threads != 0 {
            let residue = self.shm_volume - num_hops * self.num_threads;
            writer.block(&format!("if ({tid} < {residue})"), |writer| {
                let index = format!("{tid} + {}", num_hops * self.num_threads);
                writer.line(format!("{dest}[{index}] = {src}[{src_offset}{index}];"));
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_exact(
        &self,
        context: &Context,
        writer: &mut Writer,
        src: &str,
        dest: &str,
        src_offset: &str,
        src_view: &DataView,
        dest_view: &DataView,
    ) {
        let tid = context.vm().lexic.thread_idx_x;
        let num_data_rows = src_view.dim_size(0);
        let num_hops = num_data_rows / self.num_threads;
        writer.block(
            &format!("for (int i = 0; i < {}; ++i)", src_view.dim_size(1)),
            |writer| {
                if num_hops > 0 {
                    writer.pragma_unroll(context.user_options().unroll_factor);
                    writer.block(
                        &format!("for (int counter = 0; counter < {num_hops}; ++counter)"),
                        |writer| {
                            let shr_index = format!(
                                "{tid} + counter * {} + i * {}",
                                self.num_threads,
                                dest_view.lead_dim()
                            );
                            let glb_index = format!(
                                "{tid} + counter * {} + i * {}",
                                self.num_threads,
                                src_view.lead_dim()
                            );
                            writer.line(format!(
                                "{dest}[{shr_index}] = {src}[{src_offset}{glb_index}];"
                            ));
                        },
                    );
                }
                if num_data_rows % self.num_threads != 0 {
                    let residue = num_data_rows - num_hops * self.num_threads;
                    writer.block(&format!("if ({tid} < {residue})"), |writer| {
                        let final_offset = num_hops * self.num_threads;
                        let shr_index = format!(
                            "{tid} + {final_offset} + i * {}",
                            dest_view.lead_dim()
                        );
                        let glb_index = format!(
                            "{tid} + {final_offset} + i * {}",
                            src_view.lead_dim()
                        );
                        writer.line(format!(
                            "{dest}[{shr_index}] = {src}[{src_offset}{glb_index}];"
                        ));
                    });
                }
            },
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn render_extended_transpose(
        &self,
        context: &Context,
        writer: &mut Writer,
        src: &str,
        dest: &str,
        src_offset: &str,
        src_view: &DataView,
        dest_view: &DataView,
    ) {
        let tid = context.vm().lexic.thread_idx_x;
        let num_hops = self.shm_volume / self.num_threads;
        let src_lead = src_view.lead_dim();
        let dest_lead = dest_view.lead_dim();

        writer.block("", |writer| {
            writer.line("int index;");
            writer.new_line();
            if num_hops > 0 {
                writer.pragma_unroll(context.user_options().unroll_factor);
                writer.block(&format!("for (int i = 0; i < {num_hops}; ++i)"), |writer| {
                    writer.line(format!("index = {tid} + i * {};", self.num_threads));
                    let shr_index =
                        format!("(index % {src_lead}) * {dest_lead} + index / {src_lead}");
                    let glb_index = format!("{tid} + i * {}", self.num_threads);
                    writer.line(format!(
                        "{dest}[{shr_index}] = {src}[{src_offset}{glb_index}];"
                    ));
                });
            }
            if self.shm_volume % self.num_threads != 0 {
                let residue = self.shm_volume - num_hops * self.num_threads;
                writer.block(&format!("if ({tid} < {residue})"), |writer| {
                    writer.line(format!("index = {tid} + {};", num_hops * self.num_threads));
                    let shr_index =
                        format!("(index % {src_lead}) * {dest_lead} + index / {src_lead}");
                    let glb_index = format!("{tid} + {}", num_hops * self.num_threads);
                    writer.line(format!(
                        "{dest}[{shr_index}] = {src}[{src_offset}{glb_index}];"
                    ));
                });
            }
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn render_exact_transpose(
        &self,
        context: &Context,
        writer: &mut Writer,
        src: &str,
        dest: &str,
        src_offset: &str,
        src_view: &DataView,
        dest_view: &DataView,
    ) {
        let tid = context.vm().lexic.thread_idx_x;
        let num_data_rows = src_view.dim_size(0);
        let num_hops = num_data_rows / self.num_threads;
        let dest_lead = dest_view.lead_dim();

        writer.block(
            &format!("for (int i = 0; i < {}; ++i)", src_view.dim_size(1)),
            |writer| {
                if num_hops > 0 {
                    writer.pragma_unroll(context.user_options().unroll_factor);
                    writer.block(
                        &format!("for (int counter = 0; counter < {num_hops}; ++counter)"),
                        |writer| {
                            let thread_idx = format!("{tid} + counter * {}", self.num_threads);
                            writer.line(format!(
                                "int index = {thread_idx} + i * {num_data_rows};"
                            ));
                            let shr_index = format!(
                                "(index % {num_data_rows}) * {dest_lead} + index / {num_data_rows}"
                            );
                            let glb_index =
                                format!("{thread_idx} + i * {}", src_view.lead_dim());
                            writer.line(format!(
                                "{dest}[{shr_index}] = {src}[{src_offset}{glb_index}];"
                            ));
                        },
                    );
                }
                if num_data_rows % self.num_threads != 0 {
                    let residue = num_data_rows - num_hops * self.num_threads;
                    writer.block(&format!("if ({tid} < {residue})"), |writer| {
                        let thread_idx = format!("{tid} + {}", num_hops * self.num_threads);
                        writer.line(format!("int index = {thread_idx} + i * {num_data_rows};"));
                        let shr_index = format!(
                            "(index % {num_data_rows}) * {dest_lead} + index / {num_data_rows}"
                        );
                        let glb_index = format!("{thread_idx} + i * {}", src_view.lead_dim());
                        writer.line(format!(
                            "{dest}[{shr_index}] = {src}[{src_offset}{glb_index}];"
                        ));
                    });
                }
            },
        );
    }
}

fn view(symbol: &crate::symbol::Symbol) -> Result<&DataView> {
    symbol
        .data_view
        .as_ref()
        .ok_or_else(|| Error::Internal(InternalError::MissingDataView(symbol.name.clone())))
}

fn wrong_kind(operand: &'static str, expected: &'static str) -> Error {
    Error::Internal(InternalError::WrongOperandKind { instr: "shr-load", operand, expected })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_prime_returns_the_first_prime_at_or_above() {
        assert_eq!(next_prime(0), 0);
        assert_eq!(next_prime(1), 1);
        assert_eq!(next_prime(2), 2);
        assert_eq!(next_prime(9), 11);
        assert_eq!(next_prime(11), 11);
        assert_eq!(next_prime(56), 59);
    }
}
