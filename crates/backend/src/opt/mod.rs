//! The optimization pipeline.
//!
//! Passes run in a fixed order: liveness, memory-region coloring,
//! shared-memory offset assignment, synchronization insertion, dead-tail
//! removal, and the write-after-read collapse. Only the synchronization
//! pass is optional.

pub mod coloring;
pub mod data_dependency;
pub mod liveness;
pub mod mem_region;
pub mod remove_redundancy;
pub mod shr_mem;
pub mod sync_threads;

use chainforge_common::{Context, Result};
use tracing::debug;

use crate::data_types::ShrMemId;
use crate::ir::Ir;

pub use mem_region::Region;

/// What the optimizer decided, kept for reporting and tests.
#[derive(Debug, Clone)]
pub struct OptSummary {
    /// Shared-memory regions in color order.
    pub regions: Vec<Region>,
    /// Element size of each region.
    pub region_sizes: Vec<usize>,
    /// Element offset of each region inside the backing store.
    pub region_offsets: Vec<usize>,
}

/// Drives the pass sequence over one kernel's instruction program.
pub struct OptimizationStage<'a> {
    context: &'a Context,
    shr_mem: ShrMemId,
    num_threads: usize,
}

impl<'a> OptimizationStage<'a> {
    /// An optimizer for the kernel owning `shr_mem` and spanning
    /// `num_threads` threads per chain instance.
    pub fn new(context: &'a Context, shr_mem: ShrMemId, num_threads: usize) -> Self {
        OptimizationStage { context, shr_mem, num_threads }
    }

    /// Run all passes, mutating the program in place.
    pub fn optimize(&self, ir: &mut Ir) -> Result<OptSummary> {
        let live_map = liveness::analyze(ir);
        debug!(points = live_map.len(), "liveness analysis done");

        let regions = mem_region::allocate_regions(&live_map);
        debug!(num_regions = regions.len(), "memory regions colored");

        let (region_sizes, region_offsets) =
            shr_mem::assign_offsets(self.context, ir, self.shr_mem, &regions)?;
        debug!(?region_sizes, ?region_offsets, "shared memory packed");

        if self.context.user_options().enable_sync_threads_opt {
            sync_threads::minimize_syncs(ir, &regions, self.num_threads);
            debug!(instrs = ir.program.len(), "synchronization minimized");
        }

        remove_redundancy::remove_redundancy(ir);
        data_dependency::collapse_war(ir, self.num_threads)?;
        debug!(instrs = ir.program.len(), "redundancy removal done");

        Ok(OptSummary { regions, region_sizes, region_offsets })
    }
}
