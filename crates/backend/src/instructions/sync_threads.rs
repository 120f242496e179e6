//! Thread synchronization.

use chainforge_common::Context;

use crate::writer::Writer;

/// A barrier across the threads of one chain instance: block-wide when the
/// instance spans more than a warp, warp-scoped otherwise. Never guarded by
/// a thread mask.
#[derive(Debug, Clone)]
pub struct SyncThreads {
    /// Threads cooperating on one chain instance.
    pub num_threads: usize,
}

impl SyncThreads {
    pub(crate) fn render(&self, context: &Context, writer: &mut Writer) {
        let vm = context.vm();
        let sync = if self.num_threads > vm.hw_descr.vec_unit_length {
            vm.lexic.sync_block_threads
        } else {
            vm.lexic.sync_warp_threads
        };
        writer.line(format!("{sync};"));
    }
}
