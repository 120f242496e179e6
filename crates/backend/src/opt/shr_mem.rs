//! Shared-memory sizing and offset assignment.

use chainforge_common::{Context, Error, GenerationError, Result};

use crate::data_types::ShrMemId;
use crate::ir::Ir;

use super::mem_region::Region;

/// Fix the size of every region, the per-instance total, and the offset of
/// every shared-memory write.
///
/// A region is as large as the largest patch of its members; the total per
/// chain instance is the sum of the region sizes; offsets are the prefix
/// sums. Assigning an offset flips the owning write instruction to ready.
pub fn assign_offsets(
    context: &Context,
    ir: &mut Ir,
    shr_mem: ShrMemId,
    regions: &[Region],
) -> Result<(Vec<usize>, Vec<usize>)> {
    let mut region_sizes = vec![0usize; regions.len()];
    for (index, region) in regions.iter().enumerate() {
        for &symbol in &region.symbols {
            let first_user = ir.symbols[symbol].first_user().ok_or_else(|| {
                bad_region_user(&ir.symbols[symbol].name)
            })?;
            let size = ir
                .instr(first_user)
                .compute_shared_mem_size(context)
                .ok_or_else(|| bad_region_user(&ir.symbols[symbol].name))?;
            region_sizes[index] = region_sizes[index].max(size);
        }
    }

    let mut region_offsets = vec![0usize; regions.len()];
    for index in 1..regions.len() {
        region_offsets[index] = region_offsets[index - 1] + region_sizes[index - 1];
    }
    let size_per_mult: usize = region_sizes.iter().sum();
    ir.shr_objects[shr_mem.index()].set_size_per_mult(size_per_mult);

    for (region, &offset) in regions.iter().zip(&region_offsets) {
        for &symbol in &region.symbols {
            // Checked above; every member has a defining write.
            if let Some(first_user) = ir.symbols[symbol].first_user() {
                ir.instr_mut(first_user).set_shr_mem_offset(offset);
            }
        }
    }
    Ok((region_sizes, region_offsets))
}

fn bad_region_user(name: &str) -> Error {
    Error::Generation(GenerationError::BadRegionUser(name.to_string()))
}
