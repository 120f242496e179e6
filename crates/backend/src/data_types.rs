//! Allocation placeholders referenced by symbols.

use serde::{Deserialize, Serialize};

/// Handle of a shared-memory allocation object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ShrMemId(usize);

impl ShrMemId {
    pub(crate) const fn new(index: usize) -> Self {
        ShrMemId(index)
    }

    /// Position inside the owning arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Handle of a register-tile allocation object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RegMemId(usize);

impl RegMemId {
    pub(crate) const fn new(index: usize) -> Self {
        RegMemId(index)
    }

    /// Position inside the owning arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// The block-wide shared-memory backing store of one kernel.
///
/// The element budget of one chain instance (`size_per_mult`) is known
/// only after the optimizer has packed the regions; the number of
/// concurrent instances per block (`mults_per_block`) only after the
/// thread-block policy ran. Until both are set, the allocation
/// instruction is deferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShrMemObject {
    name: String,
    size_per_mult: Option<usize>,
    mults_per_block: Option<usize>,
}

impl ShrMemObject {
    /// A placeholder with both extents unknown.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        ShrMemObject { name: name.into(), size_per_mult: None, mults_per_block: None }
    }

    /// The symbol name of the per-instance base pointer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Elements one chain instance occupies.
    pub fn size_per_mult(&self) -> Option<usize> {
        self.size_per_mult
    }

    /// Concurrent chain instances per thread block.
    pub fn mults_per_block(&self) -> Option<usize> {
        self.mults_per_block
    }

    /// Fix the per-instance size.
    pub fn set_size_per_mult(&mut self, size: usize) {
        self.size_per_mult = Some(size);
    }

    /// Fix the instances-per-block count.
    pub fn set_mults_per_block(&mut self, num_mults: usize) {
        self.mults_per_block = Some(num_mults);
    }

    /// Total backing-store size, once both extents are known.
    pub fn total_size(&self) -> Option<usize> {
        Some(self.size_per_mult? * self.mults_per_block?)
    }
}

/// The per-thread register tile of one kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegMemObject {
    /// Symbol name of the tile.
    pub name: String,
    /// Tile rows; one for the wide kernel, `ceil(m / warp)` for the
    /// single-warp kernel.
    pub rows: usize,
    /// Tile columns; the widest `n` of the chain.
    pub cols: usize,
}
