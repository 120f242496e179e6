//! Dense matrix metadata and the arena owning it.

use std::fmt::{self, Display};
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::basic_types::{Addressing, DataFlowDirection};
use crate::error::GenerationError;

/// Half-open active rectangle `[first_row, last_row) x [first_col,
/// last_col)` inside a matrix allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// First active row.
    pub first_row: usize,
    /// First active column.
    pub first_col: usize,
    /// One past the last active row.
    pub last_row: usize,
    /// One past the last active column.
    pub last_col: usize,
}

impl BoundingBox {
    /// A bounding box from its four coordinates.
    #[must_use]
    pub const fn new(first_row: usize, first_col: usize, last_row: usize, last_col: usize) -> Self {
        BoundingBox { first_row, first_col, last_row, last_col }
    }

    /// Number of active rows.
    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.last_row - self.first_row
    }

    /// Number of active columns.
    #[must_use]
    pub const fn num_cols(&self) -> usize {
        self.last_col - self.first_col
    }
}

impl Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.first_row, self.first_col, self.last_row, self.last_col
        )
    }
}

/// Declarative description of one batched dense matrix.
///
/// The allocation is `num_rows x num_cols`; the bounding box marks the
/// rectangle the gemm chain actually touches. The allocation row count is
/// the lead dimension of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixBatch {
    name: Option<String>,
    alias: Option<String>,
    num_rows: usize,
    num_cols: usize,
    bbox: BoundingBox,
    addressing: Addressing,
    is_tmp: bool,
    direction: Option<DataFlowDirection>,
}

impl MatrixBatch {
    /// A matrix whose bounding box spans the whole allocation.
    #[must_use]
    pub fn new(num_rows: usize, num_cols: usize, addressing: Addressing) -> Self {
        MatrixBatch {
            name: None,
            alias: None,
            num_rows,
            num_cols,
            bbox: BoundingBox::new(0, 0, num_rows, num_cols),
            addressing,
            is_tmp: false,
            direction: None,
        }
    }

    /// Restrict the active rectangle; fails when the box leaves the
    /// allocation.
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Result<Self, GenerationError> {
        if bbox.last_row > self.num_rows || bbox.last_col > self.num_cols {
            return Err(GenerationError::BboxOutOfBounds {
                bbox: bbox.to_string(),
                num_rows: self.num_rows,
                num_cols: self.num_cols,
            });
        }
        self.bbox = bbox;
        Ok(self)
    }

    /// Attach the caller-side name used when emitting call sites.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Mark the matrix as existing only inside the kernel.
    #[must_use]
    pub fn as_tmp(mut self) -> Self {
        self.is_tmp = true;
        self
    }

    /// Allocated rows; this is also the lead dimension.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Allocated columns.
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// The active rectangle.
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// The addressing mode.
    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    /// Whether the matrix lives only inside the kernel.
    pub fn is_tmp(&self) -> bool {
        self.is_tmp
    }

    /// The caller-side alias, if any.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The generator-assigned name; `None` before registration.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Assign the internal name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Drop the internal name.
    pub fn clear_name(&mut self) {
        self.name = None;
    }

    /// The data-flow direction, assigned on gemm construction.
    pub fn direction(&self) -> Option<DataFlowDirection> {
        self.direction
    }

    /// Assign the data-flow direction.
    pub fn set_direction(&mut self, direction: DataFlowDirection) {
        self.direction = Some(direction);
    }

    /// Rows of the active rectangle.
    pub fn active_num_rows(&self) -> usize {
        self.bbox.num_rows()
    }

    /// Columns of the active rectangle.
    pub fn active_num_cols(&self) -> usize {
        self.bbox.num_cols()
    }

    /// Elements of the active rectangle.
    pub fn active_volume(&self) -> usize {
        self.active_num_rows() * self.active_num_cols()
    }

    /// Elements of the whole allocation; the per-batch stride under strided
    /// addressing.
    pub fn real_volume(&self) -> usize {
        self.num_rows * self.num_cols
    }

    /// Linear offset of the first active element inside the allocation.
    pub fn offset_to_first_element(&self) -> usize {
        self.num_rows * self.bbox.first_col + self.bbox.first_row
    }

    /// Whether allocation, addressing and bounding box agree with `other`.
    pub fn is_similar(&self, other: &MatrixBatch) -> bool {
        self.num_rows == other.num_rows
            && self.num_cols == other.num_cols
            && self.addressing == other.addressing
            && self.bbox == other.bbox
    }

    /// [`is_similar`](Self::is_similar) plus alias and temporariness.
    pub fn is_same(&self, other: &MatrixBatch) -> bool {
        self.is_similar(other) && self.alias == other.alias && self.is_tmp == other.is_tmp
    }

    /// The descriptor string fed into the kernel-name digest.
    pub fn gen_descr(&self) -> String {
        format!(
            "{} = {{rows: {}, cols: {}, addr: {}, bbox: {}}};",
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.num_rows,
            self.num_cols,
            self.addressing,
            self.bbox
        )
    }
}

/// Handle of a matrix inside a [`MatrixPool`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MatrixId(usize);

impl MatrixId {
    /// Position inside the pool.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Arena owning the matrices of one gemm chain.
///
/// Matrix identity is the handle; the same matrix appearing in several
/// gemms is represented by the same [`MatrixId`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixPool {
    matrices: Vec<MatrixBatch>,
}

impl MatrixPool {
    /// An empty pool.
    #[must_use]
    pub fn new() -> Self {
        MatrixPool::default()
    }

    /// Move a matrix into the pool, returning its handle.
    pub fn add(&mut self, matrix: MatrixBatch) -> MatrixId {
        let id = MatrixId(self.matrices.len());
        self.matrices.push(matrix);
        id
    }

    /// Number of matrices in the pool.
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Iterate over handles and matrices in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (MatrixId, &MatrixBatch)> {
        self.matrices.iter().enumerate().map(|(index, m)| (MatrixId(index), m))
    }

    /// Mutable access by handle.
    pub fn get_mut(&mut self, id: MatrixId) -> &mut MatrixBatch {
        &mut self.matrices[id.0]
    }
}

impl Index<MatrixId> for MatrixPool {
    type Output = MatrixBatch;

    fn index(&self, id: MatrixId) -> &MatrixBatch {
        &self.matrices[id.0]
    }
}

impl IndexMut<MatrixId> for MatrixPool {
    fn index_mut(&mut self, id: MatrixId) -> &mut MatrixBatch {
        &mut self.matrices[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_must_stay_inside_the_allocation() {
        let result = MatrixBatch::new(56, 9, Addressing::Strided)
            .with_bbox(BoundingBox::new(0, 0, 57, 9));
        assert!(matches!(result, Err(GenerationError::BboxOutOfBounds { .. })));
    }

    #[test]
    fn active_dims_come_from_the_bbox() {
        let m = MatrixBatch::new(56, 56, Addressing::Strided)
            .with_bbox(BoundingBox::new(8, 1, 40, 10))
            .unwrap();
        assert_eq!(m.active_num_rows(), 32);
        assert_eq!(m.active_num_cols(), 9);
        assert_eq!(m.active_volume(), 288);
        assert_eq!(m.real_volume(), 3136);
        assert_eq!(m.offset_to_first_element(), 56 + 8);
    }

    #[test]
    fn descr_includes_name_and_addressing() {
        let mut m = MatrixBatch::new(56, 9, Addressing::Strided);
        m.set_name("A");
        assert_eq!(
            m.gen_descr(),
            "A = {rows: 56, cols: 9, addr: strided, bbox: [0, 0, 56, 9]};"
        );
    }

    #[test]
    fn similarity_ignores_alias_sameness_does_not() {
        let a = MatrixBatch::new(8, 8, Addressing::None).with_alias("stiffness");
        let b = MatrixBatch::new(8, 8, Addressing::None);
        assert!(a.is_similar(&b));
        assert!(!a.is_same(&b));
    }
}
