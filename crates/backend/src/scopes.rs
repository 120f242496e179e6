//! The scope stack: reverse symbol tables keyed by semantic object.

use chainforge_common::InternalError;

use crate::symbol::{ObjectRef, SymbolId};

/// A stack of insertion-ordered reverse tables.
///
/// The bottom table is the global scope holding the batch symbols of the
/// persistent matrices; builders push scopes at phase boundaries. Lookup
/// walks inner scopes first. Name uniqueness across live scopes is enforced
/// one level up, in [`Ir::declare_symbol`](crate::ir::Ir::declare_symbol),
/// where symbol names are known.
#[derive(Debug, Clone)]
pub struct Scopes {
    tables: Vec<Vec<(ObjectRef, SymbolId)>>,
}

impl Default for Scopes {
    fn default() -> Self {
        Scopes::new()
    }
}

impl Scopes {
    const GLOBAL_SCOPE: usize = 0;

    /// A stack holding only the empty global scope.
    #[must_use]
    pub fn new() -> Self {
        Scopes { tables: vec![Vec::new()] }
    }

    /// Entries of the global scope in insertion order.
    pub fn global(&self) -> &[(ObjectRef, SymbolId)] {
        &self.tables[Self::GLOBAL_SCOPE]
    }

    /// Whether the global scope already binds `obj`.
    pub fn global_contains(&self, obj: ObjectRef) -> bool {
        self.tables[Self::GLOBAL_SCOPE].iter().any(|&(o, _)| o == obj)
    }

    /// Bind `obj` in the global scope. Callers are responsible for the
    /// idempotence rule; see [`Ir::add_to_global`](crate::ir::Ir::add_to_global).
    pub fn push_global(&mut self, obj: ObjectRef, symbol: SymbolId) {
        self.tables[Self::GLOBAL_SCOPE].push((obj, symbol));
    }

    /// Bind `obj` in the innermost scope.
    pub fn push(&mut self, obj: ObjectRef, symbol: SymbolId) {
        let top = self.tables.len() - 1;
        self.tables[top].push((obj, symbol));
    }

    /// Resolve `obj`, walking inner scopes first and later bindings before
    /// earlier ones.
    pub fn get(&self, obj: ObjectRef) -> Option<SymbolId> {
        for table in self.tables.iter().rev() {
            if let Some(&(_, symbol)) = table.iter().rev().find(|&&(o, _)| o == obj) {
                return Some(symbol);
            }
        }
        None
    }

    /// Whether any live scope binds `obj`.
    pub fn contains(&self, obj: ObjectRef) -> bool {
        self.get(obj).is_some()
    }

    /// Open a new innermost scope.
    pub fn add_scope(&mut self) {
        self.tables.push(Vec::new());
    }

    /// Close the innermost scope; the global scope cannot be closed.
    pub fn remove_scope(&mut self) -> Result<(), InternalError> {
        if self.tables.len() > 1 {
            self.tables.pop();
            Ok(())
        } else {
            Err(InternalError::GlobalScopeRemoval)
        }
    }

    /// Number of open scopes, the global one included.
    pub fn num_scopes(&self) -> usize {
        self.tables.len()
    }

    /// All live symbols, outermost scope first.
    pub fn iter_live(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.tables.iter().flat_map(|table| table.iter().map(|&(_, symbol)| symbol))
    }
}

#[cfg(test)]
mod tests {
    use chainforge_common::{Addressing, MatrixBatch, MatrixPool};

    use crate::ir::Ir;
    use crate::symbol::SymbolKind;

    use super::*;

    fn matrix_obj(pool: &mut MatrixPool) -> ObjectRef {
        ObjectRef::Matrix(pool.add(MatrixBatch::new(4, 4, Addressing::Strided)))
    }

    #[test]
    fn lookup_walks_inner_scopes_first() {
        let mut pool = MatrixPool::new();
        let obj = matrix_obj(&mut pool);

        let mut ir = Ir::new();
        let outer = ir.add_to_global("A", obj);
        ir.scopes.add_scope();
        let inner = ir.declare_symbol("glbA", SymbolKind::Global, obj).unwrap();

        assert_eq!(ir.scopes.get(obj), Some(inner));
        ir.scopes.remove_scope().unwrap();
        assert_eq!(ir.scopes.get(obj), Some(outer));
    }

    #[test]
    fn global_scope_cannot_be_removed() {
        let mut scopes = Scopes::new();
        assert!(matches!(scopes.remove_scope(), Err(InternalError::GlobalScopeRemoval)));
        scopes.add_scope();
        assert!(scopes.remove_scope().is_ok());
    }

    #[test]
    fn name_collisions_are_rejected_across_scopes() {
        let mut pool = MatrixPool::new();
        let obj_a = matrix_obj(&mut pool);
        let obj_b = matrix_obj(&mut pool);

        let mut ir = Ir::new();
        ir.declare_symbol("patch", SymbolKind::SharedMem, obj_a).unwrap();
        ir.scopes.add_scope();
        let result = ir.declare_symbol("patch", SymbolKind::SharedMem, obj_b);
        assert!(matches!(result, Err(InternalError::NameOccupied(_))));
    }

    #[test]
    fn add_to_global_is_idempotent_over_objects() {
        let mut pool = MatrixPool::new();
        let obj = matrix_obj(&mut pool);

        let mut ir = Ir::new();
        let first = ir.add_to_global("A", obj);
        let second = ir.add_to_global("A", obj);
        assert_eq!(first, second);
        assert_eq!(ir.scopes.global().len(), 1);
    }
}
