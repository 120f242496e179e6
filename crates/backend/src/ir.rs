//! The instruction arena and its surrounding state.

use chainforge_common::InternalError;

use crate::data_types::{RegMemId, RegMemObject, ShrMemId, ShrMemObject};
use crate::instructions::{InstrId, Instruction};
use crate::scopes::Scopes;
use crate::symbol::{ObjectRef, Symbol, SymbolId, SymbolKind, SymbolPool};

/// All mutable state of one kernel's lowering.
///
/// Instructions live in an append-only arena; `program` holds their
/// execution order. Optimizer passes insert and drop program entries
/// without ever invalidating the handles stored in symbol user lists.
#[derive(Debug, Default)]
pub struct Ir {
    /// Symbol arena.
    pub symbols: SymbolPool,
    /// Scope stack over the symbols.
    pub scopes: Scopes,
    /// Instruction arena; only reachable through `program`.
    pub instrs: Vec<Instruction>,
    /// Execution order of the kernel body.
    pub program: Vec<InstrId>,
    /// Shared-memory allocation objects.
    pub shr_objects: Vec<ShrMemObject>,
    /// Register-tile allocation objects.
    pub reg_objects: Vec<RegMemObject>,
}

impl Ir {
    /// An empty lowering state.
    #[must_use]
    pub fn new() -> Self {
        Ir::default()
    }

    /// The instruction behind a handle.
    pub fn instr(&self, id: InstrId) -> &Instruction {
        &self.instrs[id.index()]
    }

    /// Mutable access to the instruction behind a handle.
    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.instrs[id.index()]
    }

    /// Append an instruction to the arena, without scheduling it.
    pub fn push_instr(&mut self, instr: Instruction) -> InstrId {
        let id = InstrId::new(self.instrs.len());
        self.instrs.push(instr);
        id
    }

    /// Record `user` on the symbol's user list.
    pub fn add_user(&mut self, symbol: SymbolId, user: InstrId) {
        self.symbols[symbol].add_user(user);
    }

    /// Move a shared-memory object into the arena.
    pub fn add_shr_object(&mut self, obj: ShrMemObject) -> ShrMemId {
        let id = ShrMemId::new(self.shr_objects.len());
        self.shr_objects.push(obj);
        id
    }

    /// Move a register object into the arena.
    pub fn add_reg_object(&mut self, obj: RegMemObject) -> RegMemId {
        let id = RegMemId::new(self.reg_objects.len());
        self.reg_objects.push(obj);
        id
    }

    /// Create a symbol in the innermost scope; fails when the name is
    /// already taken by any live symbol.
    pub fn declare_symbol(
        &mut self,
        name: impl Into<String>,
        kind: SymbolKind,
        obj: ObjectRef,
    ) -> Result<SymbolId, InternalError> {
        let name = name.into();
        let occupied = self
            .scopes
            .iter_live()
            .any(|symbol| self.symbols[symbol].name == name);
        if occupied {
            return Err(InternalError::NameOccupied(name));
        }
        let id = self.symbols.add(Symbol::new(name, kind, obj));
        self.scopes.push(obj, id);
        Ok(id)
    }

    /// Bind a batch symbol in the global scope.
    ///
    /// Idempotent over object identity: the same matrix appearing in many
    /// gemms keeps its first binding. A name clash with an unrelated global
    /// symbol is likewise ignored silently.
    pub fn add_to_global(&mut self, name: impl Into<String>, obj: ObjectRef) -> SymbolId {
        if let Some(&(_, existing)) =
            self.scopes.global().iter().find(|&&(o, _)| o == obj)
        {
            return existing;
        }
        let name = name.into();
        if let Some(&(_, existing)) = self
            .scopes
            .global()
            .iter()
            .find(|&&(_, s)| self.symbols[s].name == name)
        {
            return existing;
        }
        let id = self.symbols.add(Symbol::new(name, SymbolKind::Batch, obj));
        self.scopes.push_global(obj, id);
        id
    }

    /// Resolve an object to its innermost live symbol.
    pub fn resolve(&self, obj: ObjectRef) -> Result<SymbolId, InternalError> {
        self.scopes
            .get(obj)
            .ok_or_else(|| InternalError::UnresolvedSymbol(format!("{obj:?}")))
    }
}
