//! Builders for the register tile and the shared-memory backing store.

use chainforge_common::{Context, Result};

use crate::data_types::{RegMemId, RegMemObject, ShrMemId, ShrMemObject};
use crate::instructions::allocate::{RegisterAlloc, ShrMemAlloc};
use crate::instructions::InstrId;
use crate::ir::Ir;
use crate::symbol::{ObjectRef, SymbolKind};

/// Creates register-tile objects with generator-unique names.
#[derive(Debug, Default)]
pub struct RegistersAllocBuilder {
    counter: usize,
}

impl RegistersAllocBuilder {
    /// A builder starting at `reg0`.
    #[must_use]
    pub fn new() -> Self {
        RegistersAllocBuilder::default()
    }

    /// Allocate a `rows x cols` tile, optionally initialized, and return
    /// the object and the (unscheduled) instruction.
    pub fn build(
        &mut self,
        context: &Context,
        ir: &mut Ir,
        rows: usize,
        cols: usize,
        init_value: Option<f64>,
    ) -> Result<(RegMemId, InstrId)> {
        let name = format!("reg{}", self.counter);
        self.counter += 1;

        let obj = ir.add_reg_object(RegMemObject { name: name.clone(), rows, cols });
        let dest = ir.declare_symbol(name, SymbolKind::Register, ObjectRef::Reg(obj))?;
        let instr = RegisterAlloc::build(context, ir, dest, rows, cols, init_value)?;
        Ok((obj, instr))
    }
}

/// Creates shared-memory backing stores with generator-unique names.
#[derive(Debug, Default)]
pub struct ShrMemAllocBuilder {
    counter: usize,
}

impl ShrMemAllocBuilder {
    /// A builder starting at `shrmem0`.
    #[must_use]
    pub fn new() -> Self {
        ShrMemAllocBuilder::default()
    }

    /// Allocate the backing store with open extents and return the object
    /// and the (unscheduled) instruction.
    pub fn build(&mut self, _context: &Context, ir: &mut Ir) -> Result<(ShrMemId, InstrId)> {
        let name = format!("shrmem{}", self.counter);
        self.counter += 1;

        let obj = ir.add_shr_object(ShrMemObject::new(name.clone()));
        let dest = ir.declare_symbol(name, SymbolKind::SharedMem, ObjectRef::ShrMem(obj))?;
        let instr = ShrMemAlloc::build(ir, dest)?;
        Ok((obj, instr))
    }
}
