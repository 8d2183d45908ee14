//! Register allocation interfaces and shared infrastructure.
//!
//! This module defines:
//! - [`RegAllocator`], the trait both allocators implement.
//! - [`AllocatorKind`], for selecting an allocator at compile time.
//! - [`Bindings`], the temp/register map the block-local allocator keeps.
//! - helpers shared by both for call sites and spill code.
//!
//! An allocator consumes the selected pseudo-instructions of one function,
//! binds every temp to a physical register, and emits the lowered machine
//! code through the function's [`SubroutineEmitter`].

mod coloring;
mod interference;
mod local;

pub use coloring::{Coloring, ColoringRegAllocator};
pub use interference::InterferenceGraph;
pub use local::LocalRegAllocator;

use super::abi::{Register, RegisterFile};
use super::cfg::Loc;
use super::frame::SubroutineEmitter;
use super::instruction::PseudoInstr;
use crate::ir::Temp;
use crate::CompileError;
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Allocator selection
// ============================================================================

/// Which register allocator implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocatorKind {
    /// Per-block allocation; values cross block boundaries in memory.
    Local,
    /// Function-wide graph coloring with spilling.
    #[default]
    Coloring,
}

impl AllocatorKind {
    pub fn build(self) -> Box<dyn RegAllocator> {
        match self {
            AllocatorKind::Local => Box::new(LocalRegAllocator::new()),
            AllocatorKind::Coloring => Box::new(ColoringRegAllocator::new()),
        }
    }
}

// ============================================================================
// Allocator trait
// ============================================================================

pub trait RegAllocator {
    fn name(&self) -> &'static str;

    /// Allocate registers for one function and emit its body into `frame`.
    ///
    /// Every register bound to a temp is marked used in `regs`, so the
    /// frame can save exactly the callee-saved registers touched.
    fn allocate(
        &mut self,
        seq: Vec<PseudoInstr>,
        regs: &mut RegisterFile,
        frame: &mut SubroutineEmitter,
    ) -> Result<(), CompileError>;
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Temps that must survive the next call in `locs`: the live-out set of the
/// first `Call` at or after the caller-save marker.
pub(crate) fn live_across_call(locs: &[Loc<PseudoInstr>]) -> BTreeSet<Temp> {
    locs.iter()
        .find(|loc| loc.instr.is_call())
        .map(|loc| loc.live_out.clone())
        .unwrap_or_default()
}

/// Temp ↔ register map. A temp has at most one register and a register
/// holds at most one temp.
#[derive(Debug, Default)]
pub(crate) struct Bindings {
    temp_to_reg: BTreeMap<Temp, Register>,
    reg_to_temp: BTreeMap<Register, Temp>,
}

impl Bindings {
    pub fn clear(&mut self) {
        self.temp_to_reg.clear();
        self.reg_to_temp.clear();
    }

    /// Bind `temp` to `reg`, dropping any earlier binding of either.
    pub fn bind(&mut self, temp: Temp, reg: Register) {
        if let Some(old) = self.temp_to_reg.remove(&temp) {
            self.reg_to_temp.remove(&old);
        }
        if let Some(old) = self.reg_to_temp.remove(&reg) {
            self.temp_to_reg.remove(&old);
        }
        self.temp_to_reg.insert(temp, reg);
        self.reg_to_temp.insert(reg, temp);
    }

    pub fn unbind_reg(&mut self, reg: Register) {
        if let Some(temp) = self.reg_to_temp.remove(&reg) {
            self.temp_to_reg.remove(&temp);
        }
    }

    pub fn reg_of(&self, temp: Temp) -> Option<Register> {
        self.temp_to_reg.get(&temp).copied()
    }

    pub fn occupant(&self, reg: Register) -> Option<Temp> {
        self.reg_to_temp.get(&reg).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Temp, Register)> + '_ {
        self.temp_to_reg.iter().map(|(&t, &r)| (t, r))
    }
}
