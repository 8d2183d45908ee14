//! Block-local register allocator.
//!
//! Bindings never cross a block boundary: every block starts with all
//! registers free, loads what it reads from the frame, and stores every
//! bound temp that is live out of the block before its terminator. When no
//! register is free, the occupant whose next use in the block is farthest
//! away is stored and evicted (Belady).

use super::{live_across_call, Bindings, RegAllocator};
use crate::backend::abi::{Register, RegisterFile};
use crate::backend::cfg::{BasicBlock, Cfg};
use crate::backend::frame::SubroutineEmitter;
use crate::backend::instruction::PseudoInstr;
use crate::backend::liveness;
use crate::ir::Temp;
use crate::CompileError;
use std::collections::BTreeMap;

pub struct LocalRegAllocator {
    bindings: Bindings,
    /// Caller-saved registers stored at the last `CallerSave`.
    saved: Vec<(Register, Temp)>,
}

impl LocalRegAllocator {
    pub fn new() -> Self {
        Self {
            bindings: Bindings::default(),
            saved: Vec::new(),
        }
    }

    fn allocate_block(
        &mut self,
        bb: &BasicBlock<PseudoInstr>,
        regs: &mut RegisterFile,
        frame: &mut SubroutineEmitter,
    ) -> Result<(), CompileError> {
        self.bindings.clear();
        if let Some(label) = &bb.label {
            frame.emit_label(label);
        }

        let body_len = match bb.terminator() {
            Some(_) => bb.locs.len() - 1,
            None => bb.locs.len(),
        };
        for i in 0..body_len {
            self.allocate_loc(bb, i, regs, frame)?;
        }

        // Values leave the block through memory.
        let live_out: Vec<(Temp, Register)> = self
            .bindings
            .iter()
            .filter(|(t, _)| bb.live_out.contains(t))
            .collect();
        for (temp, reg) in live_out {
            frame.emit_store_to_stack(reg, temp);
        }

        if body_len < bb.locs.len() {
            self.allocate_loc(bb, body_len, regs, frame)?;
        }
        Ok(())
    }

    fn allocate_loc(
        &mut self,
        bb: &BasicBlock<PseudoInstr>,
        i: usize,
        regs: &mut RegisterFile,
        frame: &mut SubroutineEmitter,
    ) -> Result<(), CompileError> {
        let loc = &bb.locs[i];
        match &loc.instr {
            PseudoInstr::CallerSave => {
                let across = live_across_call(&bb.locs[i..]);
                self.saved.clear();
                for reg in regs.caller_saved() {
                    if let Some(temp) = self.bindings.occupant(reg) {
                        if across.contains(&temp) {
                            frame.emit_store_to_stack(reg, temp);
                            self.saved.push((reg, temp));
                        }
                    }
                }
            }
            PseudoInstr::CallerRestore => {
                for reg in regs.caller_saved() {
                    self.bindings.unbind_reg(reg);
                }
                for (reg, temp) in std::mem::take(&mut self.saved) {
                    frame.emit_load_from_stack(reg, temp)?;
                    self.bindings.bind(temp, reg);
                }
            }
            instr => {
                let mut operands: BTreeMap<Temp, Register> = BTreeMap::new();
                for temp in instr.reads() {
                    let reg = match self.bindings.reg_of(temp) {
                        Some(reg) => reg,
                        None => {
                            let reg = self.free_register(bb, i, &operands, regs, frame)?;
                            frame.emit_load_from_stack(reg, temp)?;
                            self.bind(temp, reg, regs);
                            reg
                        }
                    };
                    operands.insert(temp, reg);
                }
                for temp in instr.writes() {
                    let reg = match self.bindings.reg_of(temp) {
                        Some(reg) => reg,
                        None => {
                            let reg = self.free_register(bb, i, &operands, regs, frame)?;
                            self.bind(temp, reg, regs);
                            reg
                        }
                    };
                    operands.insert(temp, reg);
                }

                match instr {
                    PseudoInstr::SpillLoad { dst, slot } => {
                        frame.emit_load_from_stack(operands[dst], *slot)?
                    }
                    PseudoInstr::SpillStore { src, slot } => {
                        frame.emit_store_to_stack(operands[src], *slot)
                    }
                    _ => frame.emit_native(
                        instr.to_native(|t| operands[&t]),
                        Some(instr.to_string()),
                    ),
                }
            }
        }
        Ok(())
    }

    fn bind(&mut self, temp: Temp, reg: Register, regs: &mut RegisterFile) {
        self.bindings.bind(temp, reg);
        regs.mark_used(reg);
    }

    /// A register for a new operand of `bb.locs[i]`. Registers already
    /// holding this instruction's operands are never taken.
    fn free_register(
        &mut self,
        bb: &BasicBlock<PseudoInstr>,
        i: usize,
        pinned: &BTreeMap<Temp, Register>,
        regs: &RegisterFile,
        frame: &mut SubroutineEmitter,
    ) -> Result<Register, CompileError> {
        let live_in = &bb.locs[i].live_in;
        let candidates: Vec<Register> = regs
            .allocatable()
            .into_iter()
            .filter(|r| !pinned.values().any(|p| p == r))
            .collect();

        for &reg in &candidates {
            match self.bindings.occupant(reg) {
                None => return Ok(reg),
                Some(temp) if !live_in.contains(&temp) => {
                    self.bindings.unbind_reg(reg);
                    return Ok(reg);
                }
                Some(_) => {}
            }
        }

        let victim = candidates
            .into_iter()
            .filter_map(|reg| self.bindings.occupant(reg).map(|t| (reg, t)))
            .max_by_key(|&(_, temp)| next_use(bb, i, temp));
        let (reg, temp) = victim.ok_or(CompileError::AllocationDiverged)?;
        log::trace!("evicting {temp} from {reg}");
        frame.emit_store_to_stack(reg, temp);
        self.bindings.unbind_reg(reg);
        Ok(reg)
    }
}

impl Default for LocalRegAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Distance to the next read of `temp` after `bb.locs[i]`, or `usize::MAX`
/// when the block never reads it again.
fn next_use(bb: &BasicBlock<PseudoInstr>, i: usize, temp: Temp) -> usize {
    bb.locs[i + 1..]
        .iter()
        .position(|loc| loc.instr.reads().contains(&temp))
        .unwrap_or(usize::MAX)
}

impl RegAllocator for LocalRegAllocator {
    fn name(&self) -> &'static str {
        "local"
    }

    fn allocate(
        &mut self,
        seq: Vec<PseudoInstr>,
        regs: &mut RegisterFile,
        frame: &mut SubroutineEmitter,
    ) -> Result<(), CompileError> {
        frame.declare_written(seq.iter().flat_map(|i| i.writes()));
        let mut cfg = Cfg::build(seq)?;
        liveness::analyze(&mut cfg);
        self.saved.clear();
        for bb in &cfg.blocks {
            self.allocate_block(bb, regs, frame)?;
        }
        Ok(())
    }
}
