//! Function-wide graph-coloring register allocator.
//!
//! Chaitin/Briggs style: build the interference graph, simplify nodes of
//! degree < K onto a stack, push spill candidates optimistically, then pop
//! and assign colors. Temps left without a color are rewritten through
//! stack slots and the whole process repeats on the new code.

use super::{live_across_call, InterferenceGraph, RegAllocator};
use crate::backend::abi::{Register, RegisterFile};
use crate::backend::cfg::Cfg;
use crate::backend::frame::{SubroutineEmitter, SubroutineInfo};
use crate::backend::instruction::PseudoInstr;
use crate::backend::liveness;
use crate::ir::Temp;
use crate::CompileError;
use std::collections::{BTreeMap, BTreeSet};

/// Spill rounds before giving up.
const MAX_ROUNDS: usize = 16;

pub type Coloring = BTreeMap<Temp, Register>;

pub struct ColoringRegAllocator {
    /// Temps created for spill code; never chosen as spill candidates.
    unspillable: BTreeSet<Temp>,
    next_temp: u32,
}

impl ColoringRegAllocator {
    pub fn new() -> Self {
        Self {
            unspillable: BTreeSet::new(),
            next_temp: 0,
        }
    }

    /// Color `graph` with the allocatable registers. Returns the temps that
    /// could not be colored on failure.
    pub fn color(
        &self,
        graph: &InterferenceGraph,
        regs: &RegisterFile,
    ) -> Result<Coloring, Vec<Temp>> {
        let palette = regs.allocatable();
        let k = palette.len();
        let callee_first: Vec<Register> = regs
            .callee_saved()
            .into_iter()
            .chain(regs.caller_saved())
            .filter(|r| palette.contains(r))
            .collect();

        let mut degree: BTreeMap<Temp, usize> =
            graph.nodes().map(|t| (t, graph.degree(t))).collect();
        let mut stack = Vec::with_capacity(degree.len());

        while !degree.is_empty() {
            let simplifiable = degree.iter().find(|(_, d)| **d < k).map(|(&t, _)| t);
            let Some(pick) = simplifiable.or_else(|| self.spill_candidate(graph, &degree)) else {
                break;
            };
            degree.remove(&pick);
            for n in graph.neighbors(pick) {
                if let Some(d) = degree.get_mut(&n) {
                    *d -= 1;
                }
            }
            stack.push(pick);
        }

        let mut colors = Coloring::new();
        let mut spilled = Vec::new();
        while let Some(t) = stack.pop() {
            let taken: BTreeSet<Register> = graph
                .neighbors(t)
                .filter_map(|n| colors.get(&n).copied())
                .collect();
            let order = if graph.is_live_across_call(t) {
                &callee_first
            } else {
                &palette
            };
            match order.iter().find(|r| !taken.contains(r)) {
                Some(&r) => {
                    colors.insert(t, r);
                }
                None => spilled.push(t),
            }
        }

        if spilled.is_empty() {
            Ok(colors)
        } else {
            spilled.sort();
            Err(spilled)
        }
    }

    /// Cheapest remaining node by occurrences per degree. Spill temps go
    /// last.
    fn spill_candidate(
        &self,
        graph: &InterferenceGraph,
        degree: &BTreeMap<Temp, usize>,
    ) -> Option<Temp> {
        let cost = |t: Temp| {
            if self.unspillable.contains(&t) {
                f64::INFINITY
            } else {
                graph.occurrences(t) as f64 / degree[&t].max(1) as f64
            }
        };
        degree
            .keys()
            .copied()
            .min_by(|&a, &b| cost(a).total_cmp(&cost(b)))
    }

    /// Route every occurrence of a spilled temp through its stack slot,
    /// using a fresh temp per instruction.
    fn rewrite(
        &mut self,
        seq: Vec<PseudoInstr>,
        spilled: &[Temp],
    ) -> Result<Vec<PseudoInstr>, CompileError> {
        let mut out = Vec::with_capacity(seq.len());
        for mut instr in seq {
            let mut after = Vec::new();
            for &slot in spilled {
                let reads = instr.reads().contains(&slot);
                let writes = instr.writes().contains(&slot);
                if !reads && !writes {
                    continue;
                }
                let fresh = Temp(self.next_temp);
                self.next_temp = self
                    .next_temp
                    .checked_add(1)
                    .ok_or(CompileError::TempOverflow)?;
                self.unspillable.insert(fresh);
                log::trace!("spilling {slot} through {fresh}");

                if reads {
                    out.push(PseudoInstr::SpillLoad { dst: fresh, slot });
                }
                instr.replace_temp(slot, fresh);
                if writes {
                    after.push(PseudoInstr::SpillStore { src: fresh, slot });
                }
            }
            out.push(instr);
            out.append(&mut after);
        }
        Ok(out)
    }

    /// Color the function, spilling and rewriting until every temp has a
    /// register. Returns the final code with its liveness and the coloring.
    pub fn assign(
        &mut self,
        seq: Vec<PseudoInstr>,
        regs: &RegisterFile,
        info: &SubroutineInfo,
    ) -> Result<(Cfg<PseudoInstr>, Coloring), CompileError> {
        self.unspillable.clear();
        self.next_temp = info.num_args as u32;
        for t in seq.iter().flat_map(|i| i.reads().into_iter().chain(i.writes())) {
            let past = t.0.checked_add(1).ok_or(CompileError::TempOverflow)?;
            self.next_temp = self.next_temp.max(past);
        }

        let mut seq = seq;
        for round in 1..=MAX_ROUNDS {
            let mut cfg = Cfg::build(seq.clone())?;
            liveness::analyze(&mut cfg);
            let graph = InterferenceGraph::build(&cfg);
            match self.color(&graph, regs) {
                Ok(colors) => {
                    log::debug!(
                        "{}: colored {} temps in {round} round(s)",
                        info.label,
                        graph.len()
                    );
                    return Ok((cfg, colors));
                }
                Err(spilled) => {
                    log::debug!("{}: round {round} spills {:?}", info.label, spilled);
                    seq = self.rewrite(seq, &spilled)?;
                }
            }
        }
        Err(CompileError::AllocationDiverged)
    }

    fn emit(
        &self,
        cfg: &Cfg<PseudoInstr>,
        colors: &Coloring,
        regs: &mut RegisterFile,
        frame: &mut SubroutineEmitter,
    ) -> Result<(), CompileError> {
        for &reg in colors.values() {
            regs.mark_used(reg);
        }

        // Arguments enter in memory; load them once, ahead of any loop label
        // on the entry block.
        for &t in &cfg.entry().live_in {
            frame.emit_load_from_stack(colors[&t], t)?;
        }

        let mut saved: Vec<(Register, Temp)> = Vec::new();
        for bb in &cfg.blocks {
            if let Some(label) = &bb.label {
                frame.emit_label(label);
            }
            for (i, loc) in bb.locs.iter().enumerate() {
                match &loc.instr {
                    PseudoInstr::CallerSave => {
                        saved = live_across_call(&bb.locs[i..])
                            .into_iter()
                            .map(|t| (colors[&t], t))
                            .filter(|&(r, _)| regs.is_caller_saved(r))
                            .collect();
                        for &(reg, temp) in &saved {
                            frame.emit_store_to_stack(reg, temp);
                        }
                    }
                    PseudoInstr::CallerRestore => {
                        for (reg, temp) in saved.drain(..) {
                            frame.emit_load_from_stack(reg, temp)?;
                        }
                    }
                    PseudoInstr::SpillLoad { dst, slot } => {
                        frame.emit_load_from_stack(colors[dst], *slot)?
                    }
                    PseudoInstr::SpillStore { src, slot } => {
                        frame.emit_store_to_stack(colors[src], *slot)
                    }
                    instr => frame.emit_native(
                        instr.to_native(|t| colors[&t]),
                        Some(instr.to_string()),
                    ),
                }
            }
        }
        Ok(())
    }
}

impl Default for ColoringRegAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RegAllocator for ColoringRegAllocator {
    fn name(&self) -> &'static str {
        "coloring"
    }

    fn allocate(
        &mut self,
        seq: Vec<PseudoInstr>,
        regs: &mut RegisterFile,
        frame: &mut SubroutineEmitter,
    ) -> Result<(), CompileError> {
        frame.declare_written(seq.iter().flat_map(|i| i.writes()));
        let (cfg, colors) = self.assign(seq, regs, frame.info())?;
        self.emit(&cfg, &colors, regs, frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::instruction::{AsmItem, BinaryOp, Operand, X86Instr};
    use crate::ir::Label;

    fn analyzed(seq: Vec<PseudoInstr>) -> Cfg<PseudoInstr> {
        let mut cfg = Cfg::build(seq).unwrap();
        liveness::analyze(&mut cfg);
        cfg
    }

    fn ret_of(t: u32) -> [PseudoInstr; 2] {
        [
            PseudoInstr::Move {
                dst: Operand::Reg(Register::Eax),
                src: Operand::Temp(Temp(t)),
            },
            PseudoInstr::JumpToEpilogue(Label::new("f")),
        ]
    }

    /// `n` values all live at once, then summed into _T0.
    fn pressure(n: u32) -> Vec<PseudoInstr> {
        let mut seq: Vec<PseudoInstr> = (0..n)
            .map(|t| PseudoInstr::LoadImm {
                dst: Temp(t),
                value: t as i32,
            })
            .collect();
        for t in 1..n {
            seq.push(PseudoInstr::Binary {
                op: BinaryOp::Add,
                dst: Temp(0),
                rhs: Temp(t),
            });
        }
        seq.extend(ret_of(0));
        seq
    }

    /// A written temp never shares a register with another temp live after
    /// the write, except the source of a plain move.
    fn check_coloring(cfg: &Cfg<PseudoInstr>, colors: &Coloring) {
        for bb in &cfg.blocks {
            for loc in &bb.locs {
                let copied = match &loc.instr {
                    PseudoInstr::Move { src, .. } => src.temp(),
                    _ => None,
                };
                for w in loc.instr.writes() {
                    for &t in &loc.live_out {
                        if t != w && Some(t) != copied {
                            assert_ne!(colors[&w], colors[&t], "{w} and {t} share a register");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn simultaneously_live_temps_get_distinct_registers() {
        let cfg = analyzed(pressure(4));
        let graph = InterferenceGraph::build(&cfg);
        let colors = ColoringRegAllocator::new()
            .color(&graph, &RegisterFile::i386())
            .unwrap();
        check_coloring(&cfg, &colors);
        assert!(colors.values().all(|r| *r != Register::Eax && *r != Register::Edx));
    }

    #[test]
    fn too_many_live_values_spill_and_converge() {
        let mut regs = RegisterFile::i386();
        let mut frame = SubroutineEmitter::new(SubroutineInfo::new(Label::new("f"), 0), &regs);
        let mut alloc = ColoringRegAllocator::new();
        alloc.allocate(pressure(7), &mut regs, &mut frame).unwrap();
        assert!(!alloc.unspillable.is_empty());

        let (item, info) = frame.finish(&regs);
        let AsmItem::Function { body, .. } = item else {
            panic!("expected a function");
        };
        let stores = body
            .iter()
            .filter(|i| {
                matches!(
                    i,
                    AsmItem::Instr {
                        instr: X86Instr::Store { .. },
                        ..
                    }
                )
            })
            .count();
        assert!(stores > 0);
        assert!(info.frame_size > 12);
    }

    #[test]
    fn spilled_code_still_colors_conflict_free() {
        let info = SubroutineInfo::new(Label::new("f"), 0);
        let (cfg, colors) = ColoringRegAllocator::new()
            .assign(pressure(9), &RegisterFile::i386(), &info)
            .unwrap();
        assert!(cfg
            .blocks
            .iter()
            .flat_map(|b| &b.locs)
            .any(|l| matches!(l.instr, PseudoInstr::SpillLoad { .. })));
        check_coloring(&cfg, &colors);
    }

    #[test]
    fn temp_numbering_overflow_is_reported() {
        let info = SubroutineInfo::new(Label::new("f"), 0);
        let mut seq = vec![PseudoInstr::LoadImm {
            dst: Temp(u32::MAX),
            value: 1,
        }];
        seq.extend(ret_of(u32::MAX));
        assert_eq!(
            ColoringRegAllocator::new()
                .assign(seq, &RegisterFile::i386(), &info)
                .unwrap_err(),
            CompileError::TempOverflow
        );
    }

    #[test]
    fn spill_rewrite_loads_before_reads_and_stores_after_writes() {
        let mut alloc = ColoringRegAllocator::new();
        alloc.next_temp = 10;
        let seq = vec![
            PseudoInstr::LoadImm {
                dst: Temp(1),
                value: 3,
            },
            PseudoInstr::Binary {
                op: BinaryOp::Add,
                dst: Temp(1),
                rhs: Temp(0),
            },
        ];
        let out = alloc.rewrite(seq, &[Temp(1)]).unwrap();
        assert_eq!(
            out,
            vec![
                PseudoInstr::LoadImm {
                    dst: Temp(10),
                    value: 3
                },
                PseudoInstr::SpillStore {
                    src: Temp(10),
                    slot: Temp(1)
                },
                PseudoInstr::SpillLoad {
                    dst: Temp(11),
                    slot: Temp(1)
                },
                PseudoInstr::Binary {
                    op: BinaryOp::Add,
                    dst: Temp(11),
                    rhs: Temp(0)
                },
                PseudoInstr::SpillStore {
                    src: Temp(11),
                    slot: Temp(1)
                },
            ]
        );
    }

    #[test]
    fn values_live_across_a_call_prefer_callee_saved_registers() {
        let mut seq = vec![
            PseudoInstr::LoadImm {
                dst: Temp(0),
                value: 1,
            },
            PseudoInstr::CallerSave,
            PseudoInstr::Call {
                target: Label::new("_Halt"),
                argc: 0,
            },
            PseudoInstr::CallerRestore,
        ];
        seq.extend(ret_of(0));
        let cfg = analyzed(seq);
        let graph = InterferenceGraph::build(&cfg);
        let colors = ColoringRegAllocator::new()
            .color(&graph, &RegisterFile::i386())
            .unwrap();
        assert_eq!(colors[&Temp(0)], Register::Ebx);
    }
}
