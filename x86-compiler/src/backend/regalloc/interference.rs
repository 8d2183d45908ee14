//! Interference graph over the temps of one function.

use crate::backend::cfg::Cfg;
use crate::backend::instruction::{Operand, PseudoInstr};
use crate::ir::Temp;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct InterferenceGraph {
    adj: BTreeMap<Temp, BTreeSet<Temp>>,
    occurrences: BTreeMap<Temp, usize>,
    /// Temps live across at least one call.
    across_call: BTreeSet<Temp>,
}

impl InterferenceGraph {
    /// Build from a CFG whose per-instruction liveness is already computed.
    pub fn build(cfg: &Cfg<PseudoInstr>) -> Self {
        let mut g = Self::default();

        // Arguments all hold values on entry.
        let args: Vec<Temp> = cfg.entry().live_in.iter().copied().collect();
        for (i, &a) in args.iter().enumerate() {
            g.add_node(a);
            for &b in &args[i + 1..] {
                g.add_edge(a, b);
            }
        }

        for bb in &cfg.blocks {
            for loc in &bb.locs {
                let instr = &loc.instr;
                for t in instr.reads().into_iter().chain(instr.writes()) {
                    g.add_node(t);
                    *g.occurrences.entry(t).or_default() += 1;
                }

                // A temp-to-temp move lets source and destination share.
                let move_src = match instr {
                    PseudoInstr::Move {
                        dst: Operand::Temp(_),
                        src: Operand::Temp(s),
                    } => Some(*s),
                    _ => None,
                };
                for d in instr.writes() {
                    for &t in &loc.live_out {
                        if t != d && Some(t) != move_src {
                            g.add_edge(d, t);
                        }
                    }
                }

                if instr.is_call() {
                    g.across_call.extend(loc.live_out.iter().copied());
                }
            }
        }
        g
    }

    fn add_node(&mut self, t: Temp) {
        self.adj.entry(t).or_default();
    }

    fn add_edge(&mut self, a: Temp, b: Temp) {
        self.adj.entry(a).or_default().insert(b);
        self.adj.entry(b).or_default().insert(a);
    }

    pub fn nodes(&self) -> impl Iterator<Item = Temp> + '_ {
        self.adj.keys().copied()
    }

    pub fn neighbors(&self, t: Temp) -> impl Iterator<Item = Temp> + '_ {
        self.adj.get(&t).into_iter().flatten().copied()
    }

    pub fn degree(&self, t: Temp) -> usize {
        self.adj.get(&t).map_or(0, BTreeSet::len)
    }

    pub fn interferes(&self, a: Temp, b: Temp) -> bool {
        self.adj.get(&a).is_some_and(|n| n.contains(&b))
    }

    pub fn occurrences(&self, t: Temp) -> usize {
        self.occurrences.get(&t).copied().unwrap_or(0)
    }

    pub fn is_live_across_call(&self, t: Temp) -> bool {
        self.across_call.contains(&t)
    }

    pub fn len(&self) -> usize {
        self.adj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }
}
