//! Liveness analysis over a function's control-flow graph.
//!
//! Computes `def`/`live_use` per block, iterates the backward dataflow
//! equations to a fixpoint, then refines the result to every instruction.
//! Both register allocators build on the per-instruction sets.

use super::cfg::{BasicBlock, Cfg, InstrLike};
use crate::ir::Temp;
use std::collections::BTreeSet;

/// Run liveness analysis in place. Returns the number of passes the
/// fixpoint took (the last one changes nothing).
pub fn analyze<I: InstrLike>(cfg: &mut Cfg<I>) -> usize {
    for bb in &mut cfg.blocks {
        compute_def_and_live_use(bb);
        bb.live_in = bb.live_use.clone();
        bb.live_out.clear();
    }

    let mut passes = 0;
    let mut changed = true;
    while changed {
        changed = false;
        passes += 1;
        // Reverse layout order converges faster for a backward problem.
        for b in (0..cfg.blocks.len()).rev() {
            let mut out = BTreeSet::new();
            for &s in cfg.succ(b) {
                out.extend(cfg.blocks[s].live_in.iter().copied());
            }

            let bb = &mut cfg.blocks[b];
            let mut new_in = bb.live_use.clone();
            new_in.extend(out.difference(&bb.def).copied());

            if new_in != bb.live_in || out != bb.live_out {
                changed = true;
                bb.live_in = new_in;
                bb.live_out = out;
            }
        }
    }

    for bb in &mut cfg.blocks {
        analyze_each_loc(bb);
    }
    log::debug!("liveness reached a fixpoint after {passes} passes");
    passes
}

/// `def` is every temp the block writes; `live_use` only those read before
/// the block itself (re)assigns them.
fn compute_def_and_live_use<I: InstrLike>(bb: &mut BasicBlock<I>) {
    bb.def.clear();
    bb.live_use.clear();
    for loc in &bb.locs {
        for t in loc.instr.reads() {
            if !bb.def.contains(&t) {
                bb.live_use.insert(t);
            }
        }
        bb.def.extend(loc.instr.writes());
    }
}

/// Each instruction is a one-instruction block: walking backwards from the
/// block's `live_out` gives the live sets at every program point.
fn analyze_each_loc<I: InstrLike>(bb: &mut BasicBlock<I>) {
    let mut live: BTreeSet<Temp> = bb.live_out.clone();
    for loc in bb.locs.iter_mut().rev() {
        loc.live_out = live.clone();
        for t in loc.instr.writes() {
            live.remove(&t);
        }
        live.extend(loc.instr.reads());
        loc.live_in = live.clone();
    }
}
