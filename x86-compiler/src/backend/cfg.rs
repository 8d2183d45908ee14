//! Basic blocks and the control-flow graph of one function.

use crate::ir::{Label, Temp};
use crate::CompileError;
use std::collections::{BTreeSet, HashMap};

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow<'a> {
    Next,
    Label(&'a Label),
    Jump(&'a Label),
    CondJump(&'a Label),
    Return,
}

/// What liveness and CFG construction need to know about an instruction.
pub trait InstrLike {
    fn reads(&self) -> Vec<Temp>;
    fn writes(&self) -> Vec<Temp>;
    fn flow(&self) -> Flow<'_>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Continuous,
    EndByJump,
    EndByCondJump,
    EndByReturn,
}

/// One instruction together with the temps live around it.
#[derive(Debug, Clone)]
pub struct Loc<I> {
    pub instr: I,
    pub live_in: BTreeSet<Temp>,
    pub live_out: BTreeSet<Temp>,
}

#[derive(Debug, Clone)]
pub struct BasicBlock<I> {
    pub id: usize,
    pub label: Option<Label>,
    pub kind: BlockKind,
    pub locs: Vec<Loc<I>>,
    pub def: BTreeSet<Temp>,
    pub live_use: BTreeSet<Temp>,
    pub live_in: BTreeSet<Temp>,
    pub live_out: BTreeSet<Temp>,
}

impl<I> BasicBlock<I> {
    fn new(id: usize, label: Option<Label>) -> Self {
        Self {
            id,
            label,
            kind: BlockKind::Continuous,
            locs: Vec::new(),
            def: BTreeSet::new(),
            live_use: BTreeSet::new(),
            live_in: BTreeSet::new(),
            live_out: BTreeSet::new(),
        }
    }

    /// The instruction that ends the block, if it is a jump or return.
    pub fn terminator(&self) -> Option<&Loc<I>> {
        match self.kind {
            BlockKind::Continuous => None,
            _ => self.locs.last(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cfg<I> {
    pub blocks: Vec<BasicBlock<I>>,
    succ: Vec<Vec<usize>>,
    pred: Vec<Vec<usize>>,
}

impl<I: InstrLike> Cfg<I> {
    /// Split an instruction sequence into basic blocks and link them.
    ///
    /// Block 0 is the entry. Labels are kept on their block rather than as
    /// instructions.
    pub fn build(seq: Vec<I>) -> Result<Self, CompileError> {
        let mut blocks: Vec<BasicBlock<I>> = Vec::new();
        let mut current = BasicBlock::new(0, None);
        let mut targets: Vec<Option<Label>> = Vec::new();

        enum Step {
            Label(Label),
            Next,
            End(BlockKind, Option<Label>),
        }

        for instr in seq {
            let step = match instr.flow() {
                Flow::Label(l) => Step::Label(l.clone()),
                Flow::Next => Step::Next,
                Flow::Jump(t) => Step::End(BlockKind::EndByJump, Some(t.clone())),
                Flow::CondJump(t) => Step::End(BlockKind::EndByCondJump, Some(t.clone())),
                Flow::Return => Step::End(BlockKind::EndByReturn, None),
            };
            match step {
                Step::Label(label) => {
                    if current.label.is_some() || !current.locs.is_empty() {
                        targets.push(None);
                        blocks.push(current);
                        current = BasicBlock::new(blocks.len(), Some(label));
                    } else {
                        current.label = Some(label);
                    }
                }
                Step::Next => current.locs.push(Loc::new(instr)),
                Step::End(kind, target) => {
                    current.kind = kind;
                    current.locs.push(Loc::new(instr));
                    targets.push(target);
                    blocks.push(current);
                    current = BasicBlock::new(blocks.len(), None);
                }
            }
        }
        if current.label.is_some() || !current.locs.is_empty() || blocks.is_empty() {
            targets.push(None);
            blocks.push(current);
        }

        let by_label: HashMap<&Label, usize> = blocks
            .iter()
            .filter_map(|b| b.label.as_ref().map(|l| (l, b.id)))
            .collect();

        let n = blocks.len();
        let mut succ = vec![Vec::new(); n];
        for (b, target) in blocks.iter().zip(&targets) {
            let jump_to = match target {
                Some(t) => Some(
                    *by_label
                        .get(t)
                        .ok_or_else(|| CompileError::UndefinedLabel(t.clone()))?,
                ),
                None => None,
            };
            match b.kind {
                BlockKind::Continuous => {
                    if b.id + 1 < n {
                        succ[b.id].push(b.id + 1);
                    }
                }
                BlockKind::EndByJump => succ[b.id].extend(jump_to),
                BlockKind::EndByCondJump => {
                    succ[b.id].extend(jump_to);
                    if b.id + 1 < n && jump_to != Some(b.id + 1) {
                        succ[b.id].push(b.id + 1);
                    }
                }
                BlockKind::EndByReturn => {}
            }
        }

        let mut pred = vec![Vec::new(); n];
        for (b, ss) in succ.iter().enumerate() {
            for &s in ss {
                pred[s].push(b);
            }
        }

        Ok(Self {
            blocks,
            succ,
            pred,
        })
    }
}

impl<I> Cfg<I> {
    pub fn succ(&self, block: usize) -> &[usize] {
        &self.succ[block]
    }

    pub fn pred(&self, block: usize) -> &[usize] {
        &self.pred[block]
    }

    pub fn entry(&self) -> &BasicBlock<I> {
        &self.blocks[0]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl<I> Loc<I> {
    fn new(instr: I) -> Self {
        Self {
            instr,
            live_in: BTreeSet::new(),
            live_out: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::instruction::{BranchWhen, PseudoInstr};

    fn label(s: &str) -> Label {
        Label::new(s)
    }

    #[test]
    fn splits_at_labels_and_jumps() {
        let seq = vec![
            PseudoInstr::LoadImm {
                dst: Temp(0),
                value: 1,
            },
            PseudoInstr::CondJump {
                cond: Temp(0),
                when: BranchWhen::Zero,
                target: label("_L2"),
            },
            PseudoInstr::LoadImm {
                dst: Temp(1),
                value: 2,
            },
            PseudoInstr::Jump(label("_L3")),
            PseudoInstr::Label(label("_L2")),
            PseudoInstr::LoadImm {
                dst: Temp(1),
                value: 3,
            },
            PseudoInstr::Label(label("_L3")),
            PseudoInstr::JumpToEpilogue(label("main")),
        ];
        let cfg = Cfg::build(seq).unwrap();
        assert_eq!(cfg.len(), 4);
        assert_eq!(cfg.blocks[0].kind, BlockKind::EndByCondJump);
        assert_eq!(cfg.succ(0), &[2, 1]);
        assert_eq!(cfg.succ(1), &[3]);
        assert_eq!(cfg.succ(2), &[3]);
        assert!(cfg.succ(3).is_empty());
        assert_eq!(cfg.pred(3), &[1, 2]);
        assert_eq!(cfg.blocks[3].label, Some(label("_L3")));
    }

    #[test]
    fn jump_to_unknown_label_is_rejected() {
        let seq = vec![PseudoInstr::Jump(label("_Lmissing"))];
        assert!(matches!(
            Cfg::build(seq),
            Err(CompileError::UndefinedLabel(_))
        ));
    }

    #[test]
    fn empty_function_has_one_block() {
        let cfg: Cfg<PseudoInstr> = Cfg::build(Vec::new()).unwrap();
        assert_eq!(cfg.len(), 1);
        assert!(cfg.entry().locs.is_empty());
    }
}
