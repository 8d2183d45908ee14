//! TAC → pseudo-instruction selection.
//!
//! Each TAC instruction becomes one or more `PseudoInstr`s that still refer
//! to virtual temps. Register binding happens later in `regalloc`.

use super::abi::Register;
use super::context::CompileContext;
use super::frame::SubroutineInfo;
use super::instruction::{BinaryOp, BranchWhen, Cond, Operand, PseudoInstr, UnaryOp};
use crate::ir::{
    vtable_label, CondBranchOp, Intrinsic, Label, MemoryOp, TacBinaryOp, TacFunc, TacInstr,
    TacUnaryOp, Temp,
};
use crate::CompileError;

/// Selector output for one function.
#[derive(Debug, Clone)]
pub struct SelectedFunc {
    pub seq: Vec<PseudoInstr>,
    pub info: SubroutineInfo,
}

/// Select instructions for a whole function.
///
/// Branches are first lowered to native jumps; everything else goes through
/// the per-instruction selector.
pub fn select_function(
    func: &TacFunc,
    ctx: &mut CompileContext,
) -> Result<SelectedFunc, CompileError> {
    let mut selector = InstrSelector::new(func.entry.clone(), ctx);
    for instr in &func.instrs {
        if !selector.lower_control_flow(instr) {
            selector.select(instr)?;
        }
    }
    let seq = selector.finish();
    log::trace!("{}: selected {} pseudo-instructions", func.entry, seq.len());
    Ok(SelectedFunc {
        seq,
        info: SubroutineInfo::new(func.entry.clone(), func.num_args),
    })
}

fn unary_op(op: TacUnaryOp) -> UnaryOp {
    match op {
        TacUnaryOp::Neg => UnaryOp::Neg,
        TacUnaryOp::LNot => UnaryOp::Not,
    }
}

/// Arithmetic and logical operators map one-to-one; every relational
/// operator becomes the compare form.
fn binary_op(op: TacBinaryOp) -> BinaryOp {
    match op {
        TacBinaryOp::Add => BinaryOp::Add,
        TacBinaryOp::Sub => BinaryOp::Sub,
        TacBinaryOp::Mul => BinaryOp::Mul,
        TacBinaryOp::Div => BinaryOp::Div,
        TacBinaryOp::Mod => BinaryOp::Rem,
        TacBinaryOp::LAnd => BinaryOp::And,
        TacBinaryOp::LOr => BinaryOp::Or,
        TacBinaryOp::Equ => BinaryOp::Cmp(Cond::Eq),
        TacBinaryOp::Neq => BinaryOp::Cmp(Cond::Ne),
        TacBinaryOp::Les => BinaryOp::Cmp(Cond::Lt),
        TacBinaryOp::Leq => BinaryOp::Cmp(Cond::Le),
        TacBinaryOp::Gtr => BinaryOp::Cmp(Cond::Gt),
        TacBinaryOp::Geq => BinaryOp::Cmp(Cond::Ge),
    }
}

pub struct InstrSelector<'a> {
    entry: Label,
    ctx: &'a mut CompileContext,
    seq: Vec<PseudoInstr>,
    /// Arguments staged by `parm`, in source (left-to-right) order.
    staged_args: Vec<Temp>,
}

impl<'a> InstrSelector<'a> {
    pub fn new(entry: Label, ctx: &'a mut CompileContext) -> Self {
        Self {
            entry,
            ctx,
            seq: Vec::new(),
            staged_args: Vec::new(),
        }
    }

    pub fn finish(self) -> Vec<PseudoInstr> {
        self.seq
    }

    fn push(&mut self, instr: PseudoInstr) {
        self.seq.push(instr);
    }

    /// Turn a TAC branch into a native jump. Returns `false` for anything
    /// that is not a branch.
    pub fn lower_control_flow(&mut self, instr: &TacInstr) -> bool {
        match instr {
            TacInstr::Branch { target } => self.push(PseudoInstr::Jump(target.clone())),
            TacInstr::CondBranch { op, cond, target } => self.push(PseudoInstr::CondJump {
                cond: *cond,
                when: match op {
                    CondBranchOp::Beqz => BranchWhen::Zero,
                    CondBranchOp::Bnez => BranchWhen::NonZero,
                },
                target: target.clone(),
            }),
            _ => return false,
        }
        true
    }

    /// Select a single non-branch TAC instruction.
    pub fn select(&mut self, instr: &TacInstr) -> Result<(), CompileError> {
        match instr {
            TacInstr::Assign { dst, src } => self.emit_move(*dst, *src),
            TacInstr::LoadVTbl { dst, class } => self.push(PseudoInstr::LoadAddr {
                dst: *dst,
                label: vtable_label(class),
            }),
            TacInstr::LoadImm4 { dst, value } => self.push(PseudoInstr::LoadImm {
                dst: *dst,
                value: *value,
            }),
            TacInstr::LoadStrConst { dst, value } => {
                let index = self.ctx.intern(value);
                self.push(PseudoInstr::LoadStr { dst: *dst, index });
            }
            TacInstr::Unary { op, dst, operand } => {
                self.emit_move(*dst, *operand);
                self.push(PseudoInstr::Unary {
                    op: unary_op(*op),
                    dst: *dst,
                });
            }
            TacInstr::Binary { op, dst, lhs, rhs } => {
                self.emit_binary(binary_op(*op), *dst, *lhs, *rhs)
            }
            TacInstr::Branch { .. } | TacInstr::CondBranch { .. } => {
                return Err(CompileError::RawBranch(instr.to_string()));
            }
            TacInstr::Return { value } => {
                if let Some(v) = value {
                    self.push(PseudoInstr::Move {
                        dst: Operand::Reg(Register::RETURN_REG),
                        src: Operand::Temp(*v),
                    });
                }
                self.push(PseudoInstr::JumpToEpilogue(self.entry.clone()));
            }
            TacInstr::Parm { value } => self.staged_args.push(*value),
            TacInstr::IndirectCall { entry, .. } => {
                return Err(CompileError::IndirectCall(*entry));
            }
            TacInstr::DirectCall { dst, entry } => self.emit_call(*dst, entry),
            TacInstr::Memory {
                op,
                dst,
                base,
                offset,
            } => self.push(match op {
                MemoryOp::Load => PseudoInstr::LoadWord {
                    dst: *dst,
                    base: *base,
                    offset: *offset,
                },
                MemoryOp::Store => PseudoInstr::StoreWord {
                    src: *dst,
                    base: *base,
                    offset: *offset,
                },
            }),
            TacInstr::Mark { label } => self.push(PseudoInstr::Label(label.clone())),
        }
        Ok(())
    }

    fn emit_move(&mut self, dst: Temp, src: Temp) {
        if dst != src {
            self.push(PseudoInstr::Move {
                dst: Operand::Temp(dst),
                src: Operand::Temp(src),
            });
        }
    }

    /// `dst = lhs op rhs` in two-operand form.
    fn emit_binary(&mut self, op: BinaryOp, dst: Temp, lhs: Temp, rhs: Temp) {
        if rhs == dst && lhs != dst {
            // Moving `lhs` into `dst` would clobber `rhs`.
            match op {
                BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or => {
                    self.push(PseudoInstr::Binary { op, dst, rhs: lhs })
                }
                BinaryOp::Cmp(cond) => self.push(PseudoInstr::Binary {
                    op: BinaryOp::Cmp(cond.mirrored()),
                    dst,
                    rhs: lhs,
                }),
                BinaryOp::Sub => {
                    self.push(PseudoInstr::Unary {
                        op: UnaryOp::Neg,
                        dst,
                    });
                    self.push(PseudoInstr::Binary {
                        op: BinaryOp::Add,
                        dst,
                        rhs: lhs,
                    });
                }
                BinaryOp::Div | BinaryOp::Rem => self.push(PseudoInstr::RevDiv { op, dst, lhs }),
            }
            return;
        }
        self.emit_move(dst, lhs);
        self.push(PseudoInstr::Binary { op, dst, rhs });
    }

    /// Caller-save marker, arguments pushed right-to-left, the call, the
    /// restore marker, then the result out of `%eax`.
    fn emit_call(&mut self, dst: Option<Temp>, entry: &Label) {
        if let Some(intrinsic) = Intrinsic::from_label(entry) {
            self.ctx.note_intrinsic(intrinsic);
        }

        self.push(PseudoInstr::CallerSave);
        let args = std::mem::take(&mut self.staged_args);
        let argc = args.len();
        for src in args.into_iter().rev() {
            self.push(PseudoInstr::Push { src });
        }
        self.push(PseudoInstr::Call {
            target: entry.clone(),
            argc,
        });
        self.push(PseudoInstr::CallerRestore);

        if let Some(d) = dst {
            self.push(PseudoInstr::Move {
                dst: Operand::Temp(d),
                src: Operand::Reg(Register::RETURN_REG),
            });
        }
    }
}
