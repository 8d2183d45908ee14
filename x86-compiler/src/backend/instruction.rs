//! Pseudo-instructions, i386 machine instructions and assembly output items.
//!
//! This module defines the instruction vocabulary the selector produces
//! (`PseudoInstr`, still over virtual temps), the concrete AT&T-syntax
//! instructions the allocator lowers it to (`X86Instr`), and the structured
//! output type (`AsmItem`) the emitter flattens to text.

use super::abi::Register;
use super::cfg::{Flow, InstrLike};
use super::frame::epilogue_label;
use super::pool::string_label;
use crate::ir::{Label, Temp};
use std::fmt;

// ============================================================================
// Operators
// ============================================================================

/// Condition codes, used by `setcc` and conditional jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cond {
    pub fn suffix(&self) -> &'static str {
        match self {
            Cond::Eq => "e",
            Cond::Ne => "ne",
            Cond::Lt => "l",
            Cond::Le => "le",
            Cond::Gt => "g",
            Cond::Ge => "ge",
        }
    }

    /// The condition that holds for `(b, a)` whenever `self` holds for `(a, b)`.
    pub fn mirrored(&self) -> Cond {
        match self {
            Cond::Eq => Cond::Eq,
            Cond::Ne => Cond::Ne,
            Cond::Lt => Cond::Gt,
            Cond::Le => Cond::Ge,
            Cond::Gt => Cond::Lt,
            Cond::Ge => Cond::Le,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    /// Logical not of a 0/1 value.
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    /// Every relational operator shares this form; the result is 0 or 1.
    Cmp(Cond),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchWhen {
    Zero,
    NonZero,
}

// ============================================================================
// Pseudo-instructions
// ============================================================================

/// A `Move` endpoint: a temp, or a physical register fixed by the convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Temp(Temp),
    Reg(Register),
}

impl Operand {
    pub fn temp(&self) -> Option<Temp> {
        match self {
            Operand::Temp(t) => Some(*t),
            Operand::Reg(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(t) => write!(f, "{t}"),
            Operand::Reg(r) => write!(f, "{r}"),
        }
    }
}

/// Target instruction still referencing virtual temps.
///
/// Binary and unary forms are destructive on `dst` (two-operand form): the
/// selector moves the first operand into `dst` beforehand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoInstr {
    Move { dst: Operand, src: Operand },
    LoadImm { dst: Temp, value: i32 },
    LoadAddr { dst: Temp, label: Label },
    /// Address of string constant `_S<index>`.
    LoadStr { dst: Temp, index: usize },
    Unary { op: UnaryOp, dst: Temp },
    Binary { op: BinaryOp, dst: Temp, rhs: Temp },
    /// `dst = lhs / dst` (or `%`); only `Div` and `Rem`.
    RevDiv { op: BinaryOp, dst: Temp, lhs: Temp },
    LoadWord { dst: Temp, base: Temp, offset: i32 },
    StoreWord { src: Temp, base: Temp, offset: i32 },
    /// Stage one call argument on the stack.
    Push { src: Temp },
    /// Direct call; the caller pops `argc` words afterwards.
    Call { target: Label, argc: usize },
    Label(Label),
    Jump(Label),
    CondJump { cond: Temp, when: BranchWhen, target: Label },
    /// Return: jump to the epilogue of the function entered at this label.
    JumpToEpilogue(Label),
    /// Placeholder for caller-saved register stores, resolved by the allocator.
    CallerSave,
    /// Placeholder for caller-saved register reloads, resolved by the allocator.
    CallerRestore,
    /// Allocator-inserted reload of spilled `slot` into `dst`.
    SpillLoad { dst: Temp, slot: Temp },
    /// Allocator-inserted store of `src` into the stack slot of `slot`.
    SpillStore { src: Temp, slot: Temp },
}

fn dedup(mut temps: Vec<Temp>) -> Vec<Temp> {
    temps.dedup();
    temps
}

impl PseudoInstr {
    /// Temps whose values this instruction reads.
    pub fn reads(&self) -> Vec<Temp> {
        match self {
            PseudoInstr::Move { src, .. } => src.temp().into_iter().collect(),
            PseudoInstr::Unary { dst, .. } => vec![*dst],
            PseudoInstr::Binary { dst, rhs, .. } => dedup(vec![*dst, *rhs]),
            PseudoInstr::RevDiv { dst, lhs, .. } => dedup(vec![*lhs, *dst]),
            PseudoInstr::LoadWord { base, .. } => vec![*base],
            PseudoInstr::StoreWord { src, base, .. } => dedup(vec![*src, *base]),
            PseudoInstr::Push { src } | PseudoInstr::SpillStore { src, .. } => vec![*src],
            PseudoInstr::CondJump { cond, .. } => vec![*cond],
            PseudoInstr::LoadImm { .. }
            | PseudoInstr::LoadAddr { .. }
            | PseudoInstr::LoadStr { .. }
            | PseudoInstr::Call { .. }
            | PseudoInstr::Label(_)
            | PseudoInstr::Jump(_)
            | PseudoInstr::JumpToEpilogue(_)
            | PseudoInstr::CallerSave
            | PseudoInstr::CallerRestore
            | PseudoInstr::SpillLoad { .. } => Vec::new(),
        }
    }

    /// Temps this instruction assigns.
    pub fn writes(&self) -> Vec<Temp> {
        match self {
            PseudoInstr::Move { dst, .. } => dst.temp().into_iter().collect(),
            PseudoInstr::LoadImm { dst, .. }
            | PseudoInstr::LoadAddr { dst, .. }
            | PseudoInstr::LoadStr { dst, .. }
            | PseudoInstr::Unary { dst, .. }
            | PseudoInstr::Binary { dst, .. }
            | PseudoInstr::RevDiv { dst, .. }
            | PseudoInstr::LoadWord { dst, .. }
            | PseudoInstr::SpillLoad { dst, .. } => vec![*dst],
            PseudoInstr::StoreWord { .. }
            | PseudoInstr::Push { .. }
            | PseudoInstr::Call { .. }
            | PseudoInstr::Label(_)
            | PseudoInstr::Jump(_)
            | PseudoInstr::CondJump { .. }
            | PseudoInstr::JumpToEpilogue(_)
            | PseudoInstr::CallerSave
            | PseudoInstr::CallerRestore
            | PseudoInstr::SpillStore { .. } => Vec::new(),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, PseudoInstr::Call { .. })
    }

    /// Rename every occurrence of `from` to `to` (reads and writes alike).
    pub fn replace_temp(&mut self, from: Temp, to: Temp) {
        let swap = |t: &mut Temp| {
            if *t == from {
                *t = to;
            }
        };
        match self {
            PseudoInstr::Move { dst, src } => {
                for op in [dst, src] {
                    if let Operand::Temp(t) = op {
                        swap(t);
                    }
                }
            }
            PseudoInstr::LoadImm { dst, .. }
            | PseudoInstr::LoadAddr { dst, .. }
            | PseudoInstr::LoadStr { dst, .. }
            | PseudoInstr::Unary { dst, .. } => swap(dst),
            PseudoInstr::Binary { dst, rhs, .. } => {
                swap(dst);
                swap(rhs);
            }
            PseudoInstr::RevDiv { dst, lhs, .. } => {
                swap(dst);
                swap(lhs);
            }
            PseudoInstr::LoadWord { dst, base, .. } => {
                swap(dst);
                swap(base);
            }
            PseudoInstr::StoreWord { src, base, .. } => {
                swap(src);
                swap(base);
            }
            PseudoInstr::Push { src } => swap(src),
            PseudoInstr::CondJump { cond, .. } => swap(cond),
            PseudoInstr::SpillLoad { dst, .. } => swap(dst),
            PseudoInstr::SpillStore { src, .. } => swap(src),
            PseudoInstr::Call { .. }
            | PseudoInstr::Label(_)
            | PseudoInstr::Jump(_)
            | PseudoInstr::JumpToEpilogue(_)
            | PseudoInstr::CallerSave
            | PseudoInstr::CallerRestore => {}
        }
    }

    /// Lower to machine instructions, given the register bound to each temp.
    ///
    /// Labels, caller-save markers and spill code produce nothing here: the
    /// allocator resolves them against the frame.
    pub fn to_native(&self, reg: impl Fn(Temp) -> Register) -> Vec<X86Instr> {
        let opnd = |o: &Operand| match o {
            Operand::Temp(t) => reg(*t),
            Operand::Reg(r) => *r,
        };
        match self {
            PseudoInstr::Move { dst, src } => vec![X86Instr::Mov {
                dst: opnd(dst),
                src: opnd(src),
            }],
            PseudoInstr::LoadImm { dst, value } => vec![X86Instr::MovImm {
                dst: reg(*dst),
                value: *value,
            }],
            PseudoInstr::LoadAddr { dst, label } => vec![X86Instr::MovLabel {
                dst: reg(*dst),
                label: label.clone(),
            }],
            PseudoInstr::LoadStr { dst, index } => vec![X86Instr::MovLabel {
                dst: reg(*dst),
                label: string_label(*index),
            }],
            PseudoInstr::Unary { op, dst } => {
                let d = reg(*dst);
                match op {
                    UnaryOp::Neg => vec![X86Instr::Neg(d)],
                    UnaryOp::Not => vec![
                        X86Instr::CmpZero(d),
                        X86Instr::SetCond(Cond::Eq),
                        X86Instr::Movzbl(d),
                    ],
                }
            }
            PseudoInstr::Binary { op, dst, rhs } => lower_binary(*op, reg(*dst), reg(*rhs)),
            PseudoInstr::RevDiv { op, dst, lhs } => {
                let d = reg(*dst);
                divide(*op, d, reg(*lhs), d)
            }
            PseudoInstr::LoadWord { dst, base, offset } => vec![X86Instr::Load {
                dst: reg(*dst),
                base: reg(*base),
                offset: *offset,
            }],
            PseudoInstr::StoreWord { src, base, offset } => vec![X86Instr::Store {
                src: reg(*src),
                base: reg(*base),
                offset: *offset,
            }],
            PseudoInstr::Push { src } => vec![X86Instr::Push(reg(*src))],
            PseudoInstr::Call { target, argc } => {
                let mut out = vec![X86Instr::Call(target.clone())];
                if *argc > 0 {
                    out.push(X86Instr::AddEsp(*argc as i32 * super::abi::WORD_SIZE));
                }
                out
            }
            PseudoInstr::Jump(target) => vec![X86Instr::Jmp(target.clone())],
            PseudoInstr::CondJump { cond, when, target } => vec![
                X86Instr::CmpZero(reg(*cond)),
                X86Instr::Jcc {
                    cond: match when {
                        BranchWhen::Zero => Cond::Eq,
                        BranchWhen::NonZero => Cond::Ne,
                    },
                    target: target.clone(),
                },
            ],
            PseudoInstr::JumpToEpilogue(entry) => vec![X86Instr::Jmp(epilogue_label(entry))],
            PseudoInstr::Label(_)
            | PseudoInstr::CallerSave
            | PseudoInstr::CallerRestore
            | PseudoInstr::SpillLoad { .. }
            | PseudoInstr::SpillStore { .. } => Vec::new(),
        }
    }
}

fn lower_binary(op: BinaryOp, d: Register, s: Register) -> Vec<X86Instr> {
    let alu = |op| vec![X86Instr::Alu { op, dst: d, src: s }];
    match op {
        BinaryOp::Add => alu(AluOp::Add),
        BinaryOp::Sub => alu(AluOp::Sub),
        BinaryOp::Mul => alu(AluOp::Imul),
        BinaryOp::And => alu(AluOp::And),
        BinaryOp::Or => alu(AluOp::Or),
        BinaryOp::Div | BinaryOp::Rem => divide(op, d, d, s),
        BinaryOp::Cmp(cond) => vec![
            X86Instr::Cmp { lhs: d, rhs: s },
            X86Instr::SetCond(cond),
            X86Instr::Movzbl(d),
        ],
    }
}

/// `d = n / m` (or `n % m`) through `%edx:%eax`.
fn divide(op: BinaryOp, d: Register, n: Register, m: Register) -> Vec<X86Instr> {
    let result = if op == BinaryOp::Rem {
        Register::Edx
    } else {
        Register::Eax
    };
    vec![
        X86Instr::Mov {
            dst: Register::Eax,
            src: n,
        },
        X86Instr::Cltd,
        X86Instr::Idiv(m),
        X86Instr::Mov { dst: d, src: result },
    ]
}

impl InstrLike for PseudoInstr {
    fn reads(&self) -> Vec<Temp> {
        PseudoInstr::reads(self)
    }

    fn writes(&self) -> Vec<Temp> {
        PseudoInstr::writes(self)
    }

    fn flow(&self) -> Flow<'_> {
        match self {
            PseudoInstr::Label(l) => Flow::Label(l),
            PseudoInstr::Jump(l) => Flow::Jump(l),
            PseudoInstr::CondJump { target, .. } => Flow::CondJump(target),
            PseudoInstr::JumpToEpilogue(_) => Flow::Return,
            _ => Flow::Next,
        }
    }
}

impl fmt::Display for PseudoInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PseudoInstr::Move { dst, src } => write!(f, "move {dst}, {src}"),
            PseudoInstr::LoadImm { dst, value } => write!(f, "li {dst}, {value}"),
            PseudoInstr::LoadAddr { dst, label } => write!(f, "la {dst}, {label}"),
            PseudoInstr::LoadStr { dst, index } => write!(f, "la {dst}, {}", string_label(*index)),
            PseudoInstr::Unary { op, dst } => write!(f, "{op:?} {dst}"),
            PseudoInstr::Binary { op, dst, rhs } => write!(f, "{op:?} {dst}, {rhs}"),
            PseudoInstr::RevDiv { op, dst, lhs } => write!(f, "rev{op:?} {dst}, {lhs}"),
            PseudoInstr::LoadWord { dst, base, offset } => write!(f, "lw {dst}, {offset}({base})"),
            PseudoInstr::StoreWord { src, base, offset } => write!(f, "sw {src}, {offset}({base})"),
            PseudoInstr::Push { src } => write!(f, "push {src}"),
            PseudoInstr::Call { target, argc } => write!(f, "call {target} ({argc} args)"),
            PseudoInstr::Label(l) => write!(f, "{l}:"),
            PseudoInstr::Jump(l) => write!(f, "jmp {l}"),
            PseudoInstr::CondJump { cond, when, target } => {
                write!(f, "{when:?} {cond}, {target}")
            }
            PseudoInstr::JumpToEpilogue(entry) => write!(f, "jmp {}", epilogue_label(entry)),
            PseudoInstr::CallerSave => write!(f, "<caller-save>"),
            PseudoInstr::CallerRestore => write!(f, "<caller-restore>"),
            PseudoInstr::SpillLoad { dst, slot } => write!(f, "reload {dst}, [{slot}]"),
            PseudoInstr::SpillStore { src, slot } => write!(f, "spill {src}, [{slot}]"),
        }
    }
}

// ============================================================================
// i386 machine instructions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Imul,
    And,
    Or,
}

impl AluOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            AluOp::Add => "addl",
            AluOp::Sub => "subl",
            AluOp::Imul => "imull",
            AluOp::And => "andl",
            AluOp::Or => "orl",
        }
    }
}

/// A concrete i386 instruction, printed in AT&T syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum X86Instr {
    /// `movl %src, %dst`
    Mov { dst: Register, src: Register },
    /// `movl $value, %dst`
    MovImm { dst: Register, value: i32 },
    /// `movl $label, %dst`
    MovLabel { dst: Register, label: Label },
    /// `movl offset(%base), %dst`
    Load {
        dst: Register,
        base: Register,
        offset: i32,
    },
    /// `movl %src, offset(%base)`
    Store {
        src: Register,
        base: Register,
        offset: i32,
    },
    /// `op %src, %dst`
    Alu {
        op: AluOp,
        dst: Register,
        src: Register,
    },
    Neg(Register),
    /// `cmpl %rhs, %lhs`: flags from `lhs - rhs`
    Cmp { lhs: Register, rhs: Register },
    /// `cmpl $0, %reg`
    CmpZero(Register),
    /// `setCC %al`
    SetCond(Cond),
    /// `movzbl %al, %dst`
    Movzbl(Register),
    Cltd,
    Idiv(Register),
    Push(Register),
    Call(Label),
    /// `addl $n, %esp`
    AddEsp(i32),
    /// `subl $n, %esp`
    SubEsp(i32),
    Jmp(Label),
    Jcc { cond: Cond, target: Label },
    Leave,
    Ret,
}

impl fmt::Display for X86Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X86Instr::Mov { dst, src } => write!(f, "  movl {src}, {dst}"),
            X86Instr::MovImm { dst, value } => write!(f, "  movl ${value}, {dst}"),
            X86Instr::MovLabel { dst, label } => write!(f, "  movl ${label}, {dst}"),
            X86Instr::Load { dst, base, offset } => write!(f, "  movl {offset}({base}), {dst}"),
            X86Instr::Store { src, base, offset } => write!(f, "  movl {src}, {offset}({base})"),
            X86Instr::Alu { op, dst, src } => write!(f, "  {} {src}, {dst}", op.mnemonic()),
            X86Instr::Neg(r) => write!(f, "  negl {r}"),
            X86Instr::Cmp { lhs, rhs } => write!(f, "  cmpl {rhs}, {lhs}"),
            X86Instr::CmpZero(r) => write!(f, "  cmpl $0, {r}"),
            X86Instr::SetCond(c) => write!(f, "  set{} %al", c.suffix()),
            X86Instr::Movzbl(r) => write!(f, "  movzbl %al, {r}"),
            X86Instr::Cltd => write!(f, "  cltd"),
            X86Instr::Idiv(r) => write!(f, "  idivl {r}"),
            X86Instr::Push(r) => write!(f, "  pushl {r}"),
            X86Instr::Call(l) => write!(f, "  call {l}"),
            X86Instr::AddEsp(n) => write!(f, "  addl ${n}, %esp"),
            X86Instr::SubEsp(n) => write!(f, "  subl ${n}, %esp"),
            X86Instr::Jmp(l) => write!(f, "  jmp {l}"),
            X86Instr::Jcc { cond, target } => write!(f, "  j{} {target}", cond.suffix()),
            X86Instr::Leave => write!(f, "  leave"),
            X86Instr::Ret => write!(f, "  ret"),
        }
    }
}

// ============================================================================
// AsmItem: top-level assembly output element
// ============================================================================

/// A structured assembly output element.
///
/// The backend builds a list of `AsmItem`s which is flattened to text at
/// the very end.
#[derive(Debug, Clone)]
pub enum AsmItem {
    /// `name:` on its own line.
    Label {
        name: String,
        comment: Option<String>,
    },
    /// A machine instruction.
    Instr {
        instr: X86Instr,
        comment: Option<String>,
    },
    /// An assembler directive such as `.text` or `.long _V_Main`.
    Directive {
        text: String,
        comment: Option<String>,
    },
    /// Pre-formatted instruction text (runtime intrinsics).
    Text(String),
    /// A finished subroutine.
    Function {
        name: Label,
        prologue: Vec<AsmItem>,
        body: Vec<AsmItem>,
        epilogue: Vec<AsmItem>,
    },
    /// Empty line separator.
    Blank,
}

impl AsmItem {
    pub fn instr(instr: X86Instr) -> Self {
        AsmItem::Instr {
            instr,
            comment: None,
        }
    }

    pub fn commented(instr: X86Instr, comment: impl Into<String>) -> Self {
        AsmItem::Instr {
            instr,
            comment: Some(comment.into()),
        }
    }

    pub fn directive(text: impl Into<String>) -> Self {
        AsmItem::Directive {
            text: text.into(),
            comment: None,
        }
    }
}
