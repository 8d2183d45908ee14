// Three-address code handed to the backend: functions made of temps, labels
// and simple instructions, plus the virtual tables of every class.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A virtual register. Temps `0..num_args` of a function are its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temp(pub u32);

impl Temp {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_T{}", self.0)
    }
}

/// A symbolic code or data location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label(s.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TacProgram {
    pub funcs: Vec<TacFunc>,
    #[serde(default)]
    pub vtables: Vec<VTable>,
}

impl TacProgram {
    pub fn to_lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for vt in &self.vtables {
            out.push(format!("VTABLE({}) {{", vt.class_name));
            match &vt.parent {
                Some(p) => out.push(format!("    {p}")),
                None => out.push("    <empty>".to_string()),
            }
            out.push(format!("    {}", vt.class_name));
            for m in &vt.methods {
                out.push(format!("    {m};"));
            }
            out.push("}".to_string());
            out.push(String::new());
        }
        for func in &self.funcs {
            out.push(format!("FUNCTION({}) {{", func.entry));
            for ins in &func.instrs {
                match ins {
                    TacInstr::Mark { .. } => out.push(format!("{ins}")),
                    _ => out.push(format!("    {ins}")),
                }
            }
            out.push("}".to_string());
            out.push(String::new());
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TacFunc {
    pub entry: Label,
    pub num_args: usize,
    pub instrs: Vec<TacInstr>,
}

impl TacFunc {
    pub fn new(entry: impl Into<String>, num_args: usize, instrs: Vec<TacInstr>) -> Self {
        Self {
            entry: Label::new(entry),
            num_args,
            instrs,
        }
    }
}

/// Per-class dispatch table. The backend only prints these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VTable {
    pub class_name: String,
    #[serde(default)]
    pub parent: Option<String>,
    pub methods: Vec<Label>,
}

impl VTable {
    pub fn label(&self) -> Label {
        vtable_label(&self.class_name)
    }
}

pub fn vtable_label(class_name: &str) -> Label {
    Label(format!("_V_{class_name}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TacInstr {
    /// `dst = src`
    Assign { dst: Temp, src: Temp },

    /// `dst = VTBL <_V_class>`
    LoadVTbl { dst: Temp, class: String },

    /// `dst = value`
    LoadImm4 { dst: Temp, value: i32 },

    /// `dst = "value"`
    LoadStrConst { dst: Temp, value: String },

    /// `dst = op operand`
    Unary { op: TacUnaryOp, dst: Temp, operand: Temp },

    /// `dst = (lhs op rhs)`
    Binary { op: TacBinaryOp, dst: Temp, lhs: Temp, rhs: Temp },

    /// `branch target`
    Branch { target: Label },

    /// `if (cond == 0) branch target` / `if (cond != 0) branch target`
    CondBranch { op: CondBranchOp, cond: Temp, target: Label },

    /// `return [value]`
    Return {
        #[serde(default)]
        value: Option<Temp>,
    },

    /// `parm value`
    Parm { value: Temp },

    /// `[dst =] call entry` through a temp holding the address
    IndirectCall {
        #[serde(default)]
        dst: Option<Temp>,
        entry: Temp,
    },

    /// `[dst =] call entry`
    DirectCall {
        #[serde(default)]
        dst: Option<Temp>,
        entry: Label,
    },

    /// `dst = *(base + offset)` or `*(base + offset) = dst`
    Memory { op: MemoryOp, dst: Temp, base: Temp, offset: i32 },

    /// `label:`
    Mark { label: Label },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TacUnaryOp {
    Neg,
    LNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TacBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equ,
    Neq,
    Les,
    Leq,
    Gtr,
    Geq,
    LAnd,
    LOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CondBranchOp {
    Beqz,
    Bnez,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryOp {
    Load,
    Store,
}

impl fmt::Display for TacUnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TacUnaryOp::Neg => "-",
            TacUnaryOp::LNot => "!",
        })
    }
}

impl fmt::Display for TacBinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TacBinaryOp::Add => "+",
            TacBinaryOp::Sub => "-",
            TacBinaryOp::Mul => "*",
            TacBinaryOp::Div => "/",
            TacBinaryOp::Mod => "%",
            TacBinaryOp::Equ => "==",
            TacBinaryOp::Neq => "!=",
            TacBinaryOp::Les => "<",
            TacBinaryOp::Leq => "<=",
            TacBinaryOp::Gtr => ">",
            TacBinaryOp::Geq => ">=",
            TacBinaryOp::LAnd => "&&",
            TacBinaryOp::LOr => "||",
        })
    }
}

impl fmt::Display for TacInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TacInstr::Assign { dst, src } => write!(f, "{dst} = {src}"),
            TacInstr::LoadVTbl { dst, class } => {
                write!(f, "{dst} = VTBL <{}>", vtable_label(class))
            }
            TacInstr::LoadImm4 { dst, value } => write!(f, "{dst} = {value}"),
            TacInstr::LoadStrConst { dst, value } => write!(f, "{dst} = {}", quote(value)),
            TacInstr::Unary { op, dst, operand } => write!(f, "{dst} = {op} {operand}"),
            TacInstr::Binary { op, dst, lhs, rhs } => write!(f, "{dst} = ({lhs} {op} {rhs})"),
            TacInstr::Branch { target } => write!(f, "branch {target}"),
            TacInstr::CondBranch { op, cond, target } => {
                let rel = match op {
                    CondBranchOp::Beqz => "==",
                    CondBranchOp::Bnez => "!=",
                };
                write!(f, "if ({cond} {rel} 0) branch {target}")
            }
            TacInstr::Return { value: Some(v) } => write!(f, "return {v}"),
            TacInstr::Return { value: None } => write!(f, "return"),
            TacInstr::Parm { value } => write!(f, "parm {value}"),
            TacInstr::IndirectCall { dst: Some(d), entry } => write!(f, "{d} = call {entry}"),
            TacInstr::IndirectCall { dst: None, entry } => write!(f, "call {entry}"),
            TacInstr::DirectCall { dst: Some(d), entry } => write!(f, "{d} = call {entry}"),
            TacInstr::DirectCall { dst: None, entry } => write!(f, "call {entry}"),
            TacInstr::Memory {
                op: MemoryOp::Load,
                dst,
                base,
                offset,
            } => write!(f, "{dst} = *({base} {})", signed(*offset)),
            TacInstr::Memory {
                op: MemoryOp::Store,
                dst,
                base,
                offset,
            } => write!(f, "*({base} {}) = {dst}", signed(*offset)),
            TacInstr::Mark { label } => write!(f, "{label}:"),
        }
    }
}

fn signed(offset: i32) -> String {
    if offset >= 0 {
        format!("+ {offset}")
    } else {
        format!("- {}", -(offset as i64))
    }
}

/// Quote a string literal with C-style escapes, as accepted by `.asciz`.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
