//! Built-in runtime routines callable from TAC by their entry label.

use super::tac::Label;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Intrinsic {
    /// `_Alloc(size)`: zeroed heap block.
    Allocate,
    ReadLine,
    ReadInt,
    /// `_StringEqual(a, b)`: 1 if equal, else 0.
    StringEqual,
    PrintInt,
    PrintString,
    PrintBool,
    Halt,
}

impl Intrinsic {
    /// Emission order of the routine bodies.
    pub const ALL: [Intrinsic; 8] = [
        Intrinsic::Allocate,
        Intrinsic::ReadLine,
        Intrinsic::ReadInt,
        Intrinsic::StringEqual,
        Intrinsic::PrintInt,
        Intrinsic::PrintString,
        Intrinsic::PrintBool,
        Intrinsic::Halt,
    ];

    pub fn entry(self) -> &'static str {
        match self {
            Intrinsic::Allocate => "_Alloc",
            Intrinsic::ReadLine => "_ReadLine",
            Intrinsic::ReadInt => "_ReadInt",
            Intrinsic::StringEqual => "_StringEqual",
            Intrinsic::PrintInt => "_PrintInt",
            Intrinsic::PrintString => "_PrintString",
            Intrinsic::PrintBool => "_PrintBool",
            Intrinsic::Halt => "_Halt",
        }
    }

    pub fn from_label(label: &Label) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.entry() == label.as_str())
    }

    pub fn label(self) -> Label {
        Label::new(self.entry())
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry())
    }
}
