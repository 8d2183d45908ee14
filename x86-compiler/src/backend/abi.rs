//! i386 registers and the cdecl conventions the backend relies on.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Register {
    Eax,
    Ebx,
    Ecx,
    Edx,
    Esi,
    Edi,
    Esp,
    Ebp,
}

impl Register {
    /// Holds the return value and serves as `setcc`/division scratch.
    pub const RETURN_REG: Register = Register::Eax;
    pub const STACK_PTR: Register = Register::Esp;
    pub const FRAME_PTR: Register = Register::Ebp;

    pub fn as_str(&self) -> &'static str {
        match self {
            Register::Eax => "%eax",
            Register::Ebx => "%ebx",
            Register::Ecx => "%ecx",
            Register::Edx => "%edx",
            Register::Esi => "%esi",
            Register::Edi => "%edi",
            Register::Esp => "%esp",
            Register::Ebp => "%ebp",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes per machine word.
pub const WORD_SIZE: i32 = 4;

/// `%ebp`-relative offset of the first argument: saved `%ebp` and the return
/// address sit between the frame pointer and the arguments.
pub const ARG_BASE_OFFSET: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saving {
    CallerSaved,
    CalleeSaved,
}

#[derive(Debug, Clone, Copy)]
pub struct RegInfo {
    pub reg: Register,
    pub saving: Saving,
    /// Reserved by the convention, never bound to a temp.
    pub reserved: bool,
    /// Set once the allocator binds any temp to the register.
    pub used: bool,
}

impl RegInfo {
    const fn new(reg: Register, saving: Saving, reserved: bool) -> Self {
        Self {
            reg,
            saving,
            reserved,
            used: false,
        }
    }
}

/// The physical registers the allocator and frame layout reason about.
///
/// `%esp` and `%ebp` are not part of the file: they are owned by the frame.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    regs: Vec<RegInfo>,
}

impl RegisterFile {
    pub fn i386() -> Self {
        Self {
            regs: vec![
                RegInfo::new(Register::Eax, Saving::CallerSaved, true),
                RegInfo::new(Register::Ecx, Saving::CallerSaved, false),
                RegInfo::new(Register::Edx, Saving::CallerSaved, true),
                RegInfo::new(Register::Ebx, Saving::CalleeSaved, false),
                RegInfo::new(Register::Esi, Saving::CalleeSaved, false),
                RegInfo::new(Register::Edi, Saving::CalleeSaved, false),
            ],
        }
    }

    pub fn entries(&self) -> &[RegInfo] {
        &self.regs
    }

    /// Registers available to general temps, in preference order.
    pub fn allocatable(&self) -> Vec<Register> {
        self.regs
            .iter()
            .filter(|r| !r.reserved)
            .map(|r| r.reg)
            .collect()
    }

    pub fn caller_saved(&self) -> Vec<Register> {
        self.with_saving(Saving::CallerSaved)
    }

    /// Every callee-saved register, in save-slot order.
    pub fn callee_saved(&self) -> Vec<Register> {
        self.with_saving(Saving::CalleeSaved)
    }

    fn with_saving(&self, saving: Saving) -> Vec<Register> {
        self.regs
            .iter()
            .filter(|r| r.saving == saving)
            .map(|r| r.reg)
            .collect()
    }

    pub fn is_caller_saved(&self, reg: Register) -> bool {
        self.info(reg).is_some_and(|r| r.saving == Saving::CallerSaved)
    }

    pub fn is_reserved(&self, reg: Register) -> bool {
        self.info(reg).map_or(true, |r| r.reserved)
    }

    pub fn mark_used(&mut self, reg: Register) {
        if let Some(r) = self.regs.iter_mut().find(|r| r.reg == reg) {
            r.used = true;
        }
    }

    pub fn is_used(&self, reg: Register) -> bool {
        self.info(reg).is_some_and(|r| r.used)
    }

    /// Callee-saved registers the current function actually touched,
    /// paired with their save-slot index.
    pub fn used_callee_saved(&self) -> Vec<(usize, Register)> {
        self.callee_saved()
            .into_iter()
            .enumerate()
            .filter(|(_, r)| self.is_used(*r))
            .collect()
    }

    pub fn reset_usage(&mut self) {
        for r in &mut self.regs {
            r.used = false;
        }
    }

    fn info(&self, reg: Register) -> Option<&RegInfo> {
        self.regs.iter().find(|r| r.reg == reg)
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::i386()
    }
}
