pub mod backend;
pub mod ir;

use backend::abi::Register;
use ir::{Label, Temp};
use thiserror::Error;

pub use backend::{
    compile_tac_to_x86, compile_tac_to_x86_with, AllocatorKind, CodegenOptions, X86Asm,
};

/// Internal faults: each means the incoming TAC broke a backend
/// precondition. None are recoverable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("internal compiler error: raw branch reached the instruction selector: {0}")]
    RawBranch(String),

    #[error("internal compiler error: indirect call through {0} is not supported")]
    IndirectCall(Temp),

    #[error("internal compiler error: {temp} loaded into {reg} before it was ever stored")]
    LoadBeforeStore { temp: Temp, reg: Register },

    #[error("internal compiler error: jump to undefined label {0}")]
    UndefinedLabel(Label),

    #[error("internal compiler error: register allocation did not converge")]
    AllocationDiverged,

    #[error("internal compiler error: temp numbering overflowed")]
    TempOverflow,
}
