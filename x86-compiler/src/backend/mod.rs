//! i386 backend: lowers TAC to AT&T-syntax assembly.
//!
//! Module layout:
//! - `abi`         register file and cdecl constants
//! - `instruction` pseudo-instructions, machine instructions, output items
//! - `select`      TAC → pseudo-instruction selection
//! - `cfg`         basic blocks and control-flow graph
//! - `liveness`    dataflow liveness analysis
//! - `regalloc`    register allocation trait and implementations
//! - `frame`       stack slots, prologue and epilogue
//! - `emitter`     sections, vtables, intrinsics, string constants
//!
//! Per function: select → CFG → liveness → allocate (driving the frame)
//! → finished function item. Program-wide state lives in `CompileContext`.

pub mod abi;
pub mod cfg;
pub mod context;
pub mod emitter;
pub mod frame;
pub mod instruction;
mod intrinsics;
pub mod liveness;
pub mod pool;
pub mod regalloc;
pub mod select;

pub use emitter::X86Asm;
pub use regalloc::AllocatorKind;

use crate::ir::{TacFunc, TacProgram};
use crate::CompileError;
use abi::RegisterFile;
use context::CompileContext;
use emitter::AsmEmitter;
use frame::{SubroutineEmitter, SubroutineInfo};
use instruction::AsmItem;
use regalloc::RegAllocator;

/// Backend settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodegenOptions {
    pub allocator: AllocatorKind,
    /// Annotate instructions with `# ...` comments.
    pub comments: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            allocator: AllocatorKind::default(),
            comments: true,
        }
    }
}

/// Compile a TAC program to i386 assembly with default options.
pub fn compile_tac_to_x86(program: &TacProgram) -> Result<X86Asm, CompileError> {
    compile_tac_to_x86_with(&CodegenOptions::default(), program)
}

pub fn compile_tac_to_x86_with(
    options: &CodegenOptions,
    program: &TacProgram,
) -> Result<X86Asm, CompileError> {
    let mut ctx = CompileContext::new();
    let mut regs = RegisterFile::i386();
    let mut allocator = options.allocator.build();
    let mut out = AsmEmitter::new();
    log::debug!(
        "compiling {} functions with the {} allocator",
        program.funcs.len(),
        allocator.name()
    );

    out.emit_header();
    for func in &program.funcs {
        let (item, info) = compile_function(func, &mut ctx, &mut regs, allocator.as_mut())?;
        out.emit_function(item, info);
    }
    out.emit_vtables(&program.vtables, ctx.pool_mut());
    out.emit_intrinsics(&mut ctx);
    out.emit_string_pool(ctx.pool());
    Ok(out.finish(options.comments))
}

fn compile_function(
    func: &TacFunc,
    ctx: &mut CompileContext,
    regs: &mut RegisterFile,
    allocator: &mut dyn RegAllocator,
) -> Result<(AsmItem, SubroutineInfo), CompileError> {
    log::debug!(
        "{}: {} args, {} TAC instructions",
        func.entry,
        func.num_args,
        func.instrs.len()
    );
    regs.reset_usage();
    let selected = select::select_function(func, ctx)?;
    let mut frame = SubroutineEmitter::new(selected.info, regs);
    allocator.allocate(selected.seq, regs, &mut frame)?;
    Ok(frame.finish(regs))
}
