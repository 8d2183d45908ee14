//! Program-level assembly: sections, vtables, intrinsics, string constants,
//! and the final flattening to text.

use super::context::CompileContext;
use super::frame::SubroutineInfo;
use super::instruction::AsmItem;
use super::intrinsics;
use super::pool::{string_label, StringPool};
use crate::ir::{quote, vtable_label, VTable};

/// Column comments are aligned to, when an instruction is short enough.
const COMMENT_COL: usize = 30;

/// Final compiled i386 assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X86Asm {
    pub lines: Vec<String>,
    /// Frame layout of each function, in output order.
    pub frames: Vec<SubroutineInfo>,
}

impl X86Asm {
    pub fn join(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

/// Accumulates the program's items in output order.
#[derive(Debug, Default)]
pub struct AsmEmitter {
    items: Vec<AsmItem>,
    frames: Vec<SubroutineInfo>,
}

impl AsmEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_header(&mut self) {
        self.items.push(AsmItem::directive(".text"));
        self.items.push(AsmItem::directive(".globl main"));
    }

    pub fn emit_function(&mut self, function: AsmItem, info: SubroutineInfo) {
        self.items.push(AsmItem::Blank);
        self.items.push(function);
        self.frames.push(info);
    }

    /// Each vtable: parent table (or 0), class name, then method entries.
    pub fn emit_vtables(&mut self, vtables: &[VTable], pool: &mut StringPool) {
        if vtables.is_empty() {
            return;
        }
        self.items.push(AsmItem::Blank);
        self.items.push(AsmItem::directive(".data"));
        self.items.push(AsmItem::directive(".align 4"));
        for vt in vtables {
            let name = string_label(pool.add(&vt.class_name));
            let parent = match &vt.parent {
                Some(p) => vtable_label(p).to_string(),
                None => "0".to_string(),
            };
            self.items.push(AsmItem::Label {
                name: vt.label().to_string(),
                comment: Some(format!("vtable for class {}", vt.class_name)),
            });
            self.items.push(AsmItem::Directive {
                text: format!("  .long {parent}"),
                comment: Some("parent".into()),
            });
            self.items.push(AsmItem::Directive {
                text: format!("  .long {name}"),
                comment: Some("class name".into()),
            });
            for m in &vt.methods {
                self.items.push(AsmItem::directive(format!("  .long {m}")));
            }
        }
    }

    /// Bodies of the intrinsics the program called, each once.
    pub fn emit_intrinsics(&mut self, ctx: &mut CompileContext) {
        let used = ctx.used_intrinsics();
        if used.is_empty() {
            return;
        }
        self.items.push(AsmItem::Blank);
        self.items.push(AsmItem::directive(".text"));
        for intrinsic in used {
            self.items.push(AsmItem::Blank);
            self.items
                .extend(intrinsics::routine(intrinsic, ctx.pool_mut()));
        }
    }

    pub fn emit_string_pool(&mut self, pool: &StringPool) {
        if pool.is_empty() {
            return;
        }
        self.items.push(AsmItem::Blank);
        self.items.push(AsmItem::directive(".data"));
        for (i, s) in pool.iter() {
            self.items.push(AsmItem::Label {
                name: string_label(i).to_string(),
                comment: None,
            });
            self.items
                .push(AsmItem::directive(format!("  .asciz {}", quote(s))));
        }
    }

    pub fn finish(self, comments: bool) -> X86Asm {
        let mut lines = Vec::new();
        flatten_items(&self.items, comments, &mut lines);
        X86Asm {
            lines,
            frames: self.frames,
        }
    }
}

fn with_comment(base: String, comment: &Option<String>, comments: bool) -> String {
    match comment {
        Some(c) if comments => {
            let pad = if base.len() < COMMENT_COL {
                COMMENT_COL - base.len()
            } else {
                2
            };
            format!("{base}{}# {c}", " ".repeat(pad))
        }
        _ => base,
    }
}

fn flatten_items(items: &[AsmItem], comments: bool, lines: &mut Vec<String>) {
    for item in items {
        match item {
            AsmItem::Label { name, comment } => {
                lines.push(with_comment(format!("{name}:"), comment, comments))
            }
            AsmItem::Instr { instr, comment } => {
                lines.push(with_comment(instr.to_string(), comment, comments))
            }
            AsmItem::Directive { text, comment } => {
                lines.push(with_comment(text.clone(), comment, comments))
            }
            AsmItem::Text(text) => lines.push(text.clone()),
            AsmItem::Function {
                name,
                prologue,
                body,
                epilogue,
            } => {
                lines.push(format!("{name}:"));
                flatten_items(prologue, comments, lines);
                flatten_items(body, comments, lines);
                flatten_items(epilogue, comments, lines);
            }
            AsmItem::Blank => lines.push(String::new()),
        }
    }
}
