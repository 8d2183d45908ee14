//! Activation frames: stack slots, prologue and epilogue.
//!
//! Frame layout, relative to `%ebp`:
//!
//! ```text
//!   8 + 4*i   argument i
//!   4         return address
//!   0         saved %ebp
//!  -4*(k+1)   k-th callee-saved register (save area)
//!  below      locals and spill slots, assigned on first reference
//! ```

use super::abi::{RegisterFile, Register, ARG_BASE_OFFSET, WORD_SIZE};
use super::instruction::{AsmItem, X86Instr};
use crate::ir::{Label, Temp};
use crate::CompileError;
use std::collections::{BTreeMap, BTreeSet};

/// Label of the single epilogue shared by every return of `entry`.
pub fn epilogue_label(entry: &Label) -> Label {
    Label(format!("{entry}_exit"))
}

/// Per-function facts. The frame fields are filled in by
/// [`SubroutineEmitter::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineInfo {
    pub label: Label,
    pub num_args: usize,
    pub used_callee_saved: Vec<Register>,
    /// Bytes reserved below `%ebp` (save area plus locals).
    pub frame_size: u32,
}

impl SubroutineInfo {
    pub fn new(label: Label, num_args: usize) -> Self {
        Self {
            label,
            num_args,
            used_callee_saved: Vec::new(),
            frame_size: 0,
        }
    }

    pub fn is_argument(&self, temp: Temp) -> bool {
        temp.index() < self.num_args
    }
}

/// Collects the body of one function and lays out its frame.
pub struct SubroutineEmitter {
    info: SubroutineInfo,
    offsets: BTreeMap<Temp, i32>,
    /// Temps assigned somewhere in the function.
    written: BTreeSet<Temp>,
    last_local_offset: i32,
    body: Vec<AsmItem>,
}

impl SubroutineEmitter {
    pub fn new(info: SubroutineInfo, regs: &RegisterFile) -> Self {
        let offsets = (0..info.num_args)
            .map(|i| (Temp(i as u32), ARG_BASE_OFFSET + WORD_SIZE * i as i32))
            .collect();
        Self {
            info,
            offsets,
            written: BTreeSet::new(),
            last_local_offset: -WORD_SIZE * regs.callee_saved().len() as i32,
            body: Vec::new(),
        }
    }

    pub fn info(&self) -> &SubroutineInfo {
        &self.info
    }

    /// The `%ebp`-relative slot of `temp`, if it has one yet.
    pub fn offset_of(&self, temp: Temp) -> Option<i32> {
        self.offsets.get(&temp).copied()
    }

    /// Record temps the function writes. A load of one of them may come
    /// before its first store in layout order; control flow still reaches
    /// a store first, so the load gets the slot that store will use.
    pub fn declare_written(&mut self, temps: impl IntoIterator<Item = Temp>) {
        self.written.extend(temps);
    }

    fn slot(&mut self, temp: Temp) -> i32 {
        if let Some(offset) = self.offset_of(temp) {
            return offset;
        }
        self.last_local_offset -= WORD_SIZE;
        self.offsets.insert(temp, self.last_local_offset);
        self.last_local_offset
    }

    pub fn emit_store_to_stack(&mut self, reg: Register, temp: Temp) {
        let offset = self.slot(temp);
        self.body.push(AsmItem::commented(
            X86Instr::Store {
                src: reg,
                base: Register::FRAME_PTR,
                offset,
            },
            format!("store {temp}"),
        ));
    }

    pub fn emit_load_from_stack(&mut self, reg: Register, temp: Temp) -> Result<(), CompileError> {
        let offset = match self.offset_of(temp) {
            Some(offset) => offset,
            None if self.written.contains(&temp) => self.slot(temp),
            None => return Err(CompileError::LoadBeforeStore { temp, reg }),
        };
        self.body.push(AsmItem::commented(
            X86Instr::Load {
                dst: reg,
                base: Register::FRAME_PTR,
                offset,
            },
            format!("load {temp}"),
        ));
        Ok(())
    }

    /// Append lowered instructions. The comment goes on the first one that
    /// survives; register-to-itself moves are dropped.
    pub fn emit_native(&mut self, instrs: Vec<X86Instr>, comment: Option<String>) {
        let mut comment = comment;
        for instr in instrs {
            if matches!(instr, X86Instr::Mov { dst, src } if dst == src) {
                continue;
            }
            self.body.push(AsmItem::Instr {
                instr,
                comment: comment.take(),
            });
        }
    }

    pub fn emit_label(&mut self, label: &Label) {
        self.body.push(AsmItem::Label {
            name: label.to_string(),
            comment: None,
        });
    }

    /// Wrap the body with prologue and epilogue. Must run after allocation,
    /// once `regs` knows which callee-saved registers were touched.
    pub fn finish(mut self, regs: &RegisterFile) -> (AsmItem, SubroutineInfo) {
        let saved = regs.used_callee_saved();
        let frame_size = self.last_local_offset.unsigned_abs();
        let save_offset = |slot: usize| -WORD_SIZE * (slot as i32 + 1);

        let mut prologue = vec![
            AsmItem::instr(X86Instr::Push(Register::FRAME_PTR)),
            AsmItem::instr(X86Instr::Mov {
                dst: Register::FRAME_PTR,
                src: Register::STACK_PTR,
            }),
            AsmItem::commented(
                X86Instr::SubEsp(frame_size as i32),
                format!("frame ({frame_size} bytes)"),
            ),
        ];
        for &(slot, reg) in &saved {
            prologue.push(AsmItem::commented(
                X86Instr::Store {
                    src: reg,
                    base: Register::FRAME_PTR,
                    offset: save_offset(slot),
                },
                format!("save {reg}"),
            ));
        }

        let mut epilogue = vec![AsmItem::Label {
            name: epilogue_label(&self.info.label).to_string(),
            comment: None,
        }];
        for &(slot, reg) in &saved {
            epilogue.push(AsmItem::commented(
                X86Instr::Load {
                    dst: reg,
                    base: Register::FRAME_PTR,
                    offset: save_offset(slot),
                },
                format!("restore {reg}"),
            ));
        }
        epilogue.push(AsmItem::instr(X86Instr::Leave));
        epilogue.push(AsmItem::instr(X86Instr::Ret));

        self.info.used_callee_saved = saved.iter().map(|&(_, r)| r).collect();
        self.info.frame_size = frame_size;
        log::debug!(
            "{}: frame {} bytes, callee-saved {:?}",
            self.info.label,
            frame_size,
            self.info.used_callee_saved
        );

        let item = AsmItem::Function {
            name: self.info.label.clone(),
            prologue,
            body: self.body,
            epilogue,
        };
        (item, self.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitter(num_args: usize) -> SubroutineEmitter {
        SubroutineEmitter::new(
            SubroutineInfo::new(Label::new("f"), num_args),
            &RegisterFile::i386(),
        )
    }

    #[test]
    fn arguments_sit_above_the_frame_pointer_in_order() {
        let e = emitter(3);
        assert_eq!(e.offset_of(Temp(0)), Some(8));
        assert_eq!(e.offset_of(Temp(1)), Some(12));
        assert_eq!(e.offset_of(Temp(2)), Some(16));
        assert_eq!(e.offset_of(Temp(3)), None);
    }

    #[test]
    fn locals_start_below_the_save_area_and_keep_their_slot() {
        let mut e = emitter(1);
        e.emit_store_to_stack(Register::Ecx, Temp(5));
        e.emit_store_to_stack(Register::Ebx, Temp(7));
        e.emit_store_to_stack(Register::Ecx, Temp(5));
        assert_eq!(e.offset_of(Temp(5)), Some(-16));
        assert_eq!(e.offset_of(Temp(7)), Some(-20));

        // Storing an argument reuses its incoming slot.
        e.emit_store_to_stack(Register::Esi, Temp(0));
        assert_eq!(e.offset_of(Temp(0)), Some(8));
    }

    #[test]
    fn loading_a_never_written_local_is_an_error() {
        let mut e = emitter(1);
        e.declare_written([Temp(5)]);
        assert!(e.emit_load_from_stack(Register::Ecx, Temp(0)).is_ok());
        assert!(matches!(
            e.emit_load_from_stack(Register::Ecx, Temp(4)),
            Err(CompileError::LoadBeforeStore {
                temp: Temp(4),
                reg: Register::Ecx
            })
        ));
    }

    #[test]
    fn a_written_temp_loaded_before_its_store_shares_the_slot() {
        let mut e = emitter(0);
        e.declare_written([Temp(3)]);
        e.emit_load_from_stack(Register::Ecx, Temp(3)).unwrap();
        e.emit_store_to_stack(Register::Ebx, Temp(3));
        assert_eq!(e.offset_of(Temp(3)), Some(-16));

        let (item, _) = e.finish(&RegisterFile::i386());
        let AsmItem::Function { body, .. } = item else {
            panic!("expected a function");
        };
        let offsets: Vec<i32> = body
            .iter()
            .filter_map(|i| match i {
                AsmItem::Instr {
                    instr: X86Instr::Load { offset, .. } | X86Instr::Store { offset, .. },
                    ..
                } => Some(*offset),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![-16, -16]);
    }

    #[test]
    fn identity_moves_are_dropped() {
        let mut e = emitter(0);
        e.emit_native(
            vec![
                X86Instr::Mov {
                    dst: Register::Ebx,
                    src: Register::Ebx,
                },
                X86Instr::Neg(Register::Ebx),
            ],
            Some("neg".into()),
        );
        let (item, _) = e.finish(&RegisterFile::i386());
        let AsmItem::Function { body, .. } = item else {
            panic!("expected a function");
        };
        assert_eq!(body.len(), 1);
        assert!(matches!(
            &body[0],
            AsmItem::Instr { instr: X86Instr::Neg(Register::Ebx), comment: Some(c) } if c == "neg"
        ));
    }

    #[test]
    fn used_callee_saved_registers_are_saved_and_restored() {
        let mut regs = RegisterFile::i386();
        regs.mark_used(Register::Edi);
        regs.mark_used(Register::Ecx);
        let mut e = emitter(0);
        e.emit_store_to_stack(Register::Edi, Temp(0));
        let (item, info) = e.finish(&regs);

        assert_eq!(info.used_callee_saved, vec![Register::Edi]);
        assert_eq!(info.frame_size, 16);
        let AsmItem::Function {
            prologue, epilogue, ..
        } = item
        else {
            panic!("expected a function");
        };
        assert!(matches!(
            prologue.last(),
            Some(AsmItem::Instr {
                instr: X86Instr::Store {
                    src: Register::Edi,
                    offset: -12,
                    ..
                },
                ..
            })
        ));
        assert!(matches!(&epilogue[0], AsmItem::Label { name, .. } if name == "f_exit"));
        assert!(matches!(
            epilogue.last(),
            Some(AsmItem::Instr {
                instr: X86Instr::Ret,
                ..
            })
        ));
    }
}
