use std::collections::BTreeSet;
use x86_compiler::ir::{
    Label, MemoryOp, TacBinaryOp, TacFunc, TacInstr, TacProgram, TacUnaryOp, Temp,
};
use x86_compiler::{compile_tac_to_x86_with, AllocatorKind, CodegenOptions};

fn asm_with(allocator: AllocatorKind, num_args: usize, mut instrs: Vec<TacInstr>) -> String {
    instrs.push(TacInstr::Return { value: None });
    let prog = TacProgram {
        funcs: vec![TacFunc::new("_f", num_args, instrs)],
        vtables: Vec::new(),
    };
    compile_tac_to_x86_with(&options(allocator), &prog)
        .unwrap()
        .join()
}

fn options(allocator: AllocatorKind) -> CodegenOptions {
    CodegenOptions {
        allocator,
        comments: false,
    }
}

fn asm(num_args: usize, instrs: Vec<TacInstr>) -> String {
    asm_with(AllocatorKind::Coloring, num_args, instrs)
}

fn binary(op: TacBinaryOp, dst: u32, lhs: u32, rhs: u32) -> TacInstr {
    TacInstr::Binary {
        op,
        dst: Temp(dst),
        lhs: Temp(lhs),
        rhs: Temp(rhs),
    }
}

/// Keep `_T<t>` alive by returning it.
fn returning(t: u32) -> TacInstr {
    TacInstr::Return {
        value: Some(Temp(t)),
    }
}

// ── Arithmetic ───────────────────────────────────────────────────────────

#[test]
fn division_goes_through_eax_and_edx() {
    let out = asm(2, vec![binary(TacBinaryOp::Div, 2, 0, 1), returning(2)]);
    assert!(out.contains("  cltd\n"));
    assert!(out.contains("  idivl %"));
    assert!(out.contains("  movl %eax, %"));

    let out = asm(2, vec![binary(TacBinaryOp::Mod, 2, 0, 1), returning(2)]);
    assert!(out.contains("  movl %edx, %"));
}

#[test]
fn subtraction_into_the_right_operand_negates_then_adds() {
    let out = asm(2, vec![binary(TacBinaryOp::Sub, 1, 0, 1), returning(1)]);
    let neg = out.find("  negl %").expect("negl");
    let add = out.find("  addl %").expect("addl");
    assert!(neg < add);
    assert!(!out.contains("subl %"));
}

#[test]
fn multiplication_and_logic() {
    let out = asm(
        2,
        vec![
            binary(TacBinaryOp::Mul, 2, 0, 1),
            binary(TacBinaryOp::LAnd, 3, 2, 1),
            binary(TacBinaryOp::LOr, 4, 3, 0),
            returning(4),
        ],
    );
    for m in ["imull", "andl", "orl"] {
        assert!(out.contains(&format!("  {m} %")), "missing {m}");
    }
}

#[test]
fn unary_operators() {
    let out = asm(
        1,
        vec![
            TacInstr::Unary {
                op: TacUnaryOp::Neg,
                dst: Temp(1),
                operand: Temp(0),
            },
            TacInstr::Unary {
                op: TacUnaryOp::LNot,
                dst: Temp(2),
                operand: Temp(1),
            },
            returning(2),
        ],
    );
    assert!(out.contains("  negl %"));
    assert!(out.contains("  cmpl $0, %"));
    assert!(out.contains("  sete %al"));
}

// ── Comparisons ──────────────────────────────────────────────────────────

#[test]
fn relational_operators_share_the_compare_form() {
    let cases = [
        (TacBinaryOp::Equ, "sete"),
        (TacBinaryOp::Neq, "setne"),
        (TacBinaryOp::Les, "setl"),
        (TacBinaryOp::Leq, "setle"),
        (TacBinaryOp::Gtr, "setg"),
        (TacBinaryOp::Geq, "setge"),
    ];
    for (op, set) in cases {
        let out = asm(2, vec![binary(op, 2, 0, 1), returning(2)]);
        assert!(out.contains(&format!("  {set} %al\n")), "{op:?}");
        assert!(out.contains("  movzbl %al, %"), "{op:?}");
    }
}

#[test]
fn compare_into_the_right_operand_mirrors_the_condition() {
    // _T1 = _T0 < _T1
    let out = asm(2, vec![binary(TacBinaryOp::Les, 1, 0, 1), returning(1)]);
    assert!(out.contains("  setg %al"));
    assert!(!out.contains("  setl %al"));
}

// ── Memory and constants ─────────────────────────────────────────────────

#[test]
fn loads_and_stores_use_base_plus_offset() {
    let out = asm(
        2,
        vec![
            TacInstr::Memory {
                op: MemoryOp::Store,
                dst: Temp(1),
                base: Temp(0),
                offset: -4,
            },
            TacInstr::Memory {
                op: MemoryOp::Load,
                dst: Temp(2),
                base: Temp(0),
                offset: 8,
            },
            returning(2),
        ],
    );
    let non_frame = |l: &&str| !l.contains("%ebp");
    assert!(out
        .lines()
        .filter(non_frame)
        .any(|l| l.starts_with("  movl %") && l.contains(", -4(%")));
    assert!(out
        .lines()
        .filter(non_frame)
        .any(|l| l.starts_with("  movl 8(%")));
}

#[test]
fn vtable_and_string_addresses_are_immediates() {
    let out = asm(
        0,
        vec![
            TacInstr::LoadVTbl {
                dst: Temp(0),
                class: "Dog".into(),
            },
            TacInstr::LoadStrConst {
                dst: Temp(1),
                value: "bark".into(),
            },
            binary(TacBinaryOp::Add, 2, 0, 1),
            returning(2),
        ],
    );
    assert!(out.contains("  movl $_V_Dog, %"));
    assert!(out.contains("  movl $_S0, %"));
    assert!(out.contains("_S0:\n  .asciz \"bark\""));
}

#[test]
fn call_results_come_back_in_eax() {
    let out = asm(
        0,
        vec![
            TacInstr::DirectCall {
                dst: Some(Temp(0)),
                entry: "_ReadInt".into(),
            },
            returning(0),
        ],
    );
    let call = out.find("  call _ReadInt\n").unwrap();
    assert!(out[call..].contains("  movl %eax, %"));
    assert!(out.contains("_ReadInt:\n"));
    assert!(out.contains("  call scanf"));
}

// ── Register pressure ────────────────────────────────────────────────────

#[test]
fn many_live_values_compile_under_both_allocators() {
    let mut instrs: Vec<TacInstr> = (0..9)
        .map(|t| TacInstr::LoadImm4 {
            dst: Temp(t),
            value: t as i32 * 3,
        })
        .collect();
    for t in 1..9 {
        instrs.push(binary(TacBinaryOp::Add, 0, 0, t));
    }
    instrs.push(returning(0));

    instrs.push(TacInstr::Return { value: None });
    let prog = TacProgram {
        funcs: vec![TacFunc::new("_f", 0, instrs)],
        vtables: Vec::new(),
    };

    for kind in [AllocatorKind::Local, AllocatorKind::Coloring] {
        let asm = compile_tac_to_x86_with(&options(kind), &prog).unwrap();
        assert_eq!(asm.join().matches("  addl %").count(), 8, "{kind:?}");
        let frame = &asm.frames[0];
        assert_eq!(frame.label, Label::new("_f"));
        assert!(
            frame.frame_size > 12,
            "{kind:?}: no spill slots in a {}-byte frame",
            frame.frame_size
        );
        assert_eq!(
            asm.lines
                .iter()
                .filter(|l| **l == format!("  subl ${}, %esp", frame.frame_size))
                .count(),
            1
        );
    }
}

#[test]
fn edx_is_only_touched_by_division() {
    let prog: TacProgram =
        serde_json::from_str(&std::fs::read_to_string("../samples/loop.json").unwrap()).unwrap();
    for kind in [AllocatorKind::Local, AllocatorKind::Coloring] {
        let options = CodegenOptions {
            allocator: kind,
            comments: false,
        };
        let out = compile_tac_to_x86_with(&options, &prog).unwrap().join();
        assert!(!out.contains("%edx"), "{kind:?}");
    }
}

// ── Code layout ──────────────────────────────────────────────────────────

fn movl_operands(line: &str) -> Option<(&str, &str)> {
    line.strip_prefix("  movl ")?.split_once(", ")
}

/// Every `-N(%ebp)` load has a store to the same slot somewhere.
fn loads_have_matching_stores(out: &str) -> bool {
    let stored: BTreeSet<&str> = out
        .lines()
        .filter_map(movl_operands)
        .map(|(_, dst)| dst)
        .filter(|dst| dst.ends_with("(%ebp)"))
        .collect();
    out.lines()
        .filter_map(movl_operands)
        .map(|(src, _)| src)
        .filter(|src| src.starts_with('-') && src.ends_with("(%ebp)"))
        .all(|src| stored.contains(src))
}

/// `branch _Ldef; _Luse: <use>; return; _Ldef: <defs>; branch _Luse`
fn defined_below_use(defs: Vec<TacInstr>, uses: Vec<TacInstr>) -> TacProgram {
    let mut instrs = vec![
        TacInstr::Branch {
            target: Label::new("_Ldef"),
        },
        TacInstr::Mark {
            label: Label::new("_Luse"),
        },
    ];
    instrs.extend(uses);
    instrs.push(TacInstr::Return { value: None });
    instrs.push(TacInstr::Mark {
        label: Label::new("_Ldef"),
    });
    instrs.extend(defs);
    instrs.push(TacInstr::Branch {
        target: Label::new("_Luse"),
    });
    TacProgram {
        funcs: vec![TacFunc::new("main", 0, instrs)],
        vtables: Vec::new(),
    }
}

fn print_int(t: u32) -> [TacInstr; 2] {
    [
        TacInstr::Parm { value: Temp(t) },
        TacInstr::DirectCall {
            dst: None,
            entry: Label::new("_PrintInt"),
        },
    ]
}

#[test]
fn values_defined_below_their_use_in_layout() {
    let prog = defined_below_use(
        vec![TacInstr::LoadImm4 {
            dst: Temp(5),
            value: 42,
        }],
        print_int(5).to_vec(),
    );
    for kind in [AllocatorKind::Local, AllocatorKind::Coloring] {
        let out = compile_tac_to_x86_with(&options(kind), &prog)
            .unwrap_or_else(|e| panic!("{kind:?}: {e}"))
            .join();
        assert!(out.contains("  call _PrintInt\n"), "{kind:?}");
        assert!(loads_have_matching_stores(&out), "{kind:?}:\n{out}");
    }
}

#[test]
fn spilled_values_defined_below_their_use_in_layout() {
    let defs: Vec<TacInstr> = (0..9)
        .map(|t| TacInstr::LoadImm4 {
            dst: Temp(t),
            value: t as i32 + 1,
        })
        .collect();
    let mut uses: Vec<TacInstr> = (1..9).map(|t| binary(TacBinaryOp::Add, 0, 0, t)).collect();
    uses.extend(print_int(0));
    let prog = defined_below_use(defs, uses);

    for kind in [AllocatorKind::Local, AllocatorKind::Coloring] {
        let asm = compile_tac_to_x86_with(&options(kind), &prog)
            .unwrap_or_else(|e| panic!("{kind:?}: {e}"));
        assert!(asm.frames[0].frame_size > 12, "{kind:?}: nothing spilled");
        let out = asm.join();
        assert!(loads_have_matching_stores(&out), "{kind:?}:\n{out}");
    }
}

// ── TAC input ────────────────────────────────────────────────────────────

#[test]
fn json_programs_print_as_tac() {
    let prog: TacProgram =
        serde_json::from_str(&std::fs::read_to_string("../samples/classes.json").unwrap())
            .unwrap();
    let lines = prog.to_lines();
    assert_eq!(lines[0], "VTABLE(Animal) {");
    assert!(lines.contains(&"FUNCTION(main) {".to_string()));
    assert!(lines.contains(&"    _T2 = VTBL <_V_Dog>".to_string()));
    assert!(lines.contains(&"    *(_T1 + 4) = _T3".to_string()));
}
