//! Bodies of the runtime intrinsics, written against libc.
//!
//! Each routine follows the same cdecl convention as generated code:
//! arguments at `8(%ebp)`, `12(%ebp)`, result in `%eax`. Format strings go
//! through the program's string pool so they land in the string section.

use super::instruction::AsmItem;
use super::pool::{string_label, StringPool};
use crate::ir::Intrinsic;

const READ_LINE_BUFFER: u32 = 1024;

const ENTER: [&str; 2] = ["  pushl %ebp", "  movl %esp, %ebp"];
const LEAVE: [&str; 2] = ["  leave", "  ret"];

/// The complete routine for `intrinsic`, label included.
pub fn routine(intrinsic: Intrinsic, pool: &mut StringPool) -> Vec<AsmItem> {
    let mut str_const = |s: &str| string_label(pool.add(s)).to_string();

    let body: Vec<String> = match intrinsic {
        Intrinsic::Allocate => vec![
            "  pushl 8(%ebp)".into(),
            "  pushl $1".into(),
            "  call calloc".into(),
            "  addl $8, %esp".into(),
        ],
        Intrinsic::ReadLine => {
            let newline = str_const("\n");
            vec![
                "  pushl %ebx".into(),
                format!("  pushl ${READ_LINE_BUFFER}"),
                "  call malloc".into(),
                "  addl $4, %esp".into(),
                "  movl %eax, %ebx".into(),
                "  movb $0, (%ebx)".into(),
                "  pushl stdin".into(),
                format!("  pushl ${READ_LINE_BUFFER}"),
                "  pushl %ebx".into(),
                "  call fgets".into(),
                "  addl $12, %esp".into(),
                format!("  pushl ${newline}"),
                "  pushl %ebx".into(),
                "  call strcspn".into(),
                "  addl $8, %esp".into(),
                "  movb $0, (%ebx,%eax)".into(),
                "  movl %ebx, %eax".into(),
                "  movl -4(%ebp), %ebx".into(),
            ]
        }
        Intrinsic::ReadInt => {
            let fmt = str_const("%d");
            vec![
                "  subl $4, %esp".into(),
                "  movl $0, -4(%ebp)".into(),
                "  leal -4(%ebp), %eax".into(),
                "  pushl %eax".into(),
                format!("  pushl ${fmt}"),
                "  call scanf".into(),
                "  addl $8, %esp".into(),
                "  movl -4(%ebp), %eax".into(),
            ]
        }
        Intrinsic::StringEqual => vec![
            "  pushl 12(%ebp)".into(),
            "  pushl 8(%ebp)".into(),
            "  call strcmp".into(),
            "  addl $8, %esp".into(),
            "  cmpl $0, %eax".into(),
            "  sete %al".into(),
            "  movzbl %al, %eax".into(),
        ],
        Intrinsic::PrintInt => print_with(&str_const("%d"), "8(%ebp)"),
        Intrinsic::PrintString => print_with(&str_const("%s"), "8(%ebp)"),
        Intrinsic::PrintBool => {
            let yes = str_const("true");
            let no = str_const("false");
            let fmt = str_const("%s");
            let print = format!("{}_print", intrinsic.entry());
            let mut lines = vec![
                format!("  movl ${yes}, %eax"),
                "  cmpl $0, 8(%ebp)".into(),
                format!("  jne {print}"),
                format!("  movl ${no}, %eax"),
                format!("{print}:"),
            ];
            lines.extend(print_with(&fmt, "%eax"));
            lines
        }
        Intrinsic::Halt => vec!["  pushl $0".into(), "  call exit".into()],
    };

    let mut items = vec![AsmItem::Label {
        name: intrinsic.entry().to_string(),
        comment: Some(format!("intrinsic {intrinsic}")),
    }];
    items.extend(ENTER.iter().map(|l| AsmItem::Text(l.to_string())));
    items.extend(body.into_iter().map(AsmItem::Text));
    if intrinsic != Intrinsic::Halt {
        items.extend(LEAVE.iter().map(|l| AsmItem::Text(l.to_string())));
    }
    items
}

fn print_with(fmt: &str, value: &str) -> Vec<String> {
    vec![
        format!("  pushl {value}"),
        format!("  pushl ${fmt}"),
        "  call printf".into(),
        "  addl $8, %esp".into(),
    ]
}
