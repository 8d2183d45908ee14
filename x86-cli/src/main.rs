use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use x86_compiler::ir::TacProgram;
use x86_compiler::{compile_tac_to_x86_with, AllocatorKind, CodegenOptions};

#[derive(Parser)]
#[command(name = "x86c")]
#[command(about = "Compile three-address code (JSON) to i386 assembly")]
struct Args {
    /// TAC program in JSON form; read from stdin when omitted
    file: Option<PathBuf>,

    /// What to print
    #[arg(long, value_enum, default_value_t = Emit::Asm)]
    emit: Emit,

    /// Register allocation strategy
    #[arg(long, value_enum, default_value_t = AllocOpt::Coloring)]
    alloc: AllocOpt,

    /// Leave `# ...` annotations out of the assembly
    #[arg(long)]
    no_comments: bool,

    /// Write output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    Tac,
    Asm,
    Both,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AllocOpt {
    Local,
    Coloring,
}

impl From<AllocOpt> for AllocatorKind {
    fn from(opt: AllocOpt) -> Self {
        match opt {
            AllocOpt::Local => AllocatorKind::Local,
            AllocOpt::Coloring => AllocatorKind::Coloring,
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn read_program(file: Option<&PathBuf>) -> Result<TacProgram> {
    let (text, origin) = match file {
        Some(path) => (
            fs::read_to_string(path)
                .with_context(|| format!("reading '{}'", path.display()))?,
            path.display().to_string(),
        ),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            (buf, "<stdin>".to_string())
        }
    };
    serde_json::from_str(&text).with_context(|| format!("decoding TAC program from {origin}"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let program = read_program(args.file.as_ref())?;
    log::info!("loaded {} functions", program.funcs.len());

    let mut out = String::new();
    if matches!(args.emit, Emit::Tac | Emit::Both) {
        for line in program.to_lines() {
            out.push_str(&line);
            out.push('\n');
        }
    }
    if matches!(args.emit, Emit::Asm | Emit::Both) {
        let options = CodegenOptions {
            allocator: args.alloc.into(),
            comments: !args.no_comments,
        };
        let asm = compile_tac_to_x86_with(&options, &program)?;
        out.push_str(&asm.join());
    }

    match &args.output {
        Some(path) => fs::write(path, out)
            .with_context(|| format!("writing '{}'", path.display()))?,
        None => io::stdout()
            .write_all(out.as_bytes())
            .context("writing stdout")?,
    }
    Ok(())
}
