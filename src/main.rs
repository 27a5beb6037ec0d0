use asmalloc::{
    architecture_by_name, error_exit,
    lexer::Lexer,
    parser::AsmParser,
    pretty_printing::{log, set_verbose, LogType},
    regalloc::allocate_program,
    AsmError, DebugInfo,
};

use std::fs::File;
use std::io::Write;

use clap::Parser;

/// Assembly-level register allocator: assigns physical indices to the
/// virtual register placeholders of the input program.
#[derive(Parser)]
#[clap(name = "asmalloc")]
struct Cli {
    /// Input assembly file
    input: String,

    /// Target architecture (dummy, rv32, rv64)
    #[clap(long, default_value = "dummy")]
    arch: String,

    /// Output file (defaults to stdout)
    #[clap(long)]
    output: Option<String>,

    /// Dump the fully assigned assembly listing instead of #define lines
    #[clap(short = 'S')]
    asm_dump: bool,

    /// Enable general debug/info message display
    #[clap(long)]
    verbose: bool,

    /// Enable lexer info/debug message display
    #[clap(long)]
    lexer_verbose: bool,

    /// Enable use-def evaluation info/message display
    #[clap(long)]
    usedef_verbose: bool,
}

fn run(args: &Cli) -> Result<(), AsmError> {
    let mut arch = architecture_by_name(&args.arch)?;
    let lexer = Lexer::new();

    log(LogType::Neutral, &format!("parsing input program {}", args.input));
    let source = std::fs::read_to_string(&args.input)?;
    let mut parser = AsmParser::new(&mut arch);
    for (no, line) in source.lines().enumerate() {
        let tokens = lexer.lex_line(line);
        if args.lexer_verbose {
            log(LogType::Neutral, &format!("{}: {:?}", no + 1, tokens));
        }
        parser.feed(&tokens, DebugInfo::new(&args.input, no + 1))?;
    }
    let program = parser.finish()?;

    log(LogType::Neutral, "register assignment");
    let coloring = allocate_program(&arch, &program, args.usedef_verbose)?;

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout()),
    };
    if args.asm_dump {
        program.dump(&arch, Some(&coloring), &mut out)?;
    } else {
        for (_, class_map) in coloring.iter() {
            for (&reg, &color) in class_map {
                if reg.is_virtual() {
                    writeln!(out, "#define {} {}", arch.pool.virt_name(reg), color)?;
                }
            }
        }
    }
    Ok(())
}

fn main() {
    let args = Cli::parse();
    set_verbose(args.verbose);
    if let Err(e) = run(&args) {
        error_exit(&e.to_string());
    }
}
