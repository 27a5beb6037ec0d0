use asmalloc::{
    architecture_by_name, error_exit,
    lexer::Lexer,
    parser::AsmParser,
    pretty_printing::{log, set_verbose, LogType},
    stats::{dump_stats, ProgramStatistics},
    AsmError, DebugInfo,
};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;

use clap::Parser;

/// Per-opcode statistics over assembly listings, objdump output or
/// execution traces.
#[derive(Parser)]
#[clap(name = "asmstats")]
struct Cli {
    /// Input files
    #[clap(required = true)]
    input: Vec<String>,

    /// Target architecture (dummy, rv32, rv64)
    #[clap(long, default_value = "dummy")]
    arch: String,

    /// Assembly parsing mode (asm, objdump, trace)
    #[clap(long, default_value = "asm")]
    mode: String,

    /// Output file (defaults to stdout)
    #[clap(long)]
    output: Option<String>,

    /// Number of accepted parse errors before stopping
    #[clap(long, default_value_t = 0)]
    allow_error: usize,

    /// Distinguish instructions by their matched immediate literal
    #[clap(long)]
    verbose_pattern: bool,

    /// Also display zero counts for opcodes absent from the input
    #[clap(long)]
    display_all_opcodes: bool,

    /// Output in csv format
    #[clap(long)]
    csv: bool,

    /// Enable lexer info/debug message display
    #[clap(long)]
    lexer_verbose: bool,

    /// Enable general debug/info message display
    #[clap(long)]
    verbose: bool,
}

fn run(args: &Cli) -> Result<(), AsmError> {
    if !matches!(args.mode.as_str(), "asm" | "objdump" | "trace") {
        error_exit(&format!("unknown parsing mode `{}`", args.mode));
    }
    let lexer = Lexer::new();
    let mut global: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    let mut error_count = 0usize;

    for input in &args.input {
        log(LogType::Neutral, &format!("parsing input program {}", input));
        let mut arch = architecture_by_name(&args.arch)?;
        let source = std::fs::read_to_string(input)?;
        let mut parser = AsmParser::new(&mut arch);
        for (no, line) in source.lines().enumerate() {
            // objdump file header
            if line.contains("file format") {
                continue;
            }
            let tokens = lexer.lex_line(line);
            if args.lexer_verbose {
                log(LogType::Neutral, &format!("{}: {:?}", no + 1, tokens));
            }
            let dbg = DebugInfo::new(input, no + 1);
            let fed = match args.mode.as_str() {
                "objdump" => parser.feed_objdump(&tokens, dbg),
                "trace" => parser.feed_trace(&tokens, dbg),
                _ => parser.feed(&tokens, dbg),
            };
            if let Err(e) = fed {
                error_count += 1;
                log(LogType::Failure, &format!("{} ({})", e, line));
                if error_count > args.allow_error {
                    return Err(e);
                }
            }
        }
        let program = parser.finish()?;

        let mut program_stats = ProgramStatistics::new(input);
        program_stats.analyse(&program, args.verbose_pattern);
        program_stats.fuse_in(&mut global, &arch, args.display_all_opcodes);
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout()),
    };
    dump_stats(&global, &args.input, args.csv, &mut out)?;
    Ok(())
}

fn main() {
    let args = Cli::parse();
    set_verbose(args.verbose);
    if let Err(e) = run(&args) {
        error_exit(&e.to_string());
    }
}
