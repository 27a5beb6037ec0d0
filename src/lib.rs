//! # asmalloc
//!
//! An assembly-level register allocator with a table-driven parser.
//! Hand-written assembly containing virtual register placeholders is lexed
//! and parsed against a per-ISA pattern table into a CFG of instruction
//! bundles; iterative liveness analysis derives per-register live ranges,
//! an interference graph is built per register class, and a backtracking
//! graph coloring assigns physical indices under parity, alignment and
//! cross-register linkage constraints. A second binary computes per-opcode
//! statistics over assembly listings, objdump output or execution traces.

pub mod arch;
pub mod cfg;
pub mod dummy;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod liveness;
pub mod parser;
pub mod pattern;
pub mod pretty_printing;
pub mod regalloc;
pub mod riscv;
pub mod stats;

pub use error::{AsmError, DebugInfo};

use arch::Architecture;

/// Small wrapper to easily handle unrecoverable errors without panicking.
pub fn error_exit(msg: &str) -> ! {
    pretty_printing::log(pretty_printing::LogType::Failure, msg);
    std::process::exit(1);
}

/// Look up an architecture constructor by its command-line name.
pub fn architecture_by_name(name: &str) -> Result<Architecture, AsmError> {
    match name {
        "dummy" => Ok(dummy::dummy(16, 16)),
        "rv32" => Ok(riscv::rv32()),
        "rv64" => Ok(riscv::rv64()),
        _ => Err(AsmError::UnknownArch { name: name.to_string() }),
    }
}
