//! Error types for the allocator pipeline.
//!
//! Every fatal condition carries enough context to point the user at the
//! offending input line. Nothing in here is recoverable; the binaries print
//! the message and exit non-zero.

use std::fmt;

use thiserror::Error;

/// Source location attached to every parsed line and forwarded through the
/// pipeline so that late failures (liveness, coloring) can still name the
/// input that caused them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo {
    pub file: Option<String>,
    pub line: usize,
}

impl DebugInfo {
    pub fn line(line: usize) -> Self {
        DebugInfo { file: None, line }
    }

    pub fn new(file: &str, line: usize) -> Self {
        DebugInfo { file: Some(file.to_string()), line }
    }
}

impl fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}", file, self.line),
            None => write!(f, "line {}", self.line),
        }
    }
}

#[derive(Error, Debug)]
pub enum AsmError {
    #[error("{dbg}: unknown mnemonic `{mnemonic}`")]
    UnknownMnemonic { mnemonic: String, dbg: DebugInfo },

    #[error("{dbg}: failed to match operands of `{mnemonic}`")]
    PatternMatch { mnemonic: String, dbg: DebugInfo },

    #[error("{dbg}: unknown macro `{name}`")]
    UnknownMacro { name: String, dbg: DebugInfo },

    #[error("{dbg}: malformed macro line")]
    MalformedMacro { dbg: DebugInfo },

    #[error("{dbg}: could not parse line")]
    MalformedLine { dbg: DebugInfo },

    #[error("{dbg}: label `{label}` cannot be inserted in the middle of a bundle")]
    LabelMidBundle { label: String, dbg: DebugInfo },

    #[error("merging two non-empty blocks under label `{label}`")]
    BlockMerge { label: String },

    #[error("{reg} is declared pre-defined but not alive at program entry")]
    PreDefinedNotLive { reg: String },

    #[error("{reg} is alive at program entry but not declared pre-defined")]
    UndeclaredLiveIn { reg: String },

    #[error("{reg} is used at {dbg} without being defined")]
    UseWithoutDef { reg: String, dbg: DebugInfo },

    #[error("{reg} must be alive at the end of block {block} but has no range there")]
    DanglingLiveOut { reg: String, block: usize },

    #[error("no feasible allocation for {reg} (linked registers: {linked})")]
    NoFeasibleColor { reg: String, linked: String },

    #[error("color {color} assigned to {reg} exceeds the {num_regs}-register file")]
    ColorOutOfRange { reg: String, color: usize, num_regs: usize },

    #[error("color conflict: {a} and {b} both assigned {color}")]
    ColorConflict { a: String, b: String, color: usize },

    #[error("unknown architecture `{name}`")]
    UnknownArch { name: String },

    #[error("register file for class {class} holds {num_regs} register(s), requested index {index}")]
    PhysIndexOutOfRange { class: &'static str, index: usize, num_regs: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
