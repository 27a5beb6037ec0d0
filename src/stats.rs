//! Per-opcode usage statistics.
//!
//! Counts every parsed instruction under its mnemonic, with disjunctive
//! alternatives keyed separately (`addd` vs `addd-imm`). In verbose-pattern
//! mode the matched immediate literal is appended in hex so that different
//! constants of the same opcode can be told apart.

use crate::arch::Architecture;
use crate::cfg::Program;
use crate::pretty_printing::ReallySigned;

use std::collections::BTreeMap;
use std::io::Write;

use num_format::{Locale, ToFormattedString};

/// Statistics of a single input program.
pub struct ProgramStatistics {
    pub program_name: String,
    counts: BTreeMap<String, u64>,
}

impl ProgramStatistics {
    pub fn new(program_name: &str) -> Self {
        ProgramStatistics { program_name: program_name.to_string(), counts: BTreeMap::new() }
    }

    /// Walk the program and count every instruction.
    pub fn analyse(&mut self, program: &Program, verbose_pattern: bool) {
        for block in program.live_blocks() {
            for bundle in &block.bundles {
                for insn in &bundle.insns {
                    let mut key = insn.mnemonic.clone();
                    if let Some(info) = &insn.match_info {
                        key.push('-');
                        key.push_str(info.tag);
                        if verbose_pattern {
                            if let Some(imm) = info.imm {
                                key.push_str(&format!(" {:x}", ReallySigned(imm)));
                            }
                        }
                    }
                    *self.counts.entry(key).or_insert(0) += 1;
                }
            }
        }
    }

    pub fn count(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Fold this program's counts into the per-input global table.
    pub fn fuse_in(
        &self,
        global: &mut BTreeMap<String, BTreeMap<String, u64>>,
        arch: &Architecture,
        exhaustive: bool,
    ) {
        let mut keys: Vec<String> = self.counts.keys().cloned().collect();
        if exhaustive {
            keys.extend(arch.spec.all_opcodes());
            keys.sort();
            keys.dedup();
        }
        for key in keys {
            global
                .entry(key.clone())
                .or_default()
                .insert(self.program_name.clone(), self.count(&key));
        }
    }
}

/// Dump the fused statistics table, one row per opcode and one column per
/// input.
pub fn dump_stats(
    global: &BTreeMap<String, BTreeMap<String, u64>>,
    inputs: &[String],
    csv: bool,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    writeln!(out, "# {}", inputs.join(", "))?;
    for (opc, per_input) in global {
        let counts: Vec<String> = inputs
            .iter()
            .map(|name| {
                let count = per_input.get(name).copied().unwrap_or(0);
                if csv {
                    count.to_string()
                } else {
                    count.to_formatted_string(&Locale::en)
                }
            })
            .collect();
        if csv {
            writeln!(out, "{}, {}", opc, counts.join(", "))?;
        } else {
            writeln!(out, "{:15} {}", opc, counts.join(", "))?;
        }
    }
    Ok(())
}
