//! The instruction IR.
//!
//! Instructions keep their operands in two ordered lists (uses, then defs)
//! of [Operand]s. Bundles group instructions that issue in parallel on
//! bundling ISAs; on everything else a bundle holds exactly one instruction.

use crate::arch::{Architecture, Register};
use crate::error::DebugInfo;
use crate::regalloc::Coloring;

use std::collections::BTreeSet;

/// A single operand slot: a register object canonical to the architecture,
/// or an immediate. Immediates are ignored by liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operand {
    Reg(Register),
    Imm(i64),
}

impl Operand {
    pub fn reg(self) -> Option<Register> {
        match self {
            Operand::Reg(r) => Some(r),
            Operand::Imm(_) => None,
        }
    }
}

/// One step of an instruction's textual dump. The plan is resolved against
/// the coloring when the listing is emitted, so instructions stay plain data.
#[derive(Debug, Clone)]
pub enum RenderOp {
    Mnemonic,
    Lit(&'static str),
    Text(String),
    /// render `count` consecutive use operands starting at `index`;
    /// `count > 1` prints a compound register run
    Use { index: usize, count: usize },
    Def { index: usize, count: usize },
}

/// Which disjunctive alternative matched an instruction, used to key
/// statistics (`addd` vs `addd-imm`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInfo {
    pub tag: &'static str,
    pub imm: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub mnemonic: String,
    pub uses: Vec<Operand>,
    pub defs: Vec<Operand>,
    pub is_jump: bool,
    pub is_cond_jump: bool,
    pub jump_label: Option<String>,
    pub dbg: DebugInfo,
    pub match_info: Option<MatchInfo>,
    pub render: Vec<RenderOp>,
}

impl Instruction {
    /// Emit the textual form of this instruction. Virtual registers are
    /// printed through the coloring when one is supplied and symbolically
    /// (`$r<name>`) otherwise.
    pub fn render(&self, arch: &Architecture, colors: Option<&Coloring>) -> String {
        let mut out = String::new();
        for op in &self.render {
            match op {
                RenderOp::Mnemonic => out.push_str(&self.mnemonic),
                RenderOp::Lit(s) => out.push_str(s),
                RenderOp::Text(s) => out.push_str(s),
                RenderOp::Use { index, count } => {
                    out.push_str(&render_operands(arch, colors, &self.uses[*index..*index + *count]))
                }
                RenderOp::Def { index, count } => {
                    out.push_str(&render_operands(arch, colors, &self.defs[*index..*index + *count]))
                }
            }
        }
        out
    }
}

fn render_operands(arch: &Architecture, colors: Option<&Coloring>, ops: &[Operand]) -> String {
    if ops.len() == 1 {
        return match ops[0] {
            Operand::Imm(v) => v.to_string(),
            Operand::Reg(r) => render_reg(arch, colors, r),
        };
    }
    // compound run: one prefix, concatenated specifiers ($r6r7)
    let class = ops
        .iter()
        .filter_map(|o| o.reg())
        .map(|r| r.class)
        .next()
        .expect("compound operand run without registers");
    let desc = arch.spec.class_desc(class);
    let mut out = String::from(desc.prefix);
    for op in ops {
        if let Operand::Reg(r) = op {
            let index = r
                .base()
                .phys_index()
                .or_else(|| colors.and_then(|c| c.color_of(*r)));
            match index {
                Some(i) => out.push_str(&format!("{}{}", desc.reg_prefix, i)),
                None => out.push_str(&format!(
                    "{}<{}>",
                    desc.reg_prefix,
                    arch.pool.virt_name(*r)
                )),
            }
        }
    }
    out
}

fn render_reg(arch: &Architecture, colors: Option<&Coloring>, reg: Register) -> String {
    use crate::arch::RegKind;

    if let RegKind::Special { id } = reg.kind {
        return format!("${}", arch.pool.special_tag(id));
    }
    let desc = arch.spec.class_desc(reg.class);
    match reg.kind {
        RegKind::Phys { index } => format!("{}{}{}", desc.prefix, desc.reg_prefix, index),
        RegKind::Alias { alias, .. } => {
            format!("{}{}", desc.prefix, arch.pool.alias_text(alias))
        }
        RegKind::Virt { .. } => match colors.and_then(|c| c.color_of(reg)) {
            Some(color) => format!("{}{}{}", desc.prefix, desc.reg_prefix, color),
            None => format!(
                "{}{}<{}>",
                desc.prefix,
                desc.reg_prefix,
                arch.pool.virt_name(reg)
            ),
        },
        RegKind::Special { .. } => unreachable!("handled above"),
    }
}

/// An ordered set of instructions issued in parallel in one cycle.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub insns: Vec<Instruction>,
}

impl Bundle {
    pub fn push(&mut self, insn: Instruction) {
        self.insns.push(insn);
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    /// Union of the registers read by the contained instructions, aliases
    /// resolved to their base.
    pub fn uses(&self) -> BTreeSet<Register> {
        self.insns
            .iter()
            .flat_map(|i| i.uses.iter())
            .filter_map(|o| o.reg())
            .map(Register::base)
            .collect()
    }

    /// Union of the registers written by the contained instructions.
    pub fn defs(&self) -> BTreeSet<Register> {
        self.insns
            .iter()
            .flat_map(|i| i.defs.iter())
            .filter_map(|o| o.reg())
            .map(Register::base)
            .collect()
    }

    pub fn has_jump(&self) -> bool {
        self.insns.iter().any(|i| i.is_jump)
    }
}
