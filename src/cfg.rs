//! Control-flow graph construction.
//!
//! A [Program] owns an arena of [BasicBlock]s. Two blocks are pre-created:
//! `source` (no predecessors) and `sink` (no successors); an implicit
//! current block is wired behind `source` and receives bundles until a label
//! or jump changes the flow. Labels may be referenced before they are
//! defined: a forward jump pre-creates the target block, which is merged
//! into the block that ends up carrying the label.

use crate::arch::{Architecture, Register};
use crate::error::AsmError;
use crate::ir::Bundle;
use crate::regalloc::Coloring;

use std::io::Write;

use rustc_hash::FxHashMap;

#[derive(Debug)]
pub struct BasicBlock {
    /// Index in program order, unique within the owning program
    pub index: usize,

    pub label: String,

    /// Every label attached to this block (grows when blocks merge)
    pub labels: Vec<String>,

    pub bundles: Vec<Bundle>,

    /// Predecessor block indices
    pub preds: Vec<usize>,

    /// Successor block indices
    pub succs: Vec<usize>,

    /// Set once the block has been absorbed into another one; tombstones
    /// keep indices stable
    pub merged: bool,
}

impl BasicBlock {
    fn new(index: usize, label: &str) -> Self {
        BasicBlock {
            index,
            label: label.to_string(),
            labels: Vec::new(),
            bundles: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            merged: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// A block falls through to the next one unless its final bundle jumps.
    pub fn fallback(&self) -> bool {
        self.bundles.last().map_or(true, |b| !b.has_jump())
    }
}

#[derive(Debug)]
pub struct Program {
    pub blocks: Vec<BasicBlock>,
    label_map: FxHashMap<String, usize>,
    pub source: usize,
    pub sink: usize,
    pub current: usize,

    /// Registers declared alive before the program starts
    pub pre_defined: Vec<Register>,

    /// Registers required alive after the program ends
    pub post_used: Vec<Register>,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    pub fn new() -> Self {
        let mut program = Program {
            blocks: Vec::new(),
            label_map: FxHashMap::default(),
            source: 0,
            sink: 0,
            current: 0,
            pre_defined: Vec::new(),
            post_used: Vec::new(),
        };
        program.source = program.add_block("source");
        program.sink = program.add_block("sink");
        program.current = program.add_block("undef");
        program.connect(program.source, program.current);
        program
    }

    fn add_block(&mut self, label: &str) -> usize {
        let index = self.blocks.len();
        self.blocks.push(BasicBlock::new(index, label));
        index
    }

    pub fn connect(&mut self, from: usize, to: usize) {
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
    }

    pub fn add_bundle(&mut self, bundle: Bundle) {
        self.blocks[self.current].bundles.push(bundle);
    }

    /// Block already associated with `label`, creating one for a forward
    /// reference if needed.
    pub fn block_by_label(&mut self, label: &str) -> usize {
        match self.label_map.get(label) {
            Some(&idx) => idx,
            None => {
                let idx = self.add_block(label);
                self.label_map.insert(label.to_string(), idx);
                idx
            }
        }
    }

    /// Declare `label` at the current position. A non-empty current block is
    /// closed first (connected to the new block when it falls through); a
    /// block pre-created by a forward jump is merged in.
    pub fn add_label(&mut self, label: &str) -> Result<(), AsmError> {
        if !self.blocks[self.current].is_empty() {
            let prev = self.current;
            self.current = self.add_block(label);
            if self.blocks[prev].fallback() {
                self.connect(prev, self.current);
            }
        }
        match self.label_map.get(label) {
            Some(&existing) if existing != self.current => {
                self.merge_into_current(existing, label)?;
            }
            _ => {}
        }
        self.blocks[self.current].label = label.to_string();
        self.blocks[self.current].labels.push(label.to_string());
        self.label_map.insert(label.to_string(), self.current);
        Ok(())
    }

    /// Absorb `from` into the current block: union the edge lists (rewiring
    /// neighbours), keep whichever bundle list is non-empty, move the labels.
    fn merge_into_current(&mut self, from: usize, label: &str) -> Result<(), AsmError> {
        let into = self.current;
        if !self.blocks[into].is_empty() && !self.blocks[from].is_empty() {
            return Err(AsmError::BlockMerge { label: label.to_string() });
        }
        if self.blocks[into].is_empty() && !self.blocks[from].is_empty() {
            let bundles = std::mem::take(&mut self.blocks[from].bundles);
            self.blocks[into].bundles = bundles;
        }
        let preds = std::mem::take(&mut self.blocks[from].preds);
        for p in preds {
            for s in &mut self.blocks[p].succs {
                if *s == from {
                    *s = into;
                }
            }
            self.blocks[into].preds.push(p);
        }
        let succs = std::mem::take(&mut self.blocks[from].succs);
        for s in succs {
            for p in &mut self.blocks[s].preds {
                if *p == from {
                    *p = into;
                }
            }
            self.blocks[into].succs.push(s);
        }
        let labels = std::mem::take(&mut self.blocks[from].labels);
        for l in &labels {
            self.label_map.insert(l.clone(), into);
        }
        self.blocks[into].labels.extend(labels);
        self.blocks[from].merged = true;
        Ok(())
    }

    /// Finish the program: a fall-through tail is connected to `sink`.
    pub fn end_program(&mut self) {
        if self.current != self.sink && self.blocks[self.current].fallback() {
            self.connect(self.current, self.sink);
        }
    }

    /// Blocks that still exist (merge tombstones skipped), in program order.
    pub fn live_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter(|b| !b.merged)
    }

    /// Dump the program as an assembly listing, virtual registers replaced
    /// through `colors`.
    pub fn dump(
        &self,
        arch: &Architecture,
        colors: Option<&Coloring>,
        out: &mut dyn Write,
    ) -> std::io::Result<()> {
        for block in self.live_blocks() {
            if block.index == self.source || block.index == self.sink {
                continue;
            }
            for label in &block.labels {
                writeln!(out, "{}:", label)?;
            }
            for bundle in &block.bundles {
                for insn in &bundle.insns {
                    writeln!(out, "\t{}", insn.render(arch, colors))?;
                }
                if arch.spec.has_bundles {
                    writeln!(out, ";;")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle_with_jump() -> Bundle {
        use crate::error::DebugInfo;
        use crate::ir::Instruction;
        let mut b = Bundle::default();
        b.push(Instruction {
            mnemonic: "goto".into(),
            uses: Vec::new(),
            defs: Vec::new(),
            is_jump: true,
            is_cond_jump: false,
            jump_label: Some("l".into()),
            dbg: DebugInfo::line(1),
            match_info: None,
            render: Vec::new(),
        });
        b
    }

    #[test]
    fn fresh_program_wires_source_to_current() {
        let p = Program::new();
        assert_eq!(p.blocks[p.source].succs, vec![p.current]);
        assert_eq!(p.blocks[p.current].preds, vec![p.source]);
        assert!(p.blocks[p.sink].succs.is_empty());
    }

    #[test]
    fn forward_reference_creates_one_block_and_merges_on_definition() {
        let mut p = Program::new();
        let before = p.blocks.len();
        let target = p.block_by_label("l");
        assert_eq!(p.blocks.len(), before + 1);
        assert_eq!(p.block_by_label("l"), target);

        // a jump wires the edge, then the label definition absorbs the
        // pre-created block into the block that carries the code
        let jumping = p.current;
        p.connect(jumping, target);
        p.add_bundle(bundle_with_jump());
        p.add_label("l").unwrap();
        assert!(p.blocks[target].merged);
        let l = p.block_by_label("l");
        assert_ne!(l, target);
        assert!(p.blocks[l].preds.contains(&jumping));
        assert!(p.blocks[jumping].succs.contains(&l));
    }

    #[test]
    fn empty_current_block_is_relabeled_in_place() {
        let mut p = Program::new();
        let current = p.current;
        p.add_label("entry").unwrap();
        assert_eq!(p.current, current);
        assert_eq!(p.blocks[current].label, "entry");
    }

    #[test]
    fn merging_two_nonempty_blocks_is_an_error() {
        let mut p = Program::new();
        let target = p.block_by_label("l");
        p.blocks[target].bundles.push(bundle_with_jump());
        p.add_bundle(bundle_with_jump());
        assert!(matches!(
            p.merge_into_current(target, "l"),
            Err(AsmError::BlockMerge { .. })
        ));
    }

    #[test]
    fn fall_through_tail_connects_to_sink() {
        let mut p = Program::new();
        p.add_bundle(Bundle::default());
        p.end_program();
        assert!(p.blocks[p.current].succs.contains(&p.sink));
        assert!(p.blocks[p.sink].preds.contains(&p.current));
    }

    #[test]
    fn jumping_tail_does_not_fall_through() {
        let mut p = Program::new();
        let target = p.block_by_label("l");
        let jumping = p.current;
        p.connect(jumping, target);
        p.add_bundle(bundle_with_jump());
        p.end_program();
        assert!(!p.blocks[jumping].succs.contains(&p.sink));
    }
}
