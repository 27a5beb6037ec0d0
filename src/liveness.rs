//! Backward dataflow liveness and live-range construction.
//!
//! `live_in`/`live_out` are computed per block with the standard worklist
//! fixpoint; the sink block is seeded with the post-used registers.
//! Use/def entries are resolved to their base register before being
//! recorded and immediates are skipped. Live ranges are then materialized
//! per block as half-open `(block, bundle)` intervals.

use crate::arch::{Architecture, RegClass, Register};
use crate::cfg::Program;
use crate::error::{AsmError, DebugInfo};
use crate::pretty_printing::{log, LogType};

use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub struct Liveness {
    pub live_in: Vec<BTreeSet<Register>>,
    pub live_out: Vec<BTreeSet<Register>>,
    pub gens: Vec<BTreeSet<Register>>,
    pub kills: Vec<BTreeSet<Register>>,
}

/// Compute per-block liveness over the whole CFG.
pub fn compute(program: &Program, verbose: bool) -> Liveness {
    let n = program.blocks.len();
    let mut gens = vec![BTreeSet::new(); n];
    let mut kills = vec![BTreeSet::new(); n];

    for block in program.live_blocks() {
        let mut defined: BTreeSet<Register> = BTreeSet::new();
        for bundle in &block.bundles {
            for insn in &bundle.insns {
                for op in &insn.uses {
                    if let Some(reg) = op.reg() {
                        let reg = reg.base();
                        if !defined.contains(&reg) {
                            gens[block.index].insert(reg);
                        }
                    }
                }
                for op in &insn.defs {
                    if let Some(reg) = op.reg() {
                        let reg = reg.base();
                        kills[block.index].insert(reg);
                        defined.insert(reg);
                    }
                }
            }
        }
    }

    let mut live_in = vec![BTreeSet::new(); n];
    let mut live_out = vec![BTreeSet::new(); n];

    // boundary condition: post-used registers leave the program alive
    let post: BTreeSet<Register> = program.post_used.iter().map(|r| r.base()).collect();
    live_in[program.sink] = post.clone();
    live_out[program.sink] = post;

    let mut worklist: VecDeque<usize> = program.live_blocks().map(|b| b.index).collect();
    while let Some(b) = worklist.pop_front() {
        if b == program.sink {
            continue;
        }
        let mut out = BTreeSet::new();
        for &succ in &program.blocks[b].succs {
            out.extend(live_in[succ].iter().copied());
        }
        let mut ins: BTreeSet<Register> =
            out.difference(&kills[b]).copied().collect();
        ins.extend(gens[b].iter().copied());
        if ins != live_in[b] {
            for &pred in &program.blocks[b].preds {
                worklist.push_back(pred);
            }
        }
        live_out[b] = out;
        live_in[b] = ins;
    }

    if verbose {
        for block in program.live_blocks() {
            log(
                LogType::Neutral,
                &format!(
                    "block {} ({}): live_in {:?} live_out {:?}",
                    block.index, block.label, live_in[block.index], live_out[block.index]
                ),
            );
        }
    }

    Liveness { live_in, live_out, gens, kills }
}

/// Boundary consistency: every declared pre-defined register must be alive
/// at entry, and nothing but pre-defined or constant registers may be.
pub fn check_boundaries(
    program: &Program,
    live: &Liveness,
    arch: &Architecture,
) -> Result<(), AsmError> {
    let entry = &live.live_out[program.source];
    let declared: BTreeSet<Register> =
        program.pre_defined.iter().map(|r| r.base()).collect();
    for reg in &declared {
        if !entry.contains(reg) {
            return Err(AsmError::PreDefinedNotLive { reg: arch.describe(*reg) });
        }
    }
    for reg in entry {
        if !declared.contains(reg) && !arch.spec.is_const(*reg) {
            return Err(AsmError::UndeclaredLiveIn { reg: arch.describe(*reg) });
        }
    }
    Ok(())
}

/// A position in the program: sentinels sort below and above every finite
/// `(block, bundle)` pair; block entry sits at bundle -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LivePoint {
    BeforeStart,
    At { block: usize, bundle: i64 },
    AfterEnd,
}

#[derive(Debug, Clone, Default)]
pub struct LiveRange {
    pub start: Option<LivePoint>,
    pub stop: Option<LivePoint>,
    pub start_dbg: Option<DebugInfo>,
    pub stop_dbg: Option<DebugInfo>,
}

impl LiveRange {
    fn starting_at(point: LivePoint, dbg: Option<DebugInfo>) -> Self {
        LiveRange { start: Some(point), stop: None, start_dbg: dbg, stop_dbg: None }
    }

    pub fn update_start(&mut self, point: LivePoint, dbg: Option<DebugInfo>) {
        if self.start.map_or(true, |s| point < s) {
            self.start = Some(point);
            self.start_dbg = dbg;
        }
    }

    pub fn update_stop(&mut self, point: LivePoint, dbg: Option<DebugInfo>) {
        if self.stop.map_or(true, |s| point > s) {
            self.stop = Some(point);
            self.stop_dbg = dbg;
        }
    }

    pub fn is_valid(&self) -> bool {
        self.start.is_some() && self.stop.is_some()
    }

    /// Half-open interval overlap in the `(block, bundle)` order.
    pub fn intersects(&self, other: &LiveRange) -> bool {
        let (Some(start), Some(stop)) = (self.start, self.stop) else { return false };
        let (Some(ostart), Some(ostop)) = (other.start, other.stop) else { return false };
        !(stop <= ostart || start >= ostop)
    }

    /// Any-pair overlap between two range lists.
    pub fn lists_intersect(a: &[LiveRange], b: &[LiveRange]) -> bool {
        a.iter().any(|ra| b.iter().any(|rb| ra.intersects(rb)))
    }
}

/// Per-class map from register to its disjoint live ranges.
pub struct LiveRangeMap {
    classes: BTreeMap<RegClass, BTreeMap<Register, Vec<LiveRange>>>,
}

impl LiveRangeMap {
    pub fn new(classes: impl IntoIterator<Item = RegClass>) -> Self {
        LiveRangeMap {
            classes: classes.into_iter().map(|c| (c, BTreeMap::new())).collect(),
        }
    }

    pub fn classes(&self) -> impl Iterator<Item = RegClass> + '_ {
        self.classes.keys().copied()
    }

    pub fn class_map(&self, class: RegClass) -> Option<&BTreeMap<Register, Vec<LiveRange>>> {
        self.classes.get(&class)
    }

    pub fn ranges(&self, reg: Register) -> &[LiveRange] {
        self.classes
            .get(&reg.class)
            .and_then(|m| m.get(&reg))
            .map_or(&[], |v| v.as_slice())
    }

    fn ranges_mut(&mut self, reg: Register) -> &mut Vec<LiveRange> {
        self.classes
            .entry(reg.class)
            .or_default()
            .entry(reg)
            .or_default()
    }

    pub fn contains(&self, reg: Register) -> bool {
        self.classes
            .get(&reg.class)
            .map_or(false, |m| m.contains_key(&reg))
    }

    pub fn all_registers(&self) -> Vec<Register> {
        self.classes
            .values()
            .flat_map(|m| m.keys().copied())
            .collect()
    }

    /// Anchor a register alive before the program starts.
    pub fn declare_pre_defined(&mut self, reg: Register) {
        let ranges = self.ranges_mut(reg);
        if ranges.is_empty() {
            ranges.push(LiveRange::default());
        }
        let last = ranges.last_mut().unwrap();
        last.update_start(LivePoint::BeforeStart, Some(DebugInfo::line(0)));
    }

    /// Anchor a register alive after the program ends.
    pub fn declare_post_used(&mut self, reg: Register) {
        let ranges = self.ranges_mut(reg);
        if ranges.is_empty() {
            ranges.push(LiveRange::default());
        }
        let last = ranges.last_mut().unwrap();
        last.update_stop(LivePoint::AfterEnd, Some(DebugInfo::line(0)));
    }
}

/// Materialize live ranges from the per-block liveness sets.
pub fn build_ranges(
    program: &Program,
    live: &Liveness,
    arch: &Architecture,
) -> Result<LiveRangeMap, AsmError> {
    let mut map = LiveRangeMap::new(arch.spec.classes.iter().map(|d| d.class));

    for block in program.live_blocks() {
        let b = block.index;
        for &reg in &live.live_in[b] {
            map.ranges_mut(reg)
                .push(LiveRange::starting_at(LivePoint::At { block: b, bundle: -1 }, None));
        }
        for (i, bundle) in block.bundles.iter().enumerate() {
            let here = LivePoint::At { block: b, bundle: i as i64 };
            for insn in &bundle.insns {
                for op in &insn.uses {
                    let Some(reg) = op.reg() else { continue };
                    let reg = reg.base();
                    let ranges = map.ranges_mut(reg);
                    if ranges.is_empty() {
                        ranges.push(LiveRange::default());
                    }
                    ranges
                        .last_mut()
                        .unwrap()
                        .update_stop(here, Some(insn.dbg.clone()));
                }
                for op in &insn.defs {
                    let Some(reg) = op.reg() else { continue };
                    let reg = reg.base();
                    let ranges = map.ranges_mut(reg);
                    // a second def at the same position reuses the open range
                    if ranges.last().map_or(false, |r| r.start == Some(here)) {
                        continue;
                    }
                    ranges.push(LiveRange::starting_at(here, Some(insn.dbg.clone())));
                }
            }
        }
        let end = LivePoint::At { block: b, bundle: block.bundles.len() as i64 };
        for &reg in &live.live_out[b] {
            if !map.contains(reg) {
                return Err(AsmError::DanglingLiveOut { reg: arch.describe(reg), block: b });
            }
            map.ranges_mut(reg).last_mut().unwrap().update_stop(end, None);
        }
    }
    Ok(map)
}

/// Validate the range map. A range stopped without ever starting is a use of
/// an undefined register (fatal); a range started without a stop is a dead
/// definition, tolerated and closed at its own position.
pub fn check_ranges(map: &mut LiveRangeMap, arch: &Architecture) -> Result<(), AsmError> {
    for reg in map.all_registers() {
        for range in map.ranges_mut(reg) {
            match (range.start, range.stop) {
                (None, Some(_)) => {
                    return Err(AsmError::UseWithoutDef {
                        reg: arch.describe(reg),
                        dbg: range.stop_dbg.clone().unwrap_or_default(),
                    });
                }
                (Some(start), None) => {
                    log(
                        LogType::Neutral,
                        &format!("{} is defined but never used", arch.describe(reg)),
                    );
                    range.stop = Some(start);
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy;
    use crate::lexer::Lexer;
    use crate::parser::AsmParser;

    fn parse(arch: &mut Architecture, source: &str) -> Program {
        let lexer = Lexer::new();
        let mut parser = AsmParser::new(arch);
        for (no, line) in source.lines().enumerate() {
            parser
                .feed(&lexer.lex_line(line), DebugInfo::line(no + 1))
                .unwrap();
        }
        parser.finish().unwrap()
    }

    const BASIC: &str = "\
//# PREDEFINED($r5, $r1, $r12)
add R(p) = $r5, $r5
ld R(p) = R(p)[$r12]
;;
add R(q) = R(p), $r1
;;
//# POSTUSED($r0)
add $r0 = R(q), $r1
;;
";

    #[test]
    fn same_bundle_def_then_use_is_not_upward_exposed() {
        let mut arch = dummy::dummy(16, 16);
        let program = parse(&mut arch, BASIC);
        let live = compute(&program, false);
        let body = program.current;
        let p = arch.pool.virt(crate::arch::RegClass::Std, "p", crate::arch::IndexConstraint::Any);
        assert!(!live.live_in[body].contains(&p));
        assert!(live.gens[body].contains(&arch.phys(crate::arch::RegClass::Std, 5).unwrap()));
        assert!(live.kills[body].contains(&p));
    }

    #[test]
    fn boundary_checks_accept_a_consistent_program() {
        let mut arch = dummy::dummy(16, 16);
        let program = parse(&mut arch, BASIC);
        let live = compute(&program, false);
        check_boundaries(&program, &live, &arch).unwrap();
        // pre-defined is exactly what is alive at entry here
        let declared: BTreeSet<Register> =
            program.pre_defined.iter().map(|r| r.base()).collect();
        assert_eq!(live.live_out[program.source], declared);
    }

    #[test]
    fn post_used_seeds_the_sink() {
        let mut arch = dummy::dummy(16, 16);
        let program = parse(&mut arch, BASIC);
        let live = compute(&program, false);
        let r0 = arch.phys(crate::arch::RegClass::Std, 0).unwrap();
        assert!(live.live_in[program.sink].contains(&r0));
        assert!(live.live_out[program.current].contains(&r0));
    }

    #[test]
    fn undeclared_entry_liveness_is_fatal() {
        let mut arch = dummy::dummy(16, 16);
        // $r1 is post-used but never defined, so it must be alive at entry
        let program = parse(
            &mut arch,
            "//# PREDEFINED($r2, $r3)\n//# POSTUSED($r0, $r1)\nadd $r0 = $r2, $r3\n;;\n",
        );
        let live = compute(&program, false);
        let err = check_boundaries(&program, &live, &arch).unwrap_err();
        assert!(matches!(err, AsmError::UndeclaredLiveIn { .. }));
    }

    #[test]
    fn missing_pre_defined_register_is_fatal() {
        let mut arch = dummy::dummy(16, 16);
        // $r9 is declared but nothing keeps it alive at entry
        let program = parse(
            &mut arch,
            "//# PREDEFINED($r2, $r3, $r9)\nadd $r0 = $r2, $r3\n;;\n//# POSTUSED($r0)\n",
        );
        let live = compute(&program, false);
        let err = check_boundaries(&program, &live, &arch).unwrap_err();
        assert!(matches!(err, AsmError::PreDefinedNotLive { .. }));
    }

    #[test]
    fn ranges_are_pairwise_disjoint_per_register() {
        let mut arch = dummy::dummy(16, 16);
        let program = parse(&mut arch, BASIC);
        let live = compute(&program, false);
        let mut map = build_ranges(&program, &live, &arch).unwrap();
        check_ranges(&mut map, &arch).unwrap();
        for reg in map.all_registers() {
            let ranges = map.ranges(reg);
            for (i, a) in ranges.iter().enumerate() {
                assert!(a.is_valid());
                for b in &ranges[i + 1..] {
                    assert!(!a.intersects(b), "overlapping ranges for a register");
                }
            }
        }
    }

    #[test]
    fn coalesced_defs_open_one_range_per_position() {
        let mut arch = dummy::dummy(16, 16);
        // two instructions of the same bundle write the same register
        let program = parse(
            &mut arch,
            "//# PREDEFINED($r1, $r2)\nadd R(x) = $r1, $r1\nadd R(x) = $r2, $r2\n;;\n//# POSTUSED($r0)\nadd $r0 = R(x), $r2\n;;\n",
        );
        let live = compute(&program, false);
        let map = build_ranges(&program, &live, &arch).unwrap();
        let x = arch.pool.virt(crate::arch::RegClass::Std, "x", crate::arch::IndexConstraint::Any);
        assert_eq!(map.ranges(x).len(), 1);
    }

    #[test]
    fn sentinels_order_around_finite_points() {
        let finite = LivePoint::At { block: 3, bundle: 7 };
        assert!(LivePoint::BeforeStart < finite);
        assert!(finite < LivePoint::AfterEnd);
        assert!(
            LivePoint::At { block: 3, bundle: -1 } < LivePoint::At { block: 3, bundle: 0 }
        );
        assert!(
            LivePoint::At { block: 3, bundle: 9 } < LivePoint::At { block: 4, bundle: -1 }
        );
    }

    #[test]
    fn sentinel_anchoring_for_boundary_registers() {
        let mut arch = dummy::dummy(16, 16);
        let r0 = arch.phys(crate::arch::RegClass::Std, 0).unwrap();
        let mut map = LiveRangeMap::new([crate::arch::RegClass::Std]);
        map.declare_post_used(r0);
        assert_eq!(map.ranges(r0)[0].stop, Some(LivePoint::AfterEnd));
        map.declare_pre_defined(r0);
        assert_eq!(map.ranges(r0)[0].start, Some(LivePoint::BeforeStart));
    }

    #[test]
    fn use_without_def_is_detected() {
        let mut arch = dummy::dummy(16, 16);
        let mut map = LiveRangeMap::new([crate::arch::RegClass::Std]);
        let ghost = arch.pool.virt(
            crate::arch::RegClass::Std,
            "ghost",
            crate::arch::IndexConstraint::Any,
        );
        let mut range = LiveRange::default();
        range.update_stop(LivePoint::At { block: 2, bundle: 0 }, None);
        map.ranges_mut(ghost).push(range);
        let err = check_ranges(&mut map, &arch).unwrap_err();
        assert!(matches!(err, AsmError::UseWithoutDef { .. }));
    }
}
