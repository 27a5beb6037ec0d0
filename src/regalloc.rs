//! Graph-coloring register allocation.
//!
//! Per register class: build the interference graph from live-range
//! overlap, pre-color physical registers with their own index, then
//! repeatedly pick the uncolored node of maximum uncolored degree and color
//! it together with its whole linked closure in one atomic backtracking
//! sub-allocation. There is no spilling; an exhausted color set is a fatal
//! allocation failure.

use crate::arch::{Architecture, RegClass, Register};
use crate::cfg::Program;
use crate::error::AsmError;
use crate::liveness::{self, LiveRange, LiveRangeMap};
use crate::pretty_printing::{log, LogType};

use std::collections::{BTreeMap, BTreeSet};

/// Interference adjacency per register, keyed and iterated in register
/// order so that allocation is reproducible.
pub type ConflictGraph = BTreeMap<Register, BTreeSet<Register>>;

/// The produced register assignment, one color map per class.
#[derive(Debug, Default, Clone)]
pub struct Coloring {
    classes: BTreeMap<RegClass, BTreeMap<Register, usize>>,
}

impl Coloring {
    pub fn color_of(&self, reg: Register) -> Option<usize> {
        let reg = reg.base();
        self.classes.get(&reg.class)?.get(&reg).copied()
    }

    pub fn class_map(&self, class: RegClass) -> Option<&BTreeMap<Register, usize>> {
        self.classes.get(&class)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegClass, &BTreeMap<Register, usize>)> {
        self.classes.iter().map(|(c, m)| (*c, m))
    }

    fn insert(&mut self, reg: Register, color: usize) {
        self.classes.entry(reg.class).or_default().insert(reg, color);
    }
}

pub struct RegisterAllocator<'a> {
    arch: &'a Architecture,
}

impl<'a> RegisterAllocator<'a> {
    pub fn new(arch: &'a Architecture) -> Self {
        RegisterAllocator { arch }
    }

    /// Build one interference graph per allocatable class. Special
    /// registers are symbolic and never colored, so their class is skipped.
    pub fn build_conflicts(&self, ranges: &LiveRangeMap) -> BTreeMap<RegClass, ConflictGraph> {
        let mut out = BTreeMap::new();
        for class in ranges.classes() {
            if class == RegClass::Special {
                continue;
            }
            let Some(class_map) = ranges.class_map(class) else { continue };
            let mut graph: ConflictGraph = BTreeMap::new();
            for &reg in class_map.keys() {
                graph.entry(reg).or_default();
            }
            let regs: Vec<Register> = class_map.keys().copied().collect();
            for (i, &a) in regs.iter().enumerate() {
                for &b in &regs[i + 1..] {
                    if LiveRange::lists_intersect(&class_map[&a], &class_map[&b]) {
                        graph.get_mut(&a).unwrap().insert(b);
                        graph.get_mut(&b).unwrap().insert(a);
                    }
                }
            }
            out.insert(class, graph);
        }
        out
    }

    /// Color every class of the conflict map.
    pub fn color(
        &self,
        conflicts: &BTreeMap<RegClass, ConflictGraph>,
    ) -> Result<Coloring, AsmError> {
        let mut coloring = Coloring::default();
        for (&class, graph) in conflicts {
            let class_colors = self.color_class(class, graph)?;
            for (reg, color) in class_colors {
                coloring.insert(reg, color);
            }
        }
        Ok(coloring)
    }

    fn color_class(
        &self,
        class: RegClass,
        graph: &ConflictGraph,
    ) -> Result<BTreeMap<Register, usize>, AsmError> {
        let num_phys = self.arch.spec.num_phys(class);
        let mut colors: BTreeMap<Register, usize> = BTreeMap::new();

        // physical registers are pre-colored with their own index
        for &reg in graph.keys() {
            if let Some(index) = reg.phys_index() {
                colors.insert(reg, index);
            }
        }

        // linked closures may pull in registers without a graph node, so
        // completion is judged on the graph keys rather than on map sizes
        while let Some(picked) = self.max_uncolored_degree(graph, &colors) {
            let chain = self.linked_closure(picked, &colors);
            if !self.allocate_chain(&chain, graph, &mut colors, class) {
                let linked = chain[1..]
                    .iter()
                    .map(|&r| self.arch.describe(r))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(AsmError::NoFeasibleColor {
                    reg: self.arch.describe(picked),
                    linked,
                });
            }
            for &reg in &chain {
                let color = colors[&reg];
                if color >= num_phys {
                    return Err(AsmError::ColorOutOfRange {
                        reg: self.arch.describe(reg),
                        color,
                        num_regs: num_phys,
                    });
                }
                log(
                    LogType::Success,
                    &format!(
                        "{} of class {} assigned color {}",
                        self.arch.describe(reg),
                        class.name(),
                        color
                    ),
                );
            }
        }
        Ok(colors)
    }

    /// The uncolored node with the most uncolored neighbours, or `None` once
    /// the graph is fully colored; ties resolve to the first register in
    /// sorted order.
    fn max_uncolored_degree(
        &self,
        graph: &ConflictGraph,
        colors: &BTreeMap<Register, usize>,
    ) -> Option<Register> {
        let mut best = None;
        let mut best_degree = 0;
        for (&reg, adj) in graph {
            if colors.contains_key(&reg) {
                continue;
            }
            let degree = adj.iter().filter(|n| !colors.contains_key(n)).count();
            if best.is_none() || degree > best_degree {
                best = Some(reg);
                best_degree = degree;
            }
        }
        best
    }

    /// Transitive closure over the link relation, already-colored members
    /// excluded (their assignment stays fixed).
    fn linked_closure(&self, reg: Register, colors: &BTreeMap<Register, usize>) -> Vec<Register> {
        let mut chain = vec![reg];
        let mut i = 0;
        while i < chain.len() {
            for &(linked, _) in self.arch.pool.virt_links(chain[i]) {
                if !chain.contains(&linked) && !colors.contains_key(&linked) {
                    chain.push(linked);
                }
            }
            i += 1;
        }
        chain
    }

    /// Depth-first backtracking over the chain: tentative assignments are
    /// rolled back when the tail cannot be completed.
    fn allocate_chain(
        &self,
        regs: &[Register],
        graph: &ConflictGraph,
        colors: &mut BTreeMap<Register, usize>,
        class: RegClass,
    ) -> bool {
        let Some((&head, tail)) = regs.split_first() else { return true };
        let desc = self.arch.spec.class_desc(class);
        let constraint = self.arch.pool.virt_constraint(head);

        let valid: Vec<usize> = (0..desc.num_phys)
            .filter(|&c| constraint.allows(c) && (desc.allocatable)(c))
            .collect();
        if valid.is_empty() {
            return false;
        }
        let unavailable: BTreeSet<usize> = graph
            .get(&head)
            .map(|adj| adj.iter().filter_map(|n| colors.get(n).copied()).collect())
            .unwrap_or_default();
        let mut available: BTreeSet<usize> =
            valid.into_iter().filter(|c| !unavailable.contains(c)).collect();
        if available.is_empty() {
            return false;
        }
        for &(linked, rule) in self.arch.pool.virt_links(head) {
            if let Some(&linked_color) = colors.get(&linked) {
                let allowed: BTreeSet<usize> = rule.allowed(linked_color).into_iter().collect();
                available = available.intersection(&allowed).copied().collect();
            }
        }
        for &candidate in &available {
            colors.insert(head, candidate);
            if self.allocate_chain(tail, graph, colors, class) {
                return true;
            }
            colors.remove(&head);
        }
        false
    }

    /// Post-allocation validation: no interference edge may join two
    /// registers of the same color.
    pub fn check_color_map(
        &self,
        graph: &ConflictGraph,
        colors: &BTreeMap<Register, usize>,
    ) -> Result<(), AsmError> {
        for (reg, adj) in graph {
            let Some(&color) = colors.get(reg) else { continue };
            for neighbour in adj {
                if colors.get(neighbour) == Some(&color) {
                    return Err(AsmError::ColorConflict {
                        a: self.arch.describe(*reg),
                        b: self.arch.describe(*neighbour),
                        color,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Run the whole allocation pipeline: liveness, boundary checks, live
/// ranges, interference, coloring, validation.
pub fn allocate_program(
    arch: &Architecture,
    program: &Program,
    verbose: bool,
) -> Result<Coloring, AsmError> {
    let live = liveness::compute(program, verbose);
    liveness::check_boundaries(program, &live, arch)?;
    let mut ranges = liveness::build_ranges(program, &live, arch)?;
    liveness::check_ranges(&mut ranges, arch)?;

    let allocator = RegisterAllocator::new(arch);
    let conflicts = allocator.build_conflicts(&ranges);
    let coloring = allocator.color(&conflicts)?;
    for (class, graph) in &conflicts {
        if let Some(colors) = coloring.class_map(*class) {
            allocator.check_color_map(graph, colors)?;
        }
    }
    Ok(coloring)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{IndexConstraint, RegClass};
    use crate::dummy;
    use crate::error::DebugInfo;
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
    fn basic_allocation_respects_interference() {
        let mut arch = dummy::dummy(16, 16);
        let program = parse(&mut arch, BASIC);
        let coloring = allocate_program(&arch, &program, false).unwrap();
        let p = arch.pool.virt(RegClass::Std, "p", IndexConstraint::Any);
        let q = arch.pool.virt(RegClass::Std, "q", IndexConstraint::Any);
        // $r1 stays live across both virtual ranges
        assert_ne!(coloring.color_of(p), Some(1));
        assert_ne!(coloring.color_of(q), Some(1));
        assert!(coloring.color_of(p).is_some());
        assert!(coloring.color_of(q).is_some());
    }

    #[test]
    fn physical_registers_keep_their_own_index() {
        let mut arch = dummy::dummy(16, 16);
        let program = parse(&mut arch, BASIC);
        let coloring = allocate_program(&arch, &program, false).unwrap();
        for index in [0usize, 1, 5, 12] {
            let reg = arch.phys(RegClass::Std, index).unwrap();
            assert_eq!(coloring.color_of(reg), Some(index));
        }
    }

    #[test]
    fn recoloring_an_allocated_program_is_the_identity() {
        let mut arch = dummy::dummy(16, 16);
        let source = "\
//# PREDEFINED($r5, $r1)
add $r2 = $r5, $r1
;;
//# POSTUSED($r2)
";
        let program = parse(&mut arch, source);
        let first = allocate_program(&arch, &program, false).unwrap();
        let second = allocate_program(&arch, &program, false).unwrap();
        for (class, map) in first.iter() {
            for (&reg, &color) in map {
                assert_eq!(reg.phys_index(), Some(color));
                assert_eq!(second.class_map(class).unwrap().get(&reg), Some(&color));
            }
        }
    }

    #[test]
    fn dual_registers_land_on_an_aligned_pair() {
        let mut arch = dummy::dummy(16, 16);
        let source = "\
//# PREDEFINED($r1)
addd D(lo, hi) = $r1, $r1
;;
add $r2 = R(lo), $r1
;;
//# POSTUSED($r6, $r7)
addd $r6r7 = R(hi), R(lo)
;;
";
        let program = parse(&mut arch, source);
        let coloring = allocate_program(&arch, &program, false).unwrap();
        let lo = coloring
            .color_of(arch.pool.virt(RegClass::Std, "lo", IndexConstraint::Any))
            .unwrap();
        let hi = coloring
            .color_of(arch.pool.virt(RegClass::Std, "hi", IndexConstraint::Any))
            .unwrap();
        assert_eq!(lo % 2, 0);
        assert_eq!(hi, lo + 1);
        assert_ne!(lo, 1);
        assert_ne!(hi, 1);
    }

    #[test]
    fn quad_registers_occupy_a_contiguous_aligned_block() {
        let mut arch = dummy::dummy(16, 16);
        let source = "\
//# PREDEFINED($r2)
lo Q(a, b, c, d) = 0[$r2]
;;
//# POSTUSED($r0)
add $r0 = R(a), R(d)
;;
";
        let program = parse(&mut arch, source);
        let coloring = allocate_program(&arch, &program, false).unwrap();
        let colors: Vec<usize> = ["a", "b", "c", "d"]
            .iter()
            .map(|n| {
                coloring
                    .color_of(arch.pool.virt(RegClass::Std, n, IndexConstraint::Any))
                    .unwrap()
            })
            .collect();
        assert_eq!(colors[0] % 4, 0);
        for i in 1..4 {
            assert_eq!(colors[i], colors[0] + i);
        }
    }

    #[test]
    fn exhausted_register_file_is_a_fatal_allocation_failure() {
        let mut arch = dummy::dummy(4, 4);
        let mut source = String::new();
        for (i, name) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
            source.push_str(&format!("make R({}) = {}\n;;\n", name, i));
        }
        source.push_str("add $r0 = R(a), R(b)\n;;\n");
        source.push_str("add $r1 = R(c), R(d)\n;;\n");
        source.push_str("add $r2 = R(e), R(f)\n;;\n");
        source.push_str("//# POSTUSED($r0, $r1, $r2)\n");
        let program = parse(&mut arch, &source);
        let err = allocate_program(&arch, &program, false).unwrap_err();
        assert!(matches!(err, AsmError::NoFeasibleColor { .. }));
    }

    #[test]
    fn color_map_validation_catches_conflicts() {
        let mut arch = dummy::dummy(16, 16);
        let a = arch.pool.virt(RegClass::Std, "a", IndexConstraint::Any);
        let b = arch.pool.virt(RegClass::Std, "b", IndexConstraint::Any);
        let mut graph: ConflictGraph = BTreeMap::new();
        graph.entry(a).or_default().insert(b);
        graph.entry(b).or_default().insert(a);
        let mut colors = BTreeMap::new();
        colors.insert(a, 3);
        colors.insert(b, 3);
        let allocator = RegisterAllocator::new(&arch);
        assert!(matches!(
            allocator.check_color_map(&graph, &colors),
            Err(AsmError::ColorConflict { .. })
        ));
        colors.insert(b, 4);
        allocator.check_color_map(&graph, &colors).unwrap();
    }

    #[test]
    fn allocation_is_deterministic() {
        let run = || {
            let mut arch = dummy::dummy(16, 16);
            let program = parse(&mut arch, BASIC);
            let coloring = allocate_program(&arch, &program, false).unwrap();
            let p = arch.pool.virt(RegClass::Std, "p", IndexConstraint::Any);
            let q = arch.pool.virt(RegClass::Std, "q", IndexConstraint::Any);
            (coloring.color_of(p), coloring.color_of(q))
        };
        assert_eq!(run(), run());
    }
}
