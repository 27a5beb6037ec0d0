//! Architecture description model.
//!
//! An [Architecture] couples an immutable [ArchSpec] (register classes, the
//! mnemonic pattern table, bundling and address syntax) with a mutable
//! [RegPool] holding every register object created while parsing. Registers
//! are plain `Copy` handles; the pool owns the backing data (virtual names,
//! constraints, link rules, alias texts), so all higher structures can hold
//! registers by value without ownership cycles.

use crate::error::AsmError;
use crate::pattern::InsnPattern;

use rustc_hash::FxHashMap;

/// Register class tags. Classes are fixed at architecture construction and
/// compared by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegClass {
    Std,
    Acc,
    Special,
    IntGpr,
    Fpr,
}

impl RegClass {
    pub fn name(self) -> &'static str {
        match self {
            RegClass::Std => "Std",
            RegClass::Acc => "Acc",
            RegClass::Special => "Special",
            RegClass::IntGpr => "Int",
            RegClass::Fpr => "Fp",
        }
    }
}

/// How physical registers of a class are written in source text.
#[derive(Clone, Copy)]
pub enum PhysSyntax {
    /// `$r5`-style runs behind a `$` sigil, compound forms concatenate
    /// (`$r6r7`, `$r0r1r2r3`)
    Dollar { letter: char },

    /// bare named specifiers resolved through an alias table
    /// (`sp`, `a0`, `ft3`)
    Named { resolve: fn(&str, Option<usize>) -> Option<AliasResolution> },

    /// the class has no physical spelling (special register files)
    None,
}

/// Result of resolving a textual register specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasResolution {
    /// true when the spelling differs from the canonical one
    pub is_alias: bool,
    /// canonical physical index
    pub index: usize,
}

/// Per-class register file descriptor.
pub struct RegClassDesc {
    pub class: RegClass,

    /// Number of physical registers in the file
    pub num_phys: usize,

    /// Textual prefix printed before the register specifier (`"$"` or `""`)
    pub prefix: &'static str,

    /// Canonical specifier used when printing physical indices
    pub reg_prefix: &'static str,

    /// Indices the allocator may hand out
    pub allocatable: fn(usize) -> bool,

    /// Indices of constant registers (e.g. a hardwired zero)
    pub const_indices: &'static [usize],

    pub syntax: PhysSyntax,
}

/// Grouped virtual-register descriptor letter (`R`, `D`, `Q`, ...) with the
/// class and arity it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorEntry {
    pub letter: char,
    pub class: RegClass,
    pub arity: RegArity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegArity {
    Single,
    Dual,
    Quad,
}

impl RegArity {
    pub fn count(self) -> usize {
        match self {
            RegArity::Single => 1,
            RegArity::Dual => 2,
            RegArity::Quad => 4,
        }
    }
}

/// A register handle. `Copy + Ord` so that register sets and maps iterate in
/// a stable order; the pool holds the backing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register {
    pub class: RegClass,
    pub kind: RegKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegKind {
    /// canonical physical register
    Phys { index: usize },

    /// secondary textual name for a physical register; `index` is already
    /// canonical, `alias` points at the spelling for rendering
    Alias { index: usize, alias: u32 },

    /// virtual register awaiting a color
    Virt { id: u32 },

    /// symbolic special register, never colored
    Special { id: u32 },
}

impl Register {
    /// Flatten aliases to the canonical physical register they name.
    pub fn base(self) -> Register {
        match self.kind {
            RegKind::Alias { index, .. } => Register {
                class: self.class,
                kind: RegKind::Phys { index },
            },
            _ => self,
        }
    }

    pub fn is_virtual(self) -> bool {
        matches!(self.kind, RegKind::Virt { .. })
    }

    pub fn is_physical(self) -> bool {
        matches!(self.kind, RegKind::Phys { .. } | RegKind::Alias { .. })
    }

    pub fn is_special(self) -> bool {
        matches!(self.kind, RegKind::Special { .. })
    }

    pub fn phys_index(self) -> Option<usize> {
        match self.kind {
            RegKind::Phys { index } | RegKind::Alias { index, .. } => Some(index),
            _ => None,
        }
    }
}

/// Predicate a physical index must satisfy before it can be assigned to a
/// virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexConstraint {
    Any,
    Modulo { modulo: usize, value: usize },
}

impl IndexConstraint {
    pub fn even() -> Self {
        IndexConstraint::Modulo { modulo: 2, value: 0 }
    }

    pub fn odd() -> Self {
        IndexConstraint::Modulo { modulo: 2, value: 1 }
    }

    pub fn allows(self, index: usize) -> bool {
        match self {
            IndexConstraint::Any => true,
            IndexConstraint::Modulo { modulo, value } => index % modulo == value,
        }
    }
}

/// Cross-register placement rule. The permissible indices for the owning
/// register are derived from the color already chosen for the linked one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRule {
    /// owner must land exactly `delta` away from the linked register
    Offset { delta: i64 },
}

impl LinkRule {
    /// Enumerate the indices the owner may take given the linked register's
    /// color.
    pub fn allowed(self, linked_color: usize) -> Vec<usize> {
        match self {
            LinkRule::Offset { delta } => {
                let idx = linked_color as i64 + delta;
                if idx >= 0 {
                    vec![idx as usize]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

struct VirtData {
    name: String,
    constraint: IndexConstraint,
    linked: Vec<(Register, LinkRule)>,
}

/// Interning pools for every register object mentioned while parsing. One
/// canonical id per (class, name); the pools only ever grow.
#[derive(Default)]
pub struct RegPool {
    virt_ids: FxHashMap<(RegClass, String), u32>,
    virt_data: Vec<VirtData>,
    special_ids: FxHashMap<String, u32>,
    special_tags: Vec<String>,
    alias_ids: FxHashMap<String, u32>,
    alias_texts: Vec<String>,
}

impl RegPool {
    /// Return the canonical virtual register for `name` in `class`, creating
    /// it on first mention. A later mention keeps the original constraint.
    pub fn virt(&mut self, class: RegClass, name: &str, constraint: IndexConstraint) -> Register {
        let key = (class, name.to_string());
        let id = match self.virt_ids.get(&key) {
            Some(&id) => id,
            None => {
                let id = self.virt_data.len() as u32;
                self.virt_data.push(VirtData {
                    name: name.to_string(),
                    constraint,
                    linked: Vec::new(),
                });
                self.virt_ids.insert(key, id);
                id
            }
        };
        Register { class, kind: RegKind::Virt { id } }
    }

    /// Install a placement link on `reg`. Re-linking the same neighbour is a
    /// no-op so that repeated mentions of a dual/quad group stay idempotent.
    pub fn add_link(&mut self, reg: Register, linked: Register, rule: LinkRule) {
        if let RegKind::Virt { id } = reg.kind {
            let data = &mut self.virt_data[id as usize];
            if !data.linked.iter().any(|(l, _)| *l == linked) {
                data.linked.push((linked, rule));
            }
        }
    }

    pub fn virt_name(&self, reg: Register) -> &str {
        match reg.kind {
            RegKind::Virt { id } => &self.virt_data[id as usize].name,
            _ => "",
        }
    }

    pub fn virt_constraint(&self, reg: Register) -> IndexConstraint {
        match reg.kind {
            RegKind::Virt { id } => self.virt_data[id as usize].constraint,
            _ => IndexConstraint::Any,
        }
    }

    pub fn virt_links(&self, reg: Register) -> &[(Register, LinkRule)] {
        match reg.kind {
            RegKind::Virt { id } => &self.virt_data[id as usize].linked,
            _ => &[],
        }
    }

    /// Special registers live in an unbounded symbolic table; there is no
    /// physical index behind them.
    pub fn special(&mut self, tag: &str) -> Register {
        let id = match self.special_ids.get(tag) {
            Some(&id) => id,
            None => {
                let id = self.special_tags.len() as u32;
                self.special_tags.push(tag.to_string());
                self.special_ids.insert(tag.to_string(), id);
                id
            }
        };
        Register { class: RegClass::Special, kind: RegKind::Special { id } }
    }

    pub fn special_tag(&self, id: u32) -> &str {
        &self.special_tags[id as usize]
    }

    /// Intern a textual alias (`sp`, `a0`) for a canonical physical index.
    pub fn alias(&mut self, class: RegClass, text: &str, index: usize) -> Register {
        let id = match self.alias_ids.get(text) {
            Some(&id) => id,
            None => {
                let id = self.alias_texts.len() as u32;
                self.alias_texts.push(text.to_string());
                self.alias_ids.insert(text.to_string(), id);
                id
            }
        };
        Register { class, kind: RegKind::Alias { index, alias: id } }
    }

    pub fn alias_text(&self, id: u32) -> &str {
        &self.alias_texts[id as usize]
    }
}

/// Immutable architecture description: the register files, the pattern
/// table, and the ISA's surface syntax knobs.
pub struct ArchSpec {
    pub name: &'static str,
    pub classes: Vec<RegClassDesc>,
    pub descriptors: Vec<DescriptorEntry>,
    pub patterns: FxHashMap<String, InsnPattern>,
    pub has_bundles: bool,
    pub addr_open: char,
    pub addr_close: char,
}

impl ArchSpec {
    pub fn class_desc(&self, class: RegClass) -> &RegClassDesc {
        self.classes
            .iter()
            .find(|d| d.class == class)
            .expect("register class not part of this architecture")
    }

    pub fn num_phys(&self, class: RegClass) -> usize {
        self.class_desc(class).num_phys
    }

    pub fn is_const(&self, reg: Register) -> bool {
        match reg.base().kind {
            RegKind::Phys { index } => {
                self.class_desc(reg.class).const_indices.contains(&index)
            }
            _ => false,
        }
    }

    pub fn descriptor(&self, letter: char) -> Option<DescriptorEntry> {
        self.descriptors.iter().copied().find(|d| d.letter == letter)
    }

    /// All statistics keys this architecture can produce: one per mnemonic,
    /// plus one per named disjunctive alternative.
    pub fn all_opcodes(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (mnemonic, pattern) in &self.patterns {
            match pattern {
                InsnPattern::Seq(_) => out.push(mnemonic.clone()),
                InsnPattern::Alt { tags, .. } => {
                    for tag in tags {
                        if tag.is_empty() {
                            out.push(mnemonic.clone());
                        } else {
                            out.push(format!("{}-{}", mnemonic, tag));
                        }
                    }
                }
            }
        }
        out.sort();
        out.dedup();
        out
    }
}

/// A complete architecture: immutable description plus the register pools
/// that grow while parsing.
pub struct Architecture {
    pub spec: ArchSpec,
    pub pool: RegPool,
}

impl Architecture {
    pub fn new(spec: ArchSpec) -> Self {
        Architecture { spec, pool: RegPool::default() }
    }

    /// Canonical physical register for `(class, index)`, bounds-checked
    /// against the register file.
    pub fn phys(&self, class: RegClass, index: usize) -> Result<Register, AsmError> {
        let desc = self.spec.class_desc(class);
        if index >= desc.num_phys {
            return Err(AsmError::PhysIndexOutOfRange {
                class: class.name(),
                index,
                num_regs: desc.num_phys,
            });
        }
        Ok(Register { class, kind: RegKind::Phys { index } })
    }

    /// Human-readable register name for diagnostics and dumps.
    pub fn describe(&self, reg: Register) -> String {
        // special registers exist even on architectures without a special
        // register file entry
        if let RegKind::Special { id } = reg.kind {
            return format!("${}", self.pool.special_tag(id));
        }
        let desc = self.spec.class_desc(reg.class);
        match reg.kind {
            RegKind::Phys { index } => {
                format!("{}{}{}", desc.prefix, desc.reg_prefix, index)
            }
            RegKind::Alias { alias, .. } => {
                format!("{}{}", desc.prefix, self.pool.alias_text(alias))
            }
            RegKind::Virt { .. } => format!(
                "{}{}<{}>",
                desc.prefix,
                desc.reg_prefix,
                self.pool.virt_name(reg)
            ),
            RegKind::Special { .. } => unreachable!("handled above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> RegPool {
        RegPool::default()
    }

    #[test]
    fn virtual_registers_are_interned_once() {
        let mut p = pool();
        let a = p.virt(RegClass::Std, "x", IndexConstraint::Any);
        let b = p.virt(RegClass::Std, "x", IndexConstraint::even());
        assert_eq!(a, b);
        // first-mention constraint wins
        assert_eq!(p.virt_constraint(a), IndexConstraint::Any);
        let c = p.virt(RegClass::Acc, "x", IndexConstraint::Any);
        assert_ne!(a, c);
    }

    #[test]
    fn aliases_flatten_to_their_base() {
        let mut p = pool();
        let sp = p.alias(RegClass::IntGpr, "sp", 2);
        let base = sp.base();
        assert!(matches!(base.kind, RegKind::Phys { index: 2 }));
        assert_eq!(base.class, RegClass::IntGpr);
    }

    #[test]
    fn link_rules_enumerate_neighbour_offsets() {
        assert_eq!(LinkRule::Offset { delta: 1 }.allowed(4), vec![5]);
        assert_eq!(LinkRule::Offset { delta: -1 }.allowed(0), Vec::<usize>::new());
    }

    #[test]
    fn links_are_installed_once_per_neighbour() {
        let mut p = pool();
        let lo = p.virt(RegClass::Std, "lo", IndexConstraint::even());
        let hi = p.virt(RegClass::Std, "hi", IndexConstraint::odd());
        p.add_link(lo, hi, LinkRule::Offset { delta: -1 });
        p.add_link(lo, hi, LinkRule::Offset { delta: -1 });
        assert_eq!(p.virt_links(lo).len(), 1);
    }

    #[test]
    fn modulo_constraints() {
        assert!(IndexConstraint::even().allows(4));
        assert!(!IndexConstraint::even().allows(5));
        let quad = IndexConstraint::Modulo { modulo: 4, value: 3 };
        assert!(quad.allows(7));
        assert!(!quad.allows(8));
    }
}
