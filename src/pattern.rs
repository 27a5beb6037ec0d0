//! The table-driven pattern engine.
//!
//! Instruction patterns are plain data: a [SeqPattern] lists the operand
//! elements to match in order, and a [BuildSpec] says how the matched values
//! become an [Instruction] (which tags feed the use/def lists, the control
//! flow kind, and the render template). A small interpreter walks the token
//! list; there are no closures to capture match state.
//!
//! A successful parse consumes a non-empty prefix of the tokens (except
//! [PatternElem::Optional]); a failed parse consumes nothing observable.

use crate::arch::{
    ArchSpec, IndexConstraint, LinkRule, PhysSyntax, RegArity, RegClass, RegPool, Register,
};
use crate::error::DebugInfo;
use crate::ir::{Instruction, MatchInfo, Operand, RenderOp};
use crate::lexer::Token;

/// Leaf and structural pattern elements.
#[derive(Debug, Clone)]
pub enum PatternElem {
    /// consumes one identifier; when `greedy_predicates` is set, trailing
    /// `"." <ident>` pairs are folded into the mnemonic (`fcmp.ne`)
    Opcode { greedy_predicates: bool },

    /// a register operand: virtual descriptor form first, physical second
    Reg { class: RegClass, arity: RegArity, descriptors: &'static str },

    /// `$tag` special-register mention
    SpecialReg,

    /// one numeric token, plus the optional parenthesized hex alias that
    /// objdump prints after it
    Imm,

    /// an identifier or bracketed `<name>` form
    Label,

    /// `<offset> "[" <base> "]"` (bracket characters taken from the ISA)
    Addr { class: RegClass, descriptors: &'static str },

    /// an identifier drawn from a restricted character set (`fence` flags)
    Word { charset: &'static str },

    /// wraps a child; never fails
    Optional(Box<PatternElem>),
}

/// A value produced by one matched element.
#[derive(Debug, Clone)]
pub enum MatchValue {
    Opcode(String),
    Regs(Vec<Register>),
    Imm { value: Option<i64>, text: String },
    Label(String),
    Addr { base: Vec<Operand>, offset: Vec<Operand> },
    Word(String),
}

/// Control-flow classification of a matched instruction.
#[derive(Debug, Clone, Copy)]
pub enum Flow {
    Fall,
    Jump { label: &'static str },
    CondJump { label: &'static str },
}

/// One step of a render template, resolved to [RenderOp]s at build time.
#[derive(Debug, Clone)]
pub enum RenderPiece {
    Mnemonic,
    Lit(&'static str),
    Tag(&'static str),
    AddrBase(&'static str),
    AddrOffset(&'static str),
    /// rendered only when every tag inside actually matched
    Opt(Vec<RenderPiece>),
}

/// How a sequential match becomes an instruction.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    pub uses: &'static [&'static str],
    pub defs: &'static [&'static str],
    pub flow: Flow,
    /// tag whose immediate literal is recorded as the match pattern
    pub match_imm: Option<&'static str>,
    pub render: Vec<RenderPiece>,
}

#[derive(Debug, Clone)]
pub struct SeqPattern {
    pub elems: Vec<(&'static str, PatternElem)>,
    pub build: BuildSpec,
}

/// Entry of the mnemonic table: a single sequential pattern or an ordered
/// disjunction whose `tags` distinguish the alternatives in statistics.
#[derive(Debug, Clone)]
pub enum InsnPattern {
    Seq(SeqPattern),
    Alt { alts: Vec<SeqPattern>, tags: Vec<&'static str> },
}

impl InsnPattern {
    /// Match the whole token list. Returns the built instruction or `None`
    /// when no alternative accepts the operands.
    pub fn match_insn(
        &self,
        spec: &ArchSpec,
        pool: &mut RegPool,
        tokens: &[Token],
        dbg: &DebugInfo,
    ) -> Option<Instruction> {
        match self {
            InsnPattern::Seq(p) => p.match_insn(spec, pool, tokens, dbg),
            InsnPattern::Alt { alts, tags } => {
                for (i, alt) in alts.iter().enumerate() {
                    if let Some(mut insn) = alt.match_insn(spec, pool, tokens, dbg) {
                        let imm = insn.match_info.as_ref().and_then(|m| m.imm);
                        match tags.get(i) {
                            Some(&tag) if !tag.is_empty() => {
                                insn.match_info = Some(MatchInfo { tag, imm });
                            }
                            Some(_) => insn.match_info = None,
                            None => {}
                        }
                        return Some(insn);
                    }
                }
                None
            }
        }
    }
}

impl SeqPattern {
    fn match_insn(
        &self,
        spec: &ArchSpec,
        pool: &mut RegPool,
        tokens: &[Token],
        dbg: &DebugInfo,
    ) -> Option<Instruction> {
        let mut vals: Vec<(&'static str, MatchValue)> = Vec::new();
        let mut rest = tokens;
        for &(tag, ref elem) in &self.elems {
            let (value, remaining) = elem.parse(spec, pool, rest)?;
            if let Some(value) = value {
                vals.push((tag, value));
            }
            rest = remaining;
        }
        Some(build_instruction(&self.build, &vals, dbg))
    }
}

type ElemResult<'t> = Option<(Option<MatchValue>, &'t [Token])>;

impl PatternElem {
    fn parse<'t>(&self, spec: &ArchSpec, pool: &mut RegPool, toks: &'t [Token]) -> ElemResult<'t> {
        match self {
            PatternElem::Opcode { greedy_predicates } => {
                let Token::Ident(head) = toks.first()? else { return None };
                let mut mnemonic = head.clone();
                let mut rest = &toks[1..];
                if *greedy_predicates {
                    while let (Some(Token::Op('.')), Some(Token::Ident(p))) =
                        (rest.first(), rest.get(1))
                    {
                        mnemonic.push('.');
                        mnemonic.push_str(p);
                        rest = &rest[2..];
                    }
                }
                Some((Some(MatchValue::Opcode(mnemonic)), rest))
            }
            PatternElem::Reg { class, arity, descriptors } => {
                let (regs, rest) = parse_register(spec, pool, *class, *arity, descriptors, toks)?;
                Some((Some(MatchValue::Regs(regs)), rest))
            }
            PatternElem::SpecialReg => {
                let Token::SpecialReg(text) = toks.first()? else { return None };
                let reg = pool.special(text.trim_start_matches('$'));
                Some((Some(MatchValue::Regs(vec![reg])), &toks[1..]))
            }
            PatternElem::Imm => parse_immediate(toks),
            PatternElem::Label => match toks.first()? {
                Token::Ident(name) => {
                    Some((Some(MatchValue::Label(name.clone())), &toks[1..]))
                }
                Token::ObjdumpLabel(name) => {
                    Some((Some(MatchValue::Label(name.clone())), &toks[1..]))
                }
                _ => None,
            },
            PatternElem::Addr { class, descriptors } => {
                parse_address(spec, pool, *class, descriptors, toks)
            }
            PatternElem::Word { charset } => {
                let Token::Ident(word) = toks.first()? else { return None };
                if word.chars().all(|c| charset.contains(c)) {
                    Some((Some(MatchValue::Word(word.clone())), &toks[1..]))
                } else {
                    None
                }
            }
            PatternElem::Optional(inner) => match inner.parse(spec, pool, toks) {
                Some(res) => Some(res),
                None => Some((None, toks)),
            },
        }
    }
}

fn parse_immediate(toks: &[Token]) -> ElemResult {
    match toks.first()? {
        Token::Imm(v) => {
            // objdump sometimes appends the hex spelling of the same value
            let rest = match toks.get(1) {
                Some(Token::HexImm(_)) => &toks[2..],
                _ => &toks[1..],
            };
            Some((Some(MatchValue::Imm { value: Some(*v), text: v.to_string() }), rest))
        }
        Token::HexImm(v) => Some((
            Some(MatchValue::Imm { value: Some(*v), text: v.to_string() }),
            &toks[1..],
        )),
        Token::LinkerSym(text) => Some((
            Some(MatchValue::Imm { value: None, text: text.clone() }),
            &toks[1..],
        )),
        _ => None,
    }
}

/// Register operand: virtual descriptor form first, physical second.
fn parse_register<'t>(
    spec: &ArchSpec,
    pool: &mut RegPool,
    class: RegClass,
    arity: RegArity,
    descriptors: &str,
    toks: &'t [Token],
) -> Option<(Vec<Register>, &'t [Token])> {
    if let Some(hit) = parse_virtual(pool, class, arity, descriptors, toks) {
        return Some(hit);
    }
    parse_physical(spec, pool, class, arity, toks)
}

/// `<DESCR>(<name>[, <name>...])` virtual register mention. Dual and quad
/// forms install their placement constraints and link rules on first parse.
fn parse_virtual<'t>(
    pool: &mut RegPool,
    class: RegClass,
    arity: RegArity,
    descriptors: &str,
    toks: &'t [Token],
) -> Option<(Vec<Register>, &'t [Token])> {
    let Token::Ident(d) = toks.first()? else { return None };
    if d.len() != 1 || !descriptors.contains(d.as_str()) {
        return None;
    }
    let mut rest = expect_op(&toks[1..], '(')?;
    let mut names = Vec::new();
    while let Some(Token::Ident(name)) = rest.first() {
        names.push(name.clone());
        rest = &rest[1..];
    }
    let rest = expect_op(rest, ')')?;
    if names.len() != arity.count() {
        return None;
    }

    let regs = match arity {
        RegArity::Single => vec![pool.virt(class, &names[0], IndexConstraint::Any)],
        RegArity::Dual => {
            let lo = pool.virt(class, &names[0], IndexConstraint::even());
            let hi = pool.virt(class, &names[1], IndexConstraint::odd());
            pool.add_link(lo, hi, LinkRule::Offset { delta: -1 });
            pool.add_link(hi, lo, LinkRule::Offset { delta: 1 });
            vec![lo, hi]
        }
        RegArity::Quad => {
            let regs: Vec<Register> = names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    pool.virt(class, name, IndexConstraint::Modulo { modulo: 4, value: i })
                })
                .collect();
            for i in 0..regs.len() {
                for j in 0..regs.len() {
                    if i != j {
                        pool.add_link(
                            regs[i],
                            regs[j],
                            LinkRule::Offset { delta: i as i64 - j as i64 },
                        );
                    }
                }
            }
            regs
        }
    };
    Some((regs, rest))
}

fn parse_physical<'t>(
    spec: &ArchSpec,
    pool: &mut RegPool,
    class: RegClass,
    arity: RegArity,
    toks: &'t [Token],
) -> Option<(Vec<Register>, &'t [Token])> {
    let desc = spec.class_desc(class);
    match desc.syntax {
        PhysSyntax::Dollar { letter } => {
            let Token::Reg(text) = toks.first()? else { return None };
            let indices = split_dollar_run(text, letter)?;
            if indices.len() != arity.count() {
                return None;
            }
            if indices.iter().any(|&i| i >= desc.num_phys) {
                return None;
            }
            let regs = indices
                .into_iter()
                .map(|index| Register { class, kind: crate::arch::RegKind::Phys { index } })
                .collect();
            Some((regs, &toks[1..]))
        }
        PhysSyntax::Named { resolve } => {
            if arity.count() != 1 {
                return None;
            }
            let Token::Ident(text) = toks.first()? else { return None };
            let (prefix, index) = split_spec_index(text);
            let res = resolve(prefix, index)?;
            if res.index >= desc.num_phys {
                return None;
            }
            let reg = if res.is_alias {
                pool.alias(class, text, res.index)
            } else {
                Register { class, kind: crate::arch::RegKind::Phys { index: res.index } }
            };
            Some((vec![reg], &toks[1..]))
        }
        PhysSyntax::None => None,
    }
}

/// `$r6r7` -> `[6, 7]`, verifying every run uses the class letter.
fn split_dollar_run(text: &str, letter: char) -> Option<Vec<usize>> {
    let mut rest = text.strip_prefix('$')?;
    let mut indices = Vec::new();
    while !rest.is_empty() {
        rest = rest.strip_prefix(letter)?;
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        indices.push(digits.parse().ok()?);
        rest = &rest[digits.len()..];
    }
    if indices.is_empty() {
        None
    } else {
        Some(indices)
    }
}

/// `"a0"` -> `("a", Some(0))`, `"sp"` -> `("sp", None)`.
fn split_spec_index(text: &str) -> (&str, Option<usize>) {
    match text.find(|c: char| c.is_ascii_digit()) {
        Some(pos) => {
            let (prefix, digits) = text.split_at(pos);
            (prefix, digits.parse().ok())
        }
        None => (text, None),
    }
}

fn parse_address<'t>(
    spec: &ArchSpec,
    pool: &mut RegPool,
    class: RegClass,
    descriptors: &str,
    toks: &'t [Token],
) -> ElemResult<'t> {
    let (offset, rest) = match toks.first()? {
        Token::Imm(v) | Token::HexImm(v) => (vec![Operand::Imm(*v)], &toks[1..]),
        _ => {
            let (regs, rest) =
                parse_register(spec, pool, class, RegArity::Single, descriptors, toks)?;
            (regs.into_iter().map(Operand::Reg).collect(), rest)
        }
    };
    let rest = expect_op(rest, spec.addr_open)?;
    let (base, rest) = parse_register(spec, pool, class, RegArity::Single, descriptors, rest)?;
    let rest = expect_op(rest, spec.addr_close)?;
    let base = base.into_iter().map(Operand::Reg).collect();
    Some((Some(MatchValue::Addr { base, offset }), rest))
}

fn expect_op<'t>(toks: &'t [Token], op: char) -> Option<&'t [Token]> {
    match toks.first() {
        Some(Token::Op(c)) if *c == op => Some(&toks[1..]),
        _ => None,
    }
}

/// Register-list element used by the liveness macros: physical run, special
/// register, named physical, or any virtual descriptor the ISA knows.
pub fn parse_any_register<'t>(
    spec: &ArchSpec,
    pool: &mut RegPool,
    toks: &'t [Token],
) -> Option<(Vec<Register>, &'t [Token])> {
    match toks.first()? {
        Token::Reg(text) => {
            for desc in &spec.classes {
                if let PhysSyntax::Dollar { letter } = desc.syntax {
                    if let Some(indices) = split_dollar_run(text, letter) {
                        if indices.iter().all(|&i| i < desc.num_phys) {
                            let regs = indices
                                .into_iter()
                                .map(|index| Register {
                                    class: desc.class,
                                    kind: crate::arch::RegKind::Phys { index },
                                })
                                .collect();
                            return Some((regs, &toks[1..]));
                        }
                    }
                }
            }
            None
        }
        Token::SpecialReg(text) => {
            let reg = pool.special(text.trim_start_matches('$'));
            Some((vec![reg], &toks[1..]))
        }
        Token::Ident(name) => {
            if name.len() == 1 {
                let first = name.chars().next()?;
                if let Some(entry) = spec.descriptor(first) {
                    return parse_virtual(pool, entry.class, entry.arity, &first.to_string(), toks);
                }
            }
            for desc in &spec.classes {
                if matches!(desc.syntax, PhysSyntax::Named { .. }) {
                    if let Some(hit) =
                        parse_physical(spec, pool, desc.class, RegArity::Single, toks)
                    {
                        return Some(hit);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum ListKind {
    Use,
    Def,
}

#[derive(Clone, Copy)]
struct Span {
    kind: ListKind,
    start: usize,
    count: usize,
    base_len: usize,
}

fn build_instruction(
    build: &BuildSpec,
    vals: &[(&'static str, MatchValue)],
    dbg: &DebugInfo,
) -> Instruction {
    let find = |tag: &str| vals.iter().find(|(t, _)| *t == tag).map(|(_, v)| v);

    let mnemonic = vals
        .iter()
        .find_map(|(_, v)| match v {
            MatchValue::Opcode(m) => Some(m.clone()),
            _ => None,
        })
        .unwrap_or_default();

    let mut uses = Vec::new();
    let mut defs = Vec::new();
    let mut spans: Vec<(&'static str, Span)> = Vec::new();

    let collect = |tags: &[&'static str],
                       list: &mut Vec<Operand>,
                       kind: ListKind,
                       spans: &mut Vec<(&'static str, Span)>| {
        for &tag in tags {
            let Some(val) = find(tag) else { continue };
            let start = list.len();
            let mut base_len = 0;
            match val {
                MatchValue::Regs(regs) => {
                    list.extend(regs.iter().map(|&r| Operand::Reg(r)));
                }
                MatchValue::Addr { base, offset } => {
                    list.extend(base.iter().copied());
                    list.extend(offset.iter().copied());
                    base_len = base.len();
                }
                MatchValue::Imm { value: Some(v), .. } => list.push(Operand::Imm(*v)),
                _ => {}
            }
            spans.push((tag, Span { kind, start, count: list.len() - start, base_len }));
        }
    };
    collect(build.uses, &mut uses, ListKind::Use, &mut spans);
    collect(build.defs, &mut defs, ListKind::Def, &mut spans);

    let (is_jump, is_cond_jump, jump_label) = match build.flow {
        Flow::Fall => (false, false, None),
        Flow::Jump { label } => (true, false, label_value(&find, label)),
        Flow::CondJump { label } => (false, true, label_value(&find, label)),
    };

    let match_info = build.match_imm.and_then(|tag| match find(tag) {
        Some(MatchValue::Imm { value, .. }) => Some(MatchInfo { tag: "imm", imm: *value }),
        _ => None,
    });

    let render = resolve_render(&build.render, vals, &spans);

    Instruction {
        mnemonic,
        uses,
        defs,
        is_jump,
        is_cond_jump,
        jump_label,
        dbg: dbg.clone(),
        match_info,
        render,
    }
}

fn label_value<'a>(
    find: &impl Fn(&str) -> Option<&'a MatchValue>,
    tag: &str,
) -> Option<String> {
    match find(tag) {
        Some(MatchValue::Label(l)) => Some(l.clone()),
        _ => None,
    }
}

fn resolve_render(
    pieces: &[RenderPiece],
    vals: &[(&'static str, MatchValue)],
    spans: &[(&'static str, Span)],
) -> Vec<RenderOp> {
    let mut out = Vec::new();
    resolve_render_into(pieces, vals, spans, &mut out);
    out
}

fn resolve_render_into(
    pieces: &[RenderPiece],
    vals: &[(&'static str, MatchValue)],
    spans: &[(&'static str, Span)],
    out: &mut Vec<RenderOp>,
) {
    // destinations first so read-write operands print as the def slot
    let span_for = |tag: &str| {
        spans
            .iter()
            .find(|(t, s)| *t == tag && matches!(s.kind, ListKind::Def) && s.count > 0)
            .or_else(|| spans.iter().find(|(t, s)| *t == tag && s.count > 0))
            .map(|(_, s)| *s)
    };
    let value_for = |tag: &str| vals.iter().find(|(t, _)| *t == tag).map(|(_, v)| v);

    for piece in pieces {
        match piece {
            RenderPiece::Mnemonic => out.push(RenderOp::Mnemonic),
            RenderPiece::Lit(s) => out.push(RenderOp::Lit(s)),
            RenderPiece::Tag(tag) => match span_for(tag) {
                Some(span) => out.push(span_op(span, span.start, span.count)),
                None => match value_for(tag) {
                    Some(MatchValue::Imm { text, .. }) => {
                        out.push(RenderOp::Text(text.clone()))
                    }
                    Some(MatchValue::Label(l)) => out.push(RenderOp::Text(l.clone())),
                    Some(MatchValue::Word(w)) => out.push(RenderOp::Text(w.clone())),
                    _ => {}
                },
            },
            RenderPiece::AddrBase(tag) => {
                if let Some(span) = span_for(tag) {
                    out.push(span_op(span, span.start, span.base_len));
                }
            }
            RenderPiece::AddrOffset(tag) => {
                if let Some(span) = span_for(tag) {
                    out.push(span_op(
                        span,
                        span.start + span.base_len,
                        span.count - span.base_len,
                    ));
                }
            }
            RenderPiece::Opt(inner) => {
                let present = inner.iter().all(|p| match p {
                    RenderPiece::Tag(t) | RenderPiece::AddrBase(t) | RenderPiece::AddrOffset(t) => {
                        value_for(t).is_some()
                    }
                    _ => true,
                });
                if present {
                    resolve_render_into(inner, vals, spans, out);
                }
            }
        }
    }
}

fn span_op(span: Span, index: usize, count: usize) -> RenderOp {
    match span.kind {
        ListKind::Use => RenderOp::Use { index, count },
        ListKind::Def => RenderOp::Def { index, count },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::RegKind;
    use crate::dummy;
    use crate::lexer::Lexer;

    fn match_line(arch: &mut crate::arch::Architecture, line: &str) -> Option<Instruction> {
        let toks = Lexer::new().lex_line(line);
        let Token::Ident(m) = &toks[0] else { panic!("no mnemonic") };
        let pattern = arch.spec.patterns.get(m).expect("mnemonic not in table");
        pattern.match_insn(&arch.spec, &mut arch.pool, &toks, &DebugInfo::line(1))
    }

    #[test]
    fn std_two_op_collects_uses_and_defs() {
        let mut arch = dummy::dummy(16, 16);
        let insn = match_line(&mut arch, "add R(p) = $r5, $r5").unwrap();
        assert_eq!(insn.defs.len(), 1);
        assert_eq!(insn.uses.len(), 2);
        assert!(insn.defs[0].reg().unwrap().is_virtual());
        assert_eq!(insn.uses[0].reg().unwrap().phys_index(), Some(5));
    }

    #[test]
    fn dual_descriptor_installs_parity_and_links() {
        let mut arch = dummy::dummy(16, 16);
        let insn = match_line(&mut arch, "addd D(lo, hi) = $r1, $r1").unwrap();
        let lo = insn.defs[0].reg().unwrap();
        let hi = insn.defs[1].reg().unwrap();
        assert_eq!(arch.pool.virt_constraint(lo), IndexConstraint::even());
        assert_eq!(arch.pool.virt_constraint(hi), IndexConstraint::odd());
        assert_eq!(arch.pool.virt_links(lo), &[(hi, LinkRule::Offset { delta: -1 })]);
        assert_eq!(arch.pool.virt_links(hi), &[(lo, LinkRule::Offset { delta: 1 })]);
    }

    #[test]
    fn quad_descriptor_links_all_members() {
        let mut arch = dummy::dummy(16, 16);
        let insn = match_line(&mut arch, "lo Q(a, b, c, d) = 0[$r2]").unwrap();
        assert_eq!(insn.defs.len(), 4);
        for (i, op) in insn.defs.iter().enumerate() {
            let reg = op.reg().unwrap();
            assert_eq!(
                arch.pool.virt_constraint(reg),
                IndexConstraint::Modulo { modulo: 4, value: i }
            );
            assert_eq!(arch.pool.virt_links(reg).len(), 3);
        }
    }

    #[test]
    fn disjunctive_picks_the_immediate_variant() {
        let mut arch = dummy::dummy(16, 16);
        let insn = match_line(&mut arch, "addd R(y) = R(x), 17").unwrap();
        let info = insn.match_info.expect("match tag");
        assert_eq!(info.tag, "imm");
        assert_eq!(info.imm, Some(17));
        // dual form keeps the bare mnemonic key
        let insn = match_line(&mut arch, "addd D(l, h) = $r2, $r3").unwrap();
        assert!(insn.match_info.is_none());
    }

    #[test]
    fn address_operand_orders_base_before_offset() {
        let mut arch = dummy::dummy(16, 16);
        let insn = match_line(&mut arch, "ld R(p) = R(p)[$r12]").unwrap();
        assert_eq!(insn.uses[0].reg().unwrap().phys_index(), Some(12));
        assert!(insn.uses[1].reg().unwrap().is_virtual());
    }

    #[test]
    fn compound_physical_run_must_match_arity() {
        let mut arch = dummy::dummy(16, 16);
        let insn = match_line(&mut arch, "addd $r6r7 = $r2, $r3").unwrap();
        assert_eq!(insn.defs[0].reg().unwrap().phys_index(), Some(6));
        assert_eq!(insn.defs[1].reg().unwrap().phys_index(), Some(7));
        // a single register cannot satisfy the dual destination, and the
        // immediate variant rejects a register in the last slot
        assert!(match_line(&mut arch, "addd $r6 = $r2, $r3").is_none());
    }

    #[test]
    fn jump_pattern_records_the_label() {
        let mut arch = dummy::dummy(16, 16);
        let insn = match_line(&mut arch, "goto head").unwrap();
        assert!(insn.is_jump);
        assert_eq!(insn.jump_label.as_deref(), Some("head"));
    }

    #[test]
    fn out_of_range_physical_index_fails_the_match() {
        let mut arch = dummy::dummy(4, 4);
        assert!(match_line(&mut arch, "add $r1 = $r2, $r9").is_none());
    }

    #[test]
    fn macro_register_lists_accept_runs_and_descriptors() {
        let arch = &mut dummy::dummy(16, 16);
        let toks = Lexer::new().lex_line("$r6r7 R(p)");
        let (regs, rest) = parse_any_register(&arch.spec, &mut arch.pool, &toks).unwrap();
        assert_eq!(regs.len(), 2);
        assert!(matches!(regs[0].kind, RegKind::Phys { index: 6 }));
        let (regs, rest) = parse_any_register(&arch.spec, &mut arch.pool, rest).unwrap();
        assert_eq!(regs.len(), 1);
        assert!(regs[0].is_virtual());
        assert!(rest.is_empty());
    }
}
