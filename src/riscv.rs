//! RISC-V architecture description (RV32 and RV64).
//!
//! Non-bundling, two register files: the integer file prints as `xN` and
//! accepts the ABI spellings (`zero ra sp gp tp t0-t6 fp s0-s11 a0-a7`),
//! the floating-point file prints as `fN` and accepts `ft/fs/fa` forms.
//! Memory operands are written `offset(base)`. `x0` is the hardwired zero.

use crate::arch::{
    AliasResolution, ArchSpec, Architecture, DescriptorEntry, PhysSyntax, RegArity, RegClass,
    RegClassDesc,
};
use crate::pattern::{
    BuildSpec, Flow, InsnPattern, PatternElem, RenderPiece, SeqPattern,
};

use rustc_hash::FxHashMap;

/// Default allocatable set for the integer file: temporaries and argument
/// registers, everything callee-saved or reserved stays off-limits.
fn int_allocatable(index: usize) -> bool {
    matches!(index, 6 | 7 | 10..=17 | 28..=31)
}

fn fp_allocatable(index: usize) -> bool {
    matches!(index, 0..=7 | 10..=17 | 28..=31)
}

fn int_alias(spec: &str, index: Option<usize>) -> Option<AliasResolution> {
    let (is_alias, index) = match (spec, index) {
        ("x", Some(i)) => (false, i),
        ("zero", None) => (true, 0),
        ("ra", None) => (true, 1),
        ("sp", None) => (true, 2),
        ("gp", None) => (true, 3),
        ("tp", None) => (true, 4),
        ("fp", None) => (true, 8),
        ("t", Some(i)) if i <= 2 => (true, i + 5),
        ("t", Some(i)) if i <= 6 => (true, i + 25),
        ("s", Some(0)) => (true, 8),
        ("s", Some(1)) => (true, 9),
        ("s", Some(i)) if i <= 11 => (true, i + 16),
        ("a", Some(i)) if i <= 7 => (true, i + 10),
        _ => return None,
    };
    Some(AliasResolution { is_alias, index })
}

fn fp_alias(spec: &str, index: Option<usize>) -> Option<AliasResolution> {
    let (is_alias, index) = match (spec, index) {
        ("f", Some(i)) => (false, i),
        ("ft", Some(i)) if i <= 7 => (true, i),
        ("ft", Some(i)) if i <= 11 => (true, i + 20),
        ("fs", Some(i)) if i <= 1 => (true, i + 8),
        ("fs", Some(i)) if i <= 11 => (true, i + 16),
        ("fa", Some(i)) if i <= 7 => (true, i + 10),
        _ => return None,
    };
    Some(AliasResolution { is_alias, index })
}

fn opc() -> PatternElem {
    PatternElem::Opcode { greedy_predicates: false }
}

fn opc_pred() -> PatternElem {
    PatternElem::Opcode { greedy_predicates: true }
}

fn int_reg() -> PatternElem {
    PatternElem::Reg { class: RegClass::IntGpr, arity: RegArity::Single, descriptors: "XAI" }
}

fn fp_reg() -> PatternElem {
    PatternElem::Reg { class: RegClass::Fpr, arity: RegArity::Single, descriptors: "F" }
}

fn addr() -> PatternElem {
    PatternElem::Addr { class: RegClass::IntGpr, descriptors: "XAI" }
}

fn addr_render(tag: &'static str) -> [RenderPiece; 4] {
    [
        RenderPiece::AddrOffset(tag),
        RenderPiece::Lit("("),
        RenderPiece::AddrBase(tag),
        RenderPiece::Lit(")"),
    ]
}

fn load(dst: PatternElem) -> SeqPattern {
    let mut render = vec![
        RenderPiece::Mnemonic,
        RenderPiece::Lit(" "),
        RenderPiece::Tag("dst"),
        RenderPiece::Lit(", "),
    ];
    render.extend(addr_render("addr"));
    SeqPattern {
        elems: vec![("opc", opc()), ("dst", dst), ("addr", addr())],
        build: BuildSpec {
            uses: &["addr"],
            defs: &["dst"],
            flow: Flow::Fall,
            match_imm: None,
            render,
        },
    }
}

fn store(src: PatternElem) -> SeqPattern {
    let mut render = vec![
        RenderPiece::Mnemonic,
        RenderPiece::Lit(" "),
        RenderPiece::Tag("src"),
        RenderPiece::Lit(", "),
    ];
    render.extend(addr_render("addr"));
    SeqPattern {
        elems: vec![("opc", opc()), ("src", src), ("addr", addr())],
        build: BuildSpec {
            uses: &["src", "addr"],
            defs: &[],
            flow: Flow::Fall,
            match_imm: None,
            render,
        },
    }
}

fn std_2op() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("dst", int_reg()),
            ("lhs", int_reg()),
            ("rhs", int_reg()),
        ],
        build: BuildSpec {
            uses: &["lhs", "rhs"],
            defs: &["dst"],
            flow: Flow::Fall,
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("dst"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("lhs"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("rhs"),
            ],
        },
    }
}

fn std_1op() -> SeqPattern {
    SeqPattern {
        elems: vec![("opc", opc_pred()), ("dst", int_reg()), ("op", int_reg())],
        build: BuildSpec {
            uses: &["op"],
            defs: &["dst"],
            flow: Flow::Fall,
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("dst"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("op"),
            ],
        },
    }
}

fn std_1op_1imm() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("dst", int_reg()),
            ("op", int_reg()),
            ("imm", PatternElem::Imm),
        ],
        build: BuildSpec {
            uses: &["op"],
            defs: &["dst"],
            flow: Flow::Fall,
            match_imm: Some("imm"),
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("dst"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("op"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("imm"),
            ],
        },
    }
}

fn std_zeroop_1imm() -> SeqPattern {
    SeqPattern {
        elems: vec![("opc", opc()), ("dst", int_reg()), ("imm", PatternElem::Imm)],
        build: BuildSpec {
            uses: &[],
            defs: &["dst"],
            flow: Flow::Fall,
            match_imm: Some("imm"),
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("dst"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("imm"),
            ],
        },
    }
}

fn zero_op() -> SeqPattern {
    SeqPattern {
        elems: vec![("opc", opc())],
        build: BuildSpec {
            uses: &[],
            defs: &[],
            flow: Flow::Fall,
            match_imm: None,
            render: vec![RenderPiece::Mnemonic],
        },
    }
}

fn fence() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("pred", PatternElem::Word { charset: "iorw" }),
            ("succ", PatternElem::Word { charset: "iorw" }),
        ],
        build: BuildSpec {
            uses: &[],
            defs: &[],
            flow: Flow::Fall,
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("pred"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("succ"),
            ],
        },
    }
}

fn cond_branch() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("src1", int_reg()),
            ("src2", int_reg()),
            ("dst", PatternElem::Label),
        ],
        build: BuildSpec {
            uses: &["src1", "src2"],
            defs: &[],
            flow: Flow::CondJump { label: "dst" },
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("src1"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("src2"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("dst"),
            ],
        },
    }
}

fn cond_branch_1op() -> SeqPattern {
    SeqPattern {
        elems: vec![("opc", opc()), ("src1", int_reg()), ("dst", PatternElem::Label)],
        build: BuildSpec {
            uses: &["src1"],
            defs: &[],
            flow: Flow::CondJump { label: "dst" },
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("src1"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("dst"),
            ],
        },
    }
}

fn call() -> SeqPattern {
    SeqPattern {
        elems: vec![("opc", opc()), ("dst", PatternElem::Label)],
        build: BuildSpec {
            uses: &[],
            defs: &[],
            flow: Flow::Jump { label: "dst" },
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("dst"),
            ],
        },
    }
}

/// Floating-point operation: dotted opcode, destination, `ops` operands and
/// an optional trailing rounding mode.
fn fp_op(dst: PatternElem, ops: Vec<PatternElem>, rounding: bool) -> SeqPattern {
    const OP_TAGS: [&str; 3] = ["op0", "op1", "op2"];
    let mut elems = vec![("opc", opc_pred()), ("dst", dst)];
    let mut render = vec![
        RenderPiece::Mnemonic,
        RenderPiece::Lit(" "),
        RenderPiece::Tag("dst"),
    ];
    let uses: &'static [&'static str] = match ops.len() {
        1 => &["op0"],
        2 => &["op0", "op1"],
        _ => &["op0", "op1", "op2"],
    };
    for (i, op) in ops.into_iter().enumerate() {
        elems.push((OP_TAGS[i], op));
        render.push(RenderPiece::Lit(", "));
        render.push(RenderPiece::Tag(OP_TAGS[i]));
    }
    if rounding {
        elems.push(("rnd", PatternElem::Optional(Box::new(PatternElem::Label))));
        render.push(RenderPiece::Opt(vec![
            RenderPiece::Lit(", "),
            RenderPiece::Tag("rnd"),
        ]));
    }
    SeqPattern {
        elems,
        build: BuildSpec {
            uses,
            defs: &["dst"],
            flow: Flow::Fall,
            match_imm: None,
            render,
        },
    }
}

fn base_patterns() -> FxHashMap<String, InsnPattern> {
    let mut patterns: FxHashMap<String, InsnPattern> = FxHashMap::default();
    let mut seq = |mnemonic: &str, p: SeqPattern| {
        patterns.insert(mnemonic.to_string(), InsnPattern::Seq(p));
    };

    // loads and stores
    for m in ["lb", "lh", "lw", "lbu", "lhu"] {
        seq(m, load(int_reg()));
    }
    for m in ["sb", "sh", "sw"] {
        seq(m, store(int_reg()));
    }

    // integer arithmetic and logic
    for m in [
        "add", "sub", "slt", "sltu", "and", "or", "xor", "sll", "sra", "srl", "mul", "mulh",
        "mulhu", "mulhsu", "div", "divu", "rem", "remu",
    ] {
        seq(m, std_2op());
    }
    for m in ["addi", "slti", "sltiu", "andi", "ori", "xori", "slli", "srai", "srli", "jalr"] {
        seq(m, std_1op_1imm());
    }
    for m in ["lui", "li", "auipc", "jal"] {
        seq(m, std_zeroop_1imm());
    }
    seq("snez", std_1op());

    seq("fence", fence());
    for m in ["ebreak", "ecall", "ret"] {
        seq(m, zero_op());
    }

    // control flow
    for m in ["beq", "bne", "blt", "bge", "bltu", "bgeu"] {
        seq(m, cond_branch());
    }
    for m in ["bnez", "beqz"] {
        seq(m, cond_branch_1op());
    }
    for m in ["call", "j"] {
        seq(m, call());
    }

    // single and double precision float tables
    for m in [
        "fadd.s", "fsub.s", "fmul.s", "fdiv.s", "fmin.s", "fmax.s", "fadd.d", "fsub.d",
        "fmul.d", "fmax.d", "fmin.d", "fdiv.d",
    ] {
        seq(m, fp_op(fp_reg(), vec![fp_reg(), fp_reg()], true));
    }
    for m in ["fsqrt.s", "fsqrt.d", "fcvt.s.d", "fcvt.d.s"] {
        seq(m, fp_op(fp_reg(), vec![fp_reg()], true));
    }
    for m in [
        "fmadd.s", "fnmadd.s", "fmsub.s", "fnmsub.s", "fmadd.d", "fnmadd.d", "fmsub.d",
        "fnmsub.d",
    ] {
        seq(m, fp_op(fp_reg(), vec![fp_reg(), fp_reg(), fp_reg()], true));
    }
    for m in ["flw", "fld"] {
        seq(m, load(fp_reg()));
    }
    for m in ["fsw", "fsd"] {
        seq(m, store(fp_reg()));
    }
    for m in ["fcvt.s.w", "fcvt.s.wu", "fcvt.d.w", "fcvt.d.wu"] {
        seq(m, fp_op(fp_reg(), vec![int_reg()], true));
    }
    for m in ["fcvt.w.s", "fcvt.wu.s", "fcvt.w.d", "fcvt.wu.d"] {
        seq(m, fp_op(int_reg(), vec![fp_reg()], true));
    }
    for m in ["fmv.s", "fmv.d"] {
        seq(m, fp_op(fp_reg(), vec![fp_reg()], false));
    }
    seq("fmv.x.s", fp_op(int_reg(), vec![fp_reg()], false));
    seq("fmv.s.x", fp_op(fp_reg(), vec![int_reg()], false));
    for m in ["feq.s", "flt.s", "fle.s", "feq.d", "flt.d", "fle.d"] {
        seq(m, fp_op(int_reg(), vec![fp_reg(), fp_reg()], false));
    }
    for m in ["fsgnj.s", "fsgnjn.s", "fsgnjx.s", "fsgnj.d", "fsgnjn.d", "fsgnjx.d"] {
        seq(m, fp_op(fp_reg(), vec![fp_reg()], false));
    }
    for m in ["fclass.s", "fclass.d"] {
        seq(m, fp_op(int_reg(), vec![fp_reg()], false));
    }

    patterns
}

fn rv64_extra(patterns: &mut FxHashMap<String, InsnPattern>) {
    let mut seq = |mnemonic: &str, p: SeqPattern| {
        patterns.insert(mnemonic.to_string(), InsnPattern::Seq(p));
    };
    seq("ld", load(int_reg()));
    seq("sd", store(int_reg()));
    for m in ["sllw", "srlw", "sraw", "addw"] {
        seq(m, std_2op());
    }
    for m in ["slliw", "srliw", "sraiw", "addiw"] {
        seq(m, std_1op_1imm());
    }
    seq("sext.w", std_1op());
    seq("fmv.x.d", fp_op(int_reg(), vec![fp_reg()], false));
    seq("fmv.x.w", fp_op(int_reg(), vec![fp_reg()], false));
    seq("fmv.w.x", fp_op(fp_reg(), vec![int_reg()], false));
}

fn rv_arch(name: &'static str, patterns: FxHashMap<String, InsnPattern>) -> Architecture {
    let classes = vec![
        RegClassDesc {
            class: RegClass::IntGpr,
            num_phys: 32,
            prefix: "",
            reg_prefix: "x",
            allocatable: int_allocatable,
            const_indices: &[0],
            syntax: PhysSyntax::Named { resolve: int_alias },
        },
        RegClassDesc {
            class: RegClass::Fpr,
            num_phys: 32,
            prefix: "",
            reg_prefix: "f",
            allocatable: fp_allocatable,
            const_indices: &[],
            syntax: PhysSyntax::Named { resolve: fp_alias },
        },
    ];
    let descriptors = vec![
        DescriptorEntry { letter: 'X', class: RegClass::IntGpr, arity: RegArity::Single },
        DescriptorEntry { letter: 'A', class: RegClass::IntGpr, arity: RegArity::Single },
        DescriptorEntry { letter: 'I', class: RegClass::IntGpr, arity: RegArity::Single },
        DescriptorEntry { letter: 'F', class: RegClass::Fpr, arity: RegArity::Single },
    ];
    Architecture::new(ArchSpec {
        name,
        classes,
        descriptors,
        patterns,
        has_bundles: false,
        addr_open: '(',
        addr_close: ')',
    })
}

pub fn rv32() -> Architecture {
    rv_arch("rv32", base_patterns())
}

pub fn rv64() -> Architecture {
    let mut patterns = base_patterns();
    rv64_extra(&mut patterns);
    rv_arch("rv64", patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DebugInfo;
    use crate::lexer::Lexer;
    use crate::parser::AsmParser;
    use crate::cfg::Program;

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

    #[test]
    fn abi_aliases_resolve_to_canonical_indices() {
        assert_eq!(int_alias("sp", None), Some(AliasResolution { is_alias: true, index: 2 }));
        assert_eq!(int_alias("a", Some(0)), Some(AliasResolution { is_alias: true, index: 10 }));
        assert_eq!(int_alias("t", Some(3)), Some(AliasResolution { is_alias: true, index: 28 }));
        assert_eq!(int_alias("s", Some(2)), Some(AliasResolution { is_alias: true, index: 18 }));
        assert_eq!(int_alias("fp", None), Some(AliasResolution { is_alias: true, index: 8 }));
        assert_eq!(int_alias("x", Some(5)), Some(AliasResolution { is_alias: false, index: 5 }));
        assert_eq!(int_alias("a", Some(9)), None);
        assert_eq!(fp_alias("ft", Some(9)), Some(AliasResolution { is_alias: true, index: 29 }));
        assert_eq!(fp_alias("fa", Some(3)), Some(AliasResolution { is_alias: true, index: 13 }));
    }

    #[test]
    fn aliases_share_one_base_register_in_liveness() {
        let mut arch = rv32();
        // x10 and a0 are the same register, so the second write kills it
        let program = parse(&mut arch, "addi a0, zero, 1\naddi x10, zero, 2\n");
        let body = &program.blocks[program.current];
        assert_eq!(body.bundles.len(), 2);
        let a0 = body.bundles[0].insns[0].defs[0].reg().unwrap();
        let x10 = body.bundles[1].insns[0].defs[0].reg().unwrap();
        assert_ne!(a0, x10);
        assert_eq!(a0.base(), x10.base());
    }

    #[test]
    fn paren_addresses_and_dotted_opcodes() {
        let mut arch = rv64();
        let program = parse(
            &mut arch,
            "ld a1, 8(sp)\nfadd.d f0, f1, f2, rne\nsext.w a2, a1\n",
        );
        let body = &program.blocks[program.current];
        assert_eq!(body.bundles.len(), 3);
        assert_eq!(body.bundles[1].insns[0].mnemonic, "fadd.d");
        // rendering keeps the alias spelling and the rounding mode
        let text = body.bundles[1].insns[0].render(&arch, None);
        assert_eq!(text, "fadd.d f0, f1, f2, rne");
        let text = body.bundles[0].insns[0].render(&arch, None);
        assert_eq!(text, "ld a1, 8(sp)");
    }

    #[test]
    fn non_bundling_isa_commits_one_instruction_per_bundle() {
        let mut arch = rv32();
        let program = parse(&mut arch, "add a0, a1, a2\nadd a3, a4, a5\n");
        assert_eq!(program.blocks[program.current].bundles.len(), 2);
    }

    #[test]
    fn zero_register_is_constant() {
        let arch = rv32();
        let zero = arch.phys(RegClass::IntGpr, 0).unwrap();
        assert!(arch.spec.is_const(zero));
        let one = arch.phys(RegClass::IntGpr, 1).unwrap();
        assert!(!arch.spec.is_const(one));
    }
}
