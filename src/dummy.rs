//! Reference bundling architecture.
//!
//! A VLIW-flavoured machine with a `Std` file (`$rN`), an accumulator file
//! (`$aN`) and a symbolic special file (`$ps`, `$lc`, ...). Memory operands
//! are written `offset[base]`; dual and quad register groups concatenate
//! their specifiers (`$r6r7`). The pattern table is intentionally small but
//! covers every operand shape the parser knows.

use crate::arch::{
    ArchSpec, Architecture, DescriptorEntry, PhysSyntax, RegArity, RegClass, RegClassDesc,
};
use crate::pattern::{
    BuildSpec, Flow, InsnPattern, PatternElem, RenderPiece, SeqPattern,
};

use rustc_hash::FxHashMap;

fn every_index(_: usize) -> bool {
    true
}

fn no_index(_: usize) -> bool {
    false
}

fn opc() -> PatternElem {
    PatternElem::Opcode { greedy_predicates: false }
}

fn opc_pred() -> PatternElem {
    PatternElem::Opcode { greedy_predicates: true }
}

fn std_reg(arity: RegArity) -> PatternElem {
    let descriptors = match arity {
        RegArity::Single => "R",
        RegArity::Dual => "D",
        RegArity::Quad => "Q",
    };
    PatternElem::Reg { class: RegClass::Std, arity, descriptors }
}

fn acc_reg() -> PatternElem {
    PatternElem::Reg { class: RegClass::Acc, arity: RegArity::Single, descriptors: "A" }
}

fn addr() -> PatternElem {
    PatternElem::Addr { class: RegClass::Std, descriptors: "R" }
}

fn load(dst_arity: RegArity) -> SeqPattern {
    SeqPattern {
        elems: vec![("opc", opc_pred()), ("dst", std_reg(dst_arity)), ("addr", addr())],
        build: BuildSpec {
            uses: &["addr"],
            defs: &["dst"],
            flow: Flow::Fall,
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("dst"),
                RenderPiece::Lit(" = "),
                RenderPiece::AddrOffset("addr"),
                RenderPiece::Lit("["),
                RenderPiece::AddrBase("addr"),
                RenderPiece::Lit("]"),
            ],
        },
    }
}

fn store(src_arity: RegArity) -> SeqPattern {
    SeqPattern {
        elems: vec![("opc", opc_pred()), ("addr", addr()), ("src", std_reg(src_arity))],
        build: BuildSpec {
            uses: &["src", "addr"],
            defs: &[],
            flow: Flow::Fall,
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::AddrOffset("addr"),
                RenderPiece::Lit("["),
                RenderPiece::AddrBase("addr"),
                RenderPiece::Lit("]"),
                RenderPiece::Lit(" = "),
                RenderPiece::Tag("src"),
            ],
        },
    }
}

fn std_2op() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("dst", std_reg(RegArity::Single)),
            ("lhs", std_reg(RegArity::Single)),
            ("rhs", std_reg(RegArity::Single)),
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
                RenderPiece::Lit(" = "),
                RenderPiece::Tag("lhs"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("rhs"),
            ],
        },
    }
}

fn std_1op_1imm() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("dst", std_reg(RegArity::Single)),
            ("op", std_reg(RegArity::Single)),
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
                RenderPiece::Lit(" = "),
                RenderPiece::Tag("op"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("imm"),
            ],
        },
    }
}

fn std_imm() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("dst", std_reg(RegArity::Single)),
            ("imm", PatternElem::Imm),
        ],
        build: BuildSpec {
            uses: &[],
            defs: &["dst"],
            flow: Flow::Fall,
            match_imm: Some("imm"),
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("dst"),
                RenderPiece::Lit(" = "),
                RenderPiece::Tag("imm"),
            ],
        },
    }
}

fn dual_2op() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("dst", std_reg(RegArity::Dual)),
            ("lhs", std_reg(RegArity::Single)),
            ("rhs", std_reg(RegArity::Single)),
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
                RenderPiece::Lit(" = "),
                RenderPiece::Tag("lhs"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("rhs"),
            ],
        },
    }
}

// The accumulating forms read and write the same register, so the operand
// appears in both lists under one tag.
fn std_2op_acc() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("acc", std_reg(RegArity::Single)),
            ("lhs", std_reg(RegArity::Single)),
            ("rhs", std_reg(RegArity::Single)),
        ],
        build: BuildSpec {
            uses: &["acc", "lhs", "rhs"],
            defs: &["acc"],
            flow: Flow::Fall,
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("acc"),
                RenderPiece::Lit(" = "),
                RenderPiece::Tag("lhs"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("rhs"),
            ],
        },
    }
}

fn move_to_acc() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("dst", acc_reg()),
            ("lhs", std_reg(RegArity::Single)),
            ("rhs", std_reg(RegArity::Single)),
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
                RenderPiece::Lit(" = "),
                RenderPiece::Tag("lhs"),
                RenderPiece::Lit(", "),
                RenderPiece::Tag("rhs"),
            ],
        },
    }
}

fn move_from_acc() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("dst", std_reg(RegArity::Single)),
            ("src", acc_reg()),
        ],
        build: BuildSpec {
            uses: &["src"],
            defs: &["dst"],
            flow: Flow::Fall,
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("dst"),
                RenderPiece::Lit(" = "),
                RenderPiece::Tag("src"),
            ],
        },
    }
}

fn special_to_std() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("dst", std_reg(RegArity::Single)),
            ("src", PatternElem::SpecialReg),
        ],
        build: BuildSpec {
            uses: &["src"],
            defs: &["dst"],
            flow: Flow::Fall,
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("dst"),
                RenderPiece::Lit(" = "),
                RenderPiece::Tag("src"),
            ],
        },
    }
}

fn std_to_special() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc()),
            ("dst", PatternElem::SpecialReg),
            ("src", std_reg(RegArity::Single)),
        ],
        build: BuildSpec {
            uses: &["src"],
            defs: &["dst"],
            flow: Flow::Fall,
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("dst"),
                RenderPiece::Lit(" = "),
                RenderPiece::Tag("src"),
            ],
        },
    }
}

fn goto() -> SeqPattern {
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

fn cond_branch() -> SeqPattern {
    SeqPattern {
        elems: vec![
            ("opc", opc_pred()),
            ("cond", std_reg(RegArity::Single)),
            ("dst", PatternElem::Label),
        ],
        build: BuildSpec {
            uses: &["cond"],
            defs: &[],
            flow: Flow::CondJump { label: "dst" },
            match_imm: None,
            render: vec![
                RenderPiece::Mnemonic,
                RenderPiece::Lit(" "),
                RenderPiece::Tag("cond"),
                RenderPiece::Lit(" ? "),
                RenderPiece::Tag("dst"),
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

fn alt(alts: Vec<SeqPattern>, tags: Vec<&'static str>) -> InsnPattern {
    InsnPattern::Alt { alts, tags }
}

/// Build the reference architecture with the requested register file sizes.
pub fn dummy(std_reg_num: usize, acc_reg_num: usize) -> Architecture {
    let classes = vec![
        RegClassDesc {
            class: RegClass::Std,
            num_phys: std_reg_num,
            prefix: "$",
            reg_prefix: "r",
            allocatable: every_index,
            const_indices: &[],
            syntax: PhysSyntax::Dollar { letter: 'r' },
        },
        RegClassDesc {
            class: RegClass::Acc,
            num_phys: acc_reg_num,
            prefix: "$",
            reg_prefix: "a",
            allocatable: every_index,
            const_indices: &[],
            syntax: PhysSyntax::Dollar { letter: 'a' },
        },
        RegClassDesc {
            class: RegClass::Special,
            num_phys: 0,
            prefix: "$",
            reg_prefix: "",
            allocatable: no_index,
            const_indices: &[],
            syntax: PhysSyntax::None,
        },
    ];

    let descriptors = vec![
        DescriptorEntry { letter: 'R', class: RegClass::Std, arity: RegArity::Single },
        DescriptorEntry { letter: 'A', class: RegClass::Acc, arity: RegArity::Single },
        DescriptorEntry { letter: 'D', class: RegClass::Std, arity: RegArity::Dual },
        DescriptorEntry { letter: 'Q', class: RegClass::Std, arity: RegArity::Quad },
    ];

    let mut patterns: FxHashMap<String, InsnPattern> = FxHashMap::default();
    let mut insert = |mnemonic: &str, pattern: InsnPattern| {
        patterns.insert(mnemonic.to_string(), pattern);
    };

    insert("ld", InsnPattern::Seq(load(RegArity::Single)));
    insert("lq", InsnPattern::Seq(load(RegArity::Dual)));
    insert("lo", InsnPattern::Seq(load(RegArity::Quad)));
    insert("st", InsnPattern::Seq(store(RegArity::Single)));
    insert("sq", InsnPattern::Seq(store(RegArity::Dual)));

    insert("add", alt(vec![std_2op(), std_1op_1imm()], vec!["", "imm"]));
    insert("sbf", alt(vec![std_2op(), std_1op_1imm()], vec!["", "imm"]));
    insert("addd", alt(vec![dual_2op(), std_1op_1imm()], vec!["", "imm"]));
    insert("sbfd", alt(vec![dual_2op(), std_1op_1imm()], vec!["", "imm"]));
    insert("copyq", InsnPattern::Seq(dual_2op()));
    insert("make", InsnPattern::Seq(std_imm()));
    insert("maddw", InsnPattern::Seq(std_2op_acc()));

    insert("movefo", InsnPattern::Seq(move_to_acc()));
    insert("movefa", InsnPattern::Seq(move_from_acc()));
    insert("get", InsnPattern::Seq(special_to_std()));
    insert("set", InsnPattern::Seq(std_to_special()));

    insert("goto", InsnPattern::Seq(goto()));
    insert("cb", InsnPattern::Seq(cond_branch()));
    insert("nop", InsnPattern::Seq(zero_op()));

    Architecture::new(ArchSpec {
        name: "dummy",
        classes,
        descriptors,
        patterns,
        has_bundles: true,
        addr_open: '[',
        addr_close: ']',
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_listing_expands_disjunctive_tags() {
        let arch = dummy(16, 16);
        let opcodes = arch.spec.all_opcodes();
        assert!(opcodes.contains(&"add".to_string()));
        assert!(opcodes.contains(&"add-imm".to_string()));
        assert!(opcodes.contains(&"nop".to_string()));
        assert!(!opcodes.contains(&"add-".to_string()));
    }

    #[test]
    fn register_files_are_sized_by_the_constructor() {
        let arch = dummy(4, 2);
        assert_eq!(arch.spec.num_phys(RegClass::Std), 4);
        assert_eq!(arch.spec.num_phys(RegClass::Acc), 2);
        assert_eq!(arch.spec.num_phys(RegClass::Special), 0);
        assert!(arch.phys(RegClass::Std, 4).is_err());
    }
}
