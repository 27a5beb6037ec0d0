//! The line-oriented parser driver.
//!
//! One [AsmParser] owns the [Program] under construction and an in-progress
//! bundle. Each input line is lexed by the caller and handed over with its
//! [DebugInfo]; the driver dispatches on the head token (bundle separator,
//! macro, comment, label definition, mnemonic) and wires CFG edges as jumps
//! are seen. Objdump listings and execution traces reuse the same mnemonic
//! path with extra token skipping.

use crate::arch::Architecture;
use crate::cfg::Program;
use crate::error::{AsmError, DebugInfo};
use crate::ir::{Bundle, Instruction};
use crate::lexer::Token;
use crate::pattern::parse_any_register;

pub struct AsmParser<'a> {
    arch: &'a mut Architecture,
    pub program: Program,
    ongoing: Bundle,
    last_timestamp: Option<i64>,
}

impl<'a> AsmParser<'a> {
    pub fn new(arch: &'a mut Architecture) -> Self {
        AsmParser {
            arch,
            program: Program::new(),
            ongoing: Bundle::default(),
            last_timestamp: None,
        }
    }

    /// Process one lexed assembly line.
    pub fn feed(&mut self, tokens: &[Token], dbg: DebugInfo) -> Result<(), AsmError> {
        let Some(head) = tokens.first() else { return Ok(()) };
        match head {
            Token::BundleSep => {
                self.commit_bundle();
                Ok(())
            }
            Token::MacroHead => self.parse_macro(&tokens[1..], dbg),
            Token::CommentHead | Token::TraceHead => Ok(()),
            Token::FunctionStart | Token::FunctionEnd | Token::Ellipsis => Ok(()),
            Token::Ident(name) => {
                if matches!(tokens.get(1), Some(Token::LabelEnd)) {
                    if !self.ongoing.is_empty() {
                        return Err(AsmError::LabelMidBundle { label: name.clone(), dbg });
                    }
                    self.program.add_label(name)
                } else {
                    self.parse_insn(tokens, dbg)
                }
            }
            _ => Err(AsmError::MalformedLine { dbg }),
        }
    }

    /// Process one lexed objdump line. The pc/bytecode prefix is skipped and
    /// `<name>:` lines become label definitions.
    pub fn feed_objdump(&mut self, tokens: &[Token], dbg: DebugInfo) -> Result<(), AsmError> {
        let Some(head) = tokens.first() else { return Ok(()) };
        if matches!(
            head,
            Token::Ellipsis | Token::FunctionStart | Token::FunctionEnd
        ) {
            return Ok(());
        }
        // "0000000000401000 <main>:" section headers
        if let Some(pos) = tokens
            .iter()
            .position(|t| matches!(t, Token::ObjdumpLabel(_)))
        {
            if matches!(tokens.get(pos + 1), Some(Token::LabelEnd)) {
                let Token::ObjdumpLabel(name) = &tokens[pos] else { unreachable!() };
                if !self.ongoing.is_empty() {
                    return Err(AsmError::LabelMidBundle { label: name.clone(), dbg });
                }
                return self.program.add_label(name);
            }
        }
        let rest = self.skip_objdump_prefix(tokens);
        if rest.is_empty() {
            return Ok(());
        }
        match rest.first() {
            Some(Token::Ident(_)) => self.parse_insn(rest, dbg),
            _ => Ok(()),
        }
    }

    /// Process one lexed trace line. The leading timestamp starts a new
    /// bundle whenever it changes; the pc that follows it is skipped.
    pub fn feed_trace(&mut self, tokens: &[Token], dbg: DebugInfo) -> Result<(), AsmError> {
        match tokens.first() {
            None | Some(Token::TraceHead) => Ok(()),
            Some(Token::Imm(ts)) => {
                if self.last_timestamp != Some(*ts) {
                    self.commit_bundle();
                    self.last_timestamp = Some(*ts);
                }
                let mut rest = &tokens[1..];
                while matches!(rest.first(), Some(Token::HexImm(_)) | Some(Token::Imm(_))) {
                    rest = &rest[1..];
                }
                match rest.first() {
                    Some(Token::Ident(_)) => self.parse_insn(rest, dbg),
                    None => Ok(()),
                    _ => Err(AsmError::MalformedLine { dbg }),
                }
            }
            _ => self.feed(tokens, dbg),
        }
    }

    /// Finish parsing: commit a trailing bundle and close the CFG.
    pub fn finish(mut self) -> Result<Program, AsmError> {
        self.commit_bundle();
        self.program.end_program();
        Ok(self.program)
    }

    fn commit_bundle(&mut self) {
        if !self.ongoing.is_empty() {
            let bundle = std::mem::take(&mut self.ongoing);
            self.program.add_bundle(bundle);
        }
    }

    /// Drop the `pc:` and bytecode columns of an objdump line. The pc runs
    /// up to the first `:`; byte groups are all-hex tokens of width 2, 8 or
    /// 16 that do not collide with a mnemonic in the pattern table.
    fn skip_objdump_prefix<'t>(&self, tokens: &'t [Token]) -> &'t [Token] {
        let mut rest = tokens;
        if let Some(pos) = rest.iter().position(|t| matches!(t, Token::LabelEnd)) {
            rest = &rest[pos + 1..];
        }
        while let Some(head) = rest.first() {
            let is_byte_group = match head {
                Token::Imm(_) | Token::HexImm(_) => true,
                Token::Ident(text) => {
                    matches!(text.len(), 2 | 8 | 16)
                        && text.chars().all(|c| c.is_ascii_hexdigit())
                        && !self.arch.spec.patterns.contains_key(text)
                }
                _ => false,
            };
            if !is_byte_group {
                break;
            }
            rest = &rest[1..];
        }
        rest
    }

    /// `PREDEFINED(<reg-list>)` / `POSTUSED(<reg-list>)` liveness macros.
    fn parse_macro(&mut self, tokens: &[Token], dbg: DebugInfo) -> Result<(), AsmError> {
        let Some(Token::Ident(name)) = tokens.first() else {
            return Err(AsmError::MalformedMacro { dbg });
        };
        let mut rest = match tokens.get(1) {
            Some(Token::Op('(')) => &tokens[2..],
            _ => return Err(AsmError::MalformedMacro { dbg }),
        };
        let mut regs = Vec::new();
        while !matches!(rest.first(), Some(Token::Op(')'))) {
            let arch = &mut *self.arch;
            match parse_any_register(&arch.spec, &mut arch.pool, rest) {
                Some((sub, remaining)) => {
                    regs.extend(sub.into_iter().map(|r| r.base()));
                    rest = remaining;
                }
                None => return Err(AsmError::MalformedMacro { dbg }),
            }
        }
        match name.as_str() {
            "PREDEFINED" => self.program.pre_defined.extend(regs),
            "POSTUSED" => self.program.post_used.extend(regs),
            _ => return Err(AsmError::UnknownMacro { name: name.clone(), dbg }),
        }
        Ok(())
    }

    /// Mnemonic dispatch: look up the bare identifier first, then retry with
    /// `.pred` suffixes appended until the table hits.
    fn parse_insn(&mut self, tokens: &[Token], dbg: DebugInfo) -> Result<(), AsmError> {
        let Some(Token::Ident(bare)) = tokens.first() else {
            return Err(AsmError::MalformedLine { dbg });
        };
        let mut mnemonic = bare.clone();
        let mut probe = 1;
        let found = loop {
            if self.arch.spec.patterns.contains_key(&mnemonic) {
                break true;
            }
            match (tokens.get(probe), tokens.get(probe + 1)) {
                (Some(Token::Op('.')), Some(Token::Ident(pred))) => {
                    mnemonic.push('.');
                    mnemonic.push_str(pred);
                    probe += 2;
                }
                _ => break false,
            }
        };
        if !found {
            return Err(AsmError::UnknownMnemonic { mnemonic, dbg });
        }

        let arch = &mut *self.arch;
        let pattern = &arch.spec.patterns[&mnemonic];
        let insn = pattern
            .match_insn(&arch.spec, &mut arch.pool, tokens, &dbg)
            .ok_or(AsmError::PatternMatch { mnemonic, dbg })?;
        self.register_insn(insn);
        Ok(())
    }

    fn register_insn(&mut self, insn: Instruction) {
        if insn.is_jump || insn.is_cond_jump {
            if let Some(label) = &insn.jump_label {
                let succ = self.program.block_by_label(label);
                self.program.connect(self.program.current, succ);
            }
        }
        self.ongoing.push(insn);
        if !self.arch.spec.has_bundles {
            self.commit_bundle();
        }
    }
}
