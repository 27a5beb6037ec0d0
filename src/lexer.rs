//! The line lexer.
//!
//! A source line is split on the separator class (blanks, commas, `=` and
//! `?`) and every remaining chunk is matched against a priority-ordered list
//! of token classes. The longest prefix accepted by the first matching class
//! is emitted and the remainder of the chunk is lexed recursively. Chunks no
//! class accepts become [Token::Unmatched] so that lexing never fails; the
//! parser decides later whether an unmatched chunk is fatal.

use regex::Regex;

/// Tagged lexemes produced for one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `...` / `***` filler emitted by objdump between sections
    Ellipsis,

    /// `<name>` objdump label reference
    ObjdumpLabel(String),

    /// `{{{` function-start marker
    FunctionStart,

    /// `}}}` function-end marker
    FunctionEnd,

    /// `//#` liveness-macro introducer
    MacroHead,

    /// `//` comment introducer
    CommentHead,

    /// `#` trace comment introducer
    TraceHead,

    /// `:` closing a label definition
    LabelEnd,

    /// hexadecimal literal, optionally parenthesized and signed
    HexImm(i64),

    /// decimal literal
    Imm(i64),

    /// `$rN`/`$aN` register run, up to four concatenated specifiers
    Reg(String),

    /// single operator character out of `( ) [ ] . < >`
    Op(char),

    /// `;;` bundle separator
    BundleSep,

    /// bare identifier
    Ident(String),

    /// `$tag` special-register mention
    SpecialReg(String),

    /// `%hi(sym)` / `%lo(sym)` linker relocation
    LinkerSym(String),

    /// fail-open fallback for chunks no class accepts
    Unmatched(String),
}

#[derive(Debug, Clone, Copy)]
enum LexClass {
    Ellipsis,
    ObjdumpLabel,
    FunctionStart,
    FunctionEnd,
    MacroHead,
    CommentHead,
    TraceHead,
    LabelEnd,
    HexImm,
    Imm,
    Reg,
    Op,
    BundleSep,
    Ident,
    SpecialReg,
    LinkerSym,
}

pub struct Lexer {
    separator: Regex,
    matchers: Vec<(LexClass, Regex)>,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    pub fn new() -> Self {
        // Class priority mirrors the dispatch order below; `//#` must come
        // before `//` so macro lines are not swallowed as comments.
        let table: [(LexClass, &str); 16] = [
            (LexClass::Ellipsis, r"\A(\.{3}|\*{3})"),
            (LexClass::ObjdumpLabel, r"\A<[\w.+-]+>"),
            (LexClass::FunctionStart, r"\A\{\{\{"),
            (LexClass::FunctionEnd, r"\A\}\}\}"),
            (LexClass::MacroHead, r"\A//#"),
            (LexClass::CommentHead, r"\A//"),
            (LexClass::TraceHead, r"\A#"),
            (LexClass::LabelEnd, r"\A:"),
            (LexClass::HexImm, r"\A\(?[+-]?0x[0-9a-fA-F_]+\)?"),
            (LexClass::Imm, r"\A[+-]?[0-9]+"),
            (LexClass::Reg, r"\A\$([ar][0-9]+){1,4}"),
            (LexClass::Op, r"\A[()\[\].<>]"),
            (LexClass::BundleSep, r"\A;;"),
            (LexClass::Ident, r"\A\w+"),
            (LexClass::SpecialReg, r"\A\$\w+"),
            (LexClass::LinkerSym, r"\A%(hi|lo)\([.\w]+\)"),
        ];
        Lexer {
            separator: Regex::new(r"[ \t,=?]+").unwrap(),
            matchers: table
                .into_iter()
                .map(|(class, pat)| (class, Regex::new(pat).unwrap()))
                .collect(),
        }
    }

    /// Lex one source line into its token sequence.
    pub fn lex_line(&self, line: &str) -> Vec<Token> {
        let mut out = Vec::new();
        for chunk in self.separator.split(line) {
            self.lex_chunk(chunk, &mut out);
        }
        out
    }

    fn lex_chunk(&self, chunk: &str, out: &mut Vec<Token>) {
        if chunk.is_empty() {
            return;
        }
        for (class, re) in &self.matchers {
            if let Some(m) = re.find(chunk) {
                out.push(self.token(*class, m.as_str()));
                self.lex_chunk(&chunk[m.end()..], out);
                return;
            }
        }
        out.push(Token::Unmatched(chunk.to_string()));
    }

    fn token(&self, class: LexClass, text: &str) -> Token {
        match class {
            LexClass::Ellipsis => Token::Ellipsis,
            LexClass::ObjdumpLabel => {
                Token::ObjdumpLabel(text[1..text.len() - 1].to_string())
            }
            LexClass::FunctionStart => Token::FunctionStart,
            LexClass::FunctionEnd => Token::FunctionEnd,
            LexClass::MacroHead => Token::MacroHead,
            LexClass::CommentHead => Token::CommentHead,
            LexClass::TraceHead => Token::TraceHead,
            LexClass::LabelEnd => Token::LabelEnd,
            LexClass::HexImm => {
                let trimmed = text.trim_start_matches('(').trim_end_matches(')');
                match parse_int::parse::<i64>(trimmed) {
                    Ok(v) => Token::HexImm(v),
                    Err(_) => Token::Unmatched(text.to_string()),
                }
            }
            LexClass::Imm => match text.parse::<i64>() {
                Ok(v) => Token::Imm(v),
                Err(_) => Token::Unmatched(text.to_string()),
            },
            LexClass::Reg => Token::Reg(text.to_string()),
            LexClass::Op => Token::Op(text.chars().next().unwrap()),
            LexClass::BundleSep => Token::BundleSep,
            LexClass::Ident => Token::Ident(text.to_string()),
            LexClass::SpecialReg => Token::SpecialReg(text.to_string()),
            LexClass::LinkerSym => Token::LinkerSym(text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_instruction_line() {
        let lexer = Lexer::new();
        let toks = lexer.lex_line("add R(p) = $r5, $r5");
        assert_eq!(
            toks,
            vec![
                Token::Ident("add".into()),
                Token::Ident("R".into()),
                Token::Op('('),
                Token::Ident("p".into()),
                Token::Op(')'),
                Token::Reg("$r5".into()),
                Token::Reg("$r5".into()),
            ]
        );
    }

    #[test]
    fn lexes_compound_register_run() {
        let lexer = Lexer::new();
        assert_eq!(
            lexer.lex_line("$r6r7"),
            vec![Token::Reg("$r6r7".into())]
        );
        assert_eq!(
            lexer.lex_line("$r0r1r2r3"),
            vec![Token::Reg("$r0r1r2r3".into())]
        );
    }

    #[test]
    fn macro_head_is_not_a_comment() {
        let lexer = Lexer::new();
        let toks = lexer.lex_line("//# PREDEFINED($r5)");
        assert_eq!(toks[0], Token::MacroHead);
        assert_eq!(toks[1], Token::Ident("PREDEFINED".into()));
        assert_eq!(lexer.lex_line("// just a note")[0], Token::CommentHead);
    }

    #[test]
    fn hex_immediates_parse_with_sign_and_parens() {
        let lexer = Lexer::new();
        assert_eq!(lexer.lex_line("0x1f"), vec![Token::HexImm(0x1f)]);
        assert_eq!(lexer.lex_line("(-0x20)"), vec![Token::HexImm(-0x20)]);
        assert_eq!(lexer.lex_line("-17"), vec![Token::Imm(-17)]);
    }

    #[test]
    fn separators_are_discarded() {
        let lexer = Lexer::new();
        assert_eq!(
            lexer.lex_line("addd R(y) = R(x), 17"),
            vec![
                Token::Ident("addd".into()),
                Token::Ident("R".into()),
                Token::Op('('),
                Token::Ident("y".into()),
                Token::Op(')'),
                Token::Ident("R".into()),
                Token::Op('('),
                Token::Ident("x".into()),
                Token::Op(')'),
                Token::Imm(17),
            ]
        );
    }

    #[test]
    fn label_definition_and_bundle_separator() {
        let lexer = Lexer::new();
        assert_eq!(
            lexer.lex_line("loop:"),
            vec![Token::Ident("loop".into()), Token::LabelEnd]
        );
        assert_eq!(lexer.lex_line(";;"), vec![Token::BundleSep]);
    }

    #[test]
    fn special_registers_and_linker_symbols() {
        let lexer = Lexer::new();
        assert_eq!(
            lexer.lex_line("$lc"),
            vec![Token::SpecialReg("$lc".into())]
        );
        assert_eq!(
            lexer.lex_line("%hi(counter)"),
            vec![Token::LinkerSym("%hi(counter)".into())]
        );
    }

    #[test]
    fn objdump_tokens() {
        let lexer = Lexer::new();
        assert_eq!(
            lexer.lex_line("<main>:"),
            vec![Token::ObjdumpLabel("main".into()), Token::LabelEnd]
        );
        assert_eq!(lexer.lex_line("..."), vec![Token::Ellipsis]);
    }

    #[test]
    fn unmatched_chunks_fail_open() {
        let lexer = Lexer::new();
        let toks = lexer.lex_line("@@@");
        assert_eq!(toks, vec![Token::Unmatched("@@@".into())]);
    }

    #[test]
    fn predicate_suffix_splits_on_dot() {
        let lexer = Lexer::new();
        assert_eq!(
            lexer.lex_line("fadd.s"),
            vec![
                Token::Ident("fadd".into()),
                Token::Op('.'),
                Token::Ident("s".into()),
            ]
        );
    }
}
