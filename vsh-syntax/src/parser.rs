//! Token list → AST. Recursive descent with one-token lookahead (two-token
//! lookahead only for detecting the `name ( ) { ... }` function shorthand).
//!
//! The parser never backtracks: on the first unexpected token it records an
//! error and stops. It does not recover, matching spec.md §4.3 — the driver
//! is responsible for reporting exit status 2 on a hard syntax error, or
//! (supplemented, see SPEC_FULL.md) prompting for a continuation line when
//! the error is [`ParseError::is_incomplete`].

use vsh_arena::Arena;

use crate::ast::{Assignment, Node, Redir, RedirKind};
use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::HeredocResult;
use crate::token::{Token, TokenKind};

pub fn parse<'arena>(
    tokens: &[Token<'arena>],
    heredocs: &[HeredocResult<'arena>],
    arena: &'arena Arena,
) -> Result<Option<&'arena Node<'arena>>, ParseError> {
    Parser {
        tokens,
        heredocs,
        pos: 0,
        arena,
    }
    .parse_program()
}

struct Parser<'t, 'arena> {
    tokens: &'t [Token<'arena>],
    heredocs: &'t [HeredocResult<'arena>],
    pos: usize,
    arena: &'arena Arena,
}

impl<'t, 'arena> Parser<'t, 'arena> {
    fn alloc(&self, node: Node<'arena>) -> &'arena Node<'arena> {
        self.arena.alloc(node)
    }

    fn peek(&self) -> Token<'arena> {
        self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn bump(&mut self) -> Token<'arena> {
        let t = self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'arena>, ParseError> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.error_here())
        }
    }

    fn skip_newlines(&mut self) {
        while self.at(TokenKind::Newline) {
            self.bump();
        }
    }

    fn error_here(&self) -> ParseError {
        let tok = self.peek();
        let kind = if tok.kind == TokenKind::Eof {
            ParseErrorKind::UnexpectedEof
        } else {
            ParseErrorKind::UnexpectedToken { found: tok.kind }
        };
        let message = match &kind {
            ParseErrorKind::UnexpectedEof => "unexpected end of input".to_string(),
            ParseErrorKind::UnexpectedToken { found } => {
                format!("unexpected token {found:?}")
            }
        };
        ParseError {
            kind,
            message,
            line: tok.line,
            col: tok.col,
        }
    }

    fn can_start_pipeline(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Word
                | TokenKind::RedirIn
                | TokenKind::RedirOut
                | TokenKind::RedirAppend
                | TokenKind::RedirHeredoc
                | TokenKind::RedirHeredocStrip
                | TokenKind::RedirDupOut
                | TokenKind::RedirDupIn
                | TokenKind::LParen
                | TokenKind::LBrace
                | TokenKind::Bang
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Function
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Local
        )
    }

    fn parse_program(&mut self) -> Result<Option<&'arena Node<'arena>>, ParseError> {
        self.skip_newlines();
        let list = self.parse_list()?;
        self.skip_newlines();
        self.expect(TokenKind::Eof)?;
        Ok(list)
    }

    fn parse_list(&mut self) -> Result<Option<&'arena Node<'arena>>, ParseError> {
        self.skip_newlines();
        if !self.can_start_pipeline() {
            return Ok(None);
        }
        let mut left = self.parse_pipeline()?;
        loop {
            let sep = self.peek().kind;
            match sep {
                TokenKind::Semi | TokenKind::Amp | TokenKind::And | TokenKind::Or => {}
                TokenKind::Newline => {}
                _ => break,
            }
            self.bump();
            self.skip_newlines();
            if !self.can_start_pipeline() {
                if sep == TokenKind::Amp {
                    left = self.alloc(Node::Background { child: left });
                }
                return Ok(Some(left));
            }
            let right = self.parse_pipeline()?;
            left = match sep {
                TokenKind::Amp => {
                    let bg = self.alloc(Node::Background { child: left });
                    self.alloc(Node::Sequence { left: bg, right })
                }
                TokenKind::And => self.alloc(Node::And { left, right }),
                TokenKind::Or => self.alloc(Node::Or { left, right }),
                _ => self.alloc(Node::Sequence { left, right }),
            };
        }
        Ok(Some(left))
    }

    fn parse_list_required(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        match self.parse_list()? {
            Some(n) => Ok(n),
            None => Err(self.error_here()),
        }
    }

    fn parse_pipeline(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        let negated = if self.at(TokenKind::Bang) {
            self.bump();
            true
        } else {
            false
        };
        let mut commands: Vec<&'arena Node<'arena>> = vec![self.parse_command()?];
        while self.at(TokenKind::Pipe) {
            self.bump();
            self.skip_newlines();
            commands.push(self.parse_command()?);
        }
        let commands = &*self.arena.alloc_slice_fill_iter(commands);
        Ok(self.alloc(Node::Pipeline { commands, negated }))
    }

    fn parse_command(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        match self.peek().kind {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Function => self.parse_function_kw(),
            TokenKind::LBrace => self.parse_block(),
            TokenKind::LParen => self.parse_subshell(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => self.parse_break(),
            TokenKind::Continue => self.parse_continue(),
            TokenKind::Local => self.parse_local(),
            TokenKind::Word
                if self.peek_at(1) == TokenKind::LParen && self.peek_at(2) == TokenKind::RParen =>
            {
                self.parse_function_shorthand()
            }
            _ => self.parse_simple(),
        }
    }

    fn parse_if(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        self.expect(TokenKind::If)?;
        let condition = self.parse_list_required()?;
        self.expect(TokenKind::Then)?;
        let then_branch = self.parse_list_required()?;
        let else_branch = self.parse_if_tail()?;
        self.expect(TokenKind::Fi)?;
        Ok(self.alloc(Node::If {
            condition,
            then_branch,
            else_branch,
        }))
    }

    fn parse_if_tail(&mut self) -> Result<Option<&'arena Node<'arena>>, ParseError> {
        if self.at(TokenKind::Elif) {
            self.bump();
            let condition = self.parse_list_required()?;
            self.expect(TokenKind::Then)?;
            let then_branch = self.parse_list_required()?;
            let else_branch = self.parse_if_tail()?;
            Ok(Some(self.alloc(Node::If {
                condition,
                then_branch,
                else_branch,
            })))
        } else if self.at(TokenKind::Else) {
            self.bump();
            Ok(Some(self.parse_list_required()?))
        } else {
            Ok(None)
        }
    }

    fn parse_while(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        self.expect(TokenKind::While)?;
        let condition = self.parse_list_required()?;
        self.expect(TokenKind::Do)?;
        let body = self.parse_list_required()?;
        self.expect(TokenKind::Done)?;
        Ok(self.alloc(Node::While { condition, body }))
    }

    fn parse_for(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        self.expect(TokenKind::For)?;
        let varname = self.expect(TokenKind::Word)?.text.unwrap_or("");
        let (words, uses_positional) = if self.at(TokenKind::In) {
            self.bump();
            let mut raw = Vec::new();
            while self.at(TokenKind::Word) {
                raw.push(self.bump().text.unwrap_or(""));
            }
            (&*self.arena.alloc_slice_copy(&raw), false)
        } else {
            (&[][..], true)
        };
        match self.peek().kind {
            TokenKind::Semi | TokenKind::Newline => {
                self.bump();
            }
            _ => return Err(self.error_here()),
        }
        self.skip_newlines();
        self.expect(TokenKind::Do)?;
        let body = self.parse_list_required()?;
        self.expect(TokenKind::Done)?;
        Ok(self.alloc(Node::For {
            varname,
            words,
            uses_positional,
            body,
        }))
    }

    fn parse_function_kw(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        self.expect(TokenKind::Function)?;
        let name = self.expect(TokenKind::Word)?.text.unwrap_or("");
        if self.at(TokenKind::LParen) {
            self.bump();
            self.expect(TokenKind::RParen)?;
        }
        let body = self.parse_brace_body()?;
        Ok(self.alloc(Node::Function { name, body }))
    }

    fn parse_function_shorthand(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        let name = self.bump().text.unwrap_or("");
        self.bump(); // (
        self.bump(); // )
        let body = self.parse_brace_body()?;
        Ok(self.alloc(Node::Function { name, body }))
    }

    fn parse_brace_body(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_list_required()?;
        self.expect(TokenKind::RBrace)?;
        Ok(body)
    }

    fn parse_block(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        let child = self.parse_brace_body()?;
        Ok(self.alloc(Node::Block { child }))
    }

    fn parse_subshell(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let child = self.parse_list_required()?;
        self.expect(TokenKind::RParen)?;
        Ok(self.alloc(Node::Subshell { child }))
    }

    fn parse_return(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        self.expect(TokenKind::Return)?;
        let status = if self.at(TokenKind::Word) {
            Some(self.bump().text.unwrap_or(""))
        } else {
            None
        };
        Ok(self.alloc(Node::Return { status }))
    }

    fn parse_break(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        self.expect(TokenKind::Break)?;
        let levels = self.parse_loop_levels();
        Ok(self.alloc(Node::Break { levels }))
    }

    fn parse_continue(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        self.expect(TokenKind::Continue)?;
        let levels = self.parse_loop_levels();
        Ok(self.alloc(Node::Continue { levels }))
    }

    fn parse_loop_levels(&mut self) -> u32 {
        if self.at(TokenKind::Word) {
            let text = self.bump().text.unwrap_or("1");
            text.parse().unwrap_or(1).max(1)
        } else {
            1
        }
    }

    fn parse_local(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        self.expect(TokenKind::Local)?;
        self.parse_simple_with_leading(Some("local"))
    }

    fn parse_simple(&mut self) -> Result<&'arena Node<'arena>, ParseError> {
        self.parse_simple_with_leading(None)
    }

    fn parse_simple_with_leading(
        &mut self,
        leading: Option<&'arena str>,
    ) -> Result<&'arena Node<'arena>, ParseError> {
        let mut raw_words: Vec<&'arena str> = leading.into_iter().collect();
        let mut redirs: Vec<Redir<'arena>> = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Word => raw_words.push(self.bump().text.unwrap_or("")),
                TokenKind::RedirIn
                | TokenKind::RedirOut
                | TokenKind::RedirAppend
                | TokenKind::RedirHeredoc
                | TokenKind::RedirHeredocStrip
                | TokenKind::RedirDupOut
                | TokenKind::RedirDupIn => redirs.push(self.parse_redir()?),
                _ => break,
            }
        }
        if raw_words.is_empty() && redirs.is_empty() {
            return Err(self.error_here());
        }

        let mut split_at = 0;
        if leading.is_none() {
            while split_at < raw_words.len()
                && parse_assignment_word(raw_words[split_at]).is_some()
            {
                split_at += 1;
            }
        }
        let assignments: Vec<Assignment<'arena>> = raw_words[..split_at]
            .iter()
            .map(|w| {
                let (name, value) = parse_assignment_word(w).unwrap();
                Assignment { name, value }
            })
            .collect();
        let argv = &*self.arena.alloc_slice_copy(&raw_words[split_at..]);
        let assignments = &*self.arena.alloc_slice_fill_iter(assignments);
        let redirs = &*self.arena.alloc_slice_fill_iter(redirs);
        Ok(self.alloc(Node::Command {
            argv,
            redirs,
            assignments,
        }))
    }

    fn parse_redir(&mut self) -> Result<Redir<'arena>, ParseError> {
        let op_index = self.pos;
        let tok = self.bump();
        let kind = match tok.kind {
            TokenKind::RedirIn => RedirKind::Input,
            TokenKind::RedirOut => RedirKind::Output,
            TokenKind::RedirAppend => RedirKind::Append,
            TokenKind::RedirHeredoc | TokenKind::RedirHeredocStrip => RedirKind::Heredoc,
            TokenKind::RedirDupOut => RedirKind::DupOut,
            TokenKind::RedirDupIn => RedirKind::DupIn,
            _ => unreachable!("parse_redir only called on redirection tokens"),
        };
        let fd = if tok.redir_fd >= 0 {
            tok.redir_fd
        } else {
            kind.default_fd()
        };

        if matches!(kind, RedirKind::DupOut | RedirKind::DupIn) {
            return Ok(Redir {
                kind,
                fd,
                target: tok.text.unwrap_or(""),
                heredoc_body: None,
                heredoc_expand: false,
            });
        }

        let target_tok = self.expect(TokenKind::Word)?;
        let target = target_tok.text.unwrap_or("");

        if kind == RedirKind::Heredoc {
            let found = self.heredocs.iter().find(|h| h.op_index == op_index);
            let (body, expand) = found.map(|h| (h.body, h.expand)).unwrap_or(("", true));
            return Ok(Redir {
                kind,
                fd,
                target,
                heredoc_body: Some(body),
                heredoc_expand: expand,
            });
        }

        Ok(Redir {
            kind,
            fd,
            target,
            heredoc_body: None,
            heredoc_expand: false,
        })
    }
}

/// Splits a word shaped like `NAME=VALUE` into its parts, where `NAME` is a
/// valid identifier (letter/underscore then letters/digits/underscores).
/// Returns `None` for anything else, including `=VALUE` (empty name).
fn parse_assignment_word(word: &str) -> Option<(&str, &str)> {
    let eq = word.find('=')?;
    if eq == 0 {
        return None;
    }
    let name = &word[..eq];
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, &word[eq + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use assert_matches::assert_matches;

    fn parse_src(src: &str) -> Result<Option<Node<'static>>, ParseError> {
        // Leaks the arena so the returned AST can have a 'static-ish lifetime
        // for simple test assertions; fine for short-lived test processes.
        let arena: &'static Arena = Box::leak(Box::new(Arena::new()));
        let lexer = Lexer::new(arena);
        let out = lexer.lex(src);
        assert!(out.error.is_none(), "lex error: {:?}", out.error);
        parse(&out.tokens, &out.heredocs, arena).map(|n| n.copied())
    }

    #[test]
    fn empty_input_has_no_ast() {
        assert!(parse_src("").unwrap().is_none());
    }

    #[test]
    fn comment_only_input_has_no_ast() {
        assert!(parse_src("   # just a comment\n").unwrap().is_none());
    }

    #[test]
    fn simple_command_collects_argv_and_redirs() {
        let ast = parse_src("echo hello > out.txt").unwrap().unwrap();
        assert_matches!(ast, Node::Pipeline { commands, negated: false } => {
            assert_eq!(commands.len(), 1);
            assert_matches!(commands[0], Node::Command { argv, redirs, assignments } => {
                assert_eq!(argv, &["echo", "hello"]);
                assert_eq!(redirs.len(), 1);
                assert_eq!(redirs[0].kind, RedirKind::Output);
                assert_eq!(redirs[0].target, "out.txt");
                assert!(assignments.is_empty());
            });
        });
    }

    #[test]
    fn leading_assignments_are_split_from_argv() {
        let ast = parse_src("FOO=bar echo $FOO").unwrap().unwrap();
        assert_matches!(ast, Node::Pipeline { commands, .. } => {
            assert_matches!(commands[0], Node::Command { argv, assignments, .. } => {
                assert_eq!(assignments.len(), 1);
                assert_eq!(assignments[0].name, "FOO");
                assert_eq!(argv[0], "echo");
            });
        });
    }

    #[test]
    fn bare_assignment_has_empty_argv() {
        let ast = parse_src("FOO=bar").unwrap().unwrap();
        assert_matches!(ast, Node::Pipeline { commands, .. } => {
            assert_matches!(commands[0], Node::Command { argv, assignments, .. } => {
                assert!(argv.is_empty());
                assert_eq!(assignments.len(), 1);
            });
        });
    }

    #[test]
    fn and_or_semicolon_fold_left_associatively() {
        let ast = parse_src("true && echo yes || echo no").unwrap().unwrap();
        assert_matches!(ast, Node::Or { left, right: _ } => {
            assert_matches!(left, Node::And { .. });
        });
    }

    #[test]
    fn background_wraps_left_side_only() {
        let ast = parse_src("sleep 5 &").unwrap().unwrap();
        assert_matches!(ast, Node::Background { .. });
    }

    #[test]
    fn pipeline_collects_every_stage() {
        let ast = parse_src("cat nosuch 2>&1 | wc -l").unwrap().unwrap();
        assert_matches!(ast, Node::Pipeline { commands, negated: false } => {
            assert_eq!(commands.len(), 2);
        });
    }

    #[test]
    fn negated_pipeline_sets_flag() {
        let ast = parse_src("! true").unwrap().unwrap();
        assert_matches!(ast, Node::Pipeline { negated: true, .. });
    }

    #[test]
    fn if_elif_else_fi_nests_as_if_chain() {
        let ast = parse_src("if false; then echo a; elif true; then echo b; else echo c; fi")
            .unwrap()
            .unwrap();
        assert_matches!(ast, Node::If { else_branch: Some(Node::If { .. }), .. });
    }

    #[test]
    fn for_loop_without_in_uses_positional_params() {
        let ast = parse_src("for x; do echo $x; done").unwrap().unwrap();
        assert_matches!(ast, Node::For { uses_positional: true, words, .. } => {
            assert!(words.is_empty());
        });
    }

    #[test]
    fn for_loop_with_in_collects_words() {
        let ast = parse_src("for x in a b c; do echo $x; done").unwrap().unwrap();
        assert_matches!(ast, Node::For { words, uses_positional: false, .. } => {
            assert_eq!(words, &["a", "b", "c"]);
        });
    }

    #[test]
    fn function_shorthand_and_keyword_form_both_parse() {
        let a = parse_src("f() { echo hi; }").unwrap().unwrap();
        assert_matches!(a, Node::Function { name: "f", .. });
        let b = parse_src("function g { echo hi; }").unwrap().unwrap();
        assert_matches!(b, Node::Function { name: "g", .. });
    }

    #[test]
    fn subshell_and_block_wrap_their_list() {
        let a = parse_src("(echo a)").unwrap().unwrap();
        assert_matches!(a, Node::Subshell { .. });
        let b = parse_src("{ echo a; }").unwrap().unwrap();
        assert_matches!(b, Node::Block { .. });
    }

    #[test]
    fn unexpected_token_is_a_hard_syntax_error() {
        let err = parse_src("then echo hi").unwrap_err();
        assert!(!err.is_incomplete());
    }

    #[test]
    fn truncated_if_is_an_incomplete_parse() {
        let err = parse_src("if true; then echo hi").unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn heredoc_attaches_body_to_redir() {
        let ast = parse_src("cat <<EOF\nhello\nEOF\n").unwrap().unwrap();
        assert_matches!(ast, Node::Pipeline { commands, .. } => {
            assert_matches!(commands[0], Node::Command { redirs, .. } => {
                assert_eq!(redirs[0].kind, RedirKind::Heredoc);
                assert_eq!(redirs[0].heredoc_body, Some("hello\n"));
            });
        });
    }

    #[test]
    fn return_break_continue_parse_as_dedicated_nodes() {
        assert_matches!(parse_src("return 2").unwrap().unwrap(), Node::Return { status: Some("2") });
        assert_matches!(parse_src("break").unwrap().unwrap(), Node::Break { levels: 1 });
        assert_matches!(parse_src("continue 2").unwrap().unwrap(), Node::Continue { levels: 2 });
    }
}
