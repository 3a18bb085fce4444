//! Raw input → token list.
//!
//! The lexer is a manual character-class state machine; it never interprets
//! `$...` references, it only decides which bytes of a word are "protected"
//! from later expansion. Protection is recorded with a private marker byte,
//! `CTLESC` (0x01), borrowed from the same trick real shells use internally
//! (bash calls its version `CTLESC`): a quoted or backslash-escaped
//! character is stored as `CTLESC` followed by the literal byte, so
//! parameter/tilde/glob expansion in `vsh-semantics` can tell a quoted `$` or
//! `*` from a bare one without carrying a separate side-channel. The marker
//! is stripped as the very last step of expansion (quote removal).

use vsh_arena::Arena;

use crate::token::{Token, TokenKind};

/// Marks the following byte as literal/protected from `$`, glob, and tilde
/// interpretation. Never appears in real shell input.
pub const CTLESC: char = '\u{1}';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedSingleQuote,
    UnterminatedDoubleQuote,
    UnterminatedHeredoc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub message: String,
    pub line: u32,
    pub col: u32,
}

impl LexError {
    /// True for errors that mean "the command is not finished yet" — an
    /// interactive driver should prompt for a continuation line and retry
    /// rather than reporting a hard syntax error.
    pub fn is_incomplete(&self) -> bool {
        true
    }
}

const WORD_TERMINATORS: &[char] = &['|', '&', ';', '>', '<', '(', ')', '{', '}', '#'];

fn is_word_terminator(c: char) -> bool {
    c.is_whitespace() || WORD_TERMINATORS.contains(&c)
}

struct Chars<'a> {
    rest: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    col: u32,
}

impl<'a> Chars<'a> {
    fn new(src: &'a str) -> Self {
        Chars {
            rest: src.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.rest.peek().copied()
    }

    fn peek2(&mut self) -> Option<char> {
        let mut clone = self.rest.clone();
        clone.next();
        clone.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.rest.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn pos(&self) -> (u32, u32) {
        (self.line, self.col)
    }
}

pub struct Lexer<'arena> {
    arena: &'arena Arena,
}

/// Heredoc body collected for the `RedirHeredoc`/`RedirHeredocStrip` token
/// at `op_index` in the returned token list. `expand` is false when the
/// delimiter word was quoted (`<<"EOF"`), meaning the body is copied to the
/// child verbatim rather than parameter/tilde/glob expanded.
pub struct HeredocResult<'arena> {
    pub op_index: usize,
    pub body: &'arena str,
    pub expand: bool,
}

pub struct LexOutput<'arena> {
    pub tokens: Vec<Token<'arena>>,
    pub error: Option<LexError>,
    pub heredocs: Vec<HeredocResult<'arena>>,
}

struct PendingHeredoc {
    op_index: usize,
    strip: bool,
    delimiter: Option<(String, bool)>,
}

impl<'arena> Lexer<'arena> {
    pub fn new(arena: &'arena Arena) -> Self {
        Lexer { arena }
    }

    /// Lexes `src` to completion. Per the invariant that every token list
    /// ends in `Eof`, this always appends an `Eof` token, even when an error
    /// truncates the scan.
    pub fn lex(&self, src: &str) -> LexOutput<'arena> {
        let mut chars = Chars::new(src);
        let mut tokens = Vec::new();
        let mut error = None;
        let mut pending_heredocs: Vec<PendingHeredoc> = Vec::new();
        let mut expecting_delim: Option<usize> = None;
        let mut heredocs = Vec::new();

        'outer: loop {
            // Skip inter-token horizontal whitespace (newlines are tokens).
            while matches!(chars.peek(), Some(c) if c != '\n' && c.is_whitespace()) {
                chars.bump();
            }

            let (line, col) = chars.pos();
            let Some(c) = chars.peek() else {
                tokens.push(Token::new(TokenKind::Eof, line, col));
                if let Err(e) =
                    self.drain_heredocs(&mut chars, &mut pending_heredocs, &mut heredocs)
                {
                    error = Some(e);
                }
                break;
            };

            if c == '\n' {
                chars.bump();
                tokens.push(Token::new(TokenKind::Newline, line, col));
                if let Err(e) =
                    self.drain_heredocs(&mut chars, &mut pending_heredocs, &mut heredocs)
                {
                    error = Some(e);
                    break 'outer;
                }
                continue;
            }

            if c == '#' {
                while matches!(chars.peek(), Some(c) if c != '\n') {
                    chars.bump();
                }
                continue;
            }

            // Fd-prefixed redirection: a single digit immediately followed
            // by `<` or `>`.
            if c.is_ascii_digit() {
                if let Some(next) = chars.peek2() {
                    if next == '<' || next == '>' {
                        chars.bump(); // the digit
                        let fd = c.to_digit(10).unwrap() as i32;
                        match self.lex_redir_operator(&mut chars, line, col) {
                            Ok(tok) => {
                                let tok = tok.with_redir_fd(fd);
                                if let Some(idx) =
                                    register_heredoc_op(&tok, tokens.len(), &mut pending_heredocs)
                                {
                                    expecting_delim = Some(idx);
                                }
                                tokens.push(tok);
                                continue;
                            }
                            Err(e) => {
                                error = Some(e);
                                break 'outer;
                            }
                        }
                    }
                }
            }

            match c {
                '|' | '&' | ';' | '(' | ')' | '{' | '}' => {
                    tokens.push(self.lex_operator(&mut chars, line, col));
                }
                '<' | '>' => match self.lex_redir_operator(&mut chars, line, col) {
                    Ok(tok) => {
                        if let Some(idx) =
                            register_heredoc_op(&tok, tokens.len(), &mut pending_heredocs)
                        {
                            expecting_delim = Some(idx);
                        }
                        tokens.push(tok);
                    }
                    Err(e) => {
                        error = Some(e);
                        break 'outer;
                    }
                },
                _ => match self.lex_word(&mut chars, line, col) {
                    Ok(tok) => {
                        if tok.kind == TokenKind::Word {
                            if let Some(idx) = expecting_delim.take() {
                                pending_heredocs[idx].delimiter =
                                    Some((tok.text.unwrap_or("").to_string(), tok.quoted));
                            }
                        }
                        tokens.push(tok);
                    }
                    Err(e) => {
                        error = Some(e);
                        break 'outer;
                    }
                },
            }
        }

        if error.is_some() && tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, col) = chars.pos();
            tokens.push(Token::new(TokenKind::Eof, line, col));
        }

        LexOutput {
            tokens,
            error,
            heredocs,
        }
    }

    /// Collects the body of every heredoc whose delimiter has been lexed but
    /// whose body has not yet been read, consuming raw lines directly from
    /// `chars` (bypassing normal tokenization, since heredoc bodies are not
    /// shell syntax).
    fn drain_heredocs(
        &self,
        chars: &mut Chars<'_>,
        pending: &mut Vec<PendingHeredoc>,
        out: &mut Vec<HeredocResult<'arena>>,
    ) -> Result<(), LexError> {
        for doc in pending.drain(..) {
            let Some((delimiter, quoted)) = doc.delimiter else {
                continue;
            };
            let (line, col) = chars.pos();
            let mut body = String::new();
            loop {
                let mut raw_line = String::new();
                let mut saw_any = false;
                loop {
                    match chars.peek() {
                        None => break,
                        Some('\n') => {
                            chars.bump();
                            saw_any = true;
                            break;
                        }
                        Some(c) => {
                            chars.bump();
                            raw_line.push(c);
                            saw_any = true;
                        }
                    }
                }
                if !saw_any && raw_line.is_empty() {
                    return Err(LexError {
                        kind: LexErrorKind::UnterminatedHeredoc,
                        message: format!("unterminated heredoc (expected `{delimiter}`)"),
                        line,
                        col,
                    });
                }
                let compare = if doc.strip {
                    raw_line.trim_start_matches('\t')
                } else {
                    raw_line.as_str()
                };
                if compare == delimiter {
                    break;
                }
                if doc.strip {
                    body.push_str(raw_line.trim_start_matches('\t'));
                } else {
                    body.push_str(&raw_line);
                }
                body.push('\n');
                if chars.peek().is_none() {
                    return Err(LexError {
                        kind: LexErrorKind::UnterminatedHeredoc,
                        message: format!("unterminated heredoc (expected `{delimiter}`)"),
                        line,
                        col,
                    });
                }
            }
            out.push(HeredocResult {
                op_index: doc.op_index,
                body: self.arena.alloc_str(&body),
                expand: !quoted,
            });
        }
        Ok(())
    }

    fn lex_operator(&self, chars: &mut Chars<'_>, line: u32, col: u32) -> Token<'arena> {
        let c = chars.bump().unwrap();
        let kind = match c {
            '|' => {
                if chars.peek() == Some('|') {
                    chars.bump();
                    TokenKind::Or
                } else {
                    TokenKind::Pipe
                }
            }
            '&' => {
                if chars.peek() == Some('&') {
                    chars.bump();
                    TokenKind::And
                } else {
                    TokenKind::Amp
                }
            }
            ';' => TokenKind::Semi,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            _ => unreachable!("lex_operator only called on |&;(){{}}"),
        };
        Token::new(kind, line, col)
    }

    /// Lexes `<`, `<<`, `<<-`, `<&WORD`, `>`, `>>`, `>&WORD`. Two-character
    /// operators are tested before their one-character prefixes, as required
    /// by spec.
    fn lex_redir_operator(
        &self,
        chars: &mut Chars<'_>,
        line: u32,
        col: u32,
    ) -> Result<Token<'arena>, LexError> {
        let c = chars.bump().unwrap();
        if c == '<' {
            if chars.peek() == Some('<') {
                chars.bump();
                if chars.peek() == Some('-') {
                    chars.bump();
                    return Ok(Token::new(TokenKind::RedirHeredocStrip, line, col));
                }
                return Ok(Token::new(TokenKind::RedirHeredoc, line, col));
            }
            if chars.peek() == Some('&') {
                chars.bump();
                let word = self.lex_dup_operand(chars);
                return Ok(Token::new(TokenKind::RedirDupIn, line, col).with_text(word));
            }
            return Ok(Token::new(TokenKind::RedirIn, line, col));
        }
        // c == '>'
        if chars.peek() == Some('>') {
            chars.bump();
            return Ok(Token::new(TokenKind::RedirAppend, line, col));
        }
        if chars.peek() == Some('&') {
            chars.bump();
            let word = self.lex_dup_operand(chars);
            return Ok(Token::new(TokenKind::RedirDupOut, line, col).with_text(word));
        }
        Ok(Token::new(TokenKind::RedirOut, line, col))
    }

    /// Scans the WORD that follows `N>&`/`N<&` up to any shell-significant
    /// character (word terminator), without keyword promotion.
    fn lex_dup_operand(&self, chars: &mut Chars<'_>) -> &'arena str {
        let mut buf = String::new();
        while let Some(c) = chars.peek() {
            if is_word_terminator(c) {
                break;
            }
            buf.push(chars.bump().unwrap());
        }
        self.arena.alloc_str(&buf)
    }

    fn lex_word(
        &self,
        chars: &mut Chars<'_>,
        line: u32,
        col: u32,
    ) -> Result<Token<'arena>, LexError> {
        let mut buf = String::new();
        let mut quoted = false;
        loop {
            let Some(c) = chars.peek() else { break };
            if is_word_terminator(c) {
                break;
            }
            match c {
                '\'' => {
                    self.lex_single_quoted(chars, &mut buf)?;
                    quoted = true;
                }
                '"' => {
                    self.lex_double_quoted(chars, &mut buf)?;
                    quoted = true;
                }
                '\\' => self.lex_backslash_unquoted(chars, &mut buf),
                _ => buf.push(chars.bump().unwrap()),
            }
        }

        let text = self.arena.alloc_str(&buf);
        if text == "!" {
            return Ok(Token::new(TokenKind::Bang, line, col));
        }
        if let Some(kw) = TokenKind::keyword_from_str(&buf) {
            return Ok(Token::new(kw, line, col).with_text(text));
        }
        Ok(Token::new(TokenKind::Word, line, col)
            .with_text(text)
            .with_quoted(quoted))
    }

    fn lex_backslash_unquoted(&self, chars: &mut Chars<'_>, buf: &mut String) {
        chars.bump(); // consume '\'
        match chars.peek() {
            None => {
                // Boundary behavior: a single trailing backslash is kept.
                buf.push('\\');
            }
            Some('\n') => {
                chars.bump();
            }
            Some(other) => {
                chars.bump();
                buf.push(CTLESC);
                buf.push(other);
            }
        }
    }

    fn lex_single_quoted(&self, chars: &mut Chars<'_>, buf: &mut String) -> Result<(), LexError> {
        let (line, col) = chars.pos();
        chars.bump(); // opening '
        loop {
            match chars.bump() {
                None => {
                    return Err(LexError {
                        kind: LexErrorKind::UnterminatedSingleQuote,
                        message: "unterminated single-quoted string".to_string(),
                        line,
                        col,
                    })
                }
                Some('\'') => return Ok(()),
                Some(c) => push_protected_if_magic(buf, c),
            }
        }
    }

    fn lex_double_quoted(&self, chars: &mut Chars<'_>, buf: &mut String) -> Result<(), LexError> {
        let (line, col) = chars.pos();
        chars.bump(); // opening "
        loop {
            match chars.bump() {
                None => {
                    return Err(LexError {
                        kind: LexErrorKind::UnterminatedDoubleQuote,
                        message: "unterminated double-quoted string".to_string(),
                        line,
                        col,
                    })
                }
                Some('"') => return Ok(()),
                Some('\\') => match chars.peek() {
                    Some('$') | Some('`') | Some('"') | Some('\\') => {
                        let esc = chars.bump().unwrap();
                        buf.push(CTLESC);
                        buf.push(esc);
                    }
                    Some('\n') => {
                        chars.bump();
                    }
                    Some(other) => {
                        chars.bump();
                        buf.push('\\');
                        buf.push(other);
                    }
                    None => {
                        return Err(LexError {
                            kind: LexErrorKind::UnterminatedDoubleQuote,
                            message: "unterminated double-quoted string".to_string(),
                            line,
                            col,
                        })
                    }
                },
                Some(c) => push_protected_if_magic(buf, c),
            }
        }
    }
}

/// If `tok` opens a heredoc, records it as pending and returns its index in
/// `pending`.
fn register_heredoc_op(
    tok: &Token<'_>,
    op_index: usize,
    pending: &mut Vec<PendingHeredoc>,
) -> Option<usize> {
    if matches!(
        tok.kind,
        TokenKind::RedirHeredoc | TokenKind::RedirHeredocStrip
    ) {
        pending.push(PendingHeredoc {
            op_index,
            strip: tok.kind == TokenKind::RedirHeredocStrip,
            delimiter: None,
        });
        Some(pending.len() - 1)
    } else {
        None
    }
}

/// Escapes `c` with `CTLESC` if it is one of the characters that later
/// expansion stages treat as magic (`$`, glob metacharacters, `~`, or a
/// literal backslash); otherwise copies it unchanged. Used for quoted
/// content, which must survive expansion untouched.
fn push_protected_if_magic(buf: &mut String, c: char) {
    if matches!(c, '$' | '*' | '?' | '[' | '~' | '\\' | CTLESC) {
        buf.push(CTLESC);
    }
    buf.push(c);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> (Vec<TokenKind>, Vec<Option<String>>) {
        let arena = Arena::new();
        let lexer = Lexer::new(&arena);
        let out = lexer.lex(src);
        assert!(out.error.is_none(), "unexpected lex error: {:?}", out.error);
        let kinds = out.tokens.iter().map(|t| t.kind).collect();
        let texts = out
            .tokens
            .iter()
            .map(|t| t.text.map(|s| s.to_string()))
            .collect();
        (kinds, texts)
    }

    #[test]
    fn every_token_list_ends_in_eof() {
        let (kinds, _) = lex("echo hi");
        assert_eq!(*kinds.last().unwrap(), TokenKind::Eof);
    }

    #[test]
    fn empty_input_is_eof_only() {
        let (kinds, _) = lex("");
        assert_eq!(kinds, vec![TokenKind::Eof]);
    }

    #[test]
    fn comment_only_line_keeps_newline_drops_hash() {
        let (kinds, _) = lex("# a comment\n");
        assert_eq!(kinds, vec![TokenKind::Newline, TokenKind::Eof]);
    }

    #[test]
    fn single_quote_round_trips_literally() {
        let arena = Arena::new();
        let lexer = Lexer::new(&arena);
        let out = lexer.lex("'hello world'");
        assert!(out.error.is_none());
        assert_eq!(out.tokens[0].kind, TokenKind::Word);
        assert_eq!(out.tokens[0].text, Some("hello world"));
    }

    #[test]
    fn unterminated_single_quote_is_lex_error() {
        let arena = Arena::new();
        let lexer = Lexer::new(&arena);
        let out = lexer.lex("'abc");
        assert_eq!(
            out.error.unwrap().kind,
            LexErrorKind::UnterminatedSingleQuote
        );
        assert_eq!(out.tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn trailing_backslash_is_kept_literal() {
        let arena = Arena::new();
        let lexer = Lexer::new(&arena);
        let out = lexer.lex("foo\\");
        assert!(out.error.is_none());
        assert_eq!(out.tokens[0].text, Some("foo\\"));
    }

    #[test]
    fn two_char_operators_win_over_prefixes() {
        let (kinds, _) = lex("a && b || c");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word,
                TokenKind::And,
                TokenKind::Word,
                TokenKind::Or,
                TokenKind::Word,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn fd_prefixed_redirection_sets_redir_fd() {
        let arena = Arena::new();
        let lexer = Lexer::new(&arena);
        let out = lexer.lex("2>&1");
        assert!(out.error.is_none());
        assert_eq!(out.tokens[0].kind, TokenKind::RedirDupOut);
        assert_eq!(out.tokens[0].redir_fd, 2);
        assert_eq!(out.tokens[0].text, Some("1"));
    }

    #[test]
    fn bare_digit_word_is_not_a_redirection() {
        let (kinds, texts) = lex("123 abc");
        assert_eq!(kinds, vec![TokenKind::Word, TokenKind::Word, TokenKind::Eof]);
        assert_eq!(texts[0], Some("123".to_string()));
    }

    #[test]
    fn keyword_recognition_is_unconditional() {
        let (kinds, _) = lex("if");
        assert_eq!(kinds, vec![TokenKind::If, TokenKind::Eof]);
    }

    #[test]
    fn bang_promotes_to_prefix_token() {
        let (kinds, _) = lex("! true");
        assert_eq!(
            kinds,
            vec![TokenKind::Bang, TokenKind::Word, TokenKind::Eof]
        );
    }

    #[test]
    fn heredoc_operators_are_recognized() {
        let (kinds, _) = lex("cat <<EOF\nbody\nEOF\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word,
                TokenKind::RedirHeredoc,
                TokenKind::Word,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
        let (kinds, _) = lex("cat <<-EOF\nbody\nEOF\n");
        assert_eq!(kinds[1], TokenKind::RedirHeredocStrip);
    }

    #[test]
    fn heredoc_body_is_collected_up_to_delimiter() {
        let arena = Arena::new();
        let lexer = Lexer::new(&arena);
        let out = lexer.lex("cat <<EOF\nhello\nworld\nEOF\n");
        assert!(out.error.is_none());
        assert_eq!(out.heredocs.len(), 1);
        assert_eq!(out.heredocs[0].body, "hello\nworld\n");
        assert!(out.heredocs[0].expand);
    }

    #[test]
    fn heredoc_strip_removes_leading_tabs() {
        let arena = Arena::new();
        let lexer = Lexer::new(&arena);
        let out = lexer.lex("cat <<-EOF\n\t\thello\n\tEOF\n");
        assert!(out.error.is_none());
        assert_eq!(out.heredocs[0].body, "hello\n");
    }

    #[test]
    fn quoted_heredoc_delimiter_suppresses_expansion() {
        let arena = Arena::new();
        let lexer = Lexer::new(&arena);
        let out = lexer.lex("cat <<'EOF'\n$HOME\nEOF\n");
        assert!(out.error.is_none());
        assert!(!out.heredocs[0].expand);
    }

    #[test]
    fn unterminated_heredoc_is_a_soft_error() {
        let arena = Arena::new();
        let lexer = Lexer::new(&arena);
        let out = lexer.lex("cat <<EOF\nmissing the terminator\n");
        let err = out.error.unwrap();
        assert_eq!(err.kind, LexErrorKind::UnterminatedHeredoc);
        assert!(err.is_incomplete());
    }

    #[test]
    fn hash_terminates_a_word_mid_stream() {
        let (kinds, texts) = lex("foo#bar\n");
        assert_eq!(
            kinds,
            vec![TokenKind::Word, TokenKind::Newline, TokenKind::Eof]
        );
        assert_eq!(texts[0], Some("foo".to_string()));
    }
}
