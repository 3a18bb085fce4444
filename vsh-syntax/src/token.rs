//! Token kinds produced by the lexer.

/// The kind of a single token. Mirrors the reserved-word and operator set of
/// the shell grammar (`parser.rs`); kept as one flat enum rather than a
/// hierarchy of sub-kinds because nothing downstream needs the subtyping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Word,

    Pipe,
    And,
    Or,
    Semi,
    Amp,

    LParen,
    RParen,
    LBrace,
    RBrace,

    RedirIn,
    RedirOut,
    RedirAppend,
    RedirHeredoc,
    RedirHeredocStrip,
    /// `N>&WORD` — spec.md's single REDIR_DUP kind split into an in/out pair
    /// so the parser does not need to remember which operator character
    /// produced it; see DESIGN.md.
    RedirDupOut,
    RedirDupIn,

    If,
    Then,
    Elif,
    Else,
    Fi,
    While,
    For,
    Do,
    Done,
    In,
    Function,
    Return,
    Local,
    Break,
    Continue,

    Bang,

    Newline,
    Eof,
}

impl TokenKind {
    /// Reserved words recognized once a WORD token has been assembled.
    /// Keyword recognition is unconditional: the lexer does not track
    /// grammar position, so e.g. `echo if` lexes `if` as the `If` keyword.
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        Some(match s {
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "fi" => TokenKind::Fi,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "do" => TokenKind::Do,
            "done" => TokenKind::Done,
            "in" => TokenKind::In,
            "function" => TokenKind::Function,
            "return" => TokenKind::Return,
            "local" => TokenKind::Local,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            _ => return None,
        })
    }
}

/// No explicit file descriptor was written before a redirection operator.
pub const NO_REDIR_FD: i32 = -1;

/// A single lexical token. `text` is only populated for `Word` and
/// `RedirDup` (where it holds the fd-or-word operand after `N>&`/`N<&`);
/// every other kind carries its meaning entirely in `kind`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: Option<&'a str>,
    pub redir_fd: i32,
    pub line: u32,
    pub col: u32,
    /// True if any part of a `Word` token's text came from inside a quote.
    /// Used only to decide whether a heredoc delimiter suppresses expansion
    /// of its body (a supplement beyond spec.md's Token fields; see
    /// DESIGN.md).
    pub quoted: bool,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, line: u32, col: u32) -> Self {
        Token {
            kind,
            text: None,
            redir_fd: NO_REDIR_FD,
            line,
            col,
            quoted: false,
        }
    }

    pub fn with_text(mut self, text: &'a str) -> Self {
        self.text = Some(text);
        self
    }

    pub fn with_redir_fd(mut self, fd: i32) -> Self {
        self.redir_fd = fd;
        self
    }

    pub fn with_quoted(mut self, quoted: bool) -> Self {
        self.quoted = quoted;
        self
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}
