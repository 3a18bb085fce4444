//! Lexer, parser, and AST for the shell command language: raw input text in,
//! an arena-allocated [`ast::Node`] tree out.
//!
//! The three stages are deliberately kept as separate modules that share
//! nothing but the arena and the token list, mirroring how a hand-written
//! recursive-descent front end is usually laid out: [`lexer`] turns text into
//! a flat `Vec<Token>` (plus any heredoc bodies it collected along the way),
//! and [`parser`] turns that token list into a tree. Callers normally only
//! need [`lex_and_parse`].

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{deep_copy, render, Assignment, Node, Redir, RedirKind};
pub use error::{ParseError, ParseErrorKind};
pub use lexer::{HeredocResult, LexError, LexErrorKind, LexOutput, Lexer, CTLESC};
pub use token::{Token, TokenKind};

use vsh_arena::Arena;

/// The outcome of a full lex-then-parse pass over one chunk of source text.
#[derive(Debug)]
pub enum FrontEndError {
    Lex(LexError),
    Parse(ParseError),
}

impl FrontEndError {
    /// True when the driver should read another line and retry the whole
    /// buffer rather than report a syntax error (see SPEC_FULL.md's
    /// interactive continuation-prompt behavior).
    pub fn is_incomplete(&self) -> bool {
        match self {
            FrontEndError::Lex(e) => e.is_incomplete(),
            FrontEndError::Parse(e) => e.is_incomplete(),
        }
    }
}

impl std::fmt::Display for FrontEndError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrontEndError::Lex(e) => write!(f, "{}:{}: {}", e.line, e.col, e.message),
            FrontEndError::Parse(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for FrontEndError {}

/// Lexes and parses `src` in one call, allocating into `arena`. Returns
/// `Ok(None)` for input that contains no command (blank lines, comments).
pub fn lex_and_parse<'arena>(
    src: &str,
    arena: &'arena Arena,
) -> Result<Option<&'arena Node<'arena>>, FrontEndError> {
    let out = Lexer::new(arena).lex(src);
    if let Some(e) = out.error {
        return Err(FrontEndError::Lex(e));
    }
    parser::parse(&out.tokens, &out.heredocs, arena).map_err(FrontEndError::Parse)
}
