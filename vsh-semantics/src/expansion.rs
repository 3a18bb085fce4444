//! Word expansion: parameter substitution, then tilde expansion, then
//! pathname (glob) expansion, in that fixed order (spec.md §4.4). Quote
//! removal — stripping the lexer's `CTLESC` protection marker — happens as
//! the last step of whichever stage produces the final field, since only
//! then do we know whether a word matched a glob pattern or fell through to
//! its literal text.
//!
//! Grounded on the teacher's `yash-semantics/src/expansion` module split
//! (`param.rs`, `glob.rs`, `quote_removal.rs` as separate passes over a
//! word), collapsed into one file here because this crate has no text/word
//! intermediate representation — it expands straight from the lexer's
//! `CTLESC`-marked `&str`.

use std::iter::Peekable;
use std::str::Chars;

use vsh_env::Env;
use vsh_syntax::CTLESC;

#[derive(Debug, thiserror::Error)]
pub enum ExpandError {
    #[error("{name}: parameter not set{}", .message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    ParameterRequired { name: String, message: Option<String> },
    #[error("{0}: readonly variable")]
    Readonly(String),
}

/// Expands one lexer-produced word into zero or more fields. Zero or more
/// than one field only happens when pathname expansion matches zero or
/// several files; every other word expands to exactly one field.
pub fn expand_word(word: &str, env: &mut Env) -> Result<Vec<String>, ExpandError> {
    let after_params = expand_parameters(word, env)?;
    let after_tilde = expand_tilde(&after_params, env);
    Ok(expand_glob(&after_tilde))
}

/// Expands `words` and concatenates every word's fields into one argv.
pub fn expand_argv(words: &[&str], env: &mut Env) -> Result<Vec<String>, ExpandError> {
    let mut out = Vec::new();
    for word in words {
        out.extend(expand_word(word, env)?);
    }
    Ok(out)
}

/// Expands a word that must produce exactly one field (a redirection target,
/// an assignment value): pathname expansion still runs, but only the first
/// match (or the literal word, if none matched) is kept.
pub fn expand_single(word: &str, env: &mut Env) -> Result<String, ExpandError> {
    Ok(expand_word(word, env)?.into_iter().next().unwrap_or_default())
}

/// Expands only parameter references, for contexts that must not glob or
/// tilde-expand — an unquoted heredoc body is the one place in the grammar
/// that gets parameter expansion without the other two stages (§4.7).
pub fn expand_parameters_only(word: &str, env: &mut Env) -> Result<String, ExpandError> {
    expand_parameters(word, env)
}

fn expand_parameters(word: &str, env: &mut Env) -> Result<String, ExpandError> {
    let mut out = String::new();
    let mut chars = word.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            CTLESC => {
                out.push(CTLESC);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '$' => out.push_str(&expand_dollar(&mut chars, env)?),
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn expand_dollar(chars: &mut Peekable<Chars<'_>>, env: &mut Env) -> Result<String, ExpandError> {
    match chars.peek().copied() {
        Some('{') => {
            chars.next();
            let mut inner = String::new();
            let mut depth = 1;
            for c in chars.by_ref() {
                if c == '{' {
                    depth += 1;
                } else if c == '}' {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                inner.push(c);
            }
            expand_braced(&inner, env)
        }
        Some(c) if matches!(c, '?' | '$' | '!' | '#' | '@' | '*') => {
            chars.next();
            Ok(env.lookup_parameter(&c.to_string()).unwrap_or_default())
        }
        Some(c) if c.is_ascii_digit() => {
            chars.next();
            Ok(env.lookup_parameter(&c.to_string()).unwrap_or_default())
        }
        Some(c) if c.is_alphabetic() || c == '_' => {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            Ok(env.lookup_parameter(&name).unwrap_or_default())
        }
        _ => Ok("$".to_string()),
    }
}

/// Splits `${...}` content on the first `:-`, `:=`, `:+`, or `:?` operator
/// and applies it; falls back to a bare `${NAME}` lookup otherwise. Does not
/// handle an operator name that itself contains `:-`/`:=`/`:+`/`:?` — a
/// known simplification over POSIX's full parameter-expansion grammar.
fn expand_braced(inner: &str, env: &mut Env) -> Result<String, ExpandError> {
    for op in [":-", ":=", ":+", ":?"] {
        if let Some(idx) = inner.find(op) {
            let name = &inner[..idx];
            let word = &inner[idx + op.len()..];
            let current = env.lookup_parameter(name);
            let is_set_and_nonempty = current.as_deref().is_some_and(|v| !v.is_empty());
            return match op {
                ":-" => {
                    if is_set_and_nonempty {
                        Ok(current.unwrap())
                    } else {
                        expand_parameters(word, env)
                    }
                }
                ":=" => {
                    if is_set_and_nonempty {
                        Ok(current.unwrap())
                    } else {
                        let value = expand_parameters(word, env)?;
                        env.variables
                            .assign(name, value.clone())
                            .map_err(|e| ExpandError::Readonly(e.name))?;
                        Ok(value)
                    }
                }
                ":+" => {
                    if is_set_and_nonempty {
                        expand_parameters(word, env)
                    } else {
                        Ok(String::new())
                    }
                }
                ":?" => {
                    if is_set_and_nonempty {
                        Ok(current.unwrap())
                    } else {
                        let message = expand_parameters(word, env)?;
                        Err(ExpandError::ParameterRequired {
                            name: name.to_string(),
                            message: (!message.is_empty()).then_some(message),
                        })
                    }
                }
                _ => unreachable!(),
            };
        }
    }
    Ok(env.lookup_parameter(inner).unwrap_or_default())
}

/// Expands a leading, unquoted `~`, `~+`, `~-`, or `~user` into a home
/// directory. A lookup failure (no such user, `$HOME` unset) leaves the
/// tilde prefix untouched, matching real shells.
fn expand_tilde(word: &str, env: &Env) -> String {
    if !word.starts_with('~') {
        return word.to_string();
    }
    let rest = &word[1..];
    let end = rest.find('/').unwrap_or(rest.len());
    let (tag, suffix) = rest.split_at(end);

    let replacement = match tag {
        "" => env.lookup_parameter("HOME"),
        "+" => env.lookup_parameter("PWD"),
        "-" => env.lookup_parameter("OLDPWD"),
        user => nix::unistd::User::from_name(user)
            .ok()
            .flatten()
            .map(|u| u.dir.to_string_lossy().into_owned()),
    };

    match replacement {
        Some(home) => format!("{home}{suffix}"),
        None => word.to_string(),
    }
}

fn has_unprotected_glob_chars(word: &str) -> bool {
    let mut chars = word.chars();
    while let Some(c) = chars.next() {
        if c == CTLESC {
            chars.next();
            continue;
        }
        if matches!(c, '*' | '?' | '[') {
            return true;
        }
    }
    false
}

/// Rewrites `word` into a pattern the `glob` crate can match literally for
/// any `CTLESC`-protected metacharacter, by wrapping it in a single-element
/// character class (`[*]`, `[?]`, `[[]`) — the one escaping mechanism the
/// crate's pattern syntax supports.
fn to_glob_pattern(word: &str) -> String {
    let mut out = String::new();
    let mut chars = word.chars();
    while let Some(c) = chars.next() {
        if c == CTLESC {
            if let Some(next) = chars.next() {
                match next {
                    '*' | '?' => {
                        out.push('[');
                        out.push(next);
                        out.push(']');
                    }
                    '[' => out.push_str("[[]"),
                    other => out.push(other),
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

fn quote_removal(word: &str) -> String {
    let mut out = String::new();
    let mut chars = word.chars();
    while let Some(c) = chars.next() {
        if c == CTLESC {
            if let Some(next) = chars.next() {
                out.push(next);
            }
            continue;
        }
        out.push(c);
    }
    out
}

fn expand_glob(word: &str) -> Vec<String> {
    if !has_unprotected_glob_chars(word) {
        return vec![quote_removal(word)];
    }
    let pattern = to_glob_pattern(word);
    let matches: Vec<String> = match glob::glob(&pattern) {
        Ok(paths) => paths
            .filter_map(Result::ok)
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    if matches.is_empty() {
        vec![quote_removal(word)]
    } else {
        matches
    }
}
