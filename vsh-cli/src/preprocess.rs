//! The two text-level passes the driver loop applies before handing a line
//! to the lexer: history-reference expansion and leading-word alias
//! expansion (spec.md §6, SPEC_FULL.md §2's driver-loop ordering).

use std::collections::HashSet;

use vsh_env::{AliasSet, History};

/// Expands a `!!`/`!N`/`!-N`/`!prefix` reference at the start of `line`,
/// leaving the rest of the line untouched. Only one reference is recognized,
/// at position zero — good enough for the interactive case this targets and
/// simpler than scanning the whole line for embedded references.
pub fn expand_history_refs(line: &str, history: &History) -> Result<String, String> {
    if !line.starts_with('!') {
        return Ok(line.to_string());
    }
    let rest = &line[1..];

    if let Some(tail) = rest.strip_prefix('!') {
        let cmd = history
            .last()
            .ok_or_else(|| "!!: event not found".to_string())?;
        return Ok(format!("{cmd}{tail}"));
    }

    if let Some(tail) = rest.strip_prefix('-') {
        let digits: String = tail.chars().take_while(char::is_ascii_digit).collect();
        if !digits.is_empty() {
            let n: usize = digits.parse().unwrap();
            let cmd = history
                .get_relative(n)
                .ok_or_else(|| format!("!-{n}: event not found"))?;
            return Ok(format!("{cmd}{}", &tail[digits.len()..]));
        }
        return Ok(line.to_string());
    }

    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if !digits.is_empty() {
        let n: usize = digits.parse().unwrap();
        let cmd = history
            .get(n)
            .ok_or_else(|| format!("!{n}: event not found"))?;
        return Ok(format!("{cmd}{}", &rest[digits.len()..]));
    }

    let word_end = rest
        .find(|c: char| c.is_whitespace())
        .unwrap_or(rest.len());
    let (prefix, tail) = rest.split_at(word_end);
    if prefix.is_empty() {
        return Ok(line.to_string());
    }
    let cmd = history
        .find_by_prefix(prefix)
        .ok_or_else(|| format!("!{prefix}: event not found"))?;
    Ok(format!("{cmd}{tail}"))
}

/// Repeatedly replaces `line`'s leading word with its alias definition, the
/// way a real shell re-checks the replacement text for further alias names.
/// A `seen` guard (rather than POSIX's trailing-space rule) stops the loop if
/// a chain of aliases ever cycles back to a name already expanded.
pub fn expand_leading_alias(line: &str, aliases: &AliasSet) -> String {
    let mut current = line.to_string();
    let mut seen = HashSet::new();
    loop {
        let trimmed = current.trim_start();
        let lead_len = current.len() - trimmed.len();
        let word_end = trimmed
            .find(|c: char| c.is_whitespace() || "|&;()<>".contains(c))
            .unwrap_or(trimmed.len());
        let word = &trimmed[..word_end];
        if word.is_empty() || !seen.insert(word.to_string()) {
            return current;
        }
        let Some(replacement) = aliases.look_up(word) else {
            return current;
        };
        let rest = trimmed[word_end..].to_string();
        current = format!("{}{replacement}{rest}", &current[..lead_len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bang_bang_repeats_the_last_command() {
        let mut h = History::new();
        h.push("echo hi");
        assert_eq!(expand_history_refs("!!", &h).unwrap(), "echo hi");
    }

    #[test]
    fn bang_n_selects_by_absolute_index() {
        let mut h = History::new();
        h.push("echo a");
        h.push("echo b");
        assert_eq!(expand_history_refs("!1", &h).unwrap(), "echo a");
    }

    #[test]
    fn bang_minus_n_selects_relative_to_the_end() {
        let mut h = History::new();
        h.push("echo a");
        h.push("echo b");
        assert_eq!(expand_history_refs("!-2", &h).unwrap(), "echo a");
    }

    #[test]
    fn bang_prefix_selects_the_most_recent_match() {
        let mut h = History::new();
        h.push("echo a");
        h.push("export X=1");
        assert_eq!(expand_history_refs("!echo", &h).unwrap(), "echo a");
    }

    #[test]
    fn missing_reference_is_an_error() {
        let h = History::new();
        assert!(expand_history_refs("!!", &h).is_err());
    }

    #[test]
    fn line_with_no_leading_bang_passes_through() {
        let h = History::new();
        assert_eq!(expand_history_refs("echo !", &h).unwrap(), "echo !");
    }

    #[test]
    fn leading_alias_is_substituted() {
        let mut aliases = AliasSet::new();
        aliases.define("ll", "ls -l");
        assert_eq!(expand_leading_alias("ll /tmp", &aliases), "ls -l /tmp");
    }

    #[test]
    fn alias_chain_expands_through_multiple_definitions() {
        let mut aliases = AliasSet::new();
        aliases.define("ll", "ls -l");
        aliases.define("ls", "ls --color");
        assert_eq!(expand_leading_alias("ll /tmp", &aliases), "ls --color -l /tmp");
    }

    #[test]
    fn self_referencing_alias_does_not_loop_forever() {
        let mut aliases = AliasSet::new();
        aliases.define("ls", "ls --color");
        assert_eq!(expand_leading_alias("ls /tmp", &aliases), "ls --color /tmp");
    }
}
