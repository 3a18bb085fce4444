//! Alias table consulted by the CLI's alias-expansion pass (SPEC_FULL.md §2).
//! Grounded on the teacher's `yash-env/src/alias.rs` `Glossary`/`AliasSet`
//! shape, trimmed to a plain name-to-replacement map since this crate does
//! not track definition source locations or global-vs-local aliases.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct AliasSet {
    entries: HashMap<String, String>,
}

impl AliasSet {
    pub fn new() -> Self {
        AliasSet::default()
    }

    pub fn define(&mut self, name: impl Into<String>, replacement: impl Into<String>) {
        self.entries.insert(name.into(), replacement.into());
    }

    pub fn look_up(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|s| s.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
