//! The variable table and the positional/special parameters `vsh-semantics`
//! reads during parameter expansion. Grounded on the teacher's
//! `yash-env/src/variable.rs` (name/value/export/readonly shape), trimmed to
//! a flat string-valued model since spec.md's expansion module (§4.4) has no
//! array or attribute-export-propagation requirements.

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub value: String,
    pub exported: bool,
    pub readonly: bool,
}

impl Variable {
    pub fn new(value: impl Into<String>) -> Self {
        Variable {
            value: value.into(),
            exported: false,
            readonly: false,
        }
    }

    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }
}

/// Error returned when assigning to a `readonly` variable.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{name}: readonly variable")]
pub struct ReadonlyError {
    pub name: String,
}

/// Named variables plus the ambient state (`$?`, `$$`, `$!`, `$0`, positional
/// parameters) that parameter expansion treats as if they were variables.
#[derive(Debug, Default)]
pub struct VariableSet {
    vars: HashMap<String, Variable>,
    pub positional: Vec<String>,
    pub shell_name: String,
}

impl VariableSet {
    pub fn new() -> Self {
        VariableSet::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|v| v.value.as_str())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn is_exported(&self, name: &str) -> bool {
        self.vars.get(name).is_some_and(|v| v.exported)
    }

    /// Assigns `value` to `name`, preserving its existing export/readonly
    /// attributes. Fails if the variable is `readonly`.
    pub fn assign(&mut self, name: &str, value: impl Into<String>) -> Result<(), ReadonlyError> {
        if let Some(existing) = self.vars.get(name) {
            if existing.readonly {
                return Err(ReadonlyError {
                    name: name.to_string(),
                });
            }
        }
        let value = value.into();
        self.vars
            .entry(name.to_string())
            .and_modify(|v| v.value = value.clone())
            .or_insert_with(|| Variable::new(value));
        Ok(())
    }

    pub fn export(&mut self, name: &str) {
        self.vars
            .entry(name.to_string())
            .or_insert_with(|| Variable::new(""))
            .exported = true;
    }

    pub fn unset(&mut self, name: &str) -> Result<(), ReadonlyError> {
        if let Some(existing) = self.vars.get(name) {
            if existing.readonly {
                return Err(ReadonlyError {
                    name: name.to_string(),
                });
            }
        }
        self.vars.remove(name);
        Ok(())
    }

    pub fn mark_readonly(&mut self, name: &str) {
        self.vars
            .entry(name.to_string())
            .or_insert_with(|| Variable::new(""))
            .readonly = true;
    }

    /// Every exported `NAME=value` pair, for building a child process's
    /// environment.
    pub fn exported_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .filter(|(_, v)| v.exported)
            .map(|(k, v)| (k.as_str(), v.value.as_str()))
    }

    /// Resolves one of the special single-character parameters (`?`, `$`,
    /// `!`, `#`, `@`, `*`) or a positional parameter digit. Returns `None`
    /// for anything that is an ordinary named variable instead.
    ///
    /// `!` always resolves empty: background job pids are not tracked as a
    /// parameter, only in the job table.
    pub fn special(&self, name: &str, last_status: i32, pid: i32) -> Option<String> {
        match name {
            "?" => Some(last_status.to_string()),
            "$" => Some(pid.to_string()),
            "!" => Some(String::new()),
            "#" => Some(self.positional.len().to_string()),
            "0" => Some(self.shell_name.clone()),
            "@" | "*" => Some(self.positional.join(" ")),
            _ if name.len() == 1 && name.chars().next().unwrap().is_ascii_digit() => {
                let n: usize = name.parse().ok()?;
                self.positional.get(n.wrapping_sub(1)).cloned()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_then_get_round_trips() {
        let mut vars = VariableSet::new();
        vars.assign("FOO", "bar").unwrap();
        assert_eq!(vars.get("FOO"), Some("bar"));
    }

    #[test]
    fn readonly_rejects_reassignment() {
        let mut vars = VariableSet::new();
        vars.assign("FOO", "bar").unwrap();
        vars.mark_readonly("FOO");
        assert!(vars.assign("FOO", "baz").is_err());
        assert_eq!(vars.get("FOO"), Some("bar"));
    }

    #[test]
    fn exported_pairs_only_include_exported_vars() {
        let mut vars = VariableSet::new();
        vars.assign("FOO", "1").unwrap();
        vars.assign("BAR", "2").unwrap();
        vars.export("BAR");
        let pairs: Vec<_> = vars.exported_pairs().collect();
        assert_eq!(pairs, vec![("BAR", "2")]);
    }

    #[test]
    fn special_parameters_resolve_without_touching_the_variable_table() {
        let mut vars = VariableSet::new();
        vars.positional = vec!["a".into(), "b".into()];
        assert_eq!(vars.special("#", 0, 100), Some("2".to_string()));
        assert_eq!(vars.special("1", 0, 100), Some("a".to_string()));
        assert_eq!(vars.special("?", 7, 100), Some("7".to_string()));
    }

    #[test]
    fn bang_parameter_is_always_empty() {
        let vars = VariableSet::new();
        assert_eq!(vars.special("!", 0, 100), Some(String::new()));
    }
}
