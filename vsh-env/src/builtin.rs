//! Built-in utility registration (spec.md §4.5: "if `argv[0]` is a builtin,
//! invoke it in-process"). Grounded on the teacher's `yash_env::builtin`
//! module, trimmed to a single synchronous function pointer since this
//! crate has no async executor and no special/mandatory/elective
//! distinction (spec.md draws no such line between builtins).
//!
//! Builtins are implemented in `vsh-semantics` and `vsh-cli` (the concrete
//! utilities need expansion/redirection and, for `history`, a history store
//! that lives in the CLI crate) but registered here, next to the [`Env`]
//! whose table holds them, so the executor can look one up with nothing
//! more than the name.

use std::collections::HashMap;

use crate::error::ExitStatus;
use crate::Env;

/// One registered builtin: a name and the function that runs it. `argv`
/// includes the command name itself at index 0, matching `execve`'s
/// convention.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub run: fn(argv: &[String], env: &mut Env) -> ExitStatus,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtin").finish_non_exhaustive()
    }
}

pub type BuiltinRegistry = HashMap<&'static str, Builtin>;
