//! The shell's execution environment: variable table, job table, alias
//! table, function table, and the `System` boundary that separates all of it
//! from the real kernel. Grounded on the teacher's `yash-env` crate, which
//! plays the same role (`Env` bundling `variable`, `job`, `alias`, `system`)
//! though built around an async executor this crate does not need.

pub mod alias;
pub mod builtin;
pub mod error;
pub mod function;
pub mod history;
pub mod job;
pub mod system;
pub mod virtual_system;
pub mod variable;

pub use alias::AliasSet;
pub use builtin::{Builtin, BuiltinRegistry};
pub use error::{EnvError, ExitStatus, Result};
pub use function::FunctionTable;
pub use history::History;
pub use job::{Job, JobSet, JobState};
pub use system::{RealSystem, System};
pub use variable::VariableSet;
pub use virtual_system::VirtualSystem;

use std::ffi::CString;

use nix::unistd::Pid;

/// Everything an executor needs to run a command: the syscall boundary plus
/// every piece of shell-level state a command can read or mutate.
pub struct Env {
    pub system: Box<dyn System>,
    pub variables: VariableSet,
    pub jobs: JobSet,
    pub aliases: AliasSet,
    pub functions: FunctionTable,
    pub history: History,
    pub exit_status: ExitStatus,
    /// The shell's own process group, established at startup for an
    /// interactive shell so job control has a foreground/background baseline
    /// to compare against.
    pub shell_pgid: Pid,
    pub is_interactive: bool,
    /// The file descriptor connected to the controlling terminal, consulted
    /// by `tcsetpgrp` when handing the terminal to a foreground job. `-1`
    /// when the shell has no controlling terminal (a script, a pipe).
    pub terminal_fd: i32,
    /// Builtins reachable without a `$PATH` search. Populated by
    /// `vsh-semantics` (and, for `history`, `vsh-cli`) at startup; empty by
    /// default so this crate carries no builtin implementations itself.
    pub builtins: BuiltinRegistry,
}

impl Env {
    pub fn new(system: Box<dyn System>) -> Self {
        let shell_pgid = system.getpgrp();
        Env {
            system,
            variables: VariableSet::new(),
            jobs: JobSet::new(),
            aliases: AliasSet::new(),
            functions: FunctionTable::new(),
            history: History::new(),
            exit_status: ExitStatus::SUCCESS,
            shell_pgid,
            is_interactive: false,
            terminal_fd: -1,
            builtins: BuiltinRegistry::new(),
        }
    }

    /// Resolves a `$name` reference against special parameters first, then
    /// the variable table, matching the precedence parameter expansion
    /// assumes: special parameters are not shadowable.
    pub fn lookup_parameter(&self, name: &str) -> Option<String> {
        self.variables
            .special(name, self.exit_status.0, self.system.getpid().as_raw())
            .or_else(|| self.variables.get(name).map(|s| s.to_string()))
    }

    /// Builds the `envp` array for a child process: every exported shell
    /// variable as `NAME=value`.
    pub fn environ_for_exec(&self) -> Vec<CString> {
        self.variables
            .exported_pairs()
            .filter_map(|(name, value)| CString::new(format!("{name}={value}")).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_parameter_prefers_special_over_named_variable() {
        let mut env = Env::new(Box::new(VirtualSystem::new()));
        env.exit_status = ExitStatus(5);
        assert_eq!(env.lookup_parameter("?"), Some("5".to_string()));
    }

    #[test]
    fn lookup_parameter_falls_back_to_variable_table() {
        let mut env = Env::new(Box::new(VirtualSystem::new()));
        env.variables.assign("GREETING", "hi").unwrap();
        assert_eq!(env.lookup_parameter("GREETING"), Some("hi".to_string()));
    }

    #[test]
    fn bang_parameter_is_empty_even_after_a_background_job_is_added() {
        let mut env = Env::new(Box::new(VirtualSystem::new()));
        env.jobs.add(Job::new(
            nix::unistd::Pid::from_raw(42),
            vec![nix::unistd::Pid::from_raw(42)],
            false,
            "sleep 5 &".to_string(),
        ));
        assert_eq!(env.lookup_parameter("!"), Some(String::new()));
    }

    #[test]
    fn environ_for_exec_only_includes_exported_variables() {
        let mut env = Env::new(Box::new(VirtualSystem::new()));
        env.variables.assign("LOCAL", "1").unwrap();
        env.variables.assign("PATH", "/bin").unwrap();
        env.variables.export("PATH");
        let environ = env.environ_for_exec();
        assert_eq!(environ, vec![CString::new("PATH=/bin").unwrap()]);
    }
}
