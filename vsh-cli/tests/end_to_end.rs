//! End-to-end scenarios from spec.md §8, driven through the public
//! `vsh_cli::run` entry point against a `VirtualSystem` double — no real
//! fork/exec, so these exercise control flow, builtins, and variable
//! scoping rather than external-command pipelines (those need `RealSystem`
//! and are covered by `vsh-semantics`'s own process-level tests).

use std::io::Write as _;

use vsh_cli::{Run, Source};
use vsh_env::{Env, ExitStatus, VirtualSystem};

fn env() -> Env {
    let mut env = Env::new(Box::new(VirtualSystem::new()));
    vsh_semantics::install_builtins(&mut env);
    vsh_cli::builtin::install(&mut env);
    env
}

fn run_string(source: &str) -> (Env, ExitStatus) {
    let mut env = env();
    let run = Run {
        source: Source::String(source.to_string()),
        shell_name: "vsh".to_string(),
        positional_params: Vec::new(),
    };
    let status = vsh_cli::run(&mut env, &run);
    (env, status)
}

#[test]
fn true_and_or_chain_short_circuits_on_success() {
    let (_, status) = run_string("true && echo yes || echo no");
    assert_eq!(status, ExitStatus::SUCCESS);
}

#[test]
fn for_loop_over_a_word_list_runs_to_completion() {
    let (_, status) = run_string("for x in a b c; do echo $x; done");
    assert_eq!(status, ExitStatus::SUCCESS);
}

#[test]
fn prefixed_assignment_is_scoped_to_the_child_command_only() {
    let (env, status) = run_string("FOO=bar; FOO=baz echo $FOO");
    assert_eq!(status, ExitStatus::SUCCESS);
    assert_eq!(env.variables.get("FOO"), Some("bar"));
}

#[test]
fn exit_builtin_stops_the_script_before_later_commands_run() {
    let (env, status) = run_string("exit 3; echo should_not_run");
    assert_eq!(status, ExitStatus(3));
    assert_eq!(env.history.len(), 0);
}

#[test]
fn cd_updates_pwd_and_oldpwd() {
    let (env, status) = run_string("cd /etc");
    assert_eq!(status, ExitStatus::SUCCESS);
    assert_eq!(env.variables.get("PWD"), Some("/etc"));
    assert_eq!(env.variables.get("OLDPWD"), Some("/virtual"));
}

#[test]
fn while_loop_with_break_terminates_early() {
    let (_, status) = run_string("while true; do break; done");
    assert_eq!(status, ExitStatus::SUCCESS);
}

#[test]
fn function_definition_and_call_round_trips_an_argument() {
    let (_, status) = run_string("greet() { echo hi $1; }; greet world");
    assert_eq!(status, ExitStatus::SUCCESS);
}

#[test]
fn alias_and_history_expand_through_a_script_file() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "alias hi='echo hello'").unwrap();
    writeln!(script, "hi").unwrap();
    writeln!(script, "!hi").unwrap();
    script.flush().unwrap();

    let mut env = env();
    let run = Run {
        source: Source::File(script.path().to_str().unwrap().to_string()),
        shell_name: "script.sh".to_string(),
        positional_params: Vec::new(),
    };
    let status = vsh_cli::run(&mut env, &run);
    assert_eq!(status, ExitStatus::SUCCESS);
    assert_eq!(env.history.len(), 3);
}
