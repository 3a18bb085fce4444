//! The executor: walks the AST and produces an exit status, per spec.md
//! §4.5's dispatch table. Grounded on the teacher's `yash-semantics`
//! `command`/`command/simple_command` dispatch, collapsed into one
//! synchronous recursive function since this crate has no async executor.

use std::ffi::CString;

use nix::sys::signal::Signal;
use nix::unistd::ForkResult;

use vsh_env::{Env, ExitStatus, Job, JobState, Result};
use vsh_syntax::Node;

use crate::expansion::{self, ExpandError};
use crate::pipeline;
use crate::redir::{self, RedirGuard};

/// Non-local control flow a node's execution can request of its caller.
/// Only `While`/`For` bodies interpret `Break`/`Continue`; only a function
/// call interprets `Return`. Every other node passes a non-`Normal` flow
/// straight through to its own caller. Supplemented beyond spec.md's
/// dispatch table (see SPEC_FULL.md §2) so `return`/`break`/`continue` can
/// unwind through nested `If`/`Sequence`/`And`/`Or` nodes without an
/// exception type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Normal(ExitStatus),
    Return(ExitStatus),
    Break(u32),
    Continue(u32),
    /// The `exit` builtin was invoked. Propagates past every `If`/loop/
    /// function boundary (unlike `Return`, which a function call absorbs)
    /// until the driver loop in `vsh-cli` observes it and stops reading
    /// more input.
    Exit(ExitStatus),
}

impl Flow {
    pub fn status(self) -> ExitStatus {
        match self {
            Flow::Normal(s) | Flow::Return(s) | Flow::Exit(s) => s,
            Flow::Break(_) | Flow::Continue(_) => ExitStatus::SUCCESS,
        }
    }
}

/// Runs `node`, updating `env.exit_status` to match, and returns both the
/// resulting [`Flow`] and its status for callers that need to branch on
/// both without re-destructuring.
pub fn execute(node: &Node<'_>, env: &mut Env) -> Result<(Flow, ExitStatus)> {
    let (flow, status) = execute_inner(node, env)?;
    env.exit_status = status;
    Ok((flow, status))
}

fn execute_inner(node: &Node<'_>, env: &mut Env) -> Result<(Flow, ExitStatus)> {
    match *node {
        Node::Command {
            argv,
            redirs,
            assignments,
        } => run_command(argv, redirs, assignments, env),

        Node::Pipeline { commands, negated } => pipeline::run_pipeline(commands, negated, env, false),

        Node::And { left, right } => {
            let (flow, status) = execute(left, env)?;
            if !matches!(flow, Flow::Normal(_)) || !status.is_success() {
                return Ok((flow, status));
            }
            execute(right, env)
        }

        Node::Or { left, right } => {
            let (flow, status) = execute(left, env)?;
            if !matches!(flow, Flow::Normal(_)) || status.is_success() {
                return Ok((flow, status));
            }
            execute(right, env)
        }

        Node::Sequence { left, right } => {
            let (flow, status) = execute(left, env)?;
            if !matches!(flow, Flow::Normal(_)) {
                return Ok((flow, status));
            }
            execute(right, env)
        }

        Node::Background { child } => run_background(child, env),

        Node::Negate { child } => {
            let (flow, status) = execute(child, env)?;
            if !matches!(flow, Flow::Normal(_)) {
                return Ok((flow, status));
            }
            let negated = ExitStatus(if status.is_success() { 1 } else { 0 });
            Ok((Flow::Normal(negated), negated))
        }

        Node::Subshell { child } => run_subshell(child, env),

        Node::If {
            condition,
            then_branch,
            else_branch,
        } => {
            let (flow, status) = execute(condition, env)?;
            if !matches!(flow, Flow::Normal(_)) {
                return Ok((flow, status));
            }
            if status.is_success() {
                execute(then_branch, env)
            } else if let Some(else_branch) = else_branch {
                execute(else_branch, env)
            } else {
                Ok((Flow::Normal(ExitStatus::SUCCESS), ExitStatus::SUCCESS))
            }
        }

        Node::While { condition, body } => run_while(condition, body, env),

        Node::For {
            varname,
            words,
            uses_positional,
            body,
        } => run_for(varname, words, uses_positional, body, env),

        Node::Function { name, body } => {
            env.functions.define(name, body);
            Ok((Flow::Normal(ExitStatus::SUCCESS), ExitStatus::SUCCESS))
        }

        Node::Block { child } => execute(child, env),

        Node::Return { status } => {
            let status = match status {
                Some(word) => parse_status_word(word, env)?,
                None => env.exit_status,
            };
            Ok((Flow::Return(status), status))
        }

        Node::Break { levels } => Ok((Flow::Break(levels.max(1)), ExitStatus::SUCCESS)),
        Node::Continue { levels } => Ok((Flow::Continue(levels.max(1)), ExitStatus::SUCCESS)),
    }
}

fn parse_status_word(word: &str, env: &mut Env) -> Result<ExitStatus> {
    let expanded = expansion::expand_single(word, env).map_err(expand_err)?;
    Ok(ExitStatus(expanded.trim().parse().unwrap_or(0)))
}

fn run_while(condition: &Node<'_>, body: &Node<'_>, env: &mut Env) -> Result<(Flow, ExitStatus)> {
    let mut last = ExitStatus::SUCCESS;
    loop {
        let (flow, status) = execute(condition, env)?;
        if !matches!(flow, Flow::Normal(_)) {
            return Ok((flow, status));
        }
        if !status.is_success() {
            break;
        }
        let (flow, status) = execute(body, env)?;
        last = status;
        match flow {
            Flow::Normal(_) => {}
            Flow::Break(n) if n <= 1 => break,
            Flow::Break(n) => return Ok((Flow::Break(n - 1), status)),
            Flow::Continue(n) if n <= 1 => continue,
            Flow::Continue(n) => return Ok((Flow::Continue(n - 1), status)),
            Flow::Return(_) | Flow::Exit(_) => return Ok((flow, status)),
        }
    }
    Ok((Flow::Normal(last), last))
}

fn run_for(
    varname: &str,
    words: &[&str],
    uses_positional: bool,
    body: &Node<'_>,
    env: &mut Env,
) -> Result<(Flow, ExitStatus)> {
    let values: Vec<String> = if uses_positional {
        env.variables.positional.clone()
    } else {
        let mut values = Vec::new();
        for word in words {
            values.extend(expansion::expand_word(word, env).map_err(expand_err)?);
        }
        values
    };

    let mut last = ExitStatus::SUCCESS;
    for value in values {
        let _ = env.variables.assign(varname, value);
        let (flow, status) = execute(body, env)?;
        last = status;
        match flow {
            Flow::Normal(_) => {}
            Flow::Break(n) if n <= 1 => break,
            Flow::Break(n) => return Ok((Flow::Break(n - 1), status)),
            Flow::Continue(n) if n <= 1 => continue,
            Flow::Continue(n) => return Ok((Flow::Continue(n - 1), status)),
            Flow::Return(_) | Flow::Exit(_) => return Ok((flow, status)),
        }
    }
    Ok((Flow::Normal(last), last))
}

fn run_background(child: &Node<'_>, env: &mut Env) -> Result<(Flow, ExitStatus)> {
    // SAFETY: the child only runs `execute` (whose own fork paths are
    // themselves async-signal-safe at the point they call fork) and then
    // exits; it never returns into the parent's control flow.
    match unsafe { env.system.fork() }? {
        ForkResult::Parent { child: pid } => {
            let _ = env.system.setpgid(pid, pid);
            let job_id = env.jobs.add(Job::new(
                pid,
                vec![pid],
                env.is_interactive,
                format!("{} &", vsh_syntax::render(child)),
            ));
            println!("[{job_id}] {pid}");
            Ok((Flow::Normal(ExitStatus::SUCCESS), ExitStatus::SUCCESS))
        }
        ForkResult::Child => {
            let _ = env.system.setpgid(env.system.getpid(), env.system.getpid());
            reset_child_signals(env);
            let (_, status) = execute(child, env).unwrap_or((
                Flow::Normal(ExitStatus(1)),
                ExitStatus(1),
            ));
            env.system.exit(status.0);
        }
    }
}

fn run_subshell(child: &Node<'_>, env: &mut Env) -> Result<(Flow, ExitStatus)> {
    // SAFETY: see `run_background`.
    match unsafe { env.system.fork() }? {
        ForkResult::Parent { child: pid } => {
            let status = wait_foreground_single(env, pid)?;
            Ok((Flow::Normal(status), status))
        }
        ForkResult::Child => {
            reset_child_signals(env);
            let (_, status) = execute(child, env).unwrap_or((
                Flow::Normal(ExitStatus(1)),
                ExitStatus(1),
            ));
            env.system.exit(status.0);
        }
    }
}

fn wait_foreground_single(env: &mut Env, pid: nix::unistd::Pid) -> Result<ExitStatus> {
    use nix::sys::wait::{WaitPidFlag, WaitStatus};
    loop {
        match env.system.waitpid(Some(pid), WaitPidFlag::empty()) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ExitStatus(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(ExitStatus(128 + signal as i32)),
            Ok(_) => continue,
            Err(nix::Error::EINTR) => continue,
            Err(nix::Error::ECHILD) => return Ok(ExitStatus::SUCCESS),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Waits for a single-pid foreground job registered in `env.jobs`, mirroring
/// `pipeline::run_forked_pipeline`'s wait loop: a `SIGTSTP` stop leaves the
/// job in the table as `Stopped` instead of blocking forever.
fn wait_foreground_job(env: &mut Env, job_id: usize, pid: nix::unistd::Pid) -> Result<ExitStatus> {
    use nix::sys::wait::{WaitPidFlag, WaitStatus};
    loop {
        match env.system.waitpid(Some(pid), WaitPidFlag::WUNTRACED) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                env.jobs.record_status(pid, status);
                break;
            }
            Ok(status @ WaitStatus::Stopped(..)) => {
                env.jobs.record_status(pid, status);
                break;
            }
            Ok(_) => continue,
            Err(nix::Error::EINTR) => continue,
            Err(nix::Error::ECHILD) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let status = match env.jobs.get(job_id).map(|j| j.state) {
        Some(JobState::Done(status) | JobState::Killed(status)) => status,
        _ => ExitStatus::SUCCESS,
    };

    if matches!(
        env.jobs.get(job_id).map(|j| j.state),
        Some(JobState::Done(_) | JobState::Killed(_))
    ) {
        env.jobs.remove(job_id);
    }

    Ok(status)
}

fn reset_child_signals(env: &Env) {
    for signal in [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGCHLD,
    ] {
        let _ = env.system.reset_signal_disposition(signal);
    }
}

fn expand_err(e: ExpandError) -> vsh_env::EnvError {
    match e {
        ExpandError::Readonly(name) => vsh_env::EnvError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{name}: readonly variable"),
        )),
        ExpandError::ParameterRequired { name, message } => {
            vsh_env::EnvError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{name}: {}", message.unwrap_or_else(|| "parameter not set".into())),
            ))
        }
    }
}

fn run_command(
    argv: &[&str],
    redirs: &[vsh_syntax::Redir<'_>],
    assignments: &[vsh_syntax::Assignment<'_>],
    env: &mut Env,
) -> Result<(Flow, ExitStatus)> {
    let expanded_argv = {
        let mut out = Vec::with_capacity(argv.len());
        for word in argv {
            out.extend(expansion::expand_word(word, env).map_err(expand_err)?);
        }
        out
    };

    if expanded_argv.is_empty() {
        for assignment in assignments {
            let value = expansion::expand_single(assignment.value, env).map_err(expand_err)?;
            env.variables
                .assign(assignment.name, value)
                .map_err(|e| expand_err(ExpandError::Readonly(e.name)))?;
        }
        return Ok((Flow::Normal(ExitStatus::SUCCESS), ExitStatus::SUCCESS));
    }

    if expanded_argv[0] == "exit" {
        let status = match expanded_argv.get(1) {
            Some(word) => ExitStatus(word.trim().parse().unwrap_or(0)),
            None => env.exit_status,
        };
        return Ok((Flow::Exit(status), status));
    }

    if let Some(builtin) = env.builtins.get(expanded_argv[0].as_str()).copied() {
        let mut guard = RedirGuard::apply(env, redirs)?;
        let status = (builtin.run)(&expanded_argv, guard.env());
        drop(guard);
        return Ok((Flow::Normal(status), status));
    }

    if env.functions.is_defined(&expanded_argv[0]) {
        return run_function(&expanded_argv, env);
    }

    run_external(&expanded_argv, redirs, assignments, env)
}

fn run_function(argv: &[String], env: &mut Env) -> Result<(Flow, ExitStatus)> {
    let body: Node<'static> = env
        .functions
        .get_body(&argv[0])
        .expect("caller already checked is_defined");
    let saved_positional = std::mem::replace(&mut env.variables.positional, argv[1..].to_vec());
    let result = execute(&body, env);
    env.variables.positional = saved_positional;
    let (flow, status) = result?;
    match flow {
        Flow::Return(s) => Ok((Flow::Normal(s), s)),
        other => Ok((other, status)),
    }
}

fn run_external(
    argv: &[String],
    redirs: &[vsh_syntax::Redir<'_>],
    assignments: &[vsh_syntax::Assignment<'_>],
    env: &mut Env,
) -> Result<(Flow, ExitStatus)> {
    // SAFETY: the child only performs fd manipulation, redirection, and
    // execve before exiting — no allocation-heavy shell state is touched
    // beyond what `apply_for_exec`/`execve` themselves need.
    match unsafe { env.system.fork() }? {
        ForkResult::Parent { child } => {
            let _ = env.system.setpgid(child, child);
            let job_id = env.jobs.add(Job::new(
                child,
                vec![child],
                env.is_interactive,
                argv.join(" "),
            ));
            if env.is_interactive {
                redir::set_foreground_pgrp(env, child)?;
            }
            let status = wait_foreground_job(env, job_id, child)?;
            if env.is_interactive {
                redir::set_foreground_pgrp(env, env.shell_pgid)?;
            }
            Ok((Flow::Normal(status), status))
        }
        ForkResult::Child => {
            let _ = env.system.setpgid(env.system.getpid(), env.system.getpid());
            reset_child_signals(env);
            for assignment in assignments {
                if let Ok(value) = expansion::expand_single(assignment.value, env) {
                    env.variables.assign(assignment.name, value.clone()).ok();
                    env.variables.export(assignment.name);
                }
            }
            if let Err(e) = redir::apply_for_exec(redirs, env) {
                eprintln!("vsh: {}: {e}", argv[0]);
                env.system.exit(1);
            }
            exec_argv(argv, env);
        }
    }
}

/// Execs `argv[0]` directly first, then searches `$PATH`, matching
/// spec.md's "direct exec, then PATH search" ordering. Never returns.
fn exec_argv(argv: &[String], env: &mut Env) -> ! {
    let Some(args) = to_cstrings(argv) else {
        env.system.exit(126);
    };
    let envp = env.environ_for_exec();

    if argv[0].contains('/') {
        try_exec(&argv[0], &args, &envp, env);
        env.system.exit(if env.system.is_executable_file(&args[0]) {
            126
        } else {
            127
        });
    }

    let path_var = env.lookup_parameter("PATH").unwrap_or_default();
    let mut found = false;
    for dir in path_var.split(':') {
        let candidate = if dir.is_empty() {
            argv[0].clone()
        } else {
            format!("{dir}/{}", argv[0])
        };
        let Ok(candidate_c) = CString::new(candidate.clone()) else {
            continue;
        };
        if env.system.is_executable_file(&candidate_c) {
            found = true;
            try_exec(&candidate, &args, &envp, env);
        }
    }
    env.system.exit(if found { 126 } else { 127 });
}

fn try_exec(path: &str, args: &[CString], envp: &[CString], env: &mut Env) {
    if let Ok(path_c) = CString::new(path) {
        let _ = env.system.execve(&path_c, args, envp);
    }
}

fn to_cstrings(argv: &[String]) -> Option<Vec<CString>> {
    argv.iter().map(|a| CString::new(a.as_str()).ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsh_arena::Arena;
    use vsh_env::{Builtin, VirtualSystem};
    use vsh_syntax::{Assignment, Redir};

    fn env() -> Env {
        let mut env = Env::new(Box::new(VirtualSystem::new()));
        env.builtins.insert(
            "true",
            Builtin {
                run: |_, _| ExitStatus::SUCCESS,
            },
        );
        env.builtins.insert(
            "false",
            Builtin {
                run: |_, _| ExitStatus(1),
            },
        );
        env
    }

    fn cmd<'a>(arena: &'a Arena, argv: &[&str]) -> &'a Node<'a> {
        arena.alloc(Node::Command {
            argv: arena.alloc_slice_fill_iter(argv.iter().map(|s| arena.alloc_str(s))),
            redirs: &[],
            assignments: &[],
        })
    }

    #[test]
    fn bare_assignment_updates_the_variable_and_returns_zero() {
        let arena = Arena::new();
        let node = arena.alloc(Node::Command {
            argv: &[],
            redirs: &[],
            assignments: arena.alloc_slice_fill_iter([Assignment {
                name: "FOO",
                value: "bar",
            }]),
        });
        let mut env = env();
        let (flow, status) = execute(node, &mut env).unwrap();
        assert_eq!(flow, Flow::Normal(ExitStatus::SUCCESS));
        assert_eq!(status, ExitStatus::SUCCESS);
        assert_eq!(env.variables.get("FOO"), Some("bar"));
    }

    #[test]
    fn builtin_runs_in_process_and_reports_its_status() {
        let arena = Arena::new();
        let node = cmd(&arena, &["false"]);
        let mut env = env();
        let (_, status) = execute(node, &mut env).unwrap();
        assert_eq!(status, ExitStatus(1));
    }

    #[test]
    fn and_short_circuits_on_nonzero_left() {
        let arena = Arena::new();
        let left = cmd(&arena, &["false"]);
        let right = cmd(&arena, &["true"]);
        let node = arena.alloc(Node::And { left, right });
        let mut env = env();
        let (_, status) = execute(node, &mut env).unwrap();
        assert_eq!(status, ExitStatus(1));
    }

    #[test]
    fn or_runs_right_only_when_left_fails() {
        let arena = Arena::new();
        let left = cmd(&arena, &["true"]);
        let right = cmd(&arena, &["false"]);
        let node = arena.alloc(Node::Or { left, right });
        let mut env = env();
        let (_, status) = execute(node, &mut env).unwrap();
        assert_eq!(status, ExitStatus::SUCCESS);
    }

    #[test]
    fn negate_flips_zero_and_nonzero() {
        let arena = Arena::new();
        let child = cmd(&arena, &["true"]);
        let node = arena.alloc(Node::Negate { child });
        let mut env = env();
        let (_, status) = execute(node, &mut env).unwrap();
        assert_eq!(status, ExitStatus(1));
    }

    #[test]
    fn if_runs_else_branch_when_condition_fails() {
        let arena = Arena::new();
        let condition = cmd(&arena, &["false"]);
        let then_branch = cmd(&arena, &["true"]);
        let else_branch = cmd(&arena, &["false"]);
        let node = arena.alloc(Node::If {
            condition,
            then_branch,
            else_branch: Some(else_branch),
        });
        let mut env = env();
        let (_, status) = execute(node, &mut env).unwrap();
        assert_eq!(status, ExitStatus(1));
    }

    #[test]
    fn while_loop_runs_until_condition_fails() {
        let arena = Arena::new();
        let assign = arena.alloc(Node::Command {
            argv: &[],
            redirs: &[],
            assignments: arena.alloc_slice_fill_iter([Assignment {
                name: "N",
                value: "1",
            }]),
        });
        let condition = cmd(&arena, &["false"]);
        let node = arena.alloc(Node::While {
            condition,
            body: assign,
        });
        let mut env = env();
        let (flow, status) = execute(node, &mut env).unwrap();
        assert_eq!(flow, Flow::Normal(ExitStatus::SUCCESS));
        assert_eq!(status, ExitStatus::SUCCESS);
    }

    #[test]
    fn for_loop_iterates_the_word_list_and_sets_the_loop_variable() {
        let arena = Arena::new();
        let body = cmd(&arena, &["true"]);
        let node = arena.alloc(Node::For {
            varname: "x",
            words: arena.alloc_slice_fill_iter(["a", "b", "c"]),
            uses_positional: false,
            body,
        });
        let mut env = env();
        execute(node, &mut env).unwrap();
        assert_eq!(env.variables.get("x"), Some("c"));
    }

    #[test]
    fn break_stops_a_for_loop_early() {
        let arena = Arena::new();
        let brk = arena.alloc(Node::Break { levels: 1 });
        let node = arena.alloc(Node::For {
            varname: "x",
            words: arena.alloc_slice_fill_iter(["a", "b"]),
            uses_positional: false,
            body: brk,
        });
        let mut env = env();
        execute(node, &mut env).unwrap();
        assert_eq!(env.variables.get("x"), Some("a"));
    }

    #[test]
    fn function_definition_then_call_runs_the_body() {
        let arena = Arena::new();
        let body = cmd(&arena, &["false"]);
        let def = arena.alloc(Node::Function { name: "f", body });
        let mut env = env();
        execute(def, &mut env).unwrap();
        assert!(env.functions.is_defined("f"));

        let call_arena = Arena::new();
        let call = cmd(&call_arena, &["f"]);
        let (_, status) = execute(call, &mut env).unwrap();
        assert_eq!(status, ExitStatus(1));
    }

    #[test]
    fn return_from_a_function_does_not_escape_the_call() {
        let arena = Arena::new();
        let ret = arena.alloc(Node::Return { status: Some("7") });
        let def = arena.alloc(Node::Function {
            name: "f",
            body: ret,
        });
        let mut env = env();
        execute(def, &mut env).unwrap();

        let call_arena = Arena::new();
        let call = cmd(&call_arena, &["f"]);
        let (flow, status) = execute(call, &mut env).unwrap();
        assert_eq!(flow, Flow::Normal(ExitStatus(7)));
        assert_eq!(status, ExitStatus(7));
    }

    #[test]
    fn block_runs_in_the_current_process_without_forking() {
        let arena = Arena::new();
        let child = cmd(&arena, &["true"]);
        let node = arena.alloc(Node::Block { child });
        let mut env = env();
        let (_, status) = execute(node, &mut env).unwrap();
        assert_eq!(status, ExitStatus::SUCCESS);
    }

    #[test]
    fn redirections_on_a_builtin_are_undone_after_it_returns() {
        let arena = Arena::new();
        let node = arena.alloc(Node::Command {
            argv: arena.alloc_slice_fill_iter(["true"].map(|s| arena.alloc_str(s))),
            redirs: arena.alloc_slice_fill_iter([Redir {
                kind: vsh_syntax::RedirKind::Output,
                fd: 1,
                target: "/tmp/out.txt",
                heredoc_body: None,
                heredoc_expand: false,
            }]),
            assignments: &[],
        });
        let mut env = env();
        let (_, status) = execute(node, &mut env).unwrap();
        assert_eq!(status, ExitStatus::SUCCESS);
    }
}
