//! Baseline builtin implementations that only need a [`vsh_env::Env`] — no
//! history store, no line editor, so they belong next to the executor
//! rather than in `vsh-cli`. Grounded on the teacher's `yash-builtin` crate
//! (one module per utility, each a plain function over `Env` plus argv).
//! `exit` is handled directly by the executor (see `command::run_command`)
//! since it needs to produce a [`crate::command::Flow::Exit`], not just an
//! [`ExitStatus`]; it is not registered here.

use std::io::Write as _;

use vsh_env::{Builtin, Env, ExitStatus};

/// Registers every builtin this crate implements into `env.builtins`.
/// `vsh-cli` calls this once at startup and then adds its own (`history`).
pub fn install(env: &mut Env) {
    env.builtins.insert("true", Builtin { run: true_ });
    env.builtins.insert("false", Builtin { run: false_ });
    env.builtins.insert(":", Builtin { run: true_ });
    env.builtins.insert("cd", Builtin { run: cd });
    env.builtins.insert("export", Builtin { run: export });
    env.builtins.insert("unset", Builtin { run: unset });
    env.builtins.insert("echo", Builtin { run: echo });
    env.builtins.insert("read", Builtin { run: read });
    env.builtins.insert("jobs", Builtin { run: jobs });
    env.builtins.insert("fg", Builtin { run: fg });
    env.builtins.insert("bg", Builtin { run: bg });
    env.builtins.insert("wait", Builtin { run: wait });
    env.builtins.insert("alias", Builtin { run: alias });
    env.builtins.insert("unalias", Builtin { run: unalias });
}

fn diag(name: &str, message: impl std::fmt::Display) {
    eprintln!("vsh: {name}: {message}");
}

fn true_(_argv: &[String], _env: &mut Env) -> ExitStatus {
    ExitStatus::SUCCESS
}

fn false_(_argv: &[String], _env: &mut Env) -> ExitStatus {
    ExitStatus(1)
}

fn cd(argv: &[String], env: &mut Env) -> ExitStatus {
    let target = match argv.get(1) {
        Some(dir) => dir.clone(),
        None => match env.lookup_parameter("HOME") {
            Some(home) => home,
            None => {
                diag("cd", "HOME not set");
                return ExitStatus(1);
            }
        },
    };
    let old_cwd = env.system.getcwd().ok();
    let Ok(target_c) = std::ffi::CString::new(target.clone()) else {
        diag("cd", "invalid path");
        return ExitStatus(1);
    };
    if let Err(e) = env.system.chdir(&target_c) {
        diag("cd", e);
        return ExitStatus(1);
    }
    if let Some(old) = old_cwd {
        env.variables
            .assign("OLDPWD", old.to_string_lossy().into_owned())
            .ok();
    }
    if let Ok(new_cwd) = env.system.getcwd() {
        env.variables
            .assign("PWD", new_cwd.to_string_lossy().into_owned())
            .ok();
    }
    ExitStatus::SUCCESS
}

fn export(argv: &[String], env: &mut Env) -> ExitStatus {
    if argv.len() == 1 {
        for (name, value) in env.variables.exported_pairs() {
            println!("export {name}={value}");
        }
        return ExitStatus::SUCCESS;
    }
    for arg in &argv[1..] {
        match arg.split_once('=') {
            Some((name, value)) => {
                if env.variables.assign(name, value).is_err() {
                    diag("export", format!("{name}: readonly variable"));
                    return ExitStatus(1);
                }
                env.variables.export(name);
            }
            None => env.variables.export(arg),
        }
    }
    ExitStatus::SUCCESS
}

fn unset(argv: &[String], env: &mut Env) -> ExitStatus {
    let mut status = ExitStatus::SUCCESS;
    for name in &argv[1..] {
        if env.variables.unset(name).is_err() {
            diag("unset", format!("{name}: readonly variable"));
            status = ExitStatus(1);
        }
    }
    status
}

fn echo(argv: &[String], _env: &mut Env) -> ExitStatus {
    println!("{}", argv[1..].join(" "));
    ExitStatus::SUCCESS
}

fn read(argv: &[String], env: &mut Env) -> ExitStatus {
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
        return ExitStatus(1);
    }
    let line = line.trim_end_matches('\n');
    let names: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
    if names.is_empty() {
        let _ = env.variables.assign("REPLY", line.to_string());
        return ExitStatus::SUCCESS;
    }
    let mut fields: Vec<&str> = line.splitn(names.len(), char::is_whitespace).collect();
    fields.resize(names.len(), "");
    for (name, value) in names.iter().zip(fields) {
        let _ = env.variables.assign(*name, value.to_string());
    }
    ExitStatus::SUCCESS
}

fn jobs(_argv: &[String], env: &mut Env) -> ExitStatus {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let current = env.jobs.current_job();
    let previous = env.jobs.previous_job();
    for (id, job) in env.jobs.iter() {
        let marker = if Some(id) == current {
            '+'
        } else if Some(id) == previous {
            '-'
        } else {
            ' '
        };
        let state = match job.state {
            vsh_env::JobState::Running => "Running",
            vsh_env::JobState::Stopped => "Stopped",
            vsh_env::JobState::Done(_) => "Done",
            vsh_env::JobState::Killed(_) => "Killed",
        };
        let _ = writeln!(out, "[{id}]{marker} {state}\t{}", job.name);
    }
    ExitStatus::SUCCESS
}

fn parse_job_id(argv: &[String], env: &Env) -> Option<usize> {
    match argv.get(1) {
        Some(spec) => spec.strip_prefix('%').unwrap_or(spec).parse().ok(),
        None => env.jobs.current_job(),
    }
}

fn fg(argv: &[String], env: &mut Env) -> ExitStatus {
    let Some(id) = parse_job_id(argv, env) else {
        diag("fg", "no current job");
        return ExitStatus(1);
    };
    let Some(job) = env.jobs.get(id) else {
        diag("fg", "no such job");
        return ExitStatus(1);
    };
    let pgid = job.pgid;
    let _ = env.system.kill(pgid, Some(nix::sys::signal::Signal::SIGCONT));
    if env.is_interactive {
        let _ = crate::redir::set_foreground_pgrp(env, pgid);
    }
    ExitStatus::SUCCESS
}

fn bg(argv: &[String], env: &mut Env) -> ExitStatus {
    let Some(id) = parse_job_id(argv, env) else {
        diag("bg", "no current job");
        return ExitStatus(1);
    };
    let Some(job) = env.jobs.get(id) else {
        diag("bg", "no such job");
        return ExitStatus(1);
    };
    let _ = env.system.kill(job.pgid, Some(nix::sys::signal::Signal::SIGCONT));
    ExitStatus::SUCCESS
}

fn wait(argv: &[String], env: &mut Env) -> ExitStatus {
    let Some(id) = parse_job_id(argv, env) else {
        return ExitStatus::SUCCESS;
    };
    loop {
        match env.jobs.get(id).map(|j| j.state) {
            Some(vsh_env::JobState::Done(status) | vsh_env::JobState::Killed(status)) => {
                env.jobs.remove(id);
                return status;
            }
            None => return ExitStatus::SUCCESS,
            _ => {
                use nix::sys::wait::{WaitPidFlag, WaitStatus};
                let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
                match env.system.waitpid(None, flags) {
                    Ok(status @ (WaitStatus::Exited(pid, _) | WaitStatus::Signaled(pid, ..))) => {
                        env.jobs.record_status(pid, status);
                    }
                    Ok(status @ WaitStatus::Continued(pid)) => {
                        env.jobs.record_status(pid, status);
                    }
                    Err(nix::Error::ECHILD) => return ExitStatus::SUCCESS,
                    _ => {}
                }
            }
        }
    }
}

fn alias(argv: &[String], env: &mut Env) -> ExitStatus {
    if argv.len() == 1 {
        for (name, value) in env.aliases.iter() {
            println!("alias {name}='{value}'");
        }
        return ExitStatus::SUCCESS;
    }
    for arg in &argv[1..] {
        match arg.split_once('=') {
            Some((name, value)) => env.aliases.define(name, value),
            None => match env.aliases.look_up(arg) {
                Some(value) => println!("alias {arg}='{value}'"),
                None => {
                    diag("alias", format!("{arg}: not found"));
                    return ExitStatus(1);
                }
            },
        }
    }
    ExitStatus::SUCCESS
}

fn unalias(argv: &[String], env: &mut Env) -> ExitStatus {
    for name in &argv[1..] {
        env.aliases.remove(name);
    }
    ExitStatus::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsh_env::VirtualSystem;

    fn env() -> Env {
        let mut env = Env::new(Box::new(VirtualSystem::new()));
        install(&mut env);
        env
    }

    #[test]
    fn true_and_false_report_fixed_statuses() {
        let mut env = env();
        assert_eq!(true_(&["true".into()], &mut env), ExitStatus::SUCCESS);
        assert_eq!(false_(&["false".into()], &mut env), ExitStatus(1));
    }

    #[test]
    fn export_marks_an_existing_variable_exported() {
        let mut env = env();
        env.variables.assign("FOO", "bar").unwrap();
        export(&["export".into(), "FOO".into()], &mut env);
        assert!(env.variables.is_exported("FOO"));
    }

    #[test]
    fn export_with_equals_assigns_and_exports() {
        let mut env = env();
        export(&["export".into(), "FOO=bar".into()], &mut env);
        assert_eq!(env.variables.get("FOO"), Some("bar"));
        assert!(env.variables.is_exported("FOO"));
    }

    #[test]
    fn unset_removes_the_variable() {
        let mut env = env();
        env.variables.assign("FOO", "bar").unwrap();
        unset(&["unset".into(), "FOO".into()], &mut env);
        assert_eq!(env.variables.get("FOO"), None);
    }

    #[test]
    fn alias_definition_then_lookup_round_trips() {
        let mut env = env();
        alias(&["alias".into(), "ll=ls -l".into()], &mut env);
        assert_eq!(env.aliases.look_up("ll"), Some("ls -l"));
    }

    #[test]
    fn cd_records_the_previous_directory_as_oldpwd() {
        let mut env = env();
        cd(&["cd".into(), "/elsewhere".into()], &mut env);
        assert_eq!(env.variables.get("OLDPWD"), Some("/virtual"));
        assert_eq!(env.variables.get("PWD"), Some("/elsewhere"));
    }

    #[test]
    fn wait_with_no_jobs_returns_success_immediately() {
        let mut env = env();
        assert_eq!(wait(&["wait".into()], &mut env), ExitStatus::SUCCESS);
    }
}
