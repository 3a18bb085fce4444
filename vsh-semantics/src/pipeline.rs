//! Pipeline wiring (spec.md §4.6): a single command runs in-process so a
//! builtin can mutate shell state; two or more commands fork, each fed by
//! the previous stage's pipe, all under one process group handed the
//! controlling terminal as a unit.

use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::{ForkResult, Pid};

use vsh_env::{Env, ExitStatus, Job, Result};
use vsh_syntax::Node;

use crate::command::{self, Flow};
use crate::redir;

/// Runs every command in `commands` wired front-to-back through N-1 pipes.
/// `negated` flips a zero/nonzero exit status at the end, per §4.5's
/// Pipeline dispatch.
pub fn run_pipeline(
    commands: &[&Node<'_>],
    negated: bool,
    env: &mut Env,
    background: bool,
) -> Result<(Flow, ExitStatus)> {
    let status = if commands.len() == 1 {
        let (flow, status) = command::execute(commands[0], env)?;
        if !matches!(flow, Flow::Normal(_)) {
            return Ok((flow, status));
        }
        status
    } else {
        run_forked_pipeline(commands, env, background)?
    };

    let final_status = if negated {
        ExitStatus(if status.is_success() { 1 } else { 0 })
    } else {
        status
    };
    Ok((Flow::Normal(final_status), final_status))
}

fn run_forked_pipeline(commands: &[&Node<'_>], env: &mut Env, background: bool) -> Result<ExitStatus> {
    let n = commands.len();
    let mut pipes = Vec::with_capacity(n - 1);
    for _ in 0..n - 1 {
        pipes.push(env.system.pipe()?);
    }

    let mut pids = Vec::with_capacity(n);
    let mut pgid: Option<Pid> = None;

    for (i, node) in commands.iter().enumerate() {
        // SAFETY: the child only touches async-signal-safe state (fd
        // juggling, execve) before exiting or execing; it never returns
        // into the caller's broader control flow.
        match unsafe { env.system.fork() }? {
            ForkResult::Parent { child } => {
                let pg = pgid.unwrap_or(child);
                let _ = env.system.setpgid(child, pg);
                pgid.get_or_insert(child);
                pids.push(child);
            }
            ForkResult::Child => {
                let pg = pgid.unwrap_or_else(|| env.system.getpid());
                let _ = env.system.setpgid(env.system.getpid(), pg);
                wire_stage(env, &pipes, i, n);
                for fd in pipes.iter().flat_map(|&(r, w)| [r, w]) {
                    let _ = env.system.close(fd);
                }
                reset_child_signal_dispositions(env);
                let (_, status) = command::execute(node, env).unwrap_or((
                    Flow::Normal(ExitStatus(1)),
                    ExitStatus(1),
                ));
                env.system.exit(status.0);
            }
        }
    }

    for &(r, w) in &pipes {
        let _ = env.system.close(r);
        let _ = env.system.close(w);
    }

    let pgid = pgid.expect("at least one fork succeeded for N>=2 pipeline");
    let mut name = commands
        .iter()
        .map(|c| vsh_syntax::render(c))
        .collect::<Vec<_>>()
        .join(" | ");
    if background {
        name.push_str(" &");
    }
    let job_id = env.jobs.add(Job::new(pgid, pids.clone(), env.is_interactive, name));

    if background {
        return Ok(ExitStatus::SUCCESS);
    }

    if env.is_interactive {
        redir::set_foreground_pgrp(env, pgid)?;
    }

    loop {
        match env.system.waitpid(Some(Pid::from_raw(-pgid.as_raw())), WaitPidFlag::WUNTRACED) {
            Ok(status @ (WaitStatus::Exited(pid, _) | WaitStatus::Signaled(pid, ..))) => {
                env.jobs.record_status(pid, status);
                if matches!(
                    env.jobs.get(job_id).unwrap().state,
                    vsh_env::JobState::Done(_) | vsh_env::JobState::Killed(_)
                ) {
                    break;
                }
            }
            Ok(status @ WaitStatus::Stopped(pid, _)) => {
                env.jobs.record_status(pid, status);
                break;
            }
            Ok(_) => continue,
            Err(nix::Error::ECHILD) => break,
            Err(nix::Error::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let last_status = match env.jobs.get(job_id).map(|j| j.state) {
        Some(vsh_env::JobState::Done(status) | vsh_env::JobState::Killed(status)) => status,
        _ => ExitStatus::SUCCESS,
    };

    if env.is_interactive {
        redir::set_foreground_pgrp(env, env.shell_pgid)?;
    }

    if matches!(
        env.jobs.get(job_id).map(|j| j.state),
        Some(vsh_env::JobState::Done(_) | vsh_env::JobState::Killed(_))
    ) {
        env.jobs.remove(job_id);
    }

    Ok(last_status)
}

/// Drains any child whose status has changed without blocking, updating the
/// job table, and returns every job that is now finished after its removal
/// (a job leaves the table only once its completion has been reported). The
/// driver loop calls this between top-level commands and prints one
/// notification line per returned entry.
pub fn reap_finished_jobs(env: &mut Env) -> Vec<(usize, String, vsh_env::JobState)> {
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    loop {
        match env.system.waitpid(None, flags) {
            Ok(status @ (WaitStatus::Exited(pid, _) | WaitStatus::Signaled(pid, ..))) => {
                env.jobs.record_status(pid, status);
            }
            Ok(status @ WaitStatus::Stopped(pid, _)) => {
                env.jobs.record_status(pid, status);
            }
            Ok(status @ WaitStatus::Continued(pid)) => {
                env.jobs.record_status(pid, status);
            }
            Ok(_) | Err(nix::Error::ECHILD) => break,
            Err(nix::Error::EINTR) => continue,
            Err(_) => break,
        }
    }

    let finished_ids: Vec<usize> = env
        .jobs
        .iter()
        .filter(|(_, job)| matches!(job.state, vsh_env::JobState::Done(_) | vsh_env::JobState::Killed(_)))
        .map(|(id, _)| id)
        .collect();

    finished_ids
        .into_iter()
        .filter_map(|id| env.jobs.remove(id).map(|job| (id, job)))
        .filter_map(|(id, job)| match job.state {
            state @ (vsh_env::JobState::Done(_) | vsh_env::JobState::Killed(_)) => {
                Some((id, job.name, state))
            }
            _ => None,
        })
        .collect()
}

/// Sends `SIGKILL` to the process group of every job still `Running` or
/// `Stopped` and reaps each of its pids, for a clean shell exit with no
/// orphaned children left behind.
pub fn shutdown_jobs(env: &mut Env) {
    let pending: Vec<(Pid, Vec<Pid>)> = env
        .jobs
        .iter()
        .filter(|(_, job)| matches!(job.state, vsh_env::JobState::Running | vsh_env::JobState::Stopped))
        .map(|(_, job)| (job.pgid, job.pids.clone()))
        .collect();

    for (pgid, pids) in pending {
        let _ = env
            .system
            .kill(Pid::from_raw(-pgid.as_raw()), Some(nix::sys::signal::Signal::SIGKILL));
        for pid in pids {
            loop {
                match env.system.waitpid(Some(pid), WaitPidFlag::empty()) {
                    Ok(status @ (WaitStatus::Exited(p, _) | WaitStatus::Signaled(p, ..))) => {
                        env.jobs.record_status(p, status);
                        break;
                    }
                    Ok(_) => continue,
                    Err(nix::Error::EINTR) => continue,
                    Err(_) => break,
                }
            }
        }
    }

    let finished: Vec<usize> = env
        .jobs
        .iter()
        .filter(|(_, job)| matches!(job.state, vsh_env::JobState::Done(_) | vsh_env::JobState::Killed(_)))
        .map(|(id, _)| id)
        .collect();
    for id in finished {
        env.jobs.remove(id);
    }
}

fn wire_stage(env: &mut Env, pipes: &[(i32, i32)], i: usize, n: usize) {
    if i > 0 {
        let (read_fd, _) = pipes[i - 1];
        let _ = env.system.dup2(read_fd, 0);
    }
    if i < n - 1 {
        let (_, write_fd) = pipes[i];
        let _ = env.system.dup2(write_fd, 1);
    }
}

fn reset_child_signal_dispositions(env: &Env) {
    use nix::sys::signal::Signal;
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
