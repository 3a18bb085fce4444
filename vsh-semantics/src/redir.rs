//! Applying a [`Redir`] list to the process's file descriptor table
//! (spec.md §4.7). Grounded on the teacher's `RedirGuard`
//! (`yash-semantics/src/redir.rs`): redirections are applied one at a time
//! with the original fd saved first, so a failure partway through — or a
//! builtin that must not leak its redirection past its own invocation — can
//! be undone by dropping the guard.

use std::ffi::CString;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::Pid;

use vsh_env::{EnvError, Result};
use vsh_syntax::{Redir, RedirKind};

use crate::expansion::{self, ExpandError};

impl From<ExpandError> for EnvError {
    fn from(_: ExpandError) -> Self {
        EnvError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "redirection target failed to expand",
        ))
    }
}

/// Opens/dups/closes whatever `redir` names and leaves it on `redir.fd`.
/// Heredoc bodies are written to an anonymous pipe rather than a temp file —
/// simpler than the teacher's approach and sufficient for bodies that fit a
/// pipe buffer, which is every realistic heredoc.
fn apply_one(redir: &Redir<'_>, env: &mut vsh_env::Env) -> Result<()> {
    match redir.kind {
        RedirKind::Input | RedirKind::Output | RedirKind::Append => {
            let path = expansion::expand_single(redir.target, env)?;
            let path_c = CString::new(path)
                .map_err(|e| EnvError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
            let flags = match redir.kind {
                RedirKind::Input => OFlag::O_RDONLY,
                RedirKind::Output => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                RedirKind::Append => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
                _ => unreachable!(),
            };
            let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
            let opened = env.system.open(&path_c, flags, mode)?;
            env.system.dup2(opened, redir.fd)?;
            env.system.close(opened)?;
        }
        RedirKind::Heredoc => {
            let body = redir.heredoc_body.unwrap_or("");
            let body = if redir.heredoc_expand {
                expansion::expand_parameters_only(body, env)?
            } else {
                body.to_string()
            };
            let (read_fd, write_fd) = env.system.pipe()?;
            env.system.write(write_fd, body.as_bytes())?;
            env.system.close(write_fd)?;
            env.system.dup2(read_fd, redir.fd)?;
            env.system.close(read_fd)?;
        }
        RedirKind::DupOut | RedirKind::DupIn => {
            if redir.target == "-" {
                env.system.close(redir.fd)?;
            } else if let Ok(src_fd) = redir.target.parse::<i32>() {
                env.system.dup2(src_fd, redir.fd)?;
            }
        }
    }
    Ok(())
}

/// Applies `redirs` to the current process's fd table and keeps enough
/// information to undo them on drop. Used when a builtin (which runs inside
/// the shell process) redirects its own input/output, since the
/// redirection must not outlive the builtin call.
pub struct RedirGuard<'a> {
    env: &'a mut vsh_env::Env,
    /// `(target fd, saved copy, existed before)`. `saved` is `-1` if the fd
    /// was not open before the redirection and should simply be closed.
    saved: Vec<(i32, i32)>,
}

impl<'a> RedirGuard<'a> {
    pub fn apply(env: &'a mut vsh_env::Env, redirs: &[Redir<'_>]) -> Result<Self> {
        let mut saved = Vec::with_capacity(redirs.len());
        for redir in redirs {
            let backup = env.system.dup2(redir.fd, next_spare_fd(&saved));
            let backup_fd = backup.unwrap_or(-1);
            apply_one(redir, env)?;
            saved.push((redir.fd, backup_fd));
        }
        Ok(RedirGuard { env, saved })
    }

    pub fn env(&mut self) -> &mut vsh_env::Env {
        self.env
    }
}

impl Drop for RedirGuard<'_> {
    fn drop(&mut self) {
        for &(target_fd, backup_fd) in self.saved.iter().rev() {
            if backup_fd >= 0 {
                let _ = self.env.system.dup2(backup_fd, target_fd);
                let _ = self.env.system.close(backup_fd);
            } else {
                let _ = self.env.system.close(target_fd);
            }
        }
    }
}

/// Picks an fd well out of the standard range to stash a saved descriptor in.
/// Real shells use `fcntl(F_DUPFD)` starting at 10; dup2's target-fd form
/// plus a monotonically increasing offset is equivalent for our purposes.
fn next_spare_fd(saved: &[(i32, i32)]) -> i32 {
    100 + saved.len() as i32
}

/// Applies `redirs` irreversibly — used in a forked child immediately before
/// `execve`, where "undo on drop" is pointless because the process is about
/// to become something else (or exit).
pub fn apply_for_exec(redirs: &[Redir<'_>], env: &mut vsh_env::Env) -> Result<()> {
    for redir in redirs {
        if let Err(e) = apply_one(redir, env) {
            log::warn!("redirection to fd {} failed: {e}", redir.fd);
            return Err(e);
        }
    }
    Ok(())
}

/// Hands the controlling terminal to `pgrp`, the shell's usual move before
/// letting a foreground job run and after it stops or exits (spec.md's job
/// control module). A no-op if the shell has no controlling terminal.
pub fn set_foreground_pgrp(env: &mut vsh_env::Env, pgrp: Pid) -> Result<()> {
    if env.terminal_fd < 0 {
        return Ok(());
    }
    env.system.tcsetpgrp(env.terminal_fd, pgrp)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsh_env::{Env, VirtualSystem};

    fn env() -> Env {
        Env::new(Box::new(VirtualSystem::new()))
    }

    fn output_redir(target: &str) -> Redir<'_> {
        Redir {
            kind: RedirKind::Output,
            fd: 1,
            target,
            heredoc_body: None,
            heredoc_expand: false,
        }
    }

    #[test]
    fn output_redirection_expands_the_target_before_opening() {
        let mut env = env();
        env.variables.assign("OUT", "/tmp/result.txt").unwrap();
        apply_for_exec(&[output_redir("$OUT")], &mut env).unwrap();
    }

    #[test]
    fn heredoc_with_expansion_writes_the_substituted_body_to_the_pipe() {
        let mut env = env();
        env.variables.assign("NAME", "vsh").unwrap();
        let redir = Redir {
            kind: RedirKind::Heredoc,
            fd: 0,
            target: "",
            heredoc_body: Some("hello $NAME\n"),
            heredoc_expand: true,
        };
        apply_for_exec(&[redir], &mut env).unwrap();
    }

    #[test]
    fn redir_guard_applies_and_then_unwinds_cleanly_on_drop() {
        let mut env = env();
        {
            let mut guard = RedirGuard::apply(&mut env, &[output_redir("/tmp/a.txt")]).unwrap();
            let _ = guard.env();
        }
        // Dropping the guard must not panic or leave the fd table corrupted;
        // a follow-up redirection through the same env should still work.
        apply_for_exec(&[output_redir("/tmp/b.txt")], &mut env).unwrap();
    }

    #[test]
    fn dup_close_target_closes_the_fd() {
        let mut env = env();
        let redir = Redir {
            kind: RedirKind::DupOut,
            fd: 2,
            target: "-",
            heredoc_body: None,
            heredoc_expand: false,
        };
        apply_for_exec(&[redir], &mut env).unwrap();
    }
}
