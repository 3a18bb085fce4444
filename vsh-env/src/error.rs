//! Error type for the system call boundary.

use std::fmt;

/// A failed system call, or a shell-level condition (unknown job, bad fd)
/// raised while servicing one.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("{0}")]
    Sys(#[from] nix::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("no such job: {0}")]
    NoSuchJob(String),
    #[error("not a controlling terminal")]
    NoTerminal,
}

pub type Result<T> = std::result::Result<T, EnvError>;

/// Wraps a raw integer exit/wait status, the shell's `$?` currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ExitStatus(pub i32);

impl ExitStatus {
    pub const SUCCESS: ExitStatus = ExitStatus(0);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<nix::sys::wait::WaitStatus> for ExitStatus {
    fn from(status: nix::sys::wait::WaitStatus) -> Self {
        use nix::sys::wait::WaitStatus::*;
        match status {
            Exited(_, code) => ExitStatus(code),
            Signaled(_, signal, _) => ExitStatus(128 + signal as i32),
            Stopped(_, signal) => ExitStatus(128 + signal as i32),
            _ => ExitStatus(0),
        }
    }
}
