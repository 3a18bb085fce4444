//! Abstraction over the system calls the executor needs, so the executor can
//! be driven by a real kernel ([`RealSystem`]) or an in-memory double
//! ([`crate::virtual_system::VirtualSystem`]) in tests. Grounded on the
//! teacher's `System`/`RealSystem` split (`yash-env/src/system.rs`,
//! `yash-env/src/real_system.rs`), simplified to plain blocking calls since
//! this crate has no async executor.

use std::convert::Infallible;
use std::ffi::{CStr, CString};
use std::path::PathBuf;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::{ForkResult, Pid};
use nix::Result as NixResult;

/// Everything the executor, job table, and redirection applier need from the
/// operating system. Every method maps to one (or a small fixed sequence of)
/// syscalls; none of them interpret shell semantics.
pub trait System: std::fmt::Debug {
    fn clone_box(&self) -> Box<dyn System>;

    /// Forks the process. Safety: the child must not allocate or touch
    /// non-async-signal-safe state before calling `execve` or `exit`.
    unsafe fn fork(&self) -> NixResult<ForkResult>;

    fn execve(&self, path: &CStr, args: &[CString], envs: &[CString]) -> NixResult<Infallible>;

    fn waitpid(&self, pid: Option<Pid>, flags: WaitPidFlag) -> NixResult<WaitStatus>;

    fn pipe(&self) -> NixResult<(i32, i32)>;
    fn dup2(&self, old_fd: i32, new_fd: i32) -> NixResult<i32>;
    fn close(&self, fd: i32) -> NixResult<()>;
    fn open(&self, path: &CStr, flags: OFlag, mode: Mode) -> NixResult<i32>;
    fn read(&self, fd: i32, buf: &mut [u8]) -> NixResult<usize>;
    fn write(&self, fd: i32, buf: &[u8]) -> NixResult<usize>;

    fn getpid(&self) -> Pid;
    fn getpgrp(&self) -> Pid;
    fn setpgid(&self, pid: Pid, pgid: Pid) -> NixResult<()>;
    fn tcgetpgrp(&self, fd: i32) -> NixResult<Pid>;
    fn tcsetpgrp(&self, fd: i32, pgrp: Pid) -> NixResult<()>;
    fn kill(&self, pid: Pid, signal: Option<Signal>) -> NixResult<()>;

    /// Resets `signal`'s disposition to `SIG_DFL`. Every forked child calls
    /// this for SIGINT/SIGQUIT/SIGTSTP/SIGTTIN/SIGTTOU/SIGCHLD before
    /// running its stage (spec.md §4.5's child signal discipline), since the
    /// shell itself runs with those signals ignored or handled.
    fn reset_signal_disposition(&self, signal: Signal) -> NixResult<()>;

    /// Sets `signal`'s disposition to `SIG_IGN`. The shell itself ignores
    /// SIGINT/SIGQUIT/SIGTSTP/SIGTTIN/SIGTTOU/SIGPIPE for the reasons given
    /// in spec.md §6; every forked child undoes this via
    /// [`reset_signal_disposition`](Self::reset_signal_disposition).
    fn ignore_signal(&self, signal: Signal) -> NixResult<()>;

    fn chdir(&self, path: &CStr) -> NixResult<()>;
    fn getcwd(&self) -> std::io::Result<PathBuf>;
    fn isatty(&self, fd: i32) -> bool;

    fn is_executable_file(&self, path: &CStr) -> bool;

    fn exit(&self, code: i32) -> !;
}

/// The real system: every method is a thin wrapper around `nix`/`libc`.
/// Holds no state — the operating system is the state.
#[derive(Debug)]
pub struct RealSystem;

impl System for RealSystem {
    fn clone_box(&self) -> Box<dyn System> {
        Box::new(RealSystem)
    }

    unsafe fn fork(&self) -> NixResult<ForkResult> {
        nix::unistd::fork()
    }

    fn execve(&self, path: &CStr, args: &[CString], envs: &[CString]) -> NixResult<Infallible> {
        loop {
            let result = nix::unistd::execve(path, args, envs);
            if !matches!(result, Err(nix::Error::EINTR)) {
                return result;
            }
        }
    }

    fn waitpid(&self, pid: Option<Pid>, flags: WaitPidFlag) -> NixResult<WaitStatus> {
        nix::sys::wait::waitpid(pid, Some(flags))
    }

    fn pipe(&self) -> NixResult<(i32, i32)> {
        nix::unistd::pipe()
    }

    fn dup2(&self, old_fd: i32, new_fd: i32) -> NixResult<i32> {
        nix::unistd::dup2(old_fd, new_fd)
    }

    fn close(&self, fd: i32) -> NixResult<()> {
        nix::unistd::close(fd)
    }

    fn open(&self, path: &CStr, flags: OFlag, mode: Mode) -> NixResult<i32> {
        nix::fcntl::open(path, flags, mode)
    }

    fn read(&self, fd: i32, buf: &mut [u8]) -> NixResult<usize> {
        nix::unistd::read(fd, buf)
    }

    fn write(&self, fd: i32, buf: &[u8]) -> NixResult<usize> {
        nix::unistd::write(fd, buf)
    }

    fn getpid(&self) -> Pid {
        nix::unistd::getpid()
    }

    fn getpgrp(&self) -> Pid {
        nix::unistd::getpgrp()
    }

    fn setpgid(&self, pid: Pid, pgid: Pid) -> NixResult<()> {
        nix::unistd::setpgid(pid, pgid)
    }

    fn tcgetpgrp(&self, fd: i32) -> NixResult<Pid> {
        nix::unistd::tcgetpgrp(fd)
    }

    fn tcsetpgrp(&self, fd: i32, pgrp: Pid) -> NixResult<()> {
        nix::unistd::tcsetpgrp(fd, pgrp)
    }

    fn kill(&self, pid: Pid, signal: Option<Signal>) -> NixResult<()> {
        nix::sys::signal::kill(pid, signal)
    }

    fn reset_signal_disposition(&self, signal: Signal) -> NixResult<()> {
        // SAFETY: SIG_DFL is always a valid disposition to install.
        unsafe { nix::sys::signal::signal(signal, nix::sys::signal::SigHandler::SigDfl) }
            .map(|_| ())
    }

    fn ignore_signal(&self, signal: Signal) -> NixResult<()> {
        // SAFETY: SIG_IGN is always a valid disposition to install.
        unsafe { nix::sys::signal::signal(signal, nix::sys::signal::SigHandler::SigIgn) }
            .map(|_| ())
    }

    fn chdir(&self, path: &CStr) -> NixResult<()> {
        nix::unistd::chdir(path)
    }

    fn getcwd(&self) -> std::io::Result<PathBuf> {
        std::env::current_dir()
    }

    fn isatty(&self, fd: i32) -> bool {
        nix::unistd::isatty(fd).unwrap_or(false)
    }

    fn is_executable_file(&self, path: &CStr) -> bool {
        let regular = nix::sys::stat::stat(path)
            .map(|st| st.st_mode & libc::S_IFMT == libc::S_IFREG)
            .unwrap_or(false);
        regular && nix::unistd::access(path, nix::unistd::AccessFlags::X_OK).is_ok()
    }

    fn exit(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}
