//! An in-memory [`System`] double for unit tests that exercise job-table and
//! redirection bookkeeping without spawning real processes. Grounded on the
//! teacher's `virtual_system.rs`, trimmed to what this crate's tests need:
//! `fork`/`execve` are deliberately unsupported here (tests that need a real
//! child process use [`RealSystem`](crate::system::RealSystem) instead).

use std::cell::RefCell;
use std::convert::Infallible;
use std::ffi::{CStr, CString};
use std::path::PathBuf;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::{ForkResult, Pid};
use nix::Result as NixResult;

use crate::system::System;

/// Records the open/close calls an executor issued, for tests that assert on
/// redirection behavior without a real kernel.
#[derive(Debug, Default)]
pub struct VirtualSystem {
    pub cwd: RefCell<PathBuf>,
    pub opened_paths: RefCell<Vec<String>>,
    pub next_fd: RefCell<i32>,
}

impl VirtualSystem {
    pub fn new() -> Self {
        VirtualSystem {
            cwd: RefCell::new(PathBuf::from("/virtual")),
            opened_paths: RefCell::new(Vec::new()),
            next_fd: RefCell::new(100),
        }
    }
}

impl System for VirtualSystem {
    fn clone_box(&self) -> Box<dyn System> {
        Box::new(VirtualSystem::new())
    }

    unsafe fn fork(&self) -> NixResult<ForkResult> {
        Err(nix::Error::ENOSYS)
    }

    fn execve(&self, _path: &CStr, _args: &[CString], _envs: &[CString]) -> NixResult<Infallible> {
        Err(nix::Error::ENOSYS)
    }

    fn waitpid(&self, _pid: Option<Pid>, _flags: WaitPidFlag) -> NixResult<WaitStatus> {
        Err(nix::Error::ECHILD)
    }

    fn pipe(&self) -> NixResult<(i32, i32)> {
        let mut next = self.next_fd.borrow_mut();
        let r = *next;
        let w = *next + 1;
        *next += 2;
        Ok((r, w))
    }

    fn dup2(&self, _old_fd: i32, new_fd: i32) -> NixResult<i32> {
        Ok(new_fd)
    }

    fn close(&self, _fd: i32) -> NixResult<()> {
        Ok(())
    }

    fn read(&self, _fd: i32, _buf: &mut [u8]) -> NixResult<usize> {
        Ok(0)
    }

    fn write(&self, _fd: i32, buf: &[u8]) -> NixResult<usize> {
        Ok(buf.len())
    }

    fn open(&self, path: &CStr, _flags: OFlag, _mode: Mode) -> NixResult<i32> {
        self.opened_paths
            .borrow_mut()
            .push(path.to_string_lossy().into_owned());
        let mut next = self.next_fd.borrow_mut();
        let fd = *next;
        *next += 1;
        Ok(fd)
    }

    fn getpid(&self) -> Pid {
        Pid::from_raw(1)
    }

    fn getpgrp(&self) -> Pid {
        Pid::from_raw(1)
    }

    fn setpgid(&self, _pid: Pid, _pgid: Pid) -> NixResult<()> {
        Ok(())
    }

    fn tcgetpgrp(&self, _fd: i32) -> NixResult<Pid> {
        Ok(Pid::from_raw(1))
    }

    fn tcsetpgrp(&self, _fd: i32, _pgrp: Pid) -> NixResult<()> {
        Ok(())
    }

    fn kill(&self, _pid: Pid, _signal: Option<Signal>) -> NixResult<()> {
        Ok(())
    }

    fn reset_signal_disposition(&self, _signal: Signal) -> NixResult<()> {
        Ok(())
    }

    fn ignore_signal(&self, _signal: Signal) -> NixResult<()> {
        Ok(())
    }

    fn chdir(&self, path: &CStr) -> NixResult<()> {
        *self.cwd.borrow_mut() = PathBuf::from(path.to_string_lossy().into_owned());
        Ok(())
    }

    fn getcwd(&self) -> std::io::Result<PathBuf> {
        Ok(self.cwd.borrow().clone())
    }

    fn isatty(&self, _fd: i32) -> bool {
        false
    }

    fn is_executable_file(&self, _path: &CStr) -> bool {
        false
    }

    fn exit(&self, code: i32) -> ! {
        panic!("VirtualSystem::exit({code}) called in a test");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_records_the_path() {
        let sys = VirtualSystem::new();
        let path = CString::new("/tmp/out.txt").unwrap();
        sys.open(&path, OFlag::O_WRONLY, Mode::empty()).unwrap();
        assert_eq!(sys.opened_paths.borrow().as_slice(), ["/tmp/out.txt"]);
    }

    #[test]
    fn chdir_updates_cwd() {
        let sys = VirtualSystem::new();
        sys.chdir(&CString::new("/etc").unwrap()).unwrap();
        assert_eq!(sys.getcwd().unwrap(), PathBuf::from("/etc"));
    }
}
