//! The job table: one entry per pipeline run in the background or suspended,
//! tracked from fork through the SIGCHLD-driven state transitions
//! `Running -> Stopped -> Running -> Done`. Grounded on the teacher's
//! `Job`/`JobSet` (`yash-env/src/job.rs`), extended with per-process status
//! tracking and job numbering (`%1`, `%+`, `%-`) since spec.md's job control
//! module needs a state machine the teacher's (async, single-pid) `Job`
//! does not model; see DESIGN.md.

use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::error::ExitStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done(ExitStatus),
    /// Terminated by a signal rather than exiting normally.
    Killed(ExitStatus),
}

/// One pipeline's worth of processes, tracked as a unit under one process
/// group (`pgid`). `pids` holds every process in the pipeline in left-to-right
/// order; `last_status` mirrors it one-to-one with the most recent `waitpid`
/// report for that process, or `None` if it has never been reported.
#[derive(Clone, Debug)]
pub struct Job {
    pub pgid: Pid,
    pub pids: Vec<Pid>,
    last_status: Vec<Option<WaitStatus>>,
    pub state: JobState,
    /// Whether this job runs in its own process group (interactive job
    /// control) or shares the shell's.
    pub job_controlled: bool,
    /// The command line text, for `jobs` output.
    pub name: String,
}

impl Job {
    pub fn new(pgid: Pid, pids: Vec<Pid>, job_controlled: bool, name: String) -> Self {
        let last_status = vec![None; pids.len()];
        Job {
            pgid,
            pids,
            last_status,
            state: JobState::Running,
            job_controlled,
            name,
        }
    }

    fn recompute_state(&mut self) {
        let mut all_done = true;
        let mut any_stopped = false;
        for status in &self.last_status {
            match status {
                Some(WaitStatus::Exited(..)) | Some(WaitStatus::Signaled(..)) => {}
                Some(WaitStatus::Stopped(..)) => {
                    all_done = false;
                    any_stopped = true;
                }
                // A continued process is running again; falls through to the
                // `any_stopped`-less Running branch below.
                _ => all_done = false,
            }
        }
        self.state = if all_done {
            let last = self.last_status.last().copied().flatten();
            match last {
                Some(WaitStatus::Signaled(..)) => {
                    JobState::Killed(last.map(ExitStatus::from).unwrap_or_default())
                }
                _ => JobState::Done(last.map(ExitStatus::from).unwrap_or_default()),
            }
        } else if any_stopped {
            JobState::Stopped
        } else {
            JobState::Running
        };
    }
}

/// Collection of jobs, indexed by a stable small integer (`%N`) that is
/// reused once a finished job is removed. Tracks the "current" (`%+`) and
/// "previous" (`%-`) job for `fg`/`bg` with no operand.
#[derive(Debug, Default)]
pub struct JobSet {
    slots: Vec<Option<Job>>,
    current: Option<usize>,
    previous: Option<usize>,
}

impl JobSet {
    pub fn new() -> Self {
        JobSet::default()
    }

    /// Registers a new job and returns its 1-based job number.
    pub fn add(&mut self, job: Job) -> usize {
        let index = match self.slots.iter().position(|slot| slot.is_none()) {
            Some(i) => {
                self.slots[i] = Some(job);
                i
            }
            None => {
                self.slots.push(Some(job));
                self.slots.len() - 1
            }
        };
        self.previous = self.current;
        self.current = Some(index);
        index + 1
    }

    pub fn get(&self, job_id: usize) -> Option<&Job> {
        job_id
            .checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, job_id: usize) -> Option<&mut Job> {
        job_id
            .checked_sub(1)
            .and_then(|i| self.slots.get_mut(i))
            .and_then(|slot| slot.as_mut())
    }

    pub fn remove(&mut self, job_id: usize) -> Option<Job> {
        let index = job_id.checked_sub(1)?;
        let removed = self.slots.get_mut(index)?.take();
        if self.current == Some(index) {
            self.current = self.previous.take();
        } else if self.previous == Some(index) {
            self.previous = None;
        }
        removed
    }

    pub fn find_by_pgid(&self, pgid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(job) if job.pgid == pgid))
            .map(|i| i + 1)
    }

    fn find_containing_pid(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(job) if job.pids.contains(&pid)))
    }

    /// Applies a `waitpid` report to whichever job owns `pid`. Returns the
    /// job number that changed, if any. Called from the shell's reap points,
    /// never from signal-handler context.
    pub fn record_status(&mut self, pid: Pid, status: WaitStatus) -> Option<usize> {
        let index = self.find_containing_pid(pid)?;
        let job = self.slots[index].as_mut().unwrap();
        if let Some(slot) = job.pids.iter().position(|&p| p == pid) {
            job.last_status[slot] = Some(status);
        }
        job.recompute_state();
        log::debug!("job {} -> {:?}", index + 1, job.state);
        Some(index + 1)
    }

    pub fn current_job(&self) -> Option<usize> {
        self.current.map(|i| i + 1)
    }

    pub fn previous_job(&self) -> Option<usize> {
        self.previous.map(|i| i + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Job)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|job| (i + 1, job)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_assigns_sequential_job_numbers_and_reuses_removed_slots() {
        let mut jobs = JobSet::new();
        let id1 = jobs.add(Job::new(Pid::from_raw(10), vec![Pid::from_raw(10)], true, "a".into()));
        let id2 = jobs.add(Job::new(Pid::from_raw(20), vec![Pid::from_raw(20)], true, "b".into()));
        assert_eq!((id1, id2), (1, 2));
        jobs.remove(id1);
        let id3 = jobs.add(Job::new(Pid::from_raw(30), vec![Pid::from_raw(30)], true, "c".into()));
        assert_eq!(id3, 1);
    }

    #[test]
    fn job_is_done_once_every_pid_has_exited() {
        let mut jobs = JobSet::new();
        let pid1 = Pid::from_raw(10);
        let pid2 = Pid::from_raw(11);
        let id = jobs.add(Job::new(pid1, vec![pid1, pid2], true, "a | b".into()));
        jobs.record_status(pid1, WaitStatus::Exited(pid1, 0));
        assert_eq!(jobs.get(id).unwrap().state, JobState::Running);
        jobs.record_status(pid2, WaitStatus::Exited(pid2, 3));
        assert_eq!(jobs.get(id).unwrap().state, JobState::Done(ExitStatus(3)));
    }

    #[test]
    fn stop_signal_marks_job_stopped_until_continued() {
        let mut jobs = JobSet::new();
        let pid = Pid::from_raw(10);
        let id = jobs.add(Job::new(pid, vec![pid], true, "sleep 5".into()));
        jobs.record_status(pid, WaitStatus::Stopped(pid, nix::sys::signal::Signal::SIGTSTP));
        assert_eq!(jobs.get(id).unwrap().state, JobState::Stopped);
        jobs.record_status(pid, WaitStatus::Exited(pid, 0));
        assert_eq!(jobs.get(id).unwrap().state, JobState::Done(ExitStatus(0)));
    }

    #[test]
    fn signaled_exit_is_reported_as_killed_rather_than_done() {
        let mut jobs = JobSet::new();
        let pid = Pid::from_raw(10);
        let id = jobs.add(Job::new(pid, vec![pid], true, "sleep 5".into()));
        jobs.record_status(pid, WaitStatus::Signaled(pid, nix::sys::signal::Signal::SIGKILL, false));
        assert_eq!(jobs.get(id).unwrap().state, JobState::Killed(ExitStatus(137)));
    }

    #[test]
    fn continued_signal_clears_stopped_back_to_running() {
        let mut jobs = JobSet::new();
        let pid = Pid::from_raw(10);
        let id = jobs.add(Job::new(pid, vec![pid], true, "sleep 5".into()));
        jobs.record_status(pid, WaitStatus::Stopped(pid, nix::sys::signal::Signal::SIGTSTP));
        assert_eq!(jobs.get(id).unwrap().state, JobState::Stopped);
        jobs.record_status(pid, WaitStatus::Continued(pid));
        assert_eq!(jobs.get(id).unwrap().state, JobState::Running);
    }

    #[test]
    fn current_and_previous_job_track_most_recent_two_additions() {
        let mut jobs = JobSet::new();
        jobs.add(Job::new(Pid::from_raw(1), vec![Pid::from_raw(1)], true, "a".into()));
        jobs.add(Job::new(Pid::from_raw(2), vec![Pid::from_raw(2)], true, "b".into()));
        assert_eq!(jobs.current_job(), Some(2));
        assert_eq!(jobs.previous_job(), Some(1));
    }
}
