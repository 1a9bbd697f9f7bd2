use std::fmt;
use std::io::{self, Write};
use std::process::ExitStatus;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::termios::Termios;
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::core::command::Connector;
use crate::errors::Result;
use crate::util::PshExitStatusExt;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessStatus {
    Running,
    Stopped(Signal),
    Exited(i32),
    Signaled(Signal),
}

/// One forked stage of a job.
#[derive(Clone, Debug, PartialEq)]
pub struct Process {
    pid: Pid,
    text: String,
    status: ProcessStatus,
}

impl Process {
    pub fn new<S: Into<String>>(pid: Pid, text: S) -> Self {
        Self {
            pid,
            text: text.into(),
            status: ProcessStatus::Running,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn is_completed(&self) -> bool {
        match self.status {
            ProcessStatus::Exited(_) | ProcessStatus::Signaled(_) => true,
            _ => false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        match self.status {
            ProcessStatus::Stopped(_) => true,
            _ => false,
        }
    }

    /// The status a shell reports for this process, once it has one.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.status {
            ProcessStatus::Running => None,
            ProcessStatus::Exited(code) => Some(ExitStatus::from_status(code)),
            ProcessStatus::Stopped(signal) | ProcessStatus::Signaled(signal) => {
                Some(ExitStatus::from_signal(signal))
            }
        }
    }

    /// Records a status reported by `waitpid`. Returns `true` if the status
    /// changed.
    pub fn update(&mut self, wait_status: WaitStatus) -> bool {
        let status = match wait_status {
            WaitStatus::Exited(pid, code) => {
                debug!("{} exited with {}", pid, code);
                ProcessStatus::Exited(code)
            }
            WaitStatus::Signaled(pid, signal, _) => {
                debug!("{} terminated by signal {:?}", pid, signal);
                ProcessStatus::Signaled(signal)
            }
            WaitStatus::Stopped(pid, signal) => {
                debug!("{} was signaled to stop {:?}", pid, signal);
                ProcessStatus::Stopped(signal)
            }
            WaitStatus::Continued(pid) => {
                debug!("{} continued", pid);
                ProcessStatus::Running
            }
            _ => return false,
        };
        let changed = status != self.status;
        self.status = status;
        changed
    }

    /// `true` while some process, not necessarily a child of this one,
    /// still runs under this pid.
    fn exists(&self) -> bool {
        let no_signal: Option<Signal> = None;
        signal::kill(self.pid, no_signal) != Err(Errno::ESRCH)
    }

    fn mark_lost(&mut self) {
        warn!("{} was reaped elsewhere, assuming it exited", self.pid);
        self.status = ProcessStatus::Exited(0);
    }
}

/// Waits until every process has completed, or with `untraced` until each
/// one has either completed or stopped.
pub fn wait_for_processes(processes: &mut [Process], untraced: bool) -> Result<()> {
    let flags = if untraced {
        Some(WaitPidFlag::WUNTRACED)
    } else {
        None
    };
    for process in processes.iter_mut() {
        while !process.is_completed() && !(untraced && process.is_stopped()) {
            match wait::waitpid(process.pid, flags) {
                Ok(status) => {
                    process.update(status);
                }
                Err(Errno::EINTR) => (),
                Err(Errno::ECHILD) => process.mark_lost(),
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    Running,
    Stopped,
    Signaled(Signal),
    Done(i32),
}

impl JobStatus {
    pub fn is_completed(self) -> bool {
        match self {
            JobStatus::Signaled(_) | JobStatus::Done(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Stopped => write!(f, "Stopped"),
            JobStatus::Done(0) => write!(f, "Done"),
            JobStatus::Done(code) => write!(f, "Exit {}", code),
            JobStatus::Signaled(signal) => write!(f, "{}", signal_description(signal)),
        }
    }
}

fn signal_description(signal: Signal) -> &'static str {
    match signal {
        Signal::SIGHUP => "Hangup",
        Signal::SIGINT => "Interrupt",
        Signal::SIGQUIT => "Quit",
        Signal::SIGABRT => "Aborted",
        Signal::SIGKILL => "Killed",
        Signal::SIGSEGV => "Segmentation fault",
        Signal::SIGPIPE => "Broken pipe",
        Signal::SIGTERM => "Terminated",
        other => other.as_str(),
    }
}

#[derive(Clone, Debug)]
pub struct Job {
    id: JobId,
    pgid: Option<Pid>,
    display_name: String,
    processes: Vec<Process>,
    notified: bool,
    last_running_in_foreground: bool,
    tmodes: Option<Termios>,
}

impl Job {
    pub fn new<S: Into<String>>(
        id: JobId,
        pgid: Option<Pid>,
        display_name: S,
        connector: Connector,
        processes: Vec<Process>,
    ) -> Self {
        Self {
            id,
            pgid,
            display_name: display_name.into(),
            processes,
            notified: false,
            last_running_in_foreground: connector != Connector::Background,
            tmodes: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn pgid(&self) -> Option<Pid> {
        self.pgid
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn processes_mut(&mut self) -> &mut [Process] {
        &mut self.processes
    }

    /// The pid of the last stage.
    pub fn pid(&self) -> Option<Pid> {
        self.processes.last().map(Process::pid)
    }

    pub fn notified(&self) -> bool {
        self.notified
    }

    pub fn last_running_in_foreground(&self) -> bool {
        self.last_running_in_foreground
    }

    pub fn set_last_running_in_foreground(&mut self, foreground: bool) {
        self.last_running_in_foreground = foreground;
    }

    pub fn tmodes(&self) -> Option<&Termios> {
        self.tmodes.as_ref()
    }

    pub fn set_tmodes(&mut self, tmodes: Option<Termios>) {
        self.tmodes = tmodes;
    }

    pub fn status(&self) -> JobStatus {
        if self.is_completed() {
            match self.processes.last().map(Process::status) {
                Some(ProcessStatus::Signaled(signal)) => JobStatus::Signaled(signal),
                Some(ProcessStatus::Exited(code)) => JobStatus::Done(code),
                _ => JobStatus::Done(0),
            }
        } else if self.is_stopped() {
            JobStatus::Stopped
        } else {
            JobStatus::Running
        }
    }

    pub fn is_completed(&self) -> bool {
        self.processes.iter().all(Process::is_completed)
    }

    /// A job is stopped when none of its live processes is running.
    pub fn is_stopped(&self) -> bool {
        self.processes.iter().any(Process::is_stopped)
            && self
                .processes
                .iter()
                .all(|p| p.is_completed() || p.is_stopped())
    }

    /// The status of the last stage, as the shell reports it.
    pub fn exit_status(&self) -> ExitStatus {
        self.processes
            .last()
            .and_then(Process::exit_status)
            .unwrap_or_else(ExitStatus::from_success)
    }

    /// Marks stopped processes running again, before they are continued.
    pub fn mark_running(&mut self) {
        for process in &mut self.processes {
            if process.is_stopped() {
                process.status = ProcessStatus::Running;
            }
        }
        self.notified = false;
    }

    fn reap(&mut self) -> Result<bool> {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        let mut changed = false;
        for process in self.processes.iter_mut().filter(|p| !p.is_completed()) {
            loop {
                match wait::waitpid(process.pid, Some(flags)) {
                    Ok(WaitStatus::StillAlive) => break,
                    Ok(status) => {
                        changed |= process.update(status);
                        break;
                    }
                    Err(Errno::EINTR) => continue,
                    Err(Errno::ECHILD) if process.exists() => break,
                    Err(Errno::ECHILD) => {
                        process.mark_lost();
                        changed = true;
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(changed)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}\t{}", self.id, self.status(), self.display_name)
    }
}

/// The jobs of a session, in the order they were registered.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
    current: Option<JobId>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job under the lowest unused id.
    pub fn register<S: Into<String>>(
        &mut self,
        pgid: Option<Pid>,
        display_name: S,
        connector: Connector,
        processes: Vec<Process>,
    ) -> JobId {
        let id = self.next_id();
        self.insert(Job::new(id, pgid, display_name, connector, processes));
        id
    }

    /// # Panics
    /// Panics if a job with the same id is already in the table.
    pub fn insert(&mut self, job: Job) {
        assert!(self.get(job.id()).is_none(), "job {} registered twice", job.id());
        debug!("job [{}] {}", job.id(), job.display_name());
        self.current = Some(job.id());
        self.jobs.push(job);
    }

    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        let index = self.jobs.iter().position(|job| job.id() == id)?;
        if self.current == Some(id) {
            self.current = None;
        }
        Some(self.jobs.remove(index))
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id() == id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.id() == id)
    }

    /// The job `fg` and `bg` act on by default: the last one stopped or put
    /// in the background, else the most recent one.
    pub fn current(&self) -> Option<JobId> {
        self.current
            .filter(|&id| self.get(id).is_some())
            .or_else(|| self.jobs.last().map(Job::id))
    }

    pub fn set_current(&mut self, id: JobId) {
        self.current = Some(id);
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn has_stopped_jobs(&self) -> bool {
        self.jobs.iter().any(Job::is_stopped)
    }

    /// Collects status changes of every tracked process without blocking.
    /// Returns the jobs whose status changed.
    pub fn reap(&mut self) -> Result<Vec<(JobId, JobStatus)>> {
        let mut changed = Vec::new();
        for job in &mut self.jobs {
            if job.reap()? {
                job.notified = false;
                changed.push((job.id(), job.status()));
            }
        }
        for &(id, status) in &changed {
            if status == JobStatus::Stopped {
                self.current = Some(id);
            }
        }
        Ok(changed)
    }

    /// Reports stopped and finished jobs not reported yet, then drops the
    /// finished ones.
    pub fn do_job_notification(&mut self, out: &mut dyn Write) -> io::Result<()> {
        for job in &mut self.jobs {
            if job.notified {
                continue;
            }
            let status = job.status();
            let report = match status {
                JobStatus::Running => false,
                JobStatus::Stopped => true,
                _ => !job.last_running_in_foreground,
            };
            if report {
                writeln!(out, "{}", job)?;
            }
            job.notified = true;
        }
        self.remove_reported();
        Ok(())
    }

    /// Records that the current state of job `id` has been shown to the user.
    pub fn mark_notified(&mut self, id: JobId) {
        if let Some(job) = self.get_mut(id) {
            job.notified = true;
        }
    }

    /// Drops finished jobs whose end has been reported.
    pub fn remove_reported(&mut self) {
        self.jobs.retain(|job| !(job.notified && job.is_completed()));
    }

    /// Drops every finished job without reporting it, as scripts do.
    pub fn discard_completed(&mut self) {
        self.jobs.retain(|job| {
            if job.is_completed() {
                debug!("discarding job [{}]", job.id());
            }
            !job.is_completed()
        });
    }

    /// Sends `signal` to every process of the job.
    pub fn signal(&self, id: JobId, signal: Signal) -> Result<()> {
        let job = self
            .get(id)
            .ok_or_else(|| crate::errors::no_such_job(format!("%{}", id)))?;
        match job.pgid() {
            Some(pgid) => signal::killpg(pgid, signal)?,
            None => {
                for process in job.processes().iter().filter(|p| !p.is_completed()) {
                    signal::kill(process.pid(), signal)?;
                }
            }
        }
        Ok(())
    }

    /// Hangs up every live job, continuing stopped ones so they see it.
    pub fn hangup_all(&self) {
        for job in self.jobs.iter().filter(|job| !job.is_completed()) {
            info!("sending SIGHUP to job [{}]", job.id());
            log_if_err!(
                self.signal(job.id(), Signal::SIGHUP),
                "failed to hang up job [{}]",
                job.id()
            );
            if job.is_stopped() {
                log_if_err!(
                    self.signal(job.id(), Signal::SIGCONT),
                    "failed to continue job [{}]",
                    job.id()
                );
            }
        }
    }

    fn next_id(&self) -> JobId {
        let mut id = 1;
        while self.get(JobId(id)).is_some() {
            id += 1;
        }
        JobId(id)
    }
}
