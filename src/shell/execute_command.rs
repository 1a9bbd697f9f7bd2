//! Running parsed commands: sequencing pipelines by their connectors, and
//! forking the processes of a pipeline.

use std::ffi::CString;
use std::fs::File;
use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::process::ExitStatus;

use nix::errno::Errno;
use nix::unistd::{self, ForkResult, Pid};

use crate::core::command::{Command, CommandList, Connector};
use crate::core::job::{self, JobId, Process};
use crate::errors::{Error, ErrorKind, Result};
use crate::shell::builtins;
use crate::shell::job_control;
use crate::shell::redirect::PreparedRedirections;
use crate::shell::Shell;
use crate::util::{self, PshExitStatusExt};

pub const COMMAND_NOT_FOUND_EXIT_STATUS: i32 = 127;
pub const NOT_EXECUTABLE_EXIT_STATUS: i32 = 126;

/// Starts pipelines on behalf of [`run_commands`].
pub trait Launcher {
    /// Runs the pipeline and waits for it to complete or stop.
    fn launch_foreground(&mut self, pipeline: &[Command]) -> Result<ExitStatus>;

    /// Starts the pipeline without waiting for it.
    fn launch_background(&mut self, pipeline: &[Command]) -> Result<JobId>;
}

/// Runs every pipeline of `commands`, gating each one on the connector that
/// precedes it: `&&` runs it only after success, `||` only after failure.
/// A skipped pipeline leaves the status alone and hands its own connector
/// to the next one.
///
/// Returns the status of the last pipeline that ran.
pub fn run_commands<L: Launcher + ?Sized>(launcher: &mut L, commands: &CommandList) -> ExitStatus {
    let mut status = ExitStatus::from_success();
    let mut previous = Connector::Sequential;
    for pipeline in commands.pipelines() {
        let connector = pipeline[pipeline.len() - 1].kind();
        let should_run = match previous {
            Connector::And => status.success(),
            Connector::Or => !status.success(),
            _ => true,
        };

        if should_run {
            status = if connector == Connector::Background {
                match launcher.launch_background(pipeline) {
                    Ok(_) => ExitStatus::from_success(),
                    Err(e) => launch_failed(&e),
                }
            } else {
                match launcher.launch_foreground(pipeline) {
                    Ok(status) => status,
                    Err(e) => launch_failed(&e),
                }
            };
        } else {
            debug!("skipping {:?}", pipeline);
        }
        previous = connector;
    }
    status
}

fn launch_failed(error: &Error) -> ExitStatus {
    error!("failed to launch pipeline: {}", error);
    eprintln!("psh: {}", error);
    ExitStatus::from_failure()
}

/// The processes of a pipeline that was just forked.
#[derive(Debug)]
pub struct SpawnedPipeline {
    /// Process group of the pipeline, when job control is on.
    pub pgid: Option<Pid>,
    pub processes: Vec<Process>,
}

/// Forks one process per stage of `pipeline`, connecting each stage's
/// stdout to the next stage's stdin.
///
/// If a stage cannot be started, the stages already running are waited for
/// and the error is returned.
pub fn spawn_pipeline(
    shell: &mut Shell,
    pipeline: &[Command],
    foreground: bool,
) -> Result<SpawnedPipeline> {
    let mut spawned = SpawnedPipeline {
        pgid: None,
        processes: Vec::with_capacity(pipeline.len()),
    };
    if let Err(e) = spawn_stages(shell, pipeline, foreground, &mut spawned) {
        let temp_result = job::wait_for_processes(&mut spawned.processes, false);
        log_if_err!(temp_result, "failed to wait for partial pipeline");
        return Err(e);
    }
    if !shell.is_job_control_enabled() {
        spawned.pgid = None;
    }
    Ok(spawned)
}

fn spawn_stages(
    shell: &mut Shell,
    pipeline: &[Command],
    foreground: bool,
    spawned: &mut SpawnedPipeline,
) -> Result<()> {
    let job_control = shell.is_job_control_enabled();
    let mut stdin: Option<File> = None;
    for (index, command) in pipeline.iter().enumerate() {
        let (next_stdin, stdout) = if index + 1 < pipeline.len() {
            let (read_end, write_end) = create_pipe()?;
            (Some(read_end), Some(write_end))
        } else {
            (None, None)
        };
        let redirections = PreparedRedirections::new(command.redirections())?;
        // The child must not inherit unwritten output.
        let temp_result = io::stdout().flush();
        log_if_err!(temp_result, "failed to flush stdout");

        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                drop(next_stdin);
                let stage = Stage {
                    pgid: spawned.pgid,
                    job_control,
                    foreground,
                    stdin: stdin.take(),
                    stdout,
                };
                run_child(shell, command, stage, &redirections);
            }
            Ok(ForkResult::Parent { child }) => {
                let pgid = *spawned.pgid.get_or_insert(child);
                if job_control {
                    let temp_result = unistd::setpgid(child, pgid);
                    log_if_err!(temp_result, "failed to set pgid ({}) for pid ({})", pgid, child);
                }
                debug!("spawned {} for `{}`", child, command);
                spawned.processes.push(Process::new(child, command.to_string()));
            }
            Err(errno) => return Err(ErrorKind::ForkFailure(errno).into()),
        }
        stdin = next_stdin;
    }
    Ok(())
}

/// Wraps `unistd::pipe()` to return RAII structs instead of raw, owning file descriptors.
/// Returns (`read_end_pipe`, `write_end_pipe`)
fn create_pipe() -> Result<(File, File)> {
    let (read_end_pipe, write_end_pipe) = unistd::pipe()?;
    unsafe {
        Ok((
            File::from_raw_fd(read_end_pipe),
            File::from_raw_fd(write_end_pipe),
        ))
    }
}

/// What a forked stage needs to set itself up.
struct Stage {
    pgid: Option<Pid>,
    job_control: bool,
    foreground: bool,
    stdin: Option<File>,
    stdout: Option<File>,
}

fn run_child(
    shell: &mut Shell,
    command: &Command,
    stage: Stage,
    redirections: &PreparedRedirections<'_>,
) -> ! {
    if stage.job_control {
        let pid = unistd::getpid();
        let pgid = stage.pgid.unwrap_or(pid);
        let _ = unistd::setpgid(pid, pgid);
        if stage.foreground {
            let _ = unistd::tcsetpgrp(util::unix::get_terminal(), pgid);
        }
    }
    job_control::reset_signal_handlers();
    shell.enter_subshell();

    if let Some(stdin) = stage.stdin {
        if unistd::dup2(stdin.as_raw_fd(), libc::STDIN_FILENO).is_err() {
            exit_child(1);
        }
    }
    if let Some(stdout) = stage.stdout {
        if unistd::dup2(stdout.as_raw_fd(), libc::STDOUT_FILENO).is_err() {
            exit_child(1);
        }
    }
    if let Err(e) = redirections.apply() {
        eprintln!("psh: {}", e);
        exit_child(1);
    }

    if let Some(builtin) = builtins::find_builtin(command.program()) {
        let status = builtins::run(shell, builtin, command.args(), &mut io::stdout());
        let _ = io::stdout().flush();
        exit_child(status.code().unwrap_or(1));
    }

    let error = exec(command);
    eprintln!("psh: {}", error);
    match *error.kind() {
        ErrorKind::CommandNotFound(_) => exit_child(COMMAND_NOT_FOUND_EXIT_STATUS),
        _ => exit_child(NOT_EXECUTABLE_EXIT_STATUS),
    }
}

/// Replaces the process image; only returns on failure.
fn exec(command: &Command) -> Error {
    let argv = command
        .argv()
        .iter()
        .map(|arg| {
            CString::new(arg.as_bytes()).map_err(|_| Error::from(ErrorKind::NulByte(arg.clone())))
        })
        .collect::<Result<Vec<_>>>();
    let argv = match argv {
        Ok(argv) => argv,
        Err(e) => return e,
    };

    let program = command.program();
    match unistd::execvp(&argv[0], &argv) {
        Ok(never) => match never {},
        Err(Errno::ENOENT) if !program.contains('/') => {
            ErrorKind::CommandNotFound(program.to_string()).into()
        }
        Err(errno) => ErrorKind::NotExecutable(program.to_string(), errno.desc().to_string()).into(),
    }
}

/// Leaves a forked child without running the parent's exit handlers.
fn exit_child(code: i32) -> ! {
    unsafe { libc::_exit(code) }
}
