//! Psh builtins
//!
//! Builtins run inside the shell when they make up a whole foreground
//! command, and in a forked child when they are part of a pipeline or run
//! in the background. Where possible the commands conform to their standard
//! Bash counterparts.

use std::iter;

use docopt::Docopt;

use self::prelude::*;
use crate::core::job::{Job, JobId, JobTable};

use self::exit::Exit;
use self::jobs::{Bg, Fg, Jobs};
use self::kill::Kill;

pub mod prelude {
    pub use std::io::Write;
    pub use std::process::ExitStatus;

    pub use super::{parse_args, BuiltinCommand};
    pub use crate::errors::{self, Error, ErrorKind, Result};
    pub use crate::shell::Shell;
    pub use crate::util::PshExitStatusExt;
}

mod exit;
mod jobs;
mod kill;

const BG_NAME: &str = "bg";
const EXIT_NAME: &str = "exit";
const FG_NAME: &str = "fg";
const JOBS_NAME: &str = "jobs";
const KILL_NAME: &str = "kill";

/// Exit status of a builtin called with invalid arguments.
const USAGE_EXIT_STATUS: i32 = 2;

/// Entry point of a builtin: the shell, the arguments after the command
/// name, and the builtin's standard output.
pub type Builtin = fn(&mut Shell, &[String], &mut dyn Write) -> Result<()>;

/// Represents a Psh builtin command such as jobs or kill.
pub trait BuiltinCommand {
    /// The NAME of the command.
    const NAME: &'static str;
    /// The help string to display to the user.
    const HELP: &'static str;
    /// The usage string to display to the user.
    fn usage() -> String {
        Self::HELP.lines().next().unwrap_or_default().to_owned()
    }
    /// Runs the command with the given arguments in the `shell` environment.
    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<()>;
}

pub fn find_builtin(name: &str) -> Option<Builtin> {
    let builtin: Builtin = match name {
        BG_NAME => Bg::run,
        EXIT_NAME => Exit::run,
        FG_NAME => Fg::run,
        JOBS_NAME => Jobs::run,
        KILL_NAME => Kill::run,
        _ => return None,
    };
    Some(builtin)
}

/// Runs `builtin`, reporting its error, if any, on stderr.
pub fn run(shell: &mut Shell, builtin: Builtin, args: &[String], stdout: &mut dyn Write) -> ExitStatus {
    let result = builtin(shell, args, stdout);
    if let Err(ref e) = result {
        let message = e.to_string();
        if !message.is_empty() {
            eprintln!("psh: {}", message);
        }
    }
    get_builtin_exit_status(&result)
}

fn get_builtin_exit_status(result: &Result<()>) -> ExitStatus {
    let status = if let Err(ref e) = *result {
        match *e.kind() {
            ErrorKind::BuiltinCommand(_, code) => code,
            ErrorKind::Docopt(_) => USAGE_EXIT_STATUS,
            _ => 1,
        }
    } else {
        0
    };

    ExitStatus::from_status(status)
}

pub fn parse_args<'de, D, S, I>(usage: &str, program: S, args: I) -> Result<D>
where
    D: serde::Deserialize<'de>,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args = Docopt::new(usage)?
        .argv(iter::once(program).chain(args))
        .help(false)
        .deserialize()?;
    Ok(args)
}

/// Builds the error for invalid arguments to builtin `T`.
fn usage_error<T: BuiltinCommand>(message: &str) -> Error {
    errors::builtin_command(
        format!("{}: {}\n{}", T::NAME, message, T::usage()),
        USAGE_EXIT_STATUS,
    )
}

/// Resolves a job specification: `%n` or `n` names job n; `%`, `%%` and
/// `%+` name the current job; `%word` names the job whose command starts
/// with `word`.
fn parse_jobspec(jobs: &JobTable, spec: &str) -> Option<JobId> {
    let prefixed = spec.starts_with('%');
    let body = if prefixed { &spec[1..] } else { spec };
    match body {
        "" | "%" | "+" if prefixed => jobs.current(),
        _ => match body.parse::<u32>() {
            Ok(n) => jobs.get(JobId(n)).map(Job::id),
            Err(_) if prefixed && !body.is_empty() => jobs
                .jobs()
                .iter()
                .find(|job| job.display_name().starts_with(body))
                .map(Job::id),
            Err(_) => None,
        },
    }
}

/// Finds the job named by `spec`, or the current job, for builtin `T`.
fn find_job<T: BuiltinCommand>(shell: &Shell, spec: Option<&str>) -> Result<JobId> {
    let found = match spec {
        Some(spec) => parse_jobspec(shell.jobs(), spec),
        None => shell.jobs().current(),
    };
    found.ok_or_else(|| {
        errors::no_such_job(format!("{}: {}", T::NAME, spec.unwrap_or("current")))
    })
}
