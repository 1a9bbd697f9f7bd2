use std::convert::TryFrom;
use std::str::FromStr;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::shell::builtins::{self, prelude::*};

pub struct Kill;

impl builtins::BuiltinCommand for Kill {
    const NAME: &'static str = builtins::KILL_NAME;

    const HELP: &'static str = "\
kill: kill [-s sigspec | -sigspec] pid | %jobspec ... or kill -l
    Send a signal to a job.

    Send the processes identified by PID or JOBSPEC the signal named by
    SIGSPEC. If SIGSPEC is not present, then SIGTERM is assumed.

    Options:
      -s sig    SIG is a signal name or number
      -l        list the signal names

    Kill is a shell builtin for two reasons: it allows job IDs
    to be used instead of process IDs.

    Exit Status:
    Returns success unless an invalid option is given or an error occurs.";

    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<()> {
        let (signal, targets) = match args.first().map(String::as_str) {
            None => return Err(builtins::usage_error::<Self>("not enough arguments")),
            Some("-l") => return list_signals(stdout),
            Some("-s") => match args.get(1) {
                Some(name) => (parse_signal::<Self>(name)?, &args[2..]),
                None => return Err(builtins::usage_error::<Self>("-s: option requires an argument")),
            },
            Some("--") => (Signal::SIGTERM, &args[1..]),
            Some(arg) if arg.starts_with('-') && arg.len() > 1 => {
                (parse_signal::<Self>(&arg[1..])?, &args[1..])
            }
            Some(_) => (Signal::SIGTERM, args),
        };
        if targets.is_empty() {
            return Err(builtins::usage_error::<Self>("not enough arguments"));
        }

        let mut failed = false;
        for target in targets {
            if let Err(e) = send(shell, target, signal) {
                eprintln!("psh: {}", e);
                failed = true;
            }
        }

        if failed {
            Err(errors::builtin_command("", 1))
        } else {
            Ok(())
        }
    }
}

fn send(shell: &mut Shell, target: &str, signal: Signal) -> Result<()> {
    if target.starts_with('%') {
        let id = builtins::find_job::<Kill>(shell, Some(target))?;
        debug!("sending {} to job [{}]", signal, id);
        shell.jobs().signal(id, signal)?;
        let stopped = shell.jobs().get(id).map_or(false, |job| job.is_stopped());
        if stopped && signal != Signal::SIGCONT && signal != Signal::SIGKILL {
            shell.jobs().signal(id, Signal::SIGCONT)?;
        }
        return Ok(());
    }

    let pid = target.parse::<libc::pid_t>().map_err(|_| {
        errors::builtin_command(
            format!("kill: {}: arguments must be process or job IDs", target),
            1,
        )
    })?;
    debug!("sending {} to {}", signal, pid);
    signal::kill(Pid::from_raw(pid), signal)
        .map_err(|errno| errors::builtin_command(format!("kill: ({}) - {}", pid, errno.desc()), 1))
}

/// Parses a signal name, with or without its `SIG` prefix, or number.
fn parse_signal<T: BuiltinCommand>(spec: &str) -> Result<Signal> {
    let signal = match spec.parse::<i32>() {
        Ok(number) => Signal::try_from(number).ok(),
        Err(_) => {
            let name = spec.to_uppercase();
            if name.starts_with("SIG") {
                Signal::from_str(&name).ok()
            } else {
                Signal::from_str(&format!("SIG{}", name)).ok()
            }
        }
    };
    signal.ok_or_else(|| {
        errors::builtin_command(
            format!("{}: {}: invalid signal specification", T::NAME, spec),
            1,
        )
    })
}

fn list_signals(stdout: &mut dyn Write) -> Result<()> {
    for signal in Signal::iterator() {
        writeln!(stdout, "{:2}) {}", signal as i32, signal.as_str())?;
    }
    Ok(())
}
