#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

use std::io;
use std::path::PathBuf;
use std::process::{self, ExitStatus};
use std::str::FromStr;

use atty::Stream;
use docopt::Docopt;
use log::LevelFilter;
use nix::unistd::Pid;

use psh::errors::*;
use psh::{PshExitStatusExt, Shell, ShellConfig};

const COMMAND_HISTORY_CAPACITY: usize = 1000;
const LOG_FILE_NAME: &str = ".psh_log";
const SCRIPT_NOT_FOUND_EXIT_STATUS: i32 = 127;

const USAGE: &str = "
psh.

Usage:
    psh [options]
    psh [options] -c <command>
    psh [options] <file>
    psh (-h | --help)
    psh --version

Options:
    -h --help            Show this screen.
    --version            Show version.
    -c                   If the -c option is present, then commands are read from the first
                             non-option argument command_string.
    --log=<path>         File to write log to, defaults to ~/.psh_log
    --log-level=<level>  One of off, error, warn, info, debug or trace [default: info].
";

/// Docopts input arguments.
#[derive(Debug, Deserialize)]
struct Args {
    arg_command: Option<String>,
    arg_file: Option<String>,
    flag_version: bool,
    flag_c: bool,
    flag_log: Option<String>,
    flag_log_level: String,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    init_logger(args.flag_log.as_ref(), &args.flag_log_level);
    debug!("{:?}", args);

    if args.flag_version {
        println!("psh version {}", env!("CARGO_PKG_VERSION"));
    } else if args.flag_c || args.arg_file.is_some() {
        execute_from_command_string_or_file(&args);
    } else {
        execute_from_stdin();
    }
}

fn init_logger(path: Option<&String>, level: &str) {
    let log_path = match path.map(PathBuf::from).or_else(default_log_path) {
        Some(log_path) => log_path,
        None => {
            eprintln!("psh: warning: unable to find a home directory for the log file");
            return;
        }
    };
    let level = LevelFilter::from_str(level).unwrap_or_else(|_| {
        eprintln!("psh: warning: unknown log level `{}', using info", level);
        LevelFilter::Info
    });

    if let Err(e) = setup_logger(log_path.clone(), level) {
        eprintln!(
            "psh: warning: unable to log to {}: {}",
            log_path.display(),
            e
        );
    }
}

fn setup_logger(log_path: PathBuf, level: LevelFilter) -> Result<()> {
    let pid = Pid::this();
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                pid,
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(fern::log_file(log_path)?)
        .apply()?;
    Ok(())
}

fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(LOG_FILE_NAME))
}

fn execute_from_command_string_or_file(args: &Args) -> ! {
    let shell_config = ShellConfig::noninteractive();
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));

    let result = if let Some(ref command) = args.arg_command {
        shell.execute_command_string(command)
    } else if let Some(ref file_path) = args.arg_file {
        shell
            .execute_commands_from_file(file_path)
            .map_err(|e| script_error(file_path, e))
    } else {
        unreachable!();
    };

    exit(result, &mut shell);
}

fn script_error(file_path: &str, error: Error) -> Error {
    let not_found = match *error.kind() {
        ErrorKind::Io(ref inner) => inner.kind() == io::ErrorKind::NotFound,
        _ => false,
    };
    if not_found {
        ErrorKind::BuiltinCommand(
            format!("{}: No such file or directory", file_path),
            SCRIPT_NOT_FOUND_EXIT_STATUS,
        )
        .into()
    } else {
        error
    }
}

fn execute_from_stdin() -> ! {
    let shell_config = if atty::is(Stream::Stdin) {
        ShellConfig::interactive(COMMAND_HISTORY_CAPACITY)
    } else {
        ShellConfig::noninteractive()
    };
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));
    shell.execute_from_stdin();
    shell.exit(None)
}

fn display_error_and_exit(error: &Error) -> ! {
    error!("failed to create shell: {}", error);
    eprintln!("psh: {}", error);
    process::exit(ExitStatus::from_failure().code().unwrap_or(1));
}

fn exit(result: Result<()>, shell: &mut Shell) -> ! {
    if let Err(e) = result {
        error!("{}", e);
        eprintln!("psh: {}", e);
        let code = match *e.kind() {
            ErrorKind::BuiltinCommand(_, code) => code,
            _ => 1,
        };
        shell.exit(Some(ExitStatus::from_status(code)));
    } else {
        shell.exit(None);
    }
}
