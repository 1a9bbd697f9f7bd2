//! Psh - Shell Module
//!
//! The Shell reads lines, hands them to the parser and runs the resulting
//! commands. It owns the table of background and stopped jobs and the
//! editor that keeps the command history.

use std::env;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{self, ExitStatus};

use nix::sys::signal::Signal;

use crate::core::command::{self, Command, CommandList};
use crate::core::job::{self, JobId, JobTable, Process};
use crate::core::parser::Parser;
use crate::core::variables::{EnvVariables, HomeDirs, Variables};
use crate::editor::{Editor, ScriptLines};
use crate::errors::{self, Error, ErrorKind, Result};
use crate::util::{self, PshExitStatusExt};

use self::builtins::Builtin;
use self::execute_command::{Launcher, SpawnedPipeline};
use self::job_control::TerminalState;
use self::redirect::{PreparedRedirections, SavedFds};

pub mod builtins;
pub mod execute_command;
pub mod job_control;
pub mod redirect;

const HISTORY_FILE_NAME: &str = ".psh_history";
const SYNTAX_ERROR_EXIT_STATUS: i32 = 2;
const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Psh Shell
pub struct Shell {
    /// Responsible for readline and history.
    editor: Editor,
    history_file: Option<PathBuf>,
    jobs: JobTable,
    variables: EnvVariables,
    /// Exit status of last command executed.
    last_exit_status: ExitStatus,
    config: ShellConfig,
    /// Is `false` if the shell is running a script or if initializing job
    /// control fails.
    is_interactive: bool,
    /// Set in forked children, which inherit the job table but not the jobs.
    is_subshell: bool,
    stopped_jobs_warned: bool,
}

impl Shell {
    /// Constructs a new Shell to manage running jobs and command history.
    pub fn new(config: ShellConfig) -> Result<Shell> {
        let mut shell = Shell {
            editor: Editor::with_capacity(config.command_history_capacity),
            history_file: None,
            jobs: JobTable::new(),
            variables: EnvVariables,
            last_exit_status: ExitStatus::from_success(),
            config,
            is_interactive: config.enable_job_control && util::unix::isatty(),
            is_subshell: false,
            stopped_jobs_warned: false,
        };

        if shell.is_interactive {
            let result = job_control::initialize_job_control();
            if let Err(e) = result {
                error!(
                    "failed to initialize shell for job control despite isatty: {}",
                    e
                );
                shell.is_interactive = false;
            }
        }
        job_control::install_sigchld_handler()?;

        if config.enable_command_history {
            shell.load_history()?
        }
        shell.seed_variables();

        info!("psh started up");
        Ok(shell)
    }

    fn load_history(&mut self) -> Result<()> {
        self.history_file = self
            .variables
            .homedir_of(None)
            .map(|p| p.join(HISTORY_FILE_NAME));
        if let Some(ref history_file) = self.history_file {
            self.editor.load_history(history_file)?;
        } else {
            warn!("unable to get home directory")
        }

        Ok(())
    }

    fn seed_variables(&mut self) {
        match env::current_dir() {
            Ok(cwd) => self
                .variables
                .set("PWD", &cwd.to_string_lossy(), false),
            Err(e) => warn!("unable to get current directory: {}", e),
        }
        self.variables.set("PATH", DEFAULT_PATH, false);
    }

    pub fn is_interactive(&self) -> bool {
        self.is_interactive
    }

    pub fn is_subshell(&self) -> bool {
        self.is_subshell
    }

    pub fn is_job_control_enabled(&self) -> bool {
        self.is_interactive
    }

    pub fn last_exit_status(&self) -> ExitStatus {
        self.last_exit_status
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn jobs_mut(&mut self) -> &mut JobTable {
        &mut self.jobs
    }

    /// Custom prompt to output to the user.
    /// Returns `None` when end of file is reached.
    pub fn prompt(&mut self) -> Result<Option<String>> {
        let cwd = env::current_dir().unwrap_or_default();
        let rel = match self.variables.homedir_of(None) {
            Some(ref home) if cwd == *home => PathBuf::from("~"),
            Some(ref home) => match cwd.strip_prefix(home) {
                Ok(rel) => Path::new("~").join(rel),
                Err(_) => cwd.clone(),
            },
            None => cwd.clone(),
        };

        let prompt = format!(
            "{}|{}\n$ ",
            self.last_exit_status.code().unwrap_or_default(),
            rel.display()
        );
        let line = self.editor.readline(&prompt)?;
        Ok(line)
    }

    /// Runs the commands of a string, as given to `psh -c`.
    pub fn execute_command_string(&mut self, input: &str) -> Result<()> {
        self.run_script(&mut ScriptLines::from_string(input))
    }

    /// Runs a psh script from a file.
    pub fn execute_commands_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = File::open(path)?;
        self.run_script(&mut ScriptLines::from_file(file))
    }

    /// Runs commands from stdin until EOF is received: interactively when
    /// stdin is a terminal, as a script otherwise.
    pub fn execute_from_stdin(&mut self) {
        if !util::unix::isatty() {
            let temp_result = self.run_script(&mut ScriptLines::stdin());
            if let Err(ref e) = temp_result {
                eprintln!("psh: {}", e);
            }
            log_if_err!(temp_result, "run_script");
            return;
        }

        loop {
            self.notify_jobs();

            let mut line = match self.prompt() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(ref e) if is_interrupted(e) => {
                    self.last_exit_status = ExitStatus::from_signal(Signal::SIGINT);
                    continue;
                }
                e => {
                    log_if_err!(e, "prompt");
                    continue;
                }
            };

            let parsed = Parser::new(&mut self.editor, &self.variables).parse(&mut line);
            if self.config.enable_command_history && !line.trim().is_empty() {
                self.editor.add_history_entry(&line);
            }
            match parsed {
                Ok(Some(parsed)) => self.execute(&parsed.commands),
                Ok(None) => (),
                Err(ref e) if is_interrupted(e) => {
                    self.last_exit_status = ExitStatus::from_signal(Signal::SIGINT);
                }
                Err(ref e) if e.is_syntax() => self.report_syntax_error(e),
                Err(e) => {
                    error!("failed to read command: {}", e);
                    eprintln!("psh: {}", e);
                }
            }
        }
    }

    /// Runs every line of `lines`. A syntax error stops the script with
    /// status 2. Finished background jobs are dropped silently.
    pub fn run_script(&mut self, lines: &mut ScriptLines) -> Result<()> {
        while let Some(mut line) = lines.next_line()? {
            self.reap_jobs();
            self.jobs.discard_completed();
            let parsed = Parser::new(lines, &self.variables).parse(&mut line);
            match parsed {
                Ok(Some(parsed)) => self.execute(&parsed.commands),
                Ok(None) => (),
                Err(ref e) if e.is_syntax() => {
                    debug!("syntax error on line {}", lines.line_number());
                    self.report_syntax_error(e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn report_syntax_error(&mut self, error: &Error) {
        eprintln!("psh: {}", error);
        self.last_exit_status = ExitStatus::from_status(SYNTAX_ERROR_EXIT_STATUS);
    }

    fn execute(&mut self, commands: &CommandList) {
        debug!("executing {:?}", commands);
        self.last_exit_status = execute_command::run_commands(self, commands);
    }

    /// Collects the status changes of background jobs, if a child has
    /// signaled any.
    pub fn reap_jobs(&mut self) {
        if self.is_subshell || !job_control::take_pending_reap() {
            return;
        }
        match self.jobs.reap() {
            Ok(changed) => {
                for (id, status) in changed {
                    debug!("job [{}] is now {}", id, status);
                }
            }
            Err(e) => error!("failed to reap jobs: {}", e),
        }
    }

    /// Reports stopped and finished jobs, removing the finished ones.
    pub fn notify_jobs(&mut self) {
        self.reap_jobs();
        let temp_result = self.jobs.do_job_notification(&mut io::stdout());
        log_if_err!(temp_result, "do_job_notification");
    }

    /// Runs a builtin inside the shell, with its redirections applied to the
    /// shell's own descriptors for the duration of the call.
    fn run_builtin(&mut self, builtin: Builtin, command: &Command) -> Result<ExitStatus> {
        let redirections = PreparedRedirections::new(command.redirections())?;
        let _saved_fds = SavedFds::save(command.redirections())?;
        if let Err(e) = redirections.apply() {
            eprintln!("psh: {}", e);
            return Ok(ExitStatus::from_failure());
        }
        Ok(builtins::run(
            self,
            builtin,
            command.args(),
            &mut io::stdout(),
        ))
    }

    /// Continues job `id` in the foreground and waits for it to complete or
    /// stop. Returns the job's status.
    pub fn put_job_in_foreground(&mut self, id: JobId) -> Result<ExitStatus> {
        debug!("putting job [{}] in foreground", id);
        let job_control = self.is_job_control_enabled();
        let job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| errors::no_such_job(format!("%{}", id)))?;
        job.set_last_running_in_foreground(true);
        job.mark_running();
        let pgid = job.pgid().filter(|_| job_control);
        let tmodes = job.tmodes().cloned();
        let live = !job.is_completed();

        {
            let _terminal_state = pgid.map(TerminalState::new);
            if let (Some(_), Some(ref tmodes)) = (pgid, tmodes) {
                job_control::set_terminal_modes(tmodes);
            }
            if live {
                self.jobs.signal(id, Signal::SIGCONT)?;
            }

            let job = self
                .jobs
                .get_mut(id)
                .ok_or_else(|| errors::no_such_job(format!("%{}", id)))?;
            job::wait_for_processes(job.processes_mut(), job_control)?;
            if job.is_stopped() {
                job.set_tmodes(job_control::terminal_modes());
            }
        }

        let (status, completed) = match self.jobs.get(id) {
            Some(job) => (job.exit_status(), job.is_completed()),
            None => return Err(errors::no_such_job(format!("%{}", id))),
        };
        if completed {
            self.jobs.remove(id);
        } else {
            self.jobs.set_current(id);
        }
        Ok(status)
    }

    /// Continues job `id` in the background.
    pub fn put_job_in_background(&mut self, id: JobId) -> Result<()> {
        debug!("putting job [{}] in background", id);
        let job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| errors::no_such_job(format!("%{}", id)))?;
        job.set_last_running_in_foreground(false);
        job.mark_running();
        self.jobs.signal(id, Signal::SIGCONT)?;
        self.jobs.set_current(id);
        Ok(())
    }

    /// Returns `false` the first time the shell is asked to exit while jobs
    /// are stopped.
    pub(crate) fn confirm_exit(&mut self) -> bool {
        if self.is_interactive && !self.stopped_jobs_warned && self.jobs.has_stopped_jobs() {
            self.stopped_jobs_warned = true;
            return false;
        }
        true
    }

    /// Turns this copy of the shell into the shell of a forked child: no
    /// job control, history, hang-ups or messages.
    pub(crate) fn enter_subshell(&mut self) {
        self.is_interactive = false;
        self.is_subshell = true;
        self.config = ShellConfig::noninteractive();
    }

    /// Exit the shell.
    ///
    /// Valid exit codes are between 0 and 255. Like bash and its descendents, it automatically
    /// converts exit codes to a u8 such that positive n becomes n & 256 and negative n becomes
    /// (256 + n) % 256.
    ///
    /// Exit the shell with a status of n. If n is None, then the exit status is that of the last
    /// command executed.
    pub fn exit(&mut self, n: Option<ExitStatus>) -> ! {
        if self.config.display_messages {
            println!("exit");
        }

        let code = n
            .unwrap_or(self.last_exit_status)
            .code()
            .unwrap_or_default();
        let code_like_u8 = if code < 0 {
            (256 + code) % 256
        } else {
            code % 256
        };

        if self.config.hangup_on_exit {
            self.jobs.hangup_all();
        }

        if self.config.enable_command_history {
            if let Some(ref history_file) = self.history_file {
                if let Err(e) = self.editor.save_history(history_file) {
                    error!(
                        "error: failed to save history to file during shutdown: {}",
                        e
                    );
                }
            }
        }

        info!("psh has shut down");
        process::exit(code_like_u8);
    }
}

fn is_interrupted(error: &Error) -> bool {
    match *error.kind() {
        ErrorKind::Interrupted => true,
        _ => false,
    }
}

impl Launcher for Shell {
    fn launch_foreground(&mut self, pipeline: &[Command]) -> Result<ExitStatus> {
        if pipeline.len() == 1 {
            if let Some(builtin) = builtins::find_builtin(pipeline[0].program()) {
                return self.run_builtin(builtin, &pipeline[0]);
            }
        }

        let SpawnedPipeline {
            pgid,
            mut processes,
        } = execute_command::spawn_pipeline(self, pipeline, true)?;
        let job_control = self.is_job_control_enabled();
        let mut tmodes = None;
        {
            let _terminal_state = pgid.map(TerminalState::new);
            job::wait_for_processes(&mut processes, job_control)?;
            if processes.iter().any(Process::is_stopped) {
                tmodes = job_control::terminal_modes();
            }
        }

        let status = processes
            .last()
            .and_then(Process::exit_status)
            .unwrap_or_else(ExitStatus::from_success);
        if processes.iter().any(Process::is_stopped) {
            let connector = pipeline[pipeline.len() - 1].kind();
            let id = self.jobs.register(
                pgid,
                command::display_pipeline(pipeline),
                connector,
                processes,
            );
            if let Some(job) = self.jobs.get_mut(id) {
                job.set_tmodes(tmodes);
            }
            info!("job [{}] stopped", id);
        }
        Ok(status)
    }

    fn launch_background(&mut self, pipeline: &[Command]) -> Result<JobId> {
        let SpawnedPipeline { pgid, processes } =
            execute_command::spawn_pipeline(self, pipeline, false)?;
        let last_pid = processes.last().map(Process::pid);
        let connector = pipeline[pipeline.len() - 1].kind();
        let id = self.jobs.register(
            pgid,
            command::display_pipeline(pipeline),
            connector,
            processes,
        );
        if self.is_interactive {
            if let Some(pid) = last_pid {
                eprintln!("[{}] {}", id, pid);
            }
        }
        Ok(id)
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} jobs\n{:?}", self.jobs, self.editor)
    }
}

/// Policy object to control a Shell's behavior
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ShellConfig {
    /// Determines if new command entries will be added to the shell's command history.
    ///
    /// Note: This is checked before the other command history config fields.
    enable_command_history: bool,

    /// Number of entries to store in the shell's command history
    command_history_capacity: usize,

    /// Determines if job control (fg and bg) is supported.
    enable_job_control: bool,

    /// Determines if some messages (e.g. "exit") should be displayed.
    display_messages: bool,

    /// Determines if live jobs are sent SIGHUP when the shell exits.
    hangup_on_exit: bool,
}

impl ShellConfig {
    /// Creates an interactive shell, e.g. command history, job control
    ///
    /// # Complete List
    /// - Command History is enabled
    /// - Job Control is enabled
    /// - Some additional messages are displayed
    /// - Jobs are hung up on exit
    pub fn interactive(command_history_capacity: usize) -> Self {
        Self {
            enable_command_history: true,
            command_history_capacity,
            enable_job_control: true,
            display_messages: true,
            hangup_on_exit: true,
        }
    }

    /// Creates a noninteractive shell, e.g. no command history, no job control
    ///
    /// # Complete List
    /// - Command History is disabled. Commands are not saved.
    /// - Job Control is disabled.
    /// - Fewer messages are displayed
    /// - Jobs keep running after the shell exits
    pub fn noninteractive() -> Self {
        Default::default()
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enable_command_history: false,
            command_history_capacity: 0,
            enable_job_control: false,
            display_messages: false,
            hangup_on_exit: false,
        }
    }
}
