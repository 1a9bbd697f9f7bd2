use crate::core::job::Job;
use crate::shell::builtins::{self, prelude::*};

pub struct Jobs;

#[derive(Debug, Deserialize)]
struct JobsArgs {
    arg_jobspec: Vec<String>,
    flag_l: bool,
    flag_p: bool,
}

impl builtins::BuiltinCommand for Jobs {
    const NAME: &'static str = builtins::JOBS_NAME;

    const HELP: &'static str = "\
Usage: jobs [-l | -p] [<jobspec>...]

Display status of jobs.

Lists the active jobs. JOBSPEC restricts output to that job.
Without options, the status of all active jobs is displayed.

Options:
    -l      lists process IDs in addition to the normal information
    -p      lists process IDs only

Exit Status:
Returns success unless an invalid option is given or an error occurs.";

    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<()> {
        let args: JobsArgs = parse_args(Self::HELP, Self::NAME, args.iter().map(String::as_str))?;
        debug!("{:?}", args);

        if !shell.is_subshell() {
            shell.jobs_mut().reap()?;
        }
        let ids: Vec<_> = if args.arg_jobspec.is_empty() {
            shell.jobs().jobs().iter().map(Job::id).collect()
        } else {
            args.arg_jobspec
                .iter()
                .map(|spec| builtins::find_job::<Self>(shell, Some(spec.as_str())))
                .collect::<Result<Vec<_>>>()?
        };

        for &id in &ids {
            let job = match shell.jobs().get(id) {
                Some(job) => job,
                None => continue,
            };
            let processes = job.processes();
            if args.flag_l {
                if let Some(first) = processes.first() {
                    writeln!(
                        stdout,
                        "[{}] {}\t{}\t{}",
                        job.id(),
                        first.pid(),
                        job.status(),
                        first.text()
                    )?;
                }
                for process in processes.iter().skip(1) {
                    writeln!(stdout, "    {}\t\t| {}", process.pid(), process.text())?;
                }
            } else if args.flag_p {
                if let Some(first) = processes.first() {
                    writeln!(stdout, "{}", first.pid())?;
                }
            } else {
                writeln!(stdout, "{}", job)?;
            }
        }

        for &id in &ids {
            shell.jobs_mut().mark_notified(id);
        }
        shell.jobs_mut().remove_reported();
        Ok(())
    }
}

pub struct Fg;

impl builtins::BuiltinCommand for Fg {
    const NAME: &'static str = builtins::FG_NAME;

    const HELP: &'static str = "\
fg: fg [job_spec]
    Move job to the foreground.

    Place the job identified by JOB_SPEC in the foreground, making it
    the current job. If JOB_SPEC is not present, the shell's notion of the
    current job is used.

    Exit Status:
    Status of command placed in foreground or failure if an error occurs.";

    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<()> {
        if args.len() > 1 {
            return Err(builtins::usage_error::<Self>("too many arguments"));
        }
        if !shell.is_job_control_enabled() {
            return Err(errors::builtin_command("fg: no job control", 1));
        }

        let id = builtins::find_job::<Self>(shell, args.first().map(String::as_str))?;
        if let Some(job) = shell.jobs().get(id) {
            writeln!(stdout, "{}", job.display_name())?;
            stdout.flush()?;
        }
        let status = shell.put_job_in_foreground(id)?;
        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(errors::builtin_command("", code)),
            None => Err(errors::builtin_command("", 1)),
        }
    }
}

pub struct Bg;

impl builtins::BuiltinCommand for Bg {
    const NAME: &'static str = builtins::BG_NAME;

    const HELP: &'static str = "\
bg: bg [job_spec ...]
    Move jobs to the background.

    Place the jobs identified by each JOB_SPEC in the background, as if they
    had been started with `&'. If JOB_SPEC is not present, the shell's notion
    of the current job is used.

    Exit Status:
    Returns success unless job control is not enabled or an error occurs.";

    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<()> {
        if !shell.is_job_control_enabled() {
            return Err(errors::builtin_command("bg: no job control", 1));
        }

        let specs: Vec<Option<&str>> = if args.is_empty() {
            vec![None]
        } else {
            args.iter().map(|arg| Some(arg.as_str())).collect()
        };

        let mut failed = false;
        for spec in specs {
            let result = builtins::find_job::<Self>(shell, spec).and_then(|id| {
                let already_running = shell.jobs().get(id).map_or(false, |job| !job.is_stopped());
                if already_running {
                    eprintln!("psh: bg: job {} already in background", id);
                    return Ok(());
                }
                shell.put_job_in_background(id)?;
                if let Some(job) = shell.jobs().get(id) {
                    writeln!(stdout, "[{}] {} &", id, job.display_name())?;
                }
                Ok(())
            });
            if let Err(e) = result {
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

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use nix::sys::signal::Signal;

    use super::*;
    use crate::core::job::JobId;
    use crate::shell::ShellConfig;

    fn run_jobs(shell: &mut Shell, args: &[&str]) -> String {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let mut out = Vec::new();
        Jobs::run(shell, &args, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn wait_until_completed(shell: &mut Shell, id: JobId) {
        for _ in 0..500 {
            shell.jobs_mut().reap().unwrap();
            if shell.jobs().get(id).map_or(true, Job::is_completed) {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("job {} never completed", id);
    }

    #[test]
    fn test_listed_job_is_reported_once() {
        let mut shell = Shell::new(ShellConfig::noninteractive()).unwrap();
        shell.execute_command_string("true &").unwrap();
        wait_until_completed(&mut shell, JobId(1));

        assert_eq!(run_jobs(&mut shell, &[]), "[1] Done\ttrue\n");
        assert!(shell.jobs().is_empty());

        let mut notified = Vec::new();
        shell.jobs_mut().do_job_notification(&mut notified).unwrap();
        assert!(notified.is_empty());
        assert_eq!(run_jobs(&mut shell, &[]), "");
    }

    #[test]
    fn test_subshell_lists_inherited_statuses() {
        let mut shell = Shell::new(ShellConfig::noninteractive()).unwrap();
        shell.execute_command_string("sleep 5 &").unwrap();
        shell.enter_subshell();
        shell.jobs().signal(JobId(1), Signal::SIGKILL).unwrap();
        thread::sleep(Duration::from_millis(100));

        assert_eq!(run_jobs(&mut shell, &[]), "[1] Running\tsleep 5\n");
        assert_eq!(shell.jobs().jobs().len(), 1);
    }
}
