use crate::shell::builtins::{self, prelude::*};

pub struct Exit;

impl builtins::BuiltinCommand for Exit {
    const NAME: &'static str = builtins::EXIT_NAME;

    const HELP: &'static str = "\
exit: exit [n]
    Exit the shell with a status of N. If N is omitted, the exit status
    is that of the last command executed.";

    fn run(shell: &mut Shell, args: &[String], _stdout: &mut dyn Write) -> Result<()> {
        if args.len() > 1 {
            return Err(errors::builtin_command("exit: too many arguments", 1));
        }
        if !shell.confirm_exit() {
            return Err(errors::builtin_command("There are stopped jobs.", 1));
        }

        let status_code = args
            .first()
            .map(|arg| {
                arg.parse::<i32>().unwrap_or_else(|_| {
                    eprintln!("psh: exit: {}: numeric argument required", arg);
                    2
                })
            })
            .map(ExitStatus::from_status);
        shell.exit(status_code);
    }
}
