//! Error module. See the [error-chain](https://crates.io/crates/error-chain) crate for details.

use nix::errno::Errno;

error_chain! {
    foreign_links {
        Docopt(::docopt::Error);
        Io(::std::io::Error);
        Logger(::log::SetLoggerError);
        Nix(::nix::Error);
        Readline(::rustyline::error::ReadlineError);
    }

    errors {
        Syntax(token: String) {
            description("syntax error")
            display("syntax error near unexpected token `{}'", token)
        }
        UnexpectedEof(expected: String) {
            description("unexpected end of file")
            display("unexpected end of file while looking for {}", expected)
        }
        Interrupted {
            description("input interrupted")
            display("interrupted")
        }
        CommandNotFound(command: String) {
            description("command not found")
            display("{}: command not found", command)
        }
        NotExecutable(command: String, reason: String) {
            description("command could not be executed")
            display("{}: {}", command, reason)
        }
        ForkFailure(errno: Errno) {
            description("fork failed")
            display("fork: {}", errno.desc())
        }
        RedirectionFailure(path: String, errno: Errno) {
            description("redirection failed")
            display("{}: {}", path, errno.desc())
        }
        NulByte(word: String) {
            description("argument contains a NUL byte")
            display("{}: argument contains a NUL byte", word)
        }
        BuiltinCommand(message: String, code: i32) {
            description("builtin command failed")
            display("{}", message)
        }
        NoSuchJob(job: String) {
            description("no such job")
            display("{}: no such job", job)
        }
    }
}

impl Error {
    /// `true` for errors caused by malformed input rather than by the system.
    pub fn is_syntax(&self) -> bool {
        match *self.kind() {
            ErrorKind::Syntax(_) | ErrorKind::UnexpectedEof(_) => true,
            _ => false,
        }
    }
}

pub(crate) fn syntax<T: AsRef<str>>(token: T) -> Error {
    ErrorKind::Syntax(token.as_ref().to_string()).into()
}

pub(crate) fn unexpected_eof<T: AsRef<str>>(expected: T) -> Error {
    ErrorKind::UnexpectedEof(expected.as_ref().to_string()).into()
}

pub(crate) fn builtin_command<T: AsRef<str>>(message: T, code: i32) -> Error {
    ErrorKind::BuiltinCommand(message.as_ref().to_string(), code).into()
}

pub(crate) fn no_such_job<T: AsRef<str>>(job: T) -> Error {
    ErrorKind::NoSuchJob(job.as_ref().to_string()).into()
}
