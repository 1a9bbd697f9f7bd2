//! Sources of input lines: the interactive line editor, and the lines of a
//! script or `-c` string.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::os::unix::io::RawFd;
use std::path::Path;

use nix::errno::Errno;
use nix::unistd;

use rustyline::{
    self,
    completion::{Completer, FilenameCompleter, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    validate::Validator,
    CompletionType, Config, Helper,
};

use crate::core::parser::LineReader;
use crate::errors::{ErrorKind, Result};

struct EditorHelper(FilenameCompleter);

impl Completer for EditorHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> ::std::result::Result<(usize, Vec<Pair>), ReadlineError> {
        self.0.complete(line, pos, ctx)
    }
}

impl Hinter for EditorHelper {
    type Hint = String;
}

impl Highlighter for EditorHelper {}

impl Validator for EditorHelper {}

impl Helper for EditorHelper {}

/// Interactive line editor with command history.
pub struct Editor {
    internal: rustyline::Editor<EditorHelper>,
    history_capacity: usize,
}

impl Editor {
    pub fn with_capacity(history_capacity: usize) -> Editor {
        let config = Config::builder()
            .max_history_size(history_capacity)
            .history_ignore_space(true)
            .completion_type(CompletionType::Circular)
            .build();

        let mut internal = rustyline::Editor::with_config(config);
        internal.set_helper(Some(EditorHelper(FilenameCompleter::new())));

        Editor {
            internal,
            history_capacity,
        }
    }

    /// Reads a line. Returns `None` at end of input; Ctrl-C is reported as
    /// `ErrorKind::Interrupted`.
    pub fn readline(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.internal.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Interrupted) => Err(ErrorKind::Interrupted.into()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn load_history<P: AsRef<Path> + ?Sized>(&mut self, path: &P) -> Result<()> {
        match self.internal.load_history(path) {
            Ok(()) => Ok(()),
            Err(ReadlineError::Io(ref inner)) if inner.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_history<P: AsRef<Path> + ?Sized>(&mut self, path: &P) -> Result<()> {
        self.internal.save_history(path)?;
        Ok(())
    }

    pub fn add_history_entry(&mut self, line: &str) {
        self.internal.add_history_entry(line);
    }

    pub fn history_len(&self) -> usize {
        self.internal.history().len()
    }
}

impl LineReader for Editor {
    fn read_more(&mut self, prompt: &str) -> Result<Option<String>> {
        self.readline(prompt)
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "history: {}", self.history_len())?;
        write!(f, "capacity: {}", self.history_capacity)
    }
}

/// The lines of a script file, of a `-c` command string, or of a
/// non-terminal stdin.
pub struct ScriptLines {
    reader: Box<dyn BufRead>,
    line_number: usize,
}

impl ScriptLines {
    pub fn new<R: BufRead + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(reader),
            line_number: 0,
        }
    }

    pub fn from_string<S: Into<String>>(input: S) -> Self {
        Self::new(Cursor::new(input.into()))
    }

    pub fn from_file(file: File) -> Self {
        Self::new(BufReader::new(file))
    }

    /// Lines of the shell's stdin, read one byte at a time so that commands
    /// reading the same stdin find the input after the current line.
    pub fn stdin() -> Self {
        Self::unbuffered(libc::STDIN_FILENO)
    }

    fn unbuffered(fd: RawFd) -> Self {
        Self::new(BufReader::with_capacity(1, FdReader(fd)))
    }

    /// Number of lines read so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Reads the next line without its line terminator.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        self.line_number += 1;
        Ok(Some(line))
    }
}

impl LineReader for ScriptLines {
    fn read_more(&mut self, _prompt: &str) -> Result<Option<String>> {
        self.next_line()
    }
}

/// Reads straight from a descriptor, bypassing the buffer of `io::stdin()`.
struct FdReader(RawFd);

impl Read for FdReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match unistd::read(self.0, buf) {
                Err(Errno::EINTR) => continue,
                result => return result.map_err(io::Error::from),
            }
        }
    }
}

impl fmt::Debug for ScriptLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptLines {{ line_number: {} }}", self.line_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_with_capacity() {
        let editor = Editor::with_capacity(10);
        assert_eq!(editor.history_len(), 0);
        assert_eq!(editor.history_capacity, 10);
    }

    #[test]
    fn add_history_entry_duplicate() {
        let mut editor = Editor::with_capacity(2);
        editor.add_history_entry("dup");
        editor.add_history_entry("dup");
        assert_eq!(editor.history_len(), 1);
    }

    #[test]
    fn ignores_lines_starting_with_space() {
        let mut editor = Editor::with_capacity(2);
        editor.add_history_entry(" secret");
        assert_eq!(editor.history_len(), 0);
    }

    #[test]
    fn script_lines() {
        let mut lines = ScriptLines::from_string("echo a\r\necho b\n\nlast");
        assert_eq!(lines.next_line().unwrap(), Some("echo a".to_string()));
        assert_eq!(lines.read_more("> ").unwrap(), Some("echo b".to_string()));
        assert_eq!(lines.next_line().unwrap(), Some(String::new()));
        assert_eq!(lines.next_line().unwrap(), Some("last".to_string()));
        assert_eq!(lines.next_line().unwrap(), None);
        assert_eq!(lines.line_number(), 4);
    }

    #[test]
    fn unbuffered_lines_leave_the_rest_unread() {
        let (read_end, write_end) = unistd::pipe().unwrap();
        unistd::write(write_end, b"cat\nfor cat\n").unwrap();
        unistd::close(write_end).unwrap();

        let mut lines = ScriptLines::unbuffered(read_end);
        assert_eq!(lines.next_line().unwrap(), Some("cat".to_string()));

        let mut rest = [0; 16];
        let n = unistd::read(read_end, &mut rest).unwrap();
        assert_eq!(&rest[..n], b"for cat\n");
        assert_eq!(lines.next_line().unwrap(), None);
        unistd::close(read_end).unwrap();
    }
}
