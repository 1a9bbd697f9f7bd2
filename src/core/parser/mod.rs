//! Psh Parser
//!
//! A single pass over the characters of a line. Words are accumulated while
//! quoting and escaping are tracked; control operators close the current
//! command and redirection operators redirect the next word. Whenever the
//! input ends too early (open quotes, a trailing `&&`, `||` or `|`, pending
//! here-documents) more lines are pulled from a [`LineReader`].

use std::fmt;
use std::mem;
use std::os::unix::io::RawFd;

use crate::core::command::{Command, CommandList, Connector, Redirection};
use crate::core::variables::HomeDirs;
use crate::errors::{self, Result};

pub mod tilde;

/// Prompt shown while waiting for the rest of an incomplete command.
pub const CONTINUATION_PROMPT: &str = "> ";

/// Source of the continuation lines requested by the parser.
pub trait LineReader {
    /// Reads one more line, without its trailing newline. Returns `None` at
    /// the end of input.
    fn read_more(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// The result of parsing one line of input.
#[derive(Debug, PartialEq)]
pub struct Parsed {
    pub commands: CommandList,
    /// Characters of input consumed, continuation lines and here-document
    /// bodies included.
    pub consumed: usize,
}

fn is_operator(c: char) -> bool {
    match c {
        '|' | '&' | ';' | '<' | '>' => true,
        _ => false,
    }
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\n'
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum RedirectOperator {
    Duplicate { input: bool },
    Truncate,
    Append,
    Read,
    ReadWrite,
    HereDoc { strip_tabs: bool },
    HereString,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Pending {
    operator: RedirectOperator,
    source: RawFd,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum RedirectMode {
    None,
    /// Waiting for the descriptor of `>&` or `<&`.
    ParsingFd(Pending),
    /// Waiting for a path, a here-document delimiter or a here-string.
    ParsingFilename(Pending),
}

/// A here-document whose body is read once the current line is done.
#[derive(Debug)]
struct HereDocRequest {
    command: usize,
    redirection: usize,
    delimiter: String,
    strip_tabs: bool,
}

pub struct Parser<'a> {
    reader: &'a mut dyn LineReader,
    homes: &'a dyn HomeDirs,
    chars: Vec<char>,
    pos: usize,
    in_single_quote: bool,
    in_double_quote: bool,
    /// A backslash ended the buffer: the next line is joined without a newline.
    join_next_line: bool,
    redirect_mode: RedirectMode,
    word: String,
    word_started: bool,
    word_quoted: bool,
    argv: Vec<String>,
    redirections: Vec<Redirection>,
    commands: Vec<Command>,
    heredocs: Vec<HereDocRequest>,
}

impl<'a> Parser<'a> {
    pub fn new(reader: &'a mut dyn LineReader, homes: &'a dyn HomeDirs) -> Self {
        Self {
            reader,
            homes,
            chars: Vec::new(),
            pos: 0,
            in_single_quote: false,
            in_double_quote: false,
            join_next_line: false,
            redirect_mode: RedirectMode::None,
            word: String::new(),
            word_started: false,
            word_quoted: false,
            argv: Vec::new(),
            redirections: Vec::new(),
            commands: Vec::new(),
            heredocs: Vec::new(),
        }
    }

    /// Parses `line` into a list of commands.
    ///
    /// Continuation lines and here-document bodies are appended to `line`,
    /// so that it holds the complete text of the command afterwards.
    /// `Ok(None)` is returned for lines without any command, such as blank
    /// lines and comments.
    pub fn parse(&mut self, line: &mut String) -> Result<Option<Parsed>> {
        self.reset();
        self.chars = line.chars().collect();

        let result = self.parse_chars(line);
        let commands = mem::replace(&mut self.commands, Vec::new());
        self.reset();
        result?;

        if commands.is_empty() {
            return Ok(None);
        }
        let parsed = Parsed {
            commands: CommandList::new(commands),
            consumed: line.chars().count(),
        };
        debug!("parsed {:?}", parsed.commands);
        Ok(Some(parsed))
    }

    fn reset(&mut self) {
        self.chars.clear();
        self.pos = 0;
        self.in_single_quote = false;
        self.in_double_quote = false;
        self.join_next_line = false;
        self.redirect_mode = RedirectMode::None;
        self.word.clear();
        self.word_started = false;
        self.word_quoted = false;
        self.argv.clear();
        self.redirections.clear();
        self.commands.clear();
        self.heredocs.clear();
    }

    fn parse_chars(&mut self, line: &mut String) -> Result<()> {
        loop {
            if self.pos >= self.chars.len() {
                if self.end_of_buffer(line)? {
                    continue;
                }
                break;
            }

            let c = self.chars[self.pos];
            self.pos += 1;
            if self.in_single_quote {
                if c == '\'' {
                    self.in_single_quote = false;
                } else {
                    self.word.push(c);
                }
            } else if self.in_double_quote {
                self.double_quoted(c, line)?;
            } else {
                self.unquoted(c, line)?;
            }
        }

        if !self.argv.is_empty() {
            self.push_command(Connector::Single);
        }
        if let Some(last) = self.commands.last_mut() {
            if last.kind() == Connector::Sequential {
                last.set_kind(Connector::Single);
            }
        }
        Ok(())
    }

    fn unquoted(&mut self, c: char, line: &mut String) -> Result<()> {
        match c {
            c if is_blank(c) => self.finish_word(),
            '\'' => {
                self.start_quoted_word();
                self.in_single_quote = true;
                Ok(())
            }
            '"' => {
                self.start_quoted_word();
                self.in_double_quote = true;
                Ok(())
            }
            '\\' => {
                match self.peek() {
                    None => self.join_next_line = true,
                    Some('\n') => self.pos += 1,
                    Some(next) => {
                        self.pos += 1;
                        self.start_quoted_word();
                        self.word.push(next);
                    }
                }
                Ok(())
            }
            '#' if !self.word_started => {
                self.pos = self.chars.len();
                Ok(())
            }
            '~' if !self.word_started => {
                self.word_started = true;
                match tilde::expand(&self.chars[self.pos..], self.homes) {
                    Some((home, len)) => {
                        self.word.push_str(&home);
                        self.pos += len;
                    }
                    None => self.word.push('~'),
                }
                Ok(())
            }
            '&' => {
                if self.next_is('&') {
                    self.link(Connector::And, "&&")
                } else {
                    self.link(Connector::Background, "&")
                }
            }
            '|' => {
                if self.next_is('|') {
                    self.link(Connector::Or, "||")
                } else {
                    self.link(Connector::Piped, "|")
                }
            }
            ';' => self.link(Connector::Sequential, ";"),
            '<' | '>' => self.start_redirection(c),
            '$' | '`' => self.substitution_or_literal(c, line),
            c => {
                self.word_started = true;
                self.word.push(c);
                Ok(())
            }
        }
    }

    fn double_quoted(&mut self, c: char, line: &mut String) -> Result<()> {
        match c {
            '"' => self.in_double_quote = false,
            '\\' => match self.peek() {
                None => self.join_next_line = true,
                Some('\n') => self.pos += 1,
                Some(next) if next == '$' || next == '`' || next == '"' || next == '\\' => {
                    self.pos += 1;
                    self.word.push(next);
                }
                Some(_) => self.word.push('\\'),
            },
            '$' | '`' => return self.substitution_or_literal(c, line),
            c => self.word.push(c),
        }
        Ok(())
    }

    fn start_quoted_word(&mut self) {
        self.word_started = true;
        self.word_quoted = true;
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).cloned()
    }

    /// Consumes the next character if it is `c`.
    fn next_is(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Handles the end of the buffer. Returns `true` if more input was
    /// appended and parsing goes on.
    fn end_of_buffer(&mut self, line: &mut String) -> Result<bool> {
        if self.join_next_line {
            self.join_next_line = false;
            if self.continue_line(line, "")? {
                return Ok(true);
            }
        }
        if self.in_single_quote {
            return self.require_line(line, "matching `''");
        }
        if self.in_double_quote {
            return self.require_line(line, "matching `\"'");
        }

        self.finish_word()?;
        if self.redirect_mode != RedirectMode::None {
            return Err(errors::syntax("newline"));
        }
        self.read_heredocs(line)?;

        if self.argv.is_empty() {
            if !self.redirections.is_empty() {
                return Err(errors::syntax("newline"));
            }
            match self.commands.last().map(Command::kind) {
                Some(Connector::And) | Some(Connector::Or) | Some(Connector::Piped) => {
                    return self.require_line(line, "a command");
                }
                _ => (),
            }
        }
        Ok(false)
    }

    /// Appends a continuation line to the buffer and to `line`.
    fn continue_line(&mut self, line: &mut String, joiner: &str) -> Result<bool> {
        match self.reader.read_more(CONTINUATION_PROMPT)? {
            Some(text) => {
                line.push('\n');
                line.push_str(&text);
                self.chars.extend(joiner.chars().chain(text.chars()));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn require_line(&mut self, line: &mut String, expected: &str) -> Result<bool> {
        if self.continue_line(line, "\n")? {
            Ok(true)
        } else {
            Err(errors::unexpected_eof(expected))
        }
    }

    /// Ends the current word, storing it as an argument or as the target of
    /// a pending redirection.
    fn finish_word(&mut self) -> Result<()> {
        if !self.word_started {
            return Ok(());
        }
        let word = mem::replace(&mut self.word, String::new());
        self.word_started = false;
        self.word_quoted = false;

        let redirection = match mem::replace(&mut self.redirect_mode, RedirectMode::None) {
            RedirectMode::None => {
                self.argv.push(word);
                return Ok(());
            }
            RedirectMode::ParsingFd(Pending { operator, source }) => {
                let input = operator == RedirectOperator::Duplicate { input: true };
                if word == "-" && input {
                    Redirection::close_input(source)
                } else if word == "-" {
                    Redirection::close(source)
                } else if !word.is_empty() && word.chars().all(|c| c.is_ascii_digit()) {
                    let fd = word.parse::<RawFd>().map_err(|_| errors::syntax(&word))?;
                    if input {
                        Redirection::duplicate_input(source, fd)
                    } else {
                        Redirection::duplicate(source, fd)
                    }
                } else {
                    return Err(errors::syntax(word));
                }
            }
            RedirectMode::ParsingFilename(Pending { operator, source }) => match operator {
                RedirectOperator::Truncate => Redirection::truncate(source, word),
                RedirectOperator::Append => Redirection::append(source, word),
                RedirectOperator::Read => Redirection::read(source, word),
                RedirectOperator::ReadWrite => Redirection::read_write(source, word),
                RedirectOperator::HereString => {
                    Redirection::here_document(source, format!("{}\n", word))
                }
                RedirectOperator::HereDoc { strip_tabs } => {
                    self.heredocs.push(HereDocRequest {
                        command: self.commands.len(),
                        redirection: self.redirections.len(),
                        delimiter: word,
                        strip_tabs,
                    });
                    Redirection::here_document(source, String::new())
                }
                RedirectOperator::Duplicate { .. } => unreachable!("duplication parses a descriptor"),
            },
        };
        self.redirections.push(redirection);
        Ok(())
    }

    fn start_redirection(&mut self, c: char) -> Result<()> {
        let explicit_source = if self.word_started
            && !self.word_quoted
            && self.redirect_mode == RedirectMode::None
            && self.word.chars().all(|c| c.is_ascii_digit())
        {
            self.word.parse::<RawFd>().ok()
        } else {
            None
        };

        let (operator, token, default_source) = if c == '>' {
            if self.next_is('>') {
                (RedirectOperator::Append, ">>", 1)
            } else if self.next_is('&') {
                (RedirectOperator::Duplicate { input: false }, ">&", 1)
            } else if self.next_is('|') {
                (RedirectOperator::Truncate, ">|", 1)
            } else {
                (RedirectOperator::Truncate, ">", 1)
            }
        } else if self.next_is('<') {
            if self.next_is('<') {
                (RedirectOperator::HereString, "<<<", 0)
            } else if self.next_is('-') {
                (RedirectOperator::HereDoc { strip_tabs: true }, "<<-", 0)
            } else {
                (RedirectOperator::HereDoc { strip_tabs: false }, "<<", 0)
            }
        } else if self.next_is('&') {
            (RedirectOperator::Duplicate { input: true }, "<&", 0)
        } else if self.next_is('>') {
            (RedirectOperator::ReadWrite, "<>", 0)
        } else {
            (RedirectOperator::Read, "<", 0)
        };

        let source = match explicit_source {
            Some(fd) => {
                self.word.clear();
                self.word_started = false;
                fd
            }
            None => {
                self.finish_word()?;
                default_source
            }
        };
        if self.redirect_mode != RedirectMode::None {
            return Err(errors::syntax(token));
        }

        let pending = Pending { operator, source };
        self.redirect_mode = match operator {
            RedirectOperator::Duplicate { .. } => RedirectMode::ParsingFd(pending),
            _ => RedirectMode::ParsingFilename(pending),
        };
        Ok(())
    }

    /// Closes the current command with `kind`. `token` names the operator in
    /// syntax errors.
    fn link(&mut self, kind: Connector, token: &str) -> Result<()> {
        self.finish_word()?;
        if self.redirect_mode != RedirectMode::None {
            return Err(errors::syntax(token));
        }
        if self.argv.is_empty() {
            let after_semicolon =
                self.commands.last().map(Command::kind) == Some(Connector::Sequential);
            if kind == Connector::Sequential && after_semicolon && self.redirections.is_empty() {
                return Ok(());
            }
            return Err(errors::syntax(token));
        }
        self.push_command(kind);
        Ok(())
    }

    fn push_command(&mut self, kind: Connector) {
        let argv = mem::replace(&mut self.argv, Vec::new());
        let redirections = mem::replace(&mut self.redirections, Vec::new());
        self.commands.push(Command::new(kind, argv, redirections));
    }

    fn read_heredocs(&mut self, line: &mut String) -> Result<()> {
        for request in mem::replace(&mut self.heredocs, Vec::new()) {
            let mut body = String::new();
            loop {
                let text = match self.reader.read_more(CONTINUATION_PROMPT)? {
                    Some(text) => text,
                    None => {
                        warn!(
                            "here-document delimited by end-of-file (wanted `{}')",
                            request.delimiter
                        );
                        break;
                    }
                };
                line.push('\n');
                line.push_str(&text);

                let text = if request.strip_tabs {
                    text.trim_start_matches('\t')
                } else {
                    &text[..]
                };
                if text == request.delimiter {
                    break;
                }
                body.push_str(text);
                body.push('\n');
            }

            let redirections = if request.command < self.commands.len() {
                self.commands[request.command].redirections_mut()
            } else {
                &mut self.redirections
            };
            redirections[request.redirection].set_document(body);
        }
        Ok(())
    }

    /// Copies `$(...)`, `${...}` and `` `...` `` into the current word without
    /// interpreting them. A `$` not followed by `(` or `{` is literal.
    fn substitution_or_literal(&mut self, c: char, line: &mut String) -> Result<()> {
        self.word_started = true;
        self.word.push(c);
        let closer = match c {
            '`' => '`',
            _ => match self.peek() {
                Some('(') => ')',
                Some('{') => '}',
                _ => return Ok(()),
            },
        };
        if c == '$' {
            self.word.push(self.chars[self.pos]);
            self.pos += 1;
        }

        let mut closers = vec![closer];
        let mut quote: Option<char> = None;
        while let Some(&expected) = closers.last() {
            let c = match self.peek() {
                Some(c) => c,
                None => {
                    self.require_line(line, &format!("matching `{}'", expected))?;
                    continue;
                }
            };
            self.pos += 1;
            self.word.push(c);

            if c == '\\' && quote != Some('\'') {
                if let Some(escaped) = self.peek() {
                    self.pos += 1;
                    self.word.push(escaped);
                }
                continue;
            }
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '\'' | '"' => quote = Some(c),
                    c if c == expected => {
                        closers.pop();
                    }
                    '`' => closers.push('`'),
                    '(' if expected == ')' => closers.push(')'),
                    '$' => match self.peek() {
                        Some('(') => {
                            self.pos += 1;
                            self.word.push('(');
                            closers.push(')');
                        }
                        Some('{') => {
                            self.pos += 1;
                            self.word.push('{');
                            closers.push('}');
                        }
                        _ => (),
                    },
                    _ => (),
                },
            }
        }
        Ok(())
    }
}

impl<'a> fmt::Debug for Parser<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("pos", &self.pos)
            .field("in_single_quote", &self.in_single_quote)
            .field("in_double_quote", &self.in_double_quote)
            .field("redirect_mode", &self.redirect_mode)
            .field("word", &self.word)
            .field("argv", &self.argv)
            .field("commands", &self.commands)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::{RedirectionKind, Target};
    use crate::errors::{Error, ErrorKind};
    use std::collections::VecDeque;
    use std::path::PathBuf;

    struct Lines {
        lines: VecDeque<String>,
        prompts: Vec<String>,
    }

    impl Lines {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                prompts: vec![],
            }
        }
    }

    impl LineReader for Lines {
        fn read_more(&mut self, prompt: &str) -> Result<Option<String>> {
            self.prompts.push(prompt.to_string());
            Ok(self.lines.pop_front())
        }
    }

    struct Interrupting;

    impl LineReader for Interrupting {
        fn read_more(&mut self, _prompt: &str) -> Result<Option<String>> {
            Err(ErrorKind::Interrupted.into())
        }
    }

    struct Homes;

    impl HomeDirs for Homes {
        fn homedir_of(&self, user: Option<&str>) -> Option<PathBuf> {
            match user {
                None => Some(PathBuf::from("/home/me")),
                Some("alice") => Some(PathBuf::from("/home/alice")),
                Some(_) => None,
            }
        }
    }

    fn parse_with(input: &str, more: &[&str]) -> Result<Option<Parsed>> {
        let mut reader = Lines::new(more);
        let mut line = input.to_string();
        Parser::new(&mut reader, &Homes).parse(&mut line)
    }

    fn parse(input: &str) -> Vec<Command> {
        parse_with(input, &[])
            .unwrap()
            .expect("no commands")
            .commands
            .iter()
            .cloned()
            .collect()
    }

    fn argv(input: &str) -> Vec<String> {
        let commands = parse(input);
        assert_eq!(commands.len(), 1, "{:?}", commands);
        commands[0].argv().to_vec()
    }

    fn kinds(input: &str) -> Vec<Connector> {
        parse(input).iter().map(Command::kind).collect()
    }

    fn syntax_error(input: &str) -> String {
        match parse_with(input, &[]) {
            Err(Error(ErrorKind::Syntax(token), _)) => token,
            other => panic!("expected syntax error for {:?}, got {:?}", input, other),
        }
    }

    #[test]
    fn test_simple_command() {
        let commands = parse("echo hello world");
        assert_eq!(
            commands,
            vec![Command::new(
                Connector::Single,
                vec!["echo".into(), "hello".into(), "world".into()],
                vec![]
            )]
        );
    }

    #[test]
    fn test_blank_and_comment_lines() {
        assert_eq!(parse_with("", &[]).unwrap(), None);
        assert_eq!(parse_with("   \t ", &[]).unwrap(), None);
        assert_eq!(parse_with("# just a comment", &[]).unwrap(), None);
    }

    #[test]
    fn test_whitespace_runs() {
        assert_eq!(argv("  echo \t a   b  "), vec!["echo", "a", "b"]);
    }

    #[test]
    fn test_quotes() {
        assert_eq!(argv("echo 'a  b' \"c  d\""), vec!["echo", "a  b", "c  d"]);
        assert_eq!(argv("echo \"it's\" 'say \"hi\"'"), vec!["echo", "it's", "say \"hi\""]);
        assert_eq!(argv("echo a'b'\"c\"d"), vec!["echo", "abcd"]);
        assert_eq!(argv("echo '' \"\""), vec!["echo", "", ""]);
        assert_eq!(argv("echo '#' '|' \";\""), vec!["echo", "#", "|", ";"]);
    }

    #[test]
    fn test_backslashes() {
        assert_eq!(argv(r"echo a\ b"), vec!["echo", "a b"]);
        assert_eq!(argv(r"echo \\"), vec!["echo", r"\"]);
        assert_eq!(argv(r"echo \\\a"), vec!["echo", r"\a"]);
        assert_eq!(argv(r"echo \\\\"), vec!["echo", r"\\"]);
        assert_eq!(argv(r"echo \|\;\&"), vec!["echo", "|;&"]);
        assert_eq!(argv(r#"echo "a\"b" "\$x" "\n""#), vec!["echo", "a\"b", "$x", r"\n"]);
        assert_eq!(argv(r"echo 'a\b'"), vec!["echo", r"a\b"]);
    }

    #[test]
    fn test_trailing_backslash_joins_lines() {
        let parsed = parse_with(r"echo hel\", &["lo world"]).unwrap().unwrap();
        assert_eq!(
            parsed.commands.as_slice()[0].argv(),
            &["echo".to_string(), "hello".into(), "world".into()]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(argv("echo a # comment | b"), vec!["echo", "a"]);
        assert_eq!(argv("echo a#b"), vec!["echo", "a#b"]);
    }

    #[test]
    fn test_connectors() {
        assert_eq!(
            kinds("a; b && c || d | e & f"),
            vec![
                Connector::Sequential,
                Connector::And,
                Connector::Or,
                Connector::Piped,
                Connector::Background,
                Connector::Single
            ]
        );
        assert_eq!(kinds("a;b"), vec![Connector::Sequential, Connector::Single]);
        assert_eq!(kinds("a|b"), vec![Connector::Piped, Connector::Single]);
    }

    #[test]
    fn test_trailing_operators() {
        assert_eq!(kinds("sleep 10 &"), vec![Connector::Background]);
        assert_eq!(kinds("sleep 10&"), vec![Connector::Background]);
        assert_eq!(kinds("a;"), vec![Connector::Single]);
        assert_eq!(kinds("a ;; b"), vec![Connector::Sequential, Connector::Single]);
        assert_eq!(kinds("a & b &"), vec![Connector::Background, Connector::Background]);
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(syntax_error("| echo hi"), "|");
        assert_eq!(syntax_error("&& echo hi"), "&&");
        assert_eq!(syntax_error("|| echo hi"), "||");
        assert_eq!(syntax_error("& echo hi"), "&");
        assert_eq!(syntax_error("; echo hi"), ";");
        assert_eq!(syntax_error("a | | b"), "|");
        assert_eq!(syntax_error("a & ; b"), ";");
        assert_eq!(syntax_error("echo >"), "newline");
        assert_eq!(syntax_error("echo > | cat"), "|");
        assert_eq!(syntax_error("echo > > f"), ">");
        assert_eq!(syntax_error("echo 2>&x"), "x");
        assert_eq!(syntax_error("> out"), "newline");
        assert_eq!(syntax_error("> out | cat"), "|");
    }

    #[test]
    fn test_continuation_after_operator() {
        let mut reader = Lines::new(&["", "echo b"]);
        let mut line = "echo a &&".to_string();
        let parsed = Parser::new(&mut reader, &Homes)
            .parse(&mut line)
            .unwrap()
            .unwrap();
        assert_eq!(reader.prompts, vec![CONTINUATION_PROMPT, CONTINUATION_PROMPT]);
        assert_eq!(line, "echo a &&\n\necho b");
        assert_eq!(parsed.consumed, line.chars().count());
        let commands = parsed.commands.as_slice();
        assert_eq!(commands[0].kind(), Connector::And);
        assert_eq!(commands[1].argv(), &["echo".to_string(), "b".into()]);
    }

    #[test]
    fn test_continuation_inside_quotes() {
        let parsed = parse_with("echo 'a", &["b'"]).unwrap().unwrap();
        assert_eq!(
            parsed.commands.as_slice()[0].argv(),
            &["echo".to_string(), "a\nb".into()]
        );
    }

    #[test]
    fn test_unexpected_eof() {
        match parse_with("echo 'a", &[]) {
            Err(Error(ErrorKind::UnexpectedEof(_), _)) => (),
            other => panic!("unexpected {:?}", other),
        }
        match parse_with("echo a |", &[]) {
            Err(Error(ErrorKind::UnexpectedEof(_), _)) => (),
            other => panic!("unexpected {:?}", other),
        }
        match parse_with("echo $(date", &[]) {
            Err(Error(ErrorKind::UnexpectedEof(expected), _)) => {
                assert_eq!(expected, "matching `)'")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_interrupted_reader() {
        let mut line = "echo 'a".to_string();
        match Parser::new(&mut Interrupting, &Homes).parse(&mut line) {
            Err(Error(ErrorKind::Interrupted, _)) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_tilde() {
        assert_eq!(argv("ls ~"), vec!["ls", "/home/me"]);
        assert_eq!(argv("ls ~/src"), vec!["ls", "/home/me/src"]);
        assert_eq!(argv("ls ~alice/x"), vec!["ls", "/home/alice/x"]);
        assert_eq!(argv("ls ~bob"), vec!["ls", "~bob"]);
        assert_eq!(argv("ls a~ '~'"), vec!["ls", "a~", "~"]);
    }

    #[test]
    fn test_redirections() {
        let commands = parse("echo out > file.txt");
        assert_eq!(commands[0].argv(), &["echo".to_string(), "out".into()]);
        let redirection = &commands[0].redirections()[0];
        assert_eq!(redirection.kind(), RedirectionKind::TruncateOut);
        assert_eq!(redirection.source(), 1);
        assert_eq!(redirection.target(), &Target::Path("file.txt".into()));

        let commands = parse("cmd <in >>log 2>&1 3<>rw 4>&- 5<&0 >|clobber 2>err");
        assert_eq!(
            commands[0].redirections(),
            &[
                Redirection::read(0, "in"),
                Redirection::append(1, "log"),
                Redirection::duplicate(2, 1),
                Redirection::read_write(3, "rw"),
                Redirection::close(4),
                Redirection::duplicate_input(5, 0),
                Redirection::truncate(1, "clobber"),
                Redirection::truncate(2, "err"),
            ]
        );
        assert_eq!(commands[0].argv(), &["cmd".to_string()]);
    }

    #[test]
    fn test_digits_are_source_only_when_adjacent() {
        let commands = parse("echo 2 >f");
        assert_eq!(commands[0].argv(), &["echo".to_string(), "2".into()]);
        assert_eq!(commands[0].redirections(), &[Redirection::truncate(1, "f")]);

        let commands = parse("echo a2>f '2'>g");
        assert_eq!(
            commands[0].argv(),
            &["echo".to_string(), "a2".into(), "2".into()]
        );
    }

    #[test]
    fn test_redirection_before_pipe() {
        let commands = parse("cmd 2>&1|cat");
        assert_eq!(commands[0].redirections(), &[Redirection::duplicate(2, 1)]);
        assert_eq!(commands[0].kind(), Connector::Piped);
        assert_eq!(commands[1].program(), "cat");
    }

    #[test]
    fn test_here_string() {
        let commands = parse("cat <<< 'hello world'");
        assert_eq!(
            commands[0].redirections(),
            &[Redirection::here_document(0, "hello world\n")]
        );
    }

    #[test]
    fn test_heredoc() {
        let mut reader = Lines::new(&[
            "line 1",
            "  line 2",
            "EOF",
            "\tindented",
            "\tEND",
            "echo after",
        ]);
        let mut line = "cat <<EOF && cat <<-END".to_string();
        let parsed = Parser::new(&mut reader, &Homes)
            .parse(&mut line)
            .unwrap()
            .unwrap();
        let commands = parsed.commands.as_slice();
        assert_eq!(
            commands[0].redirections(),
            &[Redirection::here_document(0, "line 1\n  line 2\n")]
        );
        assert_eq!(
            commands[1].redirections(),
            &[Redirection::here_document(0, "indented\n")]
        );
        assert_eq!(reader.lines.pop_front(), Some("echo after".to_string()));
        assert_eq!(parsed.consumed, line.chars().count());
    }

    #[test]
    fn test_heredoc_without_delimiter() {
        let parsed = parse_with("cat <<EOF", &["partial"]).unwrap().unwrap();
        assert_eq!(
            parsed.commands.as_slice()[0].redirections(),
            &[Redirection::here_document(0, "partial\n")]
        );
    }

    #[test]
    fn test_substitutions_are_kept_whole() {
        assert_eq!(
            argv("echo $(ls | wc -l) ${HOME} `date; true` $((1 + 2))"),
            vec!["echo", "$(ls | wc -l)", "${HOME}", "`date; true`", "$((1 + 2))"]
        );
        assert_eq!(
            argv("echo \"$(echo ')')\" $x"),
            vec!["echo", "$(echo ')')", "$x"]
        );
        let parsed = parse_with("echo $(echo a &&", &["echo b)"]).unwrap().unwrap();
        assert_eq!(
            parsed.commands.as_slice()[0].argv(),
            &["echo".to_string(), "$(echo a &&\necho b)".into()]
        );
    }
}
