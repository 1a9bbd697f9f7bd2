use std::fmt;
use std::os::unix::io::RawFd;

/// How a command is connected to the command that follows it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Connector {
    /// Last command of the list.
    Single,
    /// `|`: stdout feeds the next command's stdin.
    Piped,
    /// `&&`: the next command runs only on success.
    And,
    /// `||`: the next command runs only on failure.
    Or,
    /// `&`: runs asynchronously; the next command starts immediately.
    Background,
    /// `;`: the next command runs unconditionally.
    Sequential,
}

impl Connector {
    pub fn as_str(self) -> &'static str {
        match self {
            Connector::Single => "",
            Connector::Piped => "|",
            Connector::And => "&&",
            Connector::Or => "||",
            Connector::Background => "&",
            Connector::Sequential => ";",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RedirectionKind {
    DuplicateFd,
    TruncateOut,
    AppendOut,
    ReadIn,
    CloseFd,
    ReadWriteOpen,
    HereDoc,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Target {
    Fd(RawFd),
    Path(String),
    /// Body of a heredoc or here-string.
    Document(String),
    Nothing,
}

/// One file descriptor operation.
///
/// `source` is always the descriptor of the command being changed, e.g. `2`
/// in `2>&1` or `1` in `> out`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Redirection {
    kind: RedirectionKind,
    source: RawFd,
    target: Target,
    /// Written with `<&` rather than `>&`; only changes how it is shown.
    input: bool,
}

impl Redirection {
    /// `source>&fd`
    pub fn duplicate(source: RawFd, fd: RawFd) -> Self {
        Self::new(RedirectionKind::DuplicateFd, source, Target::Fd(fd))
    }

    /// `source<&fd`
    pub fn duplicate_input(source: RawFd, fd: RawFd) -> Self {
        Self {
            input: true,
            ..Self::duplicate(source, fd)
        }
    }

    /// `source>path`
    pub fn truncate<S: Into<String>>(source: RawFd, path: S) -> Self {
        Self::new(RedirectionKind::TruncateOut, source, Target::Path(path.into()))
    }

    /// `source>>path`
    pub fn append<S: Into<String>>(source: RawFd, path: S) -> Self {
        Self::new(RedirectionKind::AppendOut, source, Target::Path(path.into()))
    }

    /// `source<path`
    pub fn read<S: Into<String>>(source: RawFd, path: S) -> Self {
        Self::new(RedirectionKind::ReadIn, source, Target::Path(path.into()))
    }

    /// `source<>path`
    pub fn read_write<S: Into<String>>(source: RawFd, path: S) -> Self {
        Self::new(
            RedirectionKind::ReadWriteOpen,
            source,
            Target::Path(path.into()),
        )
    }

    /// `source>&-`
    pub fn close(source: RawFd) -> Self {
        Self::new(RedirectionKind::CloseFd, source, Target::Nothing)
    }

    /// `source<&-`
    pub fn close_input(source: RawFd) -> Self {
        Self {
            input: true,
            ..Self::close(source)
        }
    }

    /// `source<<delimiter` and `source<<<word`
    pub fn here_document<S: Into<String>>(source: RawFd, document: S) -> Self {
        Self::new(
            RedirectionKind::HereDoc,
            source,
            Target::Document(document.into()),
        )
    }

    fn new(kind: RedirectionKind, source: RawFd, target: Target) -> Self {
        Self {
            kind,
            source,
            target,
            input: false,
        }
    }

    pub fn kind(&self) -> RedirectionKind {
        self.kind
    }

    pub fn source(&self) -> RawFd {
        self.source
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The path to open, for the kinds that open one.
    pub fn path(&self) -> Option<&str> {
        match self.target {
            Target::Path(ref path) => Some(path),
            _ => None,
        }
    }

    pub fn document(&self) -> Option<&str> {
        match self.target {
            Target::Document(ref document) => Some(document),
            _ => None,
        }
    }

    pub(crate) fn set_document(&mut self, document: String) {
        debug_assert_eq!(self.kind, RedirectionKind::HereDoc);
        self.target = Target::Document(document);
    }
}

impl fmt::Display for Redirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (operator, default_source) = match self.kind {
            RedirectionKind::DuplicateFd | RedirectionKind::CloseFd if self.input => ("<&", 0),
            RedirectionKind::DuplicateFd | RedirectionKind::CloseFd => (">&", 1),
            RedirectionKind::TruncateOut => (">", 1),
            RedirectionKind::AppendOut => (">>", 1),
            RedirectionKind::ReadIn => ("<", 0),
            RedirectionKind::ReadWriteOpen => ("<>", 0),
            RedirectionKind::HereDoc => ("<<", 0),
        };
        if self.source != default_source {
            write!(f, "{}", self.source)?;
        }
        write!(f, "{}", operator)?;
        match self.target {
            Target::Fd(fd) => write!(f, "{}", fd),
            Target::Path(ref path) => write!(f, "{}", path),
            Target::Document(_) => write!(f, "EOF"),
            Target::Nothing => write!(f, "-"),
        }
    }
}

/// One scheduling unit: a program, its arguments and its redirections.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Command {
    kind: Connector,
    argv: Vec<String>,
    redirections: Vec<Redirection>,
}

impl Command {
    /// # Panics
    /// Panics if `argv` is empty; the parser never builds such a command.
    pub fn new(kind: Connector, argv: Vec<String>, redirections: Vec<Redirection>) -> Self {
        assert!(!argv.is_empty(), "command built without an argument vector");
        Self {
            kind,
            argv,
            redirections,
        }
    }

    pub fn kind(&self) -> Connector {
        self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: Connector) {
        self.kind = kind;
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn redirections(&self) -> &[Redirection] {
        &self.redirections
    }

    pub(crate) fn redirections_mut(&mut self) -> &mut Vec<Redirection> {
        &mut self.redirections
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))?;
        for redirection in &self.redirections {
            write!(f, " {}", redirection)?;
        }
        Ok(())
    }
}

/// Every command parsed from one line of input, in order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandList(Vec<Command>);

impl CommandList {
    /// # Panics
    /// Panics if `commands` is empty or ends with a dangling connector.
    pub fn new(commands: Vec<Command>) -> Self {
        match commands.last().map(Command::kind) {
            Some(Connector::Single) | Some(Connector::Background) => {}
            other => panic!("command list must end a chain, found {:?}", other),
        }
        CommandList(commands)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Command] {
        &self.0
    }

    /// Splits the list into pipelines: runs of `Piped` commands together
    /// with the command that ends them.
    pub fn pipelines(&self) -> impl Iterator<Item = &[Command]> {
        self.0
            .split_inclusive(|command| command.kind() != Connector::Piped)
    }
}

impl<'a> IntoIterator for &'a CommandList {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Renders a pipeline the way it is shown in job listings.
pub fn display_pipeline(pipeline: &[Command]) -> String {
    pipeline
        .iter()
        .map(|command| match command.kind() {
            Connector::Piped => format!("{} {}", command, Connector::Piped.as_str()),
            _ => command.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(kind: Connector, words: &[&str]) -> Command {
        Command::new(
            kind,
            words.iter().map(|w| w.to_string()).collect(),
            vec![],
        )
    }

    #[test]
    fn test_pipelines() {
        let commands = CommandList::new(vec![
            command(Connector::Piped, &["cmd1"]),
            command(Connector::Piped, &["cmd2"]),
            command(Connector::And, &["cmd3"]),
            command(Connector::Background, &["cmd4"]),
            command(Connector::Single, &["cmd5"]),
        ]);

        let pipelines: Vec<Vec<&str>> = commands
            .pipelines()
            .map(|p| p.iter().map(Command::program).collect())
            .collect();
        assert_eq!(
            pipelines,
            vec![vec!["cmd1", "cmd2", "cmd3"], vec!["cmd4"], vec!["cmd5"]]
        );
    }

    #[test]
    #[should_panic]
    fn test_dangling_connector() {
        CommandList::new(vec![command(Connector::And, &["cmd1"])]);
    }

    #[test]
    #[should_panic]
    fn test_empty_argv() {
        Command::new(Connector::Single, vec![], vec![]);
    }

    #[test]
    fn test_display() {
        let cmd = Command::new(
            Connector::Single,
            vec!["cmd".into(), "arg".into()],
            vec![
                Redirection::truncate(1, "out"),
                Redirection::duplicate(2, 1),
                Redirection::read(0, "in"),
                Redirection::append(3, "log"),
                Redirection::close(4),
                Redirection::duplicate_input(5, 0),
                Redirection::duplicate_input(0, 3),
                Redirection::close_input(6),
            ],
        );
        assert_eq!(
            cmd.to_string(),
            "cmd arg >out 2>&1 <in 3>>log 4>&- 5<&0 <&3 6<&-"
        );
        assert_eq!(
            display_pipeline(&[
                command(Connector::Piped, &["cmd1", "a"]),
                command(Connector::Single, &["cmd2"])
            ]),
            "cmd1 a | cmd2"
        );
    }

    #[test]
    fn test_redirection_targets() {
        assert_eq!(Redirection::truncate(1, "out").path(), Some("out"));
        assert_eq!(Redirection::duplicate(2, 1).path(), None);
        assert_eq!(
            Redirection::here_document(0, "body\n").document(),
            Some("body\n")
        );
        assert_eq!(Redirection::close(1).target(), &Target::Nothing);
    }
}
