//! Applying redirections to file descriptors.

use std::env;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{self, FcntlArg, FdFlag, OFlag};
use nix::sys::stat::Mode;
use nix::unistd;

use crate::core::command::{Redirection, RedirectionKind, Target};
use crate::errors::{ErrorKind, Result};

/// Saved descriptors are moved at or above this number, out of the way of
/// the descriptors scripts use.
const SAVED_FD_BASE: RawFd = 10;

/// The redirections of one command, with every here-document already
/// written to an unlinked temporary file.
#[derive(Debug)]
pub struct PreparedRedirections<'a> {
    redirections: &'a [Redirection],
    documents: Vec<Option<File>>,
}

impl<'a> PreparedRedirections<'a> {
    pub fn new(redirections: &'a [Redirection]) -> Result<Self> {
        let documents = redirections
            .iter()
            .map(|redirection| match redirection.document() {
                Some(document) => materialize_document(document).map(Some),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            redirections,
            documents,
        })
    }

    /// Applies the redirections, in order, to the current process.
    pub fn apply(&self) -> Result<()> {
        for (redirection, document) in self.redirections.iter().zip(&self.documents) {
            apply(redirection, document.as_ref())?;
        }
        Ok(())
    }
}

/// Writes a here-document body to a temporary file, unlinks the file and
/// rewinds it for reading.
fn materialize_document(document: &str) -> Result<File> {
    let template = env::temp_dir().join("psh-heredoc-XXXXXX");
    let (fd, path) = unistd::mkstemp(template.as_path())?;
    let mut file = unsafe { File::from_raw_fd(fd) };
    unistd::unlink(path.as_path())?;
    fcntl::fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    file.write_all(document.as_bytes())?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

fn apply(redirection: &Redirection, document: Option<&File>) -> Result<()> {
    let source = redirection.source();
    let flags = match redirection.kind() {
        RedirectionKind::TruncateOut => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
        RedirectionKind::AppendOut => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
        RedirectionKind::ReadIn => OFlag::O_RDONLY | OFlag::O_CREAT,
        RedirectionKind::ReadWriteOpen => OFlag::O_RDWR | OFlag::O_CREAT,
        RedirectionKind::DuplicateFd => {
            if let Target::Fd(target) = *redirection.target() {
                if target != source {
                    unistd::dup2(target, source)
                        .map_err(|errno| ErrorKind::RedirectionFailure(target.to_string(), errno))?;
                }
            }
            return Ok(());
        }
        RedirectionKind::CloseFd => {
            match unistd::close(source) {
                Ok(()) | Err(Errno::EBADF) => (),
                Err(errno) => {
                    return Err(ErrorKind::RedirectionFailure(source.to_string(), errno).into())
                }
            }
            return Ok(());
        }
        RedirectionKind::HereDoc => {
            let file = document.ok_or("here-document was not prepared")?;
            unistd::dup2(file.as_raw_fd(), source)
                .map_err(|errno| ErrorKind::RedirectionFailure(source.to_string(), errno))?;
            return Ok(());
        }
    };

    let path = redirection.path().unwrap_or_default();
    let fd = fcntl::open(path, flags, Mode::from_bits_truncate(0o644))
        .map_err(|errno| ErrorKind::RedirectionFailure(path.to_string(), errno))?;
    if fd != source {
        let result = unistd::dup2(fd, source);
        let _ = unistd::close(fd);
        result.map_err(|errno| ErrorKind::RedirectionFailure(path.to_string(), errno))?;
    }
    Ok(())
}

/// RAII guard for running a builtin inside the shell with redirections:
/// every descriptor the redirections touch is saved on creation and put
/// back on drop.
#[derive(Debug)]
pub struct SavedFds {
    saved: Vec<(RawFd, Option<RawFd>)>,
}

impl SavedFds {
    pub fn save(redirections: &[Redirection]) -> Result<Self> {
        let mut guard = SavedFds { saved: Vec::new() };
        for redirection in redirections {
            let fd = redirection.source();
            if guard.saved.iter().any(|&(saved_fd, _)| saved_fd == fd) {
                continue;
            }
            let copy = match fcntl::fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(SAVED_FD_BASE)) {
                Ok(copy) => Some(copy),
                Err(Errno::EBADF) => None,
                Err(e) => return Err(e.into()),
            };
            guard.saved.push((fd, copy));
        }
        Ok(guard)
    }
}

impl Drop for SavedFds {
    fn drop(&mut self) {
        let temp_result = io::stdout().flush();
        log_if_err!(temp_result, "failed to flush stdout");
        for &(fd, copy) in self.saved.iter().rev() {
            match copy {
                Some(copy) => {
                    let temp_result = unistd::dup2(copy, fd);
                    log_if_err!(temp_result, "failed to restore descriptor {}", fd);
                    let _ = unistd::close(copy);
                }
                None => {
                    let _ = unistd::close(fd);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use tempdir::TempDir;

    // Each test works on its own descriptors, well away from the ones the
    // test harness uses.

    fn read_fd(fd: RawFd) -> String {
        let copy = unistd::dup(fd).unwrap();
        let mut file = unsafe { File::from_raw_fd(copy) };
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        contents
    }

    fn write_fd(fd: RawFd, text: &str) {
        unistd::write(fd, text.as_bytes()).unwrap();
    }

    #[test]
    fn test_truncate_and_append() {
        let dir = TempDir::new("psh-redirect").unwrap();
        let path = dir.path().join("out.txt");
        let path = path.to_str().unwrap();
        fs::write(path, "old contents\n").unwrap();

        let redirections = [Redirection::truncate(57, path)];
        let prepared = PreparedRedirections::new(&redirections).unwrap();
        {
            let _saved = SavedFds::save(&redirections).unwrap();
            prepared.apply().unwrap();
            write_fd(57, "first\n");
        }
        assert!(unistd::close(57).is_err());
        assert_eq!(fs::read_to_string(path).unwrap(), "first\n");

        let redirections = [Redirection::append(57, path)];
        let prepared = PreparedRedirections::new(&redirections).unwrap();
        {
            let _saved = SavedFds::save(&redirections).unwrap();
            prepared.apply().unwrap();
            write_fd(57, "second\n");
        }
        assert_eq!(fs::read_to_string(path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_read_creates_missing_file() {
        let dir = TempDir::new("psh-redirect").unwrap();
        let path = dir.path().join("missing.txt");
        let redirections = [Redirection::read(58, path.to_str().unwrap())];
        {
            let _saved = SavedFds::save(&redirections).unwrap();
            PreparedRedirections::new(&redirections)
                .unwrap()
                .apply()
                .unwrap();
        }
        assert!(path.exists());
    }

    #[test]
    fn test_duplicate_and_close() {
        let dir = TempDir::new("psh-redirect").unwrap();
        let path = dir.path().join("dup.txt");
        let redirections = [
            Redirection::truncate(59, path.to_str().unwrap()),
            Redirection::duplicate(60, 59),
            Redirection::close(59),
        ];
        {
            let _saved = SavedFds::save(&redirections).unwrap();
            PreparedRedirections::new(&redirections)
                .unwrap()
                .apply()
                .unwrap();
            assert!(fcntl::fcntl(59, FcntlArg::F_GETFD).is_err());
            write_fd(60, "through the copy\n");
        }
        assert!(fcntl::fcntl(60, FcntlArg::F_GETFD).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "through the copy\n");
    }

    #[test]
    fn test_here_document() {
        let redirections = [Redirection::here_document(61, "line 1\nline 2\n")];
        let _saved = SavedFds::save(&redirections).unwrap();
        PreparedRedirections::new(&redirections)
            .unwrap()
            .apply()
            .unwrap();
        assert_eq!(read_fd(61), "line 1\nline 2\n");
    }

    #[test]
    fn test_open_failure_names_the_path() {
        let redirections = [Redirection::truncate(62, "/nonexistent-dir/file")];
        let error = PreparedRedirections::new(&redirections)
            .unwrap()
            .apply()
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "/nonexistent-dir/file: No such file or directory"
        );
    }
}
