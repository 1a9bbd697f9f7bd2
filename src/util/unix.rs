use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use atty::{self, Stream};

/// The descriptor the shell uses to talk to its controlling terminal.
pub fn get_terminal() -> RawFd {
    io::stdin().as_raw_fd()
}

pub fn isatty() -> bool {
    atty::is(Stream::Stdin)
}
