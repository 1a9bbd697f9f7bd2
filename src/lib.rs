//! Psh - a POSIX-style command shell
//!
//! A line of input is parsed into a [`CommandList`](core::command::CommandList)
//! by [`Parser`](core::parser::Parser), then run by the [`Shell`], which spawns
//! processes, wires pipes and redirections, and keeps track of background jobs.

#![warn(
    missing_debug_implementations,
    trivial_numeric_casts,
    unused_import_braces
)]

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

/// Logs the error of a `Result` whose failure is not worth propagating.
macro_rules! log_if_err {
    ($result:expr, $fmt:expr) => {{
        if let Err(ref e) = $result {
            error!("{}: {}", $fmt, e);
        }
    }};
    ($result:expr, $fmt:expr, $($arg:tt)*) => {{
        if let Err(ref e) = $result {
            error!("{}: {}", format!($fmt, $($arg)*), e);
        }
    }};
}

pub mod core;
pub mod editor;
pub mod errors;
pub mod shell;
mod util;

pub use crate::shell::{Shell, ShellConfig};
pub use crate::util::PshExitStatusExt;
