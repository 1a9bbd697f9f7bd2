//! Shell-independent building blocks: the command model, the parser that
//! produces it, the job table, and the variable store collaborators.

pub mod command;
pub mod job;
pub mod parser;
pub mod variables;
