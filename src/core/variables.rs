use std::env;
use std::path::PathBuf;

use dirs;
use nix::unistd::User;

/// Storage for shell variables.
pub trait Variables {
    fn get(&self, name: &str) -> Option<String>;

    /// Sets `name` to `value`. An existing value is only replaced when
    /// `overwrite` is true.
    fn set(&mut self, name: &str, value: &str, overwrite: bool);
}

/// Looks up home directories for tilde expansion.
pub trait HomeDirs {
    /// `None` asks for the invoking user's home.
    fn homedir_of(&self, user: Option<&str>) -> Option<PathBuf>;
}

/// Variables backed by the process environment, so that every child the
/// shell spawns inherits them.
#[derive(Debug, Default)]
pub struct EnvVariables;

impl Variables for EnvVariables {
    fn get(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }

    fn set(&mut self, name: &str, value: &str, overwrite: bool) {
        if overwrite || env::var_os(name).is_none() {
            env::set_var(name, value);
        }
    }
}

impl HomeDirs for EnvVariables {
    fn homedir_of(&self, user: Option<&str>) -> Option<PathBuf> {
        match user {
            None => self
                .get("HOME")
                .filter(|home| !home.is_empty())
                .map(PathBuf::from)
                .or_else(dirs::home_dir),
            Some(name) => match User::from_name(name) {
                Ok(Some(user)) => Some(user.dir),
                Ok(None) => None,
                Err(e) => {
                    warn!("failed to look up user {}: {}", name, e);
                    None
                }
            },
        }
    }
}
