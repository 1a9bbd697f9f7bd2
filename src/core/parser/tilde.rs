//! Tilde expansion at the start of a word.

use crate::core::variables::HomeDirs;

/// Characters that may end a `~user` prefix.
fn ends_prefix(c: char) -> bool {
    c == '/' || c.is_whitespace() || super::is_operator(c)
}

fn is_user_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Expands the `~` or `~user` prefix starting right after the tilde at
/// `rest`.
///
/// Returns the replacement text and how many characters of `rest` it
/// covers, or `None` if the prefix must stay literal (unknown user, or a
/// prefix followed by something that is not a path separator).
pub fn expand(rest: &[char], homes: &dyn HomeDirs) -> Option<(String, usize)> {
    let name_len = rest.iter().take_while(|&&c| is_user_name_char(c)).count();
    if let Some(&next) = rest.get(name_len) {
        if !ends_prefix(next) {
            return None;
        }
    }

    let home = if name_len == 0 {
        homes.homedir_of(None)
    } else {
        let name: String = rest[..name_len].iter().collect();
        homes.homedir_of(Some(&name))
    }?;
    Some((home.to_string_lossy().into_owned(), name_len))
}
