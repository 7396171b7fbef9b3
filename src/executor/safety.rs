use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{DroidClawError, DroidClawResult};

static FILE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+\.(md|txt)$").expect("file name regex"));

/// Workspace file names are flat `.md` / `.txt` names; anything else is refused
/// before the sandbox is touched.
pub fn validate_file_name(name: &str) -> DroidClawResult<()> {
    if FILE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(DroidClawError::Config(format!(
            "Invalid file name '{name}'. Use letters, digits, '_' or '-' followed by .md or .txt"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        assert!(validate_file_name("notes.md").is_ok());
        assert!(validate_file_name("shopping_list-2.txt").is_ok());
    }

    #[test]
    fn test_rejects_paths_and_extensions() {
        for bad in ["../secret.md", "dir/notes.md", "notes.json", "notes", ".md", "a b.txt", "x.md.exe"] {
            assert!(validate_file_name(bad).is_err(), "{bad} accepted");
        }
    }
}
