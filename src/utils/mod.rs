//! Utility functions and helpers.

pub mod http;
pub mod log;
pub mod url;

use std::path::Path;

/// Whether a configured output filename is a plain `.txt` name that
/// cannot escape the output directory.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name.ends_with(".txt")
        && name.len() > ".txt".len()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && Path::new(name).file_name().map(|f| f == name).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filenames() {
        assert!(is_safe_filename("easylist.txt"));
        assert!(is_safe_filename("9a0361ff4e5e3e0f3c1f7a4b1b1f2e3d.txt"));
        assert!(is_safe_filename("ublock_filters-2024.txt"));
    }

    #[test]
    fn test_unsafe_filenames() {
        assert!(!is_safe_filename(""));
        assert!(!is_safe_filename(".txt"));
        assert!(!is_safe_filename(".hidden.txt"));
        assert!(!is_safe_filename("../escape.txt"));
        assert!(!is_safe_filename("dir/list.txt"));
        assert!(!is_safe_filename("list.json"));
        assert!(!is_safe_filename("rules.db"));
        assert!(!is_safe_filename("list name.txt"));
    }
}
