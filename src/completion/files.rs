//! Generic file-path completion.

use std::path::{Path, PathBuf};

use crate::runtime::expand_tilde;

/// One filesystem entry matching a path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCandidate {
    /// Text offered to the user: the typed directory part plus the entry name,
    /// with a trailing `/` for directories.
    pub display: String,
    /// Resolved location on disk.
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Entries matching `prefix`, resolved against `cwd`; sorted by display text.
///
/// Hidden entries are only offered when the typed name starts with `.`.
/// Unreadable directories yield no candidates.
pub fn path_candidates(prefix: &str, cwd: &Path, home: Option<&Path>) -> Vec<PathCandidate> {
    let (dir_part, name_part) = match prefix.rfind('/') {
        Some(idx) => prefix.split_at(idx + 1),
        None => ("", prefix),
    };
    let search_dir = if dir_part.is_empty() {
        cwd.to_path_buf()
    } else {
        let expanded = expand_tilde(dir_part, home);
        if expanded.is_absolute() {
            expanded
        } else {
            cwd.join(expanded)
        }
    };

    let entries = match std::fs::read_dir(&search_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %search_dir.display(), error = %e, "path completion skipped");
            return Vec::new();
        }
    };

    let show_hidden = name_part.starts_with('.');
    let mut out: Vec<PathCandidate> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(name_part) || (name.starts_with('.') && !show_hidden) {
                return None;
            }
            let path = entry.path();
            // Follows symlinks, so a link to a directory completes as one.
            let is_dir = path.is_dir();
            let mut display = format!("{}{}", dir_part, name);
            if is_dir {
                display.push('/');
            }
            Some(PathCandidate {
                display,
                path,
                is_dir,
            })
        })
        .collect();
    out.sort_by(|a, b| a.display.cmp(&b.display));
    out
}

/// Path completions for `prefix` as display strings, quoted when needed.
pub fn complete_path(prefix: &str, cwd: &Path, home: Option<&Path>) -> Vec<String> {
    path_candidates(prefix, cwd, home)
        .into_iter()
        .map(|c| quote_if_needed(&c.display))
        .collect()
}

/// Wrap `text` in double quotes when it contains whitespace.
pub fn quote_if_needed(text: &str) -> String {
    if text.chars().any(char::is_whitespace) {
        format!("\"{}\"", text.replace('"', "\\\""))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha.txt"), "").unwrap();
        fs::write(dir.path().join("alps.md"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();
        fs::write(dir.path().join("my notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("albums")).unwrap();
        fs::write(dir.path().join("albums").join("one.mp3"), "").unwrap();
        dir
    }

    #[test]
    fn completes_prefix_in_cwd() {
        let dir = fixture();
        let got = complete_path("al", dir.path(), None);
        assert_eq!(got, vec!["albums/", "alpha.txt", "alps.md"]);
    }

    #[test]
    fn completes_inside_subdirectory() {
        let dir = fixture();
        assert_eq!(complete_path("albums/", dir.path(), None), vec!["albums/one.mp3"]);
        let abs = format!("{}/al", dir.path().display());
        assert_eq!(complete_path(&abs, Path::new("/"), None).len(), 3);
    }

    #[test]
    fn hidden_only_with_dot_prefix() {
        let dir = fixture();
        assert!(!complete_path("", dir.path(), None).contains(&".hidden".to_string()));
        assert_eq!(complete_path(".h", dir.path(), None), vec![".hidden"]);
    }

    #[test]
    fn whitespace_is_quoted() {
        let dir = fixture();
        assert_eq!(complete_path("my", dir.path(), None), vec!["\"my notes.txt\""]);
    }

    #[test]
    fn tilde_expands_against_home() {
        let dir = fixture();
        assert_eq!(
            complete_path("~/alb", Path::new("/"), Some(dir.path())),
            vec!["~/albums/"]
        );
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let dir = fixture();
        assert!(complete_path("nope/x", dir.path(), None).is_empty());
    }
}
