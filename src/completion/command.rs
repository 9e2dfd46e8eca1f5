//! Command-name and executable-path completion.

use std::collections::BTreeSet;
use std::path::Path;

use super::files::{path_candidates, quote_if_needed};
use crate::shell_builtins::is_executable;

/// Alias and function names plus `PATH` executables starting with `prefix`.
///
/// Matching is case-sensitive; the result is sorted and de-duplicated.
pub fn get_available_commands(
    prefix: &str,
    aliases: &BTreeSet<String>,
    functions: &BTreeSet<String>,
    path_var: &str,
) -> Vec<String> {
    let mut found: BTreeSet<String> = aliases
        .iter()
        .chain(functions.iter())
        .filter(|name| name.starts_with(prefix))
        .cloned()
        .collect();

    for dir in path_var.split(':').filter(|d| !d.is_empty()) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.filter_map(Result::ok) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(prefix) || found.contains(&name) {
                continue;
            }
            let path = entry.path();
            if path.is_file() && is_executable(&path) {
                found.insert(name);
            }
        }
    }
    found.into_iter().collect()
}

/// Executables and directories under a typed path such as `./` or `~/bin/r`.
///
/// Directories are always offered so navigation can continue; files need
/// at least one execute bit.
pub fn get_executable_completions(path_prefix: &str, cwd: &Path, home: Option<&Path>) -> Vec<String> {
    path_candidates(path_prefix, cwd, home)
        .into_iter()
        .filter(|c| c.is_dir || is_executable(&c.path))
        .map(|c| quote_if_needed(&c.display))
        .collect()
}

/// True when `token` names a path rather than a command to look up on `PATH`.
pub fn is_path_like(token: &str) -> bool {
    token.starts_with('/')
        || token.starts_with("./")
        || token.starts_with("../")
        || token.starts_with("~/")
        || token.contains('/')
}
