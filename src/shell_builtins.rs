//! Builtin commands that act on [`ShellState`] directly.
//!
//! Builtins are synchronous: they mutate the state and return their output
//! as text. The executor decides whether that output is captured, piped or
//! written to the terminal.

use std::path::Path;

use crate::completion::spec::CompletionSpec;
use crate::runtime::{expand_tilde, RuntimeView, ShellState};
use crate::shell_syntax::is_valid_name;

/// Names handled by [`run_builtin`].
pub const BUILTINS: &[&str] = &[
    "alias", "cd", "complete", "echo", "export", "false", "pwd", "true", "type", "unalias",
    "unset",
];

/// Result of a builtin invocation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BuiltinOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl BuiltinOutput {
    fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    fn fail(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Run builtin `name`, or `None` if it is not one.
pub fn run_builtin(state: &mut ShellState, name: &str, args: &[String]) -> Option<BuiltinOutput> {
    let out = match name {
        "cd" => cd(state, args),
        "pwd" => BuiltinOutput::ok(format!("{}\n", state.cwd.display())),
        "echo" => echo(args),
        "export" => export(state, args),
        "unset" => {
            for name in args {
                state.env.remove(name);
            }
            BuiltinOutput::default()
        }
        "alias" => alias(state, args),
        "unalias" => unalias(state, args),
        "complete" => complete(state, args),
        "type" => type_of(state, args),
        "true" => BuiltinOutput::default(),
        "false" => BuiltinOutput::fail(1, ""),
        _ => return None,
    };
    Some(out)
}

fn cd(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    let home = state.home();
    let (target, announce) = match args.first().map(String::as_str) {
        None => match home {
            Some(home) => (home, false),
            None => return BuiltinOutput::fail(1, "cd: HOME not set\n"),
        },
        Some("-") => match state.env_var("OLDPWD") {
            Some(old) => (old.into(), true),
            None => return BuiltinOutput::fail(1, "cd: OLDPWD not set\n"),
        },
        Some(dir) => (expand_tilde(dir, home.as_deref()), false),
    };
    match state.change_dir(&target) {
        Ok(()) if announce => BuiltinOutput::ok(format!("{}\n", state.cwd.display())),
        Ok(()) => BuiltinOutput::default(),
        Err(e) => BuiltinOutput::fail(1, format!("cd: {}: {}\n", target.display(), e)),
    }
}

fn echo(args: &[String]) -> BuiltinOutput {
    let (newline, words) = match args.first().map(String::as_str) {
        Some("-n") => (false, &args[1..]),
        _ => (true, args),
    };
    let mut out = words.join(" ");
    if newline {
        out.push('\n');
    }
    BuiltinOutput::ok(out)
}

fn export(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.is_empty() || args.iter().all(|a| a == "-p") {
        let listing: String = state
            .env
            .iter()
            .map(|(k, v)| format!("export {}=\"{}\"\n", k, v.replace('"', "\\\"")))
            .collect();
        return BuiltinOutput::ok(listing);
    }
    let mut result = BuiltinOutput::default();
    for arg in args.iter().filter(|a| *a != "-p") {
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg.as_str(), None),
        };
        if !is_valid_name(name) {
            result.status = 1;
            result
                .stderr
                .push_str(&format!("export: `{}': not a valid identifier\n", arg));
            continue;
        }
        match value {
            Some(value) => state.set_var(name, value),
            None => {
                state.env.entry(name.to_string()).or_default();
            }
        }
    }
    result
}

fn alias(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.is_empty() {
        let listing: String = state
            .aliases
            .iter()
            .map(|(k, v)| format!("alias {}='{}'\n", k, v))
            .collect();
        return BuiltinOutput::ok(listing);
    }
    let mut result = BuiltinOutput::default();
    for arg in args {
        match arg.split_once('=') {
            Some((name, expansion)) if !name.is_empty() => state.set_alias(name, expansion),
            _ => match state.aliases.get(arg.as_str()) {
                Some(expansion) => result
                    .stdout
                    .push_str(&format!("alias {}='{}'\n", arg, expansion)),
                None => {
                    result.status = 1;
                    result.stderr.push_str(&format!("alias: {}: not found\n", arg));
                }
            },
        }
    }
    result
}

fn unalias(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.iter().any(|a| a == "-a") {
        state.aliases.clear();
        return BuiltinOutput::default();
    }
    let mut result = BuiltinOutput::default();
    for name in args {
        if state.aliases.remove(name.as_str()).is_none() {
            result.status = 1;
            result.stderr.push_str(&format!("unalias: {}: not found\n", name));
        }
    }
    result
}

const COMPLETE_USAGE: &str =
    "complete: usage: complete [-p] [-r name] [-W words | -C command | -F tool] name...\n";

fn complete(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.is_empty() || args[0] == "-p" {
        let listing: String = state
            .completions
            .iter()
            .map(|(cmd, spec)| format!("{}\n", spec.to_command_line(cmd)))
            .collect();
        return BuiltinOutput::ok(listing);
    }

    let mut spec = None;
    let mut remove = false;
    let mut names = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-r" => remove = true,
            "-W" | "-C" | "-F" => {
                let Some(value) = iter.next() else {
                    return BuiltinOutput::fail(2, COMPLETE_USAGE);
                };
                spec = Some(match arg.as_str() {
                    "-W" => CompletionSpec::Words(
                        value.split_whitespace().map(str::to_string).collect(),
                    ),
                    "-C" => CompletionSpec::Command(value.clone()),
                    _ => CompletionSpec::Tool(value.clone()),
                });
            }
            flag if flag.starts_with('-') => return BuiltinOutput::fail(2, COMPLETE_USAGE),
            name => names.push(name.to_string()),
        }
    }
    if names.is_empty() {
        return BuiltinOutput::fail(2, COMPLETE_USAGE);
    }

    if remove {
        for name in &names {
            state.unregister_completion(name);
        }
        return BuiltinOutput::default();
    }
    let Some(spec) = spec else {
        return BuiltinOutput::fail(2, COMPLETE_USAGE);
    };
    for name in names {
        state.register_completion(name, spec.clone());
    }
    BuiltinOutput::default()
}

fn type_of(state: &ShellState, args: &[String]) -> BuiltinOutput {
    let mut result = BuiltinOutput::default();
    for name in args {
        if let Some(expansion) = state.aliases.get(name.as_str()) {
            result
                .stdout
                .push_str(&format!("{} is aliased to `{}'\n", name, expansion));
        } else if state.functions.contains_key(name.as_str()) {
            result.stdout.push_str(&format!("{} is a function\n", name));
        } else if is_builtin(name) {
            result.stdout.push_str(&format!("{} is a shell builtin\n", name));
        } else if let Some(path) = resolve_command(state, name) {
            result
                .stdout
                .push_str(&format!("{} is {}\n", name, path.display()));
        } else {
            result.status = 1;
            result.stderr.push_str(&format!("type: {}: not found\n", name));
        }
    }
    result
}

/// Resolve a command name to an executable path using the state's `PATH` and cwd.
pub fn resolve_command(state: &ShellState, name: &str) -> Option<std::path::PathBuf> {
    if name.contains('/') {
        let path = expand_tilde(name, state.home().as_deref());
        let path = if path.is_absolute() {
            path
        } else {
            state.cwd.join(path)
        };
        return path.is_file().then_some(path);
    }
    let path_var = state
        .env_var("PATH")
        .map(str::to_string)
        .unwrap_or_else(|| std::env::var("PATH").unwrap_or_default());
    resolve_in_path(name, &path_var)
}

/// Find `name` in a colon-separated `PATH` value.
pub fn resolve_in_path(name: &str, path_var: &str) -> Option<std::path::PathBuf> {
    path_var
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(name))
        .find(|candidate| candidate.is_file() && is_executable(candidate))
}

/// True when any execute bit is set.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn state() -> ShellState {
        ShellState::new(PathBuf::from("/"), BTreeMap::new())
    }

    fn run(state: &mut ShellState, name: &str, args: &[&str]) -> BuiltinOutput {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        run_builtin(state, name, &args).unwrap()
    }

    #[test]
    fn echo_joins_arguments() {
        let mut s = state();
        assert_eq!(run(&mut s, "echo", &["a", "b"]).stdout, "a b\n");
        assert_eq!(run(&mut s, "echo", &["-n", "x"]).stdout, "x");
    }

    #[test]
    fn export_and_unset() {
        let mut s = state();
        run(&mut s, "export", &["FOO=bar", "EMPTY"]);
        assert_eq!(s.env_var("FOO"), Some("bar"));
        assert_eq!(s.env_var("EMPTY"), Some(""));
        let bad = run(&mut s, "export", &["1X=y"]);
        assert_eq!(bad.status, 1);
        run(&mut s, "unset", &["FOO"]);
        assert_eq!(s.env_var("FOO"), None);
    }

    #[test]
    fn alias_set_print_remove() {
        let mut s = state();
        run(&mut s, "alias", &["ll=ls -l"]);
        assert_eq!(run(&mut s, "alias", &["ll"]).stdout, "alias ll='ls -l'\n");
        assert_eq!(run(&mut s, "alias", &["nope"]).status, 1);
        run(&mut s, "unalias", &["ll"]);
        assert!(s.aliases().is_empty());
        assert_eq!(run(&mut s, "unalias", &["ll"]).status, 1);
    }

    #[test]
    fn complete_registers_and_removes_specs() {
        let mut s = state();
        run(&mut s, "complete", &["-W", "start stop", "svc"]);
        assert_eq!(
            s.completion_spec("svc"),
            Some(&CompletionSpec::Words(vec!["start".into(), "stop".into()]))
        );
        assert!(run(&mut s, "complete", &["-p"]).stdout.contains("svc"));
        run(&mut s, "complete", &["-r", "svc"]);
        assert!(s.completion_spec("svc").is_none());
        assert_eq!(run(&mut s, "complete", &["-W"]).status, 2);
    }

    #[test]
    fn type_reports_kinds() {
        let mut s = state();
        s.set_function("f", "echo");
        assert!(run(&mut s, "type", &["f"]).stdout.contains("function"));
        assert!(run(&mut s, "type", &["cd"]).stdout.contains("builtin"));
        assert_eq!(run(&mut s, "type", &["definitely-not-a-command-x"]).status, 1);
    }

    #[test]
    fn cd_to_missing_dir_fails() {
        let mut s = state();
        let out = run(&mut s, "cd", &["/definitely/missing/dir"]);
        assert_eq!(out.status, 1);
        assert!(out.stderr.starts_with("cd: "));
    }

    #[test]
    fn non_builtins_return_none() {
        let mut s = state();
        assert!(run_builtin(&mut s, "ls", &[]).is_none());
    }
}
