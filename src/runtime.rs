//! Shared shell state: working directory, environment, aliases, functions.
//!
//! [`ShellState`] is the mutable half of the runtime guarded by the
//! [`ExecutionBridge`](crate::bridge::ExecutionBridge) lock. Readers that
//! only need the tables (completion, introspection) go through the
//! [`RuntimeView`] trait rather than the struct's fields.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::completion::spec::CompletionSpec;

/// Read-only accessor over the runtime tables.
pub trait RuntimeView {
    fn cwd(&self) -> &Path;
    fn env_var(&self, name: &str) -> Option<&str>;
    fn alias_names(&self) -> BTreeSet<String>;
    fn function_names(&self) -> BTreeSet<String>;
    fn completion_spec(&self, command: &str) -> Option<&CompletionSpec>;
}

/// Mutable state shared by every execution mode.
#[derive(Debug, Clone)]
pub struct ShellState {
    pub(crate) cwd: PathBuf,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) aliases: BTreeMap<String, String>,
    /// Function name → body source.
    pub(crate) functions: BTreeMap<String, String>,
    pub(crate) completions: BTreeMap<String, CompletionSpec>,
    /// Exit status of the last command (`$?`).
    pub(crate) last_status: i32,
}

impl ShellState {
    /// State rooted at `cwd` with an explicit environment.
    pub fn new(cwd: PathBuf, env: BTreeMap<String, String>) -> Self {
        let mut state = Self {
            cwd,
            env,
            aliases: BTreeMap::new(),
            functions: BTreeMap::new(),
            completions: BTreeMap::new(),
            last_status: 0,
        };
        let pwd = state.cwd.to_string_lossy().to_string();
        state.env.insert("PWD".to_string(), pwd);
        state
    }

    /// State inherited from the current process (cwd and environment).
    pub fn from_process() -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::new(cwd, std::env::vars().collect()))
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn functions(&self) -> &BTreeMap<String, String> {
        &self.functions
    }

    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.env.insert(name.into(), value.into());
    }

    pub fn set_alias(&mut self, name: impl Into<String>, expansion: impl Into<String>) {
        self.aliases.insert(name.into(), expansion.into());
    }

    pub fn set_function(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.functions.insert(name.into(), body.into());
    }

    pub fn register_completion(&mut self, command: impl Into<String>, spec: CompletionSpec) {
        self.completions.insert(command.into(), spec);
    }

    pub fn unregister_completion(&mut self, command: &str) -> Option<CompletionSpec> {
        self.completions.remove(command)
    }

    /// Change directory, resolving `target` against the current one.
    pub(crate) fn change_dir(&mut self, target: &Path) -> std::io::Result<()> {
        let joined = if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.cwd.join(target)
        };
        let resolved = joined.canonicalize()?;
        if !resolved.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("not a directory: {}", target.display()),
            ));
        }
        let old = std::mem::replace(&mut self.cwd, resolved);
        self.env
            .insert("OLDPWD".to_string(), old.to_string_lossy().to_string());
        self.env
            .insert("PWD".to_string(), self.cwd.to_string_lossy().to_string());
        Ok(())
    }

    /// Home directory from the runtime environment, falling back to the process.
    pub(crate) fn home(&self) -> Option<PathBuf> {
        self.env
            .get("HOME")
            .map(PathBuf::from)
            .or_else(home_dir)
    }
}

impl RuntimeView for ShellState {
    fn cwd(&self) -> &Path {
        &self.cwd
    }

    fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    fn alias_names(&self) -> BTreeSet<String> {
        self.aliases.keys().cloned().collect()
    }

    fn function_names(&self) -> BTreeSet<String> {
        self.functions.keys().cloned().collect()
    }

    fn completion_spec(&self, command: &str) -> Option<&CompletionSpec> {
        self.completions.get(command)
    }
}

/// Get the user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Expand `~` at the start of a path against `home`.
pub fn expand_tilde(path: &str, home: Option<&Path>) -> PathBuf {
    if let Some(home) = home {
        if path == "~" {
            return home.to_path_buf();
        }
        if let Some(rest) = path.strip_prefix("~/") {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
