//! Tab completion over the shared runtime.
//!
//! [`CompletionProvider::complete`] picks one source per request:
//!
//! 1. A word starting with `#/` or `#!` goes to macro or builtin
//!    completion; with no match, to path completion on the remainder.
//! 2. A command with a registered [`CompletionSpec`] gets that spec's
//!    suggestions, even when there are none.
//! 3. A lone first word completes as a command name or executable path.
//! 4. Anything else completes as a file path.
//!
//! Completion never fails: internal errors degrade to no suggestions.

pub mod builtin;
pub mod command;
pub mod files;
pub mod macros;
pub mod spec;
pub mod words;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::bridge::ExecutionBridge;
use crate::runtime::RuntimeView;
use crate::shell_syntax::split_words;
use crate::value::Value;

use self::builtin::BUILTIN_SENTINEL;
use self::macros::{MacroCompleter, MACROS_ENV, MACRO_SENTINEL};
use self::spec::{filter_words, CompletionSpec};
use self::words::bounds_in;

pub use self::words::{apply_suggestion, word_bounds};

/// How long a completion tool may run before it is interrupted.
pub const TOOL_TIMEOUT: Duration = Duration::from_millis(500);

/// Suggestions for the character span `start..end` of the input line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub suggestions: Vec<String>,
    pub start: usize,
    pub end: usize,
}

impl Completion {
    fn new(suggestions: Vec<String>, start: usize, end: usize) -> Self {
        Self {
            suggestions,
            start,
            end,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }
}

/// Everything completion needs from the runtime, copied out of the lock.
struct Snapshot {
    cwd: PathBuf,
    home: Option<PathBuf>,
    path_var: String,
    aliases: BTreeSet<String>,
    functions: BTreeSet<String>,
    macros: MacroCompleter,
    spec: Option<CompletionSpec>,
}

/// Resolves completions and `#`-help against an [`ExecutionBridge`].
#[derive(Clone)]
pub struct CompletionProvider {
    bridge: ExecutionBridge,
}

impl CompletionProvider {
    pub fn new(bridge: ExecutionBridge) -> Self {
        Self { bridge }
    }

    async fn snapshot(&self, command: Option<&str>) -> Snapshot {
        let runtime = self.bridge.read().await;
        let state = runtime.state();
        Snapshot {
            cwd: state.cwd().to_path_buf(),
            home: state.home(),
            path_var: state.env_var("PATH").unwrap_or_default().to_string(),
            aliases: state.alias_names(),
            functions: state.function_names(),
            macros: MacroCompleter::from_sources(
                Some(runtime.evaluator()),
                state.env_var(MACROS_ENV),
            ),
            spec: command.and_then(|c| state.completion_spec(c).cloned()),
        }
    }

    /// Suggestions for the word at `cursor` (a character offset) in `line`.
    pub async fn complete(&self, line: &str, cursor: usize) -> Completion {
        let chars: Vec<char> = line.chars().collect();
        let cursor = cursor.min(chars.len());
        let (start, end) = bounds_in(&chars, cursor);
        let word: String = chars[start..cursor].iter().collect();

        for sentinel in [MACRO_SENTINEL, BUILTIN_SENTINEL] {
            if let Some(rest) = word.strip_prefix(sentinel) {
                let snapshot = self.snapshot(None).await;
                let mut suggestions = if sentinel == MACRO_SENTINEL {
                    snapshot.macros.completions(rest)
                } else {
                    builtin::completions(rest)
                };
                if suggestions.is_empty() {
                    tracing::debug!(sentinel, rest, "no sentinel match, completing paths");
                    suggestions = files::path_candidates(rest, &snapshot.cwd, snapshot.home.as_deref())
                        .into_iter()
                        .map(|c| files::quote_if_needed(&format!("{}{}", sentinel, c.display)))
                        .collect();
                }
                return Completion::new(suggestions, start, end);
            }
        }

        let (tokens, trailing_space) = split_words(&chars[..cursor]);
        let command = tokens.first().map(|t| t.text.clone());
        let snapshot = self.snapshot(command.as_deref()).await;
        let word_start = match tokens.last() {
            Some(last) if !trailing_space => last.start,
            _ => cursor,
        };

        if let (Some(spec), Some(command)) = (&snapshot.spec, &command) {
            let mut args: Vec<String> = tokens.iter().map(|t| t.text.clone()).collect();
            if trailing_space {
                args.push(String::new());
            }
            tracing::debug!(command = %command, words = args.len(), "completing from spec");
            let suggestions = self.run_spec(spec, line, cursor, &args).await;
            return Completion::new(suggestions, word_start, end);
        }

        if tokens.len() == 1 && !trailing_space {
            let token = &tokens[0].text;
            let suggestions = if command::is_path_like(token) {
                command::get_executable_completions(token, &snapshot.cwd, snapshot.home.as_deref())
            } else {
                command::get_available_commands(
                    token,
                    &snapshot.aliases,
                    &snapshot.functions,
                    &snapshot.path_var,
                )
            };
            if !suggestions.is_empty() {
                return Completion::new(suggestions, word_start, end);
            }
        }

        let prefix = match tokens.last() {
            Some(last) if !trailing_space => last.text.as_str(),
            _ => "",
        };
        let suggestions = files::complete_path(prefix, &snapshot.cwd, snapshot.home.as_deref());
        Completion::new(suggestions, word_start, end)
    }

    /// Help text for a `#/` or `#!` word at `cursor`, or empty.
    pub async fn help(&self, line: &str, cursor: usize) -> String {
        let chars: Vec<char> = line.chars().collect();
        let (start, end) = bounds_in(&chars, cursor);
        let word: String = chars[start..end].iter().collect();
        if let Some(name) = word.strip_prefix(MACRO_SENTINEL) {
            return self.snapshot(None).await.macros.help(name);
        }
        if let Some(name) = word.strip_prefix(BUILTIN_SENTINEL) {
            return builtin::help(name);
        }
        String::new()
    }

    async fn run_spec(&self, spec: &CompletionSpec, line: &str, cursor: usize, args: &[String]) -> Vec<String> {
        let current = args.last().map(String::as_str).unwrap_or("");
        match spec {
            CompletionSpec::Words(words) => filter_words(words, current),
            CompletionSpec::Command(script) => {
                let env = [
                    ("COMP_LINE".to_string(), line.to_string()),
                    ("COMP_POINT".to_string(), cursor.to_string()),
                    ("COMP_CWORD".to_string(), args.len().saturating_sub(1).to_string()),
                    ("COMP_WORDS".to_string(), args.join(" ")),
                ];
                match self.bridge.run_captured_with_env(script, &env).await {
                    Ok(out) => out
                        .stdout
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string)
                        .collect(),
                    Err(e) => {
                        tracing::warn!(error = %e, "completion command failed");
                        Vec::new()
                    }
                }
            }
            CompletionSpec::Tool(tool) => {
                let words = Value::List(args.iter().map(|a| Value::from(a.as_str())).collect());
                match self.bridge.call_tool(tool, vec![words], TOOL_TIMEOUT).await {
                    Ok(Value::List(items)) => items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    Ok(other) => {
                        tracing::warn!(tool = %tool, kind = %other.kind(), "completion tool returned a non-list");
                        Vec::new()
                    }
                    Err(e) => {
                        tracing::warn!(tool = %tool, error = %e, "completion tool failed");
                        Vec::new()
                    }
                }
            }
        }
    }
}
