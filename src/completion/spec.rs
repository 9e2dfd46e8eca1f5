//! Per-command argument completion definitions.
//!
//! Specs are registered on the shell state, either from Rust through the
//! bridge or from the shell with the `complete` builtin:
//!
//! ```text
//! complete -W "start stop status" svc     # fixed word list
//! complete -C "git branch --format=%(refname:short)" checkout
//! complete -F branch_names co             # embedded-language tool
//! complete -r svc                         # unregister
//! ```

use serde::Serialize;

/// How to compute argument suggestions for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CompletionSpec {
    /// Fixed candidates, filtered by the word being completed.
    Words(Vec<String>),
    /// Shell command run in captured mode; each output line is a suggestion.
    ///
    /// The command sees `COMP_LINE`, `COMP_POINT`, `COMP_CWORD` and
    /// `COMP_WORDS` in its environment.
    Command(String),
    /// Embedded-language tool called with the word list; returns a list of strings.
    Tool(String),
}

impl CompletionSpec {
    /// Render as the `complete` invocation that would register it.
    pub fn to_command_line(&self, command: &str) -> String {
        match self {
            CompletionSpec::Words(words) => {
                format!("complete -W '{}' {}", words.join(" "), command)
            }
            CompletionSpec::Command(script) => format!("complete -C '{}' {}", script, command),
            CompletionSpec::Tool(tool) => format!("complete -F {} {}", tool, command),
        }
    }
}

/// Words from `candidates` starting with `prefix`, sorted and de-duplicated.
pub(crate) fn filter_words(candidates: &[String], prefix: &str) -> Vec<String> {
    let mut out: Vec<String> = candidates
        .iter()
        .filter(|w| w.starts_with(prefix))
        .cloned()
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_words_by_prefix() {
        let words = vec!["stop".to_string(), "start".to_string(), "status".to_string()];
        assert_eq!(filter_words(&words, "st"), vec!["start", "status", "stop"]);
        assert_eq!(filter_words(&words, "sta"), vec!["start", "status"]);
        assert!(filter_words(&words, "x").is_empty());
        assert_eq!(filter_words(&words, "").len(), 3);
    }

    #[test]
    fn command_line_rendering() {
        let spec = CompletionSpec::Words(vec!["a".into(), "b".into()]);
        assert_eq!(spec.to_command_line("svc"), "complete -W 'a b' svc");
        assert_eq!(
            CompletionSpec::Tool("names".into()).to_command_line("co"),
            "complete -F names co"
        );
    }
}
