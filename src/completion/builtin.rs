//! Builtin `#!` commands handled by the shell front-end itself.

/// Prefix that routes a word to builtin completion and help.
pub const BUILTIN_SENTINEL: &str = "#!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinCommand {
    pub name: &'static str,
    pub description: &'static str,
    pub help: &'static str,
}

/// Every builtin, sorted by name.
pub const BUILTIN_COMMANDS: &[BuiltinCommand] = &[
    BuiltinCommand {
        name: "config",
        description: "Show the active configuration",
        help: "#!config\n\nPrint the merged configuration: prompt, log level, \
               model and agent references, and every declared model, agent, tool \
               and MCP server.",
    },
    BuiltinCommand {
        name: "help",
        description: "List builtin commands",
        help: "#!help [command]\n\nWithout an argument, list all builtin commands. \
               With one, show that command's help.",
    },
    BuiltinCommand {
        name: "new",
        description: "Start a new agent session",
        help: "#!new\n\nDiscard the current agent conversation and start a fresh one \
               with the default agent.",
    },
    BuiltinCommand {
        name: "reload",
        description: "Reload configuration files",
        help: "#!reload\n\nRe-read the baseline, user and integration configuration \
               layers into a fresh evaluator and apply the result.",
    },
    BuiltinCommand {
        name: "tokens",
        description: "Show token usage",
        help: "#!tokens\n\nShow token usage for the current agent session.",
    },
];

/// Sentinel-qualified names of builtins starting with `prefix`.
pub fn completions(prefix: &str) -> Vec<String> {
    BUILTIN_COMMANDS
        .iter()
        .filter(|c| c.name.starts_with(prefix))
        .map(|c| format!("{}{}", BUILTIN_SENTINEL, c.name))
        .collect()
}

pub fn find(name: &str) -> Option<&'static BuiltinCommand> {
    BUILTIN_COMMANDS.iter().find(|c| c.name == name)
}

/// Help for `name`: its full text on an exact match, the command banner
/// when `name` is empty or a prefix of several commands, else empty.
pub fn help(name: &str) -> String {
    if let Some(command) = find(name) {
        return command.help.to_string();
    }
    let matches = BUILTIN_COMMANDS
        .iter()
        .filter(|c| c.name.starts_with(name))
        .count();
    if name.is_empty() || matches > 1 {
        return banner();
    }
    String::new()
}

fn banner() -> String {
    let mut out = String::from("Builtin commands:\n");
    for command in BUILTIN_COMMANDS {
        out.push_str(&format!(
            "  {}{:<10} {}\n",
            BUILTIN_SENTINEL, command.name, command.description
        ));
    }
    out
}
