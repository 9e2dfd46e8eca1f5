//! Typed configuration extracted from an evaluator's environment.
//!
//! [`extract`] reads the settings object (`GSH_CONFIG`) and every declared
//! model, agent, tool and MCP server into a [`Config`]. Fields keep track of
//! whether a layer set them, so [`Config::merge`] can deep-merge one config
//! over another with the later one winning per key.
//!
//! Bad settings never abort extraction: an invalid field is left unset and
//! reported as a [`ConfigError::Validation`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use globset::{Glob, GlobSetBuilder};
use serde::Serialize;

use crate::evaluator::{EvalError, Evaluator};
use crate::lua_runtime::SETTINGS_BINDING;
use crate::value::{AgentDef, McpServerDef, ModelDef, RemoteToolRef, ToolDef, Value};

pub const DEFAULT_PROMPT: &str = "gsh> ";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Problems found while loading configuration.
///
/// Everything except [`ConfigError::Io`] is collected as a diagnostic and
/// never aborts a load.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    Parse(EvalError),
    #[error("{0}")]
    Eval(EvalError),
    #[error("invalid {field}: expected {expected}, found {found}")]
    Validation {
        field: String,
        expected: &'static str,
        found: String,
    },
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<EvalError> for ConfigError {
    fn from(err: EvalError) -> Self {
        if err.is_parse() {
            ConfigError::Parse(err)
        } else {
            ConfigError::Eval(err)
        }
    }
}

impl ConfigError {
    fn invalid(field: impl Into<String>, expected: &'static str, found: &Value) -> Self {
        ConfigError::Validation {
            field: field.into(),
            expected,
            found: found.kind().to_string(),
        }
    }
}

/// Shell configuration.
///
/// Scalar settings are `None` until a source sets them; the accessors
/// apply defaults. That keeps "explicitly set to the default" distinct
/// from "never set" when layers are merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub prompt: Option<String>,
    pub log_level: Option<String>,
    /// Name of the model used for command prediction.
    pub predict_model: Option<String>,
    pub default_agent_model: Option<String>,
    pub default_agent: Option<String>,
    pub starship_integration: Option<bool>,
    pub show_welcome: Option<bool>,
    pub macros: Option<BTreeMap<String, String>>,
    pub approved_commands: Option<Vec<String>>,
    /// Settings keys this crate does not interpret, kept for deep merge.
    pub extra: BTreeMap<String, Value>,
    pub models: BTreeMap<String, ModelDef>,
    pub agents: BTreeMap<String, AgentDef>,
    pub tools: BTreeMap<String, ToolDef>,
    pub remote_tools: BTreeMap<String, RemoteToolRef>,
    pub mcp_servers: BTreeMap<String, McpServerDef>,
}

impl Config {
    pub fn prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_PROMPT)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn starship_integration(&self) -> bool {
        self.starship_integration.unwrap_or(true)
    }

    pub fn show_welcome(&self) -> bool {
        self.show_welcome.unwrap_or(true)
    }

    pub fn approved_commands(&self) -> &[String] {
        self.approved_commands.as_deref().unwrap_or(&[])
    }

    /// True when `command` matches one of the approved glob patterns.
    pub fn is_command_approved(&self, command: &str) -> bool {
        let mut builder = GlobSetBuilder::new();
        for pattern in self.approved_commands() {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => tracing::warn!(pattern = %pattern, error = %e, "skipping bad pattern"),
            }
        }
        match builder.build() {
            Ok(set) => set.is_match(command.trim()),
            Err(_) => false,
        }
    }

    /// Combine two configurations; `other` wins for everything it sets.
    ///
    /// Registries and macros merge per key, nested `extra` objects merge
    /// recursively.
    pub fn merge(&self, other: &Config) -> Config {
        let macros = match (&self.macros, &other.macros) {
            (Some(base), Some(over)) => Some(merge_maps(base, over)),
            (base, over) => over.clone().or_else(|| base.clone()),
        };
        let mut extra = self.extra.clone();
        for (key, value) in &other.extra {
            let merged = match extra.get(key) {
                Some(base) => merge_values(base, value),
                None => value.clone(),
            };
            extra.insert(key.clone(), merged);
        }

        Config {
            prompt: other.prompt.clone().or_else(|| self.prompt.clone()),
            log_level: other.log_level.clone().or_else(|| self.log_level.clone()),
            predict_model: other
                .predict_model
                .clone()
                .or_else(|| self.predict_model.clone()),
            default_agent_model: other
                .default_agent_model
                .clone()
                .or_else(|| self.default_agent_model.clone()),
            default_agent: other
                .default_agent
                .clone()
                .or_else(|| self.default_agent.clone()),
            starship_integration: other.starship_integration.or(self.starship_integration),
            show_welcome: other.show_welcome.or(self.show_welcome),
            macros,
            approved_commands: other
                .approved_commands
                .clone()
                .or_else(|| self.approved_commands.clone()),
            extra,
            models: merge_maps(&self.models, &other.models),
            agents: merge_maps(&self.agents, &other.agents),
            tools: merge_maps(&self.tools, &other.tools),
            remote_tools: merge_maps(&self.remote_tools, &other.remote_tools),
            mcp_servers: merge_maps(&self.mcp_servers, &other.mcp_servers),
        }
    }
}

fn merge_maps<V: Clone>(base: &BTreeMap<String, V>, over: &BTreeMap<String, V>) -> BTreeMap<String, V> {
    let mut out = base.clone();
    out.extend(over.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

fn merge_values(base: &Value, over: &Value) -> Value {
    match (base, over) {
        (Value::Object(base), Value::Object(over)) => {
            let mut out = base.clone();
            for (key, value) in over {
                let merged = match out.get(key) {
                    Some(existing) => merge_values(existing, value),
                    None => value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        (_, over) => over.clone(),
    }
}

/// Build a [`Config`] from an evaluator's bindings.
///
/// Settings come from the `GSH_CONFIG` object; a field of the wrong type
/// is reported and skipped. Registries are filled from every top-level
/// binding by its kind, whether or not the settings refer to it.
pub fn extract(evaluator: &dyn Evaluator) -> (Config, Vec<ConfigError>) {
    let mut config = Config::default();
    let mut errors = Vec::new();

    match evaluator.get(SETTINGS_BINDING) {
        None => {}
        Some(Value::Object(settings)) => {
            for (key, value) in &settings {
                if let Err(e) = apply_setting(&mut config, key, value) {
                    errors.push(e);
                }
            }
        }
        Some(other) => errors.push(ConfigError::invalid(SETTINGS_BINDING, "object", &other)),
    }

    for (name, value) in evaluator.bindings() {
        match value {
            Value::Model(model) => {
                config.models.insert(name, model);
            }
            Value::Agent(agent) => {
                config.agents.insert(name, agent);
            }
            Value::Tool(tool) => {
                config.tools.insert(name, tool);
            }
            Value::RemoteTool(remote) => {
                config.remote_tools.insert(name, remote);
            }
            Value::McpServer(server) => {
                config.mcp_servers.insert(name, server);
            }
            _ => {}
        }
    }

    (config, errors)
}

fn apply_setting(config: &mut Config, key: &str, value: &Value) -> Result<(), ConfigError> {
    let field = format!("{}.{}", SETTINGS_BINDING, key);
    match key {
        "prompt" => config.prompt = Some(expect_string(&field, value)?),
        "logLevel" => config.log_level = Some(expect_string(&field, value)?),
        "predictModel" => config.predict_model = Some(expect_model(&field, value)?),
        "defaultAgentModel" => config.default_agent_model = Some(expect_model(&field, value)?),
        "defaultAgent" => match value {
            Value::Agent(agent) => config.default_agent = Some(agent.name.clone()),
            other => return Err(ConfigError::invalid(field, "agent", other)),
        },
        "starshipIntegration" => config.starship_integration = Some(expect_bool(&field, value)?),
        "showWelcome" => config.show_welcome = Some(expect_bool(&field, value)?),
        "macros" => config.macros = Some(extract_macros(&field, value)?),
        "approvedCommands" => config.approved_commands = Some(extract_patterns(&field, value)?),
        _ => {
            config.extra.insert(key.to_string(), value.clone());
        }
    }
    Ok(())
}

fn expect_string(field: &str, value: &Value) -> Result<String, ConfigError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::invalid(field, "string", value))
}

fn expect_bool(field: &str, value: &Value) -> Result<bool, ConfigError> {
    value
        .as_bool()
        .ok_or_else(|| ConfigError::invalid(field, "boolean", value))
}

// Model settings accept only model references, never bare names.
fn expect_model(field: &str, value: &Value) -> Result<String, ConfigError> {
    match value {
        Value::Model(model) => Ok(model.name.clone()),
        other => Err(ConfigError::invalid(field, "model", other)),
    }
}

fn extract_macros(field: &str, value: &Value) -> Result<BTreeMap<String, String>, ConfigError> {
    let entries = value
        .as_object()
        .ok_or_else(|| ConfigError::invalid(field, "object", value))?;
    let mut macros = BTreeMap::new();
    for (name, expansion) in entries {
        let expansion = expect_string(&format!("{}.{}", field, name), expansion)?;
        macros.insert(name.clone(), expansion);
    }
    Ok(macros)
}

fn extract_patterns(field: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    let items: &[Value] = match value {
        Value::List(items) => items,
        // An empty Lua table has no sequence part.
        Value::Object(map) if map.is_empty() => &[],
        other => return Err(ConfigError::invalid(field, "list", other)),
    };
    let mut patterns = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let item_field = format!("{}[{}]", field, idx + 1);
        let pattern = expect_string(&item_field, item)?;
        if let Err(e) = Glob::new(&pattern) {
            return Err(ConfigError::Validation {
                field: item_field,
                expected: "glob pattern",
                found: e.to_string(),
            });
        }
        patterns.push(pattern);
    }
    Ok(patterns)
}
