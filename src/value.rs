//! Value space of the embedded configuration language.
//!
//! Every binding an [`Evaluator`](crate::evaluator::Evaluator) exposes is
//! converted into a [`Value`] before the rest of the core looks at it.
//! Declarations made through the host constructors (`model`, `agent`,
//! `tool`, `mcp`, `remote_tool`) arrive as their own variants, so
//! configuration extraction is an exhaustive `match` instead of runtime
//! type checks.
//!
//! | Variant | Produced by |
//! |---------|-------------|
//! | `String`, `Number`, `Bool` | scalars |
//! | `List`, `Object` | plain tables (sequence / keyed) |
//! | `Model` | `model "name" { ... }` |
//! | `Agent` | `agent "name" { ... }` |
//! | `Tool` | `tool "name" { ... }` |
//! | `McpServer` | `mcp "name" { ... }` |
//! | `RemoteTool` | `remote_tool(server, tool)` |
//! | `Opaque` | functions, userdata and other host-only values |

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A value bound in the evaluator's environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Model(ModelDef),
    Agent(AgentDef),
    Tool(ToolDef),
    McpServer(McpServerDef),
    RemoteTool(RemoteToolRef),
    /// A value with no data representation (function, coroutine, userdata).
    Opaque(String),
}

/// Discriminant of [`Value`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Nil,
    Bool,
    Number,
    String,
    List,
    Object,
    Model,
    Agent,
    Tool,
    McpServer,
    RemoteTool,
    Opaque,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Nil => "nil",
            ValueKind::Bool => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Object => "object",
            ValueKind::Model => "model",
            ValueKind::Agent => "agent",
            ValueKind::Tool => "tool",
            ValueKind::McpServer => "mcp server",
            ValueKind::RemoteTool => "remote tool",
            ValueKind::Opaque => "opaque value",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Object(_) => ValueKind::Object,
            Value::Model(_) => ValueKind::Model,
            Value::Agent(_) => ValueKind::Agent,
            Value::Tool(_) => ValueKind::Tool,
            Value::McpServer(_) => ValueKind::McpServer,
            Value::RemoteTool(_) => ValueKind::RemoteTool,
            Value::Opaque(_) => ValueKind::Opaque,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Declarations
// ═══════════════════════════════════════════════════════════════════════

/// A language model declared with `model "name" { ... }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ModelDef {
    pub name: String,
    /// Provider identifier (e.g. `"openai"`, `"ollama"`).
    pub provider: Option<String>,
    /// Provider-side model identifier.
    pub model: Option<String>,
    /// Every other field of the declaration, kept verbatim.
    pub options: BTreeMap<String, Value>,
}

/// An agent declared with `agent "name" { ... }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AgentDef {
    pub name: String,
    /// Name of the model this agent runs on.
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    /// Names of the tools the agent may call.
    pub tools: Vec<String>,
}

/// One declared parameter of a [`ToolDef`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolParam {
    pub name: String,
    /// Declared type name; `"any"` when the declaration omits it.
    pub ty: String,
    pub description: Option<String>,
}

/// A callable tool declared with `tool "name" { ... }`.
///
/// The executable body stays inside the evaluator; it is invoked by name
/// through [`Evaluator::call_tool`](crate::evaluator::Evaluator::call_tool).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ToolDef {
    pub name: String,
    pub description: Option<String>,
    /// Parameters in declaration order.
    pub params: Vec<ToolParam>,
    pub returns: Option<String>,
}

/// An MCP server declared with `mcp "name" { ... }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct McpServerDef {
    pub name: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub url: Option<String>,
}

/// A proxy for a tool served by a named MCP server.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RemoteToolRef {
    pub server: String,
    pub tool: String,
}
