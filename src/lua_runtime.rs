//! Lua 5.4 implementation of the embedded configuration language.
//!
//! [`LuaEvaluator`] owns one sandboxed Lua VM for its whole lifetime, so
//! every layer of configuration and every `RunScript` call lands in the same
//! global environment. Host constructors turn Lua tables into tagged
//! declarations that [`crate::value::Value`] understands.
//!
//! # Declarations
//!
//! ```lua
//! model "fast" { provider = "ollama", model = "qwen2.5:3b" }
//! agent "helper" { model = fast, systemPrompt = "Be brief.", tools = { ls_tool } }
//! tool "GSH_PROMPT" {
//!     parameters = { { name = "exitCode", type = "number" }, { name = "durationMs", type = "number" } },
//!     returns = "string",
//!     execute = function(exitCode, durationMs) return exitCode == 0 and "ok> " or "err> " end,
//! }
//! mcp "fs" { command = "mcp-fs", args = { "--root", "/" } }
//! read_file = remote_tool("fs", "read_file")
//!
//! GSH_CONFIG.prompt = "gsh> "
//! ```
//!
//! The curried form (`model "fast" { ... }`) binds the global `fast`. The
//! anonymous form (`fast = model { ... }`) is named after its global once
//! the chunk finishes.
//!
//! # Host APIs
//!
//! | Module | Functions |
//! |--------|-----------|
//! | `json` | `parse`, `encode` |
//! | `env` | `get` |
//! | `log` | `info`, `warn`, `error`, `debug` |
//!
//! # Sandboxing
//!
//! Dangerous Lua standard libraries (`os`, `io`, `debug`, `loadfile`, `dofile`)
//! are removed.

use mlua::prelude::*;
use std::collections::{BTreeMap, HashMap};

use crate::evaluator::{EvalError, Evaluator, Interrupt};
use crate::value::{AgentDef, McpServerDef, ModelDef, RemoteToolRef, ToolDef, ToolParam, Value};

/// Global holding the settings object.
pub const SETTINGS_BINDING: &str = "GSH_CONFIG";

/// Table key carrying a declaration's kind.
const KIND_KEY: &str = "__gsh_kind";

/// Nesting limit when converting tables; guards against cycles.
const MAX_DEPTH: usize = 32;

// ═══════════════════════════════════════════════════════════════════════
// Evaluator
// ═══════════════════════════════════════════════════════════════════════

/// A persistent, sandboxed Lua environment.
pub struct LuaEvaluator {
    lua: Lua,
    /// Identity of every global present after host setup. A global still
    /// holding its host value is not a user binding; a user declaration that
    /// reuses the name (`model "env" { ... }`) is.
    host_globals: HashMap<String, usize>,
    interrupt: Interrupt,
}

impl LuaEvaluator {
    /// Create a VM with the sandbox, host APIs and declaration constructors installed.
    pub fn new() -> Result<Self, EvalError> {
        let lua = Lua::new();
        let interrupt = Interrupt::new();
        setup(&lua, &interrupt).map_err(|e| EvalError::Runtime {
            chunk: "<host>".to_string(),
            message: e.to_string(),
        })?;

        let mut host_globals = HashMap::new();
        for pair in lua.globals().pairs::<LuaValue, LuaValue>() {
            if let Ok((LuaValue::String(key), value)) = pair {
                if let Ok(key) = key.to_str() {
                    host_globals.insert(key.to_string(), value.to_pointer() as usize);
                }
            }
        }

        Ok(Self {
            lua,
            host_globals,
            interrupt,
        })
    }

    fn is_host_global(&self, key: &str, value: &LuaValue) -> bool {
        key == SETTINGS_BINDING
            || self.host_globals.get(key) == Some(&(value.to_pointer() as usize))
    }

    /// Name anonymous declarations after the global that holds them.
    fn stamp_anonymous_declarations(&self) -> LuaResult<()> {
        for pair in self.lua.globals().pairs::<LuaValue, LuaValue>() {
            let (key, value) = pair?;
            let key = match key {
                LuaValue::String(key) => key.to_str()?.to_string(),
                _ => continue,
            };
            if self.is_host_global(&key, &value) {
                continue;
            }
            let LuaValue::Table(table) = value else {
                continue;
            };
            let kind: Option<String> = table.raw_get(KIND_KEY)?;
            let name: Option<String> = table.raw_get("name")?;
            if kind.is_some() && kind.as_deref() != Some("remote_tool") && name.is_none() {
                table.raw_set("name", key)?;
            }
        }
        Ok(())
    }

    /// Deep copy of the settings object, for restoring after a failed layer.
    fn snapshot_settings(&self) -> LuaResult<LuaValue> {
        let current: LuaValue = self.lua.globals().get(SETTINGS_BINDING)?;
        deep_copy(&self.lua, &current, 0)
    }

    fn map_error(&self, chunk: &str, err: LuaError) -> EvalError {
        if self.interrupt.is_triggered() {
            return EvalError::Cancelled;
        }
        match err {
            LuaError::SyntaxError { message, .. } => EvalError::Parse {
                chunk: chunk.to_string(),
                message,
            },
            other => EvalError::Runtime {
                chunk: chunk.to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl Evaluator for LuaEvaluator {
    fn eval(&mut self, source: &str, chunk: &str) -> Result<(), EvalError> {
        let function = self
            .lua
            .load(source)
            .set_name(format!("={}", chunk))
            .into_function()
            .map_err(|e| self.map_error(chunk, e))?;

        function
            .call::<()>(())
            .map_err(|e| self.map_error(chunk, e))?;

        self.stamp_anonymous_declarations()
            .map_err(|e| self.map_error(chunk, e))
    }

    fn eval_layer(&mut self, source: &str, chunk: &str) -> Result<(), EvalError> {
        let saved = self
            .snapshot_settings()
            .map_err(|e| self.map_error(chunk, e))?;
        let result = self.eval(source, chunk);
        if result.is_err() {
            if let Err(e) = self.lua.globals().set(SETTINGS_BINDING, saved) {
                tracing::warn!(layer = chunk, error = %e, "could not restore settings");
            }
        }
        result
    }

    fn get(&self, name: &str) -> Option<Value> {
        let value: LuaValue = self.lua.globals().get(name).ok()?;
        match value {
            LuaValue::Nil => None,
            other => lua_to_value(&other, 0).ok(),
        }
    }

    fn bindings(&self) -> Vec<(String, Value)> {
        let mut out = BTreeMap::new();
        for pair in self.lua.globals().pairs::<LuaValue, LuaValue>() {
            let Ok((LuaValue::String(key), value)) = pair else {
                continue;
            };
            let Ok(key) = key.to_str().map(|k| k.to_string()) else {
                continue;
            };
            if self.is_host_global(&key, &value) {
                continue;
            }
            if let Ok(value) = lua_to_value(&value, 0) {
                out.insert(key, value);
            }
        }
        out.into_iter().collect()
    }

    fn call_tool(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let unknown = || EvalError::UnknownTool(name.to_string());
        let table = match self.lua.globals().get::<LuaValue>(name) {
            Ok(LuaValue::Table(table)) => table,
            _ => return Err(unknown()),
        };
        if declaration_kind(&table).as_deref() != Some("tool") {
            return Err(unknown());
        }
        let execute: LuaFunction = table.get("execute").map_err(|_| EvalError::Runtime {
            chunk: name.to_string(),
            message: "tool has no execute function".to_string(),
        })?;

        let chunk = format!("tool {}", name);
        let lua_args = args
            .iter()
            .map(|a| value_to_lua(&self.lua, a))
            .collect::<LuaResult<Vec<LuaValue>>>()
            .map_err(|e| self.map_error(&chunk, e))?;

        let result: LuaValue = execute
            .call(mlua::Variadic::from_iter(lua_args))
            .map_err(|e| self.map_error(&chunk, e))?;

        lua_to_value(&result, 0).map_err(|e| self.map_error(&chunk, e))
    }

    fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Setup
// ═══════════════════════════════════════════════════════════════════════

fn setup(lua: &Lua, interrupt: &Interrupt) -> LuaResult<()> {
    sandbox_globals(lua)?;
    register_json_api(lua)?;
    register_env_api(lua)?;
    register_log_api(lua)?;
    register_declarations(lua)?;
    lua.globals().set(SETTINGS_BINDING, lua.create_table()?)?;

    let flag = interrupt.clone();
    lua.set_hook(
        mlua::HookTriggers::new().every_nth_instruction(1_000),
        move |_lua, _debug| {
            if flag.is_triggered() {
                Err(mlua::Error::RuntimeError("interrupted".to_string()))
            } else {
                Ok(mlua::VmState::Continue)
            }
        },
    );
    Ok(())
}

/// Remove dangerous standard library functions from the Lua globals.
fn sandbox_globals(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();
    globals.set("os", LuaValue::Nil)?;
    globals.set("io", LuaValue::Nil)?;
    globals.set("loadfile", LuaValue::Nil)?;
    globals.set("dofile", LuaValue::Nil)?;
    globals.set("debug", LuaValue::Nil)?;
    Ok(())
}

fn register_json_api(lua: &Lua) -> LuaResult<()> {
    let json_table = lua.create_table()?;

    json_table.set(
        "parse",
        lua.create_function(|lua, s: String| {
            let value: serde_json::Value = serde_json::from_str(&s)
                .map_err(|e| mlua::Error::RuntimeError(format!("json.parse: {}", e)))?;
            json_value_to_lua(lua, &value)
        })?,
    )?;

    json_table.set(
        "encode",
        lua.create_function(|_lua, value: LuaValue| {
            let json = lua_value_to_json(value)?;
            serde_json::to_string(&json)
                .map_err(|e| mlua::Error::RuntimeError(format!("json.encode: {}", e)))
        })?,
    )?;

    lua.globals().set("json", json_table)?;
    Ok(())
}

fn register_env_api(lua: &Lua) -> LuaResult<()> {
    let env = lua.create_table()?;

    env.set(
        "get",
        lua.create_function(|_lua, name: String| Ok(std::env::var(&name).ok()))?,
    )?;

    lua.globals().set("env", env)?;
    Ok(())
}

fn register_log_api(lua: &Lua) -> LuaResult<()> {
    let log = lua.create_table()?;

    log.set(
        "debug",
        lua.create_function(|_lua, msg: String| {
            tracing::debug!(target: "gsh::script", "{}", msg);
            Ok(())
        })?,
    )?;
    log.set(
        "info",
        lua.create_function(|_lua, msg: String| {
            tracing::info!(target: "gsh::script", "{}", msg);
            Ok(())
        })?,
    )?;
    log.set(
        "warn",
        lua.create_function(|_lua, msg: String| {
            tracing::warn!(target: "gsh::script", "{}", msg);
            Ok(())
        })?,
    )?;
    log.set(
        "error",
        lua.create_function(|_lua, msg: String| {
            tracing::error!(target: "gsh::script", "{}", msg);
            Ok(())
        })?,
    )?;

    lua.globals().set("log", log)?;
    Ok(())
}

/// Install `model`, `agent`, `tool`, `mcp` and `remote_tool`.
fn register_declarations(lua: &Lua) -> LuaResult<()> {
    for kind in ["model", "agent", "tool", "mcp"] {
        lua.globals().set(kind, declaration_constructor(lua, kind)?)?;
    }

    lua.globals().set(
        "remote_tool",
        lua.create_function(|lua, (server, tool): (String, String)| {
            let table = lua.create_table()?;
            table.raw_set(KIND_KEY, "remote_tool")?;
            table.raw_set("server", server)?;
            table.raw_set("tool", tool)?;
            Ok(table)
        })?,
    )?;
    Ok(())
}

/// `kind "name" { ... }` binds the global `name`; `kind { ... }` just tags the table.
fn declaration_constructor(lua: &Lua, kind: &'static str) -> LuaResult<LuaFunction> {
    lua.create_function(move |lua, arg: LuaValue| match arg {
        LuaValue::Table(spec) => {
            spec.raw_set(KIND_KEY, kind)?;
            Ok(LuaValue::Table(spec))
        }
        LuaValue::String(name) => {
            let name = name.to_str()?.to_string();
            let binder = lua.create_function(move |lua, spec: LuaTable| {
                spec.raw_set(KIND_KEY, kind)?;
                spec.raw_set("name", name.as_str())?;
                lua.globals().set(name.as_str(), spec.clone())?;
                Ok(spec)
            })?;
            Ok(LuaValue::Function(binder))
        }
        other => Err(mlua::Error::RuntimeError(format!(
            "{} expects a name or a table, got {}",
            kind,
            other.type_name()
        ))),
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Value Conversions: Lua → Value
// ═══════════════════════════════════════════════════════════════════════

/// Copy nested tables; other values are shared.
fn deep_copy(lua: &Lua, value: &LuaValue, depth: usize) -> LuaResult<LuaValue> {
    match value {
        LuaValue::Table(table) if depth < MAX_DEPTH => {
            let copy = lua.create_table()?;
            for pair in table.clone().pairs::<LuaValue, LuaValue>() {
                let (key, value) = pair?;
                copy.raw_set(key, deep_copy(lua, &value, depth + 1)?)?;
            }
            Ok(LuaValue::Table(copy))
        }
        other => Ok(other.clone()),
    }
}

fn declaration_kind(table: &LuaTable) -> Option<String> {
    table.raw_get::<Option<String>>(KIND_KEY).ok().flatten()
}

fn lua_to_value(value: &LuaValue, depth: usize) -> LuaResult<Value> {
    if depth > MAX_DEPTH {
        return Ok(Value::Opaque("nested too deep".to_string()));
    }
    Ok(match value {
        LuaValue::Nil => Value::Nil,
        LuaValue::Boolean(b) => Value::Bool(*b),
        LuaValue::Integer(i) => Value::Number(*i as f64),
        LuaValue::Number(n) => Value::Number(*n),
        LuaValue::String(s) => Value::String(s.to_str()?.to_string()),
        LuaValue::Table(t) => match declaration_kind(t).as_deref() {
            Some("model") => Value::Model(table_to_model(t, depth)?),
            Some("agent") => Value::Agent(table_to_agent(t)?),
            Some("tool") => Value::Tool(table_to_tool(t)?),
            Some("mcp") => Value::McpServer(table_to_mcp(t)?),
            Some("remote_tool") => Value::RemoteTool(RemoteToolRef {
                server: t.raw_get::<Option<String>>("server")?.unwrap_or_default(),
                tool: t.raw_get::<Option<String>>("tool")?.unwrap_or_default(),
            }),
            _ => plain_table_to_value(t, depth)?,
        },
        other => Value::Opaque(other.type_name().to_string()),
    })
}

fn plain_table_to_value(table: &LuaTable, depth: usize) -> LuaResult<Value> {
    let len = table.raw_len();
    if len > 0 {
        let mut items = Vec::with_capacity(len);
        for i in 1..=len {
            let item: LuaValue = table.raw_get(i)?;
            items.push(lua_to_value(&item, depth + 1)?);
        }
        return Ok(Value::List(items));
    }
    let mut map = BTreeMap::new();
    for pair in table.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        if let LuaValue::String(key) = key {
            map.insert(key.to_str()?.to_string(), lua_to_value(&value, depth + 1)?);
        }
    }
    Ok(Value::Object(map))
}

fn optional_string(table: &LuaTable, key: &str) -> LuaResult<Option<String>> {
    match table.raw_get::<LuaValue>(key)? {
        LuaValue::String(s) => Ok(Some(s.to_str()?.to_string())),
        _ => Ok(None),
    }
}

/// Name of whatever a declaration field references: a declaration's name or a plain string.
fn reference_name(value: &LuaValue) -> LuaResult<Option<String>> {
    match value {
        LuaValue::String(s) => Ok(Some(s.to_str()?.to_string())),
        LuaValue::Table(t) => match declaration_kind(t).as_deref() {
            Some("remote_tool") => {
                let server = optional_string(t, "server")?.unwrap_or_default();
                let tool = optional_string(t, "tool")?.unwrap_or_default();
                Ok(Some(format!("{}.{}", server, tool)))
            }
            Some(_) => optional_string(t, "name"),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

fn table_to_model(table: &LuaTable, depth: usize) -> LuaResult<ModelDef> {
    let mut options = BTreeMap::new();
    for pair in table.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        let LuaValue::String(key) = key else { continue };
        let key = key.to_str()?.to_string();
        if matches!(key.as_str(), KIND_KEY | "name" | "provider" | "model") {
            continue;
        }
        options.insert(key, lua_to_value(&value, depth + 1)?);
    }
    Ok(ModelDef {
        name: optional_string(table, "name")?.unwrap_or_default(),
        provider: optional_string(table, "provider")?,
        model: optional_string(table, "model")?,
        options,
    })
}

fn table_to_agent(table: &LuaTable) -> LuaResult<AgentDef> {
    let mut tools = Vec::new();
    if let LuaValue::Table(list) = table.raw_get::<LuaValue>("tools")? {
        for i in 1..=list.raw_len() {
            if let Some(name) = reference_name(&list.raw_get::<LuaValue>(i)?)? {
                tools.push(name);
            }
        }
    }
    Ok(AgentDef {
        name: optional_string(table, "name")?.unwrap_or_default(),
        model: reference_name(&table.raw_get::<LuaValue>("model")?)?,
        system_prompt: optional_string(table, "systemPrompt")?,
        tools,
    })
}

fn table_to_tool(table: &LuaTable) -> LuaResult<ToolDef> {
    let mut params = Vec::new();
    if let LuaValue::Table(list) = table.raw_get::<LuaValue>("parameters")? {
        for i in 1..=list.raw_len() {
            match list.raw_get::<LuaValue>(i)? {
                LuaValue::String(name) => params.push(ToolParam {
                    name: name.to_str()?.to_string(),
                    ty: "any".to_string(),
                    description: None,
                }),
                LuaValue::Table(param) => params.push(ToolParam {
                    name: optional_string(&param, "name")?.unwrap_or_default(),
                    ty: optional_string(&param, "type")?.unwrap_or_else(|| "any".to_string()),
                    description: optional_string(&param, "description")?,
                }),
                _ => {}
            }
        }
    }
    Ok(ToolDef {
        name: optional_string(table, "name")?.unwrap_or_default(),
        description: optional_string(table, "description")?,
        params,
        returns: optional_string(table, "returns")?,
    })
}

fn table_to_mcp(table: &LuaTable) -> LuaResult<McpServerDef> {
    let mut args = Vec::new();
    if let LuaValue::Table(list) = table.raw_get::<LuaValue>("args")? {
        for i in 1..=list.raw_len() {
            if let LuaValue::String(arg) = list.raw_get::<LuaValue>(i)? {
                args.push(arg.to_str()?.to_string());
            }
        }
    }
    Ok(McpServerDef {
        name: optional_string(table, "name")?.unwrap_or_default(),
        command: optional_string(table, "command")?,
        args,
        url: optional_string(table, "url")?,
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Value Conversions: Value → Lua
// ═══════════════════════════════════════════════════════════════════════

fn value_to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
    Ok(match value {
        Value::Nil | Value::Opaque(_) => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => LuaValue::Integer(*n as i64),
        Value::Number(n) => LuaValue::Number(*n),
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::List(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i as i64 + 1, value_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
        Value::Object(map) => {
            let table = lua.create_table()?;
            for (k, v) in map {
                table.raw_set(k.as_str(), value_to_lua(lua, v)?)?;
            }
            LuaValue::Table(table)
        }
        Value::Model(m) => LuaValue::String(lua.create_string(&m.name)?),
        Value::Agent(a) => LuaValue::String(lua.create_string(&a.name)?),
        Value::Tool(t) => LuaValue::String(lua.create_string(&t.name)?),
        Value::McpServer(s) => LuaValue::String(lua.create_string(&s.name)?),
        Value::RemoteTool(r) => {
            LuaValue::String(lua.create_string(format!("{}.{}", r.server, r.tool))?)
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Value Conversions: JSON ↔ Lua
// ═══════════════════════════════════════════════════════════════════════

/// Convert a JSON value to a Lua value.
fn json_value_to_lua(lua: &Lua, value: &serde_json::Value) -> LuaResult<LuaValue> {
    match value {
        serde_json::Value::Null => Ok(LuaValue::Nil),
        serde_json::Value::Bool(b) => Ok(LuaValue::Boolean(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(LuaValue::Integer(i))
            } else {
                Ok(LuaValue::Number(n.as_f64().unwrap_or(0.0)))
            }
        }
        serde_json::Value::String(s) => lua.create_string(s).map(LuaValue::String),
        serde_json::Value::Array(arr) => {
            let table = lua.create_table()?;
            for (i, v) in arr.iter().enumerate() {
                table.set(i as i64 + 1, json_value_to_lua(lua, v)?)?;
            }
            Ok(LuaValue::Table(table))
        }
        serde_json::Value::Object(map) => {
            let table = lua.create_table()?;
            for (k, v) in map {
                table.set(k.as_str(), json_value_to_lua(lua, v)?)?;
            }
            Ok(LuaValue::Table(table))
        }
    }
}

/// Convert a Lua value to a JSON value.
fn lua_value_to_json(value: LuaValue) -> LuaResult<serde_json::Value> {
    match value {
        LuaValue::Nil => Ok(serde_json::Value::Null),
        LuaValue::Boolean(b) => Ok(serde_json::Value::Bool(b)),
        LuaValue::Integer(i) => Ok(serde_json::Value::Number(i.into())),
        LuaValue::Number(n) => Ok(serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)),
        LuaValue::String(s) => Ok(serde_json::Value::String(s.to_str()?.to_string())),
        LuaValue::Table(t) => {
            // Heuristic: if raw_len > 0, treat as array; otherwise as object
            let len = t.raw_len();
            if len > 0 {
                let mut arr = Vec::new();
                for i in 1..=len {
                    let v: LuaValue = t.raw_get(i)?;
                    arr.push(lua_value_to_json(v)?);
                }
                Ok(serde_json::Value::Array(arr))
            } else {
                let mut map = serde_json::Map::new();
                for pair in t.pairs::<String, LuaValue>() {
                    let (k, v) = pair?;
                    map.insert(k, lua_value_to_json(v)?);
                }
                Ok(serde_json::Value::Object(map))
            }
        }
        _ => Ok(serde_json::Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> LuaEvaluator {
        LuaEvaluator::new().unwrap()
    }

    #[test]
    fn host_globals_are_not_bindings() {
        let ev = evaluator();
        assert!(ev.bindings().is_empty());
        assert!(ev.get("os").is_none());
        assert!(ev.get("io").is_none());
    }

    #[test]
    fn declarations_may_reuse_host_api_names() {
        let mut ev = evaluator();
        ev.eval(
            r#"
            model "env" { provider = "ollama" }
            tool "log" { execute = function() return "ok" end }
            string.extra = 1
            "#,
            "test",
        )
        .unwrap();
        let names: Vec<String> = ev.bindings().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["env".to_string(), "log".to_string()]);
        assert!(matches!(ev.get("env"), Some(Value::Model(m)) if m.name == "env"));
        assert_eq!(ev.call_tool("log", &[]).unwrap(), Value::String("ok".into()));
    }

    #[test]
    fn replaced_settings_table_is_not_a_binding() {
        let mut ev = evaluator();
        ev.eval(r#"GSH_CONFIG = { prompt = "x> " }"#, "test").unwrap();
        assert!(ev.bindings().is_empty());
        assert!(ev.get(SETTINGS_BINDING).is_some());
    }

    #[test]
    fn curried_declaration_binds_global() {
        let mut ev = evaluator();
        ev.eval(r#"model "fast" { provider = "ollama", model = "qwen", temperature = 0.2 }"#, "test")
            .unwrap();
        let Some(Value::Model(model)) = ev.get("fast") else {
            panic!("expected a model binding");
        };
        assert_eq!(model.name, "fast");
        assert_eq!(model.provider.as_deref(), Some("ollama"));
        assert_eq!(model.options["temperature"], Value::Number(0.2));
    }

    #[test]
    fn anonymous_declaration_takes_global_name() {
        let mut ev = evaluator();
        ev.eval(r#"slow = model { provider = "openai" }"#, "test").unwrap();
        let Some(Value::Model(model)) = ev.get("slow") else {
            panic!("expected a model binding");
        };
        assert_eq!(model.name, "slow");
    }

    #[test]
    fn agent_references_resolve_to_names() {
        let mut ev = evaluator();
        ev.eval(
            r#"
            model "m" { provider = "x" }
            tool "t" { execute = function() return 1 end }
            agent "a" { model = m, systemPrompt = "hi", tools = { t, remote_tool("fs", "read"), "plain" } }
            "#,
            "test",
        )
        .unwrap();
        let Some(Value::Agent(agent)) = ev.get("a") else {
            panic!("expected an agent binding");
        };
        assert_eq!(agent.model.as_deref(), Some("m"));
        assert_eq!(agent.system_prompt.as_deref(), Some("hi"));
        assert_eq!(agent.tools, vec!["t", "fs.read", "plain"]);
    }

    #[test]
    fn syntax_error_is_parse_error() {
        let mut ev = evaluator();
        let err = ev.eval("x = = 1", "broken").unwrap_err();
        assert!(err.is_parse(), "{err}");
    }

    #[test]
    fn runtime_error_keeps_earlier_bindings() {
        let mut ev = evaluator();
        ev.eval("keep = 1", "first").unwrap();
        let err = ev.eval("other = 2\nerror('boom')", "second").unwrap_err();
        assert!(matches!(err, EvalError::Runtime { .. }));
        assert_eq!(ev.get("keep"), Some(Value::Number(1.0)));
    }

    #[test]
    fn call_tool_passes_arguments() {
        let mut ev = evaluator();
        ev.eval(
            r#"tool "add" { parameters = { "a", "b" }, execute = function(a, b) return a + b end }"#,
            "test",
        )
        .unwrap();
        let result = ev
            .call_tool("add", &[Value::Number(2.0), Value::Number(3.0)])
            .unwrap();
        assert_eq!(result, Value::Number(5.0));
        assert!(matches!(
            ev.call_tool("missing", &[]),
            Err(EvalError::UnknownTool(_))
        ));
    }

    #[test]
    fn settings_object_is_preseeded() {
        let mut ev = evaluator();
        ev.eval(r#"GSH_CONFIG.prompt = "$ ""#, "test").unwrap();
        let settings = ev.get(SETTINGS_BINDING).unwrap();
        assert_eq!(settings.as_object().unwrap()["prompt"], Value::from("$ "));
        assert!(ev.bindings().iter().all(|(name, _)| name != SETTINGS_BINDING));
    }

    #[test]
    fn json_api_round_trips_objects() {
        let mut ev = evaluator();
        ev.eval(r#"decoded = json.parse('{"a": [1, 2]}')"#, "test").unwrap();
        let decoded = ev.get("decoded").unwrap();
        assert_eq!(
            decoded.as_object().unwrap()["a"],
            Value::List(vec![Value::Number(1.0), Value::Number(2.0)])
        );
    }

    #[test]
    fn interrupt_cancels_running_loop() {
        let mut ev = evaluator();
        let interrupt = ev.interrupt();
        interrupt.trigger();
        let err = ev.eval("while true do end", "spin").unwrap_err();
        assert_eq!(err, EvalError::Cancelled);
    }
}
