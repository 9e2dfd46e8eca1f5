//! `#/` macro completion and help.
//!
//! Macros come from `GSH_CONFIG.macros` in the evaluator when it holds an
//! object there; otherwise from the `GSH_MACROS` environment variable as a
//! JSON object. A missing or malformed source means no macros.

use std::collections::BTreeMap;

use crate::evaluator::Evaluator;
use crate::lua_runtime::SETTINGS_BINDING;
use crate::value::Value;

/// Prefix that routes a word to macro completion and help.
pub const MACRO_SENTINEL: &str = "#/";

/// Environment variable carrying macros as JSON when no evaluator holds them.
pub const MACROS_ENV: &str = "GSH_MACROS";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroCompleter {
    macros: BTreeMap<String, String>,
}

impl MacroCompleter {
    pub fn new(macros: BTreeMap<String, String>) -> Self {
        Self { macros }
    }

    /// Load from the evaluator, falling back to the JSON channel.
    pub fn from_sources(evaluator: Option<&dyn Evaluator>, env_json: Option<&str>) -> Self {
        if let Some(macros) = evaluator.and_then(macros_from_evaluator) {
            return Self::new(macros);
        }
        let macros = env_json.map(macros_from_json).unwrap_or_default();
        Self::new(macros)
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Sentinel-qualified macro names starting with `prefix`, sorted.
    pub fn completions(&self, prefix: &str) -> Vec<String> {
        self.macros
            .keys()
            .filter(|name| name.starts_with(prefix))
            .map(|name| format!("{}{}", MACRO_SENTINEL, name))
            .collect()
    }

    /// Help for `name`: the expansion on an exact match, a listing of
    /// matching names on a partial one, every macro when `name` is empty.
    pub fn help(&self, name: &str) -> String {
        if name.is_empty() {
            if self.macros.is_empty() {
                return String::new();
            }
            let mut out = String::from("Available macros:\n");
            for (macro_name, expansion) in &self.macros {
                out.push_str(&format!("  {}{}: {}\n", MACRO_SENTINEL, macro_name, expansion));
            }
            return out;
        }
        if let Some(expansion) = self.macros.get(name) {
            return format!("{}{}: {}", MACRO_SENTINEL, name, expansion);
        }
        let matching: Vec<&String> = self
            .macros
            .keys()
            .filter(|m| m.starts_with(name))
            .collect();
        if matching.is_empty() {
            return String::new();
        }
        let mut out = String::from("Matching macros:\n");
        for macro_name in matching {
            out.push_str(&format!("  {}{}\n", MACRO_SENTINEL, macro_name));
        }
        out
    }
}

fn macros_from_evaluator(evaluator: &dyn Evaluator) -> Option<BTreeMap<String, String>> {
    let settings = evaluator.get(SETTINGS_BINDING)?;
    let macros = settings.as_object()?.get("macros")?.as_object()?;
    Some(
        macros
            .iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k.clone(), s.clone())),
                _ => None,
            })
            .collect(),
    )
}

fn macros_from_json(raw: &str) -> BTreeMap<String, String> {
    match serde_json::from_str::<BTreeMap<String, String>>(raw) {
        Ok(macros) => macros,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed {}", MACROS_ENV);
            BTreeMap::new()
        }
    }
}
