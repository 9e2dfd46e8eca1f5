//! Layered configuration scenarios: shared environment, shadowing and merge.

use std::fs;

use gsh_core::config::{Config, ConfigError};
use gsh_core::loader::ConfigLoader;
use gsh_core::value::Value;
use tempfile::TempDir;

fn loader_with(baseline: &str, user: Option<&str>) -> (TempDir, ConfigLoader) {
    let tmp = TempDir::new().unwrap();
    let user_path = user.map(|source| {
        let path = tmp.path().join(".gshrc.lua");
        fs::write(&path, source).unwrap();
        path
    });
    let loader = ConfigLoader::new()
        .with_baseline(baseline)
        .with_user_path(user_path)
        .with_prerequisite(|| false);
    (tmp, loader)
}

#[test]
fn user_layer_overrides_scalars_and_keeps_baseline_models() {
    let (_tmp, loader) = loader_with(
        r#"
        model "A" { provider = "ollama", model = "llama3" }
        GSH_CONFIG.prompt = "base> "
        "#,
        Some(r#"GSH_CONFIG.logLevel = "debug""#),
    );

    let result = loader.load_layered().unwrap();
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.config.prompt(), "base> ");
    assert_eq!(result.config.log_level(), "debug");
    assert!(result.config.models.contains_key("A"));
}

#[test]
fn redeclared_tool_shadows_baseline() {
    let (_tmp, loader) = loader_with(
        r#"tool "T" { execute = function() return "v1" end }"#,
        Some(r#"tool "T" { execute = function() return "v2" end }"#),
    );

    let result = loader.load_layered().unwrap();
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(
        result.evaluator.call_tool("T", &[]).unwrap(),
        Value::String("v2".into())
    );
    let named_t = result.config.tools.keys().filter(|k| *k == "T").count();
    assert_eq!(named_t, 1);
}

#[test]
fn broken_user_layer_keeps_baseline() {
    let (_tmp, loader) = loader_with(
        r#"GSH_CONFIG.prompt = "base> ""#,
        Some("GSH_CONFIG.prompt = "),
    );

    let result = loader.load_layered().unwrap();
    assert_eq!(result.config.prompt(), "base> ");
    assert!(matches!(result.errors.as_slice(), [ConfigError::Parse(_)]));
}

#[test]
fn failed_user_layer_discards_its_settings() {
    let (_tmp, loader) = loader_with(
        r#"GSH_CONFIG.prompt = "base> ""#,
        Some("GSH_CONFIG.prompt = \"half> \"\nGSH_CONFIG.ui = { theme = \"dark\" }\nerror('boom')"),
    );

    let result = loader.load_layered().unwrap();
    assert_eq!(result.config.prompt(), "base> ");
    assert!(matches!(result.errors.as_slice(), [ConfigError::Eval(_)]));
    assert!(!result.config.extra.contains_key("ui"));
}

#[test]
fn failed_layer_cannot_swap_out_the_settings_table() {
    let (_tmp, loader) = loader_with(
        r#"GSH_CONFIG.prompt = "base> ""#,
        Some("GSH_CONFIG = { prompt = 'other> ' }\nerror('late')"),
    );

    let result = loader.load_layered().unwrap();
    assert_eq!(result.config.prompt(), "base> ");
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn declarations_named_like_host_apis_are_registered() {
    let (_tmp, loader) = loader_with(
        r#"
        model "env" { provider = "ollama", model = "llama3" }
        tool "log" { execute = function() return "" end }
        "#,
        None,
    );

    let result = loader.load_layered().unwrap();
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert!(result.config.models.contains_key("env"));
    assert!(result.config.tools.contains_key("log"));
}

#[test]
fn user_layer_can_disable_integration() {
    let tmp = TempDir::new().unwrap();
    let user = tmp.path().join(".gshrc.lua");
    fs::write(&user, "GSH_CONFIG.starshipIntegration = false").unwrap();

    let result = ConfigLoader::new()
        .with_user_path(Some(user))
        .with_integration("integrated = true")
        .with_prerequisite(|| true)
        .load_layered()
        .unwrap();
    assert!(!result.config.starship_integration());
    assert!(result.evaluator.get("integrated").is_none());
}

#[test]
fn integration_runs_when_enabled_and_available() {
    let (_tmp, loader) = loader_with("", None);
    let result = loader
        .with_integration("integrated = true\nGSH_CONFIG.prompt = \"ship> \"")
        .with_prerequisite(|| true)
        .load_layered()
        .unwrap();
    assert_eq!(result.evaluator.get("integrated"), Some(Value::Bool(true)));
    assert_eq!(result.config.prompt(), "ship> ");
}

#[test]
fn separately_loaded_configs_deep_merge() {
    let loader = ConfigLoader::new().with_user_path(None);
    let base = loader
        .load_from_string(
            r#"
            model "A" { provider = "ollama" }
            GSH_CONFIG.prompt = "base> "
            GSH_CONFIG.editor = { keymap = "emacs", history = { size = 100 } }
            "#,
        )
        .unwrap()
        .config;
    let over = loader
        .load_from_string(
            r#"
            model "B" { provider = "openai" }
            GSH_CONFIG.editor = { history = { dedupe = true } }
            "#,
        )
        .unwrap()
        .config;

    let merged = base.merge(&over);
    assert_eq!(merged.prompt(), "base> ");
    assert!(merged.models.contains_key("A") && merged.models.contains_key("B"));

    let editor = merged.extra["editor"].as_object().unwrap();
    assert_eq!(editor["keymap"], Value::from("emacs"));
    let history = editor["history"].as_object().unwrap();
    assert_eq!(history["size"], Value::Number(100.0));
    assert_eq!(history["dedupe"], Value::Bool(true));

    assert_eq!(merged.merge(&merged), merged);
    assert_eq!(merged.merge(&Config::default()), merged);
}
