//! Layered configuration loading.
//!
//! All layers evaluate into one evaluator, lowest precedence first:
//!
//! 1. the embedded baseline ([`DEFAULT_BASELINE`]),
//! 2. the user file (`~/.gshrc.lua`),
//! 3. the optional integration source, only when `starshipIntegration` is
//!    enabled (the default) and its prerequisite holds.
//!
//! A later layer can read and shadow anything an earlier one declared.
//! Content problems never fail a load; they are returned in
//! [`LoadResult::errors`] next to a usable [`Config`].

use std::path::{Path, PathBuf};

use crate::config::{extract, Config, ConfigError};
use crate::evaluator::{EvalError, Evaluator};
use crate::lua_runtime::LuaEvaluator;
use crate::runtime::home_dir;
use crate::shell_builtins::resolve_in_path;

/// Baseline configuration shipped with the crate.
pub const DEFAULT_BASELINE: &str = include_str!("baseline.lua");

/// User configuration file name, relative to the home directory.
pub const USER_CONFIG_FILE: &str = ".gshrc.lua";

/// A loaded configuration and the evaluator that produced it.
pub struct LoadResult {
    pub config: Config,
    pub evaluator: Box<dyn Evaluator>,
    pub errors: Vec<ConfigError>,
}

impl std::fmt::Debug for LoadResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadResult")
            .field("config", &self.config)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

type EvaluatorFactory = fn() -> Result<Box<dyn Evaluator>, EvalError>;
type Prerequisite = Box<dyn Fn() -> bool + Send + Sync>;

fn lua_evaluator() -> Result<Box<dyn Evaluator>, EvalError> {
    Ok(Box::new(LuaEvaluator::new()?))
}

/// True when `starship` is on the process `PATH`.
pub fn starship_available() -> bool {
    let path = std::env::var("PATH").unwrap_or_default();
    resolve_in_path("starship", &path).is_some()
}

pub struct ConfigLoader {
    baseline: String,
    user_path: Option<PathBuf>,
    integration: Option<String>,
    prerequisite: Prerequisite,
    factory: EvaluatorFactory,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader with the embedded baseline and `~/.gshrc.lua`, no integration layer.
    pub fn new() -> Self {
        Self {
            baseline: DEFAULT_BASELINE.to_string(),
            user_path: home_dir().map(|home| home.join(USER_CONFIG_FILE)),
            integration: None,
            prerequisite: Box::new(starship_available),
            factory: lua_evaluator,
        }
    }

    pub fn with_baseline(mut self, source: impl Into<String>) -> Self {
        self.baseline = source.into();
        self
    }

    pub fn with_user_path(mut self, path: Option<PathBuf>) -> Self {
        self.user_path = path;
        self
    }

    pub fn with_integration(mut self, source: impl Into<String>) -> Self {
        self.integration = Some(source.into());
        self
    }

    /// Replace the check that gates the integration layer.
    pub fn with_prerequisite(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.prerequisite = Box::new(check);
        self
    }

    pub fn user_path(&self) -> Option<&Path> {
        self.user_path.as_deref()
    }

    /// Evaluate one source into a fresh evaluator.
    ///
    /// If evaluation fails the config is all defaults, not a partial result.
    /// Errors only when no evaluator can be created.
    pub fn load_from_string(&self, source: &str) -> Result<LoadResult, ConfigError> {
        let mut evaluator = (self.factory)().map_err(ConfigError::Eval)?;
        let (config, errors) = match evaluator.eval(source, "config") {
            Ok(()) => extract(evaluator.as_ref()),
            Err(e) => {
                tracing::warn!(error = %e, "config evaluation failed, using defaults");
                (Config::default(), vec![ConfigError::from(e)])
            }
        };
        Ok(LoadResult {
            config,
            evaluator,
            errors,
        })
    }

    /// Load one file. A missing file yields defaults; an unreadable one is an error.
    pub fn load_from_file(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        match read_optional(path)? {
            Some(source) => self.load_from_string(&source),
            None => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                self.load_from_string("")
            }
        }
    }

    /// Load baseline, user and integration layers into one evaluator.
    pub fn load_layered(&self) -> Result<LoadResult, ConfigError> {
        let mut evaluator = (self.factory)().map_err(ConfigError::Eval)?;
        let mut errors = Vec::new();

        eval_layer(evaluator.as_mut(), "baseline", &self.baseline, &mut errors);

        if let Some(path) = &self.user_path {
            match read_optional(path)? {
                Some(source) => {
                    let chunk = path.display().to_string();
                    eval_layer(evaluator.as_mut(), &chunk, &source, &mut errors);
                }
                None => tracing::debug!(path = %path.display(), "no user config"),
            }
        }

        let (mut config, mut extract_errors) = extract(evaluator.as_ref());

        if let Some(source) = &self.integration {
            if !config.starship_integration() {
                tracing::debug!("integration layer disabled by config");
            } else if !(self.prerequisite)() {
                tracing::debug!("integration prerequisite missing, skipping layer");
            } else {
                eval_layer(evaluator.as_mut(), "integration", source, &mut errors);
                (config, extract_errors) = extract(evaluator.as_ref());
            }
        }

        errors.append(&mut extract_errors);
        tracing::info!(
            models = config.models.len(),
            agents = config.agents.len(),
            tools = config.tools.len(),
            errors = errors.len(),
            "configuration loaded"
        );
        Ok(LoadResult {
            config,
            evaluator,
            errors,
        })
    }
}

fn eval_layer(evaluator: &mut dyn Evaluator, chunk: &str, source: &str, errors: &mut Vec<ConfigError>) {
    tracing::debug!(layer = chunk, "evaluating config layer");
    if let Err(e) = evaluator.eval_layer(source, chunk) {
        tracing::warn!(layer = chunk, error = %e, "config layer failed, settings rolled back");
        errors.push(ConfigError::from(e));
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(source) => Ok(Some(source)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
