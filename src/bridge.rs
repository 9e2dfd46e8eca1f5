//! The execution bridge: three execution modes over one shared runtime.
//!
//! | mode | lock | state |
//! |---|---|---|
//! | [`run_foreground`](ExecutionBridge::run_foreground) | exclusive | mutated in place |
//! | [`run_captured`](ExecutionBridge::run_captured) | shared | clone, discarded |
//! | [`run_script`](ExecutionBridge::run_script) | exclusive | evaluator mutated |
//!
//! Foreground dispatch passes through an ordered [`Middleware`] chain. A
//! handler either answers the invocation itself or calls
//! [`Next::run`] to hand it to the rest of the chain.
//!
//! Every lock acquisition is scoped to the call that made it, so a
//! cancelled or failed run never leaves the runtime locked.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;

use crate::completion::spec::CompletionSpec;
use crate::config::Config;
use crate::evaluator::{EvalError, Evaluator};
use crate::runtime::{RuntimeView, ShellState};
use crate::shell_exec::{self, OutputMode};
use crate::shell_syntax::ParseError;
use crate::value::Value;

/// Name of the tool that renders the prompt, called as `(exitCode, durationMs)`.
pub const PROMPT_TOOL: &str = "GSH_PROMPT";

/// How long the prompt tool may run before the fallback prompt is used.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a command or script could not run.
///
/// A command that runs and exits non-zero is not an error; its status is
/// returned normally.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Script(EvalError),
    #[error("cancelled")]
    Cancelled,
}

impl From<EvalError> for ExecError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Cancelled => ExecError::Cancelled,
            other => ExecError::Script(other),
        }
    }
}

/// Output of a captured run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

/// A command about to be dispatched, after expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<String>,
}

/// Interceptor wrapped around foreground command dispatch.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, invocation: &Invocation, next: Next<'_>) -> Result<i32, ExecError>;
}

/// Whatever runs the command once the chain is exhausted.
#[async_trait]
pub(crate) trait Dispatch: Send {
    async fn dispatch(&mut self, invocation: &Invocation) -> Result<i32, ExecError>;
}

/// The remainder of a middleware chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a mut (dyn Dispatch + Send),
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        chain: &'a [Arc<dyn Middleware>],
        terminal: &'a mut (dyn Dispatch + Send),
    ) -> Self {
        Self { chain, terminal }
    }

    /// Pass the invocation to the next handler, or run it.
    pub async fn run(self, invocation: &Invocation) -> Result<i32, ExecError> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    chain: rest,
                    terminal: self.terminal,
                };
                head.handle(invocation, next).await
            }
            None => self.terminal.dispatch(invocation).await,
        }
    }
}

/// Shell state and evaluator, guarded together.
pub struct Runtime {
    state: ShellState,
    evaluator: Box<dyn Evaluator>,
}

impl Runtime {
    pub fn state(&self) -> &ShellState {
        &self.state
    }

    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }
}

/// Multiplexes foreground, captured and script execution over one runtime.
#[derive(Clone)]
pub struct ExecutionBridge {
    inner: Arc<RwLock<Runtime>>,
    middleware: Arc<RwLock<Vec<Arc<dyn Middleware>>>>,
}

impl ExecutionBridge {
    pub fn new(state: ShellState, evaluator: Box<dyn Evaluator>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Runtime { state, evaluator })),
            middleware: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Append a handler to the foreground middleware chain.
    pub async fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.middleware.write().await.push(middleware);
    }

    /// Run `command` in the foreground under the exclusive lock.
    pub async fn run_foreground(&self, command: &str) -> Result<i32, ExecError> {
        self.run_foreground_with_cancel(command, CancellationToken::new())
            .await
    }

    pub async fn run_foreground_with_cancel(
        &self,
        command: &str,
        cancel: CancellationToken,
    ) -> Result<i32, ExecError> {
        let chain = self.middleware.read().await.clone();
        let mut runtime = self.inner.write().await;
        tracing::debug!(command, "foreground run");
        let output = shell_exec::execute(
            &mut runtime.state,
            command,
            OutputMode::Inherit,
            &chain,
            cancel,
        )
        .await;
        match &output {
            Ok(out) => tracing::debug!(status = out.status, "foreground run finished"),
            Err(e) => tracing::debug!(error = %e, "foreground run failed"),
        }
        output.map(|out| out.status)
    }

    /// Run `command` against a copy of the state, capturing its output.
    pub async fn run_captured(&self, command: &str) -> Result<CapturedOutput, ExecError> {
        self.run_captured_with(command, &[], CancellationToken::new())
            .await
    }

    /// Like [`run_captured`](Self::run_captured) with extra environment variables.
    pub async fn run_captured_with_env(
        &self,
        command: &str,
        env: &[(String, String)],
    ) -> Result<CapturedOutput, ExecError> {
        self.run_captured_with(command, env, CancellationToken::new())
            .await
    }

    pub async fn run_captured_with(
        &self,
        command: &str,
        env: &[(String, String)],
        cancel: CancellationToken,
    ) -> Result<CapturedOutput, ExecError> {
        let runtime = self.inner.read().await;
        let mut state = runtime.state.clone();
        for (name, value) in env {
            state.set_var(name.clone(), value.clone());
        }
        let out = shell_exec::execute(&mut state, command, OutputMode::Capture, &[], cancel).await?;
        drop(runtime);
        Ok(CapturedOutput {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            status: out.status,
        })
    }

    /// Evaluate embedded-language `source` under the exclusive lock.
    pub async fn run_script(&self, source: &str) -> Result<(), ExecError> {
        self.run_script_with_cancel(source, CancellationToken::new())
            .await
    }

    pub async fn run_script_with_cancel(
        &self,
        source: &str,
        cancel: CancellationToken,
    ) -> Result<(), ExecError> {
        let mut runtime = self.inner.clone().write_owned().await;
        let interrupt = runtime.evaluator.interrupt();
        interrupt.reset();

        let source = source.to_string();
        let mut task = tokio::task::spawn_blocking(move || {
            let result = runtime.evaluator.eval(&source, "script");
            // Later tool calls (prompt, completion) must not see a stale flag.
            runtime.evaluator.interrupt().reset();
            result
        });

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = cancel.cancelled() => {
                tracing::debug!("interrupting script");
                interrupt.trigger();
                task.await
            }
        };
        let result = joined.map_err(|e| ExecError::Execution(format!("script task failed: {}", e)))?;
        if let Err(e) = &result {
            tracing::debug!(error = %e, "script failed");
        }
        result.map_err(ExecError::from)
    }

    /// Shared-lock view of the runtime.
    ///
    /// Do not hold the guard across other bridge calls: a queued writer
    /// blocks new readers.
    pub async fn read(&self) -> RwLockReadGuard<'_, Runtime> {
        self.inner.read().await
    }

    /// Copy of the current shell state.
    pub async fn state(&self) -> ShellState {
        self.inner.read().await.state.clone()
    }

    pub async fn alias_exists(&self, name: &str) -> bool {
        self.inner.read().await.state.alias_names().contains(name)
    }

    pub async fn function_exists(&self, name: &str) -> bool {
        self.inner.read().await.state.function_names().contains(name)
    }

    pub async fn alias_names(&self) -> BTreeSet<String> {
        self.inner.read().await.state.alias_names()
    }

    pub async fn register_completion(&self, command: &str, spec: CompletionSpec) {
        self.inner
            .write()
            .await
            .state
            .register_completion(command, spec);
    }

    pub async fn unregister_completion(&self, command: &str) -> Option<CompletionSpec> {
        self.inner.write().await.state.unregister_completion(command)
    }

    /// Swap in a freshly loaded evaluator, returning the old one.
    pub async fn replace_evaluator(&self, evaluator: Box<dyn Evaluator>) -> Box<dyn Evaluator> {
        let mut runtime = self.inner.write().await;
        std::mem::replace(&mut runtime.evaluator, evaluator)
    }

    /// Call a declared tool under the shared lock, off the async threads.
    ///
    /// A tool still running after `timeout` is interrupted and the call
    /// fails with [`EvalError::Cancelled`].
    pub async fn call_tool(
        &self,
        name: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, EvalError> {
        let runtime = self.inner.clone().read_owned().await;
        let interrupt = runtime.evaluator.interrupt();

        let tool = name.to_string();
        let mut task = tokio::task::spawn_blocking(move || {
            let result = runtime.evaluator.call_tool(&tool, &args);
            (runtime, result)
        });

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(tool = name, ?timeout, "tool timed out, interrupting");
                interrupt.trigger();
                task.await
            }
        };
        let (runtime, result) = joined.map_err(|e| EvalError::Runtime {
            chunk: format!("tool {}", name),
            message: format!("tool task failed: {}", e),
        })?;
        // Still under the guard, so no script can start in between.
        if interrupt.is_triggered() {
            interrupt.reset();
        }
        drop(runtime);
        result
    }

    /// Render the prompt through the prompt tool, falling back to `config.prompt()`.
    pub async fn render_prompt(&self, config: &Config, exit_code: i32, duration_ms: u64) -> String {
        let args = vec![
            Value::Number(f64::from(exit_code)),
            Value::Number(duration_ms as f64),
        ];
        match self.call_tool(PROMPT_TOOL, args, PROMPT_TIMEOUT).await {
            Ok(Value::String(prompt)) => prompt,
            Ok(other) => {
                tracing::warn!(kind = %other.kind(), "prompt tool returned a non-string");
                config.prompt().to_string()
            }
            Err(EvalError::UnknownTool(_)) => config.prompt().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "prompt tool failed");
                config.prompt().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua_runtime::LuaEvaluator;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bridge() -> ExecutionBridge {
        let mut env = BTreeMap::new();
        env.insert(
            "PATH".to_string(),
            std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".into()),
        );
        let state = ShellState::new(PathBuf::from("/"), env);
        ExecutionBridge::new(state, Box::new(LuaEvaluator::new().unwrap()))
    }

    #[tokio::test]
    async fn foreground_mutates_state() {
        let b = bridge();
        assert_eq!(b.run_foreground("alias ll='ls -l'; f() { true; }").await.unwrap(), 0);
        assert!(b.alias_exists("ll").await);
        assert!(b.function_exists("f").await);
        assert!(!b.alias_exists("nope").await);
    }

    #[tokio::test]
    async fn nonzero_status_is_not_an_error() {
        let b = bridge();
        assert_eq!(b.run_foreground("false").await.unwrap(), 1);
        assert!(matches!(
            b.run_foreground("echo 'open").await,
            Err(ExecError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn captured_runs_do_not_leak_state() {
        let b = bridge();
        let out = b.run_captured("export LEAK=1; cd /tmp; echo $LEAK").await.unwrap();
        assert_eq!(out.stdout, "1\n");
        assert_eq!(out.status, 0);
        let state = b.state().await;
        assert_eq!(state.env_var("LEAK"), None);
        assert_eq!(state.cwd(), PathBuf::from("/").as_path());
    }

    #[tokio::test]
    async fn captured_env_overrides() {
        let b = bridge();
        let env = [("COMP_LINE".to_string(), "git ch".to_string())];
        let out = b.run_captured_with_env("echo $COMP_LINE", &env).await.unwrap();
        assert_eq!(out.stdout, "git ch\n");
    }

    #[tokio::test]
    async fn script_errors_are_distinct() {
        let b = bridge();
        b.run_script("x = 1").await.unwrap();
        match b.run_script("x = = 2").await {
            Err(ExecError::Script(e)) => assert!(e.is_parse()),
            other => panic!("expected parse error, got {:?}", other),
        }
        match b.run_script("error('boom')").await {
            Err(ExecError::Script(e)) => assert!(!e.is_parse()),
            other => panic!("expected runtime error, got {:?}", other),
        }
        let runtime = b.read().await;
        assert_eq!(runtime.evaluator().get("x"), Some(Value::Number(1.0)));
    }

    #[tokio::test]
    async fn script_cancellation_releases_lock() {
        let b = bridge();
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let result = b.run_script_with_cancel("while true do end", token).await;
        assert!(matches!(result, Err(ExecError::Cancelled)));
        b.run_script("y = 2").await.unwrap();
    }

    struct Deny;

    #[async_trait]
    impl Middleware for Deny {
        async fn handle(&self, invocation: &Invocation, next: Next<'_>) -> Result<i32, ExecError> {
            if invocation.name == "forbidden" {
                return Ok(42);
            }
            next.run(invocation).await
        }
    }

    struct Count(AtomicUsize);

    #[async_trait]
    impl Middleware for Count {
        async fn handle(&self, invocation: &Invocation, next: Next<'_>) -> Result<i32, ExecError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            next.run(invocation).await
        }
    }

    #[tokio::test]
    async fn middleware_wraps_foreground_dispatch() {
        let b = bridge();
        let counter = Arc::new(Count(AtomicUsize::new(0)));
        b.use_middleware(counter.clone()).await;
        b.use_middleware(Arc::new(Deny)).await;

        assert_eq!(b.run_foreground("forbidden").await.unwrap(), 42);
        assert_eq!(b.run_foreground("true && export A=1").await.unwrap(), 0);
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
        assert_eq!(b.state().await.env_var("A"), Some("1"));

        // Captured runs bypass the chain.
        b.run_captured("true").await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn prompt_falls_back_to_config() {
        let b = bridge();
        let config = Config::default();
        assert_eq!(b.render_prompt(&config, 0, 5).await, config.prompt());

        b.run_script(
            r#"GSH_PROMPT = tool { execute = function(code, ms) return "[" .. code .. "] " end }"#,
        )
        .await
        .unwrap();
        assert_eq!(b.render_prompt(&config, 2, 5).await, "[2] ");
    }

    #[tokio::test]
    async fn runaway_tool_is_interrupted_on_a_single_threaded_runtime() {
        let b = bridge();
        b.run_script(
            r#"
            spin = tool { execute = function() while true do end end }
            quick = tool { execute = function() return "done" end }
            "#,
        )
        .await
        .unwrap();

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            b.call_tool("spin", Vec::new(), Duration::from_millis(50)),
        )
        .await
        .expect("timeout must fire while the tool spins");
        assert_eq!(result, Err(EvalError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));

        // The interrupt does not leak into the next call.
        let quick = b.call_tool("quick", Vec::new(), Duration::from_secs(1)).await;
        assert_eq!(quick, Ok(Value::String("done".into())));
    }

    #[tokio::test]
    async fn spinning_prompt_tool_falls_back() {
        let b = bridge();
        b.run_script(r#"GSH_PROMPT = tool { execute = function() while true do end end }"#)
            .await
            .unwrap();
        let config = Config::default();
        let rendered = tokio::time::timeout(
            PROMPT_TIMEOUT + Duration::from_secs(3),
            b.render_prompt(&config, 0, 1),
        )
        .await
        .expect("prompt rendering must not hang");
        assert_eq!(rendered, config.prompt());
    }
}
