//! Execution bridge behavior across modes: locking, middleware, cancellation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gsh_core::bridge::{ExecError, ExecutionBridge, Invocation, Middleware, Next};
use gsh_core::lua_runtime::LuaEvaluator;
use gsh_core::ShellState;
use tokio_util::sync::CancellationToken;

fn bridge() -> ExecutionBridge {
    let mut env = BTreeMap::new();
    env.insert(
        "PATH".to_string(),
        std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".into()),
    );
    let state = ShellState::new(PathBuf::from("/"), env);
    ExecutionBridge::new(state, Box::new(LuaEvaluator::new().unwrap()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn captured_runs_share_the_lock_with_each_other() {
    let b = bridge();

    let fg = {
        let b = b.clone();
        tokio::spawn(async move { b.run_foreground("export MARK=during; sleep 1; export MARK=after").await })
    };
    // Let the foreground run take the exclusive lock first.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let mut captured = Vec::new();
    for _ in 0..10 {
        let b = b.clone();
        captured.push(tokio::spawn(async move {
            b.run_captured("echo x; echo \"[$MARK]\"").await
        }));
    }

    assert_eq!(fg.await.unwrap().unwrap(), 0);
    for handle in captured {
        let out = handle.await.unwrap().unwrap();
        assert_eq!(out.status, 0);
        // Never the foreground run's intermediate state.
        assert_eq!(out.stdout, "x\n[after]\n");
    }
    // Ten captured runs that serialized would take far longer than one.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_captured_runs_overlap() {
    let b = bridge();
    let started = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..5 {
        let b = b.clone();
        handles.push(tokio::spawn(async move { b.run_captured("sleep 0.5").await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status, 0);
    }
    assert!(started.elapsed() < Duration::from_millis(2000));
}

#[tokio::test]
async fn cancelled_foreground_run_releases_the_lock() {
    let b = bridge();
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let result = b.run_foreground_with_cancel("sleep 10", token).await;
    assert!(matches!(result, Err(ExecError::Cancelled)));

    let out = tokio::time::timeout(Duration::from_secs(2), b.run_captured("echo free"))
        .await
        .expect("lock was not released")
        .unwrap();
    assert_eq!(out.stdout, "free\n");
}

/// Records every invocation it sees.
struct Recorder(Mutex<Vec<String>>);

#[async_trait]
impl Middleware for Recorder {
    async fn handle(&self, invocation: &Invocation, next: Next<'_>) -> Result<i32, ExecError> {
        if let Ok(mut seen) = self.0.lock() {
            seen.push(format!("{} {}", invocation.name, invocation.args.join(" ")));
        }
        next.run(invocation).await
    }
}

/// Answers `rm` itself instead of running it.
struct BlockRm;

#[async_trait]
impl Middleware for BlockRm {
    async fn handle(&self, invocation: &Invocation, next: Next<'_>) -> Result<i32, ExecError> {
        if invocation.name == "rm" {
            return Ok(99);
        }
        next.run(invocation).await
    }
}

#[tokio::test]
async fn middleware_sees_expanded_commands_in_order() {
    let b = bridge();
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    b.use_middleware(recorder.clone()).await;
    b.use_middleware(Arc::new(BlockRm)).await;

    let status = b
        .run_foreground("X=world; alias hi='echo hello'; hi $X > /dev/null || true")
        .await;
    // Redirections are rejected before anything runs.
    assert!(matches!(status, Err(ExecError::Parse(_))));
    assert!(recorder.0.lock().unwrap().is_empty());

    assert_eq!(b.run_foreground("X=world; rm -rf \"/$X\"").await.unwrap(), 99);
    let seen = recorder.0.lock().unwrap().clone();
    assert_eq!(seen, vec!["rm -rf /world".to_string()]);
}

#[tokio::test]
async fn function_and_alias_introspection() {
    let b = bridge();
    assert!(!b.function_exists("deploy").await);
    b.run_foreground("deploy() { echo deploying; }; alias d=deploy")
        .await
        .unwrap();
    assert!(b.function_exists("deploy").await);
    assert!(b.alias_exists("d").await);

    let out = b.run_captured("d").await.unwrap();
    assert_eq!(out.stdout, "deploying\n");
}

#[tokio::test]
async fn failed_script_keeps_earlier_bindings() {
    let b = bridge();
    b.run_script("kept = 1").await.unwrap();
    let result = b.run_script("partial = 2\nerror('stop')\nnever = 3").await;
    assert!(matches!(result, Err(ExecError::Script(_))));

    let runtime = b.read().await;
    let ev = runtime.evaluator();
    assert!(ev.get("kept").is_some());
    assert!(ev.get("partial").is_some());
    assert!(ev.get("never").is_none());
}
