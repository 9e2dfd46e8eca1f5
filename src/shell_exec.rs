//! Shell interpreter over a [`ShellState`].
//!
//! Walks the AST produced by [`shell_syntax::parse`](crate::shell_syntax::parse)
//! and runs each simple command as a function, builtin or external program.
//! Pipelines are buffered: a stage runs to completion and its stdout becomes
//! the next stage's stdin.
//!
//! Output either goes straight to the terminal ([`OutputMode::Inherit`],
//! used for foreground runs) or is collected into buffers
//! ([`OutputMode::Capture`]). Foreground runs route every invocation
//! through the middleware chain; captured runs do not.

use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::bridge::{Dispatch, ExecError, Invocation, Middleware, Next};
use crate::runtime::{RuntimeView, ShellState};
use crate::shell_builtins::{is_executable, resolve_command, run_builtin};
use crate::shell_syntax::{
    self, AndOrList, Command, Connector, Pipeline, Script, SimpleCommand, Word, WordPart,
};

/// Exit status for a command that was not found.
pub const STATUS_NOT_FOUND: i32 = 127;
/// Exit status for a command that exists but could not be executed.
pub const STATUS_NOT_EXECUTABLE: i32 = 126;

const MAX_CALL_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputMode {
    /// Write to the process's stdout/stderr.
    Inherit,
    /// Collect into buffers returned with the status.
    Capture,
}

/// Status and buffered output of one run.
#[derive(Debug, Default)]
pub(crate) struct ExecOutput {
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Parse and run `source` against `state`.
pub(crate) async fn execute(
    state: &mut ShellState,
    source: &str,
    mode: OutputMode,
    middleware: &[Arc<dyn Middleware>],
    cancel: CancellationToken,
) -> Result<ExecOutput, ExecError> {
    let script = shell_syntax::parse(source)?;
    let mut exec = Executor {
        state,
        mode,
        cancel,
        middleware,
        positional: Vec::new(),
        stdout: Vec::new(),
        stderr: Vec::new(),
        pipe_capture: None,
        active_aliases: Vec::new(),
        depth: 0,
    };
    let status = exec.run_script(&script).await?;
    Ok(ExecOutput {
        status,
        stdout: exec.stdout,
        stderr: exec.stderr,
    })
}

type BoxedRun<'a> = Pin<Box<dyn Future<Output = Result<i32, ExecError>> + Send + 'a>>;

/// Per-stage I/O: bytes fed to stdin and, for non-final stages, the pipe buffer.
#[derive(Default)]
struct StageIo {
    stdin: Option<Vec<u8>>,
    pipe_out: Option<Vec<u8>>,
}

struct Executor<'s> {
    state: &'s mut ShellState,
    mode: OutputMode,
    cancel: CancellationToken,
    middleware: &'s [Arc<dyn Middleware>],
    /// `$1`..`$9`, `$#`, `$@` of the current function call.
    positional: Vec<String>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    /// Set while a function runs inside a pipeline stage.
    pipe_capture: Option<Vec<u8>>,
    /// Aliases being expanded; stops `alias ls='ls -G'` from recursing.
    active_aliases: Vec<String>,
    depth: usize,
}

impl<'s> Executor<'s> {
    fn run_nested<'a>(&'a mut self, script: &'a Script) -> BoxedRun<'a> {
        Box::pin(self.run_script(script))
    }

    async fn run_script(&mut self, script: &Script) -> Result<i32, ExecError> {
        let mut status = 0;
        for item in &script.items {
            status = self.run_and_or(item).await?;
        }
        Ok(status)
    }

    async fn run_and_or(&mut self, list: &AndOrList) -> Result<i32, ExecError> {
        let mut status = self.run_pipeline(&list.first).await?;
        for (connector, pipeline) in &list.rest {
            let run = match connector {
                Connector::And => status == 0,
                Connector::Or => status != 0,
            };
            if run {
                status = self.run_pipeline(pipeline).await?;
            }
        }
        Ok(status)
    }

    async fn run_pipeline(&mut self, pipeline: &Pipeline) -> Result<i32, ExecError> {
        let last = pipeline.commands.len().saturating_sub(1);
        let mut input: Option<Vec<u8>> = None;
        let mut status = 0;
        for (idx, command) in pipeline.commands.iter().enumerate() {
            let mut io = StageIo {
                stdin: input.take(),
                pipe_out: (idx < last).then(Vec::new),
            };
            status = self.run_command(command, &mut io).await?;
            input = io.pipe_out;
        }
        self.state.last_status = status;
        Ok(status)
    }

    async fn run_command(&mut self, command: &Command, io: &mut StageIo) -> Result<i32, ExecError> {
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        match command {
            Command::FunctionDef { name, body } => {
                self.state.set_function(name.clone(), body.clone());
                Ok(0)
            }
            Command::Simple(simple) => self.run_simple(simple, io).await,
        }
    }

    async fn run_simple(&mut self, cmd: &SimpleCommand, io: &mut StageIo) -> Result<i32, ExecError> {
        let mut assignments = Vec::with_capacity(cmd.assignments.len());
        for (name, word) in &cmd.assignments {
            assignments.push((name.clone(), self.expand_word(word).join(" ")));
        }
        let mut argv = Vec::new();
        for word in &cmd.words {
            argv.extend(self.expand_word(word));
        }

        let Some(name) = argv.first().cloned() else {
            for (name, value) in assignments {
                self.state.set_var(name, value);
            }
            return Ok(0);
        };

        // Prefix assignments apply for the duration of this command only.
        let saved: Vec<(String, Option<String>)> = assignments
            .into_iter()
            .map(|(k, v)| {
                let old = self.state.env.insert(k.clone(), v);
                (k, old)
            })
            .collect();

        let alias = cmd
            .words
            .first()
            .and_then(Word::as_plain)
            .filter(|w| !self.active_aliases.contains(w))
            .and_then(|w| self.state.aliases.get(&w).cloned().map(|e| (w, e)));

        let result = match alias {
            Some((alias_name, expansion)) => {
                self.run_alias(&alias_name, &expansion, &argv[1..], io).await
            }
            None => {
                let invocation = Invocation {
                    name,
                    args: argv[1..].to_vec(),
                };
                self.dispatch(&invocation, io).await
            }
        };

        for (name, old) in saved.into_iter().rev() {
            match old {
                Some(value) => self.state.env.insert(name, value),
                None => self.state.env.remove(&name),
            };
        }
        result
    }

    async fn run_alias(
        &mut self,
        name: &str,
        expansion: &str,
        args: &[String],
        io: &mut StageIo,
    ) -> Result<i32, ExecError> {
        let mut source = expansion.to_string();
        for arg in args {
            source.push(' ');
            source.push_str(&quote(arg));
        }
        let script = shell_syntax::parse(&source)?;
        self.active_aliases.push(name.to_string());
        let result = self.run_captured_into(&script, io).await;
        self.active_aliases.pop();
        result
    }

    /// Run through the middleware chain when one is installed.
    async fn dispatch(&mut self, invocation: &Invocation, io: &mut StageIo) -> Result<i32, ExecError> {
        let chain = self.middleware;
        if chain.is_empty() {
            return self.invoke(&invocation.name, &invocation.args, io).await;
        }
        let mut terminal = Terminal { exec: self, io };
        Next::new(chain, &mut terminal).run(invocation).await
    }

    /// Resolve and run one command: function, then builtin, then external.
    async fn invoke(&mut self, name: &str, args: &[String], io: &mut StageIo) -> Result<i32, ExecError> {
        if let Some(body) = self.state.functions.get(name).cloned() {
            return self.call_function(name, &body, args, io).await;
        }
        if let Some(out) = run_builtin(self.state, name, args) {
            self.write_out(io, out.stdout.as_bytes());
            self.write_err(out.stderr.as_bytes());
            return Ok(out.status);
        }
        self.run_external(name, args, io).await
    }

    async fn call_function(
        &mut self,
        name: &str,
        body: &str,
        args: &[String],
        io: &mut StageIo,
    ) -> Result<i32, ExecError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ExecError::Execution(format!(
                "{}: maximum function nesting level exceeded",
                name
            )));
        }
        let script = shell_syntax::parse(body)?;
        let saved = std::mem::replace(&mut self.positional, args.to_vec());
        self.depth += 1;
        let result = self.run_captured_into(&script, io).await;
        self.depth -= 1;
        self.positional = saved;
        result
    }

    /// Run a nested script whose output belongs to the current stage.
    async fn run_captured_into(&mut self, script: &Script, io: &mut StageIo) -> Result<i32, ExecError> {
        if io.pipe_out.is_none() {
            return self.run_nested(script).await;
        }
        let outer = self.pipe_capture.replace(Vec::new());
        let result = self.run_nested(script).await;
        let captured = std::mem::replace(&mut self.pipe_capture, outer).unwrap_or_default();
        self.write_out(io, &captured);
        result
    }

    async fn run_external(&mut self, name: &str, args: &[String], io: &mut StageIo) -> Result<i32, ExecError> {
        let Some(program) = resolve_command(self.state, name) else {
            self.write_err(format!("gsh: command not found: {}\n", name).as_bytes());
            return Ok(STATUS_NOT_FOUND);
        };
        if !is_executable(&program) {
            self.write_err(format!("gsh: permission denied: {}\n", name).as_bytes());
            return Ok(STATUS_NOT_EXECUTABLE);
        }

        let capture_out = io.pipe_out.is_some()
            || self.pipe_capture.is_some()
            || self.mode == OutputMode::Capture;
        let capture_err = self.mode == OutputMode::Capture;

        let mut command = tokio::process::Command::new(&program);
        command
            .args(args)
            .current_dir(&self.state.cwd)
            .env_clear()
            .envs(&self.state.env)
            .kill_on_drop(true)
            .stdin(match (&io.stdin, self.mode) {
                (Some(_), _) => Stdio::piped(),
                (None, OutputMode::Capture) => Stdio::null(),
                (None, OutputMode::Inherit) => Stdio::inherit(),
            })
            .stdout(if capture_out { Stdio::piped() } else { Stdio::inherit() })
            .stderr(if capture_err { Stdio::piped() } else { Stdio::inherit() });

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                self.write_err(format!("gsh: permission denied: {}\n", name).as_bytes());
                return Ok(STATUS_NOT_EXECUTABLE);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.write_err(format!("gsh: command not found: {}\n", name).as_bytes());
                return Ok(STATUS_NOT_FOUND);
            }
            Err(e) => {
                return Err(ExecError::Execution(format!("failed to spawn {}: {}", name, e)));
            }
        };
        tracing::debug!(program = %program.display(), pid = ?child.id(), "spawned");

        if let (Some(input), Some(mut pipe)) = (io.stdin.take(), child.stdin.take()) {
            tokio::spawn(async move {
                // The reader may exit early; a broken pipe is not an error here.
                let _ = pipe.write_all(&input).await;
            });
        }
        let stdout_task = child.stdout.take().map(|mut r| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = r.read_to_end(&mut buf).await;
                buf
            })
        });
        let stderr_task = child.stderr.take().map(|mut r| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = r.read_to_end(&mut buf).await;
                buf
            })
        });

        let status = tokio::select! {
            status = child.wait() => status,
            _ = self.cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill cancelled child");
                }
                return Err(ExecError::Cancelled);
            }
        }
        .map_err(|e| ExecError::Execution(format!("failed to wait for {}: {}", name, e)))?;

        if let Some(task) = stdout_task {
            let out = task.await.unwrap_or_default();
            self.write_out(io, &out);
        }
        if let Some(task) = stderr_task {
            let err = task.await.unwrap_or_default();
            self.write_err(&err);
        }
        Ok(exit_code(status))
    }

    fn write_out(&mut self, io: &mut StageIo, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Some(buf) = io.pipe_out.as_mut() {
            buf.extend_from_slice(bytes);
        } else if let Some(buf) = self.pipe_capture.as_mut() {
            buf.extend_from_slice(bytes);
        } else if self.mode == OutputMode::Capture {
            self.stdout.extend_from_slice(bytes);
        } else {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(bytes);
            let _ = out.flush();
        }
    }

    fn write_err(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if self.mode == OutputMode::Capture {
            self.stderr.extend_from_slice(bytes);
        } else {
            let mut err = std::io::stderr().lock();
            let _ = err.write_all(bytes);
        }
    }

    /// Expand a word into zero or more fields.
    ///
    /// Unquoted expansions that produce nothing are dropped, and a bare
    /// `$@` yields one field per positional parameter.
    fn expand_word(&self, word: &Word) -> Vec<String> {
        if let [WordPart::Var(name)] = word.parts.as_slice() {
            if name == "@" {
                return self.positional.clone();
            }
        }
        let mut out = String::new();
        let mut quoted = false;
        for (idx, part) in word.parts.iter().enumerate() {
            match part {
                WordPart::Lit { text, quoted: q } => {
                    quoted |= *q;
                    if idx == 0 && !*q {
                        out.push_str(&self.expand_tilde(text));
                    } else {
                        out.push_str(text);
                    }
                }
                WordPart::Var(name) => out.push_str(&self.lookup(name)),
            }
        }
        if out.is_empty() && !quoted {
            let only_vars = word.parts.iter().all(|p| matches!(p, WordPart::Var(_)));
            if only_vars {
                return Vec::new();
            }
        }
        vec![out]
    }

    fn expand_tilde(&self, text: &str) -> String {
        if text == "~" || text.starts_with("~/") {
            if let Some(home) = self.state.home() {
                return format!("{}{}", home.display(), &text[1..]);
            }
        }
        text.to_string()
    }

    fn lookup(&self, name: &str) -> String {
        match name {
            "?" => self.state.last_status.to_string(),
            "#" => self.positional.len().to_string(),
            "@" => self.positional.join(" "),
            "0" => "gsh".to_string(),
            n if n.len() == 1 && n.chars().all(|c| c.is_ascii_digit()) => {
                let idx = n.parse::<usize>().unwrap_or(0);
                self.positional.get(idx.wrapping_sub(1)).cloned().unwrap_or_default()
            }
            n => self.state.env_var(n).unwrap_or_default().to_string(),
        }
    }
}

/// The end of the middleware chain: actually runs the command.
struct Terminal<'e, 's> {
    exec: &'e mut Executor<'s>,
    io: &'e mut StageIo,
}

#[async_trait]
impl Dispatch for Terminal<'_, '_> {
    async fn dispatch(&mut self, invocation: &Invocation) -> Result<i32, ExecError> {
        self.exec
            .invoke(&invocation.name, &invocation.args, self.io)
            .await
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Quote `arg` for re-parsing when it contains shell metacharacters.
pub(crate) fn quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}
