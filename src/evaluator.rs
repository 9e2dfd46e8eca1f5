//! The embedded-language evaluator seam.
//!
//! An [`Evaluator`] turns source text into named bindings that persist
//! across calls on the same instance. Configuration loading, the
//! `RunScript` execution mode, macro completion and prompt rendering all
//! talk to the language through this trait only; [`crate::lua_runtime`]
//! provides the Lua implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::value::Value;

/// Failure while evaluating embedded-language source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// The source text is malformed.
    #[error("parse error in {chunk}: {message}")]
    Parse { chunk: String, message: String },
    /// The source parsed but failed while running.
    #[error("evaluation error in {chunk}: {message}")]
    Runtime { chunk: String, message: String },
    /// A tool call named something that is not a declared tool.
    #[error("no tool named '{0}'")]
    UnknownTool(String),
    /// Evaluation was interrupted by a cancellation request.
    #[error("evaluation cancelled")]
    Cancelled,
}

impl EvalError {
    pub fn is_parse(&self) -> bool {
        matches!(self, EvalError::Parse { .. })
    }
}

/// Shared flag an evaluator polls while running user code.
///
/// Cloned into whoever may need to stop a long-running evaluation. A
/// triggered flag stays set until [`reset`](Interrupt::reset).
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A persistent embedded-language environment.
///
/// Definitions accumulate across [`eval`](Evaluator::eval) calls;
/// re-declaring a name replaces its previous binding without error.
pub trait Evaluator: Send + Sync {
    /// Evaluate `source` into the environment. `chunk` names the source in errors.
    fn eval(&mut self, source: &str, chunk: &str) -> Result<(), EvalError>;

    /// Evaluate one configuration layer. When the layer fails, the settings
    /// object is put back the way it was before the call; declarations the
    /// layer made before failing stay bound.
    fn eval_layer(&mut self, source: &str, chunk: &str) -> Result<(), EvalError>;

    /// Current value of a top-level binding.
    fn get(&self, name: &str) -> Option<Value>;

    /// All user-defined top-level bindings, sorted by name.
    fn bindings(&self) -> Vec<(String, Value)>;

    /// Invoke a declared tool with positional arguments.
    fn call_tool(&self, name: &str, args: &[Value]) -> Result<Value, EvalError>;

    /// Handle that interrupts a running evaluation.
    fn interrupt(&self) -> Interrupt;
}
