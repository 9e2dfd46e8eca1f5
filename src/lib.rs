//! # gsh-core
//!
//! The runtime core of a programmable shell: one shared execution context
//! (working directory, environment, aliases, functions) used by three
//! execution modes, plus tab completion and layered configuration built
//! on top of it.
//!
//! ## Architecture
//!
//! ```text
//!             ┌──────────────────────────────────────┐
//!             │           ExecutionBridge            │
//!             │  foreground │ captured │ script      │
//!             └──────┬──────────────┬────────────────┘
//!                    │  RwLock      │
//!           ┌────────▼─────┐  ┌─────▼───────┐
//!           │  ShellState  │  │  Evaluator  │◀── ConfigLoader
//!           │ cwd/env/...  │  │  (Lua 5.4)  │    baseline → user → integration
//!           └────────▲─────┘  └─────▲───────┘
//!                    │              │
//!             ┌──────┴──────────────┴───────┐
//!             │     CompletionProvider      │
//!             │ #/ macros  #! builtins  spec│
//!             │ commands   files            │
//!             └─────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`value`] | Value space of the configuration language |
//! | [`evaluator`] | Evaluator trait and errors |
//! | [`lua_runtime`] | Lua implementation of the evaluator |
//! | [`runtime`] | Shared shell state |
//! | [`shell_syntax`] | Shell lexer and parser |
//! | [`shell_exec`] | Shell interpreter |
//! | [`shell_builtins`] | `cd`, `export`, `alias`, `complete`, ... |
//! | [`bridge`] | Execution modes, locking, middleware |
//! | [`completion`] | Completion sources and resolver |
//! | [`config`] | Configuration model, extraction, merge |
//! | [`loader`] | Layered configuration loading |

pub mod bridge;
pub mod completion;
pub mod config;
pub mod evaluator;
pub mod loader;
pub mod lua_runtime;
pub mod runtime;
pub mod shell_builtins;
pub mod shell_exec;
pub mod shell_syntax;
pub mod value;

pub use bridge::{CapturedOutput, ExecError, ExecutionBridge, Invocation, Middleware, Next};
pub use completion::{Completion, CompletionProvider};
pub use config::{Config, ConfigError};
pub use evaluator::{EvalError, Evaluator};
pub use loader::{ConfigLoader, LoadResult};
pub use runtime::{RuntimeView, ShellState};
