//! Execution runtime contract.
//!
//! The only point where actual language semantics are delegated outward:
//! a [`ScriptRuntime`] turns source text into a prepared [`DocumentProgram`],
//! and the program exposes the three execution shapes the engine needs.

use serde_json::Value;
use thiserror::Error;

use crate::domain::DocumentSource;

use super::context::RunContext;

/// Failures raised by a runtime or a prepared program.
///
/// The document store and unit translate these into [`super::EngineError`]
/// with the owning document name attached.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("compilation failed: {message}")]
    Compile { message: String },
    #[error("execution failed: {message}")]
    Execution { message: String },
    #[error("entry point `{entry}` is not defined")]
    MissingEntryPoint { entry: String },
}

impl ProgramError {
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    pub fn missing_entry_point(entry: impl Into<String>) -> Self {
        Self::MissingEntryPoint {
            entry: entry.into(),
        }
    }
}

/// Prepares documents for execution. Preparation may be expensive; the
/// document store guarantees it runs at most once per name.
pub trait ScriptRuntime: Send + Sync {
    fn prepare(&self, source: &DocumentSource) -> Result<Box<dyn DocumentProgram>, ProgramError>;
}

/// A prepared document.
///
/// `run` executes the full top-level body and must be callable repeatedly
/// and concurrently; its effects are scoped to the given context.
/// `initialize` executes the body once into whatever long-lived state the
/// runtime keeps for entry-point calls; the engine's unit guarantees it is
/// invoked at most once per program. `call` dispatches a named entry point
/// against that initialized state.
pub trait DocumentProgram: Send + Sync {
    fn run(&self, ctx: &RunContext) -> Result<(), ProgramError>;

    fn initialize(&self, ctx: &RunContext) -> Result<(), ProgramError>;

    fn call(&self, entry: &str, ctx: &RunContext) -> Result<Value, ProgramError>;

    fn has_entry(&self, entry: &str) -> bool;
}
