use thiserror::Error;

use crate::domain::DocumentName;

/// Typed failures surfaced by the engine.
///
/// The engine never retries on its own; every failure is scoped to the one
/// document or request being processed and is returned to the caller, who
/// decides retry/fallback policy.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("source for document `{name}` not found")]
    SourceNotFound { name: DocumentName },
    #[error("document `{name}` could not be prepared: {message}")]
    Prepare { name: DocumentName, message: String },
    #[error("document `{name}` failed during execution: {message}")]
    Execution { name: DocumentName, message: String },
    #[error("entry point `{entry}` not found in document `{name}`")]
    EntryPointNotFound { name: DocumentName, entry: String },
    #[error("internal redirect to `{target}` could not be dispatched: {message}")]
    RedirectDispatch { target: String, message: String },
}

impl EngineError {
    pub fn source_not_found(name: DocumentName) -> Self {
        Self::SourceNotFound { name }
    }

    pub fn prepare(name: DocumentName, message: impl Into<String>) -> Self {
        Self::Prepare {
            name,
            message: message.into(),
        }
    }

    pub fn execution(name: DocumentName, message: impl Into<String>) -> Self {
        Self::Execution {
            name,
            message: message.into(),
        }
    }

    pub fn entry_point_not_found(name: DocumentName, entry: impl Into<String>) -> Self {
        Self::EntryPointNotFound {
            name,
            entry: entry.into(),
        }
    }

    pub fn redirect_dispatch(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RedirectDispatch {
            target: target.into(),
            message: message.into(),
        }
    }
}
