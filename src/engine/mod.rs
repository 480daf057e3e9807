//! Scrivano Document Engine
//!
//! Executes named documents through an embedded script runtime and caches
//! both the prepared documents and their rendered output:
//!
//! - **Document store**: prepares each document at most once per name, even
//!   under concurrent first access, and hands out shared units.
//! - **Document unit**: separates "run the full body every call" from
//!   "initialize once, then invoke entry points".
//! - **Resolver chain + key builder**: expands `{name}` placeholders in a
//!   cache-key pattern into the concrete output-cache key.
//! - **Output store**: keeps rendered payloads for a duration the executing
//!   document declares for itself at run time.
//! - **Filter protocol**: interprets hook return values as
//!   continue / skip / stop / redirect decisions.
//!
//! ## Configuration
//!
//! Engine behavior is controlled via `scrivano.toml`:
//!
//! ```toml
//! [cache]
//! enable_output_cache = true
//! output_limit = 256
//! ```

mod context;
mod documents;
mod error;
mod filter;
mod keys;
mod lock;
mod output;
mod resolver;
mod runtime;
mod source;
mod unit;

pub use context::{ContextHandle, RunContext, RunOutcome};
pub use documents::DocumentStore;
pub use error::EngineError;
pub use filter::{FilterAction, FilterDecision, HookOutcome, classify, decide};
pub use keys::expand_pattern;
pub use output::{CachedOutput, OutputStore};
pub use resolver::{MapResolver, ResolverChain, SpecialVars, VariableResolver};
pub use runtime::{DocumentProgram, ProgramError, ScriptRuntime};
pub use source::{FileSourceProvider, MemorySourceProvider, SourceError, SourceProvider};
pub use unit::DocumentUnit;
