//! Per-call execution context.
//!
//! Every `run`/`invoke` gets a fresh context. The output writer, the
//! requested cache duration, and the media-type override all live here
//! instead of on the shared unit, so one call's transient declarations can
//! never leak into an unrelated later call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::DocumentName;

use super::lock::mutex_lock;

const SOURCE: &str = "engine::context";

/// Interior-mutable state a script mutates through registered host functions.
#[derive(Default)]
struct RunScratch {
    output: Mutex<String>,
    cache_for_secs: Mutex<Option<i64>>,
    media_type: Mutex<Option<String>>,
}

/// Execution-scoped state for one `run` or `invoke` call.
pub struct RunContext {
    document: DocumentName,
    variables: Arc<HashMap<String, String>>,
    scratch: Arc<RunScratch>,
}

impl RunContext {
    pub fn new(document: DocumentName, mut variables: HashMap<String, String>) -> Self {
        // The executing document's name is always visible to the script.
        variables.insert("document".to_string(), document.to_string());
        Self {
            document,
            variables: Arc::new(variables),
            scratch: Arc::new(RunScratch::default()),
        }
    }

    pub fn document(&self) -> &DocumentName {
        &self.document
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Cheap cloneable handle for host functions registered on a script
    /// engine. The handle shares this context's scratch state.
    pub fn handle(&self) -> ContextHandle {
        ContextHandle {
            variables: Arc::clone(&self.variables),
            scratch: Arc::clone(&self.scratch),
        }
    }

    pub fn emit(&self, text: &str) {
        mutex_lock(&self.scratch.output, SOURCE, "emit").push_str(text);
    }

    /// Read the call's declarations once the execution has completed.
    ///
    /// Takes the buffered output; the context is spent afterwards.
    pub fn finish(self) -> RunOutcome {
        RunOutcome {
            output: std::mem::take(&mut *mutex_lock(&self.scratch.output, SOURCE, "finish.output")),
            cache_for_secs: *mutex_lock(&self.scratch.cache_for_secs, SOURCE, "finish.cache_for"),
            media_type: mutex_lock(&self.scratch.media_type, SOURCE, "finish.media_type").clone(),
        }
    }
}

/// Shared handle to a context's scratch state, `Clone + Send + Sync` so it
/// can be captured by script host-function closures.
#[derive(Clone)]
pub struct ContextHandle {
    variables: Arc<HashMap<String, String>>,
    scratch: Arc<RunScratch>,
}

impl ContextHandle {
    pub fn emit(&self, text: &str) {
        mutex_lock(&self.scratch.output, SOURCE, "handle.emit").push_str(text);
    }

    /// Declare how long the rendered output stays valid, in seconds.
    ///
    /// Non-positive values mean "do not cache"; the caller enforces that when
    /// it populates the output store.
    pub fn request_cache_for(&self, secs: i64) {
        *mutex_lock(&self.scratch.cache_for_secs, SOURCE, "handle.cache_for") = Some(secs);
    }

    pub fn set_media_type(&self, media_type: &str) {
        *mutex_lock(&self.scratch.media_type, SOURCE, "handle.media_type") =
            Some(media_type.to_string());
    }

    pub fn variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }
}

/// What one call produced and declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub output: String,
    pub cache_for_secs: Option<i64>,
    pub media_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RunContext {
        RunContext::new(
            crate::domain::DocumentName::new("index").unwrap(),
            HashMap::from([("method".to_string(), "GET".to_string())]),
        )
    }

    #[test]
    fn emit_accumulates_output() {
        let ctx = context();
        ctx.emit("hello ");
        ctx.handle().emit("world");
        let outcome = ctx.finish();
        assert_eq!(outcome.output, "hello world");
    }

    #[test]
    fn cache_duration_is_scoped_to_one_context() {
        let first = context();
        first.handle().request_cache_for(60);
        assert_eq!(first.finish().cache_for_secs, Some(60));

        // A later unrelated call must not inherit the previous declaration.
        let second = context();
        assert_eq!(second.finish().cache_for_secs, None);
    }

    #[test]
    fn handle_reads_request_variables() {
        let ctx = context();
        let handle = ctx.handle();
        assert_eq!(handle.variable("method").as_deref(), Some("GET"));
        assert_eq!(handle.variable("document").as_deref(), Some("index"));
        assert_eq!(handle.variable("missing"), None);
    }

    #[test]
    fn media_type_override_is_reported() {
        let ctx = context();
        ctx.handle().set_media_type("application/json");
        assert_eq!(ctx.finish().media_type.as_deref(), Some("application/json"));
    }
}
