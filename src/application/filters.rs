//! Filter pipeline: before/after hooks delegated to documents.
//!
//! Bindings are matched by path prefix in configuration order. Before-hooks
//! feed the decision protocol; after-hooks are invocation-only and their
//! return value is ignored.

use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::DocumentName;
use crate::engine::{
    DocumentStore, EngineError, FilterAction, FilterDecision, RunContext, classify, decide,
};

use super::error::AppError;
use super::render::{CaptureDispatcher, RenderRequest, RenderedResponse};

const METRIC_HOOK_INVOCATION: &str = "scrivano_hook_invocation_total";
const METRIC_HOOK_REDIRECT: &str = "scrivano_hook_redirect_total";

/// One configured filter: a path prefix and the hook document serving it.
#[derive(Debug, Clone)]
pub struct FilterBinding {
    pub prefix: String,
    pub document: DocumentName,
    pub before_entry: Option<String>,
    pub after_entry: Option<String>,
    pub default_action: FilterAction,
}

/// What the before-pipeline decided for a request.
pub enum FilterVerdict {
    /// Hand the request to the render pipeline.
    Proceed,
    /// Stop processing; the request is not served.
    Halt,
    /// A capturing redirect already produced the response payload.
    Captured(RenderedResponse),
}

pub struct FilterService {
    bindings: Vec<FilterBinding>,
    documents: Arc<DocumentStore>,
    dispatcher: Arc<dyn CaptureDispatcher>,
}

impl FilterService {
    pub fn new(
        bindings: Vec<FilterBinding>,
        documents: Arc<DocumentStore>,
        dispatcher: Arc<dyn CaptureDispatcher>,
    ) -> Self {
        Self {
            bindings,
            documents,
            dispatcher,
        }
    }

    /// Run every matching before-hook until one steers the request.
    pub async fn before(&self, origin: &RenderRequest) -> Result<FilterVerdict, AppError> {
        for binding in self.matching(&origin.path) {
            let Some(entry) = binding.before_entry.as_deref() else {
                continue;
            };

            let decision = match self.invoke_hook(binding, entry, origin).await {
                Ok(value) => decide(classify(&value), binding.default_action),
                // A hook document without the entry point falls back to the
                // binding's default action.
                Err(AppError::Engine(EngineError::EntryPointNotFound { .. })) => {
                    debug!(
                        document = %binding.document,
                        entry,
                        "before hook entry point missing, using default action"
                    );
                    FilterDecision::Proceed(binding.default_action)
                }
                Err(err) => return Err(err),
            };

            match decision {
                FilterDecision::Proceed(FilterAction::Continue) => {}
                FilterDecision::Proceed(FilterAction::Skip) => return Ok(FilterVerdict::Proceed),
                FilterDecision::Proceed(FilterAction::Stop) => return Ok(FilterVerdict::Halt),
                FilterDecision::Redirect(target) => {
                    counter!(METRIC_HOOK_REDIRECT).increment(1);
                    debug!(target = %target, from = %origin.path, "dispatching capturing redirect");
                    let payload = self
                        .dispatcher
                        .dispatch(&target, origin)
                        .await
                        .map_err(|err| {
                            AppError::from(EngineError::redirect_dispatch(
                                target.clone(),
                                err.to_string(),
                            ))
                        })?;
                    return Ok(FilterVerdict::Captured(payload));
                }
            }
        }
        Ok(FilterVerdict::Proceed)
    }

    /// Run every matching after-hook. Failures are logged, never propagated;
    /// the response has already been produced at this point.
    pub async fn after(&self, origin: &RenderRequest) {
        for binding in self.matching(&origin.path) {
            let Some(entry) = binding.after_entry.as_deref() else {
                continue;
            };

            match self.invoke_hook(binding, entry, origin).await {
                Ok(_) => {}
                Err(AppError::Engine(EngineError::EntryPointNotFound { .. })) => {
                    debug!(document = %binding.document, entry, "after hook entry point missing");
                }
                Err(err) => {
                    warn!(document = %binding.document, entry, error = %err, "after hook failed");
                }
            }
        }
    }

    fn matching<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a FilterBinding> {
        self.bindings
            .iter()
            .filter(move |binding| path.starts_with(&binding.prefix))
    }

    async fn invoke_hook(
        &self,
        binding: &FilterBinding,
        entry: &str,
        origin: &RenderRequest,
    ) -> Result<Value, AppError> {
        counter!(METRIC_HOOK_INVOCATION).increment(1);
        let unit = self.documents.get_or_prepare(&binding.document).await?;
        let ctx = RunContext::new(binding.document.clone(), origin.variables.clone());
        Ok(unit.invoke(entry, &ctx).await?)
    }
}
