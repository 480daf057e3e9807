//! Render pipeline: cache-key resolution, output-cache consultation, and
//! document execution.
//!
//! The pipeline order is fixed: resolve the cache key, check the output
//! store, and only on a miss prepare and run the document. After the run the
//! per-call outcome carries whatever duration the document declared for
//! itself, which decides whether the fresh payload is cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::histogram;
use tracing::debug;

use crate::domain::{DocumentName, DomainError, RenderedPayload};
use crate::engine::{
    DocumentStore, MapResolver, OutputStore, ResolverChain, RunContext, SpecialVars,
    expand_pattern,
};

use super::error::AppError;

const METRIC_RENDER_MS: &str = "scrivano_render_ms";

/// Site-level knobs for the pipeline, fixed at startup.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub application: String,
    pub base_path: String,
    pub index_document: String,
    pub cache_key_pattern: String,
    pub default_media_type: String,
    pub default_charset: String,
    pub enable_output_cache: bool,
}

/// A served payload plus how long it stays valid.
///
/// `valid_for` is the declared duration on a fresh run and the remaining
/// validity on a cache hit; `None` means the output is not cacheable.
#[derive(Debug, Clone)]
pub struct RenderedResponse {
    pub payload: RenderedPayload,
    pub valid_for: Option<Duration>,
    /// Whether the payload came out of the output store rather than a run.
    pub from_cache: bool,
}

/// One unit of render work: a document plus the request state bound to it.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub document: DocumentName,
    pub path: String,
    pub variables: HashMap<String, String>,
    /// Per-request pattern override; the site pattern applies when absent.
    pub cache_pattern: Option<String>,
}

pub struct RenderService {
    documents: Arc<DocumentStore>,
    outputs: Arc<OutputStore>,
    config: RenderConfig,
}

impl RenderService {
    pub fn new(
        documents: Arc<DocumentStore>,
        outputs: Arc<OutputStore>,
        config: RenderConfig,
    ) -> Self {
        Self {
            documents,
            outputs,
            config,
        }
    }

    pub fn documents(&self) -> &Arc<DocumentStore> {
        &self.documents
    }

    pub fn outputs(&self) -> &Arc<OutputStore> {
        &self.outputs
    }

    /// Map a request path to a document name.
    ///
    /// The configured base path is stripped, surrounding slashes are
    /// trimmed, and the empty remainder maps to the index document.
    pub fn document_for_path(&self, path: &str) -> Result<DocumentName, DomainError> {
        let relative = self.relative_path(path);
        let trimmed = relative.trim_matches('/');
        if trimmed.is_empty() {
            DocumentName::new(self.config.index_document.clone())
        } else {
            DocumentName::new(trimmed)
        }
    }

    fn relative_path<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix(self.config.base_path.as_str()).unwrap_or(path)
    }

    /// Build the unit of work for an inbound request.
    pub fn request_for(
        &self,
        path: &str,
        method: &str,
        query: &HashMap<String, String>,
    ) -> Result<RenderRequest, DomainError> {
        let document = self.document_for_path(path)?;

        let mut variables = HashMap::new();
        variables.insert("method".to_string(), method.to_string());
        variables.insert("path".to_string(), path.to_string());
        let mut pairs: Vec<_> = query.iter().collect();
        pairs.sort();
        variables.insert(
            "query".to_string(),
            pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&"),
        );
        for (key, value) in query {
            variables.insert(format!("query.{key}"), value.clone());
        }

        Ok(RenderRequest {
            document,
            path: path.to_string(),
            variables,
            cache_pattern: None,
        })
    }

    /// Resolve the output-cache key for one request.
    ///
    /// Equal resolved strings always address the same cache entry, so the
    /// chain must be fed only from deterministic request state.
    pub fn cache_key(&self, request: &RenderRequest) -> String {
        let chain = ResolverChain::new()
            .push(Arc::new(SpecialVars {
                document: request.document.to_string(),
                application: self.config.application.clone(),
                base_path: self.relative_path(&request.path).to_string(),
            }))
            .push(Arc::new(MapResolver::new(request.variables.clone())));

        let pattern = request
            .cache_pattern
            .as_deref()
            .unwrap_or(&self.config.cache_key_pattern);
        expand_pattern(pattern, &chain)
    }

    /// Serve one request: cached payload on a hit, a fresh run otherwise.
    pub async fn render(&self, request: &RenderRequest) -> Result<RenderedResponse, AppError> {
        let key = self.cache_key(request);

        if self.config.enable_output_cache
            && let Some((payload, remaining)) = self.outputs.lookup(&key)
        {
            debug!(document = %request.document, cache = "output", outcome = "hit", "serving cached payload");
            return Ok(RenderedResponse {
                payload,
                valid_for: Some(remaining),
                from_cache: true,
            });
        }

        let started = Instant::now();
        let unit = self.documents.get_or_prepare(&request.document).await?;

        let ctx = RunContext::new(request.document.clone(), request.variables.clone());
        unit.run(&ctx)?;
        let outcome = ctx.finish();

        let media_type = outcome
            .media_type
            .unwrap_or_else(|| self.guess_media_type(&request.document));
        let payload = RenderedPayload::new(
            Bytes::from(outcome.output),
            media_type,
            self.config.default_charset.clone(),
        );

        histogram!(METRIC_RENDER_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let valid_for = outcome
            .cache_for_secs
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64));

        if self.config.enable_output_cache
            && let Some(valid_for) = valid_for
        {
            debug!(
                document = %request.document,
                cache = "output",
                valid_for_secs = valid_for.as_secs(),
                "caching payload"
            );
            self.outputs.store(key, payload.clone(), valid_for);
        }

        Ok(RenderedResponse {
            payload,
            valid_for,
            from_cache: false,
        })
    }

    fn guess_media_type(&self, document: &DocumentName) -> String {
        mime_guess::from_path(document.file_stem())
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| self.config.default_media_type.clone())
    }
}

/// Dispatches a capturing internal redirect: the target is rendered in
/// process, with the original request's variables, and the buffered payload
/// is handed back instead of an external redirect.
#[async_trait]
pub trait CaptureDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        target: &str,
        origin: &RenderRequest,
    ) -> Result<RenderedResponse, AppError>;
}

#[async_trait]
impl CaptureDispatcher for RenderService {
    async fn dispatch(
        &self,
        target: &str,
        origin: &RenderRequest,
    ) -> Result<RenderedResponse, AppError> {
        let document = self.document_for_path(target)?;

        let mut variables = origin.variables.clone();
        variables.insert("redirected_from".to_string(), origin.path.clone());
        variables.insert("path".to_string(), target.to_string());

        let request = RenderRequest {
            document,
            path: target.to_string(),
            variables,
            cache_pattern: origin.cache_pattern.clone(),
        };
        self.render(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RenderConfig {
        RenderConfig {
            application: "site".to_string(),
            base_path: "/".to_string(),
            index_document: "index".to_string(),
            cache_key_pattern: "{application}:{document}?{query}".to_string(),
            default_media_type: "text/html".to_string(),
            default_charset: "utf-8".to_string(),
            enable_output_cache: true,
        }
    }

    fn service() -> RenderService {
        use crate::engine::{MemorySourceProvider, ScriptRuntime};
        use crate::infra::script::RhaiRuntime;

        let provider: Arc<MemorySourceProvider> = Arc::new(MemorySourceProvider::new());
        let runtime: Arc<dyn ScriptRuntime> = Arc::new(RhaiRuntime::new(0));
        RenderService::new(
            Arc::new(DocumentStore::new(provider, runtime)),
            Arc::new(OutputStore::new(16)),
            config(),
        )
    }

    #[test]
    fn root_path_maps_to_index_document() {
        let service = service();
        assert_eq!(service.document_for_path("/").unwrap().as_str(), "index");
        assert_eq!(
            service.document_for_path("/pages/about").unwrap().as_str(),
            "pages/about"
        );
    }

    #[test]
    fn traversal_path_is_rejected() {
        let service = service();
        assert!(service.document_for_path("/../etc/passwd").is_err());
    }

    #[test]
    fn cache_key_uses_pattern_and_request_state() {
        let service = service();
        let query = HashMap::from([("lang".to_string(), "en".to_string())]);
        let request = service.request_for("/pages/about", "GET", &query).unwrap();

        assert_eq!(service.cache_key(&request), "site:pages/about?lang=en");
    }

    #[test]
    fn cache_key_is_deterministic_for_equal_state() {
        let service = service();
        let query = HashMap::from([
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        let first = service.request_for("/x", "GET", &query).unwrap();
        let second = service.request_for("/x", "GET", &query).unwrap();

        assert_eq!(service.cache_key(&first), service.cache_key(&second));
    }
}
