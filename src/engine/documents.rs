//! Document store: name -> prepared unit, with single-flight preparation.
//!
//! Preparation delegates to an external runtime whose side effects we do not
//! control, so rather than letting racing callers build redundant candidates
//! the store gates the prepare step with a per-name init cell: the first
//! caller prepares, concurrent callers for the same name wait, and unrelated
//! names never contend. A failed preparation is not remembered; the next
//! caller retries from scratch.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::DocumentName;

use super::error::EngineError;
use super::runtime::ScriptRuntime;
use super::source::{SourceError, SourceProvider};
use super::unit::DocumentUnit;

const METRIC_DOCUMENT_PREPARE: &str = "scrivano_document_prepare_total";
const METRIC_DOCUMENT_HIT: &str = "scrivano_document_hit_total";

type UnitCell = Arc<OnceCell<Arc<DocumentUnit>>>;

pub struct DocumentStore {
    units: DashMap<DocumentName, UnitCell>,
    sources: Arc<dyn SourceProvider>,
    runtime: Arc<dyn ScriptRuntime>,
}

impl DocumentStore {
    pub fn new(sources: Arc<dyn SourceProvider>, runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self {
            units: DashMap::new(),
            sources,
            runtime,
        }
    }

    /// Return the shared unit for `name`, preparing it if this is the first
    /// access. Concurrent first-time callers share a single preparation.
    pub async fn get_or_prepare(&self, name: &DocumentName) -> Result<Arc<DocumentUnit>, EngineError> {
        // The shard lock is released before any awaiting happens; only the
        // cell handle escapes the entry guard.
        let cell = {
            let entry = self
                .units
                .entry(name.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()));
            Arc::clone(entry.value())
        };

        if let Some(unit) = cell.get() {
            counter!(METRIC_DOCUMENT_HIT).increment(1);
            return Ok(Arc::clone(unit));
        }

        let unit = cell
            .get_or_try_init(|| self.prepare(name))
            .await?;
        Ok(Arc::clone(unit))
    }

    async fn prepare(&self, name: &DocumentName) -> Result<Arc<DocumentUnit>, EngineError> {
        let source = self.sources.load(name).await.map_err(|err| match err {
            SourceError::NotFound { .. } => EngineError::source_not_found(name.clone()),
            SourceError::Io { source, .. } => EngineError::prepare(name.clone(), source.to_string()),
        })?;

        let program = self
            .runtime
            .prepare(&source)
            .map_err(|err| EngineError::prepare(name.clone(), err.to_string()))?;

        counter!(METRIC_DOCUMENT_PREPARE).increment(1);
        debug!(document = %name, dialect = %source.dialect, "prepared document");

        Ok(Arc::new(DocumentUnit::new(name.clone(), program)))
    }

    /// Drop one prepared unit. The next access prepares it again.
    pub fn evict(&self, name: &DocumentName) {
        self.units.remove(name);
    }

    /// Drop every prepared unit (wholesale invalidation on redeploy).
    pub fn clear(&self) {
        self.units.clear();
    }

    /// Number of names with a published unit.
    pub fn len(&self) -> usize {
        self.units
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
