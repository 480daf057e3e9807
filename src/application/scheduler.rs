//! Scheduled document invocations.
//!
//! A thin consumer of the engine's `invoke` primitive: each configured task
//! calls one entry point on one document at a fixed cadence. Failures are
//! logged and the cadence keeps going.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::domain::DocumentName;
use crate::engine::{DocumentStore, RunContext};

const METRIC_SCHEDULER_RUN: &str = "scrivano_scheduler_run_total";

#[derive(Debug, Clone)]
pub struct ScheduledInvocation {
    pub document: DocumentName,
    pub entry: String,
    pub every: Duration,
}

/// Spawn one background task per scheduled invocation.
pub fn spawn(
    documents: Arc<DocumentStore>,
    tasks: Vec<ScheduledInvocation>,
) -> Vec<JoinHandle<()>> {
    tasks
        .into_iter()
        .map(|task| {
            let documents = Arc::clone(&documents);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(task.every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately; skip it so every task
                // waits one full period before its first run.
                ticker.tick().await;

                loop {
                    ticker.tick().await;
                    counter!(METRIC_SCHEDULER_RUN).increment(1);

                    let ctx = RunContext::new(task.document.clone(), HashMap::new());
                    let result = match documents.get_or_prepare(&task.document).await {
                        Ok(unit) => unit.invoke(&task.entry, &ctx).await.map(|_| ()),
                        Err(err) => Err(err),
                    };

                    match result {
                        Ok(()) => {
                            debug!(document = %task.document, entry = %task.entry, "scheduled invocation completed");
                        }
                        Err(err) => {
                            warn!(document = %task.document, entry = %task.entry, error = %err, "scheduled invocation failed");
                        }
                    }
                }
            })
        })
        .collect()
}
