//! Concurrency guarantees of the document store and document units.
//!
//! Covers the single-flight preparation of a name under concurrent first
//! access and the initialize-once handoff for entry-point invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use scrivano::domain::{DocumentName, DocumentSource};
use scrivano::engine::{
    DocumentProgram, DocumentStore, MemorySourceProvider, ProgramError, RunContext, ScriptRuntime,
    SourceProvider,
};
use serde_json::Value;
use tokio::sync::Barrier;

/// Program with observable execution counters and a deliberately slow
/// initialization, to widen the race window.
struct ProbeProgram {
    runs: Arc<AtomicUsize>,
    inits: Arc<AtomicUsize>,
}

impl DocumentProgram for ProbeProgram {
    fn run(&self, _ctx: &RunContext) -> Result<(), ProgramError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn initialize(&self, _ctx: &RunContext) -> Result<(), ProgramError> {
        std::thread::sleep(Duration::from_millis(20));
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn call(&self, entry: &str, _ctx: &RunContext) -> Result<Value, ProgramError> {
        match entry {
            "ping" => Ok(Value::from(self.inits.load(Ordering::SeqCst) as i64)),
            other => Err(ProgramError::missing_entry_point(other)),
        }
    }

    fn has_entry(&self, entry: &str) -> bool {
        entry == "ping"
    }
}

/// Runtime with a slow, counted prepare step and an optional first failure.
struct ProbeRuntime {
    prepares: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
    inits: Arc<AtomicUsize>,
    fail_first: bool,
}

impl ProbeRuntime {
    fn new(fail_first: bool) -> Self {
        Self {
            prepares: Arc::new(AtomicUsize::new(0)),
            runs: Arc::new(AtomicUsize::new(0)),
            inits: Arc::new(AtomicUsize::new(0)),
            fail_first,
        }
    }
}

impl ScriptRuntime for ProbeRuntime {
    fn prepare(&self, _source: &DocumentSource) -> Result<Box<dyn DocumentProgram>, ProgramError> {
        let attempt = self.prepares.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        if self.fail_first && attempt == 0 {
            return Err(ProgramError::compile("first attempt fails"));
        }
        Ok(Box::new(ProbeProgram {
            runs: Arc::clone(&self.runs),
            inits: Arc::clone(&self.inits),
        }))
    }
}

fn store_with(runtime: Arc<ProbeRuntime>, names: &[&str]) -> DocumentStore {
    let provider = MemorySourceProvider::new();
    for name in names {
        provider.insert(&doc(name), "probe", "probe");
    }
    let provider: Arc<dyn SourceProvider> = Arc::new(provider);
    DocumentStore::new(provider, runtime)
}

fn doc(name: &str) -> DocumentName {
    DocumentName::new(name).unwrap()
}

fn ctx(name: &str) -> RunContext {
    RunContext::new(doc(name), HashMap::new())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_first_access_prepares_once() {
    const CALLERS: usize = 16;

    let runtime = Arc::new(ProbeRuntime::new(false));
    let store = Arc::new(store_with(Arc::clone(&runtime), &["shared"]));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store.get_or_prepare(&doc("shared")).await.unwrap()
        }));
    }

    let units = futures::future::join_all(handles).await;
    let units: Vec<_> = units.into_iter().map(|joined| joined.unwrap()).collect();

    assert_eq!(runtime.prepares.load(Ordering::SeqCst), 1);
    for unit in &units[1..] {
        assert!(Arc::ptr_eq(&units[0], unit));
    }
}

#[tokio::test]
async fn failed_prepare_is_not_cached() {
    let runtime = Arc::new(ProbeRuntime::new(true));
    let store = store_with(Arc::clone(&runtime), &["flaky"]);

    assert!(store.get_or_prepare(&doc("flaky")).await.is_err());

    // The failure is forgotten; the next caller prepares from scratch.
    let unit = store.get_or_prepare(&doc("flaky")).await.unwrap();
    assert_eq!(unit.name().as_str(), "flaky");
    assert_eq!(runtime.prepares.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn distinct_names_never_share_units() {
    let runtime = Arc::new(ProbeRuntime::new(false));
    let store = store_with(Arc::clone(&runtime), &["one", "two"]);

    let first = store.get_or_prepare(&doc("one")).await.unwrap();
    let second = store.get_or_prepare(&doc("two")).await.unwrap();

    assert_eq!(runtime.prepares.load(Ordering::SeqCst), 2);
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_invoke_initializes_once() {
    const CALLERS: usize = 16;

    let runtime = Arc::new(ProbeRuntime::new(false));
    let store = store_with(Arc::clone(&runtime), &["module"]);
    let unit = store.get_or_prepare(&doc("module")).await.unwrap();
    assert!(!unit.initialized());

    let barrier = Arc::new(Barrier::new(CALLERS));
    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let unit = Arc::clone(&unit);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            unit.invoke("ping", &ctx("module")).await.unwrap()
        }));
    }

    let values = futures::future::join_all(handles).await;

    assert_eq!(runtime.inits.load(Ordering::SeqCst), 1);
    assert!(unit.initialized());
    // Every caller observed a fully initialized unit.
    for value in values {
        assert_eq!(value.unwrap(), Value::from(1));
    }
}

#[tokio::test]
async fn run_is_never_implicitly_cached() {
    let runtime = Arc::new(ProbeRuntime::new(false));
    let store = store_with(Arc::clone(&runtime), &["page"]);
    let unit = store.get_or_prepare(&doc("page")).await.unwrap();

    unit.run(&ctx("page")).unwrap();
    unit.run(&ctx("page")).unwrap();

    assert_eq!(runtime.runs.load(Ordering::SeqCst), 2);
    // Full-body runs do not count as initialization.
    assert!(!unit.initialized());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn eviction_allows_a_fresh_preparation() {
    let runtime = Arc::new(ProbeRuntime::new(false));
    let store = store_with(Arc::clone(&runtime), &["page"]);

    let first = store.get_or_prepare(&doc("page")).await.unwrap();
    assert_eq!(store.len(), 1);

    store.evict(&doc("page"));
    assert!(store.is_empty());

    let second = store.get_or_prepare(&doc("page")).await.unwrap();
    assert_eq!(runtime.prepares.load(Ordering::SeqCst), 2);
    assert!(!Arc::ptr_eq(&first, &second));
}
