//! Filesystem-backed document sources.

use std::sync::Arc;

use scrivano::domain::DocumentName;
use scrivano::engine::{
    DocumentStore, FileSourceProvider, RunContext, ScriptRuntime, SourceError, SourceProvider,
};
use scrivano::infra::script::RhaiRuntime;

fn doc(name: &str) -> DocumentName {
    DocumentName::new(name).unwrap()
}

#[tokio::test]
async fn loads_documents_from_the_root_directory() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("pages")).unwrap();
    std::fs::write(
        root.path().join("pages/about.rhai"),
        r#"emit("about page");"#,
    )
    .unwrap();

    let provider = FileSourceProvider::new(root.path(), "rhai");
    let source = provider.load(&doc("pages/about")).await.unwrap();

    assert_eq!(source.text, r#"emit("about page");"#);
    assert_eq!(source.dialect, "rhai");
}

#[tokio::test]
async fn missing_file_is_a_not_found_error() {
    let root = tempfile::tempdir().unwrap();
    let provider = FileSourceProvider::new(root.path(), "rhai");

    let err = provider.load(&doc("absent")).await.unwrap_err();
    assert!(matches!(err, SourceError::NotFound { .. }));
}

#[tokio::test]
async fn store_prepares_and_runs_a_file_backed_document() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("index.rhai"), r#"emit("from disk");"#).unwrap();

    let provider: Arc<dyn SourceProvider> =
        Arc::new(FileSourceProvider::new(root.path(), "rhai"));
    let runtime: Arc<dyn ScriptRuntime> = Arc::new(RhaiRuntime::new(0));
    let store = DocumentStore::new(provider, runtime);

    let unit = store.get_or_prepare(&doc("index")).await.unwrap();
    let ctx = RunContext::new(doc("index"), Default::default());
    unit.run(&ctx).unwrap();

    assert_eq!(ctx.finish().output, "from disk");
}
