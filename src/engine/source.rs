//! Document source providers.
//!
//! A provider maps a document name to source text plus a dialect tag. The
//! engine does not interpret the tag; it is passed through to the script
//! runtime.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::domain::{DocumentName, DocumentSource};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("document source `{name}` not found")]
    NotFound { name: String },
    #[error("io error reading document `{name}`: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn load(&self, name: &DocumentName) -> Result<DocumentSource, SourceError>;
}

/// Loads documents from a directory tree: `{root}/{name}.{extension}`.
pub struct FileSourceProvider {
    root: PathBuf,
    extension: String,
}

impl FileSourceProvider {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    fn path_for(&self, name: &DocumentName) -> PathBuf {
        // DocumentName validation already rejects traversal segments. The
        // extension is appended rather than swapped so names with dots keep
        // their full spelling on disk.
        self.root
            .join(format!("{}.{}", name.as_str(), self.extension))
    }
}

#[async_trait]
impl SourceProvider for FileSourceProvider {
    async fn load(&self, name: &DocumentName) -> Result<DocumentSource, SourceError> {
        let path = self.path_for(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(DocumentSource {
                name: name.clone(),
                text,
                dialect: self.extension.clone(),
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(SourceError::NotFound {
                name: name.to_string(),
            }),
            Err(err) => Err(SourceError::Io {
                name: name.to_string(),
                source: err,
            }),
        }
    }
}

/// In-memory provider for tests and embedded setups.
#[derive(Default)]
pub struct MemorySourceProvider {
    documents: DashMap<DocumentName, DocumentSource>,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &DocumentName, text: impl Into<String>, dialect: impl Into<String>) {
        self.documents.insert(
            name.clone(),
            DocumentSource {
                name: name.clone(),
                text: text.into(),
                dialect: dialect.into(),
            },
        );
    }

    pub fn remove(&self, name: &DocumentName) {
        self.documents.remove(name);
    }
}

#[async_trait]
impl SourceProvider for MemorySourceProvider {
    async fn load(&self, name: &DocumentName) -> Result<DocumentSource, SourceError> {
        self.documents
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SourceError::NotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> DocumentName {
        DocumentName::new(raw).unwrap()
    }

    #[tokio::test]
    async fn memory_provider_round_trip() {
        let provider = MemorySourceProvider::new();
        provider.insert(&name("index"), "emit(\"hi\");", "rhai");

        let source = provider.load(&name("index")).await.unwrap();
        assert_eq!(source.text, "emit(\"hi\");");
        assert_eq!(source.dialect, "rhai");

        provider.remove(&name("index"));
        assert!(matches!(
            provider.load(&name("index")).await,
            Err(SourceError::NotFound { .. })
        ));
    }

    #[test]
    fn file_provider_builds_rooted_paths() {
        let provider = FileSourceProvider::new("/srv/docs", "rhai");
        let path = provider.path_for(&name("hooks/auth"));
        assert_eq!(path, PathBuf::from("/srv/docs/hooks/auth.rhai"));
    }

    #[test]
    fn dotted_names_keep_their_spelling() {
        let provider = FileSourceProvider::new("/srv/docs", "rhai");
        let path = provider.path_for(&name("feed.xml"));
        assert_eq!(path, PathBuf::from("/srv/docs/feed.xml.rhai"));
    }
}
