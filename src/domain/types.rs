//! Core value types shared across the engine and the serving layers.

use std::fmt;

use bytes::Bytes;

use super::error::DomainError;

/// Opaque, path-like identifier of a document.
///
/// The name is the sole key into the document cache, so two equal names must
/// always refer to the same prepared unit for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentName(String);

impl DocumentName {
    /// Validate and wrap a raw name.
    ///
    /// Names are slash-separated segments. Empty names, absolute names, and
    /// names with `.` / `..` segments are rejected so that file-backed source
    /// providers can never be walked out of their root.
    pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(DomainError::invalid_name(raw, "name is empty"));
        }
        if raw.starts_with('/') || raw.ends_with('/') {
            return Err(DomainError::invalid_name(
                raw,
                "name must not start or end with a slash",
            ));
        }
        if raw
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(DomainError::invalid_name(
                raw,
                "name contains an empty or relative segment",
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final path segment, used for extension-based media type guessing.
    pub fn file_stem(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw source text of a document, as handed out by a source provider.
///
/// The `dialect` tag is opaque to the engine; it is passed through to the
/// script runtime, which decides whether it can prepare the source.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub name: DocumentName,
    pub text: String,
    pub dialect: String,
}

/// A fully rendered response body with its representation metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPayload {
    pub body: Bytes,
    pub media_type: String,
    pub charset: String,
}

impl RenderedPayload {
    pub fn new(body: Bytes, media_type: impl Into<String>, charset: impl Into<String>) -> Self {
        Self {
            body,
            media_type: media_type.into(),
            charset: charset.into(),
        }
    }

    /// `Content-Type` header value for this payload.
    pub fn content_type(&self) -> String {
        format!("{}; charset={}", self.media_type, self.charset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_nested_names() {
        assert!(DocumentName::new("index").is_ok());
        assert!(DocumentName::new("hooks/auth").is_ok());
        assert!(DocumentName::new("a/b/c").is_ok());
    }

    #[test]
    fn rejects_traversal_and_empty_segments() {
        assert!(DocumentName::new("").is_err());
        assert!(DocumentName::new("/abs").is_err());
        assert!(DocumentName::new("trailing/").is_err());
        assert!(DocumentName::new("a//b").is_err());
        assert!(DocumentName::new("../escape").is_err());
        assert!(DocumentName::new("a/./b").is_err());
    }

    #[test]
    fn content_type_includes_charset() {
        let payload = RenderedPayload::new(Bytes::from("x"), "text/html", "utf-8");
        assert_eq!(payload.content_type(), "text/html; charset=utf-8");
    }

    #[test]
    fn file_stem_is_last_segment() {
        let name = DocumentName::new("pages/about").unwrap();
        assert_eq!(name.file_stem(), "about");
    }
}
