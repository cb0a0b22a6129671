//! Error taxonomy shared by every docqa component.
//!
//! Each variant corresponds to one failure class with its own propagation
//! rule: validation errors go back to the caller verbatim, service timeouts
//! are retryable, and an unavailable index is fatal to the process.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the retrieval-augmented generation engine.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad or missing input. Never retried.
    #[error("{0}")]
    Validation(String),

    /// The question was empty or whitespace-only.
    #[error("query must not be empty")]
    EmptyQuery,

    /// A vector's dimension disagrees with the index's established dimension.
    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A document could not be chunked, embedded, or inserted. Nothing from
    /// the document was committed.
    #[error("failed to ingest '{document}': {cause}")]
    Ingestion {
        document: String,
        #[source]
        cause: Box<RagError>,
    },

    /// The persistence layer cannot be reached.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// An external embedding or synthesis service did not answer in time.
    #[error("{service} timed out after {}s", .timeout.as_secs_f32())]
    ServiceTimeout { service: String, timeout: Duration },

    /// An external service returned an error after retries were exhausted.
    #[error("{service} error: {message}")]
    Service { service: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Wrap `cause` as an ingestion failure for `document`.
    ///
    /// Already-wrapped errors are returned unchanged so causes don't nest.
    pub fn ingestion(document: impl Into<String>, cause: RagError) -> Self {
        match cause {
            e @ RagError::Ingestion { .. } => e,
            cause => RagError::Ingestion {
                document: document.into(),
                cause: Box::new(cause),
            },
        }
    }

    /// The innermost error, looking through [`RagError::Ingestion`].
    pub fn root(&self) -> &RagError {
        match self {
            RagError::Ingestion { cause, .. } => cause.root(),
            other => other,
        }
    }

    /// True for errors the caller caused and can fix by changing input.
    pub fn is_client_error(&self) -> bool {
        matches!(self.root(), RagError::Validation(_) | RagError::EmptyQuery)
    }

    /// True when retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), RagError::ServiceTimeout { .. })
    }

    /// True when the process can no longer serve authoritative results.
    pub fn is_fatal(&self) -> bool {
        matches!(self.root(), RagError::IndexUnavailable(_))
    }

    /// Message safe to show to a remote caller.
    ///
    /// Client errors keep their detail. Server-side failures are reduced to
    /// their kind so storage paths and raw backend bodies stay in the logs.
    pub fn public_message(&self) -> String {
        match self.root() {
            RagError::Validation(msg) => msg.clone(),
            RagError::EmptyQuery => "query must not be empty".to_string(),
            RagError::DimensionMismatch { expected, actual } => format!(
                "embedding dimension mismatch (index {}, model {})",
                expected, actual
            ),
            RagError::IndexUnavailable(_) => "vector index storage is unavailable".to_string(),
            RagError::ServiceTimeout { service, .. } => {
                format!("{} timed out, try again later", service)
            }
            RagError::Service { service, .. } => format!("{} request failed", service),
            RagError::Io(_) => "could not read document".to_string(),
            RagError::Ingestion { .. } => "ingestion failed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingestion_does_not_nest() {
        let inner = RagError::ingestion("a.txt", RagError::EmptyQuery);
        let outer = RagError::ingestion("b.txt", inner);
        match outer {
            RagError::Ingestion { document, cause } => {
                assert_eq!(document, "a.txt");
                assert!(matches!(*cause, RagError::EmptyQuery));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_classification_looks_through_ingestion() {
        let timeout = RagError::ingestion(
            "doc.txt",
            RagError::ServiceTimeout {
                service: "embedding".into(),
                timeout: Duration::from_secs(3),
            },
        );
        assert!(timeout.is_retryable());
        assert!(!timeout.is_fatal());
        assert!(!timeout.is_client_error());

        let down = RagError::ingestion("doc.txt", RagError::IndexUnavailable("disk".into()));
        assert!(down.is_fatal());
    }

    #[test]
    fn test_public_message_hides_storage_detail() {
        let err = RagError::IndexUnavailable("unable to open /srv/secret/index.sqlite".into());
        assert!(!err.public_message().contains("/srv/secret"));

        let err = RagError::Validation("Only .txt files are allowed".into());
        assert_eq!(err.public_message(), "Only .txt files are allowed");
    }
}
