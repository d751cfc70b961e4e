//! Error types for port operations.

use std::fmt;

/// Repository operation errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Entity not found - includes entity type and ID for actionable error messages.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl RepoError {
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    pub fn constraint(message: impl ToString) -> Self {
        Self::ConstraintViolation(message.to_string())
    }
}

// =============================================================================
// Provider Errors
// =============================================================================

pub const STATUS_TIMEOUT: u16 = 408;
pub const STATUS_RATE_LIMITED: u16 = 429;
pub const STATUS_SAFETY_BLOCKED: u16 = 451;
pub const STATUS_BAD_GATEWAY: u16 = 502;

const RETRYABLE_STATUSES: [u16; 3] = [429, 500, 503];
const RETRYABLE_KEYWORDS: [&str; 5] = [
    "deadline",
    "unavailable",
    "timeout",
    "resource exhausted",
    "high demand",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimited,
    SafetyBlocked,
    Timeout,
    /// The backend answered but the payload held no usable artifact
    Extraction,
    Generic,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::SafetyBlocked => "safety_blocked",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Extraction => "extraction",
            ProviderErrorKind::Generic => "generic",
        };
        write!(f, "{s}")
    }
}

/// Any failure of a generative backend call.
///
/// `status` is an HTTP-like code: 429 rate limiting, 451 content-safety or
/// policy block, 408 timeout, otherwise the backend's own status or 502.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{backend} {operation} failed ({status}): {message}")]
pub struct ProviderError {
    pub backend: &'static str,
    pub operation: &'static str,
    pub status: u16,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    /// Wrap a backend failure, classifying its status from the message first
    /// and the raw HTTP status second.
    pub fn from_backend(
        backend: &'static str,
        operation: &'static str,
        http_status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let status = classify_status(&message, http_status);
        Self {
            backend,
            operation,
            status,
            kind: kind_for_status(status),
            message,
        }
    }

    pub fn safety_blocked(
        backend: &'static str,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            operation,
            status: STATUS_SAFETY_BLOCKED,
            kind: ProviderErrorKind::SafetyBlocked,
            message: message.into(),
        }
    }

    pub fn extraction(
        backend: &'static str,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            operation,
            status: STATUS_BAD_GATEWAY,
            kind: ProviderErrorKind::Extraction,
            message: message.into(),
        }
    }

    /// Whether a retry of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        if self.kind == ProviderErrorKind::Extraction {
            return false;
        }
        if RETRYABLE_STATUSES.contains(&self.status) {
            return true;
        }
        let message = self.message.to_lowercase();
        RETRYABLE_KEYWORDS.iter().any(|kw| message.contains(kw))
    }
}

/// Map a backend message and optional HTTP status to a provider status code.
pub fn classify_status(message: &str, http_status: Option<u16>) -> u16 {
    let lower = message.to_lowercase();
    if lower.contains("rate limit")
        || lower.contains("resource exhausted")
        || lower.contains("quota")
    {
        STATUS_RATE_LIMITED
    } else if lower.contains("safety") || lower.contains("policy") || lower.contains("blocked") {
        STATUS_SAFETY_BLOCKED
    } else if lower.contains("timeout") || lower.contains("timed out") || lower.contains("deadline")
    {
        STATUS_TIMEOUT
    } else {
        http_status.unwrap_or(STATUS_BAD_GATEWAY)
    }
}

fn kind_for_status(status: u16) -> ProviderErrorKind {
    match status {
        STATUS_RATE_LIMITED => ProviderErrorKind::RateLimited,
        STATUS_SAFETY_BLOCKED => ProviderErrorKind::SafetyBlocked,
        STATUS_TIMEOUT => ProviderErrorKind::Timeout,
        _ => ProviderErrorKind::Generic,
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Path escapes the storage root: {0}")]
    InvalidPath(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound(path);
        }
        Self::Io { path, source }
    }
}
