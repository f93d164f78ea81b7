//! Common error types used throughout mediaweave.
//!
//! Errors fall into two groups. [`BrokerError::Validation`] and
//! [`BrokerError::CapabilityMismatch`] are returned synchronously, before an
//! operation id exists. Everything else is delivered on the terminating
//! result callback of an operation.

use std::fmt;

/// Failure category reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A browse operation failed.
    BrowseFailed,
    /// A search operation failed.
    SearchFailed,
    /// A query operation failed.
    QueryFailed,
    /// A resolve operation failed.
    ResolveFailed,
    /// The referenced media does not exist in the source.
    MediaNotFound,
    /// A store operation failed.
    StoreFailed,
    /// A remove operation failed.
    RemoveFailed,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BrowseFailed => write!(f, "browse failed"),
            Self::SearchFailed => write!(f, "search failed"),
            Self::QueryFailed => write!(f, "query failed"),
            Self::ResolveFailed => write!(f, "resolve failed"),
            Self::MediaNotFound => write!(f, "media not found"),
            Self::StoreFailed => write!(f, "store failed"),
            Self::RemoveFailed => write!(f, "remove failed"),
        }
    }
}

/// Opaque error raised by a provider. The broker relays it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    /// Failure category.
    pub code: ErrorCode,
    /// Human readable detail from the provider.
    pub message: String,
}

impl ProviderError {
    /// Create a new provider error.
    pub fn new<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error type for broker operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Bad arguments, unknown source, or unsupported operation.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The options ask for filters the source does not declare.
    #[error("Source '{source_id}' does not support: {}", .unsupported.join(", "))]
    CapabilityMismatch {
        /// Source the options were checked against.
        source_id: String,
        /// Human readable names of the rejected options.
        unsupported: Vec<String>,
    },

    /// The operation was cancelled before its terminator was observed.
    #[error("Operation cancelled")]
    Cancelled,

    /// A provider reported a failure.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl BrokerError {
    /// Create a new Validation error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new CapabilityMismatch error.
    pub fn capability_mismatch<S: Into<String>>(source_id: S, unsupported: Vec<String>) -> Self {
        Self::CapabilityMismatch {
            source_id: source_id.into(),
            unsupported,
        }
    }

    /// Create a Provider error from a code and message.
    pub fn provider<S: Into<String>>(code: ErrorCode, msg: S) -> Self {
        Self::Provider(ProviderError::new(code, msg))
    }

    /// Returns `true` for errors raised before an operation id was allocated.
    pub fn is_synchronous(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::CapabilityMismatch { .. })
    }
}

/// Result type alias using the broker error type.
pub type Result<T> = std::result::Result<T, BrokerError>;
