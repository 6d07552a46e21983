use std::sync::Arc;

use thiserror::Error;

use crate::flags::VariationType;

/// Represents a result type for operations in the SDK core.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the SDK core.
///
/// All validation and lookup failures are surfaced synchronously to the caller. Nothing is
/// swallowed or retried internally.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Evaluation was attempted before the first successful [`load`](crate::Client::load).
    #[error("configuration has not been loaded")]
    NotLoaded,
    /// The configured SDK key is empty.
    #[error("SDK key is empty")]
    InvalidSdkKey,
    /// The configured host is empty or cannot be parsed into a URL.
    #[error("invalid host configuration")]
    InvalidHost,
    /// The caller passed an empty subject key.
    #[error("subject key is empty")]
    MissingSubjectKey,
    /// The caller passed an empty flag key.
    #[error("flag key is empty")]
    MissingFlagKey,
    /// The requested flag is absent from the current configuration snapshot.
    #[error("flag configuration not found: {flag_key}")]
    FlagConfigNotFound {
        /// Key of the requested flag, as supplied by the caller.
        flag_key: String,
    },
    /// The flag is declared with a different variation type than the getter expects. This is a
    /// hard error, not a default substitution, and is raised before any evaluation occurs.
    #[error("invalid flag type (expected: {expected:?}, found: {found:?})")]
    DeclaredTypeMismatch {
        /// Type requested by the caller.
        expected: VariationType,
        /// Type the flag is declared with.
        found: VariationType,
    },
    /// The selected variation's literal value does not coerce to the declared type (e.g. an
    /// integer flag carrying a fractional value).
    #[error("variation value does not match the declared {expected:?} type")]
    ActualValueTypeMismatch {
        /// Type requested by the caller.
        expected: VariationType,
    },
    /// Transport error while fetching configuration.
    #[error("failed to fetch configuration")]
    // reqwest::Error is not clonable, so we're wrapping it in an Arc.
    FetchFailed(#[source] Arc<reqwest::Error>),
    /// The configuration server rejected the SDK key.
    #[error("unauthorized, SDK key is likely invalid")]
    Unauthorized,
    /// The requested flag was fetched but could not be parsed.
    #[error("error parsing flag configuration, try upgrading the SDK")]
    ConfigurationParseError,
}

impl Error {
    pub(crate) fn fetch_failed(err: reqwest::Error) -> Error {
        Error::FetchFailed(Arc::new(err.without_url()))
    }
}
