//! Error types for the land-cover fetcher
//!
//! This module defines the error types for all components of the application.
//! Errors are designed to be actionable and provide clear context for debugging and
//! user feedback.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Authentication and session errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// No credential source produced credentials
    #[error(
        "No application default credentials found. Set EE_ACCESS_TOKEN or GOOGLE_APPLICATION_CREDENTIALS, or run 'gcloud auth application-default login'"
    )]
    MissingCredentials,

    /// Credential file could not be read
    #[error("Failed to read credential file: {path}")]
    CredentialFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Credential file is not valid JSON of a known shape
    #[error("Invalid credential file {path}: {reason}")]
    InvalidCredentialFile { path: PathBuf, reason: String },

    /// Credential file type that cannot be exchanged for a token
    #[error("Unsupported credential type '{kind}'. Use an authorized_user or service_account credential, or an access token")]
    UnsupportedCredentialType { kind: String },

    /// Service account assertion could not be signed
    #[error("Failed to sign service account assertion")]
    Assertion(#[from] jsonwebtoken::errors::Error),

    /// Token endpoint refused the exchange
    #[error("Token exchange failed: HTTP {status}: {body}")]
    TokenExchange { status: u16, body: String },

    /// No cloud project could be resolved
    #[error("No cloud project configured. Set GOOGLE_CLOUD_PROJECT, session.project in the config file, or run 'gcloud config set project'")]
    MissingProject,

    /// Endpoint URL could not be parsed
    #[error("Invalid endpoint URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// HTTP request failed during authentication
    #[error("HTTP request failed during authentication")]
    Http(#[from] reqwest::Error),
}

/// Earth Engine REST call errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// Server responded with HTTP 429
    #[error("Rate limit exceeded. Server responded with HTTP 429: {body}")]
    RateLimited { body: String },

    /// Server responded with any other non-success status
    #[error("Server error: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("Unexpected response from {endpoint}: {reason}")]
    UnexpectedResponse { endpoint: String, reason: String },

    /// Failed to obtain an access token for the request
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Invalid URL built or returned by the service
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// HTTP transport error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding error
    #[error("JSON error")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether the service asked us to slow down
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// NPY payload decoding errors
#[derive(Error, Debug)]
pub enum NpyError {
    /// Payload does not start with the NPY magic string
    #[error("Not an NPY payload: missing magic prefix")]
    BadMagic,

    /// Unknown format version
    #[error("Unsupported NPY format version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    /// Payload ended early
    #[error("Truncated NPY payload: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Header dictionary could not be parsed
    #[error("Invalid NPY header: {reason}")]
    InvalidHeader { reason: String },

    /// Scalar or structured dtype this decoder does not handle
    #[error("Unsupported NPY dtype: {descr}")]
    UnsupportedDtype { descr: String },

    /// Column-major arrays are not produced by the service
    #[error("Fortran-ordered NPY arrays are not supported")]
    FortranOrder,

    /// Decoded shape does not fit a patch
    #[error("NPY shape mismatch: expected {expected}, got {actual:?}")]
    ShapeMismatch { expected: String, actual: Vec<usize> },

    /// Plain array rejected by the NPY reader
    #[error("Failed to read NPY array")]
    Read(#[from] ndarray_npy::ReadNpyError),

    /// Array could not be encoded
    #[error("Failed to write NPY array")]
    Write(#[from] ndarray_npy::WriteNpyError),
}

/// Patch download errors
#[derive(Error, Debug)]
pub enum PatchError {
    /// Service call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Payload could not be decoded
    #[error("Failed to decode patch payload")]
    Decode(#[from] NpyError),

    /// Retry budget ran out while the service kept rate limiting
    #[error("Patch download deadline exceeded after {attempts} attempts in {elapsed:?}")]
    DeadlineExceeded {
        attempts: u32,
        elapsed: Duration,
        #[source]
        last: Box<PatchError>,
    },

    /// Request parameters are unusable
    #[error("Invalid patch request: {reason}")]
    InvalidRequest { reason: String },
}

impl PatchError {
    /// Whether the error is the rate-limit condition
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PatchError::Api(api) if api.is_rate_limited())
    }

    /// Number of attempts made before giving up, when known
    pub fn attempts(&self) -> Option<u32> {
        match self {
            PatchError::DeadlineExceeded { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// Image composition errors
#[derive(Error, Debug)]
pub enum ComposeError {
    /// Month cannot start a two-month window inside one year
    #[error("Month must be between 1 and 11 to span a two-month window within the year, got {month}")]
    InvalidMonth { month: u32 },

    /// The filtered source collection holds no images
    #[error("No {dataset} data found for county '{county}' in {year}")]
    NoMatchingData {
        dataset: String,
        county: String,
        year: u32,
    },

    /// Size check against the service failed
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read
    #[error("Failed to read configuration file: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Authentication error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Service call error
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Patch download error
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Image composition error
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// NPY codec error
    #[error(transparent)]
    Npy(#[from] NpyError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Api(ApiError::RateLimited { .. })
            | AppError::Api(ApiError::Http(_))
            | AppError::Auth(AuthError::Http(_))
            | AppError::Patch(PatchError::DeadlineExceeded { .. }) => true,
            AppError::Patch(PatchError::Api(api)) | AppError::Compose(ComposeError::Api(api)) => {
                matches!(api, ApiError::RateLimited { .. } | ApiError::Http(_))
            }
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "authentication",
            AppError::Api(_) => "api",
            AppError::Patch(_) => "patch",
            AppError::Compose(_) => "compose",
            AppError::Npy(_) => "decode",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Authentication result type alias
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Service call result type alias
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Patch download result type alias
pub type PatchResult<T> = std::result::Result<T, PatchError>;

/// Composition result type alias
pub type ComposeResult<T> = std::result::Result<T, ComposeError>;

/// NPY codec result type alias
pub type NpyResult<T> = std::result::Result<T, NpyError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
