//! Land-cover Fetcher Library
//!
//! Fetches Sentinel-2 input patches and land-cover label patches from the
//! Earth Engine REST API as `ndarray` arrays, with a deadline-bounded retry on
//! rate limiting.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(DEFAULT_SCALE_M, 100.0);
        assert_eq!(LABEL_YEAR, 2020);
        assert!(USER_AGENT.contains("landcover-fetcher"));
    }

    #[test]
    fn test_error_types() {
        let auth_error = errors::AuthError::MissingCredentials;
        let app_error = AppError::Auth(auth_error);

        assert_eq!(app_error.category(), "authentication");
        assert!(!app_error.is_recoverable());
    }
}
