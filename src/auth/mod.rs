//! Authentication for Earth Engine
//!
//! This module discovers application default credentials and the project
//! that goes with them, mints and caches OAuth2 access tokens, and reports
//! which credential sources are available.
//!
//! # Examples
//!
//! ```rust,no_run
//! use landcover_fetcher::auth::{get_auth_status, Credentials, TokenProvider};
//! use landcover_fetcher::constants::SCOPES;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! println!("{}", get_auth_status().status_message());
//!
//! let client = reqwest::Client::new();
//! let credentials = Credentials::discover(&client, &SCOPES).await?;
//! let tokens = TokenProvider::new(credentials.with_quota_project(None));
//! let _bearer = tokens.token(&client).await?;
//! # Ok(())
//! # }
//! ```

pub mod credentials;

pub use credentials::{
    gcloud_config_dir, gcloud_project, get_auth_status, project_from_env, well_known_file,
    AccessToken, AuthStatus, Credentials, TokenProvider,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        let status = get_auth_status();
        let _ = status.status_message();
        let _ = well_known_file();
    }
}
