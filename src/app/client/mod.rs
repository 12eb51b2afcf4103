//! Earth Engine session
//!
//! A [`Session`] is the explicit handle every remote call goes through. It
//! bundles an HTTP client, a cached token source, the resolved cloud project
//! and the REST endpoint (the high-volume endpoint unless configured otherwise).
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client and session configuration
//! - `http`: Core HTTP operations and status classification
//! - `download`: Patch fetching with the rate-limit retry policy

use serde_json::{json, Value};
use url::Url;

use crate::app::expr::{ComputedValue, Image};
use crate::app::models::{Patch, PatchRequest};
use crate::app::retry::RetryPolicy;
use crate::auth::{gcloud_project, project_from_env, Credentials, TokenProvider};
use crate::constants::earthengine;
use crate::errors::{ApiError, ApiResult, AuthError, AuthResult, PatchResult};

pub mod config;
pub mod download;
pub mod http;

pub use config::{ClientConfig, SessionConfig};
pub use download::PatchFetcher;

use http::HttpHandler;

/// Pixel encoding requested from the thumbnails endpoint
const FILE_FORMAT: &str = "NPY";

/// Authenticated handle to the Earth Engine REST API
#[derive(Debug)]
pub struct Session {
    http_handler: HttpHandler,
    tokens: TokenProvider,
    api_base: Url,
    project: String,
    scale: f64,
    retry: RetryPolicy,
}

impl Session {
    /// Opens a session with application default credentials
    ///
    /// Any quota project attached to the credentials is dropped so requests
    /// bill the session project.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if:
    /// - HTTP client creation fails
    /// - No credentials can be discovered
    /// - No project can be resolved from the config, `GOOGLE_CLOUD_PROJECT`,
    ///   a service account key, the active gcloud configuration or the
    ///   metadata server
    /// - The endpoint URL is invalid
    pub async fn initialize(config: &SessionConfig) -> AuthResult<Self> {
        let client = config.client.build_http_client()?;
        let credentials = Credentials::discover(&client, &config.scope_refs())
            .await?
            .with_quota_project(None);

        let project = match config
            .project
            .clone()
            .or_else(project_from_env)
            .or_else(|| credentials.project_id().map(str::to_string))
            .or_else(gcloud_project)
        {
            Some(project) => project,
            None => credentials
                .metadata_project(&client)
                .await?
                .ok_or(AuthError::MissingProject)?,
        };

        let session = Self::from_parts(config, HttpHandler::new(client), credentials, project)?;
        tracing::info!(
            "Initialized Earth Engine session for project {} at {}",
            session.project,
            session.api_base
        );
        Ok(session)
    }

    /// Opens a session with explicit credentials and project
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if HTTP client creation fails or the endpoint URL is
    /// invalid
    pub fn with_credentials(
        config: &SessionConfig,
        credentials: Credentials,
        project: impl Into<String>,
    ) -> AuthResult<Self> {
        let client = config.client.build_http_client()?;
        Self::from_parts(config, HttpHandler::new(client), credentials, project.into())
    }

    fn from_parts(
        config: &SessionConfig,
        http_handler: HttpHandler,
        credentials: Credentials,
        project: String,
    ) -> AuthResult<Self> {
        if project.trim().is_empty() {
            return Err(AuthError::MissingProject);
        }
        let api_base = Url::parse(&config.api_base_url).map_err(|e| AuthError::InvalidUrl {
            url: config.api_base_url.clone(),
            error: e.to_string(),
        })?;

        Ok(Self {
            http_handler,
            tokens: TokenProvider::new(credentials),
            api_base,
            project,
            scale: config.scale,
            retry: config.retry.clone(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Pixel size used by the patch accessors, in meters
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn credentials(&self) -> &Credentials {
        self.tokens.credentials()
    }

    /// Builds `{base}/{version}/{path}`
    fn api_url(&self, path: &str) -> ApiResult<Url> {
        let url = format!(
            "{}/{}/{}",
            self.api_base.as_str().trim_end_matches('/'),
            earthengine::API_VERSION,
            path
        );
        Url::parse(&url).map_err(|e| ApiError::InvalidUrl {
            url,
            error: e.to_string(),
        })
    }

    async fn post(&self, method: &str, body: &Value) -> ApiResult<Value> {
        let url = self.api_url(&format!("projects/{}/{}", self.project, method))?;
        let token = self.tokens.token(self.http_handler.client()).await?;
        self.http_handler
            .post_json(&url, &token, self.credentials().quota_project(), body)
            .await
    }

    /// Evaluates a computed value on the server
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the call fails or the reply has no `result`
    pub async fn compute_value(&self, value: &ComputedValue) -> ApiResult<Value> {
        let body = json!({ "expression": value.to_expression() });
        let mut reply = self.post("value:compute", &body).await?;
        match reply.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(ApiError::UnexpectedResponse {
                endpoint: "value:compute".to_string(),
                reason: "missing 'result' field".to_string(),
            }),
        }
    }

    /// Requests a one-shot pixel download URL for an image
    ///
    /// The image should already be clipped and scaled to the wanted window.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the call fails or the reply has no `name`
    pub async fn download_url(&self, image: &Image) -> ApiResult<Url> {
        let body = json!({
            "expression": image.to_expression(),
            "fileFormat": FILE_FORMAT,
        });
        let reply = self.post("thumbnails", &body).await?;
        let name = reply
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::UnexpectedResponse {
                endpoint: "thumbnails".to_string(),
                reason: "missing 'name' field".to_string(),
            })?;

        self.api_url(&format!("{}:getPixels", name))
    }

    /// Downloads the bytes behind a URL from `download_url`
    ///
    /// # Errors
    ///
    /// Returns `ApiError::RateLimited` on HTTP 429, `ApiError::Status` on any
    /// other failure status, or a transport error
    pub async fn download(&self, url: &Url) -> ApiResult<Vec<u8>> {
        self.http_handler.get_bytes(url).await
    }

    /// Fetches one patch with this session's retry policy
    ///
    /// # Errors
    ///
    /// Returns `PatchError` as described on [`PatchFetcher::fetch`]
    pub async fn get_patch(&self, image: &Image, request: &PatchRequest) -> PatchResult<Patch> {
        PatchFetcher::new(self, &self.retry).fetch(image, request).await
    }
}
