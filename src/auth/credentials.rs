//! Application default credentials for Earth Engine
//!
//! Credentials are discovered in the same order the Google client libraries
//! use: an explicit access token, the file named by
//! `GOOGLE_APPLICATION_CREDENTIALS`, the gcloud well-known file, and finally the
//! GCE metadata server. Credential files may hold a user refresh token or a
//! service account key; service accounts sign an RS256 assertion that the
//! token endpoint exchanges for an access token. Access tokens are cached until
//! shortly before expiry.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::constants::{auth, env as env_constants};
use crate::errors::{AuthError, AuthResult};

/// Where a set of credentials came from and how to mint tokens from it
#[derive(Clone)]
enum CredentialKind {
    /// Pre-minted bearer token, used as-is
    AccessToken { token: String },
    /// User refresh token from `gcloud auth application-default login`
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        path: PathBuf,
    },
    /// Service account key signing its own token requests
    ServiceAccount {
        client_email: String,
        key: EncodingKey,
        key_id: Option<String>,
        token_uri: String,
        path: PathBuf,
    },
    /// Tokens minted by the instance metadata server
    MetadataServer { host: String },
}

/// Credentials scoped for Earth Engine
#[derive(Clone)]
pub struct Credentials {
    kind: CredentialKind,
    quota_project: Option<String>,
    project_id: Option<String>,
    scopes: Vec<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("source", &self.source_description())
            .field("quota_project", &self.quota_project)
            .field("project_id", &self.project_id)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// On-disk credential file, shared by every credential type
#[derive(Debug, Deserialize)]
struct CredentialFile {
    #[serde(rename = "type")]
    kind: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    quota_project_id: Option<String>,
    client_email: Option<String>,
    private_key: Option<String>,
    private_key_id: Option<String>,
    token_uri: Option<String>,
    project_id: Option<String>,
}

/// Claims of a service account token request
#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

/// OAuth2 token response, from the token endpoint or the metadata server
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// A bearer token and when it stops being valid
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Whether the token should be refreshed before its next use
    pub fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() + auth::TOKEN_REFRESH_MARGIN >= expires_at,
            None => false,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credentials {
    /// Discovers application default credentials
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingCredentials` if no source yields credentials,
    /// or the error of the first source that exists but cannot be used
    pub async fn discover(client: &Client, scopes: &[&str]) -> AuthResult<Self> {
        if let Ok(token) = env::var(env_constants::ACCESS_TOKEN) {
            if !token.trim().is_empty() {
                tracing::info!("Using access token from {}", env_constants::ACCESS_TOKEN);
                return Ok(Self::from_access_token(token.trim(), scopes));
            }
        }

        if let Ok(path) = env::var(env_constants::APPLICATION_CREDENTIALS) {
            tracing::info!("Using credentials file from {}", env_constants::APPLICATION_CREDENTIALS);
            return Self::from_file(Path::new(&path), scopes);
        }

        if let Some(path) = well_known_file() {
            if path.exists() {
                tracing::info!("Using gcloud credentials: {}", path.display());
                return Self::from_file(&path, scopes);
            }
        }

        let host = metadata_host();
        if metadata_server_reachable(client, &host).await {
            tracing::info!("Using metadata server credentials from {}", host);
            return Ok(Self {
                kind: CredentialKind::MetadataServer { host },
                quota_project: None,
                project_id: None,
                scopes: owned_scopes(scopes),
            });
        }

        Err(AuthError::MissingCredentials)
    }

    /// Wraps a pre-minted bearer token
    pub fn from_access_token(token: impl Into<String>, scopes: &[&str]) -> Self {
        Self {
            kind: CredentialKind::AccessToken {
                token: token.into(),
            },
            quota_project: None,
            project_id: None,
            scopes: owned_scopes(scopes),
        }
    }

    /// Loads a credential file
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the file cannot be read, is not valid JSON, is
    /// missing required fields, or holds an unsupported credential type
    pub fn from_file(path: &Path, scopes: &[&str]) -> AuthResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AuthError::CredentialFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content, path, scopes)
    }

    fn from_json(content: &str, path: &Path, scopes: &[&str]) -> AuthResult<Self> {
        let file: CredentialFile =
            serde_json::from_str(content).map_err(|e| AuthError::InvalidCredentialFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let missing = |field: &str| AuthError::InvalidCredentialFile {
            path: path.to_path_buf(),
            reason: format!("missing field '{}'", field),
        };

        let (kind, project_id) = match file.kind.as_str() {
            "authorized_user" => (
                CredentialKind::AuthorizedUser {
                    client_id: file.client_id.ok_or_else(|| missing("client_id"))?,
                    client_secret: file.client_secret.ok_or_else(|| missing("client_secret"))?,
                    refresh_token: file.refresh_token.ok_or_else(|| missing("refresh_token"))?,
                    path: path.to_path_buf(),
                },
                None,
            ),
            "service_account" => {
                let private_key = file.private_key.ok_or_else(|| missing("private_key"))?;
                let key = EncodingKey::from_rsa_pem(private_key.as_bytes()).map_err(|e| {
                    AuthError::InvalidCredentialFile {
                        path: path.to_path_buf(),
                        reason: format!("invalid private_key: {}", e),
                    }
                })?;
                (
                    CredentialKind::ServiceAccount {
                        client_email: file.client_email.ok_or_else(|| missing("client_email"))?,
                        key,
                        key_id: file.private_key_id,
                        token_uri: file
                            .token_uri
                            .unwrap_or_else(|| auth::TOKEN_URL.to_string()),
                        path: path.to_path_buf(),
                    },
                    file.project_id,
                )
            }
            other => {
                return Err(AuthError::UnsupportedCredentialType {
                    kind: other.to_string(),
                })
            }
        };

        Ok(Self {
            kind,
            quota_project: file.quota_project_id,
            project_id,
            scopes: owned_scopes(scopes),
        })
    }

    /// Replaces the quota project; `None` strips any override
    pub fn with_quota_project(mut self, quota_project: Option<String>) -> Self {
        self.quota_project = quota_project;
        self
    }

    /// Project billed for requests, if overridden
    pub fn quota_project(&self) -> Option<&str> {
        self.quota_project.as_deref()
    }

    /// Project named by a service account key file
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Human-readable credential source for status output
    pub fn source_description(&self) -> String {
        match &self.kind {
            CredentialKind::AccessToken { .. } => {
                format!("access token ({})", env_constants::ACCESS_TOKEN)
            }
            CredentialKind::AuthorizedUser { path, .. } => {
                format!("authorized user ({})", path.display())
            }
            CredentialKind::ServiceAccount {
                client_email, path, ..
            } => format!("service account {} ({})", client_email, path.display()),
            CredentialKind::MetadataServer { host } => format!("metadata server ({})", host),
        }
    }

    /// Project id reported by the metadata server, for metadata credentials only
    pub async fn metadata_project(&self, client: &Client) -> AuthResult<Option<String>> {
        let CredentialKind::MetadataServer { host } = &self.kind else {
            return Ok(None);
        };
        let url = format!("http://{}/computeMetadata/v1/project/project-id", host);
        let response = client
            .get(&url)
            .header(auth::METADATA_FLAVOR.0, auth::METADATA_FLAVOR.1)
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let project = response.text().await?.trim().to_string();
        Ok((!project.is_empty()).then_some(project))
    }

    /// Mints a fresh access token
    async fn fetch_token(&self, client: &Client) -> AuthResult<AccessToken> {
        let response = match &self.kind {
            CredentialKind::AccessToken { token } => {
                return Ok(AccessToken {
                    secret: token.clone(),
                    expires_at: None,
                });
            }
            CredentialKind::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                ..
            } => {
                tracing::debug!("Refreshing user access token");
                client
                    .post(auth::TOKEN_URL)
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("refresh_token", refresh_token.as_str()),
                    ])
                    .send()
                    .await?
            }
            CredentialKind::ServiceAccount {
                client_email,
                key,
                key_id,
                token_uri,
                ..
            } => {
                tracing::debug!("Exchanging signed assertion for {}", client_email);
                let assertion = sign_assertion(
                    client_email,
                    key_id.as_deref(),
                    key,
                    token_uri,
                    &self.scopes,
                    unix_now(),
                )?;
                client
                    .post(token_uri.as_str())
                    .form(&[
                        ("grant_type", auth::JWT_BEARER_GRANT),
                        ("assertion", assertion.as_str()),
                    ])
                    .send()
                    .await?
            }
            CredentialKind::MetadataServer { host } => {
                tracing::debug!("Requesting access token from metadata server");
                let url = format!(
                    "http://{}/computeMetadata/v1/instance/service-accounts/default/token",
                    host
                );
                client
                    .get(&url)
                    .query(&[("scopes", self.scopes.join(","))])
                    .header(auth::METADATA_FLAVOR.0, auth::METADATA_FLAVOR.1)
                    .send()
                    .await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Token request failed with HTTP {}", status.as_u16());
            return Err(AuthError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(AccessToken {
            secret: token.access_token,
            expires_at: token
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        })
    }
}

/// Caches access tokens for a set of credentials
pub struct TokenProvider {
    credentials: Credentials,
    cached: Mutex<Option<AccessToken>>,
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            cached: Mutex::new(None),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns a valid bearer token, refreshing it when close to expiry
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if a new token cannot be minted
    pub async fn token(&self, client: &Client) -> AuthResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.needs_refresh() {
                return Ok(token.secret().to_string());
            }
        }
        let token = self.credentials.fetch_token(client).await?;
        let secret = token.secret().to_string();
        *cached = Some(token);
        Ok(secret)
    }
}

/// Authentication status information
#[derive(Debug, Clone)]
pub struct AuthStatus {
    /// Whether an access token is set in the environment
    pub access_token_set: bool,
    /// File named by `GOOGLE_APPLICATION_CREDENTIALS`, if set
    pub credentials_file: Option<PathBuf>,
    /// Whether that file exists
    pub credentials_file_exists: bool,
    /// gcloud well-known file location, if a home directory is known
    pub well_known_file: Option<PathBuf>,
    /// Whether the gcloud well-known file exists
    pub well_known_file_exists: bool,
    /// Project from the environment or the active gcloud configuration
    pub project: Option<String>,
}

impl AuthStatus {
    /// Whether a local credential source is available
    pub fn has_credentials(&self) -> bool {
        self.access_token_set || self.credentials_file_exists || self.well_known_file_exists
    }

    /// Get descriptive status message for display
    pub fn status_message(&self) -> String {
        match (self.has_credentials(), &self.project) {
            (false, _) => {
                "No local credentials - run 'gcloud auth application-default login' or rely on the metadata server".to_string()
            }
            (true, None) => {
                "Credentials found but no project set (GOOGLE_CLOUD_PROJECT or 'gcloud config set project')".to_string()
            }
            (true, Some(project)) => format!("Credentials found for project {}", project),
        }
    }
}

/// Check current authentication status without network access
pub fn get_auth_status() -> AuthStatus {
    let credentials_file = env::var(env_constants::APPLICATION_CREDENTIALS)
        .ok()
        .map(PathBuf::from);
    let well_known = well_known_file();

    AuthStatus {
        access_token_set: env::var(env_constants::ACCESS_TOKEN).is_ok_and(|t| !t.trim().is_empty()),
        credentials_file_exists: credentials_file.as_ref().is_some_and(|p| p.exists()),
        credentials_file,
        well_known_file_exists: well_known.as_ref().is_some_and(|p| p.exists()),
        well_known_file: well_known,
        project: project_from_env().or_else(gcloud_project),
    }
}

/// Project from `GOOGLE_CLOUD_PROJECT` or `GCLOUD_PROJECT`
pub fn project_from_env() -> Option<String> {
    [env_constants::CLOUD_PROJECT, env_constants::GCLOUD_PROJECT]
        .iter()
        .find_map(|name| non_empty_env(name))
}

/// gcloud configuration directory, `CLOUDSDK_CONFIG` if set
pub fn gcloud_config_dir() -> Option<PathBuf> {
    if let Some(dir) = non_empty_env(env_constants::CLOUDSDK_CONFIG) {
        return Some(PathBuf::from(dir));
    }

    #[cfg(windows)]
    let base = dirs::config_dir();
    #[cfg(not(windows))]
    let base = dirs::home_dir().map(|home| home.join(".config"));

    base.map(|dir| dir.join(auth::GCLOUD_DIR))
}

/// gcloud application default credentials file
pub fn well_known_file() -> Option<PathBuf> {
    gcloud_config_dir().map(|dir| dir.join(auth::WELL_KNOWN_FILE))
}

/// Project set with `gcloud config set project`
///
/// `CLOUDSDK_CORE_PROJECT` wins; otherwise `core/project` is read from the
/// active configuration (`CLOUDSDK_ACTIVE_CONFIG_NAME`, then the
/// `active_config` file, then `default`).
pub fn gcloud_project() -> Option<String> {
    if let Some(project) = non_empty_env(env_constants::CLOUDSDK_PROJECT) {
        return Some(project);
    }
    let dir = gcloud_config_dir()?;
    let active = non_empty_env(env_constants::CLOUDSDK_ACTIVE_CONFIG);
    project_in_gcloud_dir(&dir, active.as_deref())
}

fn project_in_gcloud_dir(dir: &Path, active: Option<&str>) -> Option<String> {
    let name = match active {
        Some(name) => name.to_string(),
        None => std::fs::read_to_string(dir.join(auth::ACTIVE_CONFIG_FILE))
            .ok()
            .map(|content| content.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| auth::DEFAULT_CONFIGURATION.to_string()),
    };

    let path = dir
        .join(auth::CONFIGURATIONS_DIR)
        .join(format!("config_{}", name));
    let content = std::fs::read_to_string(&path).ok()?;
    let project = core_project(&content)?;
    tracing::debug!("Project {} from gcloud configuration {}", project, path.display());
    Some(project)
}

/// `project` under `[core]` in a gcloud properties file
fn core_project(content: &str) -> Option<String> {
    let mut in_core = false;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            in_core = section.trim() == "core";
            continue;
        }
        if !in_core {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            if key.trim() == "project" && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Signs the RS256 assertion a service account trades for an access token
fn sign_assertion(
    client_email: &str,
    key_id: Option<&str>,
    key: &EncodingKey,
    token_uri: &str,
    scopes: &[String],
    issued_at: u64,
) -> AuthResult<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key_id.map(str::to_string);

    let claims = AssertionClaims {
        iss: client_email.to_string(),
        scope: scopes.join(" "),
        aud: token_uri.to_string(),
        iat: issued_at,
        exp: issued_at + auth::ASSERTION_LIFETIME.as_secs(),
    };
    Ok(jsonwebtoken::encode(&header, &claims, key)?)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

fn metadata_host() -> String {
    env::var(env_constants::METADATA_HOST).unwrap_or_else(|_| auth::METADATA_HOST.to_string())
}

async fn metadata_server_reachable(client: &Client, host: &str) -> bool {
    let url = format!("http://{}/computeMetadata/v1/", host);
    match client
        .get(&url)
        .header(auth::METADATA_FLAVOR.0, auth::METADATA_FLAVOR.1)
        .timeout(auth::METADATA_CHECK_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!("Metadata server not reachable: {}", e);
            false
        }
    }
}

fn owned_scopes(scopes: &[&str]) -> Vec<String> {
    scopes.iter().map(|scope| scope.to_string()).collect()
}
