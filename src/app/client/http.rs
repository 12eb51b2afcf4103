//! Core HTTP operations against the Earth Engine REST API
//!
//! Every response goes through the same status classification: HTTP 429 maps
//! to `ApiError::RateLimited` and any other non-success status to
//! `ApiError::Status`. Retrying is left to the caller.

use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use url::Url;

use crate::constants::{auth, http};
use crate::errors::{ApiError, ApiResult};

/// HTTP operations handler
#[derive(Debug, Clone)]
pub struct HttpHandler {
    client: Client,
}

impl HttpHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Posts a JSON body with a bearer token and returns the parsed JSON reply
    ///
    /// # Arguments
    ///
    /// * `url` - Endpoint to call
    /// * `token` - OAuth2 bearer token
    /// * `quota_project` - Project billed for the call, if overridden
    /// * `body` - Request payload
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails, the status is not a success,
    /// or the body is not JSON
    pub async fn post_json(
        &self,
        url: &Url,
        token: &str,
        quota_project: Option<&str>,
        body: &Value,
    ) -> ApiResult<Value> {
        let mut request = self.client.post(url.clone()).bearer_auth(token).json(body);
        if let Some(project) = quota_project {
            request = request.header(auth::QUOTA_PROJECT_HEADER, project);
        }

        let response = check_status(request.send().await?).await?;
        let value = response.json::<Value>().await?;
        tracing::debug!("POST {} succeeded", url.path());
        Ok(value)
    }

    /// Fetches raw bytes without authentication
    ///
    /// Download URLs minted by the service carry their own authorization.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the status is not a success
    pub async fn get_bytes(&self, url: &Url) -> ApiResult<Vec<u8>> {
        let response = check_status(self.client.get(url.clone()).send().await?).await?;
        let bytes = response.bytes().await?;
        tracing::debug!("GET {} returned {} bytes", url.path(), bytes.len());
        Ok(bytes.to_vec())
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Maps non-success responses to `ApiError`, keeping a bounded body excerpt
async fn check_status(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = truncate_body(response.text().await.unwrap_or_default());
    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!("Rate limited by server (429)");
        Err(ApiError::RateLimited { body })
    } else {
        tracing::debug!("Request failed with HTTP {}", status.as_u16());
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn truncate_body(mut body: String) -> String {
    if body.len() > http::ERROR_BODY_LIMIT {
        let mut end = http::ERROR_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::config::ClientConfig;

    #[test]
    fn test_http_handler_creation() {
        let client = ClientConfig::default().build_http_client().unwrap();
        let handler = HttpHandler::new(client);
        let _ = handler.client();
    }

    #[test]
    fn test_error_body_is_truncated() {
        let short = truncate_body("quota exceeded".to_string());
        assert_eq!(short, "quota exceeded");

        let long = truncate_body("x".repeat(http::ERROR_BODY_LIMIT * 2));
        assert_eq!(long.len(), http::ERROR_BODY_LIMIT + 3);
        assert!(long.ends_with("..."));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let body = "é".repeat(http::ERROR_BODY_LIMIT);
        let truncated = truncate_body(body);
        assert!(truncated.len() <= http::ERROR_BODY_LIMIT + 3);
        assert!(truncated.ends_with("..."));
    }
}
