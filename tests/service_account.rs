//! Service account token exchange against a stub OAuth2 endpoint

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::post;
use axum::{Form, Json, Router};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{json, Value};

use landcover_fetcher::auth::{Credentials, TokenProvider};
use landcover_fetcher::constants::SCOPES;

const PRIVATE_KEY: &str = include_str!("fixtures/service_account_key.pem");
const PUBLIC_KEY: &str = include_str!("fixtures/service_account_key.pub.pem");
const CLIENT_EMAIL: &str = "fetcher@sa-project.iam.gserviceaccount.com";

#[derive(Default)]
struct TokenEndpoint {
    calls: AtomicU32,
    last_form: Mutex<Option<HashMap<String, String>>>,
}

async fn issue_token(
    State(endpoint): State<Arc<TokenEndpoint>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    endpoint.calls.fetch_add(1, Ordering::SeqCst);
    *endpoint.last_form.lock().unwrap() = Some(form);
    Json(json!({ "access_token": "sa-token", "expires_in": 3600, "token_type": "Bearer" }))
}

async fn start_token_endpoint() -> (String, Arc<TokenEndpoint>) {
    let endpoint = Arc::new(TokenEndpoint::default());
    let app = Router::new()
        .route("/token", post(issue_token))
        .with_state(endpoint.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/token", addr), endpoint)
}

#[tokio::test]
async fn test_service_account_key_file_mints_token() {
    let (token_uri, endpoint) = start_token_endpoint().await;
    let temp_dir = tempfile::TempDir::new().unwrap();
    let key_path = temp_dir.path().join("service-account.json");
    let key_file = json!({
        "type": "service_account",
        "project_id": "sa-project",
        "private_key_id": "key-1",
        "private_key": PRIVATE_KEY,
        "client_email": CLIENT_EMAIL,
        "token_uri": token_uri,
    });
    std::fs::write(&key_path, key_file.to_string()).unwrap();

    let credentials = Credentials::from_file(&key_path, &SCOPES).unwrap();
    assert_eq!(credentials.project_id(), Some("sa-project"));

    let provider = TokenProvider::new(credentials);
    let client = reqwest::Client::new();
    assert_eq!(provider.token(&client).await.unwrap(), "sa-token");
    assert_eq!(provider.token(&client).await.unwrap(), "sa-token");
    assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);

    let form = endpoint.last_form.lock().unwrap().clone().unwrap();
    assert_eq!(
        form.get("grant_type").map(String::as_str),
        Some("urn:ietf:params:oauth:grant-type:jwt-bearer")
    );

    let assertion = form.get("assertion").unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[token_uri.as_str()]);
    let claims = jsonwebtoken::decode::<Value>(
        assertion,
        &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
        &validation,
    )
    .unwrap()
    .claims;

    assert_eq!(claims["iss"], CLIENT_EMAIL);
    assert_eq!(claims["scope"], SCOPES.join(" "));
}

#[tokio::test]
async fn test_rejected_assertion_surfaces_status() {
    let app = Router::new().route(
        "/token",
        post(|| async {
            (
                axum::http::StatusCode::BAD_REQUEST,
                r#"{"error": "invalid_grant"}"#,
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let temp_dir = tempfile::TempDir::new().unwrap();
    let key_path = temp_dir.path().join("service-account.json");
    let key_file = json!({
        "type": "service_account",
        "private_key": PRIVATE_KEY,
        "client_email": CLIENT_EMAIL,
        "token_uri": format!("http://{}/token", addr),
    });
    std::fs::write(&key_path, key_file.to_string()).unwrap();

    let provider = TokenProvider::new(Credentials::from_file(&key_path, &SCOPES).unwrap());
    let result = provider.token(&reqwest::Client::new()).await;

    match result {
        Err(landcover_fetcher::errors::AuthError::TokenExchange { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("Expected TokenExchange error, got {:?}", other),
    }
}
