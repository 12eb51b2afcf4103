//! In-process stub of the Earth Engine REST endpoints used by the fetcher

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};

use landcover_fetcher::app::{RetryPolicy, Session, SessionConfig};
use landcover_fetcher::auth::Credentials;
use landcover_fetcher::constants::SCOPES;

pub const TOKEN: &str = "test-token";
pub const PROJECT: &str = "stub-project";

/// Sentinel-2 band names in catalog order
pub const SENTINEL2_BANDS: [&str; 13] = [
    "B1", "B2", "B3", "B4", "B5", "B6", "B7", "B8", "B8A", "B9", "B10", "B11", "B12",
];

/// Value written to every spectral pixel
pub const SPECTRAL_VALUE: f32 = 1234.5;

/// Value written to every label pixel
pub const LABEL_VALUE: u8 = 3;

/// How the stub answers one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Answer normally
    Ok,
    /// Answer 429 this many times, then normally
    RateLimitFirst(u32),
    /// Always answer 429
    AlwaysRateLimit,
    /// Always answer with this status
    Fail(u16),
}

/// Configuration and request counters of the stub
#[derive(Debug)]
pub struct StubState {
    pub thumbnails: Behavior,
    pub pixels: Behavior,
    /// Result of `value:compute`
    pub compute_result: Value,
    /// Side length served instead of the requested one
    pub side_override: Option<usize>,
    pub thumbnail_calls: AtomicU32,
    pub pixel_calls: AtomicU32,
    pub compute_calls: AtomicU32,
    pub unauthorized_calls: AtomicU32,
    pub authorized_downloads: AtomicU32,
    pub last_thumbnail_body: Mutex<Option<Value>>,
    pub last_compute_body: Mutex<Option<Value>>,
    /// Thumbnail request bodies by minted name
    pub thumbnails_by_name: Mutex<HashMap<String, Value>>,
}

impl Default for StubState {
    fn default() -> Self {
        Self {
            thumbnails: Behavior::Ok,
            pixels: Behavior::Ok,
            compute_result: json!(1),
            side_override: None,
            thumbnail_calls: AtomicU32::new(0),
            pixel_calls: AtomicU32::new(0),
            compute_calls: AtomicU32::new(0),
            unauthorized_calls: AtomicU32::new(0),
            authorized_downloads: AtomicU32::new(0),
            last_thumbnail_body: Mutex::new(None),
            last_compute_body: Mutex::new(None),
            thumbnails_by_name: Mutex::new(HashMap::new()),
        }
    }
}

impl StubState {
    pub fn thumbnail_calls(&self) -> u32 {
        self.thumbnail_calls.load(Ordering::SeqCst)
    }

    pub fn pixel_calls(&self) -> u32 {
        self.pixel_calls.load(Ordering::SeqCst)
    }

    pub fn compute_calls(&self) -> u32 {
        self.compute_calls.load(Ordering::SeqCst)
    }

    pub fn last_thumbnail_body(&self) -> Option<Value> {
        self.last_thumbnail_body.lock().unwrap().clone()
    }
}

/// A running stub server
pub struct StubServer {
    pub addr: SocketAddr,
    pub state: Arc<StubState>,
}

impl StubServer {
    pub async fn start(state: StubState) -> Self {
        let state = Arc::new(state);
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Session against this stub with a static token
    pub fn session(&self, retry: RetryPolicy) -> Session {
        let config = SessionConfig {
            retry,
            ..SessionConfig::with_base_url(self.base_url())
        };
        Session::with_credentials(
            &config,
            Credentials::from_access_token(TOKEN, &SCOPES),
            PROJECT,
        )
        .unwrap()
    }
}

/// Retry policy with millisecond delays
pub fn fast_retry(deadline: Duration) -> RetryPolicy {
    RetryPolicy {
        deadline,
        initial_interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(20),
        ..RetryPolicy::default()
    }
}

async fn handle(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(format!("Bearer {}", TOKEN).as_str());

    if method == Method::POST {
        if !authorized {
            state.unauthorized_calls.fetch_add(1, Ordering::SeqCst);
            return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
        }
        let body: Value = match serde_json::from_slice(&body) {
            Ok(body) => body,
            Err(_) => return (StatusCode::BAD_REQUEST, "invalid JSON").into_response(),
        };

        if path == format!("/v1/projects/{}/thumbnails", PROJECT) {
            let call = state.thumbnail_calls.fetch_add(1, Ordering::SeqCst) + 1;
            *state.last_thumbnail_body.lock().unwrap() = Some(body.clone());
            if let Some(response) = misbehave(state.thumbnails, call) {
                return response;
            }
            let name = format!("projects/{}/thumbnails/thumb-{}", PROJECT, call);
            state
                .thumbnails_by_name
                .lock()
                .unwrap()
                .insert(name.clone(), body);
            return Json(json!({ "name": name })).into_response();
        }

        if path == format!("/v1/projects/{}/value:compute", PROJECT) {
            state.compute_calls.fetch_add(1, Ordering::SeqCst);
            *state.last_compute_body.lock().unwrap() = Some(body);
            return Json(json!({ "result": state.compute_result })).into_response();
        }
    }

    if method == Method::GET && path.ends_with(":getPixels") {
        let call = state.pixel_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if authorized {
            state.authorized_downloads.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(response) = misbehave(state.pixels, call) {
            return response;
        }
        let name = path
            .trim_start_matches("/v1/")
            .trim_end_matches(":getPixels");
        let request = state.thumbnails_by_name.lock().unwrap().get(name).cloned();
        let Some(request) = request else {
            return (StatusCode::NOT_FOUND, "unknown thumbnail").into_response();
        };
        return npy_response(&state, &request);
    }

    (StatusCode::NOT_FOUND, format!("no route for {} {}", method, path)).into_response()
}

fn misbehave(behavior: Behavior, call: u32) -> Option<Response> {
    let rate_limited = || {
        (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many concurrent aggregations.",
        )
            .into_response()
    };
    match behavior {
        Behavior::Ok => None,
        Behavior::RateLimitFirst(n) if call <= n => Some(rate_limited()),
        Behavior::RateLimitFirst(_) => None,
        Behavior::AlwaysRateLimit => Some(rate_limited()),
        Behavior::Fail(status) => Some(
            (
                StatusCode::from_u16(status).unwrap(),
                "Internal error",
            )
                .into_response(),
        ),
    }
}

/// Encodes a structured array like the service does for `fileFormat: NPY`
fn npy_response(state: &StubState, request: &Value) -> Response {
    let root = &request["expression"]["values"]["0"]["functionInvocationValue"];
    let requested = root["arguments"]["width"]["constantValue"]
        .as_u64()
        .unwrap_or(0) as usize;
    let side = state.side_override.unwrap_or(requested);
    let is_label = request.to_string().contains("ESA/WorldCover");

    let payload = if is_label {
        structured_npy(&[("landcover", "|u1")], side, |_| vec![LABEL_VALUE])
    } else {
        let fields: Vec<(&str, &str)> = SENTINEL2_BANDS.iter().map(|band| (*band, "<f4")).collect();
        structured_npy(&fields, side, |_| SPECTRAL_VALUE.to_le_bytes().to_vec())
    };

    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        payload,
    )
        .into_response()
}

/// Builds a version 1.0 structured `.npy` payload of `side` x `side` records
///
/// `field_bytes(i)` returns the bytes of field `i` in every record.
fn structured_npy(
    fields: &[(&str, &str)],
    side: usize,
    field_bytes: impl Fn(usize) -> Vec<u8>,
) -> Vec<u8> {
    let descr: Vec<String> = fields
        .iter()
        .map(|(name, dtype)| format!("('{}', '{}')", name, dtype))
        .collect();
    let dict = format!(
        "{{'descr': [{}], 'fortran_order': False, 'shape': ({}, {}), }}",
        descr.join(", "),
        side,
        side
    );
    let unpadded = 10 + dict.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    let header = format!("{}{}\n", dict, " ".repeat(padding));

    let mut record = Vec::new();
    for index in 0..fields.len() {
        record.extend(field_bytes(index));
    }

    let mut payload = b"\x93NUMPY\x01\x00".to_vec();
    payload.extend((header.len() as u16).to_le_bytes());
    payload.extend(header.as_bytes());
    for _ in 0..side * side {
        payload.extend(&record);
    }
    payload
}
