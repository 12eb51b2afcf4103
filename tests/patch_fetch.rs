//! Patch fetching against a stub Earth Engine service

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use landcover_fetcher::app::{
    get_input_patch, get_label_patch, get_training_pair, input_image, label_image, LonLat,
    PatchRequest,
};
use landcover_fetcher::errors::{ApiError, NpyError, PatchError};

use common::{
    fast_retry, Behavior, StubServer, StubState, LABEL_VALUE, SENTINEL2_BANDS, SPECTRAL_VALUE,
};

fn oakland() -> LonLat {
    LonLat::new(-122.27, 37.80).unwrap()
}

#[tokio::test]
async fn test_input_patch_end_to_end() {
    let server = StubServer::start(StubState::default()).await;
    let session = server.session(fast_retry(Duration::from_secs(5)));

    let patch = get_input_patch(&session, 2020, oakland(), 32).await.unwrap();

    assert_eq!(patch.dim(), (32, 32, 13));
    assert!(patch.iter().all(|&v| v == f64::from(SPECTRAL_VALUE)));
    assert_eq!(server.state.thumbnail_calls(), 1);
    assert_eq!(server.state.pixel_calls(), 1);
    assert_eq!(server.state.unauthorized_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_thumbnail_request_shape() {
    let server = StubServer::start(StubState::default()).await;
    let session = server.session(fast_retry(Duration::from_secs(5)));

    get_input_patch(&session, 2020, oakland(), 16).await.unwrap();

    let body = server.state.last_thumbnail_body().unwrap();
    assert_eq!(body["fileFormat"], "NPY");

    let root = &body["expression"]["values"]["0"]["functionInvocationValue"];
    assert_eq!(root["functionName"], "Image.clipToBoundsAndScale");
    assert_eq!(root["arguments"]["width"]["constantValue"], 16);
    assert_eq!(root["arguments"]["height"]["constantValue"], 16);

    // Square region: point buffered by half the side (16 px * 100 m / 2), then bounds
    let bounds = &root["arguments"]["geometry"]["functionInvocationValue"];
    assert_eq!(bounds["functionName"], "Geometry.bounds");
    let buffer = &bounds["arguments"]["geometry"]["functionInvocationValue"];
    assert_eq!(buffer["functionName"], "Geometry.buffer");
    assert_eq!(buffer["arguments"]["distance"]["constantValue"], 800.0);
}

#[tokio::test]
async fn test_download_is_not_authenticated() {
    let server = StubServer::start(StubState::default()).await;
    let session = server.session(fast_retry(Duration::from_secs(5)));

    get_label_patch(&session, oakland(), 8).await.unwrap();

    assert_eq!(
        server
            .state
            .authorized_downloads
            .load(Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn test_label_patch() {
    let server = StubServer::start(StubState::default()).await;
    let session = server.session(fast_retry(Duration::from_secs(5)));

    let patch = get_label_patch(&session, oakland(), 16).await.unwrap();

    assert_eq!(patch.dim(), (16, 16, 1));
    assert!(patch.iter().all(|&v| v == f64::from(LABEL_VALUE)));
}

#[tokio::test]
async fn test_band_names_follow_payload_fields() {
    let server = StubServer::start(StubState::default()).await;
    let session = server.session(fast_retry(Duration::from_secs(5)));
    let request = PatchRequest::new(oakland(), 4, 10.0).unwrap();
    let descriptor = input_image(2021);

    let patch = session.get_patch(descriptor.image(), &request).await.unwrap();

    let names: Vec<&str> = patch.bands().iter().map(String::as_str).collect();
    assert_eq!(names, SENTINEL2_BANDS.to_vec());
    assert!(patch.band("B8A").is_some());
}

#[tokio::test]
async fn test_rate_limited_downloads_are_retried() {
    let server = StubServer::start(StubState {
        pixels: Behavior::RateLimitFirst(3),
        ..Default::default()
    })
    .await;
    let session = server.session(fast_retry(Duration::from_secs(5)));

    let patch = get_input_patch(&session, 2020, oakland(), 8).await.unwrap();

    assert_eq!(patch.dim(), (8, 8, 13));
    assert_eq!(server.state.pixel_calls(), 4);
    // Each attempt mints a fresh download URL
    assert_eq!(server.state.thumbnail_calls(), 4);
}

#[tokio::test]
async fn test_rate_limited_thumbnails_are_retried() {
    let server = StubServer::start(StubState {
        thumbnails: Behavior::RateLimitFirst(2),
        ..Default::default()
    })
    .await;
    let session = server.session(fast_retry(Duration::from_secs(5)));

    let patch = get_label_patch(&session, oakland(), 8).await.unwrap();

    assert_eq!(patch.dim(), (8, 8, 1));
    assert_eq!(server.state.thumbnail_calls(), 3);
    assert_eq!(server.state.pixel_calls(), 1);
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = StubServer::start(StubState {
        pixels: Behavior::Fail(500),
        ..Default::default()
    })
    .await;
    let session = server.session(fast_retry(Duration::from_secs(5)));

    let result = get_input_patch(&session, 2020, oakland(), 8).await;

    match result {
        Err(PatchError::Api(ApiError::Status { status, body })) => {
            assert_eq!(status, 500);
            assert!(body.contains("Internal error"));
        }
        other => panic!("Expected HTTP 500 error, got {:?}", other),
    }
    assert_eq!(server.state.pixel_calls(), 1);
}

#[tokio::test]
async fn test_persistent_rate_limit_hits_deadline() {
    let server = StubServer::start(StubState {
        pixels: Behavior::AlwaysRateLimit,
        ..Default::default()
    })
    .await;
    let session = server.session(fast_retry(Duration::from_millis(200)));

    let result = get_input_patch(&session, 2020, oakland(), 8).await;

    match result {
        Err(PatchError::DeadlineExceeded { attempts, last, .. }) => {
            assert!(attempts > 1);
            assert_eq!(attempts, server.state.pixel_calls());
            assert!(last.is_rate_limited());
        }
        other => panic!("Expected DeadlineExceeded, got {:?}", other),
    }
}

#[tokio::test]
async fn test_wrong_patch_shape_is_rejected() {
    let server = StubServer::start(StubState {
        side_override: Some(4),
        ..Default::default()
    })
    .await;
    let session = server.session(fast_retry(Duration::from_secs(5)));

    let result = get_label_patch(&session, oakland(), 8).await;

    assert!(matches!(
        result,
        Err(PatchError::Decode(NpyError::ShapeMismatch { .. }))
    ));
    assert_eq!(server.state.pixel_calls(), 1);
}

#[tokio::test]
async fn test_training_pair() {
    let server = StubServer::start(StubState::default()).await;
    let session = server.session(fast_retry(Duration::from_secs(5)));

    let pair = get_training_pair(&session, oakland(), 16).await.unwrap();

    assert_eq!(pair.inputs.dim(), (16, 16, 13));
    assert_eq!(pair.labels.dim(), (16, 16, 1));
    assert_eq!(server.state.thumbnail_calls(), 2);
    assert_eq!(label_image().name(), "landcover_2020");
}
