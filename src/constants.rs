//! Application constants for the land-cover fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names for authentication and project selection
pub mod env {
    /// Static bearer token, takes precedence over every other credential source
    pub const ACCESS_TOKEN: &str = "EE_ACCESS_TOKEN";

    /// Path to an application default credentials JSON file
    pub const APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

    /// Cloud project used for Earth Engine requests
    pub const CLOUD_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";

    /// Legacy project variable honoured by the gcloud tooling
    pub const GCLOUD_PROJECT: &str = "GCLOUD_PROJECT";

    /// Overrides the metadata server host (set on GCE and in emulators)
    pub const METADATA_HOST: &str = "GCE_METADATA_HOST";

    /// Overrides the gcloud configuration directory
    pub const CLOUDSDK_CONFIG: &str = "CLOUDSDK_CONFIG";

    /// Overrides the active gcloud configuration name
    pub const CLOUDSDK_ACTIVE_CONFIG: &str = "CLOUDSDK_ACTIVE_CONFIG_NAME";

    /// Overrides the project of the active gcloud configuration
    pub const CLOUDSDK_PROJECT: &str = "CLOUDSDK_CORE_PROJECT";
}

/// Credential and OAuth2 constants
pub mod auth {
    use super::Duration;

    /// OAuth2 scopes requested for Earth Engine access
    pub const SCOPES: [&str; 2] = [
        "https://www.googleapis.com/auth/cloud-platform",
        "https://www.googleapis.com/auth/earthengine",
    ];

    /// OAuth2 token endpoint, used when a credential file names none
    pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

    /// Grant type for signed service account assertions
    pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

    /// Lifetime of a service account assertion (the maximum Google accepts)
    pub const ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);

    /// Default metadata server host
    pub const METADATA_HOST: &str = "metadata.google.internal";

    /// Header required by the metadata server
    pub const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");

    /// Header carrying the quota (billing) project override
    pub const QUOTA_PROJECT_HEADER: &str = "x-goog-user-project";

    /// gcloud directory under the user config dir
    pub const GCLOUD_DIR: &str = "gcloud";

    /// Application default credentials file inside the gcloud directory
    pub const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

    /// File naming the active gcloud configuration
    pub const ACTIVE_CONFIG_FILE: &str = "active_config";

    /// Directory of named gcloud configurations
    pub const CONFIGURATIONS_DIR: &str = "configurations";

    /// Configuration used when none is marked active
    pub const DEFAULT_CONFIGURATION: &str = "default";

    /// Refresh tokens this long before they actually expire
    pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

    /// Timeout for the metadata server reachability check
    pub const METADATA_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
}

/// Earth Engine service endpoints and dataset identifiers
pub mod earthengine {
    /// High-volume endpoint, intended for many small automated requests
    pub const HIGH_VOLUME_URL: &str = "https://earthengine-highvolume.googleapis.com";

    /// REST API version segment
    pub const API_VERSION: &str = "v1";

    /// County boundaries
    pub const COUNTIES: &str = "TIGER/2018/Counties";

    /// USDA cropland data layer
    pub const CROPLAND: &str = "USDA/NASS/CDL";

    /// Harmonized Sentinel-2 level-1C collection
    pub const SENTINEL2: &str = "COPERNICUS/S2_HARMONIZED";

    /// ESA WorldCover 2020 land-cover map
    pub const WORLDCOVER_2020: &str = "ESA/WorldCover/v100/2020";
}

/// Imagery composition constants
pub mod imagery {
    /// Default ground distance of one pixel, in meters
    pub const DEFAULT_SCALE_M: f64 = 100.0;

    /// Sentinel-2 quality band
    pub const QA_BAND: &str = "QA60";

    /// Opaque cloud bit of the quality band
    pub const CLOUD_BIT: u32 = 10;

    /// Cirrus cloud bit of the quality band
    pub const CIRRUS_CLOUD_BIT: u32 = 11;

    /// Band selector for the Sentinel-2 spectral bands
    pub const SPECTRAL_BANDS: &str = "B.*";

    /// Fill value for masked spectral pixels, close to the global mean
    pub const SPECTRAL_FILL_VALUE: f64 = 1000.0;

    /// Scene cloud threshold for the county two-month composite
    pub const COUNTY_MAX_CLOUD_PERCENT: f64 = 30.0;

    /// Scene cloud threshold for the full-year composite
    pub const YEARLY_MAX_CLOUD_PERCENT: f64 = 20.0;

    /// Scene metadata property holding the cloud percentage
    pub const CLOUD_PROPERTY: &str = "CLOUDY_PIXEL_PERCENTAGE";

    /// County name property
    pub const COUNTY_NAME_PROPERTY: &str = "NAME";

    /// Cropland band of the cropland data layer
    pub const CROPLAND_BAND: &str = "cropland";

    /// The only year for which labels exist
    pub const LABEL_YEAR: u32 = 2020;

    /// WorldCover classification band
    pub const LABEL_SOURCE_BAND: &str = "Map";

    /// Name of the remapped label band
    pub const LABEL_BAND: &str = "landcover";

    /// WorldCover class codes
    pub const LABEL_FROM: [i64; 11] = [10, 20, 30, 40, 50, 60, 70, 80, 90, 95, 100];

    /// Land-cover class indices matching `LABEL_FROM`
    pub const LABEL_TO: [i64; 11] = [1, 5, 2, 4, 6, 7, 8, 0, 3, 3, 7];

    /// Geometry error margin in meters for buffer and bounds
    pub const GEOMETRY_MAX_ERROR_M: f64 = 1.0;

    /// Latest month a two-month window can start at
    pub const LAST_WINDOW_MONTH: u32 = 11;
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "landcover-fetcher/0.1.0";

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;

    /// Longest response body excerpt kept in error messages
    pub const ERROR_BODY_LIMIT: usize = 512;
}

/// Retry policy defaults for patch downloads
pub mod retry {
    use super::Duration;

    /// Wall-clock budget for one patch request, across all attempts
    pub const DEADLINE: Duration = Duration::from_secs(10 * 60);

    /// First backoff delay
    pub const INITIAL_INTERVAL: Duration = Duration::from_secs(1);

    /// Longest single backoff delay
    pub const MAX_INTERVAL: Duration = Duration::from_secs(60);

    /// Growth factor between delays
    pub const MULTIPLIER: f64 = 2.0;

    /// Jitter applied to each delay (0.0-1.0)
    pub const RANDOMIZATION_FACTOR: f64 = 0.5;
}

/// File and configuration locations
pub mod files {
    /// Project-local configuration file name
    pub const LOCAL_CONFIG_FILE: &str = "landcover-fetcher.toml";

    /// Directory under the user config dir
    pub const CONFIG_DIR_NAME: &str = "landcover-fetcher";

    /// Configuration file name under `CONFIG_DIR_NAME`
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}

pub use auth::SCOPES;
pub use http::USER_AGENT;
pub use imagery::{DEFAULT_SCALE_M, LABEL_YEAR};
pub use retry::DEADLINE as DEFAULT_RETRY_DEADLINE;
