//! Core application logic for the land-cover fetcher
//!
//! This module contains the Earth Engine session and patch fetcher, the
//! expression graph used to describe server-side images, the image builders,
//! and the NPY codec for downloaded pixels.
//!
//! # Examples
//!
//! ```rust,no_run
//! use landcover_fetcher::app::{get_input_patch, LonLat, Session, SessionConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::initialize(&SessionConfig::default()).await?;
//!
//! let lonlat = LonLat::new(-122.27, 37.80)?;
//! let patch = get_input_patch(&session, 2020, lonlat, 32).await?;
//! println!("Fetched patch with shape {:?}", patch.dim());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod expr;
pub mod imagery;
pub mod models;
pub mod npy;
pub mod retry;

// Re-export main public API
pub use client::{ClientConfig, PatchFetcher, Session, SessionConfig};
pub use imagery::{
    county_input_image, get_county_input_patch, get_input_patch, get_label_patch,
    get_training_pair, input_image, label_image, TrainingPair,
};
pub use models::{CountyComposite, ImageDescriptor, LonLat, Patch, PatchRequest};
pub use npy::decode_patch;
pub use retry::{RetryConfigToml, RetryPolicy};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        let config = SessionConfig::default();
        assert!(config.client.tcp_nodelay);
        assert_eq!(label_image().name(), "landcover_2020");
    }
}
