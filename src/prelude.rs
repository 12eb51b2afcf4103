//! Prelude module for the land-cover fetcher library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use landcover_fetcher::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use landcover_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::initialize(&SessionConfig::default()).await?;
//!     let lonlat = LonLat::new(-122.27, 37.80)?;
//!     let pair = get_training_pair(&session, lonlat, 64).await?;
//!     println!("{:?} / {:?}", pair.inputs.dim(), pair.labels.dim());
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Session, requests and decoded data
pub use crate::app::{
    county_input_image, get_county_input_patch, get_input_patch, get_label_patch,
    get_training_pair, input_image, label_image, ClientConfig, CountyComposite,
    ImageDescriptor, LonLat, Patch, PatchRequest, RetryPolicy, Session, SessionConfig,
    TrainingPair,
};

// Authentication
pub use crate::auth::{get_auth_status, AuthStatus, Credentials};

// Commonly used constants
pub use crate::constants::{DEFAULT_RETRY_DEADLINE, DEFAULT_SCALE_M, LABEL_YEAR, USER_AGENT};

pub use ndarray::Array3;
