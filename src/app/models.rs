//! Data models for patch requests and decoded patches
//!
//! These types carry caller-supplied parameters to the query builder and the
//! patch fetcher, and carry decoded pixels back. None of them is cached or
//! persisted by the library.

use std::fmt;

use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::app::expr::Image;
use crate::constants::imagery;
use crate::errors::{ComposeError, ComposeResult, PatchError, PatchResult};

/// A (longitude, latitude) pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    lon: f64,
    lat: f64,
}

impl LonLat {
    /// Creates a validated point
    ///
    /// # Errors
    ///
    /// Returns `PatchError::InvalidRequest` if either coordinate is not finite or
    /// lies outside the valid longitude/latitude range
    pub fn new(lon: f64, lat: f64) -> PatchResult<Self> {
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(PatchError::InvalidRequest {
                reason: format!("longitude {} outside [-180, 180]", lon),
            });
        }
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(PatchError::InvalidRequest {
                reason: format!("latitude {} outside [-90, 90]", lat),
            });
        }
        Ok(Self { lon, lat })
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }
}

impl TryFrom<(f64, f64)> for LonLat {
    type Error = PatchError;

    fn try_from((lon, lat): (f64, f64)) -> PatchResult<Self> {
        Self::new(lon, lat)
    }
}

impl fmt::Display for LonLat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lon, self.lat)
    }
}

/// One square patch to fetch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchRequest {
    /// Patch center
    pub lonlat: LonLat,
    /// Side length in pixels
    pub patch_size: u32,
    /// Ground distance of one pixel, in meters
    pub scale: f64,
}

impl PatchRequest {
    /// Creates a validated request
    ///
    /// # Errors
    ///
    /// Returns `PatchError::InvalidRequest` for a zero patch size or a
    /// non-positive scale
    pub fn new(lonlat: LonLat, patch_size: u32, scale: f64) -> PatchResult<Self> {
        if patch_size == 0 {
            return Err(PatchError::InvalidRequest {
                reason: "patch size must be greater than 0".to_string(),
            });
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(PatchError::InvalidRequest {
                reason: format!("scale must be a positive number of meters, got {}", scale),
            });
        }
        Ok(Self {
            lonlat,
            patch_size,
            scale,
        })
    }

    /// Side of the requested square region, in meters
    pub fn side_meters(&self) -> f64 {
        self.scale * f64::from(self.patch_size)
    }
}

/// A decoded patch: ordered band names and pixels shaped `(rows, cols, bands)`
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    bands: Vec<String>,
    pixels: Array3<f64>,
}

impl Patch {
    /// Pairs band names with pixels; the band axis must match the names
    pub fn new(bands: Vec<String>, pixels: Array3<f64>) -> Self {
        debug_assert_eq!(bands.len(), pixels.len_of(Axis(2)));
        Self { bands, pixels }
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    /// `(rows, cols, bands)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.pixels.dim()
    }

    /// Plain pixel array, band order preserved
    pub fn pixels(&self) -> &Array3<f64> {
        &self.pixels
    }

    /// Drops band names and keeps the plain array
    pub fn into_array(self) -> Array3<f64> {
        self.pixels
    }

    /// View of a single band by name
    pub fn band(&self, name: &str) -> Option<ArrayView2<'_, f64>> {
        let index = self.bands.iter().position(|band| band == name)?;
        Some(self.pixels.index_axis(Axis(2), index))
    }
}

/// A server-side image plus a human-readable name
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescriptor {
    image: Image,
    name: String,
}

impl ImageDescriptor {
    pub fn new(image: Image, name: impl Into<String>) -> Self {
        Self {
            image,
            name: name.into(),
        }
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Parameters for a county cropland composite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountyComposite {
    /// County name as stored in the boundary table
    pub county: String,
    /// Cropland class code to keep
    pub crop: i64,
    pub year: u32,
    /// First month of the two-month window, 1 to 11
    pub month: u32,
}

impl CountyComposite {
    /// Creates validated composite parameters
    ///
    /// # Errors
    ///
    /// Returns `ComposeError::InvalidMonth` unless `month` is in `[1, 11]`
    pub fn new(county: impl Into<String>, crop: i64, year: u32, month: u32) -> ComposeResult<Self> {
        let composite = Self {
            county: county.into(),
            crop,
            year,
            month,
        };
        composite.validate()?;
        Ok(composite)
    }

    /// Checks the two-month window fits inside the year
    pub fn validate(&self) -> ComposeResult<()> {
        if (1..=imagery::LAST_WINDOW_MONTH).contains(&self.month) {
            Ok(())
        } else {
            Err(ComposeError::InvalidMonth { month: self.month })
        }
    }

    /// Last month of the window
    pub fn end_month(&self) -> u32 {
        self.month + 1
    }

    /// Name such as `Alameda_2020_6-7`
    pub fn image_name(&self) -> String {
        format!(
            "{}_{}_{}-{}",
            self.county,
            self.year,
            self.month,
            self.end_month()
        )
    }
}
