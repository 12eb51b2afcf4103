//! Patch downloads
//!
//! One patch is fetched in a single attempt as:
//! 1. a square region of `patch_size * scale` meters around the point,
//! 2. the image clipped to that region and resampled to `patch_size` pixels,
//! 3. a thumbnails call minting an NPY download URL,
//! 4. an unauthenticated GET of that URL,
//! 5. NPY decoding and a shape check.
//!
//! Whole attempts are repeated under the session's [`RetryPolicy`], so a 429
//! from either remote call starts over from step 3.

use crate::app::expr::{Geometry, Image};
use crate::app::models::{Patch, PatchRequest};
use crate::app::npy;
use crate::app::retry::RetryPolicy;
use crate::constants::imagery;
use crate::errors::{NpyError, PatchResult};

use super::Session;

/// Fetches patches through a session
#[derive(Debug)]
pub struct PatchFetcher<'a> {
    session: &'a Session,
    policy: &'a RetryPolicy,
}

impl<'a> PatchFetcher<'a> {
    pub fn new(session: &'a Session, policy: &'a RetryPolicy) -> Self {
        Self { session, policy }
    }

    /// Fetches one square patch of `image` centered on the requested point
    ///
    /// # Returns
    ///
    /// A patch shaped `(patch_size, patch_size, bands)` with band names in
    /// image order
    ///
    /// # Errors
    ///
    /// Returns `PatchError` if:
    /// - A call fails with anything other than HTTP 429
    /// - HTTP 429 persists past the retry deadline (`DeadlineExceeded`)
    /// - The payload cannot be decoded or has the wrong spatial shape
    pub async fn fetch(&self, image: &Image, request: &PatchRequest) -> PatchResult<Patch> {
        let region = Geometry::square_around(
            request.lonlat,
            request.side_meters(),
            imagery::GEOMETRY_MAX_ERROR_M,
        );
        let windowed = image.clip_to_bounds_and_scale(&region, request.patch_size, request.patch_size);

        tracing::debug!(
            "Fetching {}x{} patch at {} ({} m/px)",
            request.patch_size,
            request.patch_size,
            request.lonlat,
            request.scale
        );

        let patch = self
            .policy
            .run(|attempt| self.fetch_once(&windowed, request, attempt))
            .await?;

        tracing::info!(
            "Fetched patch at {} with shape {:?}",
            request.lonlat,
            patch.shape()
        );
        Ok(patch)
    }

    async fn fetch_once(
        &self,
        windowed: &Image,
        request: &PatchRequest,
        attempt: u32,
    ) -> PatchResult<Patch> {
        if attempt > 1 {
            tracing::debug!("Patch attempt {} at {}", attempt, request.lonlat);
        }

        let url = self.session.download_url(windowed).await?;
        let payload = self.session.download(&url).await?;
        let patch = npy::decode_patch(&payload)?;
        check_shape(&patch, request.patch_size)?;
        Ok(patch)
    }
}

fn check_shape(patch: &Patch, patch_size: u32) -> Result<(), NpyError> {
    let (rows, cols, bands) = patch.shape();
    let side = patch_size as usize;
    if rows == side && cols == side {
        Ok(())
    } else {
        Err(NpyError::ShapeMismatch {
            expected: format!("({}, {}, _)", side, side),
            actual: vec![rows, cols, bands],
        })
    }
}
