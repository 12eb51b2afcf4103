//! Image composition and patch accessors
//!
//! The builders in this module only assemble server-side query graphs; no
//! pixels are touched until a patch is fetched. The accessors pair a builder
//! with the patch fetcher at the session's pixel scale.

use ndarray::Array3;

use crate::app::client::Session;
use crate::app::expr::{CalendarField, FeatureCollection, Filter, Image, ImageCollection};
use crate::app::models::{CountyComposite, ImageDescriptor, LonLat, PatchRequest};
use crate::constants::{earthengine, imagery};
use crate::errors::{ApiError, ComposeError, ComposeResult, PatchResult, Result};

/// Masks cloudy and cirrus pixels using the Sentinel-2 quality band
pub fn mask_sentinel2_clouds(image: Image) -> Image {
    let bit_mask = (1_i64 << imagery::CLOUD_BIT) | (1_i64 << imagery::CIRRUS_CLOUD_BIT);
    let clear = image
        .select(&[imagery::QA_BAND])
        .bitwise_and(bit_mask)
        .equals(0);
    image.update_mask(&clear)
}

/// Boundary features of a county by name
pub fn county_boundary(county: &str) -> FeatureCollection {
    FeatureCollection::load(earthengine::COUNTIES)
        .filter(&Filter::equals(imagery::COUNTY_NAME_PROPERTY, county))
}

/// Cropland rasters for one year, 1 where `crop` is grown and masked elsewhere
pub fn cropland_mask(county: &FeatureCollection, crop: i64, year: u32) -> ImageCollection {
    ImageCollection::load(earthengine::CROPLAND)
        .filter_bounds(county)
        .select(&[imagery::CROPLAND_BAND])
        .filter(&Filter::calendar_range(year, year, CalendarField::Year))
        .map(|image| {
            let selected = image.remap(&[crop], &[1], Some(0));
            image.update_mask(&selected)
        })
        .map(|image| image.clip_to_collection(county).to_float())
}

/// Two-month Sentinel-2 median composite restricted to one crop in one county
///
/// # Errors
///
/// Returns `ComposeError::InvalidMonth` before any network call if the window
/// does not fit in the year, `ComposeError::NoMatchingData` if the county has
/// no cropland raster for the year, or `ComposeError::Api` if the size check
/// fails or does not answer with a count
pub async fn county_input_image(
    session: &Session,
    composite: &CountyComposite,
) -> ComposeResult<ImageDescriptor> {
    composite.validate()?;

    let county = county_boundary(&composite.county);
    let cropland = cropland_mask(&county, composite.crop, composite.year);

    let size = session.compute_value(&cropland.size()).await?;
    let image_count = size.as_u64().ok_or_else(|| ApiError::UnexpectedResponse {
        endpoint: "value:compute".to_string(),
        reason: format!("expected a collection size, got {}", size),
    })?;
    if image_count == 0 {
        tracing::warn!(
            "No cropland data for county '{}' in {}",
            composite.county,
            composite.year
        );
        return Err(ComposeError::NoMatchingData {
            dataset: earthengine::CROPLAND.to_string(),
            county: composite.county.clone(),
            year: composite.year,
        });
    }

    let year = composite.year;
    let image = ImageCollection::load(earthengine::SENTINEL2)
        .filter(&Filter::calendar_range(year, year, CalendarField::Year))
        .filter(&Filter::calendar_range(
            composite.month,
            composite.end_month(),
            CalendarField::Month,
        ))
        .filter_bounds(&county)
        .filter(&Filter::less_than(
            imagery::CLOUD_PROPERTY,
            imagery::COUNTY_MAX_CLOUD_PERCENT,
        ))
        .map(mask_sentinel2_clouds)
        .select(&[imagery::SPECTRAL_BANDS])
        .median()
        .unmask(imagery::SPECTRAL_FILL_VALUE)
        .update_mask(&cropland.first().equals(1))
        .to_float()
        .clip(&county.geometry());

    tracing::debug!("Composed county input image {}", composite.image_name());
    Ok(ImageDescriptor::new(image, composite.image_name()))
}

/// Year-long Sentinel-2 median composite, gaps filled
pub fn input_image(year: u32) -> ImageDescriptor {
    let image = ImageCollection::load(earthengine::SENTINEL2)
        .filter(&Filter::calendar_range(year, year, CalendarField::Year))
        .filter(&Filter::less_than(
            imagery::CLOUD_PROPERTY,
            imagery::YEARLY_MAX_CLOUD_PERCENT,
        ))
        .map(mask_sentinel2_clouds)
        .select(&[imagery::SPECTRAL_BANDS])
        .median()
        .unmask(imagery::SPECTRAL_FILL_VALUE)
        .to_float();
    ImageDescriptor::new(image, format!("sentinel2_{}", year))
}

/// 2020 land-cover labels as a single `landcover` byte band
pub fn label_image() -> ImageDescriptor {
    let image = Image::load(earthengine::WORLDCOVER_2020)
        .select(&[imagery::LABEL_SOURCE_BAND])
        .remap(&imagery::LABEL_FROM, &imagery::LABEL_TO, None)
        .rename(&[imagery::LABEL_BAND])
        .unmask(0.0)
        .to_byte();
    ImageDescriptor::new(image, format!("{}_{}", imagery::LABEL_BAND, imagery::LABEL_YEAR))
}

/// Input and label patches for the same location
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPair {
    pub inputs: Array3<f64>,
    pub labels: Array3<f64>,
}

async fn fetch_array(
    session: &Session,
    descriptor: &ImageDescriptor,
    lonlat: LonLat,
    patch_size: u32,
) -> PatchResult<Array3<f64>> {
    let request = PatchRequest::new(lonlat, patch_size, session.scale())?;
    tracing::debug!("Fetching patch of {} at {}", descriptor.name(), lonlat);
    let patch = session.get_patch(descriptor.image(), &request).await?;
    Ok(patch.into_array())
}

/// Spectral patch of the yearly composite around a point
///
/// # Errors
///
/// Returns `PatchError` if the request is invalid or the fetch fails
pub async fn get_input_patch(
    session: &Session,
    year: u32,
    lonlat: LonLat,
    patch_size: u32,
) -> PatchResult<Array3<f64>> {
    fetch_array(session, &input_image(year), lonlat, patch_size).await
}

/// Label patch around a point, shaped `(patch_size, patch_size, 1)`
///
/// # Errors
///
/// Returns `PatchError` if the request is invalid or the fetch fails
pub async fn get_label_patch(
    session: &Session,
    lonlat: LonLat,
    patch_size: u32,
) -> PatchResult<Array3<f64>> {
    fetch_array(session, &label_image(), lonlat, patch_size).await
}

/// Spectral patch of a county cropland composite around a point
///
/// # Errors
///
/// Returns `AppError::Compose` if the composite cannot be built, or
/// `AppError::Patch` if the fetch fails
pub async fn get_county_input_patch(
    session: &Session,
    composite: &CountyComposite,
    lonlat: LonLat,
    patch_size: u32,
) -> Result<Array3<f64>> {
    let descriptor = county_input_image(session, composite).await?;
    Ok(fetch_array(session, &descriptor, lonlat, patch_size).await?)
}

/// 2020 inputs and labels for the same location, fetched concurrently
///
/// # Errors
///
/// Returns `PatchError` if either fetch fails
pub async fn get_training_pair(
    session: &Session,
    lonlat: LonLat,
    patch_size: u32,
) -> PatchResult<TrainingPair> {
    let (inputs, labels) = futures::try_join!(
        get_input_patch(session, imagery::LABEL_YEAR, lonlat, patch_size),
        get_label_patch(session, lonlat, patch_size),
    )?;
    Ok(TrainingPair { inputs, labels })
}
