//! Command handlers for the land-cover fetcher CLI
//!
//! This module implements the command handlers that coordinate between
//! CLI arguments and the core application functionality.

use std::path::Path;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use ndarray_npy::WriteNpyExt;

use ndarray::{Array3, Axis};
use tracing::{debug, info};

use crate::app::{
    county_input_image, get_county_input_patch, get_input_patch, get_label_patch, input_image,
    label_image, ImageDescriptor, Session,
};
use crate::auth::get_auth_status;
use crate::cli::{AuthAction, AuthArgs, ComposeAction, ComposeArgs, LocationArgs, PatchAction, PatchArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, NpyError, Result};

/// Handle the auth command
pub async fn handle_auth(args: AuthArgs, config: &AppConfig) -> Result<()> {
    match args.action {
        AuthAction::Status => show_auth_status(config),
        AuthAction::Verify => {
            let session = open_session(config).await?;
            println!("Credentials: {}", session.credentials().source_description());
            println!("Project:     {}", session.project());
            println!("Endpoint:    {}", session.api_base());
            println!("✅ Session initialized successfully");
        }
    }

    Ok(())
}

fn show_auth_status(config: &AppConfig) {
    let status = get_auth_status();

    println!("Earth Engine Authentication Status");
    println!("==================================");
    println!();

    println!(
        "Access token:      {}",
        if status.access_token_set { "Set" } else { "Not set" }
    );

    match &status.credentials_file {
        Some(path) => println!(
            "Credentials file:  {} ({})",
            path.display(),
            if status.credentials_file_exists { "exists" } else { "missing" }
        ),
        None => println!("Credentials file:  Not set"),
    }

    match &status.well_known_file {
        Some(path) => println!(
            "gcloud ADC file:   {} ({})",
            path.display(),
            if status.well_known_file_exists { "exists" } else { "not found" }
        ),
        None => println!("gcloud ADC file:   Unknown location"),
    }

    let project = config.session.project.as_ref().or(status.project.as_ref());
    println!("Project:           {}", project.map_or("Not set", String::as_str));
    println!("Endpoint:          {}", config.session.api_base_url);
    println!();

    println!("Status: {}", status.status_message());
    if status.has_credentials() {
        println!();
        println!("To test the credentials, run: landcover_fetcher auth verify");
    }
}

/// Handle the compose command by printing the image expression
pub async fn handle_compose(args: ComposeArgs, config: &AppConfig) -> Result<()> {
    let descriptor = match args.action {
        ComposeAction::County(county) => {
            let composite = county.to_composite()?;
            let session = open_session(config).await?;
            county_input_image(&session, &composite).await?
        }
        ComposeAction::Input { year } => input_image(year),
        ComposeAction::Label => label_image(),
    };

    print_descriptor(&descriptor)
}

fn print_descriptor(descriptor: &ImageDescriptor) -> Result<()> {
    let expression = descriptor.image().to_expression();
    let rendered = serde_json::to_string_pretty(&expression)
        .map_err(|e| AppError::generic(format!("Failed to render expression: {}", e)))?;

    debug!(
        "Expression for {} has {} bytes",
        descriptor.name(),
        rendered.len()
    );
    println!("# {}", descriptor.name());
    println!("{}", rendered);
    Ok(())
}

/// Handle the patch command
pub async fn handle_patch(args: PatchArgs, config: &AppConfig, quiet: bool) -> Result<()> {
    let start = Instant::now();
    let spinner = fetch_spinner(quiet);
    spinner.set_message("Fetching patch from Earth Engine...");

    let fetched = fetch_patch(args, config).await;
    spinner.finish_and_clear();
    let (pixels, location) = fetched?;

    info!("Patch fetched in {:.1}s", start.elapsed().as_secs_f64());
    print_summary(&pixels, &location);

    if let Some(path) = &location.output {
        save_patch(&pixels, path).await?;
        println!("💾 Saved patch to {}", path.display());
    }

    Ok(())
}

async fn fetch_patch(args: PatchArgs, config: &AppConfig) -> Result<(Array3<f64>, LocationArgs)> {
    let defaults = config.patch_defaults();

    let fetched = match args.action {
        PatchAction::Input { year, location } => {
            let session = open_session(config).await?;
            let patch_size = location.patch_size.unwrap_or(defaults.patch_size);
            let pixels = get_input_patch(&session, year, location.lonlat()?, patch_size).await?;
            (pixels, location)
        }
        PatchAction::Label { location } => {
            let session = open_session(config).await?;
            let patch_size = location.patch_size.unwrap_or(defaults.patch_size);
            let pixels = get_label_patch(&session, location.lonlat()?, patch_size).await?;
            (pixels, location)
        }
        PatchAction::County { county, location } => {
            let composite = county.to_composite()?;
            let session = open_session(config).await?;
            let patch_size = location.patch_size.unwrap_or(defaults.patch_size);
            let pixels =
                get_county_input_patch(&session, &composite, location.lonlat()?, patch_size)
                    .await?;
            (pixels, location)
        }
    };

    Ok(fetched)
}

/// Spinner shown while waiting on the service, hidden in quiet mode
fn fetch_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        Ok(style) => spinner.set_style(style.tick_strings(&["◐", "◓", "◑", "◒"])),
        Err(e) => debug!("Using default spinner style: {}", e),
    }
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn print_summary(pixels: &Array3<f64>, location: &LocationArgs) {
    let (rows, cols, bands) = pixels.dim();
    println!(
        "Patch at ({:.5}, {:.5}): {} x {} pixels, {} bands",
        location.lon, location.lat, rows, cols, bands
    );
    for (index, band) in pixels.axis_iter(Axis(2)).enumerate() {
        let min = band.iter().copied().fold(f64::INFINITY, f64::min);
        let max = band.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = band.mean().unwrap_or(f64::NAN);
        println!(
            "  band {:>2}: min {:>10.3}  max {:>10.3}  mean {:>10.3}",
            index, min, max, mean
        );
    }
}

async fn save_patch(pixels: &Array3<f64>, path: &Path) -> Result<()> {
    let mut encoded = Vec::new();
    pixels
        .write_npy(&mut encoded)
        .map_err(NpyError::from)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, encoded).await?;
    Ok(())
}

async fn open_session(config: &AppConfig) -> Result<Session> {
    Ok(Session::initialize(&config.to_session_config()).await?)
}
