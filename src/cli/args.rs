//! Command-line argument parsing for the land-cover fetcher
//!
//! This module defines the CLI structure using clap derive macros,
//! providing commands for credential checks, image composition and patch
//! downloads.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::{CountyComposite, LonLat};
use crate::errors::{AppError, Result};

/// Land-cover Fetcher - Sentinel-2 and land-cover patches from Earth Engine
#[derive(Parser, Debug)]
#[command(
    name = "landcover_fetcher",
    version,
    about = "Fetch Sentinel-2 input patches and land-cover label patches from Earth Engine",
    long_about = "Builds Sentinel-2 composites and land-cover label images on Earth Engine and
downloads square pixel patches around points of interest as NPY arrays."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect or verify Earth Engine credentials
    Auth(AuthArgs),

    /// Print the expression of a composed image
    Compose(ComposeArgs),

    /// Download a patch around a point
    Patch(PatchArgs),
}

/// Arguments for authentication management
#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub action: AuthAction,
}

/// Authentication actions
#[derive(Subcommand, Debug)]
pub enum AuthAction {
    /// Show which credential sources are available
    Status,

    /// Open a session and mint an access token
    Verify,
}

/// Arguments for image composition
#[derive(Args, Debug)]
pub struct ComposeArgs {
    #[command(subcommand)]
    pub action: ComposeAction,
}

/// Images that can be composed
#[derive(Subcommand, Debug)]
pub enum ComposeAction {
    /// Two-month cropland composite for a county (checks data availability)
    County(CountyArgs),

    /// Year-long Sentinel-2 composite
    Input {
        /// Calendar year of the composite
        #[arg(long)]
        year: u32,
    },

    /// 2020 land-cover labels
    Label,
}

/// Arguments for patch downloads
#[derive(Args, Debug)]
pub struct PatchArgs {
    #[command(subcommand)]
    pub action: PatchAction,
}

/// Patches that can be downloaded
#[derive(Subcommand, Debug)]
pub enum PatchAction {
    /// Patch of the year-long Sentinel-2 composite
    Input {
        /// Calendar year of the composite
        #[arg(long)]
        year: u32,

        #[command(flatten)]
        location: LocationArgs,
    },

    /// Patch of the 2020 land-cover labels
    Label {
        #[command(flatten)]
        location: LocationArgs,
    },

    /// Patch of a county cropland composite
    County {
        #[command(flatten)]
        county: CountyArgs,

        #[command(flatten)]
        location: LocationArgs,
    },
}

/// County composite parameters
#[derive(Args, Debug, Clone)]
pub struct CountyArgs {
    /// County name as stored in the boundary table (e.g. "Alameda")
    #[arg(long)]
    pub county: String,

    /// Cropland class code to keep
    #[arg(long)]
    pub crop: i64,

    /// Calendar year
    #[arg(long)]
    pub year: u32,

    /// First month of the two-month window (1-11)
    #[arg(long)]
    pub month: u32,
}

/// Patch location and output
#[derive(Args, Debug, Clone)]
pub struct LocationArgs {
    /// Longitude of the patch center in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Latitude of the patch center in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Patch side length in pixels (defaults to the configured size)
    #[arg(short = 's', long)]
    pub patch_size: Option<u32>,

    /// Write the patch to this .npy file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level selected by the verbosity flags, if any
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }
}

impl CountyArgs {
    /// Validated composite parameters
    pub fn to_composite(&self) -> Result<CountyComposite> {
        Ok(CountyComposite::new(
            self.county.clone(),
            self.crop,
            self.year,
            self.month,
        )?)
    }
}

impl LocationArgs {
    /// Validated patch center
    pub fn lonlat(&self) -> Result<LonLat> {
        LonLat::new(self.lon, self.lat).map_err(AppError::Patch)
    }
}
