//! Command-line interface components
//!
//! This module contains CLI-specific code for the land-cover fetcher,
//! including argument parsing and command handlers.

pub mod args;
pub mod commands;

pub use args::{
    AuthAction, AuthArgs, Cli, Commands, ComposeAction, ComposeArgs, CountyArgs, GlobalArgs,
    LocationArgs, PatchAction, PatchArgs,
};
pub use commands::{handle_auth, handle_compose, handle_patch};
