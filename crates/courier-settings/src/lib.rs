//! # courier-settings
//!
//! Layered configuration for the Courier relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CourierSettings::default()`]
//! 2. **Settings file**: a JSON file passed on the command line (deep-merged over defaults)
//! 3. **Environment variables**: `COURIER_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, apply_env_overrides_with, deep_merge, load_settings};
pub use types::{CourierSettings, LoggingSettings, ServerSettings};
