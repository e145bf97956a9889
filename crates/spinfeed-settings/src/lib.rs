//! # spinfeed-settings
//!
//! Configuration management with layered sources for the spinfeed gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SpinfeedSettings::default()`]
//! 2. **Settings file**: `settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SPINFEED_*` overrides (highest priority)
//!
//! Invalid environment values are logged and ignored rather than failing
//! startup.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{
    AuthMode, AuthSettings, FeedMode, IngestSettings, SealSettings, ServerSettings,
    SpinfeedSettings, StoreSettings,
};
