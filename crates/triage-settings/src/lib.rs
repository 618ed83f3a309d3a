//! # triage-settings
//!
//! Configuration for the triage server, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`TriageSettings::default()`]
//! 2. **Settings file**: `settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TRIAGE_*` and `GEMINI_*` overrides
//!
//! ```no_run
//! let settings = triage_settings::load_settings(None)?;
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! # Ok::<(), triage_settings::SettingsError>(())
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
