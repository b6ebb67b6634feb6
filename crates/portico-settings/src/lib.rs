//! # portico-settings
//!
//! Configuration management with layered sources for the Portico services.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`PorticoSettings::default()`]
//! 2. **Settings file** — `portico.json` (deep-merged over defaults)
//! 3. **Environment variables** — `PORTICO_*` overrides (highest priority)
//!
//! Each service loads settings once at startup and passes the value by
//! reference into its composition root; there is no process-global
//! singleton.
//!
//! # Usage
//!
//! ```no_run
//! use portico_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("gateway port: {}", settings.gateway.port);
//! ```

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
