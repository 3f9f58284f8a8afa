//! Engine Configuration
//!
//! Configuration is held per thread. The engine assumes a single logical
//! thread of control, so each thread owns an independent engine with its own
//! settings, scheduler queue and active-subscriber stack.
//!
//! Plain settings can be loaded from JSON:
//!
//! ```rust
//! let config = trellis_core::Config::from_json(r#"{ "async": false, "maxUpdateCount": 50 }"#)
//!     .unwrap();
//! assert!(!config.async_mode);
//! trellis_core::config::replace(config);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Receives reported errors together with a short description of where they
/// surfaced.
pub type ErrorHandler = Rc<dyn Fn(&Error, &str)>;

/// Receives non-fatal diagnostics.
pub type WarnHandler = Rc<dyn Fn(&Error)>;

/// Default cap on how many times one subscriber may re-run within one flush.
pub const MAX_UPDATE_COUNT: u32 = 100;

/// Engine settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Batch re-runs into a deferred flush. When `false`, subscribers are
    /// flushed as soon as they are queued and channels notify in creation
    /// order.
    #[serde(rename = "async")]
    pub async_mode: bool,

    /// How many times a single subscriber may be re-queued within one flush
    /// before the flush is aborted as a circular update.
    pub max_update_count: u32,

    /// Disables observation entirely.
    pub server_rendering: bool,

    /// Suppress the default diagnostic log output.
    pub silent: bool,

    #[serde(skip)]
    pub error_handler: Option<ErrorHandler>,

    #[serde(skip)]
    pub warn_handler: Option<WarnHandler>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_mode: true,
            max_update_count: MAX_UPDATE_COUNT,
            server_rendering: false,
            silent: false,
            error_handler: None,
            warn_handler: None,
        }
    }
}

impl Config {
    /// Parse the plain settings from JSON. Handlers are left unset.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("async_mode", &self.async_mode)
            .field("max_update_count", &self.max_update_count)
            .field("server_rendering", &self.server_rendering)
            .field("silent", &self.silent)
            .field("error_handler", &self.error_handler.is_some())
            .field("warn_handler", &self.warn_handler.is_some())
            .finish()
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Read the current configuration.
///
/// The closure must not reconfigure the engine.
pub fn with<R>(f: impl FnOnce(&Config) -> R) -> R {
    CONFIG.with(|config| f(&config.borrow()))
}

/// Modify the current configuration in place.
pub fn configure(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|config| f(&mut config.borrow_mut()));
}

/// Replace the current configuration.
pub fn replace(config: Config) -> Config {
    CONFIG.with(|current| std::mem::replace(&mut *current.borrow_mut(), config))
}

/// A copy of the current configuration.
pub fn current() -> Config {
    with(Config::clone)
}

pub(crate) fn is_async() -> bool {
    with(|c| c.async_mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.async_mode);
        assert_eq!(config.max_update_count, 100);
        assert!(!config.server_rendering);
        assert!(config.error_handler.is_none());
    }

    #[test]
    fn from_json_fills_missing_fields_with_defaults() {
        let config = Config::from_json(r#"{ "serverRendering": true }"#).unwrap();
        assert!(config.server_rendering);
        assert!(config.async_mode);
        assert_eq!(config.max_update_count, MAX_UPDATE_COUNT);
    }

    #[test]
    fn from_json_rejects_bad_input() {
        let err = Config::from_json("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn configure_and_replace() {
        configure(|c| c.async_mode = false);
        assert!(!is_async());

        let previous = replace(Config::default());
        assert!(!previous.async_mode);
        assert!(is_async());
    }
}
