#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! The active [`ObserverConfig`] is per evaluation thread, like the
//! active-subscriber stack. Embedders toggle `should_convert` off for a
//! window (e.g. while building immutable snapshots) and must restore it;
//! [`suspend_conversion`] does the restore on drop.
//!
//! # Environment
//!
//! [`ObserverConfig::from_env`] reads:
//!
//! - `DEPTRACK_SERVER_RENDERING` (`1`/`true`): disable observation entirely.
//! - `DEPTRACK_PRODUCTION` (`1`/`true`): suppress usage warnings and custom
//!   setter hooks.

use std::cell::Cell;
use std::env;

/// Engine-wide switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverConfig {
    /// When false, `observe` never wraps new containers.
    pub should_convert: bool,
    /// Rendering mode in which observation is disabled.
    pub server_rendering: bool,
    /// Emit usage warnings and run custom setter hooks.
    pub dev_warnings: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            should_convert: true,
            server_rendering: false,
            dev_warnings: true,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let val = env::var(name).ok()?;
    let val = val.trim();
    if val == "1" || val.eq_ignore_ascii_case("true") {
        Some(true)
    } else if val == "0" || val.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl ObserverConfig {
    /// Defaults overridden by `DEPTRACK_*` environment variables.
    ///
    /// Unrecognized values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(server) = env_flag("DEPTRACK_SERVER_RENDERING") {
            cfg.server_rendering = server;
        }
        if let Some(production) = env_flag("DEPTRACK_PRODUCTION") {
            cfg.dev_warnings = !production;
        }
        cfg
    }

    #[must_use]
    pub fn with_should_convert(mut self, enabled: bool) -> Self {
        self.should_convert = enabled;
        self
    }

    #[must_use]
    pub fn with_server_rendering(mut self, enabled: bool) -> Self {
        self.server_rendering = enabled;
        self
    }

    #[must_use]
    pub fn with_dev_warnings(mut self, enabled: bool) -> Self {
        self.dev_warnings = enabled;
        self
    }

    /// Whether `observe` may wrap new containers under this config.
    #[must_use]
    pub fn observation_enabled(&self) -> bool {
        self.should_convert && !self.server_rendering
    }
}

thread_local! {
    static CONFIG: Cell<ObserverConfig> = Cell::new(ObserverConfig::default());
}

/// The active configuration.
#[must_use]
pub fn config() -> ObserverConfig {
    CONFIG.with(Cell::get)
}

/// Replace the active configuration; returns the previous one.
pub fn set_config(cfg: ObserverConfig) -> ObserverConfig {
    CONFIG.with(|cell| cell.replace(cfg))
}

/// Toggle conversion of new containers; returns the previous setting.
pub fn set_should_convert(enabled: bool) -> bool {
    let previous = config();
    set_config(previous.with_should_convert(enabled));
    previous.should_convert
}

/// Restores `should_convert` on drop.
#[must_use = "conversion is re-enabled as soon as the guard is dropped"]
pub struct ConversionGuard {
    previous: bool,
}

impl Drop for ConversionGuard {
    fn drop(&mut self) {
        set_should_convert(self.previous);
    }
}

/// Disable conversion until the returned guard is dropped.
pub fn suspend_conversion() -> ConversionGuard {
    ConversionGuard {
        previous: set_should_convert(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_observation() {
        let cfg = ObserverConfig::default();
        assert!(cfg.should_convert);
        assert!(!cfg.server_rendering);
        assert!(cfg.dev_warnings);
        assert!(cfg.observation_enabled());
    }

    #[test]
    fn builders_compose() {
        let cfg = ObserverConfig::default()
            .with_server_rendering(true)
            .with_dev_warnings(false);
        assert!(!cfg.observation_enabled());
        assert!(!cfg.dev_warnings);
    }

    #[test]
    fn set_config_returns_previous() {
        let original = config();
        let previous = set_config(original.with_dev_warnings(false));
        assert_eq!(previous, original);
        assert!(!config().dev_warnings);
        set_config(original);
    }

    #[test]
    fn suspend_conversion_restores() {
        assert!(config().should_convert);
        {
            let _guard = suspend_conversion();
            assert!(!config().should_convert);
            {
                let _inner = suspend_conversion();
                assert!(!config().should_convert);
            }
            assert!(!config().should_convert);
        }
        assert!(config().should_convert);
    }

    #[test]
    fn unset_env_flag_is_ignored() {
        assert_eq!(env_flag("DEPTRACK_TEST_FLAG_NEVER_SET"), None);
    }
}
