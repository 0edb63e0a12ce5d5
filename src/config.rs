//! Process-wide configuration.
//!
//! Use [`ConfigBuilder`] once at application startup to change the default
//! deferred-write delay or the charset new storages pick up. Anything not
//! configured falls back to [`Config::default`].

use std::sync::OnceLock;
use std::time::Duration;

use crate::Charset;

/// Default debounce delay for deferred writes.
pub const DEFAULT_DEFERRED_DELAY: Duration = Duration::from_millis(3000);

/// Global configuration, initialized via [`ConfigBuilder::init`].
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Delay applied to deferred writes that do not name their own.
    pub deferred_delay: Duration,
    /// Charset for storages built without an explicit one.
    pub charset: Charset,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deferred_delay: DEFAULT_DEFERRED_DELAY,
            charset: Charset::utf_8(),
        }
    }
}

/// Configuration builder for fluent API.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    deferred_delay: Option<Duration>,
    charset: Option<Charset>,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default delay for deferred writes.
    ///
    /// Default: 3000 ms
    ///
    /// # Example
    ///
    /// ```
    /// use anystore::config::ConfigBuilder;
    /// use std::time::Duration;
    ///
    /// ConfigBuilder::new()
    ///     .deferred_delay(Duration::from_millis(500))
    ///     .init();
    /// ```
    pub fn deferred_delay(mut self, delay: Duration) -> Self {
        self.deferred_delay = Some(delay);
        self
    }

    /// Set the charset new storages use by default.
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = Some(charset);
        self
    }

    /// Build and initialize the global configuration.
    ///
    /// This can only be called once. Subsequent calls are ignored.
    /// Returns `true` if configuration was set, `false` if already initialized.
    pub fn init(self) -> bool {
        let defaults = Config::default();
        let config = Config {
            deferred_delay: self.deferred_delay.unwrap_or(defaults.deferred_delay),
            charset: self.charset.unwrap_or(defaults.charset),
        };
        let stored = CONFIG.set(config).is_ok();
        if !stored {
            tracing::warn!("configuration already initialized; ignoring new settings");
        }
        stored
    }
}

/// Initialize with the default configuration.
///
/// This is equivalent to `ConfigBuilder::new().init()`.
pub fn init_default() -> bool {
    ConfigBuilder::new().init()
}

/// Get the current configuration, or default if not initialized.
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}
