// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;

use crate::error::Error;

mod general;
mod listener;
mod log;
mod security;

pub use self::log::{Log, LogLevel};
pub use general::General;
pub use listener::{Listener, Protocol};
pub use security::Security;

/// Server main config.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "General::default")]
    general: General,

    #[serde(default = "Listener::default_listeners")]
    listeners: Vec<Listener>,

    #[serde(default = "Security::default")]
    security: Security,

    #[serde(default = "Log::default")]
    log: Log,
}

impl Config {
    #[must_use]
    pub const fn general(&self) -> &General {
        &self.general
    }

    #[must_use]
    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    #[must_use]
    pub const fn security(&self) -> &Security {
        &self.security
    }

    #[must_use]
    pub const fn log(&self) -> &Log {
        &self.log
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if some options in config are invalid.
    pub fn validate(&self) -> Result<(), Error> {
        for listener in &self.listeners {
            listener.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.listeners().len(), 1);
        assert_eq!(config.listeners()[0].address(), "0.0.0.0:1883");
        assert!(config.security().allow_anonymous());
    }

    #[test]
    fn test_parse_listeners() {
        let text = r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:1883"

[[listeners]]
protocol = "ws"
address = "127.0.0.1:8083"
path = "/mqtt"

[security]
allow_anonymous = false
"#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.listeners().len(), 2);
        assert_eq!(config.listeners()[1].protocol(), Protocol::Ws);
        assert_eq!(config.listeners()[1].path(), Some("/mqtt"));
        assert!(!config.security().allow_anonymous());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mqtts_requires_cert() {
        let text = r#"
[[listeners]]
protocol = "mqtts"
address = "127.0.0.1:8883"
"#;
        let config: Config = toml::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }
}
