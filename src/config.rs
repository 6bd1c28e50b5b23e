//! Support for library configuration options
//!
//! The environment is only read once per process (see [`ENV`]). Services are built from a
//! [`ServiceConfig`], so that tests can bypass the environment entirely.

use std::time::Duration;

use once_cell::sync::Lazy;

use crate::wire_log::DebugLevel;

/// Overrides the HTTPS port of every request (testing only)
pub const ENV_HTTPS_PORT: &str = "LIBGDATA_HTTPS_PORT";
/// Set to `1` to disable strict certificate validation
pub const ENV_LAX_SSL_CERTIFICATES: &str = "LIBGDATA_LAX_SSL_CERTIFICATES";
/// Deprecated, HTTPS is mandatory
pub const ENV_FORCE_HTTP: &str = "LIBGDATA_FORCE_HTTP";
/// Wire log level, from 0 (nothing) to 4 (unredacted bodies)
pub const ENV_DEBUG: &str = "LIBGDATA_DEBUG";

/// The user agent sent along with every request
pub static USER_AGENT: Lazy<String> = Lazy::new(|| {
    format!("{}/{} - gzip", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
});

/// What the environment said when it was first looked at
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvSnapshot {
    pub https_port: Option<u16>,
    pub lax_ssl_certificates: bool,
    pub force_http: bool,
    pub debug_level: DebugLevel,
}

impl EnvSnapshot {
    /// Interpret raw variable values. `lookup` returns `None` for unset variables.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let https_port = lookup(ENV_HTTPS_PORT).and_then(|raw| parse_port(&raw));
        let lax_ssl_certificates = lookup(ENV_LAX_SSL_CERTIFICATES).map(|raw| raw.trim() == "1").unwrap_or(false);
        let force_http = lookup(ENV_FORCE_HTTP).is_some();
        let debug_level = lookup(ENV_DEBUG)
            .and_then(|raw| raw.trim().parse::<u8>().ok())
            .map(DebugLevel::from_level)
            .unwrap_or_default();

        Self { https_port, lax_ssl_certificates, force_http, debug_level }
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => {
            log::warn!("Ignoring invalid {} value {:?}", ENV_HTTPS_PORT, raw);
            None
        },
        Ok(port) => Some(port),
    }
}

/// The process-wide environment snapshot
pub static ENV: Lazy<EnvSnapshot> = Lazy::new(|| {
    let snapshot = EnvSnapshot::from_lookup(|name| std::env::var(name).ok());
    if snapshot.force_http {
        log::info!("{} is deprecated and has no effect: requests always use HTTPS", ENV_FORCE_HTTP);
    }
    snapshot
});

/// Everything a service needs to know about its environment
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Replaces the port of every request URI
    pub https_port: Option<u16>,
    /// Accept invalid TLS certificates
    pub lax_ssl_certificates: bool,
    pub debug_level: DebugLevel,
    /// Per-exchange timeout. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Sent as `Accept-Language`
    pub locale: Option<String>,
    /// URI of the proxy to use, if any
    pub proxy: Option<url::Url>,
    pub user_agent: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            https_port: None,
            lax_ssl_certificates: false,
            debug_level: DebugLevel::None,
            timeout: None,
            locale: None,
            proxy: None,
            user_agent: USER_AGENT.clone(),
        }
    }
}

impl ServiceConfig {
    /// Default settings, amended by the `LIBGDATA_*` environment variables
    pub fn from_env() -> Self {
        let env = &*ENV;
        Self {
            https_port: env.https_port,
            lax_ssl_certificates: env.lax_ssl_certificates,
            debug_level: env.debug_level,
            ..Self::default()
        }
    }

    /// Set the timeout in seconds, `0` meaning no timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = match secs {
            0 => None,
            s => Some(Duration::from_secs(s)),
        };
        self
    }

    pub fn with_locale<S: Into<String>>(mut self, locale: S) -> Self {
        self.locale = Some(locale.into());
        self
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn snapshot(vars: &[(&str, &str)]) -> EnvSnapshot {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        EnvSnapshot::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn env_values_are_interpreted() {
        let env = snapshot(&[
            (ENV_HTTPS_PORT, "8443"),
            (ENV_LAX_SSL_CERTIFICATES, "1"),
            (ENV_DEBUG, "3"),
        ]);
        assert_eq!(env.https_port, Some(8443));
        assert!(env.lax_ssl_certificates);
        assert_eq!(env.debug_level, DebugLevel::Full);
        assert!(!env.force_http);
    }

    #[test]
    fn invalid_port_is_ignored() {
        assert_eq!(snapshot(&[(ENV_HTTPS_PORT, "0")]).https_port, None);
        assert_eq!(snapshot(&[(ENV_HTTPS_PORT, "not a port")]).https_port, None);
        assert_eq!(snapshot(&[]), EnvSnapshot::default());
    }

    #[test]
    fn zero_timeout_means_none() {
        assert_eq!(ServiceConfig::default().with_timeout_secs(0).timeout, None);
        assert_eq!(ServiceConfig::default().with_timeout_secs(5).timeout, Some(Duration::from_secs(5)));
    }
}
