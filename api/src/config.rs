use std::env;
use std::str::FromStr;
use tracing::{info, warn};

use crate::alerts::AlertHeaders;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_APP_NAME: &str = "operationsApp";
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 2000;

/// Runtime settings of the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub port: u16,
    /// Prefix of the alert headers, e.g. `X-operationsApp-alert`.
    pub app_name: String,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            app_name: DEFAULT_APP_NAME.to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl ApiConfig {
    /// Reads `PORT`, `APP_NAME`, `PAGE_SIZE_DEFAULT` and `PAGE_SIZE_MAX`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Unusable values
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or_default(&lookup, "PORT", DEFAULT_PORT);
        let max_page_size = parse_or_default(&lookup, "PAGE_SIZE_MAX", MAX_PAGE_SIZE).max(1);
        let default_page_size = parse_or_default(&lookup, "PAGE_SIZE_DEFAULT", DEFAULT_PAGE_SIZE)
            .clamp(1, max_page_size);

        let app_name = match lookup("APP_NAME") {
            Some(name) => match AlertHeaders::new(&name) {
                Ok(_) => name,
                Err(e) => {
                    warn!("{}. Using default app name {}.", e, DEFAULT_APP_NAME);
                    DEFAULT_APP_NAME.to_string()
                }
            },
            None => DEFAULT_APP_NAME.to_string(),
        };

        Self {
            port,
            app_name,
            default_page_size,
            max_page_size,
        }
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match T::from_str(raw.trim()) {
            Ok(value) => {
                info!("Using {} {} from environment variable.", key, value);
                value
            }
            Err(_) => {
                warn!(
                    "Invalid {} value '{}' in environment variable. Using default {}.",
                    key, raw, default
                );
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(ApiConfig::from_lookup(lookup(&[])), ApiConfig::default());
    }

    #[test]
    fn reads_values_and_falls_back_on_garbage() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("PORT", "8081"),
            ("APP_NAME", "ledger"),
            ("PAGE_SIZE_DEFAULT", "many"),
            ("PAGE_SIZE_MAX", "50"),
        ]));
        assert_eq!(config.port, 8081);
        assert_eq!(config.app_name, "ledger");
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.max_page_size, 50);
    }

    #[test]
    fn rejects_app_name_unusable_in_headers() {
        let config = ApiConfig::from_lookup(lookup(&[("APP_NAME", "my app")]));
        assert_eq!(config.app_name, DEFAULT_APP_NAME);
    }

    #[test]
    fn default_page_size_never_exceeds_max() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("PAGE_SIZE_DEFAULT", "500"),
            ("PAGE_SIZE_MAX", "100"),
        ]));
        assert_eq!(config.default_page_size, 100);
    }
}
