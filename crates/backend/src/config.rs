use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use enodia_shared::models::InfrastructureCategory;
use enodia_shared::proximity::DEFAULT_THRESHOLD_METERS;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_AREA_NAME: &str = "Kennebec County";
pub const DEFAULT_ADMIN_LEVEL: u8 = 6;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub assets_dir: PathBuf,
    pub overpass_url: String,
    pub area_name: String,
    pub admin_level: u8,
    pub proximity_meters: f64,
    pub query_timeout: Duration,
    pub upstream_retries: u32,
    pub default_layer: Option<InfrastructureCategory>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            assets_dir: PathBuf::from("assets"),
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            area_name: DEFAULT_AREA_NAME.to_string(),
            admin_level: DEFAULT_ADMIN_LEVEL,
            proximity_meters: DEFAULT_THRESHOLD_METERS,
            query_timeout: Duration::from_secs(60),
            upstream_retries: 2,
            default_layer: Some(InfrastructureCategory::Electricity),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source so tests need not touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let default_layer = match lookup("DEFAULT_LAYER") {
            Some(v) if v.eq_ignore_ascii_case("none") => None,
            Some(v) => match InfrastructureCategory::from_key(&v.to_ascii_lowercase()) {
                Some(c) => Some(c),
                None => {
                    tracing::warn!(value = %v, "Unknown DEFAULT_LAYER, using default");
                    defaults.default_layer
                }
            },
            None => defaults.default_layer,
        };

        Config {
            port: parse_or(&lookup, "PORT", defaults.port),
            assets_dir: lookup("ASSETS_DIR").map(PathBuf::from).unwrap_or(defaults.assets_dir),
            overpass_url: lookup("OVERPASS_URL").unwrap_or(defaults.overpass_url),
            area_name: lookup("AREA_NAME").unwrap_or(defaults.area_name),
            admin_level: parse_or(&lookup, "ADMIN_LEVEL", defaults.admin_level),
            proximity_meters: parse_or(&lookup, "PROXIMITY_METERS", defaults.proximity_meters),
            query_timeout: Duration::from_secs(parse_or(
                &lookup,
                "QUERY_TIMEOUT_SECS",
                defaults.query_timeout.as_secs(),
            )),
            upstream_retries: parse_or(&lookup, "UPSTREAM_RETRIES", defaults.upstream_retries),
            default_layer,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Unparseable value, using default");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let c = config_from(&[]);
        assert_eq!(c.port, 3000);
        assert_eq!(c.overpass_url, DEFAULT_OVERPASS_URL);
        assert_eq!(c.area_name, "Kennebec County");
        assert_eq!(c.admin_level, 6);
        assert_eq!(c.proximity_meters, 500.0);
        assert_eq!(c.default_layer, Some(InfrastructureCategory::Electricity));
    }

    #[test]
    fn test_values_are_read() {
        let c = config_from(&[
            ("PORT", "8080"),
            ("AREA_NAME", "Maui County"),
            ("ADMIN_LEVEL", "8"),
            ("PROXIMITY_METERS", "250.5"),
            ("QUERY_TIMEOUT_SECS", "10"),
            ("UPSTREAM_RETRIES", "0"),
            ("DEFAULT_LAYER", "Road"),
        ]);
        assert_eq!(c.port, 8080);
        assert_eq!(c.area_name, "Maui County");
        assert_eq!(c.admin_level, 8);
        assert_eq!(c.proximity_meters, 250.5);
        assert_eq!(c.query_timeout, Duration::from_secs(10));
        assert_eq!(c.upstream_retries, 0);
        assert_eq!(c.default_layer, Some(InfrastructureCategory::Road));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let c = config_from(&[("PORT", "eighty"), ("ADMIN_LEVEL", "-1"), ("DEFAULT_LAYER", "sewer")]);
        assert_eq!(c.port, 3000);
        assert_eq!(c.admin_level, 6);
        assert_eq!(c.default_layer, Some(InfrastructureCategory::Electricity));
    }

    #[test]
    fn test_default_layer_none() {
        assert_eq!(config_from(&[("DEFAULT_LAYER", "none")]).default_layer, None);
    }
}
