// src/config.rs

use byte_unit::Byte;
use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::{env, net::Ipv4Addr, str::FromStr, time::Duration};

use crate::polyline::Precision;
use crate::provider::ProviderOptions;

#[derive(Clone, Debug)]
pub struct Config {
    pub route_source: String,
    pub onemap_token: Option<String>,
    pub cache_size: u64,
    pub cache_ttl: Duration,
    pub max_post_size: Byte,
    pub port: u16,
    pub bind: Ipv4Addr,
    pub polyline_precision: Precision,
    pub utc_offset_hours: i32,
    pub max_walk_distance: u32,
    pub transcribe_url: Option<String>,
    pub silence_threshold: f32,
    pub allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let provider = ProviderOptions::default();
        Self {
            route_source: provider.source,
            onemap_token: None,
            cache_size: provider.cache_size,
            cache_ttl: provider.cache_ttl,
            max_post_size: Byte::from_u64(500_000),
            port: 3000,
            bind: Ipv4Addr::new(0, 0, 0, 0),
            polyline_precision: Precision::default(),
            utc_offset_hours: provider.utc_offset_hours,
            max_walk_distance: provider.max_walk_distance,
            transcribe_url: None,
            silence_threshold: 0.01,
            allowed_origins: vec![
                String::from("http://localhost:3000"),
                String::from("http://127.0.0.1:3000"),
                String::from("http://localhost:3001"),
            ],
        }
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Keeps entries that look like `scheme://host[:port]`.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| origin.starts_with("http://") || origin.starts_with("https://"))
        .map(String::from)
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            route_source: non_empty("ROUTE_SOURCE").unwrap_or(defaults.route_source),
            onemap_token: non_empty("ONEMAP_TOKEN"),
            cache_size: parsed::<u64>("ROUTE_CACHE").unwrap_or(defaults.cache_size),
            cache_ttl: parsed::<u64>("ROUTE_CACHE_TTL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            max_post_size: env::var("MAX_POST_SIZE")
                .ok()
                .and_then(|s| Byte::parse_str(s, true).ok())
                .unwrap_or(defaults.max_post_size),
            port: parsed::<u16>("PORT").unwrap_or(defaults.port),
            bind: parsed::<Ipv4Addr>("BIND").unwrap_or(defaults.bind),
            polyline_precision: parsed::<i64>("POLYLINE_PRECISION")
                .and_then(|digits| Precision::try_from(digits).ok())
                .unwrap_or(defaults.polyline_precision),
            utc_offset_hours: parsed::<i32>("ROUTE_UTC_OFFSET").unwrap_or(defaults.utc_offset_hours),
            max_walk_distance: parsed::<u32>("MAX_WALK_DISTANCE")
                .unwrap_or(defaults.max_walk_distance),
            transcribe_url: non_empty("TRANSCRIBE_URL"),
            silence_threshold: parsed::<f32>("SILENCE_THRESHOLD")
                .filter(|t| t.is_finite() && *t >= 0.0)
                .unwrap_or(defaults.silence_threshold),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|raw| parse_origins(&raw))
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.allowed_origins),
        }
    }

    pub fn provider_options(&self) -> ProviderOptions {
        ProviderOptions {
            source: self.route_source.clone(),
            token: self.onemap_token.clone(),
            cache_size: self.cache_size,
            cache_ttl: self.cache_ttl,
            utc_offset_hours: self.utc_offset_hours,
            max_walk_distance: self.max_walk_distance,
        }
    }
}

// Initialize dotenv and config only once
pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    dotenv().ok(); // Loads .env (only the first time it's called)
    Config::from_env()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.cache_size, 128);
        assert_eq!(config.max_post_size.as_u64(), 500_000);
        assert_eq!(config.polyline_precision.digits(), 5);
        assert_eq!(config.allowed_origins.len(), 3);
    }

    #[test]
    fn test_parse_origins() {
        let origins = parse_origins(" https://nav.example.sg/ ,not-an-origin,, http://localhost:5173");
        assert_eq!(
            origins,
            vec![
                String::from("https://nav.example.sg"),
                String::from("http://localhost:5173")
            ]
        );
    }

    #[test]
    fn test_provider_options_follow_config() {
        let config = Config {
            route_source: String::from("test_files/onemap"),
            onemap_token: Some(String::from("secret")),
            ..Config::default()
        };
        let options = config.provider_options();
        assert_eq!(options.source, "test_files/onemap");
        assert_eq!(options.token.as_deref(), Some("secret"));
        assert_eq!(options.max_walk_distance, 1000);
    }
}
