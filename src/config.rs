//! CLI-layer configuration: database path, music roots, remote media-server
//! credentials, and the metadata-lookup endpoint. Core library code never
//! reads configuration directly; only `bin/soundcatalogd.rs` does.
//!
//! Layered the way `ScrobbleScrubberConfig::load_with_file` is: defaults,
//! then an optional config file, then environment variables, in increasing
//! priority.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub host: String,
    pub user: String,
    pub password: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub db_file: String,
    pub music_roots: Vec<String>,
    pub match_threshold: f64,
    pub metadata_endpoint: String,
    pub remote: RemoteConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            db_file: "catalog.db".to_string(),
            music_roots: Vec::new(),
            match_threshold: 0.75,
            metadata_endpoint: "https://labs.api.listenbrainz.org/bulk-tag-lookup/json".to_string(),
            remote: RemoteConfig::default(),
        }
    }
}

impl CatalogConfig {
    pub fn default_config_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from("soundcatalog.toml"),
            PathBuf::from("config/soundcatalog.toml"),
        ]
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_file::<&str>(None)
    }

    pub fn load_with_file<P: AsRef<Path>>(config_file: Option<P>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = config_file {
            if path.as_ref().exists() {
                builder = builder.add_source(File::from(path.as_ref()));
            }
        } else {
            for path in Self::default_config_paths() {
                if path.exists() {
                    builder = builder.add_source(File::from(path));
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SOUNDCATALOG")
                .separator("_")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_any_file() {
        let config = CatalogConfig::load_with_file::<&str>(None).unwrap();
        assert_eq!(config.db_file, "catalog.db");
        assert!((config.match_threshold - 0.75).abs() < 1e-9);
    }
}
