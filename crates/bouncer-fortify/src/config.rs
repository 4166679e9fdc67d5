//! Process-level configuration: wraps `bouncer_core::config::BouncerConfig`
//! with the process concerns (listen address, logging) the library
//! itself has no opinion on, layered file → env → CLI the way
//! `fortify::config::AppConfig::load` does.

use anyhow::{Context, Result};
use bouncer_core::config::BouncerConfig;
use serde::Deserialize;
use std::path::Path;

use cerberus_common::constants::DEFAULT_LISTEN_ADDR;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(flatten)]
    pub bouncer: BouncerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            bouncer: BouncerConfig::default(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

impl AppConfig {
    /// Load configuration from `config_path` if it exists, falling back
    /// to defaults, then apply CLI overrides.
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("failed to load config file")?;

            settings
                .try_deserialize()
                .context("failed to parse config")?
        } else {
            tracing::warn!(path = config_path, "config file not found, using defaults");
            Self::default()
        };

        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref api_url) = args.api_url {
            config.bouncer.api_url = api_url.clone();
        }
        if let Some(ref api_key) = args.api_key {
            config.bouncer.lapi_auth =
                Some(bouncer_core::config::LapiAuth::ApiKey(api_key.clone()));
        }

        config.bouncer.validate().context("invalid configuration")?;

        Ok(config)
    }
}
