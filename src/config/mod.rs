mod types;

pub use types::*;

use anyhow::{Context, Result};
use spliceforge_media::scte35::packet::NULL_PID;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./spliceforge.toml",
        "~/.config/spliceforge/config.toml",
        "/etc/spliceforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    // SCTE-35 carriage
    if config.scte35.pid >= NULL_PID {
        anyhow::bail!(
            "SCTE-35 PID {:#06x} is the null PID or exceeds 13 bits",
            config.scte35.pid
        );
    }
    if config.scte35.pts_offset >= 1 << 33 {
        anyhow::bail!("pts_offset {} exceeds 33 bits", config.scte35.pts_offset);
    }

    // Scheduler
    if config.scheduler.tick_interval_ms == 0 || config.scheduler.tick_interval_ms > 1000 {
        anyhow::bail!(
            "tick_interval_ms must be between 1 and 1000, got {}",
            config.scheduler.tick_interval_ms
        );
    }

    // Ad decisioning
    let ad = &config.ad_decision;
    if ad.strategy == DecisionStrategy::Remote && ad.endpoint.is_none() {
        anyhow::bail!("Remote ad decision strategy requires an endpoint");
    }
    if ad.timeout_ms == 0 {
        anyhow::bail!("Ad decision timeout cannot be 0");
    }
    for fallback in &ad.fallbacks {
        if fallback.ad_url.is_empty() || !(fallback.duration > 0.0) {
            anyhow::bail!(
                "Fallback decision '{}' needs a URL and a positive duration",
                fallback.ad_id
            );
        }
    }
    if ad.strategy == DecisionStrategy::Local && ad.local.is_empty() && ad.fallbacks.is_empty() {
        tracing::warn!("Local ad table and fallbacks are empty; every break gets the default ad");
    }

    if config.events.capacity == 0 {
        anyhow::bail!("Event channel capacity cannot be 0");
    }

    Ok(())
}
