mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./metatrack.toml", "~/.config/metatrack/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

fn expand_paths(config: &mut Config) {
    for path in [&mut config.capture.output_dir, &mut config.store.root] {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        *path = expanded.into();
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let capture = &config.capture;
    if capture.timescale <= 0 {
        anyhow::bail!("Capture timescale must be positive, got {}", capture.timescale);
    }
    if capture.buffer_capacity == 0 {
        anyhow::bail!("Metadata buffer capacity cannot be 0");
    }
    if capture.video_queue_depth == 0 {
        anyhow::bail!("Video queue depth cannot be 0");
    }
    if capture.flush_interval_ms == 0 {
        anyhow::bail!("Flush interval cannot be 0");
    }
    if capture.finish_timeout_ms < capture.drain_timeout_ms {
        tracing::warn!(
            "finish_timeout_ms ({}) is shorter than drain_timeout_ms ({})",
            capture.finish_timeout_ms,
            capture.drain_timeout_ms
        );
    }

    if config.video.fourcc().is_none() {
        anyhow::bail!(
            "Video codec '{}' is not a four character code",
            config.video.codec
        );
    }
    if config.video.frame_rate == 0 {
        anyhow::bail!("Video frame rate cannot be 0");
    }

    if config.metadata.mime_format.is_empty() || config.metadata.mime_format.contains('\0') {
        anyhow::bail!("Metadata MIME format must be a non-empty string without NUL");
    }

    Ok(())
}
