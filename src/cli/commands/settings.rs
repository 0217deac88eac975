//! Config file management and status.

use std::path::{Path, PathBuf};

use crate::config::{self, Config};

use super::ConfigAction;

/// Show, locate or initialize the config file
pub fn cmd_config(
    config: &Config,
    path: Option<&Path>,
    action: &ConfigAction,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let mut shown = config.clone();
            if shown.credentials.explorium_api_key.is_some() {
                shown.credentials.explorium_api_key = Some("********".to_string());
            }
            print!("{}", toml::to_string_pretty(&shown)?);
        }
        ConfigAction::Path => match target_path(path) {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("Could not determine config directory"),
        },
        ConfigAction::Init { force } => {
            let Some(target) = target_path(path) else {
                anyhow::bail!("Could not determine config directory");
            };
            if target.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {} (use --force to overwrite)",
                    target.display()
                );
            }
            config::save_to(&Config::default(), &target)?;
            println!("Wrote default config to {}", target.display());
        }
    }
    Ok(())
}

/// Print the effective settings and whether the service could start
pub fn cmd_status(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    let location = target_path(path)
        .map(|p| format!("{}{}", p.display(), if p.exists() { "" } else { " (not created)" }))
        .unwrap_or_else(|| "unknown".to_string());

    let key_source = if std::env::var("EXPLORIUM_API_KEY").is_ok_and(|k| !k.trim().is_empty()) {
        "set (environment)"
    } else if config.credentials.explorium_api_key.is_some() {
        "set (config file)"
    } else {
        "missing"
    };

    println!("Config:          {}", location);
    println!("Provider:        {} ({})", config.provider.name, config.provider.base_url);
    println!("API key:         {}", key_source);
    println!(
        "Cache TTLs:      identity {}s, payload {}s",
        config.cache.identity_ttl_secs, config.cache.payload_ttl_secs
    );
    println!(
        "Spend caps:      daily {}, monthly {}, per minute {}",
        cap(config.governor.daily_cap),
        cap(config.governor.monthly_cap),
        cap(config.governor.requests_per_minute.map(u64::from))
    );
    println!(
        "Circuit breaker: {} failures, {}s cooldown",
        config.circuit.failure_threshold, config.circuit.cooldown_secs
    );
    println!(
        "Retries:         {} (base {}ms, max {}ms, x{})",
        config.retry.max_retries,
        config.retry.base_delay_ms,
        config.retry.max_delay_ms,
        config.retry.multiplier
    );
    println!(
        "Batching:        {}ms window, up to {} per call",
        config.batch.window_ms, config.batch.max_batch_size
    );

    match config.validate() {
        Ok(()) => println!("Settings:        ok"),
        Err(e) => println!("Settings:        {}", e),
    }
    Ok(())
}

fn target_path(path: Option<&Path>) -> Option<PathBuf> {
    path.map(Path::to_path_buf).or_else(config::config_path)
}

fn cap(value: Option<u64>) -> String {
    value.map_or_else(|| "unlimited".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_default_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::default();

        let init = |force| cmd_config(&config, Some(path.as_path()), &ConfigAction::Init { force });

        init(false).unwrap();
        assert!(path.exists());
        assert_eq!(config::load_from(&path).batch.max_batch_size, 25);

        let err = init(false).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        init(true).unwrap();
    }

    #[test]
    fn test_status_runs_with_invalid_settings() {
        let mut config = Config::default();
        config.batch.max_batch_size = 0;
        cmd_status(&config, Some(Path::new("/nonexistent/config.toml"))).unwrap();
    }

    #[test]
    fn test_cap_formatting() {
        assert_eq!(cap(None), "unlimited");
        assert_eq!(cap(Some(100)), "100");
    }
}
