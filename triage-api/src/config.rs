//! Configuration loading
//!
//! Reads the YAML config file, resolves relative source paths (config
//! directory first, then its parent, then pass-through with a warning),
//! applies environment overrides, and validates the result.

use std::path::{Path, PathBuf};
use triage_core::{AppConfig, ConfigError};

/// Env override for the listen port (also honors `TRIAGE_PORT`).
const ENV_PORT: &str = "PORT";
const ENV_TRIAGE_PORT: &str = "TRIAGE_PORT";
const ENV_HOST: &str = "TRIAGE_HOST";
const ENV_LOG: &str = "TRIAGE_LOG";

/// Load the configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut config: AppConfig = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })?;

    let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_source_paths(&mut config, config_dir);
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Resolve relative source paths against the config file's directory,
/// then its parent, then leave them as-is with a warning.
fn resolve_source_paths(config: &mut AppConfig, config_dir: &Path) {
    for source in &mut config.sources {
        for path in &mut source.paths {
            if path.is_absolute() {
                continue;
            }
            let candidates: Vec<PathBuf> = [
                Some(config_dir.join(&*path)),
                config_dir.parent().map(|parent| parent.join(&*path)),
            ]
            .into_iter()
            .flatten()
            .collect();

            match candidates.iter().find(|candidate| candidate.exists()) {
                Some(resolved) => *path = resolved.clone(),
                None => {
                    tracing::warn!(
                        source = %source.name,
                        path = %path.display(),
                        "relative source path did not resolve against the config directory"
                    );
                }
            }
        }
    }
}

/// Environment overrides for select fields.
fn apply_env_overrides(config: &mut AppConfig) {
    let port = std::env::var(ENV_PORT)
        .ok()
        .or_else(|| std::env::var(ENV_TRIAGE_PORT).ok());
    if let Some(port) = port.and_then(|value| value.parse::<u16>().ok()) {
        config.server.port = port;
    }
    if let Ok(host) = std::env::var(ENV_HOST) {
        if !host.trim().is_empty() {
            config.server.host = host;
        }
    }
    if let Ok(level) = std::env::var(ENV_LOG) {
        if !level.trim().is_empty() {
            config.server.log_level = level;
        }
    }
}

/// Initialize the tracing subscriber from the configured level.
/// `TRIAGE_LOG` takes precedence when set (already folded into config).
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        let config_path = dir.path().join("triage.yaml");
        fs::write(
            &config_path,
            r#"
server:
  port: 8080
sources:
  - name: local
    type: file
    paths: ["docs"]
"#,
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.sources[0].paths[0].is_absolute());
        assert!(config.sources[0].paths[0].ends_with("docs"));
    }

    #[test]
    fn test_unresolvable_relative_path_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("triage.yaml");
        fs::write(
            &config_path,
            r#"
sources:
  - name: local
    type: file
    paths: ["no-such-dir"]
"#,
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.sources[0].paths[0], PathBuf::from("no-such-dir"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/triage.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("triage.yaml");
        fs::write(&config_path, "server: [not a map").unwrap();
        let err = load_config(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
