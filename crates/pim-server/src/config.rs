//! Runtime configuration (§6 "Persisted state layout": "configured via a
//! single ini file"; §10.4). A single environment variable names the
//! directory that holds the ini file; everything else is read from files in
//! that directory.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const CONFDIR_ENV_VAR: &str = "PIM_BROKER_CONFDIR";
const CONFIG_FILE_NAME: &str = "pim-broker.ini";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// §6 "cache verify-on-retrieval boolean".
    pub cache_verify_on_retrieval: bool,
    /// §4.5 "a short coalescing timer (≈ 50 ms)".
    pub notification_coalesce_interval_ms: u64,
    /// §4.4 "the search window for coalescing is bounded to the last ~10
    /// notifications".
    pub collector_coalesce_window: usize,
    /// §4.5 "a bounded worker pool".
    pub dispatch_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cache_verify_on_retrieval: false,
            notification_coalesce_interval_ms: 50,
            collector_coalesce_window: 10,
            dispatch_workers: 4,
        }
    }
}

impl ServerConfig {
    /// Reads `PIM_BROKER_CONFDIR` from the environment and loads the ini
    /// file within it. Fails fast: a missing or unparsable config is a
    /// startup error, never a steady-state one (§10.4).
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let dir = std::env::var(CONFDIR_ENV_VAR).map_err(|_| ConfigError::MissingConfDirEnv)?;
        Self::load_from_dir(Path::new(&dir))
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let path: PathBuf = dir.join(CONFIG_FILE_NAME);
        let path_str = path.display().to_string();
        let ini = ini::Ini::load_from_file(&path).map_err(|source| ConfigError::Parse {
            path: path_str.clone(),
            source,
        })?;

        let mut config = ServerConfig::default();
        if let Some(section) = ini.section(Some("Cache")) {
            if let Some(v) = section.get("VerifyOnRetrieval") {
                config.cache_verify_on_retrieval = parse_bool(v);
            }
        }
        if let Some(section) = ini.section(Some("Notifications")) {
            if let Some(v) = section.get("CoalesceIntervalMs") {
                if let Ok(parsed) = v.parse() {
                    config.notification_coalesce_interval_ms = parsed;
                }
            }
            if let Some(v) = section.get("CollectorCoalesceWindow") {
                if let Ok(parsed) = v.parse() {
                    config.collector_coalesce_window = parsed;
                }
            }
        }
        if let Some(section) = ini.section(Some("Server")) {
            if let Some(v) = section.get("DispatchWorkers") {
                if let Ok(parsed) = v.parse() {
                    config.dispatch_workers = parsed;
                }
            }
        }
        Ok(config)
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_spec_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.notification_coalesce_interval_ms, 50);
        assert_eq!(config.collector_coalesce_window, 10);
    }

    #[test]
    fn loads_overrides_from_ini_file() {
        let dir = tempdir();
        let mut file = std::fs::File::create(dir.join(CONFIG_FILE_NAME)).unwrap();
        writeln!(
            file,
            "[Cache]\nVerifyOnRetrieval = true\n[Notifications]\nCoalesceIntervalMs = 75\nCollectorCoalesceWindow = 20\n[Server]\nDispatchWorkers = 8\n"
        )
        .unwrap();
        let config = ServerConfig::load_from_dir(&dir).unwrap();
        assert!(config.cache_verify_on_retrieval);
        assert_eq!(config.notification_coalesce_interval_ms, 75);
        assert_eq!(config.collector_coalesce_window, 20);
        assert_eq!(config.dispatch_workers, 8);
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("pim-broker-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
