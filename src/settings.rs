use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

const ENV_PREFIX: &str = "CHARGE";

/// Runtime settings, read from `CHARGE_*` variables (and `.env`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Page with the station table.
    pub url: Option<String>,
    pub db_path: PathBuf,
    /// Serve the page from `cache_path` instead of hitting the site every cycle.
    pub debug: bool,
    pub cache_path: PathBuf,
    pub interval_secs: u64,
    /// Write cycles to this CSV file instead of the database.
    pub csv_path: Option<PathBuf>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_env(Environment::with_prefix(ENV_PREFIX))
    }

    fn from_env(env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("db_path", "data/stations.sqlite")?
            .set_default("debug", false)?
            .set_default("cache_path", "index.html")?
            .set_default("interval_secs", 60)?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_env(Environment::with_prefix(ENV_PREFIX).source(Some(map))).unwrap()
    }

    #[test]
    fn defaults() {
        let s = settings(&[]);
        assert_eq!(s.url, None);
        assert_eq!(s.db_path, PathBuf::from("data/stations.sqlite"));
        assert!(!s.debug);
        assert_eq!(s.cache_path, PathBuf::from("index.html"));
        assert_eq!(s.interval(), Duration::from_secs(60));
        assert_eq!(s.csv_path, None);
    }

    #[test]
    fn env_overrides() {
        let s = settings(&[
            ("CHARGE_URL", "https://example.org/stations"),
            ("CHARGE_DEBUG", "true"),
            ("CHARGE_INTERVAL_SECS", "300"),
            ("CHARGE_DB_PATH", "/tmp/s.sqlite"),
            ("CHARGE_CSV_PATH", "out.csv"),
        ]);
        assert_eq!(s.url.as_deref(), Some("https://example.org/stations"));
        assert!(s.debug);
        assert_eq!(s.interval(), Duration::from_secs(300));
        assert_eq!(s.db_path, PathBuf::from("/tmp/s.sqlite"));
        assert_eq!(s.csv_path, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let s = settings(&[("CHARGE_INTERVAL_SECS", "0")]);
        assert_eq!(s.interval(), Duration::from_secs(1));
    }
}
