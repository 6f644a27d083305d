use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "server_aggregator.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "DAQ flashlist aggregator", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "AGGREGATOR_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "AGGREGATOR_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "AGGREGATOR_LOG_LEVEL", help = "Logging level (debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "AGGREGATOR_TOPOLOGY", help = "Path to the JSON topology of the session.")]
    pub topology_path: Option<PathBuf>,

    #[clap(long, env = "AGGREGATOR_FLASHLIST_DIR", help = "Directory holding one LAS payload file per flashlist.")]
    pub flashlist_dir: Option<PathBuf>,

    #[clap(long, env = "AGGREGATOR_OUTPUT_DIR", help = "Directory completed snapshots are written to.")]
    pub output_dir: Option<PathBuf>,

    #[clap(long, env = "AGGREGATOR_INTERVAL_MS", help = "Milliseconds between two cycles.")]
    pub interval_ms: Option<u64>,

    #[clap(long, env = "AGGREGATOR_MAX_CYCLES", help = "Stop after this many cycles (runs until interrupted if unset).")]
    pub max_cycles: Option<u64>,

    #[clap(long, env = "AGGREGATOR_L0_FILTER", help = "Substring identifying the level-zero instance in FMURL.")]
    pub l0_filter: Option<String>,

    #[clap(long, env = "AGGREGATOR_TCDS_PM_SERVICE", help = "Service name of the TCDS partition manager.")]
    pub tcds_pm_service: Option<String>,

    #[clap(long, env = "AGGREGATOR_TCDS_PM_CONTEXT", help = "URL of the TCDS partition manager.")]
    pub tcds_pm_context: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            topology_path: other.topology_path.or(self.topology_path),
            flashlist_dir: other.flashlist_dir.or(self.flashlist_dir),
            output_dir: other.output_dir.or(self.output_dir),
            interval_ms: other.interval_ms.or(self.interval_ms),
            max_cycles: other.max_cycles.or(self.max_cycles),
            l0_filter: other.l0_filter.or(self.l0_filter),
            tcds_pm_service: other.tcds_pm_service.or(self.tcds_pm_service),
            tcds_pm_context: other.tcds_pm_context.or(self.tcds_pm_context),
        }
    }

    fn defaults() -> Config {
        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            topology_path: Some(PathBuf::from("topology.json")),
            flashlist_dir: Some(PathBuf::from("./flashlists")),
            output_dir: Some(PathBuf::from("./snapshots")),
            interval_ms: Some(3000),
            l0_filter: Some("toppro".to_string()),
            ..Default::default()
        }
    }

    /// Reads a JSON config file into a partial config.
    fn from_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
            return None;
        }
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<Config>(&text) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        }
    }
}

/// Defaults, then the config file, then environment and CLI.
pub fn load_config() -> Config {
    let cli = Config::parse();
    load_config_from(cli)
}

pub fn load_config_from(cli: Config) -> Config {
    let config_file_path = cli.config_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = Config::from_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_file_and_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aggregator.conf");
        fs::write(&path, r#"{"intervalMs": 500, "l0Filter": "minidaq", "tcdsPmService": "cpm-pri"}"#).unwrap();

        let cli = Config { config_path: Some(path), l0_filter: Some("toppro".into()), ..Default::default() };
        let config = load_config_from(cli);

        assert_eq!(config.interval_ms, Some(500));
        assert_eq!(config.l0_filter.as_deref(), Some("toppro"));
        assert_eq!(config.tcds_pm_service.as_deref(), Some("cpm-pri"));
        assert_eq!(config.output_dir, Some(PathBuf::from("./snapshots")));
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.conf");
        fs::write(&path, "not json").unwrap();

        let config = load_config_from(Config { config_path: Some(path), ..Default::default() });
        assert_eq!(config.interval_ms, Some(3000));
    }
}
