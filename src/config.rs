use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub static CONFIG: OnceCell<Config> = OnceCell::new();

const ENV_PREFIX: &str = "DOMAINWATCH_";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    pub domainwatch: String,
    pub reqwest: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const DOMAINWATCH_LEVEL: &str = "info";
    const REQWEST_LEVEL: &str = "warn";

    /// Log specification understood by flexi_logger
    pub fn log_spec(&self) -> String {
        format!("warn, domainwatch={}, reqwest={}", self.domainwatch, self.reqwest)
    }

    fn ensure_valid(&mut self) {
        Self::ensure_level(&mut self.domainwatch, "domainwatch", Self::DOMAINWATCH_LEVEL);
        Self::ensure_level(&mut self.reqwest, "reqwest", Self::REQWEST_LEVEL);
    }

    fn ensure_level(level: &mut String, name: &str, default: &str) {
        let original = level.clone();
        *level = level.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&level.as_str()) {
            eprintln!(
                "Config error: {} log level of '{}' is invalid - using default of '{}'",
                name, original, default
            );
            *level = default.to_owned();
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            domainwatch: Self::DOMAINWATCH_LEVEL.to_string(),
            reqwest: Self::REQWEST_LEVEL.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    const HOST: &str = "127.0.0.1";
    const PORT: u16 = 10000;

    fn ensure_valid(&mut self) {
        if self.host.trim().is_empty() {
            eprintln!("Config error: server host is empty - using default of '{}'", Self::HOST);
            self.host = Self::HOST.to_owned();
        }
        if self.port == 0 {
            eprintln!("Config error: server port 0 is invalid - using default of {}", Self::PORT);
            self.port = Self::PORT;
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: Self::HOST.to_string(),
            port: Self::PORT,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Directory holding the database file. Defaults to the local data directory.
    pub dir: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckerConfig {
    pub api_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl CheckerConfig {
    const API_URL: &str = "https://www.virustotal.com/api/v3";
    const TIMEOUT_SECS: u64 = 30;
    const POLL_INTERVAL_MS: u64 = 2000;
    const MAX_POLLS: u32 = 5;

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn ensure_valid(&mut self) {
        if self.timeout_secs == 0 {
            eprintln!(
                "Config error: checker timeout of 0 is invalid - using default of {}s",
                Self::TIMEOUT_SECS
            );
            self.timeout_secs = Self::TIMEOUT_SECS;
        }
        if self.max_polls == 0 {
            eprintln!(
                "Config error: checker max_polls of 0 is invalid - using default of {}",
                Self::MAX_POLLS
            );
            self.max_polls = Self::MAX_POLLS;
        }
        if url::Url::parse(&self.api_url).is_err() {
            eprintln!(
                "Config error: checker api_url '{}' is invalid - using default of '{}'",
                self.api_url,
                Self::API_URL
            );
            self.api_url = Self::API_URL.to_owned();
        }
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig {
            api_url: Self::API_URL.to_string(),
            api_key: String::new(),
            timeout_secs: Self::TIMEOUT_SECS,
            poll_interval_ms: Self::POLL_INTERVAL_MS,
            max_polls: Self::MAX_POLLS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AutoCheckConfig {
    pub sweep_interval_secs: u64,
    pub max_concurrent_checks: usize,
}

impl AutoCheckConfig {
    const SWEEP_INTERVAL_SECS: u64 = 300;
    const MAX_CONCURRENT_CHECKS: usize = 4;

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    fn ensure_valid(&mut self) {
        if self.sweep_interval_secs == 0 {
            eprintln!(
                "Config error: sweep interval of 0 is invalid - using default of {}s",
                Self::SWEEP_INTERVAL_SECS
            );
            self.sweep_interval_secs = Self::SWEEP_INTERVAL_SECS;
        }
        if self.max_concurrent_checks == 0 {
            eprintln!(
                "Config error: max_concurrent_checks of 0 is invalid - using default of {}",
                Self::MAX_CONCURRENT_CHECKS
            );
            self.max_concurrent_checks = Self::MAX_CONCURRENT_CHECKS;
        }
    }
}

impl Default for AutoCheckConfig {
    fn default() -> Self {
        AutoCheckConfig {
            sweep_interval_secs: Self::SWEEP_INTERVAL_SECS,
            max_concurrent_checks: Self::MAX_CONCURRENT_CHECKS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub checker: CheckerConfig,
    pub auto_check: AutoCheckConfig,
}

pub fn get_config_path(project_dirs: &ProjectDirs) -> PathBuf {
    project_dirs.data_local_dir().join("config.toml")
}

impl Config {
    /// Loads the configuration from a TOML file located in the app's data directory,
    /// with `DOMAINWATCH_*` environment variables layered on top.
    /// If the file is missing or fails to parse, defaults are used.
    /// Additionally, writes the default config to disk if no file exists.
    pub fn load_config(project_dirs: &ProjectDirs) -> Self {
        let config_path = get_config_path(project_dirs);

        if !config_path.exists() {
            Self::write_default(&config_path);
        }

        Self::load_from(&config_path)
    }

    fn write_default(config_path: &Path) {
        if let Some(parent) = config_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!(
                    "Failed to create configuration directory {}: {}",
                    parent.display(),
                    e
                );
            }
        }
        match toml::to_string_pretty(&Config::default()) {
            Ok(toml_string) => {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            }
            Err(_) => eprintln!("Failed to serialize default config."),
        }
    }

    fn load_from(config_path: &Path) -> Self {
        let default_config = Config::default();

        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    /// Directory holding the database, honoring `database.dir` when set
    pub fn database_dir(&self, project_dirs: &ProjectDirs) -> PathBuf {
        match &self.database.dir {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
            _ => project_dirs.data_local_dir().to_path_buf(),
        }
    }

    pub fn get_server_host() -> String {
        CONFIG
            .get()
            .map(|c| c.server.host.clone())
            .unwrap_or_else(|| ServerConfig::HOST.to_string())
    }

    pub fn get_server_port() -> u16 {
        CONFIG
            .get()
            .map(|c| c.server.port)
            .unwrap_or(ServerConfig::PORT)
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.server.ensure_valid();
        self.checker.ensure_valid();
        self.auto_check.ensure_valid();
    }
}
