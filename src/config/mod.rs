use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use log::{debug, info, LevelFilter};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "poolbridge.toml";
const ENV_PREFIX: &str = "POOLBRIDGE";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SensorConfig {
    pub key: String,
    pub port: String,
    #[serde(rename = "type")]
    pub label: String,
}

impl SensorConfig {
    pub fn new(key: &str, port: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            port: port.to_string(),
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControllerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://10.0.101.253:4200".to_string(),
            timeout_secs: 5,
        }
    }
}

impl ControllerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Line settings and timings for the EZO circuits.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub timeout_ms: u64,
    /// Pause between clearing the buffers and sending the command.
    pub settle_ms: u64,
    /// Time the circuit needs to take a reading after `R`.
    pub response_ms: u64,
    /// Directory scanned for `ttyUSB*`/`ttyACM*` nodes at startup.
    pub dev_dir: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout_ms: 2000,
            settle_ms: 100,
            response_ms: 600,
            dev_dir: "/dev".to_string(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sensors() -> Vec<SensorConfig> {
    vec![
        SensorConfig::new("ph", "/dev/ttyUSB0", "pH"),
        SensorConfig::new("orp", "/dev/ttyUSB1", "ORP"),
        SensorConfig::new("ec", "/dev/ttyUSB2", "EC"),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_sensors")]
    pub sensors: Vec<SensorConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            polling: PollingConfig::default(),
            serial: SerialConfig::default(),
            logging: LoggingConfig::default(),
            sensors: default_sensors(),
        }
    }
}

impl AppConfig {
    /// Loads `poolbridge.toml` from the working directory if it exists,
    /// falling back to the compiled defaults for anything it leaves out.
    pub fn new() -> Result<Self> {
        Self::load(Path::new(DEFAULT_CONFIG_FILE), false)
    }

    pub fn get_log_level(&self) -> LevelFilter {
        match self.logging.level.to_lowercase().as_str() {
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            "off" => LevelFilter::Off,
            _ => LevelFilter::Info, // Default to Info if invalid
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(path.as_ref(), true)
    }

    fn load(config_path: &Path, required: bool) -> Result<Self> {
        debug!("Loading configuration from {}", config_path.display());

        let config = Config::builder()
            .add_source(
                File::from(config_path)
                    .format(FileFormat::Toml)
                    .required(required),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context(format!("Failed to load config from {}", config_path.display()))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize config")?;

        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sensors.is_empty() {
            bail!("At least one sensor must be configured");
        }

        let mut keys = HashSet::new();
        for sensor in &self.sensors {
            if sensor.key.trim().is_empty() {
                bail!("Sensor on {} has an empty key", sensor.port);
            }
            if !keys.insert(sensor.key.to_lowercase()) {
                bail!("Sensor key '{}' is configured more than once", sensor.key);
            }
        }

        if self.polling.interval_secs == 0 {
            bail!("Polling interval must be at least one second");
        }

        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config_path = path.as_ref();

        let mut config_str = String::new();

        config_str.push_str(&format!(
            "[controller]\nbase_url = {:?}\ntimeout_secs = {}\n\n",
            self.controller.base_url, self.controller.timeout_secs
        ));

        config_str.push_str(&format!(
            "[polling]\ninterval_secs = {}\n\n",
            self.polling.interval_secs
        ));

        config_str.push_str(&format!(
            "[serial]\nbaud_rate = {}\ntimeout_ms = {}\nsettle_ms = {}\nresponse_ms = {}\ndev_dir = {:?}\n\n",
            self.serial.baud_rate,
            self.serial.timeout_ms,
            self.serial.settle_ms,
            self.serial.response_ms,
            self.serial.dev_dir
        ));

        config_str.push_str(&format!("[logging]\nlevel = {:?}\n", self.logging.level));

        for sensor in &self.sensors {
            config_str.push_str(&format!(
                "\n[[sensors]]\nkey = {:?}\nport = {:?}\ntype = {:?}\n",
                sensor.key, sensor.port, sensor.label
            ));
        }

        fs::write(config_path, config_str)
            .context(format!("Failed to save config to {}", config_path.display()))?;

        info!("Configuration saved to {}", config_path.display());
        Ok(())
    }
}
