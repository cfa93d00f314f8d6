use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub inventory: InventoryConfig,
    pub reconciliation: ReconciliationConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Datasource ids of the three container queries
    pub by_serial_datasource: u32,
    pub by_part_datasource: u32,
    pub by_master_unit_datasource: u32,
    /// Containers in locations with these prefixes are hidden from part
    /// listings (blocked storage areas)
    #[serde(default)]
    pub excluded_location_prefixes: Vec<String>,
    /// Serve from the in-memory mock instead of the ERP
    #[serde(default)]
    pub use_mock: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconciliationConfig {
    pub interval_seconds: u64,
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,
    pub production_locations: Vec<String>,
}

fn default_probe_delay_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
}

fn default_item_delay_ms() -> u64 {
    200
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of MILKRUN)
            .add_source(config::Environment::with_prefix("MILKRUN").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
