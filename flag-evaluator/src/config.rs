use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;
use once_cell::sync::Lazy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {}", s)),
        }
    }
}

impl From<FlexBool> for bool {
    fn from(flex: FlexBool) -> Self {
        flex.0
    }
}

impl Deref for FlexBool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: FlexBool,

    #[envconfig(from = "DEFINITIONS_PATH", default = "flag_definitions.json")]
    pub definitions_path: PathBuf,

    #[envconfig(from = "POLL_INTERVAL_SECS", default = "30")]
    pub poll_interval_secs: u64,

    // How many (distinct_id, flag) pairs we remember having reported
    #[envconfig(from = "MAX_REPORTED_FLAGS", default = "50000")]
    pub max_reported_flags: u64,

    #[envconfig(from = "SEND_FEATURE_FLAG_EVENTS", default = "true")]
    pub send_feature_flag_events: FlexBool,

    #[envconfig(from = "DISABLE_GEOIP", default = "false")]
    pub disable_geoip: FlexBool,
}

pub static DEFAULT_TEST_CONFIG: Lazy<Config> = Lazy::new(Config::default_test_config);

impl Config {
    pub fn default_test_config() -> Self {
        Self {
            debug: FlexBool(false),
            definitions_path: PathBuf::from("flag_definitions.json"),
            poll_interval_secs: 30,
            max_reported_flags: 50_000,
            send_feature_flag_events: FlexBool(true),
            disable_geoip: FlexBool(false),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        // a zero interval would make tokio's interval panic
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
