//! Instrument profile loading and validation.
//!
//! A profile is a YAML document with one entry per CPC channel. It is loaded through
//! `figment` so that top-level values can be overridden from the environment with the
//! `CPC_DAQ_` prefix (nested keys separated by `__`, e.g. `CPC_DAQ_OUTPUT__DIRECTORY`).
//!
//! ```yaml
//! interval_secs: 1.0
//! output:
//!   directory: data
//!   file_prefix: MANY
//! channels:
//!   - name: "3776"
//!     serial: { port: /dev/ttyUSB0, baud: 115200 }
//!     poll_commands: ["RALL"]
//!     fields: [cpc_name, datetime, concentration, "1 second counts"]
//!     flow_rate: 5.0
//! ```
//!
//! Profiles written for the original acquisition scripts (`num_cpcs` plus `cpc1..cpcN`
//! sections) are still accepted and converted on load.
use crate::error::ConfigError;
use crate::record::FIRST_TOKEN_SLOT;
use crate::validation::{first_duplicate, is_in_range, is_not_empty, is_positive_seconds, seconds_to_duration};
use chrono::format::{Item, StrftimeItems};
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment prefix for profile overrides.
pub const ENV_PREFIX: &str = "CPC_DAQ_";

/// Top-level acquisition profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Logging output format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Synchronizer tick in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: f64,
    /// Per-channel queue bound; 0 means unbounded
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// CSV output settings
    #[serde(default)]
    pub output: OutputConfig,
    /// Channels in row order
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

/// Log output format selectable from the profile.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human oriented
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Where and how synchronized rows are logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write CSV files at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Root under which per-day directories are created
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    /// File name prefix, followed by the creation timestamp
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Text written for values a channel did not deliver
    #[serde(default = "default_missing_marker")]
    pub missing_marker: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            directory: default_output_dir(),
            file_prefix: default_file_prefix(),
            missing_marker: default_missing_marker(),
        }
    }
}

/// Serial parity. Accepts the single-letter pyserial spellings as well.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit
    #[default]
    #[serde(alias = "N")]
    None,
    /// Even parity
    #[serde(alias = "E")]
    Even,
    /// Odd parity
    #[serde(alias = "O")]
    Odd,
}

/// Transport parameters for one channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialSettings {
    /// Port identifier (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Data bits, 5-8
    #[serde(default = "default_byte_size")]
    pub byte_size: u8,
    /// Parity
    #[serde(default)]
    pub parity: Parity,
    /// Stop bits, 1 or 2
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Read timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
}

impl SerialSettings {
    /// Settings for `port` with every other value at its default.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud: default_baud(),
            byte_size: default_byte_size(),
            parity: Parity::default(),
            stop_bits: default_stop_bits(),
            timeout_secs: default_timeout(),
        }
    }

    /// Read timeout. Zero when `timeout_secs` does not validate.
    pub fn timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_secs).unwrap_or_default()
    }
}

/// Static description of one CPC channel. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Logical channel name, also the first value of every record
    pub name: String,
    /// Serial port parameters
    pub serial: SerialSettings,
    /// Sent once at connect, and again on periodic resync
    #[serde(default)]
    pub start_commands: Vec<String>,
    /// Read and discard one line after each start command; otherwise settle and flush
    #[serde(default = "default_enabled")]
    pub startup_reply: bool,
    /// Send the wall-clock date and time after the start commands
    #[serde(default)]
    pub set_time: bool,
    /// strftime patterns for the time-sync commands
    #[serde(default = "default_time_formats")]
    pub time_formats: Vec<String>,
    /// Pause after a command whose reply is not read, before flushing input
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Sent every tick; empty means the device streams one line per interval
    #[serde(default)]
    pub poll_commands: Vec<String>,
    /// Appended to every poll command
    #[serde(default = "default_command_terminator")]
    pub command_terminator: String,
    /// Appended to start and time-sync commands
    #[serde(default = "default_start_terminator")]
    pub start_terminator: String,
    /// Token separator in device responses
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Column names. Slot 0 holds the channel name, slot 1 the capture timestamp,
    /// the rest are filled positionally from the response tokens.
    pub fields: Vec<String>,
    /// Flow rate used to turn raw counts into a concentration
    #[serde(default = "default_flow_rate")]
    pub flow_rate: f64,
    /// Device already reports a final concentration; skip normalization
    #[serde(default)]
    pub default_flow: bool,
    /// Field holding the raw count used for normalization
    #[serde(default = "default_count_field")]
    pub count_field: String,
    /// Field overwritten with `count / flow_rate` when normalizing
    #[serde(default = "default_concentration_field")]
    pub concentration_field: String,
    /// Nominal poll interval in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: f64,
    /// Re-run the start commands whenever this many wall-clock seconds roll over
    #[serde(default)]
    pub periodic_resync_secs: Option<u64>,
}

impl ChannelConfig {
    /// A streaming channel on `port` that reports concentration as the device sends it.
    ///
    /// Unlike a channel deserialized from a profile, where `default_flow` defaults to
    /// `false`, this sets `default_flow: true` so no normalization happens until the
    /// caller sets `default_flow = false` and a `flow_rate`.
    pub fn new(name: impl Into<String>, port: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            serial: SerialSettings::new(port),
            start_commands: Vec::new(),
            startup_reply: true,
            set_time: false,
            time_formats: default_time_formats(),
            settle_ms: default_settle_ms(),
            poll_commands: Vec::new(),
            command_terminator: default_command_terminator(),
            start_terminator: default_start_terminator(),
            delimiter: default_delimiter(),
            fields,
            flow_rate: default_flow_rate(),
            default_flow: true,
            count_field: default_count_field(),
            concentration_field: default_concentration_field(),
            interval_secs: default_interval(),
            periodic_resync_secs: None,
        }
    }

    /// Whether a concentration is derived from the raw count.
    pub fn normalizes(&self) -> bool {
        !self.default_flow
    }

    /// Nominal poll interval. Zero when `interval_secs` does not validate.
    pub fn interval(&self) -> Duration {
        seconds_to_duration(self.interval_secs).unwrap_or_default()
    }

    /// Settle delay as a `Duration`.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Check the channel in isolation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            channel: self.name.clone(),
            reason: reason.to_string(),
        };

        is_not_empty(&self.name).map_err(|e| invalid(&format!("name: {e}")))?;
        is_not_empty(&self.serial.port).map_err(|e| invalid(&format!("port: {e}")))?;
        if is_positive_seconds(self.interval_secs).is_err() {
            return Err(ConfigError::NonPositiveInterval {
                owner: self.name.clone(),
                value: self.interval_secs,
            });
        }
        is_positive_seconds(self.serial.timeout_secs)
            .map_err(|e| invalid(&format!("timeout_secs: {e}")))?;
        if self.serial.baud == 0 {
            return Err(invalid("baud must be greater than 0"));
        }
        is_in_range(self.serial.byte_size, 5..=8)
            .map_err(|_| invalid(&format!("byte_size {} is not 5-8", self.serial.byte_size)))?;
        is_in_range(self.serial.stop_bits, 1..=2)
            .map_err(|_| invalid(&format!("stop_bits {} is not 1 or 2", self.serial.stop_bits)))?;
        if self.delimiter.is_empty() {
            return Err(invalid("delimiter cannot be empty"));
        }
        if self.fields.len() < 2 {
            return Err(invalid(
                "fields must name at least the channel-name and timestamp columns",
            ));
        }
        if let Some(dup) = first_duplicate(&self.fields) {
            return Err(invalid(&format!("field '{dup}' is listed twice")));
        }
        if self.set_time {
            for pattern in &self.time_formats {
                if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                    return Err(invalid(&format!("time format '{pattern}' is not a valid strftime pattern")));
                }
            }
        }
        if self.periodic_resync_secs == Some(0) {
            return Err(invalid("periodic_resync_secs must be greater than 0"));
        }
        if self.normalizes() {
            if !(self.flow_rate.is_finite() && self.flow_rate > 0.0) {
                return Err(invalid("flow_rate must be positive when normalization is enabled"));
            }
            if self.count_field == self.concentration_field {
                return Err(invalid("count_field and concentration_field must be different fields"));
            }
            for required in [&self.count_field, &self.concentration_field] {
                match self.fields.iter().position(|f| f == required) {
                    None => {
                        return Err(invalid(&format!(
                            "normalization is enabled but '{required}' is not in fields"
                        )))
                    }
                    Some(slot) if slot < FIRST_TOKEN_SLOT => {
                        return Err(invalid(&format!(
                            "'{required}' is in slot {slot}, which holds the channel name or timestamp"
                        )))
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            interval_secs: default_interval(),
            queue_capacity: default_queue_capacity(),
            output: OutputConfig::default(),
            channels: Vec::new(),
        }
    }
}

impl Profile {
    /// Read a profile from a YAML file, apply environment overrides and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::BadFilePath(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        let profile = if is_legacy(&serde_yaml::from_str(&raw)?) {
            Self::from_legacy(&raw)?
        } else {
            Figment::new()
                .merge(Yaml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__"))
                .extract::<Self>()?
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Parse and validate a profile held in memory. No environment overrides.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let profile = if is_legacy(&serde_yaml::from_str(yaml)?) {
            Self::from_legacy(yaml)?
        } else {
            Figment::from(Yaml::string(yaml)).extract::<Self>()?
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Convert a profile written for the original scripts.
    fn from_legacy(yaml: &str) -> Result<Self, ConfigError> {
        let legacy: serde_yaml::Mapping = serde_yaml::from_str(yaml)?;
        let count = match legacy.get("num_cpcs").and_then(serde_yaml::Value::as_u64) {
            Some(n) => n as usize,
            None => (1..)
                .take_while(|i| legacy.contains_key(format!("cpc{i}").as_str()))
                .count(),
        };

        let mut channels = Vec::with_capacity(count);
        for i in 1..=count {
            let key = format!("cpc{i}");
            let section = legacy.get(key.as_str()).ok_or_else(|| {
                ConfigError::Validation(format!("legacy profile declares {count} CPCs but '{key}' is missing"))
            })?;
            let channel: LegacyChannel = serde_yaml::from_value(section.clone())?;
            channels.push(ChannelConfig::from(channel));
        }

        Ok(Self {
            channels,
            ..Self::default()
        })
    }

    /// Validate the whole profile once, before anything is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::Validation("profile defines no channels".into()));
        }
        if is_positive_seconds(self.interval_secs).is_err() {
            return Err(ConfigError::NonPositiveInterval {
                owner: "synchronizer".into(),
                value: self.interval_secs,
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }
        if let Some(dup) = first_duplicate(self.channels.iter().map(|c| &c.name)) {
            return Err(ConfigError::Validation(format!("Duplicate channel name: {dup}")));
        }
        for channel in &self.channels {
            channel.validate()?;
        }
        Ok(())
    }

    /// Synchronizer tick. Zero when `interval_secs` does not validate.
    pub fn interval(&self) -> Duration {
        seconds_to_duration(self.interval_secs).unwrap_or_default()
    }

    /// Queue bound, `None` when unbounded.
    pub fn queue_bound(&self) -> Option<usize> {
        (self.queue_capacity > 0).then_some(self.queue_capacity)
    }

    /// A single-channel profile suitable as a starting point.
    pub fn template() -> Self {
        let mut channel = ChannelConfig::new(
            "cpc1",
            "/dev/ttyUSB0",
            vec![
                "cpc_name".into(),
                "datetime".into(),
                "concentration".into(),
                "1 second counts".into(),
            ],
        );
        channel.poll_commands = vec!["RALL".into()];
        channel.default_flow = false;
        channel.flow_rate = 16.67;
        Self {
            channels: vec![channel],
            ..Self::default()
        }
    }
}

/// Whether a parsed document uses the `cpc1..cpcN` layout.
fn is_legacy(doc: &serde_yaml::Value) -> bool {
    doc.get("channels").is_none() && (doc.get("num_cpcs").is_some() || doc.get("cpc1").is_some())
}

/// One `cpcN` section of a legacy profile.
#[derive(Debug, Deserialize)]
struct LegacyChannel {
    cpc_name: String,
    serial_port: String,
    #[serde(default = "default_baud")]
    serial_baud: u32,
    #[serde(default = "default_byte_size")]
    serial_bytesize: u8,
    #[serde(default)]
    serial_parity: Parity,
    #[serde(default = "default_timeout")]
    serial_timeout: f64,
    #[serde(default)]
    start_commands: Option<Vec<String>>,
    #[serde(default)]
    set_time: bool,
    #[serde(default)]
    serial_commands: Option<Vec<String>>,
    cpc_header: Vec<String>,
    #[serde(default = "default_flow_rate")]
    cpc_flowrate: f64,
    #[serde(default)]
    default_flow: bool,
}

impl From<LegacyChannel> for ChannelConfig {
    fn from(legacy: LegacyChannel) -> Self {
        let mut channel = ChannelConfig::new(legacy.cpc_name, legacy.serial_port, legacy.cpc_header);
        channel.serial.baud = legacy.serial_baud;
        channel.serial.byte_size = legacy.serial_bytesize;
        channel.serial.parity = legacy.serial_parity;
        channel.serial.timeout_secs = legacy.serial_timeout;
        channel.start_commands = legacy.start_commands.unwrap_or_default();
        channel.set_time = legacy.set_time;
        channel.poll_commands = legacy.serial_commands.unwrap_or_default();
        channel.flow_rate = legacy.cpc_flowrate;
        channel.default_flow = legacy.default_flow;
        channel
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval() -> f64 {
    1.0
}

fn default_queue_capacity() -> usize {
    8
}

fn default_enabled() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_prefix() -> String {
    "MANY".to_string()
}

fn default_missing_marker() -> String {
    "nan".to_string()
}

fn default_baud() -> u32 {
    9600
}

fn default_byte_size() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout() -> f64 {
    1.0
}

fn default_time_formats() -> Vec<String> {
    vec!["rtc,%y/%m/%d".to_string(), "rtc,%H:%M:%S".to_string()]
}

fn default_settle_ms() -> u64 {
    100
}

fn default_command_terminator() -> String {
    "\r".to_string()
}

fn default_start_terminator() -> String {
    "\r\n".to_string()
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_flow_rate() -> f64 {
    1.0
}

fn default_count_field() -> String {
    "1 second counts".to_string()
}

fn default_concentration_field() -> String {
    "concentration".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
interval_secs: 1.0
output:
  directory: data
channels:
  - name: "3776"
    serial: { port: /dev/ttyUSB0, baud: 115200, parity: E, byte_size: 7 }
    poll_commands: ["RALL"]
    fields: [cpc_name, datetime, concentration, "1 second counts"]
    flow_rate: 5.0
  - name: "3025"
    serial: { port: /dev/ttyUSB1 }
    fields: [cpc_name, datetime, concentration]
    default_flow: true
    periodic_resync_secs: 60
"#;

    #[test]
    fn test_load_profile() {
        let profile = Profile::from_yaml_str(PROFILE).unwrap();
        assert_eq!(profile.channels.len(), 2);
        assert_eq!(profile.output.directory, PathBuf::from("data"));
        assert_eq!(profile.output.missing_marker, "nan");

        let first = &profile.channels[0];
        assert_eq!(first.serial.parity, Parity::Even);
        assert_eq!(first.serial.byte_size, 7);
        assert_eq!(first.command_terminator, "\r");
        assert!(first.normalizes());

        let second = &profile.channels[1];
        assert!(second.poll_commands.is_empty());
        assert_eq!(second.serial.baud, 9600);
        assert_eq!(second.periodic_resync_secs, Some(60));
        assert!(!second.normalizes());
    }

    #[test]
    fn test_zero_interval_is_fatal() {
        let yaml = PROFILE.replacen("interval_secs: 1.0", "interval_secs: 0.0", 1);
        assert!(matches!(
            Profile::from_yaml_str(&yaml),
            Err(ConfigError::NonPositiveInterval { .. })
        ));

        let mut profile = Profile::from_yaml_str(PROFILE).unwrap();
        profile.channels[1].interval_secs = -1.0;
        match profile.validate() {
            Err(ConfigError::NonPositiveInterval { owner, .. }) => assert_eq!(owner, "3025"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unrepresentable_intervals_rejected() {
        for value in ["1.0e20", "1.0e-12"] {
            let yaml = PROFILE.replacen("interval_secs: 1.0", &format!("interval_secs: {value}"), 1);
            assert!(
                matches!(
                    Profile::from_yaml_str(&yaml),
                    Err(ConfigError::NonPositiveInterval { .. })
                ),
                "interval {value} accepted"
            );
        }

        let mut profile = Profile::from_yaml_str(PROFILE).unwrap();
        profile.channels[0].interval_secs = 1.0e20;
        assert!(profile.validate().is_err());
        assert_eq!(profile.channels[0].interval(), Duration::ZERO);
        profile.channels[0].interval_secs = 1.0e-12;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_unrepresentable_timeout_rejected() {
        let mut profile = Profile::from_yaml_str(PROFILE).unwrap();
        for value in [1.0e20, 1.0e-12] {
            profile.channels[1].serial.timeout_secs = value;
            assert!(matches!(
                profile.validate(),
                Err(ConfigError::Invalid { ref channel, .. }) if channel == "3025"
            ));
            assert_eq!(profile.channels[1].serial.timeout(), Duration::ZERO);
        }
    }

    #[test]
    fn test_normalization_requires_fields() {
        let mut profile = Profile::from_yaml_str(PROFILE).unwrap();
        profile.channels[0].fields.retain(|f| f != "concentration");
        assert!(matches!(
            profile.validate(),
            Err(ConfigError::Invalid { ref channel, .. }) if channel == "3776"
        ));

        let mut profile = Profile::from_yaml_str(PROFILE).unwrap();
        profile.channels[0].flow_rate = 0.0;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_normalization_fields_cannot_overlap_reserved_slots() {
        let mut profile = Profile::from_yaml_str(PROFILE).unwrap();
        profile.channels[0].count_field = "datetime".into();
        assert!(matches!(
            profile.validate(),
            Err(ConfigError::Invalid { ref reason, .. }) if reason.contains("slot 1")
        ));

        let mut profile = Profile::from_yaml_str(PROFILE).unwrap();
        profile.channels[0].concentration_field = "cpc_name".into();
        assert!(profile.validate().is_err());

        let mut profile = Profile::from_yaml_str(PROFILE).unwrap();
        profile.channels[0].concentration_field = "1 second counts".into();
        assert!(matches!(
            profile.validate(),
            Err(ConfigError::Invalid { ref reason, .. }) if reason.contains("different")
        ));

        // the same names are fine when normalization is off
        profile.channels[0].default_flow = true;
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_bad_time_format_rejected() {
        let mut profile = Profile::from_yaml_str(PROFILE).unwrap();
        profile.channels[0].set_time = true;
        assert!(profile.validate().is_ok());
        profile.channels[0].time_formats = vec!["rtc,%Q".into()];
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_constructed_and_loaded_flow_defaults() {
        let fields = vec!["cpc_name".into(), "datetime".into(), "concentration".into(), "1 second counts".into()];
        assert!(!ChannelConfig::new("3776", "COM1", fields).normalizes());

        let yaml = r#"
channels:
  - name: "3776"
    serial: { port: COM1 }
    fields: [cpc_name, datetime, concentration, "1 second counts"]
"#;
        assert!(Profile::from_yaml_str(yaml).unwrap().channels[0].normalizes());
    }

    #[test]
    fn test_duplicate_channel_names() {
        let mut profile = Profile::from_yaml_str(PROFILE).unwrap();
        profile.channels[1].name = "3776".into();
        assert!(matches!(profile.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_empty_profile_rejected() {
        assert!(Profile::default().validate().is_err());
    }

    #[test]
    fn test_legacy_profile() {
        let yaml = r#"
num_cpcs: 2
cpc1:
  cpc_name: "3025_Jim's"
  serial_port: COM3
  serial_baud: 9600
  serial_bytesize: 7
  serial_parity: E
  serial_timeout: 1
  start_commands: ["X0"]
  set_time: false
  serial_commands: ["RD"]
  cpc_header: [cpc_name, datetime, concentration, "1 second counts"]
  cpc_flowrate: 5.0
  default_flow: false
cpc2:
  cpc_name: "3776"
  serial_port: COM4
  serial_baud: 115200
  serial_bytesize: 8
  serial_parity: N
  serial_timeout: 1
  start_commands: null
  serial_commands: null
  cpc_header: [cpc_name, datetime, concentration]
  cpc_flowrate: 1.0
  default_flow: true
"#;
        let profile = Profile::from_yaml_str(yaml).unwrap();
        let names: Vec<_> = profile.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["3025_Jim's", "3776"]);
        assert_eq!(profile.channels[0].start_commands, vec!["X0"]);
        assert_eq!(profile.channels[0].poll_commands, vec!["RD"]);
        assert_eq!(profile.channels[0].serial.parity, Parity::Even);
        assert!(profile.channels[1].start_commands.is_empty());
        assert!(profile.channels[1].poll_commands.is_empty());
    }

    #[test]
    fn test_template_is_valid() {
        let template = Profile::template();
        assert!(template.validate().is_ok());
        let yaml = serde_yaml::to_string(&template).unwrap();
        assert!(Profile::from_yaml_str(&yaml).is_ok());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Profile::load(Path::new("/definitely/not/here.yaml")),
            Err(ConfigError::BadFilePath(_))
        ));
    }
}
