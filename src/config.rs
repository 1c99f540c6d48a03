//! Instrument session configuration using Figment
//!
//! Settings are loaded from, in increasing order of precedence:
//! 1. Built-in defaults
//! 2. A TOML file
//! 3. Environment variables prefixed with `RUST_IVI_`
//!
//! ```toml
//! resource = "TCPIP0::192.168.1.50::5025::SOCKET"
//! id_query = true
//! reset = false
//! timeout_ms = 2000
//!
//! [[channels]]
//! name = "output1"
//! voltage_max = 30.0
//! current_max = 5.0
//! ovp_max = 30.0
//! ```
//!
//! ```text
//! RUST_IVI_SIMULATE=true
//! RUST_IVI_RESOURCE="ASRL/dev/ttyUSB0::INSTR"
//! ```

use crate::error::{IviError, IviResult};
use crate::instrument::range::RangeSpec;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Settings for one instrument session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSettings {
    /// Resource string (e.g. "TCPIP0::10.0.0.5::5025::SOCKET", "ASRL/dev/ttyUSB0::INSTR")
    #[serde(default)]
    pub resource: String,
    /// Skip all physical I/O; values are stored as-if-written
    #[serde(default)]
    pub simulate: bool,
    /// Verify the instrument model during initialization
    #[serde(default)]
    pub id_query: bool,
    /// Send `*RST` during initialization
    #[serde(default)]
    pub reset: bool,
    /// Read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Terminator appended to every outgoing command
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,
    /// Baud rate for serial resources
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Time the instrument needs to finish `*TST?` before the result is read
    #[serde(default = "default_self_test_wait_ms")]
    pub self_test_wait_ms: u64,
    /// Pause after selecting a channel before switching its output
    #[serde(default = "default_output_settle_ms")]
    pub output_settle_ms: u64,
    /// Per-channel range table overriding the model defaults
    #[serde(default)]
    pub channels: Option<Vec<ChannelConfig>>,
}

/// One row of the per-channel capability table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    /// Name used to address the channel (e.g. "output1")
    pub name: String,
    /// Voltage bound; a negative value makes the channel negative-only
    pub voltage_max: f64,
    /// Current bound, signed like `voltage_max`
    pub current_max: f64,
    /// Over-voltage protection bound, defaults to `voltage_max`
    #[serde(default)]
    pub ovp_max: Option<f64>,
}

impl ChannelConfig {
    /// Bounds for this channel as the range checks consume them.
    pub fn range_spec(&self) -> RangeSpec {
        RangeSpec {
            voltage_max: self.voltage_max,
            current_max: self.current_max,
            ovp_max: self.ovp_max.unwrap_or(self.voltage_max),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_line_terminator() -> String {
    "\n".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_self_test_wait_ms() -> u64 {
    60_000
}

fn default_output_settle_ms() -> u64 {
    100
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            resource: String::new(),
            simulate: false,
            id_query: false,
            reset: false,
            timeout_ms: default_timeout_ms(),
            line_terminator: default_line_terminator(),
            baud_rate: default_baud_rate(),
            self_test_wait_ms: default_self_test_wait_ms(),
            output_settle_ms: default_output_settle_ms(),
            channels: None,
        }
    }
}

impl InstrumentSettings {
    /// Settings for a simulated session with no resource.
    pub fn simulated() -> Self {
        Self {
            simulate: true,
            ..Self::default()
        }
    }

    /// Load settings from a TOML file, then apply `RUST_IVI_` environment overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> IviResult<Self> {
        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RUST_IVI_"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from an in-memory TOML document (no environment overrides).
    pub fn from_toml_str(toml: &str) -> IviResult<Self> {
        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Semantic checks that pass parsing but would break a session.
    pub fn validate(&self) -> IviResult<()> {
        if !self.simulate && self.resource.trim().is_empty() {
            return Err(IviError::Configuration(
                "'resource' cannot be empty unless simulate = true".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(IviError::Configuration(
                "'timeout_ms' must be > 0".to_string(),
            ));
        }

        if let Some(channels) = &self.channels {
            if channels.is_empty() {
                return Err(IviError::Configuration(
                    "'channels' must list at least one channel".to_string(),
                ));
            }
            let mut names = HashSet::new();
            for channel in channels {
                if channel.name.trim().is_empty() {
                    return Err(IviError::Configuration(
                        "channel name cannot be empty".to_string(),
                    ));
                }
                if !names.insert(channel.name.as_str()) {
                    return Err(IviError::Configuration(format!(
                        "Duplicate channel name: '{}'",
                        channel.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Overall read timeout for transports.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay between sending `*TST?` and reading its result.
    pub fn self_test_wait(&self) -> Duration {
        Duration::from_millis(self.self_test_wait_ms)
    }

    /// Pause after selecting an output, before switching it.
    pub fn output_settle(&self) -> Duration {
        Duration::from_millis(self.output_settle_ms)
    }
}
