use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::protocol::scpi::{DEFAULT_TIMESCALE_NS, DEFAULT_VERTICAL_SCALE_MV};
use crate::protocol::{Channel, Edge};
use crate::Error;

pub const DEFAULT_ADDRESS: &str = "TCPIP0::localhost::hislip0::INSTR";
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_OPC_INTERVAL_MS: u64 = 50;

/// Everything needed to open a session, loadable from TOML:
///
/// ```toml
/// address = "TCPIP0::141.121.39.192::hislip0::INSTR"
/// timeout_ms = 240000
/// visa_library = "C:\\Windows\\System32\\visa64.dll"
/// firmware_baseline = "6.5"
///
/// [measurement]
/// channel = 1
/// edge = "rising"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub address: String,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Overrides the VISA library that is loaded. Useful when several VISA
    /// implementations are installed side by side.
    pub visa_library: Option<PathBuf>,
    /// Oldest firmware the setup is known to work with.
    pub firmware_baseline: Option<String>,
    pub opc_interval_ms: u64,
    /// Upper bound for `*OPC?` polling, defaults to the command timeout.
    pub opc_timeout_ms: Option<u64>,
    pub measurement: MeasurementConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeasurementConfig {
    pub timescale_ns: f64,
    pub vertical_scale_mv: f64,
    pub channel: Channel,
    pub edge: Edge,
    /// Delay between taking the measurement and reporting it.
    pub hold_ms: u64,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            timescale_ns: DEFAULT_TIMESCALE_NS,
            vertical_scale_mv: DEFAULT_VERTICAL_SCALE_MV,
            channel: Channel::default(),
            edge: Edge::default(),
            hold_ms: 10_000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            visa_library: None,
            firmware_baseline: None,
            opc_interval_ms: DEFAULT_OPC_INTERVAL_MS,
            opc_timeout_ms: None,
            measurement: MeasurementConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn new<T: Into<String>>(address: T) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(data: &str) -> crate::Result<Self> {
        toml::from_str(data).map_err(Error::argument)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|err| {
            Error::argument(anyhow!("Cannot read config file `{}`: {}", path.display(), err))
        })?;
        Self::from_toml_str(&data)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn opc_interval(&self) -> Duration {
        Duration::from_millis(self.opc_interval_ms)
    }

    pub fn opc_timeout(&self) -> Duration {
        Duration::from_millis(self.opc_timeout_ms.unwrap_or(self.timeout_ms))
    }
}
