/// This module implements the SCPI messages and commands used to drive an Infiniium scope
use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const TERMINATION: &str = "\n";

pub const IDN_QUERY: &str = "*IDN?";
pub const OPC_QUERY: &str = "*OPC?";
pub const PRESET_DEFAULT: &str = ":SYSTem:PRESet DEFault";

pub const DEFAULT_VERTICAL_SCALE_MV: f64 = 50.0;
pub const DEFAULT_TIMESCALE_NS: f64 = 100.0;

/// Value returned by Infiniium measurements which could not be made,
/// e.g. a period query without a signal on the channel.
pub const INVALID_MEASUREMENT: f64 = 9.99999e37;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScpiRequest {
    Write(String),
    QueryString(String),
    ReadLine,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScpiResponse {
    Done,
    String(String),
}

impl ScpiResponse {
    pub fn into_string(self) -> Result<String> {
        match self {
            ScpiResponse::String(x) => Ok(x),
            ScpiResponse::Done => Err(Error::internal(anyhow!("Expected a string response."))),
        }
    }
}

/// An analog input channel, rendered as `CHANnel<n>`. Channels count from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(pub u8);

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(number: u8) -> Result<Self> {
        if number == 0 {
            return Err(Error::argument(anyhow!("Channels are numbered from 1")));
        }
        Ok(Channel(number))
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel(1)
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "CHANnel{}", self.0)
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        let number = upper
            .strip_prefix("CHANNEL")
            .or_else(|| upper.strip_prefix("CHAN"))
            .unwrap_or(&upper);
        let number = number
            .parse::<u8>()
            .map_err(|_| Error::argument(anyhow!("Invalid channel: `{}`", s)))?;
        Channel::try_from(number)
    }
}

/// Signal edge a measurement is taken on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Rising,
    Falling,
}

impl Default for Edge {
    fn default() -> Self {
        Edge::Rising
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Rising => f.write_str("RISing"),
            Edge::Falling => f.write_str("FALLing"),
        }
    }
}

impl FromStr for Edge {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "RIS" | "RISING" => Ok(Edge::Rising),
            "FALL" | "FALLING" => Ok(Edge::Falling),
            _ => Err(Error::argument(anyhow!("Invalid edge: `{}`", s))),
        }
    }
}

/// Vendor control command setting the channel 1 scale. Takes mV/div, sends V/div.
pub fn vertical_scale_command(millivolts_per_division: f64) -> String {
    format!(
        ":SYSTem:CONTrol \"Chan1Scale -1 {}\"",
        millivolts_per_division / 1000.0
    )
}

/// Takes ns/div, sends s/div.
pub fn timescale_command(nanoseconds_per_division: f64) -> String {
    format!(":TIMebase:SCALe {:e}", nanoseconds_per_division / 1e9)
}

pub fn period_command(channel: Channel, edge: Edge) -> String {
    format!(":MEASure:PERiod {}, {}", channel, edge)
}

/// `*OPC?` answers `1` once all pending operations are done.
pub fn is_operation_complete(response: &str) -> bool {
    response.contains('1')
}

/// Parse a numeric response, ignoring the line terminator.
pub fn parse_numeric(s: &str) -> Result<f64> {
    let trimmed = s.trim_end_matches(|c| c == '\n' || c == '\r').trim();
    trimmed
        .parse::<f64>()
        .map_err(|err| Error::format(s, Some(err)))
}
