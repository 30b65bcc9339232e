//! # Protocol types for talking to Infiniium oscilloscopes
//!
//! This crate holds everything that does not depend on a transport:
//!
//!  * [`ScpiRequest`] / [`ScpiResponse`] - the messages exchanged with a transport
//!  * [`scpi`] - the SCPI commands used to drive the scope
//!  * [`Identity`] - a parsed `*IDN?` response
//!  * [`firmware`] - firmware version comparison
//!
//! Errors are captured in the [`enum@Error`] type.

pub mod error;
pub mod firmware;
pub mod identity;
pub mod scpi;

pub use crate::error::{Error, ProtocolError, Result, TransportError};
pub use crate::firmware::{FirmwareAge, FirmwareVersion};
pub use crate::identity::Identity;
pub use crate::scpi::{parse_numeric, Channel, Edge, ScpiRequest, ScpiResponse};
