//! # Remote control of Keysight Infiniium oscilloscopes
//!
//! [`Infiniium`] wraps a [`transport::Transport`] and exposes the scope as a
//! typed session: identity metadata, timebase and vertical setup, operation
//! complete polling. Period measurements live in [`measure`].
//!
//! ```no_run
//! # async fn run() -> infiniium::Result<()> {
//! use infiniium::{Infiniium, SessionConfig};
//!
//! let config = SessionConfig::new("TCPIP0::192.168.1.20::hislip0::INSTR");
//! let mut scope = Infiniium::connect(&config).await?;
//! scope.default_setup().await?;
//! scope.set_timescale(100.0).await?;
//! let period = infiniium::measure::period(&mut scope, Default::default(), Default::default()).await?;
//! println!("Period is {}", period);
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate dlopen_derive;
#[macro_use]
extern crate lazy_static;

pub mod address;
pub mod config;
pub mod measure;
pub mod session;
pub mod transport;

pub use infiniium_protocol as protocol;
pub use infiniium_protocol::{Error, Result};

pub use crate::address::Address;
pub use crate::config::SessionConfig;
pub use crate::session::{Infiniium, PollOptions};
