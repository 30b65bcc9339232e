//! Transports carry [`ScpiRequest`]s to the instrument.
//!
//! Both directions are line terminated with `\n`: the terminator is appended
//! to outgoing messages when missing and stripped from responses.

use std::time::Duration;

use async_trait::async_trait;

use crate::address::Address;
use crate::config::SessionConfig;
use crate::protocol::scpi::TERMINATION;
use crate::protocol::{ScpiRequest, ScpiResponse};

#[cfg(test)]
pub(crate) mod mock;
pub mod tcp;
pub mod visa;

pub use tcp::TcpTransport;
pub use visa::VisaTransport;

#[async_trait]
pub trait Transport: Send {
    async fn request(&mut self, req: ScpiRequest) -> crate::Result<ScpiResponse>;

    /// Timeout applied to every subsequent request.
    async fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()>;
}

/// Transport selected from a parsed [`Address`].
pub enum AnyTransport {
    Tcp(TcpTransport),
    Visa(VisaTransport),
}

impl AnyTransport {
    pub async fn open(config: &SessionConfig) -> crate::Result<Self> {
        match Address::parse(&config.address)? {
            Address::Socket { host, port } => {
                let transport =
                    TcpTransport::connect(&host, port, config.connect_timeout(), config.timeout()).await?;
                Ok(AnyTransport::Tcp(transport))
            }
            Address::Visa { resource } => {
                let transport =
                    VisaTransport::open(resource, config.visa_library.clone(), config.timeout()).await?;
                Ok(AnyTransport::Visa(transport))
            }
        }
    }
}

#[async_trait]
impl Transport for AnyTransport {
    async fn request(&mut self, req: ScpiRequest) -> crate::Result<ScpiResponse> {
        match self {
            AnyTransport::Tcp(x) => x.request(req).await,
            AnyTransport::Visa(x) => x.request(req).await,
        }
    }

    async fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()> {
        match self {
            AnyTransport::Tcp(x) => x.set_timeout(timeout).await,
            AnyTransport::Visa(x) => x.set_timeout(timeout).await,
        }
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn request(&mut self, req: ScpiRequest) -> crate::Result<ScpiResponse> {
        (**self).request(req).await
    }

    async fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()> {
        (**self).set_timeout(timeout).await
    }
}

pub(crate) fn terminate(mut msg: String) -> String {
    if !msg.ends_with(TERMINATION) {
        msg.push_str(TERMINATION);
    }
    msg
}

pub(crate) fn strip_termination(mut msg: String) -> String {
    while msg.ends_with(TERMINATION) || msg.ends_with('\r') {
        msg.pop();
    }
    msg
}
