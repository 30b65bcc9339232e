use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::spawn_blocking;

use super::visa_sys::{self, Instrument as BlockingInstrument};
use crate::protocol::{ScpiRequest, ScpiResponse};
use crate::transport::Transport;
use crate::Error;

/// Async handle to a VISA session. The blocking session lives on its own
/// thread and is closed once the handle is dropped.
pub struct VisaTransport {
    tx: mpsc::Sender<Msg>,
    addr: String,
}

enum Msg {
    Scpi {
        request: ScpiRequest,
        reply: oneshot::Sender<crate::Result<ScpiResponse>>,
    },
    SetTimeout {
        timeout: Duration,
        reply: oneshot::Sender<crate::Result<()>>,
    },
}

fn disconnected() -> Error {
    Error::internal(anyhow!("VISA session thread disconnected"))
}

impl VisaTransport {
    pub async fn open(addr: String, library: Option<PathBuf>, timeout: Duration) -> crate::Result<Self> {
        let resource = addr.clone();
        let instr = spawn_blocking(move || {
            let visa = visa_sys::load(library.as_deref())?;
            BlockingInstrument::open(visa, &resource, timeout)
        })
        .await
        .map_err(Error::internal)??;
        Ok(Self::spawn(instr, addr))
    }

    fn spawn(instr: BlockingInstrument, addr: String) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            while let Ok(msg) = rx.recv() {
                match msg {
                    Msg::Scpi { request, reply } => {
                        let _ = reply.send(instr.handle_scpi(request));
                    }
                    Msg::SetTimeout { timeout, reply } => {
                        let _ = reply.send(instr.set_timeout(timeout));
                    }
                }
            }
            log::debug!("Leaving VISA session thread for {}", instr.addr());
        });
        Self { tx, addr }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for VisaTransport {
    async fn request(&mut self, request: ScpiRequest) -> crate::Result<ScpiResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Msg::Scpi { request, reply })
            .map_err(|_| disconnected())?;
        rx.await.map_err(|_| disconnected())?
    }

    async fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Msg::SetTimeout { timeout, reply })
            .map_err(|_| disconnected())?;
        rx.await.map_err(|_| disconnected())?
    }
}
