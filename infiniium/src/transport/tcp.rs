use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{strip_termination, terminate, Transport};
use crate::protocol::{ProtocolError, ScpiRequest, ScpiResponse};
use crate::Error;

/// Raw SCPI socket, usually port 5025 on Infiniium scopes.
///
/// The connection is only kept after a successful request. Any failure, a
/// timeout or a request future dropped half way drops the connection so a
/// late reply is never read as the answer to the next query. The next
/// request reconnects.
pub struct TcpTransport {
    host: String,
    port: u16,
    addr: String,
    stream: Option<BufReader<TcpStream>>,
    connection_timeout: Duration,
    timeout: Duration,
}

async fn connect_tcp_stream(host: &str, port: u16, connection_timeout: Duration) -> crate::Result<TcpStream> {
    let fut = async move { TcpStream::connect((host, port)).await.map_err(Error::transport) };
    let stream = match timeout(connection_timeout, fut).await {
        Ok(Ok(x)) => x,
        Ok(Err(x)) => return Err(x),
        Err(_) => {
            return Err(crate::Error::transport(io::Error::new(
                io::ErrorKind::TimedOut,
                "Connection timed out",
            )))
        }
    };
    stream.set_nodelay(true)?;
    log::debug!("Connected to {}:{}", host, port);
    Ok(stream)
}

async fn write(stream: &mut BufReader<TcpStream>, addr: &str, msg: String) -> crate::Result<()> {
    let msg = terminate(msg);
    log::debug!("{} write: {:?}", addr, msg);
    let stream = stream.get_mut();
    stream.write_all(msg.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_line(stream: &mut BufReader<TcpStream>, addr: &str) -> crate::Result<String> {
    let mut data = Vec::new();
    let count = stream.read_until(b'\n', &mut data).await?;
    if count == 0 {
        return Err(Error::transport(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Connection closed by instrument",
        )));
    }
    let line = String::from_utf8(data).map_err(|_| Error::protocol(ProtocolError::Decode))?;
    log::debug!("{} read: {:?}", addr, line);
    Ok(strip_termination(line))
}

async fn handle(stream: &mut BufReader<TcpStream>, addr: &str, req: ScpiRequest) -> crate::Result<ScpiResponse> {
    match req {
        ScpiRequest::Write(msg) => {
            write(stream, addr, msg).await?;
            Ok(ScpiResponse::Done)
        }
        ScpiRequest::QueryString(msg) => {
            write(stream, addr, msg).await?;
            read_line(stream, addr).await.map(ScpiResponse::String)
        }
        ScpiRequest::ReadLine => read_line(stream, addr).await.map(ScpiResponse::String),
    }
}

impl TcpTransport {
    pub async fn connect(
        host: &str,
        port: u16,
        connection_timeout: Duration,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let stream = connect_tcp_stream(host, port, connection_timeout).await?;
        Ok(Self {
            host: host.to_string(),
            port,
            addr: format!("{}:{}", host, port),
            stream: Some(BufReader::new(stream)),
            connection_timeout,
            timeout,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// False after a failed request until the next request reconnected.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn request(&mut self, req: ScpiRequest) -> crate::Result<ScpiResponse> {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                log::debug!("Reconnecting to {}", self.addr);
                let stream = connect_tcp_stream(&self.host, self.port, self.connection_timeout).await?;
                BufReader::new(stream)
            }
        };
        let tmo = self.timeout;
        let ret = match timeout(tmo, handle(&mut stream, &self.addr, req)).await {
            Ok(ret) => ret,
            Err(_) => {
                log::debug!("{} request timed out after {:?}", self.addr, tmo);
                Err(Error::protocol_timeout())
            }
        };
        match ret {
            Ok(ret) => {
                self.stream.replace(stream);
                Ok(ret)
            }
            Err(err) => {
                log::debug!("Dropping connection to {}: {}", self.addr, err);
                Err(err)
            }
        }
    }

    async fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}
