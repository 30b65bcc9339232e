use std::cmp::Ordering;
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use crate::config::{SessionConfig, DEFAULT_OPC_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use crate::protocol::scpi::{
    is_operation_complete, timescale_command, vertical_scale_command, IDN_QUERY, OPC_QUERY,
    PRESET_DEFAULT,
};
use crate::protocol::{FirmwareAge, FirmwareVersion, Identity, ScpiRequest};
use crate::transport::{AnyTransport, Transport};
use crate::Error;

/// Bounds for `*OPC?` polling. Polling stops with a protocol timeout once
/// either `max_attempts` queries were answered with something else than `1`
/// or `timeout` elapsed.
#[derive(Clone, Debug, PartialEq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_OPC_INTERVAL_MS),
            max_attempts: None,
            timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
        }
    }
}

impl PollOptions {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            interval: config.opc_interval(),
            max_attempts: None,
            timeout: Some(config.opc_timeout()),
        }
    }
}

/// A session with an Infiniium oscilloscope.
///
/// A value of this type only exists after a successful `*IDN?` handshake, so
/// the identity accessors cannot fail. The transport is released when the
/// session is dropped or [`Infiniium::close`]d.
pub struct Infiniium<T: Transport> {
    transport: T,
    identity: Identity,
    address: String,
    timeout: Duration,
    connected: bool,
}

impl Infiniium<AnyTransport> {
    /// Open the transport described by `config.address` and perform the handshake.
    pub async fn connect(config: &SessionConfig) -> crate::Result<Self> {
        let ret = async {
            let transport = AnyTransport::open(config).await?;
            Self::open(transport, config.address.clone(), config.timeout()).await
        }
        .await;
        if let Err(err) = &ret {
            if err.is_connection_error() {
                log::error!("Cannot open instrument address {}: {}", config.address, err);
            } else {
                log::error!("Cannot connect to instrument {}: {}", config.address, err);
            }
        }
        ret
    }
}

impl<T: Transport> Infiniium<T> {
    /// Handshake on an already opened transport: apply the command timeout
    /// and query the identity.
    pub async fn open<A: Into<String>>(mut transport: T, address: A, timeout: Duration) -> crate::Result<Self> {
        let address = address.into();
        transport.set_timeout(timeout).await?;
        let idn = transport
            .request(ScpiRequest::QueryString(IDN_QUERY.to_string()))
            .await?
            .into_string()?;
        let identity = Identity::parse(idn)?;
        log::info!("Infiniium connection established to: {}", identity);
        Ok(Self {
            transport,
            identity,
            address,
            timeout,
            connected: true,
        })
    }

    async fn request(&mut self, req: ScpiRequest) -> crate::Result<crate::protocol::ScpiResponse> {
        let ret = self.transport.request(req).await;
        if let Err(err) = &ret {
            if err.is_connection_error() {
                self.connected = false;
            }
        }
        ret
    }

    /// Send a command without expecting a reply.
    pub async fn write(&mut self, scpi: &str) -> crate::Result<()> {
        self.request(ScpiRequest::Write(scpi.to_string())).await.map(|_| ())
    }

    /// Send a command, then read one line in a separate transfer.
    pub async fn read(&mut self, scpi: &str) -> crate::Result<String> {
        self.write(scpi).await?;
        self.request(ScpiRequest::ReadLine).await?.into_string()
    }

    /// Write followed by a read, performed as one request on the transport.
    pub async fn query(&mut self, scpi: &str) -> crate::Result<String> {
        self.request(ScpiRequest::QueryString(scpi.to_string()))
            .await?
            .into_string()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn model(&self) -> &str {
        self.identity.model()
    }

    pub fn hostname(&self) -> &str {
        self.identity.hostname()
    }

    pub fn serial_number(&self) -> &str {
        self.identity.serial_number()
    }

    pub fn firmware(&self) -> &str {
        self.identity.firmware()
    }

    pub fn firmware_version(&self) -> crate::Result<FirmwareVersion> {
        self.firmware().parse()
    }

    /// Text comparison kept for compatibility with existing setups: `"10.0"`
    /// counts as older than `"2.0"`. Prefer [`Infiniium::compare_firmware`].
    pub fn check_firmware(&self, candidate: &str) -> FirmwareAge {
        FirmwareAge::compare_lexicographic(self.firmware(), candidate)
    }

    /// Numeric ordering of `candidate` relative to the installed firmware.
    pub fn compare_firmware(&self, candidate: &str) -> crate::Result<Ordering> {
        let candidate: FirmwareVersion = candidate.parse()?;
        Ok(candidate.cmp(&self.firmware_version()?))
    }

    pub async fn set_vertical_scale(&mut self, millivolts_per_division: f64) -> crate::Result<()> {
        self.write(&vertical_scale_command(millivolts_per_division)).await
    }

    pub async fn set_timescale(&mut self, nanoseconds_per_division: f64) -> crate::Result<()> {
        self.write(&timescale_command(nanoseconds_per_division)).await
    }

    pub async fn default_setup(&mut self) -> crate::Result<()> {
        self.write(PRESET_DEFAULT).await
    }

    /// Poll `*OPC?` until it reports completion. Returns the number of polls.
    pub async fn wait_for_operation_complete(&mut self, opts: &PollOptions) -> crate::Result<u32> {
        self.wait_for_operation_complete_or_cancel(opts, futures::future::pending())
            .await
    }

    /// Like [`Infiniium::wait_for_operation_complete`] but gives up with
    /// [`Error::Cancelled`] as soon as `cancel` completes.
    pub async fn wait_for_operation_complete_or_cancel<F>(
        &mut self,
        opts: &PollOptions,
        cancel: F,
    ) -> crate::Result<u32>
    where
        F: Future<Output = ()>,
    {
        let poll = async {
            let mut attempts: u32 = 0;
            loop {
                attempts += 1;
                let ret = self.query(OPC_QUERY).await?;
                if is_operation_complete(&ret) {
                    return Ok::<_, Error>(attempts);
                }
                if let Some(max_attempts) = opts.max_attempts {
                    if attempts >= max_attempts {
                        log::debug!("Operation not complete after {} polls", attempts);
                        return Err(Error::protocol_timeout());
                    }
                }
                sleep(opts.interval).await;
            }
        };
        let bounded = async {
            match opts.timeout {
                Some(tmo) => timeout(tmo, poll).await.map_err(|_| Error::protocol_timeout())?,
                None => poll.await,
            }
        };
        tokio::select! {
            biased;
            _ = cancel => {
                log::debug!("Waiting for operation complete cancelled");
                Err(Error::Cancelled)
            }
            ret = bounded => ret,
        }
    }

    pub async fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()> {
        self.transport.set_timeout(timeout).await?;
        self.timeout = timeout;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// False once the transport reported a connection failure.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Release the transport.
    pub fn close(self) {
        log::debug!("Closing session to {}", self.address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ProtocolError, TransportError};
    use crate::transport::mock::MockTransport;
    use async_trait::async_trait;
    use std::io;

    const UXR: &str = "KEYSIGHT,UXR0104A,MY12345678,6.5.0.0\n";

    fn no_wait() -> PollOptions {
        PollOptions {
            interval: Duration::from_millis(0),
            max_attempts: Some(10),
            timeout: None,
        }
    }

    async fn scope<I: IntoIterator<Item = &'static str>>(responses: I) -> Infiniium<MockTransport> {
        let mock = MockTransport::new(std::iter::once(UXR).chain(responses));
        Infiniium::open(mock, "mock", Duration::from_secs(2)).await.unwrap()
    }

    #[tokio::test]
    async fn handshake() {
        let scope = scope(vec![]).await;
        assert_eq!(scope.transport().queries(), vec!["*IDN?"]);
        assert_eq!(scope.transport().timeout, Some(Duration::from_secs(2)));
        assert_eq!(scope.model(), "UXR0104A");
        assert_eq!(scope.hostname(), "MY12345678");
        assert_eq!(scope.serial_number(), "MY12345678");
        assert_eq!(scope.firmware(), "6.5.0.0");
        assert_eq!(scope.identity().vendor(), "KEYSIGHT");
        assert!(scope.is_connected());
        assert_eq!(scope.address(), "mock");
    }

    #[tokio::test]
    async fn malformed_identity_fails_construction() {
        let mock = MockTransport::new(vec!["KEYSIGHT,UXR0104A"]);
        let ret = Infiniium::open(mock, "mock", Duration::from_secs(1)).await;
        assert!(matches!(
            ret,
            Err(Error::Protocol(ProtocolError::MalformedIdentity(_)))
        ));
    }

    #[tokio::test]
    async fn silent_instrument_fails_construction() {
        let mock = MockTransport::new(Vec::<String>::new());
        let ret = Infiniium::open(mock, "mock", Duration::from_secs(1)).await;
        assert!(matches!(ret, Err(ref err) if err.is_timeout()));
    }

    #[tokio::test]
    async fn setup_commands() {
        let mut scope = scope(vec![]).await;
        scope.default_setup().await.unwrap();
        scope.set_timescale(100.0).await.unwrap();
        scope.set_vertical_scale(50.0).await.unwrap();
        assert_eq!(
            scope.transport().writes(),
            vec![
                ":SYSTem:PRESet DEFault",
                ":TIMebase:SCALe 1e-7",
                ":SYSTem:CONTrol \"Chan1Scale -1 0.05\"",
            ]
        );
    }

    #[tokio::test]
    async fn read_returns_value() {
        let mut scope = scope(vec!["+2.00000E-09\n"]).await;
        let ret = scope.read(":TIMebase:SCALe?").await.unwrap();
        assert_eq!(ret, "+2.00000E-09");
        assert_eq!(
            &scope.transport().requests[1..],
            &[
                ScpiRequest::Write(":TIMebase:SCALe?".to_string()),
                ScpiRequest::ReadLine,
            ]
        );
    }

    #[tokio::test]
    async fn query_returns_value() {
        let mut scope = scope(vec!["1"]).await;
        assert_eq!(scope.query("*OPC?").await.unwrap(), "1");
        assert_eq!(scope.transport().queries(), vec!["*IDN?", "*OPC?"]);
    }

    #[tokio::test]
    async fn firmware_checks() {
        let mock = MockTransport::new(vec!["KEYSIGHT,UXR0104A,MY12345678,6.5"]);
        let scope = Infiniium::open(mock, "mock", Duration::from_secs(1)).await.unwrap();
        assert_eq!(scope.check_firmware("6.4"), FirmwareAge::Older);
        assert_eq!(scope.check_firmware("6.6"), FirmwareAge::Newer);
        assert_eq!(scope.check_firmware("10.0"), FirmwareAge::Older);
        assert_eq!(scope.compare_firmware("10.0").unwrap(), Ordering::Greater);
        assert_eq!(scope.compare_firmware("6.5.0.0").unwrap(), Ordering::Equal);
        assert_eq!(scope.compare_firmware("6.4.9").unwrap(), Ordering::Less);
        assert!(matches!(scope.compare_firmware("six"), Err(Error::Format { .. })));
    }

    #[tokio::test]
    async fn opc_polls_until_complete() {
        let mut scope = scope(vec!["0", "1"]).await;
        let polls = scope.wait_for_operation_complete(&no_wait()).await.unwrap();
        assert_eq!(polls, 2);
        assert_eq!(scope.transport().queries(), vec!["*IDN?", "*OPC?", "*OPC?"]);
    }

    #[tokio::test]
    async fn opc_gives_up_after_max_attempts() {
        let mut scope = scope(vec!["0", "0", "0", "1"]).await;
        let opts = PollOptions {
            max_attempts: Some(3),
            ..no_wait()
        };
        let err = scope.wait_for_operation_complete(&opts).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(scope.transport().queries().len(), 4);
    }

    #[tokio::test]
    async fn opc_gives_up_after_deadline() {
        let mut scope = scope(vec!["0"; 1000]).await;
        let opts = PollOptions {
            interval: Duration::from_millis(20),
            max_attempts: None,
            timeout: Some(Duration::from_millis(100)),
        };
        let err = scope.wait_for_operation_complete(&opts).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn opc_can_be_cancelled() {
        let mut scope = scope(vec!["0"; 1000]).await;
        let opts = PollOptions {
            interval: Duration::from_millis(10),
            max_attempts: None,
            timeout: None,
        };
        let cancel = sleep(Duration::from_millis(50));
        let err = scope
            .wait_for_operation_complete_or_cancel(&opts, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    struct Unplugged;

    #[async_trait]
    impl Transport for Unplugged {
        async fn request(&mut self, req: ScpiRequest) -> crate::Result<crate::protocol::ScpiResponse> {
            match req {
                ScpiRequest::QueryString(x) if x == IDN_QUERY => {
                    Ok(crate::protocol::ScpiResponse::String(UXR.to_string()))
                }
                _ => Err(Error::transport(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "Connection reset",
                ))),
            }
        }

        async fn set_timeout(&mut self, _timeout: Duration) -> crate::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn connection_loss_is_tracked() {
        let transport: Box<dyn Transport> = Box::new(Unplugged);
        let mut scope = Infiniium::open(transport, "unplugged", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(scope.is_connected());
        let err = scope.default_setup().await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Io(_))));
        assert!(!scope.is_connected());
        scope.close();
    }

    /// Answers queries like a scope would, returns everything it received.
    async fn fake_scope(listener: tokio::net::TcpListener) -> Vec<String> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let (socket, _) = listener.accept().await.unwrap();
        let mut socket = BufReader::new(socket);
        let mut received = Vec::new();
        loop {
            let mut line = String::new();
            if socket.read_line(&mut line).await.unwrap() == 0 {
                return received;
            }
            let line = line.trim_end().to_string();
            let answer = match line.as_str() {
                "*IDN?" => Some(UXR),
                "*OPC?" => Some("1\n"),
                x if x.starts_with(":MEASure:PERiod") => Some("+1.00000E-06\n"),
                _ => None,
            };
            if let Some(answer) = answer {
                socket.get_mut().write_all(answer.as_bytes()).await.unwrap();
            }
            received.push(line);
        }
    }

    #[tokio::test]
    async fn connect_over_socket() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(fake_scope(listener));

        let config = SessionConfig::new(format!("TCPIP0::127.0.0.1::{}::SOCKET", port));
        let mut scope = Infiniium::connect(&config).await.unwrap();
        assert_eq!(scope.model(), "UXR0104A");
        scope.default_setup().await.unwrap();
        assert_eq!(scope.wait_for_operation_complete(&no_wait()).await.unwrap(), 1);
        scope.set_timescale(100.0).await.unwrap();
        let period = crate::measure::period(&mut scope, Default::default(), Default::default())
            .await
            .unwrap();
        assert_eq!(period, 1e-6);
        scope.close();

        assert_eq!(
            server.await.unwrap(),
            vec![
                "*IDN?",
                ":SYSTem:PRESet DEFault",
                "*OPC?",
                ":TIMebase:SCALe 1e-7",
                ":MEASure:PERiod CHANnel1, RISing",
            ]
        );
    }

    /// Like `fake_scope` but takes 300 ms to answer `*OPC?` and accepts reconnects.
    async fn slow_opc_scope(listener: tokio::net::TcpListener) {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut socket = BufReader::new(socket);
                loop {
                    let mut line = String::new();
                    match socket.read_line(&mut line).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => {}
                    }
                    let answer = match line.trim_end() {
                        "*IDN?" => UXR,
                        "*OPC?" => {
                            sleep(Duration::from_millis(300)).await;
                            "1\n"
                        }
                        x if x.starts_with(":MEASure:PERiod") => "+1.00000E-06\n",
                        _ => continue,
                    };
                    if socket.get_mut().write_all(answer.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    }

    async fn slow_session() -> (Infiniium<AnyTransport>, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(slow_opc_scope(listener));
        let config = SessionConfig::new(format!("tcp::127.0.0.1:{}", port));
        (Infiniium::connect(&config).await.unwrap(), server)
    }

    #[tokio::test]
    async fn measurement_after_opc_deadline() {
        let (mut scope, server) = slow_session().await;
        let opts = PollOptions {
            interval: Duration::from_millis(0),
            max_attempts: None,
            timeout: Some(Duration::from_millis(100)),
        };
        let err = scope.wait_for_operation_complete(&opts).await.unwrap_err();
        assert!(err.is_timeout());

        sleep(Duration::from_millis(400)).await;
        let period = crate::measure::period(&mut scope, Default::default(), Default::default())
            .await
            .unwrap();
        assert_eq!(period, 1e-6);
        assert!(scope.is_connected());
        server.abort();
    }

    #[tokio::test]
    async fn measurement_after_cancelled_opc() {
        let (mut scope, server) = slow_session().await;
        let cancel = sleep(Duration::from_millis(100));
        let err = scope
            .wait_for_operation_complete_or_cancel(&no_wait(), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        sleep(Duration::from_millis(400)).await;
        let period = crate::measure::period(&mut scope, Default::default(), Default::default())
            .await
            .unwrap();
        assert_eq!(period, 1e-6);
        server.abort();
    }

    #[tokio::test]
    async fn query_after_transport_timeout() {
        let (mut scope, server) = slow_session().await;
        scope.set_timeout(Duration::from_millis(100)).await.unwrap();
        let err = scope.query(OPC_QUERY).await.unwrap_err();
        assert!(err.is_timeout());

        sleep(Duration::from_millis(400)).await;
        assert_eq!(scope.query(":MEASure:PERiod CHANnel1, RISing").await.unwrap(), "+1.00000E-06");
        server.abort();
    }

    #[tokio::test]
    async fn connect_to_invalid_address() {
        let config = SessionConfig::new("scope");
        let ret = Infiniium::connect(&config).await;
        assert!(matches!(ret, Err(Error::Argument(_))));
    }

    #[tokio::test]
    async fn timeout_is_forwarded() {
        let mut scope = scope(vec![]).await;
        scope.set_timeout(Duration::from_millis(250)).await.unwrap();
        assert_eq!(scope.timeout(), Duration::from_millis(250));
        assert_eq!(scope.transport().timeout, Some(Duration::from_millis(250)));
    }
}
