use std::{fmt, sync::Arc, time::Duration};

use quanta::Clock;
use thiserror::Error;

use crate::{
    emitter::Emitter,
    protocol::Protocol,
    sampling::{Sampler, ThreadRngSampler},
    transport::{Transport, UdpTransport},
};

/// Default collector port.
pub const DEFAULT_PORT: u16 = 8125;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that could occur while building an emitter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },
}

/// Builder for an [`Emitter`].
pub struct StatsdBuilder {
    host: String,
    port: u16,
    namespace: Option<String>,
    protocol: Protocol,
    write_timeout: Option<Duration>,
    sampler: Arc<dyn Sampler>,
    clock: Clock,
    telemetry: bool,
}

impl StatsdBuilder {
    /// Set the remote address to send metrics to.
    ///
    /// The address must be in the format of `<host>:<port>`, where an IPv6 host is written in brackets, such as
    /// `[::1]:8125`. The host is not resolved here: resolution happens each time a metric is sent.
    ///
    /// Defaults to `127.0.0.1:8125`.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid address, an error will be returned indicating the
    /// reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        let (host, port) = parse_remote_address(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        self.host = host;
        self.port = port;
        Ok(self)
    }

    /// Set the host to send metrics to.
    ///
    /// Defaults to `127.0.0.1`.
    #[must_use]
    pub fn with_host<H>(mut self, host: H) -> Self
    where
        H: Into<String>,
    {
        self.host = host.into();
        self
    }

    /// Set the port to send metrics to.
    ///
    /// Defaults to 8125.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the namespace prepended to every key.
    ///
    /// Defaults to no namespace.
    #[must_use]
    pub fn with_namespace<S>(mut self, namespace: S) -> Self
    where
        S: Into<String>,
    {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the wire protocol.
    ///
    /// Defaults to [`Protocol::BareLine`].
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the write timeout for sending metrics.
    ///
    /// A send that has not completed once the timeout is reached fails, and the payload is dropped without retrying.
    /// `None` disables the timeout.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Option<Duration>) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Set the sampler used to decide whether sampled metrics are sent.
    ///
    /// Defaults to [`ThreadRngSampler`].
    #[must_use]
    pub fn with_sampler<S>(mut self, sampler: S) -> Self
    where
        S: Sampler + 'static,
    {
        self.sampler = Arc::new(sampler);
        self
    }

    /// Set the clock used to measure blocks passed to [`Emitter::time`].
    ///
    /// Defaults to [`Clock::new`].
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Sets whether or not to enable telemetry for the emitter.
    ///
    /// When enabled, the emitter records how many payloads and bytes it sent or dropped, and how many metrics were
    /// discarded by sampling, through the `metrics` facade.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: bool) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Builds the emitter, sending over UDP.
    ///
    /// No socket is created until the first metric is sent.
    ///
    /// # Errors
    ///
    /// If the configured host is empty or the port is zero, an error will be returned.
    pub fn build(self) -> Result<Emitter<UdpTransport>, BuildError> {
        if self.host.is_empty() {
            return Err(BuildError::InvalidRemoteAddress { reason: "host is empty".to_string() });
        }
        if self.port == 0 {
            return Err(BuildError::InvalidRemoteAddress { reason: "port must not be zero".to_string() });
        }

        Ok(self.into_emitter())
    }

    /// Builds the emitter, sending through the given transport.
    ///
    /// The configured host, port and write timeout are ignored.
    pub fn build_with_transport<T>(self, transport: T) -> Emitter<T>
    where
        T: Transport,
    {
        Emitter::from_parts(
            self.namespace,
            self.protocol,
            self.sampler,
            self.clock,
            self.telemetry,
            transport,
        )
    }

    pub(crate) fn into_emitter(self) -> Emitter<UdpTransport> {
        let transport =
            UdpTransport::new(self.host.clone(), self.port).with_write_timeout(self.write_timeout);
        self.build_with_transport(transport)
    }
}

impl Default for StatsdBuilder {
    fn default() -> Self {
        StatsdBuilder {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            namespace: None,
            protocol: Protocol::default(),
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            sampler: Arc::new(ThreadRngSampler),
            clock: Clock::new(),
            telemetry: true,
        }
    }
}

impl fmt::Debug for StatsdBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsdBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("namespace", &self.namespace)
            .field("protocol", &self.protocol)
            .field("write_timeout", &self.write_timeout)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

fn parse_remote_address(addr: &str) -> Result<(String, u16), String> {
    let (host, port) =
        addr.rsplit_once(':').ok_or_else(|| format!("missing port in '{addr}'"))?;

    let host = match host.strip_prefix('[') {
        Some(bracketed) => bracketed
            .strip_suffix(']')
            .ok_or_else(|| format!("unterminated IPv6 host in '{addr}'"))?,
        None if host.contains(':') => {
            return Err(format!("IPv6 host must be written in brackets in '{addr}'"))
        }
        None => host,
    };

    if host.is_empty() {
        return Err(format!("missing host in '{addr}'"));
    }

    let port = port.parse::<u16>().map_err(|e| format!("invalid port '{port}': {e}"))?;
    if port == 0 {
        return Err("port must not be zero".to_string());
    }

    Ok((host.to_string(), port))
}
