use std::{borrow::Cow, fmt, sync::Arc, time::Duration};

use once_cell::sync::OnceCell;
use quanta::Clock;
use tracing::{debug, trace};

use crate::{
    builder::StatsdBuilder,
    error::Error,
    kind::{IntoMetricType, MetricType},
    message::{Message, MetricValue},
    protocol::Protocol,
    sampling::Sampler,
    telemetry::Telemetry,
    transport::{Transport, UdpTransport},
};

/// Client for sending metrics to a StatsD-style collector.
///
/// Every call encodes a single metric and sends it as one payload, right away, on the calling thread. There is no
/// buffering, no background work and no retrying: if the metric is discarded by sampling, nothing is sent at all, and
/// if the send fails, the error is handed back to the caller.
///
/// `increment` and `decrement` are counter submissions of `+1` and `-1`. Collectors that speak
/// [`Protocol::Framed`] do not accept counters; count events for them with [`mark`][Emitter::mark] instead.
///
/// An `Emitter` is meant to be created once per destination and shared. It is `Send` and `Sync`, and adds no locking
/// of its own around the transport.
pub struct Emitter<T = UdpTransport> {
    namespace: Option<String>,
    protocol: Protocol,
    sampler: Arc<dyn Sampler>,
    clock: Clock,
    telemetry: Option<OnceCell<Telemetry>>,
    transport: T,
}

impl Emitter<UdpTransport> {
    /// Creates a new `Emitter` that sends to the given host and port over UDP, with default settings.
    ///
    /// Use [`StatsdBuilder`] to configure anything else.
    pub fn new<H>(host: H, port: u16) -> Self
    where
        H: Into<String>,
    {
        StatsdBuilder::default().with_host(host).with_port(port).into_emitter()
    }

    /// Returns the destination host.
    pub fn host(&self) -> &str {
        self.transport.host()
    }

    /// Returns the destination port.
    pub fn port(&self) -> u16 {
        self.transport.port()
    }
}

impl<T> Emitter<T>
where
    T: Transport,
{
    pub(crate) fn from_parts(
        namespace: Option<String>,
        protocol: Protocol,
        sampler: Arc<dyn Sampler>,
        clock: Clock,
        telemetry: bool,
        transport: T,
    ) -> Self {
        Emitter {
            namespace,
            protocol,
            sampler,
            clock,
            telemetry: telemetry.then(OnceCell::new),
            transport,
        }
    }

    /// Returns the namespace prepended to every key, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Sets the namespace prepended to every key.
    ///
    /// With a namespace of `svc`, the key `foo` is sent as `svc.foo`.
    pub fn set_namespace<S>(&mut self, namespace: Option<S>)
    where
        S: Into<String>,
    {
        self.namespace = namespace.map(Into::into);
    }

    /// Returns the protocol this emitter speaks.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Creates a sub-client with the same configuration but a different namespace.
    ///
    /// The two clients share nothing beyond their configuration: a UDP sub-client creates its own socket.
    #[must_use]
    pub fn scoped<S>(&self, namespace: S) -> Self
    where
        S: Into<String>,
        T: Clone,
    {
        Emitter {
            namespace: Some(namespace.into()),
            protocol: self.protocol,
            sampler: Arc::clone(&self.sampler),
            clock: self.clock.clone(),
            telemetry: self.telemetry.as_ref().map(|_| OnceCell::new()),
            transport: self.transport.clone(),
        }
    }

    /// Increments a counter by one.
    ///
    /// # Errors
    ///
    /// If the protocol does not carry counters, or if the payload could not be sent, an error is returned.
    pub fn increment(&self, key: &str, sample_rate: Option<f64>) -> Result<(), Error> {
        self.count(key, 1, sample_rate)
    }

    /// Decrements a counter by one.
    ///
    /// # Errors
    ///
    /// If the protocol does not carry counters, or if the payload could not be sent, an error is returned.
    pub fn decrement(&self, key: &str, sample_rate: Option<f64>) -> Result<(), Error> {
        self.count(key, -1, sample_rate)
    }

    /// Adds a signed delta to a counter.
    ///
    /// # Errors
    ///
    /// If the protocol does not carry counters, or if the payload could not be sent, an error is returned.
    pub fn count(&self, key: &str, amount: i64, sample_rate: Option<f64>) -> Result<(), Error> {
        self.submit(MetricType::Counter, key, amount, sample_rate)
    }

    /// Records a timing, in milliseconds.
    ///
    /// # Errors
    ///
    /// If the payload could not be sent, an error is returned.
    pub fn timing<V>(&self, key: &str, millis: V, sample_rate: Option<f64>) -> Result<(), Error>
    where
        V: Into<MetricValue>,
    {
        self.submit(MetricType::Timing, key, millis, sample_rate)
    }

    /// Sets a gauge.
    ///
    /// # Errors
    ///
    /// If the payload could not be sent, an error is returned.
    pub fn gauge<V>(&self, key: &str, value: V, sample_rate: Option<f64>) -> Result<(), Error>
    where
        V: Into<MetricValue>,
    {
        self.submit(MetricType::Gauge, key, value, sample_rate)
    }

    /// Adds a value to a meter.
    ///
    /// # Errors
    ///
    /// If the payload could not be sent, an error is returned.
    pub fn meter<V>(&self, key: &str, value: V, sample_rate: Option<f64>) -> Result<(), Error>
    where
        V: Into<MetricValue>,
    {
        self.submit(MetricType::Meter, key, value, sample_rate)
    }

    /// Marks a single event on a meter.
    ///
    /// # Errors
    ///
    /// If the payload could not be sent, an error is returned.
    pub fn mark(&self, key: &str, sample_rate: Option<f64>) -> Result<(), Error> {
        self.meter(key, 1, sample_rate)
    }

    /// Reports an absolute meter reading.
    ///
    /// # Errors
    ///
    /// If the payload could not be sent, an error is returned.
    pub fn meter_reading<V>(&self, key: &str, value: V, sample_rate: Option<f64>) -> Result<(), Error>
    where
        V: Into<MetricValue>,
    {
        self.submit(MetricType::MeterReader, key, value, sample_rate)
    }

    /// Runs `f` and records how long it took as a timing.
    ///
    /// The elapsed time is rounded to the nearest millisecond. The result of `f` is returned as-is. If `f` panics, no
    /// timing is recorded.
    ///
    /// # Errors
    ///
    /// If the timing could not be sent, an error is returned and the result of `f` is dropped.
    pub fn time<F, R>(&self, key: &str, sample_rate: Option<f64>, f: F) -> Result<R, Error>
    where
        F: FnOnce() -> R,
    {
        let start = self.clock.now();
        let result = f();
        let elapsed = self.clock.now().duration_since(start);

        self.timing(key, elapsed_millis(elapsed), sample_rate)?;
        Ok(result)
    }

    /// Runs the fallible `f` and records how long it took as a timing.
    ///
    /// If `f` returns an error, no timing is recorded and the error is returned unchanged.
    ///
    /// # Errors
    ///
    /// If `f` fails, its error is returned. If the timing could not be sent, the submission error is converted into
    /// `E` and returned.
    pub fn try_time<F, R, E>(&self, key: &str, sample_rate: Option<f64>, f: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
        E: From<Error>,
    {
        let start = self.clock.now();
        let result = f()?;
        let elapsed = self.clock.now().duration_since(start);

        self.timing(key, elapsed_millis(elapsed), sample_rate)?;
        Ok(result)
    }

    /// Submits a single metric.
    ///
    /// The key is prefixed with the namespace, if one is set. If the metric is discarded by sampling, nothing is sent
    /// and `Ok(())` is returned.
    ///
    /// # Errors
    ///
    /// If `kind` is not a metric type carried by the configured protocol, or if the payload could not be sent, an error
    /// is returned.
    pub fn submit<K, V>(
        &self,
        kind: K,
        key: &str,
        value: V,
        sample_rate: Option<f64>,
    ) -> Result<(), Error>
    where
        K: IntoMetricType,
        V: Into<MetricValue>,
    {
        let key = self.namespaced_key(key);

        let mut message = Message::with_sampler(self.protocol, &*self.sampler);
        message.add_metric(kind, &key, value, sample_rate)?;

        if message.is_empty() {
            trace!(key = %key, ?sample_rate, "Metric sampled out, skipping send.");
            if let Some(telemetry) = self.telemetry() {
                telemetry.track_sampled_out();
            }
            return Ok(());
        }

        let payload = message.serialize();
        match self.transport.send(&payload) {
            Ok(_) => {
                trace!(key = %key, bytes = payload.len(), transport = self.transport.transport_id(), "Sent payload.");
                if let Some(telemetry) = self.telemetry() {
                    telemetry.track_packet_send_succeeded(payload.len());
                }
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, key = %key, transport = self.transport.transport_id(), "Failed to send payload.");
                if let Some(telemetry) = self.telemetry() {
                    telemetry.track_packet_send_failed(payload.len());
                }
                Err(e.into())
            }
        }
    }

    fn namespaced_key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match &self.namespace {
            Some(namespace) => Cow::Owned(format!("{namespace}.{key}")),
            None => Cow::Borrowed(key),
        }
    }

    fn telemetry(&self) -> Option<&Telemetry> {
        // Handles are registered on first use, against whichever recorder is installed at that point.
        self.telemetry
            .as_ref()
            .map(|cell| cell.get_or_init(|| Telemetry::new(self.transport.transport_id())))
    }
}

impl<T> fmt::Debug for Emitter<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("namespace", &self.namespace)
            .field("protocol", &self.protocol)
            .field("telemetry", &self.telemetry.is_some())
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// Converts an elapsed duration into the whole milliseconds recorded as a timing, rounding to the nearest millisecond.
///
/// This is the conversion [`Emitter::time`] applies, for callers that measure durations themselves.
pub fn elapsed_millis(elapsed: Duration) -> i64 {
    (elapsed.as_secs_f64() * 1000.0).round() as i64
}
