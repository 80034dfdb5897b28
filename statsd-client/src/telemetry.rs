use metrics::{counter, Counter};

/// Client telemetry.
///
/// `Telemetry` tracks what the client itself did with the metrics it was handed: how many payloads and bytes went out,
/// how many were lost to send failures, and how many metrics were discarded by sampling. It is recorded through the
/// `metrics` facade, so it goes wherever the installed recorder sends it and costs nothing when no recorder is
/// installed.
pub struct Telemetry {
    packets_sent: Counter,
    packets_dropped: Counter,
    bytes_sent: Counter,
    bytes_dropped: Counter,
    metrics_sampled_out: Counter,
}

impl Telemetry {
    /// Creates a `Telemetry` instance.
    pub fn new(transport: &'static str) -> Self {
        let base_labels = telemetry_tags!("client_transport" => transport);

        Self {
            packets_sent: counter!("statsd.client.packets_sent", base_labels.iter()),
            packets_dropped: counter!("statsd.client.packets_dropped", base_labels.iter()),
            bytes_sent: counter!("statsd.client.bytes_sent", base_labels.iter()),
            bytes_dropped: counter!("statsd.client.bytes_dropped", base_labels.iter()),
            metrics_sampled_out: counter!("statsd.client.metrics_sampled_out", base_labels.iter()),
        }
    }

    /// Tracks a successful packet send.
    pub fn track_packet_send_succeeded(&self, bytes_len: usize) {
        self.packets_sent.increment(1);
        self.bytes_sent.increment(bytes_len as u64);
    }

    /// Tracks a failed packet send.
    pub fn track_packet_send_failed(&self, bytes_len: usize) {
        self.packets_dropped.increment(1);
        self.bytes_dropped.increment(bytes_len as u64);
    }

    /// Tracks a metric that was discarded by sampling.
    pub fn track_sampled_out(&self) {
        self.metrics_sampled_out.increment(1);
    }
}

macro_rules! _telemetry_tags {
    ($($k:literal => $v:expr),*) => {
        [
            ::metrics::Label::from_static_parts("client", "rust"),
            ::metrics::Label::from_static_parts("client_version", env!("CARGO_PKG_VERSION")),
            $(::metrics::Label::from_static_parts($k, $v),)*
        ]
    };
}

pub(crate) use _telemetry_tags as telemetry_tags;
