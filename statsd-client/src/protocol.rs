use crate::kind::MetricType;

/// Version marker written at the start of every framed payload.
pub const PROTOCOL_VERSION: &str = "1";

/// Wire format spoken to the collector.
///
/// The two formats are not interchangeable: they disagree on framing and on the type codes they carry, so a client
/// is configured with exactly one of them and never mixes the two.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Protocol {
    /// Plain StatsD lines.
    ///
    /// Each metric is a single `<key>:<value>|<code>[|@<rate>]` line. A payload carries no header, and several lines
    /// in one payload are separated by a newline with no trailing newline after the last one.
    ///
    /// Type codes: counter `c`, timing `ms`, gauge `g`, meter `m`, meter reader `mr`.
    #[default]
    BareLine,

    /// Versioned, length-prefixed payloads.
    ///
    /// The payload is `1|<length>\n<body>`, where `<length>` is the byte length of the body and every metric line in
    /// the body is newline-terminated.
    ///
    /// Type codes: meter `m`, meter reader `mr`, gauge `g`, timing `h`. Counters are not carried by this format.
    Framed,
}

impl Protocol {
    /// Returns the wire code for the given metric type, or `None` if this protocol does not carry it.
    pub const fn type_code(self, kind: MetricType) -> Option<&'static str> {
        match (self, kind) {
            (Protocol::BareLine, MetricType::Counter) => Some("c"),
            (Protocol::BareLine, MetricType::Timing) => Some("ms"),
            (Protocol::Framed, MetricType::Counter) => None,
            (Protocol::Framed, MetricType::Timing) => Some("h"),
            (_, MetricType::Gauge) => Some("g"),
            (_, MetricType::Meter) => Some("m"),
            (_, MetricType::MeterReader) => Some("mr"),
        }
    }

    /// Writes a complete payload for the given body into `buf`.
    ///
    /// `body` must be zero or more newline-terminated metric lines.
    pub(crate) fn write_payload(self, body: &[u8], buf: &mut Vec<u8>) {
        match self {
            Protocol::BareLine => {
                let trimmed = body.strip_suffix(b"\n").unwrap_or(body);
                buf.extend_from_slice(trimmed);
            }
            Protocol::Framed => {
                let mut int_writer = itoa::Buffer::new();

                buf.extend_from_slice(PROTOCOL_VERSION.as_bytes());
                buf.push(b'|');
                buf.extend_from_slice(int_writer.format(body.len()).as_bytes());
                buf.push(b'\n');
                buf.extend_from_slice(body);
            }
        }
    }
}
