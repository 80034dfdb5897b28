use std::fmt;

use crate::{
    kind::{IntoMetricType, InvalidMetricType},
    protocol::Protocol,
    sampling::{Sampler, ThreadRngSampler},
};

static THREAD_RNG_SAMPLER: ThreadRngSampler = ThreadRngSampler;

/// A numeric observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// An integer value, written without a decimal point.
    Integer(i64),

    /// A floating-point value, written in its shortest round-trip representation.
    FloatingPoint(f64),
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Integer(value)
    }
}

impl From<i32> for MetricValue {
    fn from(value: i32) -> Self {
        MetricValue::Integer(i64::from(value))
    }
}

impl From<u32> for MetricValue {
    fn from(value: u32) -> Self {
        MetricValue::Integer(i64::from(value))
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::FloatingPoint(value)
    }
}

impl From<f32> for MetricValue {
    fn from(value: f32) -> Self {
        MetricValue::FloatingPoint(f64::from(value))
    }
}

struct MetricValueFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl MetricValueFormatter {
    fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new() }
    }

    fn format(&mut self, value: MetricValue) -> &str {
        match value {
            MetricValue::Integer(v) => self.int_writer.format(v),
            MetricValue::FloatingPoint(v) => self.float_writer.format(v),
        }
    }
}

/// A message body built from one or more metric submissions.
///
/// Each accepted metric becomes one newline-terminated `<key>:<value>|<code>[|@<rate>]` line in the body. Metrics that
/// lose their sampling draw contribute nothing to the body, so a message can be inspected with
/// [`is_empty`][Message::is_empty] after all submissions to decide whether it is worth sending at all.
///
/// Keys are written verbatim: the protocol has no quoting, so a key containing `:`, `|` or a newline produces a
/// corrupt line.
///
/// Several metrics can be chained into a single payload:
///
/// ```
/// # use statsd_client::{Message, MetricType, Protocol};
/// let mut message = Message::new(Protocol::Framed);
/// message
///     .add_metric(MetricType::Meter, "myWebservice.requests", 1, None)?
///     .add_metric("histogram", "myWebservice.requestTime", 85, None)?;
///
/// assert_eq!(
///     message.to_string(),
///     "1|56\nmyWebservice.requests:1|m\nmyWebservice.requestTime:85|h\n"
/// );
/// # Ok::<(), statsd_client::InvalidMetricType>(())
/// ```
pub struct Message<'a> {
    protocol: Protocol,
    sampler: &'a dyn Sampler,
    body: Vec<u8>,
    lines: usize,
}

impl Message<'static> {
    /// Creates an empty message that samples with the thread-local random number generator.
    pub fn new(protocol: Protocol) -> Self {
        Message::with_sampler(protocol, &THREAD_RNG_SAMPLER)
    }
}

impl<'a> Message<'a> {
    /// Creates an empty message that samples with the given sampler.
    pub fn with_sampler(protocol: Protocol, sampler: &'a dyn Sampler) -> Self {
        Message { protocol, sampler, body: Vec::new(), lines: 0 }
    }

    /// Returns the protocol this message is encoded for.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Adds a metric to the message.
    ///
    /// When `sample_rate` is `None`, the metric is always written. Otherwise, the metric is written if the rate is
    /// 1 or greater, or if a random draw is less than or equal to the rate. Rates below 1 are echoed on the line as
    /// `|@<rate>` so the collector can scale the observation back up; a rate of 1 or greater writes no suffix.
    ///
    /// A metric that loses its draw is silently skipped. That is not an error. Rates of 0 or below, and NaN, never win
    /// their draw, so `|@0` is never written.
    ///
    /// # Errors
    ///
    /// If `kind` does not name a metric type, or names one that the message's protocol does not carry, an error is
    /// returned and the body is left untouched.
    pub fn add_metric<K, V>(
        &mut self,
        kind: K,
        key: &str,
        value: V,
        sample_rate: Option<f64>,
    ) -> Result<&mut Self, InvalidMetricType>
    where
        K: IntoMetricType,
        V: Into<MetricValue>,
    {
        let kind = kind.into_metric_type()?;
        let type_code = self
            .protocol
            .type_code(kind)
            .ok_or_else(|| InvalidMetricType::new(kind.as_str()))?;

        let maybe_rate_suffix = match sample_rate {
            None => None,
            Some(rate) if !self.writing_sample(rate) => return Ok(self),
            Some(rate) if rate >= 1.0 => None,
            Some(rate) => Some(rate),
        };

        let mut formatter = MetricValueFormatter::new();
        let value_str = formatter.format(value.into());

        self.body.extend_from_slice(key.as_bytes());
        self.body.push(b':');
        self.body.extend_from_slice(value_str.as_bytes());
        self.body.push(b'|');
        self.body.extend_from_slice(type_code.as_bytes());

        if let Some(rate) = maybe_rate_suffix {
            let mut float_writer = ryu::Buffer::new();
            self.body.extend_from_slice(b"|@");
            self.body.extend_from_slice(float_writer.format(rate).as_bytes());
        }

        self.body.push(b'\n');
        self.lines += 1;

        Ok(self)
    }

    /// Returns `true` if a metric submitted at the given sample rate should be written.
    ///
    /// Rates of 1 or greater always write, and rates of 0 or below (or NaN) never do. Otherwise, a draw is taken and
    /// the metric is written when the draw is less than or equal to the rate.
    pub fn writing_sample(&self, sample_rate: f64) -> bool {
        if sample_rate >= 1.0 {
            return true;
        }
        sample_rate > 0.0 && self.sampler.draw() <= sample_rate
    }

    /// Returns the accumulated body: every accepted metric line, each terminated by a newline.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the length of the body, in bytes.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Returns the number of metric lines in the body.
    pub fn len(&self) -> usize {
        self.lines
    }

    /// Returns `true` if no metric has been accepted into the body.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Clears the body so the message can be reused.
    pub fn clear(&mut self) {
        self.body.clear();
        self.lines = 0;
    }

    /// Writes the complete payload for this message into `buf`.
    pub fn write_payload(&self, buf: &mut Vec<u8>) {
        self.protocol.write_payload(&self.body, buf);
    }

    /// Serializes the message into a payload ready to be sent.
    ///
    /// For [`Protocol::Framed`], the payload is `1|<body length>\n<body>`, which is `1|0\n` for an empty message. For
    /// [`Protocol::BareLine`], the payload is the body without its trailing newline.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.body.len() + 8);
        self.write_payload(&mut buf);
        buf
    }
}

impl fmt::Display for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.serialize()))
    }
}

impl fmt::Debug for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("protocol", &self.protocol)
            .field("body", &String::from_utf8_lossy(&self.body))
            .field("lines", &self.lines)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use proptest::{prelude::*, prop_oneof, proptest};

    use super::{Message, MetricValue};
    use crate::{kind::MetricType, protocol::Protocol};

    fn arb_kind() -> impl Strategy<Value = MetricType> {
        prop_oneof![
            Just(MetricType::Counter),
            Just(MetricType::Timing),
            Just(MetricType::Gauge),
            Just(MetricType::Meter),
            Just(MetricType::MeterReader),
        ]
    }

    fn arb_value() -> impl Strategy<Value = MetricValue> {
        prop_oneof![
            any::<i64>().prop_map(MetricValue::Integer),
            (-1.0e9..1.0e9f64).prop_map(MetricValue::FloatingPoint),
        ]
    }

    #[test]
    fn empty_message() {
        let message = Message::new(Protocol::Framed);
        assert_eq!(message.body_len(), 0);
        assert!(message.is_empty());
        assert_eq!(message.body(), b"");
        assert_eq!(message.to_string(), "1|0\n");

        let message = Message::new(Protocol::BareLine);
        assert!(message.serialize().is_empty());
    }

    #[test]
    fn bare_line() {
        // Cases are defined as: metric type, key, value, sample rate, expected output.
        let cases = [
            (MetricType::Counter, "pageviews", MetricValue::Integer(1), None, "pageviews:1|c"),
            (MetricType::Counter, "errors", MetricValue::Integer(-1), None, "errors:-1|c"),
            (MetricType::Timing, "glork", MetricValue::Integer(320), None, "glork:320|ms"),
            (MetricType::Gauge, "test_gauge", MetricValue::FloatingPoint(42.0), None, "test_gauge:42.0|g"),
            (MetricType::Gauge, "test_gauge", MetricValue::FloatingPoint(3.13232), None, "test_gauge:3.13232|g"),
            (MetricType::Meter, "requests", MetricValue::Integer(1), None, "requests:1|m"),
            (MetricType::MeterReader, "disk", MetricValue::Integer(77), None, "disk:77|mr"),
            (MetricType::Counter, "always", MetricValue::Integer(1), Some(1.0), "always:1|c"),
            (MetricType::Counter, "always", MetricValue::Integer(1), Some(2.5), "always:1|c"),
            (MetricType::Timing, "renderMs", MetricValue::Integer(42), Some(0.5), "renderMs:42|ms|@0.5"),
        ];

        let always_write = || 0.0;
        for (kind, key, value, sample_rate, expected) in cases {
            let mut message = Message::with_sampler(Protocol::BareLine, &always_write);
            message.add_metric(kind, key, value, sample_rate).unwrap();
            assert_eq!(message.len(), 1);
            assert_eq!(message.to_string(), expected);
        }
    }

    #[test]
    fn framed_single_metric() {
        let mut message = Message::new(Protocol::Framed);
        message.add_metric(MetricType::Meter, "myWebservice.requests", 1, None).unwrap();

        let body = "myWebservice.requests:1|m\n";
        assert_eq!(message.body(), body.as_bytes());
        assert_eq!(message.body_len(), body.len());
        assert_eq!(message.to_string(), format!("1|{}\n{}", body.len(), body));
    }

    #[test]
    fn framed_multiple_metrics() {
        let mut message = Message::new(Protocol::Framed);
        message
            .add_metric(MetricType::Meter, "myWebservice.requests", 1, None)
            .unwrap()
            .add_metric("histogram", "myWebservice.requestTime", 85, None)
            .unwrap();

        let body = "myWebservice.requests:1|m\nmyWebservice.requestTime:85|h\n";
        assert_eq!(message.body(), body.as_bytes());
        assert_eq!(message.len(), 2);
        assert_eq!(message.to_string(), format!("1|{}\n{}", body.len(), body));
    }

    #[test]
    fn bare_line_batch_has_no_trailing_newline() {
        let mut message = Message::new(Protocol::BareLine);
        message
            .add_metric(MetricType::Counter, "a", 1, None)
            .unwrap()
            .add_metric(MetricType::Timing, "b", 2, None)
            .unwrap();

        assert_eq!(message.to_string(), "a:1|c\nb:2|ms");
    }

    #[test]
    fn body_length_counts_bytes() {
        let mut message = Message::new(Protocol::Framed);
        message.add_metric(MetricType::Gauge, "température", 1, None).unwrap();

        let body = "température:1|g\n";
        assert_eq!(message.body_len(), body.len());
        assert_ne!(message.body_len(), body.chars().count());
        assert!(message.to_string().starts_with(&format!("1|{}\n", body.len())));
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let mut message = Message::new(Protocol::Framed);
        let err = message.add_metric("unsupported_type", "wtf", 1, None).unwrap_err();
        assert_eq!(err.token(), "unsupported_type");
        assert!(message.is_empty());

        // Counters are not part of the framed protocol.
        let err = message.add_metric(MetricType::Counter, "wtf", 1, None).unwrap_err();
        assert_eq!(err.token(), "counter");
        assert!(message.is_empty());
    }

    #[test]
    fn sampled_metric_selected() {
        let draw = || 0.05;
        let mut message = Message::with_sampler(Protocol::Framed, &draw);
        message.add_metric("histogram", "database.yuslow", 200, Some(0.1)).unwrap();
        assert_eq!(message.body(), b"database.yuslow:200|h|@0.1\n");
    }

    #[test]
    fn sampled_metric_not_selected() {
        let draw = || 0.5;
        let mut message = Message::with_sampler(Protocol::Framed, &draw);
        message.add_metric("histogram", "database.yuslow", 200, Some(0.1)).unwrap();
        assert!(message.is_empty());
        assert_eq!(message.len(), 0);
        assert_eq!(message.to_string(), "1|0\n");
    }

    #[test]
    fn writing_sample_boundaries() {
        let low = || 0.01;
        assert!(Message::with_sampler(Protocol::Framed, &low).writing_sample(0.1));

        let high = || 0.2;
        assert!(!Message::with_sampler(Protocol::Framed, &high).writing_sample(0.1));

        // A draw equal to the rate is written.
        let equal = || 0.25;
        assert!(Message::with_sampler(Protocol::Framed, &equal).writing_sample(0.25));

        // Rates of 1 or more never consult the sampler.
        let never = || -> f64 { panic!("sampler should not be consulted") };
        assert!(Message::with_sampler(Protocol::Framed, &never).writing_sample(1.0));
    }

    #[test]
    fn non_positive_rates_are_never_written() {
        let zero = || 0.0;
        assert!(!Message::with_sampler(Protocol::BareLine, &zero).writing_sample(0.0));
        assert!(!Message::with_sampler(Protocol::BareLine, &zero).writing_sample(-0.5));
        assert!(!Message::with_sampler(Protocol::BareLine, &zero).writing_sample(f64::NAN));

        let mut message = Message::with_sampler(Protocol::BareLine, &zero);
        message.add_metric(MetricType::Timing, "t", 1, Some(0.0)).unwrap();
        message.add_metric(MetricType::Gauge, "g", 1, Some(-1.0)).unwrap();
        assert!(message.is_empty());
        assert!(message.serialize().is_empty());
    }

    #[test]
    fn clear_resets_body() {
        let mut message = Message::new(Protocol::BareLine);
        message.add_metric(MetricType::Counter, "a", 1, None).unwrap();
        message.clear();
        assert!(message.is_empty());
        assert_eq!(message.len(), 0);
    }

    proptest! {
        #[test]
        fn unsampled_lines_are_literal(kind in arb_kind(), key in "[a-zA-Z0-9_.]{1,32}", value in arb_value()) {
            let mut message = Message::new(Protocol::BareLine);
            message.add_metric(kind, &key, value, None).unwrap();

            let code = Protocol::BareLine.type_code(kind).unwrap();
            let value_str = match value {
                MetricValue::Integer(v) => itoa::Buffer::new().format(v).to_string(),
                MetricValue::FloatingPoint(v) => ryu::Buffer::new().format(v).to_string(),
            };

            let body = std::str::from_utf8(message.body()).unwrap();
            prop_assert_eq!(body, format!("{key}:{value_str}|{code}\n"));
            prop_assert!(!body.contains("|@"));
        }

        #[test]
        fn sampling_follows_draw(draw in 0.0..1.0f64, rate in 0.001..1.0f64) {
            let sampler = move || draw;
            let mut message = Message::with_sampler(Protocol::BareLine, &sampler);
            message.add_metric(MetricType::Timing, "t", 1, Some(rate)).unwrap();

            prop_assert_eq!(message.is_empty(), draw > rate);
        }

        #[test]
        fn invalid_tokens_leave_body_unchanged(token in "[a-z_]{3,12}", value in arb_value(), rate in proptest::option::of(0.0..2.0f64)) {
            prop_assume!(token.parse::<MetricType>().is_err());

            let mut message = Message::new(Protocol::Framed);
            message.add_metric(MetricType::Meter, "before", 1, None).unwrap();
            let before = message.body().to_vec();

            prop_assert!(message.add_metric(token.as_str(), "key", value, rate).is_err());
            prop_assert_eq!(message.body(), &before[..]);
        }
    }
}
