//! A client for sending metrics to a [StatsD][statsd]-style collector over UDP.
//!
//! [statsd]: https://github.com/statsd/statsd
//!
//! # Usage
//!
//! ```no_run
//! # use statsd_client::StatsdBuilder;
//! // Build an emitter for the collector. No socket is opened until the first metric is sent.
//! let statsd = StatsdBuilder::default()
//!     .with_remote_address("localhost:8125")?
//!     .with_namespace("myapp")
//!     .build()?;
//!
//! // Sent as `myapp.garets:1|c`.
//! statsd.increment("garets", None)?;
//!
//! // Sent as `myapp.glork:320|ms|@0.1`, one time in ten.
//! statsd.timing("glork", 320, Some(0.1))?;
//!
//! // Times the block and sends the elapsed milliseconds.
//! let rows = statsd.time("query", None, || 42)?;
//! # let _ = rows;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Delivery
//!
//! Metrics are sent as they are submitted, one payload per metric, on the calling thread. UDP gives no delivery
//! guarantee and the client adds none: nothing is acknowledged, buffered or retried. Send failures that the platform
//! reports right away are returned to the caller.
//!
//! # Sampling
//!
//! Every submission takes an optional sample rate. With a rate below 1, the metric is only sent when a random draw is
//! less than or equal to the rate, and the rate is written on the line so the collector can scale it back up. A
//! metric discarded by sampling sends nothing and is not an error. The source of random draws is a [`Sampler`], which
//! can be replaced to make sampling deterministic.
//!
//! # Protocols
//!
//! Two wire formats are supported, selected with [`StatsdBuilder::with_protocol`]:
//!
//! - [`Protocol::BareLine`] (default): plain StatsD lines, such as `pageviews:1|c`.
//! - [`Protocol::Framed`]: a versioned, length-prefixed body of lines, such as `1|13\nfoobar:500|h\n`. Counters are not
//!   part of this format.
//!
//! [`Message`] is the encoder behind both, and can be used directly to batch several metrics into one payload.
//!
//! # Telemetry
//!
//! The client records its own activity (payloads and bytes sent or dropped, metrics discarded by sampling) through the
//! [`metrics`] facade, under the `statsd.client` prefix. It can be turned off with
//! [`StatsdBuilder::with_telemetry`].

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, StatsdBuilder, DEFAULT_PORT};

mod emitter;
pub use self::emitter::{elapsed_millis, Emitter};

mod error;
pub use self::error::Error;

mod kind;
pub use self::kind::{IntoMetricType, InvalidMetricType, MetricType};

mod message;
pub use self::message::{Message, MetricValue};

mod protocol;
pub use self::protocol::{Protocol, PROTOCOL_VERSION};

mod sampling;
pub use self::sampling::{Sampler, ThreadRngSampler};

mod telemetry;

mod transport;
pub use self::transport::{NopTransport, Transport, UdpTransport};

#[cfg(test)]
mod test_util;
