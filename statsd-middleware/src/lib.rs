//! Request instrumentation for services reporting to a StatsD-style collector.
//!
//! [`Middleware`] wraps the handling of a single request. For every request, it counts the request and records how
//! long it took under each configured namespace, counts the response status code, and counts handlers that fail.
//!
//! # Usage
//!
//! ```no_run
//! # use statsd_middleware::{Middleware, MiddlewareConfig};
//! let middleware = Middleware::new(MiddlewareConfig {
//!     host: "statsd-host.example.com".to_string(),
//!     port: 3344,
//!     namespaces: vec!["apiService.application".to_string(), "apiService.apiServer-123abcf".to_string()],
//! })?;
//!
//! let status = middleware.call(|request| {
//!     // Count and time the index action on top of the defaults.
//!     request.increment("posts.index");
//!     request.time("posts.index");
//!
//!     // Custom metrics go straight through the client.
//!     let _ = request.client().increment("s3Calls", None);
//!
//!     Ok::<u16, std::io::Error>(200)
//! })?;
//! # let _ = status;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! With the namespace `apiService.application`, that request sends:
//!
//! - `apiService.application.allRequests:1|c`
//! - `apiService.application.posts.index:1|c`
//! - `apiService.application.byStatusCode.200:1|c`
//! - `apiService.application.allRequests:<elapsed>|ms`
//! - `apiService.application.posts.index:<elapsed>|ms`
//!
//! and the same again for every other namespace.
//!
//! Metric submission never changes the outcome of a request: failures to send are logged and otherwise ignored.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]

use std::panic::{self, AssertUnwindSafe};

use quanta::Clock;
use statsd_client::{elapsed_millis, BuildError, Emitter, Error, StatsdBuilder, Transport, UdpTransport};
use tracing::warn;

/// Key counted and timed for every request.
pub const ALL_REQUESTS: &str = "allRequests";

/// Key counted when a handler fails.
pub const UNCAUGHT_EXCEPTIONS: &str = "uncaughtExceptions";

/// Default collector port for the middleware.
pub const DEFAULT_PORT: u16 = 3344;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_NAMESPACE: &str = "rackMiddleware";

/// A response with a status code.
pub trait ResponseStatus {
    /// Returns the status code of the response.
    fn status(&self) -> u16;
}

impl ResponseStatus for u16 {
    fn status(&self) -> u16 {
        *self
    }
}

impl<B> ResponseStatus for (u16, B) {
    fn status(&self) -> u16 {
        self.0
    }
}

/// Middleware configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiddlewareConfig {
    /// Collector host.
    ///
    /// Defaults to `localhost`.
    pub host: String,

    /// Collector port.
    ///
    /// Defaults to 3344.
    pub port: u16,

    /// Namespaces every request metric is reported under.
    ///
    /// Defaults to `rackMiddleware`.
    pub namespaces: Vec<String>,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        MiddlewareConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            namespaces: vec![DEFAULT_NAMESPACE.to_string()],
        }
    }
}

/// Per-request metric keys, handed to the request handler.
///
/// Both lists start out with [`ALL_REQUESTS`]. Handlers add keys for whatever they want counted or timed on top of
/// that, and can reach the underlying client for anything else.
pub struct RequestMetrics<'a, T> {
    client: &'a Emitter<T>,
    increments: Vec<String>,
    timers: Vec<String>,
}

impl<'a, T> RequestMetrics<'a, T>
where
    T: Transport,
{
    fn new(client: &'a Emitter<T>) -> Self {
        RequestMetrics {
            client,
            increments: vec![ALL_REQUESTS.to_string()],
            timers: vec![ALL_REQUESTS.to_string()],
        }
    }

    /// Returns the client, for submitting custom metrics.
    pub fn client(&self) -> &'a Emitter<T> {
        self.client
    }

    /// Counts this request under the given key as well.
    pub fn increment<S>(&mut self, key: S)
    where
        S: Into<String>,
    {
        self.increments.push(key.into());
    }

    /// Records this request's duration under the given key as well.
    pub fn time<S>(&mut self, key: S)
    where
        S: Into<String>,
    {
        self.timers.push(key.into());
    }

    /// Returns the keys this request will be counted under.
    pub fn increments(&self) -> &[String] {
        &self.increments
    }

    /// Returns the keys this request's duration will be recorded under.
    pub fn timers(&self) -> &[String] {
        &self.timers
    }
}

/// Instruments request handling.
pub struct Middleware<T = UdpTransport> {
    client: Emitter<T>,
    namespaces: Vec<String>,
    clock: Clock,
}

impl Middleware<UdpTransport> {
    /// Creates a new `Middleware` sending over UDP, as configured.
    ///
    /// # Errors
    ///
    /// If the configured host is empty or the port is zero, an error will be returned.
    pub fn new(config: MiddlewareConfig) -> Result<Self, BuildError> {
        let client = StatsdBuilder::default().with_host(config.host).with_port(config.port).build()?;
        Ok(Middleware::with_emitter(client, config.namespaces))
    }
}

impl<T> Middleware<T>
where
    T: Transport,
{
    /// Creates a new `Middleware` reporting through the given client.
    pub fn with_emitter<I, S>(client: Emitter<T>, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Middleware {
            client,
            namespaces: namespaces.into_iter().map(Into::into).collect(),
            clock: Clock::new(),
        }
    }

    /// Sets the clock used to time requests.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the client.
    pub fn client(&self) -> &Emitter<T> {
        &self.client
    }

    /// Returns the namespaces every request metric is reported under.
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Handles a request with `handler`, reporting metrics about it.
    ///
    /// When the handler succeeds, the request is counted under `byStatusCode.<status>` in addition to every increment
    /// key, and its duration is recorded under every timer key. When the handler returns an error or panics, the
    /// request is counted under [`UNCAUGHT_EXCEPTIONS`] instead, and the error or panic is passed on unchanged.
    ///
    /// # Errors
    ///
    /// The handler's error is returned as-is.
    pub fn call<F, R, E>(&self, handler: F) -> Result<R, E>
    where
        F: FnOnce(&mut RequestMetrics<'_, T>) -> Result<R, E>,
        R: ResponseStatus,
    {
        let mut request = RequestMetrics::new(&self.client);

        let start = self.clock.now();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| handler(&mut request))) {
            Ok(result) => result,
            Err(payload) => {
                self.each_namespace_with(UNCAUGHT_EXCEPTIONS, |key| self.client.increment(key, None));
                panic::resume_unwind(payload);
            }
        };
        let elapsed = self.clock.now().duration_since(start);

        match &result {
            Ok(response) => {
                request.increment(format!("byStatusCode.{}", response.status()));

                let millis = elapsed_millis(elapsed);
                for sub_namespace in request.increments() {
                    self.each_namespace_with(sub_namespace, |key| self.client.increment(key, None));
                }
                for sub_namespace in request.timers() {
                    self.each_namespace_with(sub_namespace, |key| self.client.timing(key, millis, None));
                }
            }
            Err(_) => {
                self.each_namespace_with(UNCAUGHT_EXCEPTIONS, |key| self.client.increment(key, None));
            }
        }

        result
    }

    fn each_namespace_with<F>(&self, sub_namespace: &str, mut submit: F)
    where
        F: FnMut(&str) -> Result<(), Error>,
    {
        for namespace in &self.namespaces {
            let key = format!("{namespace}.{sub_namespace}");
            if let Err(e) = submit(&key) {
                warn!(error = %e, key = %key, "Failed to submit request metric.");
            }
        }
    }
}
