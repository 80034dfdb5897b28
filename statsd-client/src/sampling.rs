use rand::Rng as _;

/// Source of the random draws used to decide whether a sampled metric is written.
///
/// Implementations must return a value in `[0, 1)`. Any `Fn() -> f64` closure is a `Sampler`, which lets callers
/// force deterministic draws:
///
/// ```
/// # use statsd_client::{Message, Protocol, MetricType};
/// let always_zero = || 0.0;
/// let mut message = Message::with_sampler(Protocol::BareLine, &always_zero);
/// message.add_metric(MetricType::Timing, "renderMs", 42, Some(0.5)).unwrap();
/// assert_eq!(message.to_string(), "renderMs:42|ms|@0.5");
/// ```
pub trait Sampler: Send + Sync {
    /// Draws a uniformly distributed value in `[0, 1)`.
    fn draw(&self) -> f64;
}

impl<F> Sampler for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn draw(&self) -> f64 {
        (self)()
    }
}

/// Sampler backed by the thread-local random number generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRngSampler;

impl Sampler for ThreadRngSampler {
    fn draw(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}
