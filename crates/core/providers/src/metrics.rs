/// Destination for counters emitted by the provider middleware
///
/// Implementations must not block and must swallow their own failures,
/// emitting a metric never affects the call that produced it.
pub trait MetricsSink: Send + Sync {
    /// Increment counter `name` by `value`
    fn incr(&self, name: &str, tags: &[String], value: u64);
}

/// Discards every metric
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn incr(&self, _name: &str, _tags: &[String], _value: u64) {}
}
