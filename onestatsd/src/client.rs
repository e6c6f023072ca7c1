use std::{io, ops::Deref};

use parking_lot::Mutex;
use tracing::trace;

use crate::{
    buffer::SendMode,
    forwarder::sync::Forwarder,
    sampler::Sampler,
    writer::{Metric, MetricType, MetricValue},
};

pub(crate) struct State {
    forwarder: Forwarder,
    mode: SendMode,
    max_buffer_size: usize,
    constant_tags: Vec<String>,
    sampler: Sampler,
}

impl State {
    pub fn new(forwarder: Forwarder, max_buffer_size: usize, constant_tags: Vec<String>, sampler: Sampler) -> Self {
        State { forwarder, mode: SendMode::Direct, max_buffer_size, constant_tags, sampler }
    }

    fn open_buffer(&mut self, max_buffer_size: usize) {
        // The last explicit size becomes the default for later scoped batches.
        self.max_buffer_size = max_buffer_size;
        self.mode.open(max_buffer_size);
    }

    fn dispatch(&mut self, packet: String) {
        if let Some(payload) = self.mode.route(packet) {
            self.forwarder.send(payload.as_bytes());
        }
    }

    fn flush(&mut self) {
        if let Some(payload) = self.mode.close() {
            trace!("Flushing remaining buffered metrics.");
            self.forwarder.send(payload.as_bytes());
        }
    }
}

/// A client for sending gauges and counters to a OneStatsd server.
///
/// Metrics are encoded as `name:value|type[|@sample_rate][|#tags]` and sent over UDP. Sending never fails from the
/// caller's point of view: transport errors are retried once on a fresh socket, and then logged and dropped.
///
/// By default, every metric is sent in its own datagram. Calling [`open_buffer`][OneStatsd::open_buffer], or using
/// the scoped [`batch`][OneStatsd::batch] guard, accumulates metrics and sends them as newline-delimited batches
/// instead.
///
/// All mutable state sits behind a single mutex, so a client can be shared freely between threads. Note that the send
/// mode is shared too: while one thread has a buffer open, metrics from every thread are buffered.
///
/// Socket creation also happens under the mutex. For a [`UdpConnector`][crate::UdpConnector] that includes resolving
/// the remote host, which is cached between sockets, so a slow resolver only stalls the sends that have to create a
/// socket while the cache is cold or expired.
pub struct OneStatsd {
    state: Mutex<State>,
    use_ms: bool,
}

impl OneStatsd {
    pub(crate) fn new(state: State, use_ms: bool) -> Self {
        OneStatsd { state: Mutex::new(state), use_ms }
    }

    /// Records the value of a gauge.
    ///
    /// ```no_run
    /// # let statsd = onestatsd::OneStatsdBuilder::default().build();
    /// statsd.gauge("users.online", 123, &[], 1.0);
    /// statsd.gauge("active.connections", 1001, &["protocol:http"], 1.0);
    /// ```
    pub fn gauge<V>(&self, name: &str, value: V, tags: &[&str], sample_rate: f64)
    where
        V: Into<MetricValue>,
    {
        self.report(&Metric::new(name, value, MetricType::Gauge).with_tags(tags).with_sample_rate(sample_rate));
    }

    /// Increments a counter by `value`.
    ///
    /// ```no_run
    /// # let statsd = onestatsd::OneStatsdBuilder::default().build();
    /// statsd.increment("page.views", 1, &[], 1.0);
    /// statsd.increment("files.transferred", 124, &[], 1.0);
    /// ```
    pub fn increment<V>(&self, name: &str, value: V, tags: &[&str], sample_rate: f64)
    where
        V: Into<MetricValue>,
    {
        self.report(&Metric::new(name, value, MetricType::Counter).with_tags(tags).with_sample_rate(sample_rate));
    }

    /// Decrements a counter by `value`.
    ///
    /// This is identical to calling [`increment`][OneStatsd::increment] with the negated value.
    ///
    /// ```no_run
    /// # let statsd = onestatsd::OneStatsdBuilder::default().build();
    /// statsd.decrement("files.remaining", 1, &[], 1.0);
    /// statsd.decrement("active.connections", 2, &[], 1.0);
    /// ```
    pub fn decrement<V>(&self, name: &str, value: V, tags: &[&str], sample_rate: f64)
    where
        V: Into<MetricValue>,
    {
        let value: MetricValue = value.into();
        self.increment(name, -value, tags, sample_rate);
    }

    fn report(&self, metric: &Metric<'_>) {
        let mut state = self.state.lock();

        if !state.sampler.should_sample(metric.sample_rate()) {
            trace!(metric = metric.name(), sample_rate = metric.sample_rate(), "Metric sampled out.");
            return;
        }

        let packet = metric.encode(&state.constant_tags);
        state.dispatch(packet);
    }

    /// Starts buffering metrics, flushing them as a single payload every `max_buffer_size` metrics.
    ///
    /// If a buffer is already open, it is replaced and any metrics still in it are discarded.
    ///
    /// `max_buffer_size` also becomes the client's default maximum buffer size, used by later calls to
    /// [`batch`][OneStatsd::batch].
    pub fn open_buffer(&self, max_buffer_size: usize) {
        self.state.lock().open_buffer(max_buffer_size);
    }

    /// Flushes any buffered metrics and goes back to sending each metric individually.
    ///
    /// Does nothing if no buffer is open.
    pub fn close_buffer(&self) {
        self.state.lock().flush();
    }

    /// Returns `true` if metrics are currently being buffered.
    pub fn is_buffering(&self) -> bool {
        self.state.lock().mode.is_buffering()
    }

    /// Opens a buffer using the current maximum buffer size, returning a guard that closes it when dropped.
    ///
    /// The guard dereferences to the client, and flushes the remaining metrics on every exit path, including early
    /// returns and panics.
    ///
    /// ```no_run
    /// # let statsd = onestatsd::OneStatsdBuilder::default().build();
    /// {
    ///     let batch = statsd.batch();
    ///     batch.gauge("users.online", 123, &[], 1.0);
    ///     batch.gauge("active.connections", 1001, &[], 1.0);
    /// }
    /// ```
    pub fn batch(&self) -> Batch<'_> {
        {
            let mut state = self.state.lock();
            let max_buffer_size = state.max_buffer_size;
            state.open_buffer(max_buffer_size);
        }

        Batch { client: self }
    }

    /// Like [`batch`][OneStatsd::batch], but with an explicit maximum buffer size.
    pub fn batch_with_size(&self, max_buffer_size: usize) -> Batch<'_> {
        self.open_buffer(max_buffer_size);
        Batch { client: self }
    }

    /// Returns the maximum buffer size used by [`batch`][OneStatsd::batch].
    ///
    /// This starts out as the size given to the builder, and is replaced by every call to
    /// [`open_buffer`][OneStatsd::open_buffer] or [`batch_with_size`][OneStatsd::batch_with_size].
    pub fn max_buffer_size(&self) -> usize {
        self.state.lock().max_buffer_size
    }

    /// Returns the tags appended to every metric sent by this client.
    pub fn constant_tags(&self) -> Vec<String> {
        self.state.lock().constant_tags.clone()
    }

    /// Replaces the tags appended to every metric sent by this client.
    pub fn set_constant_tags<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().constant_tags = tags.into_iter().map(Into::into).collect();
    }

    /// Returns `true` if timed values should be reported in milliseconds rather than seconds.
    pub fn uses_milliseconds(&self) -> bool {
        self.use_ms
    }

    /// Returns `true` if the client currently holds a socket.
    ///
    /// Clients connect lazily, so this is `false` until the first metric is sent or [`connect`][OneStatsd::connect]
    /// is called.
    pub fn is_connected(&self) -> bool {
        self.state.lock().forwarder.is_connected()
    }

    /// Creates the socket now instead of waiting for the first metric.
    ///
    /// Calling this again once connected reuses the existing socket.
    ///
    /// # Errors
    ///
    /// If the remote address cannot be resolved or the socket cannot be created, an error is returned.
    pub fn connect(&self) -> io::Result<()> {
        self.state.lock().forwarder.connect()
    }
}

/// A scoped buffer.
///
/// Created by [`OneStatsd::batch`]. Metrics reported through the guard (or through the client directly) are buffered
/// until the guard is dropped, at which point the buffer is flushed and closed.
#[must_use = "the buffer is closed as soon as the guard is dropped"]
pub struct Batch<'a> {
    client: &'a OneStatsd,
}

impl Deref for Batch<'_> {
    type Target = OneStatsd;

    fn deref(&self) -> &Self::Target {
        self.client
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        self.client.close_buffer();
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use crate::{test_util::FakeConnector, OneStatsd, OneStatsdBuilder};

    fn client() -> (OneStatsd, FakeConnector) {
        let connector = FakeConnector::new();
        let client = OneStatsdBuilder::default().with_connector(connector.clone()).with_sampling_seed(42).build();
        (client, connector)
    }

    #[test]
    fn gauge() {
        let (statsd, socket) = client();
        statsd.gauge("gauge", 123.4, &[], 1.0);
        assert_eq!(socket.recv().as_deref(), Some("gauge:123.4|g"));
    }

    #[test]
    fn counter() {
        let (statsd, socket) = client();

        statsd.increment("page.views", 1, &[], 1.0);
        assert_eq!(socket.recv().as_deref(), Some("page.views:1|c"));

        statsd.increment("page.views", 11, &[], 1.0);
        assert_eq!(socket.recv().as_deref(), Some("page.views:11|c"));

        statsd.decrement("page.views", 1, &[], 1.0);
        assert_eq!(socket.recv().as_deref(), Some("page.views:-1|c"));

        statsd.decrement("page.views", 12, &[], 1.0);
        assert_eq!(socket.recv().as_deref(), Some("page.views:-12|c"));
    }

    #[test]
    fn decrement_matches_negated_increment() {
        let (statsd, socket) = client();

        statsd.decrement("files.remaining", 2.5, &["a"], 1.0);
        statsd.increment("files.remaining", -2.5, &["a"], 1.0);

        let decremented = socket.recv();
        assert_eq!(decremented.as_deref(), Some("files.remaining:-2.5|c|#a"));
        assert_eq!(decremented, socket.recv());
    }

    #[test]
    fn tagged_metrics() {
        let (statsd, socket) = client();

        statsd.gauge("gt", 123.4, &["country:china", "age:45", "blue"], 1.0);
        assert_eq!(socket.recv().as_deref(), Some("gt:123.4|g|#country:china,age:45,blue"));

        statsd.increment("ct", 1, &["country:canada", "red"], 1.0);
        assert_eq!(socket.recv().as_deref(), Some("ct:1|c|#country:canada,red"));
    }

    #[test]
    fn sample_rate() {
        let (statsd, socket) = client();

        statsd.increment("c", 1, &[], 0.0);
        assert_eq!(socket.recv(), None);

        for _ in 0..10_000 {
            statsd.increment("sampled_counter", 1, &[], 0.3);
        }

        let emitted = socket.payload_count();
        assert!((2_700..=3_300).contains(&emitted), "{emitted} emitted");
        assert_eq!(socket.recv().as_deref(), Some("sampled_counter:1|c|@0.3"));
    }

    #[test]
    fn tags_and_samples() {
        let (statsd, socket) = client();

        for _ in 0..100 {
            statsd.gauge("gst", 23, &["sampled"], 0.9);
        }

        assert!(socket.payload_count() > 0);
        while let Some(payload) = socket.recv() {
            assert_eq!(payload, "gst:23|g|@0.9|#sampled");
        }
    }

    #[test]
    fn sampled_out_metrics_never_connect() {
        let (statsd, socket) = client();

        for _ in 0..100 {
            statsd.increment("never", 1, &[], 0.0);
        }

        assert_eq!(socket.connects(), 0);
        assert!(!statsd.is_connected());
    }

    #[test]
    fn constant_tags() {
        let (statsd, socket) = client();
        statsd.set_constant_tags(["bar:baz", "foo"]);
        assert_eq!(statsd.constant_tags(), vec!["bar:baz".to_string(), "foo".to_string()]);

        statsd.gauge("gauge", 123.4, &[], 1.0);
        assert_eq!(socket.recv().as_deref(), Some("gauge:123.4|g|#bar:baz,foo"));

        statsd.increment("page.views", 1, &["extra"], 1.0);
        assert_eq!(socket.recv().as_deref(), Some("page.views:1|c|#extra,bar:baz,foo"));
    }

    #[test]
    fn socket_error_is_not_propagated() {
        let connector = FakeConnector::new().with_failing_sends(usize::MAX);
        let statsd = OneStatsdBuilder::default().with_connector(connector.clone()).build();

        statsd.gauge("no error", 1, &[], 1.0);
        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.send_attempts(), 2);
        assert_eq!(connector.recv(), None);
    }

    #[test]
    fn socket_error_recovers_on_fresh_socket() {
        let connector = FakeConnector::new().with_failing_sends(1);
        let statsd = OneStatsdBuilder::default().with_connector(connector.clone()).build();

        statsd.gauge("recovered", 1, &[], 1.0);
        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.recv().as_deref(), Some("recovered:1|g"));
    }

    #[test]
    fn batched() {
        let (statsd, socket) = client();

        statsd.open_buffer(50);
        assert!(statsd.is_buffering());
        statsd.gauge("page.views", 123, &[], 1.0);
        assert_eq!(socket.recv(), None);
        statsd.close_buffer();
        assert!(!statsd.is_buffering());

        assert_eq!(socket.recv().as_deref(), Some("page.views:123|g"));
    }

    #[test]
    fn closing_empty_buffer_sends_nothing() {
        let (statsd, socket) = client();

        statsd.open_buffer(50);
        statsd.close_buffer();
        statsd.close_buffer();

        assert_eq!(socket.send_attempts(), 0);
        assert_eq!(socket.connects(), 0);
    }

    #[test]
    fn batch_guard() {
        let (statsd, socket) = client();

        {
            let batch = statsd.batch();
            assert_eq!(statsd.max_buffer_size(), 50);
            batch.gauge("page.views", 123, &[], 1.0);
            assert_eq!(socket.recv(), None);
        }

        assert!(!statsd.is_buffering());
        assert_eq!(socket.recv().as_deref(), Some("page.views:123|g"));
    }

    #[test]
    fn open_buffer_sets_default_batch_size() {
        let (statsd, socket) = client();

        statsd.open_buffer(3);
        statsd.close_buffer();
        assert_eq!(statsd.max_buffer_size(), 3);

        {
            let batch = statsd.batch();
            for _ in 0..4 {
                batch.increment("mycounter", 1, &[], 1.0);
            }

            assert_eq!(socket.recv(), Some(vec!["mycounter:1|c"; 3].join("\n")));
            assert_eq!(socket.recv(), None);
        }

        assert_eq!(socket.recv().as_deref(), Some("mycounter:1|c"));

        drop(statsd.batch_with_size(7));
        assert_eq!(statsd.max_buffer_size(), 7);
    }

    #[test]
    fn batched_buffer_autoflush() {
        let (statsd, socket) = client();

        {
            let batch = statsd.batch();
            for _ in 0..51 {
                batch.increment("mycounter", 1, &[], 1.0);
            }

            assert_eq!(socket.recv(), Some(vec!["mycounter:1|c"; 50].join("\n")));
            assert_eq!(socket.recv(), None);
        }

        assert_eq!(socket.recv().as_deref(), Some("mycounter:1|c"));
        assert_eq!(socket.recv(), None);
    }

    #[test]
    fn batch_guard_flushes_on_panic() {
        let (statsd, socket) = client();

        let result = catch_unwind(AssertUnwindSafe(|| {
            let batch = statsd.batch_with_size(10);
            batch.increment("before.panic", 1, &[], 1.0);
            panic!("boom");
        }));

        assert!(result.is_err());
        assert!(!statsd.is_buffering());
        assert_eq!(socket.recv().as_deref(), Some("before.panic:1|c"));
    }

    #[test]
    fn reopening_buffer_discards_unflushed_metrics() {
        let (statsd, socket) = client();

        statsd.open_buffer(50);
        statsd.increment("lost", 1, &[], 1.0);
        statsd.open_buffer(50);
        statsd.increment("kept", 1, &[], 1.0);
        statsd.close_buffer();

        assert_eq!(socket.recv().as_deref(), Some("kept:1|c"));
        assert_eq!(socket.recv(), None);
    }

    #[test]
    fn instantiating_does_not_connect() {
        let (statsd, socket) = client();
        assert!(!statsd.is_connected());
        assert_eq!(socket.connects(), 0);
    }

    #[test]
    fn connecting_reuses_socket() {
        let (statsd, socket) = client();

        statsd.connect().unwrap();
        assert!(statsd.is_connected());
        statsd.connect().unwrap();
        statsd.gauge("a", 1, &[], 1.0);
        statsd.gauge("b", 2, &[], 1.0);

        assert_eq!(socket.connects(), 1);
        assert_eq!(socket.payload_count(), 2);
    }

    #[test]
    fn uses_milliseconds() {
        let statsd = OneStatsdBuilder::default().build();
        assert!(!statsd.uses_milliseconds());

        let statsd = OneStatsdBuilder::default().with_milliseconds(true).build();
        assert!(statsd.uses_milliseconds());
    }

    #[test]
    fn shared_between_threads() {
        let (statsd, socket) = client();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..250 {
                        statsd.increment("threads", 1, &[], 1.0);
                    }
                });
            }
        });

        assert_eq!(socket.payload_count(), 1_000);
        assert_eq!(socket.connects(), 1);
    }
}
