//! A lightweight client for sending gauges and counters to a OneStatsd server.
//!
//! OneStatsd speaks a compact, line-oriented text protocol over UDP:
//!
//! ```text
//! <metric_name>:<value>|<type>[|@<sample_rate>][|#<tag>,<tag>,...]
//! ```
//!
//! where the type is `g` for gauges and `c` for counters.
//!
//! # Usage
//!
//! ```no_run
//! # use onestatsd::OneStatsdBuilder;
//! // First, create a builder.
//! //
//! // The builder can change the remote address, attach constant tags to every metric, and so on.
//! let statsd = OneStatsdBuilder::default()
//!     .with_remote_address("localhost:8251")
//!     .expect("failed to parse remote address")
//!     .with_constant_tags(["env:prod"])
//!     .build();
//!
//! statsd.gauge("users.online", 123, &[], 1.0);
//! statsd.increment("page.views", 1, &["page:home"], 1.0);
//! statsd.decrement("files.remaining", 1, &[], 1.0);
//!
//! // Only send roughly half of the calls, letting the server scale the counts back up.
//! statsd.increment("cache.hits", 1, &[], 0.5);
//! ```
//!
//! For a process-wide client, either call [`OneStatsdBuilder::install`] once at startup or just use the default one
//! returned by [`global()`].
//!
//! # Fire and forget
//!
//! Building a client does no network I/O at all: the UDP socket is created the first time a metric is sent, and then
//! reused. If a send fails, the socket is replaced and the send is retried exactly once. If the retry fails too, the
//! metric is dropped and a warning is logged through [`tracing`]. Reporting a metric never returns an error. It only
//! blocks on the datagram send itself and, when a socket has to be created, on resolving the remote host. Resolved
//! addresses are cached, so lookups are rare.
//!
//! # Batching
//!
//! Metrics can be buffered and sent together as newline-delimited payloads, to cut down on the number of packets:
//!
//! ```no_run
//! # let statsd = onestatsd::OneStatsdBuilder::default().build();
//! {
//!     let batch = statsd.batch();
//!     batch.gauge("users.online", 123, &[], 1.0);
//!     batch.gauge("active.connections", 1001, &[], 1.0);
//! } // The remaining metrics are flushed here.
//! ```
//!
//! The buffer is flushed automatically whenever it holds the maximum number of metrics (50 by default), and once more
//! when the batch guard is dropped, even if that happens while unwinding from a panic.
//!
//! # Validation
//!
//! Metric names and tags are written verbatim. Callers must not embed the protocol's reserved characters (`:`, `|`,
//! `,`, `#`, `@`, or a newline) in them.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod buffer;

mod builder;
pub use self::builder::{BuildError, OneStatsdBuilder};

mod client;
pub use self::client::{Batch, OneStatsd};

mod forwarder;
pub use self::forwarder::{Connector, PacketSocket, UdpConnector};

mod global;
pub use self::global::global;

mod sampler;

mod writer;
pub use self::writer::{Metric, MetricType, MetricValue};

#[cfg(test)]
mod test_util;
