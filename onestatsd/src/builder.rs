use thiserror::Error;

use crate::{
    client::{OneStatsd, State},
    forwarder::{sync::Forwarder, Connector, RemoteAddr, UdpConnector},
    global,
    sampler::Sampler,
};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8251;
const DEFAULT_MAX_BUFFER_SIZE: usize = 50;

/// Errors that could occur while building or installing a OneStatsd client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// Failed to install the client due to a global client already being installed or in use.
    #[error("failed to install client as global client")]
    FailedToInstall,
}

/// Builder for a OneStatsd client.
pub struct OneStatsdBuilder {
    remote_addr: RemoteAddr,
    connector: Option<Box<dyn Connector>>,
    max_buffer_size: usize,
    constant_tags: Vec<String>,
    use_ms: bool,
    sampling_seed: Option<u64>,
}

impl OneStatsdBuilder {
    /// Set the host of the remote server.
    ///
    /// The host is only resolved when the first socket is created, so an unresolvable host does not cause building to
    /// fail. Instead, sends will fail and be logged.
    ///
    /// Defaults to `localhost`.
    #[must_use]
    pub fn with_host<H>(mut self, host: H) -> Self
    where
        H: Into<String>,
    {
        self.remote_addr.host = host.into();
        self
    }

    /// Set the port of the remote server.
    ///
    /// Defaults to 8251.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.remote_addr.port = port;
        self
    }

    /// Set the remote address to send metrics to.
    ///
    /// The address needs to be in the format of `<host>:<port>`, with IPv6 literals wrapped in brackets (`[::1]:8251`).
    /// The host is not resolved here.
    ///
    /// Defaults to `localhost:8251`.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a host and port, an error will be returned indicating the
    /// reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.remote_addr = RemoteAddr::try_from(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        Ok(self)
    }

    /// Set the maximum number of metrics to buffer before flushing, when sending through [`OneStatsd::batch`].
    ///
    /// Defaults to 50.
    #[must_use]
    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    /// Set the tags to attach to every metric sent by the client.
    ///
    /// Constant tags are written after any tags given for an individual metric, in the order given here.
    ///
    /// Defaults to no tags.
    #[must_use]
    pub fn with_constant_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constant_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether or not timed values should be reported in milliseconds instead of seconds.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_milliseconds(mut self, use_ms: bool) -> Self {
        self.use_ms = use_ms;
        self
    }

    /// Set a fixed seed for the sampler.
    ///
    /// Sampling decisions made by clients built with the same seed are reproducible.
    ///
    /// Defaults to a seed drawn from the thread-local random number generator.
    #[must_use]
    pub fn with_sampling_seed(mut self, seed: u64) -> Self {
        self.sampling_seed = Some(seed);
        self
    }

    /// Set the connector used to create sockets.
    ///
    /// This overrides the remote address entirely, and is mostly useful for sending metrics somewhere other than a UDP
    /// socket, such as an in-memory sink in tests.
    ///
    /// Defaults to a [`UdpConnector`] for the configured remote address.
    #[must_use]
    pub fn with_connector<C>(mut self, connector: C) -> Self
    where
        C: Connector + 'static,
    {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Builds the client.
    ///
    /// No socket is created, and the remote host is not resolved, until the first metric is sent.
    pub fn build(self) -> OneStatsd {
        let connector: Box<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Box::new(UdpConnector::from_remote_addr(self.remote_addr)),
        };

        let sampler = match self.sampling_seed {
            Some(seed) => Sampler::from_seed(seed),
            None => Sampler::from_entropy(),
        };

        let state = State::new(Forwarder::new(connector), self.max_buffer_size, self.constant_tags, sampler);
        OneStatsd::new(state, self.use_ms)
    }

    /// Builds the client and installs it as the global client returned by [`global`][crate::global()].
    ///
    /// # Errors
    ///
    /// If a global client has already been installed, or the default global client has already been used, an error
    /// will be returned.
    pub fn install(self) -> Result<(), BuildError> {
        let client = self.build();

        global::install(client).map_err(|_| BuildError::FailedToInstall)
    }
}

impl Default for OneStatsdBuilder {
    fn default() -> Self {
        OneStatsdBuilder {
            remote_addr: RemoteAddr::new(DEFAULT_HOST, DEFAULT_PORT),
            connector: None,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            constant_tags: Vec::new(),
            use_ms: false,
            sampling_seed: None,
        }
    }
}
