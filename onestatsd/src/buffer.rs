use tracing::trace;

/// Accumulates encoded metrics so they can be sent together as a single newline-delimited payload.
///
/// The buffer is flushed as soon as it holds `max_size` metrics, so it never grows past that threshold.
pub(crate) struct Buffer {
    packets: Vec<String>,
    max_size: usize,
}

impl Buffer {
    /// Creates an empty `Buffer` that flushes once it holds `max_size` metrics.
    ///
    /// A `max_size` of zero flushes after every metric.
    pub fn new(max_size: usize) -> Self {
        Buffer { packets: Vec::new(), max_size }
    }

    /// Appends an encoded metric to the buffer.
    ///
    /// If the buffer has reached its threshold, it is drained and the joined payload is returned so the caller can send
    /// it.
    pub fn push(&mut self, packet: String) -> Option<String> {
        self.packets.push(packet);
        if self.packets.len() >= self.max_size {
            trace!(buffered = self.packets.len(), max_size = self.max_size, "Buffer full, flushing.");
            self.take_payload()
        } else {
            None
        }
    }

    /// Drains the buffer, returning all buffered metrics joined by newlines.
    ///
    /// Returns `None` if the buffer is empty.
    pub fn take_payload(&mut self) -> Option<String> {
        if self.packets.is_empty() {
            return None;
        }

        let payload = self.packets.join("\n");
        self.packets.clear();
        Some(payload)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.packets.len()
    }
}

/// How encoded metrics are handed to the transport.
pub(crate) enum SendMode {
    // Every metric is sent as soon as it is encoded.
    Direct,

    // Metrics are accumulated and sent in batches.
    Buffering(Buffer),
}

impl SendMode {
    /// Switches to buffering with the given flush threshold.
    ///
    /// If a buffer was already open, its contents are discarded without being sent.
    pub fn open(&mut self, max_size: usize) {
        if let SendMode::Buffering(buffer) = self {
            if buffer.take_payload().is_some() {
                trace!("Reopening buffer, discarding unflushed metrics.");
            }
        }

        *self = SendMode::Buffering(Buffer::new(max_size));
    }

    /// Switches back to direct sending, returning whatever was still buffered.
    pub fn close(&mut self) -> Option<String> {
        match std::mem::replace(self, SendMode::Direct) {
            SendMode::Direct => None,
            SendMode::Buffering(mut buffer) => buffer.take_payload(),
        }
    }

    /// Routes an encoded metric according to the current mode.
    ///
    /// Returns the payload that should be sent right away, if any.
    pub fn route(&mut self, packet: String) -> Option<String> {
        match self {
            SendMode::Direct => Some(packet),
            SendMode::Buffering(buffer) => buffer.push(packet),
        }
    }

    /// Returns `true` if metrics are currently being buffered.
    pub fn is_buffering(&self) -> bool {
        matches!(self, SendMode::Buffering(_))
    }
}
