use std::io;

use tracing::{info, trace, warn};

use super::{Connector, PacketSocket};

enum ClientState {
    // Forwarder has no socket, either because nothing was sent yet or because the last send failed.
    Disconnected,

    // Forwarder has a connected socket and is ready to send payloads.
    Ready(Box<dyn PacketSocket>),
}

impl ClientState {
    fn ensure_ready(&mut self, connector: &dyn Connector) -> io::Result<&mut Box<dyn PacketSocket>> {
        if let ClientState::Disconnected = self {
            *self = ClientState::Ready(connector.connect()?);
        }

        match self {
            ClientState::Ready(socket) => Ok(socket),
            ClientState::Disconnected => unreachable!("socket was just created"),
        }
    }

    fn try_send(&mut self, connector: &dyn Connector, payload: &[u8]) -> io::Result<usize> {
        let result = self.ensure_ready(connector)?.send(payload);
        if result.is_err() {
            // Drop the socket so that the next attempt starts from a fresh one.
            *self = ClientState::Disconnected;
        }

        result
    }
}

/// Synchronous transport.
///
/// Owns a lazily-created socket and sends each payload as a single datagram. When a send fails, the socket is thrown
/// away and the payload is retried exactly once on a freshly created socket. If that also fails, the payload is
/// dropped.
pub(crate) struct Forwarder {
    connector: Box<dyn Connector>,
    client_state: ClientState,
}

impl Forwarder {
    /// Creates a new synchronous `Forwarder`.
    ///
    /// No socket is created until the first payload is sent.
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Forwarder { connector, client_state: ClientState::Disconnected }
    }

    /// Returns `true` if the forwarder currently holds a socket.
    pub fn is_connected(&self) -> bool {
        matches!(self.client_state, ClientState::Ready(_))
    }

    /// Creates the socket now, if it does not exist yet.
    ///
    /// # Errors
    ///
    /// If the socket cannot be created, an error is returned.
    pub fn connect(&mut self) -> io::Result<()> {
        self.client_state.ensure_ready(self.connector.as_ref()).map(|_| ())
    }

    /// Sends a payload, retrying once on a fresh socket if the first attempt fails.
    ///
    /// Returns `true` if the payload was sent.
    pub fn send(&mut self, payload: &[u8]) -> bool {
        let connector = self.connector.as_ref();

        match self.client_state.try_send(connector, payload) {
            Ok(_) => {
                trace!(payload_len = payload.len(), "Sent payload.");
                return true;
            }
            Err(e) => info!(error = %e, "Error submitting packet, will try refreshing the socket."),
        }

        match self.client_state.try_send(connector, payload) {
            Ok(_) => {
                trace!(payload_len = payload.len(), "Sent payload on refreshed socket.");
                true
            }
            Err(e) => {
                warn!(error = %e, payload_len = payload.len(), "Failed to send packet with a fresh socket, dropping.");
                false
            }
        }
    }
}
