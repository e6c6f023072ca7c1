use std::{
    collections::VecDeque,
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::forwarder::{Connector, PacketSocket};

#[derive(Default)]
struct Inner {
    payloads: Mutex<VecDeque<String>>,
    connects: AtomicUsize,
    send_attempts: AtomicUsize,
    failing_connects: AtomicUsize,
    failing_sends: AtomicUsize,
}

fn take_one(remaining: &AtomicUsize) -> bool {
    remaining.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1)).is_ok()
}

/// A connector whose sockets record every payload instead of sending it.
///
/// Failures can be scheduled for both socket creation and sends, and are consumed in order across all sockets created
/// by the connector.
#[derive(Clone, Default)]
pub struct FakeConnector {
    inner: Arc<Inner>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` sends fail.
    pub fn with_failing_sends(self, n: usize) -> Self {
        self.inner.failing_sends.store(n, Ordering::Release);
        self
    }

    /// Makes the next `n` connection attempts fail.
    pub fn with_failing_connects(self, n: usize) -> Self {
        self.inner.failing_connects.store(n, Ordering::Release);
        self
    }

    pub fn recv(&self) -> Option<String> {
        self.inner.payloads.lock().pop_front()
    }

    pub fn payload_count(&self) -> usize {
        self.inner.payloads.lock().len()
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::Acquire)
    }

    pub fn send_attempts(&self) -> usize {
        self.inner.send_attempts.load(Ordering::Acquire)
    }
}

impl Connector for FakeConnector {
    fn connect(&self) -> io::Result<Box<dyn PacketSocket>> {
        if take_one(&self.inner.failing_connects) {
            return Err(io::Error::new(io::ErrorKind::AddrNotAvailable, "connect failed"));
        }

        self.inner.connects.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(FakeSocket { inner: Arc::clone(&self.inner) }))
    }
}

struct FakeSocket {
    inner: Arc<Inner>,
}

impl PacketSocket for FakeSocket {
    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        self.inner.send_attempts.fetch_add(1, Ordering::AcqRel);
        if take_one(&self.inner.failing_sends) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "socket error"));
        }

        let decoded = String::from_utf8(payload.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.inner.payloads.lock().push_back(decoded);
        Ok(payload.len())
    }
}
