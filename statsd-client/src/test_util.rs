use std::{
    io,
    sync::{Arc, Mutex},
};

use crate::transport::Transport;

/// Transport that keeps every payload in memory instead of sending it.
///
/// Clones share the same buffer, so a test can hand one clone to an emitter and inspect the other.
#[derive(Clone, Debug, Default)]
pub(crate) struct CapturingTransport {
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    failing: bool,
}

impl CapturingTransport {
    /// Creates a transport whose sends all fail.
    pub fn failing() -> Self {
        CapturingTransport { payloads: Arc::default(), failing: true }
    }

    /// Returns every payload captured so far, in send order.
    pub fn payloads(&self) -> Vec<String> {
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .map(|payload| String::from_utf8(payload.clone()).unwrap())
            .collect()
    }
}

impl Transport for CapturingTransport {
    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        if self.failing {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        }

        self.payloads.lock().unwrap().push(payload.to_vec());
        Ok(payload.len())
    }

    fn transport_id(&self) -> &'static str {
        "capture"
    }
}
