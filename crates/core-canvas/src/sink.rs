//! Reliable-channel subscriber seam.
//!
//! Rooms broadcast through `ReliableSink` trait objects so the engine can
//! be exercised without sockets; the production implementation wraps a
//! cloned `TcpStream`.

use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

pub trait ReliableSink: Send {
    /// Write the full buffer to the subscriber. A failing send is the
    /// caller's cue to ignore this subscriber; its own session handler
    /// detects the close independently.
    fn send(&self, bytes: &[u8]) -> io::Result<()>;
}

/// Production sink over a cloned `TcpStream`.
pub struct TcpSink {
    stream: TcpStream,
}

impl TcpSink {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl ReliableSink for TcpSink {
    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        (&self.stream).write_all(bytes)
    }
}

/// Test double that records every buffer it is handed. Shared by the canvas
/// and server test suites.
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every buffer sent so far, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().expect("recording sink poisoned").clone()
    }
}

impl ReliableSink for RecordingSink {
    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        self.sent
            .lock()
            .expect("recording sink poisoned")
            .push(bytes.to_vec());
        Ok(())
    }
}
