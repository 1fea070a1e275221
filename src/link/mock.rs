//! In-memory connection for exercising links without hardware.
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{DmxLink, LinkConfig, Mode};

/// A connection whose clones share the same buffers.
#[derive(Clone, Default)]
pub struct SharedConnection {
    input: Arc<Mutex<VecDeque<u8>>>,
    output: Arc<Mutex<Vec<u8>>>,
    flushed: Arc<AtomicBool>,
}

impl SharedConnection {
    /// Create a connection that will yield these bytes to readers.
    pub fn with_input(bytes: Vec<u8>) -> Self {
        let conn = Self::default();
        conn.input.lock().unwrap().extend(bytes);
        conn
    }

    /// Everything written to the connection so far.
    pub fn written(&self) -> Vec<u8> {
        self.output.lock().unwrap().clone()
    }

    pub fn flushed(&self) -> bool {
        self.flushed.load(Ordering::Acquire)
    }
}

impl Read for SharedConnection {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut input = self.input.lock().unwrap();
        let count = buf.len().min(input.len());
        for (dst, src) in buf.iter_mut().zip(input.drain(..count)) {
            *dst = src;
        }
        Ok(count)
    }
}

impl Write for SharedConnection {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flushed.store(true, Ordering::Release);
        Ok(())
    }
}

/// A connected sender link that is not running, for inspecting fixture output.
pub fn idle_link() -> DmxLink {
    DmxLink::with_connection(
        Box::new(SharedConnection::default()),
        LinkConfig {
            port: "mock".to_string(),
            mode: Mode::Sender,
            blackout_on_shutdown: false,
            ..Default::default()
        },
    )
}
