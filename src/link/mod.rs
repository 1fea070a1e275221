//! Drive a USB DMX interface from a dedicated worker thread.
//!
//! The link owns two universes: outbound values written by fixtures and
//! streamed to the interface, and inbound values decoded from the interface
//! when running as a receiver. Both are guarded by one mutex each; the
//! sender holds the outbound lock across the serial write so a transmitted
//! frame is never a mixture of two updates.
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::dmx::{DmxBuffer, UNIVERSE_SIZE};

pub mod frame;
#[cfg(test)]
pub(crate) mod mock;
pub mod port;

use frame::{FrameParser, encode_frame};
pub use port::{Connection, LinkError, PortDescription, list_ports};

/// Idle time between receive scans when the interface has nothing for us.
pub const RECEIVE_BACKOFF: Duration = Duration::from_millis(16);

/// Shortest time allowed for a blackout to reach the interface at shutdown.
const BLACKOUT_MIN_WAIT: Duration = Duration::from_millis(250);

/// Serial timeout used while sending; a write that takes longer is dropped.
const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Direction of DMX traffic over a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Mode {
    #[default]
    Sender,
    Receiver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// Substring used to select the serial device.
    pub port: String,
    #[serde(default)]
    pub mode: Mode,
    /// Frames per second sent to the interface.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    /// If true, send a blackout before the link is dropped.
    #[serde(default = "_true")]
    pub blackout_on_shutdown: bool,
}

fn default_frame_rate() -> f64 {
    40.
}

const fn _true() -> bool {
    true
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            mode: Mode::default(),
            frame_rate: default_frame_rate(),
            blackout_on_shutdown: true,
        }
    }
}

impl LinkConfig {
    /// Interval between transmitted frames.
    pub fn frame_period(&self) -> Duration {
        if self.frame_rate.is_finite() && self.frame_rate > 0. {
            Duration::from_secs_f64(1. / self.frame_rate)
        } else {
            Duration::from_secs_f64(1. / default_frame_rate())
        }
    }
}

/// State shared between callers and the worker thread.
struct Shared {
    outbound: Mutex<DmxBuffer>,
    inbound: Mutex<DmxBuffer>,
    running: AtomicBool,
    connected: AtomicBool,
    /// Count of frames written, incremented under the outbound lock.
    frames_sent: AtomicU64,
}

/// Ownership of the connection moves into the worker while it runs and is
/// handed back when it exits.
enum Io {
    Disconnected,
    Idle(Box<dyn Connection>),
    Running(JoinHandle<Box<dyn Connection>>),
}

pub struct DmxLink {
    config: LinkConfig,
    shared: Arc<Shared>,
    io: Mutex<Io>,
}

impl DmxLink {
    /// Create a link with no connection; every operation is a no-op.
    pub fn disconnected(config: LinkConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                outbound: Mutex::new([0; UNIVERSE_SIZE]),
                inbound: Mutex::new([0; UNIVERSE_SIZE]),
                running: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                frames_sent: AtomicU64::new(0),
            }),
            io: Mutex::new(Io::Disconnected),
        }
    }

    /// Create a link over an already-open connection.
    pub fn with_connection(connection: Box<dyn Connection>, config: LinkConfig) -> Self {
        let link = Self::disconnected(config);
        link.attach(connection);
        link
    }

    /// Search for a serial device matching the configured port and open it.
    ///
    /// On failure the link stays disconnected; the error is logged, never
    /// returned.
    pub fn connect(config: LinkConfig) -> Self {
        let link = Self::disconnected(config);
        link.reconnect();
        link
    }

    /// Attempt to (re)open the configured serial device.
    ///
    /// Any running worker is shut down first. Return true on success.
    pub fn reconnect(&self) -> bool {
        self.shutdown(false);
        let timeout = match self.config.mode {
            Mode::Sender => SEND_TIMEOUT,
            Mode::Receiver => RECEIVE_BACKOFF,
        };
        match port::open_matching(&self.config.port, timeout) {
            Ok((port, connection)) => {
                info!("Connected to DMX interface {port}.");
                self.attach(connection);
                true
            }
            Err(err) => {
                error!("Unable to connect to DMX interface: {err}.");
                false
            }
        }
    }

    fn attach(&self, connection: Box<dyn Connection>) {
        let Ok(mut io) = self.io.lock() else {
            error!("DMX link state lock poisoned.");
            return;
        };
        *io = Io::Idle(connection);
        self.shared.connected.store(true, Ordering::Release);
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Set an outbound channel, indexed from 1.
    ///
    /// The value is clamped into 0..=255. Out-of-range channels are ignored.
    pub fn set_value(&self, channel: usize, value: i32) {
        if !self.is_connected() {
            return;
        }
        if !(1..=UNIVERSE_SIZE).contains(&channel) {
            warn!("Ignoring write to out-of-range DMX channel {channel}.");
            return;
        }
        let Ok(mut outbound) = self.shared.outbound.lock() else {
            error!("Outbound DMX buffer lock poisoned.");
            return;
        };
        outbound[channel - 1] = value.clamp(0, 255) as u8;
    }

    /// Get an inbound channel, indexed from 1.
    ///
    /// Return 0 for out-of-range channels or a disconnected link.
    pub fn get_value(&self, channel: usize) -> u8 {
        read_channel(&self.shared.inbound, channel, self.is_connected())
    }

    /// Get the value currently queued for output on a channel, indexed from 1.
    pub fn output_value(&self, channel: usize) -> u8 {
        read_channel(&self.shared.outbound, channel, self.is_connected())
    }

    /// Start the worker thread for the configured mode.
    ///
    /// Does nothing if disconnected or already running.
    pub fn start(&self) {
        let Ok(mut io) = self.io.lock() else {
            error!("DMX link state lock poisoned.");
            return;
        };
        let connection = match std::mem::replace(&mut *io, Io::Disconnected) {
            Io::Idle(connection) => connection,
            other => {
                *io = other;
                return;
            }
        };
        self.shared.running.store(true, Ordering::Release);
        let shared = self.shared.clone();
        let mode = self.config.mode;
        let frame_period = self.config.frame_period();
        let spawned = thread::Builder::new()
            .name(format!("dmx-{}", mode.to_string().to_lowercase()))
            .spawn(move || match mode {
                Mode::Sender => run_sender(connection, &shared, frame_period),
                Mode::Receiver => run_receiver(connection, &shared),
            });
        match spawned {
            Ok(handle) => {
                info!("Started DMX {mode} worker.");
                *io = Io::Running(handle);
            }
            Err(err) => {
                error!("Unable to start DMX {mode} worker: {err}.");
                self.shared.running.store(false, Ordering::Release);
                self.shared.connected.store(false, Ordering::Release);
            }
        }
    }

    /// Stop the worker, flush, and release the connection.
    ///
    /// If send_zeros_first is true, the outbound universe is zeroed and the
    /// worker gets two frame periods to transmit the blackout before it stops.
    /// Safe to call repeatedly.
    pub fn shutdown(&self, send_zeros_first: bool) {
        let Ok(mut io) = self.io.lock() else {
            error!("DMX link state lock poisoned.");
            return;
        };
        let mut connection = match std::mem::replace(&mut *io, Io::Disconnected) {
            Io::Disconnected => return,
            Io::Idle(connection) => connection,
            Io::Running(handle) => {
                if send_zeros_first {
                    self.send_blackout();
                }
                self.shared.running.store(false, Ordering::Release);
                match handle.join() {
                    Ok(connection) => connection,
                    Err(_) => {
                        error!("DMX worker panicked.");
                        self.shared.connected.store(false, Ordering::Release);
                        return;
                    }
                }
            }
        };
        self.shared.running.store(false, Ordering::Release);
        if let Err(err) = connection.flush() {
            warn!("Error flushing DMX connection: {err}.");
        }
        self.shared.connected.store(false, Ordering::Release);
        info!("DMX link shut down.");
    }

    /// Zero the outbound universe and wait for the sender to transmit it.
    ///
    /// Waits for two frames, giving up after ten frame periods or
    /// BLACKOUT_MIN_WAIT, whichever is longer.
    fn send_blackout(&self) {
        let frames_before = {
            let Ok(mut outbound) = self.shared.outbound.lock() else {
                error!("Outbound DMX buffer lock poisoned.");
                return;
            };
            outbound.fill(0);
            self.shared.frames_sent.load(Ordering::Acquire)
        };
        let period = self.config.frame_period();
        let deadline = Instant::now() + (period * 10).max(BLACKOUT_MIN_WAIT);
        while self.shared.frames_sent.load(Ordering::Acquire) < frames_before + 2
            && Instant::now() < deadline
        {
            thread::sleep(period / 4);
        }
    }
}

impl Drop for DmxLink {
    fn drop(&mut self) {
        self.shutdown(self.config.blackout_on_shutdown);
    }
}

fn read_channel(buffer: &Mutex<DmxBuffer>, channel: usize, connected: bool) -> u8 {
    if !connected || !(1..=UNIVERSE_SIZE).contains(&channel) {
        return 0;
    }
    let Ok(buffer) = buffer.lock() else {
        error!("DMX buffer lock poisoned.");
        return 0;
    };
    buffer[channel - 1]
}

/// Stream the outbound universe until the running flag clears.
fn run_sender(
    mut connection: Box<dyn Connection>,
    shared: &Shared,
    frame_period: Duration,
) -> Box<dyn Connection> {
    let mut failing = false;
    while shared.running.load(Ordering::Acquire) {
        {
            let Ok(outbound) = shared.outbound.lock() else {
                error!("Outbound DMX buffer lock poisoned, stopping sender.");
                break;
            };
            let frame = encode_frame(&outbound);
            match connection.write_all(&frame) {
                Ok(()) if failing => {
                    info!("DMX output recovered.");
                    failing = false;
                }
                Ok(()) => (),
                Err(err) if !failing => {
                    error!("DMX write error: {err}.");
                    failing = true;
                }
                Err(_) => (),
            }
            shared.frames_sent.fetch_add(1, Ordering::AcqRel);
        }
        thread::sleep(frame_period);
    }
    info!("DMX sender stopped.");
    connection
}

/// Decode incoming packets into the inbound universe until the running flag clears.
fn run_receiver(mut connection: Box<dyn Connection>, shared: &Shared) -> Box<dyn Connection> {
    let mut parser = FrameParser::default();
    let mut buf = [0u8; 1024];
    while shared.running.load(Ordering::Acquire) {
        let count = match connection.read(&mut buf) {
            Ok(count) => count,
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => 0,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                debug!("DMX read error: {err}.");
                0
            }
        };
        if count == 0 {
            thread::sleep(RECEIVE_BACKOFF);
            continue;
        }
        for byte in &buf[..count] {
            let Some(channels) = parser.push(*byte) else {
                continue;
            };
            let Ok(mut inbound) = shared.inbound.lock() else {
                error!("Inbound DMX buffer lock poisoned, stopping receiver.");
                return connection;
            };
            let len = channels.len().min(UNIVERSE_SIZE);
            inbound[..len].copy_from_slice(&channels[..len]);
        }
    }
    info!("DMX receiver stopped.");
    connection
}
