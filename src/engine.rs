//! Shared ingestion context
//!
//! [`Engine`] is built once at startup and handed by `Arc` to the ingestion
//! thread, the consumer thread and the diagnostics API. It owns the channel
//! buffer, the timing tracker, the render signal and the statistics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::config::{AppConfig, OverrunPolicy, UniverseLayout};
use crate::dmx::{ApplyOutcome, ChannelBuffer, RenderSignal, UniverseTimingTracker};
use crate::error::ConfigError;
use crate::protocol::{self, Rejected};

/// Ingestion loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum IngestState {
    Starting = 0,
    Listening = 1,
    Processing = 2,
    Stopping = 3,
    Stopped = 4,
}

impl IngestState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Listening,
            2 => Self::Processing,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// What happened to one datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    /// Channel data written and the consumer signalled
    Applied {
        universe: u16,
        written: usize,
        truncated: bool,
        first_packet: bool,
    },
    /// Not an Art-Net data packet
    Rejected(Rejected),
    /// Universe outside the configured range
    Ignored(u16),
    /// Payload could not be placed under the overrun policy
    Dropped(u16),
}

/// Ingestion counters
#[derive(Debug, Default)]
pub struct IngestStats {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    packets_applied: AtomicU64,
    packets_rejected: AtomicU64,
    packets_ignored: AtomicU64,
    writes_truncated: AtomicU64,
    writes_dropped: AtomicU64,
    receive_errors: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub packets_applied: u64,
    pub packets_rejected: u64,
    pub packets_ignored: u64,
    pub writes_truncated: u64,
    pub writes_dropped: u64,
    pub receive_errors: u64,
}

impl IngestStats {
    pub fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_applied: self.packets_applied.load(Ordering::Relaxed),
            packets_rejected: self.packets_rejected.load(Ordering::Relaxed),
            packets_ignored: self.packets_ignored.load(Ordering::Relaxed),
            writes_truncated: self.writes_truncated.load(Ordering::Relaxed),
            writes_dropped: self.writes_dropped.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
        }
    }
}

/// Shared state of the ingestion pipeline
pub struct Engine {
    buffer: ChannelBuffer,
    timing: UniverseTimingTracker,
    signal: RenderSignal,
    stats: IngestStats,
    state: AtomicU8,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl Engine {
    pub fn new(layout: UniverseLayout, overrun: OverrunPolicy) -> Self {
        Self {
            buffer: ChannelBuffer::new(layout, overrun),
            timing: UniverseTimingTracker::new(layout.universes),
            signal: RenderSignal::new(),
            stats: IngestStats::default(),
            state: AtomicU8::new(IngestState::Starting as u8),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let layout = config.layout.resolve()?;
        Ok(Self::new(layout, config.layout.overrun))
    }

    /// Run one datagram through parse, apply, timing and signal.
    ///
    /// Rejected and ignored datagrams leave every piece of shared state but
    /// the counters untouched.
    pub fn process_datagram(&self, datagram: &[u8]) -> PacketOutcome {
        self.stats.packets_received.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_received
            .fetch_add(datagram.len() as u64, Ordering::Relaxed);

        let update = match protocol::parse(datagram) {
            Ok(update) => update,
            Err(rejected) => {
                self.stats.packets_rejected.fetch_add(1, Ordering::Relaxed);
                return PacketOutcome::Rejected(rejected);
            }
        };

        match self.buffer.apply(update.universe, update.payload) {
            ApplyOutcome::Ignored => {
                self.stats.packets_ignored.fetch_add(1, Ordering::Relaxed);
                PacketOutcome::Ignored(update.universe)
            }
            ApplyOutcome::OutOfRange => {
                self.stats.writes_dropped.fetch_add(1, Ordering::Relaxed);
                PacketOutcome::Dropped(update.universe)
            }
            ApplyOutcome::Applied {
                written, truncated, ..
            } => {
                if truncated {
                    self.stats.writes_truncated.fetch_add(1, Ordering::Relaxed);
                }
                let first_packet = !self.timing.is_active(update.universe);
                self.timing.record_arrival(update.universe);
                self.signal.signal();
                self.stats.packets_applied.fetch_add(1, Ordering::Relaxed);

                PacketOutcome::Applied {
                    universe: update.universe,
                    written,
                    truncated,
                    first_packet,
                }
            }
        }
    }

    pub fn buffer(&self) -> &ChannelBuffer {
        &self.buffer
    }

    pub fn timing(&self) -> &UniverseTimingTracker {
        &self.timing
    }

    pub fn signal(&self) -> &RenderSignal {
        &self.signal
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn layout(&self) -> UniverseLayout {
        self.buffer.layout()
    }

    pub fn ingest_state(&self) -> IngestState {
        IngestState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_ingest_state(&self, state: IngestState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.started_at
    }

    /// Stop the consumer side: wakes anything parked on the render signal
    pub fn shutdown(&self) {
        self.signal.shutdown();
    }
}

/// Thread-safe handle to the engine
pub type SharedEngine = Arc<Engine>;
