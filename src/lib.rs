//! # DMX Rasterizer
//!
//! Low-latency Art-Net ingestion with a lock-free channel buffer handoff to a
//! rendering consumer.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                         INGESTION THREAD                                  │
//! │                                                                          │
//! │   UDP :6454 ──► Transport ──► Parser ──► ChannelBuffer.apply             │
//! │               (network::udp) (protocol)  (dmx::buffer)                   │
//! │                                               │                          │
//! │                                               ▼                          │
//! │                                   UniverseTimingTracker                  │
//! │                                       (dmx::timing)                      │
//! │                                               │                          │
//! │                                               ▼                          │
//! │                                     RenderSignal.signal()                │
//! └───────────────────────────────────────────────┼──────────────────────────┘
//!                                                 │ coalesced wake-up
//!                                                 ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                         CONSUMER THREAD                                   │
//! │                                                                          │
//! │   RenderSignal.wait() ──► snapshot + normalise ──► FrameSink             │
//! │                              (render)              (GPU / OSC / ...)     │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`engine::Engine`] owns the shared state and is passed by `Arc` to both
//! threads; there are no process-wide globals.

pub mod config;
pub mod dmx;
pub mod engine;
pub mod error;
pub mod network;
pub mod protocol;
pub mod render;
#[cfg(feature = "ui")]
pub mod ui;

pub use engine::Engine;
pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default Art-Net UDP port
    pub const DEFAULT_ARTNET_PORT: u16 = 6454;

    /// DMX channels carried by one universe
    pub const DMX_UNIVERSE_SIZE: usize = 512;

    /// Buffer bytes reserved per universe (512 channels + 8 skipped)
    pub const DEFAULT_UNIVERSE_STRIDE: usize = DMX_UNIVERSE_SIZE + 8;

    /// Universes in the standard layout
    pub const DEFAULT_UNIVERSES: u16 = 3;

    /// Channel multiplier of the wide layout
    pub const WIDE_MODE_FACTOR: u16 = 3;

    /// Total channels in the standard layout
    pub const TOTAL_DMX_CHANNELS: usize = DEFAULT_UNIVERSE_STRIDE * DEFAULT_UNIVERSES as usize;

    /// Upper bound on configurable universes (size of the timing slot table)
    pub const MAX_UNIVERSES: usize = 64;

    /// Receive buffer for one datagram
    pub const MAX_PACKET_SIZE: usize = 1024;

    /// Default OSC forwarding target
    pub const DEFAULT_OSC_TARGET: &str = "127.0.0.1:12000";

    /// OSC address prefix, followed by the channel index
    pub const DEFAULT_OSC_PREFIX: &str = "/VRSL/ch";

    /// Default consumer frame rate cap
    pub const DEFAULT_FPS_LIMIT: u32 = 30;

    /// Default HTTP port for the diagnostics API
    pub const DEFAULT_HTTP_PORT: u16 = 8080;
}
