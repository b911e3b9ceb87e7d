//! Network subsystem: Art-Net ingestion and OSC forwarding

#[cfg(feature = "osc")]
pub mod osc;
pub mod receiver;
pub mod udp;

#[cfg(feature = "osc")]
pub use osc::OscSender;
pub use receiver::{ArtNetReceiver, DatagramSource, ReceiverEvent, StopReason};
pub use udp::{ArtNetSocket, TransportCloser};
