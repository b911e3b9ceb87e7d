//! DMX state shared between the ingestion and rendering threads

pub mod buffer;
pub mod signal;
pub mod timing;

pub use buffer::{ApplyOutcome, ChannelBuffer};
pub use signal::RenderSignal;
pub use timing::{UniverseTiming, UniverseTimingTracker};
