//! Rendering consumer
//!
//! A dedicated thread parks on the render signal, snapshots the channel
//! buffer when woken, scales it to `0.0..=1.0` and hands the frame to every
//! registered [`FrameSink`]. GPU upload, texture sharing and similar stages
//! plug in as sinks.

use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{RenderConfig, UniverseLayout};
use crate::engine::SharedEngine;
use crate::error::NetworkError;

/// One consumed copy of the channel buffer
#[derive(Debug, Clone)]
pub struct Frame {
    /// Buffer generation the snapshot was taken at
    pub generation: u64,
    pub layout: UniverseLayout,
    /// Raw channel values
    pub raw: Vec<u8>,
    /// Channel values scaled to `0.0..=1.0`
    pub normalized: Vec<f32>,
}

impl Frame {
    pub fn new(layout: UniverseLayout) -> Self {
        Self {
            generation: 0,
            layout,
            raw: vec![0; layout.capacity()],
            normalized: vec![0.0; layout.capacity()],
        }
    }

    /// Refresh from the engine's channel buffer
    pub fn capture(&mut self, engine: &crate::Engine) {
        self.generation = engine.buffer().snapshot_into(&mut self.raw);
        for (dst, &value) in self.normalized.iter_mut().zip(&self.raw) {
            *dst = value as f32 / 255.0;
        }
    }
}

/// Downstream stage receiving frames
pub trait FrameSink: Send {
    fn name(&self) -> &str;

    fn present(&mut self, frame: &Frame) -> crate::Result<()>;
}

/// Logs the first channels of each frame at debug level
pub struct LogSink {
    channels: usize,
}

impl LogSink {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(16)
    }
}

impl FrameSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn present(&mut self, frame: &Frame) -> crate::Result<()> {
        let shown = self.channels.min(frame.raw.len());
        tracing::debug!(
            "Frame {}: channels {:?}",
            frame.generation,
            &frame.raw[..shown]
        );
        Ok(())
    }
}

/// Forwards frames over a bounded channel, dropping them when the other
/// side falls behind
pub struct ChannelSink {
    tx: Sender<Frame>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, Receiver<Frame>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    fn present(&mut self, frame: &Frame) -> crate::Result<()> {
        // Full or disconnected receivers just miss this frame
        let _ = self.tx.try_send(frame.clone());
        Ok(())
    }
}

/// Consumer thread handle
pub struct RenderConsumer {
    engine: SharedEngine,
    thread_handle: Option<JoinHandle<()>>,
    frames_presented: Arc<AtomicU64>,
}

impl RenderConsumer {
    /// Spawn the consumer thread
    pub fn start(
        engine: SharedEngine,
        config: &RenderConfig,
        sinks: Vec<Box<dyn FrameSink>>,
    ) -> Result<Self, NetworkError> {
        let min_interval = match config.fps_limit {
            0 => None,
            fps => Some(Duration::from_secs_f64(1.0 / fps as f64)),
        };

        let frames_presented = Arc::new(AtomicU64::new(0));
        let handle = {
            let engine = engine.clone();
            let frames_presented = frames_presented.clone();
            thread::Builder::new()
                .name("render-consumer".into())
                .spawn(move || consume_loop(engine, sinks, min_interval, frames_presented))
                .map_err(NetworkError::ThreadSpawn)?
        };

        Ok(Self {
            engine,
            thread_handle: Some(handle),
            frames_presented,
        })
    }

    /// Frames handed to sinks so far
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented.load(Ordering::Relaxed)
    }

    /// Shut the render signal down and join the thread
    pub fn stop(&mut self) {
        self.engine.shutdown();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RenderConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn consume_loop(
    engine: SharedEngine,
    mut sinks: Vec<Box<dyn FrameSink>>,
    min_interval: Option<Duration>,
    frames_presented: Arc<AtomicU64>,
) {
    let mut frame = Frame::new(engine.layout());
    let mut last_present: Option<Instant> = None;
    let mut last_generation = None;

    tracing::debug!("Render consumer started with {} sink(s)", sinks.len());

    loop {
        engine.signal().wait();
        if !engine.signal().is_running() {
            break;
        }

        if let (Some(min), Some(last)) = (min_interval, last_present) {
            let elapsed = last.elapsed();
            if elapsed < min {
                thread::sleep(min - elapsed);
            }
        }

        frame.capture(&engine);
        if last_generation == Some(frame.generation) {
            continue;
        }
        last_generation = Some(frame.generation);
        last_present = Some(Instant::now());

        for sink in sinks.iter_mut() {
            if let Err(e) = sink.present(&frame) {
                tracing::warn!("Sink {} failed: {}", sink.name(), e);
            }
        }
        frames_presented.fetch_add(1, Ordering::Relaxed);
    }

    tracing::debug!("Render consumer stopped");
}
