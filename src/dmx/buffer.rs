//! Shared DMX channel buffer
//!
//! All configured universes live in one flat, fixed-capacity array. Universe
//! `u` occupies `u * stride .. u * stride + 512`; bytes between the payload
//! and the next slot are padding and are never written. The channel count
//! may be capped below `universes * stride`, in which case the last slots
//! can overrun the end of the buffer.
//!
//! # Sharing contract
//!
//! The buffer has a single writer (the ingestion thread) and any number of
//! readers. Every channel is an [`AtomicU8`] accessed with relaxed ordering,
//! so concurrent reads and writes are defined behaviour. A reader that runs
//! while a packet is being applied may observe a mix of the old and new
//! values of that universe; the next snapshot after the following signal
//! sees the complete packet. Readers never block the writer and the writer
//! never blocks readers.
//!
//! After every apply the writer bumps [`ChannelBuffer::generation`] with
//! release ordering. A reader that loads the generation with acquire ordering
//! before snapshotting sees at least every write of that generation.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::config::{OverrunPolicy, UniverseLayout};

/// Result of applying one universe update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Payload written at `offset`; `written` may be shorter than the payload
    /// when it was truncated at the end of the buffer.
    Applied {
        offset: usize,
        written: usize,
        truncated: bool,
    },
    /// Universe is configured but the payload cannot be placed
    OutOfRange,
    /// Universe is not in the configured range
    Ignored,
}

/// Fixed-capacity channel buffer shared between ingestion and rendering
pub struct ChannelBuffer {
    cells: Box<[AtomicU8]>,
    layout: UniverseLayout,
    overrun: OverrunPolicy,
    generation: AtomicU64,
}

impl ChannelBuffer {
    /// Create a zeroed buffer for the given layout
    pub fn new(layout: UniverseLayout, overrun: OverrunPolicy) -> Self {
        let cells = (0..layout.capacity())
            .map(|_| AtomicU8::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            cells,
            layout,
            overrun,
            generation: AtomicU64::new(0),
        }
    }

    /// Copy a universe's payload into its slot.
    ///
    /// This is the only mutation path. Universes outside `0..universes` are
    /// ignored. A payload that would run past the end of the buffer is
    /// truncated or dropped according to the overrun policy; nothing is ever
    /// written at or beyond `capacity()`.
    pub fn apply(&self, universe: u16, payload: &[u8]) -> ApplyOutcome {
        if universe >= self.layout.universes {
            return ApplyOutcome::Ignored;
        }

        let offset = self.layout.offset(universe);
        let capacity = self.cells.len();
        if offset >= capacity {
            return ApplyOutcome::OutOfRange;
        }

        let room = capacity - offset;
        let truncated = payload.len() > room;
        if truncated && self.overrun == OverrunPolicy::Drop {
            return ApplyOutcome::OutOfRange;
        }

        let written = payload.len().min(room);
        for (cell, &value) in self.cells[offset..offset + written].iter().zip(payload) {
            cell.store(value, Ordering::Relaxed);
        }
        self.generation.fetch_add(1, Ordering::Release);

        ApplyOutcome::Applied {
            offset,
            written,
            truncated,
        }
    }

    /// Read a single channel
    pub fn get(&self, index: usize) -> Option<u8> {
        self.cells.get(index).map(|cell| cell.load(Ordering::Relaxed))
    }

    /// Copy the buffer into `out`, returning the generation it was read at.
    ///
    /// Copies `min(out.len(), capacity())` channels.
    pub fn snapshot_into(&self, out: &mut [u8]) -> u64 {
        let generation = self.generation.load(Ordering::Acquire);
        for (dst, cell) in out.iter_mut().zip(self.cells.iter()) {
            *dst = cell.load(Ordering::Relaxed);
        }
        generation
    }

    /// Copy the buffer into a new vector
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.cells.len()];
        self.snapshot_into(&mut out);
        out
    }

    /// Copy the buffer into `out` scaled to `0.0..=1.0`
    pub fn normalize_into(&self, out: &mut [f32]) -> u64 {
        let generation = self.generation.load(Ordering::Acquire);
        for (dst, cell) in out.iter_mut().zip(self.cells.iter()) {
            *dst = cell.load(Ordering::Relaxed) as f32 / 255.0;
        }
        generation
    }

    /// Copy one universe's 512-channel payload region
    pub fn universe(&self, universe: u16) -> Option<Vec<u8>> {
        if universe >= self.layout.universes {
            return None;
        }
        let offset = self.layout.offset(universe);
        let end = (offset + crate::constants::DMX_UNIVERSE_SIZE).min(self.cells.len());
        Some(
            self.cells[offset..end]
                .iter()
                .map(|cell| cell.load(Ordering::Relaxed))
                .collect(),
        )
    }

    /// Number of applies performed so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Total channel count
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn layout(&self) -> UniverseLayout {
        self.layout
    }

    pub fn overrun_policy(&self) -> OverrunPolicy {
        self.overrun
    }
}

impl std::fmt::Debug for ChannelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBuffer")
            .field("layout", &self.layout)
            .field("overrun", &self.overrun)
            .field("generation", &self.generation())
            .finish()
    }
}
