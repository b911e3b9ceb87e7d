//! Per-universe packet timing
//!
//! One slot per configured universe, indexed by universe id. Slots are
//! independent atomics so diagnostics can read them while the ingestion
//! thread keeps recording.

use crossbeam::utils::CachePadded;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
struct UniverseSlot {
    active: AtomicBool,
    /// Nanoseconds since the tracker epoch
    last_seen_ns: AtomicU64,
    /// Nanoseconds between the last two arrivals
    delta_ns: AtomicU64,
    packets: AtomicU64,
}

/// Diagnostics view of one universe
#[derive(Debug, Clone, Serialize)]
pub struct UniverseTiming {
    pub universe: u16,
    pub active: bool,
    pub packets: u64,
    /// Inter-arrival time of the last two packets
    pub delta_ms: f64,
    /// Time since the last packet, `None` before the first one
    pub since_last_ms: Option<f64>,
}

/// Records arrival times for each universe
pub struct UniverseTimingTracker {
    slots: Box<[CachePadded<UniverseSlot>]>,
    epoch: Instant,
}

impl UniverseTimingTracker {
    /// Create a tracker with one slot per universe id in `0..universes`
    pub fn new(universes: u16) -> Self {
        let slots = (0..universes)
            .map(|_| CachePadded::new(UniverseSlot::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            epoch: Instant::now(),
        }
    }

    /// Record a packet for `universe` now
    pub fn record_arrival(&self, universe: u16) -> Option<Duration> {
        self.record_arrival_at(universe, Instant::now())
    }

    /// Record a packet for `universe` at `now`, returning the delta since the
    /// previous packet of the same universe. The first packet yields zero.
    /// Universes without a slot are ignored.
    pub fn record_arrival_at(&self, universe: u16, now: Instant) -> Option<Duration> {
        let slot = self.slots.get(universe as usize)?;
        let now_ns = now.saturating_duration_since(self.epoch).as_nanos() as u64;

        // Single writer: `active` is published last so a reader that sees it
        // also sees the first timestamp
        let was_active = slot.active.load(Ordering::Relaxed);
        let delta_ns = if was_active {
            now_ns.saturating_sub(slot.last_seen_ns.load(Ordering::Relaxed))
        } else {
            0
        };

        slot.last_seen_ns.store(now_ns, Ordering::Relaxed);
        slot.delta_ns.store(delta_ns, Ordering::Relaxed);
        slot.packets.fetch_add(1, Ordering::Relaxed);
        if !was_active {
            slot.active.store(true, Ordering::Release);
        }

        Some(Duration::from_nanos(delta_ns))
    }

    /// Whether a universe has produced at least one packet
    pub fn is_active(&self, universe: u16) -> bool {
        self.slots
            .get(universe as usize)
            .map(|slot| slot.active.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Last recorded inter-arrival delta
    pub fn last_delta(&self, universe: u16) -> Option<Duration> {
        let slot = self.slots.get(universe as usize)?;
        if !slot.active.load(Ordering::Acquire) {
            return None;
        }
        Some(Duration::from_nanos(slot.delta_ns.load(Ordering::Relaxed)))
    }

    /// `(universe, delta in ms)` for every universe seen so far
    pub fn snapshot_deltas_ms(&self) -> Vec<(u16, f64)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.active.load(Ordering::Acquire))
            .map(|(id, slot)| (id as u16, ns_to_ms(slot.delta_ns.load(Ordering::Relaxed))))
            .collect()
    }

    /// Full diagnostics view of every configured universe
    pub fn snapshot(&self) -> Vec<UniverseTiming> {
        let now_ns = self.epoch.elapsed().as_nanos() as u64;

        self.slots
            .iter()
            .enumerate()
            .map(|(id, slot)| {
                let active = slot.active.load(Ordering::Acquire);
                UniverseTiming {
                    universe: id as u16,
                    active,
                    packets: slot.packets.load(Ordering::Relaxed),
                    delta_ms: ns_to_ms(slot.delta_ns.load(Ordering::Relaxed)),
                    since_last_ms: active.then(|| {
                        ns_to_ms(now_ns.saturating_sub(slot.last_seen_ns.load(Ordering::Relaxed)))
                    }),
                }
            })
            .collect()
    }

    /// Active universes whose last packet is older than `threshold` at `now`
    pub fn stale_universes(&self, threshold: Duration, now: Instant) -> Vec<u16> {
        let now_ns = now.saturating_duration_since(self.epoch).as_nanos() as u64;
        let threshold_ns = threshold.as_nanos() as u64;

        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.active.load(Ordering::Acquire))
            .filter(|(_, slot)| {
                now_ns.saturating_sub(slot.last_seen_ns.load(Ordering::Relaxed)) > threshold_ns
            })
            .map(|(id, _)| id as u16)
            .collect()
    }

    /// Number of universe slots
    pub fn universes(&self) -> u16 {
        self.slots.len() as u16
    }
}

fn ns_to_ms(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}
