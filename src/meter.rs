//! Meter tap registry (C8): string-keyed, real-time-safe audio taps.
//!
//! A tap's hot-path update (`MeterTap::publish`) runs from the engine's
//! render callback and must never allocate or lock; it only stores into
//! pre-allocated atomics, matching the "single-writer/many-reader" taboo
//! in spec.md §5/§9.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::engine::NodeId;
use crate::error::MixError;

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A single installed tap. All fields touched by `publish` are atomics so
/// the render thread can update them without locking.
pub struct MeterTap {
    key: String,
    node: NodeId,
    bus_index: u32,
    active: AtomicBool,
    sample_rate: u32,
    channel_count: u16,
    rms_bits: AtomicU32,
    frame_count: AtomicU64,
    last_update_millis: AtomicU64,
}

impl MeterTap {
    fn new(key: String, node: NodeId, bus_index: u32, sample_rate: u32, channel_count: u16) -> Self {
        Self {
            key,
            node,
            bus_index,
            active: AtomicBool::new(true),
            sample_rate,
            channel_count,
            rms_bits: AtomicU32::new(0),
            frame_count: AtomicU64::new(0),
            last_update_millis: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn bus_index(&self) -> u32 {
        self.bus_index
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn rms(&self) -> f32 {
        f32::from_bits(self.rms_bits.load(Ordering::Relaxed))
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Called from the render callback: no allocation, no locking.
    pub fn publish(&self, rms: f32, frames_processed: u64, now_millis: u64) {
        self.rms_bits.store(rms.to_bits(), Ordering::Relaxed);
        self.frame_count.fetch_add(frames_processed, Ordering::Relaxed);
        self.last_update_millis.store(now_millis, Ordering::Relaxed);
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct MeterRegistry {
    taps: RwLock<HashMap<String, Arc<MeterTap>>>,
}

impl MeterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(
        &self,
        key: &str,
        node: NodeId,
        bus_index: u32,
        sample_rate: u32,
        channel_count: u16,
    ) -> Result<Arc<MeterTap>, MixError> {
        if !valid_key(key) {
            return Err(MixError::InvalidName(key.to_string()));
        }
        let mut taps = self.taps.write().unwrap();
        if taps.contains_key(key) {
            return Err(MixError::Conflict(format!("tap key {key} already installed")));
        }
        let tap = Arc::new(MeterTap::new(key.to_string(), node, bus_index, sample_rate, channel_count));
        taps.insert(key.to_string(), tap.clone());
        Ok(tap)
    }

    pub fn get(&self, key: &str) -> Option<Arc<MeterTap>> {
        self.taps.read().unwrap().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Arc<MeterTap>> {
        self.taps.write().unwrap().remove(key)
    }

    pub fn remove_all(&self) {
        self.taps.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.taps.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Poll `tap` at ~10ms intervals until it reports `rms >= min_rms` with
/// at least one processed frame, or `timeout` elapses.
pub fn wait_for_activity(tap: &MeterTap, timeout: Duration, min_rms: f32) -> Result<(), MixError> {
    let deadline = Instant::now() + timeout;
    loop {
        if tap.rms() >= min_rms && tap.frame_count() > 0 {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(MixError::NotFound("timeout waiting for tap activity".into()));
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Poll every tap in `taps` and return the key of the first one to
/// report activity, or an error if `timeout` elapses first.
pub fn wait_for_signal(taps: &[Arc<MeterTap>], timeout: Duration, min_rms: f32) -> Result<String, MixError> {
    let deadline = Instant::now() + timeout;
    loop {
        for tap in taps {
            if tap.rms() >= min_rms && tap.frame_count() > 0 {
                return Ok(tap.key().to_string());
            }
        }
        if Instant::now() >= deadline {
            return Err(MixError::NotFound("timeout waiting for signal".into()));
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_rejects_invalid_key_and_collision() {
        let registry = MeterRegistry::new();
        let node = NodeId::from_raw(1);
        assert!(matches!(
            registry.install("bad key!", node, 0, 48_000, 2),
            Err(MixError::InvalidName(_))
        ));
        registry.install("ok_key-1", node, 0, 48_000, 2).unwrap();
        assert!(matches!(
            registry.install("ok_key-1", node, 0, 48_000, 2),
            Err(MixError::Conflict(_))
        ));
    }

    #[test]
    fn publish_then_wait_for_activity_observes_update() {
        let registry = MeterRegistry::new();
        let tap = registry
            .install("main", NodeId::from_raw(1), 0, 48_000, 2)
            .unwrap();
        tap.publish(0.5, 512, 0);
        wait_for_activity(&tap, Duration::from_millis(100), 0.1).unwrap();
    }

    #[test]
    fn wait_for_activity_times_out_when_silent() {
        let registry = MeterRegistry::new();
        let tap = registry
            .install("silent", NodeId::from_raw(1), 0, 48_000, 2)
            .unwrap();
        assert!(wait_for_activity(&tap, Duration::from_millis(30), 0.1).is_err());
    }

    #[test]
    fn remove_all_clears_registry() {
        let registry = MeterRegistry::new();
        registry.install("a", NodeId::from_raw(1), 0, 48_000, 2).unwrap();
        registry.install("b", NodeId::from_raw(2), 0, 48_000, 2).unwrap();
        assert_eq!(registry.len(), 2);
        registry.remove_all();
        assert!(registry.is_empty());
    }
}
