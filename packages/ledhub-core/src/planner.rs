//! Planner loop (§4.E): ticks PLANNED-mode devices forward through their
//! assigned plan, scaling and windowing a step sequence and publishing it
//! ahead of schedule so receivers have delivery slack.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::plans::PlanCache;
use crate::pubsub::PubSubClient;
use crate::state::DomainState;
use crate::utils::now_secs;

/// Scales an intensity value from the plan's [0,100] range to [0,255].
fn scale_intensity(v: u8) -> u8 {
    ((v as u32 * 255 + 50) / 100) as u8
}

/// The next scheduling boundary strictly after `now`, aligned to `interval`.
fn next_boundary(now_secs: u64, interval_secs: u64) -> u64 {
    let interval_secs = interval_secs.max(1);
    now_secs.div_ceil(interval_secs) * interval_secs + interval_secs
}

/// Samples `count` steps from `steps` starting at cursor `c`, wrapping modulo
/// the step count, and returns the samples plus the advanced cursor.
fn sample_window<T: Clone>(steps: &[T], cursor: u64, count: usize) -> (Vec<T>, u64) {
    if steps.is_empty() {
        return (Vec::new(), cursor);
    }
    let len = steps.len() as u64;
    let samples = (0..count as u64)
        .map(|i| steps[((cursor + i) % len) as usize].clone())
        .collect();
    (samples, (cursor + count as u64) % len)
}

/// Drives PLANNED-mode devices: one instance shared across ticks so
/// per-device cursors persist between them.
pub struct Planner {
    state: Arc<DomainState>,
    cache: Arc<PlanCache>,
    pubsub: Arc<PubSubClient>,
    cursors: Mutex<HashMap<String, u64>>,
}

impl Planner {
    pub fn new(state: Arc<DomainState>, cache: Arc<PlanCache>, pubsub: Arc<PubSubClient>) -> Self {
        Self {
            state,
            cache,
            pubsub,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the tick loop until `shutdown` fires.
    pub async fn run(&self, config: &AppConfig, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(config.planner.interval_sec.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        log::info!("[planner] started, interval={}s", config.planner.interval_sec);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("[planner] shutdown requested");
                    return;
                }
                _ = interval.tick() => {
                    self.tick(config).await;
                }
            }
        }
    }

    async fn tick(&self, config: &AppConfig) {
        let planned = self.state.get_devices_by_mode(crate::state::DeviceMode::Planned);
        if planned.is_empty() {
            return;
        }
        let next_ts_secs = next_boundary(now_secs(), config.planner.interval_sec);
        let steps_per_interval = config.planner.steps_per_interval;

        for device_id in planned {
            let Some(device) = config.device(&device_id) else {
                continue;
            };
            let window = self.window_for(&device_id, steps_per_interval);
            let scaled: Vec<Vec<u8>> = window.iter().map(|s| s.iter().copied().map(scale_intensity).collect()).collect();
            let payload = build_payload(config.planner.plan_payload_version, next_ts_secs, config.planner.interval_ms, &scaled);
            if !self.pubsub.publish_plan(device, &payload).await {
                self.state.increment_error_count(&device_id);
                log::warn!("[planner] publish failed for {device_id}");
            }
        }
    }

    /// Resolves the window of raw (0-100) step vectors for one device,
    /// advancing its cursor. Falls back to the device's effective static
    /// values, repeated, if no plan is assigned or the plan is missing.
    fn window_for(&self, device_id: &str, steps_per_interval: usize) -> Vec<Vec<u8>> {
        let plan_id = self.state.get_effective_plan(device_id).flatten();
        if let Some(plan_id) = plan_id {
            if let Some(plan) = self.cache.get(&plan_id) {
                let mut cursors = self.cursors.lock();
                let cursor = *cursors.get(device_id).unwrap_or(&0);
                let (window, next_cursor) = sample_window(&plan.steps, cursor, steps_per_interval);
                cursors.insert(device_id.to_string(), next_cursor);
                return window;
            }
        }
        let fallback = self.state.get_effective_static_values(device_id).unwrap_or_default();
        vec![fallback; steps_per_interval]
    }
}

fn build_payload(version: u8, ts_secs: u64, interval_ms: u64, scaled: &[Vec<u8>]) -> serde_json::Value {
    if version == 1 {
        json!({
            "timestamp": ts_secs,
            "interval_ms": interval_ms,
            "sequence": scaled,
        })
    } else {
        let ts_ms_base = ts_secs * 1000;
        let steps: Vec<serde_json::Value> = scaled
            .iter()
            .enumerate()
            .map(|(i, values)| {
                json!({
                    "ts_ms": ts_ms_base + i as u64 * interval_ms,
                    "values": values,
                })
            })
            .collect();
        json!({
            "format_version": 2,
            "steps": steps,
        })
    }
}

/// Builds a v2 multi-stream wire packet from a single scaled step vector,
/// keyed by the device's own hardware stream id. Unused by the planner
/// itself (which publishes JSON over pub/sub, not the UDP wire) but kept
/// available for components that need to re-encode a plan step.
#[allow(dead_code)]
fn step_as_stream(stream_id: u8, values: Vec<u8>) -> BTreeMap<u8, Vec<u8>> {
    let mut streams = BTreeMap::new();
    streams.insert(stream_id, values);
    streams
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_intensity_matches_spec_examples() {
        assert_eq!(scale_intensity(0), 0);
        assert_eq!(scale_intensity(50), 128);
        assert_eq!(scale_intensity(100), 255);
    }

    #[test]
    fn next_boundary_is_strictly_after_now() {
        assert_eq!(next_boundary(100, 10), 110);
        assert_eq!(next_boundary(100, 1), 101);
        assert_eq!(next_boundary(99, 10), 110);
        // A full interval of slack even when `now` isn't an exact multiple.
        assert_eq!(next_boundary(105, 10), 120);
        assert_eq!(next_boundary(109, 10), 120);
    }

    #[test]
    fn scenario_plan_wrap_around() {
        // §8 scenario 2.
        let steps = vec![vec![0u8, 0, 0, 0], vec![50, 0, 0, 0], vec![100, 0, 0, 0]];
        let (window, cursor) = sample_window(&steps, 0, 10);
        let scaled: Vec<u8> = window.iter().map(|s| scale_intensity(s[0])).collect();
        assert_eq!(scaled, vec![0, 128, 255, 0, 128, 255, 0, 128, 255, 0]);
        assert_eq!(cursor, 10 % 3);
    }
}
