//! Push broadcaster (§4.H): emits gated `state` broadcasts and a periodic
//! liveness tick that catches timeout-driven online→offline transitions.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::events::{BroadcastEvent, EventEmitter};
use crate::protocol_constants::LIVENESS_TICK_SECS;
use crate::state::DomainState;

/// Emits a `state` broadcast iff the snapshot hash changed since the last
/// one emitted. Called after every operator mutation and by the liveness
/// tick.
pub fn broadcast_if_changed(state: &DomainState, emitter: &dyn EventEmitter) {
    if !state.has_state_changed() {
        return;
    }
    emitter.emit(BroadcastEvent::State {
        devices: state.get_all_device_status(),
    });
    state.mark_broadcast_complete();
}

/// Emits a `rooms_control` broadcast unconditionally. Called after every
/// room-level operator command; unlike `state` this isn't hash-gated since
/// room commands are already discrete operator actions.
pub fn broadcast_rooms_control(state: &DomainState, emitter: &dyn EventEmitter) {
    emitter.emit(BroadcastEvent::RoomsControl {
        rooms: state.get_all_room_control_status(),
    });
}

/// Runs the periodic liveness tick until `shutdown` fires.
pub async fn run_liveness_ticker(
    state: Arc<DomainState>,
    emitter: Arc<dyn EventEmitter>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(LIVENESS_TICK_SECS));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    log::info!("[broadcaster] liveness ticker started, every {LIVENESS_TICK_SECS}s");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("[broadcaster] shutdown requested");
                return;
            }
            _ = interval.tick() => {
                broadcast_if_changed(&state, emitter.as_ref());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DeviceConfig, DeviceTopics, RoomConfig};
    use crate::hwmode::HardwareMode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmitter(AtomicUsize);
    impl EventEmitter for CountingEmitter {
        fn emit(&self, _event: BroadcastEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            mqtt: Default::default(),
            udp: Default::default(),
            planner: Default::default(),
            udp_repeater: Default::default(),
            rooms: vec![RoomConfig {
                name: "R".to_string(),
                devices: vec![DeviceConfig {
                    device_id: "X".to_string(),
                    room: "R".to_string(),
                    ip: "10.0.0.1".to_string(),
                    udp_port: 5000,
                    hw_mode: HardwareMode::Ch4V1,
                    channels: 4,
                    channel_labels: vec!["G".into(), "Y".into(), "B".into(), "R".into()],
                    topics: DeviceTopics::default(),
                    firmware_version: "unknown".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn scenario_no_mutation_means_no_broadcast() {
        // §8 scenario 6.
        let state = DomainState::from_config(&test_config(), 10);
        state.mark_broadcast_complete();
        let emitter = CountingEmitter(AtomicUsize::new(0));
        broadcast_if_changed(&state, &emitter);
        assert_eq!(emitter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn mutation_triggers_exactly_one_broadcast() {
        let state = DomainState::from_config(&test_config(), 10);
        state.mark_broadcast_complete();
        state.set_static_values("X", &[1, 1, 1, 1]);
        let emitter = CountingEmitter(AtomicUsize::new(0));
        broadcast_if_changed(&state, &emitter);
        broadcast_if_changed(&state, &emitter);
        assert_eq!(emitter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rooms_control_broadcast_is_unconditional() {
        let state = DomainState::from_config(&test_config(), 10);
        let emitter = CountingEmitter(AtomicUsize::new(0));
        broadcast_rooms_control(&state, &emitter);
        broadcast_rooms_control(&state, &emitter);
        assert_eq!(emitter.0.load(Ordering::SeqCst), 2);
    }
}
