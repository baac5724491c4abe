//! Domain state: devices, rooms, effective-value resolution, liveness, and
//! change-detected versioning.
//!
//! A single [`DomainState`] is the authoritative store for the whole process.
//! It is guarded by one `parking_lot::Mutex`; all mutating and multi-field
//! reading operations take the lock once and call private helpers that
//! assume it is already held, rather than relying on a literally reentrant
//! lock (see SPEC_FULL.md §9).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{AppConfig, DeviceConfig};
use crate::hwmode::HardwareMode;

/// Per-device operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    Static,
    Planned,
    Fast,
}

/// Source of realtime values while a device is in [`DeviceMode::Fast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FastModeType {
    /// Pushed by the hub's own fast streamer (§4.F).
    Internal,
    /// Relayed by the UDP repeater (§4.G).
    UdpRepeater,
}

/// Whether a room's settings override its devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomControlMode {
    Auto,
    Manual,
}

/// Mutable per-device runtime fields.
#[derive(Debug, Clone)]
struct DeviceRuntime {
    channels: usize,
    mode: DeviceMode,
    static_values: Vec<u8>,
    fast_values: Vec<u8>,
    planned_plan_id: Option<String>,
    fast_mode_type: FastModeType,
    last_heartbeat_ms: u64,
    error_count: u64,
    reconnect_count: u64,
}

impl DeviceRuntime {
    fn new(channels: usize) -> Self {
        Self {
            channels,
            mode: DeviceMode::Static,
            static_values: vec![0; channels],
            fast_values: vec![0; channels],
            planned_plan_id: None,
            fast_mode_type: FastModeType::Internal,
            last_heartbeat_ms: 0,
            error_count: 0,
            reconnect_count: 0,
        }
    }
}

/// Mutable per-room runtime fields.
#[derive(Debug, Clone)]
struct RoomRuntime {
    control_mode: RoomControlMode,
    mode: DeviceMode,
    static_values: Vec<u8>,
    planned_plan_id: Option<String>,
    fast_mode_type: FastModeType,
    device_ids: Vec<String>,
}

/// Point-in-time, operator-facing view of one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub room: String,
    pub hw_mode: &'static str,
    pub channels: usize,
    /// Effective mode (room's, if the room is in AUTO).
    pub mode: DeviceMode,
    /// Effective static values (room-projected, if the room is in AUTO).
    pub static_values: Vec<u8>,
    pub fast_values: Vec<u8>,
    /// Effective plan assignment.
    pub planned_plan_id: Option<String>,
    /// Effective fast mode type.
    pub fast_mode_type: FastModeType,
    pub online: bool,
    pub last_heartbeat_ts: u64,
    pub error_count: u64,
    pub reconnect_count: u64,
}

/// Point-in-time, operator-facing view of one room's control state.
#[derive(Debug, Clone, Serialize)]
pub struct RoomControlStatus {
    pub name: String,
    pub control_mode: RoomControlMode,
    pub mode: DeviceMode,
    pub static_values: Vec<u8>,
    pub planned_plan_id: Option<String>,
    pub fast_mode_type: FastModeType,
}

struct Inner {
    devices: HashMap<String, DeviceRuntime>,
    device_config: HashMap<String, DeviceConfig>,
    rooms: HashMap<String, RoomRuntime>,
    version: u64,
    last_broadcast_hash: Option<u64>,
}

/// The authoritative, process-lifetime domain store.
pub struct DomainState {
    inner: Mutex<Inner>,
    heartbeat_timeout_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Truncates or right-zero-pads `values` to exactly `len` entries.
fn resize_to(values: &[u8], len: usize) -> Vec<u8> {
    let mut out = values.to_vec();
    out.resize(len, 0);
    out
}

impl DomainState {
    /// Builds initial state from config. Runtime fields start at their
    /// config-derived defaults (§3 Lifecycles); nothing is persisted here.
    pub fn from_config(config: &AppConfig, heartbeat_timeout_secs: u64) -> Self {
        let mut devices = HashMap::new();
        let mut device_config = HashMap::new();
        let mut rooms = HashMap::new();

        for room in &config.rooms {
            let max_channels = room.devices.iter().map(|d| d.channels).max().unwrap_or(0);
            let mut device_ids = Vec::with_capacity(room.devices.len());
            for device in &room.devices {
                devices.insert(device.device_id.clone(), DeviceRuntime::new(device.channels));
                device_config.insert(device.device_id.clone(), device.clone());
                device_ids.push(device.device_id.clone());
            }
            rooms.insert(
                room.name.clone(),
                RoomRuntime {
                    control_mode: RoomControlMode::Manual,
                    mode: DeviceMode::Static,
                    static_values: vec![0; max_channels],
                    planned_plan_id: None,
                    fast_mode_type: FastModeType::Internal,
                    device_ids,
                },
            );
        }

        Self {
            inner: Mutex::new(Inner {
                devices,
                device_config,
                rooms,
                version: 0,
                last_broadcast_hash: None,
            }),
            heartbeat_timeout_ms: heartbeat_timeout_secs * 1000,
        }
    }

    /// Current state version. Strictly increasing across observable mutations.
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    // ── Device mutations ──────────────────────────────────────────────

    pub fn set_mode(&self, device_id: &str, mode: DeviceMode) -> bool {
        let mut inner = self.inner.lock();
        let Some(device) = inner.devices.get_mut(device_id) else {
            return false;
        };
        device.mode = mode;
        inner.version += 1;
        true
    }

    pub fn set_static_values(&self, device_id: &str, values: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        let Some(device) = inner.devices.get_mut(device_id) else {
            return false;
        };
        device.static_values = resize_to(values, device.channels);
        inner.version += 1;
        true
    }

    pub fn set_fast_values(&self, device_id: &str, values: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        let Some(device) = inner.devices.get_mut(device_id) else {
            return false;
        };
        device.fast_values = resize_to(values, device.channels);
        inner.version += 1;
        true
    }

    pub fn set_plan(&self, device_id: &str, plan_id: Option<String>) -> bool {
        let mut inner = self.inner.lock();
        let Some(device) = inner.devices.get_mut(device_id) else {
            return false;
        };
        device.planned_plan_id = plan_id;
        inner.version += 1;
        true
    }

    pub fn set_fast_mode_type(&self, device_id: &str, fast_mode_type: FastModeType) -> bool {
        let mut inner = self.inner.lock();
        let Some(device) = inner.devices.get_mut(device_id) else {
            return false;
        };
        device.fast_mode_type = fast_mode_type;
        inner.version += 1;
        true
    }

    /// Refreshes a device's liveness. Only bumps the version if the device
    /// transitioned offline→online (§3 invariant 2, §4.C).
    pub fn update_heartbeat(&self, device_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let heartbeat_timeout_ms = self.heartbeat_timeout_ms;
        let Some(device) = inner.devices.get_mut(device_id) else {
            return false;
        };
        let now = now_ms();
        let was_online = is_online(device.last_heartbeat_ms, now, heartbeat_timeout_ms);
        device.last_heartbeat_ms = now;
        if !was_online {
            inner.version += 1;
        }
        true
    }

    pub fn increment_error_count(&self, device_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(device) = inner.devices.get_mut(device_id) {
            device.error_count += 1;
        }
    }

    pub fn increment_reconnect_count(&self, device_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(device) = inner.devices.get_mut(device_id) {
            device.reconnect_count += 1;
        }
    }

    // ── Room mutations ────────────────────────────────────────────────

    pub fn set_room_control_mode(&self, room_name: &str, control_mode: RoomControlMode) -> bool {
        let mut inner = self.inner.lock();
        if !inner.rooms.contains_key(room_name) {
            return false;
        }
        inner.rooms.get_mut(room_name).unwrap().control_mode = control_mode;
        if control_mode == RoomControlMode::Auto {
            project_room_to_devices(&mut inner, room_name);
        }
        inner.version += 1;
        true
    }

    pub fn set_room_mode(&self, room_name: &str, mode: DeviceMode) -> bool {
        let mut inner = self.inner.lock();
        let Some(room) = inner.rooms.get_mut(room_name) else {
            return false;
        };
        room.mode = mode;
        project_if_auto(&mut inner, room_name);
        true
    }

    pub fn set_room_static_values(&self, room_name: &str, values: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        let Some(room) = inner.rooms.get_mut(room_name) else {
            return false;
        };
        let room_len = room.static_values.len();
        room.static_values = resize_to(values, room_len.max(values.len()));
        project_if_auto(&mut inner, room_name);
        true
    }

    pub fn set_room_plan(&self, room_name: &str, plan_id: Option<String>) -> bool {
        let mut inner = self.inner.lock();
        let Some(room) = inner.rooms.get_mut(room_name) else {
            return false;
        };
        room.planned_plan_id = plan_id;
        project_if_auto(&mut inner, room_name);
        true
    }

    pub fn set_room_fast_mode_type(&self, room_name: &str, fast_mode_type: FastModeType) -> bool {
        let mut inner = self.inner.lock();
        let Some(room) = inner.rooms.get_mut(room_name) else {
            return false;
        };
        room.fast_mode_type = fast_mode_type;
        project_if_auto(&mut inner, room_name);
        true
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn get_device_status(&self, device_id: &str) -> Option<DeviceStatus> {
        let inner = self.inner.lock();
        build_device_status(&inner, device_id, self.heartbeat_timeout_ms)
    }

    pub fn get_all_device_status(&self) -> Vec<DeviceStatus> {
        let inner = self.inner.lock();
        let mut ids: Vec<&String> = inner.devices.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| build_device_status(&inner, id, self.heartbeat_timeout_ms))
            .collect()
    }

    pub fn get_all_room_control_status(&self) -> Vec<RoomControlStatus> {
        let inner = self.inner.lock();
        let mut names: Vec<&String> = inner.rooms.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let room = &inner.rooms[name];
                RoomControlStatus {
                    name: name.clone(),
                    control_mode: room.control_mode,
                    mode: room.mode,
                    static_values: room.static_values.clone(),
                    planned_plan_id: room.planned_plan_id.clone(),
                    fast_mode_type: room.fast_mode_type,
                }
            })
            .collect()
    }

    pub fn get_devices_by_mode(&self, mode: DeviceMode) -> Vec<String> {
        let inner = self.inner.lock();
        let mut ids: Vec<String> = inner
            .devices
            .keys()
            .filter(|id| {
                inner
                    .devices
                    .get(*id)
                    .map(|d| effective_mode_for(&inner, id, d) == mode)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Devices in FAST mode whose *effective* fast mode type matches.
    pub fn get_devices_by_fast_mode_type(&self, fast_mode_type: FastModeType) -> Vec<String> {
        let inner = self.inner.lock();
        let mut ids: Vec<String> = inner
            .devices
            .keys()
            .filter(|id| {
                let Some(d) = inner.devices.get(*id) else {
                    return false;
                };
                effective_mode_for(&inner, id, d) == DeviceMode::Fast
                    && effective_fast_mode_type_for(&inner, id, d) == fast_mode_type
            })
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn get_effective_static_values(&self, device_id: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock();
        let device = inner.devices.get(device_id)?;
        Some(effective_static_values(&inner, device_id, device))
    }

    pub fn get_effective_plan(&self, device_id: &str) -> Option<Option<String>> {
        let inner = self.inner.lock();
        let device = inner.devices.get(device_id)?;
        Some(effective_plan(&inner, device_id, device))
    }

    pub fn get_effective_fast_mode_type(&self, device_id: &str) -> Option<FastModeType> {
        let inner = self.inner.lock();
        let device = inner.devices.get(device_id)?;
        Some(effective_fast_mode_type_for(&inner, device_id, device))
    }

    pub fn device_config(&self, device_id: &str) -> Option<DeviceConfig> {
        self.inner.lock().device_config.get(device_id).cloned()
    }

    pub fn all_device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().devices.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ── Change detection (§4.C, §4.H) ─────────────────────────────────

    /// Returns `true` iff the canonical-order hash of the current device
    /// snapshot differs from the last one recorded by
    /// [`Self::mark_broadcast_complete`].
    pub fn has_state_changed(&self) -> bool {
        let inner = self.inner.lock();
        let hash = snapshot_hash(&inner, self.heartbeat_timeout_ms);
        inner.last_broadcast_hash != Some(hash)
    }

    /// Records the current snapshot hash as the last-broadcast one.
    pub fn mark_broadcast_complete(&self) {
        let mut inner = self.inner.lock();
        let hash = snapshot_hash(&inner, self.heartbeat_timeout_ms);
        inner.last_broadcast_hash = Some(hash);
    }
}

fn is_online(last_heartbeat_ms: u64, now_ms: u64, timeout_ms: u64) -> bool {
    last_heartbeat_ms > 0 && now_ms.saturating_sub(last_heartbeat_ms) < timeout_ms
}

/// Writes the room's current settings into every device it contains.
/// Called when AUTO is (re-)entered or a room-level set is issued while AUTO.
fn project_room_to_devices(inner: &mut Inner, room_name: &str) {
    let Some(room) = inner.rooms.get(room_name) else {
        return;
    };
    let mode = room.mode;
    let static_values = room.static_values.clone();
    let planned_plan_id = room.planned_plan_id.clone();
    let fast_mode_type = room.fast_mode_type;
    let device_ids = room.device_ids.clone();

    for device_id in device_ids {
        if let Some(device) = inner.devices.get_mut(&device_id) {
            device.mode = mode;
            device.static_values = resize_to(&static_values, device.channels);
            device.planned_plan_id = planned_plan_id.clone();
            device.fast_mode_type = fast_mode_type;
        }
    }
}

/// Projects and bumps the version, but only if the room is currently AUTO.
fn project_if_auto(inner: &mut Inner, room_name: &str) {
    let is_auto = inner
        .rooms
        .get(room_name)
        .map(|r| r.control_mode == RoomControlMode::Auto)
        .unwrap_or(false);
    if is_auto {
        project_room_to_devices(inner, room_name);
    }
    inner.version += 1;
}

/// Finds the room containing a device, if any.
fn room_of<'a>(inner: &'a Inner, device_id: &str) -> Option<&'a RoomRuntime> {
    let room_name = &inner.device_config.get(device_id)?.room;
    inner.rooms.get(room_name)
}

fn effective_static_values(inner: &Inner, device_id: &str, device: &DeviceRuntime) -> Vec<u8> {
    match room_of(inner, device_id) {
        Some(room) if room.control_mode == RoomControlMode::Auto => {
            resize_to(&room.static_values, device.channels)
        }
        _ => device.static_values.clone(),
    }
}

fn effective_plan(inner: &Inner, device_id: &str, device: &DeviceRuntime) -> Option<String> {
    match room_of(inner, device_id) {
        Some(room) if room.control_mode == RoomControlMode::Auto => room.planned_plan_id.clone(),
        _ => device.planned_plan_id.clone(),
    }
}

fn effective_fast_mode_type_for(
    inner: &Inner,
    device_id: &str,
    device: &DeviceRuntime,
) -> FastModeType {
    match room_of(inner, device_id) {
        Some(room) if room.control_mode == RoomControlMode::Auto => room.fast_mode_type,
        _ => device.fast_mode_type,
    }
}

fn effective_mode_for(inner: &Inner, device_id: &str, device: &DeviceRuntime) -> DeviceMode {
    match room_of(inner, device_id) {
        Some(room) if room.control_mode == RoomControlMode::Auto => room.mode,
        _ => device.mode,
    }
}

fn build_device_status(
    inner: &Inner,
    device_id: &str,
    heartbeat_timeout_ms: u64,
) -> Option<DeviceStatus> {
    let device = inner.devices.get(device_id)?;
    let config = inner.device_config.get(device_id)?;
    let now = now_ms();
    Some(DeviceStatus {
        device_id: device_id.to_string(),
        room: config.room.clone(),
        hw_mode: hw_mode_id(config.hw_mode),
        channels: device.channels,
        mode: effective_mode_for(inner, device_id, device),
        static_values: effective_static_values(inner, device_id, device),
        fast_values: device.fast_values.clone(),
        planned_plan_id: effective_plan(inner, device_id, device),
        fast_mode_type: effective_fast_mode_type_for(inner, device_id, device),
        online: is_online(device.last_heartbeat_ms, now, heartbeat_timeout_ms),
        last_heartbeat_ts: device.last_heartbeat_ms,
        error_count: device.error_count,
        reconnect_count: device.reconnect_count,
    })
}

fn hw_mode_id(mode: HardwareMode) -> &'static str {
    mode.mode_id()
}

/// Canonical-order hash of the full device snapshot. Sorted by device id so
/// the hash is stable regardless of `HashMap` iteration order.
fn snapshot_hash(inner: &Inner, heartbeat_timeout_ms: u64) -> u64 {
    let mut ids: Vec<&String> = inner.devices.keys().collect();
    ids.sort();
    let snapshot: Vec<DeviceStatus> = ids
        .into_iter()
        .filter_map(|id| build_device_status(inner, id, heartbeat_timeout_ms))
        .collect();
    let json = serde_json::to_string(&snapshot).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    json.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DeviceTopics, RoomConfig};

    fn test_config() -> AppConfig {
        AppConfig {
            mqtt: Default::default(),
            udp: Default::default(),
            planner: Default::default(),
            udp_repeater: Default::default(),
            rooms: vec![RoomConfig {
                name: "R".to_string(),
                devices: vec![
                    DeviceConfig {
                        device_id: "X".to_string(),
                        room: "R".to_string(),
                        ip: "10.0.0.1".to_string(),
                        udp_port: 5000,
                        hw_mode: HardwareMode::Ch4V1,
                        channels: 4,
                        channel_labels: vec!["G".into(), "Y".into(), "B".into(), "R".into()],
                        topics: DeviceTopics::default(),
                        firmware_version: "unknown".to_string(),
                    },
                    DeviceConfig {
                        device_id: "Y".to_string(),
                        room: "R".to_string(),
                        ip: "10.0.0.2".to_string(),
                        udp_port: 5000,
                        hw_mode: HardwareMode::Ch2V1,
                        channels: 2,
                        channel_labels: vec!["RY".into(), "GB".into()],
                        topics: DeviceTopics::default(),
                        firmware_version: "unknown".to_string(),
                    },
                ],
            }],
        }
    }

    #[test]
    fn value_lengths_match_channels() {
        let state = DomainState::from_config(&test_config(), 10);
        state.set_static_values("X", &[1, 2]);
        let status = state.get_device_status("X").unwrap();
        assert_eq!(status.static_values.len(), 4);
        assert_eq!(status.static_values, vec![1, 2, 0, 0]);
    }

    #[test]
    fn online_reflects_heartbeat_timeout() {
        let state = DomainState::from_config(&test_config(), 10);
        assert!(!state.get_device_status("X").unwrap().online);
        state.update_heartbeat("X");
        assert!(state.get_device_status("X").unwrap().online);
    }

    #[test]
    fn version_is_strictly_increasing_on_mutation_only() {
        let state = DomainState::from_config(&test_config(), 10);
        let v0 = state.version();
        state.set_static_values("X", &[5, 5, 5, 5]);
        let v1 = state.version();
        assert!(v1 > v0);
        state.update_heartbeat("X");
        let v2 = state.version();
        state.update_heartbeat("X");
        let v3 = state.version();
        assert_eq!(v2, v3);
    }

    #[test]
    fn room_auto_projection_scenario() {
        // §8 scenario 4.
        let state = DomainState::from_config(&test_config(), 10);
        state.set_room_control_mode("R", RoomControlMode::Auto);
        state.set_room_mode("R", DeviceMode::Static);
        state.set_room_static_values("R", &[10, 20, 30, 40]);

        let x = state.get_device_status("X").unwrap();
        let y = state.get_device_status("Y").unwrap();
        assert_eq!(x.static_values, vec![10, 20, 30, 40]);
        assert_eq!(y.static_values, vec![10, 20]);

        state.set_room_control_mode("R", RoomControlMode::Manual);
        let x_after = state.get_device_status("X").unwrap();
        let y_after = state.get_device_status("Y").unwrap();
        assert_eq!(x_after.static_values, vec![10, 20, 30, 40]);
        assert_eq!(y_after.static_values, vec![10, 20]);
    }

    #[test]
    fn change_gated_broadcast() {
        let state = DomainState::from_config(&test_config(), 10);
        assert!(state.has_state_changed());
        state.mark_broadcast_complete();
        assert!(!state.has_state_changed());
        state.set_static_values("X", &[1, 1, 1, 1]);
        assert!(state.has_state_changed());
    }

    #[test]
    fn effective_fast_mode_type_follows_room_in_auto() {
        let state = DomainState::from_config(&test_config(), 10);
        state.set_room_control_mode("R", RoomControlMode::Auto);
        state.set_room_fast_mode_type("R", FastModeType::UdpRepeater);
        assert_eq!(
            state.get_effective_fast_mode_type("X").unwrap(),
            FastModeType::UdpRepeater
        );
    }
}
