//! Device/room topology and transport configuration, loaded from YAML.
//!
//! Mirrors the source's `config.yaml` shape: `mqtt`, `udp`, `planner`,
//! `udp_repeater`, and `rooms[]` sections. Deployment knobs (bind port, log
//! level, file paths) are layered on separately by the server binary, the way
//! the teacher's `ServerConfig` keeps deployment concerns out of the shared
//! `Config` type.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::hwmode::{generic_labels, HardwareMode};

/// MQTT broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub reconnect_delay_min_secs: u64,
    pub reconnect_delay_max_secs: u64,
    pub heartbeat_timeout_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "lighting_hub".to_string(),
            reconnect_delay_min_secs: 1,
            reconnect_delay_max_secs: 60,
            heartbeat_timeout_secs: 10,
        }
    }
}

/// UDP fast-streamer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    pub default_port: u16,
    pub send_rate_hz: u32,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            default_port: 5000,
            send_rate_hz: 60,
        }
    }
}

/// UDP repeater (inbound realtime frame fan-out) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpRepeaterConfig {
    pub enabled: bool,
    pub listen_host: String,
    pub listen_port: u16,
}

impl Default for UdpRepeaterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_host: "0.0.0.0".to_string(),
            listen_port: 5001,
        }
    }
}

/// Planner cadence and payload-shape configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub interval_sec: u64,
    pub steps_per_interval: usize,
    pub interval_ms: u64,
    /// 1 = legacy packed format, 2 = per-step timestamps.
    pub plan_payload_version: u8,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            interval_sec: 1,
            steps_per_interval: 10,
            interval_ms: 100,
            plan_payload_version: 2,
        }
    }
}

/// MQTT topic triple for a single device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceTopics {
    #[serde(default)]
    pub set_plan: String,
    #[serde(default)]
    pub set_static: String,
    #[serde(default)]
    pub heartbeat: String,
}

/// Raw device entry as it appears in YAML, before mode resolution.
#[derive(Debug, Clone, Deserialize)]
struct RawDeviceConfig {
    device_id: String,
    ip: String,
    #[serde(default)]
    udp_port: Option<u16>,
    #[serde(default)]
    hw_mode: Option<String>,
    #[serde(default)]
    channels: Option<usize>,
    #[serde(default)]
    topics: DeviceTopics,
    #[serde(default = "default_firmware_version")]
    firmware_version: String,
}

fn default_firmware_version() -> String {
    "unknown".to_string()
}

/// Configuration for a single device, with its hardware mode resolved.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceConfig {
    pub device_id: String,
    pub room: String,
    pub ip: String,
    pub udp_port: u16,
    pub hw_mode: HardwareMode,
    pub channels: usize,
    pub channel_labels: Vec<String>,
    pub topics: DeviceTopics,
    pub firmware_version: String,
}

/// Raw room entry as it appears in YAML.
#[derive(Debug, Clone, Deserialize)]
struct RawRoomConfig {
    name: String,
    #[serde(default)]
    devices: Vec<RawDeviceConfig>,
}

/// A room and the devices it contains.
#[derive(Debug, Clone, Serialize)]
pub struct RoomConfig {
    pub name: String,
    pub devices: Vec<DeviceConfig>,
}

/// Raw top-level document as it appears in YAML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawAppConfig {
    mqtt: MqttConfig,
    udp: UdpConfig,
    planner: PlannerConfig,
    udp_repeater: UdpRepeaterConfig,
    rooms: Vec<RawRoomConfig>,
}

/// The fully resolved application configuration: transports plus topology.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub udp: UdpConfig,
    pub planner: PlannerConfig,
    pub udp_repeater: UdpRepeaterConfig,
    pub rooms: Vec<RoomConfig>,
}

/// Error loading or validating the application configuration. Fatal per §7e.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl AppConfig {
    /// Loads and resolves the configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw_text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawAppConfig =
            serde_yaml::from_str(&raw_text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::resolve(raw))
    }

    fn resolve(raw: RawAppConfig) -> Self {
        let default_port = raw.udp.default_port;
        let rooms = raw
            .rooms
            .into_iter()
            .map(|room| {
                let devices = room
                    .devices
                    .into_iter()
                    .map(|device| resolve_device(device, &room.name, default_port))
                    .collect();
                RoomConfig {
                    name: room.name,
                    devices,
                }
            })
            .collect();

        Self {
            mqtt: raw.mqtt,
            udp: raw.udp,
            planner: raw.planner,
            udp_repeater: raw.udp_repeater,
            rooms,
        }
    }

    /// Flattens every device across every room.
    pub fn all_devices(&self) -> impl Iterator<Item = &DeviceConfig> {
        self.rooms.iter().flat_map(|room| room.devices.iter())
    }

    /// Finds a device by id, searching every room.
    pub fn device(&self, device_id: &str) -> Option<&DeviceConfig> {
        self.all_devices().find(|d| d.device_id == device_id)
    }

    /// Logs a warning (does not reject) if the planner's window can overlap
    /// the next tick's window, per the open question resolved in SPEC_FULL §9.
    pub fn warn_on_overlapping_planner_window(&self) {
        let window_ms = self.planner.interval_ms * self.planner.steps_per_interval as u64;
        let tick_ms = self.planner.interval_sec * 1000;
        if window_ms > tick_ms {
            log::warn!(
                "planner window ({window_ms}ms) exceeds tick interval ({tick_ms}ms); \
                 consecutive scheduling windows will overlap in time"
            );
        }
    }
}

fn resolve_device(raw: RawDeviceConfig, room_name: &str, default_port: u16) -> DeviceConfig {
    let (hw_mode, channels, channel_labels) = match raw.hw_mode {
        Some(ref id) => {
            let mode = HardwareMode::from_id_or_default(id);
            (
                mode,
                mode.channels(),
                mode.labels().iter().map(|s| s.to_string()).collect(),
            )
        }
        None => {
            let legacy_channels = raw.channels.unwrap_or(4);
            let mode = HardwareMode::Ch4V1;
            log::warn!(
                "device {} uses legacy 'channels' field; consider migrating to 'hw_mode'",
                raw.device_id
            );
            let labels = if legacy_channels == mode.channels() {
                mode.labels().iter().map(|s| s.to_string()).collect()
            } else {
                generic_labels(legacy_channels)
            };
            (mode, legacy_channels, labels)
        }
    };

    DeviceConfig {
        device_id: raw.device_id,
        room: room_name.to_string(),
        ip: raw.ip,
        udp_port: raw.udp_port.unwrap_or(default_port),
        hw_mode,
        channels,
        channel_labels,
        topics: raw.topics,
        firmware_version: raw.firmware_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml() {
        let yaml = r#"
rooms:
  - name: Living Room
    devices:
      - device_id: lr-1
        ip: 10.0.0.5
        hw_mode: 4ch_v1
        topics:
          set_plan: led/lr-1/plan
          set_static: led/lr-1/static
          heartbeat: led/lr-1/heartbeat
"#;
        let raw: RawAppConfig = serde_yaml::from_str(yaml).unwrap();
        let config = AppConfig::resolve(raw);
        let device = config.device("lr-1").unwrap();
        assert_eq!(device.channels, 4);
        assert_eq!(device.room, "Living Room");
        assert_eq!(device.hw_mode, HardwareMode::Ch4V1);
    }

    #[test]
    fn legacy_channels_fall_back_to_4ch_with_generic_labels() {
        let yaml = r#"
rooms:
  - name: Garage
    devices:
      - device_id: g-1
        ip: 10.0.0.9
        channels: 6
        topics: {}
"#;
        let raw: RawAppConfig = serde_yaml::from_str(yaml).unwrap();
        let config = AppConfig::resolve(raw);
        let device = config.device("g-1").unwrap();
        assert_eq!(device.channels, 6);
        assert_eq!(device.channel_labels, vec!["CH1", "CH2", "CH3", "CH4", "CH5", "CH6"]);
    }
}
