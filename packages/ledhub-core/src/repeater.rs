//! UDP repeater (§4.G): receives realtime frames on a datagram port and
//! fans them out, adapted per device, to every FAST+UDP_REPEATER device.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::hwmode::HardwareMode;
use crate::protocol_constants::UDP_REPEATER_RECV_TIMEOUT_MS;
use crate::state::{DomainState, FastModeType};
use crate::wire::{self, Packet};

const MAX_PACKET_LEN: usize = 2048;

pub struct UdpRepeater {
    state: Arc<DomainState>,
}

impl UdpRepeater {
    pub fn new(state: Arc<DomainState>) -> Self {
        Self { state }
    }

    pub async fn run(&self, config: &AppConfig, shutdown: CancellationToken) {
        if !config.udp_repeater.enabled {
            log::info!("[repeater] disabled by config");
            return;
        }
        let bind_addr = format!("{}:{}", config.udp_repeater.listen_host, config.udp_repeater.listen_port);
        let recv_socket = match UdpSocket::bind(&bind_addr).await {
            Ok(s) => s,
            Err(e) => {
                log::error!("[repeater] failed to bind {bind_addr}: {e}; repeater disabled");
                return;
            }
        };
        let send_socket = match UdpSocket::bind("0.0.0.0:0").await {
            Ok(s) => s,
            Err(e) => {
                log::error!("[repeater] failed to bind send socket: {e}");
                return;
            }
        };
        log::info!("[repeater] listening on {bind_addr}");

        let mut buf = vec![0u8; MAX_PACKET_LEN];
        loop {
            if shutdown.is_cancelled() {
                log::info!("[repeater] shutdown requested");
                return;
            }
            let recv = tokio::time::timeout(
                Duration::from_millis(UDP_REPEATER_RECV_TIMEOUT_MS),
                recv_socket.recv_from(&mut buf),
            )
            .await;
            let (len, _src) = match recv {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    log::warn!("[repeater] recv error: {e}");
                    continue;
                }
                Err(_timeout) => continue,
            };
            let Ok(packet) = wire::decode(&buf[..len]) else {
                continue;
            };
            self.fan_out(config, &send_socket, packet).await;
        }
    }

    async fn fan_out(&self, config: &AppConfig, send_socket: &UdpSocket, packet: Packet) {
        let streams = match packet {
            Packet::V1 { values } => {
                let mut map = BTreeMap::new();
                map.insert(0u8, values);
                map
            }
            Packet::V2 { streams } => streams,
        };

        for device_id in self.state.get_devices_by_fast_mode_type(FastModeType::UdpRepeater) {
            let Some(device) = config.device(&device_id) else {
                continue;
            };
            let values = select_stream(&streams, device.hw_mode, device.channels);
            self.state.set_fast_values(&device_id, &values);

            let packet = wire::encode_v1(&values);
            let addr: SocketAddr = match format!("{}:{}", device.ip, device.udp_port).parse() {
                Ok(a) => a,
                Err(e) => {
                    log::warn!("[repeater] bad address for {device_id}: {e}");
                    self.state.increment_error_count(&device_id);
                    continue;
                }
            };
            if let Err(e) = send_socket.send_to(&packet, addr).await {
                log::warn!("[repeater] send failed for {device_id}: {e}");
                self.state.increment_error_count(&device_id);
            }
        }
    }
}

/// Selects and adapts a stream for `hw_mode`/`channels` per §4.G's priority
/// order: exact `hw_mode` match, then `4ch_v1`, then first in ascending
/// `stream_id` order, then a zero vector.
fn select_stream(streams: &BTreeMap<u8, Vec<u8>>, hw_mode: HardwareMode, channels: usize) -> Vec<u8> {
    let chosen = streams
        .get(&hw_mode.stream_id())
        .or_else(|| streams.get(&HardwareMode::Ch4V1.stream_id()))
        .or_else(|| streams.values().next());

    match chosen {
        Some(source) => adapt(source, hw_mode, channels),
        None => vec![0; channels],
    }
}

/// Adapts a source vector to a device's hw_mode/channel count. `2ch_v1`
/// devices fed a ≥4-channel `4ch_v1`-layout source get the G,Y,B,R → RY,GB
/// max-combine; everything else is truncated or zero-padded.
fn adapt(source: &[u8], hw_mode: HardwareMode, channels: usize) -> Vec<u8> {
    if hw_mode == HardwareMode::Ch2V1 && source.len() >= 4 {
        let (g, y, b, r) = (source[0], source[1], source[2], source[3]);
        return vec![r.max(y), g.max(b)];
    }
    let mut out = source.to_vec();
    out.resize(channels, 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_4ch_to_2ch_repeater_adaptation() {
        // §8 scenario 1.
        let mut streams = BTreeMap::new();
        streams.insert(1u8, vec![16, 32, 48, 64]);
        let out = select_stream(&streams, HardwareMode::Ch2V1, 2);
        assert_eq!(out, vec![64, 48]);
    }

    #[test]
    fn falls_back_to_4ch_v1_stream_when_no_exact_match() {
        let mut streams = BTreeMap::new();
        streams.insert(1u8, vec![1, 2, 3, 4]);
        streams.insert(2u8, vec![9, 9]);
        let out = select_stream(&streams, HardwareMode::RgbV1, 3);
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn falls_back_to_ascending_stream_id_when_no_match_at_all() {
        let mut streams = BTreeMap::new();
        streams.insert(5u8, vec![7, 8]);
        streams.insert(9u8, vec![1, 1]);
        let out = select_stream(&streams, HardwareMode::RgbV1, 3);
        assert_eq!(out, vec![7, 8, 0]);
    }

    #[test]
    fn zero_vector_when_no_streams() {
        let streams = BTreeMap::new();
        let out = select_stream(&streams, HardwareMode::Ch4V1, 4);
        assert_eq!(out, vec![0, 0, 0, 0]);
    }
}
