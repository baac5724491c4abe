//! Fast streamer (§4.F): pushes FAST+INTERNAL devices' `fast_values` to their
//! `(ip, udp_port)` at a fixed rate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::state::{DomainState, FastModeType};
use crate::wire;

pub struct FastStreamer {
    state: Arc<DomainState>,
}

impl FastStreamer {
    pub fn new(state: Arc<DomainState>) -> Self {
        Self { state }
    }

    pub async fn run(&self, config: &AppConfig, shutdown: CancellationToken) {
        let socket = match UdpSocket::bind("0.0.0.0:0").await {
            Ok(s) => s,
            Err(e) => {
                log::error!("[faststreamer] failed to bind send socket: {e}");
                return;
            }
        };
        let rate_hz = config.udp.send_rate_hz.max(1);
        let mut interval = tokio::time::interval(Duration::from_micros(1_000_000 / rate_hz as u64));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        log::info!("[faststreamer] started at {rate_hz}Hz");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("[faststreamer] shutdown requested");
                    return;
                }
                _ = interval.tick() => {
                    self.tick(config, &socket).await;
                }
            }
        }
    }

    async fn tick(&self, config: &AppConfig, socket: &UdpSocket) {
        for device_id in self.state.get_devices_by_fast_mode_type(FastModeType::Internal) {
            let Some(device) = config.device(&device_id) else {
                continue;
            };
            let Some(status) = self.state.get_device_status(&device_id) else {
                continue;
            };
            let mut values = status.fast_values;
            values.resize(device.channels, 0);
            let packet = wire::encode_v1(&values);
            let addr: SocketAddr = match format!("{}:{}", device.ip, device.udp_port).parse() {
                Ok(a) => a,
                Err(e) => {
                    log::warn!("[faststreamer] bad address for {device_id}: {e}");
                    self.state.increment_error_count(&device_id);
                    continue;
                }
            };
            if let Err(e) = socket.send_to(&packet, addr).await {
                log::warn!("[faststreamer] send failed for {device_id}: {e}");
                self.state.increment_error_count(&device_id);
            }
        }
    }
}
