//! Pub/sub client (§4.D): connects to the MQTT broker, subscribes to every
//! configured device's heartbeat topic, drives liveness into [`DomainState`],
//! and publishes static/plan payloads on behalf of the planner and the
//! operator API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, DeviceConfig, MqttConfig};
use crate::protocol_constants::PUBLISH_QOS;
use crate::state::DomainState;

/// Thin façade over `rumqttc`'s `AsyncClient` plus connection bookkeeping.
pub struct PubSubClient {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl PubSubClient {
    /// Builds the client and its event loop. The event loop must be driven
    /// by [`Self::run`] for the client to ever connect.
    pub fn new(mqtt: &MqttConfig) -> (Self, EventLoop) {
        let mut options =
            MqttOptions::new(mqtt.client_id.clone(), mqtt.broker_host.clone(), mqtt.broker_port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);
        let (client, eventloop) = AsyncClient::new(options, 256);
        (
            Self {
                client,
                connected: Arc::new(AtomicBool::new(false)),
            },
            eventloop,
        )
    }

    /// Whether the underlying connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Publishes `{"values": [...]}` to the device's `set_static` topic.
    /// Returns `false` without blocking if not currently connected (§4.D.4).
    pub async fn publish_static(&self, device: &DeviceConfig, values: &[u8]) -> bool {
        if !self.is_connected() {
            return false;
        }
        let payload = serde_json::json!({ "values": values });
        self.publish(&device.topics.set_static, &payload).await
    }

    /// Publishes a plan payload (already shaped per §4.E/§6) to the device's
    /// `set_plan` topic.
    pub async fn publish_plan(&self, device: &DeviceConfig, payload: &Value) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.publish(&device.topics.set_plan, payload).await
    }

    async fn publish(&self, topic: &str, payload: &Value) -> bool {
        if topic.is_empty() {
            return false;
        }
        self.client
            .publish(topic, PUBLISH_QOS, false, payload.to_string())
            .await
            .is_ok()
    }

    /// Drives the event loop until `shutdown` fires: connects, subscribes to
    /// every device's heartbeat topic, feeds heartbeats into `state`, and
    /// reconnects with exponential backoff (doubling, capped, reset on
    /// success) on any failure (§4.D.2).
    pub async fn run(
        &self,
        mut eventloop: EventLoop,
        config: &AppConfig,
        state: Arc<DomainState>,
        shutdown: CancellationToken,
    ) {
        let min_backoff = Duration::from_secs(config.mqtt.reconnect_delay_min_secs.max(1));
        let max_backoff = Duration::from_secs(config.mqtt.reconnect_delay_max_secs.max(1));
        let mut backoff = min_backoff;
        let mut ever_connected = false;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("[pubsub] shutdown requested, exiting event loop");
                    return;
                }
                result = eventloop.poll() => {
                    match result {
                        Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                            backoff = min_backoff;
                            let was_connected = self.connected.swap(true, Ordering::Relaxed);
                            log::info!("[pubsub] connected to {}:{}", config.mqtt.broker_host, config.mqtt.broker_port);
                            if was_connected || ever_connected {
                                for device_id in state.all_device_ids() {
                                    state.increment_reconnect_count(&device_id);
                                }
                            }
                            ever_connected = true;
                            for device in config.all_devices() {
                                if device.topics.heartbeat.is_empty() {
                                    continue;
                                }
                                if let Err(e) = self
                                    .client
                                    .subscribe(&device.topics.heartbeat, QoS::AtMostOnce)
                                    .await
                                {
                                    log::warn!(
                                        "[pubsub] subscribe failed for {}: {e}",
                                        device.device_id
                                    );
                                }
                            }
                        }
                        Ok(Event::Incoming(Incoming::Publish(publish))) => {
                            // Heartbeat payloads are ignored; any bytes (including
                            // empty) count as a liveness ping (§6).
                            if let Some(device_id) = device_for_heartbeat_topic(config, &publish.topic) {
                                state.update_heartbeat(&device_id);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            if self.connected.swap(false, Ordering::Relaxed) {
                                log::warn!("[pubsub] disconnected: {e}");
                            }
                            tokio::select! {
                                _ = tokio::time::sleep(backoff) => {}
                                _ = shutdown.cancelled() => return,
                            }
                            backoff = (backoff * 2).min(max_backoff);
                        }
                    }
                }
            }
        }
    }
}

fn device_for_heartbeat_topic(config: &AppConfig, topic: &str) -> Option<String> {
    config
        .all_devices()
        .find(|d| d.topics.heartbeat == topic)
        .map(|d| d.device_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let min = Duration::from_secs(1);
        let max = Duration::from_secs(8);
        let mut backoff = min;
        let mut seen = vec![backoff];
        for _ in 0..5 {
            backoff = (backoff * 2).min(max);
            seen.push(backoff);
        }
        assert_eq!(
            seen,
            vec![1, 2, 4, 8, 8, 8]
                .into_iter()
                .map(Duration::from_secs)
                .collect::<Vec<_>>()
        );
    }
}
