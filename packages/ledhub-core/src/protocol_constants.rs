//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the wire/API contracts in SPEC_FULL.md §4 and
//! §6 rather than being deployment knobs; changing them would break
//! interoperability with devices or the operator surface.

/// MQTT QoS used for `set_static` and `set_plan` publishes (§4.D).
pub const PUBLISH_QOS: rumqttc::QoS = rumqttc::QoS::AtLeastOnce;

/// Capacity of the broadcast channel backing the push broadcaster (§4.H).
pub const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Interval between liveness ticks that force a gated rebroadcast (§4.H).
pub const LIVENESS_TICK_SECS: u64 = 3;

/// Default TTL for the plan read-through cache (§4.B) - bounded, not tight.
pub const PLAN_CACHE_TTL_SECS: u64 = 5;

/// Socket receive timeout for the UDP repeater loop, so shutdown stays
/// responsive without a dedicated cancellation mechanism on the blocking recv.
pub const UDP_REPEATER_RECV_TIMEOUT_MS: u64 = 500;

/// Minimum reconnect backoff for the pub/sub client (§4.D).
pub const MQTT_RECONNECT_BACKOFF_MIN_SECS: u64 = 1;
