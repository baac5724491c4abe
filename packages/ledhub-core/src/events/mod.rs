//! Event system for operator push notifications.
//!
//! The push broadcaster (§4.H) emits [`BroadcastEvent`]s onto a shared
//! channel; `api::ws` forwards them to connected operators. The actual
//! transport (WebSocket) lives in the `api` module via
//! [`BroadcastEventBridge`](bridge::BroadcastEventBridge).

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::state::{DeviceStatus, RoomControlStatus};

/// Messages pushed to connected operators (§4.H).
///
/// `State` carries the full, effective-value-resolved device snapshot;
/// `RoomsControl` carries every room's control state. Both are sent
/// immediately on subscriber connect; subsequent `State` broadcasts are
/// gated on [`crate::state::DomainState::has_state_changed`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    State { devices: Vec<DeviceStatus> },
    RoomsControl { rooms: Vec<RoomControlStatus> },
}
