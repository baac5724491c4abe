//! Hardware mode definitions.
//!
//! A hardware mode describes the channel count and channel semantics of a
//! device class. Modes are immutable value types resolved from a string id
//! found in config or on the wire.

use serde::{Deserialize, Serialize};

/// A recognized device hardware mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareMode {
    /// 4-channel: Green, Yellow, Blue, Red.
    #[serde(rename = "4ch_v1")]
    Ch4V1,
    /// 2-channel: Red+Yellow, Green+Blue.
    #[serde(rename = "2ch_v1")]
    Ch2V1,
    /// 3-channel: Red, Green, Blue.
    #[serde(rename = "rgb_v1")]
    RgbV1,
}

impl HardwareMode {
    /// Parses a mode id string, falling back to `4ch_v1` for anything unrecognized.
    ///
    /// Legacy device configs may carry an arbitrary `hw_mode` string; the
    /// source's behavior is to fall back rather than reject at config load.
    pub fn from_id_or_default(id: &str) -> Self {
        match id {
            "2ch_v1" => Self::Ch2V1,
            "rgb_v1" => Self::RgbV1,
            _ => Self::Ch4V1,
        }
    }

    /// The wire-level stream id used in LED v2 packets.
    pub fn stream_id(self) -> u8 {
        match self {
            Self::Ch4V1 => 1,
            Self::Ch2V1 => 2,
            Self::RgbV1 => 3,
        }
    }

    /// Resolves a mode from its v2 wire stream id, if recognized.
    pub fn from_stream_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Ch4V1),
            2 => Some(Self::Ch2V1),
            3 => Some(Self::RgbV1),
            _ => None,
        }
    }

    /// Canonical string id, as used in config and API responses.
    pub fn mode_id(self) -> &'static str {
        match self {
            Self::Ch4V1 => "4ch_v1",
            Self::Ch2V1 => "2ch_v1",
            Self::RgbV1 => "rgb_v1",
        }
    }

    /// Number of channels this mode carries.
    pub fn channels(self) -> usize {
        self.labels().len()
    }

    /// Ordered channel labels.
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Self::Ch4V1 => &["G", "Y", "B", "R"],
            Self::Ch2V1 => &["RY", "GB"],
            Self::RgbV1 => &["R", "G", "B"],
        }
    }
}

/// Generates generic `CH1`, `CH2`, … labels for a legacy device whose
/// configured channel count doesn't match its default mode's channel count.
pub fn generic_labels(channels: usize) -> Vec<String> {
    (1..=channels).map(|i| format!("CH{i}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_4ch() {
        assert_eq!(HardwareMode::from_id_or_default("bogus"), HardwareMode::Ch4V1);
    }

    #[test]
    fn stream_id_round_trips() {
        for mode in [HardwareMode::Ch4V1, HardwareMode::Ch2V1, HardwareMode::RgbV1] {
            assert_eq!(HardwareMode::from_stream_id(mode.stream_id()), Some(mode));
        }
    }

    #[test]
    fn channel_counts_match_labels() {
        assert_eq!(HardwareMode::Ch4V1.channels(), 4);
        assert_eq!(HardwareMode::Ch2V1.channels(), 2);
        assert_eq!(HardwareMode::RgbV1.channels(), 3);
    }
}
