use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_AGGREGATION_TIMEOUT_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `AggregationMode` values.
pub enum AggregationMode {
    /// Single-reply bots: one activity completes the request. An early reply
    /// is held as the latest-only buffer for the key, and that buffer still
    /// gets an expiry deadline so a reply nobody claims is reported as missed
    /// instead of staying in the table forever.
    Immediate,
    /// Multi-reply bots: parts arriving ahead of the request are collected.
    Aggregating,
}

impl AggregationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Aggregating => "aggregating",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `AggregationWindow` values.
pub enum AggregationWindow {
    /// Deadline armed once, when the first part opens the buffer.
    Fixed,
    /// Deadline re-armed every time another part joins the buffer.
    Sliding,
}

impl AggregationWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Sliding => "sliding",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `CorrelationConfig` used across vox-bridge components.
pub struct CorrelationConfig {
    pub mode: AggregationMode,
    pub window: AggregationWindow,
    pub aggregation_timeout: Duration,
    pub leave_session_open_default: bool,
    pub enable_card_translation: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            mode: AggregationMode::Aggregating,
            window: AggregationWindow::Fixed,
            aggregation_timeout: Duration::from_millis(DEFAULT_AGGREGATION_TIMEOUT_MS),
            leave_session_open_default: false,
            enable_card_translation: false,
        }
    }
}
