use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

pub const DEFAULT_STREAMING_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_THEME: &str = "kensington";
pub const DEFAULT_SCROLL_TOLERANCE: f32 = 30.0;

/// How much of the conversation is sent along with each prompt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryPayloadSize {
    #[default]
    None,
    /// The most recent `n` loaded messages
    Count(usize),
    All,
}

impl HistoryPayloadSize {
    /// Parse `"all"`, `"none"` or a message count.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "all" => Some(HistoryPayloadSize::All),
            "none" => Some(HistoryPayloadSize::None),
            n => n.parse().ok().map(|n| match n {
                0 => HistoryPayloadSize::None,
                n => HistoryPayloadSize::Count(n),
            }),
        }
    }
}

/// How replies are requested from the adapter.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataTransferMode {
    /// One request, one complete reply
    Fetch,
    #[default]
    Stream,
}

impl DataTransferMode {
    pub fn other(self) -> Self {
        match self {
            DataTransferMode::Fetch => DataTransferMode::Stream,
            DataTransferMode::Stream => DataTransferMode::Fetch,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// How long a message may hold the auto-scroll lock without finishing
    pub streaming_timeout_secs: u64,
    pub theme_id: String,
    pub history_payload_size: HistoryPayloadSize,
    pub data_transfer_mode: DataTransferMode,
    /// Whether a new conversation starts out following the stream
    pub auto_scroll: bool,
    /// Distance from the bottom, in pixels, that still counts as pinned
    pub scroll_bottom_tolerance: f32,
}

/// Built-in defaults, overridden by `CONVO_STREAMING_TIMEOUT_SECS`,
/// `CONVO_THEME` and `CONVO_HISTORY_SIZE` when set.
impl Default for ChatConfig {
    fn default() -> Self {
        let config = ChatConfig::new();
        ChatConfig {
            streaming_timeout_secs: std::env::var("CONVO_STREAMING_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(config.streaming_timeout_secs),
            theme_id: std::env::var("CONVO_THEME").unwrap_or(config.theme_id),
            history_payload_size: std::env::var("CONVO_HISTORY_SIZE")
                .ok()
                .and_then(|s| HistoryPayloadSize::parse(&s))
                .unwrap_or(config.history_payload_size),
            ..config
        }
    }
}

impl ChatConfig {
    /// Built-in defaults only, ignoring the environment.
    pub fn new() -> Self {
        ChatConfig {
            streaming_timeout_secs: DEFAULT_STREAMING_TIMEOUT_SECS,
            theme_id: DEFAULT_THEME.to_string(),
            history_payload_size: HistoryPayloadSize::None,
            data_transfer_mode: DataTransferMode::default(),
            auto_scroll: true,
            scroll_bottom_tolerance: DEFAULT_SCROLL_TOLERANCE,
        }
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&contents)?;
        tracing::debug!("loaded chat config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn streaming_timeout(&self) -> Duration {
        Duration::from_secs(self.streaming_timeout_secs)
    }
}
