use serde::{Deserialize, Serialize};

/// Why nothing (or not the expected item) is on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackCondition {
    #[default]
    None,
    /// No item satisfies its constraints right now.
    NoDisplayableItem,
    /// The render session is closed or recovering.
    RenderUnavailable,
    /// The render session gave up recovering.
    SessionDegraded,
}

/// Observable playback snapshot, emitted on every transition and on the heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_running: bool,
    pub is_paused: bool,
    pub is_broadcasting: bool,
    pub current_item_id: Option<String>,
    pub current_item_index: Option<usize>,
    pub playlist_id: Option<String>,
    pub total_items: usize,
    pub current_url: Option<String>,
    pub time_remaining_ms: Option<u64>,
    pub condition: PlaybackCondition,
    pub is_stalled: bool,
}

impl PlaybackState {
    pub fn idle() -> Self {
        Self::default()
    }
}
