//! Wire format of the event channel.
//!
//! Every message is an envelope `{"event": "...", "payload": {...}}`.
//! Inbound envelopes are decoded into [`InboundEvent`]; outbound ones are
//! built from [`OutboundEvent`].

use base64::{Engine as _, engine::general_purpose::STANDARD};
use kioskscheduler::{Broadcast, PlaybackState, Playlist};
use kiosksession::Interaction;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(event: &str, payload: Value) -> Self {
        Self {
            event: event.to_string(),
            payload,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Invalid payload for {event}: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayUpdate {
    #[serde(default)]
    pub display_width: Option<u32>,
    #[serde(default)]
    pub display_height: Option<u32>,
    #[serde(default)]
    pub kiosk_mode: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct NavigatePayload {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PointPayload {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct TextPayload {
    text: String,
}

#[derive(Debug, Deserialize)]
struct KeyPayload {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrollPayload {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    delta_x: f64,
    #[serde(default)]
    delta_y: f64,
}

/// Command received from the management backend.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ContentUpdate(Playlist),
    Navigate(String),
    Refresh,
    Pause,
    Resume,
    Next,
    Previous,
    BroadcastStart(Broadcast),
    BroadcastEnd,
    ConfigUpdate(DisplayUpdate),
    Remote(Interaction),
    ScreencastStart,
    ScreencastStop,
    DeviceRestart,
}

impl InboundEvent {
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope { event, payload } = envelope;
        let event_name = event.as_str();

        let parsed = match event_name {
            "content:update" => {
                let p: Playlist = decode(event_name, payload)?;
                Self::ContentUpdate(Playlist::new(p.playlist_id, p.items))
            }
            "display:navigate" => {
                let p: NavigatePayload = decode(event_name, payload)?;
                Self::Navigate(p.url)
            }
            "display:refresh" => Self::Refresh,
            "playlist:pause" => Self::Pause,
            "playlist:resume" => Self::Resume,
            "playlist:next" => Self::Next,
            "playlist:previous" => Self::Previous,
            "playlist:broadcast:start" => Self::BroadcastStart(decode(event_name, payload)?),
            "playlist:broadcast:end" => Self::BroadcastEnd,
            "config:update" => Self::ConfigUpdate(decode(event_name, payload)?),
            "remote:click" => {
                let p: PointPayload = decode(event_name, payload)?;
                Self::Remote(Interaction::Click { x: p.x, y: p.y })
            }
            "remote:type" => {
                let p: TextPayload = decode(event_name, payload)?;
                Self::Remote(Interaction::Type { text: p.text })
            }
            "remote:key" => {
                let p: KeyPayload = decode(event_name, payload)?;
                Self::Remote(Interaction::Key { key: p.key })
            }
            "remote:scroll" => {
                let p: ScrollPayload = decode(event_name, payload)?;
                Self::Remote(Interaction::Scroll {
                    x: p.x,
                    y: p.y,
                    delta_x: p.delta_x,
                    delta_y: p.delta_y,
                })
            }
            "screencast:start" => Self::ScreencastStart,
            "screencast:stop" => Self::ScreencastStop,
            "device:restart" => Self::DeviceRestart,
            _ => return Err(ProtocolError::UnknownEvent(event)),
        };
        Ok(parsed)
    }
}

// Payload absent ou null : objet vide, pour que les champs optionnels s'appliquent
fn decode<T: serde::de::DeserializeOwned>(event: &str, payload: Value) -> Result<T, ProtocolError> {
    let payload = if payload.is_null() { json!({}) } else { payload };
    serde_json::from_value(payload).map_err(|source| ProtocolError::InvalidPayload {
        event: event.to_string(),
        source,
    })
}

/// Message sent to the management backend.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    PlaybackState(PlaybackState),
    Screenshot {
        png: Vec<u8>,
        url: Option<String>,
        timestamp: String,
    },
    ScreencastFrame {
        png: Vec<u8>,
        width: u32,
        height: u32,
        sequence: u64,
        timestamp: String,
    },
}

impl OutboundEvent {
    pub fn into_envelope(self) -> Envelope {
        match self {
            Self::PlaybackState(state) => Envelope::new(
                "playback:state:update",
                serde_json::to_value(state).unwrap_or(Value::Null),
            ),
            Self::Screenshot {
                png,
                url,
                timestamp,
            } => Envelope::new(
                "screenshot:upload",
                json!({
                    "image": STANDARD.encode(png),
                    "currentUrl": url,
                    "timestamp": timestamp,
                }),
            ),
            Self::ScreencastFrame {
                png,
                width,
                height,
                sequence,
                timestamp,
            } => Envelope::new(
                "screencast:frame",
                json!({
                    "data": STANDARD.encode(png),
                    "metadata": {
                        "width": width,
                        "height": height,
                        "sequence": sequence,
                        "timestamp": timestamp,
                    },
                }),
            ),
        }
    }
}
