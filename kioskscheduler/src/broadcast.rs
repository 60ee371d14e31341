//! Out-of-band broadcast overrides and their rendering as a standalone page.

use crate::error::{Result, SchedulerError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastKind {
    Url,
    Message,
    Image,
    Video,
}

/// Temporary content replacing the rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    #[serde(rename = "type")]
    pub kind: BroadcastKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Milliseconds; 0 lasts until explicitly ended.
    #[serde(default, rename = "duration")]
    pub duration_ms: u64,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub logo_position: Option<String>,
    /// Inline media, either a `data:` URL or raw base64.
    #[serde(default)]
    pub media_data: Option<String>,
}

impl Broadcast {
    pub fn message(text: &str, duration_ms: u64) -> Self {
        Self {
            kind: BroadcastKind::Message,
            url: None,
            message: Some(text.to_string()),
            duration_ms,
            background: None,
            logo: None,
            logo_position: None,
            media_data: None,
        }
    }

    pub fn url(url: &str, duration_ms: u64) -> Self {
        Self {
            kind: BroadcastKind::Url,
            url: Some(url.to_string()),
            ..Self::message("", duration_ms)
        }
    }

    /// Auto-end delay, `None` when the broadcast lasts until ended.
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_ms > 0).then(|| Duration::from_millis(self.duration_ms))
    }

    /// URL handed to the renderer for this broadcast.
    pub fn render_target(&self) -> Result<String> {
        match self.kind {
            BroadcastKind::Url => non_empty(&self.url)
                .map(str::to_string)
                .ok_or_else(|| SchedulerError::InvalidBroadcast("url broadcast without url".into())),
            BroadcastKind::Message => {
                let message = non_empty(&self.message).ok_or_else(|| {
                    SchedulerError::InvalidBroadcast("message broadcast without message".into())
                })?;
                let body = format!(
                    r#"<div class="message">{}</div>"#,
                    escape_html(message).replace('\n', "<br>")
                );
                Ok(self.page(&body))
            }
            BroadcastKind::Image | BroadcastKind::Video => {
                let source = self.media_source().ok_or_else(|| {
                    SchedulerError::InvalidBroadcast("media broadcast without url or mediaData".into())
                })?;
                let media = if self.kind == BroadcastKind::Image {
                    format!(r#"<img class="media" src="{}">"#, escape_html(&source))
                } else {
                    format!(
                        r#"<video class="media" src="{}" autoplay muted loop playsinline></video>"#,
                        escape_html(&source)
                    )
                };
                let caption = non_empty(&self.message)
                    .map(|m| format!(r#"<div class="caption">{}</div>"#, escape_html(m)))
                    .unwrap_or_default();
                Ok(self.page(&format!("{}{}", media, caption)))
            }
        }
    }

    fn media_source(&self) -> Option<String> {
        if let Some(data) = non_empty(&self.media_data) {
            if data.starts_with("data:") {
                return Some(data.to_string());
            }
            let mime = match self.kind {
                BroadcastKind::Video => "video/mp4",
                _ => "image/png",
            };
            return Some(format!("data:{};base64,{}", mime, data));
        }
        non_empty(&self.url).map(str::to_string)
    }

    fn page(&self, body: &str) -> String {
        let background = non_empty(&self.background).unwrap_or("#000000");
        let logo = non_empty(&self.logo)
            .map(|src| {
                let (vertical, horizontal) = logo_corner(self.logo_position.as_deref());
                format!(
                    r#"<img class="logo" src="{}" style="{}:24px;{}:24px">"#,
                    escape_html(src),
                    vertical,
                    horizontal
                )
            })
            .unwrap_or_default();

        let html = format!(
            r#"<!DOCTYPE html><html><head><meta charset="utf-8"><style>
html,body{{margin:0;width:100%;height:100%;overflow:hidden;background:{background};color:#ffffff;font-family:sans-serif}}
body{{display:flex;flex-direction:column;align-items:center;justify-content:center}}
.message{{font-size:6vh;text-align:center;padding:0 8vw}}
.media{{max-width:100%;max-height:100%;object-fit:contain}}
.caption{{position:absolute;bottom:6vh;font-size:4vh}}
.logo{{position:absolute;max-height:12vh}}
</style></head><body>{logo}{body}</body></html>"#,
            background = escape_css(background),
            logo = logo,
            body = body,
        );
        format!("data:text/html;base64,{}", STANDARD.encode(html))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn logo_corner(position: Option<&str>) -> (&'static str, &'static str) {
    match position.unwrap_or("top-right") {
        "top-left" => ("top", "left"),
        "bottom-left" => ("bottom", "left"),
        "bottom-right" => ("bottom", "right"),
        _ => ("top", "right"),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Keeps a CSS value from closing its declaration or the style element.
fn escape_css(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ';' | '{' | '}' | '<' | '>' | '"' | '\\'))
        .collect()
}
