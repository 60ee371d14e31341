use serde::{Deserialize, Deserializer, Serialize};

/// Identifiers arrive either as JSON strings or as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// One entry of the display schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// URL (or identifier) of the content to display.
    #[serde(alias = "url")]
    pub source_ref: String,
    /// Display duration; 0 means "until replaced" for a single-item playlist.
    #[serde(default, alias = "duration")]
    pub duration_seconds: u64,
    #[serde(default)]
    pub order_index: i64,
    /// `HH:MM` or `HH:MM:SS`, local time.
    #[serde(default)]
    pub time_window_start: Option<String>,
    #[serde(default)]
    pub time_window_end: Option<String>,
    /// 0 = Sunday ... 6 = Saturday. Missing or empty means every day.
    #[serde(default)]
    pub days_of_week: Option<Vec<u8>>,
}

impl ScheduledItem {
    pub fn new(id: &str, source_ref: &str, duration_seconds: u64) -> Self {
        Self {
            id: id.to_string(),
            source_ref: source_ref.to_string(),
            duration_seconds,
            order_index: 0,
            time_window_start: None,
            time_window_end: None,
            days_of_week: None,
        }
    }

    pub fn with_window(mut self, start: &str, end: &str) -> Self {
        self.time_window_start = Some(start.to_string());
        self.time_window_end = Some(end.to_string());
        self
    }

    pub fn with_days(mut self, days: &[u8]) -> Self {
        self.days_of_week = Some(days.to_vec());
        self
    }

    /// True when both items rotate identically (duration, window, days).
    pub fn same_scheduling(&self, other: &ScheduledItem) -> bool {
        self.duration_seconds == other.duration_seconds
            && self.time_window_start == other.time_window_start
            && self.time_window_end == other.time_window_end
            && self.days_of_week == other.days_of_week
    }

    /// True when both items show the same thing.
    pub fn same_content(&self, other: &ScheduledItem) -> bool {
        self.id == other.id && self.source_ref == other.source_ref
    }
}

/// Ordered display schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    #[serde(alias = "id", deserialize_with = "string_or_number")]
    pub playlist_id: String,
    #[serde(default)]
    pub items: Vec<ScheduledItem>,
}

impl Playlist {
    /// Builds a playlist, ordering items by `order_index` (stable for ties).
    pub fn new(playlist_id: impl Into<String>, mut items: Vec<ScheduledItem>) -> Self {
        items.sort_by_key(|item| item.order_index);
        Self {
            playlist_id: playlist_id.into(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ScheduledItem> {
        self.items.get(index)
    }

    pub fn source_refs(&self) -> Vec<String> {
        self.items.iter().map(|item| item.source_ref.clone()).collect()
    }

    /// Decides whether replacing `self` by `incoming` while `current` is
    /// displayed requires a full rotation restart.
    ///
    /// The playlist is swapped in place only when item count, every
    /// scheduling field and duration, and the displayed item are unchanged.
    pub fn requires_restart(&self, incoming: &Playlist, current: Option<usize>) -> bool {
        if self.len() != incoming.len() {
            return true;
        }
        if self
            .items
            .iter()
            .zip(&incoming.items)
            .any(|(old, new)| !old.same_scheduling(new))
        {
            return true;
        }
        match current {
            Some(index) => match (self.get(index), incoming.get(index)) {
                (Some(old), Some(new)) => !old.same_content(new),
                _ => true,
            },
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist(items: Vec<ScheduledItem>) -> Playlist {
        Playlist::new("p1", items)
    }

    #[test]
    fn test_items_sorted_by_order_index() {
        let mut a = ScheduledItem::new("a", "https://a", 10);
        a.order_index = 2;
        let mut b = ScheduledItem::new("b", "https://b", 10);
        b.order_index = 1;
        let p = playlist(vec![a, b]);
        assert_eq!(p.items[0].id, "b");
    }

    #[test]
    fn test_identical_permanent_item_does_not_restart() {
        let old = playlist(vec![ScheduledItem::new("a", "https://a", 0)]);
        let new = old.clone();
        assert!(!old.requires_restart(&new, Some(0)));
    }

    #[test]
    fn test_changed_window_forces_restart() {
        let old = playlist(vec![
            ScheduledItem::new("a", "https://a", 10),
            ScheduledItem::new("b", "https://b", 10),
        ]);
        let mut new = old.clone();
        new.items[1].time_window_start = Some("08:00".into());
        new.items[1].time_window_end = Some("18:00".into());
        assert!(old.requires_restart(&new, Some(0)));
    }

    #[test]
    fn test_changed_non_current_content_is_swapped() {
        let old = playlist(vec![
            ScheduledItem::new("a", "https://a", 10),
            ScheduledItem::new("b", "https://b", 10),
        ]);
        let mut new = old.clone();
        new.items[1].source_ref = "https://b2".into();
        assert!(!old.requires_restart(&new, Some(0)));
        assert!(old.requires_restart(&new, Some(1)));
    }

    #[test]
    fn test_count_change_forces_restart() {
        let old = playlist(vec![ScheduledItem::new("a", "https://a", 10)]);
        let mut new = old.clone();
        new.items.push(ScheduledItem::new("b", "https://b", 10));
        assert!(old.requires_restart(&new, Some(0)));
        assert!(old.requires_restart(&old.clone(), None));
    }

    #[test]
    fn test_deserialize_wire_item() {
        let json = r#"{"id":7,"url":"https://x/clip.mp4","duration":12,
            "orderIndex":3,"timeWindowStart":"09:00","timeWindowEnd":"17:00","daysOfWeek":[1,2]}"#;
        let item: ScheduledItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "7");
        assert_eq!(item.source_ref, "https://x/clip.mp4");
        assert_eq!(item.duration_seconds, 12);
        assert_eq!(item.days_of_week, Some(vec![1, 2]));
    }
}
