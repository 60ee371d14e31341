//! Time-of-day windows and day-of-week sets restricting when an item shows.

use crate::playlist::ScheduledItem;
use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};
use tracing::warn;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Seconds since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    /// Parses `HH:MM` or `HH:MM:SS`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let time = NaiveTime::parse_from_str(value, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
            .ok()?;
        Some(Self::from_time(time))
    }

    pub fn from_time(time: NaiveTime) -> Self {
        Self(time.num_seconds_from_midnight())
    }

    pub fn seconds(self) -> u32 {
        self.0
    }
}

/// Daily `[start, end)` range. `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeWindow {
    pub fn is_overnight(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, now: TimeOfDay) -> bool {
        if self.is_overnight() {
            now >= self.start || now < self.end
        } else {
            now >= self.start && now < self.end
        }
    }

    /// Milliseconds from `now` until the window closes; zero or negative
    /// when it already closed today.
    pub fn millis_until_end(&self, now: NaiveTime) -> i64 {
        let now_ms = i64::from(now.num_seconds_from_midnight()) * 1000
            + i64::from(now.nanosecond() / 1_000_000).min(999);
        let end_ms = i64::from(self.end.seconds()) * 1000;
        let start_ms = i64::from(self.start.seconds()) * 1000;

        if self.is_overnight() && now_ms >= start_ms {
            SECONDS_PER_DAY * 1000 - now_ms + end_ms
        } else {
            end_ms - now_ms
        }
    }
}

/// Parsed scheduling constraints of one item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemConstraints {
    pub window: Option<TimeWindow>,
    /// Bit `n` set means day `n` (0 = Sunday) is allowed; `None` means every day.
    pub days: Option<u8>,
}

impl ItemConstraints {
    pub fn from_item(item: &ScheduledItem) -> Self {
        Self {
            window: parse_window(item),
            days: parse_days(item),
        }
    }

    pub fn is_allowed_at(&self, now: NaiveDateTime) -> bool {
        if let Some(days) = self.days {
            let today = now.weekday().num_days_from_sunday();
            if days & (1 << today) == 0 {
                return false;
            }
        }
        match self.window {
            Some(window) => window.contains(TimeOfDay::from_time(now.time())),
            None => true,
        }
    }
}

fn parse_window(item: &ScheduledItem) -> Option<TimeWindow> {
    let start = item.time_window_start.as_deref().filter(|s| !s.trim().is_empty());
    let end = item.time_window_end.as_deref().filter(|s| !s.trim().is_empty());

    match (start, end) {
        (None, None) => None,
        (Some(start), Some(end)) => match (TimeOfDay::parse(start), TimeOfDay::parse(end)) {
            (Some(start), Some(end)) if start != end => Some(TimeWindow { start, end }),
            (Some(_), Some(_)) => {
                warn!(item = %item.id, "Empty time window ignored");
                None
            }
            _ => {
                warn!(item = %item.id, start, end, "Unparsable time window ignored");
                None
            }
        },
        _ => {
            warn!(item = %item.id, "Half-specified time window ignored");
            None
        }
    }
}

fn parse_days(item: &ScheduledItem) -> Option<u8> {
    let days = item.days_of_week.as_ref().filter(|d| !d.is_empty())?;
    let mut mask = 0u8;
    for &day in days {
        if day > 6 {
            warn!(item = %item.id, day, "Day of week out of range ignored");
            continue;
        }
        mask |= 1 << day;
    }
    if mask == 0 {
        None
    } else {
        Some(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        // 2024-01-03 is a Wednesday.
        NaiveDate::from_ymd_opt(2024, 1, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(TimeOfDay::parse("09:30").unwrap().seconds(), 9 * 3600 + 30 * 60);
        assert_eq!(TimeOfDay::parse("23:59:59").unwrap().seconds(), 86399);
        assert!(TimeOfDay::parse("25:00").is_none());
        assert!(TimeOfDay::parse("noon").is_none());
    }

    #[test]
    fn test_day_window() {
        let item = ScheduledItem::new("a", "https://a", 10).with_window("09:00", "17:00");
        let c = ItemConstraints::from_item(&item);
        assert!(c.is_allowed_at(at(9, 0)));
        assert!(c.is_allowed_at(at(16, 59)));
        assert!(!c.is_allowed_at(at(17, 0)));
        assert!(!c.is_allowed_at(at(20, 0)));
        assert_eq!(c.window.unwrap().millis_until_end(at(16, 0).time()), 3_600_000);
        assert!(c.window.unwrap().millis_until_end(at(18, 0).time()) < 0);
    }

    #[test]
    fn test_overnight_window() {
        let item = ScheduledItem::new("a", "https://a", 10).with_window("22:00", "06:00");
        let c = ItemConstraints::from_item(&item);
        let window = c.window.unwrap();
        assert!(c.is_allowed_at(at(23, 0)));
        assert!(c.is_allowed_at(at(5, 0)));
        assert!(!c.is_allowed_at(at(12, 0)));
        assert_eq!(window.millis_until_end(at(23, 0).time()), 7 * 3_600_000);
        assert_eq!(window.millis_until_end(at(5, 0).time()), 3_600_000);
    }

    #[test]
    fn test_days_of_week() {
        let item = ScheduledItem::new("a", "https://a", 10).with_days(&[1, 3]);
        assert!(ItemConstraints::from_item(&item).is_allowed_at(at(12, 0)));
        let item = ScheduledItem::new("a", "https://a", 10).with_days(&[0, 6]);
        assert!(!ItemConstraints::from_item(&item).is_allowed_at(at(12, 0)));
    }

    #[test]
    fn test_malformed_constraints_are_ignored() {
        let mut item = ScheduledItem::new("a", "https://a", 10);
        item.time_window_start = Some("09:00".into());
        assert_eq!(ItemConstraints::from_item(&item), ItemConstraints::default());

        let item = ScheduledItem::new("a", "https://a", 10).with_window("nine", "17:00");
        assert!(ItemConstraints::from_item(&item).window.is_none());

        let item = ScheduledItem::new("a", "https://a", 10).with_days(&[]);
        assert!(ItemConstraints::from_item(&item).days.is_none());
    }
}
