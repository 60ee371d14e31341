//! Pure rotation logic: which item comes next and for how long it stays.

use crate::constraints::ItemConstraints;
use crate::playlist::{Playlist, ScheduledItem};
use chrono::NaiveDateTime;
use std::time::Duration;
use tracing::warn;

/// How long the item just chosen stays on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextDelay {
    /// Single permanent item: no rotation timer.
    Permanent,
    After(Duration),
    /// The item's window already closed: rotate without rendering.
    Immediate,
}

impl NextDelay {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            NextDelay::Permanent => None,
            NextDelay::After(d) => Some(*d),
            NextDelay::Immediate => Some(Duration::ZERO),
        }
    }
}

/// Scans forward from `cursor` (wrapping) for the first item allowed at
/// `now`, trying each item at most once.
pub fn find_next(playlist: &Playlist, cursor: usize, now: NaiveDateTime) -> Option<usize> {
    let len = playlist.len();
    if len == 0 {
        return None;
    }
    (0..len)
        .map(|offset| (cursor + offset) % len)
        .find(|&index| ItemConstraints::from_item(&playlist.items[index]).is_allowed_at(now))
}

/// Display duration of `item` in a playlist of `len` items.
///
/// Zero duration is permanent for a single item and falls back to
/// `zero_duration_fallback` otherwise. A time window shortens the delay so
/// the item never overstays it.
pub fn next_delay(
    item: &ScheduledItem,
    len: usize,
    now: NaiveDateTime,
    zero_duration_fallback: Duration,
) -> NextDelay {
    let base = match item.duration_seconds {
        0 if len <= 1 => None,
        0 => {
            warn!(
                item = %item.id,
                fallback = ?zero_duration_fallback,
                "Zero-duration item in a multi-item playlist, using fallback duration"
            );
            Some(zero_duration_fallback)
        }
        secs => Some(Duration::from_secs(secs)),
    };

    let Some(window) = ItemConstraints::from_item(item).window else {
        return base.map_or(NextDelay::Permanent, NextDelay::After);
    };

    let until_end = window.millis_until_end(now.time());
    if until_end <= 0 {
        return NextDelay::Immediate;
    }
    let until_end = Duration::from_millis(until_end as u64);
    match base {
        Some(delay) if delay <= until_end => NextDelay::After(delay),
        _ => NextDelay::After(until_end),
    }
}

/// Cursor position after stepping back over the current item to the one
/// before it. The cursor always points past the displayed item.
pub fn previous_cursor(cursor: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (cursor % len + 2 * len - 2) % len
}
