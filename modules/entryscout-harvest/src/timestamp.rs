//! Forum date text → UTC.
//!
//! Entries show either a relative day marker ("bugün 14:05", "dün 09:00") or an
//! absolute Turkish-style date ("09.05.2024 12:00", "09.05.2024"). Everything
//! else maps to `None`; an unreadable date never drops the entry.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::{OffsetComponents, Tz};

const TODAY: &str = "bugün";
const YESTERDAY: &str = "dün";

const CLOCK_FORMAT: &str = "%H:%M";
const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";
const DATE_FORMAT: &str = "%d.%m.%Y";

/// Normalize raw date text against `reference`, the current instant in the
/// forum's zone. Relative markers resolve against the reference's local
/// calendar date; wall-clock times use the zone's offset on that date.
pub fn normalize(raw: &str, reference: DateTime<Tz>) -> Option<DateTime<Utc>> {
    let text = raw.trim().to_lowercase();
    let zone = reference.timezone();

    if let Some(clock) = strip_marker(&text, TODAY) {
        let time = NaiveTime::parse_from_str(&clock, CLOCK_FORMAT).ok()?;
        return to_utc(reference.date_naive().and_time(time), zone);
    }

    if let Some(clock) = strip_marker(&text, YESTERDAY) {
        let time = NaiveTime::parse_from_str(&clock, CLOCK_FORMAT).ok()?;
        let day = reference.date_naive().checked_sub_signed(Duration::days(1))?;
        return to_utc(day.and_time(time), zone);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(&text, DATE_TIME_FORMAT) {
        return to_utc(naive, zone);
    }

    // A bare date carries no clock time to shift; it is kept as that calendar day.
    NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn strip_marker(text: &str, marker: &str) -> Option<String> {
    text.contains(marker)
        .then(|| text.replace(marker, "").trim().to_string())
}

/// Wall-clock time in `zone` to UTC. A repeated hour takes its standard-time
/// reading; a skipped hour is read at the offset in force before the jump.
fn to_utc(naive: NaiveDateTime, zone: Tz) -> Option<DateTime<Utc>> {
    let local = match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(first, second) => {
            if first.offset().dst_offset() == Duration::zero() {
                first
            } else {
                second
            }
        }
        LocalResult::None => {
            let shift = Duration::hours(6);
            let before = zone.from_local_datetime(&(naive - shift)).earliest()?;
            return Some(before.with_timezone(&Utc) + shift);
        }
    };
    Some(local.with_timezone(&Utc))
}
