//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API.

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::InvalidId(format!("invalid {label} id")))
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Whole calendar months elapsed from `from` to `to`.
///
/// A month only counts once the day-of-month (and time of day) of `from` has
/// been reached again. A start day the target month does not have is clamped
/// to that month's last day, so 30 Nov to 28 Feb is three months. Returns 0
/// when `to` is not after `from`.
pub(crate) fn whole_months_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i32 {
    if to <= from {
        return 0;
    }
    let mut months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    let clamped = is_last_day_of_month(to) && from.day() > to.day();
    let day_not_reached = !clamped && (to.day(), to.time()) < (from.day(), from.time());
    if day_not_reached {
        months -= 1;
    }
    months.max(0)
}

fn is_last_day_of_month(at: DateTime<Utc>) -> bool {
    at.date_naive()
        .succ_opt()
        .is_none_or(|next| next.month() != at.month())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn counts_whole_months_only() {
        assert_eq!(whole_months_between(at(2025, 1, 15), at(2025, 7, 15)), 6);
        assert_eq!(whole_months_between(at(2025, 1, 15), at(2025, 7, 14)), 5);
        assert_eq!(whole_months_between(at(2023, 3, 1), at(2025, 3, 1)), 24);
    }

    #[test]
    fn short_months_clamp_the_start_day() {
        assert_eq!(whole_months_between(at(2024, 11, 30), at(2025, 2, 28)), 3);
        assert_eq!(whole_months_between(at(2024, 11, 30), at(2025, 2, 27)), 2);
        assert_eq!(whole_months_between(at(2025, 1, 31), at(2025, 2, 28)), 1);
        assert_eq!(whole_months_between(at(2024, 1, 31), at(2024, 2, 28)), 0);
        assert_eq!(whole_months_between(at(2024, 1, 31), at(2024, 2, 29)), 1);
        assert_eq!(whole_months_between(at(2025, 1, 31), at(2025, 4, 30)), 3);
        assert_eq!(whole_months_between(at(2025, 1, 30), at(2025, 4, 30)), 3);
    }

    #[test]
    fn never_negative() {
        assert_eq!(whole_months_between(at(2025, 7, 1), at(2025, 1, 1)), 0);
        assert_eq!(whole_months_between(at(2025, 7, 1), at(2025, 7, 1)), 0);
    }

    #[test]
    fn normalize_drops_blank_text() {
        assert_eq!(normalize_optional_text(Some("  ")), None);
        assert_eq!(
            normalize_optional_text(Some(" emi ")),
            Some("emi".to_string())
        );
    }
}
