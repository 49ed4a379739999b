//! Vintage-year calendar
//!
//! The Southern Hemisphere growing season begins on 1 July and is named for
//! the calendar year of the following harvest: every date from 1 July 2025
//! through 30 June 2026 belongs to vintage 2026.

use chrono::{Datelike, NaiveDate};

/// First month of the vintage year (July)
pub const VINTAGE_START_MONTH: u32 = 7;

/// Vintage year a date belongs to
pub fn vintage_year(date: NaiveDate) -> i32 {
    if date.month() >= VINTAGE_START_MONTH {
        date.year() + 1
    } else {
        date.year()
    }
}

/// The 1 July on which a vintage year begins
pub fn vintage_start(vintage: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(vintage - 1, VINTAGE_START_MONTH, 1)
        .expect("1 July exists in every year")
}

/// 1-based day offset from the preceding 1 July
pub fn day_of_vintage(date: NaiveDate) -> i32 {
    (date - vintage_start(vintage_year(date))).num_days() as i32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn vintage_boundary() {
        assert_eq!(vintage_year(date(2025, 6, 30)), 2025);
        assert_eq!(vintage_year(date(2025, 7, 1)), 2026);
        assert_eq!(vintage_year(date(2026, 1, 15)), 2026);
    }

    #[test]
    fn day_of_vintage_boundary() {
        assert_eq!(day_of_vintage(date(2025, 7, 1)), 1);
        assert_eq!(day_of_vintage(date(2025, 7, 2)), 2);
        assert_eq!(day_of_vintage(date(2026, 6, 30)), 365);
        // Vintage 2024 spans 29 February 2024
        assert_eq!(day_of_vintage(date(2024, 6, 30)), 366);
    }

    #[test]
    fn vintage_start_is_previous_july() {
        assert_eq!(vintage_start(2026), date(2025, 7, 1));
        assert_eq!(vintage_start(2000), date(1999, 7, 1));
    }

    proptest! {
        #[test]
        fn day_of_vintage_in_range(days in 0i64..20_000) {
            let d = date(1980, 1, 1) + chrono::Duration::days(days);
            let dov = day_of_vintage(d);
            prop_assert!((1..=366).contains(&dov));
        }

        #[test]
        fn vintage_contains_its_own_start(vintage in 1950i32..2100) {
            let start = vintage_start(vintage);
            prop_assert_eq!(vintage_year(start), vintage);
            prop_assert_eq!(day_of_vintage(start), 1);
        }

        #[test]
        fn consecutive_days_same_vintage_increment(days in 0i64..20_000) {
            let d = date(1980, 1, 1) + chrono::Duration::days(days);
            let next = d + chrono::Duration::days(1);
            if vintage_year(d) == vintage_year(next) {
                prop_assert_eq!(day_of_vintage(next), day_of_vintage(d) + 1);
            } else {
                prop_assert_eq!(day_of_vintage(next), 1);
            }
        }
    }
}
