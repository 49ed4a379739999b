//! Phenology forecasting tests
//!
//! Stage machine, projection conventions and baseline offsets are pure
//! over the season snapshot, pinned here without a database.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::{Confidence, Stage, VarietyThresholds};
use vineyard_climate_pipeline::services::phenology::{
    assess, current_stage, estimate_confidence, project_threshold, trailing_rate, SeasonSnapshot,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn pinot() -> VarietyThresholds {
    VarietyThresholds {
        variety_code: "PIN".to_string(),
        flowering: Some(dec("1180")),
        veraison: Some(dec("2380")),
        harvest: [
            Some(dec("2900")),
            Some(dec("2990")),
            Some(dec("3080")),
            Some(dec("3170")),
            Some(dec("3260")),
            Some(dec("3350")),
        ],
    }
}

fn season(cumulative: &str, rate: Option<&str>, days_with_data: i64) -> SeasonSnapshot {
    SeasonSnapshot {
        cumulative_gdd: dec(cumulative),
        trailing_rate: rate.map(dec),
        lookback_days_with_data: days_with_data,
        lookback_days: 14,
    }
}

// ============================================================================
// Stage machine
// ============================================================================

#[cfg(test)]
mod stage_tests {
    use super::*;

    #[test]
    fn stages_follow_thresholds_in_ascending_order() {
        let t = pinot();
        assert_eq!(current_stage(dec("0"), &t), Stage::PreFlowering);
        assert_eq!(current_stage(dec("1179.99"), &t), Stage::PreFlowering);
        assert_eq!(current_stage(dec("1180"), &t), Stage::Flowering);
        assert_eq!(current_stage(dec("2379"), &t), Stage::Flowering);
        assert_eq!(current_stage(dec("2380"), &t), Stage::Veraison);
        assert_eq!(current_stage(dec("2899"), &t), Stage::Veraison);
        assert_eq!(current_stage(dec("2900"), &t), Stage::Ripening);
        assert_eq!(current_stage(dec("3349"), &t), Stage::Ripening);
        assert_eq!(current_stage(dec("3350"), &t), Stage::HarvestReady);
        assert_eq!(current_stage(dec("9000"), &t), Stage::HarvestReady);
    }

    /// An unconfigured boundary is skipped, not treated as zero
    #[test]
    fn missing_thresholds_skip_their_boundary() {
        let mut t = pinot();
        t.veraison = None;
        assert_eq!(current_stage(dec("2000"), &t), Stage::Flowering);
        assert_eq!(current_stage(dec("2900"), &t), Stage::Ripening);

        let bare = VarietyThresholds {
            variety_code: "X".to_string(),
            flowering: None,
            veraison: None,
            harvest: [None; 6],
        };
        assert_eq!(current_stage(dec("5000"), &bare), Stage::PreFlowering);
    }

    #[test]
    fn single_harvest_threshold_goes_straight_to_harvest_ready() {
        let t = VarietyThresholds {
            variety_code: "X".to_string(),
            flowering: Some(dec("1000")),
            veraison: Some(dec("2000")),
            harvest: [Some(dec("3000")), None, None, None, None, None],
        };
        assert_eq!(current_stage(dec("2999"), &t), Stage::Veraison);
        assert_eq!(current_stage(dec("3000"), &t), Stage::HarvestReady);
    }
}

// ============================================================================
// Projection conventions
// ============================================================================

#[cfg(test)]
mod projection_tests {
    use super::*;

    /// Already-reached thresholds report the evaluation date itself:
    /// "occurred by this date", never a future projection
    #[test]
    fn reached_threshold_reports_the_evaluation_date() {
        let eval = date(2025, 11, 15);
        let projected = project_threshold(dec("420"), dec("400"), Some(dec("6")), eval);
        assert_eq!(projected, Some(eval));

        // exactly at the threshold counts as reached
        let projected = project_threshold(dec("400"), dec("400"), None, eval);
        assert_eq!(projected, Some(eval));
    }

    #[test]
    fn unreached_threshold_without_a_rate_stays_absent() {
        let eval = date(2025, 11, 15);
        assert_eq!(project_threshold(dec("380"), dec("400"), None, eval), None);
        assert_eq!(
            project_threshold(dec("380"), dec("400"), Some(dec("0")), eval),
            None
        );
    }

    #[test]
    fn linear_extrapolation_rounds_up_to_whole_days() {
        let eval = date(2025, 11, 15);
        // 100 GDD remaining at 8/day -> 12.5 -> 13 days out
        let projected = project_threshold(dec("300"), dec("400"), Some(dec("8")), eval);
        assert_eq!(projected, Some(date(2025, 11, 28)));

        // exact division needs no rounding
        let projected = project_threshold(dec("300"), dec("400"), Some(dec("10")), eval);
        assert_eq!(projected, Some(date(2025, 11, 25)));
    }

    #[test]
    fn trailing_rate_requires_positive_accumulation() {
        assert_eq!(trailing_rate(&[]), None);
        assert_eq!(trailing_rate(&[dec("0"), dec("0")]), None);
        assert_eq!(
            trailing_rate(&[dec("10"), dec("14"), dec("12")]),
            Some(dec("12"))
        );
    }
}

// ============================================================================
// Full assessment
// ============================================================================

#[cfg(test)]
mod assessment_tests {
    use super::*;

    /// Accumulated 420 GDD against a 400 flowering threshold on 15 Nov:
    /// flowering is dated 15 Nov, not projected forward
    #[test]
    fn flowering_already_reached_scenario() {
        let t = VarietyThresholds {
            variety_code: "PIN".to_string(),
            flowering: Some(dec("400")),
            veraison: Some(dec("1100")),
            harvest: [Some(dec("1400")), None, None, None, None, None],
        };
        let eval = date(2025, 11, 15);
        let result = assess(&season("420", Some("6"), 14), &t, None, eval);

        assert_eq!(result.flowering_date, Some(eval));
        assert_eq!(result.current_stage, Stage::Flowering);
        // remaining thresholds project forward at the trailing rate
        assert!(result.veraison_date.unwrap() > eval);
    }

    #[test]
    fn no_rate_leaves_unreached_projections_absent() {
        let result = assess(&season("1500", None, 0), &pinot(), None, date(2025, 12, 1));
        assert_eq!(result.current_stage, Stage::Flowering);
        assert_eq!(result.flowering_date, Some(date(2025, 12, 1)));
        assert_eq!(result.veraison_date, None);
        assert!(result.harvest_dates.iter().all(|d| d.is_none()));
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.days_vs_baseline, None);
    }

    #[test]
    fn baseline_offsets_in_gdd_and_days() {
        let eval = date(2026, 2, 1);
        let result = assess(
            &season("2500", Some("15"), 14),
            &pinot(),
            Some(dec("2440")),
            eval,
        );

        // 60 GDD ahead of the 20-year mean at this day-of-vintage
        assert_eq!(result.gdd_vs_baseline, Some(dec("60")));
        // at 15 GDD/day that is 4 days ahead
        assert_eq!(result.days_vs_baseline, Some(4));
    }

    #[test]
    fn behind_baseline_reads_negative() {
        let result = assess(
            &season("2400", Some("10"), 14),
            &pinot(),
            Some(dec("2450")),
            date(2026, 2, 1),
        );
        assert_eq!(result.gdd_vs_baseline, Some(dec("-50")));
        assert_eq!(result.days_vs_baseline, Some(-5));
    }

    #[test]
    fn confidence_tracks_window_coverage() {
        assert_eq!(estimate_confidence(14, 14, Some(dec("5"))), Confidence::High);
        assert_eq!(estimate_confidence(10, 14, Some(dec("5"))), Confidence::High);
        assert_eq!(estimate_confidence(9, 14, Some(dec("5"))), Confidence::Medium);
        assert_eq!(estimate_confidence(1, 14, Some(dec("5"))), Confidence::Medium);
        assert_eq!(estimate_confidence(14, 14, None), Confidence::Low);
    }

    #[test]
    fn harvest_family_projects_each_sugar_level() {
        let eval = date(2026, 3, 1);
        let result = assess(&season("3000", Some("10"), 14), &pinot(), None, eval);

        assert_eq!(result.harvest_dates.len(), shared::HARVEST_SUGAR_LEVELS.len());
        // 2900 and 2990 already reached, the rest project forward in order
        assert_eq!(result.harvest_dates[0], Some(eval));
        assert_eq!(result.harvest_dates[1], Some(eval));
        let upcoming: Vec<NaiveDate> = result.harvest_dates[2..]
            .iter()
            .flatten()
            .copied()
            .collect();
        assert_eq!(upcoming.len(), 4);
        for pair in upcoming.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(result.current_stage, Stage::Ripening);
    }
}

// ============================================================================
// Properties
// ============================================================================

#[cfg(test)]
mod phenology_properties {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Projections never land before the evaluation date
        #[test]
        fn projections_never_precede_evaluation(
            cumulative in 0i64..40_000,
            threshold in 0i64..40_000,
            rate in 1i64..300,
        ) {
            let eval = date(2025, 11, 15);
            let projected = project_threshold(
                Decimal::new(cumulative, 1),
                Decimal::new(threshold, 1),
                Some(Decimal::new(rate, 1)),
                eval,
            );
            let projected = projected.expect("positive rate always projects");
            prop_assert!(projected >= eval);
        }

        /// The stage is monotone in accumulated GDD
        #[test]
        fn stage_is_monotone_in_gdd(a in 0i64..45_000, b in 0i64..45_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let t = pinot();
            let stage_lo = current_stage(Decimal::new(lo, 1), &t);
            let stage_hi = current_stage(Decimal::new(hi, 1), &t);
            prop_assert!(stage_lo <= stage_hi);
        }

        /// Reached thresholds always report the evaluation date, regardless
        /// of the trailing rate
        #[test]
        fn reached_is_always_dated_today(excess in 0i64..5_000, rate in 0i64..300) {
            let eval = date(2026, 1, 20);
            let threshold = dec("1500");
            let cumulative = threshold + Decimal::new(excess, 1);
            let rate = (rate > 0).then(|| Decimal::new(rate, 1));
            prop_assert_eq!(
                project_threshold(cumulative, threshold, rate, eval),
                Some(eval)
            );
        }
    }
}
