//! Agro-climatic index math
//!
//! Pure daily-term functions; the aggregation job owns the per-vintage
//! accumulation and persistence of GDD. The Huglin Index is exported for
//! climate classification but has no persisted column.

use rust_decimal::Decimal;

/// Conventional GDD base temperatures (°C)
pub fn gdd_base_zero() -> Decimal {
    Decimal::ZERO
}

pub fn gdd_base_ten() -> Decimal {
    Decimal::TEN
}

/// Growing Degree Days for one day: `max(0, (Tmax + Tmin)/2 − base)`
pub fn gdd_day(tmax: Decimal, tmin: Decimal, base: Decimal) -> Decimal {
    ((tmax + tmin) / Decimal::TWO - base).max(Decimal::ZERO)
}

/// Huglin latitude coefficient, from the banded table over absolute latitude
pub fn huglin_coefficient(latitude: Decimal) -> Decimal {
    let lat = latitude.abs();
    if lat <= Decimal::from(40) {
        Decimal::ONE
    } else if lat <= Decimal::from(42) {
        Decimal::new(102, 2)
    } else if lat <= Decimal::from(44) {
        Decimal::new(103, 2)
    } else if lat <= Decimal::from(46) {
        Decimal::new(104, 2)
    } else if lat <= Decimal::from(48) {
        Decimal::new(105, 2)
    } else {
        Decimal::new(106, 2)
    }
}

/// Huglin Index daily term: `max(0, ((Tmean−10) + (Tmax−10))/2 × K)`
///
/// Days with mean temperature at or below 10 °C contribute nothing.
pub fn huglin_day(tmean: Decimal, tmax: Decimal, k: Decimal) -> Decimal {
    if tmean <= Decimal::TEN {
        return Decimal::ZERO;
    }
    (((tmean - Decimal::TEN) + (tmax - Decimal::TEN)) / Decimal::TWO * k).max(Decimal::ZERO)
}

/// Seasonal Huglin Index over (Tmean, Tmax) day pairs
pub fn huglin_sum<I>(days: I, k: Decimal) -> Decimal
where
    I: IntoIterator<Item = (Decimal, Decimal)>,
{
    days.into_iter()
        .map(|(tmean, tmax)| huglin_day(tmean, tmax, k))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn gdd_base10_example() {
        // Tmax=28, Tmin=14 -> mean 21 -> 11 above base 10
        assert_eq!(gdd_day(dec("28"), dec("14"), gdd_base_ten()), dec("11"));
    }

    #[test]
    fn gdd_clamps_at_zero() {
        assert_eq!(gdd_day(dec("8"), dec("2"), gdd_base_ten()), Decimal::ZERO);
        // mean exactly at base
        assert_eq!(gdd_day(dec("12"), dec("8"), gdd_base_ten()), Decimal::ZERO);
    }

    #[test]
    fn huglin_gated_on_mean_temperature() {
        let k = dec("1.03");
        assert_eq!(huglin_day(dec("10"), dec("18"), k), Decimal::ZERO);
        assert_eq!(huglin_day(dec("15"), dec("20"), k), dec("7.5") * k);
    }

    #[test]
    fn huglin_coefficient_bands() {
        assert_eq!(huglin_coefficient(dec("-38.5")), dec("1"));
        assert_eq!(huglin_coefficient(dec("-41.5")), dec("1.02"));
        assert_eq!(huglin_coefficient(dec("-43.6")), dec("1.03"));
        assert_eq!(huglin_coefficient(dec("-45.0")), dec("1.04"));
        assert_eq!(huglin_coefficient(dec("-52.0")), dec("1.06"));
    }

    #[test]
    fn huglin_sum_skips_cold_days() {
        let k = dec("1.02");
        let days = vec![
            (dec("9"), dec("14")),  // below gate, ignored
            (dec("15"), dec("20")), // 7.5 * k
            (dec("12"), dec("16")), // 4.0 * k
        ];
        assert_eq!(huglin_sum(days, k), dec("11.5") * k);
    }

    proptest! {
        #[test]
        fn gdd_never_negative(
            tmax in -400i64..500,
            spread in 0i64..300,
            base in 0i64..150,
        ) {
            let tmax = Decimal::new(tmax, 1);
            let tmin = tmax - Decimal::new(spread, 1);
            let base = Decimal::new(base, 1);
            prop_assert!(gdd_day(tmax, tmin, base) >= Decimal::ZERO);
        }

        #[test]
        fn gdd_zero_iff_mean_at_or_below_base(
            tmax in -400i64..500,
            spread in 0i64..300,
            base in 0i64..150,
        ) {
            let tmax = Decimal::new(tmax, 1);
            let tmin = tmax - Decimal::new(spread, 1);
            let base = Decimal::new(base, 1);
            let mean = (tmax + tmin) / Decimal::TWO;
            if mean <= base {
                prop_assert_eq!(gdd_day(tmax, tmin, base), Decimal::ZERO);
            } else {
                prop_assert!(gdd_day(tmax, tmin, base) > Decimal::ZERO);
            }
        }

        #[test]
        fn huglin_day_never_negative(
            tmean in -200i64..400,
            spread in 0i64..200,
            lat in -550i64..0,
        ) {
            let tmean = Decimal::new(tmean, 1);
            let tmax = tmean + Decimal::new(spread, 1);
            let k = huglin_coefficient(Decimal::new(lat, 1));
            prop_assert!(huglin_day(tmean, tmax, k) >= Decimal::ZERO);
        }
    }
}
