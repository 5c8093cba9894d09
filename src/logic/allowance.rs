use crate::model::{AllowanceBreakdown, AllowanceRates, LocationCategory, SessionPolicy};

/// Rule-based allowance calculator.
///
/// Pure: the same (rates, distance, session, is_secondary) inputs always
/// produce the same breakdown, and `total` is always the literal sum of
/// the five components.
pub fn calculate_allowance(
    rates: &AllowanceRates,
    distance_km: f64,
    session: &SessionPolicy,
    is_secondary: bool,
) -> AllowanceBreakdown {
    let location_category = if distance_km <= session.inside_distance_threshold_km {
        LocationCategory::Inside
    } else {
        LocationCategory::Outside
    };

    // Dependents on merged groups carry no allowance at all; the category
    // is still computed for display.
    if is_secondary {
        return AllowanceBreakdown::zero(location_category);
    }

    let mut breakdown = AllowanceBreakdown::zero(location_category);

    match location_category {
        LocationCategory::Inside => {
            breakdown.local_running = rates.local_running_rate();
        }
        LocationCategory::Outside => {
            breakdown.transport = rates.transport_per_km() * distance_km;
            breakdown.tetfund = rates.tetfund_rate();

            let in_dsa_band = session.dsa_enabled
                && distance_km >= session.dsa_min_distance_km
                && distance_km <= session.dsa_max_distance_km;
            if in_dsa_band {
                breakdown.dsa = rates.dta_rate() * session.dsa_percentage / 100.0;
            } else {
                breakdown.dta = rates.dta_rate();
            }
        }
    }

    breakdown.total = breakdown.component_sum();
    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(threshold: f64) -> SessionPolicy {
        SessionPolicy {
            id: "sess-1".to_string(),
            institution_id: "inst-1".to_string(),
            name: "2024/2025".to_string(),
            max_posting_per_supervisor: Some(3),
            max_supervision_visits: 3,
            inside_distance_threshold_km: threshold,
            dsa_enabled: false,
            dsa_min_distance_km: 0.0,
            dsa_max_distance_km: 0.0,
            dsa_percentage: 0.0,
            active: true,
        }
    }

    fn rates() -> AllowanceRates {
        AllowanceRates {
            transport_per_km: Some(50.0),
            dta_rate: Some(1000.0),
            tetfund_rate: Some(2000.0),
            local_running_rate: Some(1500.0),
        }
    }

    #[test]
    fn inside_threshold_pays_local_running_only() {
        let breakdown = calculate_allowance(&rates(), 5.0, &session(10.0), false);
        assert_eq!(breakdown.location_category, LocationCategory::Inside);
        assert_eq!(breakdown.local_running, 1500.0);
        assert_eq!(breakdown.transport, 0.0);
        assert_eq!(breakdown.dsa, 0.0);
        assert_eq!(breakdown.dta, 0.0);
        assert_eq!(breakdown.tetfund, 0.0);
        assert_eq!(breakdown.total, 1500.0);
    }

    #[test]
    fn outside_with_dsa_band_swaps_dta_for_dsa() {
        let mut sess = session(10.0);
        sess.dsa_enabled = true;
        sess.dsa_min_distance_km = 11.0;
        sess.dsa_max_distance_km = 30.0;
        sess.dsa_percentage = 50.0;

        let breakdown = calculate_allowance(&rates(), 20.0, &sess, false);
        assert_eq!(breakdown.dsa, 500.0);
        assert_eq!(breakdown.dta, 0.0);
        assert_eq!(breakdown.transport, 50.0 * 20.0);
        assert_eq!(breakdown.tetfund, 2000.0);
        assert_eq!(breakdown.local_running, 0.0);
        assert_eq!(breakdown.total, breakdown.component_sum());
    }

    #[test]
    fn outside_past_dsa_band_pays_full_dta() {
        let mut sess = session(10.0);
        sess.dsa_enabled = true;
        sess.dsa_min_distance_km = 11.0;
        sess.dsa_max_distance_km = 30.0;
        sess.dsa_percentage = 50.0;

        let breakdown = calculate_allowance(&rates(), 45.0, &sess, false);
        assert_eq!(breakdown.dsa, 0.0);
        assert_eq!(breakdown.dta, 1000.0);
        assert_eq!(breakdown.transport, 50.0 * 45.0);
    }

    #[test]
    fn dsa_disabled_pays_dta_even_inside_band() {
        let mut sess = session(10.0);
        sess.dsa_min_distance_km = 11.0;
        sess.dsa_max_distance_km = 30.0;
        sess.dsa_percentage = 50.0;

        let breakdown = calculate_allowance(&rates(), 20.0, &sess, false);
        assert_eq!(breakdown.dsa, 0.0);
        assert_eq!(breakdown.dta, 1000.0);
    }

    #[test]
    fn secondary_zeroes_everything_but_keeps_category() {
        let breakdown = calculate_allowance(&rates(), 80.0, &session(10.0), true);
        assert_eq!(breakdown.location_category, LocationCategory::Outside);
        assert_eq!(breakdown.total, 0.0);
        assert_eq!(breakdown.component_sum(), 0.0);
    }

    #[test]
    fn missing_rates_produce_zero_components_not_nan() {
        let breakdown =
            calculate_allowance(&AllowanceRates::default(), 20.0, &session(10.0), false);
        assert_eq!(breakdown.transport, 0.0);
        assert_eq!(breakdown.dta, 0.0);
        assert_eq!(breakdown.tetfund, 0.0);
        assert_eq!(breakdown.total, 0.0);
        assert!(breakdown.total.is_finite());
    }

    #[test]
    fn calculator_is_deterministic() {
        let a = calculate_allowance(&rates(), 20.0, &session(10.0), false);
        let b = calculate_allowance(&rates(), 20.0, &session(10.0), false);
        assert_eq!(a, b);
    }
}
