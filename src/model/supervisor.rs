use serde::{Deserialize, Serialize};

use crate::model::Id;

/// Per-rank allowance rates attached to a supervisor record.
///
/// Rates are optional at the data layer; anything missing is treated as
/// zero by the calculator, never as null/NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AllowanceRates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_per_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dta_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tetfund_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_running_rate: Option<f64>,
}

impl AllowanceRates {
    pub fn transport_per_km(&self) -> f64 {
        self.transport_per_km.unwrap_or(0.0)
    }

    pub fn dta_rate(&self) -> f64 {
        self.dta_rate.unwrap_or(0.0)
    }

    pub fn tetfund_rate(&self) -> f64 {
        self.tetfund_rate.unwrap_or(0.0)
    }

    pub fn local_running_rate(&self) -> f64 {
        self.local_running_rate.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supervisor {
    pub id: Id,
    pub institution_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faculty_id: Option<Id>,
    pub name: String,
    /// Lower value = higher rank. Used to bias assignment order when the
    /// priority flag is on.
    pub priority_number: i32,
    pub active: bool,
    pub is_staff: bool,
    pub rates: AllowanceRates,
}

/// Resolver output: a supervisor together with the posting count and the
/// capacity left at the moment the pool was computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibleSupervisor {
    pub supervisor: Supervisor,
    pub current_postings: i64,
    pub remaining_capacity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_rates_read_as_zero() {
        let rates = AllowanceRates::default();
        assert_eq!(rates.transport_per_km(), 0.0);
        assert_eq!(rates.dta_rate(), 0.0);
        assert_eq!(rates.tetfund_rate(), 0.0);
        assert_eq!(rates.local_running_rate(), 0.0);
    }

    #[test]
    fn rates_omit_missing_fields_in_json() {
        let rates = AllowanceRates {
            dta_rate: Some(1000.0),
            ..Default::default()
        };
        let json = serde_json::to_string(&rates).unwrap();
        assert!(json.contains("dta_rate"));
        assert!(!json.contains("transport_per_km"));
    }
}
