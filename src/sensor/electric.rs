//! Electric rate projections over `rates.residential_standard`

use super::projection::{as_number, is_truthy, round_to};
use crate::rates::RateDocument;
use serde_json::{Map, Value};

pub const ENERGY_RATE: &str = "energy_rate_usd_per_kwh";
pub const FUEL_RATE: &str = "tva_fuel_rate_usd_per_kwh";
pub const CUSTOMER_CHARGE: &str = "customer_charge_monthly_usd";

/// Days a monthly charge is spread over for the daily figure
const DAYS_PER_MONTH: f64 = 30.0;

/// The residential bucket, only when its `is_present` flag is truthy
pub fn residential_standard(doc: &RateDocument) -> Option<&Map<String, Value>> {
    let rs = doc
        .path(&["rates", "residential_standard"])?
        .as_object()?;
    rs.get("is_present")
        .is_some_and(is_truthy)
        .then_some(rs)
}

fn residential_number(doc: &RateDocument, field: &str) -> Option<f64> {
    residential_standard(doc)?.get(field).and_then(as_number)
}

/// Energy plus fuel rate in USD/kWh
pub fn total_energy_rate(doc: &RateDocument) -> Option<f64> {
    let energy = residential_number(doc, ENERGY_RATE)?;
    let fuel = residential_number(doc, FUEL_RATE)?;
    let total = energy + fuel;
    total.is_finite().then_some(total)
}

/// Total energy rate rounded for dashboards
pub fn energy_price(doc: &RateDocument) -> Option<f64> {
    total_energy_rate(doc).and_then(|total| round_to(total, 5))
}

pub fn monthly_customer_charge(doc: &RateDocument) -> Option<f64> {
    residential_number(doc, CUSTOMER_CHARGE)
}

pub fn daily_fixed_cost(doc: &RateDocument) -> Option<f64> {
    monthly_customer_charge(doc).and_then(|monthly| round_to(monthly / DAYS_PER_MONTH, 5))
}

/// Extra attributes published with the total energy rate
pub fn total_rate_attributes(
    doc: Option<&RateDocument>,
    provider_key: &str,
    last_success: bool,
) -> Map<String, Value> {
    let rs = doc.and_then(residential_standard);
    let rs_field = |key: &str| rs.and_then(|m| m.get(key)).cloned().unwrap_or(Value::Null);

    let mut attrs = Map::new();
    attrs.insert(ENERGY_RATE.to_string(), rs_field(ENERGY_RATE));
    attrs.insert(FUEL_RATE.to_string(), rs_field(FUEL_RATE));
    attrs.insert(CUSTOMER_CHARGE.to_string(), rs_field(CUSTOMER_CHARGE));

    for (attr, key) in [
        ("last_refresh", "fetched_at"),
        ("source", "source"),
        ("source_url", "source_url"),
        ("pdf_url", "pdf_url"),
    ] {
        if let Some(value) = doc.and_then(|d| d.get(key)).filter(|v| is_truthy(v)) {
            attrs.insert(attr.to_string(), value.clone());
        }
    }

    attrs.insert("last_refresh_ok".to_string(), Value::Bool(last_success));
    attrs.insert(
        "utility".to_string(),
        doc.and_then(|d| d.get("utility")).cloned().unwrap_or(Value::Null),
    );
    attrs.insert("provider".to_string(), Value::String(provider_key.to_string()));
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::ProviderType;
    use serde_json::json;

    fn doc(value: Value) -> RateDocument {
        RateDocument::parse(value, ProviderType::Electric).unwrap()
    }

    #[test]
    fn test_sum_and_rounding() {
        let d = doc(json!({"rates": {"residential_standard": {
            "is_present": true,
            "energy_rate_usd_per_kwh": 0.091234567,
            "tva_fuel_rate_usd_per_kwh": 0.020000001,
            "customer_charge_monthly_usd": 31.0
        }}}));
        let total = total_energy_rate(&d).unwrap();
        assert!((total - 0.111234568).abs() < 1e-12);
        assert_eq!(energy_price(&d), Some(0.11123));
        assert_eq!(daily_fixed_cost(&d), Some(1.03333));
        assert_eq!(monthly_customer_charge(&d), Some(31.0));
    }

    #[test]
    fn test_missing_fuel_rate_is_unknown() {
        let d = doc(json!({"rates": {"residential_standard": {
            "is_present": true,
            "energy_rate_usd_per_kwh": 0.09
        }}}));
        assert_eq!(total_energy_rate(&d), None);
        assert_eq!(energy_price(&d), None);
    }

    #[test]
    fn test_overflowing_sum_is_unknown() {
        let d = doc(json!({"rates": {"residential_standard": {
            "is_present": true,
            "energy_rate_usd_per_kwh": 1.7e308,
            "tva_fuel_rate_usd_per_kwh": 1.7e308,
            "customer_charge_monthly_usd": 1e305
        }}}));
        assert_eq!(total_energy_rate(&d), None);
        assert_eq!(energy_price(&d), None);
        assert_eq!(daily_fixed_cost(&d), round_to(1e305 / 30.0, 5));
        assert!(daily_fixed_cost(&d).is_some_and(f64::is_finite));
    }

    #[test]
    fn test_gate_requires_truthy_flag() {
        let d = doc(json!({"rates": {"residential_standard": {
            "energy_rate_usd_per_kwh": 0.09,
            "tva_fuel_rate_usd_per_kwh": 0.02
        }}}));
        assert!(residential_standard(&d).is_none());

        let d = doc(json!({"rates": {"residential_standard": "present"}}));
        assert!(residential_standard(&d).is_none());
    }

    #[test]
    fn test_attributes_only_include_present_urls() {
        let d = doc(json!({
            "rates": {"residential_standard": {"is_present": true, "energy_rate_usd_per_kwh": 0.1}},
            "fetched_at": "2024-01-01T00:00:00Z",
            "source": "",
            "pdf_url": "https://example.com/rates.pdf",
            "utility": "CEMC"
        }));
        let attrs = total_rate_attributes(Some(&d), "cemc", true);
        assert_eq!(attrs["energy_rate_usd_per_kwh"], json!(0.1));
        assert_eq!(attrs[FUEL_RATE], Value::Null);
        assert_eq!(attrs["last_refresh"], json!("2024-01-01T00:00:00Z"));
        assert!(!attrs.contains_key("source"));
        assert!(!attrs.contains_key("source_url"));
        assert_eq!(attrs["pdf_url"], json!("https://example.com/rates.pdf"));
        assert_eq!(attrs["last_refresh_ok"], json!(true));
        assert_eq!(attrs["utility"], json!("CEMC"));
        assert_eq!(attrs["provider"], json!("cemc"));
    }

    #[test]
    fn test_attributes_without_document() {
        let attrs = total_rate_attributes(None, "nes", false);
        assert_eq!(attrs[ENERGY_RATE], Value::Null);
        assert_eq!(attrs["last_refresh_ok"], json!(false));
        assert_eq!(attrs["provider"], json!("nes"));
    }
}
