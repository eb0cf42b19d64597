//! Water and sewer projections over the `water` and `sewer` sections

use super::projection::{as_number, is_truthy};
use crate::rates::RateDocument;
use serde_json::{Map, Value};

fn section<'a>(doc: &'a RateDocument, key: &str) -> Option<&'a Map<String, Value>> {
    doc.get(key)
        .filter(|v| is_truthy(v))
        .and_then(Value::as_object)
}

fn section_number(doc: &RateDocument, key: &str, field: &str) -> Option<f64> {
    section(doc, key)?.get(field).and_then(as_number)
}

pub fn water_use_rate(doc: &RateDocument) -> Option<f64> {
    section_number(doc, "water", "use_rate")
}

pub fn water_base_charge(doc: &RateDocument) -> Option<f64> {
    section_number(doc, "water", "base_charge")
}

/// Unknown whenever the document carries no (or an empty) `sewer` section
pub fn sewer_use_rate(doc: &RateDocument) -> Option<f64> {
    section_number(doc, "sewer", "use_rate")
}

pub fn sewer_base_charge(doc: &RateDocument) -> Option<f64> {
    section_number(doc, "sewer", "base_charge")
}

fn field(section: Option<&Map<String, Value>>, key: &str) -> Value {
    section
        .and_then(|s| s.get(key))
        .cloned()
        .unwrap_or(Value::Null)
}

pub fn water_usage_attributes(doc: Option<&RateDocument>, provider_key: &str) -> Map<String, Value> {
    let water = doc.and_then(|d| section(d, "water"));
    let mut attrs = Map::new();
    for key in ["use_rate_unit", "default_meter_size", "effective_date"] {
        attrs.insert(key.to_string(), field(water, key));
    }
    attrs.insert("provider".to_string(), Value::String(provider_key.to_string()));
    if let Some(sizes) = water
        .and_then(|w| w.get("meter_sizes"))
        .filter(|v| is_truthy(v))
    {
        attrs.insert("meter_sizes".to_string(), sizes.clone());
    }
    attrs
}

pub fn sewer_usage_attributes(doc: Option<&RateDocument>) -> Map<String, Value> {
    let sewer = doc.and_then(|d| section(d, "sewer"));
    let mut attrs = Map::new();
    for key in ["use_rate_unit", "effective_date"] {
        attrs.insert(key.to_string(), field(sewer, key));
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::ProviderType;
    use serde_json::json;

    fn doc(value: Value) -> RateDocument {
        RateDocument::parse(value, ProviderType::Water).unwrap()
    }

    #[test]
    fn test_water_without_sewer() {
        let d = doc(json!({"water": {"use_rate": 0.004, "base_charge": 15.0}}));
        assert_eq!(water_use_rate(&d), Some(0.004));
        assert_eq!(water_base_charge(&d), Some(15.0));
        assert_eq!(sewer_use_rate(&d), None);
        assert_eq!(sewer_base_charge(&d), None);
    }

    #[test]
    fn test_empty_or_null_sewer_is_absent() {
        let d = doc(json!({"water": {}, "sewer": {}}));
        assert_eq!(sewer_use_rate(&d), None);
        let d = doc(json!({"water": {}, "sewer": null}));
        assert_eq!(sewer_base_charge(&d), None);
    }

    #[test]
    fn test_sewer_values() {
        let d = doc(json!({
            "water": {"use_rate": "0.005"},
            "sewer": {"use_rate": 0.006, "base_charge": "bad", "use_rate_unit": "USD/gal"}
        }));
        assert_eq!(water_use_rate(&d), Some(0.005));
        assert_eq!(sewer_use_rate(&d), Some(0.006));
        assert_eq!(sewer_base_charge(&d), None);
        assert_eq!(sewer_usage_attributes(Some(&d))["use_rate_unit"], json!("USD/gal"));
    }

    #[test]
    fn test_water_attributes() {
        let d = doc(json!({"water": {
            "use_rate_unit": "USD/gal",
            "default_meter_size": "5/8\"",
            "effective_date": "2024-07-01",
            "meter_sizes": {"5/8\"": 15.0, "1\"": 25.0}
        }}));
        let attrs = water_usage_attributes(Some(&d), "whud");
        assert_eq!(attrs["use_rate_unit"], json!("USD/gal"));
        assert_eq!(attrs["effective_date"], json!("2024-07-01"));
        assert_eq!(attrs["provider"], json!("whud"));
        assert_eq!(attrs["meter_sizes"]["1\""], json!(25.0));

        let bare = doc(json!({"water": {"meter_sizes": {}}}));
        let attrs = water_usage_attributes(Some(&bare), "whud");
        assert!(!attrs.contains_key("meter_sizes"));
        assert_eq!(attrs["default_meter_size"], Value::Null);
    }
}
