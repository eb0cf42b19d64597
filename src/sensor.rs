//! Sensors projected from a provider's cached rate document
//!
//! A sensor holds no network state. Its value is a pure function of the
//! [`RateSource`] it is read against and the current time, so any sensor
//! works against any coordinator and the same document always projects to
//! the same values.

pub mod electric;
pub mod projection;
pub mod water;

use crate::coordinator::RateSource;
use crate::rates::{ProviderConfig, ProviderType, RateDocument};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Projected value of a sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Number(f64),
    Timestamp(DateTime<Utc>),
    /// Missing key, non-numeric value or unparseable timestamp
    Unknown,
}

impl SensorValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<Option<f64>> for SensorValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Unknown, Self::Number)
    }
}

impl From<Option<DateTime<Utc>>> for SensorValue {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::Unknown, Self::Timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Monetary,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
}

/// Every sensor this service publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    TotalEnergyRate,
    FixedCustomerCharge,
    RatesLastRefresh,
    RatesAgeHours,
    EnergyPrice,
    DailyFixedCost,
    MonthlyFixedCost,
    WaterUsageRate,
    WaterBaseCharge,
    SewerUsageRate,
    SewerBaseCharge,
    WaterRatesLastRefresh,
    WaterRatesAgeHours,
}

impl SensorKind {
    pub const ELECTRIC: [Self; 7] = [
        Self::TotalEnergyRate,
        Self::FixedCustomerCharge,
        Self::RatesLastRefresh,
        Self::RatesAgeHours,
        Self::EnergyPrice,
        Self::DailyFixedCost,
        Self::MonthlyFixedCost,
    ];

    pub const WATER: [Self; 6] = [
        Self::WaterUsageRate,
        Self::WaterBaseCharge,
        Self::SewerUsageRate,
        Self::SewerBaseCharge,
        Self::WaterRatesLastRefresh,
        Self::WaterRatesAgeHours,
    ];

    pub fn for_provider_type(provider_type: ProviderType) -> &'static [Self] {
        match provider_type {
            ProviderType::Electric => &Self::ELECTRIC,
            ProviderType::Water => &Self::WATER,
        }
    }

    /// Stable suffix of the unique id
    pub fn key(&self) -> &'static str {
        match self {
            Self::TotalEnergyRate => "total_rate",
            Self::FixedCustomerCharge => "fixed_charge",
            Self::RatesLastRefresh => "last_refresh",
            Self::RatesAgeHours => "age_hours",
            Self::EnergyPrice => "energy_price",
            Self::DailyFixedCost => "daily_fixed_cost",
            Self::MonthlyFixedCost => "monthly_fixed_cost",
            Self::WaterUsageRate => "water_usage_rate",
            Self::WaterBaseCharge => "water_base_charge",
            Self::SewerUsageRate => "sewer_usage_rate",
            Self::SewerBaseCharge => "sewer_base_charge",
            Self::WaterRatesLastRefresh => "water_last_refresh",
            Self::WaterRatesAgeHours => "water_age_hours",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TotalEnergyRate => "Total energy rate",
            Self::FixedCustomerCharge => "Fixed customer charge",
            Self::RatesLastRefresh | Self::WaterRatesLastRefresh => "Rates last refresh",
            Self::RatesAgeHours | Self::WaterRatesAgeHours => "Rates age",
            Self::EnergyPrice => "Energy price",
            Self::DailyFixedCost => "Daily fixed cost",
            Self::MonthlyFixedCost => "Monthly fixed cost",
            Self::WaterUsageRate => "Water usage rate",
            Self::WaterBaseCharge => "Water base charge",
            Self::SewerUsageRate => "Sewer usage rate",
            Self::SewerBaseCharge => "Sewer base charge",
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Self::TotalEnergyRate | Self::EnergyPrice => Some("USD/kWh"),
            Self::FixedCustomerCharge
            | Self::DailyFixedCost
            | Self::MonthlyFixedCost
            | Self::WaterBaseCharge
            | Self::SewerBaseCharge => Some("USD"),
            Self::WaterUsageRate | Self::SewerUsageRate => Some("USD/gal"),
            Self::RatesAgeHours | Self::WaterRatesAgeHours => Some("h"),
            Self::RatesLastRefresh | Self::WaterRatesLastRefresh => None,
        }
    }

    pub fn device_class(&self) -> Option<DeviceClass> {
        match self {
            Self::RatesLastRefresh | Self::WaterRatesLastRefresh => Some(DeviceClass::Timestamp),
            Self::RatesAgeHours | Self::WaterRatesAgeHours => None,
            _ => Some(DeviceClass::Monetary),
        }
    }

    pub fn state_class(&self) -> Option<StateClass> {
        match self {
            Self::TotalEnergyRate
            | Self::RatesAgeHours
            | Self::EnergyPrice
            | Self::WaterUsageRate
            | Self::SewerUsageRate
            | Self::WaterRatesAgeHours => Some(StateClass::Measurement),
            _ => None,
        }
    }

    /// Project this sensor's value out of a document
    pub fn project(&self, doc: &RateDocument, now: DateTime<Utc>) -> SensorValue {
        match self {
            Self::TotalEnergyRate => electric::total_energy_rate(doc).into(),
            Self::EnergyPrice => electric::energy_price(doc).into(),
            Self::FixedCustomerCharge | Self::MonthlyFixedCost => {
                electric::monthly_customer_charge(doc).into()
            }
            Self::DailyFixedCost => electric::daily_fixed_cost(doc).into(),
            Self::WaterUsageRate => water::water_use_rate(doc).into(),
            Self::WaterBaseCharge => water::water_base_charge(doc).into(),
            Self::SewerUsageRate => water::sewer_use_rate(doc).into(),
            Self::SewerBaseCharge => water::sewer_base_charge(doc).into(),
            Self::RatesLastRefresh | Self::WaterRatesLastRefresh => fetched_at(doc).into(),
            Self::RatesAgeHours | Self::WaterRatesAgeHours => fetched_at(doc)
                .and_then(|at| projection::age_hours(at, now))
                .into(),
        }
    }

    fn attributes(&self, doc: Option<&RateDocument>, source: &dyn RateSource) -> Map<String, Value> {
        let provider_key = &source.provider().provider_key;
        match self {
            Self::TotalEnergyRate => {
                electric::total_rate_attributes(doc, provider_key, source.last_success())
            }
            Self::WaterUsageRate => water::water_usage_attributes(doc, provider_key),
            Self::SewerUsageRate => water::sewer_usage_attributes(doc),
            _ => Map::new(),
        }
    }
}

/// Top-level `fetched_at`, shared by the refresh and age sensors
pub fn fetched_at(doc: &RateDocument) -> Option<DateTime<Utc>> {
    doc.str_field("fetched_at")
        .and_then(projection::parse_timestamp)
}

/// One published sensor of a config entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensor {
    entry_id: String,
    provider_key: String,
    kind: SensorKind,
}

/// Everything a consumer needs to render a sensor
#[derive(Debug, Clone, Serialize)]
pub struct SensorState {
    pub unique_id: String,
    pub key: &'static str,
    pub name: &'static str,
    pub value: SensorValue,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub available: bool,
    pub attributes: Map<String, Value>,
}

impl Sensor {
    pub fn new(entry_id: impl Into<String>, provider_key: impl Into<String>, kind: SensorKind) -> Self {
        Self {
            entry_id: entry_id.into(),
            provider_key: provider_key.into(),
            kind,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn unique_id(&self) -> String {
        format!("{}_{}_{}", self.entry_id, self.provider_key, self.kind.key())
    }

    pub fn state(&self, source: &dyn RateSource, now: DateTime<Utc>) -> SensorState {
        let document = source.document();
        let value = document
            .as_deref()
            .map_or(SensorValue::Unknown, |doc| self.kind.project(doc, now));

        SensorState {
            unique_id: self.unique_id(),
            key: self.kind.key(),
            name: self.kind.name(),
            value,
            unit: self.kind.unit(),
            device_class: self.kind.device_class(),
            state_class: self.kind.state_class(),
            available: source.last_success(),
            attributes: self.kind.attributes(document.as_deref(), source),
        }
    }
}

/// The sensor set of a config entry, chosen by its provider type
pub fn sensors_for(entry_id: &str, provider: &ProviderConfig) -> Vec<Sensor> {
    SensorKind::for_provider_type(provider.provider_type)
        .iter()
        .map(|kind| Sensor::new(entry_id, &provider.provider_key, *kind))
        .collect()
}
