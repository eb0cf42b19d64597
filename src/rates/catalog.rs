use super::types::ProviderType;
use serde::Serialize;
use serde_json::Value;

/// One selectable provider in the setup wizard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProviderOption {
    pub label: String,
    pub key: String,
}

/// Ordered label -> key table of providers offered for one utility type
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProviderCatalog {
    options: Vec<ProviderOption>,
    /// True when the table came from the built-in fallback list
    pub fallback: bool,
}

const STATIC_ELECTRIC_PROVIDERS: &[(&str, &str)] = &[("CEMC", "cemc"), ("NES", "nes"), ("KUB", "kub")];
const STATIC_WATER_PROVIDERS: &[(&str, &str)] = &[("WHUD", "whud")];

impl ProviderCatalog {
    /// Built-in table used when discovery yields nothing usable
    pub fn fallback(provider_type: ProviderType) -> Self {
        let table = match provider_type {
            ProviderType::Electric => STATIC_ELECTRIC_PROVIDERS,
            ProviderType::Water => STATIC_WATER_PROVIDERS,
        };
        let mut catalog = Self {
            options: Vec::with_capacity(table.len()),
            fallback: true,
        };
        for (label, key) in table {
            catalog.insert(label, key);
        }
        catalog
    }

    /// Build from a `{"providers": [{"key", "name"}]}` discovery body
    pub fn from_discovery(body: &Value, provider_type: ProviderType) -> Self {
        let mut catalog = Self::default();
        let items = body
            .get("providers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for item in items {
            let Some(key) = item
                .get("key")
                .and_then(Value::as_str)
                .filter(|k| !k.is_empty())
            else {
                continue;
            };
            let label = item
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
                .unwrap_or(key);
            catalog.insert(label, key);
        }

        if catalog.is_empty() {
            return Self::fallback(provider_type);
        }
        catalog
    }

    /// Later duplicates of a label replace the key but keep the position
    fn insert(&mut self, label: &str, key: &str) {
        if let Some(existing) = self.options.iter_mut().find(|o| o.label == label) {
            existing.key = key.to_string();
        } else {
            self.options.push(ProviderOption {
                label: label.to_string(),
                key: key.to_string(),
            });
        }
    }

    pub fn key_for(&self, label: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.label == label)
            .map(|o| o.key.as_str())
    }

    pub fn labels(&self) -> Vec<String> {
        self.options.iter().map(|o| o.label.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }
}
