use crate::error::{Result, UtilityCostsError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of utility a provider bills for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    Electric,
    Water,
}

impl ProviderType {
    pub const ALL: [Self; 2] = [Self::Electric, Self::Water];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electric => "electric",
            Self::Water => "water",
        }
    }

    /// Human label used in titles and the wizard's type selector
    pub fn label(&self) -> &'static str {
        match self {
            Self::Electric => "Electric",
            Self::Water => "Water",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "electric" => Some(Self::Electric),
            "water" => Some(Self::Water),
            _ => None,
        }
    }

    /// Top-level key a rates response must carry
    pub fn required_key(&self) -> &'static str {
        match self {
            Self::Electric => "rates",
            Self::Water => "water",
        }
    }

    /// Path of the rates endpoint for a provider, relative to the base URL
    pub fn rates_path(&self, provider_key: &str) -> String {
        match self {
            Self::Electric => format!("/rates/{}/residential", provider_key),
            Self::Water => format!("/water/rates/{}", provider_key),
        }
    }

    /// Path of the provider discovery endpoint
    pub fn discovery_path(&self) -> &'static str {
        match self {
            Self::Electric => "/providers",
            Self::Water => "/water/providers",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip trailing slashes so paths can be appended verbatim
pub fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

/// One polling target, captured by the setup wizard and never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProviderConfig {
    #[serde(rename = "api_url")]
    pub base_url: String,

    #[serde(rename = "api_token", default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(rename = "provider")]
    pub provider_key: String,

    #[serde(default)]
    pub provider_type: ProviderType,
}

impl ProviderConfig {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        provider_key: impl Into<String>,
        provider_type: ProviderType,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.filter(|t| !t.trim().is_empty()),
            provider_key: provider_key.into(),
            provider_type,
        }
    }

    pub fn rates_url(&self) -> String {
        format!(
            "{}{}",
            normalize_base_url(&self.base_url),
            self.provider_type.rates_path(&self.provider_key)
        )
    }

    /// Identity used to reject duplicate setups of the same target
    pub fn unique_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.provider_type, self.provider_key, self.base_url
        )
    }

    /// Copy safe to hand out over the API
    pub fn redacted(&self) -> Self {
        Self {
            token: self.token.as_ref().map(|_| "**REDACTED**".to_string()),
            ..self.clone()
        }
    }
}

/// Last successfully parsed rates response for one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RateDocument(Map<String, Value>);

impl RateDocument {
    /// Accept a response body, enforcing the object shape and required key
    pub fn parse(value: Value, provider_type: ProviderType) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(UtilityCostsError::schema("Response is not a JSON object"));
        };
        let key = provider_type.required_key();
        if !map.contains_key(key) {
            return Err(UtilityCostsError::schema(format!(
                "Response missing '{}' key - backend may not support this provider",
                key
            )));
        }
        Ok(Self(map))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Walk nested objects; `None` as soon as a segment is absent or not an object
    pub fn path(&self, segments: &[&str]) -> Option<&Value> {
        let (first, rest) = segments.split_first()?;
        let mut current = self.0.get(*first)?;
        for segment in rest {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }

    /// Top-level string field, if present and a string
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}
