//! Two-step setup wizard
//!
//! `user` collects the backend URL, an optional token and the utility type,
//! then asks the backend which providers it serves. `provider` takes one of
//! those labels, validates it against the rates endpoint and yields the data
//! for a new config entry.

use crate::error::UtilityCostsError;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::rates::{ProviderCatalog, ProviderConfig, ProviderType, RateFetcher};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

pub const FIELD_API_URL: &str = "api_url";
pub const FIELD_API_TOKEN: &str = "api_token";
pub const FIELD_PROVIDER_TYPE: &str = "provider_type";
pub const FIELD_PROVIDER: &str = "provider";

/// Form-level errors go under this key
pub const BASE_ERROR: &str = "base";

pub const ERROR_INVALID_INPUT: &str = "invalid_input";
pub const ERROR_CANNOT_CONNECT: &str = "cannot_connect";
pub const ERROR_INVALID_PROVIDER: &str = "invalid_provider";
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    User,
    Provider,
}

/// What the wizard asks the caller to do next
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    Form {
        step: FlowStep,
        errors: BTreeMap<String, String>,
        /// Selectable values: utility types on `user`, provider labels on `provider`
        options: Vec<String>,
        placeholders: BTreeMap<String, String>,
        defaults: BTreeMap<String, String>,
    },
    CreateEntry {
        title: String,
        data: ProviderConfig,
    },
    Abort {
        reason: String,
    },
}

impl FlowResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Form { .. })
    }

    /// `errors["base"]` of a form, if any
    pub fn base_error(&self) -> Option<&str> {
        match self {
            Self::Form { errors, .. } => errors.get(BASE_ERROR).map(String::as_str),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserInput {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub provider_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProviderInput {
    #[serde(default)]
    pub provider: String,
}

/// One in-progress wizard
pub struct SetupFlow {
    flow_id: String,
    fetcher: Arc<dyn RateFetcher>,
    default_api_url: String,
    step: FlowStep,
    api_url: Option<String>,
    api_token: Option<String>,
    provider_type: Option<ProviderType>,
    catalog: ProviderCatalog,
    logger: StructuredLogger,
}

impl SetupFlow {
    pub fn new(fetcher: Arc<dyn RateFetcher>, default_api_url: impl Into<String>) -> Self {
        let flow_id = Uuid::new_v4().to_string();
        let logger =
            get_logger_with_context(LogContext::new("setup").with_field("flow_id", flow_id.clone()));
        Self {
            flow_id,
            fetcher,
            default_api_url: default_api_url.into(),
            step: FlowStep::User,
            api_url: None,
            api_token: None,
            provider_type: None,
            catalog: ProviderCatalog::default(),
            logger,
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    /// Step the next `submit` is routed to
    pub fn step(&self) -> FlowStep {
        self.step
    }

    /// Provider table offered by the `provider` step
    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    /// Initial form
    pub fn start(&mut self) -> FlowResult {
        self.step = FlowStep::User;
        self.user_form(BTreeMap::new(), BTreeMap::new())
    }

    /// Route a raw JSON body to the current step
    pub async fn submit(&mut self, input: Value, configured: &HashSet<String>) -> FlowResult {
        match self.step {
            FlowStep::User => match serde_json::from_value::<UserInput>(input) {
                Ok(input) => self.step_user(Some(input)).await,
                Err(e) => {
                    self.logger.warn(&format!("Malformed user step input: {}", e));
                    self.user_form(base_error(ERROR_INVALID_INPUT), BTreeMap::new())
                }
            },
            FlowStep::Provider => match serde_json::from_value::<ProviderInput>(input) {
                Ok(input) => self.step_provider(Some(input), configured).await,
                Err(e) => {
                    self.logger
                        .warn(&format!("Malformed provider step input: {}", e));
                    self.provider_form(base_error(ERROR_INVALID_PROVIDER), BTreeMap::new())
                }
            },
        }
    }

    /// Step 1: backend URL, token and utility type
    pub async fn step_user(&mut self, input: Option<UserInput>) -> FlowResult {
        self.step = FlowStep::User;
        let Some(input) = input else {
            return self.user_form(BTreeMap::new(), BTreeMap::new());
        };

        let mut errors = BTreeMap::new();
        if input.api_url.trim().is_empty() {
            errors.insert(FIELD_API_URL.to_string(), ERROR_INVALID_INPUT.to_string());
        }
        let provider_type = ProviderType::from_label(&input.provider_type);
        if provider_type.is_none() {
            errors.insert(
                FIELD_PROVIDER_TYPE.to_string(),
                ERROR_INVALID_INPUT.to_string(),
            );
        }
        self.api_url = Some(input.api_url.clone());
        self.api_token = input.api_token.filter(|t| !t.trim().is_empty());
        self.provider_type = provider_type;

        let Some(provider_type) = provider_type.filter(|_| errors.is_empty()) else {
            return self.user_form(errors, BTreeMap::new());
        };

        match self
            .fetcher
            .discover_providers(&input.api_url, self.api_token.as_deref(), provider_type)
            .await
        {
            Ok(catalog) => self.catalog = catalog,
            Err(e @ (UtilityCostsError::Connection { .. } | UtilityCostsError::Http { .. })) => {
                self.logger
                    .error(&format!("Failed to fetch providers: {}", e));
                return self.user_form(base_error(ERROR_CANNOT_CONNECT), error_details(&e));
            }
            Err(e) => {
                self.logger.warn(&format!(
                    "Unexpected error fetching providers, using built-in table: {}",
                    e
                ));
                self.catalog = ProviderCatalog::fallback(provider_type);
            }
        }

        self.step = FlowStep::Provider;
        self.provider_form(BTreeMap::new(), BTreeMap::new())
    }

    /// Step 2: pick and validate a provider
    pub async fn step_provider(
        &mut self,
        input: Option<ProviderInput>,
        configured: &HashSet<String>,
    ) -> FlowResult {
        let (Some(api_url), Some(provider_type)) = (self.api_url.clone(), self.provider_type) else {
            return self.step_user(None).await;
        };
        if self.step != FlowStep::Provider {
            return self.step_user(None).await;
        }
        let Some(input) = input else {
            return self.provider_form(BTreeMap::new(), BTreeMap::new());
        };

        let Some(provider_key) = self.catalog.key_for(&input.provider).map(str::to_string) else {
            return self.provider_form(base_error(ERROR_INVALID_PROVIDER), BTreeMap::new());
        };

        let data = ProviderConfig::new(api_url, self.api_token.clone(), provider_key, provider_type);
        let info = match self.fetcher.validate(&data).await {
            Ok(info) => info,
            Err(e) => {
                self.logger
                    .error(&format!("Error connecting to provider: {}", e));
                return self.provider_form(base_error(ERROR_CANNOT_CONNECT), error_details(&e));
            }
        };

        if configured.contains(&data.unique_id()) {
            self.logger
                .info(&format!("{} is already configured", data.unique_id()));
            return FlowResult::Abort {
                reason: ABORT_ALREADY_CONFIGURED.to_string(),
            };
        }

        self.logger.info(&format!("Creating entry {}", info.title));
        FlowResult::CreateEntry {
            title: info.title,
            data,
        }
    }

    fn user_form(
        &self,
        errors: BTreeMap<String, String>,
        placeholders: BTreeMap<String, String>,
    ) -> FlowResult {
        let mut defaults = BTreeMap::new();
        defaults.insert(
            FIELD_API_URL.to_string(),
            self.api_url
                .clone()
                .unwrap_or_else(|| self.default_api_url.clone()),
        );
        defaults.insert(
            FIELD_API_TOKEN.to_string(),
            self.api_token.clone().unwrap_or_default(),
        );
        defaults.insert(
            FIELD_PROVIDER_TYPE.to_string(),
            self.provider_type.unwrap_or_default().to_string(),
        );

        FlowResult::Form {
            step: FlowStep::User,
            errors,
            options: ProviderType::ALL.iter().map(ToString::to_string).collect(),
            placeholders,
            defaults,
        }
    }

    fn provider_form(
        &self,
        errors: BTreeMap<String, String>,
        placeholders: BTreeMap<String, String>,
    ) -> FlowResult {
        FlowResult::Form {
            step: FlowStep::Provider,
            errors,
            options: self.catalog.labels(),
            placeholders,
            defaults: BTreeMap::new(),
        }
    }
}

fn base_error(code: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(BASE_ERROR.to_string(), code.to_string())])
}

fn error_details(err: &UtilityCostsError) -> BTreeMap<String, String> {
    BTreeMap::from([("error_details".to_string(), err.to_string())])
}
