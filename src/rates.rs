//! Rates backend integration
//!
//! Talks to the eRateManager-style REST backend: provider discovery for the
//! setup wizard, validation of a chosen provider, and the periodic fetch of
//! one rate document per configured provider.

pub mod catalog;
pub mod client;
pub mod types;

pub use catalog::{ProviderCatalog, ProviderOption};
pub use client::{RateClient, RateFetcher, USER_AGENT, ValidationInfo};
pub use types::{ProviderConfig, ProviderType, RateDocument};
