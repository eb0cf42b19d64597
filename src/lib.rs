//! # Utility Costs - rate sensors for a home-automation host
//!
//! Polls an eRateManager-style REST backend for electric and water rate
//! documents and exposes the fetched fields as read-only sensor values over
//! an HTTP API.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration and validation
//! - `logging`: Structured logging and tracing
//! - `rates`: Provider model, rate documents and the backend HTTP client
//! - `coordinator`: Per-provider polling loop and cached document
//! - `sensor`: Pure projections from a cached document to sensor values
//! - `entries`: Persisted config entries
//! - `setup`: Two-step setup wizard
//! - `integration`: Runtime context tying entries, coordinators and sensors together
//! - `web`: HTTP server and REST API

pub mod config;
pub mod coordinator;
pub mod entries;
pub mod error;
pub mod integration;
pub mod logging;
pub mod rates;
pub mod sensor;
pub mod setup;
pub mod web;


// Re-export commonly used types
pub use config::Config;
pub use coordinator::{RateSource, RefreshCoordinator};
pub use error::{Result, UtilityCostsError};
pub use integration::Integration;
