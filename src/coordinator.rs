//! Refresh coordinator
//!
//! One coordinator per configured provider owns the polling timer and the
//! single cached rate document every sensor of that provider reads. State is
//! published through a `watch` channel as an `Arc<RefreshState>`, so a reader
//! always sees either the previous or the next state, never a mix.
//!
//! A failed poll keeps the previous document and flips `last_success` to
//! false. Only [`RefreshCoordinator::first_refresh`] hands the error back to
//! the caller; the periodic loop logs it and carries on.

use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::rates::{ProviderConfig, RateDocument, RateFetcher};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Shortest period the loop will run at
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Read-only view sensors project from
pub trait RateSource: Send + Sync {
    fn provider(&self) -> &ProviderConfig;

    /// Last successfully fetched document, if any fetch ever succeeded
    fn document(&self) -> Option<Arc<RateDocument>>;

    /// Whether the most recent poll succeeded
    fn last_success(&self) -> bool;
}

/// Snapshot published after every poll
#[derive(Debug, Clone, Default)]
pub struct RefreshState {
    pub document: Option<Arc<RateDocument>>,
    pub last_success: bool,
    pub last_error: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub total_polls: u64,
    pub failed_polls: u64,
}

/// Serializable summary of a [`RefreshState`], without the document
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RefreshStatus {
    pub has_document: bool,
    pub last_success: bool,
    pub last_error: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub total_polls: u64,
    pub failed_polls: u64,
}

impl From<&RefreshState> for RefreshStatus {
    fn from(state: &RefreshState) -> Self {
        Self {
            has_document: state.document.is_some(),
            last_success: state.last_success,
            last_error: state.last_error.clone(),
            last_attempt: state.last_attempt,
            last_success_at: state.last_success_at,
            total_polls: state.total_polls,
            failed_polls: state.failed_polls,
        }
    }
}

/// Owns the polling loop and cached document for one provider
pub struct RefreshCoordinator {
    entry_id: String,
    name: String,
    provider: ProviderConfig,
    fetcher: Arc<dyn RateFetcher>,
    interval: Duration,
    state_tx: watch::Sender<Arc<RefreshState>>,
    // Held for the duration of a fetch; at most one in flight
    fetch_guard: Mutex<()>,
    logger: StructuredLogger,
}

impl RefreshCoordinator {
    pub fn new(
        entry_id: impl Into<String>,
        provider: ProviderConfig,
        fetcher: Arc<dyn RateFetcher>,
        interval: Duration,
    ) -> Self {
        let entry_id = entry_id.into();
        let name = format!(
            "{} Rates ({})",
            provider.provider_type.label(),
            provider.provider_key
        );
        let logger = get_logger_with_context(
            LogContext::new("coordinator")
                .with_entry_id(&entry_id)
                .with_provider(&provider.provider_key),
        );
        let (state_tx, _) = watch::channel(Arc::new(RefreshState::default()));

        Self {
            entry_id,
            name,
            provider,
            fetcher,
            interval: interval.max(MIN_INTERVAL),
            state_tx,
            fetch_guard: Mutex::new(()),
            logger,
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current published state
    pub fn state(&self) -> Arc<RefreshState> {
        self.state_tx.borrow().clone()
    }

    /// Receiver notified after every poll
    pub fn subscribe(&self) -> watch::Receiver<Arc<RefreshState>> {
        self.state_tx.subscribe()
    }

    /// Initial fetch at setup; the error propagates so setup can abort
    pub async fn first_refresh(&self) -> Result<()> {
        let _guard = self.fetch_guard.lock().await;
        self.poll().await
    }

    /// Periodic fetch; failures are logged and reported as `false`
    pub async fn refresh(&self) -> bool {
        let _guard = self.fetch_guard.lock().await;
        self.poll().await.is_ok()
    }

    /// Manual refresh; `None` when a fetch is already in flight
    pub async fn request_refresh(&self) -> Option<bool> {
        let Ok(_guard) = self.fetch_guard.try_lock() else {
            self.logger
                .debug("Refresh requested while a fetch is in flight; skipped");
            return None;
        };
        Some(self.poll().await.is_ok())
    }

    // Callers hold `fetch_guard`
    async fn poll(&self) -> Result<()> {
        self.logger.debug(&format!("Fetching {}", self.name));
        let attempted_at = Utc::now();
        let result = self.fetcher.fetch(&self.provider).await;

        let prev = self.state();
        let (next, outcome) = match result {
            Ok(document) => (
                RefreshState {
                    document: Some(Arc::new(document)),
                    last_success: true,
                    last_error: None,
                    last_attempt: Some(attempted_at),
                    last_success_at: Some(attempted_at),
                    total_polls: prev.total_polls.saturating_add(1),
                    failed_polls: prev.failed_polls,
                },
                Ok(()),
            ),
            Err(e) => {
                self.logger
                    .error(&format!("Error fetching {}: {}", self.name, e));
                (
                    RefreshState {
                        document: prev.document.clone(),
                        last_success: false,
                        last_error: Some(e.to_string()),
                        last_attempt: Some(attempted_at),
                        last_success_at: prev.last_success_at,
                        total_polls: prev.total_polls.saturating_add(1),
                        failed_polls: prev.failed_polls.saturating_add(1),
                    },
                    Err(e),
                )
            }
        };

        self.state_tx.send_replace(Arc::new(next));
        if outcome.is_ok() {
            self.logger.debug(&format!("Updated {}", self.name));
        }
        outcome
    }

    /// Start the periodic loop; the first tick fires one interval from now
    pub fn spawn(self: Arc<Self>) -> CoordinatorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let coordinator = Arc::clone(&self);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            // Next tick is scheduled from when the previous poll finished
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            coordinator.logger.info(&format!(
                "Polling {} every {}s",
                coordinator.name,
                period.as_secs()
            ));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        coordinator.refresh().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            coordinator.logger.info("Polling loop stopped");
        });

        CoordinatorHandle {
            coordinator: self,
            shutdown_tx,
            task: Some(task),
        }
    }
}

impl RateSource for RefreshCoordinator {
    fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    fn document(&self) -> Option<Arc<RateDocument>> {
        self.state_tx.borrow().document.clone()
    }

    fn last_success(&self) -> bool {
        self.state_tx.borrow().last_success
    }
}

/// Running loop for one coordinator; dropping it cancels the loop
pub struct CoordinatorHandle {
    coordinator: Arc<RefreshCoordinator>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl CoordinatorHandle {
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the timer and cancel any in-flight request
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Fixed source for projecting a document outside a running coordinator
#[derive(Debug, Clone)]
pub struct StaticSource {
    provider: ProviderConfig,
    document: Option<Arc<RateDocument>>,
    last_success: bool,
}

impl StaticSource {
    pub fn new(provider: ProviderConfig, document: Option<RateDocument>, last_success: bool) -> Self {
        Self {
            provider,
            document: document.map(Arc::new),
            last_success,
        }
    }
}

impl RateSource for StaticSource {
    fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    fn document(&self) -> Option<Arc<RateDocument>> {
        self.document.clone()
    }

    fn last_success(&self) -> bool {
        self.last_success
    }
}
