//! Runtime context for all configured entries
//!
//! [`Integration`] owns the entry store, one coordinator per loaded entry and
//! that entry's sensors. It is a cheap clone handed explicitly to the web
//! layer and to `main`; there is no process-wide registry.

use crate::config::Config;
use crate::coordinator::{
    CoordinatorHandle, RateSource, RefreshCoordinator, RefreshState, RefreshStatus, StaticSource,
};
use crate::entries::{ConfigEntry, EntryStore};
use crate::error::{Result, UtilityCostsError};
use crate::logging::{LogContext, StructuredLogger, get_logger, get_logger_with_context};
use crate::rates::{ProviderConfig, RateClient, RateFetcher};
use crate::sensor::{Sensor, SensorState, sensors_for};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::AbortHandle;

/// Lifecycle state of a config entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum EntryState {
    Loaded,
    SetupError(String),
    NotLoaded,
}

/// API view of one entry
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EntryView {
    pub entry: ConfigEntry,
    pub state: EntryState,
    pub refresh: Option<RefreshStatus>,
}

/// Result of creating an entry from a finished wizard
#[derive(Debug, Clone)]
pub struct CreatedEntry {
    pub entry: ConfigEntry,
    /// First-refresh failure; the entry stays persisted and can be reloaded
    pub setup_error: Option<String>,
}

struct EntryRuntime {
    state: EntryState,
    // Bumped by every setup, unload and shutdown; a setup only commits if
    // its generation is still current once the first fetch returns
    generation: u64,
    // First fetch of a setup still in flight
    pending: Option<AbortHandle>,
    handle: Option<CoordinatorHandle>,
    sensors: Vec<Sensor>,
}

impl EntryRuntime {
    fn not_loaded(entry_id: &str, provider: &ProviderConfig, generation: u64) -> Self {
        Self {
            state: EntryState::NotLoaded,
            generation,
            pending: None,
            handle: None,
            sensors: sensors_for(entry_id, provider),
        }
    }

    /// Detach the running parts so they can be stopped outside the lock
    fn detach(&mut self) -> Teardown {
        Teardown {
            pending: self.pending.take(),
            handle: self.handle.take(),
        }
    }
}

/// Loop and in-flight first fetch taken out of a runtime
struct Teardown {
    pending: Option<AbortHandle>,
    handle: Option<CoordinatorHandle>,
}

impl Teardown {
    async fn run(self) {
        if let Some(pending) = self.pending {
            pending.abort();
        }
        if let Some(handle) = self.handle {
            handle.shutdown().await;
        }
    }
}

struct Inner {
    config: Config,
    fetcher: Arc<dyn RateFetcher>,
    store: Mutex<EntryStore>,
    runtimes: RwLock<HashMap<String, EntryRuntime>>,
    next_generation: AtomicU64,
    logger: StructuredLogger,
}

#[derive(Clone)]
pub struct Integration {
    inner: Arc<Inner>,
}

impl Integration {
    pub fn new(config: Config, store: EntryStore, fetcher: Arc<dyn RateFetcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                store: Mutex::new(store),
                runtimes: RwLock::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                logger: get_logger("integration"),
            }),
        }
    }

    /// Open the configured entry store and build a real HTTP client
    pub fn from_config(config: Config) -> Result<Self> {
        let store = EntryStore::open(&config.entries_file)?;
        let fetcher: Arc<dyn RateFetcher> = Arc::new(RateClient::new(&config.polling)?);
        Ok(Self::new(config, store, fetcher))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn fetcher(&self) -> Arc<dyn RateFetcher> {
        Arc::clone(&self.inner.fetcher)
    }

    /// Build the coordinator, run its first refresh and start polling
    ///
    /// An unload, removal or newer setup of the same entry while the first
    /// fetch is in flight cancels the fetch, and this setup then leaves the
    /// entry alone.
    pub async fn setup_entry(&self, entry: &ConfigEntry) -> Result<()> {
        let entry_id = entry.entry_id.as_str();
        let logger = get_logger_with_context(
            LogContext::new("integration")
                .with_entry_id(entry_id)
                .with_provider(&entry.data.provider_key),
        );

        let coordinator = Arc::new(RefreshCoordinator::new(
            entry_id,
            entry.data.clone(),
            Arc::clone(&self.inner.fetcher),
            self.inner.config.polling.interval(),
        ));

        let (first_fetch, generation, previous) = {
            let mut runtimes = self.inner.runtimes.write().await;
            let generation = self.next_generation();
            let first_fetch = {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move { coordinator.first_refresh().await })
            };
            let previous = runtimes.insert(
                entry_id.to_string(),
                EntryRuntime {
                    pending: Some(first_fetch.abort_handle()),
                    ..EntryRuntime::not_loaded(entry_id, &entry.data, generation)
                },
            );
            (first_fetch, generation, previous)
        };
        if let Some(mut previous) = previous {
            previous.detach().run().await;
        }

        let outcome = match first_fetch.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(setup_cancelled(entry_id)),
            Err(e) => Err(UtilityCostsError::web(format!("First refresh task failed: {}", e))),
        };

        let mut runtimes = self.inner.runtimes.write().await;
        let current = runtimes
            .get(entry_id)
            .is_some_and(|rt| rt.generation == generation);
        let stored = self.inner.store.lock().await.get(entry_id).is_some();
        if !current || !stored {
            if current {
                runtimes.remove(entry_id);
            }
            logger.info(&format!("Setup of '{}' was superseded; discarded", entry.title));
            return Err(setup_cancelled(entry_id));
        }

        let Some(runtime) = runtimes.get_mut(entry_id) else {
            return Err(setup_cancelled(entry_id));
        };
        runtime.pending = None;
        match outcome {
            Ok(()) => {
                runtime.handle = Some(coordinator.spawn());
                runtime.state = EntryState::Loaded;
                logger.info(&format!(
                    "Loaded '{}' with {} sensors",
                    entry.title,
                    runtime.sensors.len()
                ));
                Ok(())
            }
            Err(e) => {
                logger.error(&format!("Setup of '{}' failed: {}", entry.title, e));
                runtime.state = EntryState::SetupError(e.to_string());
                Err(e)
            }
        }
    }

    /// Set up every stored entry; returns how many loaded
    pub async fn setup_all(&self) -> usize {
        let entries = self.inner.store.lock().await.list().to_vec();
        let mut loaded = 0;
        for entry in &entries {
            if self.setup_entry(entry).await.is_ok() {
                loaded += 1;
            }
        }
        self.inner.logger.info(&format!(
            "Set up {} of {} config entries",
            loaded,
            entries.len()
        ));
        loaded
    }

    /// Persist a new entry, then set it up
    pub async fn create_entry(&self, title: &str, data: ProviderConfig) -> Result<CreatedEntry> {
        let entry = self
            .inner
            .store
            .lock()
            .await
            .add(ConfigEntry::new(title, data))?;
        let setup_error = self.setup_entry(&entry).await.err().map(|e| e.to_string());
        Ok(CreatedEntry { entry, setup_error })
    }

    /// Cancel the entry's polling loop or pending setup; the entry stays stored
    pub async fn unload_entry(&self, entry_id: &str) -> Result<()> {
        let entry = self.stored_entry(entry_id).await?;
        let teardown = {
            let mut runtimes = self.inner.runtimes.write().await;
            let generation = self.next_generation();
            runtimes
                .insert(
                    entry_id.to_string(),
                    EntryRuntime::not_loaded(entry_id, &entry.data, generation),
                )
                .map(|mut previous| previous.detach())
        };
        if let Some(teardown) = teardown {
            teardown.run().await;
        }
        self.inner.logger.info(&format!("Unloaded entry {}", entry_id));
        Ok(())
    }

    pub async fn reload_entry(&self, entry_id: &str) -> Result<()> {
        let entry = self.stored_entry(entry_id).await?;
        self.setup_entry(&entry).await
    }

    /// Delete from the store, then stop whatever is running for the entry
    pub async fn remove_entry(&self, entry_id: &str) -> Result<ConfigEntry> {
        let removed = self.inner.store.lock().await.remove(entry_id)?;
        let teardown = self
            .inner
            .runtimes
            .write()
            .await
            .remove(entry_id)
            .map(|mut runtime| runtime.detach());
        if let Some(teardown) = teardown {
            teardown.run().await;
        }
        Ok(removed)
    }

    pub async fn entry_states(&self) -> Vec<EntryView> {
        let entries = self.inner.store.lock().await.list().to_vec();
        let runtimes = self.inner.runtimes.read().await;
        entries
            .into_iter()
            .map(|entry| view(entry, &runtimes))
            .collect()
    }

    pub async fn entry(&self, entry_id: &str) -> Result<EntryView> {
        let entry = self.stored_entry(entry_id).await?;
        let runtimes = self.inner.runtimes.read().await;
        Ok(view(entry, &runtimes))
    }

    /// Current sensor states; all unknown when the entry is not loaded
    pub async fn sensor_states(&self, entry_id: &str) -> Result<Vec<SensorState>> {
        let entry = self.stored_entry(entry_id).await?;
        let runtimes = self.inner.runtimes.read().await;
        Ok(project_entry(&entry, runtimes.get(entry_id)))
    }

    pub async fn all_sensor_states(&self) -> Vec<SensorState> {
        let entries = self.inner.store.lock().await.list().to_vec();
        let runtimes = self.inner.runtimes.read().await;
        entries
            .iter()
            .flat_map(|entry| project_entry(entry, runtimes.get(&entry.entry_id)))
            .collect()
    }

    /// Manual refresh; `Ok(None)` when a fetch was already in flight
    pub async fn refresh_entry(&self, entry_id: &str) -> Result<Option<bool>> {
        let coordinator = self.loaded_coordinator(entry_id).await?;
        Ok(coordinator.request_refresh().await)
    }

    /// Receiver notified after every poll of a loaded entry
    pub async fn subscribe(&self, entry_id: &str) -> Result<watch::Receiver<Arc<RefreshState>>> {
        Ok(self.loaded_coordinator(entry_id).await?.subscribe())
    }

    pub async fn coordinator(&self, entry_id: &str) -> Option<Arc<RefreshCoordinator>> {
        self.inner
            .runtimes
            .read()
            .await
            .get(entry_id)
            .and_then(|rt| rt.handle.as_ref())
            .map(|h| Arc::clone(h.coordinator()))
    }

    pub async fn configured_unique_ids(&self) -> HashSet<String> {
        self.inner
            .store
            .lock()
            .await
            .list()
            .iter()
            .map(ConfigEntry::unique_id)
            .collect()
    }

    /// Stop every polling loop and pending setup
    pub async fn shutdown(&self) {
        let teardowns: Vec<Teardown> = {
            let mut runtimes = self.inner.runtimes.write().await;
            runtimes
                .values_mut()
                .map(|rt| {
                    rt.state = EntryState::NotLoaded;
                    rt.generation = self.next_generation();
                    rt.detach()
                })
                .collect()
        };
        for teardown in teardowns {
            teardown.run().await;
        }
        self.inner.logger.info("All polling loops stopped");
    }

    async fn stored_entry(&self, entry_id: &str) -> Result<ConfigEntry> {
        self.inner
            .store
            .lock()
            .await
            .get(entry_id)
            .cloned()
            .ok_or_else(|| {
                UtilityCostsError::not_found(format!("Config entry '{}' does not exist", entry_id))
            })
    }

    async fn loaded_coordinator(&self, entry_id: &str) -> Result<Arc<RefreshCoordinator>> {
        self.stored_entry(entry_id).await?;
        self.coordinator(entry_id).await.ok_or_else(|| {
            UtilityCostsError::validation("entry_id", &format!("Config entry '{}' is not loaded", entry_id))
        })
    }

    fn next_generation(&self) -> u64 {
        self.inner.next_generation.fetch_add(1, Ordering::SeqCst)
    }
}

fn setup_cancelled(entry_id: &str) -> UtilityCostsError {
    UtilityCostsError::validation(
        "entry_id",
        &format!("Setup of config entry '{}' was cancelled", entry_id),
    )
}

fn view(entry: ConfigEntry, runtimes: &HashMap<String, EntryRuntime>) -> EntryView {
    let runtime = runtimes.get(&entry.entry_id);
    EntryView {
        state: runtime.map_or(EntryState::NotLoaded, |rt| rt.state.clone()),
        refresh: runtime
            .and_then(|rt| rt.handle.as_ref())
            .map(|h| RefreshStatus::from(&*h.coordinator().state())),
        entry: entry.redacted(),
    }
}

fn project_entry(entry: &ConfigEntry, runtime: Option<&EntryRuntime>) -> Vec<SensorState> {
    let now = Utc::now();
    let coordinator = runtime.and_then(|rt| rt.handle.as_ref()).map(CoordinatorHandle::coordinator);
    let empty = StaticSource::new(entry.data.clone(), None, false);
    let source: &dyn RateSource = match coordinator {
        Some(c) => &**c,
        None => &empty,
    };

    match runtime {
        Some(rt) => rt.sensors.iter().map(|s| s.state(source, now)).collect(),
        None => sensors_for(&entry.entry_id, &entry.data)
            .iter()
            .map(|s| s.state(source, now))
            .collect(),
    }
}
