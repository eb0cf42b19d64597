use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use utility_costs::coordinator::{RateSource, RefreshCoordinator};
use utility_costs::error::{Result, UtilityCostsError};
use utility_costs::rates::{
    ProviderCatalog, ProviderConfig, ProviderType, RateDocument, RateFetcher, ValidationInfo,
};

/// Replays queued responses; an empty queue repeats the last document
struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<Value>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Gate>>,
}

/// Holds a fetch open until released
struct Gate {
    entered: Notify,
    release: Notify,
}

impl ScriptedFetcher {
    fn new(script: Vec<Result<Value>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RateFetcher for ScriptedFetcher {
    async fn fetch(&self, provider: &ProviderConfig) -> Result<RateDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let next = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(doc(0.09)));
        RateDocument::parse(next?, provider.provider_type)
    }

    async fn validate(&self, _provider: &ProviderConfig) -> Result<ValidationInfo> {
        unreachable!("coordinator never validates")
    }

    async fn discover_providers(
        &self,
        _base_url: &str,
        _token: Option<&str>,
        _provider_type: ProviderType,
    ) -> Result<ProviderCatalog> {
        unreachable!("coordinator never discovers")
    }
}

fn doc(energy: f64) -> Value {
    json!({
        "rates": {"residential_standard": {
            "is_present": true,
            "energy_rate_usd_per_kwh": energy,
            "tva_fuel_rate_usd_per_kwh": 0.02,
            "customer_charge_monthly_usd": 12.0
        }},
        "fetched_at": "2024-01-01T00:00:00Z"
    })
}

fn provider() -> ProviderConfig {
    ProviderConfig::new("http://api", None, "cemc", ProviderType::Electric)
}

fn coordinator(fetcher: Arc<ScriptedFetcher>, interval: Duration) -> Arc<RefreshCoordinator> {
    Arc::new(RefreshCoordinator::new("entry-1", provider(), fetcher, interval))
}

fn energy_rate(c: &RefreshCoordinator) -> Option<f64> {
    c.document()?
        .path(&["rates", "residential_standard", "energy_rate_usd_per_kwh"])?
        .as_f64()
}

#[tokio::test]
async fn first_refresh_failure_propagates() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![Err(UtilityCostsError::http(
        503,
        "http://api/rates/cemc/residential",
        "Service Unavailable",
    ))]));
    let c = coordinator(Arc::clone(&fetcher), Duration::from_secs(900));

    let err = c.first_refresh().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(c.document().is_none());
    assert!(!c.last_success());

    let state = c.state();
    assert_eq!(state.total_polls, 1);
    assert_eq!(state.failed_polls, 1);
    assert!(state.last_error.as_deref().unwrap().contains("503"));
}

#[tokio::test]
async fn failed_poll_keeps_previous_document() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Ok(doc(0.09)),
        Err(UtilityCostsError::connection("reset by peer")),
        Ok(json!({"no_rates": true})),
        Ok(doc(0.10)),
    ]));
    let c = coordinator(Arc::clone(&fetcher), Duration::from_secs(900));

    c.first_refresh().await.unwrap();
    assert_eq!(c.name(), "Electric Rates (cemc)");
    assert!(c.last_success());
    assert_eq!(energy_rate(&c), Some(0.09));

    // Transport failure
    assert!(!c.refresh().await);
    assert!(!c.last_success());
    assert_eq!(energy_rate(&c), Some(0.09));

    // Schema failure
    assert!(!c.refresh().await);
    assert_eq!(energy_rate(&c), Some(0.09));

    assert!(c.refresh().await);
    assert!(c.last_success());
    assert_eq!(energy_rate(&c), Some(0.10));

    let state = c.state();
    assert_eq!(state.total_polls, 4);
    assert_eq!(state.failed_polls, 2);
    assert!(state.last_error.is_none());
    assert_eq!(fetcher.calls(), 4);
}

#[tokio::test]
async fn request_refresh_skips_while_fetch_in_flight() {
    let gate = Arc::new(Gate {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let fetcher = Arc::new(ScriptedFetcher {
        gate: Some(Arc::clone(&gate)),
        ..ScriptedFetcher::new(vec![Ok(doc(0.09))])
    });
    let c = coordinator(Arc::clone(&fetcher), Duration::from_secs(900));

    let running = {
        let c = Arc::clone(&c);
        tokio::spawn(async move { c.refresh().await })
    };
    gate.entered.notified().await;

    assert_eq!(c.request_refresh().await, None);
    assert_eq!(fetcher.calls(), 1);

    gate.release.notify_one();
    assert!(running.await.unwrap());
    assert_eq!(energy_rate(&c), Some(0.09));
}

#[tokio::test]
async fn subscribers_see_each_publish() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Ok(doc(0.09)),
        Err(UtilityCostsError::schema("missing 'rates'")),
    ]));
    let c = coordinator(fetcher, Duration::from_secs(900));
    let mut rx = c.subscribe();

    c.first_refresh().await.unwrap();
    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().last_success);

    c.refresh().await;
    rx.changed().await.unwrap();
    let state = rx.borrow_and_update().clone();
    assert!(!state.last_success);
    assert!(state.document.is_some());
}

#[tokio::test(start_paused = true)]
async fn loop_polls_on_interval_until_shutdown() {
    let period = Duration::from_secs(900);
    let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
    let c = coordinator(Arc::clone(&fetcher), period);
    let mut rx = c.subscribe();

    let start = tokio::time::Instant::now();
    let handle = Arc::clone(&c).spawn();
    assert!(handle.is_running());

    rx.changed().await.unwrap();
    assert!(start.elapsed() >= period);
    assert_eq!(fetcher.calls(), 1);

    rx.changed().await.unwrap();
    assert!(start.elapsed() >= period * 2);
    assert_eq!(fetcher.calls(), 2);

    handle.shutdown().await;
    tokio::time::sleep(period * 3).await;
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_cancels_loop() {
    let period = Duration::from_secs(60);
    let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
    let c = coordinator(Arc::clone(&fetcher), period);

    drop(Arc::clone(&c).spawn());
    tokio::time::sleep(period * 5).await;
    assert_eq!(fetcher.calls(), 0);
}
