use mockito::Server;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use utility_costs::config::{Config, PollingConfig};
use utility_costs::entries::EntryStore;
use utility_costs::integration::{EntryState, Integration};
use utility_costs::rates::{RateClient, RateFetcher};
use utility_costs::sensor::SensorValue;
use utility_costs::setup::{
    ABORT_ALREADY_CONFIGURED, ERROR_CANNOT_CONNECT, FlowResult, FlowStep, SetupFlow, UserInput,
};

fn fetcher() -> Arc<dyn RateFetcher> {
    Arc::new(RateClient::new(&PollingConfig::default()).unwrap())
}

#[tokio::test]
async fn wizard_against_backend_then_integration_loads_entry() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/providers")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_body(json!({"providers": [{"key": "cemc", "name": "CEMC"}]}).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/rates/cemc/residential")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_body(
            json!({
                "rates": {"residential_standard": {
                    "is_present": true,
                    "energy_rate_usd_per_kwh": 0.09,
                    "tva_fuel_rate_usd_per_kwh": 0.02,
                    "customer_charge_monthly_usd": 12.0
                }},
                "fetched_at": "2024-01-01T00:00:00Z",
                "utility": "Cumberland EMC"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut flow = SetupFlow::new(fetcher(), "https://rates.bherville.com");
    flow.start();
    let result = flow
        .submit(
            json!({"api_url": server.url(), "api_token": "tok", "provider_type": "electric"}),
            &HashSet::new(),
        )
        .await;
    let FlowResult::Form { step, options, .. } = result else {
        panic!("expected provider form");
    };
    assert_eq!(step, FlowStep::Provider);
    assert_eq!(options, vec!["CEMC"]);

    let FlowResult::CreateEntry { title, data } =
        flow.submit(json!({"provider": "CEMC"}), &HashSet::new()).await
    else {
        panic!("expected create_entry");
    };
    assert_eq!(title, "Electric Rates (CEMC)");
    assert_eq!(data.token.as_deref(), Some("tok"));

    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        entries_file: dir.path().join("entries.json").display().to_string(),
        ..Config::default()
    };
    let store = EntryStore::open(&config.entries_file).unwrap();
    let integration = Integration::new(config.clone(), store, fetcher());

    let created = integration.create_entry(&title, data).await.unwrap();
    assert!(created.setup_error.is_none());
    let id = created.entry.entry_id.clone();

    let view = integration.entry(&id).await.unwrap();
    assert_eq!(view.state, EntryState::Loaded);
    assert!(view.refresh.unwrap().last_success);

    let states = integration.sensor_states(&id).await.unwrap();
    assert_eq!(states.len(), 7);
    let daily = states.iter().find(|s| s.key == "daily_fixed_cost").unwrap();
    assert_eq!(daily.value, SensorValue::Number(0.4));
    let total = states.iter().find(|s| s.key == "total_rate").unwrap();
    assert_eq!(total.attributes["utility"], "Cumberland EMC");

    // A second wizard for the same target is rejected
    let configured = integration.configured_unique_ids().await;
    let mut again = SetupFlow::new(fetcher(), "https://rates.bherville.com");
    again
        .step_user(Some(UserInput {
            api_url: server.url(),
            api_token: Some("tok".into()),
            provider_type: "electric".into(),
        }))
        .await;
    let result = again.submit(json!({"provider": "CEMC"}), &configured).await;
    assert_eq!(
        result,
        FlowResult::Abort {
            reason: ABORT_ALREADY_CONFIGURED.into()
        }
    );

    // Entries survive a restart; sensor data does not until the first fetch
    integration.shutdown().await;
    let restarted = Integration::new(
        config.clone(),
        EntryStore::open(&config.entries_file).unwrap(),
        fetcher(),
    );
    let before = restarted.sensor_states(&id).await.unwrap();
    assert!(before.iter().all(|s| s.value.is_unknown() && !s.available));
    assert_eq!(restarted.setup_all().await, 1);
    assert_eq!(restarted.entry(&id).await.unwrap().state, EntryState::Loaded);
    restarted.shutdown().await;
}

#[tokio::test]
async fn unreachable_backend_reshows_user_step() {
    let mut flow = SetupFlow::new(fetcher(), "https://rates.bherville.com");
    let result = flow
        .submit(
            json!({"api_url": "http://127.0.0.1:1", "provider_type": "water"}),
            &HashSet::new(),
        )
        .await;
    assert_eq!(result.base_error(), Some(ERROR_CANNOT_CONNECT));
    let FlowResult::Form { step, placeholders, defaults, .. } = result else {
        panic!("expected form");
    };
    assert_eq!(step, FlowStep::User);
    assert!(placeholders.contains_key("error_details"));
    assert_eq!(defaults["api_url"], "http://127.0.0.1:1");
    assert_eq!(defaults["provider_type"], "water");
}

#[tokio::test]
async fn discovery_unauthorized_is_cannot_connect() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/water/providers")
        .with_status(401)
        .create_async()
        .await;

    let mut flow = SetupFlow::new(fetcher(), "https://rates.bherville.com");
    let result = flow
        .submit(
            json!({"api_url": server.url(), "api_token": "bad", "provider_type": "water"}),
            &HashSet::new(),
        )
        .await;
    let FlowResult::Form { placeholders, .. } = &result else {
        panic!("expected form");
    };
    assert_eq!(result.base_error(), Some(ERROR_CANNOT_CONNECT));
    assert!(placeholders["error_details"].contains("Unauthorized - check your API token"));
}

#[tokio::test]
async fn malformed_discovery_falls_back_and_validation_failure_reshows_provider() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/providers")
        .with_status(200)
        .with_body("not json at all")
        .create_async()
        .await;
    server
        .mock("GET", "/rates/kub/residential")
        .with_status(404)
        .create_async()
        .await;

    let mut flow = SetupFlow::new(fetcher(), "https://rates.bherville.com");
    let result = flow
        .submit(
            json!({"api_url": server.url(), "provider_type": "electric"}),
            &HashSet::new(),
        )
        .await;
    let FlowResult::Form { step, options, .. } = result else {
        panic!("expected form");
    };
    assert_eq!(step, FlowStep::Provider);
    assert_eq!(options, vec!["CEMC", "NES", "KUB"]);
    assert!(flow.catalog().fallback);

    let result = flow.submit(json!({"provider": "KUB"}), &HashSet::new()).await;
    assert_eq!(result.base_error(), Some(ERROR_CANNOT_CONNECT));
    let FlowResult::Form { step, placeholders, .. } = result else {
        panic!("expected form");
    };
    assert_eq!(step, FlowStep::Provider);
    assert!(placeholders["error_details"].contains("Provider 'kub' not found on backend"));
}
