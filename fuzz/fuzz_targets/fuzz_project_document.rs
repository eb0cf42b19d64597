#![no_main]
use libfuzzer_sys::fuzz_target;
use utility_costs::rates::{ProviderType, RateDocument};
use utility_costs::sensor::SensorKind;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a response body; every accepted document must project
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let now = chrono::Utc::now();

    for provider_type in ProviderType::ALL {
        if let Ok(doc) = RateDocument::parse(value.clone(), provider_type) {
            for kind in SensorKind::ELECTRIC.iter().chain(SensorKind::WATER.iter()) {
                let _ = kind.project(&doc, now);
            }
        }
    }
});
