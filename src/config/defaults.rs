use super::*;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/utility-costs.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 900,
            request_timeout_seconds: 30,
            validation_timeout_seconds: 10,
        }
    }
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            default_api_url: "https://rates.bherville.com".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
            polling: PollingConfig::default(),
            setup: SetupConfig::default(),
            entries_file: "/data/utility_costs_entries.json".to_string(),
        }
    }
}
