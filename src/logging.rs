//! Structured logging and tracing for Utility Costs
//!
//! Sets up the tracing subscriber (console, daily rolling file, optional
//! JSON) and provides component loggers that stamp every line with the
//! config entry and provider they belong to.

use crate::config::LoggingConfig;
use crate::error::{Result, UtilityCostsError};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Once;
use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod level;
mod structured;

pub use level::{level_rank, min_level, parse_log_level};
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

/// Set to any value to skip the rolling file appender
pub const DISABLE_FILE_LOG_ENV: &str = "UTILITY_COSTS_DISABLE_FILE_LOG";

// Keep the non-blocking worker guard alive for the entire process lifetime
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceCell<String> = OnceCell::new();

/// Initialize logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        let init_result = (|| -> Result<()> {
            let base_level = parse_log_level(&config.level)?;
            let console_level = config
                .console_level
                .as_deref()
                .and_then(|s| parse_log_level(s).ok())
                .unwrap_or(base_level);
            let file_level = config
                .file_level
                .as_deref()
                .and_then(|s| parse_log_level(s).ok())
                .unwrap_or(base_level);

            // The env filter must admit the most verbose layer; layers down-filter
            let filter = build_env_filter(min_level(console_level, file_level));

            if should_use_console_only() {
                init_console_only_logging(filter, config.json_format, console_level);
                return Ok(());
            }

            init_file_logging(config, filter, console_level, file_level)
        })();

        if let Err(e) = init_result {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = INIT_ERROR.get() {
        return Err(UtilityCostsError::config(err.clone()));
    }
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("utility_costs={},reqwest=warn,hyper=warn,tower_http=info", level).into()
    })
}

fn should_use_console_only() -> bool {
    cfg!(test) || std::env::var_os(DISABLE_FILE_LOG_ENV).is_some()
}

fn console_layer<S>(json_format: bool, level: Level) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);
    if json_format {
        layer
            .json()
            .with_filter(LevelFilter::from_level(level))
            .boxed()
    } else {
        layer.with_filter(LevelFilter::from_level(level)).boxed()
    }
}

fn init_console_only_logging(filter: EnvFilter, json_format: bool, console_level: Level) {
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer(json_format, console_level))
        .try_init();

    info!(
        "Logging initialized - console_level: {:?}, console-only",
        console_level
    );
}

fn init_file_logging(
    config: &LoggingConfig,
    filter: EnvFilter,
    console_level: Level,
    file_level: Level,
) -> Result<()> {
    let file_appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("utility-costs")
        .filename_suffix("log")
        .max_log_files(config.backup_count.max(1) as usize)
        .build(log_directory(&config.file))
        .map_err(|e| {
            UtilityCostsError::io(format!("Failed to create log file appender: {}", e))
        })?;

    let (non_blocking_appender, guard) = non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let file_layer = {
        let base = fmt::layer()
            .with_writer(non_blocking_appender)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_ansi(false);
        if config.json_format {
            base.json()
                .with_filter(LevelFilter::from_level(file_level))
                .boxed()
        } else {
            base.with_filter(LevelFilter::from_level(file_level))
                .boxed()
        }
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(file_layer);
    let installed = if config.console_output {
        subscriber
            .with(console_layer(config.json_format, console_level))
            .try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| UtilityCostsError::config(format!("Logging already set: {}", e)))?;

    info!(
        "Logging initialized - console_level: {:?}, file_level: {:?}, file: {}",
        console_level, file_level, config.file
    );
    Ok(())
}

/// Directory receiving rolling files; a path with an extension names a file
fn log_directory(file: &str) -> &Path {
    let p = Path::new(file);
    if p.extension().is_some() {
        p.parent().unwrap_or(p)
    } else {
        p
    }
}
