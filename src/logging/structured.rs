use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Context information for log messages
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "coordinator", "setup", "web")
    pub component: String,
    /// Config entry the message belongs to
    pub entry_id: Option<String>,
    /// Provider key of that entry
    pub provider: Option<String>,
    /// Additional context fields
    pub extra_fields: BTreeMap<String, String>,
}

impl LogContext {
    /// Create a new log context
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            entry_id: None,
            provider: None,
            extra_fields: BTreeMap::new(),
        }
    }

    pub fn with_entry_id(mut self, entry_id: &str) -> Self {
        self.entry_id = Some(entry_id.to_string());
        self
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    /// Add extra field
    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }
}

/// Structured logger with context
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn info(&self, message: &str) {
        let fields = self.format_fields();
        info!(%fields, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        let fields = self.format_fields();
        warn!(%fields, "{}", message);
    }

    pub fn error(&self, message: &str) {
        let fields = self.format_fields();
        error!(%fields, "{}", message);
    }

    pub fn debug(&self, message: &str) {
        let fields = self.format_fields();
        debug!(%fields, "{}", message);
    }

    fn format_fields(&self) -> String {
        let mut fields = vec![format!("component={}", self.context.component)];
        if let Some(ref entry_id) = self.context.entry_id {
            fields.push(format!("entry_id={}", entry_id));
        }
        if let Some(ref provider) = self.context.provider {
            fields.push(format!("provider={}", provider));
        }
        for (key, value) in &self.context.extra_fields {
            fields.push(format!("{}={}", key, value));
        }
        fields.join(",")
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Create a logger with full context
pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context() {
        let context = LogContext::new("coordinator")
            .with_entry_id("abc")
            .with_provider("cemc")
            .with_field("kind", "electric".to_string());

        assert_eq!(context.component, "coordinator");
        assert_eq!(context.entry_id.as_deref(), Some("abc"));
        assert_eq!(context.provider.as_deref(), Some("cemc"));
        assert_eq!(
            context.extra_fields.get("kind"),
            Some(&"electric".to_string())
        );
    }

    #[test]
    fn test_format_fields() {
        let logger = get_logger_with_context(
            LogContext::new("coordinator")
                .with_entry_id("abc")
                .with_provider("whud"),
        );
        assert_eq!(
            logger.format_fields(),
            "component=coordinator,entry_id=abc,provider=whud"
        );

        // Must not panic without a subscriber installed
        logger.info("info message");
        logger.debug("debug message");
    }

    #[test]
    fn test_get_logger() {
        let logger = get_logger("setup");
        assert_eq!(logger.context().component, "setup");
        assert!(logger.context().entry_id.is_none());
    }
}
