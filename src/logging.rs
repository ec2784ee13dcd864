//! Structured logging sink, modeled as an interface so
//! components depend on `Arc<dyn Logger>` rather than calling `tracing`
//! macros directly. `TracingLogger` is the default implementation, wired
//! up with `tracing-subscriber` the same way `oxid`'s `main.rs` does.

use std::collections::BTreeMap;
use std::sync::Arc;

pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);

    /// Return a new logger that prefixes every subsequent message with the
    /// given structured fields, e.g. `logger.with_fields([("kind", "ComputeInstance")])`.
    fn with_fields(&self, fields: BTreeMap<String, String>) -> Arc<dyn Logger>;
}

/// Default `Logger` backed by the `tracing` crate.
#[derive(Clone, Default)]
pub struct TracingLogger {
    fields: BTreeMap<String, String>,
}

impl TracingLogger {
    pub fn new() -> Arc<dyn Logger> {
        Arc::new(Self::default())
    }

    fn render(&self, msg: &str) -> String {
        if self.fields.is_empty() {
            return msg.to_string();
        }
        let fields = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{msg} [{fields}]")
    }
}

impl Logger for TracingLogger {
    fn debug(&self, msg: &str) {
        tracing::debug!("{}", self.render(msg));
    }

    fn info(&self, msg: &str) {
        tracing::info!("{}", self.render(msg));
    }

    fn warn(&self, msg: &str) {
        tracing::warn!("{}", self.render(msg));
    }

    fn error(&self, msg: &str) {
        tracing::error!("{}", self.render(msg));
    }

    fn with_fields(&self, fields: BTreeMap<String, String>) -> Arc<dyn Logger> {
        let mut merged = self.fields.clone();
        merged.extend(fields);
        Arc::new(TracingLogger { fields: merged })
    }
}

/// Initialize the global `tracing` subscriber. Idempotent: safe to call
/// more than once (e.g. once from `main`, once from a test harness).
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
