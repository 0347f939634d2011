#![forbid(unsafe_code)]

//! Capture of `deptrack::warn` diagnostics through `tracing`.
//!
//! [`WarningCapture`] is a [`Layer`] that records every event under the
//! warning target. Install it with [`capture_warnings`] for the duration of
//! a closure, or compose it into a larger subscriber.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

/// Target used by deptrack for usage warnings.
pub const WARN_TARGET: &str = "deptrack::warn";

/// One recorded warning event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedWarning {
    pub code: String,
    pub key: String,
    pub message: String,
}

/// Shared view of the warnings recorded by a [`WarningCapture`].
#[derive(Debug, Clone, Default)]
pub struct WarningLog {
    records: Arc<Mutex<Vec<CapturedWarning>>>,
}

impl WarningLog {
    fn lock(&self) -> MutexGuard<'_, Vec<CapturedWarning>> {
        // A poisoned log still holds valid records.
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn records(&self) -> Vec<CapturedWarning> {
        self.lock().clone()
    }

    /// Warning codes in emission order.
    #[must_use]
    pub fn codes(&self) -> Vec<String> {
        self.lock().iter().map(|w| w.code.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Layer recording `deptrack::warn` events into a [`WarningLog`].
#[derive(Debug, Clone, Default)]
pub struct WarningCapture {
    log: WarningLog,
}

impl WarningCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the records this layer writes.
    #[must_use]
    pub fn log(&self) -> WarningLog {
        self.log.clone()
    }
}

#[derive(Default)]
struct WarningVisitor {
    warning: CapturedWarning,
}

impl Visit for WarningVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "code" => self.warning.code = value.to_string(),
            "key" => self.warning.key = value.to_string(),
            "message" => self.warning.message = value.to_string(),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.warning.message = format!("{value:?}").trim_matches('"').to_string();
        }
    }
}

impl<S> Layer<S> for WarningCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != WARN_TARGET {
            return;
        }
        let mut visitor = WarningVisitor::default();
        event.record(&mut visitor);
        self.log.lock().push(visitor.warning);
    }
}

/// Run `f` with a [`WarningCapture`] installed as the thread's default
/// subscriber; returns the result and everything captured.
pub fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, Vec<CapturedWarning>) {
    let capture = WarningCapture::new();
    let log = capture.log();
    let subscriber = tracing_subscriber::registry().with(capture);
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, log.records())
}

/// Install a test-writer `fmt` subscriber filtered by `DEPTRACK_LOG`
/// (default `warn`). Safe to call more than once.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_env("DEPTRACK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use deptrack::{Value, observe, set_property};
    use serde_json::json;

    #[test]
    fn records_only_warning_target() {
        let ((), captured) = capture_warnings(|| {
            tracing::warn!(target: "deptrack::other", "ignored");
            tracing::warn!(target: WARN_TARGET, code = "c", key = "k", "hello");
        });
        assert_eq!(
            captured,
            vec![CapturedWarning {
                code: "c".into(),
                key: "k".into(),
                message: "hello".into(),
            }]
        );
    }

    #[test]
    fn captures_refused_root_addition() {
        let root = Value::from(json!({"a": 1}));
        observe(&root, true);
        let (_, captured) = capture_warnings(|| set_property(&root, "b", Value::from(1)));
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].code, "add_to_root");
        assert_eq!(captured[0].key, "b");
        assert!(captured[0].message.contains("`b`"));
    }

    #[test]
    fn log_handle_is_shared() {
        let capture = WarningCapture::new();
        let log = capture.log();
        let subscriber = tracing_subscriber::registry().with(capture);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: WARN_TARGET, code = "x", key = "y", "z");
        });
        assert_eq!(log.codes(), vec!["x".to_string()]);
        log.clear();
        assert!(log.is_empty());
    }
}
