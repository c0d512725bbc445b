use std::{fmt, sync::Arc, time::Duration};

use crate::types::Model;

/// User-provided callbacks for emitting metrics without taking on a tracing dependency.
#[derive(Clone, Default)]
pub struct MetricsCallbacks {
    pub attempt: Option<Arc<dyn Fn(AttemptMetrics) + Send + Sync>>,
    pub completion: Option<Arc<dyn Fn(CompletionMetrics) + Send + Sync>>,
}

impl MetricsCallbacks {
    pub fn with_attempt<F>(mut self, f: F) -> Self
    where
        F: Fn(AttemptMetrics) + Send + Sync + 'static,
    {
        self.attempt = Some(Arc::new(f));
        self
    }

    pub fn with_completion<F>(mut self, f: F) -> Self
    where
        F: Fn(CompletionMetrics) + Send + Sync + 'static,
    {
        self.completion = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for MetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCallbacks")
            .field("attempt", &self.attempt.as_ref().map(|_| "callback"))
            .field("completion", &self.completion.as_ref().map(|_| "callback"))
            .finish()
    }
}

/// Outcome of one generate-validate-execute attempt.
#[derive(Clone, Debug)]
pub struct AttemptMetrics {
    /// 1-based attempt index.
    pub attempt: u32,
    pub max_attempts: u32,
    pub latency: Duration,
    /// `"success"`, `"no_sql"`, `"not_read_only"`, `"execution"` or `"completion_error"`.
    pub outcome: &'static str,
    pub error: Option<String>,
}

/// Request metadata attached to completion metrics.
#[derive(Clone, Debug, Default)]
pub struct CompletionContext {
    pub model: Option<Model>,
    pub request_id: Option<String>,
}

impl CompletionContext {
    pub fn new(model: Option<Model>) -> Self {
        Self {
            model,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        if let Some(id) = request_id {
            if !id.trim().is_empty() {
                self.request_id = Some(id);
            }
        }
        self
    }
}

/// Latency and outcome of one HTTP completion request.
#[derive(Clone, Debug)]
pub struct CompletionMetrics {
    pub latency: Duration,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub context: CompletionContext,
}

/// Internal helper that owns the registered callbacks (if any).
#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    callbacks: MetricsCallbacks,
}

impl Telemetry {
    pub fn new(callbacks: Option<MetricsCallbacks>) -> Self {
        Self {
            callbacks: callbacks.unwrap_or_default(),
        }
    }

    pub fn attempt_enabled(&self) -> bool {
        self.callbacks.attempt.is_some()
    }

    #[cfg_attr(not(feature = "client"), allow(dead_code))]
    pub fn completion_enabled(&self) -> bool {
        self.callbacks.completion.is_some()
    }

    pub fn record_attempt(&self, metrics: AttemptMetrics) {
        if let Some(cb) = &self.callbacks.attempt {
            cb(metrics);
        }
    }

    #[cfg_attr(not(feature = "client"), allow(dead_code))]
    pub fn record_completion(&self, metrics: CompletionMetrics) {
        if let Some(cb) = &self.callbacks.completion {
            cb(metrics);
        }
    }
}
