//! Hand-off point to the logging/audit collaborator.
//!
//! A sink takes ownership of each event; nothing in the core keeps a copy.

use mqk_schemas::{DiagnosticEvent, Severity};
use std::sync::{Arc, Mutex};

/// Receives every diagnostic the host produces (captures and voluntary
/// notifications). Called from worker threads, so it must be `Send + Sync`.
pub trait DiagnosticSink: Send + Sync {
    fn forward(&self, event: DiagnosticEvent) -> anyhow::Result<()>;
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for Arc<T> {
    fn forward(&self, event: DiagnosticEvent) -> anyhow::Result<()> {
        (**self).forward(event)
    }
}

/// Emits each event as a structured `tracing` record.
/// LOW → info, MEDIUM → warn, HIGH → error.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn forward(&self, event: DiagnosticEvent) -> anyhow::Result<()> {
        let strategy_id = event.strategy_id().as_str();
        let hook = event.hook_name().as_str();
        let source = event.source().as_str();
        let cause = event.cause().map(|c| c.detail.as_str()).unwrap_or("");
        match event.severity() {
            Severity::Low => {
                tracing::info!(strategy_id, hook, source, cause, "{}", event.message())
            }
            Severity::Medium => {
                tracing::warn!(strategy_id, hook, source, cause, "{}", event.message())
            }
            Severity::High => {
                tracing::error!(strategy_id, hook, source, cause, "{}", event.message())
            }
        }
        Ok(())
    }
}

/// Forwards a copy of every event to each inner sink, in order.
///
/// A failing sink does not stop the others; the first error is returned.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn DiagnosticSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn DiagnosticSink>>) -> Self {
        Self { sinks }
    }
}

impl DiagnosticSink for FanoutSink {
    fn forward(&self, event: DiagnosticEvent) -> anyhow::Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(err) = sink.forward(event.clone()) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-memory sink; the embedding application (or a test) drains it.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<DiagnosticEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every event received so far, oldest first.
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DiagnosticEvent>> {
        // A panic while holding this lock cannot leave the Vec half-written.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticSink for MemorySink {
    fn forward(&self, event: DiagnosticEvent) -> anyhow::Result<()> {
        self.lock().push(event);
        Ok(())
    }
}
