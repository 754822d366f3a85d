//! Fault Translator: turns whatever escaped a hook into a [`DiagnosticEvent`].
//!
//! Only plain data leaves this module. The raw failure (error, panic payload)
//! is rendered, copied, and dropped here; a failure that cannot be rendered
//! gets a fixed-format message instead of escaping.

use mqk_schemas::{
    CauseKind, DiagnosticEvent, EventSource, FailureCause, HookName, Severity, StrategyId,
};
use std::any::Any;
use std::fmt::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crate::{DispatchError, NotifierMisuse, StrategyFault};

/// Severity of an invocation the host had to abandon.
pub const TIMEOUT_SEVERITY: Severity = Severity::High;

/// Anything that can end an invocation other than a normal return.
pub enum RawFailure {
    /// The hook returned an error.
    Error(anyhow::Error),
    /// The hook panicked; the payload as caught by `catch_unwind`.
    Panic(Box<dyn Any + Send + 'static>),
    /// The notifier recorded a signature violation during the hook.
    Misuse(NotifierMisuse),
    /// The hook could not be prepared or the strategy object is unusable.
    Dispatch(DispatchError),
    /// The host gave up waiting.
    Timeout { after: Duration },
}

impl fmt::Debug for RawFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never format user payloads here.
        let name = match self {
            RawFailure::Error(_) => "Error",
            RawFailure::Panic(_) => "Panic",
            RawFailure::Misuse(_) => "Misuse",
            RawFailure::Dispatch(_) => "Dispatch",
            RawFailure::Timeout { .. } => "Timeout",
        };
        f.debug_tuple("RawFailure").field(&name).finish()
    }
}

/// Internal: secondary failure while extracting text from a raw failure.
#[derive(Debug, thiserror::Error)]
enum TranslationError {
    #[error("display implementation failed")]
    Unrenderable,
    #[error("display implementation panicked")]
    Panicked,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FaultTranslator {
    default_severity: Severity,
}

impl Default for FaultTranslator {
    fn default() -> Self {
        Self::new(Severity::Medium)
    }
}

impl FaultTranslator {
    pub fn new(default_severity: Severity) -> Self {
        Self { default_severity }
    }

    pub fn default_severity(&self) -> Severity {
        self.default_severity
    }

    /// Classify `raw` and build its event. Never panics, never returns an
    /// empty message.
    pub fn translate(
        &self,
        raw: RawFailure,
        strategy_id: &StrategyId,
        hook: HookName,
    ) -> DiagnosticEvent {
        let source = classify(&raw);
        match panic::catch_unwind(AssertUnwindSafe(|| self.build(raw, source, strategy_id, hook)))
        {
            Ok(event) => event,
            Err(payload) => {
                discard(payload);
                tracing::warn!(
                    strategy_id = %strategy_id,
                    hook = %hook,
                    "fault translation panicked; emitting fallback event"
                );
                DiagnosticEvent::new(
                    self.default_severity,
                    source,
                    strategy_id.clone(),
                    hook,
                    fallback_message(strategy_id, hook, &TranslationError::Panicked),
                )
            }
        }
    }

    fn build(
        &self,
        raw: RawFailure,
        source: EventSource,
        strategy_id: &StrategyId,
        hook: HookName,
    ) -> DiagnosticEvent {
        let (severity, text, cause) = match raw {
            RawFailure::Misuse(misuse) => {
                let text = misuse.to_string();
                let cause = FailureCause::new(CauseKind::Misuse, text.clone());
                (misuse.severity(), text, cause)
            }
            RawFailure::Dispatch(err) => {
                let text = err.to_string();
                let cause = FailureCause::new(CauseKind::Dispatch, text.clone());
                (self.default_severity, text, cause)
            }
            RawFailure::Timeout { after } => {
                let text = format!(
                    "hook '{hook}' of strategy '{strategy_id}' did not finish within {}ms and was abandoned",
                    after.as_millis()
                );
                let cause = FailureCause::new(CauseKind::Timeout, text.clone());
                (TIMEOUT_SEVERITY, text, cause)
            }
            RawFailure::Error(err) => {
                let (severity, kind) = if let Some(fault) = err.downcast_ref::<StrategyFault>() {
                    (fault.severity, CauseKind::Error)
                } else if let Some(misuse) = err.downcast_ref::<NotifierMisuse>() {
                    (misuse.severity(), CauseKind::Misuse)
                } else if err.downcast_ref::<DispatchError>().is_some() {
                    (self.default_severity, CauseKind::Dispatch)
                } else {
                    (self.default_severity, CauseKind::Error)
                };
                let text = render(&err)
                    .unwrap_or_else(|e| fallback_message(strategy_id, hook, &e));
                let chain = err
                    .chain()
                    .skip(1)
                    .map(|c| render(c).unwrap_or_else(|e| format!("<{e}>")))
                    .collect();
                discard(err);
                let cause = FailureCause::new(kind, text.clone()).with_chain(chain);
                (severity, text, cause)
            }
            RawFailure::Panic(payload) => {
                let text = panic_text(payload.as_ref())
                    .map(|t| format!("panic: {t}"))
                    .unwrap_or_else(|| "panic with non-text payload".to_string());
                let severity = payload
                    .downcast_ref::<StrategyFault>()
                    .map_or(self.default_severity, |fault| fault.severity);
                discard(payload);
                let cause = FailureCause::new(CauseKind::Panic, text.clone());
                (severity, text, cause)
            }
        };

        // DiagnosticEvent::new substitutes a synthesized message when `text` is blank.
        DiagnosticEvent::new(severity, source, strategy_id.clone(), hook, text).with_cause(cause)
    }
}

/// Source classification; looks only at our own types, never calls user code.
fn classify(raw: &RawFailure) -> EventSource {
    match raw {
        RawFailure::Misuse(_) => EventSource::NotifierMisuse,
        RawFailure::Dispatch(_) | RawFailure::Timeout { .. } => EventSource::HostDispatch,
        RawFailure::Panic(_) => EventSource::StrategyCode,
        RawFailure::Error(err) => {
            if err.downcast_ref::<NotifierMisuse>().is_some() {
                EventSource::NotifierMisuse
            } else if err.downcast_ref::<DispatchError>().is_some() {
                EventSource::HostDispatch
            } else {
                EventSource::StrategyCode
            }
        }
    }
}

/// Render through `Display` without letting a broken impl escape.
fn render<T: fmt::Display + ?Sized>(value: &T) -> Result<String, TranslationError> {
    let mut out = String::new();
    match panic::catch_unwind(AssertUnwindSafe(|| write!(out, "{value}"))) {
        Ok(Ok(())) => Ok(out),
        Ok(Err(fmt::Error)) => Err(TranslationError::Unrenderable),
        Err(payload) => {
            discard(payload);
            Err(TranslationError::Panicked)
        }
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        Some((*s).to_string())
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Some(s.clone())
    } else if let Some(fault) = payload.downcast_ref::<StrategyFault>() {
        Some(fault.message.clone())
    } else {
        None
    }
}

fn fallback_message(strategy_id: &StrategyId, hook: HookName, err: &TranslationError) -> String {
    format!("unrenderable failure in hook '{hook}' of strategy '{strategy_id}' ({err})")
}

/// Drop a value whose destructor is user code. A panicking destructor is
/// contained; its own payload is leaked rather than dropped.
pub(crate) fn discard<T>(value: T) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || drop(value))) {
        std::mem::forget(payload);
    }
}
