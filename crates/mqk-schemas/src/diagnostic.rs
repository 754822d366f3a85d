use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{next_event_timestamp, HookName, StrategyId};

/// Ordered severity scale (LOW < MEDIUM < HIGH).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity '{0}' (expected LOW | MEDIUM | HIGH)")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    /// Case-insensitive; config files tend to say `medium`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

/// Where a diagnostic originated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSource {
    /// Strategy logic: a voluntary notification or a fault raised by the hook body.
    StrategyCode,
    /// The dispatch mechanism: hook preparation failed, or the host abandoned the call.
    HostDispatch,
    /// A Severity Notifier call that violated its declared signature.
    NotifierMisuse,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::StrategyCode => "STRATEGY_CODE",
            EventSource::HostDispatch => "HOST_DISPATCH",
            EventSource::NotifierMisuse => "NOTIFIER_MISUSE",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the original failure, copied out as plain data at capture time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CauseKind {
    /// The hook returned an error.
    Error,
    /// The hook panicked.
    Panic,
    /// A notifier call did not match its signature.
    Misuse,
    /// The hook could not be prepared (bad arguments, broken strategy object).
    Dispatch,
    /// The host abandoned an invocation that exceeded its time budget.
    Timeout,
}

/// Plain-data description of the failure behind a diagnostic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCause {
    pub kind: CauseKind,
    /// Original failure text (may be a fixed-format fallback when the failure
    /// could not be rendered).
    pub detail: String,
    /// Source chain, outermost first, excluding `detail` itself.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
}

impl FailureCause {
    pub fn new(kind: CauseKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            chain: Vec::new(),
        }
    }

    pub fn with_chain(mut self, chain: Vec<String>) -> Self {
        self.chain = chain;
        self
    }
}

/// Canonical record for every captured failure or voluntary notification.
///
/// Self-contained at creation: every field is owned plain data. Fields are
/// private so the non-empty `message` invariant holds for events built in
/// process and for events read back from the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireDiagnosticEvent")]
pub struct DiagnosticEvent {
    severity: Severity,
    message: String,
    source: EventSource,
    strategy_id: StrategyId,
    hook_name: HookName,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cause: Option<FailureCause>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

impl DiagnosticEvent {
    /// Build an event stamped by the process event clock.
    ///
    /// A blank `message` is replaced with a synthesized one naming the source,
    /// hook and strategy.
    pub fn new(
        severity: Severity,
        source: EventSource,
        strategy_id: StrategyId,
        hook_name: HookName,
        message: impl Into<String>,
    ) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = synthesized_message(source, &strategy_id, hook_name);
        }
        Self {
            severity,
            message,
            source,
            strategy_id,
            hook_name,
            timestamp: next_event_timestamp(),
            cause: None,
            details: Vec::new(),
        }
    }

    pub fn with_cause(mut self, cause: FailureCause) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    /// Override the clock-issued timestamp (replay, fixtures).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source(&self) -> EventSource {
        self.source
    }

    pub fn strategy_id(&self) -> &StrategyId {
        &self.strategy_id
    }

    pub fn hook_name(&self) -> HookName {
        self.hook_name
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn cause(&self) -> Option<&FailureCause> {
        self.cause.as_ref()
    }

    pub fn details(&self) -> &[String] {
        &self.details
    }
}

/// Message used whenever a failure carries no usable text of its own.
pub fn synthesized_message(source: EventSource, strategy_id: &StrategyId, hook: HookName) -> String {
    format!("{source} diagnostic in hook '{hook}' of strategy '{strategy_id}'")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDiagnosticEvent {
    severity: Severity,
    message: String,
    source: EventSource,
    strategy_id: StrategyId,
    hook_name: HookName,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    cause: Option<FailureCause>,
    #[serde(default)]
    details: Vec<String>,
}

impl TryFrom<WireDiagnosticEvent> for DiagnosticEvent {
    type Error = String;

    fn try_from(w: WireDiagnosticEvent) -> Result<Self, Self::Error> {
        if w.message.trim().is_empty() {
            return Err("diagnostic event message must not be empty".to_string());
        }
        Ok(Self {
            severity: w.severity,
            message: w.message,
            source: w.source,
            strategy_id: w.strategy_id,
            hook_name: w.hook_name,
            timestamp: w.timestamp,
            cause: w.cause,
            details: w.details,
        })
    }
}
