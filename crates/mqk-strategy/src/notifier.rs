//! Severity Notifier: the fixed-signature diagnostic API handed to strategy code.
//!
//! One operation per severity level. Each level's argument list is declared in
//! [`NotifierSignatures`] (configuration, not inference). A call whose arity or
//! argument types do not match is a misuse: it returns [`NotifierMisuse`] and is
//! also recorded on the notifier, so the dispatcher captures it even when the
//! strategy drops the returned error.

use mqk_schemas::{DiagnosticEvent, EventSource, HookName, Severity, StrategyId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::DiagnosticSink;

/// Declared type of one notifier parameter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Text,
    Number,
    Any,
}

impl ParamKind {
    fn accepts(&self, arg: &NotifyArg) -> bool {
        match self {
            ParamKind::Any => true,
            ParamKind::Text => matches!(arg, NotifyArg::Text(_)),
            ParamKind::Number => matches!(arg, NotifyArg::Number(_)),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamKind::Text => "text",
            ParamKind::Number => "number",
            ParamKind::Any => "any",
        })
    }
}

/// One argument passed to a notifier.
#[derive(Clone, Debug, PartialEq)]
pub enum NotifyArg {
    Text(String),
    Number(f64),
    Bool(bool),
    Json(Value),
}

impl NotifyArg {
    fn type_name(&self) -> &'static str {
        match self {
            NotifyArg::Text(_) => "text",
            NotifyArg::Number(_) => "number",
            NotifyArg::Bool(_) => "bool",
            NotifyArg::Json(_) => "json",
        }
    }

    /// Plain-text rendering copied into the event.
    fn render(&self) -> String {
        match self {
            NotifyArg::Text(s) => s.clone(),
            NotifyArg::Number(n) => n.to_string(),
            NotifyArg::Bool(b) => b.to_string(),
            NotifyArg::Json(v) => v.to_string(),
        }
    }
}

impl From<&str> for NotifyArg {
    fn from(s: &str) -> Self {
        NotifyArg::Text(s.to_string())
    }
}

impl From<String> for NotifyArg {
    fn from(s: String) -> Self {
        NotifyArg::Text(s)
    }
}

impl From<f64> for NotifyArg {
    fn from(n: f64) -> Self {
        NotifyArg::Number(n)
    }
}

impl From<i64> for NotifyArg {
    fn from(n: i64) -> Self {
        NotifyArg::Number(n as f64)
    }
}

impl From<bool> for NotifyArg {
    fn from(b: bool) -> Self {
        NotifyArg::Bool(b)
    }
}

impl From<Value> for NotifyArg {
    fn from(v: Value) -> Self {
        NotifyArg::Json(v)
    }
}

/// Declared argument list for each severity level.
///
/// Default mirrors `notify_*(subject, body)`: a text subject plus one value of
/// any type, for every level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierSignatures {
    pub low: Vec<ParamKind>,
    pub medium: Vec<ParamKind>,
    pub high: Vec<ParamKind>,
}

impl Default for NotifierSignatures {
    fn default() -> Self {
        let subject_body = vec![ParamKind::Text, ParamKind::Any];
        Self {
            low: subject_body.clone(),
            medium: subject_body.clone(),
            high: subject_body,
        }
    }
}

impl NotifierSignatures {
    pub fn get(&self, severity: Severity) -> &[ParamKind] {
        match severity {
            Severity::Low => &self.low,
            Severity::Medium => &self.medium,
            Severity::High => &self.high,
        }
    }

    /// Every level needs at least one parameter and the first one (the
    /// message) must be able to hold text.
    pub fn validate(&self) -> Result<(), String> {
        for severity in Severity::ALL {
            let params = self.get(severity);
            match params.first() {
                None => return Err(format!("{} has no parameters", notifier_name(severity))),
                Some(ParamKind::Number) => {
                    return Err(format!(
                        "{} first parameter must be text or any",
                        notifier_name(severity)
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Wire name of the notifier for a severity level.
pub fn notifier_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "notify_low",
        Severity::Medium => "notify_medium",
        Severity::High => "notify_high",
    }
}

/// A notifier call that violated its declared signature.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NotifierMisuse {
    #[error("{notifier} expects {expected} argument(s), got {got}")]
    Arity {
        notifier: &'static str,
        severity: Severity,
        expected: usize,
        got: usize,
    },
    #[error("{notifier} argument {index} must be {expected}, got {got}")]
    Type {
        notifier: &'static str,
        severity: Severity,
        index: usize,
        expected: ParamKind,
        got: &'static str,
    },
}

impl NotifierMisuse {
    /// Severity of the notifier that was misused.
    pub fn severity(&self) -> Severity {
        match self {
            NotifierMisuse::Arity { severity, .. } | NotifierMisuse::Type { severity, .. } => {
                *severity
            }
        }
    }
}

/// Per-invocation notifier capability.
pub struct Notifier<'a> {
    strategy_id: &'a StrategyId,
    hook: HookName,
    signatures: &'a NotifierSignatures,
    sink: &'a dyn DiagnosticSink,
    misuse: Option<NotifierMisuse>,
    emitted: usize,
}

impl<'a> Notifier<'a> {
    pub(crate) fn new(
        strategy_id: &'a StrategyId,
        hook: HookName,
        signatures: &'a NotifierSignatures,
        sink: &'a dyn DiagnosticSink,
    ) -> Self {
        Self {
            strategy_id,
            hook,
            signatures,
            sink,
            misuse: None,
            emitted: 0,
        }
    }

    pub fn notify_low(&mut self, args: &[NotifyArg]) -> Result<(), NotifierMisuse> {
        self.notify(Severity::Low, args)
    }

    pub fn notify_medium(&mut self, args: &[NotifyArg]) -> Result<(), NotifierMisuse> {
        self.notify(Severity::Medium, args)
    }

    pub fn notify_high(&mut self, args: &[NotifyArg]) -> Result<(), NotifierMisuse> {
        self.notify(Severity::High, args)
    }

    /// Validate `args` against the level's signature, then build and forward
    /// a `STRATEGY_CODE` event. The first argument becomes the message, the
    /// rest become `details`.
    pub fn notify(&mut self, severity: Severity, args: &[NotifyArg]) -> Result<(), NotifierMisuse> {
        if let Err(misuse) = check_signature(severity, self.signatures.get(severity), args) {
            if self.misuse.is_none() {
                self.misuse = Some(misuse.clone());
            }
            return Err(misuse);
        }

        let mut rendered = args.iter().map(NotifyArg::render);
        let message = rendered.next().unwrap_or_default();
        let event = DiagnosticEvent::new(
            severity,
            EventSource::StrategyCode,
            self.strategy_id.clone(),
            self.hook,
            message,
        )
        .with_details(rendered.collect());

        match self.sink.forward(event) {
            Ok(()) => self.emitted += 1,
            Err(err) => tracing::warn!(
                strategy_id = %self.strategy_id,
                hook = %self.hook,
                error = %err,
                "diagnostic sink rejected notification"
            ),
        }
        Ok(())
    }

    /// Voluntary notifications successfully forwarded during this invocation.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// First misuse recorded during this invocation, if any.
    pub fn misuse(&self) -> Option<&NotifierMisuse> {
        self.misuse.as_ref()
    }

    pub(crate) fn take_misuse(&mut self) -> Option<NotifierMisuse> {
        self.misuse.take()
    }
}

fn check_signature(
    severity: Severity,
    params: &[ParamKind],
    args: &[NotifyArg],
) -> Result<(), NotifierMisuse> {
    let notifier = notifier_name(severity);
    if params.len() != args.len() {
        return Err(NotifierMisuse::Arity {
            notifier,
            severity,
            expected: params.len(),
            got: args.len(),
        });
    }
    for (index, (param, arg)) in params.iter().zip(args).enumerate() {
        if !param.accepts(arg) {
            return Err(NotifierMisuse::Type {
                notifier,
                severity,
                index,
                expected: *param,
                got: arg.type_name(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySink;
    use serde_json::json;

    fn with_notifier<R>(
        signatures: &NotifierSignatures,
        f: impl FnOnce(&mut Notifier<'_>) -> R,
    ) -> (R, MemorySink) {
        let sink = MemorySink::new();
        let id = StrategyId::new("notifier-test");
        let r = {
            let mut n = Notifier::new(&id, HookName::OnTick, signatures, &sink);
            f(&mut n)
        };
        (r, sink)
    }

    #[test]
    fn correct_call_forwards_one_strategy_code_event() {
        let sigs = NotifierSignatures::default();
        let (r, sink) = with_notifier(&sigs, |n| {
            n.notify_high(&["spread blowout".into(), 42i64.into()])
        });
        assert_eq!(r, Ok(()));

        let events = sink.drain();
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.severity(), Severity::High);
        assert_eq!(ev.source(), EventSource::StrategyCode);
        assert_eq!(ev.message(), "spread blowout");
        assert_eq!(ev.details(), ["42"]);
        assert_eq!(ev.hook_name(), HookName::OnTick);
        assert_eq!(ev.strategy_id().as_str(), "notifier-test");
    }

    #[test]
    fn rejected_notifications_are_not_counted_as_emitted() {
        struct RejectingSink;

        impl DiagnosticSink for RejectingSink {
            fn forward(&self, _event: DiagnosticEvent) -> anyhow::Result<()> {
                anyhow::bail!("audit disk full")
            }
        }

        let sigs = NotifierSignatures::default();
        let id = StrategyId::new("notifier-test");
        let mut n = Notifier::new(&id, HookName::OnTick, &sigs, &RejectingSink);
        assert_eq!(n.notify_high(&["spread blowout".into(), 42i64.into()]), Ok(()));
        assert_eq!(n.emitted(), 0);
        assert!(n.misuse().is_none());

        let (emitted, sink) = with_notifier(&sigs, |n| {
            n.notify_low(&["heartbeat".into(), "ok".into()]).unwrap();
            n.emitted()
        });
        assert_eq!(emitted, 1);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn wrong_arity_is_misuse_and_emits_nothing() {
        let sigs = NotifierSignatures::default();
        let ((r, recorded), sink) = with_notifier(&sigs, |n| {
            let r = n.notify_high(&["word hummingbird".into()]);
            (r, n.misuse().cloned())
        });

        let expected = NotifierMisuse::Arity {
            notifier: "notify_high",
            severity: Severity::High,
            expected: 2,
            got: 1,
        };
        assert_eq!(r, Err(expected.clone()));
        assert_eq!(recorded, Some(expected));
        assert!(sink.is_empty());
    }

    #[test]
    fn wrong_type_is_misuse() {
        let sigs = NotifierSignatures::default();
        let (r, sink) = with_notifier(&sigs, |n| n.notify_low(&[1.5f64.into(), "body".into()]));
        let err = r.unwrap_err();
        assert_eq!(
            err,
            NotifierMisuse::Type {
                notifier: "notify_low",
                severity: Severity::Low,
                index: 0,
                expected: ParamKind::Text,
                got: "number",
            }
        );
        assert_eq!(err.severity(), Severity::Low);
        assert!(err.to_string().contains("argument 0 must be text"));
        assert!(sink.is_empty());
    }

    #[test]
    fn first_misuse_is_kept() {
        let sigs = NotifierSignatures::default();
        let (first, _) = with_notifier(&sigs, |n| {
            let _ = n.notify_medium(&[]);
            let _ = n.notify_high(&["a".into(), "b".into(), "c".into()]);
            n.take_misuse()
        });
        assert!(matches!(
            first,
            Some(NotifierMisuse::Arity { notifier: "notify_medium", got: 0, .. })
        ));
    }

    #[test]
    fn signatures_are_per_level_configuration() {
        let sigs = NotifierSignatures {
            low: vec![ParamKind::Text],
            medium: vec![ParamKind::Text, ParamKind::Number],
            high: vec![ParamKind::Any, ParamKind::Any, ParamKind::Any],
        };
        let (results, sink) = with_notifier(&sigs, |n| {
            vec![
                n.notify_low(&["only subject".into()]),
                n.notify_medium(&["fill ratio".into(), 0.25f64.into()]),
                n.notify_medium(&["fill ratio".into(), "0.25".into()]),
                n.notify_high(&[json!({"k": 1}).into(), true.into(), "x".into()]),
            ]
        });
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(results[2], Err(NotifierMisuse::Type { index: 1, .. })));
        assert!(results[3].is_ok());
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn json_subject_renders_as_text() {
        let sigs = NotifierSignatures {
            high: vec![ParamKind::Any],
            ..NotifierSignatures::default()
        };
        let (_, sink) = with_notifier(&sigs, |n| n.notify_high(&[json!({"a": 1}).into()]));
        assert_eq!(sink.drain()[0].message(), r#"{"a":1}"#);
    }

    #[test]
    fn validate_rejects_empty_or_numeric_subject() {
        assert!(NotifierSignatures::default().validate().is_ok());

        let empty = NotifierSignatures {
            low: vec![],
            ..NotifierSignatures::default()
        };
        assert!(empty.validate().unwrap_err().contains("notify_low"));

        let numeric = NotifierSignatures {
            high: vec![ParamKind::Number],
            ..NotifierSignatures::default()
        };
        assert!(numeric.validate().is_err());
    }
}
