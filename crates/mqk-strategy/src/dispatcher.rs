//! Hook Dispatcher: invokes one hook of one strategy behind a capture boundary.
//!
//! The dispatcher is stateless between invocations: it owns only the
//! translator and the notifier signatures, both read-only after construction,
//! so a single instance can serve every strategy from every worker thread.

use mqk_schemas::{DiagnosticEvent, EventSource, HookName, MarketTick, OrderUpdate, Severity, StrategyId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::translator::discard;
use crate::{
    DiagnosticSink, FaultTranslator, HookArgs, HookContext, HookResult, HookStatus,
    NotifierSignatures, RawFailure, Strategy,
};

/// Per-invocation state machine: `Pending → Running → {Completed | Captured}`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InvocationPhase {
    Pending,
    Running,
    Completed,
    Captured,
}

impl InvocationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationPhase::Completed | InvocationPhase::Captured)
    }

    fn can_advance_to(&self, next: InvocationPhase) -> bool {
        use InvocationPhase::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Captured) | (Running, Completed) | (Running, Captured)
        )
    }
}

/// The hook could not be resolved or prepared, or the strategy object is unusable.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("hook '{hook}' takes {expected} argument(s), got {got}")]
    Arity {
        hook: HookName,
        expected: &'static str,
        got: usize,
    },
    #[error("hook '{hook}' argument could not be decoded: {reason}")]
    BadPayload { hook: HookName, reason: String },
    #[error("strategy '{strategy_id}' is unusable after an earlier fault")]
    StrategyPoisoned { strategy_id: StrategyId },
    #[error("hook worker was lost before reporting: {reason}")]
    WorkerLost { reason: String },
}

/// A failure that was contained and translated. Holds only plain data.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedFailure {
    event: DiagnosticEvent,
}

impl CapturedFailure {
    pub fn event(&self) -> &DiagnosticEvent {
        &self.event
    }

    pub fn into_event(self) -> DiagnosticEvent {
        self.event
    }

    pub fn severity(&self) -> Severity {
        self.event.severity()
    }

    pub fn source(&self) -> EventSource {
        self.event.source()
    }

    pub fn hook(&self) -> HookName {
        self.event.hook_name()
    }

    pub fn strategy_id(&self) -> &StrategyId {
        self.event.strategy_id()
    }
}

impl fmt::Display for CapturedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} captured in '{}' of '{}': {}",
            self.event.severity(),
            self.event.source(),
            self.event.hook_name(),
            self.event.strategy_id(),
            self.event.message()
        )
    }
}

impl std::error::Error for CapturedFailure {}

/// Typed call built from [`HookArgs`] before any strategy code runs.
enum PreparedCall {
    Start,
    Stop,
    Tick(MarketTick),
    OrderUpdate(OrderUpdate),
    Callback(Option<Value>),
    Other(Value),
}

impl PreparedCall {
    fn prepare(hook: HookName, args: &HookArgs) -> Result<Self, DispatchError> {
        let args = args.as_slice();
        let arity = |expected: &'static str| DispatchError::Arity {
            hook,
            expected,
            got: args.len(),
        };
        match hook {
            HookName::OnStart | HookName::OnStop => {
                if !args.is_empty() {
                    return Err(arity("no"));
                }
                Ok(if hook == HookName::OnStart {
                    PreparedCall::Start
                } else {
                    PreparedCall::Stop
                })
            }
            HookName::OnTick => match args {
                [v] => decode(hook, v).map(PreparedCall::Tick),
                _ => Err(arity("exactly 1")),
            },
            HookName::OnOrderUpdate => match args {
                [v] => decode(hook, v).map(PreparedCall::OrderUpdate),
                _ => Err(arity("exactly 1")),
            },
            HookName::OnCallback => match args {
                [] => Ok(PreparedCall::Callback(None)),
                [v] => Ok(PreparedCall::Callback(Some(v.clone()))),
                _ => Err(arity("0 or 1")),
            },
            HookName::OnOther => match args {
                [v] => Ok(PreparedCall::Other(v.clone())),
                _ => Err(arity("exactly 1")),
            },
        }
    }

    fn run(&self, strategy: &mut dyn Strategy, cx: &mut HookContext<'_>) -> HookResult {
        match self {
            PreparedCall::Start => strategy.on_start(cx),
            PreparedCall::Stop => strategy.on_stop(cx),
            PreparedCall::Tick(tick) => strategy.on_tick(cx, tick),
            PreparedCall::OrderUpdate(update) => strategy.on_order_update(cx, update),
            PreparedCall::Callback(payload) => strategy.on_callback(cx, payload.as_ref()),
            PreparedCall::Other(data) => strategy.on_other(cx, data),
        }
    }
}

fn decode<T: DeserializeOwned>(hook: HookName, v: &Value) -> Result<T, DispatchError> {
    T::deserialize(v).map_err(|e| DispatchError::BadPayload {
        hook,
        reason: e.to_string(),
    })
}

/// Tracks one invocation through its phases.
struct Invocation<'a> {
    strategy_id: &'a StrategyId,
    hook: HookName,
    phase: InvocationPhase,
}

impl<'a> Invocation<'a> {
    fn new(strategy_id: &'a StrategyId, hook: HookName) -> Self {
        Self {
            strategy_id,
            hook,
            phase: InvocationPhase::Pending,
        }
    }

    fn advance(&mut self, next: InvocationPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid invocation transition {:?} -> {:?}",
            self.phase,
            next
        );
        tracing::trace!(
            strategy_id = %self.strategy_id,
            hook = %self.hook,
            from = ?self.phase,
            to = ?next,
            "invocation phase"
        );
        self.phase = next;
    }
}

#[derive(Clone, Debug, Default)]
pub struct HookDispatcher {
    translator: FaultTranslator,
    signatures: NotifierSignatures,
}

impl HookDispatcher {
    pub fn new(translator: FaultTranslator, signatures: NotifierSignatures) -> Self {
        Self {
            translator,
            signatures,
        }
    }

    pub fn translator(&self) -> &FaultTranslator {
        &self.translator
    }

    pub fn signatures(&self) -> &NotifierSignatures {
        &self.signatures
    }

    /// Run `hook` on `strategy` and block until it returns or is captured.
    ///
    /// A hook the strategy does not provide is a no-op success
    /// (`Ok(HookStatus::NotProvided)`). Every failure (error, panic, notifier
    /// misuse, bad arguments) comes back as a [`CapturedFailure`]; nothing
    /// raw escapes. Voluntary notifications made by the hook go straight to
    /// `sink`; the captured event is returned, not forwarded.
    ///
    /// When several failures happen in one invocation, the first recorded
    /// notifier misuse wins; later errors or panics are dropped.
    pub fn invoke(
        &self,
        strategy: &mut dyn Strategy,
        strategy_id: &StrategyId,
        hook: HookName,
        args: &HookArgs,
        sink: &dyn DiagnosticSink,
    ) -> Result<HookStatus, CapturedFailure> {
        let mut invocation = Invocation::new(strategy_id, hook);

        let call = match PreparedCall::prepare(hook, args) {
            Ok(call) => call,
            Err(err) => {
                invocation.advance(InvocationPhase::Captured);
                return Err(self.capture(RawFailure::Dispatch(err), strategy_id, hook));
            }
        };

        invocation.advance(InvocationPhase::Running);
        let mut cx = HookContext::new(strategy_id, hook, &self.signatures, sink);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call.run(strategy, &mut cx)));
        let misuse = cx.into_notifier().take_misuse();
        discard(call);

        let raw = match (misuse, outcome) {
            (None, Ok(Ok(status))) => {
                invocation.advance(InvocationPhase::Completed);
                return Ok(status);
            }
            (Some(misuse), rest) => {
                if rest.as_ref().map_or(true, |r| r.is_err()) {
                    tracing::debug!(
                        strategy_id = %strategy_id,
                        hook = %hook,
                        "later failure dropped in favor of notifier misuse"
                    );
                }
                discard(rest);
                RawFailure::Misuse(misuse)
            }
            (None, Ok(Err(err))) => RawFailure::Error(err),
            (None, Err(payload)) => RawFailure::Panic(payload),
        };

        invocation.advance(InvocationPhase::Captured);
        Err(self.capture(raw, strategy_id, hook))
    }

    /// Resolve a failure that happened outside [`invoke`](Self::invoke)
    /// (host timeout, lost worker, poisoned strategy) into a capture.
    pub fn capture(
        &self,
        raw: RawFailure,
        strategy_id: &StrategyId,
        hook: HookName,
    ) -> CapturedFailure {
        let event = self.translator.translate(raw, strategy_id, hook);
        tracing::debug!(
            strategy_id = %strategy_id,
            hook = %hook,
            severity = %event.severity(),
            source = %event.source(),
            "hook failure captured"
        );
        CapturedFailure { event }
    }
}
