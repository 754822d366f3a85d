use mqk_schemas::{HookName, StrategyId, UnknownHook};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::translator::discard;
use crate::{
    CapturedFailure, DiagnosticSink, DispatchError, FaultTranslator, HookArgs, HookDispatcher,
    HookStatus, HostSettings, InvocationPhase, RawFailure, Strategy, StrategySpec,
};

/// Host-side lifecycle of one registered strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Registered, `on_start` not yet run.
    Registered,
    Running,
    /// `on_stop` ran (captured or not).
    Stopped,
    /// `on_start` was captured.
    Failed,
    /// Taken out of service by host policy (timeout or repeated captures).
    Deactivated,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Registered => "REGISTERED",
            Lifecycle::Running => "RUNNING",
            Lifecycle::Stopped => "STOPPED",
            Lifecycle::Failed => "FAILED",
            Lifecycle::Deactivated => "DEACTIVATED",
        }
    }

    /// Whether `hook` may be invoked from this state.
    fn admits(&self, hook: HookName) -> bool {
        match hook {
            HookName::OnStart => matches!(
                self,
                Lifecycle::Registered | Lifecycle::Stopped | Lifecycle::Failed
            ),
            HookName::OnStop => matches!(self, Lifecycle::Running | Lifecycle::Failed),
            _ => *self == Lifecycle::Running,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    UnknownHook(#[from] UnknownHook),
    #[error("strategy id must not be empty")]
    EmptyId,
    #[error("no strategy registered as '{0}'")]
    UnknownStrategy(StrategyId),
    #[error("strategy '{0}' is already registered")]
    DuplicateStrategy(StrategyId),
    #[error("cannot run '{hook}' on strategy '{id}' while it is {lifecycle}")]
    InvalidLifecycle {
        id: StrategyId,
        hook: HookName,
        lifecycle: Lifecycle,
    },
    #[error("cannot unregister strategy '{0}' while it is RUNNING")]
    StillRunning(StrategyId),
    #[error("invocation of '{hook}' on strategy '{id}' was lost: {reason}")]
    InvocationLost {
        id: StrategyId,
        hook: HookName,
        reason: String,
    },
    #[error("strategy '{id}' could not describe itself: {detail}")]
    MalformedStrategy { id: StrategyId, detail: String },
}

/// What the caller gets back from every host invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationReport {
    pub strategy_id: StrategyId,
    pub hook: HookName,
    /// The captured event has already been forwarded to the host's sink.
    pub outcome: Result<HookStatus, CapturedFailure>,
    pub consecutive_failures: u32,
    /// Lifecycle after this invocation settled.
    pub lifecycle: Lifecycle,
}

impl InvocationReport {
    pub fn phase(&self) -> InvocationPhase {
        match self.outcome {
            Ok(_) => InvocationPhase::Completed,
            Err(_) => InvocationPhase::Captured,
        }
    }

    pub fn captured(&self) -> Option<&CapturedFailure> {
        self.outcome.as_ref().err()
    }
}

/// Snapshot of one strategy's bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyStatus {
    pub strategy_id: StrategyId,
    pub name: String,
    pub lifecycle: Lifecycle,
    pub consecutive_failures: u32,
    pub invocations: u64,
    pub captures: u64,
}

#[derive(Debug)]
struct Book {
    lifecycle: Lifecycle,
    consecutive_failures: u32,
    invocations: u64,
    captures: u64,
}

struct StrategySlot {
    spec: StrategySpec,
    instance: Arc<Mutex<Box<dyn Strategy>>>,
    /// Held for the whole invocation; hooks of one strategy never overlap.
    turn: tokio::sync::Mutex<()>,
    book: Mutex<Book>,
}

impl StrategySlot {
    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn status(&self, id: &StrategyId) -> StrategyStatus {
        let book = self.book();
        StrategyStatus {
            strategy_id: id.clone(),
            name: self.spec.name.clone(),
            lifecycle: book.lifecycle,
            consecutive_failures: book.consecutive_failures,
            invocations: book.invocations,
            captures: book.captures,
        }
    }
}

/// Holds strategy instances and their lifecycle, runs hooks on blocking
/// workers, and forwards every captured event to the sink.
///
/// Different strategies run concurrently; hooks of the same strategy are
/// strictly serialized. The host never panics or errors because of strategy
/// behavior: [`HostError`] is only about misuse of the host itself.
pub struct StrategyHost {
    runner: Runner,
    settings: HostSettings,
    slots: RwLock<BTreeMap<StrategyId, Arc<StrategySlot>>>,
}

impl StrategyHost {
    pub fn new(settings: HostSettings, sink: Arc<dyn DiagnosticSink>) -> Self {
        let dispatcher = HookDispatcher::new(
            FaultTranslator::new(settings.default_severity),
            settings.signatures.clone(),
        );
        let runner = Runner {
            dispatcher: Arc::new(dispatcher),
            sink,
            hook_timeout: settings.hook_timeout,
            max_consecutive_failures: settings.max_consecutive_failures,
        };
        Self {
            runner,
            settings,
            slots: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// Register a strategy under `id`. Duplicate ids are rejected.
    pub async fn register(
        &self,
        id: StrategyId,
        strategy: Box<dyn Strategy>,
    ) -> Result<StrategySpec, HostError> {
        if id.as_str().trim().is_empty() {
            discard(strategy);
            return Err(HostError::EmptyId);
        }

        let spec = match panic::catch_unwind(AssertUnwindSafe(|| strategy.spec())) {
            Ok(spec) => spec,
            Err(payload) => {
                discard(payload);
                discard(strategy);
                return Err(HostError::MalformedStrategy {
                    id,
                    detail: "spec() panicked".to_string(),
                });
            }
        };

        let mut slots = self.slots.write().await;
        if slots.contains_key(&id) {
            drop(slots);
            discard(strategy);
            return Err(HostError::DuplicateStrategy(id));
        }
        slots.insert(
            id.clone(),
            Arc::new(StrategySlot {
                spec: spec.clone(),
                instance: Arc::new(Mutex::new(strategy)),
                turn: tokio::sync::Mutex::new(()),
                book: Mutex::new(Book {
                    lifecycle: Lifecycle::Registered,
                    consecutive_failures: 0,
                    invocations: 0,
                    captures: 0,
                }),
            }),
        );
        tracing::info!(strategy_id = %id, name = %spec.name, "strategy registered");
        Ok(spec)
    }

    /// Remove a strategy that is not running.
    pub async fn unregister(&self, id: &StrategyId) -> Result<(), HostError> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get(id)
            .ok_or_else(|| HostError::UnknownStrategy(id.clone()))?;
        if slot.book().lifecycle == Lifecycle::Running {
            return Err(HostError::StillRunning(id.clone()));
        }
        slots.remove(id);
        tracing::info!(strategy_id = %id, "strategy unregistered");
        Ok(())
    }

    pub async fn lifecycle(&self, id: &StrategyId) -> Result<Lifecycle, HostError> {
        Ok(self.slot(id).await?.book().lifecycle)
    }

    pub async fn status(&self, id: &StrategyId) -> Result<StrategyStatus, HostError> {
        Ok(self.slot(id).await?.status(id))
    }

    /// All strategies, ordered by id.
    pub async fn list(&self) -> Vec<StrategyStatus> {
        let slots = self.slots.read().await;
        slots.iter().map(|(id, slot)| slot.status(id)).collect()
    }

    /// Run `on_start`. Captured ⇒ `Failed`, otherwise `Running`.
    pub async fn start(&self, id: &StrategyId) -> Result<InvocationReport, HostError> {
        self.invoke_hook(id, HookName::OnStart, HookArgs::none())
            .await
    }

    /// Run `on_stop`. The strategy ends `Stopped` either way; a captured
    /// event is still forwarded.
    pub async fn stop(&self, id: &StrategyId) -> Result<InvocationReport, HostError> {
        self.invoke_hook(id, HookName::OnStop, HookArgs::none())
            .await
    }

    /// String-facing entry point. Unknown hook names are rejected before any
    /// strategy code runs.
    pub async fn invoke(
        &self,
        id: &StrategyId,
        hook_name: &str,
        args: HookArgs,
    ) -> Result<InvocationReport, HostError> {
        let hook: HookName = hook_name.parse()?;
        self.invoke_hook(id, hook, args).await
    }

    /// The invocation runs as its own task: dropping the returned future does
    /// not cancel it, and its outcome is still settled and forwarded.
    pub async fn invoke_hook(
        &self,
        id: &StrategyId,
        hook: HookName,
        args: HookArgs,
    ) -> Result<InvocationReport, HostError> {
        let slot = self.slot(id).await?;
        let runner = self.runner.clone();
        let task_id = id.clone();
        let task = tokio::spawn(async move { runner.run(slot, task_id, hook, args).await });
        task.await.map_err(|err| HostError::InvocationLost {
            id: id.clone(),
            hook,
            reason: err.to_string(),
        })?
    }

    async fn slot(&self, id: &StrategyId) -> Result<Arc<StrategySlot>, HostError> {
        self.slots
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| HostError::UnknownStrategy(id.clone()))
    }
}

/// Owned handles one invocation task needs.
#[derive(Clone)]
struct Runner {
    dispatcher: Arc<HookDispatcher>,
    sink: Arc<dyn DiagnosticSink>,
    hook_timeout: Option<Duration>,
    max_consecutive_failures: u32,
}

impl Runner {
    async fn run(
        self,
        slot: Arc<StrategySlot>,
        id: StrategyId,
        hook: HookName,
        args: HookArgs,
    ) -> Result<InvocationReport, HostError> {
        let _turn = slot.turn.lock().await;

        let lifecycle = slot.book().lifecycle;
        if !lifecycle.admits(hook) {
            return Err(HostError::InvalidLifecycle {
                id,
                hook,
                lifecycle,
            });
        }

        let (outcome, timed_out) = self.run_on_worker(&slot, &id, hook, args).await;
        let report = self.settle(&slot, &id, hook, outcome, timed_out);

        if let Err(captured) = &report.outcome {
            if let Err(err) = self.sink.forward(captured.event().clone()) {
                tracing::warn!(
                    strategy_id = %id,
                    hook = %hook,
                    error = %err,
                    "diagnostic sink rejected captured event"
                );
            }
        }
        Ok(report)
    }

    /// Returns the outcome and whether the invocation was abandoned on timeout.
    async fn run_on_worker(
        &self,
        slot: &StrategySlot,
        id: &StrategyId,
        hook: HookName,
        args: HookArgs,
    ) -> (Result<HookStatus, CapturedFailure>, bool) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let sink = Arc::clone(&self.sink);
        let instance = Arc::clone(&slot.instance);
        let worker_id = id.clone();

        let job = move || {
            let mut guard = match instance.lock() {
                Ok(guard) => guard,
                Err(_) => {
                    let err = DispatchError::StrategyPoisoned {
                        strategy_id: worker_id.clone(),
                    };
                    return Err(dispatcher.capture(RawFailure::Dispatch(err), &worker_id, hook));
                }
            };
            dispatcher.invoke(&mut **guard, &worker_id, hook, &args, &*sink)
        };

        let handle = tokio::task::spawn_blocking(job);
        let joined = match self.hook_timeout {
            None => handle.await,
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The worker keeps the instance locked until the hook
                    // returns; the strategy is deactivated so nothing waits on it.
                    let captured = self
                        .dispatcher
                        .capture(RawFailure::Timeout { after: limit }, id, hook);
                    return (Err(captured), true);
                }
            },
        };

        match joined {
            Ok(outcome) => (outcome, false),
            Err(join_err) => {
                let err = DispatchError::WorkerLost {
                    reason: join_err.to_string(),
                };
                (
                    Err(self.dispatcher.capture(RawFailure::Dispatch(err), id, hook)),
                    false,
                )
            }
        }
    }

    fn settle(
        &self,
        slot: &StrategySlot,
        id: &StrategyId,
        hook: HookName,
        outcome: Result<HookStatus, CapturedFailure>,
        timed_out: bool,
    ) -> InvocationReport {
        let mut book = slot.book();
        let before = book.lifecycle;
        book.invocations += 1;

        match &outcome {
            Ok(_) => {
                book.consecutive_failures = 0;
                match hook {
                    HookName::OnStart => book.lifecycle = Lifecycle::Running,
                    HookName::OnStop => book.lifecycle = Lifecycle::Stopped,
                    _ => {}
                }
            }
            Err(_) => {
                book.consecutive_failures += 1;
                book.captures += 1;
                let limit = self.max_consecutive_failures;
                book.lifecycle = if timed_out {
                    Lifecycle::Deactivated
                } else if hook == HookName::OnStop {
                    Lifecycle::Stopped
                } else if hook == HookName::OnStart {
                    Lifecycle::Failed
                } else if limit > 0 && book.consecutive_failures >= limit {
                    Lifecycle::Deactivated
                } else {
                    book.lifecycle
                };
            }
        }

        if book.lifecycle != before {
            if book.lifecycle == Lifecycle::Deactivated {
                tracing::warn!(
                    strategy_id = %id,
                    hook = %hook,
                    consecutive_failures = book.consecutive_failures,
                    timed_out,
                    "strategy deactivated"
                );
            } else {
                tracing::info!(
                    strategy_id = %id,
                    from = %before,
                    to = %book.lifecycle,
                    "strategy lifecycle changed"
                );
            }
        }

        InvocationReport {
            strategy_id: id.clone(),
            hook,
            outcome,
            consecutive_failures: book.consecutive_failures,
            lifecycle: book.lifecycle,
        }
    }
}
