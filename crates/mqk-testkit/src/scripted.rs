//! Scripted strategy: each hook runs a fixed list of [`Step`]s so scenario
//! tests can inject any fault into any hook without writing a new type.

use mqk_schemas::{HookName, MarketTick, OrderUpdate, Severity, StrategyId};
use mqk_strategy::{
    HookContext, HookResult, HookStatus, NotifyArg, Strategy, StrategyFault, StrategySpec,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One action inside a scripted hook body.
#[derive(Clone, Debug)]
pub enum Step {
    /// Call the notifier; a misuse is dropped on the floor, as careless
    /// strategy code would.
    Notify {
        severity: Severity,
        args: Vec<NotifyArg>,
    },
    /// Return an `anyhow` error.
    Fail(String),
    /// Return a [`StrategyFault`] carrying its own severity.
    Fault(StrategyFault),
    /// `panic!` with a text message.
    Panic(String),
    /// `panic_any` with a payload that is not text.
    PanicOpaque,
    /// Block the worker thread.
    Sleep(Duration),
}

impl Step {
    pub fn notify(severity: Severity, args: Vec<NotifyArg>) -> Self {
        Step::Notify { severity, args }
    }

    /// `notify_high(subject)` without the body argument.
    pub fn notify_high_missing_body(subject: &str) -> Self {
        Step::Notify {
            severity: Severity::High,
            args: vec![subject.into()],
        }
    }
}

/// What a scripted hook saw when it was called.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub strategy_id: StrategyId,
    pub hook: HookName,
    pub payload: Option<Value>,
}

/// Shared record of every call into one scripted instance.
///
/// Also tracks how many hooks of the instance were running at once, so a
/// test can assert that the host never overlapped them.
#[derive(Debug, Default)]
pub struct Journal {
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Journal {
    pub fn calls(&self) -> Vec<Call> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Highest number of simultaneously running hooks observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, call: Call) -> InFlight<'_> {
        self.lock().push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Call>> {
        // Scripted panics happen outside the lock.
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Decrements the in-flight counter on drop, including during unwinding.
struct InFlight<'a>(&'a Journal);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A strategy whose hook bodies are data.
///
/// Hooks with no script are left as the default slot (not provided).
pub struct ScriptedStrategy {
    name: String,
    script: HashMap<HookName, Vec<Step>>,
    journal: Arc<Journal>,
}

impl ScriptedStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: HashMap::new(),
            journal: Arc::new(Journal::default()),
        }
    }

    /// Provide `hook` with the given body.
    pub fn on(mut self, hook: HookName, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.insert(hook, steps.into_iter().collect());
        self
    }

    /// Provide `hook` with a body that completes immediately.
    pub fn completing(self, hook: HookName) -> Self {
        self.on(hook, Vec::new())
    }

    /// Provide every hook with the same body.
    pub fn on_every_hook(mut self, steps: Vec<Step>) -> Self {
        for hook in HookName::ALL {
            self.script.insert(hook, steps.clone());
        }
        self
    }

    pub fn journal(&self) -> Arc<Journal> {
        Arc::clone(&self.journal)
    }

    fn run(&mut self, cx: &mut HookContext<'_>, payload: Option<Value>) -> HookResult {
        let hook = cx.hook();
        let Some(steps) = self.script.get(&hook) else {
            return Ok(HookStatus::NotProvided);
        };
        let _in_flight = self.journal.enter(Call {
            strategy_id: cx.strategy_id().clone(),
            hook,
            payload,
        });

        for step in steps {
            match step {
                Step::Notify { severity, args } => {
                    let _ = cx.notifier().notify(*severity, args);
                }
                Step::Fail(msg) => return Err(anyhow::anyhow!("{msg}")),
                Step::Fault(fault) => return Err(fault.clone().into()),
                Step::Panic(msg) => panic!("{msg}"),
                Step::PanicOpaque => std::panic::panic_any(0xdead_u32),
                Step::Sleep(d) => std::thread::sleep(*d),
            }
        }
        Ok(HookStatus::Completed)
    }
}

impl Strategy for ScriptedStrategy {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new(self.name.clone())
    }

    fn on_start(&mut self, cx: &mut HookContext<'_>) -> HookResult {
        self.run(cx, None)
    }

    fn on_stop(&mut self, cx: &mut HookContext<'_>) -> HookResult {
        self.run(cx, None)
    }

    fn on_tick(&mut self, cx: &mut HookContext<'_>, tick: &MarketTick) -> HookResult {
        let payload = serde_json::to_value(tick)?;
        self.run(cx, Some(payload))
    }

    fn on_order_update(&mut self, cx: &mut HookContext<'_>, update: &OrderUpdate) -> HookResult {
        let payload = serde_json::to_value(update)?;
        self.run(cx, Some(payload))
    }

    fn on_callback(&mut self, cx: &mut HookContext<'_>, payload: Option<&Value>) -> HookResult {
        self.run(cx, payload.cloned())
    }

    fn on_other(&mut self, cx: &mut HookContext<'_>, data: &Value) -> HookResult {
        self.run(cx, Some(data.clone()))
    }
}
