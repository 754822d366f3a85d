use mqk_schemas::{MarketTick, OrderUpdate, Severity};
use serde_json::Value;

use crate::HookContext;

/// Strategy identity as reported by the strategy itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategySpec {
    pub name: String,
}

impl StrategySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// What a hook slot did when called.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HookStatus {
    /// The strategy implements this hook and it ran to completion.
    Completed,
    /// The strategy does not implement this hook (the default slot).
    NotProvided,
}

/// Return type of every hook slot. Strategy code may fail with any error.
pub type HookResult = anyhow::Result<HookStatus>;

/// A hosted strategy: one typed slot per lifecycle hook.
///
/// Every slot is optional; the default body reports [`HookStatus::NotProvided`]
/// and the dispatcher treats that as a no-op success. Slots receive a
/// [`HookContext`] scoped to the single invocation, which carries the
/// Severity Notifier capability.
///
/// The host guarantees that two hooks of the same instance never run
/// concurrently, so slots take `&mut self`.
pub trait Strategy: Send {
    fn spec(&self) -> StrategySpec;

    fn on_start(&mut self, _cx: &mut HookContext<'_>) -> HookResult {
        Ok(HookStatus::NotProvided)
    }

    fn on_stop(&mut self, _cx: &mut HookContext<'_>) -> HookResult {
        Ok(HookStatus::NotProvided)
    }

    fn on_tick(&mut self, _cx: &mut HookContext<'_>, _tick: &MarketTick) -> HookResult {
        Ok(HookStatus::NotProvided)
    }

    fn on_order_update(&mut self, _cx: &mut HookContext<'_>, _update: &OrderUpdate) -> HookResult {
        Ok(HookStatus::NotProvided)
    }

    /// Timer/callback the strategy asked the platform for; `payload` is
    /// whatever the strategy attached when it asked.
    fn on_callback(&mut self, _cx: &mut HookContext<'_>, _payload: Option<&Value>) -> HookResult {
        Ok(HookStatus::NotProvided)
    }

    /// Any other data the platform routes to strategies.
    fn on_other(&mut self, _cx: &mut HookContext<'_>, _data: &Value) -> HookResult {
        Ok(HookStatus::NotProvided)
    }
}

/// Ordered hook arguments as received from the host's callers.
///
/// Decoding into the typed payload of each slot happens in the dispatcher.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HookArgs(Vec<Value>);

impl HookArgs {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn one(v: Value) -> Self {
        Self(vec![v])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }
}

impl From<Vec<Value>> for HookArgs {
    fn from(v: Vec<Value>) -> Self {
        Self(v)
    }
}

/// A strategy failure that carries its own severity.
///
/// Hooks return it through `anyhow` (`return Err(StrategyFault::high("..").into())`);
/// the translator uses the severity instead of the platform default.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StrategyFault {
    pub severity: Severity,
    pub message: String,
}

impl StrategyFault {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    pub fn low(message: impl Into<String>) -> Self {
        Self::new(Severity::Low, message)
    }

    pub fn medium(message: impl Into<String>) -> Self {
        Self::new(Severity::Medium, message)
    }

    pub fn high(message: impl Into<String>) -> Self {
        Self::new(Severity::High, message)
    }
}
