use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque identifier of a hosted strategy instance.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(String);

impl StrategyId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StrategyId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The fixed, platform-defined set of lifecycle hooks.
///
/// Serialized as the wire name (`"on_stop"`), which is also what
/// [`HookName::from_str`] accepts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookName {
    OnStart,
    OnStop,
    OnTick,
    OnOrderUpdate,
    OnCallback,
    OnOther,
}

impl HookName {
    pub const ALL: [HookName; 6] = [
        HookName::OnStart,
        HookName::OnStop,
        HookName::OnTick,
        HookName::OnOrderUpdate,
        HookName::OnCallback,
        HookName::OnOther,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookName::OnStart => "on_start",
            HookName::OnStop => "on_stop",
            HookName::OnTick => "on_tick",
            HookName::OnOrderUpdate => "on_order_update",
            HookName::OnCallback => "on_callback",
            HookName::OnOther => "on_other",
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hook name outside the fixed set.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown hook '{0}'")]
pub struct UnknownHook(pub String);

impl FromStr for HookName {
    type Err = UnknownHook;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookName::ALL
            .into_iter()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| UnknownHook(s.to_string()))
    }
}
