//! Plugin Registry: catalogue of strategies the host can instantiate.
//!
//! # Purpose
//! [`StrategyHost`](crate::StrategyHost) holds *running* instances keyed by
//! [`StrategyId`](mqk_schemas::StrategyId). `PluginRegistry` is the step
//! before that: a catalogue of *available* strategies, each represented by:
//!
//! - [`StrategyMeta`]: static metadata (name, version, description).
//! - A [`StrategyFactory`]: a `Send + Sync` closure producing a fresh
//!   `Box<dyn Strategy>` on demand.
//!
//! Instantiation is strategy code too: a factory that panics is reported as
//! [`RegistryError::FactoryPanicked`] and never unwinds into the caller.
//!
//! # Usage
//! ```ignore
//! let mut reg = PluginRegistry::new();
//! reg.register(
//!     StrategyMeta::new("momentum", "1.0.0", "tick momentum"),
//!     || Box::new(Momentum::default()),
//! )?;
//!
//! let strategy = reg.instantiate_verified("momentum")?;
//! host.register(StrategyId::new("momentum-1"), strategy).await?;
//! ```

use std::panic::{self, AssertUnwindSafe};

use crate::translator::discard;
use crate::Strategy;

// ---------------------------------------------------------------------------
// Factory type alias
// ---------------------------------------------------------------------------

/// A thread-safe factory closure that produces a fresh strategy instance.
pub type StrategyFactory = Box<dyn Fn() -> Box<dyn Strategy> + Send + Sync>;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Static metadata for a registered strategy, queryable without instantiating it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyMeta {
    /// Registry key. Must be non-empty; compared case-sensitively.
    pub name: String,

    /// Version string (e.g. `"1.0.0"`). Not validated.
    pub version: String,

    pub description: String,
}

impl StrategyMeta {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("strategy '{name}' is already registered")]
    DuplicateName { name: String },
    #[error("no strategy named '{name}' is registered")]
    UnknownStrategy { name: String },
    #[error("strategy name must not be empty")]
    EmptyName,
    /// The instance reports a different name than the metadata it was registered under.
    #[error("strategy '{name}': instance reports name '{spec_name}'")]
    SpecMismatch { name: String, spec_name: String },
    #[error("factory for strategy '{name}' panicked: {detail}")]
    FactoryPanicked { name: String, detail: String },
}

// ---------------------------------------------------------------------------
// PluginRegistry
// ---------------------------------------------------------------------------

struct RegistryEntry {
    meta: StrategyMeta,
    factory: StrategyFactory,
}

/// Catalogue of available strategies and their factories.
///
/// Insertion order is preserved in `list()`.
#[derive(Default)]
pub struct PluginRegistry {
    entries: Vec<RegistryEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// - [`RegistryError::EmptyName`] if `meta.name` is empty/whitespace.
    /// - [`RegistryError::DuplicateName`] if the name is taken.
    pub fn register<F>(&mut self, meta: StrategyMeta, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn Strategy> + Send + Sync + 'static,
    {
        if meta.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.contains(&meta.name) {
            return Err(RegistryError::DuplicateName {
                name: meta.name.clone(),
            });
        }
        self.entries.push(RegistryEntry {
            meta,
            factory: Box::new(factory),
        });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.meta.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list(&self) -> Vec<&StrategyMeta> {
        self.entries.iter().map(|e| &e.meta).collect()
    }

    pub fn lookup(&self, name: &str) -> Result<&StrategyMeta, RegistryError> {
        self.entry(name).map(|e| &e.meta)
    }

    /// Build a fresh instance. Every call runs the factory again so no state
    /// leaks between instances.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Strategy>, RegistryError> {
        let entry = self.entry(name)?;
        call_factory(name, &entry.factory)
    }

    /// Like [`instantiate`](Self::instantiate), but also require that the
    /// instance's `spec().name` matches the registered name.
    pub fn instantiate_verified(&self, name: &str) -> Result<Box<dyn Strategy>, RegistryError> {
        let strategy = self.instantiate(name)?;
        let spec = match panic::catch_unwind(AssertUnwindSafe(|| strategy.spec())) {
            Ok(spec) => spec,
            Err(payload) => {
                discard(payload);
                discard(strategy);
                return Err(RegistryError::FactoryPanicked {
                    name: name.to_string(),
                    detail: "spec() panicked".to_string(),
                });
            }
        };
        if spec.name != name {
            discard(strategy);
            return Err(RegistryError::SpecMismatch {
                name: name.to_string(),
                spec_name: spec.name,
            });
        }
        Ok(strategy)
    }

    /// Returns `true` if the strategy was registered. Order of the rest is kept.
    pub fn deregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.meta.name != name);
        self.entries.len() < before
    }

    fn entry(&self, name: &str) -> Result<&RegistryEntry, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.meta.name == name)
            .ok_or_else(|| RegistryError::UnknownStrategy {
                name: name.to_string(),
            })
    }
}

fn call_factory(name: &str, factory: &StrategyFactory) -> Result<Box<dyn Strategy>, RegistryError> {
    panic::catch_unwind(AssertUnwindSafe(|| factory())).map_err(|payload| {
        let detail = payload
            .downcast_ref::<&'static str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-text panic payload".to_string());
        discard(payload);
        tracing::warn!(strategy = name, %detail, "strategy factory panicked");
        RegistryError::FactoryPanicked {
            name: name.to_string(),
            detail,
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
