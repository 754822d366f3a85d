//! mqk-strategy
//!
//! Strategy hook dispatch and fault isolation.
//!
//! Contract:
//! - Strategies implement typed, optional hook slots ([`Strategy`]); a slot
//!   the strategy does not provide is a no-op success.
//! - [`HookDispatcher::invoke`] runs one hook behind a capture boundary and
//!   returns either success or a [`CapturedFailure`] holding a plain-data
//!   [`DiagnosticEvent`](mqk_schemas::DiagnosticEvent). Errors, panics,
//!   notifier misuse and bad arguments never propagate raw.
//! - Strategy code reports voluntary diagnostics through the per-invocation
//!   [`Notifier`] reached from [`HookContext`]; signatures are configuration
//!   ([`NotifierSignatures`]).
//! - [`StrategyHost`] owns instances and lifecycle, serializes hooks per
//!   strategy, enforces timeouts and the deactivation policy, and forwards
//!   every event to a [`DiagnosticSink`].

mod context;
mod dispatcher;
mod host;
mod notifier;
mod plugin_registry;
mod settings;
mod sink;
mod translator;
mod types;

pub use context::*;
pub use dispatcher::*;
pub use host::*;
pub use notifier::*;
pub use plugin_registry::*;
pub use settings::*;
pub use sink::*;
pub use translator::{FaultTranslator, RawFailure, TIMEOUT_SEVERITY};
pub use types::*;
