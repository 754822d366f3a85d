//! mqk-schemas
//!
//! Wire types shared by the strategy host, the audit log and any downstream
//! consumer (UI, alerting). Everything here is plain data: no handles into
//! strategy memory, no trait objects, deterministic serde output.

mod clock;
mod diagnostic;
mod hook;
mod payload;

pub use clock::next_event_timestamp;
pub use diagnostic::*;
pub use hook::*;
pub use payload::*;
