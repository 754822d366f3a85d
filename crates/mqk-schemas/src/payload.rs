use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Market-data tick delivered to `on_tick`.
///
/// Prices and sizes are decimal strings; the host never does arithmetic on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTick {
    pub symbol: String,
    pub price: String,
    pub size: String,
    pub ts_utc: DateTime<Utc>,
}

/// Order status change delivered to `on_order_update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub client_order_id: String,
    pub symbol: String,
    /// Broker status string, e.g. "NEW" | "PARTIALLY_FILLED" | "FILLED" | "CANCELED" | "REJECTED".
    pub status: String,
    pub filled_qty: String,
    pub leaves_qty: String,
}
