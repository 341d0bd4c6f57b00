//! Reputation ledger: event records, idempotency keys and point policy

use chrono::Utc;

use super::contract::TimeStamp;
use super::user::Reputation;

pub const EVENT_PAYMENT_RELEASED: &str = "payment-released";
pub const EVENT_DISPUTE_WON: &str = "dispute-won";
pub const EVENT_DISPUTE_LOST: &str = "dispute-lost";

/// Points granted by each lifecycle trigger. Magnitudes are policy, not
/// rules; swap the numbers without touching the engine.
#[derive(Debug, Clone)]
pub struct ReputationPolicy {
    pub payment_released: i64,
    pub dispute_won: i64,
    pub dispute_lost: i64,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self {
            payment_released: 10,
            dispute_won: 5,
            dispute_lost: -5,
        }
    }
}

/// One committed adjustment. Stored under [`event_key`] so retrying the
/// triggering operation cannot apply the same points twice.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ReputationEvent {
    #[n(0)]
    pub user: String,
    #[n(1)]
    pub points: i64,
    #[n(2)]
    pub applied_at: TimeStamp<Utc>,
}

/// Ledger key tying an adjustment to the contract or dispute that caused it.
pub fn event_key(source_id: &str, event: &str) -> String {
    format!("{source_id}/{event}")
}

/// What applying an event did. `Duplicate` and `MissingUser` are quiet
/// outcomes, the triggering operation carries on either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied(Reputation),
    Duplicate,
    MissingUser,
}
