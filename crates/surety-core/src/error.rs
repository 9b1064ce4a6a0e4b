use chrono::{DateTime, Utc};
use thiserror::Error;

/// Surety lifecycle and infrastructure errors.
///
/// Every lifecycle error is terminal for the operation that raised it: the
/// operation aborts with no observable state change.
#[derive(Debug, Error)]
pub enum SuretyError {
    #[error("caller '{caller}' is not the configured {role}")]
    Unauthorized { role: &'static str, caller: String },

    #[error("no policy {policy_id} recorded for holder '{holder}'")]
    InvalidReference { holder: String, policy_id: u64 },

    #[error("invalid policy state: {0}")]
    InvalidState(String),

    #[error("policy {policy_id} for holder '{holder}' expired at {expired_at}")]
    Expired {
        holder: String,
        policy_id: u64,
        expired_at: DateTime<Utc>,
    },

    #[error("activation funding {funds_sent} must strictly exceed the required premium {required}")]
    InsufficientFunds { funds_sent: u64, required: u64 },

    #[error("claim amount {amount} exceeds the secured amount {secured_amount}")]
    LimitExceeded { amount: u64, secured_amount: u64 },

    #[error("custody pool holds {available}, cannot cover claim of {requested}")]
    InsufficientPoolBalance { requested: u64, available: u64 },

    #[error("payout channel '{channel}' failed: {message}")]
    TransferFailure { channel: String, message: String },

    #[error("event log error: {0}")]
    EventLog(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SuretyError {
    pub fn already_activated(holder: &str, policy_id: u64) -> Self {
        Self::InvalidState(format!(
            "policy {} for holder '{}' is already activated",
            policy_id, holder
        ))
    }

    pub fn already_used(holder: &str, policy_id: u64) -> Self {
        Self::InvalidState(format!(
            "policy {} for holder '{}' has already been reimbursed",
            policy_id, holder
        ))
    }
}
