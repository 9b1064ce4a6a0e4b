//! Payout channel adapters for the surety ledger.

#![deny(unsafe_code)]

use chrono::Utc;
use std::sync::Mutex;
use surety_core::custody::{PayoutChannel, PayoutReceipt};
use surety_core::error::SuretyError;
use uuid::Uuid;

/// Mock settlement channel for deterministic local payout simulation.
#[derive(Debug, Clone, Default)]
pub struct MockSettlementChannel;

impl PayoutChannel for MockSettlementChannel {
    fn channel_id(&self) -> &'static str {
        "mock-settlement"
    }

    fn transfer(&self, recipient: &str, amount: u64) -> Result<PayoutReceipt, SuretyError> {
        let short_id: String = Uuid::new_v4().to_string().chars().take(8).collect();

        Ok(PayoutReceipt {
            settlement_id: format!("settle-{short_id}"),
            channel: self.channel_id().to_string(),
            recipient: recipient.to_string(),
            amount,
            settled_at: Utc::now(),
        })
    }
}

/// Deterministic failing channel useful for rollback and chaos testing.
#[derive(Debug, Clone)]
pub struct AlwaysFailChannel {
    reason: String,
}

impl AlwaysFailChannel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PayoutChannel for AlwaysFailChannel {
    fn channel_id(&self) -> &'static str {
        "always-fail"
    }

    fn transfer(&self, _recipient: &str, _amount: u64) -> Result<PayoutReceipt, SuretyError> {
        Err(SuretyError::TransferFailure {
            channel: self.channel_id().to_string(),
            message: self.reason.clone(),
        })
    }
}

/// Channel that records every settled transfer for test assertions.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    transfers: Mutex<Vec<(String, u64)>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settled(&self) -> Vec<(String, u64)> {
        self.transfers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }
}

impl PayoutChannel for RecordingChannel {
    fn channel_id(&self) -> &'static str {
        "recording"
    }

    fn transfer(&self, recipient: &str, amount: u64) -> Result<PayoutReceipt, SuretyError> {
        self.transfers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push((recipient.to_string(), amount));

        Ok(PayoutReceipt {
            settlement_id: format!("rec-{}", Uuid::new_v4()),
            channel: self.channel_id().to_string(),
            recipient: recipient.to_string(),
            amount,
            settled_at: Utc::now(),
        })
    }
}
