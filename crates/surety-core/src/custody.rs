use crate::error::SuretyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Settlement receipt returned by a payout channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub settlement_id: String,
    pub channel: String,
    pub recipient: String,
    pub amount: u64,
    pub settled_at: DateTime<Utc>,
}

/// Outbound settlement seam.
///
/// Implementations move value to external recipients and may fail if the
/// recipient rejects or cannot receive the payment. A channel may run
/// arbitrary recipient-controlled code, which is why callers commit all
/// ledger effects before invoking it.
pub trait PayoutChannel: Send + Sync {
    fn channel_id(&self) -> &'static str;

    fn transfer(&self, recipient: &str, amount: u64) -> Result<PayoutReceipt, SuretyError>;
}

/// Pooled custody of deposited funds.
///
/// The balance is the sum of all premiums received through activation plus
/// any direct funding, minus settled claims. `pay_out` debits the pool before
/// invoking the channel and restores it if the channel rejects the payment,
/// so a failed settlement leaves the pool untouched.
pub struct FundCustody {
    balance: u64,
    channel: Arc<dyn PayoutChannel>,
}

impl FundCustody {
    pub fn new(channel: Arc<dyn PayoutChannel>) -> Self {
        Self {
            balance: 0,
            channel,
        }
    }

    pub fn with_initial_balance(channel: Arc<dyn PayoutChannel>, balance: u64) -> Self {
        Self { balance, channel }
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn channel_id(&self) -> &'static str {
        self.channel.channel_id()
    }

    pub fn deposit(&mut self, amount: u64) {
        self.balance = self.balance.saturating_add(amount);
    }

    /// Fail early when the pool cannot cover `amount`.
    pub fn ensure_covers(&self, amount: u64) -> Result<(), SuretyError> {
        if self.balance < amount {
            return Err(SuretyError::InsufficientPoolBalance {
                requested: amount,
                available: self.balance,
            });
        }
        Ok(())
    }

    /// Transfer `amount` to `recipient` through the configured channel.
    ///
    /// The pool is debited before the external call and credited back on
    /// failure, keeping the balance consistent with either outcome.
    pub fn pay_out(&mut self, recipient: &str, amount: u64) -> Result<PayoutReceipt, SuretyError> {
        self.ensure_covers(amount)?;
        self.balance -= amount;

        match self.channel.transfer(recipient, amount) {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                self.balance = self.balance.saturating_add(amount);
                Err(err)
            }
        }
    }
}
