use crate::custody::PayoutReceipt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Zero-based position of a policy within its holder's sequence.
///
/// Positions are stable for the lifetime of the system: policies are never
/// deleted or compacted, so an id handed out at creation stays valid forever.
pub type PolicyId = u64;

/// One coverage record.
///
/// `deposit_amount` starts as the issuer-priced placeholder and is overwritten
/// exactly once at activation. `secured_amount`, `expiration_time`, and
/// `doc_ref` are fixed at creation. `doc_ref` is an opaque content identifier;
/// the core never fetches, parses, or validates the document behind it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Policy {
    pub holder: String,
    pub deposit_amount: u64,
    pub secured_amount: u64,
    pub expiration_time: DateTime<Utc>,
    pub activated: bool,
    pub valid: bool,
    pub doc_ref: String,
    pub created_at: DateTime<Utc>,
}

impl Policy {
    pub fn new(
        holder: impl Into<String>,
        deposit_amount: u64,
        secured_amount: u64,
        doc_ref: impl Into<String>,
        created_at: DateTime<Utc>,
        expiration_time: DateTime<Utc>,
    ) -> Self {
        Self {
            holder: holder.into(),
            deposit_amount,
            secured_amount,
            expiration_time,
            activated: false,
            valid: true,
            doc_ref: doc_ref.into(),
            created_at,
        }
    }

    /// Active policies are the ones counted in the aggregate exposure.
    pub fn is_active(&self) -> bool {
        self.activated && self.valid
    }
}

/// Issuer request to originate a new policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePolicyRequest {
    pub holder: String,
    /// Placeholder premium the holder must strictly exceed at activation.
    pub deposit_amount: u64,
    pub secured_amount: u64,
    pub doc_ref: String,
}

impl CreatePolicyRequest {
    pub fn new(
        holder: impl Into<String>,
        deposit_amount: u64,
        secured_amount: u64,
        doc_ref: impl Into<String>,
    ) -> Self {
        Self {
            holder: holder.into(),
            deposit_amount,
            secured_amount,
            doc_ref: doc_ref.into(),
        }
    }
}

/// Result of a successful activation.
///
/// `excess_refunded` is computed from the pre-activation deposit snapshot,
/// never from the overwritten field, and is returned to the caller; custody
/// is credited with `required_deposit` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationOutcome {
    pub holder: String,
    pub policy_id: PolicyId,
    pub funds_sent: u64,
    pub required_deposit: u64,
    pub excess_refunded: u64,
    pub secured_amount: u64,
    pub activated_at: DateTime<Utc>,
}

/// Result of a successful reimbursement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReimbursementOutcome {
    pub holder: String,
    pub policy_id: PolicyId,
    pub amount: u64,
    pub receipt: PayoutReceipt,
}
