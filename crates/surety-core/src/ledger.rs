use crate::error::SuretyError;
use crate::types::{Policy, PolicyId};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Effects computed for an activation before any state is mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationEffects {
    /// Pre-activation deposit snapshot: the premium custody is credited with.
    pub required_deposit: u64,
    /// Portion of `funds_sent` returned to the caller.
    pub excess_refund: u64,
    pub secured_amount: u64,
}

/// Per-holder ordered policy sequences plus the aggregate exposure counter.
///
/// A policy id is the zero-based position within its holder's sequence at
/// creation time. There is no deletion or compaction, so positions are stable
/// for the lifetime of the system and history stays auditable.
///
/// Invariant: `total_secured_amount` equals the sum of `secured_amount` over
/// all policies with `activated && valid`. The prepare/commit split keeps the
/// counter consistent under all-or-nothing operation semantics; the engine
/// calls `revert_reimbursement` only when an external transfer fails after
/// effects were committed.
#[derive(Debug, Default, Clone)]
pub struct PolicyLedger {
    policies: BTreeMap<String, Vec<Policy>>,
    total_secured_amount: u64,
}

impl PolicyLedger {
    pub fn new() -> Self {
        Self {
            policies: BTreeMap::new(),
            total_secured_amount: 0,
        }
    }

    pub fn total_secured_amount(&self) -> u64 {
        self.total_secured_amount
    }

    pub fn holder_policies(&self, holder: &str) -> &[Policy] {
        self.policies
            .get(holder)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn policy(&self, holder: &str, policy_id: PolicyId) -> Result<&Policy, SuretyError> {
        self.holder_policies(holder)
            .get(policy_id as usize)
            .ok_or_else(|| SuretyError::InvalidReference {
                holder: holder.to_string(),
                policy_id,
            })
    }

    fn policy_mut(&mut self, holder: &str, policy_id: PolicyId) -> Result<&mut Policy, SuretyError> {
        self.policies
            .get_mut(holder)
            .and_then(|sequence| sequence.get_mut(policy_id as usize))
            .ok_or_else(|| SuretyError::InvalidReference {
                holder: holder.to_string(),
                policy_id,
            })
    }

    /// The id the next created policy for `holder` will receive.
    pub fn next_policy_id(&self, holder: &str) -> PolicyId {
        self.holder_policies(holder).len() as PolicyId
    }

    /// Append an inert policy and return its stable position.
    pub fn commit_create(&mut self, policy: Policy) -> PolicyId {
        let sequence = self.policies.entry(policy.holder.clone()).or_default();
        let policy_id = sequence.len() as PolicyId;
        sequence.push(policy);
        policy_id
    }

    /// Validate an activation without mutating anything.
    ///
    /// The excess refund is computed from the pre-activation deposit snapshot
    /// here, before `commit_activation` overwrites the field; computing it
    /// after the overwrite would always yield zero.
    pub fn prepare_activation(
        &self,
        holder: &str,
        policy_id: PolicyId,
        funds_sent: u64,
    ) -> Result<ActivationEffects, SuretyError> {
        let policy = self.policy(holder, policy_id)?;

        if policy.activated {
            return Err(SuretyError::already_activated(holder, policy_id));
        }

        if funds_sent <= policy.deposit_amount {
            return Err(SuretyError::InsufficientFunds {
                funds_sent,
                required: policy.deposit_amount,
            });
        }

        Ok(ActivationEffects {
            required_deposit: policy.deposit_amount,
            excess_refund: funds_sent - policy.deposit_amount,
            secured_amount: policy.secured_amount,
        })
    }

    /// Apply activation effects: overwrite the deposit, mark the policy live,
    /// and grow the aggregate exposure by its secured amount.
    pub fn commit_activation(
        &mut self,
        holder: &str,
        policy_id: PolicyId,
        funds_sent: u64,
    ) -> Result<(), SuretyError> {
        let policy = self.policy_mut(holder, policy_id)?;
        policy.deposit_amount = funds_sent;
        policy.activated = true;
        let secured = policy.secured_amount;
        self.total_secured_amount = self.total_secured_amount.saturating_add(secured);
        Ok(())
    }

    /// Validate a reimbursement without mutating anything.
    ///
    /// Checks run in lifecycle order: reference, spent state, expiry, cap.
    /// Pool coverage is the custody's check and runs after these.
    pub fn prepare_reimbursement(
        &self,
        holder: &str,
        policy_id: PolicyId,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<u64, SuretyError> {
        let policy = self.policy(holder, policy_id)?;

        if !policy.valid {
            return Err(SuretyError::already_used(holder, policy_id));
        }

        if now > policy.expiration_time {
            return Err(SuretyError::Expired {
                holder: holder.to_string(),
                policy_id,
                expired_at: policy.expiration_time,
            });
        }

        if amount > policy.secured_amount {
            return Err(SuretyError::LimitExceeded {
                amount,
                secured_amount: policy.secured_amount,
            });
        }

        Ok(policy.secured_amount)
    }

    /// Invalidate the policy and shrink the aggregate exposure.
    ///
    /// Committed strictly before the external transfer: a re-entrant observer
    /// sees the policy already spent and the exposure already reduced.
    pub fn commit_reimbursement(
        &mut self,
        holder: &str,
        policy_id: PolicyId,
    ) -> Result<u64, SuretyError> {
        let policy = self.policy_mut(holder, policy_id)?;
        policy.valid = false;
        let secured = policy.secured_amount;
        self.total_secured_amount = self.total_secured_amount.saturating_sub(secured);
        Ok(secured)
    }

    /// Undo `commit_reimbursement` after a failed transfer, restoring the
    /// operation's all-or-nothing semantics.
    pub fn revert_reimbursement(
        &mut self,
        holder: &str,
        policy_id: PolicyId,
    ) -> Result<(), SuretyError> {
        let policy = self.policy_mut(holder, policy_id)?;
        policy.valid = true;
        let secured = policy.secured_amount;
        self.total_secured_amount = self.total_secured_amount.saturating_add(secured);
        Ok(())
    }

    /// Recompute the exposure invariant from scratch.
    pub fn verify_exposure(&self) -> bool {
        let recomputed: u64 = self
            .policies
            .values()
            .flatten()
            .filter(|policy| policy.is_active())
            .map(|policy| policy.secured_amount)
            .sum();
        recomputed == self.total_secured_amount
    }
}
