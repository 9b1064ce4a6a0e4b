use crate::authorization::{AuthorizationGate, RolesConfig};
use crate::clock::{Clock, SystemClock};
use crate::custody::{FundCustody, PayoutChannel};
use crate::error::SuretyError;
use crate::events::{EventRecord, PolicyEvent, ReimbursedEvent};
use crate::ledger::PolicyLedger;
use crate::pricing::PremiumModel;
use crate::storage::{EventStorageConfig, PersistentEventLog};
use crate::types::{
    ActivationOutcome, CreatePolicyRequest, Policy, PolicyId, ReimbursementOutcome,
};
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed coverage term applied at creation.
    pub term_days: i64,
    /// Funds the custody pool starts with, independent of activations.
    pub initial_pool_balance: u64,
    pub event_storage: EventStorageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            term_days: 365,
            initial_pool_balance: 0,
            event_storage: EventStorageConfig::Memory,
        }
    }
}

/// Mutable state guarded by a single lock so every operation is atomic
/// relative to all others: no partial effects are ever visible.
struct EngineState {
    ledger: PolicyLedger,
    custody: FundCustody,
    events: PersistentEventLog,
}

/// Custodial coverage engine.
///
/// Composes the authorization gate, policy ledger, fund custody, premium
/// model, and event log behind the boundary operations. Each operation
/// either commits every effect (state mutation, event record, transfer) or
/// none of them.
pub struct SuretyEngine {
    gate: AuthorizationGate,
    premium: PremiumModel,
    state: AsyncMutex<EngineState>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl SuretyEngine {
    pub async fn bootstrap(
        roles: RolesConfig,
        config: EngineConfig,
        channel: Arc<dyn PayoutChannel>,
    ) -> Result<Self, SuretyError> {
        Self::bootstrap_with_clock(roles, config, channel, Arc::new(SystemClock)).await
    }

    pub async fn bootstrap_with_clock(
        roles: RolesConfig,
        config: EngineConfig,
        channel: Arc<dyn PayoutChannel>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SuretyError> {
        let events = PersistentEventLog::bootstrap(config.event_storage.clone()).await?;
        let custody = FundCustody::with_initial_balance(channel, config.initial_pool_balance);

        Ok(Self {
            gate: AuthorizationGate::new(roles),
            premium: PremiumModel::new(),
            state: AsyncMutex::new(EngineState {
                ledger: PolicyLedger::new(),
                custody,
                events,
            }),
            clock,
            config,
        })
    }

    /// Originate an inert policy. Issuer-only; no funds move.
    pub async fn create(
        &self,
        caller: &str,
        request: CreatePolicyRequest,
    ) -> Result<PolicyId, SuretyError> {
        self.gate.require_issuer(caller)?;

        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let expiration_time = now + Duration::days(self.config.term_days);
        let policy = Policy::new(
            &request.holder,
            request.deposit_amount,
            request.secured_amount,
            &request.doc_ref,
            now,
            expiration_time,
        );

        let policy_id = state.ledger.next_policy_id(&request.holder);
        let event = PolicyEvent::from_policy(policy_id, &policy);
        state.events.append_created(&event).await?;
        state.ledger.commit_create(policy);

        info!(
            holder = %request.holder,
            policy_id,
            secured_amount = request.secured_amount,
            "policy created"
        );
        Ok(policy_id)
    }

    /// Fund and activate a policy. The caller is the intended holder.
    ///
    /// The excess beyond the pre-activation required premium is returned in
    /// the outcome; custody is credited with the required premium only.
    pub async fn activate(
        &self,
        caller: &str,
        policy_id: PolicyId,
        funds_sent: u64,
    ) -> Result<ActivationOutcome, SuretyError> {
        let mut state = self.state.lock().await;
        let effects = state.ledger.prepare_activation(caller, policy_id, funds_sent)?;

        let mut preview = state.ledger.policy(caller, policy_id)?.clone();
        preview.deposit_amount = funds_sent;
        preview.activated = true;
        let event = PolicyEvent::from_policy(policy_id, &preview);
        state.events.append_activated(&event).await?;

        state.ledger.commit_activation(caller, policy_id, funds_sent)?;
        state.custody.deposit(effects.required_deposit);

        info!(
            holder = %caller,
            policy_id,
            funds_sent,
            excess_refunded = effects.excess_refund,
            "policy activated"
        );
        Ok(ActivationOutcome {
            holder: caller.to_string(),
            policy_id,
            funds_sent,
            required_deposit: effects.required_deposit,
            excess_refunded: effects.excess_refund,
            secured_amount: effects.secured_amount,
            activated_at: self.clock.now(),
        })
    }

    /// Pay a claim against an active policy. ClaimsAuthority-only.
    ///
    /// Checks-effects-interactions: the policy is invalidated and the
    /// exposure reduced strictly before the payout channel runs; a channel
    /// failure rolls both back so the operation stays all-or-nothing.
    pub async fn reimburse(
        &self,
        caller: &str,
        holder: &str,
        policy_id: PolicyId,
        amount: u64,
    ) -> Result<ReimbursementOutcome, SuretyError> {
        self.gate.require_claims_authority(caller)?;

        let mut state = self.state.lock().await;
        let now = self.clock.now();
        state
            .ledger
            .prepare_reimbursement(holder, policy_id, amount, now)?;
        state.custody.ensure_covers(amount)?;

        state.ledger.commit_reimbursement(holder, policy_id)?;

        let receipt = match state.custody.pay_out(holder, amount) {
            Ok(receipt) => receipt,
            Err(err) => {
                state.ledger.revert_reimbursement(holder, policy_id)?;
                warn!(
                    holder = %holder,
                    policy_id,
                    amount,
                    error = %err,
                    "payout failed, reimbursement rolled back"
                );
                return Err(err);
            }
        };

        state
            .events
            .append_reimbursed(&ReimbursedEvent {
                holder: holder.to_string(),
                policy_id,
                amount,
            })
            .await?;

        info!(holder = %holder, policy_id, amount, "policy reimbursed");
        Ok(ReimbursementOutcome {
            holder: holder.to_string(),
            policy_id,
            amount,
            receipt,
        })
    }

    /// Quote the premium for a coverage request against the current pool.
    ///
    /// Issuer-gated: pricing is kept private to the Issuer as a policy
    /// choice, not a correctness requirement.
    pub async fn quote_premium(&self, caller: &str, secured_amount: u64) -> Result<u64, SuretyError> {
        self.gate.require_issuer(caller)?;

        let state = self.state.lock().await;
        Ok(self.premium.premium(
            secured_amount,
            state.ledger.total_secured_amount(),
            state.custody.balance(),
        ))
    }

    /// Credit the custody pool directly, outside any activation.
    pub async fn fund_pool(&self, amount: u64) -> u64 {
        let mut state = self.state.lock().await;
        state.custody.deposit(amount);
        state.custody.balance()
    }

    pub async fn read_policy(&self, holder: &str, policy_id: PolicyId) -> Result<Policy, SuretyError> {
        let state = self.state.lock().await;
        state.ledger.policy(holder, policy_id).cloned()
    }

    pub async fn holder_policies(&self, holder: &str) -> Vec<Policy> {
        let state = self.state.lock().await;
        state.ledger.holder_policies(holder).to_vec()
    }

    pub async fn total_secured_amount(&self) -> u64 {
        let state = self.state.lock().await;
        state.ledger.total_secured_amount()
    }

    pub async fn custody_balance(&self) -> u64 {
        let state = self.state.lock().await;
        state.custody.balance()
    }

    pub async fn event_records(&self) -> Vec<EventRecord> {
        let state = self.state.lock().await;
        state.events.records().to_vec()
    }

    pub async fn event_backend(&self) -> String {
        let state = self.state.lock().await;
        state.events.backend_label().to_string()
    }

    /// Recheck the exposure invariant and the event hash chain.
    pub async fn verify_invariants(&self) -> bool {
        let state = self.state.lock().await;
        state.ledger.verify_exposure() && state.events.verify_chain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::custody::PayoutReceipt;
    use crate::events::EventKind;
    use chrono::Utc;
    use std::sync::Mutex;

    const ISSUER: &str = "issuer-1";
    const CLAIMS: &str = "claims-1";

    /// Channel that records every settled transfer.
    #[derive(Default)]
    struct RecordingChannel {
        transfers: Mutex<Vec<(String, u64)>>,
    }

    impl RecordingChannel {
        fn settled(&self) -> Vec<(String, u64)> {
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
                settlement_id: format!("rec-{}", amount),
                channel: "recording".to_string(),
                recipient: recipient.to_string(),
                amount,
                settled_at: Utc::now(),
            })
        }
    }

    struct RejectingChannel;

    impl PayoutChannel for RejectingChannel {
        fn channel_id(&self) -> &'static str {
            "rejecting"
        }

        fn transfer(&self, _recipient: &str, _amount: u64) -> Result<PayoutReceipt, SuretyError> {
            Err(SuretyError::TransferFailure {
                channel: "rejecting".to_string(),
                message: "recipient refused payment".to_string(),
            })
        }
    }

    async fn engine_with_channel(
        channel: Arc<dyn PayoutChannel>,
        initial_pool_balance: u64,
    ) -> (Arc<SuretyEngine>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let engine = SuretyEngine::bootstrap_with_clock(
            RolesConfig::new(ISSUER, CLAIMS),
            EngineConfig {
                initial_pool_balance,
                ..EngineConfig::default()
            },
            channel,
            clock.clone(),
        )
        .await
        .unwrap();
        (Arc::new(engine), clock)
    }

    #[tokio::test]
    async fn end_to_end_lifecycle() {
        let channel = Arc::new(RecordingChannel::default());
        let (engine, _) = engine_with_channel(channel.clone(), 1_000).await;

        let policy_id = engine
            .create(ISSUER, CreatePolicyRequest::new("holder-a", 0, 100, "cid1"))
            .await
            .unwrap();
        assert_eq!(policy_id, 0);

        let outcome = engine.activate("holder-a", 0, 50).await.unwrap();
        assert_eq!(outcome.required_deposit, 0);
        assert_eq!(outcome.excess_refunded, 50);

        let policy = engine.read_policy("holder-a", 0).await.unwrap();
        assert!(policy.activated);
        assert_eq!(policy.deposit_amount, 50);
        assert_eq!(engine.total_secured_amount().await, 100);

        let outcome = engine.reimburse(CLAIMS, "holder-a", 0, 80).await.unwrap();
        assert_eq!(outcome.amount, 80);
        assert_eq!(engine.total_secured_amount().await, 0);
        assert!(!engine.read_policy("holder-a", 0).await.unwrap().valid);
        assert_eq!(channel.settled(), vec![("holder-a".to_string(), 80)]);
        assert_eq!(engine.custody_balance().await, 920);
        assert!(engine.verify_invariants().await);

        let kinds: Vec<EventKind> = engine
            .event_records()
            .await
            .into_iter()
            .map(|record| record.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![EventKind::Created, EventKind::Activated, EventKind::Reimbursed]
        );
    }

    #[tokio::test]
    async fn issuer_priced_premium_is_collected_and_excess_refunded() {
        let channel = Arc::new(RecordingChannel::default());
        let (engine, _) = engine_with_channel(channel, 0).await;

        engine
            .create(ISSUER, CreatePolicyRequest::new("holder-a", 25, 100, "cid1"))
            .await
            .unwrap();
        let outcome = engine.activate("holder-a", 0, 40).await.unwrap();

        // Snapshot taken before the deposit overwrite: the refund is never zero
        // just because the field was already clobbered.
        assert_eq!(outcome.required_deposit, 25);
        assert_eq!(outcome.excess_refunded, 15);
        assert_eq!(engine.custody_balance().await, 25);
        assert_eq!(
            engine.read_policy("holder-a", 0).await.unwrap().deposit_amount,
            40
        );
    }

    #[tokio::test]
    async fn create_is_issuer_gated() {
        let (engine, _) = engine_with_channel(Arc::new(RecordingChannel::default()), 0).await;
        let err = engine
            .create("holder-a", CreatePolicyRequest::new("holder-a", 0, 100, "cid"))
            .await
            .unwrap_err();
        assert!(matches!(err, SuretyError::Unauthorized { .. }));
        assert!(engine.event_records().await.is_empty());
    }

    #[tokio::test]
    async fn reimburse_is_claims_authority_gated() {
        let (engine, _) = engine_with_channel(Arc::new(RecordingChannel::default()), 1_000).await;
        engine
            .create(ISSUER, CreatePolicyRequest::new("holder-a", 0, 100, "cid"))
            .await
            .unwrap();
        engine.activate("holder-a", 0, 10).await.unwrap();

        let err = engine.reimburse(ISSUER, "holder-a", 0, 10).await.unwrap_err();
        assert!(matches!(err, SuretyError::Unauthorized { .. }));
        assert_eq!(engine.total_secured_amount().await, 100);
    }

    #[tokio::test]
    async fn second_activation_fails_without_side_effects() {
        let (engine, _) = engine_with_channel(Arc::new(RecordingChannel::default()), 0).await;
        engine
            .create(ISSUER, CreatePolicyRequest::new("holder-a", 0, 100, "cid"))
            .await
            .unwrap();
        engine.activate("holder-a", 0, 30).await.unwrap();

        let err = engine.activate("holder-a", 0, 60).await.unwrap_err();
        assert!(matches!(err, SuretyError::InvalidState(_)));
        assert_eq!(engine.total_secured_amount().await, 100);
        assert_eq!(
            engine.read_policy("holder-a", 0).await.unwrap().deposit_amount,
            30
        );
        // Created + one Activated only.
        assert_eq!(engine.event_records().await.len(), 2);
    }

    #[tokio::test]
    async fn double_reimbursement_executes_exactly_one_transfer() {
        let channel = Arc::new(RecordingChannel::default());
        let (engine, _) = engine_with_channel(channel.clone(), 1_000).await;
        engine
            .create(ISSUER, CreatePolicyRequest::new("holder-a", 0, 100, "cid"))
            .await
            .unwrap();
        engine.activate("holder-a", 0, 10).await.unwrap();

        engine.reimburse(CLAIMS, "holder-a", 0, 80).await.unwrap();
        let err = engine.reimburse(CLAIMS, "holder-a", 0, 80).await.unwrap_err();

        assert!(matches!(err, SuretyError::InvalidState(_)));
        assert_eq!(channel.settled().len(), 1);
        assert_eq!(engine.total_secured_amount().await, 0);
    }

    #[tokio::test]
    async fn expired_policy_cannot_be_claimed() {
        let (engine, clock) = engine_with_channel(Arc::new(RecordingChannel::default()), 1_000).await;
        engine
            .create(ISSUER, CreatePolicyRequest::new("holder-a", 0, 100, "cid"))
            .await
            .unwrap();
        engine.activate("holder-a", 0, 10).await.unwrap();

        clock.advance(Duration::days(366));

        let err = engine.reimburse(CLAIMS, "holder-a", 0, 80).await.unwrap_err();
        assert!(matches!(err, SuretyError::Expired { .. }));
        assert!(engine.read_policy("holder-a", 0).await.unwrap().valid);
        assert_eq!(engine.total_secured_amount().await, 100);
    }

    #[tokio::test]
    async fn claim_above_cap_is_rejected() {
        let (engine, _) = engine_with_channel(Arc::new(RecordingChannel::default()), 1_000).await;
        engine
            .create(ISSUER, CreatePolicyRequest::new("holder-a", 0, 100, "cid"))
            .await
            .unwrap();
        engine.activate("holder-a", 0, 10).await.unwrap();

        let err = engine.reimburse(CLAIMS, "holder-a", 0, 101).await.unwrap_err();
        assert!(matches!(err, SuretyError::LimitExceeded { .. }));
    }

    #[tokio::test]
    async fn underfunded_pool_rejects_claim_before_effects() {
        let (engine, _) = engine_with_channel(Arc::new(RecordingChannel::default()), 50).await;
        engine
            .create(ISSUER, CreatePolicyRequest::new("holder-a", 0, 100, "cid"))
            .await
            .unwrap();
        engine.activate("holder-a", 0, 10).await.unwrap();

        let err = engine.reimburse(CLAIMS, "holder-a", 0, 80).await.unwrap_err();
        assert!(matches!(err, SuretyError::InsufficientPoolBalance { .. }));
        assert!(engine.read_policy("holder-a", 0).await.unwrap().valid);
        assert_eq!(engine.total_secured_amount().await, 100);
    }

    #[tokio::test]
    async fn failed_transfer_rolls_back_all_effects() {
        let (engine, _) = engine_with_channel(Arc::new(RejectingChannel), 1_000).await;
        engine
            .create(ISSUER, CreatePolicyRequest::new("holder-a", 0, 100, "cid"))
            .await
            .unwrap();
        engine.activate("holder-a", 0, 10).await.unwrap();

        let err = engine.reimburse(CLAIMS, "holder-a", 0, 80).await.unwrap_err();
        assert!(matches!(err, SuretyError::TransferFailure { .. }));

        // Policy, exposure, and pool all restored; the claim stays payable.
        assert!(engine.read_policy("holder-a", 0).await.unwrap().valid);
        assert_eq!(engine.total_secured_amount().await, 100);
        assert_eq!(engine.custody_balance().await, 1_010);
        assert!(engine.verify_invariants().await);
    }

    #[tokio::test]
    async fn quote_premium_tracks_pool_state() {
        let (engine, _) = engine_with_channel(Arc::new(RecordingChannel::default()), 1_000).await;
        assert_eq!(engine.quote_premium(ISSUER, 100).await.unwrap(), 100);

        engine.fund_pool(u64::MAX - 2_000).await;
        assert!(engine.quote_premium(ISSUER, 100).await.is_ok());

        let err = engine.quote_premium("holder-a", 100).await.unwrap_err();
        assert!(matches!(err, SuretyError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn quote_reflects_exposure_and_treasury() {
        let (engine, _) = engine_with_channel(Arc::new(RecordingChannel::default()), 500).await;
        engine
            .create(ISSUER, CreatePolicyRequest::new("holder-a", 0, 500, "cid"))
            .await
            .unwrap();
        engine.activate("holder-a", 0, 1).await.unwrap();

        // exposure 500, treasury 500 (initial pool; required deposit was 0).
        assert_eq!(engine.quote_premium(ISSUER, 100).await.unwrap(), 183);
    }
}
