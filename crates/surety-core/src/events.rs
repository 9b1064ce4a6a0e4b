use crate::error::SuretyError;
use crate::types::{Policy, PolicyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle transitions recorded for external observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Activated,
    Reimbursed,
}

/// Hash-chained lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub index: u64,
    pub holder: String,
    pub policy_id: PolicyId,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// Payload for `Created` and `Activated` events: the full record contents at
/// the time of the transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvent {
    pub holder: String,
    pub policy_id: PolicyId,
    pub deposit_amount: u64,
    pub secured_amount: u64,
    pub expiration_time: DateTime<Utc>,
    pub activated: bool,
    pub valid: bool,
    pub doc_ref: String,
}

impl PolicyEvent {
    pub fn from_policy(policy_id: PolicyId, policy: &Policy) -> Self {
        Self {
            holder: policy.holder.clone(),
            policy_id,
            deposit_amount: policy.deposit_amount,
            secured_amount: policy.secured_amount,
            expiration_time: policy.expiration_time,
            activated: policy.activated,
            valid: policy.valid,
            doc_ref: policy.doc_ref.clone(),
        }
    }
}

/// Payload for `Reimbursed` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReimbursedEvent {
    pub holder: String,
    pub policy_id: PolicyId,
    pub amount: u64,
}

/// Append-only event log with hash-chain proofs.
///
/// Design choice: no in-place mutation APIs are exposed. Every lifecycle
/// transition becomes an additional record, which preserves full historical
/// accountability.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Rebuild a log from persisted records and verify hash-chain integrity.
    pub fn from_records(records: Vec<EventRecord>) -> Result<Self, SuretyError> {
        let log = Self { records };

        for (expected_index, record) in log.records.iter().enumerate() {
            if record.index != expected_index as u64 {
                return Err(SuretyError::EventLog(format!(
                    "event index gap detected at position {} (found {})",
                    expected_index, record.index
                )));
            }
        }

        if !log.verify_chain() {
            return Err(SuretyError::EventLog(
                "persisted event hash-chain verification failed".to_string(),
            ));
        }

        Ok(log)
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn find_record(&self, event_id: &str) -> Option<&EventRecord> {
        self.records
            .iter()
            .find(|record| record.event_id == event_id)
    }

    pub fn records_for_policy(&self, holder: &str, policy_id: PolicyId) -> Vec<&EventRecord> {
        self.records
            .iter()
            .filter(|record| record.holder == holder && record.policy_id == policy_id)
            .collect()
    }

    pub fn append_created(&mut self, event: &PolicyEvent) -> Result<EventRecord, SuretyError> {
        let payload =
            serde_json::to_value(event).map_err(|e| SuretyError::Serialization(e.to_string()))?;
        self.append(EventKind::Created, &event.holder, event.policy_id, payload)
    }

    pub fn append_activated(&mut self, event: &PolicyEvent) -> Result<EventRecord, SuretyError> {
        let payload =
            serde_json::to_value(event).map_err(|e| SuretyError::Serialization(e.to_string()))?;
        self.append(EventKind::Activated, &event.holder, event.policy_id, payload)
    }

    pub fn append_reimbursed(
        &mut self,
        event: &ReimbursedEvent,
    ) -> Result<EventRecord, SuretyError> {
        let payload =
            serde_json::to_value(event).map_err(|e| SuretyError::Serialization(e.to_string()))?;
        self.append(
            EventKind::Reimbursed,
            &event.holder,
            event.policy_id,
            payload,
        )
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for record in &self.records {
            let expected_hash = compute_record_hash(
                record.index,
                &record.holder,
                record.policy_id,
                &record.kind,
                record.timestamp,
                &record.payload,
                previous_hash.as_deref(),
            );
            if record.entry_hash != expected_hash {
                return false;
            }
            if record.previous_hash != previous_hash {
                return false;
            }
            previous_hash = Some(record.entry_hash.clone());
        }
        true
    }

    fn append(
        &mut self,
        kind: EventKind,
        holder: &str,
        policy_id: PolicyId,
        payload: Value,
    ) -> Result<EventRecord, SuretyError> {
        let record = self.build_record(kind, holder, policy_id, payload);
        self.commit_record(record.clone())?;
        Ok(record)
    }

    /// Build the next deterministic record without mutating the in-memory chain.
    pub fn build_record(
        &self,
        kind: EventKind,
        holder: &str,
        policy_id: PolicyId,
        payload: Value,
    ) -> EventRecord {
        let index = self.records.len() as u64;
        let timestamp = Utc::now();
        let previous_hash = self.records.last().map(|record| record.entry_hash.clone());
        let entry_hash = compute_record_hash(
            index,
            holder,
            policy_id,
            &kind,
            timestamp,
            &payload,
            previous_hash.as_deref(),
        );

        EventRecord {
            event_id: Uuid::new_v4().to_string(),
            index,
            holder: holder.to_string(),
            policy_id,
            kind,
            timestamp,
            payload,
            previous_hash,
            entry_hash,
        }
    }

    /// Commit a pre-built record after external durability succeeds.
    pub fn commit_record(&mut self, record: EventRecord) -> Result<(), SuretyError> {
        let expected_index = self.records.len() as u64;
        if record.index != expected_index {
            return Err(SuretyError::EventLog(format!(
                "commit index mismatch: expected {}, got {}",
                expected_index, record.index
            )));
        }

        let expected_previous_hash = self.records.last().map(|r| r.entry_hash.clone());
        if record.previous_hash != expected_previous_hash {
            return Err(SuretyError::EventLog(
                "commit previous hash mismatch".to_string(),
            ));
        }

        let expected_hash = compute_record_hash(
            record.index,
            &record.holder,
            record.policy_id,
            &record.kind,
            record.timestamp,
            &record.payload,
            record.previous_hash.as_deref(),
        );

        if record.entry_hash != expected_hash {
            return Err(SuretyError::EventLog(
                "commit hash mismatch for event record".to_string(),
            ));
        }

        self.records.push(record);
        Ok(())
    }
}

fn compute_record_hash(
    index: u64,
    holder: &str,
    policy_id: PolicyId,
    kind: &EventKind,
    timestamp: DateTime<Utc>,
    payload: &Value,
    previous_hash: Option<&str>,
) -> String {
    let material = serde_json::json!({
        "index": index,
        "holder": holder,
        "policy_id": policy_id,
        "kind": kind,
        "timestamp": timestamp,
        "payload": payload,
        "previous_hash": previous_hash,
    });

    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
