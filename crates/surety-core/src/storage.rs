use crate::error::SuretyError;
use crate::events::{EventKind, EventLog, EventRecord, PolicyEvent, ReimbursedEvent};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

/// Event-log persistence backend configuration.
#[derive(Debug, Clone)]
pub enum EventStorageConfig {
    /// Keep all lifecycle events in process memory only.
    Memory,
    /// Persist all events in PostgreSQL and hydrate the log on startup.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl EventStorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

impl Default for EventStorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone)]
enum EventStorageBackend {
    Memory,
    Postgres(PostgresEventStore),
}

/// Runtime event log that keeps an in-memory authoritative chain while
/// optionally mirroring each record to PostgreSQL.
///
/// Invariant handling:
/// - Record hash/index is computed against the in-memory chain first.
/// - A record is persisted before it is committed in-memory.
/// - On startup, PostgreSQL records are hydrated and hash-verified.
#[derive(Debug, Clone)]
pub struct PersistentEventLog {
    log: EventLog,
    backend: EventStorageBackend,
}

impl PersistentEventLog {
    /// Build an in-memory persistent log from already persisted records.
    pub fn from_records(records: Vec<EventRecord>) -> Result<Self, SuretyError> {
        Ok(Self {
            log: EventLog::from_records(records)?,
            backend: EventStorageBackend::Memory,
        })
    }

    pub async fn bootstrap(config: EventStorageConfig) -> Result<Self, SuretyError> {
        match config {
            EventStorageConfig::Memory => Ok(Self {
                log: EventLog::new(),
                backend: EventStorageBackend::Memory,
            }),
            EventStorageConfig::Postgres {
                database_url,
                max_connections,
            } => {
                let store = PostgresEventStore::connect(&database_url, max_connections).await?;
                store.ensure_schema().await?;
                let records = store.load_records().await?;
                let log = EventLog::from_records(records)?;
                Ok(Self {
                    log,
                    backend: EventStorageBackend::Postgres(store),
                })
            }
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.backend {
            EventStorageBackend::Memory => "memory",
            EventStorageBackend::Postgres(_) => "postgres",
        }
    }

    pub fn records(&self) -> &[EventRecord] {
        self.log.records()
    }

    pub fn as_event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn verify_chain(&self) -> bool {
        self.log.verify_chain()
    }

    pub async fn append_created(
        &mut self,
        event: &PolicyEvent,
    ) -> Result<EventRecord, SuretyError> {
        let payload =
            serde_json::to_value(event).map_err(|e| SuretyError::Serialization(e.to_string()))?;
        self.append(EventKind::Created, &event.holder, event.policy_id, payload)
            .await
    }

    pub async fn append_activated(
        &mut self,
        event: &PolicyEvent,
    ) -> Result<EventRecord, SuretyError> {
        let payload =
            serde_json::to_value(event).map_err(|e| SuretyError::Serialization(e.to_string()))?;
        self.append(EventKind::Activated, &event.holder, event.policy_id, payload)
            .await
    }

    pub async fn append_reimbursed(
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
        .await
    }

    async fn append(
        &mut self,
        kind: EventKind,
        holder: &str,
        policy_id: u64,
        payload: serde_json::Value,
    ) -> Result<EventRecord, SuretyError> {
        let record = self.log.build_record(kind, holder, policy_id, payload);

        if let EventStorageBackend::Postgres(store) = &self.backend {
            store.insert_record(&record).await?;
        }

        self.log.commit_record(record.clone())?;
        Ok(record)
    }
}

#[derive(Debug, Clone)]
struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    async fn connect(database_url: &str, max_connections: u32) -> Result<Self, SuretyError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| SuretyError::EventLog(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    async fn ensure_schema(&self) -> Result<(), SuretyError> {
        // Single append-only table for all lifecycle events.
        // The application controls deterministic index/hash generation.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS surety_policy_events (
                event_index BIGINT PRIMARY KEY,
                event_id TEXT NOT NULL UNIQUE,
                holder TEXT NOT NULL,
                policy_id BIGINT NOT NULL,
                kind TEXT NOT NULL,
                event_timestamp TIMESTAMPTZ NOT NULL,
                payload JSONB NOT NULL,
                previous_hash TEXT NULL,
                entry_hash TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SuretyError::EventLog(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_surety_policy_events_holder ON surety_policy_events (holder, policy_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SuretyError::EventLog(format!("postgres index create failed: {e}")))?;

        Ok(())
    }

    async fn load_records(&self) -> Result<Vec<EventRecord>, SuretyError> {
        let rows = sqlx::query(
            r#"
            SELECT
                event_index,
                event_id,
                holder,
                policy_id,
                kind,
                event_timestamp,
                payload,
                previous_hash,
                entry_hash
            FROM surety_policy_events
            ORDER BY event_index ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SuretyError::EventLog(format!("postgres load failed: {e}")))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let kind_str: String = row
                .try_get("kind")
                .map_err(|e| SuretyError::EventLog(format!("postgres decode kind failed: {e}")))?;
            let kind = parse_kind(&kind_str)?;

            let index: i64 = row.try_get("event_index").map_err(|e| {
                SuretyError::EventLog(format!("postgres decode event_index failed: {e}"))
            })?;
            let policy_id: i64 = row.try_get("policy_id").map_err(|e| {
                SuretyError::EventLog(format!("postgres decode policy_id failed: {e}"))
            })?;

            records.push(EventRecord {
                event_id: row.try_get("event_id").map_err(|e| {
                    SuretyError::EventLog(format!("postgres decode event_id failed: {e}"))
                })?,
                index: index.try_into().map_err(|_| {
                    SuretyError::EventLog("negative event index in storage".to_string())
                })?,
                holder: row.try_get("holder").map_err(|e| {
                    SuretyError::EventLog(format!("postgres decode holder failed: {e}"))
                })?,
                policy_id: policy_id.try_into().map_err(|_| {
                    SuretyError::EventLog("negative policy id in storage".to_string())
                })?,
                kind,
                timestamp: row.try_get("event_timestamp").map_err(|e| {
                    SuretyError::EventLog(format!("postgres decode event_timestamp failed: {e}"))
                })?,
                payload: row.try_get("payload").map_err(|e| {
                    SuretyError::EventLog(format!("postgres decode payload failed: {e}"))
                })?,
                previous_hash: row.try_get("previous_hash").map_err(|e| {
                    SuretyError::EventLog(format!("postgres decode previous_hash failed: {e}"))
                })?,
                entry_hash: row.try_get("entry_hash").map_err(|e| {
                    SuretyError::EventLog(format!("postgres decode entry_hash failed: {e}"))
                })?,
            });
        }

        Ok(records)
    }

    async fn insert_record(&self, record: &EventRecord) -> Result<(), SuretyError> {
        let index: i64 = record.index.try_into().map_err(|_| {
            SuretyError::EventLog("event index exceeds postgres BIGINT range".to_string())
        })?;
        let policy_id: i64 = record.policy_id.try_into().map_err(|_| {
            SuretyError::EventLog("policy id exceeds postgres BIGINT range".to_string())
        })?;
        sqlx::query(
            r#"
            INSERT INTO surety_policy_events (
                event_index,
                event_id,
                holder,
                policy_id,
                kind,
                event_timestamp,
                payload,
                previous_hash,
                entry_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(index)
        .bind(&record.event_id)
        .bind(&record.holder)
        .bind(policy_id)
        .bind(kind_to_str(&record.kind))
        .bind(record.timestamp)
        .bind(&record.payload)
        .bind(&record.previous_hash)
        .bind(&record.entry_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| SuretyError::EventLog(format!("postgres insert failed: {e}")))?;

        Ok(())
    }
}

fn kind_to_str(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::Created => "created",
        EventKind::Activated => "activated",
        EventKind::Reimbursed => "reimbursed",
    }
}

fn parse_kind(value: &str) -> Result<EventKind, SuretyError> {
    match value {
        "created" => Ok(EventKind::Created),
        "activated" => Ok(EventKind::Activated),
        "reimbursed" => Ok(EventKind::Reimbursed),
        other => Err(SuretyError::EventLog(format!(
            "unknown event kind '{other}' in postgres"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Policy;
    use chrono::{Duration, Utc};

    fn sample_event(policy_id: u64) -> PolicyEvent {
        let now = Utc::now();
        let policy = Policy::new("holder-a", 0, 100, "cid-1", now, now + Duration::days(365));
        PolicyEvent::from_policy(policy_id, &policy)
    }

    #[tokio::test]
    async fn memory_backend_appends_and_verifies_hash_chain() {
        let mut log = PersistentEventLog::bootstrap(EventStorageConfig::memory())
            .await
            .unwrap();

        log.append_created(&sample_event(0)).await.unwrap();
        log.append_reimbursed(&ReimbursedEvent {
            holder: "holder-a".to_string(),
            policy_id: 0,
            amount: 80,
        })
        .await
        .unwrap();

        assert_eq!(log.records().len(), 2);
        assert!(log.verify_chain());
    }

    #[test]
    fn kind_string_roundtrip() {
        let kinds = [
            EventKind::Created,
            EventKind::Activated,
            EventKind::Reimbursed,
        ];

        for kind in kinds {
            let parsed = parse_kind(kind_to_str(&kind)).unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn from_records_rehydrates_verified_chain() {
        let mut base = EventLog::new();
        let first = base.append_created(&sample_event(0)).unwrap();
        base.append_activated(&sample_event(0)).unwrap();

        let rehydrated = PersistentEventLog::from_records(base.records().to_vec()).unwrap();
        assert_eq!(rehydrated.records().len(), 2);
        assert_eq!(rehydrated.records()[0].event_id, first.event_id);
        assert!(rehydrated.verify_chain());
    }
}
