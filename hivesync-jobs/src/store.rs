//! Persistent storage for sync state (config dumps, job records, expiry
//! bookkeeping).
//!
//! Uses a single SQLite file. Multi-row writes that must be atomic — dump
//! persistence plus the rescheduling decision, expiry reconciliation — run
//! inside one short transaction.

use crate::error::{JobError, JobResult};
use hivesync_merge::ConfigDump;
use hivesync_types::{AccountId, ConfigVariant};
use rusqlite::{params, Connection};
use std::sync::Mutex;
use uuid::Uuid;

/// Scheduling metadata for one recurring synchronization task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJobRecord {
    /// Unique record id.
    pub id: Uuid,
    /// The owner this record schedules work for.
    pub owner: AccountId,
    /// Next-eligible-run timestamp (ms since epoch).
    pub next_run_ms: u64,
}

impl SyncJobRecord {
    /// Creates a new record with a fresh id.
    #[must_use]
    pub fn new(owner: AccountId, next_run_ms: u64) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner,
            next_run_ms,
        }
    }
}

/// The rescheduling decision persisted together with a cycle's dumps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOp {
    /// Another record for the owner already exists and is not running:
    /// update its next-run time; the completing job terminates itself.
    UpdateOther {
        /// The surviving record.
        id: Uuid,
        /// Its new next-run time (ms).
        next_run_ms: u64,
    },
    /// No other record exists: insert one for the completing job.
    Insert(SyncJobRecord),
    /// No rescheduling (empty cycle; next run is triggered by the next
    /// mutation, not by a timer).
    None,
}

/// Local expiry bookkeeping for one disappearing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiringMessage {
    /// Server hash of the message record.
    pub hash: String,
    /// The conversation the message belongs to.
    pub conversation: String,
    /// Disappear-after duration (ms).
    pub duration_ms: u64,
    /// When the countdown started (ms), if known.
    pub expires_started_ms: Option<u64>,
}

/// SQLite-backed persistence collaborator.
pub struct SyncStore {
    conn: Mutex<Connection>,
}

impl SyncStore {
    /// Opens (or creates) a store at the given path.
    pub fn new(path: &str) -> JobResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| JobError::Storage(format!("failed to open sync store: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> JobResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| JobError::Storage(format!("failed to open in-memory sync store: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> JobResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS config_dumps (
                variant TEXT NOT NULL,
                owner TEXT NOT NULL,
                data BLOB NOT NULL,
                created_ms INTEGER NOT NULL,
                UNIQUE(variant, owner)
            );

            CREATE TABLE IF NOT EXISTS sync_jobs (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                next_run_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS expiring_messages (
                hash TEXT PRIMARY KEY,
                conversation TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                expires_started_ms INTEGER
            );
            ",
        )
        .map_err(|e| JobError::Storage(format!("failed to init sync schema: {e}")))?;
        Ok(())
    }

    // ── Config dumps ─────────────────────────────────────────────

    /// Saves one dump, replacing any earlier dump for the same
    /// (variant, owner).
    pub fn save_dump(&self, dump: &ConfigDump) -> JobResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_dump(&conn, dump)
    }

    fn insert_dump(conn: &Connection, dump: &ConfigDump) -> JobResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO config_dumps (variant, owner, data, created_ms) VALUES (?1, ?2, ?3, ?4)",
            params![
                dump.variant.to_string(),
                dump.owner.to_hex(),
                dump.data,
                dump.created_ms as i64,
            ],
        )
        .map_err(|e| JobError::Storage(format!("failed to save dump: {e}")))?;
        Ok(())
    }

    /// Loads all dumps for an owner.
    pub fn load_dumps(&self, owner: AccountId) -> JobResult<Vec<ConfigDump>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT variant, owner, data, created_ms FROM config_dumps WHERE owner = ?1")
            .map_err(|e| JobError::Storage(format!("failed to prepare dump query: {e}")))?;
        let rows = stmt
            .query_map(params![owner.to_hex()], |row| {
                let variant: String = row.get(0)?;
                let owner: String = row.get(1)?;
                let data: Vec<u8> = row.get(2)?;
                let created_ms: i64 = row.get(3)?;
                Ok((variant, owner, data, created_ms))
            })
            .map_err(|e| JobError::Storage(format!("failed to query dumps: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let (variant_str, owner_str, data, created_ms) =
                row.map_err(|e| JobError::Storage(format!("failed to read dump row: {e}")))?;
            let variant: ConfigVariant = variant_str
                .parse()
                .map_err(|e| JobError::Storage(format!("invalid variant in dump: {e}")))?;
            let owner = AccountId::parse(&owner_str)
                .map_err(|e| JobError::Storage(format!("invalid owner in dump: {e}")))?;
            result.push(ConfigDump {
                variant,
                owner,
                data,
                created_ms: created_ms as u64,
            });
        }
        Ok(result)
    }

    // ── Sync job records ─────────────────────────────────────────

    /// The earliest scheduled record for an owner, if any.
    pub fn scheduled_job(&self, owner: AccountId) -> JobResult<Option<SyncJobRecord>> {
        Ok(self.jobs_for_owner(owner)?.into_iter().next())
    }

    /// All scheduled records for an owner, earliest first.
    pub fn jobs_for_owner(&self, owner: AccountId) -> JobResult<Vec<SyncJobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, owner, next_run_ms FROM sync_jobs WHERE owner = ?1 ORDER BY next_run_ms ASC")
            .map_err(|e| JobError::Storage(format!("failed to prepare job query: {e}")))?;
        let rows = stmt
            .query_map(params![owner.to_hex()], |row| {
                let id: String = row.get(0)?;
                let owner: String = row.get(1)?;
                let next_run_ms: i64 = row.get(2)?;
                Ok((id, owner, next_run_ms))
            })
            .map_err(|e| JobError::Storage(format!("failed to query jobs: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let (id_str, owner_str, next_run_ms) =
                row.map_err(|e| JobError::Storage(format!("failed to read job row: {e}")))?;
            result.push(SyncJobRecord {
                id: Uuid::parse_str(&id_str)
                    .map_err(|e| JobError::Storage(format!("invalid job id: {e}")))?,
                owner: AccountId::parse(&owner_str)
                    .map_err(|e| JobError::Storage(format!("invalid job owner: {e}")))?,
                next_run_ms: next_run_ms as u64,
            });
        }
        Ok(result)
    }

    /// Inserts or replaces a job record.
    pub fn upsert_job(&self, record: &SyncJobRecord) -> JobResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::apply_schedule(&conn, &ScheduleOp::Insert(record.clone()))
    }

    /// Updates a record's next-run time.
    pub fn update_job_next_run(&self, id: Uuid, next_run_ms: u64) -> JobResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::apply_schedule(
            &conn,
            &ScheduleOp::UpdateOther {
                id,
                next_run_ms,
            },
        )
    }

    /// Removes a job record.
    pub fn delete_job(&self, id: Uuid) -> JobResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sync_jobs WHERE id = ?1", params![id.to_string()])
            .map_err(|e| JobError::Storage(format!("failed to delete job: {e}")))?;
        Ok(())
    }

    fn apply_schedule(conn: &Connection, op: &ScheduleOp) -> JobResult<()> {
        match op {
            ScheduleOp::UpdateOther { id, next_run_ms } => {
                conn.execute(
                    "UPDATE sync_jobs SET next_run_ms = ?1 WHERE id = ?2",
                    params![*next_run_ms as i64, id.to_string()],
                )
                .map_err(|e| JobError::Storage(format!("failed to update job: {e}")))?;
            }
            ScheduleOp::Insert(record) => {
                conn.execute(
                    "INSERT OR REPLACE INTO sync_jobs (id, owner, next_run_ms) VALUES (?1, ?2, ?3)",
                    params![
                        record.id.to_string(),
                        record.owner.to_hex(),
                        record.next_run_ms as i64,
                    ],
                )
                .map_err(|e| JobError::Storage(format!("failed to insert job: {e}")))?;
            }
            ScheduleOp::None => {}
        }
        Ok(())
    }

    /// Persists a cycle's dumps together with its rescheduling decision,
    /// atomically.
    pub fn persist_cycle(&self, dumps: &[ConfigDump], op: &ScheduleOp) -> JobResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| JobError::Storage(format!("failed to begin transaction: {e}")))?;
        for dump in dumps {
            Self::insert_dump(&tx, dump)?;
        }
        Self::apply_schedule(&tx, op)?;
        tx.commit()
            .map_err(|e| JobError::Storage(format!("failed to commit cycle: {e}")))?;
        Ok(())
    }

    // ── Expiry bookkeeping ───────────────────────────────────────

    /// Saves or replaces one expiring-message row.
    pub fn upsert_expiring_message(&self, message: &ExpiringMessage) -> JobResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO expiring_messages (hash, conversation, duration_ms, expires_started_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                message.hash,
                message.conversation,
                message.duration_ms as i64,
                message.expires_started_ms.map(|v| v as i64),
            ],
        )
        .map_err(|e| JobError::Storage(format!("failed to save expiring message: {e}")))?;
        Ok(())
    }

    /// Loads one expiring-message row by hash.
    pub fn expiring_message(&self, hash: &str) -> JobResult<Option<ExpiringMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT hash, conversation, duration_ms, expires_started_ms FROM expiring_messages WHERE hash = ?1")
            .map_err(|e| JobError::Storage(format!("failed to prepare expiry query: {e}")))?;
        let mut rows = stmt
            .query_map(params![hash], |row| {
                let hash: String = row.get(0)?;
                let conversation: String = row.get(1)?;
                let duration_ms: i64 = row.get(2)?;
                let expires_started_ms: Option<i64> = row.get(3)?;
                Ok(ExpiringMessage {
                    hash,
                    conversation,
                    duration_ms: duration_ms as u64,
                    expires_started_ms: expires_started_ms.map(|v| v as u64),
                })
            })
            .map_err(|e| JobError::Storage(format!("failed to query expiring message: {e}")))?;

        match rows.next() {
            Some(row) => row
                .map(Some)
                .map_err(|e| JobError::Storage(format!("failed to read expiry row: {e}"))),
            None => Ok(None),
        }
    }

    /// Recomputes `expires_started_ms` for each (hash, authoritative
    /// expiry) pair in one transaction, so local countdowns match the
    /// swarm's value. Returns how many rows changed.
    pub fn reconcile_expiries(&self, entries: &[(String, u64)]) -> JobResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| JobError::Storage(format!("failed to begin transaction: {e}")))?;
        let mut changed = 0;
        for (hash, expiry_ms) in entries {
            changed += tx
                .execute(
                    "UPDATE expiring_messages SET expires_started_ms = ?1 - duration_ms WHERE hash = ?2",
                    params![*expiry_ms as i64, hash],
                )
                .map_err(|e| JobError::Storage(format!("failed to reconcile expiry: {e}")))?;
        }
        tx.commit()
            .map_err(|e| JobError::Storage(format!("failed to commit reconciliation: {e}")))?;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(byte: u8) -> AccountId {
        AccountId::from_bytes([byte; 32])
    }

    fn dump(variant: ConfigVariant, owner: AccountId, data: &[u8]) -> ConfigDump {
        ConfigDump {
            variant,
            owner,
            data: data.to_vec(),
            created_ms: 100,
        }
    }

    #[test]
    fn dump_replaces_earlier_dump_for_same_variant_and_owner() {
        let store = SyncStore::open_in_memory().unwrap();
        let o = owner(1);
        store
            .save_dump(&dump(ConfigVariant::Contacts, o, b"v1"))
            .unwrap();
        store
            .save_dump(&dump(ConfigVariant::Contacts, o, b"v2"))
            .unwrap();

        let dumps = store.load_dumps(o).unwrap();
        assert_eq!(dumps.len(), 1);
        assert_eq!(dumps[0].data, b"v2");
    }

    #[test]
    fn dumps_are_scoped_to_owner() {
        let store = SyncStore::open_in_memory().unwrap();
        store
            .save_dump(&dump(ConfigVariant::UserProfile, owner(1), b"a"))
            .unwrap();
        store
            .save_dump(&dump(ConfigVariant::UserProfile, owner(2), b"b"))
            .unwrap();

        assert_eq!(store.load_dumps(owner(1)).unwrap().len(), 1);
        assert_eq!(store.load_dumps(owner(2)).unwrap().len(), 1);
    }

    #[test]
    fn scheduled_job_returns_earliest_record() {
        let store = SyncStore::open_in_memory().unwrap();
        let o = owner(1);
        let late = SyncJobRecord::new(o, 9_000);
        let early = SyncJobRecord::new(o, 4_000);
        store.upsert_job(&late).unwrap();
        store.upsert_job(&early).unwrap();

        assert_eq!(store.scheduled_job(o).unwrap(), Some(early));
        assert_eq!(store.jobs_for_owner(o).unwrap().len(), 2);
    }

    #[test]
    fn persist_cycle_writes_dumps_and_schedule_atomically() {
        let store = SyncStore::open_in_memory().unwrap();
        let o = owner(1);
        let record = SyncJobRecord::new(o, 7_000);
        store
            .persist_cycle(
                &[dump(ConfigVariant::UserGroups, o, b"g")],
                &ScheduleOp::Insert(record.clone()),
            )
            .unwrap();

        assert_eq!(store.load_dumps(o).unwrap().len(), 1);
        assert_eq!(store.scheduled_job(o).unwrap(), Some(record));
    }

    #[test]
    fn persist_cycle_can_update_another_record_instead() {
        let store = SyncStore::open_in_memory().unwrap();
        let o = owner(1);
        let existing = SyncJobRecord::new(o, 5_000);
        store.upsert_job(&existing).unwrap();

        store
            .persist_cycle(
                &[],
                &ScheduleOp::UpdateOther {
                    id: existing.id,
                    next_run_ms: 8_000,
                },
            )
            .unwrap();

        let jobs = store.jobs_for_owner(o).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].next_run_ms, 8_000);
    }

    #[test]
    fn delete_job_removes_the_record() {
        let store = SyncStore::open_in_memory().unwrap();
        let record = SyncJobRecord::new(owner(1), 1_000);
        store.upsert_job(&record).unwrap();
        store.delete_job(record.id).unwrap();
        assert_eq!(store.scheduled_job(owner(1)).unwrap(), None);
    }

    #[test]
    fn reconcile_recomputes_countdown_start_from_authoritative_expiry() {
        let store = SyncStore::open_in_memory().unwrap();
        store
            .upsert_expiring_message(&ExpiringMessage {
                hash: "m1".into(),
                conversation: "c1".into(),
                duration_ms: 60_000,
                expires_started_ms: Some(500_000),
            })
            .unwrap();

        let changed = store
            .reconcile_expiries(&[("m1".into(), 400_000), ("unknown".into(), 1)])
            .unwrap();
        assert_eq!(changed, 1);

        let row = store.expiring_message("m1").unwrap().unwrap();
        assert_eq!(row.expires_started_ms, Some(340_000));
    }
}
