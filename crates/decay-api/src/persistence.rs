use std::fmt;
use std::path::Path;

use contracts::{
    CampaignConfig, ChallengeKind, ChallengeResolution, DecaySnapshot, EngineStatus, EventRecord,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// One resolved or expired challenge attempt, kept for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChallengeAttemptRecord {
    pub campaign_id: String,
    pub instance_id: String,
    pub at: i64,
    pub kind: ChallengeKind,
    pub source: String,
    pub resolution: ChallengeResolution,
    pub level_delta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCampaignSummary {
    pub campaign_id: String,
    pub schema_version: String,
    pub level: f64,
    pub stage: String,
    pub updated_at: String,
}

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    NotAttached,
    CampaignAlreadyExists(String),
    InvalidSnapshot(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::NotAttached => write!(f, "sqlite store is not attached"),
            Self::CampaignAlreadyExists(campaign_id) => {
                write!(f, "campaign {campaign_id} already exists")
            }
            Self::InvalidSnapshot(details) => write!(f, "persisted snapshot rejected: {details}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

#[derive(Debug)]
pub struct SqliteCampaignStore {
    conn: Connection,
}

impl SqliteCampaignStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn campaign_exists(&self, campaign_id: &str) -> Result<bool, PersistenceError> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT campaign_id FROM campaigns WHERE campaign_id = ?1",
                params![campaign_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn delete_campaign(&mut self, campaign_id: &str) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM snapshots WHERE campaign_id = ?1",
            params![campaign_id],
        )?;
        tx.execute(
            "DELETE FROM challenge_attempts WHERE campaign_id = ?1",
            params![campaign_id],
        )?;
        tx.execute(
            "DELETE FROM events WHERE campaign_id = ?1",
            params![campaign_id],
        )?;
        tx.execute(
            "DELETE FROM campaigns WHERE campaign_id = ?1",
            params![campaign_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn persist_delta(
        &mut self,
        config: &CampaignConfig,
        status: &EngineStatus,
        events: &[EventRecord],
        attempts: &[ChallengeAttemptRecord],
        snapshot: Option<&DecaySnapshot>,
    ) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;

        upsert_campaign(&tx, config, status)?;

        for event in events {
            let payload_json = serde_json::to_string(event)?;
            tx.execute(
                "INSERT OR IGNORE INTO events (
                    campaign_id,
                    event_id,
                    at,
                    sequence,
                    kind,
                    payload_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.campaign_id.as_str(),
                    event.event_id.as_str(),
                    event.at,
                    i64::try_from(event.sequence).unwrap_or(i64::MAX),
                    format!("{:?}", event.kind),
                    payload_json,
                ],
            )?;
        }

        for attempt in attempts {
            let payload_json = serde_json::to_string(attempt)?;
            tx.execute(
                "INSERT OR IGNORE INTO challenge_attempts (
                    campaign_id,
                    instance_id,
                    at,
                    kind,
                    source,
                    resolution,
                    level_delta,
                    payload_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    attempt.campaign_id.as_str(),
                    attempt.instance_id.as_str(),
                    attempt.at,
                    attempt.kind.key(),
                    attempt.source.as_str(),
                    format!("{:?}", attempt.resolution).to_lowercase(),
                    attempt.level_delta,
                    payload_json,
                ],
            )?;
        }

        if let Some(snapshot_payload) = snapshot {
            let payload_json = serde_json::to_string(snapshot_payload)?;
            tx.execute(
                "INSERT OR REPLACE INTO snapshots (
                    campaign_id,
                    taken_at,
                    level,
                    stage,
                    payload_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    snapshot_payload.campaign_id.as_str(),
                    snapshot_payload.taken_at,
                    snapshot_payload.level,
                    snapshot_payload.stage.to_string(),
                    payload_json,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn load_latest_snapshot(
        &self,
        campaign_id: &str,
    ) -> Result<Option<DecaySnapshot>, PersistenceError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json
                 FROM snapshots
                 WHERE campaign_id = ?1
                 ORDER BY taken_at DESC
                 LIMIT 1",
                params![campaign_id],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(raw) => Ok(Some(serde_json::from_str::<DecaySnapshot>(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn load_events_after(
        &self,
        campaign_id: &str,
        after_sequence: u64,
        limit: usize,
    ) -> Result<Vec<EventRecord>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json
             FROM events
             WHERE campaign_id = ?1 AND sequence > ?2
             ORDER BY sequence ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![
                campaign_id,
                i64::try_from(after_sequence).unwrap_or(i64::MAX),
                i64::try_from(limit).unwrap_or(i64::MAX)
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut events = Vec::new();
        for row in rows {
            let payload = row?;
            events.push(serde_json::from_str::<EventRecord>(&payload)?);
        }
        Ok(events)
    }

    pub fn list_campaigns(
        &self,
        page_size: usize,
    ) -> Result<Vec<PersistedCampaignSummary>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT campaign_id, schema_version, status_json, updated_at
             FROM campaigns
             ORDER BY updated_at DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(
            params![i64::try_from(page_size).unwrap_or(i64::MAX)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )?;

        let mut summaries = Vec::new();
        for row in rows {
            let (campaign_id, schema_version, status_json, updated_at) = row?;
            let status = serde_json::from_str::<EngineStatus>(&status_json)?;
            summaries.push(PersistedCampaignSummary {
                campaign_id,
                schema_version,
                level: status.level,
                stage: status.stage.to_string(),
                updated_at,
            });
        }
        Ok(summaries)
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS campaigns (
                campaign_id TEXT PRIMARY KEY,
                schema_version TEXT NOT NULL,
                config_json TEXT NOT NULL,
                status_json TEXT NOT NULL,
                seed TEXT NOT NULL,
                duration_days INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                campaign_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                at INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                kind TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                PRIMARY KEY (campaign_id, event_id),
                UNIQUE (campaign_id, sequence)
            );

            CREATE TABLE IF NOT EXISTS challenge_attempts (
                campaign_id TEXT NOT NULL,
                instance_id TEXT NOT NULL,
                at INTEGER NOT NULL,
                kind TEXT NOT NULL,
                source TEXT NOT NULL,
                resolution TEXT NOT NULL,
                level_delta REAL NOT NULL,
                payload_json TEXT NOT NULL,
                PRIMARY KEY (campaign_id, instance_id)
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                campaign_id TEXT NOT NULL,
                taken_at INTEGER NOT NULL,
                level REAL NOT NULL,
                stage TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                PRIMARY KEY (campaign_id, taken_at)
            );

            CREATE INDEX IF NOT EXISTS idx_events_campaign_sequence ON events(campaign_id, sequence);
            CREATE INDEX IF NOT EXISTS idx_events_campaign_kind ON events(campaign_id, kind, sequence);
            CREATE INDEX IF NOT EXISTS idx_attempts_campaign_source ON challenge_attempts(campaign_id, source, at);
            CREATE INDEX IF NOT EXISTS idx_snapshots_campaign_at ON snapshots(campaign_id, taken_at);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', 'at-00000000000')",
            [],
        )?;

        Ok(())
    }
}

fn upsert_campaign(
    tx: &rusqlite::Transaction<'_>,
    config: &CampaignConfig,
    status: &EngineStatus,
) -> Result<(), PersistenceError> {
    let config_json = serde_json::to_string(config)?;
    let status_json = serde_json::to_string(status)?;

    tx.execute(
        "INSERT INTO campaigns (
            campaign_id,
            schema_version,
            config_json,
            status_json,
            seed,
            duration_days,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(campaign_id) DO UPDATE SET
            schema_version = excluded.schema_version,
            config_json = excluded.config_json,
            status_json = excluded.status_json,
            seed = excluded.seed,
            duration_days = excluded.duration_days,
            updated_at = excluded.updated_at",
        params![
            config.campaign_id.as_str(),
            config.schema_version.as_str(),
            config_json,
            status_json,
            config.seed.to_string(),
            i64::from(config.duration_days),
            at_stamp(config.start_at),
            at_stamp(status.at),
        ],
    )?;

    Ok(())
}

fn at_stamp(at: i64) -> String {
    format!("at-{at:011}")
}
