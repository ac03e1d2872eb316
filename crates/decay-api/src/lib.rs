//! In-process API facade: one exclusively-owned engine per campaign, with
//! SQLite persistence and post-commit announcement delivery.
//!
//! Every mutating entry point here is one critical section over the engine;
//! announcements and persistence flushes happen only after the state
//! transition has been applied. A failed flush is surfaced through
//! `last_persistence_error` and never interrupts the tick path.

mod persistence;
mod server;

use std::path::Path;
use std::sync::Arc;

use contracts::{
    CampaignConfig, ChallengeDescriptor, ChallengeKind, ChallengeOutcome, ChannelContext,
    DecaySnapshot, EngineStatus, EventRecord, RebootOutcome, TrendReport,
};
use decay_core::catalog::severity_for_stage;
use decay_core::{Announcer, DecayEngine, NullAnnouncer, ScheduleConfigError, SubmitError, TickReport};
use persistence::SqliteCampaignStore;
pub use persistence::{ChallengeAttemptRecord, PersistedCampaignSummary, PersistenceError};
pub use server::{serve, ServerError};
use tracing::warn;

#[derive(Debug)]
struct PersistenceState {
    store: SqliteCampaignStore,
    persisted_event_count: usize,
    persisted_attempt_count: usize,
    ticks_since_snapshot: u64,
    snapshot_written: bool,
}

pub struct EngineApi {
    engine: DecayEngine,
    attempt_log: Vec<ChallengeAttemptRecord>,
    persistence: Option<PersistenceState>,
    last_persistence_error: Option<String>,
    announcer: Arc<dyn Announcer>,
}

impl std::fmt::Debug for EngineApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineApi")
            .field("campaign_id", &self.engine.campaign_id())
            .field("attempt_log_len", &self.attempt_log.len())
            .field("persistence_attached", &self.persistence.is_some())
            .finish()
    }
}

impl EngineApi {
    pub fn from_config(config: CampaignConfig) -> Result<Self, ScheduleConfigError> {
        Ok(Self {
            engine: DecayEngine::new(config)?,
            attempt_log: Vec::new(),
            persistence: None,
            last_persistence_error: None,
            announcer: Arc::new(NullAnnouncer),
        })
    }

    pub fn set_announcer(&mut self, announcer: Arc<dyn Announcer>) {
        self.announcer = announcer;
    }

    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let store = SqliteCampaignStore::open(path)?;
        self.persistence = Some(PersistenceState {
            store,
            persisted_event_count: 0,
            persisted_attempt_count: 0,
            ticks_since_snapshot: 0,
            snapshot_written: false,
        });
        Ok(())
    }

    /// Claim storage for this campaign, optionally replacing a previous run
    /// under the same id, and write the bootstrap snapshot.
    pub fn initialize_campaign_storage(
        &mut self,
        now: i64,
        replace_existing: bool,
    ) -> Result<(), PersistenceError> {
        let Some(state) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };

        let campaign_id = self.engine.campaign_id().to_string();
        if state.store.campaign_exists(&campaign_id)? {
            if replace_existing {
                state.store.delete_campaign(&campaign_id)?;
                state.persisted_event_count = 0;
                state.persisted_attempt_count = 0;
                state.ticks_since_snapshot = 0;
                state.snapshot_written = false;
            } else {
                return Err(PersistenceError::CampaignAlreadyExists(campaign_id));
            }
        }

        let snapshot = self.engine.snapshot(now);
        let status = self.engine.status(now);
        state.store.persist_delta(
            self.engine.config(),
            &status,
            self.engine.events(),
            &[],
            Some(&snapshot),
        )?;
        state.persisted_event_count = self.engine.events().len();
        state.snapshot_written = true;
        self.last_persistence_error = None;
        Ok(())
    }

    /// Resume from the newest persisted snapshot, when one exists. Returns
    /// whether a snapshot was adopted.
    pub fn resume_from_store(&mut self) -> Result<bool, PersistenceError> {
        let Some(state) = self.persistence.as_ref() else {
            return Err(PersistenceError::NotAttached);
        };

        let campaign_id = self.engine.campaign_id().to_string();
        let Some(snapshot) = state.store.load_latest_snapshot(&campaign_id)? else {
            return Ok(false);
        };

        self.engine = DecayEngine::restore(self.engine.config().clone(), Some(snapshot))
            .map_err(|err| PersistenceError::InvalidSnapshot(err.to_string()))?;
        Ok(true)
    }

    pub fn campaign_id(&self) -> &str {
        self.engine.campaign_id()
    }

    pub fn config(&self) -> &CampaignConfig {
        self.engine.config()
    }

    pub fn status(&self, now: i64) -> EngineStatus {
        self.engine.status(now)
    }

    pub fn trend(&self) -> TrendReport {
        self.engine.trend()
    }

    pub fn diagnostic_report(&self, now: i64) -> String {
        self.engine.diagnostic_report(now)
    }

    pub fn events(&self) -> &[EventRecord] {
        self.engine.events()
    }

    pub fn events_after(&self, sequence: u64) -> &[EventRecord] {
        self.engine.events_after(sequence)
    }

    pub fn attempt_log(&self) -> &[ChallengeAttemptRecord] {
        &self.attempt_log
    }

    pub fn snapshot_for(&self, now: i64) -> DecaySnapshot {
        self.engine.snapshot(now)
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    pub fn record_usage(&mut self, commands: u64, watch_hours: f64, titles_finished: u32) {
        self.engine.record_usage(commands, watch_hours, titles_finished);
    }

    pub fn challenge_reference_answer(&self, instance_id: &str) -> Option<String> {
        self.engine.reference_answer(instance_id)
    }

    /// One driver tick. Announcements are delivered after the engine commits,
    /// and expired challenges are announced like any other resolution.
    pub fn tick(&mut self, now: i64, context: &ChannelContext) -> TickReport {
        let report = self.engine.tick(now, context);

        for expired in &report.expired_challenges {
            self.attempt_log.push(ChallengeAttemptRecord {
                campaign_id: self.engine.campaign_id().to_string(),
                instance_id: expired.instance_id.clone(),
                at: now,
                kind: expired.kind,
                source: String::new(),
                resolution: expired.resolution,
                level_delta: expired.level_delta,
            });
        }

        self.flush_persistence_if_enabled(now, true);

        for announcement in &report.announcements {
            self.announcer
                .announce(&announcement.payload, announcement.severity);
        }
        for expired in &report.expired_challenges {
            self.announcer
                .announce(&expired.message, severity_for_stage(expired.stage_after));
        }

        report
    }

    pub fn request_challenge(
        &mut self,
        kind: Option<ChallengeKind>,
        now: i64,
        issued_to: &str,
    ) -> ChallengeDescriptor {
        let descriptor = self.engine.issue_challenge(kind, now, issued_to);
        self.flush_persistence_if_enabled(now, false);
        descriptor
    }

    pub fn submit_challenge(
        &mut self,
        instance_id: &str,
        answer: &str,
        now: i64,
        source: &str,
    ) -> Result<ChallengeOutcome, SubmitError> {
        let outcome = self.engine.submit_challenge(instance_id, answer, now, source)?;

        self.attempt_log.push(ChallengeAttemptRecord {
            campaign_id: self.engine.campaign_id().to_string(),
            instance_id: outcome.instance_id.clone(),
            at: now,
            kind: outcome.kind,
            source: source.to_string(),
            resolution: outcome.resolution,
            level_delta: outcome.level_delta,
        });

        self.flush_persistence_if_enabled(now, false);
        self.announcer
            .announce(&outcome.message, severity_for_stage(outcome.stage_after));
        Ok(outcome)
    }

    pub fn reboot(&mut self, now: i64, source: &str) -> RebootOutcome {
        let outcome = self.engine.reboot(now, source);
        self.flush_persistence_if_enabled(now, false);
        self.announcer
            .announce(&outcome.message, severity_for_stage(outcome.stage_after));
        outcome
    }

    pub fn flush_persistence_checked(&mut self, now: i64) -> Result<(), PersistenceError> {
        if self.persistence.is_none() {
            return Err(PersistenceError::NotAttached);
        }
        self.flush_persistence(now, false)
    }

    fn flush_persistence_if_enabled(&mut self, now: i64, counts_as_tick: bool) {
        if self.persistence.is_none() {
            return;
        }
        if let Err(err) = self.flush_persistence(now, counts_as_tick) {
            warn!(campaign_id = %self.engine.campaign_id(), error = %err, "persistence flush failed");
            self.last_persistence_error = Some(err.to_string());
        }
    }

    fn flush_persistence(
        &mut self,
        now: i64,
        counts_as_tick: bool,
    ) -> Result<(), PersistenceError> {
        let status = self.engine.status(now);
        let Some(state) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };

        if counts_as_tick {
            state.ticks_since_snapshot = state.ticks_since_snapshot.saturating_add(1);
        }

        let cadence = self.engine.config().snapshot_every_ticks.max(1);
        let snapshot_due = !state.snapshot_written || state.ticks_since_snapshot >= cadence;
        let snapshot = if snapshot_due {
            Some(self.engine.snapshot(now))
        } else {
            None
        };

        let new_events = &self.engine.events()[state.persisted_event_count..];
        let new_attempts = &self.attempt_log[state.persisted_attempt_count..];

        state.store.persist_delta(
            self.engine.config(),
            &status,
            new_events,
            new_attempts,
            snapshot.as_ref(),
        )?;

        state.persisted_event_count = self.engine.events().len();
        state.persisted_attempt_count = self.attempt_log.len();
        if snapshot.is_some() {
            state.ticks_since_snapshot = 0;
            state.snapshot_written = true;
        }

        self.last_persistence_error = None;
        Ok(())
    }
}
