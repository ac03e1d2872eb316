//! Canonical owner of the decay state.
//!
//! All mutation goes through this type: scheduled drift, event deltas, and
//! challenge resolutions are serialized by the caller holding the engine
//! exclusively. Announcements are returned to the caller and delivered only
//! after the state transition has committed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

mod events;
mod inspect;
mod snapshot;

use contracts::{
    CampaignConfig, ChallengeDescriptor, ChallengeKind, ChallengeOutcome, ChallengeResolution,
    ChannelContext, DecaySnapshot, DecayStage, EngineStatus, EventKind, EventRecord, LevelSample,
    RebootOutcome, SeverityTier, TrendReport, UsagePressure, LEVEL_MAX, LEVEL_MIN,
    SCHEMA_VERSION_V1,
};
use serde_json::json;

use crate::catalog::{severity_for_stage, EventCatalog};
use crate::challenge::{difficulty_discount, grief_multiplier, ChallengeFactory, IssuedChallenge};
use crate::rng;
use crate::schedule::{CampaignCalendar, ScheduleConfigError};
use crate::trend;

/// Payload ready for outbound delivery, produced strictly after commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub payload: String,
    pub severity: SeverityTier,
}

/// Result of one driver tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub campaign_day: Option<u32>,
    /// Floor the level was raised to, when baseline drift applied.
    pub drift_raised_to: Option<f64>,
    pub announcements: Vec<Announcement>,
    pub expired_challenges: Vec<ChallengeOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Instance id unknown or already consumed.
    InvalidSubmission { instance_id: String },
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSubmission { instance_id } => {
                write!(f, "challenge {instance_id} not found or already resolved")
            }
        }
    }
}

impl std::error::Error for SubmitError {}

#[derive(Debug, Clone, Copy, Default)]
struct FailureStreak {
    consecutive: u32,
    last_failure_at: i64,
}

#[derive(Debug)]
pub struct DecayEngine {
    config: CampaignConfig,
    calendar: CampaignCalendar,
    catalog: EventCatalog,
    factory: ChallengeFactory,
    level: f64,
    stage: DecayStage,
    last_event_at: i64,
    last_event_severity: SeverityTier,
    level_history: Vec<LevelSample>,
    usage: UsagePressure,
    fragments_revealed: BTreeSet<String>,
    recovery_attempts: u64,
    successful_recoveries: u64,
    last_awareness_at: Option<i64>,
    active_challenges: BTreeMap<String, IssuedChallenge>,
    failure_streaks: BTreeMap<String, FailureStreak>,
    event_log: Vec<EventRecord>,
    next_sequence: u64,
    draw_cursor: u64,
}

impl DecayEngine {
    pub fn new(config: CampaignConfig) -> Result<Self, ScheduleConfigError> {
        Self::restore(config, None)
    }

    /// Build an engine, resuming from a persisted snapshot when one exists.
    /// A missing snapshot starts the campaign at `level = 0, stage = stable`.
    pub fn restore(
        config: CampaignConfig,
        snapshot: Option<DecaySnapshot>,
    ) -> Result<Self, ScheduleConfigError> {
        let calendar = CampaignCalendar::from_config(&config)?;
        let factory = ChallengeFactory::new(config.seed);

        let mut engine = Self {
            calendar,
            factory,
            catalog: EventCatalog::builtin(),
            level: LEVEL_MIN,
            stage: DecayStage::Stable,
            last_event_at: 0,
            last_event_severity: SeverityTier::Minor,
            level_history: Vec::new(),
            usage: UsagePressure::default(),
            fragments_revealed: BTreeSet::new(),
            recovery_attempts: 0,
            successful_recoveries: 0,
            last_awareness_at: None,
            active_challenges: BTreeMap::new(),
            failure_streaks: BTreeMap::new(),
            event_log: Vec::new(),
            next_sequence: 0,
            draw_cursor: 0,
            config,
        };

        if let Some(snapshot) = snapshot {
            engine.apply_snapshot(snapshot);
        }

        Ok(engine)
    }

    /// Swap in a custom event catalog (defaults to the builtin set).
    pub fn with_catalog(mut self, catalog: EventCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn campaign_id(&self) -> &str {
        &self.config.campaign_id
    }

    /// Read-only `(level, stage)` view.
    pub fn current(&self) -> (f64, DecayStage) {
        (self.level, self.stage)
    }

    pub fn level_history(&self) -> &[LevelSample] {
        &self.level_history
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.event_log
    }

    pub fn active_challenge_count(&self) -> usize {
        self.active_challenges.len()
    }

    /// Correct answer for an active instance. Recovery drills and simulations
    /// use this to resolve their own challenges; chat observers never see it.
    pub fn reference_answer(&self, instance_id: &str) -> Option<String> {
        self.active_challenges
            .get(instance_id)
            .map(IssuedChallenge::reference_answer)
    }

    pub fn usage(&self) -> UsagePressure {
        self.usage
    }

    pub fn record_usage(&mut self, commands: u64, watch_hours: f64, titles_finished: u32) {
        self.usage.commands_handled = self.usage.commands_handled.saturating_add(commands);
        self.usage.watch_hours += watch_hours.max(0.0);
        self.usage.titles_finished = self.usage.titles_finished.saturating_add(titles_finished);
    }

    /// Level used for rendering: canonical level plus the bounded usage term.
    pub fn rendered_level(&self) -> f64 {
        (self.level + self.usage.term()).clamp(LEVEL_MIN, LEVEL_MAX)
    }

    /// Raise the level to the scheduled floor for the campaign day containing
    /// `now`. Drift only ever pushes the level up; outside the campaign
    /// window this is a no-op. Returns the floor when drift applied.
    pub fn apply_schedule_tick(&mut self, now: i64) -> Option<f64> {
        let day = self.calendar.day_index(now)?;
        let floor = self.calendar.floor_for_day(day);
        if self.level >= floor {
            return None;
        }
        self.set_level(now, floor);
        self.push_record(
            now,
            EventKind::ScheduleDriftApplied,
            None,
            None,
            Some(json!({ "campaign_day": day, "floor": floor })),
        );
        Some(floor)
    }

    /// Add `delta` to the level, clamped into `[0, 10]`. Clamping bounds how
    /// much a single recovery success can undo.
    pub fn apply_delta(&mut self, now: i64, delta: f64) -> f64 {
        let delta = if delta.is_finite() { delta } else { 0.0 };
        let next = (self.level + delta).clamp(LEVEL_MIN, LEVEL_MAX);
        self.set_level(now, next);
        self.level
    }

    /// One driver tick: baseline drift, then the spontaneous-event draw, then
    /// the supplementary awareness/fragment draws, then challenge expiry.
    pub fn tick(&mut self, now: i64, context: &ChannelContext) -> TickReport {
        let campaign_day = self.calendar.day_index(now);
        let drift_raised_to = self.apply_schedule_tick(now);

        let mut announcements = Vec::new();
        if campaign_day.is_some() {
            if let Some(manifestation) = self.maybe_fire_event(now, context) {
                announcements.push(manifestation);
            }
            if let Some(awareness) = self.maybe_awareness(now) {
                announcements.push(awareness);
            }
            if let Some(fragment) = self.maybe_fragment(now) {
                announcements.push(fragment);
            }
        }

        let expired_challenges = self.expire_stale_challenges(now);

        TickReport {
            campaign_day,
            drift_raised_to,
            announcements,
            expired_challenges,
        }
    }

    /// Issue a recovery challenge. `kind = None` draws uniformly.
    pub fn issue_challenge(
        &mut self,
        kind: Option<ChallengeKind>,
        now: i64,
        issued_to: &str,
    ) -> ChallengeDescriptor {
        let stream = self.next_stream();
        let challenge = self.factory.issue(kind, self.level, now, issued_to, stream);
        let descriptor = ChallengeDescriptor {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            instance_id: challenge.instance_id.clone(),
            campaign_id: self.config.campaign_id.clone(),
            kind: challenge.kind,
            difficulty: challenge.difficulty,
            prompt: challenge.prompt.clone(),
            issued_at: now,
            expires_at: now + self.config.challenge_timeout_seconds,
            issued_to: issued_to.to_string(),
        };
        self.push_record(
            now,
            EventKind::ChallengeIssued,
            None,
            None,
            Some(json!({
                "instance_id": challenge.instance_id.as_str(),
                "kind": challenge.kind.key(),
                "difficulty": challenge.difficulty,
                "issued_to": issued_to,
            })),
        );
        self.active_challenges
            .insert(challenge.instance_id.clone(), challenge);
        descriptor
    }

    /// Validate-and-consume a challenge submission. The instance is removed
    /// before grading, so a second submission for the same id always gets
    /// `InvalidSubmission`.
    pub fn submit_challenge(
        &mut self,
        instance_id: &str,
        answer: &str,
        now: i64,
        source: &str,
    ) -> Result<ChallengeOutcome, SubmitError> {
        let Some(challenge) = self.active_challenges.remove(instance_id) else {
            return Err(SubmitError::InvalidSubmission {
                instance_id: instance_id.to_string(),
            });
        };

        self.recovery_attempts = self.recovery_attempts.saturating_add(1);

        if now - challenge.issued_at > self.config.challenge_timeout_seconds {
            return Ok(self.resolve_expired(challenge, now));
        }

        if challenge.grade(answer) {
            self.successful_recoveries = self.successful_recoveries.saturating_add(1);
            self.failure_streaks.remove(source);

            let delta = -(self.config.recovery_base(challenge.kind)
                * difficulty_discount(challenge.difficulty));
            let level_after = self.apply_delta(now, delta);
            let message = self.recovery_success_message();
            self.push_record(
                now,
                EventKind::ChallengeResolved,
                Some(severity_for_stage(self.stage)),
                Some(message.clone()),
                Some(json!({
                    "instance_id": challenge.instance_id.as_str(),
                    "kind": challenge.kind.key(),
                    "resolution": "success",
                    "source": source,
                    "delta": delta,
                })),
            );
            Ok(ChallengeOutcome {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                instance_id: challenge.instance_id,
                kind: challenge.kind,
                resolution: ChallengeResolution::Success,
                level_delta: delta,
                level_after,
                stage_after: self.stage,
                message,
            })
        } else {
            let multiplier = self.bump_failure_streak(source, now);
            let delta = self.config.failure_penalty.max(0.0) * multiplier;
            let level_after = self.apply_delta(now, delta);
            let message = self.recovery_failure_message();
            self.push_record(
                now,
                EventKind::ChallengeResolved,
                Some(severity_for_stage(self.stage)),
                Some(message.clone()),
                Some(json!({
                    "instance_id": challenge.instance_id.as_str(),
                    "kind": challenge.kind.key(),
                    "resolution": "failure",
                    "source": source,
                    "delta": delta,
                    "penalty_multiplier": multiplier,
                })),
            );
            Ok(ChallengeOutcome {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                instance_id: challenge.instance_id,
                kind: challenge.kind,
                resolution: ChallengeResolution::Failure,
                level_delta: delta,
                level_after,
                stage_after: self.stage,
                message,
            })
        }
    }

    /// Plain recovery attempt with no puzzle: a seeded success roll whose
    /// odds shrink as the level and the attempt count climb.
    pub fn reboot(&mut self, now: i64, source: &str) -> RebootOutcome {
        self.recovery_attempts = self.recovery_attempts.saturating_add(1);
        let odds = (0.8 - self.level * 0.07 - self.recovery_attempts as f64 * 0.01)
            .clamp(0.05, 0.8);
        let stream = self.next_stream();
        let succeeded = rng::chance(self.config.seed, stream, odds);

        let delta = if succeeded {
            self.successful_recoveries = self.successful_recoveries.saturating_add(1);
            -1.0
        } else {
            0.3
        };
        let level_after = self.apply_delta(now, delta);
        let message = if succeeded {
            self.recovery_success_message()
        } else {
            self.recovery_failure_message()
        };
        self.push_record(
            now,
            EventKind::RebootAttempted,
            Some(severity_for_stage(self.stage)),
            Some(message.clone()),
            Some(json!({
                "source": source,
                "succeeded": succeeded,
                "delta": delta,
            })),
        );

        RebootOutcome {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            succeeded,
            level_delta: delta,
            level_after,
            stage_after: self.stage,
            message,
        }
    }

    pub fn trend(&self) -> TrendReport {
        trend::analyze(
            &self.level_history,
            self.config.trend_window,
            self.config.trend_noise_per_hour,
        )
    }

    pub fn status(&self, now: i64) -> EngineStatus {
        EngineStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            campaign_id: self.config.campaign_id.clone(),
            at: now,
            campaign_day: self.calendar.day_index(now),
            level: self.level,
            stage: self.stage,
            trend: self.trend(),
            active_challenges: self.active_challenges.len(),
            events_recorded: self.event_log.len(),
        }
    }

    fn expire_stale_challenges(&mut self, now: i64) -> Vec<ChallengeOutcome> {
        let timeout = self.config.challenge_timeout_seconds;
        let stale: Vec<String> = self
            .active_challenges
            .iter()
            .filter(|(_, challenge)| now - challenge.issued_at > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        let mut outcomes = Vec::with_capacity(stale.len());
        for instance_id in stale {
            if let Some(challenge) = self.active_challenges.remove(&instance_id) {
                outcomes.push(self.resolve_expired(challenge, now));
            }
        }
        outcomes
    }

    fn resolve_expired(&mut self, challenge: IssuedChallenge, now: i64) -> ChallengeOutcome {
        let delta = self.config.failure_penalty.max(0.0);
        let level_after = self.apply_delta(now, delta);
        self.push_record(
            now,
            EventKind::ChallengeExpired,
            Some(severity_for_stage(self.stage)),
            None,
            Some(json!({
                "instance_id": challenge.instance_id.as_str(),
                "kind": challenge.kind.key(),
                "issued_at": challenge.issued_at,
            })),
        );
        ChallengeOutcome {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            instance_id: challenge.instance_id,
            kind: challenge.kind,
            resolution: ChallengeResolution::Expired,
            level_delta: delta,
            level_after,
            stage_after: self.stage,
            message: "recovery session timed out. the condition worsens.".to_string(),
        }
    }

    /// Penalty multiplier for this failure, counting prior failures from the
    /// same source inside the grief window. A success or an elapsed window
    /// resets the streak.
    fn bump_failure_streak(&mut self, source: &str, now: i64) -> f64 {
        let streak = self.failure_streaks.entry(source.to_string()).or_default();
        if streak.last_failure_at != 0
            && now - streak.last_failure_at > self.config.grief_window_seconds
        {
            streak.consecutive = 0;
        }
        let multiplier = grief_multiplier(
            streak.consecutive,
            self.config.grief_step,
            self.config.grief_multiplier_cap,
        );
        streak.consecutive = streak.consecutive.saturating_add(1);
        streak.last_failure_at = now;
        multiplier
    }

    fn set_level(&mut self, now: i64, value: f64) {
        self.level = value.clamp(LEVEL_MIN, LEVEL_MAX);
        self.stage = DecayStage::from_level(self.level);
        self.push_history_sample(now);
    }

    /// History timestamps never run backwards: late samples are clamped
    /// forward to the newest recorded timestamp.
    fn push_history_sample(&mut self, now: i64) {
        let at = self
            .level_history
            .last()
            .map(|sample| sample.at.max(now))
            .unwrap_or(now);
        self.level_history.push(LevelSample {
            at,
            level: self.level,
        });
        let retention = self.config.history_retention.max(1);
        if self.level_history.len() > retention {
            let excess = self.level_history.len() - retention;
            self.level_history.drain(..excess);
        }
    }

    pub(super) fn next_stream(&mut self) -> u64 {
        self.draw_cursor = self.draw_cursor.wrapping_add(1);
        self.draw_cursor
    }
}

#[cfg(test)]
mod tests;
