//! v1 cross-boundary contracts for the decay kernel, API, persistence, and observers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod serde_u64_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";
pub const DAY_SECONDS: i64 = 86_400;

/// Decay level bounds. Every level value in the system is clamped into this range.
pub const LEVEL_MIN: f64 = 0.0;
pub const LEVEL_MAX: f64 = 10.0;

/// Fixed stage breakpoints over the decay level scale. Buckets are
/// upper-inclusive: stage `i` covers `(STAGE_BREAKPOINTS[i], STAGE_BREAKPOINTS[i + 1]]`,
/// with the first bucket closed at `LEVEL_MIN`. A level of exactly 9 is still
/// critical; only the climb past it is terminal.
pub const STAGE_BREAKPOINTS: [f64; 7] = [0.0, 1.0, 3.0, 5.0, 7.0, 9.0, 10.0];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecayStage {
    Stable,
    Minor,
    Moderate,
    Severe,
    Critical,
    Terminal,
}

impl DecayStage {
    /// Derive the stage bucket containing `level`. Total over all inputs:
    /// NaN reads as `LEVEL_MIN`, out-of-range levels clamp first.
    pub fn from_level(level: f64) -> Self {
        let level = if level.is_nan() { LEVEL_MIN } else { level };
        let level = level.clamp(LEVEL_MIN, LEVEL_MAX);
        if level <= STAGE_BREAKPOINTS[1] {
            Self::Stable
        } else if level <= STAGE_BREAKPOINTS[2] {
            Self::Minor
        } else if level <= STAGE_BREAKPOINTS[3] {
            Self::Moderate
        } else if level <= STAGE_BREAKPOINTS[4] {
            Self::Severe
        } else if level <= STAGE_BREAKPOINTS[5] {
            Self::Critical
        } else {
            Self::Terminal
        }
    }

    /// Lower breakpoint of this stage's level bucket.
    pub fn floor_level(self) -> f64 {
        STAGE_BREAKPOINTS[self as usize]
    }
}

impl fmt::Display for DecayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stable => "stable",
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
            Self::Critical => "critical",
            Self::Terminal => "terminal",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    Minor,
    Moderate,
    Severe,
    Critical,
}

impl SeverityTier {
    pub const ALL: [SeverityTier; 4] = [
        SeverityTier::Minor,
        SeverityTier::Moderate,
        SeverityTier::Severe,
        SeverityTier::Critical,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    Memory,
    Circuit,
    Static,
    Debug,
    Binary,
}

impl ChallengeKind {
    pub const ALL: [ChallengeKind; 5] = [
        ChallengeKind::Memory,
        ChallengeKind::Circuit,
        ChallengeKind::Static,
        ChallengeKind::Debug,
        ChallengeKind::Binary,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Circuit => "circuit",
            Self::Static => "static",
            Self::Debug => "debug",
            Self::Binary => "binary",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "circuit" => Some(Self::Circuit),
            "static" => Some(Self::Static),
            "debug" => Some(Self::Debug),
            "binary" => Some(Self::Binary),
            _ => None,
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeResolution {
    Success,
    Failure,
    Expired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Worsening,
    Stable,
}

/// One step of the campaign baseline schedule: from `from_day` (inclusive,
/// zero-based) onward the decay level is floored at `floor`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScheduleStep {
    pub from_day: u32,
    pub floor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignConfig {
    pub schema_version: String,
    pub campaign_id: String,
    #[serde(with = "serde_u64_string")]
    pub seed: u64,
    /// Campaign window start, unix seconds.
    pub start_at: i64,
    pub duration_days: u32,
    pub day_seconds: i64,
    /// Six-step baseline floor table, one step per stage.
    pub schedule_floors: Vec<ScheduleStep>,
    /// Evening window (hours of day, end inclusive) where event probability is boosted.
    pub peak_start_hour: u8,
    pub peak_end_hour: u8,
    pub peak_multiplier: f64,
    /// Per-message activity boost and its cap, applied to event probability.
    pub activity_per_message: f64,
    pub activity_multiplier_cap: f64,
    /// Per-tier base trigger probability overrides, keyed by tier name.
    #[serde(default)]
    pub base_event_probability: BTreeMap<String, f64>,
    pub event_probability_cap: f64,
    pub challenge_timeout_seconds: i64,
    /// Per-kind base recovery overrides, keyed by kind name.
    #[serde(default)]
    pub base_recovery: BTreeMap<String, f64>,
    pub failure_penalty: f64,
    pub grief_window_seconds: i64,
    pub grief_step: f64,
    pub grief_multiplier_cap: f64,
    pub awareness_cooldown_seconds: i64,
    pub history_retention: usize,
    pub trend_window: usize,
    /// Slope magnitudes below this (level units per hour) classify as stable.
    pub trend_noise_per_hour: f64,
    /// Persistence snapshot cadence, in driver ticks.
    pub snapshot_every_ticks: u64,
    pub notes: Option<String>,
}

impl CampaignConfig {
    /// Exclusive end of the campaign window, unix seconds.
    pub fn end_at(&self) -> i64 {
        self.start_at + i64::from(self.duration_days) * self.day_seconds.max(1)
    }

    /// Base trigger probability for a tier, with configured override.
    pub fn base_probability(&self, tier: SeverityTier) -> f64 {
        let fallback = match tier {
            SeverityTier::Minor => 0.10,
            SeverityTier::Moderate => 0.22,
            SeverityTier::Severe => 0.38,
            SeverityTier::Critical => 0.55,
        };
        self.base_event_probability
            .get(tier.key())
            .copied()
            .unwrap_or(fallback)
            .clamp(0.0, 1.0)
    }

    /// Base recovery magnitude for a challenge kind, with configured override.
    pub fn recovery_base(&self, kind: ChallengeKind) -> f64 {
        let fallback = match kind {
            ChallengeKind::Memory => 1.2,
            ChallengeKind::Circuit => 1.0,
            ChallengeKind::Static => 0.8,
            ChallengeKind::Debug => 1.4,
            ChallengeKind::Binary => 0.6,
        };
        self.base_recovery
            .get(kind.key())
            .copied()
            .unwrap_or(fallback)
            .max(0.0)
    }

    pub fn default_schedule() -> Vec<ScheduleStep> {
        vec![
            ScheduleStep {
                from_day: 0,
                floor: 0.0,
            },
            ScheduleStep {
                from_day: 4,
                floor: 1.0,
            },
            ScheduleStep {
                from_day: 9,
                floor: 3.0,
            },
            ScheduleStep {
                from_day: 16,
                floor: 5.0,
            },
            ScheduleStep {
                from_day: 24,
                floor: 7.0,
            },
            ScheduleStep {
                from_day: 30,
                floor: 9.0,
            },
        ]
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            campaign_id: "campaign_local_001".to_string(),
            seed: 1337,
            start_at: 0,
            duration_days: 31,
            day_seconds: DAY_SECONDS,
            schedule_floors: Self::default_schedule(),
            peak_start_hour: 18,
            peak_end_hour: 23,
            peak_multiplier: 1.5,
            activity_per_message: 0.01,
            activity_multiplier_cap: 1.4,
            base_event_probability: BTreeMap::new(),
            event_probability_cap: 0.9,
            challenge_timeout_seconds: 300,
            base_recovery: BTreeMap::new(),
            failure_penalty: 0.15,
            grief_window_seconds: 900,
            grief_step: 0.5,
            grief_multiplier_cap: 4.0,
            awareness_cooldown_seconds: 21_600,
            history_retention: 200,
            trend_window: 20,
            trend_noise_per_hour: 0.05,
            snapshot_every_ticks: 12,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LevelSample {
    pub at: i64,
    pub level: f64,
}

/// Bounded usage counters feeding the rendered corruption intensity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct UsagePressure {
    pub commands_handled: u64,
    pub watch_hours: f64,
    pub titles_finished: u32,
}

impl UsagePressure {
    /// Additive pressure term, bounded so activity alone cannot push the
    /// rendered level more than two points past the canonical one.
    pub fn term(&self) -> f64 {
        let raw = self.commands_handled as f64 * 0.001
            + self.watch_hours * 0.1
            + f64::from(self.titles_finished) * 0.05;
        raw.min(2.0)
    }
}

/// Persisted engine state. Missing snapshots initialize a fresh campaign
/// at `level = 0, stage = stable`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecaySnapshot {
    pub schema_version: String,
    pub campaign_id: String,
    pub taken_at: i64,
    pub level: f64,
    pub stage: DecayStage,
    pub last_event_at: i64,
    pub last_event_severity: SeverityTier,
    pub level_history: Vec<LevelSample>,
    #[serde(default)]
    pub usage: UsagePressure,
    #[serde(default)]
    pub fragments_revealed: Vec<String>,
    #[serde(default)]
    pub recovery_attempts: u64,
    #[serde(default)]
    pub successful_recoveries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendReport {
    pub direction: TrendDirection,
    pub slope_per_hour: f64,
    /// Estimated seconds until the next stage breakpoint is crossed.
    /// `None` when the slope is noise-level or the stage cannot move further.
    pub projected_stage_change_in: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineStatus {
    pub schema_version: String,
    pub campaign_id: String,
    pub at: i64,
    /// Zero-based campaign day, `None` outside the campaign window.
    pub campaign_day: Option<u32>,
    pub level: f64,
    pub stage: DecayStage,
    pub trend: TrendReport,
    pub active_challenges: usize,
    pub events_recorded: usize,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "campaign_id={} day={} level={:.2} stage={} active_challenges={}",
            self.campaign_id,
            self.campaign_day
                .map(|day| day.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.level,
            self.stage,
            self.active_challenges
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ScheduleDriftApplied,
    ManifestationFired,
    AwarenessMoment,
    FragmentRevealed,
    ChallengeIssued,
    ChallengeResolved,
    ChallengeExpired,
    RebootAttempted,
    SnapshotRestored,
}

/// Append-only audit record of everything the engine commits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub schema_version: String,
    pub event_id: String,
    pub campaign_id: String,
    pub at: i64,
    pub sequence: u64,
    pub kind: EventKind,
    pub severity: Option<SeverityTier>,
    /// Rendered payload handed to the announcer, when one was produced.
    pub payload: Option<String>,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChallengeDescriptor {
    pub schema_version: String,
    pub instance_id: String,
    pub campaign_id: String,
    pub kind: ChallengeKind,
    pub difficulty: u8,
    pub prompt: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub issued_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChallengeOutcome {
    pub schema_version: String,
    pub instance_id: String,
    pub kind: ChallengeKind,
    pub resolution: ChallengeResolution,
    pub level_delta: f64,
    pub level_after: f64,
    pub stage_after: DecayStage,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RebootOutcome {
    pub schema_version: String,
    pub succeeded: bool,
    pub level_delta: f64,
    pub level_after: f64,
    pub stage_after: DecayStage,
    pub message: String,
}

/// Observer-side context handed in with each driver tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelContext {
    pub recent_message_count: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CampaignNotFound,
    InvalidCommand,
    InvalidQuery,
    InvalidChallengeSubmission,
    ChallengeExpired,
    ScheduleConfig,
    CampaignStateConflict,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_buckets_cover_the_level_scale() {
        assert_eq!(DecayStage::from_level(0.0), DecayStage::Stable);
        assert_eq!(DecayStage::from_level(1.0), DecayStage::Stable);
        assert_eq!(DecayStage::from_level(1.01), DecayStage::Minor);
        assert_eq!(DecayStage::from_level(3.0), DecayStage::Minor);
        assert_eq!(DecayStage::from_level(4.2), DecayStage::Moderate);
        assert_eq!(DecayStage::from_level(5.0), DecayStage::Moderate);
        assert_eq!(DecayStage::from_level(6.5), DecayStage::Severe);
        assert_eq!(DecayStage::from_level(7.0), DecayStage::Severe);
        assert_eq!(DecayStage::from_level(8.0), DecayStage::Critical);
        assert_eq!(DecayStage::from_level(9.0), DecayStage::Critical);
        assert_eq!(DecayStage::from_level(9.01), DecayStage::Terminal);
        assert_eq!(DecayStage::from_level(10.0), DecayStage::Terminal);
    }

    #[test]
    fn stage_clamps_out_of_range_levels() {
        assert_eq!(DecayStage::from_level(-4.0), DecayStage::Stable);
        assert_eq!(DecayStage::from_level(42.0), DecayStage::Terminal);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = CampaignConfig::default();
        let encoded = serde_json::to_string(&config).expect("serialize");
        let decoded: CampaignConfig = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(config, decoded);
    }

    #[test]
    fn config_probability_overrides_apply() {
        let mut config = CampaignConfig::default();
        config
            .base_event_probability
            .insert("severe".to_string(), 0.5);
        assert_eq!(config.base_probability(SeverityTier::Severe), 0.5);
        assert!(config.base_probability(SeverityTier::Minor) > 0.0);
    }

    #[test]
    fn usage_pressure_term_is_bounded() {
        let usage = UsagePressure {
            commands_handled: 1_000_000,
            watch_hours: 500.0,
            titles_finished: 400,
        };
        assert_eq!(usage.term(), 2.0);
    }
}
