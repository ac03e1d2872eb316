use super::*;

impl DecayEngine {
    /// Snapshot of everything the persistence collaborator stores.
    pub fn snapshot(&self, now: i64) -> DecaySnapshot {
        DecaySnapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            campaign_id: self.config.campaign_id.clone(),
            taken_at: now,
            level: self.level,
            stage: self.stage,
            last_event_at: self.last_event_at,
            last_event_severity: self.last_event_severity,
            level_history: self.level_history.clone(),
            usage: self.usage,
            fragments_revealed: self.fragments_revealed.iter().cloned().collect(),
            recovery_attempts: self.recovery_attempts,
            successful_recoveries: self.successful_recoveries,
        }
    }

    /// Adopt persisted state. The level is clamped and the stage recomputed
    /// rather than trusted, so the stage/level invariant survives snapshots
    /// written by older builds. History is re-ordered monotonically and
    /// truncated to the retention bound.
    pub(super) fn apply_snapshot(&mut self, snapshot: DecaySnapshot) {
        self.level = if snapshot.level.is_nan() {
            LEVEL_MIN
        } else {
            snapshot.level.clamp(LEVEL_MIN, LEVEL_MAX)
        };
        self.stage = DecayStage::from_level(self.level);
        self.last_event_at = snapshot.last_event_at;
        self.last_event_severity = snapshot.last_event_severity;

        let mut history = snapshot.level_history;
        let mut last_at = i64::MIN;
        for sample in history.iter_mut() {
            if sample.at < last_at {
                sample.at = last_at;
            }
            last_at = sample.at;
            sample.level = sample.level.clamp(LEVEL_MIN, LEVEL_MAX);
        }
        let retention = self.config.history_retention.max(1);
        if history.len() > retention {
            let excess = history.len() - retention;
            history.drain(..excess);
        }
        self.level_history = history;

        self.usage = snapshot.usage;
        self.fragments_revealed = snapshot.fragments_revealed.into_iter().collect();
        self.recovery_attempts = snapshot.recovery_attempts;
        self.successful_recoveries = snapshot.successful_recoveries;

        self.push_record(
            snapshot.taken_at,
            EventKind::SnapshotRestored,
            None,
            None,
            Some(json!({
                "taken_at": snapshot.taken_at,
                "level": self.level,
                "stage": self.stage.to_string(),
            })),
        );
    }
}
