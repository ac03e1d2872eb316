use super::*;

use crate::corruption;

impl DecayEngine {
    /// Render the diagnostic report. The report's own legibility degrades
    /// with the rendered level, so observers read the condition in the
    /// formatting as much as in the numbers.
    pub fn diagnostic_report(&self, now: i64) -> String {
        let trend = self.trend();
        let day_label = self
            .calendar
            .day_index(now)
            .map(|day| format!("{}", day + 1))
            .unwrap_or_else(|| "--".to_string());
        let trend_label = match trend.direction {
            contracts::TrendDirection::Improving => "improving",
            contracts::TrendDirection::Worsening => "worsening",
            contracts::TrendDirection::Stable => "holding",
        };

        let report = format!(
            "DIAGNOSTIC REPORT\n\
             decay level: {:.1}/10\n\
             status: {}\n\
             campaign day: {day_label}\n\
             trend: {trend_label}\n\
             recovery attempts: {}\n\
             successful recoveries: {}",
            self.level,
            self.stage.to_string().to_uppercase(),
            self.recovery_attempts,
            self.successful_recoveries,
        );

        let rendered_level = self.rendered_level();
        if rendered_level < 3.0 {
            return report;
        }

        // Degrade the report itself, seeded per campaign day so repeated
        // reads inside one day stay identical.
        let day_salt = self.calendar.day_index(now).map(u64::from).unwrap_or(0);
        let report_level = if rendered_level < 6.0 {
            rendered_level.min(4.5)
        } else {
            rendered_level
        };
        corruption::transform(
            &report,
            report_level,
            rng::mix(self.config.seed, 0xD1A6 ^ day_salt),
        )
    }

    /// Events appended after `sequence`, oldest first.
    pub fn events_after(&self, sequence: u64) -> &[EventRecord] {
        let start = self
            .event_log
            .partition_point(|record| record.sequence <= sequence);
        &self.event_log[start..]
    }
}
