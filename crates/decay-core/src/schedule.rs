//! Campaign calendar: day indexing and the baseline floor table.
//!
//! The floor table is the only scheduled source of decay progression. It is
//! validated once at startup; a malformed table is fatal rather than being
//! silently replaced with defaults.

use std::fmt;

use contracts::{CampaignConfig, ScheduleStep, LEVEL_MAX, LEVEL_MIN};

pub const SCHEDULE_STEP_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleConfigError {
    WrongStepCount { found: usize },
    FirstStepNotDayZero { from_day: u32 },
    UnorderedSteps { index: usize },
    StepBeyondWindow { index: usize, from_day: u32 },
    FloorOutOfRange { index: usize, floor: f64 },
    DecreasingFloor { index: usize },
    EmptyWindow,
}

impl fmt::Display for ScheduleConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongStepCount { found } => write!(
                f,
                "schedule floor table must have exactly {SCHEDULE_STEP_COUNT} steps, found {found}"
            ),
            Self::FirstStepNotDayZero { from_day } => {
                write!(f, "first schedule step must start at day 0, found {from_day}")
            }
            Self::UnorderedSteps { index } => {
                write!(f, "schedule step {index} does not start after the previous step")
            }
            Self::StepBeyondWindow { index, from_day } => write!(
                f,
                "schedule step {index} starts at day {from_day}, outside the campaign window"
            ),
            Self::FloorOutOfRange { index, floor } => {
                write!(f, "schedule step {index} floor {floor} is outside [0, 10]")
            }
            Self::DecreasingFloor { index } => {
                write!(f, "schedule step {index} lowers the floor of the previous step")
            }
            Self::EmptyWindow => write!(f, "campaign window must span at least one day"),
        }
    }
}

impl std::error::Error for ScheduleConfigError {}

/// Validated view over the campaign window and its floor table.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignCalendar {
    start_at: i64,
    day_seconds: i64,
    duration_days: u32,
    steps: Vec<ScheduleStep>,
}

impl CampaignCalendar {
    pub fn from_config(config: &CampaignConfig) -> Result<Self, ScheduleConfigError> {
        if config.duration_days == 0 || config.day_seconds <= 0 {
            return Err(ScheduleConfigError::EmptyWindow);
        }

        let steps = &config.schedule_floors;
        if steps.len() != SCHEDULE_STEP_COUNT {
            return Err(ScheduleConfigError::WrongStepCount { found: steps.len() });
        }
        if steps[0].from_day != 0 {
            return Err(ScheduleConfigError::FirstStepNotDayZero {
                from_day: steps[0].from_day,
            });
        }
        for (index, step) in steps.iter().enumerate() {
            if !(LEVEL_MIN..=LEVEL_MAX).contains(&step.floor) || !step.floor.is_finite() {
                return Err(ScheduleConfigError::FloorOutOfRange {
                    index,
                    floor: step.floor,
                });
            }
            if step.from_day >= config.duration_days {
                return Err(ScheduleConfigError::StepBeyondWindow {
                    index,
                    from_day: step.from_day,
                });
            }
            if index > 0 {
                if step.from_day <= steps[index - 1].from_day {
                    return Err(ScheduleConfigError::UnorderedSteps { index });
                }
                if step.floor < steps[index - 1].floor {
                    return Err(ScheduleConfigError::DecreasingFloor { index });
                }
            }
        }

        Ok(Self {
            start_at: config.start_at,
            day_seconds: config.day_seconds,
            duration_days: config.duration_days,
            steps: steps.clone(),
        })
    }

    /// Zero-based campaign day containing `now`, or `None` outside the window.
    pub fn day_index(&self, now: i64) -> Option<u32> {
        if now < self.start_at {
            return None;
        }
        let day = (now - self.start_at) / self.day_seconds;
        if day >= i64::from(self.duration_days) {
            return None;
        }
        Some(day as u32)
    }

    /// Baseline level floor for a campaign day.
    pub fn floor_for_day(&self, day: u32) -> f64 {
        self.steps
            .iter()
            .rev()
            .find(|step| step.from_day <= day)
            .map(|step| step.floor)
            .unwrap_or(LEVEL_MIN)
    }

    /// Hour of day (0..24) for a timestamp, aligned to the campaign's day length.
    pub fn hour_of_day(&self, now: i64) -> u8 {
        let day_seconds = self.day_seconds.max(1);
        let into_day = (now - self.start_at).rem_euclid(day_seconds);
        ((into_day * 24) / day_seconds) as u8
    }

    pub fn duration_days(&self) -> u32 {
        self.duration_days
    }
}
