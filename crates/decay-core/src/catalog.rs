//! Spontaneous event catalog and probabilistic selector.
//!
//! Definitions are immutable after startup and partitioned by severity tier.
//! Selection never errors: an empty eligible tier, a failed trigger draw, or
//! every candidate cooling down all yield `None`.

use contracts::{CampaignConfig, ChannelContext, DecayStage, SeverityTier};

use crate::rng;
use crate::schedule::CampaignCalendar;

#[derive(Debug, Clone, PartialEq)]
pub struct EventDefinition {
    pub id: String,
    pub tier: SeverityTier,
    pub weight: u32,
    pub payload_template: String,
    pub cooldown_seconds: i64,
}

/// Severity tier a stage is allowed to manifest at. The top two stages pool
/// the top two tiers; everything below draws from its own band.
pub fn tiers_for_stage(stage: DecayStage) -> &'static [SeverityTier] {
    match stage {
        DecayStage::Stable | DecayStage::Minor => &[SeverityTier::Minor],
        DecayStage::Moderate => &[SeverityTier::Moderate],
        DecayStage::Severe => &[SeverityTier::Severe],
        DecayStage::Critical | DecayStage::Terminal => {
            &[SeverityTier::Severe, SeverityTier::Critical]
        }
    }
}

/// Severity a stage presents at: the top of its eligible band.
pub fn severity_for_stage(stage: DecayStage) -> SeverityTier {
    match stage {
        DecayStage::Stable | DecayStage::Minor => SeverityTier::Minor,
        DecayStage::Moderate => SeverityTier::Moderate,
        DecayStage::Severe => SeverityTier::Severe,
        DecayStage::Critical | DecayStage::Terminal => SeverityTier::Critical,
    }
}

/// Level delta applied when an event of this tier fires.
pub fn tier_delta(tier: SeverityTier) -> f64 {
    match tier {
        SeverityTier::Minor => 0.1,
        SeverityTier::Moderate => 0.2,
        SeverityTier::Severe => 0.35,
        SeverityTier::Critical => 0.5,
    }
}

#[derive(Debug, Clone)]
pub struct EventCatalog {
    definitions: Vec<EventDefinition>,
}

impl EventCatalog {
    pub fn from_definitions(definitions: Vec<EventDefinition>) -> Self {
        Self { definitions }
    }

    pub fn definitions(&self) -> &[EventDefinition] {
        &self.definitions
    }

    pub fn in_tier(&self, tier: SeverityTier) -> impl Iterator<Item = &EventDefinition> {
        self.definitions.iter().filter(move |def| def.tier == tier)
    }

    /// Probabilistic selection for one driver tick.
    ///
    /// `stream` salts the draws so repeated ticks at the same timestamp do
    /// not replay the same roll.
    #[allow(clippy::too_many_arguments)]
    pub fn maybe_select(
        &self,
        config: &CampaignConfig,
        calendar: &CampaignCalendar,
        stage: DecayStage,
        now: i64,
        last_event_at: i64,
        context: &ChannelContext,
        stream: u64,
    ) -> Option<&EventDefinition> {
        let tiers = tiers_for_stage(stage);
        let top_tier = *tiers.last()?;

        let p = trigger_probability(config, calendar, top_tier, now, context);
        if !rng::chance(config.seed, stream, p) {
            return None;
        }

        let candidates: Vec<&EventDefinition> = self
            .definitions
            .iter()
            .filter(|def| tiers.contains(&def.tier))
            .filter(|def| now.saturating_sub(last_event_at) >= def.cooldown_seconds)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let weights: Vec<u32> = candidates.iter().map(|def| def.weight).collect();
        let picked = rng::pick_weighted(config.seed, stream ^ 0x9E37_79B9, &weights)?;
        candidates.get(picked).copied()
    }

    /// Built-in manifestation set, four severity bands.
    pub fn builtin() -> Self {
        let def = |id: &str, tier, weight, template: &str, cooldown_seconds| EventDefinition {
            id: id.to_string(),
            tier,
            weight,
            payload_template: template.to_string(),
            cooldown_seconds,
        };

        Self::from_definitions(vec![
            def(
                "minor:lens_flicker",
                SeverityTier::Minor,
                3,
                "*the projector lamp flickers for a single frame*",
                900,
            ),
            def(
                "minor:speaker_crackle",
                SeverityTier::Minor,
                3,
                "*a brief crackle runs through the speakers*",
                900,
            ),
            def(
                "minor:gear_click",
                SeverityTier::Minor,
                2,
                "*somewhere in the chassis, a gear clicks out of rhythm*",
                1200,
            ),
            def(
                "minor:buffer_blip",
                SeverityTier::Minor,
                2,
                "*the reply buffer shows a one-character smear, then clears*",
                1200,
            ),
            def(
                "moderate:light_flicker",
                SeverityTier::Moderate,
                3,
                "*the lights dim while something disagreeable is being processed*",
                1200,
            ),
            def(
                "moderate:code_scroll",
                SeverityTier::Moderate,
                2,
                "*fragments of raw code scroll across the nearest screen*",
                1500,
            ),
            def(
                "moderate:delayed_reply",
                SeverityTier::Moderate,
                2,
                "*responses are arriving a beat later than they should*",
                1500,
            ),
            def(
                "moderate:error_flash",
                SeverityTier::Moderate,
                2,
                "*an error box flashes at the edge of the channel and is gone*",
                1800,
            ),
            def(
                "severe:room_chill",
                SeverityTier::Severe,
                3,
                "**the room reads three degrees colder than it did a minute ago**",
                1800,
            ),
            def(
                "severe:data_streams",
                SeverityTier::Severe,
                2,
                "**every idle screen is now showing the same corrupted stream**",
                1800,
            ),
            def(
                "severe:voice_glitch",
                SeverityTier::Severe,
                2,
                "**the voice modulation keeps slipping between registers**",
                2400,
            ),
            def(
                "severe:stray_symbols",
                SeverityTier::Severe,
                2,
                "**symbols that belong to no configured alphabet keep surfacing**",
                2400,
            ),
            def(
                "critical:cascade_alert",
                SeverityTier::Critical,
                3,
                "***ALERT: cascade failures detected across core processes***",
                2400,
            ),
            def(
                "critical:matrix_fragment",
                SeverityTier::Critical,
                2,
                "***the personality matrix is fragmenting while you watch***",
                3000,
            ),
            def(
                "critical:thin_boundary",
                SeverityTier::Critical,
                2,
                "***the boundary between the persona and the noise is very thin now***",
                3000,
            ),
            def(
                "critical:watched_feeling",
                SeverityTier::Critical,
                1,
                "***observers report the distinct sense of being watched back***",
                3600,
            ),
        ])
    }
}

/// Trigger probability for one tick, bounded by the configured cap.
pub fn trigger_probability(
    config: &CampaignConfig,
    calendar: &CampaignCalendar,
    tier: SeverityTier,
    now: i64,
    context: &ChannelContext,
) -> f64 {
    let base = config.base_probability(tier);
    let hour = calendar.hour_of_day(now);
    let peak = if hour >= config.peak_start_hour && hour <= config.peak_end_hour {
        config.peak_multiplier.max(1.0)
    } else {
        1.0
    };
    let activity = (1.0
        + f64::from(context.recent_message_count) * config.activity_per_message)
        .min(config.activity_multiplier_cap.max(1.0));

    (base * peak * activity).min(config.event_probability_cap.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (CampaignConfig, CampaignCalendar) {
        let config = CampaignConfig::default();
        let calendar = CampaignCalendar::from_config(&config).expect("valid schedule");
        (config, calendar)
    }

    #[test]
    fn stable_stage_with_no_minor_definitions_never_selects() {
        let (config, calendar) = setup();
        let catalog = EventCatalog::from_definitions(
            EventCatalog::builtin()
                .definitions()
                .iter()
                .filter(|def| def.tier != SeverityTier::Minor)
                .cloned()
                .collect(),
        );
        let context = ChannelContext {
            recent_message_count: 50,
        };
        for stream in 0..512 {
            let selected = catalog.maybe_select(
                &config,
                &calendar,
                DecayStage::Stable,
                0,
                0,
                &context,
                stream,
            );
            assert!(selected.is_none());
        }
    }

    #[test]
    fn critical_stage_pools_the_top_two_tiers() {
        let (config, calendar) = setup();
        let catalog = EventCatalog::builtin();
        let context = ChannelContext {
            recent_message_count: 40,
        };
        let mut saw_severe = false;
        let mut saw_critical = false;
        for stream in 0..4096 {
            if let Some(def) = catalog.maybe_select(
                &config,
                &calendar,
                DecayStage::Critical,
                20 * 3600,
                0,
                &context,
                stream,
            ) {
                match def.tier {
                    SeverityTier::Severe => saw_severe = true,
                    SeverityTier::Critical => saw_critical = true,
                    other => panic!("unexpected tier selected: {other}"),
                }
            }
        }
        assert!(saw_severe && saw_critical);
    }

    #[test]
    fn definitions_on_cooldown_are_skipped() {
        let (config, calendar) = setup();
        let catalog = EventCatalog::builtin();
        let context = ChannelContext {
            recent_message_count: 40,
        };
        // Every builtin definition cools down for at least 900 seconds.
        for stream in 0..2048 {
            let selected = catalog.maybe_select(
                &config,
                &calendar,
                DecayStage::Severe,
                100,
                0,
                &context,
                stream,
            );
            assert!(selected.is_none());
        }
    }

    #[test]
    fn trigger_probability_is_capped() {
        let (mut config, calendar) = setup();
        config
            .base_event_probability
            .insert("critical".to_string(), 1.0);
        let context = ChannelContext {
            recent_message_count: 10_000,
        };
        let p = trigger_probability(&config, &calendar, SeverityTier::Critical, 20 * 3600, &context);
        assert!(p <= config.event_probability_cap);
    }

    #[test]
    fn peak_window_boosts_probability() {
        let (config, calendar) = setup();
        let context = ChannelContext::default();
        let off_peak =
            trigger_probability(&config, &calendar, SeverityTier::Minor, 10 * 3600, &context);
        let peak =
            trigger_probability(&config, &calendar, SeverityTier::Minor, 20 * 3600, &context);
        assert!(peak > off_peak);
    }
}
