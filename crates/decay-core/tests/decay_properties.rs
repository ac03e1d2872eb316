use contracts::{
    CampaignConfig, ChallengeKind, ChannelContext, DecayStage, SeverityTier, DAY_SECONDS,
};
use decay_core::challenge::{difficulty_for_level, ChallengeFactory};
use decay_core::corruption::transform;
use decay_core::DecayEngine;
use proptest::prelude::*;

fn base_config(campaign_id: &str, seed: u64) -> CampaignConfig {
    let mut config = CampaignConfig::default();
    config.campaign_id = campaign_id.to_string();
    config.seed = seed;
    config
}

#[test]
fn property_stage_is_monotone_in_level() {
    let mut previous = DecayStage::Stable;
    for step in 0..=1000 {
        let level = f64::from(step) / 100.0;
        let stage = DecayStage::from_level(level);
        assert!(stage >= previous, "stage regressed at level {level}");
        previous = stage;
    }
}

#[test]
fn property_schedule_tick_never_decreases_level() {
    let mut engine = DecayEngine::new(base_config("sched", 7)).expect("valid config");
    let mut previous = engine.current().0;
    for day in 0..31_i64 {
        engine.apply_schedule_tick(day * DAY_SECONDS + 3600);
        let (level, _) = engine.current();
        assert!(level >= previous, "level fell on day {day}");
        previous = level;
    }
    // Final day floors at the top of the critical band.
    assert!(previous >= 9.0);
}

#[test]
fn property_event_and_challenge_sides_agree_on_stage() {
    let mut engine = DecayEngine::new(base_config("agree", 21)).expect("valid config");
    let context = ChannelContext {
        recent_message_count: 25,
    };
    for step in 0..600_i64 {
        let now = 12 * DAY_SECONDS + step * 600;
        engine.tick(now, &context);
        let (level, stage) = engine.current();
        assert_eq!(stage, DecayStage::from_level(level));
    }
}

#[test]
fn property_stable_stage_without_minor_definitions_never_manifests() {
    use decay_core::catalog::EventCatalog;

    let catalog = EventCatalog::from_definitions(
        EventCatalog::builtin()
            .definitions()
            .iter()
            .filter(|def| def.tier != SeverityTier::Minor)
            .cloned()
            .collect(),
    );
    let mut engine = DecayEngine::new(base_config("silent", 3))
        .expect("valid config")
        .with_catalog(catalog);
    let context = ChannelContext {
        recent_message_count: 100,
    };
    for step in 0..500_i64 {
        let report = engine.tick(step * 60, &context);
        assert!(report
            .announcements
            .iter()
            .all(|a| a.severity == SeverityTier::Minor));
        assert_eq!(engine.current().1, DecayStage::Stable);
        assert!(!engine
            .events()
            .iter()
            .any(|record| record.kind == contracts::EventKind::ManifestationFired));
    }
}

proptest! {
    #[test]
    fn property_transform_identity_below_one(level in -5.0_f64..1.0, seed in 0_u64..10_000) {
        let text = "a perfectly ordinary sentence";
        prop_assert_eq!(transform(text, level, seed), text);
    }

    #[test]
    fn property_transform_empty_is_empty(level in 0.0_f64..10.0, seed in 0_u64..10_000) {
        prop_assert_eq!(transform("", level, seed), "");
    }

    #[test]
    fn property_transform_is_deterministic(level in 0.0_f64..10.0, seed in 0_u64..10_000) {
        let text = "the projector waits in the dark";
        prop_assert_eq!(transform(text, level, seed), transform(text, level, seed));
    }

    #[test]
    fn property_difficulty_is_monotone_per_kind(
        low in 0.0_f64..10.0,
        high in 0.0_f64..10.0,
        kind_index in 0_usize..5,
    ) {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let kind = ChallengeKind::ALL[kind_index];
        let factory = ChallengeFactory::new(11);
        let easy = factory.issue(Some(kind), low, 0, "observer:a", 1);
        let hard = factory.issue(Some(kind), high, 0, "observer:a", 1);
        prop_assert!(easy.difficulty <= hard.difficulty);
        prop_assert_eq!(easy.difficulty, difficulty_for_level(low));
        prop_assert_eq!(hard.difficulty, difficulty_for_level(high));
    }

    #[test]
    fn property_delta_stays_clamped(deltas in proptest::collection::vec(-12.0_f64..12.0, 1..40)) {
        let mut engine = DecayEngine::new(base_config("clamp", 5)).expect("valid config");
        for (step, delta) in deltas.iter().enumerate() {
            let level = engine.apply_delta(step as i64, *delta);
            prop_assert!((0.0..=10.0).contains(&level));
        }
    }

    #[test]
    fn property_identical_seeds_replay_identically(seed in 1_u64..5_000, ticks in 1_i64..48) {
        let context = ChannelContext { recent_message_count: 15 };
        let mut first = DecayEngine::new(base_config("replay", seed)).expect("valid config");
        let mut second = DecayEngine::new(base_config("replay", seed)).expect("valid config");
        for step in 0..ticks {
            let now = 8 * DAY_SECONDS + step * 900;
            first.tick(now, &context);
            second.tick(now, &context);
        }
        prop_assert_eq!(first.events(), second.events());
        prop_assert_eq!(first.current(), second.current());
    }

    #[test]
    fn property_reference_answers_always_grade_correct(
        kind_index in 0_usize..5,
        level in 0.0_f64..10.0,
        stream in 0_u64..2_000,
    ) {
        let factory = ChallengeFactory::new(77);
        let kind = ChallengeKind::ALL[kind_index];
        let challenge = factory.issue(Some(kind), level, 0, "observer:a", stream);
        prop_assert!(challenge.grade(&challenge.reference_answer()));
    }
}
