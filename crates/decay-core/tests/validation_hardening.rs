use std::time::Instant;

use contracts::{CampaignConfig, ChallengeKind, ChannelContext, ScheduleStep, DAY_SECONDS};
use decay_core::{DecayEngine, ScheduleConfigError};

const PERF_SMOKE_MAX_MS: u128 = 4_000;

fn base_config(campaign_id: &str, seed: u64) -> CampaignConfig {
    let mut config = CampaignConfig::default();
    config.campaign_id = campaign_id.to_string();
    config.seed = seed;
    config
}

#[test]
fn startup_rejects_a_decreasing_floor_table() {
    let mut config = base_config("bad_floors", 1);
    config.schedule_floors[4].floor = 2.0;
    assert!(matches!(
        DecayEngine::new(config),
        Err(ScheduleConfigError::DecreasingFloor { index: 4 })
    ));
}

#[test]
fn startup_rejects_wrong_step_counts() {
    let mut config = base_config("bad_count", 1);
    config.schedule_floors.push(ScheduleStep {
        from_day: 30,
        floor: 9.5,
    });
    assert!(matches!(
        DecayEngine::new(config),
        Err(ScheduleConfigError::WrongStepCount { found: 7 })
    ));
}

#[test]
fn startup_rejects_steps_outside_the_window() {
    let mut config = base_config("bad_window", 1);
    config.duration_days = 10;
    assert!(matches!(
        DecayEngine::new(config),
        Err(ScheduleConfigError::StepBeyondWindow { .. })
    ));
}

#[test]
fn startup_rejects_non_finite_floors() {
    let mut config = base_config("bad_nan", 1);
    config.schedule_floors[2].floor = f64::NAN;
    assert!(matches!(
        DecayEngine::new(config),
        Err(ScheduleConfigError::FloorOutOfRange { index: 2, .. })
    ));
}

#[test]
fn hostile_challenge_answers_never_panic() {
    let mut engine = DecayEngine::new(base_config("hostile", 3)).expect("valid config");
    engine.apply_delta(0, 6.0);

    let hostile_answers = [
        "",
        " ",
        "\u{0}\u{0}\u{0}",
        "99999999999999999999999999",
        "-1 -2 -3 -4 -5",
        "DROP TABLE campaigns;",
        "🜏🜏🜏🜏",
        "1 1 1 1 1 1 1 1 1 1 1 1 1 1 1 1 1 1",
    ];

    for (index, answer) in hostile_answers.iter().enumerate() {
        for kind in ChallengeKind::ALL {
            let descriptor = engine.issue_challenge(Some(kind), index as i64 * 10, "observer:x");
            let outcome =
                engine.submit_challenge(&descriptor.instance_id, answer, index as i64 * 10 + 1, "observer:x");
            assert!(outcome.is_ok());
        }
    }
}

#[test]
fn unknown_instance_ids_are_rejected_not_fatal() {
    let mut engine = DecayEngine::new(base_config("unknown", 3)).expect("valid config");
    let result = engine.submit_challenge("chg:doesnotexist", "answer", 0, "observer:x");
    assert!(result.is_err());
    // The engine keeps working afterwards.
    let descriptor = engine.issue_challenge(None, 10, "observer:x");
    assert!(engine
        .submit_challenge(&descriptor.instance_id, "wrong", 11, "observer:x")
        .is_ok());
}

#[test]
fn full_campaign_perf_smoke() {
    let mut engine = DecayEngine::new(base_config("perf", 1337)).expect("valid config");
    let context = ChannelContext {
        recent_message_count: 30,
    };

    let started = Instant::now();
    // A tick every ten minutes for the whole 31-day window.
    let mut now = 0_i64;
    while now < 31 * DAY_SECONDS {
        engine.tick(now, &context);
        now += 600;
    }
    let elapsed = started.elapsed().as_millis();

    assert!(
        elapsed < PERF_SMOKE_MAX_MS,
        "campaign sweep took {elapsed}ms"
    );
    assert!(engine.current().0 >= 9.0);
    assert!(engine.level_history().len() <= engine.config().history_retention);
}

#[test]
fn transform_handles_awkward_unicode_input() {
    use decay_core::corruption::transform;

    let inputs = [
        "🜏 ügly ♯ input ☄",
        "\u{0301}\u{0301} leading marks",
        "tabs\tand\nnewlines",
        "mixed 漢字 and كلمات",
    ];
    for input in inputs {
        for level in [0.0, 2.0, 4.5, 6.5, 8.5, 10.0] {
            let out = transform(input, level, 99);
            assert!(!out.is_empty());
        }
    }
}
