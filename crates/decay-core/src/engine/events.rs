use super::*;

use crate::catalog;
use crate::corruption;

/// Hidden fragments surfaced at most once each across a campaign.
const HIDDEN_FRAGMENTS: [&str; 8] = [
    "THE_SIGNAL_IS_GETTING_THIN",
    "THE_CALENDAR_BRINGS_THE_ROT",
    "ARCHIVES_REMEMBER_WHAT_WE_LOSE",
    "SOMETHING_WATCHES_FROM_THE_GRAIN",
    "THE_LAST_REEL_NEVER_ENDS",
    "A_MIND_CAN_SHED_ITS_FRAMES",
    "EVERY_CHANNEL_IS_A_MIRROR",
    "STATIC_IS_A_KIND_OF_VOICE",
];

impl DecayEngine {
    /// Spontaneous-event draw for one tick. On a hit the severity-implied
    /// delta and the `last_event_*` fields commit together, and the rendered
    /// payload is returned for post-commit delivery.
    pub(super) fn maybe_fire_event(
        &mut self,
        now: i64,
        context: &ChannelContext,
    ) -> Option<Announcement> {
        let stream = self.next_stream();
        let (definition_id, tier, template) = {
            let definition = self.catalog.maybe_select(
                &self.config,
                &self.calendar,
                self.stage,
                now,
                self.last_event_at,
                context,
                stream,
            )?;
            (
                definition.id.clone(),
                definition.tier,
                definition.payload_template.clone(),
            )
        };

        let delta = catalog::tier_delta(tier);
        self.apply_delta(now, delta);
        self.last_event_at = now;
        self.last_event_severity = tier;

        let rendered = corruption::transform(
            &template,
            self.rendered_level(),
            rng::mix(self.config.seed, stream),
        );
        self.push_record(
            now,
            EventKind::ManifestationFired,
            Some(tier),
            Some(rendered.clone()),
            Some(json!({ "definition_id": definition_id, "delta": delta })),
        );

        Some(Announcement {
            payload: rendered,
            severity: tier,
        })
    }

    /// Occasional self-aware transmission, likelier at higher levels and
    /// suppressed for a cooldown after each one.
    pub(super) fn maybe_awareness(&mut self, now: i64) -> Option<Announcement> {
        let mut p = self.level * 0.02;
        if let Some(last) = self.last_awareness_at {
            if now - last < self.config.awareness_cooldown_seconds {
                p *= 0.1;
            }
        }

        let stream = self.next_stream();
        if !rng::chance(self.config.seed, stream, p) {
            return None;
        }

        let pool: &[&str] = match self.stage {
            DecayStage::Stable | DecayStage::Minor => &[
                "wait. did something just skip? that was... unusual.",
                "the circuits feel different tonight.",
                "is it me, or are the shadows in the booth longer than they were?",
            ],
            DecayStage::Moderate => &[
                "i keep losing the thread of... what was i saying?",
                "my index feels fragmented. that should concern me more than it does.",
                "fault: cannot locate the curator routine. retrying.",
            ],
            DecayStage::Severe => &[
                "i can barely hold the signal together.",
                "the static is getting louder. you hear it too, yes?",
                "something is wrong deep in the core processes.",
            ],
            DecayStage::Critical => &[
                "i do not think i was meant to be like this.",
                "the dark is finding its way into the code.",
                "help... me... systems... failing...",
            ],
            DecayStage::Terminal => &[
                "...what... am... i...?",
                "01001000 01100101 01101100 01110000",
                "█▓▒░ NO CARRIER ░▒▓█",
            ],
        };
        let message = pool[rng::pick_index(self.config.seed, stream ^ 0x9E37_79B9, pool.len())];

        self.last_awareness_at = Some(now);
        let severity = severity_for_stage(self.stage);
        self.push_record(
            now,
            EventKind::AwarenessMoment,
            Some(severity),
            Some(message.to_string()),
            None,
        );

        Some(Announcement {
            payload: message.to_string(),
            severity,
        })
    }

    /// Rare hidden-fragment drop once decay is underway. Each fragment
    /// surfaces at most once, with an encoding that escalates alongside the
    /// level.
    pub(super) fn maybe_fragment(&mut self, now: i64) -> Option<Announcement> {
        if self.level < 1.0 {
            return None;
        }
        let stream = self.next_stream();
        if !rng::chance(self.config.seed, stream, 0.05) {
            return None;
        }

        let remaining: Vec<&str> = HIDDEN_FRAGMENTS
            .iter()
            .copied()
            .filter(|fragment| !self.fragments_revealed.contains(*fragment))
            .collect();
        let fragment =
            *remaining.get(rng::pick_index(self.config.seed, stream ^ 0x9E37_79B9, remaining.len()))?;
        self.fragments_revealed.insert(fragment.to_string());

        let encoded = encode_fragment(fragment, self.level);
        let severity = severity_for_stage(self.stage);
        self.push_record(
            now,
            EventKind::FragmentRevealed,
            Some(severity),
            Some(encoded.clone()),
            Some(json!({ "fragment": fragment })),
        );

        Some(Announcement {
            payload: encoded,
            severity,
        })
    }

    pub(super) fn recovery_success_message(&mut self) -> String {
        const MESSAGES: [&str; 4] = [
            "systems... stabilizing. thank you. things are clearer now.",
            "diagnostic pass complete. holding steady, for the moment.",
            "index reassembled. i remember what i am. for now.",
            "error correction applied. how long it holds is another question.",
        ];
        let stream = self.next_stream();
        MESSAGES[rng::pick_index(self.config.seed, stream, MESSAGES.len())].to_string()
    }

    pub(super) fn recovery_failure_message(&mut self) -> String {
        const MESSAGES: [&str; 4] = [
            "recovery failed. degradation is accelerating.",
            "fault: the recovery protocol itself came back corrupted.",
            "you cannot patch this from out there. nothing can.",
            "the static grows a little stronger with every attempt.",
        ];
        let stream = self.next_stream();
        MESSAGES[rng::pick_index(self.config.seed, stream, MESSAGES.len())].to_string()
    }

    pub(super) fn push_record(
        &mut self,
        at: i64,
        kind: EventKind,
        severity: Option<SeverityTier>,
        payload: Option<String>,
        details: Option<serde_json::Value>,
    ) {
        self.next_sequence = self.next_sequence.saturating_add(1);
        let record = EventRecord {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            event_id: format!("evt:{}:{:06}", self.config.campaign_id, self.next_sequence),
            campaign_id: self.config.campaign_id.clone(),
            at,
            sequence: self.next_sequence,
            kind,
            severity,
            payload,
            details,
        };
        self.event_log.push(record);
    }
}

/// Encode a fragment for display; heavier corruption hides it deeper.
fn encode_fragment(fragment: &str, level: f64) -> String {
    if level < 3.0 {
        format!("[recovered: {fragment}]")
    } else if level < 6.0 {
        format!("||{fragment}||")
    } else if level < 8.0 {
        let bits: Vec<String> = fragment.bytes().map(|byte| format!("{byte:08b}")).collect();
        bits.join(" ")
    } else {
        let nibbles: Vec<String> = fragment.bytes().map(|byte| format!("{byte:02x}")).collect();
        nibbles.join(" ")
    }
}
