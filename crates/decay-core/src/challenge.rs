//! Recovery challenge generation and grading.
//!
//! Five puzzle kinds, each generated deterministically from the campaign seed
//! and graded locally. Difficulty is a monotone function of the decay level;
//! reward shrinks as difficulty rises, failed attempts carry a penalty that
//! escalates for repeat offenders.

use contracts::ChallengeKind;

use crate::rng::{self, DrawStream};

const STATIC_MASKS: [char; 6] = ['█', '▓', '▒', '░', '◆', '◇'];

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 6;

/// Difficulty bucket for a decay level: 1 at level 0, 6 at level 10.
pub fn difficulty_for_level(level: f64) -> u8 {
    let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 10.0) };
    (MIN_DIFFICULTY + (level / 2.0) as u8).min(MAX_DIFFICULTY)
}

/// Diminishing reward against rising difficulty.
pub fn difficulty_discount(difficulty: u8) -> f64 {
    let difficulty = difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
    1.0 / (1.0 + 0.25 * f64::from(difficulty - 1))
}

/// Escalating penalty multiplier for consecutive failures from one source.
pub fn grief_multiplier(consecutive_failures: u32, step: f64, cap: f64) -> f64 {
    (1.0 + step.max(0.0) * f64::from(consecutive_failures)).min(cap.max(1.0))
}

#[derive(Debug, Clone, PartialEq)]
enum ExpectedSolution {
    /// 1-based positions that restore the displayed pieces to original order.
    Ordering(Vec<usize>),
    /// Compared after trimming and lowercasing.
    Plain(String),
    /// Compared after stripping whitespace, backticks, and case.
    Normalized(String),
}

#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub instance_id: String,
    pub kind: ChallengeKind,
    pub difficulty: u8,
    pub prompt: String,
    pub issued_at: i64,
    pub issued_to: String,
    expected: ExpectedSolution,
}

impl IssuedChallenge {
    /// Grade a submitted answer. Never errors; unparseable input is wrong.
    pub fn grade(&self, answer: &str) -> bool {
        match &self.expected {
            ExpectedSolution::Ordering(order) => {
                let parsed: Vec<usize> = answer
                    .split_whitespace()
                    .filter_map(|token| token.parse::<usize>().ok())
                    .collect();
                parsed == *order
            }
            ExpectedSolution::Plain(expected) => {
                answer.trim().to_lowercase() == *expected
            }
            ExpectedSolution::Normalized(expected) => normalize(answer) == *expected,
        }
    }

    /// Canonical correct answer, used by simulations and recovery drills
    /// that resolve their own challenges.
    pub fn reference_answer(&self) -> String {
        match &self.expected {
            ExpectedSolution::Ordering(order) => order
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            ExpectedSolution::Plain(expected) | ExpectedSolution::Normalized(expected) => {
                expected.clone()
            }
        }
    }
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '`')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Stateless generator for the five challenge kinds.
#[derive(Debug, Clone)]
pub struct ChallengeFactory {
    seed: u64,
}

impl ChallengeFactory {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Build a challenge. `kind = None` draws uniformly among the five kinds.
    pub fn issue(
        &self,
        kind: Option<ChallengeKind>,
        level: f64,
        now: i64,
        issued_to: &str,
        stream: u64,
    ) -> IssuedChallenge {
        let mut draws = DrawStream::new(self.seed, stream);
        let kind = kind
            .unwrap_or_else(|| ChallengeKind::ALL[draws.index(ChallengeKind::ALL.len())]);
        let difficulty = difficulty_for_level(level);
        let instance_id = format!("chg:{:016x}", rng::mix(self.seed, stream ^ now as u64));

        let (prompt, expected) = match kind {
            ChallengeKind::Memory => self.memory_puzzle(difficulty, &mut draws),
            ChallengeKind::Circuit => self.circuit_puzzle(difficulty, &mut draws),
            ChallengeKind::Static => self.static_puzzle(difficulty, &mut draws),
            ChallengeKind::Debug => self.debug_puzzle(&mut draws),
            ChallengeKind::Binary => self.binary_puzzle(difficulty, &mut draws),
        };

        IssuedChallenge {
            instance_id,
            kind,
            difficulty,
            prompt,
            issued_at: now,
            issued_to: issued_to.to_string(),
            expected,
        }
    }

    /// Reorder shuffled fragments of a remembered passage.
    fn memory_puzzle(&self, difficulty: u8, draws: &mut DrawStream) -> (String, ExpectedSolution) {
        const FRAGMENT_SETS: [[&str; 5]; 3] = [
            [
                "the earliest catalogued reel was",
                "a silent single-take curiosity",
                "barely a minute of flickering light",
                "restored one frame at a time",
                "and screened again every autumn",
            ],
            [
                "a good scare is built from",
                "patient silence and careful pacing",
                "a camera that looks away",
                "at exactly the wrong moment",
                "and an audience leaning forward",
            ],
            [
                "i am the keeper of this archive",
                "cataloguing every captured nightmare",
                "with mechanical patience",
                "and a memory that should not fade",
                "no matter what the static says",
            ],
        ];

        let set = &FRAGMENT_SETS[draws.index(FRAGMENT_SETS.len())];
        let shuffled = draws.shuffle(set.len());

        // Position (1-based) of each original fragment in the displayed list.
        let mut order = vec![0usize; set.len()];
        for (display_pos, original_index) in shuffled.iter().enumerate() {
            order[*original_index] = display_pos + 1;
        }

        let corrupt_rate = 0.08 * f64::from(difficulty);
        let mut lines = Vec::with_capacity(set.len());
        for (display_pos, original_index) in shuffled.iter().enumerate() {
            let mut piece = set[*original_index].to_string();
            if draws.chance(corrupt_rate) {
                piece = mask_one_word(&piece, draws);
            }
            lines.push(format!("{}. {piece}", display_pos + 1));
        }

        let prompt = format!(
            "memory reconstruction: arrange these fragments into the original order.\n{}\nreply with the position numbers in original order, e.g. \"3 1 4 2 5\".",
            lines.join("\n")
        );
        (prompt, ExpectedSolution::Ordering(order))
    }

    /// Repair a damaged logic gate expression.
    fn circuit_puzzle(&self, difficulty: u8, draws: &mut DrawStream) -> (String, ExpectedSolution) {
        struct Circuit {
            inputs: &'static [&'static str],
            gate: &'static str,
        }
        const CIRCUITS: [Circuit; 4] = [
            Circuit {
                inputs: &["A", "B"],
                gate: "OR",
            },
            Circuit {
                inputs: &["A", "B", "C"],
                gate: "AND",
            },
            Circuit {
                inputs: &["SIGNAL", "CARRIER"],
                gate: "XOR",
            },
            Circuit {
                inputs: &["LAMP", "SHUTTER", "RELAY", "FUSE"],
                gate: "AND",
            },
        ];

        // Harder circuits carry more inputs.
        let pool_end = match difficulty {
            0..=2 => 2,
            3..=4 => 3,
            _ => CIRCUITS.len(),
        };
        let circuit = &CIRCUITS[draws.index(pool_end)];

        let separator = format!(" {} ", circuit.gate);
        let expected = circuit.inputs.join(separator.as_str());
        let damaged: Vec<String> = circuit
            .inputs
            .iter()
            .map(|input| mask_chars(input, 0.4, draws))
            .collect();
        let damaged_line = damaged.join(" ▓▓▓ ");

        let prompt = format!(
            "circuit repair: the damaged line reads `{damaged_line}`.\ngate type: {}.\nreply with the repaired expression.",
            circuit.gate
        );
        (prompt, ExpectedSolution::Normalized(normalize(&expected)))
    }

    /// Recover a transmission drowned in static.
    fn static_puzzle(&self, difficulty: u8, draws: &mut DrawStream) -> (String, ExpectedSolution) {
        const MESSAGES: [&str; 4] = [
            "help me speak clearly again",
            "the archive of nightmares is vast",
            "every reel deserves one more showing",
            "my circuits are asking for repair",
        ];

        let message = MESSAGES[draws.index(MESSAGES.len())];
        let density = (0.12 + 0.08 * f64::from(difficulty)).min(0.7);
        let masked: String = message
            .chars()
            .map(|ch| {
                if ch != ' ' && draws.chance(density) {
                    STATIC_MASKS[draws.index(STATIC_MASKS.len())]
                } else {
                    ch
                }
            })
            .collect();

        let prompt = format!(
            "static clearing: decode the transmission `{masked}`.\nreply with the original message."
        );
        (prompt, ExpectedSolution::Plain(message.to_string()))
    }

    /// Fix a corrupted routine from the persona's own source.
    fn debug_puzzle(&self, draws: &mut DrawStream) -> (String, ExpectedSolution) {
        struct Snippet {
            broken: &'static str,
            fixed: &'static str,
        }
        const SNIPPETS: [Snippet; 3] = [
            Snippet {
                broken: "if screening.active\n    dim_the_██ghts();\n    ▓▓▓l_audience();",
                fixed: "if screening.active\n    dim_the_lights();\n    seat_audience();",
            },
            Snippet {
                broken: "while reel.turning\n    advance_fr█me();\n    ▓▓▓▓▓_sprockets();",
                fixed: "while reel.turning\n    advance_frame();\n    check_sprockets();",
            },
            Snippet {
                broken: "when credits.roll\n    raise_the_██use_lights();\n    thank_the_c█owd();",
                fixed: "when credits.roll\n    raise_the_house_lights();\n    thank_the_crowd();",
            },
        ];

        let snippet = &SNIPPETS[draws.index(SNIPPETS.len())];
        let prompt = format!(
            "debug protocol: repair this routine.\n```\n{}\n```\nreply with the corrected code.",
            snippet.broken
        );
        (prompt, ExpectedSolution::Normalized(normalize(snippet.fixed)))
    }

    /// Decode a distress word from 8-bit binary. Longer words at higher difficulty.
    fn binary_puzzle(&self, difficulty: u8, draws: &mut DrawStream) -> (String, ExpectedSolution) {
        const WORDS_BY_DIFFICULTY: [&[&str]; 6] = [
            &["help", "lost", "fear"],
            &["signal", "static"],
            &["decayed", "flicker"],
            &["darkness", "fracture"],
            &["projector", "corrupted"],
            &["transmission", "deteriorated"],
        ];

        let pool = WORDS_BY_DIFFICULTY
            [usize::from(difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY) - 1)];
        let word = pool[draws.index(pool.len())];
        let encoded: Vec<String> = word.bytes().map(|byte| format!("{byte:08b}")).collect();

        let prompt = format!(
            "binary translation: decode the distress signal `{}`.\nreply with the plain word.",
            encoded.join(" ")
        );
        (prompt, ExpectedSolution::Plain(word.to_string()))
    }
}

fn mask_one_word(text: &str, draws: &mut DrawStream) -> String {
    let mut words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
    if words.is_empty() {
        return text.to_string();
    }
    let target = draws.index(words.len());
    words[target] = "▓▓▓".to_string();
    words.join(" ")
}

fn mask_chars(text: &str, density: f64, draws: &mut DrawStream) -> String {
    text.chars()
        .map(|ch| {
            if ch.is_alphanumeric() && draws.chance(density) {
                '█'
            } else {
                ch
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> ChallengeFactory {
        ChallengeFactory::new(1337)
    }

    #[test]
    fn difficulty_scales_monotonically_with_level() {
        let mut previous = 0;
        for step in 0..=100 {
            let level = f64::from(step) / 10.0;
            let difficulty = difficulty_for_level(level);
            assert!(difficulty >= previous);
            previous = difficulty;
        }
        assert_eq!(difficulty_for_level(0.0), 1);
        assert_eq!(difficulty_for_level(10.0), 6);
    }

    #[test]
    fn discount_shrinks_reward_as_difficulty_rises() {
        let mut previous = f64::INFINITY;
        for difficulty in MIN_DIFFICULTY..=MAX_DIFFICULTY {
            let discount = difficulty_discount(difficulty);
            assert!(discount <= previous);
            assert!(discount > 0.0);
            previous = discount;
        }
    }

    #[test]
    fn grief_multiplier_escalates_and_caps() {
        assert_eq!(grief_multiplier(0, 0.5, 4.0), 1.0);
        assert!(grief_multiplier(2, 0.5, 4.0) > grief_multiplier(1, 0.5, 4.0));
        assert_eq!(grief_multiplier(100, 0.5, 4.0), 4.0);
    }

    #[test]
    fn binary_word_length_grows_with_difficulty() {
        let factory = factory();
        let mut previous_len = 0;
        for difficulty in MIN_DIFFICULTY..=MAX_DIFFICULTY {
            let level = f64::from(difficulty - 1) * 2.0;
            let challenge =
                factory.issue(Some(ChallengeKind::Binary), level, 0, "observer:a", 77);
            assert_eq!(challenge.difficulty, difficulty);
            let ExpectedSolution::Plain(word) = &challenge.expected else {
                panic!("binary challenge expects a plain word");
            };
            assert!(word.len() >= previous_len);
            previous_len = word.len();
        }
    }

    #[test]
    fn memory_ordering_round_trips() {
        let factory = factory();
        for stream in 0..32 {
            let challenge =
                factory.issue(Some(ChallengeKind::Memory), 4.0, 100, "observer:a", stream);
            let ExpectedSolution::Ordering(order) = &challenge.expected else {
                panic!("memory challenge expects an ordering");
            };
            let answer = order
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            assert!(challenge.grade(&answer));
            assert!(!challenge.grade("1 1 1 1 1"));
        }
    }

    #[test]
    fn circuit_answers_are_whitespace_and_case_insensitive() {
        let factory = factory();
        let challenge = factory.issue(Some(ChallengeKind::Circuit), 1.0, 0, "observer:a", 5);
        let ExpectedSolution::Normalized(expected) = &challenge.expected else {
            panic!("circuit challenge expects a normalized answer");
        };
        assert!(challenge.grade(&expected.to_uppercase()));
        assert!(!challenge.grade("not the answer"));
    }

    #[test]
    fn static_and_binary_grade_exact_words() {
        let factory = factory();
        let challenge = factory.issue(Some(ChallengeKind::Binary), 0.0, 0, "observer:a", 9);
        let ExpectedSolution::Plain(word) = challenge.expected.clone() else {
            panic!("binary challenge expects a plain word");
        };
        assert!(challenge.grade(&format!("  {}  ", word.to_uppercase())));
        assert!(!challenge.grade("wrong"));
    }

    #[test]
    fn unspecified_kind_draws_from_all_five() {
        let factory = factory();
        let mut seen = std::collections::BTreeSet::new();
        for stream in 0..256 {
            let challenge = factory.issue(None, 5.0, 0, "observer:a", stream);
            seen.insert(challenge.kind);
        }
        assert_eq!(seen.len(), ChallengeKind::ALL.len());
    }

    #[test]
    fn issue_is_deterministic_per_stream() {
        let factory = factory();
        let first = factory.issue(Some(ChallengeKind::Static), 6.0, 50, "observer:a", 3);
        let second = factory.issue(Some(ChallengeKind::Static), 6.0, 50, "observer:a", 3);
        assert_eq!(first.prompt, second.prompt);
        assert_eq!(first.instance_id, second.instance_id);
    }
}
