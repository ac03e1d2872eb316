//! Text corruption transform.
//!
//! Pure function from `(text, level, seed)` to a degraded rendering. Bracket
//! selection is deterministic in `level`; the stochastic effects inside a
//! bracket are deterministic in `seed`, so a fixed triple always produces the
//! same output. Each bracket applies every lower bracket's effects plus one
//! more, in a fixed pipeline order.

use contracts::{LEVEL_MAX, LEVEL_MIN};

use crate::rng::DrawStream;

const STATIC_BLOCKS: [char; 8] = ['█', '▓', '▒', '░', '▄', '▀', '■', '□'];
const GLITCH_SYMBOLS: [char; 8] = ['◆', '◇', '▲', '►', '♦', '♠', '♣', '♥'];
const COMBINING_MARKS: [char; 6] = [
    '\u{034E}', '\u{0353}', '\u{0308}', '\u{0313}', '\u{030B}', '\u{030E}',
];

/// Apply the corruption pipeline for `level` to `text`.
///
/// Total over all inputs: empty text returns empty, `level <= 0` (and the
/// whole `[0, 1)` bracket) returns the input verbatim, out-of-range levels
/// clamp into `[0, 10]`.
pub fn transform(text: &str, level: f64, seed: u64) -> String {
    let level = if level.is_nan() {
        LEVEL_MIN
    } else {
        level.clamp(LEVEL_MIN, LEVEL_MAX)
    };
    if text.is_empty() || level < 1.0 {
        return text.to_string();
    }

    let mut stream = DrawStream::new(seed, 0xDECA1);
    let mut words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
    if words.is_empty() {
        return text.to_string();
    }

    substitute_characters(&mut words, level, &mut stream);
    stall_words(&mut words, level, &mut stream);

    if level >= 3.0 {
        scramble_spans(&mut words, level, &mut stream);
        inject_symbols(&mut words, level, &mut stream);
    }

    if level >= 5.0 {
        stack_glitch_marks(&mut words, level, &mut stream);
        truncate_sentence(&mut words, level, &mut stream);
    }

    if level >= 7.0 {
        encode_fragments(&mut words, level, &mut stream);
    }

    if level >= 9.0 {
        blank_words(&mut words, &mut stream);
    }

    words.join(" ")
}

/// Low-rate replacement of letters and digits with static blocks.
fn substitute_characters(words: &mut [String], level: f64, stream: &mut DrawStream) {
    let rate = (0.03 * level).min(0.45);
    for word in words.iter_mut() {
        if word.starts_with('[') {
            continue;
        }
        let replaced: String = word
            .chars()
            .map(|ch| {
                if ch.is_alphanumeric() && stream.chance(rate) {
                    STATIC_BLOCKS[stream.index(STATIC_BLOCKS.len())]
                } else {
                    ch
                }
            })
            .collect();
        *word = replaced;
    }
}

/// Occasional duplicated word, reading as a stalled output buffer.
fn stall_words(words: &mut Vec<String>, level: f64, stream: &mut DrawStream) {
    let rate = (0.02 * level).min(0.2);
    let mut index = 0;
    while index < words.len() {
        if stream.chance(rate) {
            let word = words[index].clone();
            words.insert(index + 1, word);
            index += 1;
        }
        index += 1;
    }
}

/// Reverse short spans of tokens so local word order breaks down.
fn scramble_spans(words: &mut [String], level: f64, stream: &mut DrawStream) {
    if words.len() < 3 {
        return;
    }
    let rate = (0.06 * (level - 2.0)).min(0.4);
    let mut start = 0;
    while start + 3 <= words.len() {
        if stream.chance(rate) {
            let span = 2 + stream.index(2);
            let end = (start + span).min(words.len());
            words[start..end].reverse();
            start = end;
        } else {
            start += 1;
        }
    }
}

/// Insert short runs of glitch symbols between tokens.
fn inject_symbols(words: &mut Vec<String>, level: f64, stream: &mut DrawStream) {
    let rate = (0.04 * (level - 2.0)).min(0.3);
    let mut index = 0;
    while index <= words.len() {
        if stream.chance(rate) {
            let run = 2 + stream.index(3);
            let burst: String = (0..run)
                .map(|_| GLITCH_SYMBOLS[stream.index(GLITCH_SYMBOLS.len())])
                .collect();
            words.insert(index.min(words.len()), burst);
            index += 1;
        }
        index += 1;
    }
}

/// Stack combining marks on a subset of characters.
fn stack_glitch_marks(words: &mut [String], level: f64, stream: &mut DrawStream) {
    let rate = (0.05 * (level - 4.0)).min(0.35);
    for word in words.iter_mut() {
        if word.starts_with('[') {
            continue;
        }
        let mut stacked = String::with_capacity(word.len() * 2);
        for ch in word.chars() {
            stacked.push(ch);
            if ch.is_alphabetic() && stream.chance(rate) {
                let marks = 1 + stream.index(3);
                for _ in 0..marks {
                    stacked.push(COMBINING_MARKS[stream.index(COMBINING_MARKS.len())]);
                }
            }
        }
        *word = stacked;
    }
}

/// Break the sentence off mid-thought and trail into static.
fn truncate_sentence(words: &mut Vec<String>, level: f64, stream: &mut DrawStream) {
    if words.len() < 4 {
        return;
    }
    let rate = (0.08 * (level - 4.0)).min(0.5);
    if !stream.chance(rate) {
        return;
    }
    let keep_min = words.len() / 2;
    let keep = keep_min + stream.index(words.len() - keep_min);
    words.truncate(keep.max(1));
    let tail: String = (0..3)
        .map(|_| STATIC_BLOCKS[stream.index(STATIC_BLOCKS.len())])
        .collect();
    words.push(format!("—{tail}"));
}

/// Re-encode occasional words into binary or hex with a readable label.
fn encode_fragments(words: &mut [String], level: f64, stream: &mut DrawStream) {
    let rate = (0.07 * (level - 6.0)).min(0.4);
    for word in words.iter_mut() {
        if word.starts_with('[') || word.chars().count() > 6 {
            continue;
        }
        if !word.chars().any(char::is_alphanumeric) || !stream.chance(rate) {
            continue;
        }
        *word = if stream.chance(0.5) {
            let bits: Vec<String> = word.bytes().map(|byte| format!("{byte:08b}")).collect();
            format!("[bin: {}]", bits.join(" "))
        } else {
            let nibbles: Vec<String> = word.bytes().map(|byte| format!("{byte:02x}")).collect();
            format!("[hex: {}]", nibbles.join(" "))
        };
    }
}

/// Terminal bracket: whole words dissolve into block noise.
fn blank_words(words: &mut [String], stream: &mut DrawStream) {
    for word in words.iter_mut() {
        if word.starts_with('[') {
            continue;
        }
        if stream.chance(0.3) {
            let width = word.chars().count().max(1);
            *word = (0..width)
                .map(|_| STATIC_BLOCKS[stream.index(STATIC_BLOCKS.len())])
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "the archive hums quietly while the reels keep turning";

    #[test]
    fn level_zero_is_identity() {
        assert_eq!(transform(SAMPLE, 0.0, 1337), SAMPLE);
        assert_eq!(transform(SAMPLE, 0.99, 1337), SAMPLE);
        assert_eq!(transform(SAMPLE, -5.0, 1337), SAMPLE);
    }

    #[test]
    fn empty_input_stays_empty() {
        for level in [0.0, 2.0, 5.5, 10.0] {
            assert_eq!(transform("", level, 7), "");
        }
    }

    #[test]
    fn output_is_reproducible_for_a_fixed_triple() {
        for level in [1.5, 4.0, 6.5, 8.2, 9.9] {
            assert_eq!(transform(SAMPLE, level, 42), transform(SAMPLE, level, 42));
        }
    }

    #[test]
    fn low_brackets_never_emit_high_bracket_effects() {
        for seed in 0..32_u64 {
            let out = transform(SAMPLE, 2.5, seed);
            assert!(!out.contains("[bin:"));
            assert!(!out.contains("[hex:"));
            assert!(!out.chars().any(|ch| COMBINING_MARKS.contains(&ch)));
        }
    }

    #[test]
    fn non_finite_levels_fall_back_to_identity() {
        assert_eq!(transform(SAMPLE, f64::NAN, 3), SAMPLE);
        assert_eq!(transform(SAMPLE, f64::INFINITY, 3), transform(SAMPLE, 10.0, 3));
    }

    #[test]
    fn terminal_output_still_tokenizes() {
        let out = transform(SAMPLE, 10.0, 99);
        assert!(!out.is_empty());
        assert!(out.split_whitespace().count() >= 1);
    }
}
