//! General-purpose lexicon scorer for short social posts.

use crate::error::SentimentError;

/// Word weights. Keys are lowercase single words. Values in `(0.0, 1.0]`
/// are positive, in `[-1.0, 0.0)` are negative. The final score is clamped
/// to `[-1.0, 1.0]`.
const LEXICON: &[(&str, f32)] = &[
    // Positive signals
    ("love", 0.6),
    ("loved", 0.6),
    ("adore", 0.6),
    ("amazing", 0.6),
    ("awesome", 0.6),
    ("wonderful", 0.6),
    ("beautiful", 0.5),
    ("brilliant", 0.5),
    ("excellent", 0.5),
    ("fantastic", 0.6),
    ("incredible", 0.5),
    ("great", 0.4),
    ("good", 0.3),
    ("nice", 0.3),
    ("happy", 0.5),
    ("joy", 0.5),
    ("excited", 0.5),
    ("fun", 0.4),
    ("win", 0.4),
    ("won", 0.4),
    ("best", 0.5),
    ("better", 0.3),
    ("hope", 0.3),
    ("hopeful", 0.4),
    ("grateful", 0.5),
    ("thankful", 0.5),
    ("thanks", 0.3),
    ("proud", 0.4),
    ("celebrate", 0.5),
    ("congrats", 0.5),
    ("congratulations", 0.5),
    ("relief", 0.3),
    ("relieved", 0.4),
    ("cute", 0.4),
    ("lovely", 0.5),
    ("perfect", 0.5),
    ("glad", 0.4),
    // Negative signals
    ("hate", -0.6),
    ("hated", -0.6),
    ("awful", -0.6),
    ("terrible", -0.6),
    ("horrible", -0.6),
    ("worst", -0.6),
    ("bad", -0.4),
    ("sad", -0.5),
    ("angry", -0.5),
    ("furious", -0.6),
    ("scared", -0.5),
    ("afraid", -0.5),
    ("fear", -0.4),
    ("worried", -0.4),
    ("anxious", -0.4),
    ("anxiety", -0.4),
    ("depressed", -0.6),
    ("depressing", -0.5),
    ("cry", -0.4),
    ("crying", -0.4),
    ("lost", -0.3),
    ("lose", -0.3),
    ("losing", -0.3),
    ("fail", -0.4),
    ("failed", -0.4),
    ("failure", -0.4),
    ("broken", -0.4),
    ("disaster", -0.6),
    ("tragedy", -0.6),
    ("tragic", -0.6),
    ("crisis", -0.5),
    ("war", -0.5),
    ("death", -0.5),
    ("dead", -0.5),
    ("died", -0.5),
    ("sick", -0.4),
    ("pain", -0.4),
    ("hurt", -0.4),
    ("wrong", -0.3),
    ("problem", -0.3),
    ("disappointed", -0.5),
    ("disappointing", -0.5),
    ("annoying", -0.4),
    ("exhausted", -0.4),
    ("tired", -0.3),
];

/// Words that flip the polarity of the word that follows them.
const NEGATIONS: &[&str] = &["not", "no", "never", "nothing", "isnt", "dont", "cant", "wont"];

/// Score a text using the word lexicon.
///
/// Splits text into lowercase words (punctuation stripped), sums matching
/// weights — flipping the sign when the previous word is a negation — and
/// clamps the result to `[-1.0, 1.0]`. Returns `0.0` for empty or unknown
/// text.
#[must_use]
pub fn compound_score(text: &str) -> f32 {
    let mut score = 0.0_f32;
    let mut previous_negates = false;

    for word in text.split_whitespace() {
        let w = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .replace('\'', "")
            .to_lowercase();
        if w.is_empty() {
            continue;
        }

        let matched = LEXICON
            .iter()
            .find_map(|&(lex_word, weight)| (w == lex_word).then_some(weight));
        if let Some(weight) = matched {
            score += if previous_negates { -weight } else { weight };
        }

        previous_negates = NEGATIONS.contains(&w.as_str());
    }

    score.clamp(-1.0, 1.0)
}

/// The scorer seam the aggregation stage depends on.
///
/// Must behave as a pure function of the text: same input, same score.
pub trait SentimentScorer: Send + Sync {
    /// Compound polarity score in `[-1.0, 1.0]`.
    ///
    /// # Errors
    ///
    /// Returns [`SentimentError::Unavailable`] when the backing scorer
    /// cannot be reached.
    fn score(&self, text: &str) -> Result<f32, SentimentError>;
}

/// The shipped lexicon implementation. Infallible and allocation-light.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconScorer;

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> Result<f32, SentimentError> {
        Ok(compound_score(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_returns_zero() {
        assert_eq!(compound_score(""), 0.0);
    }

    #[test]
    fn unknown_text_returns_zero() {
        assert_eq!(compound_score("the quick brown fox jumps"), 0.0);
    }

    #[test]
    fn positive_keyword_returns_positive() {
        let score = compound_score("what a wonderful morning");
        assert!(score > 0.0, "expected positive score, got {score}");
    }

    #[test]
    fn negative_keyword_returns_negative() {
        let score = compound_score("this is a disaster");
        assert!(score < 0.0, "expected negative score, got {score}");
    }

    #[test]
    fn negation_flips_polarity() {
        let plain = compound_score("good");
        let negated = compound_score("not good");
        assert!(plain > 0.0);
        assert!(negated < 0.0, "negated positive should go negative, got {negated}");
    }

    #[test]
    fn negation_only_reaches_the_next_word() {
        // "not" flips "bad", but "happy" two words later keeps its sign.
        let score = compound_score("not bad actually happy");
        assert!(score > 0.0, "expected net positive, got {score}");
    }

    #[test]
    fn punctuation_is_stripped() {
        assert!(compound_score("amazing!!!") > 0.0);
        assert!(compound_score("(terrible)") < 0.0);
    }

    #[test]
    fn case_is_ignored() {
        assert_eq!(compound_score("LOVE this"), compound_score("love this"));
    }

    #[test]
    fn score_clamps_to_positive_one() {
        let text = "love amazing awesome wonderful fantastic perfect best excellent brilliant";
        assert_eq!(compound_score(text), 1.0);
    }

    #[test]
    fn score_clamps_to_negative_one() {
        let text = "hate awful terrible horrible worst disaster tragedy depressed furious";
        assert_eq!(compound_score(text), -1.0);
    }

    #[test]
    fn mixed_text_lands_between_the_extremes() {
        let score = compound_score("great show but a terrible ending");
        assert!(score > -1.0 && score < 1.0);
    }

    #[test]
    fn lexicon_scorer_is_deterministic() {
        let scorer = LexiconScorer;
        let a = scorer.score("lovely win today").unwrap();
        let b = scorer.score("lovely win today").unwrap();
        assert_eq!(a, b);
    }
}
