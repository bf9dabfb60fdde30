//! Mood vocabulary and the sentiment-to-label mapping.
//!
//! Aggregate sentiment arrives as a net percent in `[-100, 100]`. Real-world
//! windows cluster tightly around zero, so a linear mapping would park nearly
//! every run on the same handful of neutral words. The mapping instead pushes
//! the normalized deviation through a sub-unity power curve, stretching the
//! neutral band across the middle of the vocabulary while reserving the tails
//! for genuinely extreme windows.

/// Ordered mood vocabulary, most negative first.
pub const MOOD_VOCABULARY: [&str; 100] = [
    "hopeless",
    "despairing",
    "devastated",
    "anguished",
    "wretched",
    "crushed",
    "miserable",
    "despondent",
    "heartbroken",
    "grieving",
    "mournful",
    "sorrowful",
    "dejected",
    "demoralized",
    "distraught",
    "tormented",
    "embittered",
    "seething",
    "enraged",
    "furious",
    "hostile",
    "resentful",
    "indignant",
    "aggravated",
    "exasperated",
    "frustrated",
    "distressed",
    "troubled",
    "worried",
    "anxious",
    "apprehensive",
    "fearful",
    "uneasy",
    "nervous",
    "tense",
    "strained",
    "weary",
    "drained",
    "fatigued",
    "listless",
    "sluggish",
    "glum",
    "gloomy",
    "somber",
    "subdued",
    "muted",
    "flat",
    "indifferent",
    "detached",
    "level",
    "neutral",
    "steady",
    "composed",
    "calm",
    "settled",
    "relaxed",
    "easygoing",
    "comfortable",
    "content",
    "satisfied",
    "pleased",
    "agreeable",
    "amiable",
    "warm",
    "friendly",
    "genial",
    "cordial",
    "cheerful",
    "sunny",
    "bright",
    "upbeat",
    "lively",
    "spirited",
    "animated",
    "playful",
    "buoyant",
    "merry",
    "jovial",
    "gleeful",
    "happy",
    "joyful",
    "delighted",
    "thrilled",
    "excited",
    "exuberant",
    "exhilarated",
    "elated",
    "overjoyed",
    "jubilant",
    "triumphant",
    "radiant",
    "glowing",
    "beaming",
    "soaring",
    "blissful",
    "rapturous",
    "ecstatic",
    "rhapsodic",
    "transcendent",
    "euphoric",
];

/// Exponent applied to the normalized deviation from neutral. Values below 1
/// widen the spread of near-neutral inputs across the mid-vocabulary.
const CURVE_EXPONENT: f64 = 0.45;

/// Map a net sentiment percent to an index into [`MOOD_VOCABULARY`].
///
/// Total over all of `f64`: out-of-range inputs clamp to `[-100, 100]` and
/// `NaN` is treated as neutral.
fn mood_index(net_sentiment_percent: f64) -> usize {
    let clamped = if net_sentiment_percent.is_nan() {
        0.0
    } else {
        net_sentiment_percent.clamp(-100.0, 100.0)
    };

    // Deviation from neutral in [-1, 1], curved symmetrically around zero.
    let deviation = clamped / 100.0;
    let curved = deviation.signum() * deviation.abs().powf(CURVE_EXPONENT);
    let t = (curved + 1.0) / 2.0;

    let max_index = MOOD_VOCABULARY.len() - 1;
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = (t * max_index as f64).round() as usize;
    index.min(max_index)
}

/// Pick the mood word for a net sentiment percent.
///
/// Deterministic: the same input always yields the same word.
#[must_use]
pub fn mood_label(net_sentiment_percent: f64) -> &'static str {
    MOOD_VOCABULARY[mood_index(net_sentiment_percent)]
}
