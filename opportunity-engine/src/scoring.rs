//! Opportunity scoring. All functions are pure and deterministic.

use gapscout_core::GapSignals;

const MENTIONS_WEIGHT: f64 = 0.35;
const REPEATED_QUESTIONS_WEIGHT: f64 = 0.30;
const CONFUSION_WEIGHT: f64 = 0.20;
const DISSATISFACTION_WEIGHT: f64 = 0.15;

const INVERSE_DIFFICULTY_SHARE: f64 = 0.6;
const GAP_SHARE: f64 = 0.4;
const VOLUME_FLOOR: u64 = 10;

/// Maps a 0-100 provider difficulty onto `[0, 1]`, clamping out-of-range input.
pub fn normalize_difficulty(kd: f64) -> f64 {
    if kd.is_nan() {
        return 0.0;
    }
    (kd / 100.0).clamp(0.0, 1.0)
}

/// Log-damped weighted sum of the gap signals, squashed into `[0, 1)`.
pub fn compute_gap_weight(gap: &GapSignals) -> f64 {
    let raw = MENTIONS_WEIGHT * f64::from(gap.reddit_mentions).ln_1p()
        + REPEATED_QUESTIONS_WEIGHT * f64::from(gap.repeated_questions).ln_1p()
        + CONFUSION_WEIGHT * f64::from(gap.confusion_markers).ln_1p()
        + DISSATISFACTION_WEIGHT * f64::from(gap.dissatisfaction_markers).ln_1p();

    1.0 - (-raw).exp()
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Ranking key for a keyword, rounded to four decimals.
pub fn opportunity_score(volume: u64, kd: f64, gap: &GapSignals) -> f64 {
    let inverse_difficulty = 1.0 - normalize_difficulty(kd);
    let gap_weight = compute_gap_weight(gap);
    let volume_score = (volume.max(VOLUME_FLOOR) as f64).log10();
    let composite = INVERSE_DIFFICULTY_SHARE * inverse_difficulty + GAP_SHARE * gap_weight;

    round4(volume_score * composite)
}
