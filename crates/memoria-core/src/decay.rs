//! Temporal decay model.
//!
//! Pure function over a memory's strength, its layer, and elapsed time. No
//! side effects: callers (the decay-pass stage, the scheduler's direct decay
//! routine) own persistence.

use chrono::{DateTime, Utc};

use crate::model::Layer;

/// Decay rate per day, by layer.
pub fn rate_per_day(layer: Layer) -> f64 {
    match layer {
        Layer::Working => 0.05,
        Layer::Episodic => 0.015,
        Layer::Semantic => 0.003,
        Layer::Archival => 0.001,
    }
}

/// Recompute `strength` after exponential decay since `last_reinforced_at`.
///
/// `strength' = clamp01(strength * exp(-rate * Δdays))`, Δdays floored at 0
/// so a clock skew that puts `now` before `last_reinforced_at` is a no-op.
pub fn decay(strength: f64, last_reinforced_at: DateTime<Utc>, layer: Layer, now: DateTime<Utc>) -> f64 {
    let elapsed_days = (now - last_reinforced_at).num_milliseconds() as f64 / 86_400_000.0;
    let delta = elapsed_days.max(0.0);
    let decayed = strength * (-rate_per_day(layer) * delta).exp();
    decayed.clamp(0.0, 1.0)
}

/// `0.10 <= s < 0.25`.
pub fn is_archival_candidate(strength: f64) -> bool {
    (0.10..0.25).contains(&strength)
}

/// `s < 0.10`.
pub fn is_expiration_candidate(strength: f64) -> bool {
    strength < 0.10
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn no_elapsed_time_is_a_no_op() {
        let now = Utc::now();
        assert_eq!(decay(0.8, now, Layer::Semantic, now), 0.8);
    }

    #[test]
    fn future_last_reinforced_clamps_delta_to_zero() {
        let now = Utc::now();
        let later = now + Duration::days(5);
        assert_eq!(decay(0.8, later, Layer::Episodic, now), 0.8);
    }

    #[test]
    fn thirty_days_episodic_matches_seed_scenario() {
        let now = Utc::now();
        let thirty_days_ago = now - Duration::days(30);
        let s = decay(0.3, thirty_days_ago, Layer::Episodic, now);
        assert!((s - 0.191).abs() < 0.001, "got {s}");
        assert!(is_archival_candidate(s));
        assert!(!is_expiration_candidate(s));
    }

    #[test]
    fn result_is_always_clamped() {
        let now = Utc::now();
        let far_past = now - Duration::days(100_000);
        let s = decay(1.0, far_past, Layer::Working, now);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn classification_boundaries() {
        assert!(!is_archival_candidate(0.09999));
        assert!(is_archival_candidate(0.10));
        assert!(is_archival_candidate(0.2499));
        assert!(!is_archival_candidate(0.25));
        assert!(is_expiration_candidate(0.0999));
        assert!(!is_expiration_candidate(0.10));
    }
}
