//! Confidence arithmetic: three pure transitions on `c ∈ [0,1]`.

/// Asymptotic approach to 1: `c' = min(1, c + 0.05 * (1 - c))`.
pub fn reinforce(c: f64) -> f64 {
    (c + 0.05 * (1.0 - c)).min(1.0)
}

/// Proportional decay: `c' = max(0, c - 0.10 * c)`.
pub fn weak_contradiction(c: f64) -> f64 {
    (c - 0.10 * c).max(0.0)
}

/// Proportional decay: `c' = max(0, c - 0.30 * c)`.
pub fn strong_contradiction(c: f64) -> f64 {
    (c - 0.30 * c).max(0.0)
}

/// A contradicting atom's own confidence > 0.75 makes its contradiction
/// "strong"; otherwise "weak".
pub fn apply_contradiction(target_confidence: f64, contradicting_atom_confidence: f64) -> f64 {
    if contradicting_atom_confidence > 0.75 {
        strong_contradiction(target_confidence)
    } else {
        weak_contradiction(target_confidence)
    }
}
