//! Two-state Bayesian existence filter
//!
//! Each observed host and host-pair gets one filter tracking the
//! probability that the entity currently exists. Every scheduler cycle
//! advances the filter one step with a forward-algorithm update:
//! transition smoothing, then a sensor correction keyed on whether
//! evidence arrived this cycle, then normalization.

use thiserror::Error;

/// Persistence of the transition model: how strongly the previous belief
/// carries into the next step.
pub const DEFAULT_TRANSITION_MODEL: f64 = 0.95;

/// Sensor likelihoods `[P(observed | exists), P(observed | not exists)]`.
pub const DEFAULT_SENSOR_MODEL: [f64; 2] = [0.7, 0.1];

/// Errors from a belief update step
#[derive(Debug, Error, PartialEq)]
pub enum BeliefError {
    /// The belief vector summed to zero (or a non-finite value) before
    /// normalization. The update cannot proceed for this filter.
    #[error("belief vector degenerated to sum {0} before normalization")]
    Degenerate(f64),
}

/// A two-state existence filter: `p = [p_exists, p_nonexists]`.
///
/// Invariants: the components sum to 1 after every successful [`update`],
/// and `pending_evidence` is consumed (reset to false) by every update.
///
/// [`update`]: BeliefFilter::update
#[derive(Debug, Clone)]
pub struct BeliefFilter {
    transition_model: f64,
    sensor_model: [f64; 2],
    p: [f64; 2],
    pending_evidence: bool,
}

impl BeliefFilter {
    /// Create a filter with the default transition and sensor models,
    /// starting from the uninformed prior `[0.5, 0.5]`.
    pub fn new() -> Self {
        Self::with_models(DEFAULT_TRANSITION_MODEL, DEFAULT_SENSOR_MODEL)
    }

    /// Create a filter with explicit models. `transition_model` is expected
    /// in `(0, 1]`; values near 1 model slowly changing networks.
    pub fn with_models(transition_model: f64, sensor_model: [f64; 2]) -> Self {
        Self {
            transition_model,
            sensor_model,
            p: [0.5, 0.5],
            pending_evidence: false,
        }
    }

    /// Record that evidence for this entity was observed in the current
    /// cycle. Consumed by the next [`update`](BeliefFilter::update).
    pub fn add_evidence(&mut self) {
        self.pending_evidence = true;
    }

    /// Whether evidence is waiting to be consumed by the next update.
    pub fn has_pending_evidence(&self) -> bool {
        self.pending_evidence
    }

    /// Probability that the entity currently exists.
    pub fn likelihood(&self) -> f64 {
        self.p[0]
    }

    /// The full belief vector `[p_exists, p_nonexists]`.
    pub fn probabilities(&self) -> [f64; 2] {
        self.p
    }

    /// Advance the filter one step.
    ///
    /// 1. Transition smoothing: each component is blended toward its
    ///    complement by `1 - transition_model`.
    /// 2. Sensor correction: multiply by `sensor_model` if evidence is
    ///    pending, by `1 - sensor_model` otherwise.
    /// 3. Normalize so the components sum to 1.
    ///
    /// Pending evidence is consumed either way. A zero or non-finite sum
    /// before normalization is an invariant violation and is surfaced,
    /// never divided through.
    pub fn update(&mut self) -> Result<(), BeliefError> {
        for i in 0..2 {
            self.p[i] =
                self.transition_model * self.p[i] + (1.0 - self.transition_model) * (1.0 - self.p[i]);
        }

        for i in 0..2 {
            self.p[i] *= if self.pending_evidence {
                self.sensor_model[i]
            } else {
                1.0 - self.sensor_model[i]
            };
        }
        self.pending_evidence = false;

        let sum = self.p[0] + self.p[1];
        if sum <= 0.0 || !sum.is_finite() {
            return Err(BeliefError::Degenerate(sum));
        }
        self.p[0] /= sum;
        self.p[1] /= sum;

        Ok(())
    }
}

impl Default for BeliefFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_no_evidence_step_from_prior() {
        // From [0.5, 0.5] with the default models and no evidence:
        // transition leaves [0.5, 0.5], sensor branch scales by [0.3, 0.9],
        // normalization yields [0.25, 0.75].
        let mut filter = BeliefFilter::new();
        filter.update().unwrap();

        let p = filter.probabilities();
        assert!((p[0] - 0.25).abs() < TOLERANCE);
        assert!((p[1] - 0.75).abs() < TOLERANCE);
    }

    #[test]
    fn test_evidence_step_from_prior() {
        // With evidence the sensor branch scales by [0.7, 0.1]:
        // [0.35, 0.05] normalizes to [0.875, 0.125].
        let mut filter = BeliefFilter::new();
        filter.add_evidence();
        filter.update().unwrap();

        let p = filter.probabilities();
        assert!((p[0] - 0.875).abs() < TOLERANCE);
        assert!((p[1] - 0.125).abs() < TOLERANCE);
    }

    #[test]
    fn test_components_sum_to_one_across_steps() {
        let mut filter = BeliefFilter::new();
        for step in 0..50 {
            if step % 3 == 0 {
                filter.add_evidence();
            }
            filter.update().unwrap();
            let p = filter.probabilities();
            assert!((p[0] + p[1] - 1.0).abs() < TOLERANCE, "step {step}: {p:?}");
        }
    }

    #[test]
    fn test_pending_evidence_consumed_by_update() {
        let mut filter = BeliefFilter::new();
        filter.add_evidence();
        assert!(filter.has_pending_evidence());

        filter.update().unwrap();
        assert!(!filter.has_pending_evidence());
    }

    #[test]
    fn test_evidence_raises_and_silence_decays() {
        let mut filter = BeliefFilter::new();
        filter.add_evidence();
        filter.update().unwrap();
        let after_evidence = filter.likelihood();
        assert!(after_evidence > 0.5);

        filter.update().unwrap();
        assert!(filter.likelihood() < after_evidence);
    }

    #[test]
    fn test_degenerate_sum_is_surfaced() {
        // A zero sensor model annihilates both components.
        let mut filter = BeliefFilter::with_models(0.95, [0.0, 0.0]);
        filter.add_evidence();

        let err = filter.update().unwrap_err();
        assert_eq!(err, BeliefError::Degenerate(0.0));
    }
}
