// ============================================================
// Layer 5 — Decay Schedules
// ============================================================
// Learning rate and teacher-forcing ratio both decay
// multiplicatively at fractional-epoch boundaries: the default
// schedule places 20 boundaries at every 5% of the configured
// epoch count. The value at an epoch is a pure function of the
// epoch index, so resuming from a checkpoint lands on exactly
// the same value a fresh run would reach.

/// Teacher forcing feeds ground truth instead of predictions to
/// sequential consumers during training; its ratio decays on the
/// same boundary grid as the learning rate.
#[derive(Debug, Clone)]
pub struct DecaySchedule {
    base: f64,
    decay: f64,
    /// Epoch indices at which one decay step applies
    boundaries: Vec<usize>,
}

impl DecaySchedule {
    pub fn new(base: f64, decay: f64, step_fractions: &[f64], num_epoch: usize) -> Self {
        let boundaries = step_fractions
            .iter()
            .map(|f| (f * num_epoch as f64).floor() as usize)
            .collect();
        Self { base, decay, boundaries }
    }

    /// base * decay^k, where k is the number of boundaries at or
    /// before `epoch`.
    pub fn value_at(&self, epoch: usize) -> f64 {
        let crossed = self.boundaries.iter().filter(|b| **b <= epoch).count();
        self.base * self.decay.powi(crossed as i32)
    }
}
