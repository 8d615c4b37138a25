//! Per-swarm token and cost accounting.
//!
//! Feeds the SLO gate: cost is `tokens / 1000 * rate_per_k`.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

/// Accumulates token usage per swarm.
#[derive(Default)]
pub struct CostTracker {
    tokens: Mutex<HashMap<Uuid, u64>>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record tokens consumed on behalf of a swarm.
    pub fn record(&self, swarm_id: Uuid, tokens: u64) {
        let mut map = self.tokens.lock().expect("cost tracker poisoned");
        *map.entry(swarm_id).or_insert(0) += tokens;
    }

    /// Total tokens recorded for a swarm.
    pub fn tokens_for(&self, swarm_id: Uuid) -> u64 {
        self.tokens
            .lock()
            .expect("cost tracker poisoned")
            .get(&swarm_id)
            .copied()
            .unwrap_or(0)
    }

    /// Estimated spend in USD at the configured per-1k-token rate.
    pub fn cost_usd(&self, swarm_id: Uuid, rate_per_k_tokens: f64) -> f64 {
        self.tokens_for(swarm_id) as f64 / 1000.0 * rate_per_k_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_per_swarm() {
        let tracker = CostTracker::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        tracker.record(a, 1000);
        tracker.record(a, 500);
        tracker.record(b, 100);

        assert_eq!(tracker.tokens_for(a), 1500);
        assert_eq!(tracker.tokens_for(b), 100);
        assert_eq!(tracker.tokens_for(Uuid::new_v4()), 0);
    }

    #[test]
    fn test_cost_formula() {
        let tracker = CostTracker::new();
        let swarm = Uuid::new_v4();
        tracker.record(swarm, 600_000);
        // 600k tokens at $0.01/1k = $6.00
        assert!((tracker.cost_usd(swarm, 0.01) - 6.0).abs() < 1e-9);
    }
}
