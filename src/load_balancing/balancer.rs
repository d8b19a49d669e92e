//! # Weighted Destination Selection
//!
//! This module owns the pool of redirect destinations and decides, call by call,
//! which one the next client is sent to.
//!
//! ## Algorithms
//!
//! 1. **Smooth** (default): every destination keeps a running weight. On each call
//!    all running weights grow by their static weight, the largest wins and is
//!    pushed back by the total weight. Heavy destinations are spread across the
//!    cycle: weights `5,1,1` give `A,A,B,A,C,A,A`.
//! 2. **Interleaved**: a cursor walks the pool; each time it wraps, the current
//!    weight threshold drops by the GCD of all weights (resetting to the maximum
//!    once it reaches zero). A destination is picked when its weight meets the
//!    threshold. Weights `5,1,1` give `A,A,A,A,A,B,C`.
//!
//! Both hand out picks in exact proportion to weight over a full cycle.
//!
//! ## Locking
//!
//! A single `parking_lot::Mutex` guards the destination list together with all
//! running state. The lock is held for the whole selection loop, which is bounded
//! and does no I/O. Appending a destination resets the running state, so fairness
//! accounting restarts whenever the pool changes shape.

use crate::core::error::{AppendError, SelectionError};
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Weight used for destinations configured with a weight of zero
pub const DEFAULT_WEIGHT: u32 = 1;

/// Core trait for destination selectors
///
/// The dispatcher only depends on this trait, so alternative selectors can be
/// plugged in for testing.
pub trait Selector: Send + Sync {
    /// Choose the URL the next request is redirected to
    fn next(&self) -> Result<String, SelectionError>;

    /// Get the algorithm name for metrics and logging
    fn algorithm_name(&self) -> &'static str;

    /// Get current statistics for this selector
    fn stats(&self) -> SelectorStats;
}

/// Selection algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    Smooth,
    Interleaved,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Smooth => "smooth",
            Algorithm::Interleaved => "interleaved",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend origin plus its relative selection weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub url: String,
    pub weight: u32,
}

/// Selector statistics for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct SelectorStats {
    pub algorithm: String,
    pub total_selections: u64,
    pub failed_selections: u64,
    pub destinations: Vec<DestinationStats>,
}

/// Per-destination statistics
#[derive(Debug, Clone, Serialize)]
pub struct DestinationStats {
    pub url: String,
    pub weight: u32,
    pub selections: u64,
}

#[derive(Debug)]
struct Slot {
    destination: Destination,
    /// Running weight for the smooth algorithm
    current: i64,
    selections: u64,
}

/// State guarded by the selector lock
#[derive(Debug)]
struct SelectorState {
    slots: Vec<Slot>,
    /// Interleaved cursor; `None` until the first pick after a reset
    cursor: Option<usize>,
    /// Interleaved threshold; never exceeds the maximum weight
    current_weight: i64,
    failed_selections: u64,
}

impl SelectorState {
    fn reset(&mut self) {
        self.cursor = None;
        self.current_weight = 0;
        for slot in &mut self.slots {
            slot.current = 0;
        }
    }

    fn max_weight(&self) -> i64 {
        self.slots
            .iter()
            .map(|s| i64::from(s.destination.weight))
            .max()
            .unwrap_or(0)
    }

    fn weight_gcd(&self) -> i64 {
        self.slots
            .iter()
            .map(|s| i64::from(s.destination.weight))
            .fold(0, gcd)
    }

    fn select_smooth(&mut self) -> Result<usize, SelectionError> {
        let total: i64 = self
            .slots
            .iter()
            .map(|s| i64::from(s.destination.weight))
            .sum();
        if total == 0 {
            return Err(SelectionError::AllZeroWeight);
        }

        for slot in &mut self.slots {
            slot.current += i64::from(slot.destination.weight);
        }

        // Ties keep the earliest destination.
        let mut best = 0;
        for (index, slot) in self.slots.iter().enumerate().skip(1) {
            if slot.current > self.slots[best].current {
                best = index;
            }
        }

        self.slots[best].current -= total;
        Ok(best)
    }

    fn select_interleaved(&mut self) -> Result<usize, SelectionError> {
        let len = self.slots.len();
        let gcd = self.weight_gcd();
        let max = self.max_weight();

        loop {
            let index = match self.cursor {
                None => 0,
                Some(i) => (i + 1) % len,
            };
            self.cursor = Some(index);

            if index == 0 {
                self.current_weight -= gcd;
                if self.current_weight <= 0 {
                    self.current_weight = max;
                    if self.current_weight == 0 {
                        return Err(SelectionError::AllZeroWeight);
                    }
                }
            }

            if i64::from(self.slots[index].destination.weight) >= self.current_weight {
                return Ok(index);
            }
        }
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Thread-safe weighted round-robin pool of redirect destinations
#[derive(Debug)]
pub struct WeightedRoundRobin {
    algorithm: Algorithm,
    state: Mutex<SelectorState>,
}

impl WeightedRoundRobin {
    /// Create an empty pool using the smooth algorithm
    pub fn new() -> Self {
        Self::with_algorithm(Algorithm::Smooth)
    }

    /// Create an empty pool using the given algorithm
    pub fn with_algorithm(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            state: Mutex::new(SelectorState {
                slots: Vec::new(),
                cursor: None,
                current_weight: 0,
                failed_selections: 0,
            }),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Append a destination to the pool
    ///
    /// A weight of zero is normalized to [`DEFAULT_WEIGHT`]. On success the
    /// running selection state is reset. On failure the pool is left untouched.
    pub fn append_destination(&self, url: &str, weight: i64) -> Result<(), AppendError> {
        if url.is_empty() {
            return Err(AppendError::EmptyUrl);
        }
        let weight = match u32::try_from(weight) {
            Ok(0) => DEFAULT_WEIGHT,
            Ok(w) => w,
            Err(_) => return Err(AppendError::InvalidWeight { weight }),
        };

        let mut state = self.state.lock();
        state.slots.push(Slot {
            destination: Destination {
                url: url.to_string(),
                weight,
            },
            current: 0,
            selections: 0,
        });
        state.reset();

        debug!(
            url = url,
            weight = weight,
            pool_size = state.slots.len(),
            "Appended destination"
        );
        Ok(())
    }

    /// Snapshot of the configured destinations, in traversal order
    pub fn destinations(&self) -> Vec<Destination> {
        self.state
            .lock()
            .slots
            .iter()
            .map(|s| s.destination.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WeightedRoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for WeightedRoundRobin {
    fn next(&self) -> Result<String, SelectionError> {
        let mut state = self.state.lock();

        let result = if state.slots.is_empty() {
            Err(SelectionError::NoDestinations)
        } else {
            match self.algorithm {
                Algorithm::Smooth => state.select_smooth(),
                Algorithm::Interleaved => state.select_interleaved(),
            }
        };

        match result {
            Ok(index) => {
                let slot = &mut state.slots[index];
                slot.selections += 1;
                counter!("redirect_selections_total", "algorithm" => self.algorithm.as_str())
                    .increment(1);
                Ok(slot.destination.url.clone())
            }
            Err(err) => {
                state.failed_selections += 1;
                counter!("redirect_selection_failures_total", "algorithm" => self.algorithm.as_str())
                    .increment(1);
                warn!(error = %err, algorithm = %self.algorithm, "Destination selection failed");
                Err(err)
            }
        }
    }

    fn algorithm_name(&self) -> &'static str {
        self.algorithm.as_str()
    }

    fn stats(&self) -> SelectorStats {
        let state = self.state.lock();
        let destinations: Vec<DestinationStats> = state
            .slots
            .iter()
            .map(|s| DestinationStats {
                url: s.destination.url.clone(),
                weight: s.destination.weight,
                selections: s.selections,
            })
            .collect();

        SelectorStats {
            algorithm: self.algorithm.as_str().to_string(),
            total_selections: destinations.iter().map(|d| d.selections).sum(),
            failed_selections: state.failed_selections,
            destinations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn pool(algorithm: Algorithm, entries: &[(&str, i64)]) -> WeightedRoundRobin {
        let wrr = WeightedRoundRobin::with_algorithm(algorithm);
        for (url, weight) in entries {
            wrr.append_destination(url, *weight).unwrap();
        }
        wrr
    }

    fn take(wrr: &WeightedRoundRobin, n: usize) -> Vec<String> {
        (0..n).map(|_| wrr.next().unwrap()).collect()
    }

    #[test]
    fn test_smooth_sequence_spreads_heavy_destination() {
        let wrr = pool(Algorithm::Smooth, &[("A", 5), ("B", 1), ("C", 1)]);
        assert_eq!(take(&wrr, 7), vec!["A", "A", "B", "A", "C", "A", "A"]);
        // The cycle repeats.
        assert_eq!(take(&wrr, 7), vec!["A", "A", "B", "A", "C", "A", "A"]);
    }

    #[test]
    fn test_interleaved_sequence() {
        let wrr = pool(Algorithm::Interleaved, &[("A", 5), ("B", 1), ("C", 1)]);
        assert_eq!(take(&wrr, 7), vec!["A", "A", "A", "A", "A", "B", "C"]);
    }

    #[test]
    fn test_interleaved_uses_gcd_step() {
        let wrr = pool(Algorithm::Interleaved, &[("A", 4), ("B", 2)]);
        assert_eq!(take(&wrr, 6), vec!["A", "A", "B", "A", "A", "B"]);
    }

    #[test]
    fn test_equal_weights_alternate() {
        for algorithm in [Algorithm::Smooth, Algorithm::Interleaved] {
            let wrr = pool(algorithm, &[("A", 1), ("B", 1), ("C", 1)]);
            assert_eq!(take(&wrr, 6), vec!["A", "B", "C", "A", "B", "C"]);
        }
    }

    #[test]
    fn test_empty_pool() {
        let wrr = WeightedRoundRobin::new();
        assert_eq!(wrr.next(), Err(SelectionError::NoDestinations));
        assert_eq!(wrr.stats().failed_selections, 1);

        let wrr = WeightedRoundRobin::with_algorithm(Algorithm::Interleaved);
        assert_eq!(wrr.next(), Err(SelectionError::NoDestinations));
    }

    #[test]
    fn test_empty_url_rejected_and_pool_unchanged() {
        let wrr = pool(Algorithm::Smooth, &[("A", 2), ("B", 1)]);
        let before = take(&wrr, 2);

        assert_eq!(wrr.append_destination("", 3), Err(AppendError::EmptyUrl));
        assert_eq!(wrr.len(), 2);
        // Running state was not reset by the failed append.
        assert_eq!(wrr.next().unwrap(), "A");
        assert_eq!(before, vec!["A", "B"]);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let wrr = WeightedRoundRobin::new();
        assert_eq!(
            wrr.append_destination("http://x", -1),
            Err(AppendError::InvalidWeight { weight: -1 })
        );
        assert!(wrr.is_empty());
    }

    #[test]
    fn test_zero_weight_normalized() {
        let zero = pool(Algorithm::Smooth, &[("http://x", 0), ("http://y", 2)]);
        let one = pool(Algorithm::Smooth, &[("http://x", 1), ("http://y", 2)]);
        assert_eq!(take(&zero, 12), take(&one, 12));
        assert_eq!(zero.destinations()[0].weight, DEFAULT_WEIGHT);
    }

    #[test]
    fn test_append_resets_running_state() {
        let wrr = pool(Algorithm::Interleaved, &[("A", 3), ("B", 1)]);
        take(&wrr, 2);
        wrr.append_destination("C", 1).unwrap();

        let fresh = pool(Algorithm::Interleaved, &[("A", 3), ("B", 1), ("C", 1)]);
        assert_eq!(take(&wrr, 10), take(&fresh, 10));
    }

    #[test]
    fn test_all_zero_weight_guard() {
        let mut state = SelectorState {
            slots: vec![Slot {
                destination: Destination {
                    url: "A".to_string(),
                    weight: 0,
                },
                current: 0,
                selections: 0,
            }],
            cursor: None,
            current_weight: 0,
            failed_selections: 0,
        };
        assert_eq!(state.select_interleaved(), Err(SelectionError::AllZeroWeight));
        assert_eq!(state.select_smooth(), Err(SelectionError::AllZeroWeight));
    }

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(0, 4), 4);
        assert_eq!(gcd(12, 8), 4);
        assert_eq!(gcd(7, 3), 1);
    }

    #[test]
    fn test_stats_track_selections() {
        let wrr = pool(Algorithm::Smooth, &[("A", 2), ("B", 1)]);
        take(&wrr, 6);

        let stats = wrr.stats();
        assert_eq!(stats.algorithm, "smooth");
        assert_eq!(stats.total_selections, 6);
        assert_eq!(stats.destinations[0].selections, 4);
        assert_eq!(stats.destinations[1].selections, 2);
    }

    #[test]
    fn test_concurrent_callers_preserve_ratio() {
        for algorithm in [Algorithm::Smooth, Algorithm::Interleaved] {
            let wrr = Arc::new(pool(algorithm, &[("A", 2), ("B", 1), ("C", 1)]));

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let wrr = Arc::clone(&wrr);
                    std::thread::spawn(move || {
                        let mut counts: HashMap<String, u32> = HashMap::new();
                        for _ in 0..1250 {
                            *counts.entry(wrr.next().unwrap()).or_insert(0) += 1;
                        }
                        counts
                    })
                })
                .collect();

            let mut totals: HashMap<String, u32> = HashMap::new();
            for handle in handles {
                for (url, count) in handle.join().unwrap() {
                    *totals.entry(url).or_insert(0) += count;
                }
            }

            assert_eq!(totals["A"], 5000);
            assert_eq!(totals["B"], 2500);
            assert_eq!(totals["C"], 2500);
            assert_eq!(wrr.stats().total_selections, 10_000);
        }
    }
}
