use std::collections::BTreeMap;

/// Indicator → weight mapping shared by the classifier (region signals) and
/// the reconciler (field completeness).
#[derive(Debug, Clone)]
pub struct Weights<K: Ord> {
    weights: BTreeMap<K, f64>,
}

impl<K: Ord + Copy> Weights<K> {
    pub fn new(pairs: impl IntoIterator<Item = (K, f64)>) -> Self {
        Self {
            weights: pairs.into_iter().collect(),
        }
    }

    /// Every indicator weighs the same.
    pub fn uniform(keys: impl IntoIterator<Item = K>, weight: f64) -> Self {
        Self::new(keys.into_iter().map(|k| (k, weight)))
    }

    /// Weight of one indicator; indicators without a weight count for nothing.
    pub fn weight(&self, key: K) -> f64 {
        self.weights.get(&key).copied().unwrap_or(0.0)
    }

    /// Weighted sum of hit counts. Presence signals pass a count of 0 or 1.
    pub fn score(&self, hits: impl IntoIterator<Item = (K, usize)>) -> f64 {
        hits.into_iter()
            .map(|(key, count)| self.weight(key) * count as f64)
            .sum()
    }
}
