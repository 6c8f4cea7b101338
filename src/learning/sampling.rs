use rand::Rng;

use crate::learning::codec::CountMap;

/// Draw a key with probability proportional to its count. `None` when every count is zero.
pub fn weighted_pick<'a, R: Rng + ?Sized>(map: &'a CountMap, rng: &mut R) -> Option<&'a str> {
    let total = map.values().fold(0u64, |acc, c| acc.saturating_add(*c));
    if total == 0 {
        return None;
    }
    let mut target = rng.random_range(0..total);
    for (key, count) in map {
        if target < *count {
            return Some(key.as_str());
        }
        target -= count;
    }
    None
}

/// Flattened weighted pool: each entry appears with multiplicity equal to its weight.
///
/// The running total saturates at `u64::MAX`; entries past that point keep only the
/// headroom left, so draws stay in range whatever the stored counts are.
#[derive(Debug, Default)]
pub struct WeightedPool {
    entries: Vec<(String, u64)>,
    total: u64,
}

impl WeightedPool {
    pub fn from_counts(map: &CountMap) -> Self {
        let mut pool = Self::default();
        for (key, count) in map {
            pool.push(key.clone(), *count);
        }
        pool
    }

    pub fn push(&mut self, key: String, weight: u64) {
        let weight = weight.min(u64::MAX - self.total);
        if weight == 0 {
            return;
        }
        self.total += weight;
        self.entries.push((key, weight));
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        if self.total == 0 {
            return None;
        }
        let mut target = rng.random_range(0..self.total);
        for (key, weight) in &self.entries {
            if target < *weight {
                return Some(key.as_str());
            }
            target -= weight;
        }
        None
    }
}

/// Uniform choice among the keys of a map.
pub fn uniform_key<'a, V, R: Rng + ?Sized>(
    map: &'a std::collections::HashMap<String, V>,
    rng: &mut R,
) -> Option<&'a str> {
    if map.is_empty() {
        return None;
    }
    let i = rng.random_range(0..map.len());
    map.keys().nth(i).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_weighted_pick_respects_weights() {
        let mut map = CountMap::new();
        map.insert("heavy".into(), 99);
        map.insert("light".into(), 1);
        let mut rng = StdRng::seed_from_u64(11);
        let heavy = (0..2000)
            .filter(|_| weighted_pick(&map, &mut rng) == Some("heavy"))
            .count();
        assert!(heavy > 1800);
    }

    #[test]
    fn test_empty_and_zero_maps() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut map = CountMap::new();
        assert!(weighted_pick(&map, &mut rng).is_none());
        map.insert("zero".into(), 0);
        assert!(weighted_pick(&map, &mut rng).is_none());
        assert!(WeightedPool::from_counts(&map).is_empty());
    }

    #[test]
    fn test_extreme_counts_saturate() {
        let mut map = CountMap::new();
        map.insert("abandon".into(), u64::MAX);
        map.insert("zoo".into(), 5);
        map.insert("ability".into(), u64::MAX - 1);
        let pool = WeightedPool::from_counts(&map);
        assert_eq!(pool.total(), u64::MAX);

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let key = weighted_pick(&map, &mut rng).unwrap();
            assert!(map.contains_key(key));
            assert!(pool.pick(&mut rng).is_some());
        }
    }
}
