use std::collections::BTreeMap;

/// Mean of a value per group key.
///
/// Keys are kept in a [`BTreeMap`], so two means fit on the same samples in a
/// different order compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedMean<K> {
    groups: BTreeMap<K, GroupAccumulator>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GroupAccumulator {
    sum: f64,
    count: usize,
}

impl<K> GroupedMean<K>
where
    K: Ord,
{
    /// Accumulates `(key, value)` samples.
    #[must_use]
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut groups = BTreeMap::new();
        for (key, value) in pairs {
            let acc = groups.entry(key).or_insert(GroupAccumulator { sum: 0.0, count: 0 });
            acc.sum += value;
            acc.count += 1;
        }
        Self { groups }
    }

    /// Mean of the group `key`, or `None` if no sample had that key.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<f64> {
        self.groups.get(key).map(GroupAccumulator::mean)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl GroupAccumulator {
    #[expect(clippy::cast_precision_loss)]
    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_means_per_key() {
        let means = GroupedMean::from_pairs([(2, 1.0), (1, 0.0), (2, 0.0), (2, 1.0)]);
        assert_eq!(means.len(), 2);
        assert_eq!(means.get(&1), Some(0.0));
        assert!((means.get(&2).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(means.get(&3), None);
    }

    #[test]
    fn test_empty() {
        let means = GroupedMean::<u32>::from_pairs(std::iter::empty());
        assert!(means.is_empty());
    }
}
