use crate::core::codec::{QgramCode, QgramCodec};
use std::collections::HashMap;

// Code spaces up to this size are counted in a flat array.
pub const DENSE_LIMIT: u128 = 1 << 22;
// Below this a flat array is cheaper than hashing whatever the window count.
pub const SMALL_DENSE_LIMIT: u128 = 1 << 16;

/// Code → count table. Workers fill one each; the aggregator merges them.
#[derive(Clone, Debug)]
pub enum CountTable {
    Dense(Vec<u64>),
    Sparse(HashMap<QgramCode, u64>),
}

impl CountTable {
    /// Table for about `windows` window counts. Dense only when the code
    /// space is small or the windows would fill a sizable share of it.
    pub fn sized_for(codec: &QgramCodec, windows: u64) -> Self {
        if Self::prefers_dense(codec, windows) {
            CountTable::Dense(vec![0u64; codec.code_space() as usize])
        } else {
            CountTable::Sparse(HashMap::new())
        }
    }

    pub fn prefers_dense(codec: &QgramCodec, windows: u64) -> bool {
        let space = codec.code_space();
        space <= SMALL_DENSE_LIMIT || (space <= DENSE_LIMIT && space <= windows as u128)
    }

    pub fn is_dense(&self) -> bool {
        matches!(self, CountTable::Dense(_))
    }

    pub fn sparse() -> Self {
        CountTable::Sparse(HashMap::new())
    }

    #[inline]
    pub fn add(&mut self, code: QgramCode, weight: u64) {
        match self {
            CountTable::Dense(v) => v[code as usize] += weight,
            CountTable::Sparse(m) => *m.entry(code).or_insert(0) += weight,
        }
    }

    pub fn get(&self, code: QgramCode) -> u64 {
        match self {
            CountTable::Dense(v) => v.get(code as usize).copied().unwrap_or(0),
            CountTable::Sparse(m) => m.get(&code).copied().unwrap_or(0),
        }
    }

    /// Number of codes with a non-zero count.
    pub fn distinct(&self) -> usize {
        match self {
            CountTable::Dense(v) => v.iter().filter(|&&c| c > 0).count(),
            CountTable::Sparse(m) => m.values().filter(|&&c| c > 0).count(),
        }
    }

    pub fn total(&self) -> u64 {
        match self {
            CountTable::Dense(v) => v.iter().sum(),
            CountTable::Sparse(m) => m.values().sum(),
        }
    }

    /// Additive merge; consumes `other`.
    pub fn merge(&mut self, other: CountTable) {
        match (self, other) {
            (CountTable::Dense(a), CountTable::Dense(b)) if a.len() == b.len() => {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
            }
            (this, CountTable::Dense(b)) => {
                for (code, c) in b.into_iter().enumerate() {
                    if c > 0 {
                        this.add(code as QgramCode, c);
                    }
                }
            }
            (this, CountTable::Sparse(b)) => {
                for (code, c) in b {
                    this.add(code, c);
                }
            }
        }
    }

    /// Non-zero `(code, count)` pairs in ascending code order.
    pub fn sorted_entries(&self) -> Vec<(QgramCode, u64)> {
        match self {
            CountTable::Dense(v) => v
                .iter()
                .enumerate()
                .filter(|(_, c)| **c > 0)
                .map(|(code, &c)| (code as QgramCode, c))
                .collect(),
            CountTable::Sparse(m) => {
                let mut out: Vec<(QgramCode, u64)> =
                    m.iter().filter(|(_, c)| **c > 0).map(|(&k, &c)| (k, c)).collect();
                out.sort_unstable_by_key(|e| e.0);
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(u64, u64)]) -> CountTable {
        let mut t = CountTable::sparse();
        for &(k, c) in pairs {
            t.add(k, c);
        }
        t
    }

    #[test]
    fn test_merge_is_commutative() {
        let (a, b, c) = (1u64, 2u64, 3u64);
        let left = table(&[(a, 2), (b, 1)]);
        let right = table(&[(a, 3), (c, 4)]);

        let mut m1 = left.clone();
        m1.merge(right.clone());
        let mut m2 = right;
        m2.merge(left);

        let expected = vec![(a, 5), (b, 1), (c, 4)];
        assert_eq!(m1.sorted_entries(), expected);
        assert_eq!(m2.sorted_entries(), expected);
    }

    #[test]
    fn test_dense_for_small_code_space() {
        let codec = QgramCodec::new(4, 3).unwrap();
        let t = CountTable::sized_for(&codec, 0);
        assert!(matches!(t, CountTable::Dense(ref v) if v.len() == 64));
        let codec = QgramCodec::new(4, 20).unwrap();
        assert!(matches!(CountTable::sized_for(&codec, u64::MAX), CountTable::Sparse(_)));
    }

    #[test]
    fn test_sized_for_picks_sparse_for_few_windows() {
        // 4^11 codes: 32 MiB dense
        let codec = QgramCodec::new(4, 11).unwrap();
        assert!(!CountTable::sized_for(&codec, 10).is_dense());
        assert!(!CountTable::sized_for(&codec, 0).is_dense());
        assert!(CountTable::sized_for(&codec, 1 << 22).is_dense());

        let small = QgramCodec::new(4, 8).unwrap();
        assert!(CountTable::sized_for(&small, 0).is_dense());

        let huge = QgramCodec::new(4, 12).unwrap();
        assert!(!CountTable::sized_for(&huge, u64::MAX).is_dense());
    }

    #[test]
    fn test_mixed_merge() {
        let codec = QgramCodec::new(4, 2).unwrap();
        let mut dense = CountTable::sized_for(&codec, 0);
        dense.add(3, 1);
        dense.add(15, 2);
        let sparse = table(&[(3, 4), (7, 1)]);

        let mut a = dense.clone();
        a.merge(sparse.clone());
        let mut b = sparse;
        b.merge(dense);
        assert_eq!(a.sorted_entries(), vec![(3, 5), (7, 1), (15, 2)]);
        assert_eq!(b.sorted_entries(), a.sorted_entries());
        assert_eq!(a.total(), 8);
        assert_eq!(a.distinct(), 3);
        assert_eq!(a.get(7), 1);
        assert_eq!(a.get(8), 0);
    }
}
