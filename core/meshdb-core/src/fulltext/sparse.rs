//! Sparse vectors keyed by term/dimension id.

use std::collections::BTreeMap;

/// Sparse f32 vector. Unset dimensions are zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: BTreeMap<u32, f32>,
}

impl SparseVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, dim: u32, value: f32) {
        if value == 0.0 {
            self.entries.remove(&dim);
        } else {
            self.entries.insert(dim, value);
        }
    }

    pub fn get(&self, dim: u32) -> f32 {
        self.entries.get(&dim).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        // walk the smaller map
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .entries
            .iter()
            .map(|(dim, v)| v * large.get(*dim))
            .sum()
    }

    pub fn norm(&self) -> f32 {
        self.entries.values().map(|v| v * v).sum::<f32>().sqrt()
    }

    pub fn cosine_similarity(&self, other: &SparseVector) -> f32 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            0.0
        } else {
            self.dot(other) / denom
        }
    }

    /// Scale to unit length. A zero vector stays zero.
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for value in self.entries.values_mut() {
                *value /= norm;
            }
        }
    }

    /// The `k` largest entries by value, descending.
    pub fn top_k(&self, k: usize) -> Vec<(u32, f32)> {
        let mut entries: Vec<(u32, f32)> = self.entries.iter().map(|(d, v)| (*d, *v)).collect();
        entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(k);
        entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.entries.iter().map(|(d, v)| (*d, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(pairs: &[(u32, f32)]) -> SparseVector {
        let mut v = SparseVector::new();
        for (d, x) in pairs {
            v.set(*d, *x);
        }
        v
    }

    #[test]
    fn set_get_and_zero_removal() {
        let mut v = SparseVector::new();
        v.set(3, 1.5);
        assert_eq!(v.get(3), 1.5);
        assert_eq!(v.get(4), 0.0);
        v.set(3, 0.0);
        assert!(v.is_empty());
    }

    #[test]
    fn dot_product() {
        let a = vec_of(&[(0, 1.0), (2, 2.0)]);
        let b = vec_of(&[(2, 3.0), (5, 4.0)]);
        assert_eq!(a.dot(&b), 6.0);
        assert_eq!(b.dot(&a), 6.0);
    }

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let a = vec_of(&[(0, 1.0), (1, 2.0)]);
        let b = vec_of(&[(0, 2.0), (1, 4.0)]);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        let a = vec_of(&[(0, 1.0)]);
        assert_eq!(a.cosine_similarity(&SparseVector::new()), 0.0);
    }

    #[test]
    fn normalize_produces_unit_length() {
        let mut v = vec_of(&[(0, 3.0), (1, 4.0)]);
        v.normalize();
        assert!((v.norm() - 1.0).abs() < 1e-6);
        assert!((v.get(0) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn top_k_orders_descending() {
        let v = vec_of(&[(0, 0.5), (1, 2.0), (2, 1.0)]);
        assert_eq!(v.top_k(2), vec![(1, 2.0), (2, 1.0)]);
        assert_eq!(v.top_k(10).len(), 3);
    }

    #[test]
    fn clone_is_independent() {
        let v = vec_of(&[(0, 1.0)]);
        let mut copy = v.clone();
        copy.set(0, 9.0);
        assert_eq!(v.get(0), 1.0);
    }
}
