// Copyright 2024 The Noema Authors

// This file is part of Noema.

// Noema is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Noema is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Noema.  If not, see <https://www.gnu.org/licenses/>.

//! Exact symbolic strategy.
//!
//! Vectors are sorted multisets of interned symbol ids: `bind` is multiset
//! union, `unbind` multiset difference, similarity is multiset Jaccard.
//! The reasoner uses this algebra when it needs to distinguish symbols
//! canonically; exact vectors are session-local and never memoised across
//! sessions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{fnv1a64, HdcError, HdcStrategy, Thresholds, Vector};

pub struct Exact;

const THRESHOLDS: Thresholds = Thresholds {
    similarity_threshold: 0.99,
    strong_confidence: 0.99,
    orthogonal_threshold: 0.01,
    query_min_similarity: 0.99,
    proof_min_confidence: 0.99,
    unbind_min_similarity: 1.0,
    unbind_max_candidates: 1,
    csp_heuristic_weight: 0.0,
    validation_required: true,
    fallback_to_symbolic: true,
};

fn unpack<'a>(v: &'a Vector, op: &'static str) -> Result<&'a [u64], HdcError> {
    match v {
        Vector::Exact { ids } => Ok(ids),
        _ => Err(HdcError::KindMismatch(op)),
    }
}

impl HdcStrategy for Exact {
    fn id(&self) -> &'static str {
        "exact"
    }

    fn thresholds(&self) -> Thresholds {
        THRESHOLDS
    }

    fn create_zero(&self, _geometry: usize) -> Vector {
        // the empty multiset is the union identity
        Vector::Exact { ids: Vec::new() }
    }

    fn create_random(&self, _geometry: usize, seed: u64) -> Vector {
        let mut rng = StdRng::seed_from_u64(seed);
        Vector::Exact {
            ids: vec![rng.gen()],
        }
    }

    fn create_from_name(&self, name: &str, _geometry: usize, theory_id: Option<&str>) -> Vector {
        let mut key = name.to_string();
        if let Some(t) = theory_id {
            key.push('\u{1}');
            key.push_str(t);
        }
        Vector::Exact {
            ids: vec![fnv1a64(key.as_bytes())],
        }
    }

    fn bind(&self, a: &Vector, b: &Vector) -> Result<Vector, HdcError> {
        let mut ids = unpack(a, "bind")?.to_vec();
        ids.extend_from_slice(unpack(b, "bind")?);
        ids.sort_unstable();
        Ok(Vector::Exact { ids })
    }

    fn unbind(&self, c: &Vector, a: &Vector) -> Result<Vector, HdcError> {
        let mut ids = unpack(c, "unbind")?.to_vec();
        for id in unpack(a, "unbind")? {
            if let Some(at) = ids.iter().position(|x| x == id) {
                ids.remove(at);
            }
        }
        Ok(Vector::Exact { ids })
    }

    fn bundle(&self, vs: &[Vector], _tie_break: Option<u64>) -> Result<Vector, HdcError> {
        if vs.is_empty() {
            return Err(HdcError::EmptyBundle);
        }
        if vs.len() == 1 {
            return Ok(vs[0].clone());
        }
        let mut ids = Vec::new();
        for v in vs {
            ids.extend_from_slice(unpack(v, "bundle")?);
        }
        ids.sort_unstable();
        Ok(Vector::Exact { ids })
    }

    fn similarity(&self, a: &Vector, b: &Vector) -> Result<f64, HdcError> {
        let a = unpack(a, "similarity")?;
        let b = unpack(b, "similarity")?;
        if a.is_empty() && b.is_empty() {
            return Ok(1.0);
        }
        // multiset Jaccard over two sorted id lists
        let (mut i, mut j) = (0, 0);
        let mut intersection = 0usize;
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Equal => {
                    intersection += 1;
                    i += 1;
                    j += 1;
                }
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
            }
        }
        let union = a.len() + b.len() - intersection;
        Ok(intersection as f64 / union as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_unbind_recovers_exactly() {
        let s = Exact;
        let a = s.create_from_name("Dog", 0, None);
        let b = s.create_from_name("animal", 0, None);
        let c = s.bind(&a, &b).unwrap();
        assert_eq!(s.unbind(&c, &a).unwrap(), b);
        assert!((s.similarity(&s.unbind(&c, &a).unwrap(), &b).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn distinct_names_are_orthogonal() {
        let s = Exact;
        let a = s.create_from_name("Dog", 0, None);
        let b = s.create_from_name("Cat", 0, None);
        assert_eq!(s.similarity(&a, &b).unwrap(), 0.0);
        assert_eq!(s.similarity(&a, &a).unwrap(), 1.0);
    }

    #[test]
    fn bind_is_commutative_via_sorting() {
        let s = Exact;
        let a = s.create_from_name("Dog", 0, None);
        let b = s.create_from_name("animal", 0, None);
        assert_eq!(s.bind(&a, &b).unwrap(), s.bind(&b, &a).unwrap());
    }

    #[test]
    fn zero_is_bind_identity() {
        let s = Exact;
        let a = s.create_from_name("Dog", 0, None);
        assert_eq!(s.bind(&a, &s.create_zero(0)).unwrap(), a);
    }
}
