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

//! Sparse polynomial strategy over GF(p).
//!
//! A vector is a sparse set of `position -> coefficient` entries read as a
//! polynomial; `bind` is multiplication mod `x^G - 1` (cyclic
//! convolution), `unbind` is correlation with inverted coefficients, and
//! similarity is Jaccard over the occupied positions, so random pairs sit
//! near 0.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use super::{HdcError, HdcStrategy, Thresholds, Vector};

/// Prime modulus of the coefficient field.
const MODULUS: u64 = 101;

pub struct SparsePolynomial {
    /// Created vectors occupy `max(8, geometry / density_divisor)` positions.
    pub density_divisor: usize,
}

impl Default for SparsePolynomial {
    fn default() -> Self {
        SparsePolynomial {
            density_divisor: 64,
        }
    }
}

const THRESHOLDS: Thresholds = Thresholds {
    similarity_threshold: 0.25,
    strong_confidence: 0.50,
    orthogonal_threshold: 0.05,
    query_min_similarity: 0.20,
    proof_min_confidence: 0.40,
    unbind_min_similarity: 0.30,
    unbind_max_candidates: 24,
    csp_heuristic_weight: 0.4,
    validation_required: true,
    fallback_to_symbolic: true,
};

fn unpack<'a>(
    v: &'a Vector,
    op: &'static str,
) -> Result<(&'a BTreeMap<u32, u32>, usize), HdcError> {
    match v {
        Vector::Sparse { coeffs, geometry } => Ok((coeffs, *geometry)),
        _ => Err(HdcError::KindMismatch(op)),
    }
}

fn modpow(mut base: u64, mut exp: u64) -> u64 {
    let mut acc = 1u64;
    base %= MODULUS;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc * base % MODULUS;
        }
        base = base * base % MODULUS;
        exp >>= 1;
    }
    acc
}

/// Multiplicative inverse in GF(p) by Fermat's little theorem.
fn modinv(x: u64) -> u64 {
    modpow(x, MODULUS - 2)
}

/// Keeps the `cap` positions with the most contributions, breaking count
/// ties toward lower positions so the result is deterministic. Zero
/// coefficients (mod p) are dropped first.
fn prune(acc: BTreeMap<u32, (u64, u64)>, cap: usize) -> BTreeMap<u32, u32> {
    let mut entries: Vec<(u32, u64, u64)> = acc
        .into_iter()
        .filter(|(_, (_, coeff))| *coeff % MODULUS != 0)
        .map(|(pos, (count, coeff))| (pos, count, coeff % MODULUS))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    entries.truncate(cap);
    entries
        .into_iter()
        .map(|(pos, _, coeff)| (pos, coeff as u32))
        .collect()
}

impl SparsePolynomial {
    fn density(&self, geometry: usize) -> usize {
        std::cmp::max(8, geometry / self.density_divisor)
    }
}

impl HdcStrategy for SparsePolynomial {
    fn id(&self) -> &'static str {
        "sparse-polynomial"
    }

    fn thresholds(&self) -> Thresholds {
        THRESHOLDS
    }

    fn create_zero(&self, geometry: usize) -> Vector {
        // the constant polynomial 1 is the multiplicative identity
        let mut coeffs = BTreeMap::new();
        coeffs.insert(0, 1);
        Vector::Sparse { coeffs, geometry }
    }

    fn create_random(&self, geometry: usize, seed: u64) -> Vector {
        let mut rng = StdRng::seed_from_u64(seed);
        let density = self.density(geometry).min(geometry.max(1));
        let mut coeffs = BTreeMap::new();
        while coeffs.len() < density {
            let pos = rng.gen_range(0..geometry.max(1) as u32);
            let coeff = rng.gen_range(1..MODULUS as u32);
            coeffs.entry(pos).or_insert(coeff);
        }
        Vector::Sparse { coeffs, geometry }
    }

    fn bind(&self, a: &Vector, b: &Vector) -> Result<Vector, HdcError> {
        let (a_coeffs, a_geom) = unpack(a, "bind")?;
        let (b_coeffs, b_geom) = unpack(b, "bind")?;
        if a_geom != b_geom {
            return Err(HdcError::GeometryMismatch(a_geom, b_geom));
        }
        let g = a_geom as u32;
        let mut acc: BTreeMap<u32, (u64, u64)> = BTreeMap::new();
        for (&i, &ci) in a_coeffs {
            for (&j, &cj) in b_coeffs {
                let pos = (i + j) % g;
                let entry = acc.entry(pos).or_insert((0, 0));
                entry.0 += 1;
                entry.1 = (entry.1 + u64::from(ci) * u64::from(cj)) % MODULUS;
            }
        }
        let cap = std::cmp::max(a_geom / 4, self.density(a_geom));
        Ok(Vector::Sparse {
            coeffs: prune(acc, cap),
            geometry: a_geom,
        })
    }

    fn unbind(&self, c: &Vector, a: &Vector) -> Result<Vector, HdcError> {
        let (c_coeffs, c_geom) = unpack(c, "unbind")?;
        let (a_coeffs, a_geom) = unpack(a, "unbind")?;
        if c_geom != a_geom {
            return Err(HdcError::GeometryMismatch(c_geom, a_geom));
        }
        let g = c_geom as u32;
        let mut acc: BTreeMap<u32, (u64, u64)> = BTreeMap::new();
        for (&k, &ck) in c_coeffs {
            for (&i, &ci) in a_coeffs {
                let pos = (k + g - i) % g;
                let entry = acc.entry(pos).or_insert((0, 0));
                entry.0 += 1;
                entry.1 = (entry.1 + u64::from(ck) * modinv(u64::from(ci))) % MODULUS;
            }
        }
        // the true factor occupies roughly |c| / |a| positions
        let cap = std::cmp::max(
            self.density(c_geom),
            c_coeffs.len() / a_coeffs.len().max(1),
        );
        Ok(Vector::Sparse {
            coeffs: prune(acc, cap),
            geometry: c_geom,
        })
    }

    fn bundle(&self, vs: &[Vector], _tie_break: Option<u64>) -> Result<Vector, HdcError> {
        if vs.is_empty() {
            return Err(HdcError::EmptyBundle);
        }
        if vs.len() == 1 {
            return Ok(vs[0].clone());
        }
        let (_, geometry) = unpack(&vs[0], "bundle")?;
        let mut sums: BTreeMap<u32, u64> = BTreeMap::new();
        for v in vs {
            let (coeffs, geom) = unpack(v, "bundle")?;
            if geom != geometry {
                return Err(HdcError::GeometryMismatch(geometry, geom));
            }
            for (&pos, &coeff) in coeffs {
                *sums.entry(pos).or_insert(0) += u64::from(coeff);
            }
        }
        let coeffs = sums
            .into_iter()
            .filter_map(|(pos, sum)| {
                let c = sum % MODULUS;
                if c == 0 {
                    None
                } else {
                    Some((pos, c as u32))
                }
            })
            .collect();
        Ok(Vector::Sparse { coeffs, geometry })
    }

    fn similarity(&self, a: &Vector, b: &Vector) -> Result<f64, HdcError> {
        let (a_coeffs, a_geom) = unpack(a, "similarity")?;
        let (b_coeffs, b_geom) = unpack(b, "similarity")?;
        if a_geom != b_geom {
            return Err(HdcError::GeometryMismatch(a_geom, b_geom));
        }
        if a_coeffs.is_empty() && b_coeffs.is_empty() {
            return Ok(1.0);
        }
        let intersection = a_coeffs
            .keys()
            .filter(|pos| b_coeffs.contains_key(pos))
            .count();
        let union = a_coeffs.len() + b_coeffs.len() - intersection;
        Ok(intersection as f64 / union as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: usize = 1024;

    #[test]
    fn seeded_construction_is_deterministic() {
        let s = SparsePolynomial::default();
        assert_eq!(s.create_random(G, 5), s.create_random(G, 5));
        assert_ne!(s.create_random(G, 5), s.create_random(G, 6));
    }

    #[test]
    fn created_vectors_are_sparse() {
        let s = SparsePolynomial::default();
        match s.create_random(G, 1) {
            Vector::Sparse { coeffs, .. } => assert_eq!(coeffs.len(), 16),
            _ => panic!("expected sparse vector"),
        }
    }

    #[test]
    fn zero_is_bind_identity() {
        let s = SparsePolynomial::default();
        let a = s.create_random(G, 3);
        let one = s.create_zero(G);
        assert_eq!(s.bind(&a, &one).unwrap(), a);
    }

    #[test]
    fn bind_unbind_roundtrip() {
        let s = SparsePolynomial::default();
        for seed in 0..5 {
            let a = s.create_random(G, seed * 2);
            let b = s.create_random(G, seed * 2 + 1);
            let c = s.bind(&a, &b).unwrap();
            let recovered = s.unbind(&c, &a).unwrap();
            let sim = s.similarity(&recovered, &b).unwrap();
            assert!(
                sim >= THRESHOLDS.unbind_min_similarity,
                "seed {}: {}",
                seed,
                sim
            );
        }
    }

    #[test]
    fn similarity_baseline_near_zero() {
        let s = SparsePolynomial::default();
        let a = s.create_random(G, 1);
        let b = s.create_random(G, 2);
        assert!((s.similarity(&a, &a).unwrap() - 1.0).abs() < 1e-12);
        let sim = s.similarity(&a, &b).unwrap();
        assert!(sim < THRESHOLDS.similarity_threshold);
        assert!(
            (sim - s.similarity(&b, &a).unwrap()).abs() < 1e-12,
            "symmetry"
        );
    }

    #[test]
    fn bundle_keeps_member_positions() {
        let s = SparsePolynomial::default();
        let members: Vec<Vector> = (0..3).map(|i| s.create_random(G, i)).collect();
        let bundled = s.bundle(&members, None).unwrap();
        for m in &members {
            let sim = s.similarity(&bundled, m).unwrap();
            assert!(sim >= THRESHOLDS.similarity_threshold, "{}", sim);
        }
        let one = s.create_random(G, 9);
        assert_eq!(s.bundle(&[one.clone()], None).unwrap(), one);
    }
}
