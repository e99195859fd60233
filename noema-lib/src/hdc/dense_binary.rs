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

//! Dense binary strategy: bit-packed vectors, XOR binding, majority-vote
//! bundling, normalised Hamming similarity. Random pairs sit near 0.5.
//! This is the preferred default strategy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{HdcError, HdcStrategy, Thresholds, Vector};

pub struct DenseBinary;

const THRESHOLDS: Thresholds = Thresholds {
    similarity_threshold: 0.65,
    strong_confidence: 0.75,
    orthogonal_threshold: 0.55,
    query_min_similarity: 0.60,
    proof_min_confidence: 0.70,
    unbind_min_similarity: 0.90,
    unbind_max_candidates: 16,
    csp_heuristic_weight: 0.5,
    validation_required: true,
    fallback_to_symbolic: true,
};

fn blocks_for(geometry: usize) -> usize {
    (geometry + 63) / 64
}

/// Zeroes the bits past `geometry` in the last block so equality and
/// popcounts stay well-defined.
fn mask_tail(bits: &mut [u64], geometry: usize) {
    let rem = geometry % 64;
    if rem != 0 {
        if let Some(last) = bits.last_mut() {
            *last &= (1u64 << rem) - 1;
        }
    }
}

fn unpack(v: &Vector, op: &'static str) -> Result<(Vec<u64>, usize), HdcError> {
    match v {
        Vector::Dense { bits, geometry } => Ok((bits.clone(), *geometry)),
        _ => Err(HdcError::KindMismatch(op)),
    }
}

impl HdcStrategy for DenseBinary {
    fn id(&self) -> &'static str {
        "dense-binary"
    }

    fn thresholds(&self) -> Thresholds {
        THRESHOLDS
    }

    fn create_zero(&self, geometry: usize) -> Vector {
        Vector::Dense {
            bits: vec![0; blocks_for(geometry)],
            geometry,
        }
    }

    fn create_random(&self, geometry: usize, seed: u64) -> Vector {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut bits: Vec<u64> = (0..blocks_for(geometry)).map(|_| rng.gen()).collect();
        mask_tail(&mut bits, geometry);
        Vector::Dense { bits, geometry }
    }

    fn bind(&self, a: &Vector, b: &Vector) -> Result<Vector, HdcError> {
        let (a_bits, a_geom) = unpack(a, "bind")?;
        let (b_bits, b_geom) = unpack(b, "bind")?;
        if a_geom != b_geom {
            return Err(HdcError::GeometryMismatch(a_geom, b_geom));
        }
        let bits = a_bits
            .iter()
            .zip(b_bits.iter())
            .map(|(x, y)| x ^ y)
            .collect();
        Ok(Vector::Dense {
            bits,
            geometry: a_geom,
        })
    }

    fn unbind(&self, c: &Vector, a: &Vector) -> Result<Vector, HdcError> {
        // XOR is an involution
        self.bind(c, a)
    }

    fn bundle(&self, vs: &[Vector], tie_break: Option<u64>) -> Result<Vector, HdcError> {
        if vs.is_empty() {
            return Err(HdcError::EmptyBundle);
        }
        if vs.len() == 1 {
            return Ok(vs[0].clone());
        }
        let (_, geometry) = unpack(&vs[0], "bundle")?;
        let mut counts = vec![0i32; geometry];
        for v in vs {
            let (bits, geom) = unpack(v, "bundle")?;
            if geom != geometry {
                return Err(HdcError::GeometryMismatch(geometry, geom));
            }
            for (i, count) in counts.iter_mut().enumerate() {
                if bits[i / 64] >> (i % 64) & 1 == 1 {
                    *count += 1;
                }
            }
        }
        let half = vs.len() as i32;
        let mut tie_rng = StdRng::seed_from_u64(tie_break.unwrap_or(0));
        let mut bits = vec![0u64; blocks_for(geometry)];
        for (i, count) in counts.iter().enumerate() {
            let set = match (2 * count).cmp(&half) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => tie_rng.gen(),
            };
            if set {
                bits[i / 64] |= 1 << (i % 64);
            }
        }
        Ok(Vector::Dense { bits, geometry })
    }

    fn similarity(&self, a: &Vector, b: &Vector) -> Result<f64, HdcError> {
        let (a_bits, a_geom) = unpack(a, "similarity")?;
        let (b_bits, b_geom) = unpack(b, "similarity")?;
        if a_geom != b_geom {
            return Err(HdcError::GeometryMismatch(a_geom, b_geom));
        }
        if a_geom == 0 {
            return Ok(1.0);
        }
        let distance: u32 = a_bits
            .iter()
            .zip(b_bits.iter())
            .map(|(x, y)| (x ^ y).count_ones())
            .sum();
        Ok(1.0 - f64::from(distance) / a_geom as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: usize = 1024;

    #[test]
    fn seeded_construction_is_deterministic() {
        let s = DenseBinary;
        assert_eq!(s.create_random(G, 7), s.create_random(G, 7));
        assert_ne!(s.create_random(G, 7), s.create_random(G, 8));
        assert_eq!(
            s.create_from_name("Dog", G, None),
            s.create_from_name("Dog", G, None)
        );
    }

    #[test]
    fn bind_unbind_roundtrip() {
        let s = DenseBinary;
        let a = s.create_from_name("Dog", G, None);
        let b = s.create_from_name("animal", G, None);
        let c = s.bind(&a, &b).unwrap();
        let recovered = s.unbind(&c, &a).unwrap();
        // XOR binding recovers exactly
        assert_eq!(recovered, b);
        assert!(s.similarity(&recovered, &b).unwrap() >= THRESHOLDS.unbind_min_similarity);
    }

    #[test]
    fn zero_is_bind_identity() {
        let s = DenseBinary;
        let a = s.create_random(G, 3);
        let z = s.create_zero(G);
        assert_eq!(s.bind(&a, &z).unwrap(), a);
    }

    #[test]
    fn similarity_properties() {
        let s = DenseBinary;
        let a = s.create_random(G, 1);
        let b = s.create_random(G, 2);
        assert!((s.similarity(&a, &a).unwrap() - 1.0).abs() < 1e-12);
        let ab = s.similarity(&a, &b).unwrap();
        let ba = s.similarity(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-12);
        // random pair sits near the 0.5 baseline
        assert!((ab - 0.5).abs() < 0.1);
    }

    #[test]
    fn bundle_majority_resembles_members() {
        let s = DenseBinary;
        let members: Vec<Vector> = (0..5).map(|i| s.create_random(G, i)).collect();
        let bundled = s.bundle(&members, Some(42)).unwrap();
        let stranger = s.create_random(G, 99);
        for m in &members {
            let sim_member = s.similarity(&bundled, m).unwrap();
            let sim_stranger = s.similarity(&bundled, &stranger).unwrap();
            assert!(sim_member > sim_stranger);
            assert!(sim_member > THRESHOLDS.similarity_threshold);
        }
    }

    #[test]
    fn bundle_of_one_is_identity() {
        let s = DenseBinary;
        let a = s.create_random(G, 11);
        assert_eq!(s.bundle(&[a.clone()], None).unwrap(), a);
        assert!(matches!(s.bundle(&[], None), Err(HdcError::EmptyBundle)));
    }

    #[test]
    fn tie_break_is_deterministic() {
        let s = DenseBinary;
        let vs: Vec<Vector> = (0..4).map(|i| s.create_random(G, i)).collect();
        assert_eq!(
            s.bundle(&vs, Some(5)).unwrap(),
            s.bundle(&vs, Some(5)).unwrap()
        );
    }

    #[test]
    fn non_multiple_of_64_geometry() {
        let s = DenseBinary;
        let a = s.create_random(100, 1);
        assert_eq!(a.geometry(), 100);
        assert!((s.similarity(&a, &a).unwrap() - 1.0).abs() < 1e-12);
    }
}
