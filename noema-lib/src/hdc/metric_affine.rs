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

//! Metric affine strategies: byte vectors with modular addition as `bind`,
//! component means as `bundle` and `1 - L1/(G*255)` similarity.
//!
//! The elastic variant bundles into chunked means instead of one global
//! mean, trading a larger representation for less superposition noise;
//! its bundle-vs-atomic similarity is the best chunk's similarity.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{HdcError, HdcStrategy, Thresholds, Vector};

pub struct MetricAffine;

pub struct MetricAffineElastic {
    /// Number of member vectors averaged into each chunk.
    pub chunk_size: usize,
}

impl Default for MetricAffineElastic {
    fn default() -> Self {
        MetricAffineElastic { chunk_size: 4 }
    }
}

const THRESHOLDS: Thresholds = Thresholds {
    similarity_threshold: 0.80,
    strong_confidence: 0.88,
    orthogonal_threshold: 0.70,
    query_min_similarity: 0.75,
    proof_min_confidence: 0.85,
    unbind_min_similarity: 0.98,
    unbind_max_candidates: 16,
    csp_heuristic_weight: 0.5,
    validation_required: true,
    fallback_to_symbolic: true,
};

const ELASTIC_THRESHOLDS: Thresholds = Thresholds {
    similarity_threshold: 0.82,
    strong_confidence: 0.90,
    orthogonal_threshold: 0.70,
    query_min_similarity: 0.78,
    proof_min_confidence: 0.86,
    unbind_min_similarity: 0.98,
    unbind_max_candidates: 16,
    csp_heuristic_weight: 0.5,
    validation_required: true,
    fallback_to_symbolic: true,
};

fn unpack<'a>(v: &'a Vector, op: &'static str) -> Result<&'a [u8], HdcError> {
    match v {
        Vector::Bytes { bytes } => Ok(bytes),
        _ => Err(HdcError::KindMismatch(op)),
    }
}

fn create_zero(geometry: usize) -> Vector {
    Vector::Bytes {
        bytes: vec![0; geometry],
    }
}

fn create_random(geometry: usize, seed: u64) -> Vector {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bytes = vec![0u8; geometry];
    rng.fill(&mut bytes[..]);
    Vector::Bytes { bytes }
}

fn bind_bytes(a: &[u8], b: &[u8]) -> Result<Vec<u8>, HdcError> {
    if a.len() != b.len() {
        return Err(HdcError::GeometryMismatch(a.len(), b.len()));
    }
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.wrapping_add(*y))
        .collect())
}

fn unbind_bytes(c: &[u8], a: &[u8]) -> Result<Vec<u8>, HdcError> {
    if c.len() != a.len() {
        return Err(HdcError::GeometryMismatch(c.len(), a.len()));
    }
    Ok(c.iter()
        .zip(a.iter())
        .map(|(x, y)| x.wrapping_sub(*y))
        .collect())
}

fn sim_bytes(a: &[u8], b: &[u8]) -> Result<f64, HdcError> {
    if a.len() != b.len() {
        return Err(HdcError::GeometryMismatch(a.len(), b.len()));
    }
    if a.is_empty() {
        return Ok(1.0);
    }
    let l1: u64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| u64::from(x.abs_diff(*y)))
        .sum();
    Ok(1.0 - l1 as f64 / (a.len() as f64 * 255.0))
}

/// Component mean with a `u16` accumulator. Saturation promotes to `u32`
/// and retries once; the wider accumulator failing too surfaces
/// [`HdcError::BundleOverflow`].
fn mean_bytes(members: &[&[u8]]) -> Result<Vec<u8>, HdcError> {
    let geometry = members[0].len();
    let n = members.len() as u64;

    let narrow = || -> Result<Vec<u8>, HdcError> {
        let mut sums = vec![0u16; geometry];
        for m in members {
            for (s, byte) in sums.iter_mut().zip(m.iter()) {
                *s = s
                    .checked_add(u16::from(*byte))
                    .ok_or(HdcError::BundleOverflow)?;
            }
        }
        Ok(sums.iter().map(|s| (u64::from(*s) / n) as u8).collect())
    };

    match narrow() {
        Ok(bytes) => Ok(bytes),
        Err(HdcError::BundleOverflow) => {
            tracing::warn!(members = members.len(), "bundle accumulator promoted to u32");
            let mut sums = vec![0u32; geometry];
            for m in members {
                for (s, byte) in sums.iter_mut().zip(m.iter()) {
                    *s = s
                        .checked_add(u32::from(*byte))
                        .ok_or(HdcError::BundleOverflow)?;
                }
            }
            Ok(sums.iter().map(|s| (u64::from(*s) / n) as u8).collect())
        }
        Err(e) => Err(e),
    }
}

fn collect_members<'a>(vs: &'a [Vector], op: &'static str) -> Result<Vec<&'a [u8]>, HdcError> {
    let mut members = Vec::with_capacity(vs.len());
    for v in vs {
        members.push(unpack(v, op)?);
    }
    let geometry = members[0].len();
    for m in &members {
        if m.len() != geometry {
            return Err(HdcError::GeometryMismatch(geometry, m.len()));
        }
    }
    Ok(members)
}

impl HdcStrategy for MetricAffine {
    fn id(&self) -> &'static str {
        "metric-affine"
    }

    fn thresholds(&self) -> Thresholds {
        THRESHOLDS
    }

    fn create_zero(&self, geometry: usize) -> Vector {
        create_zero(geometry)
    }

    fn create_random(&self, geometry: usize, seed: u64) -> Vector {
        create_random(geometry, seed)
    }

    fn bind(&self, a: &Vector, b: &Vector) -> Result<Vector, HdcError> {
        Ok(Vector::Bytes {
            bytes: bind_bytes(unpack(a, "bind")?, unpack(b, "bind")?)?,
        })
    }

    fn unbind(&self, c: &Vector, a: &Vector) -> Result<Vector, HdcError> {
        Ok(Vector::Bytes {
            bytes: unbind_bytes(unpack(c, "unbind")?, unpack(a, "unbind")?)?,
        })
    }

    fn bundle(&self, vs: &[Vector], _tie_break: Option<u64>) -> Result<Vector, HdcError> {
        if vs.is_empty() {
            return Err(HdcError::EmptyBundle);
        }
        if vs.len() == 1 {
            return Ok(vs[0].clone());
        }
        let members = collect_members(vs, "bundle")?;
        Ok(Vector::Bytes {
            bytes: mean_bytes(&members)?,
        })
    }

    fn similarity(&self, a: &Vector, b: &Vector) -> Result<f64, HdcError> {
        sim_bytes(unpack(a, "similarity")?, unpack(b, "similarity")?)
    }
}

impl HdcStrategy for MetricAffineElastic {
    fn id(&self) -> &'static str {
        "metric-affine-elastic"
    }

    fn thresholds(&self) -> Thresholds {
        ELASTIC_THRESHOLDS
    }

    fn create_zero(&self, geometry: usize) -> Vector {
        create_zero(geometry)
    }

    fn create_random(&self, geometry: usize, seed: u64) -> Vector {
        create_random(geometry, seed)
    }

    fn bind(&self, a: &Vector, b: &Vector) -> Result<Vector, HdcError> {
        match (a, b) {
            // binding distributes over the chunks
            (Vector::Chunked { chunks }, other) | (other, Vector::Chunked { chunks }) => {
                let rhs = unpack(other, "bind")?;
                let bound = chunks
                    .iter()
                    .map(|c| bind_bytes(c, rhs))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Vector::Chunked { chunks: bound })
            }
            _ => Ok(Vector::Bytes {
                bytes: bind_bytes(unpack(a, "bind")?, unpack(b, "bind")?)?,
            }),
        }
    }

    fn unbind(&self, c: &Vector, a: &Vector) -> Result<Vector, HdcError> {
        match c {
            Vector::Chunked { chunks } => {
                let rhs = unpack(a, "unbind")?;
                let unbound = chunks
                    .iter()
                    .map(|chunk| unbind_bytes(chunk, rhs))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Vector::Chunked { chunks: unbound })
            }
            _ => Ok(Vector::Bytes {
                bytes: unbind_bytes(unpack(c, "unbind")?, unpack(a, "unbind")?)?,
            }),
        }
    }

    fn bundle(&self, vs: &[Vector], _tie_break: Option<u64>) -> Result<Vector, HdcError> {
        if vs.is_empty() {
            return Err(HdcError::EmptyBundle);
        }
        if vs.len() == 1 {
            return Ok(vs[0].clone());
        }
        let members = collect_members(vs, "bundle")?;
        let chunk_size = self.chunk_size.max(1);
        let mut chunks = Vec::with_capacity((members.len() + chunk_size - 1) / chunk_size);
        for group in members.chunks(chunk_size) {
            chunks.push(mean_bytes(group)?);
        }
        Ok(Vector::Chunked { chunks })
    }

    /// Atomic-vs-atomic is plain metric similarity. A chunked bundle
    /// matches an atomic vector through its best chunk, and two bundles
    /// through the best pair over the chunk cross-product.
    fn similarity(&self, a: &Vector, b: &Vector) -> Result<f64, HdcError> {
        fn chunks_of(v: &Vector) -> Result<Vec<&[u8]>, HdcError> {
            match v {
                Vector::Bytes { bytes } => Ok(vec![bytes]),
                Vector::Chunked { chunks } => Ok(chunks.iter().map(|c| c.as_slice()).collect()),
                _ => Err(HdcError::KindMismatch("similarity")),
            }
        }
        let mut best: f64 = 0.0;
        for x in chunks_of(a)? {
            for y in chunks_of(b)? {
                best = best.max(sim_bytes(x, y)?);
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: usize = 512;

    #[test]
    fn bind_unbind_is_exact() {
        let s = MetricAffine;
        let a = s.create_random(G, 1);
        let b = s.create_random(G, 2);
        let c = s.bind(&a, &b).unwrap();
        let recovered = s.unbind(&c, &a).unwrap();
        assert_eq!(recovered, b);
        assert!(s.similarity(&recovered, &b).unwrap() >= THRESHOLDS.unbind_min_similarity);
    }

    #[test]
    fn zero_is_bind_identity() {
        let s = MetricAffine;
        let a = s.create_random(G, 1);
        assert_eq!(s.bind(&a, &s.create_zero(G)).unwrap(), a);
    }

    #[test]
    fn similarity_reflexive_and_symmetric() {
        let s = MetricAffine;
        let a = s.create_random(G, 1);
        let b = s.create_random(G, 2);
        assert!((s.similarity(&a, &a).unwrap() - 1.0).abs() < 1e-12);
        assert!(
            (s.similarity(&a, &b).unwrap() - s.similarity(&b, &a).unwrap()).abs() < 1e-12
        );
    }

    #[test]
    fn bundle_mean_is_between_members() {
        let s = MetricAffine;
        let members: Vec<Vector> = (0..8).map(|i| s.create_random(G, i)).collect();
        let bundled = s.bundle(&members, None).unwrap();
        let stranger = s.create_random(G, 1000);
        for m in &members {
            assert!(
                s.similarity(&bundled, m).unwrap() > s.similarity(&stranger, m).unwrap()
            );
        }
    }

    #[test]
    fn large_bundle_promotes_accumulator() {
        // 300 members overflow a u16 component accumulator (300 * 255 >
        // 65535) and must succeed through the promoted u32 path
        let s = MetricAffine;
        let members: Vec<Vector> = (0..300).map(|i| s.create_random(G, i)).collect();
        assert!(s.bundle(&members, None).is_ok());
    }

    #[test]
    fn elastic_bundle_keeps_chunks() {
        let s = MetricAffineElastic { chunk_size: 2 };
        let members: Vec<Vector> = (0..6).map(|i| s.create_random(G, i)).collect();
        let bundled = s.bundle(&members, None).unwrap();
        match &bundled {
            Vector::Chunked { chunks } => assert_eq!(chunks.len(), 3),
            _ => panic!("expected chunked bundle"),
        }
        // a two-member mean is much closer to its members than any
        // unrelated vector is
        let stranger = s.create_random(G, 1000);
        for m in &members {
            let sim = s.similarity(&bundled, m).unwrap();
            assert!(sim > 0.78, "{}", sim);
            assert!(sim > s.similarity(&bundled, &stranger).unwrap());
        }
    }

    #[test]
    fn elastic_bundle_of_one_is_identity() {
        let s = MetricAffineElastic::default();
        let a = s.create_random(G, 3);
        assert_eq!(s.bundle(&[a.clone()], None).unwrap(), a);
    }
}
