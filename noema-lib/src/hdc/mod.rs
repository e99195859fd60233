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

//! Hyperdimensional vector strategies.
//!
//! A strategy is an algebra over high-dimensional vectors: deterministic
//! construction from names, `bind`/`unbind`, `bundle` superposition and a
//! similarity measure, together with the confidence thresholds the
//! reasoner consults. Strategies are data; dispatch is through the
//! [`HdcStrategy`] trait object held by a session.

mod dense_binary;
mod exact;
mod metric_affine;
mod sparse_polynomial;

pub use dense_binary::DenseBinary;
pub use exact::Exact;
pub use metric_affine::{MetricAffine, MetricAffineElastic};
pub use sparse_polynomial::SparsePolynomial;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// A vector value. Each strategy produces and consumes one variant; mixing
/// variants across strategies is a caller error reported as
/// [`HdcError::KindMismatch`].
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Vector {
    /// Bit-packed binary vector of `geometry` bits.
    Dense { bits: Vec<u64>, geometry: usize },
    /// Sparse polynomial over GF(p): position -> non-zero coefficient.
    Sparse {
        coeffs: BTreeMap<u32, u32>,
        geometry: usize,
    },
    /// Byte vector of `len = geometry` components.
    Bytes { bytes: Vec<u8> },
    /// Chunked-mean bundle produced by the elastic metric strategy: each
    /// chunk is a byte vector of the full geometry.
    Chunked { chunks: Vec<Vec<u8>> },
    /// Symbolic multiset of interned symbol ids, kept sorted.
    Exact { ids: Vec<u64> },
}

impl Vector {
    pub fn geometry(&self) -> usize {
        match self {
            Vector::Dense { geometry, .. } => *geometry,
            Vector::Sparse { geometry, .. } => *geometry,
            Vector::Bytes { bytes } => bytes.len(),
            Vector::Chunked { chunks } => chunks.first().map(|c| c.len()).unwrap_or(0),
            Vector::Exact { .. } => 0,
        }
    }

    pub fn equals(&self, other: &Vector) -> bool {
        self == other
    }

    /// Round-trippable textual form.
    pub fn serialize(&self) -> String {
        // the enum has no map keys that can fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn deserialize(text: &str) -> Result<Vector, HdcError> {
        serde_json::from_str(text).map_err(|e| HdcError::Serde(e.to_string()))
    }
}

/// Per-strategy confidence thresholds. The reasoner never hard-codes
/// these; it always asks the active strategy.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Thresholds {
    pub similarity_threshold: f64,
    pub strong_confidence: f64,
    pub orthogonal_threshold: f64,
    pub query_min_similarity: f64,
    pub proof_min_confidence: f64,
    pub unbind_min_similarity: f64,
    pub unbind_max_candidates: usize,
    pub csp_heuristic_weight: f64,
    pub validation_required: bool,
    pub fallback_to_symbolic: bool,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HdcError {
    #[error("geometry mismatch: {0} vs {1}")]
    GeometryMismatch(usize, usize),
    #[error("incompatible vector kind for {0}")]
    KindMismatch(&'static str),
    #[error("bundle_overflow")]
    BundleOverflow,
    #[error("cannot bundle an empty list")]
    EmptyBundle,
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("strategy already registered: {0}")]
    DuplicateStrategy(String),
    #[error("vector serialization failed: {0}")]
    Serde(String),
}

pub trait HdcStrategy: Send + Sync {
    fn id(&self) -> &'static str;

    fn thresholds(&self) -> Thresholds;

    /// The identity under `bind`, when the algebra has one.
    fn create_zero(&self, geometry: usize) -> Vector;

    /// Seeded construction: the same seed always yields the same vector.
    fn create_random(&self, geometry: usize, seed: u64) -> Vector;

    /// Deterministic hash-seeded construction, stable across runs for
    /// identical `(name, geometry, theory_id)`.
    fn create_from_name(&self, name: &str, geometry: usize, theory_id: Option<&str>) -> Vector {
        let mut key = String::with_capacity(self.id().len() + name.len() + 8);
        key.push_str(self.id());
        key.push('\u{1}');
        key.push_str(name);
        if let Some(t) = theory_id {
            key.push('\u{1}');
            key.push_str(t);
        }
        self.create_random(geometry, fnv1a64(key.as_bytes()))
    }

    fn bind(&self, a: &Vector, b: &Vector) -> Result<Vector, HdcError>;

    /// Approximate inverse of [`bind`](HdcStrategy::bind):
    /// `similarity(unbind(bind(a, b), a), b)` stays above the strategy's
    /// `unbind_min_similarity`.
    fn unbind(&self, c: &Vector, a: &Vector) -> Result<Vector, HdcError>;

    /// Superposition. A single-element list returns that vector unchanged;
    /// the result gets noisier as the list grows.
    fn bundle(&self, vs: &[Vector], tie_break: Option<u64>) -> Result<Vector, HdcError>;

    /// Reflexive (= 1), symmetric similarity in `[0, 1]`.
    fn similarity(&self, a: &Vector, b: &Vector) -> Result<f64, HdcError>;
}

/// 64-bit FNV-1a. Used to derive seeds from names so that vectors are
/// stable across processes, which `std`'s hasher does not guarantee.
pub(crate) fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Identifier of the preferred default strategy.
pub const DEFAULT_STRATEGY: &str = "dense-binary";

/// An explicit, injectable strategy registry. [`global`] offers a shared
/// default instance for hosts that do not need injection.
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn HdcStrategy>>,
}

impl StrategyRegistry {
    pub fn empty() -> StrategyRegistry {
        StrategyRegistry {
            strategies: HashMap::new(),
        }
    }

    /// A registry pre-loaded with the five built-in strategies.
    pub fn with_builtins() -> StrategyRegistry {
        let mut r = StrategyRegistry::empty();
        // the built-in set is fixed; registration cannot collide
        let _ = r.register(Arc::new(DenseBinary));
        let _ = r.register(Arc::new(SparsePolynomial::default()));
        let _ = r.register(Arc::new(MetricAffine));
        let _ = r.register(Arc::new(MetricAffineElastic::default()));
        let _ = r.register(Arc::new(Exact));
        r
    }

    pub fn register(&mut self, strategy: Arc<dyn HdcStrategy>) -> Result<(), HdcError> {
        let id = strategy.id().to_string();
        if self.strategies.contains_key(&id) {
            return Err(HdcError::DuplicateStrategy(id));
        }
        self.strategies.insert(id, strategy);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn HdcStrategy>, HdcError> {
        self.strategies
            .get(id)
            .cloned()
            .ok_or_else(|| HdcError::UnknownStrategy(id.to_string()))
    }

    pub fn get_default(&self) -> Result<Arc<dyn HdcStrategy>, HdcError> {
        self.get(DEFAULT_STRATEGY)
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.strategies.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_REGISTRY: RwLock<StrategyRegistry> =
        RwLock::new(StrategyRegistry::with_builtins());
}

/// Looks up a strategy in the shared registry.
pub fn global_get(id: &str) -> Result<Arc<dyn HdcStrategy>, HdcError> {
    GLOBAL_REGISTRY
        .read()
        .map_err(|_| HdcError::UnknownStrategy(id.to_string()))?
        .get(id)
}

/// Registers a strategy in the shared registry. Fails on duplicates.
pub fn global_register(strategy: Arc<dyn HdcStrategy>) -> Result<(), HdcError> {
    let id = strategy.id().to_string();
    GLOBAL_REGISTRY
        .write()
        .map_err(|_| HdcError::DuplicateStrategy(id))?
        .register(strategy)
}

/// Lists the shared registry's strategy ids.
pub fn global_list() -> Vec<String> {
    GLOBAL_REGISTRY
        .read()
        .map(|r| r.list())
        .unwrap_or_default()
}
