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

//! The theory stack: an ordered overlay of deltas over the base store.
//!
//! Writes always go to the top layer; reads walk the layers top-down, so
//! a hypothetical layer can shadow (or negate) base facts without
//! touching them. Popping a layer discards exactly its delta.

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::store::{ConceptStore, Diamond, FactKey};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TheoryError {
    #[error("layer {0} is readonly")]
    ReadonlyLayer(String),
    #[error("layer depth limit {0} exceeded")]
    LayerDepthExceeded(usize),
    #[error("the base layer cannot be popped")]
    CannotPopBase,
}

/// Override of one diamond dimension, applied during [`TheoryStack::compose`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DimOverride {
    pub dim: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub radius: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
enum DeltaEntry {
    Assert { existence: i8 },
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TheoryLayer {
    pub id: String,
    pub readonly: bool,
    pub depth: usize,
    delta: HashMap<FactKey, DeltaEntry>,
    /// Keys in first-write order, for deterministic enumeration.
    order: Vec<FactKey>,
    pub dim_overrides: Vec<DimOverride>,
}

impl TheoryLayer {
    fn new(id: String, depth: usize, readonly: bool) -> TheoryLayer {
        TheoryLayer {
            id,
            readonly,
            depth,
            delta: HashMap::new(),
            order: Vec::new(),
            dim_overrides: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.delta.is_empty()
    }

    pub fn fact_count(&self) -> usize {
        self.delta.len()
    }

    fn write(&mut self, key: FactKey, entry: DeltaEntry) {
        match self.delta.insert(key.clone(), entry) {
            Some(_) => {}
            None => self.order.push(key),
        }
    }
}

/// A fact as seen through the composed stack view.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveFact {
    pub key: FactKey,
    pub existence: i8,
    /// `None` when the fact comes from the base store.
    pub layer: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LayerInfo {
    pub id: String,
    pub depth: usize,
    pub readonly: bool,
    pub fact_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct DimConflict {
    pub dim: usize,
    pub lo: f64,
    pub hi: f64,
}

pub struct TheoryStack {
    layers: Vec<TheoryLayer>,
    max_depth: usize,
    next_layer: u32,
}

impl TheoryStack {
    pub fn new(max_depth: usize) -> TheoryStack {
        TheoryStack {
            layers: vec![TheoryLayer::new("base".to_string(), 0, false)],
            max_depth,
            next_layer: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn is_base_only(&self) -> bool {
        self.layers.len() == 1
    }

    pub fn top(&self) -> &TheoryLayer {
        // the stack is never empty
        self.layers.last().expect("stack has a base layer")
    }

    pub fn top_id(&self) -> Option<&str> {
        if self.is_base_only() {
            None
        } else {
            Some(&self.top().id)
        }
    }

    pub fn top_mut(&mut self) -> &mut TheoryLayer {
        self.layers.last_mut().expect("stack has a base layer")
    }

    pub fn push(&mut self, id: Option<String>, readonly: bool) -> Result<&TheoryLayer, TheoryError> {
        if self.layers.len() >= self.max_depth {
            return Err(TheoryError::LayerDepthExceeded(self.max_depth));
        }
        self.next_layer += 1;
        let id = id.unwrap_or_else(|| format!("layer-{}", self.next_layer));
        let depth = self.layers.len();
        debug!(layer = %id, depth, "theory layer pushed");
        self.layers.push(TheoryLayer::new(id, depth, readonly));
        Ok(self.top())
    }

    /// Discards the top layer and its delta.
    pub fn pop(&mut self) -> Result<TheoryLayer, TheoryError> {
        if self.is_base_only() {
            return Err(TheoryError::CannotPopBase);
        }
        let layer = self.layers.pop().expect("checked non-base");
        debug!(layer = %layer.id, "theory layer popped");
        Ok(layer)
    }

    /// Folds the top layer's delta into its parent, then removes it. When
    /// the parent is the base, the delta lands in the store.
    pub fn commit(&mut self, store: &mut ConceptStore) -> Result<(), TheoryError> {
        if self.is_base_only() {
            return Err(TheoryError::CannotPopBase);
        }
        let layer = self.layers.pop().expect("checked non-base");
        if self.is_base_only() {
            for key in &layer.order {
                match &layer.delta[key] {
                    DeltaEntry::Assert { existence } => {
                        store.add_fact(key.clone(), *existence);
                    }
                    DeltaEntry::Delete => {
                        store.remove_fact_by_key(key);
                    }
                }
            }
        } else {
            let parent = self.top_mut();
            for key in layer.order {
                let entry = layer.delta[&key].clone();
                parent.write(key, entry);
            }
        }
        Ok(())
    }

    fn writable_top(&mut self) -> Result<&mut TheoryLayer, TheoryError> {
        let top = self.layers.last_mut().expect("stack has a base layer");
        if top.readonly {
            return Err(TheoryError::ReadonlyLayer(top.id.clone()));
        }
        Ok(top)
    }

    /// Asserts into the top layer, or directly into the store when only
    /// the base is on the stack. Existence stays monotone per layer.
    pub fn assert_fact(
        &mut self,
        store: &mut ConceptStore,
        key: FactKey,
        existence: i8,
    ) -> Result<(), TheoryError> {
        if self.is_base_only() {
            self.writable_top()?;
            store.add_fact(key, existence);
            return Ok(());
        }
        let top = self.writable_top()?;
        let level = match top.delta.get(&key) {
            Some(DeltaEntry::Assert { existence: old }) => (*old).max(existence),
            _ => existence,
        };
        top.write(key, DeltaEntry::Assert { existence: level });
        Ok(())
    }

    /// Soft-deletes through the view: in the base this is a store
    /// deletion, in a layer it is a shadowing marker.
    pub fn retract_fact(
        &mut self,
        store: &mut ConceptStore,
        key: &FactKey,
    ) -> Result<bool, TheoryError> {
        if self.is_base_only() {
            self.writable_top()?;
            return Ok(store.remove_fact_by_key(key));
        }
        let existed = self.lookup_fact_view(store, key).is_some();
        let top = self.writable_top()?;
        top.write(key.clone(), DeltaEntry::Delete);
        Ok(existed)
    }

    /// First non-deleted entry walking layers top-down, then the store.
    pub fn lookup_fact_view(&self, store: &ConceptStore, key: &FactKey) -> Option<EffectiveFact> {
        for layer in self.layers.iter().skip(1).rev() {
            match layer.delta.get(key) {
                Some(DeltaEntry::Delete) => return None,
                Some(DeltaEntry::Assert { existence }) => {
                    return Some(EffectiveFact {
                        key: key.clone(),
                        existence: *existence,
                        layer: Some(layer.id.clone()),
                    })
                }
                None => {}
            }
        }
        store
            .lookup(key)
            .filter(|f| !f.deleted)
            .map(|f| EffectiveFact {
                key: f.key.clone(),
                existence: f.existence,
                layer: None,
            })
    }

    pub fn lookup_fact(
        &self,
        store: &ConceptStore,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Option<EffectiveFact> {
        self.lookup_fact_view(store, &FactKey::new(subject, relation, object))
    }

    /// Every visible fact: base facts in insertion order (minus shadowed
    /// ones), then layer facts bottom-up in first-write order.
    pub fn effective_facts(&self, store: &ConceptStore) -> Vec<EffectiveFact> {
        let mut out = Vec::new();
        for fact in store.facts() {
            if let Some(effective) = self.lookup_fact_view(store, &fact.key) {
                if effective.layer.is_none() {
                    out.push(effective);
                } else {
                    // shadowed by a layer: surface the layer's version once
                    if !out.contains(&effective) {
                        out.push(effective);
                    }
                }
            }
        }
        for layer in self.layers.iter().skip(1) {
            for key in &layer.order {
                if store.lookup(key).is_some() {
                    continue; // already surfaced above
                }
                if let Some(effective) = self.lookup_fact_view(store, key) {
                    if !out.contains(&effective) {
                        out.push(effective);
                    }
                }
            }
        }
        out
    }

    fn composed_intervals(&self, base: &Diamond) -> Vec<(f64, f64)> {
        let mut intervals: Vec<(f64, f64)> = base
            .center
            .iter()
            .zip(base.radii.iter())
            .map(|(c, r)| (c - r, c + r))
            .collect();
        for layer in &self.layers {
            for o in &layer.dim_overrides {
                if let Some((lo, hi)) = intervals.get_mut(o.dim) {
                    if let Some(radius) = o.radius {
                        let mid = (*lo + *hi) / 2.0;
                        *lo = mid - radius;
                        *hi = mid + radius;
                    }
                    if let Some(min) = o.min {
                        *lo = lo.max(min);
                    }
                    if let Some(max) = o.max {
                        *hi = hi.min(max);
                    }
                }
            }
        }
        intervals
    }

    /// Applies every layer's dimension overrides bottom-up to a copy of
    /// `base`. The input diamond is never mutated.
    pub fn compose(&self, base: &Diamond) -> Diamond {
        let intervals = self.composed_intervals(base);
        let center = intervals.iter().map(|(lo, hi)| (lo + hi) / 2.0).collect();
        let radii = intervals
            .iter()
            .map(|(lo, hi)| ((hi - lo) / 2.0).max(0.0))
            .collect();
        Diamond { center, radii }
    }

    /// Dimensions whose composed interval is empty (`min > max`), i.e.
    /// the layers' overrides contradict each other or the base.
    pub fn conflicts(&self, base: &Diamond) -> Vec<DimConflict> {
        self.composed_intervals(base)
            .iter()
            .enumerate()
            .filter(|(_, (lo, hi))| lo > hi)
            .map(|(dim, (lo, hi))| DimConflict {
                dim,
                lo: *lo,
                hi: *hi,
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<LayerInfo> {
        self.layers
            .iter()
            .map(|l| LayerInfo {
                id: l.id.clone(),
                depth: l.depth,
                readonly: l.readonly,
                fact_count: l.fact_count(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::existence;

    fn key(s: &str, r: &str, o: &str) -> FactKey {
        FactKey::new(s, r, o)
    }

    #[test]
    fn pop_is_left_inverse_of_push() {
        let mut store = ConceptStore::new();
        let mut stack = TheoryStack::new(8);
        store.add_fact(key("Dog", "IS_A", "animal"), existence::CERTAIN);

        stack.push(Some("hypo".to_string()), false).unwrap();
        stack
            .assert_fact(&mut store, key("Dog", "IS_A", "robot"), existence::CERTAIN)
            .unwrap();
        stack
            .retract_fact(&mut store, &key("Dog", "IS_A", "animal"))
            .unwrap();

        // the view reflects the layer
        assert!(stack
            .lookup_fact(&store, "Dog", "IS_A", "robot")
            .is_some());
        assert!(stack.lookup_fact(&store, "Dog", "IS_A", "animal").is_none());

        stack.pop().unwrap();

        // and the base is back untouched
        assert!(stack.lookup_fact(&store, "Dog", "IS_A", "robot").is_none());
        let base = stack
            .lookup_fact(&store, "Dog", "IS_A", "animal")
            .unwrap();
        assert_eq!(base.existence, existence::CERTAIN);
        assert_eq!(base.layer, None);
    }

    #[test]
    fn commit_folds_into_store() {
        let mut store = ConceptStore::new();
        let mut stack = TheoryStack::new(8);
        stack.push(None, false).unwrap();
        stack
            .assert_fact(&mut store, key("Dog", "IS_A", "animal"), existence::CERTAIN)
            .unwrap();
        assert!(store.lookup(&key("Dog", "IS_A", "animal")).is_none());

        stack.commit(&mut store).unwrap();
        assert!(stack.is_base_only());
        assert_eq!(
            store
                .lookup(&key("Dog", "IS_A", "animal"))
                .unwrap()
                .existence,
            existence::CERTAIN
        );
    }

    #[test]
    fn commit_folds_into_parent_layer() {
        let mut store = ConceptStore::new();
        let mut stack = TheoryStack::new(8);
        stack.push(Some("outer".to_string()), false).unwrap();
        stack.push(Some("inner".to_string()), false).unwrap();
        stack
            .assert_fact(&mut store, key("Dog", "IS_A", "robot"), existence::POSSIBLE)
            .unwrap();

        stack.commit(&mut store).unwrap();
        assert_eq!(stack.top().id, "outer");
        assert_eq!(stack.top().fact_count(), 1);
        assert!(store.lookup(&key("Dog", "IS_A", "robot")).is_none());
        assert!(stack.lookup_fact(&store, "Dog", "IS_A", "robot").is_some());
    }

    #[test]
    fn base_cannot_pop_and_depth_is_bounded() {
        let mut stack = TheoryStack::new(3);
        assert_eq!(stack.pop(), Err(TheoryError::CannotPopBase));
        stack.push(None, false).unwrap();
        stack.push(None, false).unwrap();
        assert_eq!(
            stack.push(None, false).err(),
            Some(TheoryError::LayerDepthExceeded(3))
        );
    }

    #[test]
    fn readonly_layer_rejects_writes() {
        let mut store = ConceptStore::new();
        let mut stack = TheoryStack::new(8);
        stack.push(Some("frozen".to_string()), true).unwrap();
        assert_eq!(
            stack.assert_fact(&mut store, key("a", "R", "b"), existence::CERTAIN),
            Err(TheoryError::ReadonlyLayer("frozen".to_string()))
        );
    }

    #[test]
    fn existence_is_monotone_within_a_layer() {
        let mut store = ConceptStore::new();
        let mut stack = TheoryStack::new(8);
        stack.push(None, false).unwrap();
        stack
            .assert_fact(&mut store, key("a", "R", "b"), existence::CERTAIN)
            .unwrap();
        stack
            .assert_fact(&mut store, key("a", "R", "b"), existence::POSSIBLE)
            .unwrap();
        assert_eq!(
            stack.lookup_fact(&store, "a", "R", "b").unwrap().existence,
            existence::CERTAIN
        );
    }

    #[test]
    fn higher_layer_shadows_lower() {
        let mut store = ConceptStore::new();
        let mut stack = TheoryStack::new(8);
        store.add_fact(key("a", "R", "b"), existence::CERTAIN);
        stack.push(None, false).unwrap();
        stack
            .assert_fact(&mut store, key("a", "R", "b"), existence::UNPROVEN)
            .unwrap();
        let seen = stack.lookup_fact(&store, "a", "R", "b").unwrap();
        assert_eq!(seen.existence, existence::UNPROVEN);
        assert!(seen.layer.is_some());
        // the base fact itself is untouched
        assert_eq!(
            store.lookup(&key("a", "R", "b")).unwrap().existence,
            existence::CERTAIN
        );
    }

    #[test]
    fn compose_and_conflicts() {
        let mut stack = TheoryStack::new(8);
        let base = Diamond {
            center: vec![0.0, 0.0],
            radii: vec![1.0, 1.0],
        };
        stack.push(None, false).unwrap();
        stack.top_mut().dim_overrides.push(DimOverride {
            dim: 0,
            min: Some(-0.5),
            max: None,
            radius: None,
        });
        let composed = stack.compose(&base);
        assert!((composed.center[0] - 0.25).abs() < 1e-12);
        assert!((composed.radii[0] - 0.75).abs() < 1e-12);
        // dimension 1 untouched
        assert!((composed.radii[1] - 1.0).abs() < 1e-12);
        assert!(stack.conflicts(&base).is_empty());

        stack.push(None, false).unwrap();
        stack.top_mut().dim_overrides.push(DimOverride {
            dim: 0,
            min: Some(2.0),
            max: None,
            radius: None,
        });
        let conflicts = stack.conflicts(&base);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].dim, 0);
    }

    #[test]
    fn snapshot_reports_layers() {
        let mut store = ConceptStore::new();
        let mut stack = TheoryStack::new(8);
        stack.push(Some("hypo".to_string()), false).unwrap();
        stack
            .assert_fact(&mut store, key("a", "R", "b"), existence::CERTAIN)
            .unwrap();
        let info = stack.snapshot();
        assert_eq!(info.len(), 2);
        assert_eq!(info[0].id, "base");
        assert_eq!(info[1].id, "hypo");
        assert_eq!(info[1].fact_count, 1);
    }
}
