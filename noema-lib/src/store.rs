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

//! The concept store: ground facts with existence levels, concept labels
//! with usage metrics and diamonds, the protection set and forgetting.
//!
//! Facts are soft-deleted: a removed triple becomes invisible to every
//! query surface but stays in the log for audit. Existence is
//! upgrade-only within a store; downgrades happen only by shadowing in a
//! higher theory layer.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// The epistemic lattice, quantised to five named levels.
pub mod existence {
    pub const IMPOSSIBLE: i8 = -127;
    pub const UNPROVEN: i8 = -64;
    pub const POSSIBLE: i8 = 0;
    pub const DEMONSTRATED: i8 = 64;
    pub const CERTAIN: i8 = 127;

    pub fn name(level: i8) -> &'static str {
        match level {
            IMPOSSIBLE => "IMPOSSIBLE",
            UNPROVEN => "UNPROVEN",
            POSSIBLE => "POSSIBLE",
            DEMONSTRATED => "DEMONSTRATED",
            CERTAIN => "CERTAIN",
            l if l < 0 => "UNPROVEN",
            _ => "POSSIBLE",
        }
    }

    pub fn from_name(name: &str) -> Option<i8> {
        match name {
            "IMPOSSIBLE" => Some(IMPOSSIBLE),
            "UNPROVEN" => Some(UNPROVEN),
            "POSSIBLE" => Some(POSSIBLE),
            "DEMONSTRATED" | "PROVEN" => Some(DEMONSTRATED),
            "CERTAIN" => Some(CERTAIN),
            _ => None,
        }
    }
}

pub type FactId = usize;
pub type ConceptId = usize;

/// Unique key of a fact: the triple plus any n-ary tail.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, PartialOrd, Ord)]
pub struct FactKey {
    pub subject: String,
    pub relation: String,
    pub object: String,
    pub extra: Vec<String>,
}

impl FactKey {
    pub fn new(subject: &str, relation: &str, object: &str) -> FactKey {
        FactKey {
            subject: subject.to_string(),
            relation: relation.to_string(),
            object: object.to_string(),
            extra: Vec::new(),
        }
    }

    pub fn with_extra(mut self, extra: Vec<String>) -> FactKey {
        self.extra = extra;
        self
    }

    /// `subject RELATION object …` rendering used by proof steps.
    pub fn render(&self) -> String {
        let mut out = format!("{} {} {}", self.subject, self.relation, self.object);
        for arg in &self.extra {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Fact {
    pub id: FactId,
    #[serde(flatten)]
    pub key: FactKey,
    pub existence: i8,
    pub deleted: bool,
}

impl Fact {
    pub fn render(&self) -> String {
        self.key.render()
    }
}

/// An axis-aligned box in vector space. Observations widen the radii; the
/// center never moves once learned.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diamond {
    pub center: Vec<f64>,
    pub radii: Vec<f64>,
}

impl Diamond {
    pub fn at(center: Vec<f64>) -> Diamond {
        let radii = vec![0.0; center.len()];
        Diamond { center, radii }
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        self.center.len() == point.len()
            && self
                .center
                .iter()
                .zip(self.radii.iter())
                .zip(point.iter())
                .all(|((c, r), p)| (p - c).abs() <= *r + f64::EPSILON)
    }

    /// Widens the box just enough to contain `point`.
    pub fn widen_to(&mut self, point: &[f64]) {
        for ((c, r), p) in self
            .center
            .iter()
            .zip(self.radii.iter_mut())
            .zip(point.iter())
        {
            let needed = (p - c).abs();
            if needed > *r {
                *r = needed;
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct UsageCounters {
    pub assert_count: u64,
    pub query_count: u64,
    pub inference_count: u64,
    pub boosted: u64,
}

impl UsageCounters {
    pub fn total(&self) -> u64 {
        self.assert_count + self.query_count + self.inference_count + self.boosted
    }
}

#[derive(Clone, Debug)]
pub struct Concept {
    pub id: ConceptId,
    pub label: String,
    pub diamonds: Vec<Diamond>,
    pub usage: UsageCounters,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub removed: bool,
}

/// Usage metrics as reported to callers; recency and frequency are
/// normalised to `[0, 1]`.
#[derive(Clone, Debug, Serialize)]
pub struct UsageStats {
    pub usage_count: u64,
    pub assert_count: u64,
    pub query_count: u64,
    pub inference_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub recency: f64,
    pub frequency: f64,
    pub priority: f64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UsageOrder {
    Priority,
    Recency,
    Frequency,
    UsageCount,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ForgetOptions {
    /// Remove concepts whose total usage count is below this.
    pub threshold: Option<u64>,
    /// Remove concepts last used before now minus this span (`Nd|Nh|Nm`).
    pub older_than: Option<String>,
    /// Remove exactly this label.
    pub concept: Option<String>,
    /// Remove labels matching a `*`-wildcard pattern.
    pub pattern: Option<String>,
    pub dry_run: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ForgetOutcome {
    pub removed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub would_remove: Option<Vec<String>>,
    pub count: usize,
    pub protected: Vec<String>,
    pub skipped: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("unknown fact id {0}")]
    UnknownFact(FactId),
    #[error("unknown concept {0}")]
    UnknownConcept(String),
    #[error("invalid time span: {0}")]
    InvalidSpan(String),
}

/// One audit record per state change, in mutation order.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Where audit events go. Append-only; implementations shared between
/// sessions must be safe for concurrent writers.
pub trait AuditSink: Send {
    fn record(&mut self, event: AuditEvent);
}

/// Discards everything. The default when no sink is configured.
pub struct NoopAudit;

impl AuditSink for NoopAudit {
    fn record(&mut self, _event: AuditEvent) {}
}

/// In-memory sink, cloneable so tests can keep a reading handle.
#[derive(Clone, Default)]
pub struct MemoryAudit {
    events: std::sync::Arc<std::sync::Mutex<Vec<AuditEvent>>>,
}

impl MemoryAudit {
    pub fn new() -> MemoryAudit {
        MemoryAudit::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.events().iter().map(|e| e.kind.clone()).collect()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&mut self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Parses `Nd`, `Nh` or `Nm` into a duration.
pub fn parse_age(text: &str) -> Result<Duration, StoreError> {
    let text = text.trim();
    let (digits, unit) = text.split_at(text.len().saturating_sub(1));
    let n: i64 = digits
        .parse()
        .map_err(|_| StoreError::InvalidSpan(text.to_string()))?;
    match unit {
        "d" => Ok(Duration::days(n)),
        "h" => Ok(Duration::hours(n)),
        "m" => Ok(Duration::minutes(n)),
        _ => Err(StoreError::InvalidSpan(text.to_string())),
    }
}

fn matches_pattern(label: &str, pattern: &str) -> bool {
    match (pattern.starts_with('*'), pattern.ends_with('*')) {
        (true, true) => label.contains(pattern.trim_matches('*')),
        (true, false) => label.ends_with(pattern.trim_start_matches('*')),
        (false, true) => label.starts_with(pattern.trim_end_matches('*')),
        (false, false) => label == pattern,
    }
}

/// Snapshot of the fact log, used by counterfactual push/pop.
#[derive(Clone)]
pub struct FactsSnapshot {
    facts: Vec<Fact>,
}

pub struct ConceptStore {
    facts: Vec<Fact>,
    by_key: HashMap<FactKey, FactId>,
    /// Per-subject fact ids, kept sorted by descending existence.
    by_subject: HashMap<String, Vec<FactId>>,
    concepts: Vec<Concept>,
    by_label: HashMap<String, ConceptId>,
    protected: HashSet<String>,
    audit: Box<dyn AuditSink>,
}

impl Default for ConceptStore {
    fn default() -> Self {
        ConceptStore::new()
    }
}

impl ConceptStore {
    pub fn new() -> ConceptStore {
        ConceptStore {
            facts: Vec::new(),
            by_key: HashMap::new(),
            by_subject: HashMap::new(),
            concepts: Vec::new(),
            by_label: HashMap::new(),
            protected: HashSet::new(),
            audit: Box::new(NoopAudit),
        }
    }

    pub fn with_audit(audit: Box<dyn AuditSink>) -> ConceptStore {
        let mut store = ConceptStore::new();
        store.audit = audit;
        store
    }

    /// Swaps the audit sink. Events already recorded stay with the old
    /// sink.
    pub fn set_audit(&mut self, audit: Box<dyn AuditSink>) {
        self.audit = audit;
    }

    fn emit(&mut self, kind: &str, payload: serde_json::Value) {
        self.audit.record(AuditEvent {
            kind: kind.to_string(),
            timestamp: Utc::now(),
            payload,
        });
    }

    // ---- concepts ------------------------------------------------------

    /// Idempotent: returns the existing concept when the label is known.
    pub fn ensure_concept(&mut self, label: &str) -> ConceptId {
        if let Some(id) = self.by_label.get(label) {
            return *id;
        }
        let id = self.concepts.len();
        let now = Utc::now();
        self.concepts.push(Concept {
            id,
            label: label.to_string(),
            diamonds: Vec::new(),
            usage: UsageCounters::default(),
            created_at: now,
            last_used_at: now,
            removed: false,
        });
        self.by_label.insert(label.to_string(), id);
        debug!(label, id, "concept created");
        self.emit("concept_created", json!({ "label": label, "id": id }));
        id
    }

    /// Overwrites the concept's diamonds and records an assert.
    pub fn upsert_concept(&mut self, id: ConceptId, label: &str, diamonds: Vec<Diamond>) {
        let id = if self.concepts.get(id).map(|c| c.label == label) == Some(true) {
            id
        } else {
            self.ensure_concept(label)
        };
        if let Some(concept) = self.concepts.get_mut(id) {
            concept.diamonds = diamonds;
            concept.usage.assert_count += 1;
            concept.last_used_at = Utc::now();
        }
        self.emit("concept_updated", json!({ "label": label, "id": id }));
    }

    /// Widens the concept's first diamond to contain `point`. A concept
    /// without diamonds adopts a zero-radius diamond centred there.
    pub fn add_observation(&mut self, id: ConceptId, point: &[f64]) -> Result<(), StoreError> {
        let concept = self
            .concepts
            .get_mut(id)
            .filter(|c| !c.removed)
            .ok_or_else(|| StoreError::UnknownConcept(format!("#{}", id)))?;
        match concept.diamonds.first_mut() {
            Some(diamond) => diamond.widen_to(point),
            None => concept.diamonds.push(Diamond::at(point.to_vec())),
        }
        let label = concept.label.clone();
        self.emit(
            "observation_added",
            json!({ "label": label, "dims": point.len() }),
        );
        Ok(())
    }

    pub fn concept(&self, label: &str) -> Option<&Concept> {
        self.by_label
            .get(label)
            .and_then(|id| self.concepts.get(*id))
            .filter(|c| !c.removed)
    }

    pub fn concept_by_id(&self, id: ConceptId) -> Option<&Concept> {
        self.concepts.get(id).filter(|c| !c.removed)
    }

    pub fn concept_labels(&self) -> Vec<&str> {
        self.concepts
            .iter()
            .filter(|c| !c.removed)
            .map(|c| c.label.as_str())
            .collect()
    }

    // ---- usage ---------------------------------------------------------

    fn touch(&mut self, label: &str, f: impl FnOnce(&mut UsageCounters)) {
        let id = self.ensure_concept(label);
        if let Some(concept) = self.concepts.get_mut(id) {
            f(&mut concept.usage);
            concept.last_used_at = Utc::now();
        }
    }

    pub fn note_assert(&mut self, label: &str) {
        self.touch(label, |u| u.assert_count += 1);
    }

    pub fn note_query(&mut self, label: &str) {
        self.touch(label, |u| u.query_count += 1);
    }

    pub fn note_inference(&mut self, label: &str) {
        self.touch(label, |u| u.inference_count += 1);
    }

    pub fn boost_usage(&mut self, label: &str, amount: Option<u64>) {
        let amount = amount.unwrap_or(10);
        self.touch(label, |u| u.boosted += amount);
        self.emit("usage_boosted", json!({ "label": label, "amount": amount }));
    }

    pub fn get_usage_stats(&self, label: &str) -> Option<UsageStats> {
        let concept = self.concept(label)?;
        let usage_count = concept.usage.total();
        let days_since = (Utc::now() - concept.last_used_at).num_seconds() as f64 / 86_400.0;
        let recency = (1.0 - days_since / 30.0).max(0.0);
        let frequency = (((usage_count + 1) as f64).log10() / 3.0).min(1.0);
        Some(UsageStats {
            usage_count,
            assert_count: concept.usage.assert_count,
            query_count: concept.usage.query_count,
            inference_count: concept.usage.inference_count,
            created_at: concept.created_at,
            last_used_at: concept.last_used_at,
            recency,
            frequency,
            priority: 0.4 * recency + 0.6 * frequency,
        })
    }

    pub fn get_concepts_by_usage(
        &self,
        limit: Option<usize>,
        order: UsageOrder,
    ) -> Vec<(String, UsageStats)> {
        let mut stats: Vec<(String, UsageStats)> = self
            .concepts
            .iter()
            .filter(|c| !c.removed)
            .filter_map(|c| self.get_usage_stats(&c.label).map(|s| (c.label.clone(), s)))
            .collect();
        stats.sort_by(|(al, a), (bl, b)| {
            let (x, y) = match order {
                UsageOrder::Priority => (a.priority, b.priority),
                UsageOrder::Recency => (a.recency, b.recency),
                UsageOrder::Frequency => (a.frequency, b.frequency),
                UsageOrder::UsageCount => (a.usage_count as f64, b.usage_count as f64),
            };
            y.partial_cmp(&x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| al.cmp(bl))
        });
        if let Some(limit) = limit {
            stats.truncate(limit);
        }
        stats
    }

    // ---- facts ---------------------------------------------------------

    fn subject_insert_sorted(&mut self, id: FactId) {
        let subject = self.facts[id].key.subject.clone();
        let existence = self.facts[id].existence;
        let facts = &self.facts;
        let list = self.by_subject.entry(subject).or_default();
        let at = list
            .iter()
            .position(|other| facts[*other].existence < existence)
            .unwrap_or(list.len());
        list.insert(at, id);
    }

    fn subject_remove(&mut self, id: FactId) {
        let subject = &self.facts[id].key.subject;
        if let Some(list) = self.by_subject.get_mut(subject) {
            list.retain(|other| *other != id);
        }
    }

    /// Adds a fact, or upgrades the stored existence on re-assert. A
    /// duplicate with existence at or below the stored level is a no-op
    /// returning the existing id.
    pub fn add_fact(&mut self, key: FactKey, existence: i8) -> FactId {
        if let Some(&id) = self.by_key.get(&key) {
            if !self.facts[id].deleted {
                if existence > self.facts[id].existence {
                    let _ = self.upgrade_existence(id, existence);
                }
                return id;
            }
            // a soft-deleted triple re-asserted comes back as a fresh fact
        }

        let id = self.facts.len();
        let fact = Fact {
            id,
            key: key.clone(),
            existence,
            deleted: false,
        };
        debug!(fact = %fact.render(), existence, "fact added");
        self.facts.push(fact);
        self.by_key.insert(key.clone(), id);
        self.subject_insert_sorted(id);

        self.note_assert(&key.subject);
        if !key.object.is_empty() {
            self.note_assert(&key.object);
        }
        self.emit(
            "fact_added",
            json!({ "fact": key.render(), "existence": existence, "id": id }),
        );
        id
    }

    /// Soft-deletes. Returns true iff the fact existed and was live.
    pub fn remove_fact(&mut self, id: FactId) -> bool {
        match self.facts.get(id) {
            Some(fact) if !fact.deleted => {}
            _ => return false,
        }
        self.subject_remove(id);
        self.facts[id].deleted = true;
        let key = self.facts[id].key.clone();
        self.by_key.remove(&key);
        let rendered = self.facts[id].render();
        debug!(fact = %rendered, "fact removed");
        self.emit("fact_removed", json!({ "fact": rendered, "id": id }));
        true
    }

    pub fn remove_fact_by_key(&mut self, key: &FactKey) -> bool {
        match self.by_key.get(key) {
            Some(&id) => self.remove_fact(id),
            None => false,
        }
    }

    /// Refuses downgrades.
    pub fn upgrade_existence(&mut self, id: FactId, new_existence: i8) -> bool {
        let current = match self.facts.get(id) {
            Some(fact) if !fact.deleted => fact.existence,
            _ => return false,
        };
        if new_existence <= current {
            return false;
        }
        self.subject_remove(id);
        self.facts[id].existence = new_existence;
        self.subject_insert_sorted(id);
        let rendered = self.facts[id].render();
        self.emit(
            "fact_upgraded",
            json!({ "fact": rendered, "from": current, "to": new_existence }),
        );
        true
    }

    pub fn fact(&self, id: FactId) -> Option<&Fact> {
        self.facts.get(id)
    }

    pub fn lookup(&self, key: &FactKey) -> Option<&Fact> {
        self.by_key.get(key).map(|id| &self.facts[*id])
    }

    /// Live facts in insertion order.
    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter().filter(|f| !f.deleted)
    }

    pub fn get_facts_by_subject(&self, subject: &str) -> Vec<&Fact> {
        self.by_subject
            .get(subject)
            .map(|ids| ids.iter().map(|id| &self.facts[*id]).collect())
            .unwrap_or_default()
    }

    pub fn get_facts_by_subject_and_relation(
        &self,
        subject: &str,
        relation: &str,
        min_existence: i8,
    ) -> Vec<&Fact> {
        self.get_facts_by_subject(subject)
            .into_iter()
            .filter(|f| f.key.relation == relation && f.existence >= min_existence)
            .collect()
    }

    pub fn get_facts_by_existence(&self, min_existence: i8) -> Vec<&Fact> {
        self.facts()
            .filter(|f| f.existence >= min_existence)
            .collect()
    }

    /// Best-existence match in O(subject fan-out): the subject index is
    /// kept sorted by descending existence, so the first hit wins.
    pub fn get_best_existence_fact(
        &self,
        subject: &str,
        relation: &str,
        object: Option<&str>,
    ) -> Option<&Fact> {
        self.by_subject.get(subject).and_then(|ids| {
            ids.iter()
                .map(|id| &self.facts[*id])
                .find(|f| {
                    f.key.relation == relation
                        && object.map(|o| f.key.object == o).unwrap_or(true)
                })
        })
    }

    /// Strongly connected components of size > 1 among `relation` edges.
    /// IS_A cycles are legal but worth surfacing: lattice walks guard
    /// against them with visited sets, so a cycle silently caps
    /// inference instead of failing.
    pub fn relation_cycles(&self, relation: &str) -> Vec<Vec<String>> {
        let mut graph: petgraph::graph::DiGraph<&str, ()> = petgraph::graph::DiGraph::new();
        let mut nodes: HashMap<&str, petgraph::graph::NodeIndex> = HashMap::new();
        for fact in self.facts().filter(|f| f.key.relation == relation) {
            let subject = *nodes
                .entry(&fact.key.subject)
                .or_insert_with(|| graph.add_node(&fact.key.subject));
            let object = *nodes
                .entry(&fact.key.object)
                .or_insert_with(|| graph.add_node(&fact.key.object));
            graph.add_edge(subject, object, ());
        }
        let mut cycles: Vec<Vec<String>> = petgraph::algo::tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || graph.find_edge(component[0], component[0]).is_some()
            })
            .map(|component| {
                let mut labels: Vec<String> = component
                    .iter()
                    .map(|ix| graph[*ix].to_string())
                    .collect();
                labels.sort_unstable();
                labels
            })
            .collect();
        cycles.sort();
        cycles
    }

    // ---- snapshots -----------------------------------------------------

    pub fn snapshot_facts(&self) -> FactsSnapshot {
        FactsSnapshot {
            facts: self.facts.clone(),
        }
    }

    /// Restores the fact log and rebuilds every index.
    pub fn restore_facts(&mut self, snapshot: FactsSnapshot) {
        self.facts = snapshot.facts;
        self.by_key.clear();
        self.by_subject.clear();
        let live: Vec<FactId> = self
            .facts
            .iter()
            .filter(|f| !f.deleted)
            .map(|f| f.id)
            .collect();
        for id in live {
            self.by_key.insert(self.facts[id].key.clone(), id);
            self.subject_insert_sorted(id);
        }
        self.emit("facts_restored", json!({ "count": self.facts.len() }));
    }

    // ---- protection & forgetting --------------------------------------

    pub fn protect(&mut self, label: &str) {
        self.ensure_concept(label);
        self.protected.insert(label.to_string());
        self.emit("protected", json!({ "label": label }));
    }

    pub fn unprotect(&mut self, label: &str) {
        self.protected.remove(label);
        self.emit("unprotected", json!({ "label": label }));
    }

    pub fn is_protected(&self, label: &str) -> bool {
        self.protected.contains(label)
    }

    pub fn list_protected(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.protected.iter().cloned().collect();
        labels.sort_unstable();
        labels
    }

    /// Removes low-value concepts and soft-deletes their facts. Protected
    /// labels are never removed. `dry_run` reports without mutating.
    pub fn forget(&mut self, options: &ForgetOptions) -> Result<ForgetOutcome, StoreError> {
        let cutoff = match &options.older_than {
            Some(span) => Some(Utc::now() - parse_age(span)?),
            None => None,
        };
        let has_criterion = options.threshold.is_some()
            || cutoff.is_some()
            || options.concept.is_some()
            || options.pattern.is_some();

        let mut matching: Vec<String> = Vec::new();
        let mut protected: Vec<String> = Vec::new();
        let mut skipped = 0usize;
        for concept in self.concepts.iter().filter(|c| !c.removed) {
            let mut hit = has_criterion;
            if let Some(threshold) = options.threshold {
                hit &= concept.usage.total() < threshold;
            }
            if let Some(cutoff) = cutoff {
                hit &= concept.last_used_at < cutoff;
            }
            if let Some(label) = &options.concept {
                hit &= concept.label == *label;
            }
            if let Some(pattern) = &options.pattern {
                hit &= matches_pattern(&concept.label, pattern);
            }
            if !hit {
                skipped += 1;
            } else if self.protected.contains(&concept.label) {
                protected.push(concept.label.clone());
            } else {
                matching.push(concept.label.clone());
            }
        }

        if options.dry_run {
            return Ok(ForgetOutcome {
                removed: Vec::new(),
                count: matching.len(),
                would_remove: Some(matching),
                protected,
                skipped,
            });
        }

        for label in &matching {
            let fact_ids: Vec<FactId> = self
                .facts()
                .filter(|f| f.key.subject == *label || f.key.object == *label)
                .map(|f| f.id)
                .collect();
            for id in fact_ids {
                self.remove_fact(id);
            }
            if let Some(id) = self.by_label.remove(label) {
                self.concepts[id].removed = true;
            }
        }
        self.emit(
            "forget",
            json!({ "removed": matching, "protected": protected }),
        );
        Ok(ForgetOutcome {
            count: matching.len(),
            removed: matching,
            would_remove: None,
            protected,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str, r: &str, o: &str) -> FactKey {
        FactKey::new(s, r, o)
    }

    #[test]
    fn add_fact_is_upgrade_only() {
        let mut store = ConceptStore::new();
        let id = store.add_fact(key("Unicorn", "IS_A", "Horse"), existence::POSSIBLE);
        let again = store.add_fact(key("Unicorn", "IS_A", "Horse"), existence::CERTAIN);
        assert_eq!(id, again);
        assert_eq!(
            store
                .get_best_existence_fact("Unicorn", "IS_A", Some("Horse"))
                .unwrap()
                .existence,
            existence::CERTAIN
        );
        // no duplicate triple
        assert_eq!(store.facts().count(), 1);

        // re-assert at a lower level leaves the stored level alone
        store.add_fact(key("Unicorn", "IS_A", "Horse"), existence::UNPROVEN);
        assert_eq!(store.facts.len(), 1);
        assert_eq!(store.facts[0].existence, existence::CERTAIN);
    }

    #[test]
    fn upgrade_refuses_downgrade() {
        let mut store = ConceptStore::new();
        let id = store.add_fact(key("Dog", "IS_A", "animal"), existence::DEMONSTRATED);
        assert!(!store.upgrade_existence(id, existence::POSSIBLE));
        assert!(store.upgrade_existence(id, existence::CERTAIN));
        assert_eq!(store.fact(id).unwrap().existence, existence::CERTAIN);
    }

    #[test]
    fn soft_delete_is_invisible_but_audited() {
        let audit = MemoryAudit::new();
        let mut store = ConceptStore::with_audit(Box::new(audit.clone()));
        let id = store.add_fact(key("Dog", "IS_A", "animal"), existence::CERTAIN);
        assert!(store.remove_fact(id));
        assert!(!store.remove_fact(id), "double delete reports false");

        assert!(store.get_facts_by_subject("Dog").is_empty());
        assert!(store
            .get_best_existence_fact("Dog", "IS_A", Some("animal"))
            .is_none());
        // retained for audit
        assert!(store.fact(id).unwrap().deleted);
        let kinds = audit.kinds();
        assert!(kinds.iter().any(|k| k == "fact_added"));
        assert!(kinds.iter().any(|k| k == "fact_removed"));
    }

    #[test]
    fn best_existence_uses_sorted_index() {
        let mut store = ConceptStore::new();
        store.add_fact(key("Dog", "IS_A", "pet"), existence::POSSIBLE);
        store.add_fact(key("Dog", "IS_A", "animal"), existence::CERTAIN);
        store.add_fact(key("Dog", "HAS", "fur"), existence::DEMONSTRATED);
        let best = store.get_best_existence_fact("Dog", "IS_A", None).unwrap();
        assert_eq!(best.key.object, "animal");
        let specific = store
            .get_best_existence_fact("Dog", "IS_A", Some("pet"))
            .unwrap();
        assert_eq!(specific.existence, existence::POSSIBLE);
    }

    #[test]
    fn snapshot_restore_rebuilds_indices() {
        let mut store = ConceptStore::new();
        store.add_fact(key("Dog", "IS_A", "animal"), existence::CERTAIN);
        let snapshot = store.snapshot_facts();

        let id = store.add_fact(key("Dog", "IS_A", "reptile"), existence::CERTAIN);
        store.remove_fact(id);
        store.add_fact(key("Cat", "IS_A", "animal"), existence::CERTAIN);

        store.restore_facts(snapshot);
        assert_eq!(store.facts().count(), 1);
        assert!(store.get_facts_by_subject("Cat").is_empty());
        assert!(store
            .get_best_existence_fact("Dog", "IS_A", Some("animal"))
            .is_some());
    }

    #[test]
    fn usage_stats_shapes() {
        let mut store = ConceptStore::new();
        store.add_fact(key("Dog", "IS_A", "animal"), existence::CERTAIN);
        store.note_query("Dog");
        store.boost_usage("Dog", None);

        let stats = store.get_usage_stats("Dog").unwrap();
        assert_eq!(stats.assert_count, 1);
        assert_eq!(stats.query_count, 1);
        assert_eq!(stats.usage_count, 12);
        // fresh concept: recency at the top of the window
        assert!(stats.recency > 0.99);
        assert!((stats.frequency - ((13.0f64).log10() / 3.0)).abs() < 1e-9);
        assert!((stats.priority - (0.4 * stats.recency + 0.6 * stats.frequency)).abs() < 1e-9);

        let ranked = store.get_concepts_by_usage(Some(1), UsageOrder::UsageCount);
        assert_eq!(ranked[0].0, "Dog");
    }

    #[test]
    fn forget_respects_protection() {
        let mut store = ConceptStore::new();
        store.protect("Animal");
        store.add_fact(key("Animal", "IS_A", "thing"), existence::CERTAIN);
        store.add_fact(key("Scratch", "IS_A", "thing"), existence::CERTAIN);

        let outcome = store
            .forget(&ForgetOptions {
                threshold: Some(1_000_000),
                ..Default::default()
            })
            .unwrap();
        assert!(outcome.protected.contains(&"Animal".to_string()));
        assert!(outcome.removed.contains(&"Scratch".to_string()));
        assert!(store.concept("Animal").is_some());
        assert!(store.concept("Scratch").is_none());
        // facts about the forgotten concept are soft-deleted
        assert!(store.get_facts_by_subject("Scratch").is_empty());
        // protected concept's facts survive
        assert!(!store.get_facts_by_subject("Animal").is_empty());
    }

    #[test]
    fn forget_dry_run_does_not_mutate() {
        let mut store = ConceptStore::new();
        store.add_fact(key("Scratch", "IS_A", "thing"), existence::CERTAIN);
        let outcome = store
            .forget(&ForgetOptions {
                threshold: Some(1_000_000),
                dry_run: true,
                ..Default::default()
            })
            .unwrap();
        assert!(outcome.removed.is_empty());
        assert!(outcome
            .would_remove
            .as_ref()
            .unwrap()
            .contains(&"Scratch".to_string()));
        assert!(store.concept("Scratch").is_some());
    }

    #[test]
    fn forget_by_pattern_and_age() {
        let mut store = ConceptStore::new();
        store.ensure_concept("tmp_one");
        store.ensure_concept("tmp_two");
        store.ensure_concept("keeper");
        let outcome = store
            .forget(&ForgetOptions {
                pattern: Some("tmp_*".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(outcome.count, 2);
        assert!(store.concept("keeper").is_some());

        // nothing is old enough to match a one-day cutoff
        let outcome = store
            .forget(&ForgetOptions {
                older_than: Some("1d".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(outcome.count, 0);

        assert!(matches!(
            store.forget(&ForgetOptions {
                older_than: Some("soon".to_string()),
                ..Default::default()
            }),
            Err(StoreError::InvalidSpan(_))
        ));
    }

    #[test]
    fn relation_cycles_are_detected() {
        let mut store = ConceptStore::new();
        store.add_fact(key("a", "IS_A", "b"), existence::CERTAIN);
        store.add_fact(key("b", "IS_A", "c"), existence::CERTAIN);
        assert!(store.relation_cycles("IS_A").is_empty());

        store.add_fact(key("c", "IS_A", "a"), existence::CERTAIN);
        let cycles = store.relation_cycles("IS_A");
        assert_eq!(cycles, vec![vec!["a", "b", "c"]]);

        // self-loops count too
        store.add_fact(key("x", "IS_A", "x"), existence::CERTAIN);
        assert_eq!(store.relation_cycles("IS_A").len(), 2);
    }

    #[test]
    fn parse_age_units() {
        assert_eq!(parse_age("30d").unwrap(), Duration::days(30));
        assert_eq!(parse_age("12h").unwrap(), Duration::hours(12));
        assert_eq!(parse_age("5m").unwrap(), Duration::minutes(5));
        assert!(parse_age("5w").is_err());
        assert!(parse_age("").is_err());
    }

    #[test]
    fn diamond_widens_but_center_stays() {
        let mut d = Diamond::at(vec![0.5, 0.5]);
        assert!(d.contains(&[0.5, 0.5]));
        assert!(!d.contains(&[0.9, 0.5]));
        d.widen_to(&[0.9, 0.4]);
        assert_eq!(d.center, vec![0.5, 0.5]);
        assert!(d.contains(&[0.9, 0.5]));
        assert!(d.contains(&[0.2, 0.6]));
    }

    #[test]
    fn observation_widens_first_diamond() {
        let mut store = ConceptStore::new();
        let id = store.ensure_concept("Dog");
        store.add_observation(id, &[0.1, 0.2]).unwrap();
        store.add_observation(id, &[0.3, 0.0]).unwrap();
        let concept = store.concept("Dog").unwrap();
        assert_eq!(concept.diamonds.len(), 1);
        assert_eq!(concept.diamonds[0].center, vec![0.1, 0.2]);
        assert!(concept.diamonds[0].contains(&[0.3, 0.0]));
    }
}
