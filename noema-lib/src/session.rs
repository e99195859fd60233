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

//! The session facade: one store, one theory stack, one strategy handle,
//! one vocab index, composed behind `learn` / `prove` / `query` /
//! `describe_result`.
//!
//! A session is single-threaded; run one per thread. Sessions share only
//! the strategy registry, which is read-mostly.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::describe::{DefaultDescriber, DescribeRequest, ReasoningOutcome, ResultDescriber};
use crate::dsl::{self, Statement};
use crate::hdc::{self, HdcStrategy, StrategyRegistry};
use crate::logic::{Expr, OperatorProps, OperatorTable, Rule, Term};
use crate::reasoner::{
    ProveOptions, ProveResult, QueryOptions, QueryResult, Reasoner, ReasonerSettings,
    ReasoningPriority,
};
use crate::store::{existence, AuditSink, ConceptStore, FactKey};
use crate::theory::{TheoryError, TheoryStack};
use crate::validate::{validate_question_dsl, GoalLogic};
use crate::vocab::VocabIndex;

/// The embedded core theory: built-in relations and the upper taxonomy.
const CORE_THEORY: &str = include_str!("assets/core.nm");

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown hdc strategy: {0}")]
    UnknownStrategy(String),
    #[error("geometry must be positive, got {0}")]
    InvalidGeometry(usize),
    #[error("layer depth limit must be positive")]
    InvalidLayerDepth,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub hdc_strategy: String,
    pub geometry: usize,
    pub reasoning_priority: ReasoningPriority,
    pub reasoning_profile: String,
    pub closed_world_assumption: bool,
    pub reject_contradictions: bool,
    pub auto_declare_unknown_operators: bool,
    pub max_chain_depth: usize,
    pub max_depth: usize,
    pub max_layer_depth: usize,
    pub default_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            hdc_strategy: hdc::DEFAULT_STRATEGY.to_string(),
            geometry: 1024,
            reasoning_priority: ReasoningPriority::Symbolic,
            reasoning_profile: "default".to_string(),
            closed_world_assumption: false,
            reject_contradictions: false,
            auto_declare_unknown_operators: true,
            max_chain_depth: 8,
            max_depth: 10,
            max_layer_depth: 16,
            default_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LearnOutcome {
    pub success: bool,
    pub facts: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadOutcome {
    pub success: bool,
    pub errors: Vec<String>,
}

pub struct Session {
    config: SessionConfig,
    strategy: Arc<dyn HdcStrategy>,
    store: ConceptStore,
    stack: TheoryStack,
    vocab: RefCell<VocabIndex>,
    rules: Vec<Rule>,
    ops: OperatorTable,
    describer: Box<dyn ResultDescriber>,
    core_loaded: bool,
    closed: bool,
}

impl Session {
    /// Builds a session against the shared strategy registry. No I/O.
    pub fn new(config: SessionConfig) -> Result<Session, ConfigError> {
        let strategy = hdc::global_get(&config.hdc_strategy)
            .map_err(|_| ConfigError::UnknownStrategy(config.hdc_strategy.clone()))?;
        Session::build(config, strategy)
    }

    /// Builds a session against an injected registry.
    pub fn with_registry(
        config: SessionConfig,
        registry: &StrategyRegistry,
    ) -> Result<Session, ConfigError> {
        let strategy = registry
            .get(&config.hdc_strategy)
            .map_err(|_| ConfigError::UnknownStrategy(config.hdc_strategy.clone()))?;
        Session::build(config, strategy)
    }

    fn build(config: SessionConfig, strategy: Arc<dyn HdcStrategy>) -> Result<Session, ConfigError> {
        if config.geometry == 0 {
            return Err(ConfigError::InvalidGeometry(config.geometry));
        }
        if config.max_layer_depth == 0 {
            return Err(ConfigError::InvalidLayerDepth);
        }
        info!(strategy = strategy.id(), geometry = config.geometry, "session created");
        Ok(Session {
            stack: TheoryStack::new(config.max_layer_depth),
            config,
            strategy,
            store: ConceptStore::new(),
            vocab: RefCell::new(VocabIndex::new()),
            rules: Vec::new(),
            ops: OperatorTable::new(),
            describer: Box::new(DefaultDescriber),
            core_loaded: false,
            closed: false,
        })
    }

    pub fn set_audit(&mut self, audit: Box<dyn AuditSink>) {
        self.store.set_audit(audit);
    }

    pub fn set_describer(&mut self, describer: Box<dyn ResultDescriber>) {
        self.describer = describer;
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &ConceptStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConceptStore {
        &mut self.store
    }

    pub fn stack(&self) -> &TheoryStack {
        &self.stack
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.ops
    }

    // ---- theory layers -------------------------------------------------

    pub fn push_theory(&mut self, id: Option<String>, readonly: bool) -> Result<(), TheoryError> {
        self.stack.push(id, readonly).map(|_| ())
    }

    pub fn pop_theory(&mut self) -> Result<(), TheoryError> {
        self.stack.pop().map(|_| ())
    }

    pub fn commit_theory(&mut self) -> Result<(), TheoryError> {
        self.stack.commit(&mut self.store)
    }

    // ---- learn ---------------------------------------------------------

    /// Ingests a learn input. Atomic per line: a failing line is reported
    /// and the rest of the input still applies.
    pub fn learn(&mut self, text: &str) -> LearnOutcome {
        if self.closed {
            return LearnOutcome {
                success: false,
                facts: 0,
                errors: vec!["session_closed".to_string()],
                warnings: Vec::new(),
            };
        }
        let program = dsl::parse_learn(text);
        let mut outcome = LearnOutcome {
            success: true,
            facts: 0,
            errors: program.errors.iter().map(|e| e.to_string()).collect(),
            warnings: Vec::new(),
        };

        for op in &program.pragmas.declare_ops {
            self.ops.declare(op, OperatorProps::default());
        }

        for statement in program.statements {
            match statement {
                Statement::Fact(fact) => {
                    if let Err(error) = self.apply_fact(&fact) {
                        outcome.errors.push(error);
                    } else {
                        outcome.facts += 1;
                    }
                }
                Statement::Retract(fact) => {
                    let key = FactKey::new(&fact.args[0], &fact.relation, &fact.args[1])
                        .with_extra(fact.args[2..].to_vec());
                    match self.stack.retract_fact(&mut self.store, &key) {
                        Ok(true) => {}
                        Ok(false) => outcome
                            .warnings
                            .push(format!("retract of unknown fact: {}", key.render())),
                        Err(e) => outcome.errors.push(e.to_string()),
                    }
                }
                Statement::OperatorDecl(decl) => {
                    self.ops.declare(&decl.name, decl.props);
                }
                Statement::Rule(def) => {
                    let premise = def
                        .body
                        .clone()
                        .into_iter()
                        .reduce(|l, r| Expr::And(Box::new(l), Box::new(r)))
                        .expect("parser rejects empty rule bodies");
                    self.ops
                        .declare(&def.head.predicate.0, OperatorProps::default());
                    self.rules.push(Rule {
                        name: def.name,
                        premise,
                        conclusion: def.head,
                    });
                }
                Statement::Protect(label) => self.store.protect(&label),
                Statement::Unprotect(label) => self.store.unprotect(&label),
                Statement::Boost { label, amount } => self.store.boost_usage(&label, amount),
                Statement::Forget(options) => {
                    if let Err(e) = self.store.forget(&options) {
                        outcome.errors.push(e.to_string());
                    }
                }
            }
        }
        if outcome.facts > 0 {
            for cycle in self.store.relation_cycles("IS_A") {
                outcome
                    .warnings
                    .push(format!("taxonomy cycle: {}", cycle.join(" -> ")));
            }
        }
        outcome.success = outcome.errors.is_empty();
        debug!(facts = outcome.facts, errors = outcome.errors.len(), "learn finished");
        outcome
    }

    fn apply_fact(&mut self, fact: &dsl::FactLine) -> Result<(), String> {
        let relation = &fact.relation;
        let known = self.ops.is_declared(relation) || self.ops.is_transitive(relation);
        if !known {
            if self.config.auto_declare_unknown_operators {
                self.ops.declare(relation, OperatorProps::default());
            } else {
                return Err(format!("unknown_operator:{}", relation));
            }
        }
        let key = FactKey::new(&fact.args[0], relation, &fact.args[1])
            .with_extra(fact.args[2..].to_vec());
        if self.config.reject_contradictions {
            if let Some(existing) = self.stack.lookup_fact_view(&self.store, &key) {
                let flips_sign = (existing.existence <= -existence::DEMONSTRATED
                    && fact.existence >= existence::DEMONSTRATED)
                    || (existing.existence >= existence::DEMONSTRATED
                        && fact.existence <= -existence::DEMONSTRATED);
                if flips_sign {
                    return Err(format!("contradiction: {}", key.render()));
                }
            }
        }
        self.stack
            .assert_fact(&mut self.store, key, fact.existence)
            .map_err(|e| e.to_string())
    }

    /// Pre-populates built-in relations and the upper taxonomy from the
    /// embedded bundle. Idempotent.
    pub fn load_core(&mut self, include_index: bool) -> LoadOutcome {
        if self.core_loaded {
            return LoadOutcome {
                success: true,
                errors: Vec::new(),
            };
        }
        let outcome = self.learn(CORE_THEORY);
        if include_index {
            let labels: Vec<String> = self
                .store
                .concept_labels()
                .iter()
                .map(|l| l.to_string())
                .collect();
            let mut vocab = self.vocab.borrow_mut();
            for label in labels {
                vocab.get_or_create(&label, None, self.strategy.as_ref(), self.config.geometry);
            }
        }
        self.core_loaded = outcome.success;
        LoadOutcome {
            success: outcome.success,
            errors: outcome.errors,
        }
    }

    // ---- prove / query -------------------------------------------------

    fn settings(&self) -> ReasonerSettings {
        ReasonerSettings {
            priority: self.config.reasoning_priority,
            closed_world: self.config.closed_world_assumption,
            max_chain_depth: self.config.max_chain_depth,
            max_depth: self.config.max_depth,
            geometry: self.config.geometry,
            default_timeout_ms: self.config.default_timeout_ms,
        }
    }

    fn declare_goal_operators(&mut self, operators: &[String]) {
        for op in operators {
            self.ops.declare(op, OperatorProps::default());
        }
    }

    /// Records query usage for every ground symbol the goals mention.
    fn note_goal_usage(&mut self, goals: &[Expr]) {
        let mut symbols: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for goal in goals {
            for literal in goal.literals() {
                for arg in &literal.args {
                    if let Term::Symbol(s) = arg {
                        if seen.insert(s.clone()) {
                            symbols.push(s.clone());
                        }
                    }
                }
            }
        }
        for symbol in symbols {
            self.store.note_query(&symbol);
        }
    }

    fn parse_goals(&self, goals: &[String]) -> Result<Vec<Expr>, String> {
        let mut parsed = Vec::with_capacity(goals.len());
        for (index, goal) in goals.iter().enumerate() {
            match dsl::parse_goal_line(index as u32 + 1, goal) {
                Ok(line) => parsed.push(line.expr),
                Err(e) => return Err(format!("invalid_goal:{}", e)),
            }
        }
        Ok(parsed)
    }

    pub fn prove(&mut self, goal_dsl: &str, options: &ProveOptions) -> ProveResult {
        if self.closed {
            return ProveResult::invalid("none", "session_closed");
        }
        let validation = validate_question_dsl(goal_dsl);
        if !validation.valid {
            let reason = validation
                .reason
                .unwrap_or_else(|| "unknown".to_string());
            return ProveResult::invalid("validation", &format!("invalid_goal:{}", reason));
        }
        self.declare_goal_operators(&validation.declared_operators);
        let goals = match self.parse_goals(&validation.goals) {
            Ok(goals) => goals,
            Err(reason) => return ProveResult::invalid("validation", &reason),
        };
        self.note_goal_usage(&goals);

        let settings = self.settings();
        let reasoner = Reasoner::new(
            &self.store,
            &self.stack,
            &self.rules,
            &self.ops,
            self.strategy.as_ref(),
            &self.vocab,
            settings,
        );

        if goals.len() == 1 {
            return reasoner.prove(&goals[0], options);
        }

        let parts: Vec<ProveResult> = goals
            .iter()
            .map(|g| reasoner.prove(g, options))
            .collect();
        let logic = validation.goal_logic;
        let valid = match logic {
            GoalLogic::Or => parts.iter().any(|p| p.valid),
            _ => parts.iter().all(|p| p.valid),
        };
        let method = match logic {
            GoalLogic::Or => "compound_goal_or",
            _ => "compound_goal_and",
        };
        let validator_ok = parts.iter().all(|p| p.proof_object.validator_ok);
        let step_count = parts.iter().map(|p| p.step_count).sum();
        let reason = if valid {
            None
        } else {
            parts
                .iter()
                .find(|p| !p.valid)
                .and_then(|p| p.reason.clone())
        };
        ProveResult {
            valid,
            method: method.to_string(),
            reason,
            steps: Vec::new(),
            step_count,
            parts: Some(parts),
            proof_object: crate::reasoner::ProofObject { validator_ok },
        }
    }

    pub fn query(&mut self, goal_dsl: &str, options: &QueryOptions) -> QueryResult {
        if self.closed {
            return QueryResult {
                success: false,
                matches: Vec::new(),
                all_results: Vec::new(),
                error: Some("session_closed".to_string()),
            };
        }
        let validation = validate_question_dsl(goal_dsl);
        if !validation.valid {
            let reason = validation
                .reason
                .unwrap_or_else(|| "unknown".to_string());
            return QueryResult {
                success: false,
                matches: Vec::new(),
                all_results: Vec::new(),
                error: Some(format!("invalid_goal:{}", reason)),
            };
        }
        self.declare_goal_operators(&validation.declared_operators);
        let goals = match self.parse_goals(&validation.goals) {
            Ok(goals) => goals,
            Err(reason) => {
                return QueryResult {
                    success: false,
                    matches: Vec::new(),
                    all_results: Vec::new(),
                    error: Some(reason),
                }
            }
        };
        self.note_goal_usage(&goals);

        // compound query goals fold into one expression
        let combined = goals
            .into_iter()
            .reduce(|l, r| match validation.goal_logic {
                GoalLogic::Or => Expr::Or(Box::new(l), Box::new(r)),
                _ => Expr::And(Box::new(l), Box::new(r)),
            })
            .expect("validation guarantees at least one goal");

        let settings = self.settings();
        let reasoner = Reasoner::new(
            &self.store,
            &self.stack,
            &self.rules,
            &self.ops,
            self.strategy.as_ref(),
            &self.vocab,
            settings,
        );
        reasoner.query(&combined, options)
    }

    pub fn describe_result(&self, request: &DescribeRequest) -> String {
        self.describer.describe(request)
    }

    pub fn describe_prove(&self, result: &ProveResult, goal_dsl: &str) -> String {
        self.describe_result(&DescribeRequest {
            reasoning_result: ReasoningOutcome::Prove(result),
            query_dsl: goal_dsl,
        })
    }

    pub fn describe_query(&self, result: &QueryResult, goal_dsl: &str) -> String {
        self.describe_result(&DescribeRequest {
            reasoning_result: ReasoningOutcome::Query(result),
            query_dsl: goal_dsl,
        })
    }

    /// Releases in-memory state. Further operations fail with
    /// `session_closed`.
    pub fn close(&mut self) {
        self.closed = true;
        self.rules.clear();
        self.store = ConceptStore::new();
        self.stack = TheoryStack::new(self.config.max_layer_depth);
        self.vocab = RefCell::new(VocabIndex::new());
        info!("session closed");
    }
}
