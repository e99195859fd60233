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

//! Noema: a neuro-symbolic entailment engine over typed triples.
//!
//! Facts, rules and goals are written in a small line-oriented DSL; every
//! symbol is additionally grounded in a high-dimensional vector under a
//! pluggable algebra ([`hdc`]). The engine answers `prove` (boolean
//! entailment with a proof trace) and `query` (variable-binding
//! enumeration) over a concept store with an epistemic existence lattice
//! and a layered theory overlay.
//!
//! ```
//! use noema_lib::session::{Session, SessionConfig};
//! use noema_lib::reasoner::ProveOptions;
//!
//! let mut session = Session::new(SessionConfig::default()).unwrap();
//! session.learn("IS_A Dog mammal\nIS_A mammal animal\n");
//! let result = session.prove("IS_A Dog animal", &ProveOptions::default());
//! assert!(result.valid);
//! assert_eq!(result.method, "transitivity");
//! ```

pub mod describe;
pub mod dsl;
pub mod hdc;
pub mod logic;
pub mod reasoner;
pub mod session;
pub mod store;
pub mod theory;
pub mod unification;
pub mod validate;
pub mod vocab;

pub use describe::{DefaultDescriber, DescribeRequest, ReasoningOutcome, ResultDescriber};
pub use dsl::ParseError;
pub use hdc::{HdcStrategy, StrategyRegistry, Thresholds, Vector};
pub use reasoner::{
    answer_of, Binding, Match, ProveOptions, ProveResult, QueryOptions, QueryResult,
    ReasoningPriority,
};
pub use session::{ConfigError, LearnOutcome, LoadOutcome, Session, SessionConfig};
pub use store::{existence, AuditEvent, AuditSink, ConceptStore, Fact, FactKey, ForgetOptions};
pub use theory::{TheoryError, TheoryStack};
pub use validate::{validate_question_dsl, Action, GoalLogic, GoalValidation};
