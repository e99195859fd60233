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

//! Turning reasoning results into text.
//!
//! The describer is a swappable seam: hosts plug in localisation or
//! different registers. Implementations must be total — any result, a
//! string out, no panics.

use itertools::Itertools;

use crate::reasoner::{ProveResult, QueryResult};

/// What the session hands to the describer.
pub enum ReasoningOutcome<'a> {
    Prove(&'a ProveResult),
    Query(&'a QueryResult),
}

pub struct DescribeRequest<'a> {
    pub reasoning_result: ReasoningOutcome<'a>,
    pub query_dsl: &'a str,
}

/// `Send` so a session can move to its worker thread whole.
pub trait ResultDescriber: Send {
    fn describe(&self, request: &DescribeRequest) -> String;
}

/// Plain-English rendering of a result.
pub struct DefaultDescriber;

impl ResultDescriber for DefaultDescriber {
    fn describe(&self, request: &DescribeRequest) -> String {
        let goal = request.query_dsl.trim();
        match &request.reasoning_result {
            ReasoningOutcome::Prove(result) => {
                if result.valid {
                    let steps = match result.step_count {
                        0 => String::new(),
                        1 => " in 1 step".to_string(),
                        n => format!(" in {} steps", n),
                    };
                    format!(
                        "The goal `{}` holds by {}{}.",
                        goal, result.method, steps
                    )
                } else {
                    match result.reason.as_deref() {
                        Some(reason) => format!(
                            "The goal `{}` could not be established ({}).",
                            goal, reason
                        ),
                        None => format!("The goal `{}` could not be established.", goal),
                    }
                }
            }
            ReasoningOutcome::Query(result) => {
                if let Some(error) = &result.error {
                    return format!("The query `{}` failed ({}).", goal, error);
                }
                if result.all_results.is_empty() {
                    return format!("The query `{}` has no answers.", goal);
                }
                let answers = result
                    .all_results
                    .iter()
                    .map(|m| m.answers().join(", "))
                    .join("; ");
                format!(
                    "The query `{}` has {} answer{}: {}.",
                    goal,
                    result.all_results.len(),
                    if result.all_results.len() == 1 { "" } else { "s" },
                    answers
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoner::{Binding, Match, ProofObject};

    #[test]
    fn describes_prove_results() {
        let describer = DefaultDescriber;
        let result = ProveResult {
            valid: true,
            method: "direct".to_string(),
            reason: None,
            steps: Vec::new(),
            step_count: 1,
            parts: None,
            proof_object: ProofObject { validator_ok: true },
        };
        let text = describer.describe(&DescribeRequest {
            reasoning_result: ReasoningOutcome::Prove(&result),
            query_dsl: "IS_A Dog animal",
        });
        assert_eq!(text, "The goal `IS_A Dog animal` holds by direct in 1 step.");

        let failed = ProveResult::invalid("none", "no_proof_found");
        let text = describer.describe(&DescribeRequest {
            reasoning_result: ReasoningOutcome::Prove(&failed),
            query_dsl: "IS_A Dog reptile",
        });
        assert!(text.contains("no_proof_found"));
    }

    #[test]
    fn describes_query_results() {
        let describer = DefaultDescriber;
        let result = QueryResult {
            success: true,
            matches: vec![Match {
                bindings: vec![(
                    "?x".to_string(),
                    Binding::Answer {
                        answer: "Fido".to_string(),
                        value: None,
                    },
                )],
            }],
            all_results: vec![Match {
                bindings: vec![(
                    "?x".to_string(),
                    Binding::Answer {
                        answer: "Fido".to_string(),
                        value: None,
                    },
                )],
            }],
            error: None,
        };
        let text = describer.describe(&DescribeRequest {
            reasoning_result: ReasoningOutcome::Query(&result),
            query_dsl: "? IS_A Dog",
        });
        assert_eq!(text, "The query `? IS_A Dog` has 1 answer: Fido.");
    }
}
