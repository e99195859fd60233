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

//! Validation of question DSL: splits a blob into goal statements,
//! resolves the combination logic and the action, and extracts declared
//! operators. Pure and total: identical input gives identical output and
//! no input panics.

use serde::Serialize;

use crate::dsl::{self, parser::leading_tag};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalLogic {
    Single,
    And,
    Or,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Prove,
    Query,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct GoalValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub goals: Vec<String>,
    pub goal_logic: GoalLogic,
    pub action: Action,
    pub declared_operators: Vec<String>,
}

impl GoalValidation {
    fn invalid(reason: &str) -> GoalValidation {
        GoalValidation {
            valid: false,
            reason: Some(reason.to_string()),
            goals: Vec::new(),
            goal_logic: GoalLogic::Single,
            action: Action::Prove,
            declared_operators: Vec::new(),
        }
    }
}

fn infer_action(goals: &[String]) -> Action {
    if goals.iter().any(|g| g.contains('?')) {
        Action::Query
    } else {
        Action::Prove
    }
}

pub fn validate_question_dsl(text: &str) -> GoalValidation {
    if text.trim().is_empty() {
        return GoalValidation::invalid("empty_question_dsl");
    }

    let (statements, pragmas) = dsl::split_statements(text);
    if statements.is_empty() {
        return GoalValidation::invalid("no_statements");
    }

    let pragma_logic = match pragmas.goal_logic.as_deref() {
        Some("And") => Some(GoalLogic::And),
        Some("Or") => Some(GoalLogic::Or),
        _ => None, // unknown control comments are ignored
    };
    let pragma_action = match pragmas.action.as_deref() {
        Some("prove") => Some(Action::Prove),
        Some("query") => Some(Action::Query),
        _ => None,
    };

    if statements.len() == 1 {
        let (_, line) = &statements[0];
        let (_, rest) = leading_tag(line);
        let normalized = rest.trim().to_string();
        if normalized.is_empty() {
            return GoalValidation::invalid("no_statements");
        }
        let goals = vec![normalized];
        let action = pragma_action.unwrap_or_else(|| infer_action(&goals));
        return GoalValidation {
            valid: true,
            reason: None,
            goals,
            goal_logic: GoalLogic::Single,
            action,
            declared_operators: pragmas.declare_ops,
        };
    }

    let mut goals = Vec::with_capacity(statements.len());
    for (_, line) in &statements {
        let (tag, rest) = leading_tag(line);
        match tag {
            Some(tag) if tag.is_goal() => goals.push(rest.trim().to_string()),
            _ => return GoalValidation::invalid("multi_statement_no_goal"),
        }
    }
    let action = pragma_action.unwrap_or_else(|| infer_action(&goals));
    GoalValidation {
        valid: true,
        reason: None,
        goals,
        goal_logic: pragma_logic.unwrap_or(GoalLogic::And),
        action,
        declared_operators: pragmas.declare_ops,
    }
}
