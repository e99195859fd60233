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

//! The line-oriented DSL.
//!
//! A learn input is a newline-separated sequence of statements: fact
//! assertions, operator declarations, `@name BEGIN … END` rule blocks,
//! retractions and maintenance commands, interspersed with `//` comments
//! and control pragmas. Parsing is tolerant: a malformed line yields a
//! [`ParseError`] carrying line and column, never a panic, and never
//! aborts the rest of the input.

use codespan_reporting::diagnostic::{Diagnostic, Label};
use thiserror::Error;

use crate::logic::{
    parser as lp, Expr, Literal, OperatorProps, Span, SpannedPosition, SymbolKind,
};
use crate::store::{existence, ForgetOptions};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}:{column}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    fn at(line: u32, column: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Renders the error as a diagnostic against its source text, for
    /// terminal reporting.
    pub fn to_diagnostic(&self, source: &str) -> Diagnostic<()> {
        let mut offset = 0usize;
        let mut range = 0..source.len().min(1);
        for (index, text) in source.lines().enumerate() {
            if index as u32 + 1 == self.line {
                let start = offset + self.column.saturating_sub(1).min(text.len());
                let end = (start + 1).min(source.len()).max(start);
                range = start..end;
                break;
            }
            offset += text.len() + 1;
        }
        Diagnostic::error()
            .with_message(self.message.clone())
            .with_labels(vec![Label::primary((), range)])
    }
}

/// `@name[:qualifier]` prefix of a statement.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tag {
    pub name: String,
    pub qualifier: Option<String>,
}

impl Tag {
    /// Goal lines in multi-statement questions are tagged `@goal…`/`@g…`.
    pub fn is_goal(&self) -> bool {
        self.name.starts_with('g')
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct FactLine {
    pub tag: Option<Tag>,
    pub relation: String,
    pub args: Vec<String>,
    pub existence: i8,
    pub position: SpannedPosition,
}

#[derive(Clone, PartialEq, Debug)]
pub struct OperatorDecl {
    pub name: String,
    pub props: OperatorProps,
    pub position: SpannedPosition,
}

#[derive(Clone, PartialEq, Debug)]
pub struct RuleDef {
    pub name: String,
    pub body: Vec<Expr>,
    pub head: Literal,
    pub position: SpannedPosition,
}

#[derive(Clone, PartialEq, Debug)]
pub struct GoalLine {
    pub tag: Option<Tag>,
    pub expr: Expr,
    /// The statement with any `@…` prefix stripped.
    pub text: String,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Statement {
    Fact(FactLine),
    Retract(FactLine),
    OperatorDecl(OperatorDecl),
    Rule(RuleDef),
    Protect(String),
    Unprotect(String),
    Boost { label: String, amount: Option<u64> },
    Forget(ForgetOptions),
}

/// Control pragmas recognised in comments. First occurrence wins; unknown
/// control comments are treated as plain comments.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Pragmas {
    pub goal_logic: Option<String>,
    pub action: Option<String>,
    pub declare_ops: Vec<String>,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub errors: Vec<ParseError>,
    pub pragmas: Pragmas,
}

/// Splits a question blob into its surviving statement lines (comments
/// and blanks stripped) while collecting pragmas. Statement order is
/// preserved.
pub fn split_statements(text: &str) -> (Vec<(u32, String)>, Pragmas) {
    let mut pragmas = Pragmas::default();
    let mut statements = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line_no = index as u32 + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix("//") {
            scan_pragma(comment, &mut pragmas);
            continue;
        }
        statements.push((line_no, line.to_string()));
    }
    (statements, pragmas)
}

fn scan_pragma(comment: &str, pragmas: &mut Pragmas) {
    let comment = comment.trim();
    if let Some(value) = comment.strip_prefix("goal_logic:") {
        if pragmas.goal_logic.is_none() {
            pragmas.goal_logic = Some(value.trim().to_string());
        }
    } else if let Some(value) = comment.strip_prefix("action:") {
        if pragmas.action.is_none() {
            pragmas.action = Some(value.trim().to_string());
        }
    } else if let Some(value) = comment.strip_prefix("declare_ops:") {
        for op in value.split(',') {
            let op = op.trim();
            if !op.is_empty() && !pragmas.declare_ops.iter().any(|o| o == op) {
                pragmas.declare_ops.push(op.to_string());
            }
        }
    }
}

/// Parses a learn input. Statements parse independently; a failing line
/// (or `BEGIN … END` block) contributes an error without affecting its
/// neighbours.
pub fn parse_learn(text: &str) -> Program {
    let mut program = Program::default();
    let mut lines = text.lines().enumerate().peekable();
    while let Some((index, raw)) = lines.next() {
        let line_no = index as u32 + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix("//") {
            scan_pragma(comment, &mut program.pragmas);
            continue;
        }

        if let Some(name) = parser::rule_block_start(line) {
            // collect the block body up to END; the block is atomic
            let mut body_lines: Vec<(u32, String)> = Vec::new();
            let mut closed = false;
            for (body_index, body_raw) in &mut lines {
                let body_line = body_raw.trim();
                if body_line == "END" {
                    closed = true;
                    break;
                }
                if body_line.is_empty() || body_line.starts_with("//") {
                    continue;
                }
                body_lines.push((body_index as u32 + 1, body_line.to_string()));
            }
            if !closed {
                program
                    .errors
                    .push(ParseError::at(line_no, 1, "unterminated BEGIN block"));
                continue;
            }
            match parser::rule_block(name, line_no, &body_lines) {
                Ok(rule) => program.statements.push(Statement::Rule(rule)),
                Err(e) => program.errors.push(e),
            }
            continue;
        }

        match parser::statement(line_no, line) {
            Ok(statement) => program.statements.push(statement),
            Err(e) => program.errors.push(e),
        }
    }
    program
}

/// Parses one goal statement: `OP arg…` or `@name[:tag] OP arg…`, with
/// the functional `Not`/`And`/`Or`/`Implies` forms allowed.
pub fn parse_goal_line(line_no: u32, text: &str) -> Result<GoalLine, ParseError> {
    let text = text.trim();
    let (tag, rest) = parser::leading_tag(text);
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(ParseError::at(line_no, 1, "empty goal"));
    }
    let expr = parser::full_expr(line_no, rest)?;
    Ok(GoalLine {
        tag,
        expr,
        text: rest.to_string(),
    })
}

pub mod parser {
    use super::*;

    use nom::{
        bytes::complete::{tag, take_while1},
        character::complete::space0,
        combinator::{all_consuming, map},
        multi::many1,
        sequence::{preceded, terminated},
    };

    use crate::logic::parser::IResult;

    /// `@name[:qualifier]` at the start of a statement. Not a nom parser
    /// because the remainder is handed to different grammars.
    pub fn leading_tag(text: &str) -> (Option<Tag>, &str) {
        if !text.starts_with('@') {
            return (None, text);
        }
        let body = &text[1..];
        let end = body
            .find(|c: char| c.is_whitespace())
            .unwrap_or(body.len());
        let (head, rest) = body.split_at(end);
        let tag = match head.split_once(':') {
            Some((name, qualifier)) => Tag {
                name: name.to_string(),
                qualifier: Some(qualifier.to_string()),
            },
            None => Tag {
                name: head.to_string(),
                qualifier: None,
            },
        };
        (Some(tag), rest)
    }

    /// `@name BEGIN` opens a rule block.
    pub fn rule_block_start(line: &str) -> Option<String> {
        let (tag, rest) = leading_tag(line);
        match (tag, rest.trim()) {
            (Some(tag), "BEGIN") if tag.qualifier.is_none() => Some(tag.name),
            _ => None,
        }
    }

    fn tokens(i: Span) -> IResult<Span, Vec<String>> {
        many1(preceded(
            space0,
            map(lp::token, |t: Span| t.fragment().to_string()),
        ))(i)
    }

    fn err_at<T>(line_no: u32, result: Result<T, nom::Err<nom::error::VerboseError<Span>>>,
    ) -> Result<T, ParseError> {
        result.map_err(|e| {
            let column = match &e {
                nom::Err::Error(ve) | nom::Err::Failure(ve) => ve
                    .errors
                    .first()
                    .map(|(span, _)| span.get_column())
                    .unwrap_or(1),
                nom::Err::Incomplete(_) => 1,
            };
            ParseError::at(line_no, column, "malformed statement")
        })
    }

    /// Parses an expression and requires it to consume the whole line.
    pub fn full_expr(line_no: u32, text: &str) -> Result<Expr, ParseError> {
        let span = Span::new(text);
        let parsed = err_at(
            line_no,
            all_consuming(terminated(lp::expr, space0))(span),
        )?;
        Ok(parsed.1)
    }

    fn key_value(i: Span) -> IResult<Span, (String, String)> {
        let (i, key) = take_while1(|c: char| c.is_alphanumeric() || c == '_')(i)?;
        let (i, _) = tag("=")(i)?;
        let (i, value) = lp::token(i)?;
        Ok((i, (key.fragment().to_string(), value.fragment().to_string())))
    }

    fn existence_suffix(words: &mut Vec<String>, line_no: u32) -> Result<Option<i8>, ParseError> {
        let last = match words.last() {
            Some(last) if last.starts_with("_existence=") => last.clone(),
            _ => return Ok(None),
        };
        words.pop();
        let value = &last["_existence=".len()..];
        existence::from_name(value)
            .or_else(|| value.parse::<i8>().ok())
            .map(Some)
            .ok_or_else(|| {
                ParseError::at(line_no, 1, format!("unknown existence level: {}", value))
            })
    }

    /// The `IS_A` family carries its existence level in the relation name.
    fn relation_existence(relation: &str) -> (String, i8) {
        match relation {
            "IS_A_CERTAIN" => ("IS_A".to_string(), existence::CERTAIN),
            "IS_A_PROVEN" => ("IS_A".to_string(), existence::DEMONSTRATED),
            "IS_A_POSSIBLE" => ("IS_A".to_string(), existence::POSSIBLE),
            "IS_A_UNPROVEN" => ("IS_A".to_string(), existence::UNPROVEN),
            _ => (relation.to_string(), existence::CERTAIN),
        }
    }

    fn fact_from_tokens(
        tag: Option<Tag>,
        mut words: Vec<String>,
        line_no: u32,
    ) -> Result<FactLine, ParseError> {
        let level = existence_suffix(&mut words, line_no)?;
        if words.len() < 3 {
            return Err(ParseError::at(
                line_no,
                1,
                "a fact needs a relation and at least two arguments",
            ));
        }
        for word in &words[1..] {
            if SymbolKind::classify(word) == SymbolKind::Variable {
                return Err(ParseError::at(
                    line_no,
                    1,
                    format!("variables are not allowed in facts: {}", word),
                ));
            }
        }
        let (relation, relation_level) = relation_existence(&words[0]);
        Ok(FactLine {
            tag,
            relation,
            args: words.split_off(1),
            existence: level.unwrap_or(relation_level),
            position: SpannedPosition {
                line: line_no,
                column: 1,
                offset: 0,
            },
        })
    }

    fn forget_options(words: &[String], line_no: u32) -> Result<ForgetOptions, ParseError> {
        let mut options = ForgetOptions::default();
        for word in words {
            if word == "dryRun" {
                options.dry_run = true;
                continue;
            }
            let span = Span::new(word.as_str());
            let (_, (key, value)) = err_at(line_no, all_consuming(key_value)(span))?;
            match key.as_str() {
                "threshold" => {
                    options.threshold = Some(value.parse().map_err(|_| {
                        ParseError::at(line_no, 1, format!("bad threshold: {}", value))
                    })?)
                }
                "olderThan" => options.older_than = Some(value),
                "concept" => options.concept = Some(value),
                "pattern" => options.pattern = Some(value),
                _ => {
                    return Err(ParseError::at(
                        line_no,
                        1,
                        format!("unknown forget option: {}", key),
                    ))
                }
            }
        }
        Ok(options)
    }

    fn operator_decl(
        tag: Tag,
        words: &[String],
        line_no: u32,
    ) -> Result<OperatorDecl, ParseError> {
        let mut props = OperatorProps::default();
        for word in &words[1..] {
            match word.as_str() {
                "transitive" => props.transitive = true,
                "symmetric" => props.symmetric = true,
                "functional" => props.functional = true,
                w if w.starts_with("arity=") => {
                    props.arity =
                        Some(w["arity=".len()..].parse().map_err(|_| {
                            ParseError::at(line_no, 1, format!("bad arity: {}", w))
                        })?)
                }
                w => {
                    return Err(ParseError::at(
                        line_no,
                        1,
                        format!("unknown operator property: {}", w),
                    ))
                }
            }
        }
        Ok(OperatorDecl {
            name: tag.name,
            props,
            position: SpannedPosition {
                line: line_no,
                column: 1,
                offset: 0,
            },
        })
    }

    /// One learn statement (everything except `BEGIN … END`, which the
    /// caller assembles).
    pub fn statement(line_no: u32, line: &str) -> Result<Statement, ParseError> {
        let (tag, rest) = leading_tag(line);
        let rest = rest.trim();
        if rest.is_empty() {
            return Err(ParseError::at(line_no, 1, "statement expected after tag"));
        }

        let span = Span::new(rest);
        let (_, words) = err_at(line_no, all_consuming(terminated(tokens, space0))(span))?;

        // operator declaration: `@NAME:rel __Relation [properties…]`
        if let Some(tag) = &tag {
            if tag.qualifier.as_deref() == Some("rel") {
                if words.first().map(|w| w.as_str()) != Some("__Relation") {
                    return Err(ParseError::at(
                        line_no,
                        1,
                        "operator declarations start with __Relation",
                    ));
                }
                return Ok(Statement::OperatorDecl(operator_decl(
                    tag.clone(),
                    &words,
                    line_no,
                )?));
            }
        }

        match words[0].as_str() {
            "RETRACT" => {
                let inner = fact_from_tokens(tag, words[1..].to_vec(), line_no)?;
                Ok(Statement::Retract(inner))
            }
            "PROTECT" | "UNPROTECT" | "BOOST" => {
                let label = words.get(1).cloned().ok_or_else(|| {
                    ParseError::at(line_no, 1, format!("{} needs a label", words[0]))
                })?;
                match words[0].as_str() {
                    "PROTECT" => Ok(Statement::Protect(label)),
                    "UNPROTECT" => Ok(Statement::Unprotect(label)),
                    _ => {
                        let amount = match words.get(2) {
                            Some(w) => Some(w.parse().map_err(|_| {
                                ParseError::at(line_no, 1, format!("bad boost amount: {}", w))
                            })?),
                            None => None,
                        };
                        Ok(Statement::Boost { label, amount })
                    }
                }
            }
            "FORGET" => Ok(Statement::Forget(forget_options(&words[1..], line_no)?)),
            _ => Ok(Statement::Fact(fact_from_tokens(tag, words, line_no)?)),
        }
    }

    /// Assembles a `@name BEGIN … END` block: body goal lines conjoined,
    /// the final `return` line is the head.
    pub fn rule_block(
        name: String,
        start_line: u32,
        body_lines: &[(u32, String)],
    ) -> Result<RuleDef, ParseError> {
        let mut body = Vec::new();
        let mut head: Option<Literal> = None;
        for (line_no, line) in body_lines {
            if let Some(rest) = line.strip_prefix("return ") {
                if head.is_some() {
                    return Err(ParseError::at(*line_no, 1, "duplicate return in rule"));
                }
                let expr = full_expr(*line_no, rest.trim())?;
                match expr {
                    Expr::Lit(l) => head = Some(l),
                    _ => {
                        return Err(ParseError::at(
                            *line_no,
                            1,
                            "rule head must be a plain literal",
                        ))
                    }
                }
            } else {
                body.push(full_expr(*line_no, line)?);
            }
        }
        let head = head
            .ok_or_else(|| ParseError::at(start_line, 1, "rule block without a return line"))?;
        if body.is_empty() {
            return Err(ParseError::at(start_line, 1, "rule block without premises"));
        }
        Ok(RuleDef {
            name,
            body,
            head,
            position: SpannedPosition {
                line: start_line,
                column: 1,
                offset: 0,
            },
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::Predicate;

    #[test]
    fn parses_plain_fact() {
        let program = parse_learn("IS_A Dog animal\n");
        assert!(program.errors.is_empty());
        match &program.statements[0] {
            Statement::Fact(f) => {
                assert_eq!(f.relation, "IS_A");
                assert_eq!(f.args, vec!["Dog", "animal"]);
                assert_eq!(f.existence, existence::CERTAIN);
            }
            s => panic!("unexpected statement {:?}", s),
        }
    }

    #[test]
    fn is_a_variants_set_existence() {
        let program = parse_learn("IS_A_POSSIBLE Unicorn Horse\nIS_A_UNPROVEN Yeti ape\n");
        let levels: Vec<i8> = program
            .statements
            .iter()
            .map(|s| match s {
                Statement::Fact(f) => f.existence,
                _ => panic!(),
            })
            .collect();
        assert_eq!(levels, vec![existence::POSSIBLE, existence::UNPROVEN]);
    }

    #[test]
    fn existence_suffix_overrides() {
        let program = parse_learn("HAS Dog fur _existence=POSSIBLE\n");
        match &program.statements[0] {
            Statement::Fact(f) => {
                assert_eq!(f.existence, existence::POSSIBLE);
                assert_eq!(f.args, vec!["Dog", "fur"]);
            }
            s => panic!("unexpected statement {:?}", s),
        }
    }

    #[test]
    fn tagged_fact_keeps_tag() {
        let program = parse_learn("@axiom:export IS_A Dog animal\n");
        match &program.statements[0] {
            Statement::Fact(f) => {
                let tag = f.tag.as_ref().unwrap();
                assert_eq!(tag.name, "axiom");
                assert_eq!(tag.qualifier.as_deref(), Some("export"));
            }
            s => panic!("unexpected statement {:?}", s),
        }
    }

    #[test]
    fn operator_declaration() {
        let program = parse_learn("@ANCESTOR_OF:rel __Relation transitive arity=2\n");
        match &program.statements[0] {
            Statement::OperatorDecl(d) => {
                assert_eq!(d.name, "ANCESTOR_OF");
                assert!(d.props.transitive);
                assert_eq!(d.props.arity, Some(2));
                assert!(!d.props.symmetric);
            }
            s => panic!("unexpected statement {:?}", s),
        }
    }

    #[test]
    fn rule_block() {
        let text = "@grandparent BEGIN\n\
                    PARENT_OF ?x ?y\n\
                    PARENT_OF ?y ?z\n\
                    return GRANDPARENT_OF ?x ?z\n\
                    END\n";
        let program = parse_learn(text);
        assert!(program.errors.is_empty(), "{:?}", program.errors);
        match &program.statements[0] {
            Statement::Rule(r) => {
                assert_eq!(r.name, "grandparent");
                assert_eq!(r.body.len(), 2);
                assert_eq!(r.head.predicate, Predicate("GRANDPARENT_OF".into()));
            }
            s => panic!("unexpected statement {:?}", s),
        }
    }

    #[test]
    fn unterminated_block_is_one_error() {
        let program = parse_learn("@r BEGIN\nPARENT_OF ?x ?y\n");
        assert_eq!(program.errors.len(), 1);
        assert!(program.errors[0].message.contains("unterminated"));
    }

    #[test]
    fn retract_and_commands() {
        let text = "RETRACT IS_A Dog reptile\n\
                    PROTECT Animal\n\
                    UNPROTECT Animal\n\
                    BOOST Dog 5\n\
                    FORGET threshold=10 olderThan=30d dryRun\n";
        let program = parse_learn(text);
        assert!(program.errors.is_empty(), "{:?}", program.errors);
        assert!(matches!(program.statements[0], Statement::Retract(_)));
        assert!(matches!(program.statements[1], Statement::Protect(_)));
        assert!(matches!(program.statements[2], Statement::Unprotect(_)));
        match &program.statements[3] {
            Statement::Boost { label, amount } => {
                assert_eq!(label, "Dog");
                assert_eq!(*amount, Some(5));
            }
            s => panic!("unexpected statement {:?}", s),
        }
        match &program.statements[4] {
            Statement::Forget(o) => {
                assert_eq!(o.threshold, Some(10));
                assert_eq!(o.older_than.as_deref(), Some("30d"));
                assert!(o.dry_run);
            }
            s => panic!("unexpected statement {:?}", s),
        }
    }

    #[test]
    fn errors_do_not_abort_the_batch() {
        let program = parse_learn("IS_A Dog\nIS_A Cat animal\nHAS ?x fur\n");
        assert_eq!(program.statements.len(), 1);
        assert_eq!(program.errors.len(), 2);
        assert_eq!(program.errors[0].line, 1);
        assert_eq!(program.errors[1].line, 3);
        assert!(program.errors[1].message.contains("variables"));
    }

    #[test]
    fn pragmas_first_occurrence_wins() {
        let (statements, pragmas) = split_statements(
            "// goal_logic: And\n// goal_logic: Or\n// declare_ops: LIKES, HAS\n// action: prove\nIS_A Dog animal\n",
        );
        assert_eq!(statements.len(), 1);
        assert_eq!(pragmas.goal_logic.as_deref(), Some("And"));
        assert_eq!(pragmas.action.as_deref(), Some("prove"));
        assert_eq!(pragmas.declare_ops, vec!["LIKES", "HAS"]);
    }

    #[test]
    fn goal_line_with_tag_prefix() {
        let goal = parse_goal_line(1, "@goal1:case IS_A Dog animal").unwrap();
        assert_eq!(goal.text, "IS_A Dog animal");
        assert!(goal.tag.unwrap().is_goal());

        let goal = parse_goal_line(1, "Not(IS_A Dog reptile)").unwrap();
        assert!(matches!(goal.expr, Expr::Not(_)));

        assert!(parse_goal_line(1, "@goal ").is_err());
    }
}
