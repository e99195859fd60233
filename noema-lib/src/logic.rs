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

//! Logical structures shared by the store, the DSL and the reasoner.
//!
//! A knowledge base is a set of ground [`Literal`]s (facts) plus a set of
//! [`Rule`]s whose premises are [`Expr`] trees over `And`/`Or`/`Not`/
//! `Implies`. Symbols are plain strings; their kind (relation, concept,
//! individual, variable, environment reference) is a naming convention,
//! not a type distinction.

use nom_locate::LocatedSpan;

use crate::unification::Rename;

use std::collections::HashSet;
use std::convert::TryInto;
use std::fmt;
use std::str;
use std::sync::atomic::{AtomicU32, Ordering};

pub static AVAILABLE_VARIABLE_INDEX: AtomicU32 = AtomicU32::new(0);

/// A relation symbol, e.g. `IS_A`.
#[derive(Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Predicate(pub String);

impl From<String> for Predicate {
    fn from(s: String) -> Self {
        Predicate(s)
    }
}

/// The naming convention the DSL exposes for symbols.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
    /// ALL_CAPS tokens, e.g. `IS_A`.
    Relation,
    /// Lowercase-initial tokens, e.g. `animal`.
    Concept,
    /// Capitalised-initial (or digit-initial) tokens, e.g. `Fido`.
    Individual,
    /// Tokens containing `?`.
    Variable,
    /// Tokens starting with `$`.
    EnvRef,
}

impl SymbolKind {
    pub fn classify(token: &str) -> SymbolKind {
        if token.contains('?') {
            return SymbolKind::Variable;
        }
        if token.starts_with('$') {
            return SymbolKind::EnvRef;
        }
        let mut chars = token.chars();
        match chars.next() {
            Some(c) if c.is_ascii_digit() => SymbolKind::Individual,
            Some(c) if c.is_uppercase() => {
                if token
                    .chars()
                    .all(|c| c.is_uppercase() || c.is_ascii_digit() || c == '_')
                {
                    SymbolKind::Relation
                } else {
                    SymbolKind::Individual
                }
            }
            _ => SymbolKind::Concept,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub enum Term {
    /// A ground symbol (concept, individual or relation token).
    Symbol(String),
    /// A `?x` variable; the name is stored without the question mark.
    Variable(String),
    /// A `$x` environment reference; resolved by the session, opaque here.
    EnvRef(String),
    AuxiliaryVariable(u32),
    RenamedVariable(u32, Box<Term>),
}

impl Term {
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Term::Symbol(s) => Some(&s[..]),
            _ => None,
        }
    }

    pub fn is_variable(&self) -> bool {
        !matches!(self, Term::Symbol(_) | Term::EnvRef(_))
    }

    /// Build a term from a DSL token, applying the naming convention.
    pub fn from_token(token: &str) -> Term {
        match SymbolKind::classify(token) {
            SymbolKind::Variable => {
                let name: String = token.chars().filter(|c| *c != '?').collect();
                Term::Variable(name)
            }
            SymbolKind::EnvRef => Term::EnvRef(token[1..].to_string()),
            _ => Term::Symbol(token.to_string()),
        }
    }

    pub fn variables(&self) -> HashSet<Term> {
        // the 'variables' of a term is just itself, unless it is ground
        let mut set = HashSet::new();
        if self.is_variable() {
            set.insert(self.clone());
        }
        set
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Symbol(s) => write!(f, "{}", s),
            Term::Variable(v) => write!(f, "?{}", v),
            Term::EnvRef(e) => write!(f, "${}", e),
            Term::AuxiliaryVariable(i) => write!(f, "?__aux_{}", i),
            Term::RenamedVariable(i, t) => write!(f, "{}__{}", t, i),
        }
    }
}

impl Rename<Term> for Term {
    fn rename(&self) -> Term {
        match self {
            Term::Symbol(_) | Term::EnvRef(_) => (*self).clone(),
            _ => {
                let index = AVAILABLE_VARIABLE_INDEX.fetch_add(1, Ordering::SeqCst);
                Term::RenamedVariable(index, Box::new((*self).clone()))
            }
        }
    }
}

impl crate::unification::Auxiliary for Term {
    fn aux() -> Term {
        let index = AVAILABLE_VARIABLE_INDEX.fetch_add(1, Ordering::SeqCst);
        Term::AuxiliaryVariable(index)
    }
}

/// Position of a statement in its source text.
///
/// Not to be confused with `parser::Span`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SpannedPosition {
    pub line: u32,

    /// Index of the column. Assumes ASCII text (i.e. each character is a byte).
    pub column: usize,

    /// The relative offset of this spanned position from the original input.
    pub offset: usize,
}

impl From<Span<'_>> for SpannedPosition {
    fn from(s: Span) -> Self {
        SpannedPosition {
            line: s.location_line(),
            column: s.get_column(),
            offset: s.location_offset(),
        }
    }
}

impl Default for SpannedPosition {
    fn default() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

pub type Span<'a> = LocatedSpan<&'a str>;

#[derive(Clone, Eq, Debug)]
pub struct Literal<T = Term> {
    pub position: Option<SpannedPosition>,
    pub predicate: Predicate,
    pub args: Vec<T>,
}

impl<T: PartialEq> PartialEq for Literal<T> {
    /// Positions are ignored; two literals are the same statement wherever
    /// they were written.
    fn eq(&self, other: &Self) -> bool {
        self.predicate == other.predicate && self.args == other.args
    }
}

impl<T: std::hash::Hash> std::hash::Hash for Literal<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // positions are ignored, matching PartialEq
        self.predicate.hash(state);
        self.args.hash(state);
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Signature(pub Predicate, pub u32);

impl Literal {
    pub fn new(predicate: &str, args: Vec<Term>) -> Literal {
        Literal {
            position: None,
            predicate: Predicate(predicate.to_string()),
            args,
        }
    }

    pub fn signature(&self) -> Signature {
        Signature(self.predicate.clone(), self.args.len().try_into().unwrap())
    }

    pub fn variables(&self) -> HashSet<Term> {
        self.args
            .iter()
            .map(|r| r.variables())
            .reduce(|mut l, r| {
                l.extend(r);
                l
            })
            .unwrap_or_default()
    }

    pub fn subject(&self) -> Option<&Term> {
        self.args.get(0)
    }

    pub fn object(&self) -> Option<&Term> {
        self.args.get(1)
    }

    /// Renders the literal the way facts are quoted in proof steps:
    /// `subject RELATION object …`.
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            return self.predicate.0.clone();
        }
        let mut out = self.args[0].to_string();
        out.push(' ');
        out.push_str(&self.predicate.0);
        for arg in &self.args[1..] {
            out.push(' ');
            out.push_str(&arg.to_string());
        }
        out
    }
}

/// An expression tree over literals, used for rule premises and goals.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Expr {
    Lit(Literal),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Implies(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn variables(&self) -> HashSet<Term> {
        match self {
            Expr::Lit(l) => l.variables(),
            Expr::Not(e) => e.variables(),
            Expr::And(l, r) | Expr::Or(l, r) | Expr::Implies(l, r) => {
                let mut vars = l.variables();
                vars.extend(r.variables());
                vars
            }
        }
    }

    /// All literals in the tree, in left-to-right order.
    pub fn literals(&self) -> Vec<&Literal> {
        match self {
            Expr::Lit(l) => vec![l],
            Expr::Not(e) => e.literals(),
            Expr::And(l, r) | Expr::Or(l, r) | Expr::Implies(l, r) => {
                let mut lits = l.literals();
                lits.extend(r.literals());
                lits
            }
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expr::Lit(l) => Some(l),
            _ => None,
        }
    }
}

impl From<Literal> for Expr {
    fn from(l: Literal) -> Self {
        Expr::Lit(l)
    }
}

/// A named rule: premise entails conclusion.
///
/// Variable scope is the rule instance; instances are renamed apart through
/// [`AVAILABLE_VARIABLE_INDEX`] before unification.
#[derive(Clone, PartialEq, Debug)]
pub struct Rule {
    pub name: String,
    pub premise: Expr,
    pub conclusion: Literal,
}

impl Rule {
    pub fn variables(&self) -> HashSet<Term> {
        let mut vars = self.premise.variables();
        vars.extend(self.conclusion.variables());
        vars
    }
}

pub trait Ground {
    fn is_ground(&self) -> bool;
}

impl Ground for Term {
    fn is_ground(&self) -> bool {
        !self.is_variable()
    }
}

impl Ground for Literal {
    fn is_ground(&self) -> bool {
        self.variables().is_empty()
    }
}

impl Ground for Expr {
    fn is_ground(&self) -> bool {
        self.variables().is_empty()
    }
}

/// Properties attached to a declared relation symbol.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct OperatorProps {
    pub transitive: bool,
    pub symmetric: bool,
    pub functional: bool,
    pub arity: Option<u32>,
}

/// Registry of declared relation symbols and their properties.
///
/// Relations in [`KNOWN_TRANSITIVE`] are treated as transitive whether or
/// not a declaration says so.
#[derive(Clone, Debug, Default)]
pub struct OperatorTable {
    ops: std::collections::HashMap<String, OperatorProps>,
}

lazy_static::lazy_static! {
    static ref KNOWN_TRANSITIVE: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("IS_A");
        s.insert("PART_OF");
        s.insert("SUBSET_OF");
        s.insert("LOCATED_IN");
        s.insert("BEFORE");
        s
    };
}

impl OperatorTable {
    pub fn new() -> OperatorTable {
        OperatorTable::default()
    }

    /// Registers a relation. Re-declaring merges properties (a property once
    /// granted is not revoked by a weaker re-declaration).
    pub fn declare(&mut self, name: &str, props: OperatorProps) {
        let entry = self.ops.entry(name.to_string()).or_default();
        entry.transitive |= props.transitive;
        entry.symmetric |= props.symmetric;
        entry.functional |= props.functional;
        if entry.arity.is_none() {
            entry.arity = props.arity;
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&OperatorProps> {
        self.ops.get(name)
    }

    pub fn is_transitive(&self, name: &str) -> bool {
        KNOWN_TRANSITIVE.contains(name)
            || self.ops.get(name).map(|p| p.transitive).unwrap_or(false)
    }

    pub fn is_symmetric(&self, name: &str) -> bool {
        self.ops.get(name).map(|p| p.symmetric).unwrap_or(false)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ops.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, self.1)
    }
}

fn display_sep<T: fmt::Display>(seq: &[T], sep: &str) -> String {
    seq.iter()
        .map(|t| t.to_string())
        .collect::<Vec<String>>()
        .join(sep)
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.args {
            [] => write!(f, "{}", self.predicate),
            _ => write!(f, "{} {}", self.predicate, display_sep(&self.args, " ")),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(l) => write!(f, "{}", l),
            Expr::And(l, r) => write!(f, "And({}, {})", l, r),
            Expr::Or(l, r) => write!(f, "Or({}, {})", l, r),
            Expr::Not(e) => write!(f, "Not({})", e),
            Expr::Implies(l, r) => write!(f, "Implies({}, {})", l, r),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}: {} => {}", self.name, self.premise, self.conclusion)
    }
}

impl str::FromStr for Literal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let span = Span::new(s);
        match parser::literal(span) {
            Result::Ok((_, o)) => Ok(o),
            Result::Err(e) => Result::Err(format!("{}", e)),
        }
    }
}

impl str::FromStr for Expr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let span = Span::new(s);
        match parser::expr(span) {
            Result::Ok((_, o)) => Ok(o),
            Result::Err(e) => Result::Err(format!("{}", e)),
        }
    }
}

/// Parsers for the goal-expression subset of the DSL.
///
/// The line-oriented learn grammar lives in [`crate::dsl`]; it reuses these
/// combinators for everything below statement level.
pub mod parser {
    use super::*;

    use nom::{
        branch::alt,
        bytes::complete::{tag, take_while1},
        character::complete::space0,
        combinator::{map, verify},
        error::VerboseError,
        multi::many1,
        sequence::{delimited, preceded, separated_pair, terminated},
    };
    use nom_locate::position;

    /// Redeclaration that uses VerboseError instead of the default nom::Error.
    pub type IResult<T, O> = nom::IResult<T, O, VerboseError<T>>;

    fn ws<'a, F: 'a, O>(inner: F) -> impl FnMut(Span<'a>) -> IResult<Span<'a>, O>
    where
        F: FnMut(Span<'a>) -> IResult<Span<'a>, O>,
    {
        delimited(space0, inner, space0)
    }

    fn is_token_char(c: char) -> bool {
        c.is_alphanumeric() || "_-.?$*=".contains(c)
    }

    pub fn token(i: Span) -> IResult<Span, Span> {
        take_while1(is_token_char)(i)
    }

    pub fn term(i: Span) -> IResult<Span, Term> {
        map(token, |s: Span| Term::from_token(s.fragment()))(i)
    }

    /// A space-separated literal: `RELATION arg1 arg2 …`, or the
    /// variable-first query form `?x RELATION arg…` (a bare `?` names the
    /// variable `x`).
    pub fn literal(i: Span) -> IResult<Span, Literal> {
        let (i, pos) = position(i)?;
        let (i, tokens) = many1(preceded(space0, verify(token, |t: &Span| {
            !matches!(*t.fragment(), "And" | "Or" | "Not" | "Implies")
        })))(i)?;

        let words: Vec<&str> = tokens.iter().map(|t| *t.fragment()).collect();
        let lit = literal_from_tokens(&words, Some(pos.into()));
        Ok((i, lit))
    }

    /// Shared token-list interpretation for goal lines. A leading variable
    /// token swaps into subject position: `?x IS_A Dog` and `? IS_A Dog`
    /// both mean `IS_A(?x, Dog)`.
    pub fn literal_from_tokens(words: &[&str], position: Option<SpannedPosition>) -> Literal {
        debug_assert!(!words.is_empty());
        let (predicate, mut rest): (&str, Vec<&str>) =
            if words.len() > 1 && SymbolKind::classify(words[0]) == SymbolKind::Variable {
                (words[1], {
                    let mut v = vec![words[0]];
                    v.extend(&words[2..]);
                    v
                })
            } else {
                (words[0], words[1..].to_vec())
            };
        // bare `?` variables get stable names x, y, z, …
        let mut next_anon = 0u32;
        let args = rest
            .drain(..)
            .map(|w| {
                if w == "?" {
                    let name = match next_anon {
                        0 => "x".to_string(),
                        1 => "y".to_string(),
                        2 => "z".to_string(),
                        n => format!("v{}", n),
                    };
                    next_anon += 1;
                    Term::Variable(name)
                } else {
                    Term::from_token(w)
                }
            })
            .collect();
        Literal {
            position,
            predicate: Predicate(predicate.to_string()),
            args,
        }
    }

    fn parenthesized<'a, F: 'a, O>(inner: F) -> impl FnMut(Span<'a>) -> IResult<Span<'a>, O>
    where
        F: FnMut(Span<'a>) -> IResult<Span<'a>, O>,
    {
        delimited(terminated(tag("("), space0), inner, preceded(space0, tag(")")))
    }

    fn binary<'a>(
        name: &'static str,
        mk: fn(Box<Expr>, Box<Expr>) -> Expr,
    ) -> impl FnMut(Span<'a>) -> IResult<Span<'a>, Expr> {
        move |i| {
            map(
                preceded(
                    tag(name),
                    parenthesized(separated_pair(expr, ws(tag(",")), expr)),
                ),
                |(l, r)| mk(Box::new(l), Box::new(r)),
            )(i)
        }
    }

    pub fn expr(i: Span) -> IResult<Span, Expr> {
        alt((
            map(preceded(tag("Not"), parenthesized(expr)), |e| {
                Expr::Not(Box::new(e))
            }),
            binary("And", Expr::And),
            binary("Or", Expr::Or),
            binary("Implies", Expr::Implies),
            map(literal, Expr::Lit),
        ))(i)
    }
}
