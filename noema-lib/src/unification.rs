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

//! Substitutions, unification and variable renaming.
//!
//! Terms are flat (there are no function symbols), so unification is a
//! walk over argument pairs with chained variable resolution.

use std::collections::HashMap;

use crate::logic::{Expr, Literal, Rule, Term};

/// A mapping from variables to terms.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Substitution(HashMap<Term, Term>);

impl Substitution {
    pub fn new() -> Substitution {
        Substitution(HashMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, v: &Term) -> Option<&Term> {
        self.0.get(v)
    }

    pub fn insert(&mut self, v: Term, t: Term) {
        self.0.insert(v, t);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Term, &Term)> {
        self.0.iter()
    }

    /// Follows variable chains until a ground term or an unbound variable.
    pub fn walk<'a>(&'a self, t: &'a Term) -> &'a Term {
        let mut current = t;
        // bounded by the substitution size; chains cannot cycle because
        // bindings are only ever created variable -> walked term
        for _ in 0..=self.0.len() {
            match self.0.get(current) {
                Some(next) => current = next,
                None => return current,
            }
        }
        current
    }
}

impl std::iter::FromIterator<(Term, Term)> for Substitution {
    fn from_iter<I: IntoIterator<Item = (Term, Term)>>(iter: I) -> Self {
        Substitution(iter.into_iter().collect())
    }
}

pub trait Substitute {
    type Output;
    fn substitute(&self, s: &Substitution) -> Self::Output;
}

impl Substitute for Term {
    type Output = Term;
    fn substitute(&self, s: &Substitution) -> Term {
        s.walk(self).clone()
    }
}

impl Substitute for Literal {
    type Output = Literal;
    fn substitute(&self, s: &Substitution) -> Literal {
        Literal {
            position: self.position.clone(),
            predicate: self.predicate.clone(),
            args: self.args.iter().map(|t| t.substitute(s)).collect(),
        }
    }
}

impl Substitute for Expr {
    type Output = Expr;
    fn substitute(&self, s: &Substitution) -> Expr {
        match self {
            Expr::Lit(l) => Expr::Lit(l.substitute(s)),
            Expr::Not(e) => Expr::Not(Box::new(e.substitute(s))),
            Expr::And(l, r) => {
                Expr::And(Box::new(l.substitute(s)), Box::new(r.substitute(s)))
            }
            Expr::Or(l, r) => Expr::Or(Box::new(l.substitute(s)), Box::new(r.substitute(s))),
            Expr::Implies(l, r) => {
                Expr::Implies(Box::new(l.substitute(s)), Box::new(r.substitute(s)))
            }
        }
    }
}

impl Substitute for Vec<Literal> {
    type Output = Vec<Literal>;
    fn substitute(&self, s: &Substitution) -> Vec<Literal> {
        self.iter().map(|l| l.substitute(s)).collect()
    }
}

/// `l` then `r`: applies `r` to the range of `l` and keeps `r`'s extra
/// bindings.
pub fn compose_extend(l: &Substitution, r: &Substitution) -> Substitution {
    let mut out = Substitution::new();
    for (v, t) in l.iter() {
        out.insert(v.clone(), t.substitute(r));
    }
    for (v, t) in r.iter() {
        if out.get(v).is_none() {
            out.insert(v.clone(), t.clone());
        }
    }
    out
}

/// `l` then `r` restricted to `l`'s domain.
pub fn compose_no_extend(l: &Substitution, r: &Substitution) -> Substitution {
    let mut out = Substitution::new();
    for (v, t) in l.iter() {
        out.insert(v.clone(), t.substitute(r));
    }
    out
}

/// Most general unifier of two literals, if one exists.
pub fn unify(a: &Literal, b: &Literal) -> Option<Substitution> {
    if a.predicate != b.predicate || a.args.len() != b.args.len() {
        return None;
    }
    let mut sub = Substitution::new();
    for (x, y) in a.args.iter().zip(b.args.iter()) {
        let x = sub.walk(x).clone();
        let y = sub.walk(y).clone();
        if x == y {
            continue;
        }
        match (&x, &y) {
            (v, t) if v.is_variable() => sub.insert(v.clone(), t.clone()),
            (t, v) if v.is_variable() => sub.insert(v.clone(), t.clone()),
            _ => return None,
        }
    }
    Some(sub)
}

pub trait Rename<T> {
    fn rename(&self) -> T;
}

pub trait Auxiliary: Rename<Self> + Sized {
    fn aux() -> Self;
}

pub trait RenameWithSubstitution {
    type Output;
    fn rename_with_sub(&self) -> (Self::Output, Substitution);
}

impl RenameWithSubstitution for Literal {
    type Output = Literal;
    fn rename_with_sub(&self) -> (Literal, Substitution) {
        let renaming: Substitution = self
            .variables()
            .iter()
            .map(|v| (v.clone(), v.rename()))
            .collect();
        (self.substitute(&renaming), renaming)
    }
}

impl RenameWithSubstitution for Rule {
    type Output = Rule;
    fn rename_with_sub(&self) -> (Rule, Substitution) {
        let renaming: Substitution = self
            .variables()
            .iter()
            .map(|v| (v.clone(), v.rename()))
            .collect();
        (
            Rule {
                name: self.name.clone(),
                premise: self.premise.substitute(&renaming),
                conclusion: self.conclusion.substitute(&renaming),
            },
            renaming,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn lit(s: &str) -> Literal {
        s.parse().unwrap()
    }

    #[test]
    fn unify_ground_identical() {
        let a = lit("IS_A Dog animal");
        let b = lit("IS_A Dog animal");
        let mgu = unify(&a, &b).unwrap();
        assert!(mgu.is_empty());
    }

    #[test]
    fn unify_binds_variable() {
        let a = lit("IS_A ?x animal");
        let b = lit("IS_A Dog animal");
        let mgu = unify(&a, &b).unwrap();
        assert_eq!(
            mgu.get(&Term::Variable("x".into())),
            Some(&Term::Symbol("Dog".into()))
        );
        assert_eq!(a.substitute(&mgu), b);
    }

    #[test]
    fn unify_conflicting_constants_fails() {
        let a = lit("IS_A Dog animal");
        let b = lit("IS_A Cat animal");
        assert!(unify(&a, &b).is_none());
    }

    #[test]
    fn unify_shared_variable() {
        // LIKES ?x ?x against LIKES Alice Bob must fail
        let a = lit("LIKES ?x ?x");
        assert!(unify(&a, &lit("LIKES Alice Bob")).is_none());
        assert!(unify(&a, &lit("LIKES Alice Alice")).is_some());
    }

    #[test]
    fn compose_applies_right_to_left_range() {
        let mut l = Substitution::new();
        l.insert(Term::Variable("x".into()), Term::Variable("y".into()));
        let mut r = Substitution::new();
        r.insert(Term::Variable("y".into()), Term::Symbol("Dog".into()));

        let c = compose_extend(&l, &r);
        assert_eq!(
            c.get(&Term::Variable("x".into())),
            Some(&Term::Symbol("Dog".into()))
        );
        assert_eq!(
            c.get(&Term::Variable("y".into())),
            Some(&Term::Symbol("Dog".into()))
        );

        let n = compose_no_extend(&l, &r);
        assert_eq!(
            n.get(&Term::Variable("x".into())),
            Some(&Term::Symbol("Dog".into()))
        );
        assert_eq!(n.get(&Term::Variable("y".into())), None);
    }

    #[test]
    #[serial]
    fn renaming_is_fresh_and_consistent() {
        let r = Rule {
            name: "inherit".into(),
            premise: "And(IS_A ?x ?y, HAS ?y ?p)".parse().unwrap(),
            conclusion: lit("HAS ?x ?p"),
        };
        let (renamed, renaming) = r.rename_with_sub();
        assert_eq!(renaming.len(), 3);
        // no original variable survives
        for v in renamed.variables() {
            assert!(matches!(v, Term::RenamedVariable(_, _)));
        }
        // the same source variable maps to the same renamed variable in
        // premise and conclusion
        let x = Term::Variable("x".into());
        let renamed_x = renaming.get(&x).unwrap();
        assert!(renamed.conclusion.variables().contains(renamed_x));
        assert!(renamed.premise.variables().contains(renamed_x));
    }
}
