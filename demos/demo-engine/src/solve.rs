//! Fact database and a depth-first solver for conjunctions.

use thiserror::Error;

use crate::term::{ParseError, Term, parse_term, split_clauses};

/// Upper bound on collected solutions per query.
pub const MAX_SOLUTIONS: usize = 1000;

/// Variable bindings, oldest first.
pub type Bindings = Vec<(String, Term)>;

/// Runtime error raised by a goal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SolveError {
    #[error("Unknown procedure: {0}")]
    UnknownProcedure(String),
    #[error("Arguments are not sufficiently instantiated")]
    Instantiation,
    #[error("Type error: `{expected}' expected, found `{found}'")]
    Type { expected: &'static str, found: String },
}

/// Program load error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Rules are not supported: {0}")]
    Rule(String),
}

fn walk(term: &Term, b: &Bindings) -> Term {
    let mut term = term.clone();
    while let Term::Var(name) = &term {
        match b.iter().rev().find(|(v, _)| v == name) {
            Some((_, value)) => term = value.clone(),
            None => break,
        }
    }
    term
}

/// Substitute all bound variables.
#[must_use]
pub fn resolve(term: &Term, b: &Bindings) -> Term {
    match walk(term, b) {
        Term::Compound { name, args } => Term::Compound {
            name,
            args: args.iter().map(|a| resolve(a, b)).collect(),
        },
        Term::List(items) => Term::List(items.iter().map(|a| resolve(a, b)).collect()),
        other => other,
    }
}

/// Unify two terms, extending `b`.
pub fn unify(a: &Term, c: &Term, b: &mut Bindings) -> bool {
    match (walk(a, b), walk(c, b)) {
        (Term::Var(x), Term::Var(y)) if x == y => true,
        (Term::Var(x), _) | (_, Term::Var(x)) if x == "_" => true,
        (Term::Var(x), t) | (t, Term::Var(x)) => {
            b.push((x, t));
            true
        }
        (Term::Atom(x), Term::Atom(y)) => x == y,
        (Term::List(xs), Term::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(&ys).all(|(x, y)| unify(x, y, b))
        }
        (
            Term::Compound { name: n1, args: a1 },
            Term::Compound { name: n2, args: a2 },
        ) => n1 == n2 && a1.len() == a2.len() && a1.iter().zip(&a2).all(|(x, y)| unify(x, y, b)),
        _ => false,
    }
}

fn rename(term: &Term, suffix: usize) -> Term {
    match term {
        Term::Var(name) if name != "_" => Term::Var(format!("{name}#{suffix}")),
        Term::Compound { name, args } => Term::Compound {
            name: name.clone(),
            args: args.iter().map(|a| rename(a, suffix)).collect(),
        },
        Term::List(items) => Term::List(items.iter().map(|a| rename(a, suffix)).collect()),
        other => other.clone(),
    }
}

fn integer(term: &Term, b: &Bindings) -> Result<i64, SolveError> {
    match walk(term, b) {
        Term::Var(_) => Err(SolveError::Instantiation),
        Term::Atom(a) => a.parse().map_err(|_| SolveError::Type {
            expected: "integer",
            found: a,
        }),
        other => Err(SolveError::Type {
            expected: "integer",
            found: other.to_string(),
        }),
    }
}

/// Facts loaded from program files.
#[derive(Debug, Clone, Default)]
pub struct Database {
    facts: Vec<Term>,
}

impl Database {
    /// Read facts from program text.
    ///
    /// # Errors
    /// Returns error for unreadable clauses or rules.
    pub fn load(text: &str) -> Result<Self, LoadError> {
        let mut facts = Vec::new();
        for clause in split_clauses(text) {
            if clause.contains(":-") {
                return Err(LoadError::Rule(clause));
            }
            facts.push(parse_term(&clause)?);
        }
        Ok(Self { facts })
    }

    /// Add all facts of another database.
    pub fn extend(&mut self, other: Self) {
        self.facts.extend(other.facts);
    }

    /// Loaded facts.
    #[must_use]
    pub fn facts(&self) -> &[Term] {
        &self.facts
    }

    /// Whether a user predicate with this name and arity exists.
    #[must_use]
    pub fn defines(&self, name: &str, arity: usize) -> bool {
        self.facts.iter().any(|f| f.indicator() == Some((name, arity)))
    }

    /// All solutions of a conjunction, up to [`MAX_SOLUTIONS`].
    ///
    /// # Errors
    /// Returns error for unknown procedures and badly instantiated builtins.
    pub fn solve(&self, goals: &[Term]) -> Result<Vec<Bindings>, SolveError> {
        let mut out = Vec::new();
        self.solve_from(goals, Vec::new(), 0, &mut out)?;
        Ok(out)
    }

    fn solve_from(
        &self,
        goals: &[Term],
        b: Bindings,
        depth: usize,
        out: &mut Vec<Bindings>,
    ) -> Result<(), SolveError> {
        if out.len() >= MAX_SOLUTIONS {
            return Ok(());
        }
        let Some((goal, rest)) = goals.split_first() else {
            out.push(b);
            return Ok(());
        };
        let goal = walk(goal, &b);
        let args = goal.args();

        match goal.indicator() {
            Some(("true", 0)) => self.solve_from(rest, b, depth, out),
            Some(("fail" | "false", 0)) => Ok(()),
            Some(("=", 2)) => {
                let mut b = b;
                if unify(&args[0], &args[1], &mut b) {
                    self.solve_from(rest, b, depth, out)?;
                }
                Ok(())
            }
            Some(("member", 2)) => {
                let Term::List(items) = walk(&args[1], &b) else {
                    return Err(SolveError::Instantiation);
                };
                for item in &items {
                    let mut next = b.clone();
                    if unify(&args[0], item, &mut next) {
                        self.solve_from(rest, next, depth, out)?;
                    }
                }
                Ok(())
            }
            Some(("between", 3)) => {
                let (low, high) = (integer(&args[0], &b)?, integer(&args[1], &b)?);
                for n in low..=high {
                    let mut next = b.clone();
                    if unify(&args[2], &Term::Atom(n.to_string()), &mut next) {
                        self.solve_from(rest, next, depth, out)?;
                    }
                    if out.len() >= MAX_SOLUTIONS {
                        break;
                    }
                }
                Ok(())
            }
            Some((name, arity)) if self.defines(name, arity) => {
                for fact in self.facts.iter().filter(|f| f.indicator() == Some((name, arity))) {
                    let mut next = b.clone();
                    if unify(&goal, &rename(fact, depth), &mut next) {
                        self.solve_from(rest, next, depth + 1, out)?;
                    }
                }
                Ok(())
            }
            Some((name, arity)) => Err(SolveError::UnknownProcedure(format!("{name}/{arity}"))),
            None => Err(SolveError::Instantiation),
        }
    }
}
