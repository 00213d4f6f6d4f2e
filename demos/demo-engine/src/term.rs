//! Terms and a small reader for facts and queries.

use std::fmt;

use thiserror::Error;

/// Read error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("Empty term")]
    Empty,
}

/// A term: atoms, variables, compounds and proper lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Atom(String),
    Var(String),
    Compound { name: String, args: Vec<Term> },
    List(Vec<Term>),
}

impl Term {
    /// Name and arity of a callable term.
    #[must_use]
    pub fn indicator(&self) -> Option<(&str, usize)> {
        match self {
            Self::Atom(name) => Some((name.as_str(), 0)),
            Self::Compound { name, args } => Some((name.as_str(), args.len())),
            Self::Var(_) | Self::List(_) => None,
        }
    }

    /// Arguments of a compound, empty otherwise.
    #[must_use]
    pub fn args(&self) -> &[Term] {
        match self {
            Self::Compound { args, .. } => args.as_slice(),
            _ => &[],
        }
    }

    /// Variables in order of first appearance.
    pub fn vars(&self, out: &mut Vec<String>) {
        match self {
            Self::Var(name) if !out.contains(name) => out.push(name.clone()),
            Self::Compound { args, .. } => args.iter().for_each(|a| a.vars(out)),
            Self::List(items) => items.iter().for_each(|a| a.vars(out)),
            _ => {}
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, terms: &[Term]) -> fmt::Result {
    for (i, t) in terms.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{t}")?;
    }
    Ok(())
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(name) | Self::Var(name) => f.write_str(name),
            Self::Compound { name, args } if name == "=" && args.len() == 2 => {
                write!(f, "{} = {}", args[0], args[1])
            }
            Self::Compound { name, args } => {
                write!(f, "{name}(")?;
                join(f, args)?;
                f.write_str(")")
            }
            Self::List(items) => {
                f.write_str("[")?;
                join(f, items)?;
                f.write_str("]")
            }
        }
    }
}

/// Split at top-level occurrences of `sep`, outside brackets and quotes.
#[must_use]
pub fn split_top(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' | '[' if !quoted => depth += 1,
            ')' | ']' if !quoted => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 && !quoted => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Split program text into clause bodies (without the final `.`).
///
/// `%` starts a line comment.
#[must_use]
pub fn split_clauses(text: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '%' if !quoted => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '\'' => {
                quoted = !quoted;
                current.push(c);
            }
            '.' if !quoted && chars.peek().is_none_or(|n| n.is_whitespace()) => {
                let clause = current.trim();
                if !clause.is_empty() {
                    clauses.push(clause.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        clauses.push(rest.to_string());
    }
    clauses
}

fn is_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Read one term. `A = B` is read as `=(A, B)`.
///
/// # Errors
/// Returns error for text that is not a term.
pub fn parse_term(input: &str) -> Result<Term, ParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ParseError::Empty);
    }

    let sides = split_top(s, '=');
    if sides.len() == 2 {
        return Ok(Term::Compound {
            name: "=".to_string(),
            args: vec![parse_term(sides[0])?, parse_term(sides[1])?],
        });
    }

    if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        if inner.trim().is_empty() {
            return Ok(Term::List(Vec::new()));
        }
        let items = split_top(inner, ',')
            .into_iter()
            .map(parse_term)
            .collect::<Result<_, _>>()?;
        return Ok(Term::List(items));
    }

    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        return Ok(Term::Atom(s.to_string()));
    }

    if let Some(open) = s.find('(') {
        let name = s[..open].trim();
        let inner = s[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| ParseError::Syntax(s.to_string()))?;
        if !is_name(name) {
            return Err(ParseError::Syntax(s.to_string()));
        }
        let args = split_top(inner, ',')
            .into_iter()
            .map(parse_term)
            .collect::<Result<_, _>>()?;
        return Ok(Term::Compound {
            name: name.to_string(),
            args,
        });
    }

    if !is_name(s) && s.parse::<i64>().is_err() {
        return Err(ParseError::Syntax(s.to_string()));
    }
    if s.starts_with(|c: char| c.is_uppercase() || c == '_') {
        Ok(Term::Var(s.to_string()))
    } else {
        Ok(Term::Atom(s.to_string()))
    }
}

/// Read a conjunction of goals.
///
/// # Errors
/// Returns error if any goal cannot be read.
pub fn parse_query(text: &str) -> Result<Vec<Term>, ParseError> {
    let body = text.trim().trim_end_matches('.');
    split_top(body, ',').into_iter().map(parse_term).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let goals = parse_query("member(X, [a, b]), X = b.").unwrap();
        assert_eq!(goals.len(), 2);
        assert_eq!(goals[0].indicator(), Some(("member", 2)));
        assert_eq!(goals[1].to_string(), "X = b");
    }

    #[test]
    fn test_split_clauses() {
        let clauses = split_clauses("% family\nparent(tom, bob).\nparent(bob, 'Ann.').\n");
        assert_eq!(clauses, ["parent(tom, bob)", "parent(bob, 'Ann.')"]);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse_term("foo("), Err(ParseError::Syntax(_))));
        assert_eq!(parse_term("  "), Err(ParseError::Empty));
        assert!(parse_term("a b").is_err());
    }

    #[test]
    fn test_vars_in_order() {
        let mut vars = Vec::new();
        parse_term("p(Y, [X, Y], _)").unwrap().vars(&mut vars);
        assert_eq!(vars, ["Y", "X", "_"]);
    }
}
