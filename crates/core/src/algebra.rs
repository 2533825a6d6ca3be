//! The slice of SPARQL algebra the bind join needs.
//!
//! Parsing and translation live outside this crate; operators only need to
//! substitute outer bindings into the remaining operations and to know
//! which operations cannot be bound into.

use crate::bindings::{Bindings, Variable};
use crate::error::{Error, Result};
use crate::term::Term;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

/// A triple pattern position: either a variable or a fixed term.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TermPattern {
    Variable(Variable),
    Term(Term),
}

impl TermPattern {
    /// Shorthand for a variable position.
    pub fn var(name: &str) -> Self {
        TermPattern::Variable(Variable::new(name))
    }

    /// Replaces a bound variable by its term.
    fn substitute(&self, bindings: &Bindings) -> TermPattern {
        match self {
            TermPattern::Variable(v) => match bindings.get(v) {
                Some(t) => TermPattern::Term(t.clone()),
                None => self.clone(),
            },
            TermPattern::Term(_) => self.clone(),
        }
    }

    fn variable(&self) -> Option<&Variable> {
        match self {
            TermPattern::Variable(v) => Some(v),
            TermPattern::Term(_) => None,
        }
    }
}

impl From<Term> for TermPattern {
    fn from(t: Term) -> Self {
        TermPattern::Term(t)
    }
}

/// A quad pattern; `graph` defaults to the default graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
    pub graph: TermPattern,
}

impl TriplePattern {
    /// Creates a pattern in the default graph.
    pub fn new(subject: TermPattern, predicate: TermPattern, object: TermPattern) -> Self {
        Self {
            subject,
            predicate,
            object,
            graph: TermPattern::Term(Term::DefaultGraph),
        }
    }

    fn positions(&self) -> [&TermPattern; 4] {
        [&self.subject, &self.predicate, &self.object, &self.graph]
    }
}

/// Algebra operations the incremental operators reason about.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Pattern(TriplePattern),
    Join(Vec<Operation>),
    Union(Vec<Operation>),
    Project {
        input: Box<Operation>,
        variables: Vec<Variable>,
    },
    /// Filter with an opaque expression evaluated elsewhere.
    Filter {
        input: Box<Operation>,
        expression: String,
    },
    Group {
        input: Box<Operation>,
        variables: Vec<Variable>,
        aggregates: Vec<Variable>,
    },
    /// BIND with an opaque expression evaluated elsewhere.
    Extend {
        input: Box<Operation>,
        variable: Variable,
        expression: String,
    },
    Values(Vec<Bindings>),
}

impl Operation {
    /// Substitutes bound variables into the operation.
    ///
    /// Fails with `UnsupportedOperation` when the substitution would cross a
    /// GROUP or EXTEND boundary: grouping and BIND change what a variable
    /// means below them.
    pub fn materialize(&self, bindings: &Bindings) -> Result<Operation> {
        Ok(match self {
            Operation::Pattern(p) => Operation::Pattern(TriplePattern {
                subject: p.subject.substitute(bindings),
                predicate: p.predicate.substitute(bindings),
                object: p.object.substitute(bindings),
                graph: p.graph.substitute(bindings),
            }),
            Operation::Join(ops) => Operation::Join(materialize_all(ops, bindings)?),
            Operation::Union(ops) => Operation::Union(materialize_all(ops, bindings)?),
            // Variables hidden by the projection are distinct from the outer ones
            Operation::Project { input, variables } => Operation::Project {
                input: Box::new(input.materialize(&bindings.project(variables))?),
                variables: variables.clone(),
            },
            Operation::Filter { input, expression } => Operation::Filter {
                input: Box::new(input.materialize(bindings)?),
                expression: expression.clone(),
            },
            Operation::Group { .. } => {
                return Err(Error::unsupported("cannot bind across a GROUP operation"))
            }
            Operation::Extend { .. } => {
                return Err(Error::unsupported("cannot bind across an EXTEND operation"))
            }
            Operation::Values(rows) => Operation::Values(
                rows.iter()
                    .filter(|row| row.is_compatible(bindings))
                    .cloned()
                    .collect(),
            ),
        })
    }

    /// Returns true if [`Operation::materialize`] can succeed.
    pub fn is_bindable(&self) -> bool {
        match self {
            Operation::Pattern(_) | Operation::Values(_) => true,
            Operation::Join(ops) | Operation::Union(ops) => ops.iter().all(Operation::is_bindable),
            Operation::Project { input, .. } | Operation::Filter { input, .. } => {
                input.is_bindable()
            }
            Operation::Group { .. } | Operation::Extend { .. } => false,
        }
    }

    /// Collects the in-scope variables, without duplicates.
    pub fn variables(&self) -> Vec<Variable> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<Variable>) {
        match self {
            Operation::Pattern(p) => {
                for v in p.positions().iter().filter_map(|t| t.variable()) {
                    push_unique(out, v);
                }
            }
            Operation::Join(ops) | Operation::Union(ops) => {
                ops.iter().for_each(|op| op.collect_variables(out))
            }
            Operation::Project { variables, .. } => {
                variables.iter().for_each(|v| push_unique(out, v))
            }
            Operation::Filter { input, .. } => input.collect_variables(out),
            Operation::Group {
                variables,
                aggregates,
                ..
            } => variables
                .iter()
                .chain(aggregates.iter())
                .for_each(|v| push_unique(out, v)),
            Operation::Extend {
                input, variable, ..
            } => {
                input.collect_variables(out);
                push_unique(out, variable);
            }
            Operation::Values(rows) => {
                for v in rows.iter().flat_map(|r| r.variables()) {
                    push_unique(out, v);
                }
            }
        }
    }
}

fn push_unique(out: &mut Vec<Variable>, v: &Variable) {
    if !out.contains(v) {
        out.push(v.clone());
    }
}

fn materialize_all(ops: &[Operation], bindings: &Bindings) -> Result<Vec<Operation>> {
    ops.iter().map(|op| op.materialize(bindings)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn pattern(s: &str, p: &str, o: &str) -> Operation {
        Operation::Pattern(TriplePattern::new(
            TermPattern::var(s),
            TermPattern::Term(Term::named(p)),
            TermPattern::var(o),
        ))
    }

    #[test]
    fn test_materialize_pattern() {
        let op = pattern("s", "http://ex.org/knows", "o");
        let bound = op
            .materialize(&Bindings::from([("s", Term::named("http://ex.org/alice"))]))
            .unwrap();
        match bound {
            Operation::Pattern(p) => {
                assert_eq!(p.subject, TermPattern::Term(Term::named("http://ex.org/alice")));
                assert_eq!(p.object, TermPattern::var("o"));
            }
            _ => panic!("expected a pattern"),
        }
    }

    #[test]
    fn test_materialize_rejects_group_and_extend() {
        let group = Operation::Group {
            input: Box::new(pattern("s", "http://ex.org/p", "o")),
            variables: vec![Variable::new("s")],
            aggregates: vec![],
        };
        let err = group.materialize(&Bindings::new()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation { .. }));
        assert!(!err.is_fatal());

        let extend = Operation::Join(vec![Operation::Extend {
            input: Box::new(pattern("s", "http://ex.org/p", "o")),
            variable: Variable::new("x"),
            expression: "?o + 1".into(),
        }]);
        assert!(!extend.is_bindable());
        assert!(extend.materialize(&Bindings::new()).is_err());
    }

    #[test]
    fn test_materialize_values_filters_incompatible() {
        let values = Operation::Values(vec![
            Bindings::from([("s", Term::integer(1))]),
            Bindings::from([("s", Term::integer(2))]),
        ]);
        match values.materialize(&Bindings::from([("s", Term::integer(2))])).unwrap() {
            Operation::Values(rows) => assert_eq!(rows.len(), 1),
            _ => panic!("expected values"),
        }
    }

    #[test]
    fn test_materialize_project_keeps_hidden_variables() {
        let op = Operation::Project {
            input: Box::new(pattern("x", "http://ex.org/p", "y")),
            variables: vec![Variable::new("y")],
        };
        let hidden = Bindings::from([("x", Term::named("http://ex.org/a"))]);
        assert_eq!(op.materialize(&hidden).unwrap(), op);

        let visible = Bindings::from([("y", Term::named("http://ex.org/b"))]);
        match op.materialize(&visible).unwrap() {
            Operation::Project { input, .. } => match *input {
                Operation::Pattern(p) => {
                    assert_eq!(p.subject, TermPattern::var("x"));
                    assert_eq!(p.object, TermPattern::Term(Term::named("http://ex.org/b")));
                }
                _ => panic!("expected a pattern"),
            },
            _ => panic!("expected a projection"),
        }
    }

    #[test]
    fn test_variables() {
        let op = Operation::Join(vec![
            pattern("s", "http://ex.org/p", "o"),
            pattern("o", "http://ex.org/q", "z"),
        ]);
        assert_eq!(op.variables().len(), 3);
    }
}
