//! RDF term definitions.
//!
//! This module defines the `Term` enum which represents any value a SPARQL
//! variable can be bound to, and the default ordering comparator used by
//! MIN/MAX and ordered slices.

use crate::numeric::{xsd, NumericValue};
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use core::cmp::Ordering;
use core::fmt;

/// An RDF literal: lexical value, datatype IRI and optional language tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Literal {
    value: String,
    datatype: String,
    language: Option<String>,
}

impl Literal {
    /// Creates a typed literal.
    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            datatype: datatype.into(),
            language: None,
        }
    }

    /// Creates a language-tagged string. Tags are stored lowercase.
    pub fn lang(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            datatype: xsd::RDF_LANG_STRING.to_string(),
            language: Some(language.into().to_ascii_lowercase()),
        }
    }

    /// Creates a simple `xsd:string` literal.
    pub fn string(value: impl Into<String>) -> Self {
        Self::typed(value, xsd::STRING)
    }

    /// Returns the lexical value.
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the datatype IRI.
    #[inline]
    pub fn datatype(&self) -> &str {
        &self.datatype
    }

    /// Returns the language tag, if any.
    #[inline]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Returns true for `xsd:string` and language-tagged strings.
    pub fn is_string_like(&self) -> bool {
        self.datatype == xsd::STRING || self.language.is_some()
    }
}

/// A value a SPARQL variable can be bound to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    /// IRI
    NamedNode(String),
    /// Blank node label
    BlankNode(String),
    /// Literal
    Literal(Literal),
    /// The default graph, only ever bound in the graph position
    DefaultGraph,
}

impl Term {
    /// Creates a named node.
    pub fn named(iri: impl Into<String>) -> Self {
        Term::NamedNode(iri.into())
    }

    /// Creates a blank node.
    pub fn blank(id: impl Into<String>) -> Self {
        Term::BlankNode(id.into())
    }

    /// Creates a literal term.
    pub fn literal(literal: Literal) -> Self {
        Term::Literal(literal)
    }

    /// Creates a typed literal term.
    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal(Literal::typed(value, datatype))
    }

    /// Creates a language-tagged literal term.
    pub fn lang(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal(Literal::lang(value, language))
    }

    /// Creates an `xsd:string` literal term.
    pub fn string(value: impl Into<String>) -> Self {
        Term::Literal(Literal::string(value))
    }

    /// Creates an `xsd:integer` literal term.
    pub fn integer(value: i64) -> Self {
        Term::typed(value.to_string(), xsd::INTEGER)
    }

    /// Creates an `xsd:decimal` literal term from its lexical form.
    pub fn decimal(lexical: impl Into<String>) -> Self {
        Term::typed(lexical, xsd::DECIMAL)
    }

    /// Creates an `xsd:float` literal term from its lexical form.
    pub fn float(lexical: impl Into<String>) -> Self {
        Term::typed(lexical, xsd::FLOAT)
    }

    /// Creates an `xsd:double` literal term from its lexical form.
    pub fn double(lexical: impl Into<String>) -> Self {
        Term::typed(lexical, xsd::DOUBLE)
    }

    /// Returns the literal if this term is one.
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(l) => Some(l),
            _ => None,
        }
    }

    /// Returns true if this term is a literal.
    #[inline]
    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    /// Returns the IRI if this is a named node.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::NamedNode(iri) => Some(iri.as_str()),
            _ => None,
        }
    }

    /// Returns a type ordering value for comparing different kinds of term.
    fn kind_order(&self) -> u8 {
        match self {
            Term::DefaultGraph => 0,
            Term::BlankNode(_) => 1,
            Term::NamedNode(_) => 2,
            Term::Literal(_) => 3,
        }
    }
}

impl fmt::Display for Term {
    /// N-Triples style serialization; also the canonical form hashed by
    /// [`crate::CanonicalHasher`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::NamedNode(iri) => write!(f, "<{}>", iri),
            Term::BlankNode(id) => write!(f, "_:{}", id),
            Term::DefaultGraph => f.write_str("DEFAULT"),
            Term::Literal(l) => {
                f.write_str("\"")?;
                for c in l.value.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")?;
                if let Some(lang) = &l.language {
                    write!(f, "@{}", lang)
                } else if l.datatype != xsd::STRING {
                    write!(f, "^^<{}>", l.datatype)
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_terms(self, other)
    }
}

/// Caller-supplied 3-way comparator over terms.
pub type TermComparator = Arc<dyn Fn(&Term, &Term) -> Ordering + Send + Sync>;

/// Returns the default comparator wrapped for sharing.
pub fn default_comparator() -> TermComparator {
    Arc::new(compare_terms)
}

/// Default term ordering.
///
/// Default graph < blank nodes < IRIs < literals. Among literals, numeric
/// ones sort before all others and compare by value; the rest compare by
/// lexical form. Ties fall through to lexical form, datatype and language so
/// the ordering agrees with `Eq`.
pub fn compare_terms(a: &Term, b: &Term) -> Ordering {
    match (a, b) {
        (Term::NamedNode(x), Term::NamedNode(y)) => x.cmp(y),
        (Term::BlankNode(x), Term::BlankNode(y)) => x.cmp(y),
        (Term::Literal(x), Term::Literal(y)) => {
            let by_value = match (NumericValue::from_literal(x), NumericValue::from_literal(y)) {
                (Some(nx), Some(ny)) => match (nx.as_decimal(), ny.as_decimal()) {
                    (Some(dx), Some(dy)) => dx.cmp(&dy),
                    _ => compare_numeric(nx.as_f64(), ny.as_f64()),
                },
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_value
                .then_with(|| x.value.cmp(&y.value))
                .then_with(|| x.datatype.cmp(&y.datatype))
                .then_with(|| x.language.cmp(&y.language))
        }
        _ => a.kind_order().cmp(&b.kind_order()),
    }
}

fn compare_numeric(a: f64, b: f64) -> Ordering {
    // NaN sorts after every other number
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl From<Literal> for Term {
    fn from(l: Literal) -> Self {
        Term::Literal(l)
    }
}

impl From<i64> for Term {
    fn from(v: i64) -> Self {
        Term::integer(v)
    }
}

impl From<&str> for Term {
    fn from(v: &str) -> Self {
        Term::string(v)
    }
}
