//! XSD datatypes and the SPARQL numeric promotion lattice.
//!
//! Only as much literal semantics as incremental SUM/AVG need: recognizing
//! numeric datatypes, parsing their lexical forms and writing results back.
//! `xsd:decimal` is held as an exact [`Decimal`] so sums can be undone.

use crate::term::{Literal, Term};
use alloc::format;
use alloc::string::{String, ToString};
use core::str::FromStr;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Datatype IRIs used by the engine.
pub mod xsd {
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
    pub const DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    pub const LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
    pub const INT: &str = "http://www.w3.org/2001/XMLSchema#int";
    pub const SHORT: &str = "http://www.w3.org/2001/XMLSchema#short";
    pub const BYTE: &str = "http://www.w3.org/2001/XMLSchema#byte";
    pub const NON_NEGATIVE_INTEGER: &str =
        "http://www.w3.org/2001/XMLSchema#nonNegativeInteger";
    pub const NON_POSITIVE_INTEGER: &str =
        "http://www.w3.org/2001/XMLSchema#nonPositiveInteger";
    pub const POSITIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#positiveInteger";
    pub const NEGATIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#negativeInteger";
    pub const UNSIGNED_LONG: &str = "http://www.w3.org/2001/XMLSchema#unsignedLong";
    pub const UNSIGNED_INT: &str = "http://www.w3.org/2001/XMLSchema#unsignedInt";
    pub const UNSIGNED_SHORT: &str = "http://www.w3.org/2001/XMLSchema#unsignedShort";
    pub const UNSIGNED_BYTE: &str = "http://www.w3.org/2001/XMLSchema#unsignedByte";
    pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
}

/// The four members of the SPARQL numeric promotion lattice.
///
/// Ordering follows promotion: `Integer < Decimal < Float < Double`, so the
/// type of a mixed expression is the maximum of its operand types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumericType {
    Integer,
    Decimal,
    Float,
    Double,
}

impl NumericType {
    /// Classifies a datatype IRI. Derived integer types collapse into
    /// [`NumericType::Integer`].
    pub fn of(datatype: &str) -> Option<NumericType> {
        match datatype {
            xsd::INTEGER
            | xsd::LONG
            | xsd::INT
            | xsd::SHORT
            | xsd::BYTE
            | xsd::NON_NEGATIVE_INTEGER
            | xsd::NON_POSITIVE_INTEGER
            | xsd::POSITIVE_INTEGER
            | xsd::NEGATIVE_INTEGER
            | xsd::UNSIGNED_LONG
            | xsd::UNSIGNED_INT
            | xsd::UNSIGNED_SHORT
            | xsd::UNSIGNED_BYTE => Some(NumericType::Integer),
            xsd::DECIMAL => Some(NumericType::Decimal),
            xsd::FLOAT => Some(NumericType::Float),
            xsd::DOUBLE => Some(NumericType::Double),
            _ => None,
        }
    }

    /// Returns the promoted type of two operands.
    #[inline]
    pub fn promote(self, other: NumericType) -> NumericType {
        self.max(other)
    }

    /// Returns the canonical datatype IRI.
    pub fn datatype(&self) -> &'static str {
        match self {
            NumericType::Integer => xsd::INTEGER,
            NumericType::Decimal => xsd::DECIMAL,
            NumericType::Float => xsd::FLOAT,
            NumericType::Double => xsd::DOUBLE,
        }
    }
}

/// A parsed numeric literal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NumericValue {
    Integer(i64),
    Decimal(Decimal),
    Float(f64),
    Double(f64),
}

impl NumericValue {
    /// Parses a literal, returning None when the datatype is not numeric or
    /// the lexical form is malformed.
    pub fn from_literal(literal: &Literal) -> Option<NumericValue> {
        let kind = NumericType::of(literal.datatype())?;
        let lexical = literal.value().trim();
        match kind {
            NumericType::Integer => lexical
                .trim_start_matches('+')
                .parse::<i64>()
                .ok()
                .map(NumericValue::Integer),
            NumericType::Decimal => parse_decimal(lexical).map(NumericValue::Decimal),
            NumericType::Float => parse_float(lexical).map(NumericValue::Float),
            NumericType::Double => parse_float(lexical).map(NumericValue::Double),
        }
    }

    /// Parses a term; non-literals are never numeric.
    pub fn from_term(term: &Term) -> Option<NumericValue> {
        term.as_literal().and_then(NumericValue::from_literal)
    }

    /// Returns the lattice member of this value.
    pub fn numeric_type(&self) -> NumericType {
        match self {
            NumericValue::Integer(_) => NumericType::Integer,
            NumericValue::Decimal(_) => NumericType::Decimal,
            NumericValue::Float(_) => NumericType::Float,
            NumericValue::Double(_) => NumericType::Double,
        }
    }

    /// Returns the value widened to f64.
    pub fn as_f64(&self) -> f64 {
        match self {
            NumericValue::Integer(v) => *v as f64,
            NumericValue::Decimal(v) => v.to_f64().unwrap_or(f64::NAN),
            NumericValue::Float(v) | NumericValue::Double(v) => *v,
        }
    }

    /// Returns the value as an exact decimal; None for floating point values.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            NumericValue::Integer(v) => Some(Decimal::from(*v)),
            NumericValue::Decimal(v) => Some(*v),
            NumericValue::Float(_) | NumericValue::Double(_) => None,
        }
    }

    /// Writes the value back as a canonical typed literal.
    pub fn to_term(&self) -> Term {
        let lexical = match self {
            NumericValue::Integer(v) => v.to_string(),
            NumericValue::Decimal(v) => {
                let v = v.normalize();
                if v.scale() == 0 {
                    format!("{}.0", v)
                } else {
                    v.to_string()
                }
            }
            NumericValue::Float(v) => format_float(*v as f32 as f64, (*v as f32).to_string()),
            NumericValue::Double(v) => format_float(*v, v.to_string()),
        };
        Term::typed(lexical, self.numeric_type().datatype())
    }
}

fn parse_decimal(lexical: &str) -> Option<Decimal> {
    // xsd:decimal has no exponent form
    if lexical.contains(['e', 'E']) {
        return None;
    }
    Decimal::from_str(lexical.strip_prefix('+').unwrap_or(lexical)).ok()
}

fn parse_float(lexical: &str) -> Option<f64> {
    match lexical {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        other => other.parse::<f64>().ok(),
    }
}

fn format_float(value: f64, display: String) -> String {
    if value.is_nan() {
        "NaN".into()
    } else if value == f64::INFINITY {
        "INF".into()
    } else if value == f64::NEG_INFINITY {
        "-INF".into()
    } else {
        display
    }
}
