//! Compiled predicates. Evaluation is infallible: every type question was
//! settled when the query was validated.

use crate::plays::{Column, FieldValue, PlayRecord};

/// A literal already coerced to the column's semantic type. Text is stored
/// lower-cased for case-insensitive comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Literal {
    fn matches(&self, value: &FieldValue<'_>) -> bool {
        match self {
            Literal::Number(n) => value.as_number().map_or(false, |v| (v - n).abs() < 1e-9),
            Literal::Bool(b) => match value {
                FieldValue::Bool(v) => v == b,
                FieldValue::Number(v) => (*v != 0.0) == *b,
                _ => false,
            },
            Literal::Text(t) => value.as_str().map_or(false, |v| v.to_lowercase() == *t),
        }
    }
}

/// Numeric comparison used by range conditions and drive `having` tests.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericTest {
    Eq(f64),
    Neq(f64),
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
    Between(f64, f64),
    In(Vec<f64>),
}

impl NumericTest {
    pub fn check(&self, value: f64) -> bool {
        match self {
            NumericTest::Eq(n) => (value - n).abs() < 1e-9,
            NumericTest::Neq(n) => (value - n).abs() >= 1e-9,
            NumericTest::Gt(n) => value > *n,
            NumericTest::Gte(n) => value >= *n,
            NumericTest::Lt(n) => value < *n,
            NumericTest::Lte(n) => value <= *n,
            NumericTest::Between(lo, hi) => value >= *lo && value <= *hi,
            NumericTest::In(set) => set.iter().any(|n| (value - n).abs() < 1e-9),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    Eq(Literal),
    Neq(Literal),
    /// gt/gte/lt/lte/between on a numeric column
    Range(NumericTest),
    In(Vec<Literal>),
    Contains(String),
    NotContains(String),
    /// `true` tests absence, `false` presence
    IsNull(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition {
    pub column: Column,
    pub test: Test,
}

impl CompiledCondition {
    pub fn evaluate(&self, play: &PlayRecord) -> bool {
        let value = play.value(self.column);
        match &self.test {
            Test::Eq(literal) => !value.is_null() && literal.matches(&value),
            Test::Neq(literal) => value.is_null() || !literal.matches(&value),
            Test::Range(test) => value.as_number().map_or(false, |v| test.check(v)),
            Test::In(set) => !value.is_null() && set.iter().any(|l| l.matches(&value)),
            Test::Contains(needle) => value
                .as_str()
                .map_or(false, |v| v.to_lowercase().contains(needle.as_str())),
            Test::NotContains(needle) => value
                .as_str()
                .map_or(true, |v| !v.to_lowercase().contains(needle.as_str())),
            Test::IsNull(expect_null) => value.is_null() == *expect_null,
        }
    }
}

/// Boolean tree over compiled conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every child true; an empty list is true
    All(Vec<Predicate>),
    /// Some child true
    Any(Vec<Predicate>),
    Condition(CompiledCondition),
}

impl Predicate {
    /// Matches every record.
    pub fn always() -> Self {
        Predicate::All(Vec::new())
    }

    pub fn evaluate(&self, play: &PlayRecord) -> bool {
        match self {
            Predicate::All(children) => children.iter().all(|c| c.evaluate(play)),
            Predicate::Any(children) => children.iter().any(|c| c.evaluate(play)),
            Predicate::Condition(condition) => condition.evaluate(play),
        }
    }

    /// Conjunction of two predicates, flattening trivial sides.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::All(a), rhs) if a.is_empty() => rhs,
            (lhs, Predicate::All(b)) if b.is_empty() => lhs,
            (lhs, rhs) => Predicate::All(vec![lhs, rhs]),
        }
    }
}
