//! Runtime field values read from a play record.

use std::cmp::Ordering;

/// Value of one column on one play, borrowed from the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Number(f64),
    Text(&'a str),
    Bool(bool),
    /// Field absent (empty CSV cell, NA, or not applicable to the play).
    Null,
}

impl<'a> FieldValue<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<Option<f64>> for FieldValue<'_> {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(n) if n.is_finite() => FieldValue::Number(n),
            _ => FieldValue::Null,
        }
    }
}

impl From<Option<i32>> for FieldValue<'_> {
    fn from(value: Option<i32>) -> Self {
        value.map_or(FieldValue::Null, |n| FieldValue::Number(n as f64))
    }
}

impl From<Option<u32>> for FieldValue<'_> {
    fn from(value: Option<u32>) -> Self {
        value.map_or(FieldValue::Null, |n| FieldValue::Number(n as f64))
    }
}

impl From<Option<u8>> for FieldValue<'_> {
    fn from(value: Option<u8>) -> Self {
        value.map_or(FieldValue::Null, |n| FieldValue::Number(n as f64))
    }
}

impl From<Option<bool>> for FieldValue<'_> {
    fn from(value: Option<bool>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Bool)
    }
}

impl<'a> From<&'a Option<String>> for FieldValue<'a> {
    fn from(value: &'a Option<String>) -> Self {
        match value.as_deref() {
            Some(s) if !s.is_empty() => FieldValue::Text(s),
            _ => FieldValue::Null,
        }
    }
}

/// Compare two values for ranking. Nulls sort after every present value
/// regardless of direction, so callers apply direction only to the
/// non-null ordering.
pub fn compare_for_rank(a: &FieldValue<'_>, b: &FieldValue<'_>, descending: bool) -> Ordering {
    let ordering = match (a, b) {
        (FieldValue::Null, FieldValue::Null) => return Ordering::Equal,
        (FieldValue::Null, _) => return Ordering::Greater,
        (_, FieldValue::Null) => return Ordering::Less,
        (FieldValue::Text(x), FieldValue::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (x, y) => match (x.as_number(), y.as_number()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    };

    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(FieldValue::from(Some(3i32)), FieldValue::Number(3.0));
        assert_eq!(FieldValue::from(None::<i32>), FieldValue::Null);
        assert_eq!(FieldValue::from(Some(f64::NAN)), FieldValue::Null);
        assert_eq!(FieldValue::from(&Some(String::new())), FieldValue::Null);
        assert_eq!(FieldValue::Bool(true).as_number(), Some(1.0));
    }

    #[test]
    fn test_nulls_sort_last_in_both_directions() {
        let present = FieldValue::Number(0.2);
        let null = FieldValue::Null;

        assert_eq!(compare_for_rank(&present, &null, false), Ordering::Less);
        assert_eq!(compare_for_rank(&present, &null, true), Ordering::Less);
        assert_eq!(compare_for_rank(&null, &present, true), Ordering::Greater);
    }

    #[test]
    fn test_direction_applies_to_values() {
        let low = FieldValue::Number(1.0);
        let high = FieldValue::Number(5.0);

        assert_eq!(compare_for_rank(&low, &high, false), Ordering::Less);
        assert_eq!(compare_for_rank(&low, &high, true), Ordering::Greater);
    }
}
