use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators understood by thresholds and conditions.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString, strum::EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    Greater,
    Less,
    Contains,
    Between,
}

impl ConditionOperator {
    /// Compare `actual` against `expected`. Type mismatches evaluate to `false`.
    pub fn apply(
        &self,
        actual: &Value,
        expected: &Value,
    ) -> bool {
        match self {
            ConditionOperator::Equals => match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => actual == expected,
            },
            ConditionOperator::Greater => match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            ConditionOperator::Less => match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            ConditionOperator::Contains => match actual {
                Value::String(s) => expected.as_str().is_some_and(|e| s.contains(e)),
                Value::Array(items) => items.contains(expected),
                Value::Object(map) => expected.as_str().is_some_and(|k| map.contains_key(k)),
                _ => false,
            },
            ConditionOperator::Between => match (actual.as_f64(), between_bounds(expected)) {
                (Some(a), Some((lo, hi))) => lo <= a && a <= hi,
                _ => false,
            },
        }
    }
}

/// The `[low, high]` pair of a `between` operand, when it is a well-formed ordered pair.
pub fn between_bounds(value: &Value) -> Option<(f64, f64)> {
    match value.as_array().map(Vec::as_slice) {
        Some([lo, hi]) => match (lo.as_f64(), hi.as_f64()) {
            (Some(lo), Some(hi)) if lo <= hi => Some((lo, hi)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_operator_parse() {
        assert_eq!(ConditionOperator::from_str("between").unwrap(), ConditionOperator::Between);
        assert!(ConditionOperator::from_str("gt").is_err());
    }

    #[test]
    fn test_operator_numeric() {
        assert!(ConditionOperator::Greater.apply(&json!(850), &json!(800)));
        assert!(!ConditionOperator::Greater.apply(&json!(800), &json!(800)));
        assert!(ConditionOperator::Less.apply(&json!(1.5), &json!(2)));
        assert!(ConditionOperator::Equals.apply(&json!(2), &json!(2.0)));
        assert!(!ConditionOperator::Greater.apply(&json!("900"), &json!(800)));
    }

    #[test]
    fn test_operator_contains() {
        assert!(ConditionOperator::Contains.apply(&json!("boiler-7"), &json!("boiler")));
        assert!(ConditionOperator::Contains.apply(&json!(["a", "b"]), &json!("b")));
        assert!(ConditionOperator::Contains.apply(&json!({"k": 1}), &json!("k")));
        assert!(!ConditionOperator::Contains.apply(&json!(10), &json!("1")));
    }

    #[test]
    fn test_operator_between() {
        assert!(ConditionOperator::Between.apply(&json!(5), &json!([1, 10])));
        assert!(ConditionOperator::Between.apply(&json!(10), &json!([1, 10])));
        assert!(!ConditionOperator::Between.apply(&json!(11), &json!([1, 10])));
        assert!(!ConditionOperator::Between.apply(&json!(5), &json!([10, 1])));
    }

    #[test]
    fn test_between_bounds() {
        assert_eq!(between_bounds(&json!([1, 2])), Some((1.0, 2.0)));
        assert_eq!(between_bounds(&json!([2, 2])), Some((2.0, 2.0)));
        assert_eq!(between_bounds(&json!([3, 2])), None);
        assert_eq!(between_bounds(&json!([1, 2, 3])), None);
        assert_eq!(between_bounds(&json!(["a", 2])), None);
    }
}
