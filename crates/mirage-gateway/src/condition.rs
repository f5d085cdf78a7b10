//! Condition evaluation against request data.
//!
//! The evaluator never fails: malformed regexes, missing parameters and
//! unparseable numbers all evaluate to `false` so a bad rule can only
//! mis-match, never take down the dispatch path.

use crate::json_path::extract_json_path;
use crate::models::{Condition, ConditionOperator, ConditionSource};
use std::collections::HashMap;

/// Everything extracted from a request that predicates can look at.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub path_params: HashMap<String, String>,
    pub query: HashMap<String, Vec<String>>,
    pub headers: HashMap<String, Vec<String>>,
    pub body: String,
}

impl RequestData {
    /// Look up the value a condition source refers to. Absent values come
    /// back as the empty string, which is what `exists`/`notExists` key on.
    pub fn extract(&self, source: ConditionSource, key: &str) -> String {
        match source {
            ConditionSource::Path => self.path_params.get(key).cloned().unwrap_or_default(),
            ConditionSource::Query => self
                .query
                .get(key)
                .and_then(|vals| vals.first())
                .cloned()
                .unwrap_or_default(),
            ConditionSource::Header => self.header_first(key).unwrap_or_default(),
            ConditionSource::Body => {
                if self.body.is_empty() {
                    String::new()
                } else {
                    extract_json_path(&self.body, key).unwrap_or_default()
                }
            }
        }
    }

    /// Case-insensitive header lookup, first value wins.
    pub fn header_first(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, vals)| vals.first())
            .cloned()
    }
}

/// Evaluate all conditions with AND logic; vacuously true when empty.
/// Short-circuits on the first false predicate.
pub fn evaluate_all(conditions: &[Condition], data: &RequestData) -> bool {
    conditions.iter().all(|cond| evaluate(cond, data))
}

/// Evaluate a single condition against request data.
pub fn evaluate(cond: &Condition, data: &RequestData) -> bool {
    let actual = data.extract(cond.source, &cond.key);
    compare(&actual, cond.operator, &cond.value)
}

fn compare(actual: &str, operator: ConditionOperator, expected: &str) -> bool {
    use ConditionOperator::*;
    match operator {
        Eq => actual == expected,
        Ne => actual != expected,
        Contains => actual.contains(expected),
        NotContains => !actual.contains(expected),
        StartsWith => actual.starts_with(expected),
        EndsWith => actual.ends_with(expected),
        // Unanchored search; an invalid pattern simply never matches.
        Regex => match regex::Regex::new(expected) {
            Ok(re) => re.is_match(actual),
            Err(_) => false,
        },
        Exists => !actual.is_empty(),
        NotExists => actual.is_empty(),
        Gt => compare_numeric(actual, expected) == std::cmp::Ordering::Greater,
        Lt => compare_numeric(actual, expected) == std::cmp::Ordering::Less,
        Gte => compare_numeric(actual, expected) != std::cmp::Ordering::Less,
        Lte => compare_numeric(actual, expected) != std::cmp::Ordering::Greater,
    }
}

/// Compare two strings numerically as f64, falling back to lexicographic
/// order when either side does not parse.
fn compare_numeric(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConditionOperator as Op, ConditionSource as Src};

    fn cond(source: Src, key: &str, operator: Op, value: &str) -> Condition {
        Condition {
            source,
            key: key.to_string(),
            operator,
            value: value.to_string(),
        }
    }

    fn sample_data() -> RequestData {
        let mut data = RequestData::default();
        data.path_params.insert("id".into(), "42".into());
        data.query.insert("debug".into(), vec!["1".into(), "2".into()]);
        data.headers
            .insert("X-Api-Key".into(), vec!["secret".into()]);
        data.body = r#"{"user": {"name": "alice", "age": 34}}"#.to_string();
        data
    }

    #[test]
    fn test_path_eq() {
        let data = sample_data();
        assert!(evaluate(&cond(Src::Path, "id", Op::Eq, "42"), &data));
        assert!(!evaluate(&cond(Src::Path, "id", Op::Eq, "7"), &data));
    }

    #[test]
    fn test_query_first_value_wins() {
        let data = sample_data();
        assert!(evaluate(&cond(Src::Query, "debug", Op::Eq, "1"), &data));
        assert!(!evaluate(&cond(Src::Query, "debug", Op::Eq, "2"), &data));
    }

    #[test]
    fn test_header_case_insensitive() {
        let data = sample_data();
        assert!(evaluate(&cond(Src::Header, "x-api-key", Op::Eq, "secret"), &data));
        assert!(evaluate(&cond(Src::Header, "X-API-KEY", Op::Exists, ""), &data));
    }

    #[test]
    fn test_body_json_path() {
        let data = sample_data();
        assert!(evaluate(&cond(Src::Body, "user.name", Op::Eq, "alice"), &data));
        assert!(evaluate(&cond(Src::Body, "user.age", Op::Gt, "18"), &data));
        assert!(evaluate(&cond(Src::Body, "user.email", Op::NotExists, ""), &data));
    }

    #[test]
    fn test_string_operators() {
        let data = sample_data();
        assert!(evaluate(&cond(Src::Header, "X-Api-Key", Op::Contains, "ecre"), &data));
        assert!(evaluate(&cond(Src::Header, "X-Api-Key", Op::NotContains, "nope"), &data));
        assert!(evaluate(&cond(Src::Header, "X-Api-Key", Op::StartsWith, "sec"), &data));
        assert!(evaluate(&cond(Src::Header, "X-Api-Key", Op::EndsWith, "ret"), &data));
    }

    #[test]
    fn test_regex_search_not_anchored() {
        let data = sample_data();
        assert!(evaluate(&cond(Src::Path, "id", Op::Regex, r"\d"), &data));
        // Invalid regex evaluates false rather than erroring
        assert!(!evaluate(&cond(Src::Path, "id", Op::Regex, "("), &data));
    }

    #[test]
    fn test_numeric_comparison_and_fallback() {
        let data = sample_data();
        assert!(evaluate(&cond(Src::Path, "id", Op::Gte, "42"), &data));
        assert!(evaluate(&cond(Src::Path, "id", Op::Lte, "42"), &data));
        assert!(evaluate(&cond(Src::Path, "id", Op::Lt, "100"), &data));
        // "42" vs "abc": lexicographic fallback, digits sort before letters
        assert!(evaluate(&cond(Src::Path, "id", Op::Lt, "abc"), &data));
    }

    #[test]
    fn test_evaluate_all_and_logic() {
        let data = sample_data();
        assert!(evaluate_all(&[], &data));
        assert!(evaluate_all(
            &[
                cond(Src::Path, "id", Op::Eq, "42"),
                cond(Src::Query, "debug", Op::Eq, "1"),
            ],
            &data
        ));
        assert!(!evaluate_all(
            &[
                cond(Src::Path, "id", Op::Eq, "42"),
                cond(Src::Query, "debug", Op::Eq, "0"),
            ],
            &data
        ));
    }

    #[test]
    fn test_missing_sources_yield_empty() {
        let data = RequestData::default();
        assert!(evaluate(&cond(Src::Path, "id", Op::NotExists, ""), &data));
        assert!(evaluate(&cond(Src::Query, "q", Op::Eq, ""), &data));
        assert!(!evaluate(&cond(Src::Body, "user", Op::Exists, ""), &data));
    }
}
