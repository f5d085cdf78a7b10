//! Response rule selection.

use crate::condition::{evaluate_all, RequestData};
use crate::models::ResponseRule;

/// Pick the first enabled rule whose conditions all hold. `rules` arrives
/// pre-sorted ascending by priority from the store, so the first ordered
/// hit is the winner.
pub fn select_rule<'a>(rules: &'a [ResponseRule], data: &RequestData) -> Option<&'a ResponseRule> {
    rules
        .iter()
        .filter(|rule| rule.enabled)
        .find(|rule| evaluate_all(&rule.conditions, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, ConditionOperator, ConditionSource};
    use chrono::Utc;
    use std::collections::HashMap;

    fn rule(id: &str, priority: i32, enabled: bool, conditions: Vec<Condition>) -> ResponseRule {
        ResponseRule {
            id: id.to_string(),
            operation_id: "op".to_string(),
            name: id.to_string(),
            description: String::new(),
            priority,
            conditions,
            status_code: 200,
            headers: HashMap::new(),
            body: String::new(),
            delay_ms: 0,
            enabled,
            created_at: Utc::now(),
        }
    }

    fn query_cond(key: &str, value: &str) -> Condition {
        Condition {
            source: ConditionSource::Query,
            key: key.to_string(),
            operator: ConditionOperator::Eq,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_first_ordered_hit_wins() {
        let rules = vec![
            rule("high", 0, true, vec![query_cond("debug", "1")]),
            rule("fallback", 2, true, vec![]),
        ];

        let data = RequestData::default();
        assert_eq!(select_rule(&rules, &data).unwrap().id, "fallback");

        let mut data = RequestData::default();
        data.query.insert("debug".into(), vec!["1".into()]);
        assert_eq!(select_rule(&rules, &data).unwrap().id, "high");
    }

    #[test]
    fn test_disabled_rules_invisible() {
        let rules = vec![
            rule("off", 0, false, vec![]),
            rule("on", 1, true, vec![]),
        ];
        let data = RequestData::default();
        assert_eq!(select_rule(&rules, &data).unwrap().id, "on");
    }

    #[test]
    fn test_no_rules_or_no_match() {
        let data = RequestData::default();
        assert!(select_rule(&[], &data).is_none());

        let rules = vec![rule("gated", 0, true, vec![query_cond("k", "v")])];
        assert!(select_rule(&rules, &data).is_none());
    }
}
