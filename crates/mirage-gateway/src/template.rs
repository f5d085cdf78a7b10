//! Response body and header templating.
//!
//! Substrings of the form `{{source.key}}` are substituted with values from
//! the request, a random generator, or the clock. Unknown sources and
//! missing values resolve to the empty string; templating never fails.
//!
//! # Recognized sources
//!
//! - `{{path.id}}`, `{{query.name}}`, `{{header.x-request-id}}`,
//!   `{{body.user.name}}` - request data
//! - `{{random.uuid}}`, `{{random.int}}`, `{{random.int(1,10)}}`,
//!   `{{random.float}}`, `{{random.string}}`, `{{random.string(16)}}`,
//!   `{{random.bool}}`, `{{random.email}}`, `{{random.name}}`,
//!   `{{random.phone}}` - generated values
//! - `{{timestamp}}`, `{{timestamp.iso}}`, `{{timestamp.format(%Y/%m/%d)}}`,
//!   `{{timestamp.add(1h30m)}}` - formatted time

use crate::condition::RequestData;
use crate::json_path::extract_json_path;
use chrono::format::{Item, StrftimeItems};
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

fn token_regex() -> &'static Regex {
    TOKEN_REGEX.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").unwrap())
}

const STRING_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Template engine with a single owned random generator.
pub struct TemplateEngine {
    rng: Mutex<StdRng>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Substitute every `{{...}}` token in the template.
    pub fn process(&self, template: &str, data: &RequestData) -> String {
        token_regex()
            .replace_all(template, |caps: &regex::Captures| {
                self.resolve(caps[1].trim(), data)
            })
            .to_string()
    }

    /// Render every header value through the engine.
    pub fn process_headers(
        &self,
        headers: &HashMap<String, String>,
        data: &RequestData,
    ) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(k, v)| (k.clone(), self.process(v, data)))
            .collect()
    }

    fn resolve(&self, name: &str, data: &RequestData) -> String {
        // A leading dot is tolerated: {{.path.id}} == {{path.id}}
        let name = name.strip_prefix('.').unwrap_or(name);

        let (source, key) = match name.split_once('.') {
            Some((source, key)) => (source, key),
            None => (name, ""),
        };

        match source {
            "path" => data.path_params.get(key).cloned().unwrap_or_default(),
            "query" => data
                .query
                .get(key)
                .and_then(|vals| vals.first())
                .cloned()
                .unwrap_or_default(),
            "header" => data.header_first(key).unwrap_or_default(),
            "body" => {
                if key.is_empty() || data.body.is_empty() {
                    String::new()
                } else {
                    extract_json_path(&data.body, key).unwrap_or_default()
                }
            }
            "random" => self.resolve_random(key),
            "timestamp" => resolve_timestamp(key),
            // Reserved for future use.
            "env" => String::new(),
            _ => String::new(),
        }
    }

    fn resolve_random(&self, key: &str) -> String {
        let mut rng = self.rng.lock();
        match key {
            "uuid" => return uuid::Uuid::new_v4().to_string(),
            "int" => return rng.gen_range(0..1_000_000).to_string(),
            "float" => return format!("{:.2}", rng.gen::<f64>() * 1000.0),
            "string" => return random_string(&mut rng, 10),
            "bool" => {
                return (if rng.gen_range(0..2) == 0 { "false" } else { "true" }).to_string()
            }
            "email" => return format!("{}@example.com", random_string(&mut rng, 8)),
            "name" => {
                const NAMES: [&str; 8] = [
                    "John", "Jane", "Bob", "Alice", "Charlie", "Diana", "Eve", "Frank",
                ];
                return NAMES[rng.gen_range(0..NAMES.len())].to_string();
            }
            "phone" => {
                return format!(
                    "+1-{:03}-{:03}-{:04}",
                    rng.gen_range(0..1000u32),
                    rng.gen_range(0..1000u32),
                    rng.gen_range(0..10000u32)
                );
            }
            _ => {}
        }

        // Parameterized generators; malformed arguments degrade to the
        // no-argument default.
        if let Some(params) = parse_params(key, "int") {
            if let [lo, hi] = params.as_slice() {
                if let (Ok(lo), Ok(hi)) = (lo.parse::<i64>(), hi.parse::<i64>()) {
                    if hi > lo {
                        return rng.gen_range(lo..=hi).to_string();
                    }
                }
            }
            return rng.gen_range(0..1_000_000).to_string();
        }
        if let Some(params) = parse_params(key, "float") {
            if let [lo, hi] = params.as_slice() {
                if let (Ok(lo), Ok(hi)) = (lo.parse::<f64>(), hi.parse::<f64>()) {
                    if hi > lo {
                        return format!("{:.2}", lo + rng.gen::<f64>() * (hi - lo));
                    }
                }
            }
            return format!("{:.2}", rng.gen::<f64>() * 1000.0);
        }
        if let Some(params) = parse_params(key, "string") {
            if let [len] = params.as_slice() {
                if let Ok(len) = len.parse::<usize>() {
                    if len > 0 {
                        return random_string(&mut rng, len);
                    }
                }
            }
            return random_string(&mut rng, 10);
        }

        String::new()
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_timestamp(key: &str) -> String {
    let now = Utc::now();

    match key {
        "" | "unix" => return now.timestamp().to_string(),
        "unixMilli" => return now.timestamp_millis().to_string(),
        "unixNano" => return now.timestamp_nanos_opt().unwrap_or_default().to_string(),
        "iso" => return now.to_rfc3339_opts(SecondsFormat::Secs, true),
        "date" => return now.format("%Y-%m-%d").to_string(),
        "time" => return now.format("%H:%M:%S").to_string(),
        "datetime" => return now.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => {}
    }

    if let Some(params) = parse_params(key, "format") {
        if let [layout] = params.as_slice() {
            // Reject layouts with invalid specifiers up front; formatting
            // them would abort the render.
            let items: Vec<Item> = StrftimeItems::new(layout).collect();
            if !items.iter().any(|item| matches!(item, Item::Error)) {
                return now.format_with_items(items.into_iter()).to_string();
            }
        }
    }
    if let Some(params) = parse_params(key, "add") {
        if let [duration] = params.as_slice() {
            if let Ok(d) = humantime::parse_duration(duration) {
                if let Ok(d) = chrono::Duration::from_std(d) {
                    return (now + d).to_rfc3339_opts(SecondsFormat::Secs, true);
                }
            }
        }
    }

    now.timestamp().to_string()
}

/// Extract the arguments from a call-shaped key like `int(1,10)`.
fn parse_params(key: &str, func: &str) -> Option<Vec<String>> {
    let inner = key
        .strip_prefix(func)?
        .strip_prefix('(')?
        .strip_suffix(')')?;
    if inner.is_empty() {
        return Some(Vec::new());
    }
    Some(inner.split(',').map(|s| s.to_string()).collect())
}

fn random_string(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| STRING_CHARSET[rng.gen_range(0..STRING_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> RequestData {
        let mut data = RequestData::default();
        data.path_params.insert("id".into(), "42".into());
        data.query.insert("name".into(), vec!["John".into()]);
        data.headers
            .insert("X-Request-Id".into(), vec!["req-1".into()]);
        data.body = r#"{"user": {"name": "alice"}}"#.to_string();
        data
    }

    #[test]
    fn test_request_sources() {
        let engine = TemplateEngine::with_seed(1);
        let data = sample_data();
        assert_eq!(
            engine.process(r#"{"id":"{{path.id}}"}"#, &data),
            r#"{"id":"42"}"#
        );
        assert_eq!(engine.process("{{query.name}}", &data), "John");
        assert_eq!(engine.process("{{header.x-request-id}}", &data), "req-1");
        assert_eq!(engine.process("{{body.user.name}}", &data), "alice");
    }

    #[test]
    fn test_leading_dot_and_whitespace() {
        let engine = TemplateEngine::with_seed(1);
        let data = sample_data();
        assert_eq!(engine.process("{{.path.id}}", &data), "42");
        assert_eq!(engine.process("{{ path.id }}", &data), "42");
    }

    #[test]
    fn test_unknown_source_is_empty() {
        let engine = TemplateEngine::with_seed(1);
        let data = sample_data();
        assert_eq!(engine.process("[{{bogus.key}}]", &data), "[]");
        assert_eq!(engine.process("[{{env.HOME}}]", &data), "[]");
        assert_eq!(engine.process("[{{query.missing}}]", &data), "[]");
    }

    #[test]
    fn test_static_text_untouched() {
        let engine = TemplateEngine::with_seed(1);
        let data = sample_data();
        assert_eq!(
            engine.process(r#"{"static": "value"}"#, &data),
            r#"{"static": "value"}"#
        );
    }

    #[test]
    fn test_random_uuid_shape() {
        let engine = TemplateEngine::with_seed(1);
        let got = engine.process("{{random.uuid}}", &RequestData::default());
        assert!(uuid::Uuid::parse_str(&got).is_ok());
    }

    #[test]
    fn test_random_int_range_inclusive() {
        let engine = TemplateEngine::with_seed(7);
        for _ in 0..50 {
            let got = engine.process("{{random.int(1,3)}}", &RequestData::default());
            let n: i64 = got.parse().unwrap();
            assert!((1..=3).contains(&n), "{n} out of range");
        }
    }

    #[test]
    fn test_random_string_length_and_charset() {
        let engine = TemplateEngine::with_seed(7);
        let got = engine.process("{{random.string}}", &RequestData::default());
        assert_eq!(got.len(), 10);
        assert!(got.chars().all(|c| c.is_ascii_alphanumeric()));

        let got = engine.process("{{random.string(24)}}", &RequestData::default());
        assert_eq!(got.len(), 24);
    }

    #[test]
    fn test_random_malformed_args_degrade_to_default() {
        let engine = TemplateEngine::with_seed(7);
        let got = engine.process("{{random.int(9,1)}}", &RequestData::default());
        let n: i64 = got.parse().unwrap();
        assert!((0..1_000_000).contains(&n));

        let got = engine.process("{{random.string(x)}}", &RequestData::default());
        assert_eq!(got.len(), 10);
    }

    #[test]
    fn test_random_bool_email_phone() {
        let engine = TemplateEngine::with_seed(7);
        let data = RequestData::default();
        let got = engine.process("{{random.bool}}", &data);
        assert!(got == "true" || got == "false");
        let got = engine.process("{{random.email}}", &data);
        assert!(got.ends_with("@example.com"));
        let got = engine.process("{{random.phone}}", &data);
        assert!(got.starts_with("+1-") && got.len() == "+1-000-000-0000".len());
    }

    #[test]
    fn test_timestamp_unix_parses() {
        let engine = TemplateEngine::with_seed(1);
        let data = RequestData::default();
        let got = engine.process("{{timestamp}}", &data);
        assert!(got.parse::<i64>().unwrap() > 1_600_000_000);
        let got = engine.process("{{timestamp.unixMilli}}", &data);
        assert!(got.parse::<i64>().is_ok());
    }

    #[test]
    fn test_timestamp_iso_and_date() {
        let engine = TemplateEngine::with_seed(1);
        let data = RequestData::default();
        let got = engine.process("{{timestamp.iso}}", &data);
        assert!(got.ends_with('Z') && got.contains('T'));
        let got = engine.process("{{timestamp.date}}", &data);
        assert_eq!(got.len(), "2026-01-01".len());
    }

    #[test]
    fn test_timestamp_add_duration() {
        let engine = TemplateEngine::with_seed(1);
        let data = RequestData::default();
        let got = engine.process("{{timestamp.add(1h30m)}}", &data);
        let parsed = chrono::DateTime::parse_from_rfc3339(&got).unwrap();
        let delta = parsed.with_timezone(&Utc) - Utc::now();
        assert!(delta.num_minutes() >= 89 && delta.num_minutes() <= 90);
    }

    #[test]
    fn test_timestamp_bad_format_falls_back() {
        let engine = TemplateEngine::with_seed(1);
        let data = RequestData::default();
        // Unknown subkey and invalid layout both degrade to unix seconds
        let got = engine.process("{{timestamp.whenever}}", &data);
        assert!(got.parse::<i64>().is_ok());
        let got = engine.process("{{timestamp.format(%Q)}}", &data);
        assert!(got.parse::<i64>().is_ok());
    }

    #[test]
    fn test_process_headers() {
        let engine = TemplateEngine::with_seed(1);
        let data = sample_data();
        let mut headers = HashMap::new();
        headers.insert("X-Echo".to_string(), "{{path.id}}".to_string());
        headers.insert("X-Static".to_string(), "plain".to_string());
        let rendered = engine.process_headers(&headers, &data);
        assert_eq!(rendered.get("X-Echo").unwrap(), "42");
        assert_eq!(rendered.get("X-Static").unwrap(), "plain");
    }
}
