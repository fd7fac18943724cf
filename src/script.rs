//! Script Evaluator
//!
//! Minimal best-effort EVAL helper: substitutes `KEYS[i]`/`ARGV[i]`
//! placeholders, then executes `redis.call(...)` lines against the engine.
//! Supported sub-commands are GET, SET and INCR; full language semantics
//! are not promised.

use std::time::Duration;

use bytes::Bytes;

use crate::storage::Cache;

#[derive(Clone)]
pub struct ScriptEngine {
    cache: Cache,
}

impl ScriptEngine {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// Evaluate a script. The result is the first value produced by an
    /// executed sub-command, or `"OK"` when none produced one.
    pub fn eval(&self, script: &str, keys: &[String], args: &[String]) -> String {
        for raw in script.lines() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }

            let mut line = trimmed.to_string();
            for (i, key) in keys.iter().enumerate() {
                line = line.replace(&format!("KEYS[{}]", i + 1), key);
            }
            for (i, arg) in args.iter().enumerate() {
                line = line.replace(&format!("ARGV[{}]", i + 1), arg);
            }

            if line.starts_with("redis.call") {
                let call = extract_call(&line);
                if let Some(result) = self.run_call(&call) {
                    return result;
                }
            }
        }

        "OK".to_string()
    }

    fn run_call(&self, call: &[String]) -> Option<String> {
        let name = call.first()?;
        match name.to_uppercase().as_str() {
            "GET" => {
                let key = call.get(1)?;
                Some(match self.cache.get(key) {
                    Some(v) => String::from_utf8_lossy(&v).into_owned(),
                    None => "nil".to_string(),
                })
            }

            "SET" => {
                if call.len() < 3 {
                    return None;
                }
                self.cache
                    .set(&call[1], Bytes::from(call[2].clone()), Duration::ZERO);
                Some("OK".to_string())
            }

            "INCR" => {
                let key = call.get(1)?;
                match self.cache.get(key) {
                    Some(current) => {
                        let n: i64 = String::from_utf8_lossy(&current).trim().parse().ok()?;
                        let next = (n + 1).to_string();
                        self.cache
                            .set(key, Bytes::from(next.clone()), Duration::ZERO);
                        Some(next)
                    }
                    None => {
                        self.cache.set(key, Bytes::from_static(b"1"), Duration::ZERO);
                        Some("1".to_string())
                    }
                }
            }

            _ => None,
        }
    }
}

/// Pull the comma-separated, quote-trimmed arguments out of a
/// `redis.call('CMD', 'arg', ...)` invocation.
fn extract_call(line: &str) -> Vec<String> {
    let (start, end) = match (line.find('('), line.rfind(')')) {
        (Some(s), Some(e)) if e > s => (s, e),
        _ => return Vec::new(),
    };

    line[start + 1..end]
        .split(',')
        .map(|part| {
            part.trim()
                .trim_matches(|c| c == '\'' || c == '"')
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (ScriptEngine, Cache) {
        let cache = Cache::new();
        (ScriptEngine::new(cache.clone()), cache)
    }

    #[test]
    fn test_set_then_get() {
        let (engine, cache) = engine();
        let result = engine.eval(r#"redis.call("SET", "greeting", "hello")"#, &[], &[]);
        assert_eq!(result, "OK");
        assert_eq!(cache.get("greeting"), Some(Bytes::from_static(b"hello")));
    }

    #[test]
    fn test_get_returns_first_result() {
        let (engine, cache) = engine();
        cache.set("k", Bytes::from_static(b"v"), Duration::ZERO);

        let script = "redis.call(\"GET\", \"k\")\nredis.call(\"SET\", \"k\", \"other\")";
        assert_eq!(engine.eval(script, &[], &[]), "v");
        // The second line never ran.
        assert_eq!(cache.get("k"), Some(Bytes::from_static(b"v")));
    }

    #[test]
    fn test_get_missing_is_nil() {
        let (engine, _) = engine();
        assert_eq!(engine.eval(r#"redis.call("GET", "absent")"#, &[], &[]), "nil");
    }

    #[test]
    fn test_keys_argv_substitution() {
        let (engine, cache) = engine();
        let result = engine.eval(
            r#"redis.call("SET", KEYS[1], ARGV[1])"#,
            &["user:1".to_string()],
            &["Ada".to_string()],
        );
        assert_eq!(result, "OK");
        assert_eq!(cache.get("user:1"), Some(Bytes::from_static(b"Ada")));
    }

    #[test]
    fn test_incr_missing_key_becomes_one() {
        let (engine, cache) = engine();
        assert_eq!(engine.eval(r#"redis.call("INCR", "counter")"#, &[], &[]), "1");
        assert_eq!(cache.get("counter"), Some(Bytes::from_static(b"1")));
    }

    #[test]
    fn test_incr_existing_value() {
        let (engine, cache) = engine();
        cache.set("counter", Bytes::from_static(b"41"), Duration::ZERO);
        assert_eq!(
            engine.eval(r#"redis.call("INCR", "counter")"#, &[], &[]),
            "42"
        );
        assert_eq!(cache.get("counter"), Some(Bytes::from_static(b"42")));
    }

    #[test]
    fn test_comments_and_empty_script_yield_ok() {
        let (engine, _) = engine();
        assert_eq!(engine.eval("-- just a comment\n\n", &[], &[]), "OK");
        assert_eq!(engine.eval("", &[], &[]), "OK");
    }
}
