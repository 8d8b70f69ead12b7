// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-turn tool-call dedup and search loop guard. State lives for the
//! duration of one `run_agent_loop` call and is discarded afterward.
use std::collections::HashMap;

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

/// Closed stop-word set dropped from normalized search queries. Small and
/// English-only on purpose — this is a fuzzy dedup aid, not a query parser.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "for", "to", "and", "or", "is", "are", "was", "were",
    "be", "been", "with", "at", "by", "from", "this", "that",
];

/// Canonical key for the exact-match cache: `"<name>:<json(args, sorted keys)>"`.
fn exact_key(name: &str, args: &Value) -> String {
    format!("{name}:{}", canonical_json(args))
}

/// Re-serialize a JSON value with object keys sorted, so argument order
/// never defeats the exact cache.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap(), canonical_json(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        Value::Array(items) => {
            let body = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
            format!("[{body}]")
        }
        other => other.to_string(),
    }
}

/// NFKC-normalize, lowercase, strip punctuation, tokenize, drop stop words,
/// dedupe and sort alphabetically — so `"Fix the Bug!"` and `"bug fix"`
/// collide in the fuzzy search index.
fn normalize_query(text: &str) -> String {
    let nfkc: String = text.nfkc().collect();
    let lower = nfkc.to_lowercase();
    let mut tokens: Vec<String> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens.join(" ")
}

/// Result of a dedup check: whether this call has already been answered
/// this turn, and the cached result text if so.
pub struct DedupCheck {
    pub is_duplicate: bool,
    pub cached_result: Option<String>,
}

/// Tracks exact and fuzzy duplicate tool calls plus the consecutive/total
/// search counters for one orchestrator run.
pub struct LoopGuard {
    search_tool_name: String,
    max_consecutive_searches: u32,
    max_total_searches: u32,
    exact_cache: HashMap<String, String>,
    fuzzy_index: HashMap<String, (String, String)>,
    consecutive_searches: u32,
    total_searches: u32,
}

impl LoopGuard {
    pub fn new(search_tool_name: impl Into<String>, max_consecutive_searches: u32, max_total_searches: u32) -> Self {
        Self {
            search_tool_name: search_tool_name.into(),
            max_consecutive_searches,
            max_total_searches,
            exact_cache: HashMap::new(),
            fuzzy_index: HashMap::new(),
            consecutive_searches: 0,
            total_searches: 0,
        }
    }

    fn is_search(&self, name: &str) -> bool {
        name == self.search_tool_name
    }

    /// `check(name, args)` — considers both the exact cache and, for the
    /// search tool only, the fuzzy index.
    pub fn check(&self, name: &str, args: &Value) -> DedupCheck {
        let key = exact_key(name, args);
        if let Some(cached) = self.exact_cache.get(&key) {
            return DedupCheck { is_duplicate: true, cached_result: Some(cached.clone()) };
        }
        if self.is_search(name) {
            if let Some(query) = args.get("query").and_then(Value::as_str) {
                let normalized = normalize_query(query);
                if let Some((_, cached)) = self.fuzzy_index.get(&normalized) {
                    return DedupCheck { is_duplicate: true, cached_result: Some(cached.clone()) };
                }
            }
        }
        DedupCheck { is_duplicate: false, cached_result: None }
    }

    /// Record a fresh result for `(name, args)`. Call only after a real
    /// gateway invocation — never for synthesized blocked/cancelled results.
    pub fn store(&mut self, name: &str, args: &Value, result: &str) {
        self.exact_cache.insert(exact_key(name, args), result.to_string());
        if self.is_search(name) {
            if let Some(query) = args.get("query").and_then(Value::as_str) {
                let normalized = normalize_query(query);
                self.fuzzy_index.insert(normalized, (query.to_string(), result.to_string()));
            }
        }
    }

    /// Record which tool just ran; advances or resets the consecutive
    /// search counter and, for searches, the total counter.
    pub fn record_call(&mut self, name: &str) {
        if self.is_search(name) {
            self.consecutive_searches += 1;
            self.total_searches += 1;
        } else {
            self.consecutive_searches = 0;
        }
    }

    pub fn search_cap_reached(&self) -> bool {
        self.total_searches >= self.max_total_searches
    }

    pub fn search_loop_detected(&self) -> bool {
        self.consecutive_searches >= self.max_consecutive_searches
    }

    /// Prior search queries, oldest first, for the "STOP SEARCHING" nudge.
    pub fn search_history(&self) -> Vec<String> {
        self.fuzzy_index.values().map(|(original, _)| original.clone()).collect()
    }
}
