// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

use std::env;

pub const DEFAULT_MAX_QUERY_LENGTH: usize = 8192;
pub const DEFAULT_PLAN_CACHE_CAPACITY: usize = 256;
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Queries longer than this many bytes are rejected before parsing.
    pub max_query_length: usize,
    /// Entries kept by a [`crate::cql::PlanCache`]; 0 disables caching.
    pub plan_cache_capacity: usize,
    /// Deepest parenthesis nesting the parser accepts.
    pub max_nesting_depth: usize,
}

impl CompilerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let max_query_length = lookup("CQL_MAX_QUERY_LENGTH")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_MAX_QUERY_LENGTH);
        let plan_cache_capacity = lookup("CQL_PLAN_CACHE_CAPACITY")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_PLAN_CACHE_CAPACITY);
        let max_nesting_depth = lookup("CQL_MAX_NESTING_DEPTH")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_MAX_NESTING_DEPTH);
        Self {
            max_query_length,
            plan_cache_capacity,
            max_nesting_depth,
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
            plan_cache_capacity: DEFAULT_PLAN_CACHE_CAPACITY,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = CompilerConfig::from_lookup(|_| None);
        assert_eq!(config, CompilerConfig::default());
    }

    #[test]
    fn test_reads_values() {
        let vars = HashMap::from([
            ("CQL_MAX_QUERY_LENGTH", "100"),
            ("CQL_PLAN_CACHE_CAPACITY", " 0 "),
            ("CQL_MAX_NESTING_DEPTH", "16"),
        ]);
        let config = CompilerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.max_query_length, 100);
        assert_eq!(config.plan_cache_capacity, 0);
        assert_eq!(config.max_nesting_depth, 16);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = CompilerConfig::from_lookup(|_| Some("lots".to_string()));
        assert_eq!(config, CompilerConfig::default());
    }
}
