// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Bounded cache of compiled plans.
//!
//! Owned by the host; nothing in this crate keeps plans in global state.
//! Keys are `(query text, schema version)`, so bumping the schema version
//! naturally misses old entries. Eviction is least-recently-used. Errors are
//! never cached.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::ast::CqlError;
use super::plan::QueryPlan;
use super::schema::Schema;
use crate::config::CompilerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    schema_version: String,
}

#[derive(Debug)]
pub struct PlanCache {
    config: CompilerConfig,
    /// `None` when the configured capacity is 0.
    entries: Option<LruCache<CacheKey, Arc<QueryPlan>>>,
}

impl PlanCache {
    pub fn new(capacity: usize) -> Self {
        Self::from_config(CompilerConfig {
            plan_cache_capacity: capacity,
            ..CompilerConfig::default()
        })
    }

    pub fn from_config(config: CompilerConfig) -> Self {
        Self {
            entries: NonZeroUsize::new(config.plan_cache_capacity).map(LruCache::new),
            config,
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.plan_cache_capacity
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
    }

    /// Returns the cached plan for `(query, schema.version())`, compiling and
    /// inserting it on a miss.
    pub fn get_or_compile(&mut self, query: &str, schema: &Schema) -> Result<Arc<QueryPlan>, CqlError> {
        let Some(entries) = self.entries.as_mut() else {
            return Ok(Arc::new(super::compile_with_config(query, schema, &self.config)?));
        };

        let key = CacheKey {
            query: query.to_string(),
            schema_version: schema.version().to_string(),
        };
        if let Some(plan) = entries.get(&key) {
            tracing::trace!(schema_version = %key.schema_version, "Plan cache hit");
            return Ok(Arc::clone(plan));
        }

        let plan = Arc::new(super::compile_with_config(query, schema, &self.config)?);
        if let Some((evicted, _)) = entries.push(key, Arc::clone(&plan)) {
            tracing::debug!(
                schema_version = %evicted.schema_version,
                cached = entries.len(),
                "Evicted plan from cache"
            );
        }
        Ok(plan)
    }
}
