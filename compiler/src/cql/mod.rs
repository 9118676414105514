// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! CQL (Contextual Query Language) Module
//!
//! Compiles CQL search queries into a [`QueryPlan`]: a typed predicate tree
//! plus sort keys that a storage layer renders into SQL or any other backend.
//!
//! # Syntax
//!
//! ```text
//! name = John
//! name = "John Smith" and age >= 21
//! (city.name = Par* or city.name = Lyon) not active = false
//! dateBorn = 2001-01-01:2001-01-31
//! attributes =/@key=color/@stringValue=red *
//! cql.allRecords = 1 sortby name/sort.descending age
//! ```
//!
//! # Relations
//!
//! | Relation | Meaning | Example |
//! |----------|---------|---------|
//! | `=` `==` `adj` `all` `any` | Masked match on strings, equality otherwise | `name = Jo*` |
//! | `<>` | Negated match | `name <> test` |
//! | `>`, `>=`, `<`, `<=` | Ordering, never masked | `age > 21` |
//!
//! # Masking
//!
//! `*` matches any run of characters and `?` exactly one; `\*` and `\?` match
//! the characters themselves. A relation flag `/unmasked` turns masking off.
//!
//! # Booleans
//!
//! `not` binds tighter than `and`, which binds tighter than `or`.
//! `a not b` means `a and not b`.

pub mod ast;
pub mod cache;
pub mod compiler;
pub mod parser;
pub mod pattern;
pub mod plan;
pub mod schema;
pub mod sort;

pub use ast::{AstNode, BooleanOp, CqlError, CqlErrorType, CqlQuery, Modifier, Position, Relation, SortIndex};
pub use cache::PlanCache;
pub use compiler::compile_predicate;
pub use parser::{parse, Parser};
pub use pattern::LikePattern;
pub use plan::{
    CompareOp, Comparison, FieldPath, PredicateNode, QueryPlan, SortDirection, SortSpec, TypedValue,
};
pub use schema::{resolve, FieldDescriptor, FieldKind, Schema, SchemaBuilder};
pub use sort::compile_sort;

use crate::config::CompilerConfig;

/// Compile CQL text against a schema.
///
/// Pure: the same text and schema always give an equal plan.
pub fn compile(text: &str, schema: &Schema) -> Result<QueryPlan, CqlError> {
    compile_with_config(text, schema, &CompilerConfig::default())
}

/// [`compile`], with the query length and nesting limits taken from `config`.
pub fn compile_with_config(
    text: &str,
    schema: &Schema,
    config: &CompilerConfig,
) -> Result<QueryPlan, CqlError> {
    if text.len() > config.max_query_length {
        return Err(CqlError::syntax(
            format!(
                "Query is {} bytes long; the limit is {}",
                text.len(),
                config.max_query_length
            ),
            None,
        ));
    }

    let query = Parser::with_max_depth(config.max_nesting_depth).parse(text)?;
    let plan = compile_query(&query.ast, schema)?;

    tracing::debug!(
        schema_version = schema.version(),
        query_len = text.len(),
        sort_keys = plan.sort().len(),
        distinct = plan.distinct(),
        "Compiled CQL query"
    );

    Ok(plan)
}

/// Compile an already parsed query.
pub fn compile_query(ast: &AstNode, schema: &Schema) -> Result<QueryPlan, CqlError> {
    match ast {
        AstNode::Sort { subtree, specs } => Ok(QueryPlan::new(
            compile_predicate(subtree, schema)?,
            compile_sort(specs, schema)?,
        )),
        other => Ok(QueryPlan::new(compile_predicate(other, schema)?, Vec::new())),
    }
}
