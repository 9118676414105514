// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! CQL Predicate Compiler - Turns a CQL AST into a typed predicate tree.
//!
//! | Relation | STRING field | other fields |
//! |----------|--------------|--------------|
//! | `=` `==` `adj` `all` `any` | `Like` | `Compare(Eq)` / `Range` |
//! | `<>` | negated `Like` | `Compare(Ne)` / `Not(Range)` |
//! | `<` `<=` `>` `>=` | `Compare` | `Compare` |
//!
//! `NOT` follows CQL: `a NOT b` is `a AND NOT b`.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use uuid::Uuid;

use super::ast::{AstNode, BooleanOp, CqlError, Modifier, Relation};
use super::pattern::{unescape, LikePattern};
use super::plan::{CompareOp, Comparison, PredicateNode, TypedValue};
use super::schema::{FieldDescriptor, FieldKind, Schema};

const CONTEXT_SET_PREFIX: &str = "cql.";
const ALL_RECORDS_INDEX: &str = "cql.allRecords";

static DATE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}):(\d{4}-\d{2}-\d{2})$").expect("date range pattern is valid")
});

/// Compile a CQL expression into a predicate tree.
///
/// A `Sort` node compiles to its subtree's predicate; sort keys are handled by
/// [`super::sort::compile_sort`].
pub fn compile_predicate(ast: &AstNode, schema: &Schema) -> Result<PredicateNode, CqlError> {
    match ast {
        AstNode::Term {
            index,
            relation,
            modifiers,
            value,
        } => compile_term(index, relation, modifiers, value, schema),
        AstNode::Boolean { op, left, right } => compile_boolean(*op, left, right, schema),
        AstNode::Sort { subtree, .. } => compile_predicate(subtree, schema),
    }
}

fn compile_boolean(
    op: BooleanOp,
    left: &AstNode,
    right: &AstNode,
    schema: &Schema,
) -> Result<PredicateNode, CqlError> {
    match op {
        BooleanOp::And => Ok(PredicateNode::and(
            compile_predicate(left, schema)?,
            compile_predicate(right, schema)?,
        )),
        BooleanOp::Or => {
            if let AstNode::Term { index, .. } = right {
                if right.is_match_anything() && !is_context_set(index) {
                    // `x OR field = *` matches whatever `x` matches
                    schema.resolve(index)?;
                    return compile_predicate(left, schema);
                }
            }
            Ok(PredicateNode::or(
                compile_predicate(left, schema)?,
                compile_predicate(right, schema)?,
            ))
        }
        BooleanOp::Not => Ok(PredicateNode::and(
            compile_predicate(left, schema)?,
            PredicateNode::not(compile_predicate(right, schema)?),
        )),
        BooleanOp::Prox => Err(CqlError::unsupported(
            "Proximity operator 'prox' is not supported",
        )),
    }
}

fn is_context_set(index: &str) -> bool {
    index
        .get(..CONTEXT_SET_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(CONTEXT_SET_PREFIX))
}

fn compile_term(
    index: &str,
    relation: &Relation,
    modifiers: &[Modifier],
    value: &str,
    schema: &Schema,
) -> Result<PredicateNode, CqlError> {
    if is_context_set(index) {
        return compile_context_set(index, relation, modifiers, value);
    }

    let field = schema.resolve(index)?;

    if matches!(relation, Relation::Prox | Relation::Named(_)) {
        return Err(CqlError::unsupported(format!(
            "Relation '{}' is not supported",
            relation.as_str()
        )));
    }

    let (attributes, flags): (Vec<&Modifier>, Vec<&Modifier>) =
        modifiers.iter().partition(|m| m.is_attribute());
    let masked = masking_enabled(&flags)?;

    if !attributes.is_empty() {
        return compile_composite(field, relation, &attributes, value);
    }

    if field.is_composite() {
        return Err(CqlError::unsupported(format!(
            "Field '{}' can only be searched through attribute modifiers such as '/@{}'",
            field.name(),
            field.sub_attributes.keys().next().map(String::as_str).unwrap_or("attr")
        )));
    }

    if relation.is_ordering() {
        return compile_ordering(field, relation, value);
    }

    let negated = *relation == Relation::NotEq;

    if field.kind == FieldKind::String {
        return Ok(PredicateNode::Like {
            path: field.path.clone(),
            pattern: LikePattern::from_cql(value, masked),
            negated,
        });
    }

    let positive = if masked && value == "*" {
        PredicateNode::True
    } else if let Some((from, to_exclusive)) = date_range(field, value)? {
        PredicateNode::Range {
            path: field.path.clone(),
            from,
            to_exclusive,
        }
    } else {
        let op = if negated { CompareOp::Ne } else { CompareOp::Eq };
        return Ok(PredicateNode::compare(
            field.path.clone(),
            op,
            coerce(field, value)?,
        ));
    };

    Ok(if negated {
        PredicateNode::not(positive)
    } else {
        positive
    })
}

fn compile_context_set(
    index: &str,
    relation: &Relation,
    modifiers: &[Modifier],
    value: &str,
) -> Result<PredicateNode, CqlError> {
    if !index.eq_ignore_ascii_case(ALL_RECORDS_INDEX) {
        return Err(CqlError::unsupported(format!(
            "Index '{}' is not supported",
            index
        )));
    }
    if matches!(relation, Relation::Eq | Relation::Exact) && modifiers.is_empty() && value == "1" {
        Ok(PredicateNode::True)
    } else {
        Err(CqlError::unsupported(format!(
            "'{}' only supports '{} = 1'",
            ALL_RECORDS_INDEX, ALL_RECORDS_INDEX
        )))
    }
}

/// Reads the relation flags. Returns whether masking characters are active.
fn masking_enabled(flags: &[&Modifier]) -> Result<bool, CqlError> {
    let mut masked = true;
    for flag in flags {
        if flag.comparison.is_some() {
            return Err(CqlError::unsupported(format!(
                "Relation modifier '{}' does not take a value",
                flag.name
            )));
        }
        if flag.is_named("masked") {
            masked = true;
        } else if flag.is_named("unmasked") {
            masked = false;
        } else if !flag.is_named("respectCase") {
            return Err(CqlError::unsupported(format!(
                "Relation modifier '{}' is not supported",
                flag.name
            )));
        }
    }
    Ok(masked)
}

fn compile_composite(
    field: &FieldDescriptor,
    relation: &Relation,
    attributes: &[&Modifier],
    value: &str,
) -> Result<PredicateNode, CqlError> {
    if !relation.is_match() {
        return Err(CqlError::unsupported(format!(
            "Relation '{}' cannot be combined with attribute modifiers",
            relation.as_str()
        )));
    }
    if value != "*" {
        return Err(CqlError::unsupported(format!(
            "Attribute searches on '{}' must use '*' as the search term",
            field.name()
        )));
    }

    let mut conditions = Vec::with_capacity(attributes.len());
    for modifier in attributes {
        let sub = field.resolve_sub_attribute(&modifier.name)?;
        let (Some(symbol), Some(raw)) = (&modifier.comparison, &modifier.value) else {
            return Err(CqlError::unsupported(format!(
                "Attribute modifier '{}' requires a value",
                modifier.name
            )));
        };
        let op = CompareOp::from_symbol(symbol).ok_or_else(|| {
            CqlError::unsupported(format!(
                "Comparison '{}' is not supported on attribute '{}'",
                symbol, modifier.name
            ))
        })?;
        conditions.push(Comparison {
            path: sub.path.clone(),
            op,
            value: coerce(sub, raw)?,
        });
    }

    Ok(PredicateNode::CompositeMatch {
        path: field.path.clone(),
        conditions,
    })
}

fn compile_ordering(
    field: &FieldDescriptor,
    relation: &Relation,
    value: &str,
) -> Result<PredicateNode, CqlError> {
    let op = CompareOp::from_symbol(relation.as_str()).ok_or_else(|| {
        CqlError::unsupported(format!("Relation '{}' is not supported", relation.as_str()))
    })?;
    if field.kind == FieldKind::Boolean {
        return Err(CqlError::unsupported(format!(
            "Relation '{}' is not supported on boolean field '{}'",
            relation.as_str(),
            field.name()
        )));
    }
    Ok(PredicateNode::compare(
        field.path.clone(),
        op,
        coerce(field, value)?,
    ))
}

/// Coerce a raw term to the field's type.
fn coerce(field: &FieldDescriptor, raw: &str) -> Result<TypedValue, CqlError> {
    let term = unescape(raw);
    let fail = || CqlError::type_coercion(field.name(), raw, field.kind);

    match field.kind {
        FieldKind::String | FieldKind::Enum => Ok(TypedValue::String(term)),
        FieldKind::Number => term
            .trim()
            .parse::<i64>()
            .map(TypedValue::Number)
            .map_err(|_| fail()),
        FieldKind::Uuid => Uuid::parse_str(term.trim())
            .map(TypedValue::Uuid)
            .map_err(|_| fail()),
        FieldKind::Boolean => match term.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(TypedValue::Boolean(true)),
            "false" => Ok(TypedValue::Boolean(false)),
            _ => Err(fail()),
        },
        FieldKind::Date => parse_local_date_time(term.trim())
            .map(TypedValue::DateTime)
            .ok_or_else(fail),
    }
}

/// ISO local date-time, or a bare date at midnight.
fn parse_local_date_time(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = value.parse::<NaiveDateTime>() {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// `YYYY-MM-DD:YYYY-MM-DD` on a date field, returned as `[first 00:00, last 00:00)`.
/// `last` must fall after `first`; an empty range is a coercion error.
fn date_range(
    field: &FieldDescriptor,
    raw: &str,
) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, CqlError> {
    if field.kind != FieldKind::Date {
        return Ok(None);
    }
    let term = unescape(raw);
    let Some(caps) = DATE_RANGE.captures(term.trim()) else {
        return Ok(None);
    };

    let fail = || CqlError::type_coercion(field.name(), raw, field.kind);
    let day = |text: &str| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok();

    let first = day(&caps[1]).ok_or_else(fail)?;
    let last = day(&caps[2]).ok_or_else(fail)?;
    if last <= first {
        return Err(fail());
    }

    let from = first.and_hms_opt(0, 0, 0).ok_or_else(fail)?;
    let to_exclusive = last.and_hms_opt(0, 0, 0).ok_or_else(fail)?;
    Ok(Some((from, to_exclusive)))
}
