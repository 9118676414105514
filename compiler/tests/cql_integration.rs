// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! CQL Integration Tests
//!
//! End-to-end tests covering parsing, field resolution, predicate and sort
//! compilation through the public `compile` entry point.

use std::sync::Arc;
use std::thread;

use chrono::NaiveDateTime;
use cql_compiler::cql::{
    compile, compile_with_config, CompareOp, Comparison, CqlErrorType, FieldKind, LikePattern,
    PlanCache, PredicateNode, QueryPlan, Schema, SortDirection, SortSpec, TypedValue,
};
use cql_compiler::CompilerConfig;

// Helper to create the schema used throughout these tests
fn create_test_schema() -> Schema {
    Schema::builder("2024-06")
        .field("name", FieldKind::String)
        .field("age", FieldKind::Number)
        .field("dateBorn", FieldKind::Date)
        .field("active", FieldKind::Boolean)
        .field("status", FieldKind::Enum)
        .composite(
            "attributes",
            [
                ("key", FieldKind::String),
                ("stringValue", FieldKind::String),
                ("intValue", FieldKind::Number),
            ],
        )
        .join("city", |city| {
            city.field("name", FieldKind::String)
                .field("population", FieldKind::Number)
        })
        .build()
}

fn path(p: &str) -> Vec<String> {
    p.split('.').map(String::from).collect()
}

fn like(p: &str, term: &str) -> PredicateNode {
    PredicateNode::Like {
        path: path(p),
        pattern: LikePattern::from_cql(term, true),
        negated: false,
    }
}

fn at(s: &str) -> NaiveDateTime {
    s.parse().expect("valid timestamp")
}

fn plan(query: &str) -> QueryPlan {
    compile(query, &create_test_schema()).expect("should compile")
}

fn error_type(query: &str) -> CqlErrorType {
    compile(query, &create_test_schema())
        .expect_err("should fail")
        .error_type
}

// ============================================================================
// Basic terms
// ============================================================================

#[test]
fn test_string_term_compiles_to_like() {
    let plan = plan("name=John");
    assert_eq!(plan.predicate(), &like("name", "John"));
    assert!(plan.sort().is_empty());
    assert!(!plan.distinct());
}

#[test]
fn test_number_term_is_exact_compare() {
    assert_eq!(
        plan("age=10").predicate(),
        &PredicateNode::compare(path("age"), CompareOp::Eq, TypedValue::Number(10))
    );
}

#[test]
fn test_joined_field() {
    assert_eq!(
        plan("city.population > 100000").predicate(),
        &PredicateNode::compare(
            path("city.population"),
            CompareOp::Gt,
            TypedValue::Number(100000)
        )
    );
    assert_eq!(plan("city.name = Par*").predicate(), &like("city.name", "Par*"));
}

#[test]
fn test_negated_string_term() {
    assert_eq!(
        plan("name <> John").predicate(),
        &PredicateNode::Like {
            path: path("name"),
            pattern: LikePattern::from_cql("John", true),
            negated: true,
        }
    );
}

// ============================================================================
// Boolean semantics
// ============================================================================

#[test]
fn test_all_records_not() {
    assert_eq!(
        plan("cql.allRecords=1 NOT age>=22").predicate(),
        &PredicateNode::and(
            PredicateNode::True,
            PredicateNode::not(PredicateNode::compare(
                path("age"),
                CompareOp::Gte,
                TypedValue::Number(22)
            ))
        )
    );
}

#[test]
fn test_or() {
    assert_eq!(
        plan("name=John or age=10").predicate(),
        &PredicateNode::or(
            like("name", "John"),
            PredicateNode::compare(path("age"), CompareOp::Eq, TypedValue::Number(10))
        )
    );
}

#[test]
fn test_or_with_match_anything_simplifies() {
    assert_eq!(plan("name=John or age=*").predicate(), &like("name", "John"));
}

#[test]
fn test_and_binds_tighter_than_or() {
    assert_eq!(
        plan("name=a or name=b and age=1").predicate(),
        &PredicateNode::or(
            like("name", "a"),
            PredicateNode::and(
                like("name", "b"),
                PredicateNode::compare(path("age"), CompareOp::Eq, TypedValue::Number(1))
            )
        )
    );
}

#[test]
fn test_parenthesized_expression() {
    assert_eq!(
        plan("(name=a or name=b) and active=true").predicate(),
        &PredicateNode::and(
            PredicateNode::or(like("name", "a"), like("name", "b")),
            PredicateNode::compare(path("active"), CompareOp::Eq, TypedValue::Boolean(true))
        )
    );
}

// ============================================================================
// Masking
// ============================================================================

fn pattern_of(query: &str) -> LikePattern {
    match plan(query).predicate() {
        PredicateNode::Like { pattern, .. } => pattern.clone(),
        other => panic!("expected Like, got {:?}", other),
    }
}

#[test]
fn test_star_mask() {
    let pattern = pattern_of("name=a*");
    for value in ["a", "ab", "abc"] {
        assert!(pattern.matches(value), "{}", value);
    }
    assert!(!pattern.matches("b"));
}

#[test]
fn test_question_mask() {
    let pattern = pattern_of("name=a?");
    assert!(pattern.matches("ab"));
    assert!(!pattern.matches("a"));
    assert!(!pattern.matches("abc"));
}

#[test]
fn test_escaped_masks() {
    let star = pattern_of(r"name=\*");
    assert!(star.matches("*"));
    assert!(!star.matches("a"));

    let question = pattern_of(r"name=\?");
    assert!(question.matches("?"));
    assert!(!question.matches("a"));
}

#[test]
fn test_quotes_in_terms_are_literal() {
    assert!(pattern_of("name='").matches("'"));
    assert!(pattern_of(r#"name=\""#).matches("\""));
    assert!(pattern_of(r#"name="say \"hi\"""#).matches("say \"hi\""));
}

// ============================================================================
// Dates
// ============================================================================

#[test]
fn test_date_range_excludes_end_day() {
    let plan = plan("dateBorn=2001-01-01:2001-01-03");
    let PredicateNode::Range {
        path: range_path,
        from,
        to_exclusive,
    } = plan.predicate()
    else {
        panic!("expected Range, got {:?}", plan.predicate());
    };
    assert_eq!(range_path, &path("dateBorn"));
    assert_eq!(*from, at("2001-01-01T00:00:00"));

    let in_range = |ts: NaiveDateTime| *from <= ts && ts < *to_exclusive;
    assert!(in_range(at("2001-01-01T00:00:00")));
    assert!(in_range(at("2001-01-02T23:59:59")));
    assert!(!in_range(at("2001-01-03T00:00:00")));
    assert!(!in_range(at("2001-01-03T12:00:00")));
    assert!(!in_range(at("2000-12-31T23:59:59")));
}

#[test]
fn test_empty_date_range_is_rejected() {
    assert_eq!(
        error_type("dateBorn=2001-01-01:2001-01-01"),
        CqlErrorType::TypeCoercion
    );
    assert_eq!(
        error_type("dateBorn=2001-01-02:2001-01-01"),
        CqlErrorType::TypeCoercion
    );
}

#[test]
fn test_date_equality() {
    assert_eq!(
        plan("dateBorn=2001-01-01T08:15:00").predicate(),
        &PredicateNode::compare(
            path("dateBorn"),
            CompareOp::Eq,
            TypedValue::DateTime(at("2001-01-01T08:15:00"))
        )
    );
}

// ============================================================================
// Composite attributes
// ============================================================================

#[test]
fn test_composite_match_forces_distinct() {
    let plan = plan("attributes=/@key=key1/@stringValue=val1 *");
    assert_eq!(
        plan.predicate(),
        &PredicateNode::CompositeMatch {
            path: path("attributes"),
            conditions: vec![
                Comparison {
                    path: path("attributes.key"),
                    op: CompareOp::Eq,
                    value: TypedValue::String("key1".into()),
                },
                Comparison {
                    path: path("attributes.stringValue"),
                    op: CompareOp::Eq,
                    value: TypedValue::String("val1".into()),
                },
            ],
        }
    );
    assert!(plan.distinct());
}

#[test]
fn test_composite_attribute_types() {
    let plan = plan("name=x and attributes=/@KEY=size/@intValue>=3 *");
    let PredicateNode::And { right, .. } = plan.predicate() else {
        panic!("expected And");
    };
    let PredicateNode::CompositeMatch { conditions, .. } = right.as_ref() else {
        panic!("expected CompositeMatch");
    };
    assert_eq!(conditions[1].op, CompareOp::Gte);
    assert_eq!(conditions[1].value, TypedValue::Number(3));
    assert!(plan.distinct());
}

#[test]
fn test_unknown_attribute() {
    assert_eq!(
        error_type("attributes=/@nonexistent=val *"),
        CqlErrorType::UnknownField
    );
}

#[test]
fn test_ambiguous_attribute() {
    let schema = Schema::builder("2024-06")
        .composite(
            "tags",
            [("label", FieldKind::String), ("Label", FieldKind::String)],
        )
        .build();
    let err = compile("tags=/@label=x *", &schema).unwrap_err();
    assert_eq!(err.error_type, CqlErrorType::AmbiguousField);
}

// ============================================================================
// Sorting and count plans
// ============================================================================

#[test]
fn test_sortby() {
    let plan = plan("name=a* sortby city.name/sort.descending age");
    assert_eq!(
        plan.sort(),
        &[
            SortSpec {
                path: path("city.name"),
                direction: SortDirection::Desc,
            },
            SortSpec {
                path: path("age"),
                direction: SortDirection::Asc,
            },
        ]
    );
    assert_eq!(plan.predicate(), &like("name", "a*"));
}

#[test]
fn test_collect_plan_keeps_sort_and_distinct() {
    let compiled = plan("attributes=/@key=k * sortby name/sort.descending");
    let collect = compiled.collect_plan();
    assert_eq!(collect, compiled);
    assert_eq!(collect.sort().len(), 1);
    assert!(collect.distinct());
}

#[test]
fn test_count_plan() {
    let collect = plan("attributes=/@key=k *  sortby name");
    let count = collect.count_plan();
    assert!(count.sort().is_empty());
    assert!(count.distinct());
    assert_eq!(count.predicate(), collect.predicate());
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_unsupported_relations() {
    assert_eq!(error_type("name prox Jon"), CqlErrorType::UnsupportedFeature);
    assert_eq!(error_type("age % 10"), CqlErrorType::UnsupportedFeature);
}

#[test]
fn test_syntax_errors_have_positions() {
    let err = compile("(name=a or", &create_test_schema()).unwrap_err();
    assert_eq!(err.error_type, CqlErrorType::SyntaxError);
    assert!(err.position.is_some());
}

#[test]
fn test_unknown_fields() {
    assert_eq!(error_type("nickname=x"), CqlErrorType::UnknownField);
    assert_eq!(error_type("name=x sortby nickname"), CqlErrorType::UnknownField);
    assert_eq!(error_type("city.zip=1"), CqlErrorType::UnknownField);
}

#[test]
fn test_type_coercion_error() {
    let err = compile("age=ten", &create_test_schema()).unwrap_err();
    assert_eq!(err.error_type, CqlErrorType::TypeCoercion);
    assert_eq!(err.field.as_deref(), Some("age"));
    assert_eq!(err.term.as_deref(), Some("ten"));
}

#[test]
fn test_query_length_limit() {
    let config = CompilerConfig {
        max_query_length: 8,
        ..CompilerConfig::default()
    };
    let schema = create_test_schema();
    assert!(compile_with_config("age=1", &schema, &config).is_ok());
    let err = compile_with_config("name=abcdefgh", &schema, &config).unwrap_err();
    assert_eq!(err.error_type, CqlErrorType::SyntaxError);
}

#[test]
fn test_nesting_depth_limit() {
    let schema = create_test_schema();
    let nested = |n: usize| format!("{}age=1{}", "(".repeat(n), ")".repeat(n));

    assert!(compile(&nested(100), &schema).is_ok());
    let err = compile(&nested(2000), &schema).unwrap_err();
    assert_eq!(err.error_type, CqlErrorType::SyntaxError);
    assert!(err.position.is_some());

    let config = CompilerConfig {
        max_nesting_depth: 2,
        ..CompilerConfig::default()
    };
    assert!(compile_with_config(&nested(2), &schema, &config).is_ok());
    assert_eq!(
        compile_with_config(&nested(3), &schema, &config).unwrap_err().error_type,
        CqlErrorType::SyntaxError
    );
}

#[test]
fn test_error_serializes_for_clients() {
    let err = compile("age=ten", &create_test_schema()).unwrap_err();
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["type"], "type_coercion");
    assert_eq!(json["field"], "age");
}

// ============================================================================
// Determinism, serialization and sharing
// ============================================================================

#[test]
fn test_compile_is_deterministic() {
    let query = "(name=Jo* or city.name=Paris) not active=false sortby age/sort.descending";
    let schema = create_test_schema();
    assert_eq!(compile(query, &schema).unwrap(), compile(query, &schema).unwrap());
}

#[test]
fn test_every_plan_path_is_declared() {
    let schema = create_test_schema();
    let plan = compile(
        "name=a and city.name=b or attributes=/@key=k *",
        &schema,
    )
    .unwrap();
    for p in plan.predicate().field_paths() {
        let dotted = p.join(".");
        let resolved = match dotted.rsplit_once('.') {
            Some((parent, attr)) if schema.resolve(parent).is_ok_and(|f| f.is_composite()) => {
                schema
                    .resolve(parent)
                    .unwrap()
                    .resolve_sub_attribute(attr)
                    .is_ok()
            }
            _ => schema.resolve(&dotted).is_ok(),
        };
        assert!(resolved, "{}", dotted);
    }
}

#[test]
fn test_plan_serializes_to_tagged_json() {
    let plan = plan("age>=22 sortby name/sort.descending");
    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["predicate"]["type"], "compare");
    assert_eq!(json["predicate"]["op"], "gte");
    assert_eq!(json["predicate"]["value"]["type"], "number");
    assert_eq!(json["predicate"]["value"]["value"], 22);
    assert_eq!(json["sort"][0]["direction"], "desc");
    assert_eq!(json["distinct"], false);
}

#[test]
fn test_concurrent_compiles_share_schema() {
    let schema = Arc::new(create_test_schema());
    let expected = compile("name=a* and age<5", &schema).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let schema = Arc::clone(&schema);
            thread::spawn(move || compile("name=a* and age<5", &schema).unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn test_plan_cache_round_trip() {
    let schema = create_test_schema();
    let mut cache = PlanCache::new(8);
    let cached = cache.get_or_compile("name=a", &schema).unwrap();
    assert_eq!(*cached, compile("name=a", &schema).unwrap());
    assert_eq!(cache.len(), 1);
}
