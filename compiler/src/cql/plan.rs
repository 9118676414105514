// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Compiled query plans.
//!
//! A [`QueryPlan`] is what a storage collaborator renders into SQL, an
//! in-memory filter or a search-index query. Plans are immutable once built.

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use super::pattern::LikePattern;

/// Join segments followed by the attribute name.
pub type FieldPath = Vec<String>;

/// Comparison operators in compiled predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,  // =
    Ne,  // <>
    Lt,  // <
    Lte, // <=
    Gt,  // >
    Gte, // >=
}

impl CompareOp {
    /// Maps a relation or modifier comparison symbol.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" | "==" => Some(Self::Eq),
            "<>" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }
}

/// A search term coerced to its field's type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    /// Strings and enum symbols.
    String(String),
    Number(i64),
    Boolean(bool),
    Uuid(Uuid),
    DateTime(NaiveDateTime),
}

/// A single `path op value` test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub path: FieldPath,
    pub op: CompareOp,
    pub value: TypedValue,
}

/// Type-checked predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredicateNode {
    True,
    And {
        left: Box<PredicateNode>,
        right: Box<PredicateNode>,
    },
    Or {
        left: Box<PredicateNode>,
        right: Box<PredicateNode>,
    },
    Not {
        inner: Box<PredicateNode>,
    },
    Compare {
        path: FieldPath,
        op: CompareOp,
        value: TypedValue,
    },
    Like {
        path: FieldPath,
        pattern: LikePattern,
        negated: bool,
    },
    /// `from <= path < to_exclusive`
    Range {
        path: FieldPath,
        from: NaiveDateTime,
        to_exclusive: NaiveDateTime,
    },
    /// All conditions must hold on the same child row.
    CompositeMatch {
        path: FieldPath,
        conditions: Vec<Comparison>,
    },
}

impl PredicateNode {
    pub fn and(left: PredicateNode, right: PredicateNode) -> Self {
        PredicateNode::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: PredicateNode, right: PredicateNode) -> Self {
        PredicateNode::Or {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(inner: PredicateNode) -> Self {
        PredicateNode::Not {
            inner: Box::new(inner),
        }
    }

    pub fn compare(path: FieldPath, op: CompareOp, value: TypedValue) -> Self {
        PredicateNode::Compare { path, op, value }
    }

    pub fn contains_composite(&self) -> bool {
        match self {
            PredicateNode::CompositeMatch { .. } => true,
            PredicateNode::And { left, right } | PredicateNode::Or { left, right } => {
                left.contains_composite() || right.contains_composite()
            }
            PredicateNode::Not { inner } => inner.contains_composite(),
            PredicateNode::True
            | PredicateNode::Compare { .. }
            | PredicateNode::Like { .. }
            | PredicateNode::Range { .. } => false,
        }
    }

    /// Every field path referenced by the tree, in visiting order.
    pub fn field_paths(&self) -> Vec<&FieldPath> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            PredicateNode::True => {}
            PredicateNode::And { left, right } | PredicateNode::Or { left, right } => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
            PredicateNode::Not { inner } => inner.collect_paths(out),
            PredicateNode::Compare { path, .. }
            | PredicateNode::Like { path, .. }
            | PredicateNode::Range { path, .. } => out.push(path),
            PredicateNode::CompositeMatch { path, conditions } => {
                out.push(path);
                out.extend(conditions.iter().map(|c| &c.path));
            }
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Sort specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub path: FieldPath,
    pub direction: SortDirection,
}

/// Immutable compiled query.
///
/// `distinct` is derived from the predicate: it is set exactly when a
/// [`PredicateNode::CompositeMatch`] is present, since joining a child
/// collection can repeat parent rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    predicate: PredicateNode,
    sort: Vec<SortSpec>,
    distinct: bool,
}

impl QueryPlan {
    pub fn new(predicate: PredicateNode, sort: Vec<SortSpec>) -> Self {
        let distinct = predicate.contains_composite();
        Self {
            predicate,
            sort,
            distinct,
        }
    }

    pub fn predicate(&self) -> &PredicateNode {
        &self.predicate
    }

    pub fn sort(&self) -> &[SortSpec] {
        &self.sort
    }

    pub fn distinct(&self) -> bool {
        self.distinct
    }

    /// Plan for fetching matches, which is this plan unchanged.
    pub fn collect_plan(&self) -> QueryPlan {
        self.clone()
    }

    /// Plan for counting matches: same predicate and `distinct`, no sort.
    pub fn count_plan(&self) -> QueryPlan {
        QueryPlan::new(self.predicate.clone(), Vec::new())
    }

    pub fn into_parts(self) -> (PredicateNode, Vec<SortSpec>, bool) {
        (self.predicate, self.sort, self.distinct)
    }
}
