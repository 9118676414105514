// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! CQL Abstract Syntax Tree types.
//!
//! Term values and modifier values are kept exactly as written (minus the
//! surrounding quotes), backslash escapes included. The compiler decides how
//! to interpret masking characters once it knows the field type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::schema::FieldKind;

/// A parsed CQL query with the original string and AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CqlQuery {
    pub raw: String,
    pub ast: AstNode,
}

/// Node in the CQL AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AstNode {
    Term {
        index: String,
        relation: Relation,
        modifiers: Vec<Modifier>,
        value: String,
    },
    Boolean {
        op: BooleanOp,
        left: Box<AstNode>,
        right: Box<AstNode>,
    },
    Sort {
        subtree: Box<AstNode>,
        specs: Vec<SortIndex>,
    },
}

impl AstNode {
    pub fn term(
        index: impl Into<String>,
        relation: Relation,
        modifiers: Vec<Modifier>,
        value: impl Into<String>,
    ) -> Self {
        AstNode::Term {
            index: index.into(),
            relation,
            modifiers,
            value: value.into(),
        }
    }

    pub fn boolean(op: BooleanOp, left: AstNode, right: AstNode) -> Self {
        AstNode::Boolean {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// True for the `index = *` idiom: plain `=`, no modifiers, an unescaped
    /// lone `*` as the search term.
    pub fn is_match_anything(&self) -> bool {
        match self {
            AstNode::Term {
                relation,
                modifiers,
                value,
                ..
            } => *relation == Relation::Eq && modifiers.is_empty() && value == "*",
            _ => false,
        }
    }
}

/// Relations between an index and a search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Eq,    // =
    Exact, // ==
    NotEq, // <>
    Lt,    // <
    Gt,    // >
    Lte,   // <=
    Gte,   // >=
    Adj,
    All,
    Any,
    Prox,
    /// Any other word in relation position (`within`, `%`, ...).
    Named(String),
}

impl Relation {
    /// Maps a relation word. Unknown words become [`Relation::Named`].
    pub fn from_word(word: &str) -> Self {
        match word.to_ascii_lowercase().as_str() {
            "adj" => Relation::Adj,
            "all" => Relation::All,
            "any" => Relation::Any,
            "prox" => Relation::Prox,
            _ => Relation::Named(word.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Relation::Eq => "=",
            Relation::Exact => "==",
            Relation::NotEq => "<>",
            Relation::Lt => "<",
            Relation::Gt => ">",
            Relation::Lte => "<=",
            Relation::Gte => ">=",
            Relation::Adj => "adj",
            Relation::All => "all",
            Relation::Any => "any",
            Relation::Prox => "prox",
            Relation::Named(name) => name,
        }
    }

    /// Relations that all compile to the same pattern/equality match.
    pub fn is_match(&self) -> bool {
        matches!(
            self,
            Relation::Eq | Relation::Exact | Relation::Adj | Relation::All | Relation::Any
        )
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Relation::Lt | Relation::Gt | Relation::Lte | Relation::Gte
        )
    }
}

/// Boolean operators joining two clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanOp {
    And,
    Or,
    Not,
    Prox,
}

impl BooleanOp {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            "not" => Some(Self::Not),
            "prox" => Some(Self::Prox),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Prox => "prox",
        }
    }
}

/// A `/name`, or `/name<comparison>value`, annotation on a relation or sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifier {
    pub name: String,
    pub comparison: Option<String>,
    pub value: Option<String>,
}

impl Modifier {
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comparison: None,
            value: None,
        }
    }

    pub fn with_value(
        name: impl Into<String>,
        comparison: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            comparison: Some(comparison.into()),
            value: Some(value.into()),
        }
    }

    /// Modifiers written as `/@attr=value` address a sub-attribute of the field.
    pub fn is_attribute(&self) -> bool {
        self.name.starts_with('@')
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// One key of a `sortby` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortIndex {
    pub index: String,
    pub modifiers: Vec<Modifier>,
}

/// CQL parsing/compilation error.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{}{}", .message, located(.position))]
pub struct CqlError {
    #[serde(rename = "type")]
    pub error_type: CqlErrorType,
    pub message: String,
    pub position: Option<Position>,
    pub field: Option<String>,
    pub term: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CqlErrorType {
    SyntaxError,
    UnsupportedFeature,
    UnknownField,
    AmbiguousField,
    TypeCoercion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

fn located(position: &Option<Position>) -> String {
    match position {
        Some(pos) => format!(" (line {}, column {})", pos.line, pos.column),
        None => String::new(),
    }
}

impl CqlError {
    fn new(error_type: CqlErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            position: None,
            field: None,
            term: None,
        }
    }

    pub fn syntax(message: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            position,
            ..Self::new(CqlErrorType::SyntaxError, message)
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(CqlErrorType::UnsupportedFeature, message)
    }

    pub fn unknown_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::new(CqlErrorType::UnknownField, message)
        }
    }

    pub fn ambiguous_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::new(CqlErrorType::AmbiguousField, message)
        }
    }

    pub fn type_coercion(field: impl Into<String>, term: impl Into<String>, expected: FieldKind) -> Self {
        let field = field.into();
        let term = term.into();
        Self {
            field: Some(field.clone()),
            term: Some(term.clone()),
            ..Self::new(
                CqlErrorType::TypeCoercion,
                format!("Cannot use '{}' as {} value for field '{}'", term, expected, field),
            )
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}
