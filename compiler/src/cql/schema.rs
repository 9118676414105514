// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Static field tables the compiler resolves CQL indexes against.
//!
//! A [`Schema`] is built once by the storage layer and never changes
//! afterwards. Dotted names walk joins: `city.name` looks up the `city` join
//! and resolves `name` on the joined schema. Composite fields carry a
//! sub-attribute table addressed by `/@attr` modifiers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ast::CqlError;

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Uuid,
    Date,
    Enum,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Uuid => "uuid",
            Self::Date => "date",
            Self::Enum => "enum",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved metadata for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    /// Join segments followed by the attribute name.
    pub path: Vec<String>,
    pub kind: FieldKind,
    /// Empty unless the field is a composite (child collection) field.
    pub sub_attributes: BTreeMap<String, FieldDescriptor>,
}

impl FieldDescriptor {
    pub fn new(path: Vec<String>, kind: FieldKind) -> Self {
        Self {
            path,
            kind,
            sub_attributes: BTreeMap::new(),
        }
    }

    /// Dotted form of the path, as it would be written in a query.
    pub fn name(&self) -> String {
        self.path.join(".")
    }

    pub fn is_composite(&self) -> bool {
        !self.sub_attributes.is_empty()
    }

    /// Looks up a sub-attribute by modifier name (`@stringValue`), ignoring
    /// case. Exactly one declared attribute must match.
    pub fn resolve_sub_attribute(&self, modifier: &str) -> Result<&FieldDescriptor, CqlError> {
        let wanted = modifier.strip_prefix('@').unwrap_or(modifier);
        let mut matches = self
            .sub_attributes
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(wanted));

        match (matches.next(), matches.next()) {
            (Some((_, descriptor)), None) => Ok(descriptor),
            (None, _) => {
                let valid: Vec<_> = self.sub_attributes.keys().map(|k| format!("@{}", k)).collect();
                Err(CqlError::unknown_field(
                    format!("{}/{}", self.name(), modifier),
                    if valid.is_empty() {
                        format!(
                            "Field '{}' has no attributes; modifier '{}' cannot be used",
                            self.name(),
                            modifier
                        )
                    } else {
                        format!(
                            "Unknown attribute '{}' on field '{}'. Valid attributes: {}",
                            modifier,
                            self.name(),
                            valid.join(", ")
                        )
                    },
                ))
            }
            (Some(_), Some(_)) => Err(CqlError::ambiguous_field(
                format!("{}/{}", self.name(), modifier),
                format!(
                    "Attribute '{}' matches more than one attribute of field '{}'",
                    modifier,
                    self.name()
                ),
            )),
        }
    }
}

/// Read-only field table for one record type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    version: String,
    fields: BTreeMap<String, FieldDescriptor>,
    joins: BTreeMap<String, Schema>,
}

impl Schema {
    pub fn builder(version: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            prefix: Vec::new(),
            schema: Schema {
                version: version.into(),
                ..Default::default()
            },
        }
    }

    /// Version tag used to key cached plans.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resolves a (possibly dotted) field name.
    pub fn resolve(&self, name: &str) -> Result<&FieldDescriptor, CqlError> {
        let segments: Vec<&str> = name.split('.').collect();
        self.resolve_segments(name, &segments)
    }

    fn resolve_segments(&self, name: &str, segments: &[&str]) -> Result<&FieldDescriptor, CqlError> {
        match segments {
            [] | [""] => Err(CqlError::unknown_field(name, "Empty field name")),
            [field] => self.fields.get(*field).ok_or_else(|| {
                CqlError::unknown_field(
                    name,
                    format!(
                        "Unknown field '{}'. Valid fields: {}",
                        name,
                        self.valid_names().join(", ")
                    ),
                )
            }),
            [join, rest @ ..] => match self.joins.get(*join) {
                Some(joined) => joined.resolve_segments(name, rest),
                None => Err(CqlError::unknown_field(
                    name,
                    format!("Unknown relationship '{}' in field '{}'", join, name),
                )),
            },
        }
    }

    fn valid_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }
}

/// Resolves `name` against `schema`.
pub fn resolve<'a>(name: &str, schema: &'a Schema) -> Result<&'a FieldDescriptor, CqlError> {
    schema.resolve(name)
}

/// Builds a [`Schema`], filling in each descriptor's path.
#[derive(Debug)]
pub struct SchemaBuilder {
    prefix: Vec<String>,
    schema: Schema,
}

impl SchemaBuilder {
    fn path_for(&self, name: &str) -> Vec<String> {
        let mut path = self.prefix.clone();
        path.push(name.to_string());
        path
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        let descriptor = FieldDescriptor::new(self.path_for(&name), kind);
        self.schema.fields.insert(name, descriptor);
        self
    }

    /// Adds a child-collection field whose rows are matched through
    /// `/@attr=value` modifiers. Composite fields are string-kinded.
    pub fn composite<N: Into<String>>(
        mut self,
        name: impl Into<String>,
        attributes: impl IntoIterator<Item = (N, FieldKind)>,
    ) -> Self {
        let name = name.into();
        let path = self.path_for(&name);
        let mut descriptor = FieldDescriptor::new(path.clone(), FieldKind::String);
        for (attr, kind) in attributes {
            let attr = attr.into();
            let mut attr_path = path.clone();
            attr_path.push(attr.clone());
            descriptor
                .sub_attributes
                .insert(attr, FieldDescriptor::new(attr_path, kind));
        }
        self.schema.fields.insert(name, descriptor);
        self
    }

    /// Adds a relationship; `build` declares the joined type's fields.
    pub fn join(
        mut self,
        name: impl Into<String>,
        build: impl FnOnce(SchemaBuilder) -> SchemaBuilder,
    ) -> Self {
        let name = name.into();
        let nested = build(SchemaBuilder {
            prefix: self.path_for(&name),
            schema: Schema {
                version: self.schema.version.clone(),
                ..Default::default()
            },
        });
        self.schema.joins.insert(name, nested.schema);
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}
