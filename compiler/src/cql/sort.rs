// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! `sortby` clause compilation.

use super::ast::{CqlError, SortIndex};
use super::plan::{SortDirection, SortSpec};
use super::schema::Schema;

/// Resolve each sort key and its direction, keeping clause order.
pub fn compile_sort(specs: &[SortIndex], schema: &Schema) -> Result<Vec<SortSpec>, CqlError> {
    specs
        .iter()
        .map(|spec| {
            let field = schema.resolve(&spec.index)?;
            if field.is_composite() {
                return Err(CqlError::unsupported(format!(
                    "Cannot sort by attribute collection '{}'",
                    field.name()
                )));
            }
            Ok(SortSpec {
                path: field.path.clone(),
                direction: direction(spec)?,
            })
        })
        .collect()
}

fn direction(spec: &SortIndex) -> Result<SortDirection, CqlError> {
    let mut direction = SortDirection::Asc;
    for modifier in &spec.modifiers {
        let name = modifier.name.to_ascii_lowercase();
        let name = name.strip_prefix("sort.").unwrap_or(&name);
        if modifier.comparison.is_some() {
            return Err(CqlError::unsupported(format!(
                "Sort modifier '{}' does not take a value",
                modifier.name
            )));
        }
        match name {
            "descending" => direction = SortDirection::Desc,
            "ascending" => direction = SortDirection::Asc,
            "respectcase" => {}
            _ => {
                return Err(CqlError::unsupported(format!(
                    "Sort modifier '{}' is not supported",
                    modifier.name
                )));
            }
        }
    }
    Ok(direction)
}
