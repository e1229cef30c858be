/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde_json::{json, Value};

/// Datastore filter expression, rendered to the Directus filter syntax with
/// [`Filter::to_json`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    IsNull(String),
    Lt(String, Value),
    Or(Vec<Filter>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn is_null(field: &str) -> Self {
        Filter::IsNull(field.to_string())
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lt(field.to_string(), value.into())
    }

    pub fn to_json(&self) -> Value {
        match self {
            Filter::Eq(field, v) => json!({ field: { "_eq": v } }),
            Filter::IsNull(field) => json!({ field: { "_null": true } }),
            Filter::Lt(field, v) => json!({ field: { "_lt": v } }),
            Filter::Or(parts) => json!({ "_or": parts.iter().map(Filter::to_json).collect::<Vec<_>>() }),
            Filter::And(parts) => json!({ "_and": parts.iter().map(Filter::to_json).collect::<Vec<_>>() }),
        }
    }
}
