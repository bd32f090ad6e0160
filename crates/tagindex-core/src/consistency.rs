//! Monotonic superset check between two JSON documents.
//!
//! [`assert_newer_is_superset_of_older`] walks every key of `older` and proves
//! the matching value in `newer` is not behind it:
//!
//! The rule is picked by the shape of the `newer` value:
//!
//! | newer shape | rule |
//! |---|---|
//! | string | semver `>=` when both sides parse, else string `>=` against the older value's text |
//! | number | numeric `>=`; an older string is read as a number |
//! | bool   | equal |
//! | object | recurse over the older value's keys (a scalar has none) |
//!
//! Keys missing from `newer` are treated as deprecated and skipped. Extra keys
//! in `newer` are never inspected.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::error::{Result, TagIndexError};
use crate::obs;
use crate::version::Semver;

/// Closed JSON shape the validator dispatches on.
///
/// `null` converts to an empty object and arrays to objects keyed by index,
/// so both are walked like any other container.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    String(String),
    Number(f64),
    Bool(bool),
    Object(BTreeMap<String, JsonValue>),
}

impl JsonValue {
    fn shape(&self) -> &'static str {
        match self {
            JsonValue::String(_) => "string",
            JsonValue::Number(_) => "number",
            JsonValue::Bool(_) => "bool",
            JsonValue::Object(_) => "object",
        }
    }

    /// Text used when a string is compared against this value.
    fn as_text(&self) -> String {
        match self {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            JsonValue::Object(_) => String::new(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            JsonValue::Number(n) => Some(*n),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            JsonValue::Object(map) => format!("object with {} keys", map.len()),
        }
    }
}

impl From<&Value> for JsonValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => JsonValue::Object(BTreeMap::new()),
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => JsonValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Array(items) => JsonValue::Object(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), JsonValue::from(v)))
                    .collect(),
            ),
            Value::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), JsonValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        JsonValue::from(&value)
    }
}

/// What a successful validation looked at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Leaf values compared.
    pub compared: usize,
    /// Dotted paths present in `older` but absent in `newer`.
    pub deprecated: Vec<String>,
}

/// Prove `newer` is nowhere behind `older`.
///
/// Fails with [`TagIndexError::RegressionDetected`] on the first value that
/// went backwards or changed shape.
pub fn assert_newer_is_superset_of_older(
    newer: &JsonValue,
    older: &JsonValue,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();
    check(newer, older, "$", &mut report)?;
    Ok(report)
}

/// [`assert_newer_is_superset_of_older`] over `serde_json` documents.
pub fn validate_documents(newer: &Value, older: &Value) -> Result<ValidationReport> {
    assert_newer_is_superset_of_older(&JsonValue::from(newer), &JsonValue::from(older))
}

fn check(
    newer: &JsonValue,
    older: &JsonValue,
    path: &str,
    report: &mut ValidationReport,
) -> Result<()> {
    let ok = match newer {
        JsonValue::Object(newer_map) => {
            if let JsonValue::Object(older_map) = older {
                for (key, older_value) in older_map {
                    let child = format!("{}.{}", path, key);
                    match newer_map.get(key) {
                        Some(newer_value) => check(newer_value, older_value, &child, report)?,
                        None => {
                            obs::emit_deprecated_key(&child);
                            report.deprecated.push(child);
                        }
                    }
                }
            }
            return Ok(());
        }
        JsonValue::String(n) => {
            let o = older.as_text();
            match (Semver::parse_tolerant(n), Semver::parse_tolerant(&o)) {
                (Some(nv), Some(ov)) => nv >= ov,
                _ => n.as_str() >= o.as_str(),
            }
        }
        JsonValue::Number(n) => older.as_number().map_or(false, |o| *n >= o),
        JsonValue::Bool(n) => matches!(older, JsonValue::Bool(o) if n == o),
    };

    report.compared += 1;
    if ok {
        Ok(())
    } else {
        let (newer_desc, older_desc) = if newer.shape() == older.shape() {
            (newer.describe(), older.describe())
        } else {
            (
                format!("{} ({})", newer.describe(), newer.shape()),
                format!("{} ({})", older.describe(), older.shape()),
            )
        };
        Err(TagIndexError::RegressionDetected {
            path: path.to_string(),
            newer: newer_desc,
            older: older_desc,
        })
    }
}
