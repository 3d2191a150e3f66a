//! The mapping pass: node tree → ordered set of domain instances.
//!
//! Missing source fields are not errors (partial payloads are normal);
//! mistyped fields record a soft [`FieldFault`] and mapping continues.
//! Only a top-level shape mismatch aborts the pass.

use super::{
    AttrKind, AttrValue, FieldFault, MappedInstance, MappedObjectSet, MappingError,
    TypeDescriptor,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Map a parsed node against a type descriptor.
///
/// A map node produces a single instance; an array of map nodes produces
/// one instance per element in source order. Identity keys are unique
/// within the returned set: a later element repeating an earlier key merges
/// into the earlier slot, its field values winning.
pub fn map(node: &Value, descriptor: &TypeDescriptor) -> Result<MappedObjectSet, MappingError> {
    match node {
        Value::Object(fields) => Ok(vec![map_single(fields, descriptor)]),
        Value::Array(elements) => {
            // Reject non-map elements before producing anything: a hard
            // shape mismatch never yields a partial set.
            if let Some(bad) = elements.iter().find(|e| !e.is_object()) {
                return Err(MappingError::ShapeMismatch {
                    found: format!("sequence containing {}", shape_name(bad)),
                });
            }

            let mut set: MappedObjectSet = Vec::with_capacity(elements.len());
            let mut by_identity: HashMap<String, usize> = HashMap::new();

            for fields in elements.iter().filter_map(|e| e.as_object()) {
                let instance = map_single(fields, descriptor);
                match by_identity.get(&instance.identity) {
                    Some(&pos) => merge_into(&mut set[pos], instance),
                    None => {
                        by_identity.insert(instance.identity.clone(), set.len());
                        set.push(instance);
                    }
                }
            }
            Ok(set)
        }
        other => Err(MappingError::ShapeMismatch {
            found: shape_name(other).to_string(),
        }),
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "map",
    }
}

/// Map one map node into an instance. Infallible: field problems become
/// soft faults on the instance.
fn map_single(
    fields: &serde_json::Map<String, Value>,
    descriptor: &TypeDescriptor,
) -> MappedInstance {
    let mut instance = MappedInstance {
        entity: descriptor.entity.clone(),
        identity: String::new(),
        attributes: Default::default(),
        faults: Vec::new(),
        newly_created: false,
    };

    for mapping in &descriptor.mappings {
        match fields.get(&mapping.source) {
            None => {
                if let Some(default) = &mapping.default {
                    instance.attributes.insert(mapping.dest.clone(), default.clone());
                }
                // No default: leave unset so the prior persisted value survives.
            }
            Some(value) => match coerce(value, mapping.kind) {
                Ok(attr) => {
                    instance.attributes.insert(mapping.dest.clone(), attr);
                }
                Err(reason) => {
                    tracing::debug!(
                        entity = %descriptor.entity,
                        field = %mapping.dest,
                        %reason,
                        "soft mapping fault"
                    );
                    instance.faults.push(FieldFault {
                        field: mapping.dest.clone(),
                        reason,
                    });
                }
            },
        }
    }

    instance.identity = match descriptor
        .identity_field
        .as_ref()
        .and_then(|f| fields.get(f))
        .and_then(identity_string)
    {
        Some(key) => key,
        None => {
            instance.newly_created = true;
            uuid::Uuid::new_v4().to_string()
        }
    };

    instance
}

/// Stringify an identity key value. Only scalars qualify.
fn identity_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Merge a duplicate-identity instance into the earlier occurrence.
/// Later field values win; faults accumulate.
fn merge_into(earlier: &mut MappedInstance, later: MappedInstance) {
    earlier.attributes.extend(later.attributes);
    earlier.faults.extend(later.faults);
}

/// Coerce a source value into the declared attribute kind.
///
/// Lenient in the directions real payloads drift: numeric strings parse
/// into numeric kinds, scalars render into Text, dates accept RFC 3339 or
/// epoch seconds. An explicit JSON null is valid for every kind.
fn coerce(value: &Value, kind: AttrKind) -> Result<AttrValue, String> {
    if value.is_null() {
        return Ok(AttrValue::Null);
    }

    match kind {
        AttrKind::Text => match value {
            Value::String(s) => Ok(AttrValue::Text(s.clone())),
            Value::Number(n) => Ok(AttrValue::Text(n.to_string())),
            Value::Bool(b) => Ok(AttrValue::Text(b.to_string())),
            other => Err(format!("cannot map {} into text", shape_name(other))),
        },
        AttrKind::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(AttrValue::Integer)
                .ok_or_else(|| format!("{n} is not an integer")),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(AttrValue::Integer)
                .map_err(|_| format!("cannot parse {s:?} as an integer")),
            other => Err(format!("cannot map {} into an integer", shape_name(other))),
        },
        AttrKind::Float => match value {
            Value::Number(n) => n
                .as_f64()
                .map(AttrValue::Float)
                .ok_or_else(|| format!("{n} is not representable as a float")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(AttrValue::Float)
                .map_err(|_| format!("cannot parse {s:?} as a float")),
            other => Err(format!("cannot map {} into a float", shape_name(other))),
        },
        AttrKind::Bool => match value {
            Value::Bool(b) => Ok(AttrValue::Bool(*b)),
            Value::String(s) => match s.as_str() {
                "true" => Ok(AttrValue::Bool(true)),
                "false" => Ok(AttrValue::Bool(false)),
                _ => Err(format!("cannot parse {s:?} as a boolean")),
            },
            other => Err(format!("cannot map {} into a boolean", shape_name(other))),
        },
        AttrKind::Date => match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|d| AttrValue::Date(d.with_timezone(&Utc)))
                .map_err(|_| format!("cannot parse {s:?} as an RFC 3339 date")),
            Value::Number(n) => n
                .as_i64()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .map(AttrValue::Date)
                .ok_or_else(|| format!("{n} is not a valid epoch timestamp")),
            other => Err(format!("cannot map {} into a date", shape_name(other))),
        },
    }
}
