//! model/encoder.rs
//! Record encoder contract and the JSON entry encoder.
//!
//! Encoders are called concurrently from the worker pool with a shared `&Model`;
//! implementations must keep no state that a sibling call can observe.

use serde_json::{Map, Number, Value as JsonValue};
use thiserror::Error;

use crate::headers::PayloadFormat;
use crate::model::types::{Annotation, ComplexValue, Model, Property, PropertyDef, PropertyKind, Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeErrorKind {
    /// The record does not conform to the model.
    SchemaViolation,
    /// The record cannot be represented at all (duplicate names, non-finite numbers, ...).
    Malformed,
    /// The encoder panicked; caught at the task boundary.
    Panicked,
}

/// Failure reported by an encoder for the record it was handed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct EncodeFailure {
    pub kind: EncodeErrorKind,
    pub message: String,
}

impl EncodeFailure {
    pub fn schema(message: impl Into<String>) -> Self {
        Self { kind: EncodeErrorKind::SchemaViolation, message: message.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self { kind: EncodeErrorKind::Malformed, message: message.into() }
    }

    /// Attach the record's position in the batch.
    pub fn at(self, index: usize) -> EncodeError {
        EncodeError { index, kind: self.kind, message: self.message }
    }
}

/// Encode failure of one record, located by its index in the submitted sequence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("record {index} could not be encoded ({kind:?}): {message}")]
pub struct EncodeError {
    pub index: usize,
    pub kind: EncodeErrorKind,
    pub message: String,
}

/// Encodes one record into a self-contained payload.
///
/// The payload must depend only on `record` and `model`: encoding the same record in
/// isolation or inside a parallel batch yields identical bytes.
pub trait RecordEncoder: Send + Sync {
    fn payload_format(&self) -> PayloadFormat {
        PayloadFormat::Opaque
    }

    fn encode(&self, record: &Record, model: &Model) -> Result<Vec<u8>, EncodeFailure>;
}

/// Writes each record as one JSON object.
///
/// - `@odata.type` is emitted for instances of a derived type.
/// - Instance annotations are emitted as `@term` before properties.
/// - Properties keep record order.
#[derive(Debug, Clone, Copy)]
pub struct JsonEntryEncoder {
    /// Check every property against the model (declared, typed, nullable, enum members).
    pub full_validation: bool,
}

impl Default for JsonEntryEncoder {
    fn default() -> Self {
        Self { full_validation: true }
    }
}

impl JsonEntryEncoder {
    pub fn new(full_validation: bool) -> Self {
        Self { full_validation }
    }
}

impl RecordEncoder for JsonEntryEncoder {
    fn payload_format(&self) -> PayloadFormat {
        PayloadFormat::Json
    }

    fn encode(&self, record: &Record, model: &Model) -> Result<Vec<u8>, EncodeFailure> {
        let set_type = model.set_type().name.as_str();
        let type_name = record.type_name.as_deref().unwrap_or(set_type);

        if self.full_validation && !model.is_assignable_to_set(type_name) {
            return Err(EncodeFailure::schema(format!(
                "type {} is not {} or derived from it",
                type_name, set_type
            )));
        }

        let mut obj = Map::new();
        if type_name != set_type {
            obj.insert("@odata.type".into(), JsonValue::String(format!("#{}", type_name)));
        }
        write_annotations(&record.annotations, &mut obj)?;

        for prop in &record.properties {
            if obj.contains_key(&prop.name) {
                return Err(EncodeFailure::malformed(format!("duplicate property {}", prop.name)));
            }
            if self.full_validation {
                let def = model.find_property(type_name, &prop.name).ok_or_else(|| {
                    EncodeFailure::schema(format!("property {} is not declared on {}", prop.name, type_name))
                })?;
                check_value(model, def, &prop.value, &prop.name)?;
            }
            obj.insert(prop.name.clone(), to_json(&prop.value)?);
        }

        serde_json::to_vec(&JsonValue::Object(obj)).map_err(|e| EncodeFailure::malformed(e.to_string()))
    }
}

fn write_annotations(annotations: &[Annotation], obj: &mut Map<String, JsonValue>) -> Result<(), EncodeFailure> {
    for ann in annotations {
        let key = format!("@{}", ann.term);
        if obj.contains_key(&key) {
            return Err(EncodeFailure::malformed(format!("duplicate annotation {}", ann.term)));
        }
        obj.insert(key, to_json(&ann.value)?);
    }
    Ok(())
}

fn to_json(value: &Value) -> Result<JsonValue, EncodeFailure> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::Number(Number::from(*i)),
        Value::Double(d) => JsonValue::Number(
            Number::from_f64(*d).ok_or_else(|| EncodeFailure::malformed(format!("non-finite double {}", d)))?,
        ),
        Value::String(s) | Value::Enum(s) => JsonValue::String(s.clone()),
        Value::Complex(cv) => complex_to_json(cv)?,
    })
}

fn complex_to_json(cv: &ComplexValue) -> Result<JsonValue, EncodeFailure> {
    let mut obj = Map::new();
    write_annotations(&cv.annotations, &mut obj)?;
    for Property { name, value } in &cv.properties {
        if obj.contains_key(name) {
            return Err(EncodeFailure::malformed(format!("duplicate property {}", name)));
        }
        obj.insert(name.clone(), to_json(value)?);
    }
    Ok(JsonValue::Object(obj))
}

fn check_value(model: &Model, def: &PropertyDef, value: &Value, path: &str) -> Result<(), EncodeFailure> {
    let mismatch = || {
        EncodeFailure::schema(format!("{}: expected {:?}, got {}", path, def.kind, value.kind_name()))
    };

    match (&def.kind, value) {
        (_, Value::Null) if def.nullable => Ok(()),
        (_, Value::Null) => Err(EncodeFailure::schema(format!("{}: null for non-nullable property", path))),
        (PropertyKind::Boolean, Value::Bool(_)) => Ok(()),
        (PropertyKind::Int32, Value::Int(i)) => {
            if i32::try_from(*i).is_ok() {
                Ok(())
            } else {
                Err(EncodeFailure::schema(format!("{}: {} overflows Int32", path, i)))
            }
        }
        (PropertyKind::Int64, Value::Int(_)) => Ok(()),
        (PropertyKind::Double, Value::Double(_) | Value::Int(_)) => Ok(()),
        (PropertyKind::String, Value::String(_)) => Ok(()),
        (PropertyKind::Enum(ty), Value::Enum(member)) => {
            let known = model.enum_type(ty).map(|e| e.has_member(member)).unwrap_or(false);
            if known {
                Ok(())
            } else {
                Err(EncodeFailure::schema(format!("{}: {} is not a member of {}", path, member, ty)))
            }
        }
        (PropertyKind::Complex(ty), Value::Complex(cv)) => {
            if let Some(actual) = &cv.type_name {
                if actual != ty {
                    return Err(EncodeFailure::schema(format!("{}: expected complex {}, got {}", path, ty, actual)));
                }
            }
            let complex = model
                .complex_type(ty)
                .ok_or_else(|| EncodeFailure::schema(format!("{}: unknown complex type {}", path, ty)))?;
            for prop in &cv.properties {
                let nested = format!("{}/{}", path, prop.name);
                let def = complex.properties.iter().find(|p| p.name == prop.name).ok_or_else(|| {
                    EncodeFailure::schema(format!("{}: property is not declared on {}", nested, ty))
                })?;
                check_value(model, def, &prop.value, &nested)?;
            }
            Ok(())
        }
        _ => Err(mismatch()),
    }
}
