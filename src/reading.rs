//! reading.rs
//!
//! Typed decode of the sensor Reading served by the polling endpoint.
//!
//! The endpoint returns whatever the device last pushed, so every field is
//! optional. A `DefaultingPolicy` decides which JSON values collapse to `0`;
//! anything else that is not a number is rejected instead of rendered.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const HEART_RATE: &str = "heart_rate";
pub const SPO2: &str = "spo2";
pub const TEMPERATURE: &str = "temperature";
pub const LAST_TS: &str = "_last_ts";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Malformed JSON body: {0}")]
    Malformed(String),

    #[error("Reading is not a JSON object (found {0})")]
    NotAnObject(String),

    #[error("Field `{field}` is not a number (found {found})")]
    InvalidField { field: String, found: String },
}

/// Which JSON values count as "missing" and default to `0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultingPolicy {
    /// Only an absent field or `null` defaults.
    Nullish,
    /// Absent, `null`, `0`, `""` and `false` all default.
    Falsy,
}

impl DefaultingPolicy {
    fn defaults(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (DefaultingPolicy::Falsy, Value::Bool(false)) => true,
            (DefaultingPolicy::Falsy, Value::String(s)) => s.is_empty(),
            _ => false,
        }
    }
}

/// One decoded reading. Sensor values are already defaulted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub heart_rate: f64,
    pub spo2: f64,
    pub temperature: f64,
    /// Unix seconds at which the device produced the reading.
    pub last_ts: Option<f64>,
}

impl Reading {
    /// Parse a response body and decode it under `policy`.
    pub fn from_slice(body: &[u8], policy: DefaultingPolicy) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        Self::from_value(&value, policy)
    }

    pub fn from_value(value: &Value, policy: DefaultingPolicy) -> Result<Self, DecodeError> {
        let object = value
            .as_object()
            .ok_or_else(|| DecodeError::NotAnObject(kind_of(value).to_string()))?;

        Ok(Self {
            heart_rate: numeric_field(object, HEART_RATE, policy)?,
            spo2: numeric_field(object, SPO2, policy)?,
            temperature: numeric_field(object, TEMPERATURE, policy)?,
            last_ts: timestamp_field(object),
        })
    }

    /// Seconds between `last_ts` and `now_secs`, if a timestamp was present.
    pub fn age_secs(&self, now_secs: f64) -> Option<f64> {
        self.last_ts.map(|ts| now_secs - ts)
    }
}

fn numeric_field(
    object: &Map<String, Value>,
    field: &str,
    policy: DefaultingPolicy,
) -> Result<f64, DecodeError> {
    let value = match object.get(field) {
        None => return Ok(0.0),
        Some(v) => v,
    };
    if policy.defaults(value) {
        return Ok(0.0);
    }
    value.as_f64().ok_or_else(|| DecodeError::InvalidField {
        field: field.to_string(),
        found: kind_of(value).to_string(),
    })
}

// A zero or missing timestamp never marks a reading as live, and a garbled
// one is treated the same way rather than failing the whole cycle.
fn timestamp_field(object: &Map<String, Value>) -> Option<f64> {
    match object.get(LAST_TS)? {
        Value::Number(n) => n.as_f64().filter(|ts| *ts != 0.0),
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        other => {
            log::warn!("Ignoring {} value of type {}", LAST_TS, kind_of(other));
            None
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
