//! Declarative request validation.
//!
//! Each endpoint describes its accepted fields as a static table of [`Field`]s.
//! [`parse_json`] and [`parse_query`] apply a table uniformly: unknown fields,
//! missing required fields, failed coercions and failed validators all reject
//! the whole request with `MalformedRequest`.

use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use serde_json::Value as Json;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    Str,
    Float,
    Int,
    /// Repeated query key or JSON array of scalars.
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Float(f64),
    Int(i64),
    List(Vec<String>),
}

pub type Validator = fn(&Value) -> bool;

#[derive(Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub decoder: Decoder,
    pub required: bool,
    pub validator: Option<Validator>,
}

impl Field {
    pub const fn required(name: &'static str, decoder: Decoder) -> Self {
        Self {
            name,
            decoder,
            required: true,
            validator: None,
        }
    }

    pub const fn optional(name: &'static str, decoder: Decoder) -> Self {
        Self {
            name,
            decoder,
            required: false,
            validator: None,
        }
    }

    pub const fn validate(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    fn accept(&self, value: Value) -> AppResult<Value> {
        match self.validator {
            Some(check) if !check(&value) => {
                tracing::debug!(field = self.name, "Field failed validation");
                Err(AppError::MalformedRequest)
            }
            _ => Ok(value),
        }
    }
}

/// Validated arguments of one request.
#[derive(Debug, Default)]
pub struct Args {
    values: HashMap<&'static str, Value>,
}

impl Args {
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn str(&self, name: &str) -> AppResult<&str> {
        self.opt_str(name)?.ok_or(AppError::MalformedRequest)
    }

    pub fn opt_str(&self, name: &str) -> AppResult<Option<&str>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(_) => Err(AppError::MalformedRequest),
        }
    }

    pub fn f64(&self, name: &str) -> AppResult<f64> {
        match self.values.get(name) {
            Some(Value::Float(f)) => Ok(*f),
            _ => Err(AppError::MalformedRequest),
        }
    }

    pub fn i64(&self, name: &str) -> AppResult<i64> {
        self.opt_i64(name)?.ok_or(AppError::MalformedRequest)
    }

    pub fn opt_i64(&self, name: &str) -> AppResult<Option<i64>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(Value::Int(i)) => Ok(Some(*i)),
            Some(_) => Err(AppError::MalformedRequest),
        }
    }

    pub fn opt_list(&self, name: &str) -> AppResult<Option<&[String]>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(Value::List(items)) => Ok(Some(items)),
            Some(_) => Err(AppError::MalformedRequest),
        }
    }
}

/// Validate a JSON object body against a field table.
pub fn parse_json(schema: &[Field], headers: &HeaderMap, body: &[u8]) -> AppResult<Args> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return apply(schema, HashMap::new());
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(AppError::MalformedRequest);
    }

    let object = match serde_json::from_slice::<Json>(body) {
        Ok(Json::Object(object)) => object,
        _ => return Err(AppError::MalformedRequest),
    };

    let mut raw = HashMap::new();
    for (key, value) in object {
        raw.insert(key, Raw::Json(value));
    }
    apply(schema, raw)
}

/// Validate a URL query string against a field table. Repeated keys feed list
/// fields; for scalar fields the last occurrence wins.
pub fn parse_query(schema: &[Field], query: Option<&str>) -> AppResult<Args> {
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
        grouped
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    let raw = grouped
        .into_iter()
        .map(|(key, values)| (key, Raw::Query(values)))
        .collect();
    apply(schema, raw)
}

enum Raw {
    Json(Json),
    Query(Vec<String>),
}

fn apply(schema: &[Field], mut raw: HashMap<String, Raw>) -> AppResult<Args> {
    if let Some(unknown) = raw.keys().find(|k| !schema.iter().any(|f| f.name == k.as_str())) {
        tracing::debug!(field = %unknown, "Unknown field in request");
        return Err(AppError::MalformedRequest);
    }

    let mut args = Args::default();
    for field in schema {
        match raw.remove(field.name) {
            None if field.required => {
                tracing::debug!(field = field.name, "Missing required field");
                return Err(AppError::MalformedRequest);
            }
            None => {}
            Some(value) => {
                let decoded = decode(field.decoder, value).ok_or_else(|| {
                    tracing::debug!(field = field.name, "Field failed to decode");
                    AppError::MalformedRequest
                })?;
                args.values.insert(field.name, field.accept(decoded)?);
            }
        }
    }
    Ok(args)
}

fn decode(decoder: Decoder, raw: Raw) -> Option<Value> {
    match raw {
        Raw::Json(json) => decode_json(decoder, json),
        Raw::Query(mut values) => match decoder {
            Decoder::List => Some(Value::List(values)),
            _ => decode_text(decoder, values.pop()?),
        },
    }
}

fn decode_json(decoder: Decoder, json: Json) -> Option<Value> {
    match (decoder, json) {
        (Decoder::List, Json::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Json::String(s) => Some(s),
                Json::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        (Decoder::List, _) => None,
        (Decoder::Str, Json::Number(n)) => Some(Value::Str(n.to_string())),
        (Decoder::Float, Json::Number(n)) => n.as_f64().and_then(finite).map(Value::Float),
        (Decoder::Int, Json::Number(n)) => match n.as_i64() {
            Some(i) => Some(Value::Int(i)),
            None => n.as_f64().and_then(whole).map(Value::Int),
        },
        (decoder, Json::String(s)) => decode_text(decoder, s),
        _ => None,
    }
}

fn decode_text(decoder: Decoder, text: String) -> Option<Value> {
    match decoder {
        Decoder::Str => Some(Value::Str(text)),
        Decoder::Float => text.trim().parse::<f64>().ok().and_then(finite).map(Value::Float),
        Decoder::Int => text.trim().parse::<i64>().ok().map(Value::Int),
        Decoder::List => Some(Value::List(vec![text])),
    }
}

fn finite(f: f64) -> Option<f64> {
    f.is_finite().then_some(f)
}

fn whole(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

pub mod validators {
    use super::Value;

    pub fn latitude(value: &Value) -> bool {
        matches!(value, Value::Float(f) if (-90.0..=90.0).contains(f))
    }

    pub fn longitude(value: &Value) -> bool {
        matches!(value, Value::Float(f) if (-180.0..=180.0).contains(f))
    }

    pub fn non_empty(value: &Value) -> bool {
        match value {
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            _ => true,
        }
    }

    /// 0 or 1.
    pub fn boolean_flag(value: &Value) -> bool {
        matches!(value, Value::Int(0 | 1))
    }

    pub fn radius_km(value: &Value) -> bool {
        matches!(value, Value::Int(km) if (1..=20_000).contains(km))
    }

    pub fn non_negative(value: &Value) -> bool {
        matches!(value, Value::Float(f) if *f >= 0.0)
    }

    pub fn all_integers(value: &Value) -> bool {
        match value {
            Value::List(items) => items.iter().all(|i| i.trim().parse::<i64>().is_ok()),
            _ => false,
        }
    }
}
