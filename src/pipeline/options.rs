//! Renderer options and their command-line encoding.
//!
//! wkhtmltopdf takes GNU-style long flags. Each option is stored under a
//! canonical name (words joined by `_`) in a [`BTreeMap`], so iteration is
//! lexicographic and the resulting command line is reproducible no matter in
//! which order options were inserted or merged.
//!
//! ```text
//! { boolean_param: Flag, param: Repeated["a","b"] }
//!   ──▶ ["--boolean-param", "--param", "a", "--param", "b"]
//! ```

use crate::error::ServiceError;
use serde_json::Value;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// One option value, shaped the way it appears on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Emit nothing. Cancels a default inherited from the base option set.
    Absent,
    /// `--flag` with no operand.
    Flag,
    /// `--flag value`.
    Scalar(String),
    /// `--flag v1 --flag v2 …`, once per value.
    Repeated(Vec<String>),
    /// `--flag a1 a2 --flag b1 b2 …`, once per tuple.
    Tuples(Vec<Vec<String>>),
}

impl OptionValue {
    pub fn scalar(value: impl ToString) -> Self {
        OptionValue::Scalar(value.to_string())
    }

    pub fn repeated<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        OptionValue::Repeated(values.into_iter().map(|v| v.to_string()).collect())
    }

    pub fn tuples<I, J, T>(tuples: I) -> Self
    where
        I: IntoIterator<Item = J>,
        J: IntoIterator<Item = T>,
        T: ToString,
    {
        OptionValue::Tuples(
            tuples
                .into_iter()
                .map(|t| t.into_iter().map(|v| v.to_string()).collect())
                .collect(),
        )
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        if v {
            OptionValue::Flag
        } else {
            OptionValue::Absent
        }
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Scalar(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Scalar(v)
    }
}

impl<T: Into<OptionValue>> From<Option<T>> for OptionValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(OptionValue::Absent)
    }
}

impl TryFrom<&Value> for OptionValue {
    type Error = ServiceError;

    /// Convert a request-supplied JSON value.
    ///
    /// `true` → Flag, `false`/`null` → Absent, string/number → Scalar,
    /// array of scalars → Repeated, array of arrays of scalars → Tuples.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null | Value::Bool(false) => Ok(OptionValue::Absent),
            Value::Bool(true) => Ok(OptionValue::Flag),
            Value::String(_) | Value::Number(_) => Ok(OptionValue::Scalar(json_scalar(value)?)),
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_array) => items
                .iter()
                .map(|tuple| {
                    tuple
                        .as_array()
                        .into_iter()
                        .flatten()
                        .map(json_scalar)
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()
                .map(OptionValue::Tuples),
            Value::Array(items) => items
                .iter()
                .map(json_scalar)
                .collect::<Result<Vec<_>, _>>()
                .map(OptionValue::Repeated),
            Value::Object(_) => Err(ServiceError::InvalidRequest(
                "option values must be booleans, strings, numbers or arrays".into(),
            )),
        }
    }
}

fn json_scalar(value: &Value) -> Result<String, ServiceError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ServiceError::InvalidRequest(format!(
            "expected a string or number in option value, got {other}"
        ))),
    }
}

/// Canonical option name: `-` and `_` both map to `_`.
pub fn canonical_name(name: &str) -> String {
    name.trim().replace('-', "_")
}

/// Command-line flag for a canonical option name.
pub fn flag_name(name: &str) -> String {
    format!("--{}", name.replace('_', "-"))
}

/// Ordered option set for one renderer invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    entries: BTreeMap<String, OptionValue>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an option. The name is canonicalised first.
    pub fn set(&mut self, name: &str, value: impl Into<OptionValue>) -> &mut Self {
        self.entries.insert(canonical_name(name), value.into());
        self
    }

    /// Builder-style [`RenderOptions::set`].
    pub fn with(mut self, name: &str, value: impl Into<OptionValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert only when no entry (not even `Absent`) exists for `name`.
    pub fn set_default(&mut self, name: &str, value: impl Into<OptionValue>) -> &mut Self {
        self.entries
            .entry(canonical_name(name))
            .or_insert_with(|| value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries.get(&canonical_name(name))
    }

    /// Overlay `other` on top of `self`; entries of `other` win.
    pub fn merge(&mut self, other: &RenderOptions) -> &mut Self {
        for (name, value) in &other.entries {
            self.entries.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in lexicographic name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, OptionValue> {
        self.entries.iter()
    }

    /// Parse a `{name: value}` JSON object of request overrides.
    pub fn from_json_object(value: &Value) -> Result<Self, ServiceError> {
        let map = value.as_object().ok_or_else(|| {
            ServiceError::InvalidRequest("'options' must be a JSON object".into())
        })?;
        let mut options = RenderOptions::new();
        for (name, v) in map {
            if name.trim().is_empty() {
                return Err(ServiceError::InvalidRequest("empty option name".into()));
            }
            options.set(name, OptionValue::try_from(v)?);
        }
        Ok(options)
    }
}

impl<K: AsRef<str>, V: Into<OptionValue>> FromIterator<(K, V)> for RenderOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = RenderOptions::new();
        for (k, v) in iter {
            options.set(k.as_ref(), v);
        }
        options
    }
}

/// Encode `options` into the renderer's argument vector.
///
/// Options are emitted in name order; `Absent` entries produce nothing.
pub fn encode(options: &RenderOptions) -> Vec<String> {
    let mut args = Vec::new();
    for (name, value) in options.iter() {
        let flag = flag_name(name);
        match value {
            OptionValue::Absent => {}
            OptionValue::Flag => args.push(flag),
            OptionValue::Scalar(v) => {
                args.push(flag);
                args.push(v.clone());
            }
            OptionValue::Repeated(values) => {
                for v in values {
                    args.push(flag.clone());
                    args.push(v.clone());
                }
            }
            OptionValue::Tuples(tuples) => {
                for tuple in tuples {
                    args.push(flag.clone());
                    args.extend(tuple.iter().cloned());
                }
            }
        }
    }
    args
}
