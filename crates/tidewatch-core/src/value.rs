// ── Value model ──
//
// A closed tagged union over the value shapes the cache supports. Raw JSON
// from the server is decoded into a `Value` by a single match on the kind
// tag -- adding a shape means extending the enum and `Value::decode`, not
// sprinkling downcasts through the cache.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Type tag selecting one of the typed sub-caches.
///
/// The wire names (used in batch-read requests and session records) follow
/// the server's `type` vocabulary: `"double"` for floats, `"string"` for
/// text. `Any` holds values whose shape is not known ahead of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "double")]
    Float,
    #[serde(rename = "string")]
    Text,
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "stringList")]
    TextList,
    #[serde(rename = "doubleMap")]
    FloatMap,
}

impl ValueKind {
    /// Every supported kind, in sub-cache order.
    pub const ALL: [Self; 7] = [
        Self::Bool,
        Self::Int,
        Self::Float,
        Self::Text,
        Self::Any,
        Self::TextList,
        Self::FloatMap,
    ];

    /// The `type` tag sent on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "double",
            Self::Text => "string",
            Self::Any => "any",
            Self::TextList => "stringList",
            Self::FloatMap => "doubleMap",
        }
    }
}

/// A decoded value, one variant per [`ValueKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Any(serde_json::Value),
    TextList(Vec<String>),
    FloatMap(BTreeMap<String, f64>),
}

impl Value {
    /// The kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Any(_) => ValueKind::Any,
            Self::TextList(_) => ValueKind::TextList,
            Self::FloatMap(_) => ValueKind::FloatMap,
        }
    }

    /// Decode raw JSON into the given kind.
    ///
    /// Returns `None` for JSON null or a shape mismatch -- the cache stores
    /// the result as-is, so a mismatched update nulls the entry rather than
    /// keeping a value of the wrong shape.
    ///
    /// Boolean-like domain values are special: switch states arrive as any
    /// of native `true`, numeric `1`, or the string `"on"`, and all coerce
    /// to `true`.
    pub fn decode(kind: ValueKind, raw: &serde_json::Value) -> Option<Self> {
        if raw.is_null() {
            return None;
        }
        match kind {
            ValueKind::Bool => Some(Self::Bool(coerce_bool(raw))),
            ValueKind::Int => raw.as_i64().map(Self::Int),
            ValueKind::Float => raw.as_f64().map(Self::Float),
            ValueKind::Text => raw.as_str().map(|s| Self::Text(s.to_owned())),
            ValueKind::Any => Some(Self::Any(raw.clone())),
            ValueKind::TextList => raw.as_array().map(|arr| {
                Self::TextList(
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect(),
                )
            }),
            ValueKind::FloatMap => raw.as_object().map(|obj| {
                Self::FloatMap(
                    obj.iter()
                        .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                        .collect(),
                )
            }),
        }
    }

    /// Re-encode for the wire (writes send the raw JSON shape back).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::from(*b),
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Float(n) => serde_json::Value::from(*n),
            Self::Text(s) => serde_json::Value::from(s.clone()),
            Self::Any(v) => v.clone(),
            Self::TextList(items) => serde_json::Value::from(items.clone()),
            Self::FloatMap(map) => {
                serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), (*v).into())).collect())
            }
        }
    }

    // ── Typed accessors ──────────────────────────────────────────────

    /// Boolean view, applying the {true, 1, "on"} coercion to `Any` values.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Any(raw) => Some(coerce_bool(raw)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(n) => Some(*n as f64),
            Self::Any(raw) => raw.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Any(raw) => raw.as_i64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Any(raw) => raw.as_str(),
            _ => None,
        }
    }
}

/// The boolean coercion rule: native true, numeric 1, or the string "on".
fn coerce_bool(raw: &serde_json::Value) -> bool {
    raw.as_bool() == Some(true) || raw.as_i64() == Some(1) || raw.as_str() == Some("on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bool_coercion_rule() {
        for raw in [json!(true), json!(1), json!("on")] {
            assert_eq!(
                Value::decode(ValueKind::Bool, &raw),
                Some(Value::Bool(true)),
                "raw {raw} should coerce to true"
            );
        }
        for raw in [json!(false), json!(0), json!("off"), json!("ON")] {
            assert_eq!(Value::decode(ValueKind::Bool, &raw), Some(Value::Bool(false)));
        }
    }

    #[test]
    fn null_decodes_to_none() {
        for kind in ValueKind::ALL {
            assert_eq!(Value::decode(kind, &serde_json::Value::Null), None);
        }
    }

    #[test]
    fn shape_mismatch_decodes_to_none() {
        assert_eq!(Value::decode(ValueKind::Float, &json!("fast")), None);
        assert_eq!(Value::decode(ValueKind::Text, &json!(3.2)), None);
    }

    #[test]
    fn float_accepts_integer_json() {
        assert_eq!(
            Value::decode(ValueKind::Float, &json!(4)),
            Some(Value::Float(4.0))
        );
    }

    #[test]
    fn any_preserves_shape() {
        let raw = json!({"latitude": 60.1, "longitude": 24.9});
        assert_eq!(
            Value::decode(ValueKind::Any, &raw),
            Some(Value::Any(raw.clone()))
        );
    }

    #[test]
    fn float_map_decodes_numeric_members() {
        let raw = json!({"house": 12.6, "engine": 13.8, "label": "bank"});
        let Some(Value::FloatMap(map)) = Value::decode(ValueKind::FloatMap, &raw) else {
            panic!("expected FloatMap");
        };
        assert_eq!(map.len(), 2);
        assert_eq!(map["house"], 12.6);
    }

    #[test]
    fn kind_wire_names_round_trip_serde() {
        for kind in ValueKind::ALL {
            let tag = serde_json::to_value(kind).expect("serialize");
            assert_eq!(tag, json!(kind.wire_name()));
            let back: ValueKind = serde_json::from_value(tag).expect("deserialize");
            assert_eq!(back, kind);
        }
    }
}
