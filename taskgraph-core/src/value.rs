//! Serializers and the user-value type they convert to/from bytes.

use crate::error::TaskError;
use serde::{Deserialize, Serialize};

/// A user value as it exists in the AST, before or after crossing a function
/// boundary: either an arbitrary JSON-representable value encoded by a named
/// serializer, or a binary file-like object, which always bypasses the named
/// serializer and carries its bytes and content type directly (the "file
/// value" special case from the original data-serialization layer).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An ordinary user value, to be encoded with a named [`Serializer`].
    Data(serde_json::Value),
    /// A binary blob with a content type. Never passes through a named
    /// serializer; its class hint is always `"file"`.
    File {
        /// Raw bytes.
        bytes: Vec<u8>,
        /// MIME content type, e.g. `"application/octet-stream"`.
        content_type: String,
    },
}

impl Value {
    /// The class hint recorded in the AST value node for this value.
    pub fn class_hint(&self) -> &'static str {
        match self {
            Value::Data(_) => "value",
            Value::File { .. } => "file",
        }
    }
}

/// The named wire encoding of a [`Value::Data`] payload.
///
/// `Json` is the human-compatible encoding. `Binary` is a self-describing
/// binary encoding used for full-fidelity round trips (e.g. values JSON
/// cannot represent exactly); it still carries enough structure to decode
/// without an external schema, built over the same `serde_json::Value`
/// intermediate representation as `Json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerName {
    /// JSON encoding.
    Json,
    /// Self-describing binary encoding.
    Binary,
}

impl SerializerName {
    /// Parse a serializer name from the wire string, e.g. from a function
    /// manifest. Unknown names are a usage error, not a panic.
    pub fn by_name(name: &str) -> Result<Self, TaskError> {
        match name {
            "json" => Ok(SerializerName::Json),
            "binary" => Ok(SerializerName::Binary),
            other => Err(TaskError::UsageError(format!(
                "unknown serializer name: {other}"
            ))),
        }
    }

    /// The wire name for this serializer.
    pub fn as_str(&self) -> &'static str {
        match self {
            SerializerName::Json => "json",
            SerializerName::Binary => "binary",
        }
    }

    /// Content type recorded alongside the encoded bytes.
    pub fn content_type(&self) -> &'static str {
        match self {
            SerializerName::Json => "application/json",
            SerializerName::Binary => "application/octet-stream",
        }
    }

    /// Encode a value's data payload to bytes under this serializer.
    pub fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, TaskError> {
        match self {
            SerializerName::Json => serde_json::to_vec(value).map_err(|e| {
                TaskError::SerializationError {
                    serializer: self.as_str().to_string(),
                    message: e.to_string(),
                }
            }),
            SerializerName::Binary => bincode::serialize(value).map_err(|e| {
                TaskError::SerializationError {
                    serializer: self.as_str().to_string(),
                    message: e.to_string(),
                }
            }),
        }
    }

    /// Decode bytes produced by [`Self::encode`] back into a value.
    pub fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, TaskError> {
        match self {
            SerializerName::Json => serde_json::from_slice(bytes).map_err(|e| {
                TaskError::SerializationError {
                    serializer: self.as_str().to_string(),
                    message: e.to_string(),
                }
            }),
            SerializerName::Binary => bincode::deserialize(bytes).map_err(|e| {
                TaskError::SerializationError {
                    serializer: self.as_str().to_string(),
                    message: e.to_string(),
                }
            }),
        }
    }
}

/// Encode a [`Value`] for transport. Files bypass the named serializer and
/// are carried as-is; everything else goes through `serializer`.
pub fn serialize_value(value: &Value, serializer: SerializerName) -> Result<Vec<u8>, TaskError> {
    match value {
        Value::Data(v) => serializer.encode(v),
        Value::File { bytes, .. } => Ok(bytes.clone()),
    }
}

/// Decode bytes back into a [`Value`], given the class hint recorded on the
/// AST value node (`"file"` or anything else).
pub fn deserialize_value(
    bytes: &[u8],
    content_type: &str,
    class_hint: &str,
    serializer: SerializerName,
) -> Result<Value, TaskError> {
    if class_hint == "file" {
        Ok(Value::File {
            bytes: bytes.to_vec(),
            content_type: content_type.to_string(),
        })
    } else {
        Ok(Value::Data(serializer.decode(bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trips() {
        let v = serde_json::json!({"a": 1, "b": [1,2,3]});
        let bytes = SerializerName::Json.encode(&v).unwrap();
        let back = SerializerName::Json.decode(&bytes).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn binary_round_trips() {
        let v = serde_json::json!("hello, ada");
        let bytes = SerializerName::Binary.encode(&v).unwrap();
        let back = SerializerName::Binary.decode(&bytes).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn unknown_name_is_a_usage_error() {
        assert!(matches!(
            SerializerName::by_name("yaml"),
            Err(TaskError::UsageError(_))
        ));
    }

    #[test]
    fn file_value_bypasses_serializer() {
        let v = Value::File {
            bytes: vec![1, 2, 3],
            content_type: "image/png".to_string(),
        };
        let bytes = serialize_value(&v, SerializerName::Json).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        let back = deserialize_value(&bytes, "image/png", "file", SerializerName::Json).unwrap();
        assert_eq!(back, v);
    }
}
