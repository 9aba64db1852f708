use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// One structural problem reported by a validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchemaIssue {
    /// Location of the offending value, JSON-pointer style; empty for the
    /// document root.
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    pub(crate) fn root(message: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            message: message.into(),
        }
    }
}

/// Validates a decoded JSON payload before it reaches the caller or the
/// cache.
pub trait ResponseSchema: Send + Sync {
    fn validate(&self, payload: &serde_json::Value) -> Result<(), Vec<SchemaIssue>>;
}

/// Schema backed by deserialization into `T`: the payload is valid exactly
/// when it deserializes.
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TypedSchema<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("TypedSchema")
    }
}

impl<T: DeserializeOwned> ResponseSchema for TypedSchema<T> {
    fn validate(&self, payload: &serde_json::Value) -> Result<(), Vec<SchemaIssue>> {
        match T::deserialize(payload) {
            Ok(_) => Ok(()),
            Err(error) => Err(vec![SchemaIssue::root(error.to_string())]),
        }
    }
}

/// JSON Schema documents validate through the `jsonschema` crate; every
/// violation is surfaced with its instance path.
impl ResponseSchema for jsonschema::Validator {
    fn validate(&self, payload: &serde_json::Value) -> Result<(), Vec<SchemaIssue>> {
        let issues: Vec<SchemaIssue> = self
            .iter_errors(payload)
            .map(|error| SchemaIssue {
                path: error.instance_path().to_string(),
                message: error.to_string(),
            })
            .collect();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

impl<S: ResponseSchema + ?Sized> ResponseSchema for Arc<S> {
    fn validate(&self, payload: &serde_json::Value) -> Result<(), Vec<SchemaIssue>> {
        (**self).validate(payload)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::{ResponseSchema, TypedSchema};

    #[derive(Debug, Deserialize)]
    struct Track {
        #[allow(dead_code)]
        id: i64,
        #[allow(dead_code)]
        title: String,
    }

    #[test]
    fn typed_schema_accepts_matching_payload() {
        let schema = TypedSchema::<Vec<Track>>::new();
        let payload = json!([{"id": 1, "title": "Nightcall"}]);
        assert!(schema.validate(&payload).is_ok());
    }

    #[test]
    fn typed_schema_rejects_with_an_issue() {
        let schema = TypedSchema::<Vec<Track>>::new();
        let payload = json!({"unexpected": true});
        let issues = schema.validate(&payload).expect_err("must reject");
        assert_eq!(issues.len(), 1);
        assert!(!issues[0].message.is_empty());
    }

    #[test]
    fn json_schema_validator_reports_instance_paths() {
        let schema = json!({
            "type": "array",
            "items": {
                "type": "object",
                "required": ["id"],
            }
        });
        let validator = jsonschema::validator_for(&schema).expect("valid schema");

        assert!(ResponseSchema::validate(&validator, &json!([{"id": 1}])).is_ok());

        let issues =
            ResponseSchema::validate(&validator, &json!([{"id": 1}, {}])).expect_err("must reject");
        assert!(!issues.is_empty());
        assert!(issues[0].path.contains('1'));
    }
}
