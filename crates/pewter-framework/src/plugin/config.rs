//! Plugin configuration against the descriptor's schema.
//!
//! A schema is a JSON template: its keys are the accepted settings and its
//! values are their defaults. Supplied values must have the same JSON type as
//! the default (any number for a number, anything for `null`); nested objects
//! are checked recursively. Keys the template does not know are rejected.

use serde_json::{Map, Value};

/// Merges `supplied` over the schema defaults.
///
/// Without a schema the supplied value is passed through unchanged, or an
/// empty object when nothing was supplied.
pub fn resolve_config(schema: Option<&Value>, supplied: Option<&Value>) -> Result<Value, String> {
    let supplied = supplied.filter(|v| !v.is_null());
    match (schema, supplied) {
        (None, Some(value)) => Ok(value.clone()),
        (None, None) => Ok(Value::Object(Map::new())),
        (Some(schema), None) => Ok(schema.clone()),
        (Some(schema), Some(value)) => merge(schema, value, ""),
    }
}

fn merge(template: &Value, value: &Value, path: &str) -> Result<Value, String> {
    match (template, value) {
        (Value::Null, _) => Ok(value.clone()),
        (Value::Object(defaults), Value::Object(given)) => {
            let mut out = defaults.clone();
            for (key, given) in given {
                let key_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let Some(default) = defaults.get(key) else {
                    return Err(format!("unknown setting '{key_path}'"));
                };
                out.insert(key.clone(), merge(default, given, &key_path)?);
            }
            Ok(Value::Object(out))
        }
        (template, value) if kind(template) == kind(value) => Ok(value.clone()),
        (template, value) => Err(format!(
            "'{}' must be {}, got {}",
            if path.is_empty() { "<root>" } else { path },
            kind(template),
            kind(value)
        )),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a table",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_without_supplied() {
        let schema = json!({ "units": "metric", "retries": 3 });
        assert_eq!(resolve_config(Some(&schema), None).unwrap(), schema);
    }

    #[test]
    fn test_supplied_overrides_defaults() {
        let schema = json!({ "units": "metric", "retries": 3, "http": { "timeout": 10 } });
        let supplied = json!({ "retries": 5, "http": { "timeout": 2.5 } });
        assert_eq!(
            resolve_config(Some(&schema), Some(&supplied)).unwrap(),
            json!({ "units": "metric", "retries": 5, "http": { "timeout": 2.5 } })
        );
    }

    #[test]
    fn test_type_mismatch() {
        let schema = json!({ "http": { "timeout": 10 } });
        let err = resolve_config(Some(&schema), Some(&json!({ "http": { "timeout": "slow" } })))
            .unwrap_err();
        assert_eq!(err, "'http.timeout' must be a number, got a string");
    }

    #[test]
    fn test_unknown_key() {
        let schema = json!({ "units": "metric" });
        let err = resolve_config(Some(&schema), Some(&json!({ "colour": "red" }))).unwrap_err();
        assert_eq!(err, "unknown setting 'colour'");
    }

    #[test]
    fn test_null_default_accepts_anything() {
        let schema = json!({ "extra": null });
        let supplied = json!({ "extra": [1, 2] });
        assert_eq!(
            resolve_config(Some(&schema), Some(&supplied)).unwrap(),
            supplied
        );
    }

    #[test]
    fn test_no_schema() {
        assert_eq!(resolve_config(None, None).unwrap(), json!({}));
        assert_eq!(
            resolve_config(None, Some(&json!({ "a": 1 }))).unwrap(),
            json!({ "a": 1 })
        );
    }
}
