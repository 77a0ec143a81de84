//! Tolerant numeric conversions for aggregator payloads, which mix numbers,
//! numeric strings, and nulls across providers.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accepts a JSON number, a numeric string, or null/non-numeric (-> `None`).
pub fn tolerant_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Serde deserializer for `Option<f64>` fields that may arrive as strings.
pub fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(tolerant_f64))
}

/// Serde deserializer for `Option<i64>` fields that may arrive as strings.
pub fn de_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerant_f64_parses_strings_and_numbers() {
        assert_eq!(tolerant_f64(&Value::String("1.5".into())), Some(1.5));
        assert_eq!(tolerant_f64(&serde_json::json!(2.5)), Some(2.5));
        assert_eq!(tolerant_f64(&Value::Null), None);
        assert_eq!(tolerant_f64(&Value::String("nope".into())), None);
    }
}
