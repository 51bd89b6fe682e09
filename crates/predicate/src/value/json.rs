use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::schema::ValueType;
use crate::value::{DEFAULT_DATE_FORMATS, EnumValue, Value, ValueError, ValueResult, parse_datetime};

impl Value {
    /// Converts a JSON value into a value of the given static type.
    ///
    /// Decimals are read from numbers or numeric strings without going through a double. Dates
    /// and guids are read from strings, enums from a member name or the underlying number.
    /// Record types convert every declared field, with missing fields becoming null.
    pub fn from_json(ty: &ValueType, json: &JsonValue) -> ValueResult<Value> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = || ValueError::InvalidConversion {
            from: json_kind(json),
            to: ty.to_string(),
        };
        let value = match ty.underlying() {
            ValueType::Boolean => Value::Boolean(json.as_bool().ok_or_else(mismatch)?),
            ValueType::Int32 => {
                let number = json.as_i64().ok_or_else(mismatch)?;
                Value::Int32(i32::try_from(number).map_err(|_| mismatch())?)
            }
            ValueType::Int64 => Value::Int64(json.as_i64().ok_or_else(mismatch)?),
            ValueType::Double => Value::Double(json.as_f64().ok_or_else(mismatch)?),
            ValueType::Decimal => {
                let text = match json {
                    JsonValue::Number(number) => number.to_string(),
                    JsonValue::String(text) => text.trim().to_string(),
                    _ => return Err(mismatch()),
                };
                let value = text
                    .parse::<Decimal>()
                    .or_else(|_| Decimal::from_scientific(&text))
                    .map_err(|_| mismatch())?;
                Value::Decimal(value)
            }
            ValueType::String => Value::String(json.as_str().ok_or_else(mismatch)?.to_string()),
            ValueType::DateTime => {
                let text = json.as_str().ok_or_else(mismatch)?;
                Value::DateTime(parse_datetime(text, DEFAULT_DATE_FORMATS).ok_or_else(mismatch)?)
            }
            ValueType::Guid => {
                let text = json.as_str().ok_or_else(mismatch)?;
                Value::Guid(Uuid::parse_str(text).map_err(|_| mismatch())?)
            }
            ValueType::Enum(enum_type) => {
                let number = match json {
                    JsonValue::String(text) => enum_type.parse(text),
                    other => other.as_i64(),
                };
                Value::Enum(EnumValue::new(
                    enum_type.clone(),
                    number.ok_or_else(mismatch)?,
                ))
            }
            ValueType::Record(schema) => {
                let object = json.as_object().ok_or_else(mismatch)?;
                let mut entries = BTreeMap::new();
                for (name, field_type) in schema.fields() {
                    let value = match object.get(name) {
                        Some(json) => Value::from_json(field_type, json)?,
                        None => Value::Null,
                    };
                    entries.insert(name.to_string(), value);
                }
                Value::Object(entries)
            }
            ValueType::Nullable(_) | ValueType::Null => return Err(mismatch()),
        };
        Ok(value)
    }
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::schema::{EnumType, TypeSchema};

    #[test]
    fn converts_nested_records() {
        let complex = Arc::new(TypeSchema::new("Complex").with_field("Foo", ValueType::String));
        let flags = Arc::new(EnumType::new("Flags", true, [("A", 1), ("B", 2)]));
        let schema = TypeSchema::new("Message")
            .with_field("MessageId", ValueType::Int32)
            .with_field("Kind", ValueType::Enum(flags))
            .with_field("Complex", ValueType::Record(complex));

        let value = Value::from_json(
            &ValueType::Record(Arc::new(schema)),
            &json!({"MessageId": 3, "Kind": "A, B", "Complex": {"Foo": "bar"}}),
        )
        .unwrap();

        assert_eq!(value.field("MessageId"), Some(&Value::Int32(3)));
        assert_eq!(value.field("Kind").and_then(Value::as_i64), Some(3));
        assert_eq!(
            value.field("Complex").and_then(|c| c.field("Foo")),
            Some(&Value::from("bar"))
        );
    }

    #[test]
    fn rejects_mismatched_json() {
        let err = Value::from_json(&ValueType::Int32, &json!("three")).unwrap_err();
        assert_eq!(err.to_string(), "cannot convert string to int32");
        assert!(Value::from_json(&ValueType::Int32, &json!(1_i64 << 40)).is_err());
        assert!(Value::from_json(&ValueType::Decimal, &json!("cheap")).is_err());
    }

    #[test]
    fn decimals_come_from_numbers_or_text() {
        let price = Value::Decimal(Decimal::new(1999, 2));
        assert_eq!(Value::from_json(&ValueType::Decimal, &json!(19.99)).unwrap(), price);
        assert_eq!(Value::from_json(&ValueType::Decimal, &json!("19.99")).unwrap(), price);
        assert_eq!(
            Value::from_json(&ValueType::Decimal, &json!(1e3)).unwrap(),
            Value::Decimal(Decimal::from(1000))
        );
    }
}
