//! Records that predicates are evaluated against.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::ser::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::schema::{TypeSchema, ValueType};
use crate::value::{Value, ValueError, ValueResult};

/// Read access to the top-level fields of a record.
///
/// Nested navigation (`Complex/Foo`) reads the first leg through this trait and the remaining legs
/// from the returned [`Value::Object`].
pub trait Record {
    /// Returns the value of a top-level field, or `None` when the record has no such field.
    fn field(&self, name: &str) -> Option<Value>;
}

impl<R: Record + ?Sized> Record for &R {
    fn field(&self, name: &str) -> Option<Value> {
        (**self).field(name)
    }
}

impl<R: Record + ?Sized> Record for Arc<R> {
    fn field(&self, name: &str) -> Option<Value> {
        (**self).field(name)
    }
}

impl Record for BTreeMap<String, Value> {
    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Record for HashMap<String, Value> {
    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Record for Value {
    fn field(&self, name: &str) -> Option<Value> {
        Value::field(self, name).cloned()
    }
}

/// A record whose fields are typed by a [`TypeSchema`], usually read from JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRecord {
    schema: Arc<TypeSchema>,
    values: BTreeMap<String, Value>,
}

impl DynamicRecord {
    pub fn new(schema: Arc<TypeSchema>, values: BTreeMap<String, Value>) -> Self {
        Self { schema, values }
    }

    /// Converts a JSON object into a record, typing each declared field by the schema.
    pub fn from_json(schema: Arc<TypeSchema>, json: &JsonValue) -> ValueResult<Self> {
        match Value::from_json(&ValueType::Record(schema.clone()), json)? {
            Value::Object(values) => Ok(Self { schema, values }),
            other => Err(ValueError::InvalidConversion {
                from: other.type_name(),
                to: schema.name().to_string(),
            }),
        }
    }

    pub fn schema(&self) -> &Arc<TypeSchema> {
        &self.schema
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }
}

impl Record for DynamicRecord {
    fn field(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

impl Serialize for DynamicRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_json_objects() -> anyhow::Result<()> {
        let schema = Arc::new(
            TypeSchema::new("Message")
                .with_field("MessageId", ValueType::Int32)
                .with_field("Note", ValueType::String.nullable()),
        );
        let record = DynamicRecord::from_json(schema, &json!({"MessageId": 4}))?;
        assert_eq!(record.field("MessageId"), Some(Value::Int32(4)));
        assert_eq!(record.field("Note"), Some(Value::Null));
        assert_eq!(record.field("Missing"), None);
        Ok(())
    }

    #[test]
    fn rejects_non_objects() {
        let schema = Arc::new(TypeSchema::new("Message"));
        let err = DynamicRecord::from_json(schema, &json!([1, 2])).unwrap_err();
        assert_eq!(err.to_string(), "cannot convert array to Message");
    }
}
