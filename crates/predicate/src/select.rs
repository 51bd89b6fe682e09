//! `$select` projections.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use serde::ser::{Serialize, Serializer};

use crate::cache::TypeCache;
use crate::error::QueryError;
use crate::record::Record;
use crate::schema::{TypeSchema, ValueType};
use crate::value::Value;

/// Projection shapes, keyed by schema and sorted field set.
static SHAPES: LazyLock<TypeCache<(TypeSchema, Vec<String>), Arc<SelectShape>>> =
    LazyLock::new(TypeCache::new);

/// The fields kept by a `$select`, in name order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectShape {
    schema: String,
    fields: Vec<(String, ValueType)>,
}

impl SelectShape {
    /// Returns the shared shape for `names` on `schema`.
    ///
    /// Any permutation of the same names returns the same `Arc`. Names must be top-level fields.
    pub fn resolve<S: AsRef<str>>(
        schema: &TypeSchema,
        names: &[S],
    ) -> Result<Arc<SelectShape>, QueryError> {
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            let ty = schema
                .field(name)
                .ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
            fields.push((name.to_string(), ty.clone()));
        }
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        fields.dedup_by(|a, b| a.0 == b.0);

        let key = (
            schema.clone(),
            fields.iter().map(|(name, _)| name.clone()).collect(),
        );
        Ok(SHAPES.get_or_insert_with(key, || {
            Arc::new(SelectShape {
                schema: schema.name().to_string(),
                fields,
            })
        }))
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &ValueType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    /// Copies the selected fields out of a record. Missing fields read as null.
    pub fn project(self: &Arc<Self>, record: &dyn Record) -> Projection {
        let values = self
            .fields
            .iter()
            .map(|(name, _)| (name.clone(), record.field(name).unwrap_or(Value::Null)))
            .collect();
        Projection {
            shape: Arc::clone(self),
            values,
        }
    }
}

/// A record reduced to the fields of a [`SelectShape`].
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    shape: Arc<SelectShape>,
    values: BTreeMap<String, Value>,
}

impl Projection {
    pub fn shape(&self) -> &Arc<SelectShape> {
        &self.shape
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }
}

impl Record for Projection {
    fn field(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

impl Serialize for Projection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}
