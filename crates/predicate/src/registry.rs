//! Caller-supplied type registry for `new TypeName(args...)` constructor expressions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use uuid::Uuid;

use crate::schema::ValueType;
use crate::value::Value;

/// A constructor implementation. Arguments arrive already converted to the parameter types.
pub type ConstructorFn = dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync;

/// A handle to one registered constructor, stored in predicate nodes.
#[derive(Clone)]
pub struct ConstructorRef {
    type_name: Arc<str>,
    parameters: Arc<[ValueType]>,
    build: Arc<ConstructorFn>,
}

impl ConstructorRef {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn parameters(&self) -> &[ValueType] {
        &self.parameters
    }

    /// Runs the constructor.
    pub fn invoke(&self, args: &[Value]) -> anyhow::Result<Value> {
        if args.len() != self.parameters.len() {
            bail!(
                "{} constructor takes {} arguments, got {}",
                self.type_name,
                self.parameters.len(),
                args.len()
            );
        }
        (self.build)(args)
    }
}

impl fmt::Debug for ConstructorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorRef")
            .field("type_name", &self.type_name)
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl PartialEq for ConstructorRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.parameters == other.parameters
    }
}

struct RegisteredType {
    ty: ValueType,
    constructors: Vec<ConstructorRef>,
}

/// Maps bare type names to their static type and constructor table.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<String, RegisteredType>,
}

impl TypeRegistry {
    /// Creates a new, empty type registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with `DateTime` and `Guid` constructors registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_constructor(
            "DateTime",
            ValueType::DateTime,
            vec![ValueType::Int32; 3],
            |args| datetime_from_parts(args),
        );
        registry.register_constructor(
            "DateTime",
            ValueType::DateTime,
            vec![ValueType::Int32; 6],
            |args| datetime_from_parts(args),
        );
        registry.register_constructor(
            "Guid",
            ValueType::Guid,
            vec![ValueType::String],
            |args| {
                let text = args[0].as_str().context("guid text must be a string")?;
                Ok(Value::Guid(Uuid::parse_str(text)?))
            },
        );
        registry
    }

    /// Registers a constructor for the named type. Constructors are tried in registration order.
    pub fn register_constructor<F>(
        &mut self,
        name: impl Into<String>,
        ty: ValueType,
        parameters: Vec<ValueType>,
        build: F,
    ) where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        let constructor = ConstructorRef {
            type_name: Arc::from(name.as_str()),
            parameters: Arc::from(parameters),
            build: Arc::new(build),
        };
        self.types
            .entry(name)
            .or_insert_with(|| RegisteredType {
                ty,
                constructors: Vec::new(),
            })
            .constructors
            .push(constructor);
    }

    /// Looks up the static type and constructors registered for a type name.
    pub fn lookup(&self, name: &str) -> Option<(&ValueType, &[ConstructorRef])> {
        self.types
            .get(name.trim())
            .map(|entry| (&entry.ty, entry.constructors.as_slice()))
    }
}

fn datetime_from_parts(args: &[Value]) -> anyhow::Result<Value> {
    let parts = args
        .iter()
        .map(|arg| {
            arg.as_i64()
                .and_then(|part| u32::try_from(part).ok())
                .context("date parts must be non-negative integers")
        })
        .collect::<anyhow::Result<Vec<u32>>>()?;
    let year = i32::try_from(parts[0])?;
    let date = NaiveDate::from_ymd_opt(year, parts[1], parts[2])
        .with_context(|| format!("{}-{}-{} is not a valid date", parts[0], parts[1], parts[2]))?;
    let (hour, minute, second) = match parts.as_slice() {
        [_, _, _, hour, minute, second] => (*hour, *minute, *second),
        _ => (0, 0, 0),
    };
    let datetime = date
        .and_hms_opt(hour, minute, second)
        .with_context(|| format!("{hour}:{minute}:{second} is not a valid time"))?;
    Ok(Value::DateTime(datetime))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_datetime_constructors() -> anyhow::Result<()> {
        let registry = TypeRegistry::with_builtins();
        let (ty, constructors) = registry.lookup("DateTime").expect("DateTime is registered");
        assert_eq!(ty, &ValueType::DateTime);
        assert_eq!(constructors.len(), 2);

        let value = constructors[0].invoke(&[Value::Int32(2012), Value::Int32(1), Value::Int32(2)])?;
        assert_eq!(value.to_string(), "2012-01-02T00:00:00");
        assert!(
            constructors[0]
                .invoke(&[Value::Int32(2012), Value::Int32(13), Value::Int32(2)])
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn unknown_types_are_absent() {
        assert!(TypeRegistry::new().lookup("DateTime").is_none());
    }
}
