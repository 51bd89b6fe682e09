//! Record type schemas.
//!
//! A [`TypeSchema`] maps field names to [`ValueType`]s, recursively for nested record types. The
//! parser resolves property paths against it and uses the resolved types to drive literal
//! coercion and enum handling. Schemas are usually declared in code, but can also be loaded from a
//! YAML [`SchemaDocument`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// The static type of a field, literal or predicate node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Boolean,
    Int32,
    Int64,
    Double,
    Decimal,
    String,
    DateTime,
    Guid,
    Enum(Arc<EnumType>),
    Record(Arc<TypeSchema>),
    Nullable(Box<ValueType>),
    /// The type of an untyped `null` literal.
    Null,
}

impl ValueType {
    /// Wraps the type in [`ValueType::Nullable`] unless it already accepts null.
    pub fn nullable(self) -> ValueType {
        if self.accepts_null() {
            self
        } else {
            ValueType::Nullable(Box::new(self))
        }
    }

    /// Returns the type with any nullable wrapper removed.
    pub fn underlying(&self) -> &ValueType {
        match self {
            ValueType::Nullable(inner) => inner.underlying(),
            other => other,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ValueType::Nullable(_))
    }

    /// Whether a `null` value is a valid inhabitant of this type.
    pub fn accepts_null(&self) -> bool {
        matches!(
            self,
            ValueType::Nullable(_) | ValueType::Null | ValueType::String | ValueType::Record(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.underlying(),
            ValueType::Int32 | ValueType::Int64 | ValueType::Double | ValueType::Decimal
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self.underlying(), ValueType::Int32 | ValueType::Int64)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.underlying(), ValueType::Boolean)
    }

    pub fn as_enum(&self) -> Option<&Arc<EnumType>> {
        match self.underlying() {
            ValueType::Enum(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Arc<TypeSchema>> {
        match self.underlying() {
            ValueType::Record(schema) => Some(schema),
            _ => None,
        }
    }

    /// Returns whether values of `self` and `other` can be compared or combined with each other.
    pub fn is_compatible_with(&self, other: &ValueType) -> bool {
        if matches!(self, ValueType::Null) {
            return other.accepts_null();
        }
        if matches!(other, ValueType::Null) {
            return self.accepts_null();
        }
        let (left, right) = (self.underlying(), other.underlying());
        (left.is_numeric() && right.is_numeric()) || left == right
    }

    /// Parses a type name as used in schema documents, e.g. `int32`, `string?` or `datetime`.
    ///
    /// Only the built-in scalar names are recognized here; enum and record names are resolved by
    /// [`SchemaDocument::build`].
    pub fn from_scalar_name(name: &str) -> Option<ValueType> {
        let (base, nullable) = match name.trim().strip_suffix('?') {
            Some(base) => (base.trim(), true),
            None => (name.trim(), false),
        };
        let ty = match base.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => ValueType::Boolean,
            "int" | "int32" => ValueType::Int32,
            "long" | "int64" => ValueType::Int64,
            "double" | "float" | "number" => ValueType::Double,
            "decimal" | "money" => ValueType::Decimal,
            "string" => ValueType::String,
            "date" | "datetime" => ValueType::DateTime,
            "guid" | "uuid" => ValueType::Guid,
            _ => return None,
        };
        Some(if nullable { ty.nullable() } else { ty })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Int32 => write!(f, "int32"),
            ValueType::Int64 => write!(f, "int64"),
            ValueType::Double => write!(f, "double"),
            ValueType::Decimal => write!(f, "decimal"),
            ValueType::String => write!(f, "string"),
            ValueType::DateTime => write!(f, "datetime"),
            ValueType::Guid => write!(f, "guid"),
            ValueType::Enum(ty) => write!(f, "{}", ty.name),
            ValueType::Record(schema) => write!(f, "{}", schema.name),
            ValueType::Nullable(inner) => write!(f, "{inner}?"),
            ValueType::Null => write!(f, "null"),
        }
    }
}

/// An enumeration with named integral members.
///
/// Flags enums combine members bitwise, so a value may not correspond to a single member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    name: String,
    flags: bool,
    members: Vec<(String, i64)>,
}

impl EnumType {
    /// Creates a new enum type. Members are kept in ascending value order.
    pub fn new<N: Into<String>>(
        name: impl Into<String>,
        flags: bool,
        members: impl IntoIterator<Item = (N, i64)>,
    ) -> Self {
        let mut members: Vec<(String, i64)> = members
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();
        members.sort_by_key(|(_, value)| *value);
        Self {
            name: name.into(),
            flags,
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_flags(&self) -> bool {
        self.flags
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, i64)> {
        self.members
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
    }

    /// Parses member text into the underlying value.
    ///
    /// Member names match case-insensitively, and the underlying number is accepted as well. For
    /// flags enums a comma or `|` separated list of members is combined bitwise.
    pub fn parse(&self, text: &str) -> Option<i64> {
        let text = text.trim();
        if let Ok(value) = text.parse::<i64>() {
            return Some(value);
        }
        if self.flags && (text.contains(',') || text.contains('|')) {
            return text
                .split([',', '|'])
                .map(|part| self.member_value(part.trim()))
                .try_fold(0, |acc, value| value.map(|value| acc | value));
        }
        self.member_value(text)
    }

    fn member_value(&self, name: &str) -> Option<i64> {
        self.members
            .iter()
            .find(|(member, _)| member.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }

    /// Returns the name of the member with exactly this value, if there is one.
    pub fn member_name(&self, value: i64) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, member)| *member == value)
            .map(|(name, _)| name.as_str())
    }

    /// Renders a value as member names, falling back to the number when no members match.
    pub fn describe(&self, value: i64) -> String {
        if let Some(name) = self.member_name(value) {
            return name.to_string();
        }
        if self.flags && value != 0 {
            let names: Vec<&str> = self
                .members
                .iter()
                .filter(|(_, member)| *member != 0 && value & member == *member)
                .map(|(name, _)| name.as_str())
                .collect();
            let covered = self
                .members
                .iter()
                .filter(|(_, member)| value & member == *member)
                .fold(0, |acc, (_, member)| acc | member);
            if !names.is_empty() && covered == value {
                return names.join(", ");
            }
        }
        value.to_string()
    }
}

/// Field name to type mapping for one record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeSchema {
    name: String,
    fields: BTreeMap<String, ValueType>,
}

impl TypeSchema {
    /// Creates an empty schema with the given type name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds a field, replacing any previous field with the same name.
    pub fn with_field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&ValueType> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &ValueType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    /// Resolves a `/`-delimited property path.
    pub fn resolve_path(&self, path: &str) -> Option<(PropertyPath, ValueType)> {
        let segments: Vec<&str> = path.split('/').map(str::trim).collect();
        self.resolve_segments(&segments)
    }

    /// Resolves a property path leg by leg.
    ///
    /// Every leg must resolve before the next one is attempted; a missing leg yields `None` rather
    /// than a partial path.
    pub fn resolve_segments<S: AsRef<str>>(
        &self,
        segments: &[S],
    ) -> Option<(PropertyPath, ValueType)> {
        let (first, rest) = segments.split_first()?;
        let mut ty = self.field(first.as_ref())?.clone();
        let mut resolved = vec![first.as_ref().to_string()];
        for segment in rest {
            let next = ty.as_record()?.field(segment.as_ref())?.clone();
            resolved.push(segment.as_ref().to_string());
            ty = next;
        }
        Some((PropertyPath::new(resolved), ty))
    }
}

/// An ordered sequence of field names, resolved against a [`TypeSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    segments: Vec<String>,
}

impl PropertyPath {
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Joins the legs with the given separator.
    pub fn join(&self, separator: &str) -> String {
        self.segments.join(separator)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.join("/"))
    }
}

/// A YAML schema declaration.
///
/// ```yaml
/// name: Message
/// fields:
///   MessageId: int32
///   Kind: Flags
///   Complex: Complex
/// enums:
///   Flags:
///     flags: true
///     members: { A: 1, B: 2, C: 4 }
/// records:
///   Complex:
///     fields:
///       Foo: string
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SchemaDocument {
    pub name: String,

    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    #[serde(default)]
    pub enums: BTreeMap<String, EnumDefinition>,

    #[serde(default)]
    pub records: BTreeMap<String, RecordDefinition>,
}

/// An enum declared in a [`SchemaDocument`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EnumDefinition {
    #[serde(default)]
    pub flags: bool,
    pub members: BTreeMap<String, i64>,
}

/// A nested record type declared in a [`SchemaDocument`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RecordDefinition {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl SchemaDocument {
    /// Deserializes a schema document from a YAML string slice.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_norway::from_str(yaml)?)
    }

    /// Builds the root record schema, resolving enum and record references.
    pub fn build(&self) -> Result<Arc<TypeSchema>> {
        let enums: BTreeMap<&str, Arc<EnumType>> = self
            .enums
            .iter()
            .map(|(name, def)| {
                (
                    name.as_str(),
                    Arc::new(EnumType::new(
                        name.clone(),
                        def.flags,
                        def.members.iter().map(|(m, v)| (m.clone(), *v)),
                    )),
                )
            })
            .collect();
        let mut builder = SchemaBuilder {
            document: self,
            enums,
            built: BTreeMap::new(),
            visiting: HashSet::new(),
        };
        builder.build_record(&self.name, &self.fields)
    }
}

struct SchemaBuilder<'a> {
    document: &'a SchemaDocument,
    enums: BTreeMap<&'a str, Arc<EnumType>>,
    built: BTreeMap<String, Arc<TypeSchema>>,
    visiting: HashSet<String>,
}

impl SchemaBuilder<'_> {
    fn build_record(
        &mut self,
        name: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<Arc<TypeSchema>> {
        if let Some(schema) = self.built.get(name) {
            return Ok(schema.clone());
        }
        if !self.visiting.insert(name.to_string()) {
            bail!("Record type '{name}' refers to itself");
        }
        let mut schema = TypeSchema::new(name);
        for (field, type_name) in fields {
            let ty = self
                .resolve_type(type_name)
                .with_context(|| format!("Failed to resolve type of field '{name}.{field}'"))?;
            schema = schema.with_field(field.clone(), ty);
        }
        self.visiting.remove(name);
        let schema = Arc::new(schema);
        self.built.insert(name.to_string(), schema.clone());
        Ok(schema)
    }

    fn resolve_type(&mut self, type_name: &str) -> Result<ValueType> {
        if let Some(ty) = ValueType::from_scalar_name(type_name) {
            return Ok(ty);
        }
        let (base, nullable) = match type_name.trim().strip_suffix('?') {
            Some(base) => (base.trim(), true),
            None => (type_name.trim(), false),
        };
        let document = self.document;
        let ty = if let Some(ty) = self.enums.get(base) {
            ValueType::Enum(ty.clone())
        } else if let Some(def) = document.records.get(base) {
            ValueType::Record(self.build_record(base, &def.fields)?)
        } else {
            bail!("Unknown type '{base}'");
        };
        Ok(if nullable { ty.nullable() } else { ty })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_YAML: &str = r#"name: Message
fields:
  MessageId: int32
  Score: double?
  Price: decimal
  Kind: Flags
  ComplexProperty: Complex
enums:
  Flags:
    flags: true
    members:
      A: 1
      B: 2
      C: 4
records:
  Complex:
    fields:
      Foo: string
      BooleanValue: bool
"#;

    #[test]
    fn builds_schema_from_yaml() -> Result<()> {
        let schema = SchemaDocument::from_yaml_str(EXAMPLE_YAML)?.build()?;

        assert_eq!(schema.name(), "Message");
        assert_eq!(schema.field("MessageId"), Some(&ValueType::Int32));
        assert_eq!(
            schema.field("Score"),
            Some(&ValueType::Nullable(Box::new(ValueType::Double)))
        );
        assert_eq!(schema.field("Price"), Some(&ValueType::Decimal));
        let kind = schema.field("Kind").and_then(ValueType::as_enum).cloned();
        assert!(kind.is_some_and(|kind| kind.is_flags()));

        let (path, ty) = schema
            .resolve_path("ComplexProperty/Foo")
            .expect("nested path should resolve");
        assert_eq!(path.join("."), "ComplexProperty.Foo");
        assert_eq!(ty, ValueType::String);
        Ok(())
    }

    #[test]
    fn unresolved_leg_yields_no_path() -> Result<()> {
        let schema = SchemaDocument::from_yaml_str(EXAMPLE_YAML)?.build()?;
        assert!(schema.resolve_path("ComplexProperty/Missing").is_none());
        assert!(schema.resolve_path("Missing/Foo").is_none());
        assert!(schema.resolve_path("MessageId/Foo").is_none());
        Ok(())
    }

    #[test]
    fn unknown_type_is_rejected() {
        let yaml = "name: Broken\nfields:\n  A: Nope\n";
        let err = SchemaDocument::from_yaml_str(yaml)
            .and_then(|doc| doc.build())
            .expect_err("unknown type should fail");
        assert!(format!("{err:#}").contains("Unknown type 'Nope'"));
    }

    #[test]
    fn self_referencing_record_is_rejected() {
        let yaml = "name: Root\nfields:\n  Node: Node\nrecords:\n  Node:\n    fields:\n      Next: Node\n";
        let doc = SchemaDocument::from_yaml_str(yaml).expect("valid yaml");
        assert!(doc.build().is_err());
    }

    #[test]
    fn flags_enum_parsing_and_description() {
        let flags = EnumType::new("Flags", true, [("A", 1), ("B", 2), ("C", 4)]);
        assert_eq!(flags.parse("a"), Some(1));
        assert_eq!(flags.parse("A, B"), Some(3));
        assert_eq!(flags.parse("6"), Some(6));
        assert_eq!(flags.parse("D"), None);
        assert_eq!(flags.describe(3), "A, B");
        assert_eq!(flags.describe(4), "C");
        assert_eq!(flags.describe(8), "8");
    }
}
